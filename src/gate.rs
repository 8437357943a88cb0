//! Redaction Gate: decides what one viewer may see of one pick.
//!
//! Projections are recomputed on every request and never stored.

use crate::config::MaskSentinels;
use crate::types::{Pick, PickView, Viewer};

#[derive(Debug, Clone, Default)]
pub struct RedactionGate {
    sentinels: MaskSentinels,
}

impl RedactionGate {
    pub fn new(sentinels: MaskSentinels) -> Self {
        Self { sentinels }
    }

    /// Admins and entitled viewers get the pick unchanged. Everyone else gets
    /// scheduling and identity fields only; title, odds and matchup become
    /// fixed placeholders, and bet type, description and slip image are dropped.
    pub fn project(&self, pick: &Pick, viewer: &Viewer) -> PickView {
        if viewer.sees_everything() {
            return PickView { pick: pick.clone(), locked: false };
        }

        let masked = Pick {
            id: pick.id.clone(),
            title: self.sentinels.title.clone(),
            bet_type: None,
            odds: pick.odds.as_ref().map(|_| self.sentinels.odds.clone()),
            matchup: pick.matchup.as_ref().map(|_| self.sentinels.matchup.clone()),
            time: pick.time.clone(),
            sport: pick.sport,
            result: pick.result,
            slip_image: None,
            description: None,
            posted_at: pick.posted_at.clone(),
            created_at: pick.created_at,
            units: pick.units,
        };
        PickView { pick: masked, locked: true }
    }

    pub fn project_all(&self, picks: &[Pick], viewer: &Viewer) -> Vec<PickView> {
        picks.iter().map(|p| self.project(p, viewer)).collect()
    }
}
