use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::state::clock::PickClock;
use crate::types::{BetResult, FeedMode, NewPick, Pick};

/// Shared pick storage. Every operation is atomic on its own: a failed call
/// leaves the store exactly as it found it.
#[async_trait]
pub trait PickStore: Send + Sync {
    fn mode(&self) -> FeedMode;

    /// Short backend name for `/health`.
    fn backend(&self) -> &'static str;

    /// Stamps and stores a pick. On the singleton feed this replaces the
    /// current pick; on a list feed it is added as the newest entry.
    async fn create(&self, new: NewPick) -> Result<Pick>;

    /// All picks, newest `created_at` first.
    async fn list(&self) -> Result<Vec<Pick>>;

    /// Overwrites `result` only. `NotFound` if `id` is unknown.
    async fn patch_result(&self, id: &str, result: BetResult) -> Result<Pick>;

    /// Permanently removes `id`. `NotFound` if it is absent, including on a
    /// repeated delete.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Singleton feed: removes and returns the current pick.
    async fn clear_current(&self) -> Result<Pick>;
}

pub fn pick_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Pick '{id}' not found"))
}

pub fn no_current_pick() -> AppError {
    AppError::NotFound("No current pick".to_string())
}

pub fn requires_id() -> AppError {
    AppError::BadRequest("list feeds delete by id".to_string())
}

// ---------------------------------------------------------------------------
// MemoryPickStore
// ---------------------------------------------------------------------------

enum Slots {
    /// Write lock is held across stamp + replace, so the last committed
    /// create is also the newest one and readers never see a torn pick.
    Singleton(RwLock<Option<Pick>>),
    /// id → pick. Display order comes from `created_at`, not insertion.
    List(DashMap<String, Pick>),
}

pub struct MemoryPickStore {
    slots: Slots,
    clock: PickClock,
}

impl MemoryPickStore {
    pub fn new(mode: FeedMode) -> Arc<Self> {
        let slots = match mode {
            FeedMode::Singleton => Slots::Singleton(RwLock::new(None)),
            FeedMode::List => Slots::List(DashMap::new()),
        };
        Arc::new(Self { slots, clock: PickClock::new() })
    }
}

#[async_trait]
impl PickStore for MemoryPickStore {
    fn mode(&self) -> FeedMode {
        match self.slots {
            Slots::Singleton(_) => FeedMode::Singleton,
            Slots::List(_) => FeedMode::List,
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, new: NewPick) -> Result<Pick> {
        match &self.slots {
            Slots::Singleton(slot) => {
                let mut current = slot.write().await;
                let (id, created_at, posted_at) = self.clock.stamp();
                let pick = new.into_pick(id, created_at, posted_at);
                *current = Some(pick.clone());
                Ok(pick)
            }
            Slots::List(picks) => {
                let (id, created_at, posted_at) = self.clock.stamp();
                let pick = new.into_pick(id, created_at, posted_at);
                picks.insert(pick.id.clone(), pick.clone());
                Ok(pick)
            }
        }
    }

    async fn list(&self) -> Result<Vec<Pick>> {
        match &self.slots {
            Slots::Singleton(slot) => Ok(slot.read().await.iter().cloned().collect()),
            Slots::List(picks) => {
                let mut all: Vec<Pick> = picks.iter().map(|e| e.value().clone()).collect();
                all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(all)
            }
        }
    }

    async fn patch_result(&self, id: &str, result: BetResult) -> Result<Pick> {
        match &self.slots {
            Slots::Singleton(slot) => {
                let mut current = slot.write().await;
                match current.as_mut() {
                    Some(pick) if pick.id == id => {
                        pick.result = result;
                        Ok(pick.clone())
                    }
                    _ => Err(pick_not_found(id)),
                }
            }
            Slots::List(picks) => {
                let mut pick = picks.get_mut(id).ok_or_else(|| pick_not_found(id))?;
                pick.result = result;
                Ok(pick.clone())
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match &self.slots {
            Slots::Singleton(slot) => {
                let mut current = slot.write().await;
                if current.as_ref().is_some_and(|p| p.id == id) {
                    *current = None;
                    Ok(())
                } else {
                    Err(pick_not_found(id))
                }
            }
            Slots::List(picks) => picks.remove(id).map(|_| ()).ok_or_else(|| pick_not_found(id)),
        }
    }

    async fn clear_current(&self) -> Result<Pick> {
        match &self.slots {
            Slots::Singleton(slot) => slot.write().await.take().ok_or_else(no_current_pick),
            Slots::List(_) => Err(requires_id()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
