use serde::{Deserialize, Serialize};

use crate::config::FeedSettings;
use crate::error::{AppError, FieldError, Result};

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetType {
    #[serde(rename = "SPREAD")]
    Spread,
    #[serde(rename = "MONEYLINE")]
    Moneyline,
    #[serde(rename = "OVER/UNDER")]
    OverUnder,
    #[serde(rename = "ALTERNATE SPREAD")]
    AlternateSpread,
    #[serde(rename = "PLAYER PROP")]
    PlayerProp,
    #[serde(rename = "FIRST HALF SPREAD")]
    FirstHalfSpread,
    #[serde(rename = "FIRST HALF ML")]
    FirstHalfMl,
    #[serde(rename = "GAME TOTAL")]
    GameTotal,
}

impl BetType {
    pub const ALL: [BetType; 8] = [
        BetType::Spread,
        BetType::Moneyline,
        BetType::OverUnder,
        BetType::AlternateSpread,
        BetType::PlayerProp,
        BetType::FirstHalfSpread,
        BetType::FirstHalfMl,
        BetType::GameTotal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::Spread => "SPREAD",
            BetType::Moneyline => "MONEYLINE",
            BetType::OverUnder => "OVER/UNDER",
            BetType::AlternateSpread => "ALTERNATE SPREAD",
            BetType::PlayerProp => "PLAYER PROP",
            BetType::FirstHalfSpread => "FIRST HALF SPREAD",
            BetType::FirstHalfMl => "FIRST HALF ML",
            BetType::GameTotal => "GAME TOTAL",
        }
    }
}

impl std::fmt::Display for BetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BetType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        BetType::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown bet type '{wanted}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sport {
    #[serde(rename = "NCAAB")]
    Ncaab,
    #[serde(rename = "NBA")]
    Nba,
    #[serde(rename = "NFL")]
    Nfl,
    #[serde(rename = "NCAAF")]
    Ncaaf,
    #[serde(rename = "NHL")]
    Nhl,
    #[serde(rename = "MLB")]
    Mlb,
    Soccer,
    #[serde(rename = "UFC")]
    Ufc,
    Tennis,
}

impl Sport {
    pub const ALL: [Sport; 9] = [
        Sport::Ncaab,
        Sport::Nba,
        Sport::Nfl,
        Sport::Ncaaf,
        Sport::Nhl,
        Sport::Mlb,
        Sport::Soccer,
        Sport::Ufc,
        Sport::Tennis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Ncaab => "NCAAB",
            Sport::Nba => "NBA",
            Sport::Nfl => "NFL",
            Sport::Ncaaf => "NCAAF",
            Sport::Nhl => "NHL",
            Sport::Mlb => "MLB",
            Sport::Soccer => "Soccer",
            Sport::Ufc => "UFC",
            Sport::Tennis => "Tennis",
        }
    }
}

impl std::fmt::Display for Sport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        Sport::ALL
            .into_iter()
            .find(|sp| sp.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown sport '{wanted}'"))
    }
}

/// Grading state of a pick. Starts `Pending`; only an admin PATCH moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    #[default]
    Pending,
    Win,
    Loss,
    Push,
}

impl std::fmt::Display for BetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BetResult::Pending => "pending",
            BetResult::Win => "win",
            BetResult::Loss => "loss",
            BetResult::Push => "push",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for BetResult {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BetResult::Pending),
            "win" => Ok(BetResult::Win),
            "loss" => Ok(BetResult::Loss),
            "push" => Ok(BetResult::Push),
            other => Err(format!("unknown result '{other}'")),
        }
    }
}

/// Storage shape of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// At most one current pick ("max bet"); POST replaces, DELETE clears.
    Singleton,
    /// Unbounded newest-first list ("straight bets" / "dog of the day").
    List,
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedMode::Singleton => write!(f, "singleton"),
            FeedMode::List => write!(f, "list"),
        }
    }
}

impl std::str::FromStr for FeedMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "singleton" => Ok(FeedMode::Singleton),
            "list" => Ok(FeedMode::List),
            other => Err(format!("FEED_MODE must be 'singleton' or 'list', got '{other}'")),
        }
    }
}

/// Sign given to odds entered without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsSign {
    Plus,
    Minus,
}

impl OddsSign {
    fn as_char(self) -> char {
        match self {
            OddsSign::Plus => '+',
            OddsSign::Minus => '-',
        }
    }
}

impl std::str::FromStr for OddsSign {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "+" | "plus" => Ok(OddsSign::Plus),
            "-" | "minus" => Ok(OddsSign::Minus),
            other => Err(format!("DEFAULT_ODDS_SIGN must be '+' or '-', got '{other}'")),
        }
    }
}

/// Named subscription tiers, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    HighRollers,
    Premium,
    PlayerProps,
    MaxBetPotd,
    Free,
}

impl Tier {
    pub const PRIORITY: [Tier; 5] = [
        Tier::HighRollers,
        Tier::Premium,
        Tier::PlayerProps,
        Tier::MaxBetPotd,
        Tier::Free,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::HighRollers => "HIGH_ROLLERS",
            Tier::Premium => "PREMIUM",
            Tier::PlayerProps => "PLAYER_PROPS",
            Tier::MaxBetPotd => "MAX_BET_POTD",
            Tier::Free => "FREE",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        Tier::PRIORITY
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown tier '{wanted}'"))
    }
}

// ---------------------------------------------------------------------------
// Pick
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub id: String,
    pub title: String,
    pub bet_type: Option<BetType>,
    pub odds: Option<String>,
    pub matchup: Option<String>,
    /// RFC 3339 instant on the singleton feed, display text on list feeds.
    pub time: String,
    pub sport: Option<Sport>,
    pub result: BetResult,
    /// `data:image/...;base64,` URI of the bet slip.
    pub slip_image: Option<String>,
    pub description: Option<String>,
    pub posted_at: String,
    /// Milliseconds since the Unix epoch. Sort key, newest first.
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<f64>,
}

/// Validated create input. The store stamps id, result and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPick {
    pub title: String,
    pub bet_type: Option<BetType>,
    pub odds: Option<String>,
    pub matchup: Option<String>,
    pub time: String,
    pub sport: Option<Sport>,
    pub slip_image: Option<String>,
    pub description: Option<String>,
    pub units: Option<f64>,
}

impl NewPick {
    pub fn into_pick(self, id: String, created_at: i64, posted_at: String) -> Pick {
        Pick {
            id,
            title: self.title,
            bet_type: self.bet_type,
            odds: self.odds,
            matchup: self.matchup,
            time: self.time,
            sport: self.sport,
            result: BetResult::Pending,
            slip_image: self.slip_image,
            description: self.description,
            posted_at,
            created_at,
            units: self.units,
        }
    }
}

/// Raw POST body. Field names follow both feed variants' clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickDraft {
    #[serde(alias = "team")]
    pub title: Option<String>,
    pub bet_type: Option<String>,
    pub odds: Option<String>,
    pub matchup: Option<String>,
    #[serde(alias = "gameTime")]
    pub time: Option<String>,
    pub sport: Option<String>,
    #[serde(alias = "image", alias = "imageBase64")]
    pub slip_image: Option<String>,
    pub description: Option<String>,
    pub units: Option<f64>,
}

const MAX_TITLE_LEN: usize = 200;

impl PickDraft {
    /// Checks every field and reports all problems at once.
    pub fn validate(self, feed: &FeedSettings) -> Result<NewPick> {
        let mut errors = Vec::new();
        let list_mode = feed.mode == FeedMode::List;

        let title = trimmed(self.title);
        match &title {
            None => errors.push(FieldError::new("title", "is required")),
            Some(t) if t.chars().count() > MAX_TITLE_LEN => {
                errors.push(FieldError::new("title", format!("must be at most {MAX_TITLE_LEN} characters")))
            }
            Some(_) => {}
        }

        let time = trimmed(self.time);
        match &time {
            None => errors.push(FieldError::new("time", "is required")),
            Some(t) if feed.mode == FeedMode::Singleton => {
                if chrono::DateTime::parse_from_rfc3339(t).is_err() {
                    errors.push(FieldError::new("time", "must be an RFC 3339 instant"));
                }
            }
            Some(_) => {}
        }

        let bet_type = match trimmed(self.bet_type) {
            None => None,
            Some(raw) => match raw.parse::<BetType>() {
                Ok(b) => Some(b),
                Err(e) => {
                    errors.push(FieldError::new("betType", e));
                    None
                }
            },
        };

        let odds = match trimmed(self.odds) {
            None => {
                if list_mode {
                    errors.push(FieldError::new("odds", "is required"));
                }
                None
            }
            Some(raw) => match normalize_odds(&raw, feed.default_odds_sign) {
                Ok(o) => Some(o),
                Err(e) => {
                    errors.push(FieldError::new("odds", e));
                    None
                }
            },
        };

        let matchup = trimmed(self.matchup);
        if matchup.is_none() && list_mode {
            errors.push(FieldError::new("matchup", "is required"));
        }

        let sport = match trimmed(self.sport) {
            None => {
                if list_mode {
                    errors.push(FieldError::new("sport", "is required"));
                }
                None
            }
            Some(raw) => match raw.parse::<Sport>() {
                Ok(s) => Some(s),
                Err(e) => {
                    errors.push(FieldError::new("sport", e));
                    None
                }
            },
        };

        let slip_image = trimmed(self.slip_image);
        if let Some(img) = &slip_image {
            if !is_image_data_uri(img) {
                errors.push(FieldError::new("slipImage", "must be a base64 image data URI"));
            }
        }

        let units = if list_mode {
            match self.units {
                None => Some(1.0),
                Some(u) if u.is_finite() && u > 0.0 => Some(u),
                Some(_) => {
                    errors.push(FieldError::new("units", "must be a positive number"));
                    None
                }
            }
        } else {
            None
        };

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(NewPick {
            title: title.unwrap_or_default(),
            bet_type,
            odds,
            matchup,
            time: time.unwrap_or_default(),
            sport,
            slip_image,
            description: trimmed(self.description),
            units,
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn is_image_data_uri(s: &str) -> bool {
    s.strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .is_some_and(|(subtype, payload)| !subtype.is_empty() && !payload.is_empty())
}

/// Normalizes American odds to an explicit sign followed by digits.
/// Bare numbers take `default_sign`; "EVEN"/"EV" become "+100".
pub fn normalize_odds(raw: &str, default_sign: OddsSign) -> std::result::Result<String, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("even") || raw.eq_ignore_ascii_case("ev") {
        return Ok("+100".to_string());
    }
    let (sign, digits) = match raw.chars().next() {
        Some(c @ ('+' | '-')) => (c, raw[1..].trim()),
        _ => (default_sign.as_char(), raw),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{raw}' is not American odds like -110 or +150"));
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Err("odds cannot be zero".to_string());
    }
    Ok(format!("{sign}{digits}"))
}

/// Profit on `stake` at American `odds`; None if the odds don't parse.
pub fn american_profit(odds: &str, stake: f64) -> Option<f64> {
    let value: i64 = odds.trim().trim_start_matches('+').parse().ok()?;
    match value {
        0 => None,
        v if v < 0 => Some(stake * 100.0 / v.unsigned_abs() as f64),
        v => Some(stake * v as f64 / 100.0),
    }
}

// ---------------------------------------------------------------------------
// Viewer classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub user_id: Option<String>,
    pub is_admin: bool,
    pub has_entitlement: bool,
    pub tier: Tier,
}

impl Viewer {
    /// Most restrictive classification; also the fail-closed result.
    pub fn anonymous() -> Self {
        Self { user_id: None, is_admin: false, has_entitlement: false, tier: Tier::Free }
    }

    pub fn sees_everything(&self) -> bool {
        self.is_admin || self.has_entitlement
    }
}

// ---------------------------------------------------------------------------
// View model
// ---------------------------------------------------------------------------

/// What a particular viewer receives for one pick. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickView {
    #[serde(flatten)]
    pub pick: Pick,
    pub locked: bool,
}

// ---------------------------------------------------------------------------
// Track record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub pending: usize,
    /// Wins over decided (win + loss) picks, as a percentage.
    pub win_pct: Option<f64>,
    /// Profit in units. Derived from the odds, so only viewers who may see
    /// odds get it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_units: Option<f64>,
}

impl Record {
    pub fn tally(picks: &[Pick]) -> Self {
        let mut record = Record::default();
        let mut net_units = 0.0;
        for pick in picks {
            let units = pick.units.unwrap_or(1.0);
            match pick.result {
                BetResult::Pending => record.pending += 1,
                BetResult::Push => record.pushes += 1,
                BetResult::Win => {
                    record.wins += 1;
                    let odds = pick.odds.as_deref().unwrap_or("-110");
                    net_units += american_profit(odds, units).unwrap_or(0.0);
                }
                BetResult::Loss => {
                    record.losses += 1;
                    net_units -= units;
                }
            }
        }
        let decided = record.wins + record.losses;
        if decided > 0 {
            record.win_pct = Some(round2(record.wins as f64 * 100.0 / decided as f64));
        }
        record.net_units = Some(round2(net_units));
        record
    }

    /// Counts and win rate only.
    pub fn without_units(self) -> Self {
        Self { net_units: None, ..self }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_feed() -> FeedSettings {
        FeedSettings::default()
    }

    fn singleton_feed() -> FeedSettings {
        FeedSettings { mode: FeedMode::Singleton, ..FeedSettings::default() }
    }

    fn full_draft() -> PickDraft {
        PickDraft {
            title: Some("Duke -9.5".into()),
            bet_type: Some("SPREAD".into()),
            odds: Some("-110".into()),
            matchup: Some("Clemson @ Duke".into()),
            time: Some("8:00PM ET".into()),
            sport: Some("NCAAB".into()),
            ..PickDraft::default()
        }
    }

    fn rejected_fields(err: AppError) -> Vec<&'static str> {
        match err {
            AppError::Validation(fields) => fields.into_iter().map(|f| f.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn bare_odds_take_the_feed_default_sign() {
        assert_eq!(normalize_odds("110", OddsSign::Minus).unwrap(), "-110");
        assert_eq!(normalize_odds("150", OddsSign::Plus).unwrap(), "+150");
        assert_eq!(normalize_odds("+150", OddsSign::Minus).unwrap(), "+150");
        assert_eq!(normalize_odds(" -192 ", OddsSign::Plus).unwrap(), "-192");
        assert_eq!(normalize_odds("even", OddsSign::Minus).unwrap(), "+100");
    }

    #[test]
    fn garbage_odds_are_rejected() {
        assert!(normalize_odds("abc", OddsSign::Minus).is_err());
        assert!(normalize_odds("-", OddsSign::Minus).is_err());
        assert!(normalize_odds("-1.5", OddsSign::Minus).is_err());
        assert!(normalize_odds("000", OddsSign::Minus).is_err());
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("over/under".parse::<BetType>().unwrap(), BetType::OverUnder);
        assert_eq!("First Half ML".parse::<BetType>().unwrap(), BetType::FirstHalfMl);
        assert_eq!("soccer".parse::<Sport>().unwrap(), Sport::Soccer);
        assert_eq!("WIN".parse::<BetResult>().unwrap(), BetResult::Win);
        assert!("cricket".parse::<Sport>().is_err());
    }

    #[test]
    fn bet_type_serializes_with_display_names() {
        let json = serde_json::to_string(&BetType::AlternateSpread).unwrap();
        assert_eq!(json, "\"ALTERNATE SPREAD\"");
    }

    #[test]
    fn list_draft_validates_and_defaults_units() {
        let new = full_draft().validate(&list_feed()).unwrap();
        assert_eq!(new.title, "Duke -9.5");
        assert_eq!(new.bet_type, Some(BetType::Spread));
        assert_eq!(new.sport, Some(Sport::Ncaab));
        assert_eq!(new.units, Some(1.0));
    }

    #[test]
    fn list_draft_reports_every_missing_field() {
        let fields = rejected_fields(PickDraft::default().validate(&list_feed()).unwrap_err());
        for f in ["title", "time", "odds", "matchup", "sport"] {
            assert!(fields.contains(&f), "missing {f} in {fields:?}");
        }
    }

    #[test]
    fn singleton_draft_needs_only_title_and_instant() {
        let draft = PickDraft {
            title: Some("Lakers ML".into()),
            time: Some("2025-01-10T20:00:00Z".into()),
            ..PickDraft::default()
        };
        let new = draft.validate(&singleton_feed()).unwrap();
        assert_eq!(new.units, None);
        assert_eq!(new.odds, None);
    }

    #[test]
    fn singleton_draft_rejects_free_text_time() {
        let draft = PickDraft {
            title: Some("Lakers ML".into()),
            time: Some("8:00PM ET".into()),
            ..PickDraft::default()
        };
        assert_eq!(rejected_fields(draft.validate(&singleton_feed()).unwrap_err()), vec!["time"]);
    }

    #[test]
    fn slip_image_must_be_a_data_uri() {
        let mut draft = full_draft();
        draft.slip_image = Some("https://example.com/slip.png".into());
        assert_eq!(rejected_fields(draft.validate(&list_feed()).unwrap_err()), vec!["slipImage"]);

        let mut draft = full_draft();
        draft.slip_image = Some("data:image/png;base64,iVBORw0KGgo=".into());
        assert!(draft.validate(&list_feed()).is_ok());
    }

    #[test]
    fn draft_accepts_team_and_game_time_aliases() {
        let draft: PickDraft = serde_json::from_value(serde_json::json!({
            "team": "Celtics -4",
            "gameTime": "7:30PM ET",
            "imageBase64": "data:image/jpeg;base64,/9j/4AAQ",
        }))
        .unwrap();
        assert_eq!(draft.title.as_deref(), Some("Celtics -4"));
        assert_eq!(draft.time.as_deref(), Some("7:30PM ET"));
        assert!(draft.slip_image.is_some());
    }

    #[test]
    fn american_profit_follows_sign() {
        assert!((american_profit("-110", 1.0).unwrap() - 0.9090909).abs() < 1e-6);
        assert!((american_profit("+150", 2.0).unwrap() - 3.0).abs() < 1e-9);
        assert!(american_profit("LOCKED", 1.0).is_none());
    }

    #[test]
    fn record_tallies_results_and_units() {
        let base = full_draft().validate(&list_feed()).unwrap();
        let mk = |odds: &str, result: BetResult, units: f64| {
            let mut p = base.clone().into_pick("p".into(), 0, "now".into());
            p.odds = Some(odds.to_string());
            p.result = result;
            p.units = Some(units);
            p
        };
        let picks = vec![
            mk("+150", BetResult::Win, 2.0),
            mk("-110", BetResult::Loss, 1.0),
            mk("-110", BetResult::Push, 1.0),
            mk("-110", BetResult::Pending, 1.0),
        ];
        let record = Record::tally(&picks);
        assert_eq!((record.wins, record.losses, record.pushes, record.pending), (1, 1, 1, 1));
        assert_eq!(record.win_pct, Some(50.0));
        assert_eq!(record.net_units, Some(2.0));
        assert_eq!(record.clone().without_units().net_units, None);
        assert_eq!(record.without_units().wins, 1);
    }

    #[test]
    fn empty_record_has_no_win_pct() {
        assert_eq!(Record::tally(&[]).win_pct, None);
    }
}
