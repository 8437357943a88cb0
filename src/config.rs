use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::{FeedMode, OddsSign, Tier};

pub const ORACLE_API_URL: &str = "https://api.whop.com/api/v1";
pub const SLIP_READER_URL: &str = "https://api.anthropic.com/v1/messages";
pub const SLIP_READER_MODEL: &str = "claude-sonnet-4-20250514";
pub const SLIP_READER_API_VERSION: &str = "2023-06-01";

/// Header carrying the viewer's signed user token.
pub const USER_TOKEN_HEADER: &str = "x-whop-user-token";

/// Header carrying the operator secret (singleton feed only).
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Timezone `postedAt` is rendered in.
pub const POSTED_AT_TZ: chrono_tz::Tz = chrono_tz::America::New_York;

/// Per-call timeout for Access Oracle requests (milliseconds).
pub const ORACLE_TIMEOUT_MS: u64 = 3_000;

/// Timeout for a single Slip Reader call (seconds). Vision calls are slow.
pub const SLIP_READER_TIMEOUT_SECS: u64 = 60;

/// Upper bound on request bodies; slip images arrive inline as base64.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Redaction placeholders shown to viewers without access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskSentinels {
    pub title: String,
    pub odds: String,
    pub matchup: String,
}

impl Default for MaskSentinels {
    fn default() -> Self {
        Self {
            title: "LOCKED PICK".to_string(),
            odds: "LOCKED".to_string(),
            matchup: "LOCKED".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Feed-variant knobs shared by the endpoint and the store.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub mode: FeedMode,
    pub default_odds_sign: OddsSign,
    pub sentinels: MaskSentinels,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            mode: FeedMode::List,
            default_odds_sign: OddsSign::Minus,
            sentinels: MaskSentinels::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    pub feed: FeedSettings,
    pub store_backend: StoreBackend,
    pub db_path: String,
    /// Operator identifier queried for the admin access level (COMPANY_ID)
    pub company_id: String,
    /// Named tiers and their product ids, in no particular order (TIER_PRODUCTS).
    /// Example: "HIGH_ROLLERS=prod_abc,PREMIUM=prod_def"
    pub tier_products: Vec<(Tier, String)>,
    /// Products granting full pick visibility (PREMIUM_PRODUCT_IDS)
    pub premium_product_ids: Vec<String>,
    pub oracle_api_url: String,
    pub oracle_api_key: Option<String>,
    pub oracle_app_public_key: Option<String>,
    pub oracle_app_id: Option<String>,
    pub oracle_timeout: Duration,
    pub admin_secret: Option<String>,
    pub slip_reader_url: String,
    pub slip_reader_model: String,
    pub slip_reader_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tier_products = parse_tier_products(&std::env::var("TIER_PRODUCTS").unwrap_or_default())?;
        let premium_product_ids = match std::env::var("PREMIUM_PRODUCT_IDS") {
            Ok(raw) => split_list(&raw),
            Err(_) => default_premium_products(&tier_products),
        };

        let mode = std::env::var("FEED_MODE")
            .unwrap_or_else(|_| "list".to_string())
            .parse::<FeedMode>()
            .map_err(AppError::Config)?;
        let default_odds_sign = std::env::var("DEFAULT_ODDS_SIGN")
            .unwrap_or_else(|_| "-".to_string())
            .parse::<OddsSign>()
            .map_err(AppError::Config)?;

        let defaults = MaskSentinels::default();
        let sentinels = MaskSentinels {
            title: std::env::var("MASK_TITLE").unwrap_or(defaults.title),
            odds: std::env::var("MASK_ODDS").unwrap_or(defaults.odds),
            matchup: std::env::var("MASK_MATCHUP").unwrap_or(defaults.matchup),
        };

        let store_backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "sqlite" => StoreBackend::Sqlite,
            other => {
                return Err(AppError::Config(format!(
                    "STORE_BACKEND must be 'memory' or 'sqlite', got '{other}'"
                )))
            }
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            feed: FeedSettings { mode, default_odds_sign, sentinels },
            store_backend,
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "picks.db".to_string()),
            company_id: std::env::var("COMPANY_ID")
                .map_err(|_| AppError::Config("COMPANY_ID must be set".to_string()))?,
            tier_products,
            premium_product_ids,
            oracle_api_url: std::env::var("ORACLE_API_URL")
                .unwrap_or_else(|_| ORACLE_API_URL.to_string()),
            oracle_api_key: non_empty_var("ORACLE_API_KEY"),
            oracle_app_public_key: non_empty_var("ORACLE_APP_PUBLIC_KEY"),
            oracle_app_id: non_empty_var("ORACLE_APP_ID"),
            oracle_timeout: parse_timeout_ms(
                &std::env::var("ORACLE_TIMEOUT_MS").unwrap_or_else(|_| ORACLE_TIMEOUT_MS.to_string()),
            )?,
            admin_secret: non_empty_var("ADMIN_SECRET"),
            slip_reader_url: std::env::var("SLIP_READER_URL")
                .unwrap_or_else(|_| SLIP_READER_URL.to_string()),
            slip_reader_model: std::env::var("SLIP_READER_MODEL")
                .unwrap_or_else(|_| SLIP_READER_MODEL.to_string()),
            slip_reader_api_key: non_empty_var("ANTHROPIC_API_KEY"),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Per-call oracle timeout. Zero would time out every check, so it is rejected.
pub fn parse_timeout_ms(raw: &str) -> Result<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(AppError::Config("ORACLE_TIMEOUT_MS must be greater than 0".to_string())),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(_) => Err(AppError::Config(format!(
            "ORACLE_TIMEOUT_MS must be a whole number of milliseconds, got '{raw}'"
        ))),
    }
}

/// Parses `TIER=product_id` pairs. Unknown tier names are a config error.
pub fn parse_tier_products(raw: &str) -> Result<Vec<(Tier, String)>> {
    split_list(raw)
        .into_iter()
        .map(|pair| {
            let (name, product) = pair.split_once('=').ok_or_else(|| {
                AppError::Config(format!("TIER_PRODUCTS entry '{pair}' is not TIER=product_id"))
            })?;
            let tier = name.trim().parse::<Tier>().map_err(AppError::Config)?;
            let product = product.trim();
            if product.is_empty() {
                return Err(AppError::Config(format!("TIER_PRODUCTS entry '{pair}' has no product id")));
            }
            Ok((tier, product.to_string()))
        })
        .collect()
}

/// Without an explicit list, the two top tiers grant full visibility.
pub fn default_premium_products(tier_products: &[(Tier, String)]) -> Vec<String> {
    tier_products
        .iter()
        .filter(|(tier, _)| matches!(tier, Tier::HighRollers | Tier::Premium))
        .map(|(_, product)| product.clone())
        .collect()
}
