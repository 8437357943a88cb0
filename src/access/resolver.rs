use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use futures_util::future::join_all;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::access::oracle::{AccessCheck, AccessLevel, AccessOracle};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{Config, ADMIN_SECRET_HEADER};
use crate::error::Result;
use crate::types::{FeedMode, Tier, Viewer};

/// User id reported for requests admitted by the operator secret.
pub const OPERATOR_USER_ID: &str = "operator";

/// Who counts as admin or entitled, and how long to wait for the oracle.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub company_id: String,
    pub tier_products: Vec<(Tier, String)>,
    pub premium_products: Vec<String>,
    pub call_timeout: Duration,
    /// Operator secret accepted via `x-admin-secret`. Only set on singleton feeds.
    pub admin_secret: Option<String>,
}

impl AccessPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            company_id: cfg.company_id.clone(),
            tier_products: cfg.tier_products.clone(),
            premium_products: cfg.premium_product_ids.clone(),
            call_timeout: cfg.oracle_timeout,
            admin_secret: match cfg.feed.mode {
                FeedMode::Singleton => cfg.admin_secret.clone(),
                FeedMode::List => None,
            },
        }
    }

    /// Distinct product ids whose access must be known for one request.
    fn products(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.premium_products
            .iter()
            .map(String::as_str)
            .chain(self.tier_products.iter().map(|(_, p)| p.as_str()))
            .filter(|p| seen.insert(*p))
            .collect()
    }
}

/// Turns request credentials into a [`Viewer`]. Every call re-asks the
/// oracle; nothing is cached between requests.
pub struct AccessResolver {
    oracle: Arc<dyn AccessOracle>,
    policy: AccessPolicy,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl AccessResolver {
    pub fn new(
        oracle: Arc<dyn AccessOracle>,
        policy: AccessPolicy,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self { oracle, policy, health, latency }
    }

    /// Never fails: any verification error yields [`Viewer::anonymous`].
    pub async fn resolve(&self, headers: &HeaderMap) -> Viewer {
        let started = Instant::now();
        let viewer = self.classify(headers).await;
        self.latency.record(started.elapsed());
        viewer
    }

    async fn classify(&self, headers: &HeaderMap) -> Viewer {
        if self.operator_secret_matches(headers) {
            return Viewer {
                user_id: Some(OPERATOR_USER_ID.to_string()),
                is_admin: true,
                has_entitlement: false,
                tier: Tier::Free,
            };
        }

        let user_id = match self.bounded("token", self.oracle.verify_user(headers)).await {
            Some(Some(id)) => id,
            _ => return Viewer::anonymous(),
        };

        let products = self.policy.products();
        let admin_check = self.bounded(&self.policy.company_id, self.oracle.check_access(&self.policy.company_id, &user_id));
        let product_checks = join_all(products.iter().map(|product| {
            let user_id = &user_id;
            async move {
                let check = self.bounded(product, self.oracle.check_access(product, user_id)).await;
                (*product, check.is_some_and(|c| c.has_access))
            }
        }));
        let (admin, product_access) = tokio::join!(admin_check, product_checks);

        let granted: HashSet<&str> = product_access
            .into_iter()
            .filter(|(_, has)| *has)
            .map(|(p, _)| p)
            .collect();

        let is_admin = admin.is_some_and(|c: AccessCheck| c.access_level == AccessLevel::Admin);
        let has_entitlement = self.policy.premium_products.iter().any(|p| granted.contains(p.as_str()));
        let tier = Tier::PRIORITY
            .into_iter()
            .find(|tier| {
                self.policy
                    .tier_products
                    .iter()
                    .any(|(t, p)| t == tier && granted.contains(p.as_str()))
            })
            .unwrap_or(Tier::Free);

        debug!(user_id = %user_id, is_admin, has_entitlement, tier = %tier, "viewer classified");
        Viewer { user_id: Some(user_id), is_admin, has_entitlement, tier }
    }

    fn operator_secret_matches(&self, headers: &HeaderMap) -> bool {
        let Some(secret) = &self.policy.admin_secret else {
            return false;
        };
        headers
            .get(ADMIN_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|given| bool::from(given.as_bytes().ct_eq(secret.as_bytes())))
    }

    /// Runs one oracle call under the per-call timeout. Failures only cost
    /// this call's answer.
    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Option<T> {
        match tokio::time::timeout(self.policy.call_timeout, call).await {
            Ok(Ok(v)) => Some(v),
            Ok(Err(e)) => {
                warn!(resource = what, error = %e, "access oracle call failed");
                self.health.inc_oracle_failures();
                None
            }
            Err(_) => {
                warn!(resource = what, timeout_ms = self.policy.call_timeout.as_millis() as u64, "access oracle call timed out");
                self.health.inc_oracle_failures();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::fake::FakeOracle;
    use crate::config::USER_TOKEN_HEADER;
    use axum::http::HeaderValue;

    const COMPANY: &str = "biz_operator";

    fn policy() -> AccessPolicy {
        AccessPolicy {
            company_id: COMPANY.to_string(),
            tier_products: vec![
                (Tier::HighRollers, "prod_hr".to_string()),
                (Tier::Premium, "prod_premium".to_string()),
                (Tier::PlayerProps, "prod_props".to_string()),
                (Tier::MaxBetPotd, "prod_maxbet".to_string()),
            ],
            premium_products: vec!["prod_hr".to_string(), "prod_premium".to_string()],
            call_timeout: Duration::from_millis(100),
            admin_secret: None,
        }
    }

    fn resolver(oracle: FakeOracle, policy: AccessPolicy) -> (AccessResolver, Arc<HealthState>) {
        let health = Arc::new(HealthState::new());
        let r = AccessResolver::new(Arc::new(oracle), policy, Arc::clone(&health), Arc::new(LatencyStats::new()));
        (r, health)
    }

    fn token(user: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_TOKEN_HEADER, HeaderValue::from_str(user).unwrap());
        headers
    }

    #[tokio::test]
    async fn missing_token_is_anonymous() {
        let (r, _) = resolver(FakeOracle::new(), policy());
        assert_eq!(r.resolve(&HeaderMap::new()).await, Viewer::anonymous());
    }

    #[tokio::test]
    async fn bad_token_fails_closed() {
        let (r, health) = resolver(FakeOracle::new().user("user_a"), policy());
        assert_eq!(r.resolve(&token("forged")).await, Viewer::anonymous());
        assert_eq!(health.oracle_failures(), 1);
    }

    #[tokio::test]
    async fn plain_member_is_free_and_not_entitled() {
        let (r, _) = resolver(FakeOracle::new().user("user_a"), policy());
        let v = r.resolve(&token("user_a")).await;
        assert_eq!(v.user_id.as_deref(), Some("user_a"));
        assert!(!v.is_admin);
        assert!(!v.has_entitlement);
        assert_eq!(v.tier, Tier::Free);
    }

    #[tokio::test]
    async fn company_admin_is_admin() {
        let (r, _) = resolver(FakeOracle::new().admin_of(COMPANY, "user_admin"), policy());
        let v = r.resolve(&token("user_admin")).await;
        assert!(v.is_admin);
        assert!(v.sees_everything());
    }

    #[tokio::test]
    async fn highest_named_tier_wins() {
        let oracle = FakeOracle::new()
            .grant("prod_maxbet", "user_a")
            .grant("prod_premium", "user_a");
        let (r, _) = resolver(oracle, policy());
        let v = r.resolve(&token("user_a")).await;
        assert_eq!(v.tier, Tier::Premium);
        assert!(v.has_entitlement);
    }

    #[tokio::test]
    async fn lower_tier_alone_is_not_entitled() {
        let (r, _) = resolver(FakeOracle::new().grant("prod_props", "user_a"), policy());
        let v = r.resolve(&token("user_a")).await;
        assert_eq!(v.tier, Tier::PlayerProps);
        assert!(!v.has_entitlement);
    }

    #[tokio::test]
    async fn failing_or_slow_product_does_not_block_others() {
        let oracle = FakeOracle::new()
            .grant("prod_premium", "user_a")
            .failing("prod_hr")
            .slow("prod_props");
        let (r, health) = resolver(oracle, policy());

        let started = Instant::now();
        let v = r.resolve(&token("user_a")).await;

        assert!(v.has_entitlement);
        assert_eq!(v.tier, Tier::Premium);
        assert_eq!(health.oracle_failures(), 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn failing_admin_check_is_not_admin() {
        let oracle = FakeOracle::new().admin_of(COMPANY, "user_admin").failing(COMPANY);
        let (r, _) = resolver(oracle, policy());
        let v = r.resolve(&token("user_admin")).await;
        assert_eq!(v.user_id.as_deref(), Some("user_admin"));
        assert!(!v.is_admin);
    }

    #[tokio::test]
    async fn shared_products_are_checked_once() {
        let oracle = Arc::new(FakeOracle::new().user("user_a"));
        let r = AccessResolver::new(
            oracle.clone(),
            policy(),
            Arc::new(HealthState::new()),
            Arc::new(LatencyStats::new()),
        );
        r.resolve(&token("user_a")).await;
        // company + 4 distinct products
        assert_eq!(oracle.calls(), 5);
    }

    #[tokio::test]
    async fn operator_secret_grants_admin_without_oracle() {
        let oracle = Arc::new(FakeOracle::new());
        let r = AccessResolver::new(
            oracle.clone(),
            AccessPolicy { admin_secret: Some("s3cret".into()), ..policy() },
            Arc::new(HealthState::new()),
            Arc::new(LatencyStats::new()),
        );
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        let v = r.resolve(&headers).await;
        assert!(v.is_admin);
        assert_eq!(oracle.calls(), 0);

        headers.insert(ADMIN_SECRET_HEADER, HeaderValue::from_static("wrong"));
        assert_eq!(r.resolve(&headers).await, Viewer::anonymous());
    }
}
