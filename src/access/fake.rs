//! In-process oracle for tests. The user token is the user id itself.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::access::oracle::{extract_token, AccessCheck, AccessLevel, AccessOracle};
use crate::error::{AppError, Result};

#[derive(Default)]
pub struct FakeOracle {
    users: HashSet<String>,
    admins: HashSet<(String, String)>,
    grants: HashSet<(String, String)>,
    failing: HashSet<String>,
    slow: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: &str) -> Self {
        self.users.insert(user.to_string());
        self
    }

    pub fn admin_of(mut self, company: &str, user: &str) -> Self {
        self.users.insert(user.to_string());
        self.admins.insert((company.to_string(), user.to_string()));
        self
    }

    pub fn grant(mut self, product: &str, user: &str) -> Self {
        self.users.insert(user.to_string());
        self.grants.insert((product.to_string(), user.to_string()));
        self
    }

    /// Checks against `resource` return an error.
    pub fn failing(mut self, resource: &str) -> Self {
        self.failing.insert(resource.to_string());
        self
    }

    /// Checks against `resource` never answer in time.
    pub fn slow(mut self, resource: &str) -> Self {
        self.slow.insert(resource.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AccessOracle for FakeOracle {
    async fn verify_user(&self, headers: &HeaderMap) -> Result<Option<String>> {
        match extract_token(headers) {
            None => Ok(None),
            Some(token) if self.users.contains(token) => Ok(Some(token.to_string())),
            Some(_) => Err(AppError::Unauthorized),
        }
    }

    async fn check_access(&self, resource_id: &str, user_id: &str) -> Result<AccessCheck> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.slow.contains(resource_id) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing.contains(resource_id) {
            return Err(AppError::Upstream(format!("{resource_id} unavailable")));
        }
        let key = (resource_id.to_string(), user_id.to_string());
        if self.admins.contains(&key) {
            return Ok(AccessCheck { has_access: true, access_level: AccessLevel::Admin });
        }
        if self.grants.contains(&key) {
            return Ok(AccessCheck { has_access: true, access_level: AccessLevel::Customer });
        }
        Ok(AccessCheck { has_access: false, access_level: AccessLevel::NoAccess })
    }
}
