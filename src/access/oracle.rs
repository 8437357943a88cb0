use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, USER_TOKEN_HEADER};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Admin,
    Customer,
    #[serde(other)]
    NoAccess,
}

/// Oracle answer for one (resource, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AccessCheck {
    pub has_access: bool,
    #[serde(default = "no_access")]
    pub access_level: AccessLevel,
}

fn no_access() -> AccessLevel {
    AccessLevel::NoAccess
}

/// External identity and entitlement provider.
#[async_trait]
pub trait AccessOracle: Send + Sync {
    /// User id behind the request's token. `Ok(None)` when no token was sent.
    async fn verify_user(&self, headers: &HeaderMap) -> Result<Option<String>>;

    /// Access of `user_id` to a company or product id.
    async fn check_access(&self, resource_id: &str, user_id: &str) -> Result<AccessCheck>;
}

/// User token from the oracle's header, falling back to a bearer token.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Deserialize)]
struct UserClaims {
    sub: String,
}

/// Oracle backed by the platform's REST API. User tokens are ES256 JWTs
/// checked locally against the app's public key.
pub struct HttpAccessOracle {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    decoding_key: Option<DecodingKey>,
    validation: Validation,
}

impl HttpAccessOracle {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.oracle_timeout.max(Duration::from_millis(100)))
            .build()?;

        // Keys pasted into env files usually carry literal "\n".
        let decoding_key = cfg
            .oracle_app_public_key
            .as_ref()
            .map(|pem| DecodingKey::from_ec_pem(pem.replace("\\n", "\n").as_bytes()))
            .transpose()?;

        let mut validation = Validation::new(Algorithm::ES256);
        match &cfg.oracle_app_id {
            Some(app_id) => validation.set_audience(&[app_id]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            client,
            api_url: cfg.oracle_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.oracle_api_key.clone(),
            decoding_key,
            validation,
        })
    }
}

#[async_trait]
impl AccessOracle for HttpAccessOracle {
    async fn verify_user(&self, headers: &HeaderMap) -> Result<Option<String>> {
        let Some(token) = extract_token(headers) else {
            return Ok(None);
        };
        let key = self
            .decoding_key
            .as_ref()
            .ok_or_else(|| AppError::Config("ORACLE_APP_PUBLIC_KEY not configured".to_string()))?;
        let data = decode::<UserClaims>(token, key, &self.validation)?;
        Ok(Some(data.claims.sub).filter(|s| !s.is_empty()))
    }

    async fn check_access(&self, resource_id: &str, user_id: &str) -> Result<AccessCheck> {
        let url = format!("{}/users/{}/access/{}", self.api_url, user_id, resource_id);
        let mut req = self.client.get(&url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("access check for {resource_id} returned {status}")));
        }
        let check: AccessCheck = resp.json().await?;
        debug!(resource_id, user_id, has_access = check.has_access, "access check");
        Ok(check)
    }
}
