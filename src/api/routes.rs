use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access::AccessResolver;
use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::{FeedSettings, MAX_BODY_BYTES};
use crate::error::{AppError, FieldError, Result};
use crate::gate::RedactionGate;
use crate::scan::{SlipFields, SlipImage, SlipReader};
use crate::state::PickStore;
use crate::types::{BetResult, FeedMode, Pick, PickDraft, PickView, Record, Tier, Viewer};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn PickStore>,
    pub resolver: Arc<AccessResolver>,
    pub gate: RedactionGate,
    pub reader: Arc<dyn SlipReader>,
    pub feed: FeedSettings,
    pub health: Arc<HealthState>,
    pub access_latency: Arc<LatencyStats>,
    pub scan_latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/picks",
            get(list_picks)
                .post(create_pick)
                .patch(patch_pick)
                .delete(delete_pick),
        )
        .route("/picks/record", get(get_record))
        .route("/scan", post(scan_slip))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request body structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ResultPatch {
    pub id: Option<String>,
    pub result: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct DeleteBody {
    pub id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(alias = "imageData")]
    pub image: Option<String>,
    pub media_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub items: Vec<PickView>,
    pub is_admin: bool,
    pub tier: Tier,
    pub has_access: bool,
    /// Singleton feed only: true when nothing is posted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_current_pick: Option<bool>,
}

#[derive(Serialize)]
pub struct PickResponse {
    pub pick: Pick,
    pub success: bool,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub success: bool,
    pub result: SlipFields,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub feed_mode: FeedMode,
    pub store: &'static str,
    pub picks: usize,
    pub oracle_failures: u64,
    pub scan_failures: u64,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub access: LatencySummary,
    pub scan: LatencySummary,
}

// ---------------------------------------------------------------------------
// Access helpers
// ---------------------------------------------------------------------------

/// Any identified viewer. Anonymous requests get 401.
async fn require_viewer(state: &ApiState, headers: &HeaderMap) -> Result<Viewer> {
    let viewer = state.resolver.resolve(headers).await;
    if viewer.user_id.is_none() {
        return Err(AppError::Unauthorized);
    }
    Ok(viewer)
}

/// Admins only. Resolved before the body is looked at, so a non-admin
/// learns nothing about what a valid body would be.
async fn require_admin(state: &ApiState, headers: &HeaderMap) -> Result<Viewer> {
    let viewer = state.resolver.resolve(headers).await;
    if !viewer.is_admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(viewer)
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(v)| v)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_picks(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<FeedResponse>> {
    let viewer = require_viewer(&state, &headers).await?;
    let picks = state.store.list().await?;

    let no_current_pick = match state.store.mode() {
        FeedMode::Singleton => Some(picks.is_empty()),
        FeedMode::List => None,
    };

    Ok(Json(FeedResponse {
        items: state.gate.project_all(&picks, &viewer),
        is_admin: viewer.is_admin,
        tier: viewer.tier,
        has_access: viewer.sees_everything(),
        no_current_pick,
    }))
}

async fn create_pick(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: std::result::Result<Json<PickDraft>, JsonRejection>,
) -> Result<Json<PickResponse>> {
    let admin = require_admin(&state, &headers).await?;
    let new = json_body(body)?.validate(&state.feed)?;

    let pick = state.store.create(new).await?;
    info!(
        pick_id = %pick.id,
        admin = admin.user_id.as_deref().unwrap_or_default(),
        feed_mode = %state.store.mode(),
        "pick posted"
    );

    Ok(Json(PickResponse { pick, success: true }))
}

async fn patch_pick(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: std::result::Result<Json<ResultPatch>, JsonRejection>,
) -> Result<Json<PickResponse>> {
    let admin = require_admin(&state, &headers).await?;
    let patch = json_body(body)?;

    let mut errors = Vec::new();
    let id = patch.id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    if id.is_none() {
        errors.push(FieldError::new("id", "is required"));
    }
    let result = match patch.result.as_deref().map(str::parse::<BetResult>) {
        None => {
            errors.push(FieldError::new("result", "is required"));
            None
        }
        Some(Err(e)) => {
            errors.push(FieldError::new("result", e));
            None
        }
        Some(Ok(r)) => Some(r),
    };
    let (Some(id), Some(result)) = (id, result) else {
        return Err(AppError::Validation(errors));
    };

    let pick = state.store.patch_result(&id, result).await?;
    info!(
        pick_id = %pick.id,
        result = %pick.result,
        admin = admin.user_id.as_deref().unwrap_or_default(),
        "pick graded"
    );

    Ok(Json(PickResponse { pick, success: true }))
}

async fn delete_pick(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DeleteResponse>> {
    let admin = require_admin(&state, &headers).await?;

    let body: DeleteBody = if body.iter().all(u8::is_ascii_whitespace) {
        DeleteBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    let id = body.id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let removed = match (state.store.mode(), id) {
        (_, Some(id)) => {
            state.store.delete(&id).await?;
            id
        }
        (FeedMode::Singleton, None) => state.store.clear_current().await?.id,
        (FeedMode::List, None) => {
            return Err(AppError::Validation(vec![FieldError::new("id", "is required")]))
        }
    };
    info!(
        pick_id = %removed,
        admin = admin.user_id.as_deref().unwrap_or_default(),
        "pick deleted"
    );

    Ok(Json(DeleteResponse { success: true, id: removed }))
}

async fn get_record(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Record>> {
    let viewer = require_viewer(&state, &headers).await?;
    let picks = state.store.list().await?;
    let record = Record::tally(&picks);
    if viewer.sees_everything() {
        Ok(Json(record))
    } else {
        Ok(Json(record.without_units()))
    }
}

async fn scan_slip(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: std::result::Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanResponse>> {
    require_admin(&state, &headers).await?;
    state.reader.ready()?;

    let req = json_body(body)?;
    let image = req
        .image
        .ok_or_else(|| AppError::BadRequest("image is required".to_string()))?;
    let image = SlipImage::parse(&image, req.media_type.as_deref())?;

    let started = Instant::now();
    let outcome = state.reader.read(&image).await;
    state.scan_latency.record(started.elapsed());

    match outcome {
        Ok(result) => Ok(Json(ScanResponse { success: true, result })),
        Err(e) => {
            warn!(error = %e, media_type = %image.media_type, "slip scan failed");
            state.health.inc_scan_failures();
            Err(e)
        }
    }
}

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>> {
    let picks = state.store.list().await?.len();
    Ok(Json(HealthResponse {
        status: "ok",
        feed_mode: state.store.mode(),
        store: state.store.backend(),
        picks,
        oracle_failures: state.health.oracle_failures(),
        scan_failures: state.health.scan_failures(),
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        access: state.access_latency.summary(),
        scan: state.scan_latency.summary(),
    })
}
