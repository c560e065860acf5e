//! API route handlers for campaign control.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use kirana_core::error::KiranaError;
use kirana_core::types::{
    AudienceTarget, Campaign, CampaignStatus, MessageSpec, RecipientStatus,
};
use kirana_engine::{audience, start_campaign};

use super::server::AppState;

const DEFAULT_PAGE: i64 = 20;
const MAX_PAGE: i64 = 100;

/// Error envelope with the right HTTP status per error class.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "ok": false, "error": self.1 }));
        (self.0, body).into_response()
    }
}

impl From<KiranaError> for ApiError {
    fn from(e: KiranaError) -> Self {
        let status = match &e {
            KiranaError::NotFound(_) => StatusCode::NOT_FOUND,
            KiranaError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            KiranaError::Transition(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, e.to_string())
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

fn bad_request(msg: &str) -> ApiError {
    ApiError(StatusCode::UNPROCESSABLE_ENTITY, msg.to_string())
}

fn campaign_json(c: &Campaign) -> serde_json::Value {
    serde_json::to_value(c).unwrap_or_default()
}

// ─── Requests ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListParams {
    fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub message: MessageSpec,
    pub target: AudienceTarget,
    #[serde(default)]
    pub rate_per_minute: Option<i64>,
    /// Present means "create as scheduled".
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<MessageSpec>,
    #[serde(default)]
    pub target: Option<AudienceTarget>,
    #[serde(default)]
    pub rate_per_minute: Option<i64>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub target: AudienceTarget,
}

// ─── Handlers ──────────────────────────────────────────────

/// Liveness probe.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "kirana-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/v1/campaigns?status=&limit=&offset=
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    let status = match &params.status {
        Some(s) => Some(
            CampaignStatus::parse(s).ok_or_else(|| bad_request(&format!("unknown status '{s}'")))?,
        ),
        None => None,
    };
    let (limit, offset) = params.page();
    let campaigns = state.store.list_campaigns(status, limit, offset)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "campaigns": campaigns.iter().map(campaign_json).collect::<Vec<_>>(),
        "limit": limit,
        "offset": offset,
    })))
}

/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCampaignRequest>,
) -> ApiResult {
    if req.name.trim().is_empty() {
        return Err(bad_request("campaign name is required"));
    }
    req.message.validate()?;

    let mut campaign = match req.scheduled_at {
        Some(at) => Campaign::scheduled(&req.name, req.message, req.target, at),
        None => Campaign::new(&req.name, req.message, req.target),
    };
    if let Some(rate) = req.rate_per_minute {
        campaign.rate_per_minute = rate;
    }
    state.store.create_campaign(&campaign)?;

    // preview only; real target_count is fixed at enrollment
    let preview = audience::count(&state.store, &campaign.target)?;
    tracing::info!("campaign '{}' created ({})", campaign.name, campaign.status.as_str());
    Ok(Json(serde_json::json!({
        "ok": true,
        "id": campaign.id,
        "target_count": preview,
        "campaign": campaign_json(&campaign),
    })))
}

/// GET /api/v1/campaigns/{id}
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let campaign = state.store.get_campaign(&id)?;
    let counts = state.store.recipient_status_counts(&id)?;
    let mut count_map = serde_json::Map::new();
    for (status, n) in counts {
        count_map.insert(status, serde_json::json!(n));
    }
    Ok(Json(serde_json::json!({
        "ok": true,
        "campaign": campaign_json(&campaign),
        "recipient_counts": count_map,
    })))
}

/// PUT /api/v1/campaigns/{id}, allowed only while draft/scheduled.
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCampaignRequest>,
) -> ApiResult {
    let mut campaign = state.store.get_campaign(&id)?;
    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(bad_request("campaign name cannot be empty"));
        }
        campaign.name = name;
    }
    if let Some(message) = req.message {
        campaign.message = message;
    }
    if let Some(target) = req.target {
        campaign.target = target;
    }
    if let Some(rate) = req.rate_per_minute {
        campaign.rate_per_minute = rate;
    }
    if let Some(at) = req.scheduled_at {
        campaign.scheduled_at = Some(at);
        campaign.status = CampaignStatus::Scheduled;
    }
    campaign.message.validate()?;
    state.store.update_campaign(&campaign)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "campaign": campaign_json(&state.store.get_campaign(&id)?),
    })))
}

/// DELETE /api/v1/campaigns/{id}
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    state.store.delete_campaign(&id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/v1/campaigns/{id}/send
///
/// Enrolls (idempotently) and moves the campaign to sending; the
/// orchestrator picks it up on its next tick. An empty audience fails
/// the campaign.
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    if start_campaign(&state.store, &id)? {
        Ok(Json(serde_json::json!({ "ok": true, "status": "sending" })))
    } else {
        Err(ApiError(
            StatusCode::UNPROCESSABLE_ENTITY,
            "resolved audience is empty; campaign marked failed".into(),
        ))
    }
}

/// POST /api/v1/campaigns/{id}/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let campaign = state.store.transition(&id, CampaignStatus::Paused)?;
    Ok(Json(serde_json::json!({ "ok": true, "status": campaign.status.as_str() })))
}

/// POST /api/v1/campaigns/{id}/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let campaign = state.store.transition(&id, CampaignStatus::Sending)?;
    Ok(Json(serde_json::json!({ "ok": true, "status": campaign.status.as_str() })))
}

/// POST /api/v1/campaigns/{id}/requeue-failed
pub async fn requeue_failed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let requeued = state.store.requeue_failed(&id)?;
    let campaign = state.store.get_campaign(&id)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "requeued": requeued,
        "status": campaign.status.as_str(),
    })))
}

/// GET /api/v1/campaigns/{id}/recipients?status=&limit=&offset=
pub async fn list_recipients(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    // 404 before paging through nothing
    state.store.get_campaign(&id)?;
    let status = match &params.status {
        Some(s) => Some(
            RecipientStatus::parse(s)
                .ok_or_else(|| bad_request(&format!("unknown recipient status '{s}'")))?,
        ),
        None => None,
    };
    let (limit, offset) = params.page();
    let rows = state.store.list_recipients(&id, status, limit, offset)?;
    let recipients: Vec<serde_json::Value> = rows
        .iter()
        .map(|(r, name)| {
            serde_json::json!({
                "id": r.id,
                "phone": r.phone,
                "customer_name": name,
                "status": r.status.as_str(),
                "wa_message_id": r.wa_message_id,
                "error": r.error,
                "sent_at": r.sent_at.map(|t| t.to_rfc3339()),
                "delivered_at": r.delivered_at.map(|t| t.to_rfc3339()),
                "read_at": r.read_at.map(|t| t.to_rfc3339()),
                "failed_at": r.failed_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();
    Ok(Json(serde_json::json!({
        "ok": true,
        "recipients": recipients,
        "limit": limit,
        "offset": offset,
    })))
}

/// POST /api/v1/campaigns/preview: audience count only, no enrollment.
pub async fn preview_audience(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult {
    let count = audience::count(&state.store, &req.target)?;
    Ok(Json(serde_json::json!({ "ok": true, "target_count": count })))
}
