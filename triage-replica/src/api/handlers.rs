//! HTTP request handlers
//!
//! Reads take the replica read lock; every mutation goes through
//! [`SharedState::update`](crate::state::SharedState::update) so it is
//! persisted before it becomes visible.

use super::extract::{ApiJson, ApiPath};
use super::{ApiError, ApiResult, AppState};
use crate::replica::{ReorderOutcome, Replica, TierLevels};
use crate::sync::SyncSummary;
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use triage_common::config::ServerConfig;
use triage_common::events::{OrderChangeTrigger, TriageEvent};
use triage_common::{Record, RecordId, TagColor, TagDef, Tier};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
}

/// Tier boundaries as signed positions (-1 = empty tier)
#[derive(Debug, Serialize)]
pub struct LevelsView {
    high: i64,
    medium: i64,
    low: i64,
}

impl From<TierLevels> for LevelsView {
    fn from(levels: TierLevels) -> Self {
        let [high, medium, low] = levels.to_signed();
        Self { high, medium, low }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    record: Record,
    /// Tier the record falls in, `null` below the Low boundary
    tier: Option<Tier>,
    url: String,
}

impl RecordView {
    fn new(record: &Record, replica: &Replica, server: &ServerConfig) -> Self {
        Self {
            tier: replica.levels().tier_of(record.local_priority),
            url: server.record_url(record.id),
            record: record.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    records: Vec<RecordView>,
    levels: LevelsView,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    target_position: usize,
    ids: Vec<RecordId>,
}

#[derive(Debug, Deserialize)]
pub struct TierRequest {
    tier: Tier,
    #[serde(default)]
    at_top: bool,
    ids: Vec<RecordId>,
}

#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    #[serde(flatten)]
    outcome: ReorderOutcome,
    levels: LevelsView,
}

#[derive(Debug, Deserialize)]
pub struct NewMarkerRequest {
    ids: Vec<RecordId>,
    is_new: bool,
}

#[derive(Debug, Serialize)]
pub struct NewMarkerResponse {
    /// Records whose marker actually changed
    changed: Vec<RecordId>,
    is_new: bool,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    tag: String,
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    record_id: RecordId,
    tags: Vec<String>,
    changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ColorRequest {
    r: u8,
    g: u8,
    b: u8,
}

#[derive(Debug, Serialize)]
pub struct TagDefView {
    name: String,
    color: TagColor,
    hex: String,
}

impl From<&TagDef> for TagDefView {
    fn from(def: &TagDef) -> Self {
        Self {
            name: def.name.clone(),
            color: def.color,
            hex: def.color.to_hex(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaletteResponse {
    tags: Vec<TagDefView>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    ids: Vec<RecordId>,
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "triage-replica".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
    })
}

// ============================================================================
// Replica Endpoints
// ============================================================================

/// GET /api/records - Ordered snapshot with tier labels
pub async fn list_records(State(app): State<AppState>) -> Json<RecordsResponse> {
    let replica = app.state.replica.read().await;

    let records = replica
        .store()
        .iter()
        .map(|record| RecordView::new(record, &replica, &app.server))
        .collect();

    Json(RecordsResponse {
        records,
        levels: replica.levels().into(),
        last_update: replica.last_update(),
    })
}

/// GET /api/records/:id
pub async fn get_record(
    State(app): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<RecordView>> {
    let replica = app.state.replica.read().await;
    let record = replica.get(RecordId(id))?;
    Ok(Json(RecordView::new(record, &replica, &app.server)))
}

/// POST /api/records/order - Move the selection near a position
pub async fn set_order_near(
    State(app): State<AppState>,
    ApiJson(req): ApiJson<OrderRequest>,
) -> ApiResult<Json<ReorderResponse>> {
    debug!(
        "Move {} records near position {}",
        req.ids.len(),
        req.target_position
    );

    let (outcome, levels) = app
        .state
        .update(|replica| {
            let outcome = replica.set_order_near(req.target_position, &req.ids)?;
            Ok((outcome, replica.levels()))
        })
        .await?;

    if let ReorderOutcome::Moved { ids } = &outcome {
        app.state.broadcast_event(TriageEvent::OrderChanged {
            trigger: OrderChangeTrigger::MoveNear,
            record_ids: ids.clone(),
            tier: None,
            timestamp: Utc::now(),
        });
    }

    Ok(Json(ReorderResponse {
        outcome,
        levels: levels.into(),
    }))
}

/// POST /api/records/tier - Assign the selection to a tier
pub async fn set_tier(
    State(app): State<AppState>,
    ApiJson(req): ApiJson<TierRequest>,
) -> ApiResult<Json<ReorderResponse>> {
    debug!(
        "Assign {} records to {} tier (at top: {})",
        req.ids.len(),
        req.tier,
        req.at_top
    );

    let (outcome, levels) = app
        .state
        .update(|replica| {
            let outcome = replica.set_tier(req.tier, req.at_top, &req.ids)?;
            Ok((outcome, replica.levels()))
        })
        .await?;

    if let ReorderOutcome::Moved { ids } = &outcome {
        app.state.broadcast_event(TriageEvent::OrderChanged {
            trigger: OrderChangeTrigger::TierAssignment,
            record_ids: ids.clone(),
            tier: Some(req.tier),
            timestamp: Utc::now(),
        });
    }

    Ok(Json(ReorderResponse {
        outcome,
        levels: levels.into(),
    }))
}

/// POST /api/records/new - Mark or unmark records as new without moving them
pub async fn set_new_marker(
    State(app): State<AppState>,
    ApiJson(req): ApiJson<NewMarkerRequest>,
) -> ApiResult<Json<NewMarkerResponse>> {
    let changed = app
        .state
        .update(|replica| replica.set_new(&req.ids, req.is_new))
        .await?;

    if !changed.is_empty() {
        debug!("Set new marker to {} on {} records", req.is_new, changed.len());
        app.state.broadcast_event(TriageEvent::NewMarkerChanged {
            record_ids: changed.clone(),
            is_new: req.is_new,
            timestamp: Utc::now(),
        });
    }

    Ok(Json(NewMarkerResponse {
        changed,
        is_new: req.is_new,
    }))
}

// ============================================================================
// Tag Endpoints
// ============================================================================

/// POST /api/records/:id/tags
pub async fn add_tag(
    State(app): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<TagRequest>,
) -> ApiResult<Json<TagsResponse>> {
    let id = RecordId(id);
    let (changed, tags) = app
        .state
        .update(|replica| {
            let changed = replica.add_tag(id, &req.tag)?;
            Ok((changed, replica.tags(id)?))
        })
        .await?;

    Ok(Json(tags_changed(&app, id, tags, changed)))
}

/// DELETE /api/records/:id/tags/:tag
pub async fn remove_tag(
    State(app): State<AppState>,
    ApiPath((id, tag)): ApiPath<(i64, String)>,
) -> ApiResult<Json<TagsResponse>> {
    let id = RecordId(id);
    let (changed, tags) = app
        .state
        .update(|replica| {
            let changed = replica.remove_tag(id, &tag)?;
            Ok((changed, replica.tags(id)?))
        })
        .await?;

    Ok(Json(tags_changed(&app, id, tags, changed)))
}

/// DELETE /api/records/:id/tags - Remove every tag from a record
pub async fn clear_tags(
    State(app): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<TagsResponse>> {
    let id = RecordId(id);
    let changed = app
        .state
        .update(|replica| {
            let had_tags = !replica.tags(id)?.is_empty();
            replica.clear_tags(id)?;
            Ok(had_tags)
        })
        .await?;

    Ok(Json(tags_changed(&app, id, Vec::new(), changed)))
}

fn tags_changed(app: &AppState, record_id: RecordId, tags: Vec<String>, changed: bool) -> TagsResponse {
    if changed {
        app.state.broadcast_event(TriageEvent::TagsChanged {
            record_id,
            tags: tags.clone(),
            timestamp: Utc::now(),
        });
    }
    TagsResponse {
        record_id,
        tags,
        changed,
    }
}

/// GET /api/tags - Tag palette
pub async fn list_tags(State(app): State<AppState>) -> Json<PaletteResponse> {
    let replica = app.state.replica.read().await;
    Json(PaletteResponse {
        tags: replica.palette().iter().map(TagDefView::from).collect(),
    })
}

/// PUT /api/tags/:name - Define or recolor a palette entry
pub async fn define_tag(
    State(app): State<AppState>,
    ApiPath(name): ApiPath<String>,
    ApiJson(req): ApiJson<ColorRequest>,
) -> ApiResult<Json<TagDefView>> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Tag name must not be empty".to_string()));
    }

    let color = TagColor::new(req.r, req.g, req.b);
    app.state
        .update(|replica| {
            replica.palette_mut().define(&name, color);
            Ok(())
        })
        .await?;

    info!("Tag '{}' set to {}", name, color.to_hex());
    Ok(Json(TagDefView::from(&TagDef { name, color })))
}

/// DELETE /api/tags/:name - Drop a palette entry
///
/// Records keep the tag; it just loses its color.
pub async fn remove_tag_definition(
    State(app): State<AppState>,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<StatusCode> {
    let removed = app
        .state
        .update(|replica| Ok(replica.palette_mut().remove(&name)))
        .await?;

    if removed {
        info!("Tag '{}' removed from palette", name);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Tag {}", name)))
    }
}

// ============================================================================
// Sync Endpoints
// ============================================================================

/// POST /api/sync - Full sync against the remote source
pub async fn full_sync(State(app): State<AppState>) -> ApiResult<Json<SyncSummary>> {
    let cancel = app.shutdown.child_token();
    let summary = app.sync.full_sync(&cancel).await?;
    Ok(Json(summary))
}

/// POST /api/sync/refresh - Re-fetch specific records
pub async fn refresh(
    State(app): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<SyncSummary>> {
    if req.ids.is_empty() {
        return Err(ApiError::BadRequest("No record ids given".to_string()));
    }
    if let Some(bad) = req.ids.iter().find(|id| !id.is_valid()) {
        return Err(ApiError::BadRequest(format!("Invalid record id {}", bad)));
    }

    let cancel = app.shutdown.child_token();
    let summary = app.sync.refresh(&req.ids, &cancel).await?;
    Ok(Json(summary))
}
