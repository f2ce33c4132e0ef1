// REST facade over the editing service.
//
// Optional surface for HTTP clients; the Unix socket stays the primary
// transport. Started only when `[http] listen_addr` is configured.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

use folio_common::error::EditError;
use folio_common::types::VersionSummary;

use crate::rpc::methods::RpcServerState;

pub fn router(state: RpcServerState) -> Router {
    Router::new()
        .route(
            "/documents/{doc_id}/lock",
            post(acquire_lock).delete(release_lock).get(lock_status),
        )
        .route("/documents/{doc_id}/content", put(save_content))
        .route("/documents/{doc_id}/versions", get(list_versions))
        .route("/documents/{doc_id}/versions/{version_id}/content", get(version_content))
        .route("/documents/{doc_id}/versions/{version_id}/tag", put(tag_version))
        .route("/documents/{doc_id}/versions/{version_id}/rollback", post(rollback))
        .route("/documents/{doc_id}/diff", get(diff))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: RpcServerState) -> Result<()> {
    axum::serve(listener, router(state)).await.context("daemon http facade server failed")
}

// ── Request payloads ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HolderBody {
    holder_id: String,
}

#[derive(Debug, Deserialize)]
struct SaveBody {
    holder_id: String,
    content: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TagBody {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct RollbackBody {
    author_id: String,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DiffQuery {
    from: Uuid,
    to: Uuid,
}

// ── Handlers ────────────────────────────────────────────────────────

async fn acquire_lock(
    State(state): State<RpcServerState>,
    Path(doc_id): Path<Uuid>,
    Json(body): Json<HolderBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lease = state.service().acquire_lock(doc_id, &body.holder_id, Utc::now())?;
    Ok(Json(json!({ "lease": lease })))
}

async fn release_lock(
    State(state): State<RpcServerState>,
    Path(doc_id): Path<Uuid>,
    Json(body): Json<HolderBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service().release_lock(doc_id, &body.holder_id, Utc::now())?;
    Ok(Json(json!({ "released": true })))
}

async fn lock_status(
    State(state): State<RpcServerState>,
    Path(doc_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.service().lock_status(doc_id, Utc::now())?;
    Ok(Json(json!(status)))
}

async fn save_content(
    State(state): State<RpcServerState>,
    Path(doc_id): Path<Uuid>,
    Json(body): Json<SaveBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let version =
        state.service().save(doc_id, &body.holder_id, &body.content, &body.message, Utc::now())?;
    Ok(Json(json!({ "version": VersionSummary::from(version) })))
}

async fn list_versions(
    State(state): State<RpcServerState>,
    Path(doc_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = state.service().list_versions(
        doc_id,
        query.page.unwrap_or(0),
        query.limit.unwrap_or(0),
    )?;
    Ok(Json(json!(page)))
}

async fn version_content(
    State(state): State<RpcServerState>,
    Path((doc_id, version_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let content = state.service().get_version_content(doc_id, version_id)?;
    Ok(Json(json!({ "content": content })))
}

async fn tag_version(
    State(state): State<RpcServerState>,
    Path((doc_id, version_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<TagBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service().tag_version(doc_id, version_id, &body.tag)?;
    Ok(Json(json!({ "tagged": true })))
}

async fn rollback(
    State(state): State<RpcServerState>,
    Path((doc_id, version_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RollbackBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let version = state.service().rollback(doc_id, version_id, &body.author_id, Utc::now())?;
    Ok(Json(json!({ "version": VersionSummary::from(version) })))
}

async fn diff(
    State(state): State<RpcServerState>,
    Path(doc_id): Path<Uuid>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = state.service().diff(doc_id, query.from, query.to)?;
    Ok(Json(json!({ "entries": entries })))
}

// ── Error mapping ───────────────────────────────────────────────────

struct ApiError(EditError);

impl From<EditError> for ApiError {
    fn from(error: EditError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EditError::LockConflict { .. } => StatusCode::CONFLICT,
            EditError::LockNotFound { .. } => StatusCode::NOT_FOUND,
            EditError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            EditError::VersionNotFound { .. } => StatusCode::NOT_FOUND,
            EditError::StorageFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
                "data": self.0.data(),
            }
        }));
        (status, body).into_response()
    }
}
