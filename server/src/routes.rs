//! HTTP routes.
//!
//! ```text
//! GET  /api/status
//! GET  /api/files
//! POST /api/process                       {filename, confirm}
//! POST /api/finalize                      {filename, confirm}
//! GET  /api/audit/:execution_id
//! GET  /api/audit/:execution_id/history
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use warden_contracts::{ActionRequest, ExecutionMode, LedgerRecord, WardenError};
use warden_core::traits::AdmissionPolicy;

use crate::error::ApiResult;
use crate::state::AppState;

/// Caller identity used when the peer address is unavailable.
const UNKNOWN_CALLER: &str = "unknown";

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(status))
        .route("/files", get(list_files))
        .route("/process", post(process))
        .route("/finalize", post(finalize))
        .route("/audit/:execution_id", get(audit_latest))
        .route("/audit/:execution_id/history", get(audit_history));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// ── Responses ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub mode: ExecutionMode,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub message: &'static str,
    pub execution_id: String,
    pub audit_entry: LedgerRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub execution_id: String,
    pub is_terminal: bool,
    pub entry: LedgerRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub execution_id: String,
    pub entries: Vec<LedgerRecord>,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "READY",
        mode: state.governor.mode(),
        timestamp: Utc::now(),
    })
}

async fn list_files(State(state): State<AppState>) -> ApiResult<Json<FilesResponse>> {
    let files = listable_files(&state.inbox, state.governor.policy().as_ref()).map_err(|e| {
        WardenError::InternalFailure {
            reason: format!("cannot list '{}': {}", state.inbox.display(), e),
        }
    })?;
    Ok(Json(FilesResponse { files }))
}

async fn process(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AdmissionResponse>)> {
    let source = state.inbox.clone();
    govern(&state, &source, peer, &body).await
}

async fn finalize(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<AdmissionResponse>)> {
    let source = state.review.clone();
    govern(&state, &source, peer, &body).await
}

async fn audit_latest(
    State(state): State<AppState>,
    UrlPath(execution_id): UrlPath<String>,
) -> ApiResult<Json<AuditResponse>> {
    let entry = state
        .governor
        .ledger()
        .latest_for_execution(&execution_id)?
        .ok_or_else(|| WardenError::ExecutionNotFound {
            execution_id: execution_id.clone(),
        })?;

    Ok(Json(AuditResponse {
        execution_id,
        is_terminal: entry.is_terminal(),
        entry,
    }))
}

async fn audit_history(
    State(state): State<AppState>,
    UrlPath(execution_id): UrlPath<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let entries = state.governor.ledger().all_for_execution(&execution_id)?;
    if entries.is_empty() {
        return Err(WardenError::ExecutionNotFound { execution_id }.into());
    }
    Ok(Json(HistoryResponse {
        execution_id,
        entries,
    }))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn govern(
    state: &AppState,
    source: &Path,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: &[u8],
) -> ApiResult<(StatusCode, Json<AdmissionResponse>)> {
    let caller = peer
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string());
    let request = parse_action(caller, body);

    let admission = state.governor.request_action(source, request).await?;
    info!(
        execution_id = %admission.execution_id,
        status = admission.entry.status().as_str(),
        "request authorized"
    );

    // Supervision keeps running on its own; the caller polls the ledger.
    drop(admission.supervision);

    Ok((
        StatusCode::ACCEPTED,
        Json(AdmissionResponse {
            message: "Authorized",
            execution_id: admission.execution_id,
            audit_entry: admission.entry,
        }),
    ))
}

/// Read `{filename, confirm}` from a request body.
///
/// An unreadable body is treated as empty so the governor reports the
/// missing confirmation rather than a transport error.  Only a JSON `true`
/// confirms.
fn parse_action(caller: String, body: &[u8]) -> ActionRequest {
    let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    ActionRequest {
        caller,
        filename: value
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string),
        confirm: value.get("confirm") == Some(&Value::Bool(true)),
    }
}

/// Sorted names of the regular files in `dir` that policy would list.  A
/// missing directory lists nothing.
fn listable_files(dir: &Path, policy: &dyn AdmissionPolicy) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if policy.is_listable(name) {
                files.push(name.to_string());
            }
        }
    }
    files.sort();
    Ok(files)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
