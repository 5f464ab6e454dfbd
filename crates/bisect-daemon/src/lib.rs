// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! HTTP control-plane for the bisect job broker.

pub mod middleware;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path as AxPath, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use bisect_core::{ApplyError, ETag, JobStore, LogStore, QueryEngine};
use bisect_error::{BrokerError, BrokerErrorDto, ErrorCode};
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared daemon state, cloned cheaply into every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The in-memory job store.
    pub jobs: JobStore,
    /// The append-only per-job log store.
    pub logs: LogStore,
}

impl AppState {
    /// Construct fresh, empty daemon state.
    pub fn new() -> Self {
        Self {
            jobs: JobStore::new(),
            logs: LogStore::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform JSON error envelope for every non-2xx response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: BrokerErrorDto,
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        let status = StatusCode::from_u16(err.code.status_hint()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            body: (&err).into(),
        }
    }
}

impl ApiError {
    fn with_status(err: BrokerError, status: StatusCode) -> Self {
        Self {
            status,
            body: (&err).into(),
        }
    }

    fn not_found(code: ErrorCode, message: impl Into<String>) -> Self {
        BrokerError::new(code, message).into()
    }
}

/// Parse a raw path segment as a job id. A syntactically invalid id is
/// indistinguishable from a valid-but-unknown one: both are 404, not 400,
/// so this never routes through Axum's built-in path-rejection machinery.
fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>()
        .map_err(|_| ApiError::not_found(ErrorCode::JobNotFound, format!("no such job: {raw}")))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Build the Axum router with all broker routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/api/jobs", get(cmd_list_jobs).post(cmd_create_job))
        .route("/api/jobs/{id}", get(cmd_get_job).patch(cmd_patch_job))
        .route("/api/jobs/{id}/log", put(cmd_append_log))
        .route("/log/{id}", get(cmd_read_log))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let (job, etag) = state.jobs.create(&body).await?;
    info!(job.id = %job.id, "job created");

    let mut resp = (StatusCode::CREATED, job.id.to_string()).into_response();
    resp.headers_mut()
        .insert("ETag", HeaderValue::from_str(&etag.to_string()).unwrap());
    Ok(resp)
}

async fn cmd_list_jobs(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let clauses = QueryEngine::parse(&params);
    let records: Vec<(Uuid, Value)> = state
        .jobs
        .list()
        .await
        .into_iter()
        .map(|(id, job)| (id, job.to_value()))
        .collect();
    let mut ids = QueryEngine::select(&records, &clauses);
    ids.sort_unstable();
    Json(ids)
}

async fn cmd_get_job(
    AxPath(raw_id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&raw_id)?;
    let (job, etag) = state
        .jobs
        .get(id)
        .await
        .ok_or_else(|| ApiError::not_found(ErrorCode::JobNotFound, format!("no such job: {id}")))?;

    let mut resp = Json(job).into_response();
    resp.headers_mut()
        .insert("ETag", HeaderValue::from_str(&etag.to_string()).unwrap());
    Ok(resp)
}

async fn cmd_patch_job(
    AxPath(raw_id): AxPath<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(ops): Json<Value>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&raw_id)?;
    let if_match = headers
        .get("if-match")
        .and_then(|v| v.to_str().ok())
        .and_then(ETag::parse)
        .ok_or_else(|| {
            ApiError::with_status(
                BrokerError::new(ErrorCode::JobPatchRejected, "missing or malformed If-Match header"),
                StatusCode::BAD_REQUEST,
            )
        })?;

    match state.jobs.apply(id, if_match, &ops).await {
        Ok((job, etag)) => {
            info!(job.id = %id, "job patched");
            let mut resp = Json(job).into_response();
            resp.headers_mut()
                .insert("ETag", HeaderValue::from_str(&etag.to_string()).unwrap());
            Ok(resp)
        }
        Err(ApplyError::NotFound) => {
            Err(ApiError::not_found(ErrorCode::JobNotFound, format!("no such job: {id}")))
        }
        Err(ApplyError::PreconditionFailed) => Err(ApiError::with_status(
            BrokerError::new(ErrorCode::JobPreconditionFailed, "If-Match does not match current ETag")
                .with_context("id", id.to_string()),
            StatusCode::PRECONDITION_FAILED,
        )),
        Err(ApplyError::BadRequest(err)) => {
            warn!(job.id = %id, error = %err, "patch rejected");
            Err(ApiError::with_status(err, StatusCode::BAD_REQUEST))
        }
    }
}

async fn cmd_append_log(
    AxPath(raw_id): AxPath<String>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_job_id(&raw_id)?;
    if state.jobs.get(id).await.is_none() {
        return Err(ApiError::not_found(ErrorCode::JobNotFound, format!("no such job: {id}")));
    }
    let chunk = String::from_utf8_lossy(&body).into_owned();
    state.logs.append(id, chunk).await;
    Ok(StatusCode::OK)
}

async fn cmd_read_log(
    AxPath(raw_id): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_job_id(&raw_id)?;
    if state.jobs.get(id).await.is_none() {
        return Err(ApiError::not_found(ErrorCode::JobNotFound, format!("no such job: {id}")));
    }
    let log = state.logs.read(id).await.unwrap_or_default();
    Ok((StatusCode::OK, [("content-type", "text/plain")], log))
}
