//! REST API handlers.
//!
//! Only input validation, missing configuration, and timeouts turn into
//! error statuses. A cleanup that hit remote failures still answers `200`
//! with the failures listed in the report. Malformed query strings and
//! bodies are answered inside the same envelope as every other error.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use revsweep_cleanup::{CleanupEngine, CleanupOptions};
use revsweep_core::{Country, DeploymentEntry, KeepCount};
use serde::Deserialize;
use tracing::{info, warn};

use crate::ApiState;

const NOT_CONFIGURED: &str =
    "cleanup not configured; set service.service_id and storage.bucket";

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| error_response(&rejection.body_text(), StatusCode::BAD_REQUEST))
}

fn configured(state: &ApiState) -> Result<Arc<CleanupEngine>, Response> {
    state
        .engine
        .clone()
        .ok_or_else(|| error_response(NOT_CONFIGURED, StatusCode::SERVICE_UNAVAILABLE))
}

fn keep_or_default(engine: &CleanupEngine, keep: Option<i64>) -> Result<KeepCount, Response> {
    match keep {
        None => Ok(engine.default_keep()),
        Some(n) => {
            KeepCount::new(n).map_err(|e| error_response(&e.to_string(), StatusCode::BAD_REQUEST))
        }
    }
}

fn timed_out(engine: &CleanupEngine) -> Response {
    error_response(
        &format!("request did not finish within {}s", engine.timeout().as_secs()),
        StatusCode::GATEWAY_TIMEOUT,
    )
}

// ── Cleanup ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CleanupParams {
    pub keep: Option<i64>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub delete_revisions: bool,
}

/// POST /cleanup
pub async fn run_cleanup(
    State(state): State<ApiState>,
    params: Result<Query<CleanupParams>, QueryRejection>,
) -> Response {
    let engine = match configured(&state) {
        Ok(engine) => engine,
        Err(resp) => return resp,
    };
    let params = match query(params) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let keep = match keep_or_default(&engine, params.keep) {
        Ok(keep) => keep,
        Err(resp) => return resp,
    };
    let options = CleanupOptions {
        dry_run: params.dry_run,
        delete_revisions: params.delete_revisions,
    };

    info!(keep = %keep, dry_run = options.dry_run, delete_revisions = options.delete_revisions, "cleanup requested");
    match tokio::time::timeout(engine.timeout(), engine.cleanup(keep, options)).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(_) => {
            warn!(keep = %keep, "cleanup timed out");
            timed_out(&engine)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewParams {
    pub keep: Option<i64>,
    #[serde(default)]
    pub delete_revisions: bool,
}

/// GET /cleanup/preview
pub async fn preview_cleanup(
    State(state): State<ApiState>,
    params: Result<Query<PreviewParams>, QueryRejection>,
) -> Response {
    let engine = match configured(&state) {
        Ok(engine) => engine,
        Err(resp) => return resp,
    };
    let params = match query(params) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let keep = match keep_or_default(&engine, params.keep) {
        Ok(keep) => keep,
        Err(resp) => return resp,
    };

    let preview = engine.preview(keep, params.delete_revisions);
    match tokio::time::timeout(engine.timeout(), preview).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(_) => timed_out(&engine),
    }
}

/// POST /cleanup/orphans
pub async fn sweep_orphans(State(state): State<ApiState>) -> Response {
    let engine = match configured(&state) {
        Ok(engine) => engine,
        Err(resp) => return resp,
    };

    info!("orphan sweep requested");
    match tokio::time::timeout(engine.timeout(), engine.sweep_orphans()).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(_) => timed_out(&engine),
    }
}

// ── Deployments ────────────────────────────────────────────────

/// Record request body.
#[derive(Debug, Deserialize)]
pub struct RecordRequest {
    pub revision: String,
    #[serde(default)]
    pub us_version: String,
    #[serde(default)]
    pub uk_version: String,
    /// Defaults to the time the request is handled.
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

/// POST /deployments
pub async fn record_deployment(
    State(state): State<ApiState>,
    body: Result<Json<RecordRequest>, JsonRejection>,
) -> Response {
    let engine = match configured(&state) {
        Ok(engine) => engine,
        Err(resp) => return resp,
    };
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST),
    };
    let entry = match DeploymentEntry::new(
        &req.revision,
        &req.us_version,
        &req.uk_version,
        req.deployed_at.unwrap_or_else(Utc::now),
    ) {
        Ok(entry) => entry,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    };

    match tokio::time::timeout(engine.timeout(), engine.record(entry)).await {
        Ok(Ok(recorded)) => (StatusCode::CREATED, ApiResponse::ok(recorded)).into_response(),
        Ok(Err(e)) => {
            warn!(revision = %req.revision, error = %e, "recording deployment failed");
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY)
        }
        Err(_) => timed_out(&engine),
    }
}

// ── Tagging ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TagParams {
    pub country: String,
    pub model_version: String,
}

/// GET /tag
pub async fn tag_revision(
    State(state): State<ApiState>,
    params: Result<Query<TagParams>, QueryRejection>,
) -> Response {
    let engine = match configured(&state) {
        Ok(engine) => engine,
        Err(resp) => return resp,
    };
    let params = match query(params) {
        Ok(params) => params,
        Err(resp) => return resp,
    };
    let country: Country = match params.country.parse() {
        Ok(country) => country,
        Err(e) => return error_response(&format!("{e}"), StatusCode::BAD_REQUEST),
    };

    match engine.tagger().tag(country, &params.model_version).await {
        Ok(Some(uri)) => {
            info!(%country, model_version = %params.model_version, uri = %uri, "tag resolved");
            ApiResponse::ok(uri).into_response()
        }
        Ok(None) => {
            info!(%country, model_version = %params.model_version, "no revision for version");
            error_response("no revision recorded for that version", StatusCode::NOT_FOUND)
        }
        Err(e) => {
            warn!(%country, model_version = %params.model_version, error = %e, "tagging failed");
            error_response(&e.to_string(), StatusCode::BAD_GATEWAY)
        }
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
