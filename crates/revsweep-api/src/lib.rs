//! revsweep-api: REST API for the revision cleanup engine.
//!
//! Thin axum adapter: validates input, bounds runs with the engine's
//! timeout, and wraps results in the `{success, data, error}` envelope.
//! When the daemon runs without service or bucket configuration the engine
//! is absent and every engine route answers `503`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/cleanup?keep=N&dry_run=bool&delete_revisions=bool` | Run a cleanup |
//! | GET | `/cleanup/preview?keep=N&delete_revisions=bool` | Dry-run cleanup |
//! | POST | `/cleanup/orphans` | Sweep metadata of revisions that no longer exist |
//! | POST | `/deployments` | Record a deployment in the manifest and write its metadata |
//! | GET | `/tag?country=..&model_version=..` | Tag a model version's revision, return the service uri |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use revsweep_cleanup::CleanupEngine;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Option<Arc<CleanupEngine>>,
}

/// Build the complete API router.
pub fn build_router(engine: Option<Arc<CleanupEngine>>) -> Router {
    let state = ApiState { engine };

    Router::new()
        .route("/cleanup", post(handlers::run_cleanup))
        .route("/cleanup/preview", get(handlers::preview_cleanup))
        .route("/cleanup/orphans", post(handlers::sweep_orphans))
        .route("/deployments", post(handlers::record_deployment))
        .route("/tag", get(handlers::tag_revision))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
