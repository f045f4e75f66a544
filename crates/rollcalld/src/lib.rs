//! rollcalld: attendance daemon.
//!
//! Serves the upload/detect/export endpoints over HTTP. Feature extraction
//! runs on a dedicated engine thread; the known-face registry and the
//! attendance log are shared through [`AppState`].

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use config::Config;
use engine::EngineHandle;
use registry::KnownFaceRegistry;
use rollcall_core::AttendanceLog;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a request handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub registry: Arc<KnownFaceRegistry>,
    pub attendance: Arc<AttendanceLog>,
    pub uploads_dir: Arc<PathBuf>,
    pub tolerance: f32,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config, engine: EngineHandle, attendance: AttendanceLog) -> Self {
        Self {
            engine,
            registry: Arc::new(KnownFaceRegistry::new(&config.known_faces_dir)),
            attendance: Arc::new(attendance),
            uploads_dir: Arc::new(config.uploads_dir.clone()),
            tolerance: config.match_tolerance,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(routes::index))
        .route("/status", get(routes::status))
        .route("/upload_photo", post(routes::upload_photo))
        .route("/detect_face", post(routes::detect_face))
        .route("/export_attendance", get(routes::export_attendance))
        .route("/reload_encodings", get(routes::reload_encodings))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
