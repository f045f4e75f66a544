//! HTTP handlers.
//!
//! Every handler is total: failures come back as `ApiError`, which renders
//! a JSON `{error}` body instead of dropping the connection.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use rollcall_core::attendance::{file_name_for, parse_date};
use rollcall_core::{AttendanceRecord, Matcher, SkippedImage, ToleranceMatcher};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name reported for faces that match no enrolled identity.
pub const UNKNOWN_NAME: &str = "Unknown";

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub marked: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    /// Base64 image, optionally as a `data:image/...;base64,` URL.
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectResponse {
    NoFace,
    Recognized { name: String },
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub message: String,
    pub count: usize,
    pub skipped: Vec<SkippedImage>,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "known_faces": state.registry.len().await,
        "known_faces_dir": state.registry.dir(),
        "tolerance": state.tolerance,
    }))
}

/// `POST /upload_photo`: match every face in a group photo.
pub async fn upload_photo(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("expected a multipart form: {e}")))?;

    let mut photo = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("photo") {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?;
        photo = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = photo.ok_or(ApiError::MissingUploadField)?;
    if bytes.is_empty() {
        return Err(ApiError::MissingUploadField);
    }

    let saved = save_upload(&state.uploads_dir, file_name.as_deref(), &bytes).await?;
    tracing::info!(path = %saved.display(), bytes = bytes.len(), "photo uploaded");

    let faces = state.engine.extract(bytes.to_vec()).await?;
    let known = state.registry.snapshot().await;

    let mut marked = Vec::with_capacity(faces.len());
    for face in &faces {
        let result = ToleranceMatcher.find(&face.embedding, &known, state.tolerance);
        tracing::debug!(name = ?result.name, distance = result.distance, "upload face matched");
        match result.name {
            Some(name) => {
                mark(&state, name.clone()).await?;
                marked.push(name);
            }
            None => marked.push(UNKNOWN_NAME.to_string()),
        }
    }

    let message = if marked.is_empty() {
        "No faces detected".to_string()
    } else {
        format!("Attendance marked for: {}", marked.join(", "))
    };
    Ok(Json(UploadResponse { message, marked }))
}

/// `POST /detect_face`: check one webcam frame, stopping at the first match.
pub async fn detect_face(
    State(state): State<AppState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let bytes = decode_frame(&request.image)?;

    let faces = state.engine.extract(bytes).await?;
    if faces.is_empty() {
        return Ok(Json(DetectResponse::NoFace));
    }

    let known = state.registry.snapshot().await;
    for face in &faces {
        let result = ToleranceMatcher.find(&face.embedding, &known, state.tolerance);
        if let Some(name) = result.name {
            mark(&state, name.clone()).await?;
            tracing::info!(name = %name, distance = result.distance, "face recognized");
            return Ok(Json(DetectResponse::Recognized { name }));
        }
    }

    tracing::debug!(faces = faces.len(), "no known face in frame");
    Ok(Json(DetectResponse::Unknown))
}

/// `GET /export_attendance[?date=YYYY-MM-DD]`: download a day's CSV.
pub async fn export_attendance(
    State(state): State<AppState>,
    params: Result<Query<ExportParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let date = match params.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => parse_date(raw)
            .map_err(|_| ApiError::BadRequest(format!("invalid date {raw:?}, expected YYYY-MM-DD")))?,
        None => state.attendance.today(),
    };

    let log = Arc::clone(&state.attendance);
    let bytes = tokio::task::spawn_blocking(move || log.export(date))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??
        .ok_or(ApiError::ExportNotFound(date))?;

    let disposition = format!("attachment; filename=\"{}\"", file_name_for(date));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /reload_encodings`: rescan the enrollment directory.
pub async fn reload_encodings(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let report = state.registry.reload(&state.engine).await?;
    Ok(Json(ReloadResponse {
        message: format!("Reloaded {} encodings", report.loaded),
        count: report.loaded,
        skipped: report.skipped,
    }))
}

async fn mark(state: &AppState, name: String) -> Result<AttendanceRecord, ApiError> {
    let log = Arc::clone(&state.attendance);
    let record = tokio::task::spawn_blocking(move || log.mark(&name))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(record)
}

/// Accepts both bare base64 and `data:<mime>;base64,<payload>`.
fn decode_frame(image: &str) -> Result<Vec<u8>, ApiError> {
    let payload = image.split_once(',').map_or(image, |(_, rest)| rest).trim();
    if payload.is_empty() {
        return Err(ApiError::BadRequest("empty image payload".to_string()));
    }
    BASE64_STANDARD
        .decode(payload)
        .map_err(|e| ApiError::BadRequest(format!("image is not valid base64: {e}")))
}

/// A fresh `<uuid>-<name>`, so repeated client names never overwrite an
/// earlier upload. Only the final path component of the client's name is kept.
fn upload_file_name(client_name: Option<&str>) -> String {
    let id = uuid::Uuid::new_v4();
    client_name
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
        .map_or_else(|| format!("{id}-upload"), |name| format!("{id}-{name}"))
}

async fn save_upload(dir: &Path, client_name: Option<&str>, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(upload_file_name(client_name));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
