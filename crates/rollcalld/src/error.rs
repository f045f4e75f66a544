use crate::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use rollcall_core::AttendanceError;
use serde_json::json;
use thiserror::Error;

/// Every handler failure; rendered as `{"error": "..."}` with a matching status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file uploaded")]
    MissingUploadField,
    #[error("No attendance file for {0}")]
    ExportNotFound(NaiveDate),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUploadField | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(EngineError::Decode(_)) => StatusCode::BAD_REQUEST,
            ApiError::ExportNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::Timeout(_) | EngineError::ChannelClosed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Engine(_)
            | ApiError::Attendance(_)
            | ApiError::Storage(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rollcall_core::detector::DetectorError;
    use rollcall_core::ExtractError;
    use std::path::PathBuf;
    use std::time::Duration;

    fn decode_error() -> EngineError {
        let err = image::load_from_memory(b"not an image").unwrap_err();
        EngineError::Decode(err)
    }

    #[test]
    fn test_status_for_every_variant() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let cases = [
            (ApiError::MissingUploadField, StatusCode::BAD_REQUEST),
            (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::ExportNotFound(date), StatusCode::NOT_FOUND),
            (ApiError::Engine(decode_error()), StatusCode::BAD_REQUEST),
            (
                ApiError::Engine(EngineError::Timeout(Duration::from_secs(1))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::Engine(EngineError::ChannelClosed), StatusCode::SERVICE_UNAVAILABLE),
            (
                ApiError::Engine(EngineError::Extract(ExtractError::Detector(DetectorError::EmptyImage))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Engine(EngineError::Spawn(std::io::Error::other("no threads"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Attendance(AttendanceError::MalformedRow {
                    path: PathBuf::from("attendance_2026-10-16.csv"),
                    row: "alice".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::Storage(std::io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::Internal("join".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error}");
        }
    }

    #[tokio::test]
    async fn test_error_renders_json_body() {
        let response = ApiError::Engine(EngineError::ChannelClosed).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "engine thread exited");
    }
}
