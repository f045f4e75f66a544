//! rollcall-core: Face recognition and attendance logging.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both via
//! ONNX Runtime on the CPU, and keeps attendance in one CSV file per day.

pub mod alignment;
pub mod attendance;
#[cfg(any(test, feature = "test-support"))]
pub mod color_bands;
pub mod detector;
pub mod extractor;
pub mod gallery;
pub mod recognizer;
pub mod types;

pub use attendance::{AttendanceError, AttendanceLog, AttendanceRecord, Clock};
#[cfg(any(test, feature = "test-support"))]
pub use color_bands::ColorBandExtractor;
pub use extractor::{decode_image, ExtractError, FeatureExtractor, OnnxExtractor};
pub use gallery::{load_gallery, Gallery, LoadReport, SkipReason, SkippedImage};
pub use types::{BoundingBox, DetectedFace, Embedding, KnownFace, MatchResult, Matcher, ToleranceMatcher};
