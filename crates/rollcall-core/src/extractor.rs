//! Image → faces pipeline.
//!
//! [`FeatureExtractor`] is the seam between the attendance logic and the
//! vision models: the registry and request handlers only ever see
//! [`DetectedFace`] lists.

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DetectedFace};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside the model dir.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model dir.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image and produces one embedding per face.
///
/// Implementations return faces in descending detection confidence, so
/// the first entry is the most reliable face in the image.
pub trait FeatureExtractor {
    fn extract(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractError>;
}

/// Decode an encoded image (JPEG, PNG, ...), sniffing the format from its bytes.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// SCRFD detection followed by ArcFace embedding of every detected face.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`, failing fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn extract(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let rgb = image.to_rgb8();
        let boxes = self.detector.detect(&rgb)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for location in boxes {
            if !is_alignable(&location) {
                tracing::debug!(
                    confidence = location.confidence,
                    "skipping face without usable landmarks"
                );
                continue;
            }
            let embedding = self.recognizer.extract(&rgb, &location)?;
            faces.push(DetectedFace {
                location,
                embedding,
            });
        }

        tracing::debug!(
            faces = faces.len(),
            width = rgb.width(),
            height = rgb.height(),
            "extracted faces"
        );
        Ok(faces)
    }
}

/// Faces need five spread-out landmarks before ArcFace can embed them.
fn is_alignable(face: &BoundingBox) -> bool {
    face.landmarks.as_ref().is_some_and(alignment::can_align)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(landmarks: Option<[(f32, f32); 5]>) -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
            landmarks,
        }
    }

    #[test]
    fn test_only_alignable_faces_are_embedded() {
        assert!(is_alignable(&face(Some(alignment::REFERENCE_LANDMARKS_112))));
        assert!(!is_alignable(&face(None)));
        assert!(!is_alignable(&face(Some([(5.0, 5.0); 5]))));
    }

    #[test]
    fn test_load_fails_fast_without_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxExtractor::load(dir.path()).err().unwrap();
        assert!(matches!(err, ExtractError::Detector(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_decode_image_rejects_garbage() {
        assert!(decode_image(b"definitely not an image").is_err());
    }
}
