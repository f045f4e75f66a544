use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;

        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

/// Face feature vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Cosine similarity in [-1, 1]. Zero vectors compare as 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Cosine distance in [0, 2]: `1 - similarity`.
    pub fn distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// One face found in a query or enrollment image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub location: BoundingBox,
    pub embedding: Embedding,
}

/// An enrolled identity: display name plus the reference embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFace {
    /// File stem of the enrollment image (`alice.jpg` -> `alice`).
    pub name: String,
    pub embedding: Embedding,
    pub source: PathBuf,
}

/// Result of matching one probe embedding against the known faces.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Name of the accepted known face, `None` when nothing is within tolerance.
    pub name: Option<String>,
    /// Distance of the accepted face, or the nearest distance seen when unmatched.
    pub distance: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.name.is_some()
    }
}

/// Strategy for deciding which known face (if any) a probe belongs to.
pub trait Matcher {
    fn find(&self, probe: &Embedding, known: &[KnownFace], tolerance: f32) -> MatchResult;
}

/// Accepts the first known face, in registry order, within `tolerance`.
///
/// Registry order is the sorted enrollment directory listing, so when two
/// identities are both within tolerance the one whose file name sorts first
/// wins, not the nearest one.
pub struct ToleranceMatcher;

impl Matcher for ToleranceMatcher {
    fn find(&self, probe: &Embedding, known: &[KnownFace], tolerance: f32) -> MatchResult {
        let mut nearest = f32::INFINITY;

        for face in known {
            let distance = probe.distance(&face.embedding);
            if distance <= tolerance {
                return MatchResult {
                    name: Some(face.name.clone()),
                    distance,
                };
            }
            nearest = nearest.min(distance);
        }

        MatchResult {
            name: None,
            distance: if nearest.is_finite() { nearest } else { 0.0 },
        }
    }
}
