//! Deterministic stand-in for the ONNX models.
//!
//! Every horizontal run of lit (non-black) columns counts as one face and
//! its mean colour is the embedding. A solid-colour image is one face, a
//! black image has none, and `red | black | green` has two. Used by the
//! integration tests and handy for exercising the daemon without models.

use crate::extractor::{ExtractError, FeatureExtractor};
use crate::types::{BoundingBox, DetectedFace, Embedding};
use image::DynamicImage;

/// Channel value above which a pixel counts as lit.
const LIT_THRESHOLD: u8 = 32;

pub struct ColorBandExtractor;

impl FeatureExtractor for ColorBandExtractor {
    fn extract(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let lit: Vec<bool> = (0..width)
            .map(|x| (0..height).any(|y| rgb.get_pixel(x, y).0.iter().any(|&c| c > LIT_THRESHOLD)))
            .collect();

        let mut faces = Vec::new();
        let mut x = 0;
        while x < width {
            if !lit[x as usize] {
                x += 1;
                continue;
            }
            let start = x;
            while x < width && lit[x as usize] {
                x += 1;
            }

            let mut sum = [0.0f32; 3];
            for bx in start..x {
                for by in 0..height {
                    let pixel = rgb.get_pixel(bx, by).0;
                    for c in 0..3 {
                        sum[c] += pixel[c] as f32;
                    }
                }
            }
            let count = ((x - start) * height) as f32;

            faces.push(DetectedFace {
                location: BoundingBox {
                    x: start as f32,
                    y: 0.0,
                    width: (x - start) as f32,
                    height: height as f32,
                    confidence: 1.0,
                    landmarks: None,
                },
                embedding: Embedding::new(sum.iter().map(|s| s / count / 255.0).collect()),
            });
        }

        Ok(faces)
    }
}
