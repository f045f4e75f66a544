//! Enrollment directory scanning.
//!
//! One image per identity, named `<identity>.<ext>`. Loading is
//! best-effort: files that cannot be read, decoded or that show no face are
//! skipped and reported, never raised.

use crate::extractor::{decode_image, FeatureExtractor};
use crate::types::KnownFace;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Extensions (lowercase) treated as enrollment images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// Why an enrollment image contributed no known face.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Unreadable(String),
    NoFace,
    ExtractFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedImage {
    pub path: PathBuf,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Outcome of one directory scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedImage>,
}

/// Known faces in registry order plus the scan diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    pub faces: Vec<KnownFace>,
    pub report: LoadReport,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Enrollment images in `dir`, sorted by file name.
fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    paths.sort();
    Ok(paths)
}

fn load_one(
    path: &Path,
    extractor: &mut dyn FeatureExtractor,
) -> Result<KnownFace, SkipReason> {
    let bytes = std::fs::read(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    let image = decode_image(&bytes).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    let faces = extractor
        .extract(&image)
        .map_err(|e| SkipReason::ExtractFailed(e.to_string()))?;
    let face = faces.into_iter().next().ok_or(SkipReason::NoFace)?;

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(KnownFace {
        name,
        embedding: face.embedding,
        source: path.to_path_buf(),
    })
}

/// Scan `dir` and keep the first face of every enrollment image.
///
/// A missing or unlistable directory yields an empty gallery.
pub fn load_gallery(dir: &Path, extractor: &mut dyn FeatureExtractor) -> Gallery {
    let paths = match list_images(dir) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot list known faces directory");
            return Gallery::default();
        }
    };

    let mut gallery = Gallery::default();
    for path in paths {
        match load_one(&path, extractor) {
            Ok(face) => {
                tracing::debug!(name = %face.name, path = %path.display(), "enrolled known face");
                gallery.faces.push(face);
            }
            Err(reason) => {
                tracing::warn!(path = %path.display(), ?reason, "skipping enrollment image");
                gallery.report.skipped.push(SkippedImage { path, reason });
            }
        }
    }
    gallery.report.loaded = gallery.faces.len();

    tracing::info!(
        dir = %dir.display(),
        loaded = gallery.report.loaded,
        skipped = gallery.report.skipped.len(),
        "known faces loaded"
    );
    gallery
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_bands::ColorBandExtractor;
    use image::{ImageFormat, Rgb, RgbImage};

    fn write_solid(dir: &Path, file: &str, color: [u8; 3]) {
        let lower = file.to_ascii_lowercase();
        let format = if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            ImageFormat::Jpeg
        } else {
            ImageFormat::Png
        };
        RgbImage::from_pixel(16, 16, Rgb(color))
            .save_with_format(dir.join(file), format)
            .unwrap();
    }

    #[test]
    fn test_names_come_from_file_stems_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write_solid(dir.path(), "zoe.png", [0, 0, 255]);
        write_solid(dir.path(), "alice.png", [255, 0, 0]);
        write_solid(dir.path(), "bob.PNG", [0, 255, 0]);

        let gallery = load_gallery(dir.path(), &mut ColorBandExtractor);

        let names: Vec<&str> = gallery.faces.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "zoe"]);
        assert_eq!(gallery.report.loaded, 3);
        assert!(gallery.report.skipped.is_empty());
    }

    #[test]
    fn test_faceless_and_unreadable_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_solid(dir.path(), "blank.png", [0, 0, 0]);
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let gallery = load_gallery(dir.path(), &mut ColorBandExtractor);

        assert!(gallery.faces.is_empty());
        assert_eq!(gallery.report.loaded, 0);
        assert_eq!(gallery.report.skipped.len(), 2);
        let blank = gallery
            .report
            .skipped
            .iter()
            .find(|s| s.path.ends_with("blank.png"))
            .unwrap();
        assert_eq!(blank.reason, SkipReason::NoFace);
        let broken = gallery
            .report
            .skipped
            .iter()
            .find(|s| s.path.ends_with("broken.jpg"))
            .unwrap();
        assert!(matches!(broken.reason, SkipReason::Unreadable(_)));
    }

    #[test]
    fn test_non_image_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.txt"), "enroll here").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();
        write_solid(dir.path(), "carol.jpeg", [200, 200, 0]);

        let gallery = load_gallery(dir.path(), &mut ColorBandExtractor);
        assert_eq!(gallery.faces.len(), 1);
        assert_eq!(gallery.faces[0].name, "carol");
        assert!(gallery.report.skipped.is_empty());
    }

    #[test]
    fn test_only_first_face_per_image_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let group = RgbImage::from_fn(9, 4, |x, _| match x {
            0..=2 => Rgb([255, 0, 0]),
            6..=8 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 0]),
        });
        group.save(dir.path().join("pair.png")).unwrap();

        let gallery = load_gallery(dir.path(), &mut ColorBandExtractor);
        assert_eq!(gallery.faces.len(), 1);
        assert_eq!(gallery.faces[0].embedding.values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_directory_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = load_gallery(&dir.path().join("absent"), &mut ColorBandExtractor);
        assert!(gallery.faces.is_empty());
        assert_eq!(gallery.report, LoadReport::default());
    }

    #[test]
    fn test_skip_report_serializes_reason() {
        let skipped = SkippedImage {
            path: PathBuf::from("known/blank.png"),
            reason: SkipReason::NoFace,
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["path"], "known/blank.png");
        assert_eq!(json["reason"], "no_face");
    }
}
