use crate::engine::{EngineError, EngineHandle};
use rollcall_core::{KnownFace, LoadReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// In-memory set of enrolled faces, rebuilt wholesale on reload.
///
/// Readers take an `Arc` snapshot, so a match that started before a reload
/// finishes against the old set and never sees a half-built one.
pub struct KnownFaceRegistry {
    dir: PathBuf,
    faces: RwLock<Arc<Vec<KnownFace>>>,
    reload_lock: Mutex<()>,
}

impl KnownFaceRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            faces: RwLock::new(Arc::new(Vec::new())),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn snapshot(&self) -> Arc<Vec<KnownFace>> {
        Arc::clone(&*self.faces.read().await)
    }

    pub async fn len(&self) -> usize {
        self.faces.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Rescan the enrollment directory and swap in the new set.
    pub async fn reload(&self, engine: &EngineHandle) -> Result<LoadReport, EngineError> {
        let _serial = self.reload_lock.lock().await;

        let gallery = engine.load_gallery(self.dir.clone()).await?;
        *self.faces.write().await = Arc::new(gallery.faces);

        tracing::info!(
            dir = %self.dir.display(),
            loaded = gallery.report.loaded,
            skipped = gallery.report.skipped.len(),
            "known faces reloaded"
        );
        Ok(gallery.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use image::{Rgb, RgbImage};
    use rollcall_core::ColorBandExtractor;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reload_replaces_set_and_old_snapshots_survive() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]))
            .save(dir.path().join("alice.png"))
            .unwrap();

        let engine = spawn_engine(ColorBandExtractor, Duration::from_secs(5)).unwrap();
        let registry = KnownFaceRegistry::new(dir.path());
        assert!(registry.is_empty().await);

        let report = registry.reload(&engine).await.unwrap();
        assert_eq!(report.loaded, 1);
        let before = registry.snapshot().await;

        std::fs::remove_file(dir.path().join("alice.png")).unwrap();
        RgbImage::from_pixel(8, 8, Rgb([0, 255, 0]))
            .save(dir.path().join("bob.png"))
            .unwrap();
        registry.reload(&engine).await.unwrap();

        assert_eq!(before[0].name, "alice");
        let after = registry.snapshot().await;
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].name, "bob");
    }
}
