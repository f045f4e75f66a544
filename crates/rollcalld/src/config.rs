use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("match_tolerance must be in (0, 2], got {0}")]
    InvalidTolerance(f32),
    #[error("extract_timeout_secs must be at least 1")]
    InvalidTimeout,
}

/// Cosine distance never exceeds 2, so a larger tolerance matches everyone.
pub const MAX_TOLERANCE: f32 = 2.0;

/// Daemon configuration.
///
/// Resolved as defaults, then the optional TOML file, then `ROLLCALL_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listen address (default: 127.0.0.1:5000).
    pub bind_addr: String,
    /// Directory containing det_10g.onnx and w600k_r50.onnx.
    pub model_dir: PathBuf,
    /// One enrollment image per identity, named `<identity>.<ext>`.
    pub known_faces_dir: PathBuf,
    /// Where uploaded photos are archived.
    pub uploads_dir: PathBuf,
    /// Where the per-day attendance CSV files live.
    pub exports_dir: PathBuf,
    /// Maximum cosine distance for a positive match.
    pub match_tolerance: f32,
    /// Upper bound on a single extraction, in seconds.
    pub extract_timeout_secs: u64,
    /// Request body limit for uploads and webcam frames.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            model_dir: PathBuf::from("models"),
            known_faces_dir: PathBuf::from("data/known_faces"),
            uploads_dir: PathBuf::from("data/uploads"),
            exports_dir: PathBuf::from("data/exports"),
            match_tolerance: 0.5,
            extract_timeout_secs: 30,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `ROLLCALL_*` variables; unparsable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_KNOWN_FACES_DIR") {
            self.known_faces_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_EXPORTS_DIR") {
            self.exports_dir = PathBuf::from(v);
        }
        env_parse(&lookup, "ROLLCALL_MATCH_TOLERANCE", &mut self.match_tolerance);
        env_parse(&lookup, "ROLLCALL_EXTRACT_TIMEOUT_SECS", &mut self.extract_timeout_secs);
        env_parse(&lookup, "ROLLCALL_MAX_UPLOAD_BYTES", &mut self.max_upload_bytes);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.match_tolerance > 0.0 && self.match_tolerance <= MAX_TOLERANCE) {
            return Err(ConfigError::InvalidTolerance(self.match_tolerance));
        }
        if self.extract_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}
