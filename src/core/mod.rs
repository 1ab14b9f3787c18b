// thumbgate/src/core/mod.rs
pub mod blob;
pub mod classify;
pub mod context;
pub mod crop;
pub mod filters;
pub mod frames;
pub mod processor;
pub mod session;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Status reported for errors the classifier could not place.
pub const GENERIC_STATUS: u16 = 406;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

/// Processor configuration. Every field has a default, so a config file only
/// needs the values it overrides. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub max_resolution: u64,
    /// Worker threads for the shared backend pool. 0 means one per core.
    pub concurrency: usize,
    /// Upper bound on frames decoded when a request asks for all of them.
    pub max_animation_frames: Option<u32>,
    /// PNG sources above this many bytes are buffered instead of streamed.
    pub png_buffer_threshold: u64,
    pub unlimited: bool,
    pub debug: bool,
    pub decode_fallback: bool,
    pub disable_blur: bool,
    pub disable_filters: Vec<String>,
    pub max_filter_ops: Option<usize>,
    pub algorithm: ResizeAlgorithm,
    pub quality: u8,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            max_width: 9999,
            max_height: 9999,
            max_resolution: 81_000_000,
            concurrency: 1,
            max_animation_frames: None,
            png_buffer_threshold: 1024 * 1024,
            unlimited: false,
            debug: false,
            decode_fallback: true,
            disable_blur: false,
            disable_filters: Vec::new(),
            max_filter_ops: None,
            algorithm: ResizeAlgorithm::Lanczos3,
            quality: 85,
        }
    }
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 || self.max_height == 0 || self.max_resolution == 0 {
            return Err(ThumbnailError::Config(
                "max_width, max_height and max_resolution must be non-zero".to_string(),
            ));
        }

        if self.quality == 0 || self.quality > 100 {
            return Err(ThumbnailError::Config(
                "quality must be between 1 and 100".to_string(),
            ));
        }

        if self.max_animation_frames == Some(0) {
            return Err(ThumbnailError::Config(
                "max_animation_frames must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ThumbnailError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Names of every disabled filter, with `disable_blur` expanded.
    pub fn disabled_filter_names(&self) -> Vec<String> {
        let mut names = self.disable_filters.clone();
        if self.disable_blur {
            names.push("blur".to_string());
            names.push("sharpen".to_string());
        }
        names
    }
}

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("unsupported format")]
    UnsupportedFormat,

    #[error("maximum resolution exceeded")]
    ResolutionExceeded,

    #[error("not found")]
    NotFound,

    #[error("expired")]
    Expired,

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    Timeout,

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("{message}")]
    Generic { message: String, status: u16 },
}

impl ThumbnailError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
            status: GENERIC_STATUS,
        }
    }

    /// HTTP-style status code a caller can surface.
    pub fn status(&self) -> u16 {
        match self {
            Self::UnsupportedFormat => 406,
            Self::ResolutionExceeded => 422,
            Self::NotFound => 404,
            Self::Expired => 410,
            Self::Cancelled => 499,
            Self::Timeout => 408,
            Self::UnsupportedFilter(_) | Self::InvalidParameter(_) => 400,
            Self::Config(_) | Self::Io(_) | Self::Encode(_) => 500,
            Self::Generic { status, .. } => *status,
        }
    }
}

pub type Result<T> = std::result::Result<T, ThumbnailError>;

pub fn validate_config(config: &ProcessConfig) -> Result<()> {
    config.validate()
}
