// thumbgate/src/backend/mod.rs
//! The image library seam.
//!
//! The decision engine in [`crate::core`] never touches pixels. It asks an
//! [`ImageBackend`] to load, resize and extract, and it reads dimensions back
//! from the [`ImageHandle`] it gets. Handles are plain owned values: dropping
//! one releases it, so every exit path frees exactly once.
//!
//! The production backend is [`RustBackend`](raster::RustBackend).

pub mod raster;

#[cfg(test)]
pub(crate) mod mock;

use crate::core::blob::{BlobType, RawPixels};
use crate::core::filters::FilterOp;
use std::io::Read;
use thiserror::Error;

/// Suffix loaders put on errors for input they cannot identify.
pub const UNKNOWN_FORMAT_SUFFIX: &str = "is not in a known format";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Load(String),
    #[error("{0}")]
    Operation(String),
}

/// Which frames of a multi-frame source a load decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFilter {
    /// Loader default: the first frame only.
    #[default]
    Default,
    /// One frame, by zero-based index.
    Page(u32),
    /// The first `n` frames.
    Count(u32),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub frames: FrameFilter,
    pub dpi: Option<u32>,
    pub unlimited: bool,
}

/// Region of interest the backend keeps when a thumbnail must be cropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interesting {
    None,
    Centre,
    Attention,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    Both,
    Down,
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Target height; 0 leaves the height unconstrained.
    pub height: u32,
    pub crop: Interesting,
    pub size: SizeMode,
}

/// Optional loaders a backend may or may not ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    MultiFormatBufferLoad,
    /// `thumbnail_source` shrinks inside the decoder, so full-size pixels
    /// never exist in memory.
    ShrinkOnLoad,
}

/// A decoded image owned by whichever pipeline stage holds it.
pub trait ImageHandle: Send {
    fn width(&self) -> u32;
    /// Full stored height: all pages stacked.
    fn height(&self) -> u32;
    fn page_height(&self) -> u32;
    fn pages(&self) -> u32;
    /// EXIF orientation, 0 when unknown.
    fn orientation(&self) -> u8;

    fn thumbnail(&mut self, width: u32, options: &ThumbnailOptions) -> Result<(), BackendError>;

    /// Extracts the same rectangle from every page.
    fn extract_area_multi_page(
        &mut self,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError>;

    fn apply_filter(&mut self, op: &FilterOp) -> Result<(), BackendError>;
}

pub trait ImageBackend: Send + Sync {
    type Image: ImageHandle;
    /// A streaming source; dropping it closes the underlying reader.
    type Source: Send;

    fn supports(&self, op: Operation) -> bool;

    fn new_source(&self, reader: Box<dyn Read + Send>, declared: BlobType) -> Self::Source;

    fn load_source(
        &self,
        source: &mut Self::Source,
        options: &LoadOptions,
    ) -> Result<Self::Image, BackendError>;

    /// Decode straight to thumbnail size. Only called on backends that
    /// report [`Operation::ShrinkOnLoad`].
    fn thumbnail_source(
        &self,
        source: &mut Self::Source,
        width: u32,
        thumbnail: &ThumbnailOptions,
        options: &LoadOptions,
    ) -> Result<Self::Image, BackendError>;

    /// Generic loader: the format is detected from the bytes.
    fn load_buffer(&self, buf: &[u8], options: &LoadOptions) -> Result<Self::Image, BackendError>;

    /// Bitmap-only loader, available on every backend.
    fn load_bitmap(&self, buf: &[u8], options: &LoadOptions) -> Result<Self::Image, BackendError>;

    fn load_memory(&self, pixels: &RawPixels) -> Result<Self::Image, BackendError>;
}
