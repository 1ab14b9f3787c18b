// thumbgate/src/core/blob.rs
//! Source blobs: a declared type, an optional declared size and a reader that
//! is only opened when a decode attempt needs it.

use super::{Result, ThumbnailError};
use crate::utils::detect_blob_type;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobType {
    Unknown,
    Memory,
    Jpeg,
    Png,
    Gif,
    Webp,
    Pdf,
    Bmp,
    Tiff,
}

impl BlobType {
    /// Formats whose decoder can stream a true thumbnail from the source.
    pub fn streams_thumbnail(self) -> bool {
        matches!(self, Self::Jpeg | Self::Gif | Self::Webp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Memory => "memory",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Pdf => "pdf",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw, already-decoded pixels handed in by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPixels {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Samples per pixel, 1 to 4.
    pub bands: u8,
}

/// Upper bound on the buffer reserved up front from a declared size.
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

pub type ReaderFn = dyn Fn() -> Result<Box<dyn Read + Send>> + Send + Sync;

pub struct Blob {
    blob_type: BlobType,
    size: Option<u64>,
    opener: Option<Arc<ReaderFn>>,
    memory: Option<RawPixels>,
}

impl Blob {
    /// A blob backed by a reader factory, e.g. a storage collaborator.
    pub fn new<F>(blob_type: BlobType, size: Option<u64>, opener: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        Self {
            blob_type,
            size,
            opener: Some(Arc::new(opener)),
            memory: None,
        }
    }

    /// An in-memory encoded image; the type is sniffed from its header.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let blob_type = detect_blob_type(&bytes);
        let size = bytes.len() as u64;
        let bytes: Arc<[u8]> = Arc::from(bytes);
        Self::new(blob_type, Some(size), move || {
            Ok(Box::new(Cursor::new(Arc::clone(&bytes))) as Box<dyn Read + Send>)
        })
    }

    pub fn from_raw_pixels(pixels: RawPixels) -> Self {
        Self {
            blob_type: BlobType::Memory,
            size: Some(pixels.data.len() as u64),
            opener: None,
            memory: Some(pixels),
        }
    }

    pub fn blob_type(&self) -> BlobType {
        self.blob_type
    }

    /// Declared size in bytes, if the source knows it.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn memory(&self) -> Option<&RawPixels> {
        self.memory.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        match &self.memory {
            Some(pixels) => pixels.data.is_empty(),
            None => self.opener.is_none() || self.size == Some(0),
        }
    }

    pub fn supports_animation(&self) -> bool {
        matches!(self.blob_type, BlobType::Gif | BlobType::Webp)
    }

    /// Opens a fresh reader. Each decode attempt gets its own.
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match &self.opener {
            Some(opener) => opener(),
            None => Err(ThumbnailError::NotFound),
        }
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut reader = self.open()?;
        // The declared size comes from storage and is not trusted.
        let mut buf = Vec::with_capacity(self.size.unwrap_or(0).min(MAX_PREALLOC) as usize);
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("blob_type", &self.blob_type)
            .field("size", &self.size)
            .field("memory", &self.memory.is_some())
            .finish()
    }
}
