// thumbgate/src/processors/loader.rs
use crate::core::blob::Blob;
use crate::core::{Result, ThumbnailError};
use crate::utils::detect_blob_type;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Bytes read from the file header to sniff its type.
const SNIFF_LEN: usize = 16;

/// Turns local files into [`Blob`]s. The file is only read for real when a
/// decode attempt opens the blob.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    expiration: Option<Duration>,
    max_file_size: Option<u64>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files last modified longer ago than `expiration` load as expired.
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    pub fn load(&self, path: &Path) -> Result<Blob> {
        log::debug!("Loading blob from: {}", path.display());

        let metadata = match path.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(ThumbnailError::NotFound),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ThumbnailError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };

        if let (Some(expiration), Ok(modified)) = (self.expiration, metadata.modified()) {
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age > expiration {
                log::debug!("{} is {:?} old, past {:?}", path.display(), age, expiration);
                return Err(ThumbnailError::Expired);
            }
        }

        let size = metadata.len();
        if let Some(max) = self.max_file_size {
            if size > max {
                return Err(ThumbnailError::InvalidParameter(format!(
                    "File {} is {} bytes, over the {} byte limit",
                    path.display(),
                    size,
                    max
                )));
            }
        }

        let mut header = Vec::with_capacity(SNIFF_LEN);
        File::open(path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut header)?;
        let blob_type = detect_blob_type(&header);
        log::debug!("{}: {} bytes, sniffed as {}", path.display(), size, blob_type);

        let owned: PathBuf = path.to_path_buf();
        Ok(Blob::new(blob_type, Some(size), move || {
            let file = File::open(&owned).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ThumbnailError::NotFound,
                _ => e.into(),
            })?;
            Ok(Box::new(BufReader::new(file)) as Box<dyn Read + Send>)
        }))
    }
}
