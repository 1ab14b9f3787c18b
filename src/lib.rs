pub mod backend;
pub mod cli;
pub mod core;
pub mod processors;
pub mod utils;

pub use backend::{BackendError, ImageBackend, ImageHandle};
pub use core::{
    validate_config, ProcessConfig, ResizeAlgorithm, Result, ThumbnailError, GENERIC_STATUS,
};
pub use processors::{
    BatchProcessor, Compressor, Loader, MetadataProcessor, ProcessingStats, Resizer,
};

pub mod prelude {
    pub use crate::backend::raster::{RasterImage, RustBackend};
    pub use crate::core::blob::{Blob, BlobType};
    pub use crate::core::context::RequestContext;
    pub use crate::core::crop::CropPolicy;
    pub use crate::core::frames::FrameRequest;
    pub use crate::core::processor::{Processor, ThumbnailRequest};
    pub use crate::core::session::{LibrarySession, Runtime, RuntimeSettings};
    pub use crate::{
        ImageBackend, ImageHandle, ProcessConfig, ResizeAlgorithm, ThumbnailError,
    };
}
