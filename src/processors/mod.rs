// thumbgate/src/processors/mod.rs
mod batch;
mod compressor;
mod loader;
mod metadata;
mod resizer;

pub use batch::{BatchProcessor, ProcessingStats};
pub use compressor::Compressor;
pub use loader::Loader;
pub use metadata::MetadataProcessor;
pub use resizer::{ResizePlan, Resizer};
