// thumbgate/src/backend/mock.rs
//! Recording backend for pipeline tests. It does no pixel work; it tracks
//! geometry, records every call, and counts handle and source releases.

use super::{
    BackendError, FrameFilter, ImageBackend, ImageHandle, LoadOptions, Operation,
    ThumbnailOptions, UNKNOWN_FORMAT_SUFFIX,
};
use crate::core::blob::{BlobType, RawPixels};
use crate::core::context::CancelHandle;
use crate::core::filters::FilterOp;
use crate::processors::Resizer;
use std::io::Read;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    LoadSource(LoadOptions),
    ThumbnailSource { width: u32, options: ThumbnailOptions },
    LoadBuffer(LoadOptions),
    LoadBitmap(LoadOptions),
    LoadMemory,
    Thumbnail { width: u32, options: ThumbnailOptions },
    Extract { left: u32, top: u32, width: u32, height: u32 },
    Filter(FilterOp),
}

#[derive(Debug, Default)]
struct JournalState {
    ops: Vec<RecordedOp>,
    images_created: usize,
    images_released: usize,
    sources_opened: usize,
    sources_released: usize,
}

/// Shared record of everything a [`MockBackend`] and its handles did.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<JournalState>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut JournalState) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }

    fn record(&self, op: RecordedOp) {
        self.with(|s| s.ops.push(op));
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.with(|s| s.ops.clone())
    }

    pub fn loads(&self) -> Vec<RecordedOp> {
        self.ops()
            .into_iter()
            .filter(|op| {
                matches!(
                    op,
                    RecordedOp::LoadSource(_)
                        | RecordedOp::ThumbnailSource { .. }
                        | RecordedOp::LoadBuffer(_)
                        | RecordedOp::LoadBitmap(_)
                        | RecordedOp::LoadMemory
                )
            })
            .collect()
    }

    pub fn images_created(&self) -> usize {
        self.with(|s| s.images_created)
    }

    pub fn images_released(&self) -> usize {
        self.with(|s| s.images_released)
    }

    pub fn sources_opened(&self) -> usize {
        self.with(|s| s.sources_opened)
    }

    pub fn sources_released(&self) -> usize {
        self.with(|s| s.sources_released)
    }
}

#[derive(Debug)]
pub struct MockImage {
    journal: Journal,
    width: u32,
    page_height: u32,
    pages: u32,
    orientation: u8,
    fail_ops: Option<String>,
    cancel_after_resize: Option<CancelHandle>,
}

impl MockImage {
    pub fn new(journal: &Journal, width: u32, page_height: u32, pages: u32, orientation: u8) -> Self {
        journal.with(|s| s.images_created += 1);
        Self {
            journal: journal.clone(),
            width,
            page_height,
            pages,
            orientation,
            fail_ops: None,
            cancel_after_resize: None,
        }
    }
}

impl Drop for MockImage {
    fn drop(&mut self) {
        self.journal.with(|s| s.images_released += 1);
    }
}

impl ImageHandle for MockImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.page_height * self.pages
    }

    fn page_height(&self) -> u32 {
        self.page_height
    }

    fn pages(&self) -> u32 {
        self.pages
    }

    fn orientation(&self) -> u8 {
        self.orientation
    }

    fn thumbnail(&mut self, width: u32, options: &ThumbnailOptions) -> Result<(), BackendError> {
        self.journal.record(RecordedOp::Thumbnail {
            width,
            options: *options,
        });
        if let Some(msg) = &self.fail_ops {
            return Err(BackendError::Operation(msg.clone()));
        }
        if self.orientation > 4 {
            std::mem::swap(&mut self.width, &mut self.page_height);
        }
        self.orientation = 1;
        let plan = Resizer::plan(self.width, self.page_height, width, options);
        let (w, h) = plan.crop.unwrap_or((plan.width, plan.page_height));
        self.width = w;
        self.page_height = h;
        if let Some(handle) = self.cancel_after_resize.take() {
            handle.cancel();
        }
        Ok(())
    }

    fn extract_area_multi_page(
        &mut self,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError> {
        self.journal.record(RecordedOp::Extract {
            left,
            top,
            width,
            height,
        });
        if let Some(msg) = &self.fail_ops {
            return Err(BackendError::Operation(msg.clone()));
        }
        if left + width > self.width || top + height > self.page_height {
            return Err(BackendError::Operation(
                "extract_area: bad extract area".to_string(),
            ));
        }
        self.width = width;
        self.page_height = height;
        Ok(())
    }

    fn apply_filter(&mut self, op: &FilterOp) -> Result<(), BackendError> {
        self.journal.record(RecordedOp::Filter(*op));
        if let FilterOp::Rotate(90 | 270) = op {
            std::mem::swap(&mut self.width, &mut self.page_height);
        }
        Ok(())
    }
}

pub struct MockSource {
    journal: Journal,
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.journal.with(|s| s.sources_released += 1);
    }
}

/// Hands out images of a fixed geometry. Failure knobs make individual
/// loaders or operations return errors.
#[derive(Debug, Clone)]
pub struct MockBackend {
    pub journal: Journal,
    pub width: u32,
    pub page_height: u32,
    pub source_pages: u32,
    pub orientation: u8,
    pub multi_format: bool,
    pub shrink_on_load: bool,
    pub cancel_after_resize: Option<CancelHandle>,
    pub cancel_on_load_failure: Option<CancelHandle>,
    pub fail_source: Option<String>,
    pub fail_buffer: Option<String>,
    pub fail_bitmap: Option<String>,
    pub fail_ops: Option<String>,
}

impl MockBackend {
    pub fn new(width: u32, page_height: u32) -> Self {
        Self {
            journal: Journal::new(),
            width,
            page_height,
            source_pages: 1,
            orientation: 1,
            multi_format: true,
            shrink_on_load: true,
            cancel_after_resize: None,
            cancel_on_load_failure: None,
            fail_source: None,
            fail_buffer: None,
            fail_bitmap: None,
            fail_ops: None,
        }
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.source_pages = pages;
        self
    }

    pub fn with_orientation(mut self, orientation: u8) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn failing_source(mut self, message: &str) -> Self {
        self.fail_source = Some(message.to_string());
        self
    }

    pub fn failing_buffer(mut self, message: &str) -> Self {
        self.fail_buffer = Some(message.to_string());
        self
    }

    pub fn failing_bitmap(mut self, message: &str) -> Self {
        self.fail_bitmap = Some(message.to_string());
        self
    }

    pub fn failing_ops(mut self, message: &str) -> Self {
        self.fail_ops = Some(message.to_string());
        self
    }

    pub fn without_multi_format(mut self) -> Self {
        self.multi_format = false;
        self
    }

    pub fn without_shrink_on_load(mut self) -> Self {
        self.shrink_on_load = false;
        self
    }

    /// Cancels `handle` when a failure knob makes a load fail.
    pub fn cancelling_on_load_failure(mut self, handle: CancelHandle) -> Self {
        self.cancel_on_load_failure = Some(handle);
        self
    }

    /// Cancels `handle` as soon as an image finishes its first resize.
    pub fn cancelling_after_resize(mut self, handle: CancelHandle) -> Self {
        self.cancel_after_resize = Some(handle);
        self
    }

    fn decode(&self, options: &LoadOptions, failure: &Option<String>) -> Result<MockImage, BackendError> {
        if let Some(msg) = failure {
            if let Some(handle) = &self.cancel_on_load_failure {
                handle.cancel();
            }
            return Err(BackendError::Load(msg.clone()));
        }
        let pages = match options.frames {
            FrameFilter::Default => 1,
            FrameFilter::Page(p) if p >= self.source_pages => {
                return Err(BackendError::Load(format!("page {} out of range", p)));
            }
            FrameFilter::Page(_) => 1,
            FrameFilter::Count(n) => n.min(self.source_pages),
            FrameFilter::All => self.source_pages,
        };
        let mut image = MockImage::new(&self.journal, self.width, self.page_height, pages, self.orientation);
        image.fail_ops = self.fail_ops.clone();
        image.cancel_after_resize = self.cancel_after_resize.clone();
        Ok(image)
    }
}

impl ImageBackend for MockBackend {
    type Image = MockImage;
    type Source = MockSource;

    fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::MultiFormatBufferLoad => self.multi_format,
            Operation::ShrinkOnLoad => self.shrink_on_load,
        }
    }

    fn new_source(&self, _reader: Box<dyn Read + Send>, _declared: BlobType) -> MockSource {
        self.journal.with(|s| s.sources_opened += 1);
        MockSource {
            journal: self.journal.clone(),
        }
    }

    fn load_source(&self, _source: &mut MockSource, options: &LoadOptions) -> Result<MockImage, BackendError> {
        self.journal.record(RecordedOp::LoadSource(*options));
        self.decode(options, &self.fail_source)
    }

    fn thumbnail_source(
        &self,
        _source: &mut MockSource,
        width: u32,
        thumbnail: &ThumbnailOptions,
        options: &LoadOptions,
    ) -> Result<MockImage, BackendError> {
        self.journal.record(RecordedOp::ThumbnailSource {
            width,
            options: *thumbnail,
        });
        let mut image = self.decode(options, &self.fail_source)?;
        let plan = Resizer::plan(image.width, image.page_height, width, thumbnail);
        let (w, h) = plan.crop.unwrap_or((plan.width, plan.page_height));
        image.width = w;
        image.page_height = h;
        Ok(image)
    }

    fn load_buffer(&self, _buf: &[u8], options: &LoadOptions) -> Result<MockImage, BackendError> {
        self.journal.record(RecordedOp::LoadBuffer(*options));
        if !self.multi_format {
            return Err(BackendError::Load(format!("buffer {}", UNKNOWN_FORMAT_SUFFIX)));
        }
        self.decode(options, &self.fail_buffer)
    }

    fn load_bitmap(&self, _buf: &[u8], options: &LoadOptions) -> Result<MockImage, BackendError> {
        self.journal.record(RecordedOp::LoadBitmap(*options));
        self.decode(options, &self.fail_bitmap)
    }

    fn load_memory(&self, pixels: &RawPixels) -> Result<MockImage, BackendError> {
        self.journal.record(RecordedOp::LoadMemory);
        Ok(MockImage::new(&self.journal, pixels.width, pixels.height, 1, 0))
    }
}
