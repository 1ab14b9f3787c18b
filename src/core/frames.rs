// thumbgate/src/core/frames.rs
//! Frame and page selection for animated and paginated sources.
//!
//! A multi-frame source cannot be both counted and restricted by one decode,
//! so a request for frames beyond the first is served in two passes: a
//! [`FramePass::Discover`] decode that learns the real frame count, then a
//! [`FramePass::Bounded`] decode restricted to the clamped request. The pass
//! is an explicit parameter, and only `Discover` may lead to another decode.

use super::blob::BlobType;
use crate::backend::{FrameFilter, ImageHandle, LoadOptions};

/// Frames a caller asked for. `page` is one-based; 0 and 1 both mean the
/// first page. `n` is a frame count; 0 and 1 mean a single frame and -1
/// means every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRequest {
    pub n: i32,
    pub page: i32,
}

impl FrameRequest {
    pub fn single() -> Self {
        Self { n: 1, page: 1 }
    }

    pub fn all() -> Self {
        Self { n: -1, page: 1 }
    }

    pub fn page(page: i32) -> Self {
        Self { n: 1, page }
    }

    pub fn count(n: i32) -> Self {
        Self { n, page: 1 }
    }

    /// True when a discover pass must be followed by a bounded reload.
    pub fn needs_bounding(&self) -> bool {
        self.n > 1 || self.page > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePass {
    Discover,
    Bounded,
}

pub fn is_multi_frame(blob_type: BlobType, supports_animation: bool, request: FrameRequest) -> bool {
    (supports_animation || blob_type == BlobType::Pdf)
        && ((request.n != 0 && request.n != 1) || (request.page != 0 && request.page != 1))
}

/// Sets the frame filter for one decode pass. Discover passes decode every
/// frame. `max_frames` caps frame-count requests only; a page request must
/// learn the true count, or an in-range page past the cap would be clamped.
pub fn apply_frame_filter(
    options: &mut LoadOptions,
    request: FrameRequest,
    pass: FramePass,
    max_frames: Option<u32>,
) {
    let unbounded = match max_frames {
        Some(max) => FrameFilter::Count(max),
        None => FrameFilter::All,
    };
    options.frames = match pass {
        FramePass::Bounded if request.page > 1 => FrameFilter::Page((request.page - 1) as u32),
        FramePass::Bounded if request.n > 1 => FrameFilter::Count(request.n as u32),
        FramePass::Discover if request.page > 1 => FrameFilter::All,
        _ => unbounded,
    };
}

/// Reads the true frame count off a discover-pass image, releases it, and
/// clamps the request to that count.
pub fn recalculate<H: ImageHandle>(image: H, request: FrameRequest) -> FrameRequest {
    let pages = image.pages() as i32;
    drop(image);

    let mut clamped = request;
    if request.page > 1 && request.page > pages {
        clamped.page = pages;
    } else if request.n > 1 && request.n > pages {
        clamped.n = pages;
    }
    clamped
}
