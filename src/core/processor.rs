// thumbgate/src/core/processor.rs
//! The thumbnail pipeline.
//!
//! A request moves through decode, resolution guard, frame resolution,
//! resize and crop extraction, strictly in that order. Every stage owns the
//! image handle while it works on it; an error drops the handle on the spot,
//! so nothing leaks and nothing is released twice.

use super::blob::{Blob, BlobType};
use super::classify::{classify, DiagnosticsSink, LogDiagnostics};
use super::context::RequestContext;
use super::crop::{self, CropPolicy, ExtractRect};
use super::filters::{FilterOp, FilterRegistry};
use super::frames::{self, FramePass, FrameRequest};
use super::{ProcessConfig, Result, ThumbnailError};
use crate::backend::{
    BackendError, ImageBackend, ImageHandle, Interesting, LoadOptions, Operation, SizeMode,
    ThumbnailOptions,
};
use std::sync::Arc;

/// Whole-buffer loader tried after a failed streaming decode. Chosen once,
/// when the processor is built, from what the backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackLoader {
    MultiFormat,
    Bitmap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub width: u32,
    pub height: u32,
    pub crop: CropPolicy,
    pub frames: FrameRequest,
    pub dpi: Option<u32>,
    /// Filter expressions such as `blur(2)`, applied after the resize.
    pub filters: Vec<String>,
}

impl ThumbnailRequest {
    pub fn new(width: u32, height: u32, crop: CropPolicy) -> Self {
        Self {
            width,
            height,
            crop,
            frames: FrameRequest::single(),
            dpi: None,
            filters: Vec::new(),
        }
    }

    pub fn with_frames(mut self, frames: FrameRequest) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = (dpi > 0).then_some(dpi);
        self
    }

    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }
}

pub struct Processor<B: ImageBackend> {
    backend: B,
    config: ProcessConfig,
    fallback: Option<FallbackLoader>,
    shrink_on_load: bool,
    filters: FilterRegistry,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl<B: ImageBackend> Processor<B> {
    pub fn new(backend: B, config: ProcessConfig) -> Result<Self> {
        config.validate()?;
        let filters = FilterRegistry::new(&config.disabled_filter_names())?;

        let fallback = config.decode_fallback.then(|| {
            if backend.supports(Operation::MultiFormatBufferLoad) {
                FallbackLoader::MultiFormat
            } else {
                FallbackLoader::Bitmap
            }
        });
        let shrink_on_load = backend.supports(Operation::ShrinkOnLoad);
        log::debug!(
            "source fallback: {:?}, shrink on load: {}",
            fallback,
            shrink_on_load
        );

        Ok(Self {
            backend,
            config,
            fallback,
            shrink_on_load,
            filters,
            diagnostics: Arc::new(LogDiagnostics),
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn fallback(&self) -> Option<FallbackLoader> {
        self.fallback
    }

    /// Loads, resizes and crops `blob` as `request` describes.
    pub fn new_thumbnail(
        &self,
        ctx: &RequestContext,
        blob: &Blob,
        request: &ThumbnailRequest,
    ) -> Result<B::Image> {
        log::debug!(
            "request_id={} stage=start blob={} target={}x{} crop={} frames={:?}",
            ctx.request_id(),
            blob.blob_type(),
            request.width,
            request.height,
            request.crop,
            request.frames
        );
        let ops = self.parse_filters(&request.filters)?;

        let mut image =
            self.thumbnail_pass(ctx, blob, request, request.frames, FramePass::Discover)?;
        self.apply_filters(ctx, &mut image, &ops)?;

        log::debug!(
            "request_id={} stage=done size={}x{} pages={}",
            ctx.request_id(),
            image.width(),
            image.page_height(),
            image.pages()
        );
        Ok(image)
    }

    fn thumbnail_pass(
        &self,
        ctx: &RequestContext,
        blob: &Blob,
        request: &ThumbnailRequest,
        frame_request: FrameRequest,
        pass: FramePass,
    ) -> Result<B::Image> {
        let (width, height, policy) = (request.width, request.height, request.crop);
        let mut options = self.load_options(request.dpi);

        if frames::is_multi_frame(blob.blob_type(), blob.supports_animation(), frame_request) {
            frames::apply_frame_filter(
                &mut options,
                frame_request,
                pass,
                self.config.max_animation_frames,
            );
            let mut image = self.check_resolution(self.new_image_from_blob(ctx, blob, &options)?)?;
            if pass == FramePass::Discover && frame_request.needs_bounding() {
                let bounded = frames::recalculate(image, frame_request);
                log::debug!(
                    "request_id={} stage=frames requested={:?} bounded={:?}",
                    ctx.request_id(),
                    frame_request,
                    bounded
                );
                return self.thumbnail_pass(ctx, blob, request, bounded, FramePass::Bounded);
            }
            self.thumbnail(ctx, &mut image, width, height, policy)?;
            return Ok(image);
        }

        // Without shrink-on-load a streamed thumbnail is a full decode plus a
        // resize, and the guard has to sit between the two.
        let streams = self.shrink_on_load
            && blob.blob_type().streams_thumbnail()
            && !matches!(policy, CropPolicy::FocalPoint { .. });
        let image = if streams {
            self.new_thumbnail_from_blob(ctx, blob, width, height, policy, &options)?
        } else {
            let mut image = self.check_resolution(self.new_image_from_blob(ctx, blob, &options)?)?;
            self.thumbnail(ctx, &mut image, width, height, policy)?;
            image
        };
        self.check_resolution(image)
    }

    /// Decodes `blob` whole, without resizing. Multi-frame requests get the
    /// same two-pass treatment as thumbnails.
    pub fn new_image(
        &self,
        ctx: &RequestContext,
        blob: &Blob,
        frame_request: FrameRequest,
        dpi: Option<u32>,
    ) -> Result<B::Image> {
        self.image_pass(ctx, blob, frame_request, dpi, FramePass::Discover)
    }

    fn image_pass(
        &self,
        ctx: &RequestContext,
        blob: &Blob,
        frame_request: FrameRequest,
        dpi: Option<u32>,
        pass: FramePass,
    ) -> Result<B::Image> {
        let mut options = self.load_options(dpi);
        if frames::is_multi_frame(blob.blob_type(), blob.supports_animation(), frame_request) {
            frames::apply_frame_filter(
                &mut options,
                frame_request,
                pass,
                self.config.max_animation_frames,
            );
            let image = self.check_resolution(self.new_image_from_blob(ctx, blob, &options)?)?;
            if pass == FramePass::Discover && frame_request.needs_bounding() {
                let bounded = frames::recalculate(image, frame_request);
                return self.image_pass(ctx, blob, bounded, dpi, FramePass::Bounded);
            }
            return Ok(image);
        }
        self.check_resolution(self.new_image_from_blob(ctx, blob, &options)?)
    }

    /// Resizes an already decoded image according to `policy`.
    pub fn thumbnail(
        &self,
        ctx: &RequestContext,
        image: &mut B::Image,
        width: u32,
        height: u32,
        policy: CropPolicy,
    ) -> Result<()> {
        ctx.check()?;
        if policy == CropPolicy::DownOnly && image.width() < width && image.page_height() < height {
            log::debug!(
                "request_id={} stage=resize skipped: {}x{} already inside {}x{}",
                ctx.request_id(),
                image.width(),
                image.page_height(),
                width,
                height
            );
            return Ok(());
        }

        match policy {
            CropPolicy::FocalPoint { fx, fy } if policy.extracts(width, height) => {
                self.focal_thumbnail(ctx, image, width, height, fx, fy)
            }
            _ if !policy.extracts(width, height) || image.height() == image.page_height() => {
                log::debug!(
                    "request_id={} stage=resize width={} height={} crop={}",
                    ctx.request_id(),
                    width,
                    height,
                    policy
                );
                let options = ThumbnailOptions {
                    height,
                    crop: policy.interesting(),
                    size: policy.size_mode(),
                };
                image.thumbnail(width, &options).map_err(|e| self.wrap(e))
            }
            _ => self.animated_thumbnail_with_crop(ctx, image, width, height, policy),
        }
    }

    /// Resize so the target is covered, then extract around `(fx, fy)`.
    pub fn focal_thumbnail(
        &self,
        ctx: &RequestContext,
        image: &mut B::Image,
        width: u32,
        height: u32,
        fx: f64,
        fy: f64,
    ) -> Result<()> {
        let (extent_w, extent_h) =
            crop::display_extent(image.width(), image.page_height(), image.orientation());
        self.scale_to_cover(ctx, image, width, height, (extent_w, extent_h), SizeMode::Both)?;

        let rect = crop::focal_rect(image.width(), image.page_height(), width, height, fx, fy);
        self.extract(ctx, image, rect)
    }

    fn animated_thumbnail_with_crop(
        &self,
        ctx: &RequestContext,
        image: &mut B::Image,
        width: u32,
        height: u32,
        policy: CropPolicy,
    ) -> Result<()> {
        let extent = (image.width(), image.page_height());
        self.scale_to_cover(ctx, image, width, height, extent, policy.size_mode())?;

        match crop::extraction_rect(policy, image.width(), image.page_height(), width, height) {
            Some(rect) => self.extract(ctx, image, rect),
            None => Ok(()),
        }
    }

    fn scale_to_cover(
        &self,
        ctx: &RequestContext,
        image: &mut B::Image,
        width: u32,
        height: u32,
        extent: (u32, u32),
        size: SizeMode,
    ) -> Result<()> {
        ctx.check()?;
        let by = crop::select_scale_dimension(width, height, extent.0, extent.1);
        let (scale_w, scale_h) = crop::scale_step(
            by,
            width,
            height,
            self.config.max_width,
            self.config.max_height,
        );
        log::debug!(
            "request_id={} stage=resize by={:?} width={} height={}",
            ctx.request_id(),
            by,
            scale_w,
            scale_h
        );
        let options = ThumbnailOptions {
            height: scale_h,
            crop: Interesting::None,
            size,
        };
        image.thumbnail(scale_w, &options).map_err(|e| self.wrap(e))
    }

    fn extract(&self, ctx: &RequestContext, image: &mut B::Image, rect: ExtractRect) -> Result<()> {
        ctx.check()?;
        if rect.is_whole(image.width(), image.page_height()) {
            return Ok(());
        }
        log::debug!(
            "request_id={} stage=extract left={} top={} width={} height={}",
            ctx.request_id(),
            rect.left,
            rect.top,
            rect.width,
            rect.height
        );
        image
            .extract_area_multi_page(rect.left, rect.top, rect.width, rect.height)
            .map_err(|e| self.wrap(e))
    }

    /// Rejects images past the configured size limits unless unlimited. The
    /// image is released before the error returns.
    pub fn check_resolution(&self, image: B::Image) -> Result<B::Image> {
        if self.config.unlimited {
            return Ok(image);
        }
        let pixels = image.width() as u64 * image.height() as u64;
        if image.width() > self.config.max_width
            || image.page_height() > self.config.max_height
            || pixels > self.config.max_resolution
        {
            log::warn!(
                "rejecting {}x{} image ({} pages): resolution limit",
                image.width(),
                image.page_height(),
                image.pages()
            );
            drop(image);
            return Err(ThumbnailError::ResolutionExceeded);
        }
        Ok(image)
    }

    fn new_thumbnail_from_blob(
        &self,
        ctx: &RequestContext,
        blob: &Blob,
        width: u32,
        height: u32,
        policy: CropPolicy,
        options: &LoadOptions,
    ) -> Result<B::Image> {
        ctx.check()?;
        if blob.is_empty() {
            return Err(ThumbnailError::NotFound);
        }
        log::debug!(
            "request_id={} stage=decode mode=stream blob={}",
            ctx.request_id(),
            blob.blob_type()
        );

        let thumbnail = ThumbnailOptions {
            height,
            crop: policy.interesting(),
            size: policy.size_mode(),
        };
        let mut source = self.backend.new_source(blob.open()?, blob.blob_type());
        match self.backend.thumbnail_source(&mut source, width, &thumbnail, options) {
            Ok(image) => Ok(image),
            Err(err) => {
                let Some(fallback) = self.fallback else {
                    return Err(self.wrap(err));
                };
                drop(source);
                log::debug!(
                    "request_id={} stage=decode streaming thumbnail failed ({}), trying {:?}",
                    ctx.request_id(),
                    err,
                    fallback
                );
                let mut image = self.check_resolution(self.decode_fallback(ctx, blob, options, fallback)?)?;
                self.thumbnail(ctx, &mut image, width, height, policy)?;
                Ok(image)
            }
        }
    }

    fn new_image_from_blob(
        &self,
        ctx: &RequestContext,
        blob: &Blob,
        options: &LoadOptions,
    ) -> Result<B::Image> {
        ctx.check()?;
        if blob.is_empty() {
            return Err(ThumbnailError::NotFound);
        }

        if let Some(pixels) = blob.memory() {
            log::debug!("request_id={} stage=decode mode=memory", ctx.request_id());
            return self.backend.load_memory(pixels).map_err(|e| self.wrap(e));
        }

        // Large PNGs are decoded from a buffer; streaming them is unreliable.
        let buffered = blob.blob_type() == BlobType::Png
            && blob
                .size()
                .is_some_and(|size| size > self.config.png_buffer_threshold);
        if buffered {
            log::debug!("request_id={} stage=decode mode=buffer", ctx.request_id());
            let buf = blob.read_all()?;
            return self.backend.load_buffer(&buf, options).map_err(|e| self.wrap(e));
        }

        log::debug!(
            "request_id={} stage=decode mode=source blob={} frames={:?}",
            ctx.request_id(),
            blob.blob_type(),
            options.frames
        );
        let mut source = self.backend.new_source(blob.open()?, blob.blob_type());
        match self.backend.load_source(&mut source, options) {
            Ok(image) => Ok(image),
            Err(err) => match self.fallback {
                Some(fallback) => {
                    drop(source);
                    log::debug!(
                        "request_id={} stage=decode source load failed ({}), trying {:?}",
                        ctx.request_id(),
                        err,
                        fallback
                    );
                    self.decode_fallback(ctx, blob, options, fallback)
                }
                None => Err(self.wrap(err)),
            },
        }
    }

    fn decode_fallback(
        &self,
        ctx: &RequestContext,
        blob: &Blob,
        options: &LoadOptions,
        fallback: FallbackLoader,
    ) -> Result<B::Image> {
        ctx.check()?;
        let buf = blob.read_all()?;
        let loaded = match fallback {
            FallbackLoader::MultiFormat => self.backend.load_buffer(&buf, options),
            FallbackLoader::Bitmap => self.backend.load_bitmap(&buf, options),
        };
        loaded.map_err(|e| self.wrap(e))
    }

    /// Parses filter expressions up front so a bad one fails before decoding.
    pub fn parse_filters(&self, exprs: &[String]) -> Result<Vec<FilterOp>> {
        let limit = self.config.max_filter_ops.unwrap_or(usize::MAX);
        if exprs.len() > limit {
            log::warn!("ignoring {} filters past the limit of {}", exprs.len() - limit, limit);
        }
        exprs
            .iter()
            .take(limit)
            .map(|expr| self.filters.parse(expr))
            .collect()
    }

    pub fn apply_filters(
        &self,
        ctx: &RequestContext,
        image: &mut B::Image,
        ops: &[FilterOp],
    ) -> Result<()> {
        for op in ops {
            ctx.check()?;
            log::debug!("request_id={} stage=filter op={:?}", ctx.request_id(), op);
            image.apply_filter(op).map_err(|e| self.wrap(e))?;
        }
        Ok(())
    }

    fn load_options(&self, dpi: Option<u32>) -> LoadOptions {
        LoadOptions {
            dpi,
            unlimited: self.config.unlimited,
            ..Default::default()
        }
    }

    fn wrap(&self, err: BackendError) -> ThumbnailError {
        classify(err, self.diagnostics.as_ref())
    }
}
