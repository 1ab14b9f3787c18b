// thumbgate/src/backend/raster.rs
//! Pure-Rust backend on top of the `image` crate.
//!
//! An image is a vector of equal-size frames. Animated GIF and WebP sources
//! decode to one frame per page; everything else decodes to a single frame.
//! Per-frame work runs on the session's rayon pool.

use super::{
    BackendError, FrameFilter, ImageBackend, ImageHandle, Interesting, LoadOptions, Operation,
    ThumbnailOptions, UNKNOWN_FORMAT_SUFFIX,
};
use crate::core::blob::{BlobType, RawPixels};
use crate::core::filters::FilterOp;
use crate::core::session::LibrarySession;
use crate::core::ResizeAlgorithm;
use crate::processors::{MetadataProcessor, Resizer};
use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{
    AnimationDecoder, Delay, DynamicImage, Frames, ImageBuffer, ImageDecoder, ImageError,
    ImageFormat, ImageReader, Limits,
};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::io::{Cursor, Read};
use std::sync::Arc;

#[derive(Debug)]
pub struct RasterImage {
    frames: Vec<DynamicImage>,
    delays: Vec<Delay>,
    orientation: u8,
    pool: Arc<ThreadPool>,
    algorithm: ResizeAlgorithm,
}

impl RasterImage {
    pub fn frames(&self) -> &[DynamicImage] {
        &self.frames
    }

    /// Display time of each frame; empty for still images.
    pub fn delays(&self) -> &[Delay] {
        &self.delays
    }

    pub fn into_frames(self) -> Vec<DynamicImage> {
        self.frames
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    fn map_frames<F>(&mut self, f: F)
    where
        F: Fn(&DynamicImage) -> DynamicImage + Send + Sync,
    {
        let frames = std::mem::take(&mut self.frames);
        self.frames = self.pool.install(|| frames.par_iter().map(&f).collect());
    }
}

impl ImageHandle for RasterImage {
    fn width(&self) -> u32 {
        self.frames.first().map_or(0, |f| f.width())
    }

    fn height(&self) -> u32 {
        self.page_height() * self.pages()
    }

    fn page_height(&self) -> u32 {
        self.frames.first().map_or(0, |f| f.height())
    }

    fn pages(&self) -> u32 {
        self.frames.len() as u32
    }

    fn orientation(&self) -> u8 {
        self.orientation
    }

    fn thumbnail(&mut self, width: u32, options: &ThumbnailOptions) -> Result<(), BackendError> {
        if self.orientation > 1 {
            let orientation = self.orientation;
            self.map_frames(|f| MetadataProcessor::apply_orientation(f, orientation));
        }
        self.orientation = 1;

        let (src_w, src_h) = (self.width(), self.page_height());
        let plan = Resizer::plan(src_w, src_h, width, options);
        if plan.is_identity(src_w, src_h) {
            return Ok(());
        }

        let resizer = Resizer::new(self.algorithm);
        self.map_frames(|f| resizer.resize_exact(f, plan.width, plan.page_height));

        if let Some((crop_w, crop_h)) = plan.crop {
            let (left, top) = self
                .frames
                .first()
                .map_or((0, 0), |f| crop_origin(f, options.crop, crop_w, crop_h));
            self.map_frames(|f| f.crop_imm(left, top, crop_w, crop_h));
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
        if width == 0
            || height == 0
            || left.saturating_add(width) > self.width()
            || top.saturating_add(height) > self.page_height()
        {
            return Err(BackendError::Operation(
                "extract_area: bad extract area".to_string(),
            ));
        }
        self.map_frames(|f| f.crop_imm(left, top, width, height));
        Ok(())
    }

    fn apply_filter(&mut self, op: &FilterOp) -> Result<(), BackendError> {
        match *op {
            FilterOp::Grayscale => self.map_frames(|f| f.grayscale()),
            FilterOp::Brightness(value) => self.map_frames(|f| f.brighten(value)),
            FilterOp::Contrast(value) => self.map_frames(|f| f.adjust_contrast(value)),
            FilterOp::Hue(degrees) => self.map_frames(|f| f.huerotate(degrees)),
            FilterOp::Blur(sigma) => self.map_frames(|f| f.blur(sigma)),
            FilterOp::Sharpen { sigma, threshold } => {
                self.map_frames(|f| f.unsharpen(sigma, threshold))
            }
            FilterOp::Rotate(90) => self.map_frames(|f| f.rotate90()),
            FilterOp::Rotate(180) => self.map_frames(|f| f.rotate180()),
            FilterOp::Rotate(270) => self.map_frames(|f| f.rotate270()),
            FilterOp::Rotate(other) => {
                return Err(BackendError::Operation(format!(
                    "rotate: unsupported angle {}",
                    other
                )))
            }
            // Encoders never write EXIF; dropping the tag is all that is left.
            FilterOp::StripExif => self.orientation = 0,
        }
        Ok(())
    }
}

/// Top-left corner of the `crop_w` x `crop_h` window kept from `frame`.
fn crop_origin(frame: &DynamicImage, interesting: Interesting, crop_w: u32, crop_h: u32) -> (u32, u32) {
    let spare_w = frame.width().saturating_sub(crop_w);
    let spare_h = frame.height().saturating_sub(crop_h);
    match interesting {
        Interesting::High => (spare_w, spare_h),
        Interesting::Attention => attention_origin(frame, crop_w, crop_h),
        Interesting::Centre | Interesting::None => (spare_w / 2, spare_h / 2),
    }
}

/// Window with the most Sobel edge energy, searched per axis.
fn attention_origin(frame: &DynamicImage, crop_w: u32, crop_h: u32) -> (u32, u32) {
    let energy = imageproc::gradients::sobel_gradients(&frame.to_luma8());
    let (w, h) = energy.dimensions();
    let mut cols = vec![0u64; w as usize];
    let mut rows = vec![0u64; h as usize];
    for (x, y, pixel) in energy.enumerate_pixels() {
        cols[x as usize] += pixel[0] as u64;
        rows[y as usize] += pixel[0] as u64;
    }
    (
        best_window(&cols, crop_w as usize) as u32,
        best_window(&rows, crop_h as usize) as u32,
    )
}

/// Offset of the `window`-long run with the largest sum. Ties go to the
/// offset nearest the middle.
fn best_window(sums: &[u64], window: usize) -> usize {
    if window == 0 || window >= sums.len() {
        return 0;
    }
    let last = sums.len() - window;
    let middle = last / 2;
    let mut current: u64 = sums[..window].iter().sum();
    let mut best = (current, 0usize);
    for offset in 1..=last {
        current = current - sums[offset - 1] + sums[offset + window - 1];
        let closer = offset.abs_diff(middle) < best.1.abs_diff(middle);
        if current > best.0 || (current == best.0 && closer) {
            best = (current, offset);
        }
    }
    best.1
}

/// A not-yet-consumed reader and the type its owner declared.
pub struct RasterSource {
    reader: Option<Box<dyn Read + Send>>,
    declared: BlobType,
}

impl RasterSource {
    fn take_bytes(&mut self) -> Result<Vec<u8>, BackendError> {
        let mut reader = self
            .reader
            .take()
            .ok_or_else(|| BackendError::Operation("source already consumed".to_string()))?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

struct Decoded {
    frames: Vec<DynamicImage>,
    delays: Vec<Delay>,
    orientation: u8,
}

#[derive(Clone)]
pub struct RustBackend {
    pool: Arc<ThreadPool>,
    algorithm: ResizeAlgorithm,
    metadata: MetadataProcessor,
}

impl RustBackend {
    pub fn new(session: &LibrarySession, algorithm: ResizeAlgorithm) -> Self {
        Self {
            pool: session.pool(),
            algorithm,
            metadata: MetadataProcessor::new(),
        }
    }

    fn wrap(&self, decoded: Decoded) -> RasterImage {
        RasterImage {
            frames: decoded.frames,
            delays: decoded.delays,
            orientation: decoded.orientation,
            pool: Arc::clone(&self.pool),
            algorithm: self.algorithm,
        }
    }

    fn decode(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        options: &LoadOptions,
        label: &str,
    ) -> Result<RasterImage, BackendError> {
        let limits = if options.unlimited {
            Limits::no_limits()
        } else {
            Limits::default()
        };
        let fail = |e: ImageError| load_error(label, e);

        let (frames, delays) = match format {
            ImageFormat::Gif => {
                let mut decoder = GifDecoder::new(Cursor::new(bytes)).map_err(fail)?;
                decoder.set_limits(limits).map_err(fail)?;
                collect_frames(decoder.into_frames(), options.frames, label)?
            }
            ImageFormat::WebP => {
                let mut decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(fail)?;
                decoder.set_limits(limits).map_err(fail)?;
                if decoder.has_animation() {
                    collect_frames(decoder.into_frames(), options.frames, label)?
                } else {
                    let image = DynamicImage::from_decoder(decoder).map_err(fail)?;
                    (single_frame(image, options.frames, label)?, Vec::new())
                }
            }
            other => {
                let mut reader = ImageReader::with_format(Cursor::new(bytes), other);
                reader.limits(limits);
                let image = reader.decode().map_err(fail)?;
                (single_frame(image, options.frames, label)?, Vec::new())
            }
        };

        let orientation = match format {
            ImageFormat::Jpeg | ImageFormat::Tiff | ImageFormat::Png | ImageFormat::WebP => {
                self.metadata.read_orientation(bytes)
            }
            _ => 0,
        };
        log::trace!(
            "{}: {} frame(s), orientation {}",
            label,
            frames.len(),
            orientation
        );

        Ok(self.wrap(Decoded {
            frames,
            delays,
            orientation,
        }))
    }
}

fn load_error(label: &str, err: ImageError) -> BackendError {
    match err {
        ImageError::Unsupported(_) => {
            BackendError::Load(format!("{} {}", label, UNKNOWN_FORMAT_SUFFIX))
        }
        other => BackendError::Load(format!("{}: {}", label, other)),
    }
}

fn frame_window(filter: FrameFilter) -> (usize, usize) {
    match filter {
        FrameFilter::Default => (0, 1),
        FrameFilter::Page(page) => (page as usize, 1),
        FrameFilter::Count(n) => (0, n.max(1) as usize),
        FrameFilter::All => (0, usize::MAX),
    }
}

/// Decodes only the frames `filter` selects and stops after the last one.
fn collect_frames(
    frames: Frames<'_>,
    filter: FrameFilter,
    label: &str,
) -> Result<(Vec<DynamicImage>, Vec<Delay>), BackendError> {
    let (skip, take) = frame_window(filter);
    let mut images = Vec::new();
    let mut delays = Vec::new();
    for frame in frames.skip(skip).take(take) {
        let frame = frame.map_err(|e| load_error(label, e))?;
        delays.push(frame.delay());
        images.push(DynamicImage::ImageRgba8(frame.into_buffer()));
    }
    if images.is_empty() {
        return Err(BackendError::Load(format!(
            "{}: page {} out of range",
            label, skip
        )));
    }
    Ok((images, delays))
}

fn single_frame(
    image: DynamicImage,
    filter: FrameFilter,
    label: &str,
) -> Result<Vec<DynamicImage>, BackendError> {
    match filter {
        FrameFilter::Page(page) if page > 0 => Err(BackendError::Load(format!(
            "{}: page {} out of range",
            label, page
        ))),
        _ => Ok(vec![image]),
    }
}

fn declared_format(blob_type: BlobType) -> Option<ImageFormat> {
    match blob_type {
        BlobType::Jpeg => Some(ImageFormat::Jpeg),
        BlobType::Png => Some(ImageFormat::Png),
        BlobType::Gif => Some(ImageFormat::Gif),
        BlobType::Webp => Some(ImageFormat::WebP),
        BlobType::Bmp => Some(ImageFormat::Bmp),
        BlobType::Tiff => Some(ImageFormat::Tiff),
        BlobType::Pdf | BlobType::Memory | BlobType::Unknown => None,
    }
}

impl ImageBackend for RustBackend {
    type Image = RasterImage;
    type Source = RasterSource;

    fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::MultiFormatBufferLoad => true,
            Operation::ShrinkOnLoad => false,
        }
    }

    fn new_source(&self, reader: Box<dyn Read + Send>, declared: BlobType) -> RasterSource {
        RasterSource {
            reader: Some(reader),
            declared,
        }
    }

    fn load_source(
        &self,
        source: &mut RasterSource,
        options: &LoadOptions,
    ) -> Result<RasterImage, BackendError> {
        let label = format!("{}load_source", source.declared);
        let format = declared_format(source.declared).ok_or_else(|| {
            BackendError::Load(format!("{} {}", label, UNKNOWN_FORMAT_SUFFIX))
        })?;
        let bytes = source.take_bytes()?;
        self.decode(&bytes, format, options, &label)
    }

    /// A full decode followed by a resize: there is no shrink-on-load here,
    /// which is why `supports(ShrinkOnLoad)` is false.
    fn thumbnail_source(
        &self,
        source: &mut RasterSource,
        width: u32,
        thumbnail: &ThumbnailOptions,
        options: &LoadOptions,
    ) -> Result<RasterImage, BackendError> {
        let mut image = self.load_source(source, options)?;
        image.thumbnail(width, thumbnail)?;
        Ok(image)
    }

    fn load_buffer(&self, buf: &[u8], options: &LoadOptions) -> Result<RasterImage, BackendError> {
        let format = image::guess_format(buf).map_err(|_| {
            BackendError::Load(format!("buffer {}", UNKNOWN_FORMAT_SUFFIX))
        })?;
        self.decode(buf, format, options, "load_buffer")
    }

    fn load_bitmap(&self, buf: &[u8], options: &LoadOptions) -> Result<RasterImage, BackendError> {
        match image::guess_format(buf) {
            Ok(ImageFormat::Bmp) => self.decode(buf, ImageFormat::Bmp, options, "bmpload_buffer"),
            _ => Err(BackendError::Load(format!(
                "bmpload_buffer {}",
                UNKNOWN_FORMAT_SUFFIX
            ))),
        }
    }

    fn load_memory(&self, pixels: &RawPixels) -> Result<RasterImage, BackendError> {
        let (w, h) = (pixels.width, pixels.height);
        let data = pixels.data.clone();
        let image = match pixels.bands {
            1 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            4 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
            _ => None,
        }
        .ok_or_else(|| {
            BackendError::Load(format!(
                "memory: {} bytes do not hold {}x{} pixels of {} bands",
                pixels.data.len(),
                w,
                h,
                pixels.bands
            ))
        })?;

        Ok(self.wrap(Decoded {
            frames: vec![image],
            delays: Vec::new(),
            orientation: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SizeMode;
    use crate::core::session::{Runtime, RuntimeSettings};
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn backend() -> RustBackend {
        let session = Runtime::new()
            .startup(&RuntimeSettings::default())
            .unwrap();
        RustBackend::new(&session, ResizeAlgorithm::Bilinear)
    }

    fn gif(colors: &[[u8; 4]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            for color in colors {
                let frame = Frame::new(RgbaImage::from_pixel(8, 6, Rgba(*color)));
                encoder.encode_frame(frame).unwrap();
            }
        }
        bytes
    }

    fn png(image: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn source(bytes: Vec<u8>, declared: BlobType) -> RasterSource {
        RasterSource {
            reader: Some(Box::new(Cursor::new(bytes))),
            declared,
        }
    }

    #[test]
    fn gif_page_selects_one_frame() {
        let backend = backend();
        let mut src = source(gif(&[RED, GREEN, BLUE]), BlobType::Gif);
        let options = LoadOptions {
            frames: FrameFilter::Page(1),
            ..Default::default()
        };
        let image = backend.load_source(&mut src, &options).unwrap();
        assert_eq!(image.pages(), 1);
        let pixel = image.frames()[0].to_rgba8().get_pixel(0, 0).0;
        assert!(pixel[1] > 200 && pixel[0] < 60 && pixel[2] < 60);
    }

    #[test]
    fn gif_frame_filters() {
        let backend = backend();
        let bytes = gif(&[RED, GREEN, BLUE]);
        let load = |frames| {
            backend.load_buffer(
                &bytes,
                &LoadOptions {
                    frames,
                    ..Default::default()
                },
            )
        };
        assert_eq!(load(FrameFilter::All).unwrap().pages(), 3);
        assert_eq!(load(FrameFilter::Count(2)).unwrap().pages(), 2);
        assert_eq!(load(FrameFilter::Default).unwrap().pages(), 1);
        let all = load(FrameFilter::All).unwrap();
        assert_eq!((all.width(), all.page_height(), all.height()), (8, 6, 18));
        assert!(load(FrameFilter::Page(5)).is_err());
    }

    #[test]
    fn source_is_read_once() {
        let backend = backend();
        let mut src = source(gif(&[RED]), BlobType::Gif);
        backend.load_source(&mut src, &LoadOptions::default()).unwrap();
        assert!(backend.load_source(&mut src, &LoadOptions::default()).is_err());
    }

    #[test]
    fn garbage_buffer_is_unknown_format() {
        let err = backend()
            .load_buffer(b"definitely not pixels", &LoadOptions::default())
            .unwrap_err();
        assert!(err.to_string().ends_with(UNKNOWN_FORMAT_SUFFIX));
    }

    #[test]
    fn pdf_source_is_unknown_format() {
        let mut src = source(b"%PDF-1.7".to_vec(), BlobType::Pdf);
        let err = backend()
            .load_source(&mut src, &LoadOptions::default())
            .unwrap_err();
        assert!(err.to_string().ends_with(UNKNOWN_FORMAT_SUFFIX));
    }

    #[test]
    fn mislabelled_source_fails_but_buffer_guesses() {
        let backend = backend();
        let bytes = png(&DynamicImage::ImageRgb8(RgbImage::new(4, 3)));
        let mut src = source(bytes.clone(), BlobType::Jpeg);
        assert!(backend.load_source(&mut src, &LoadOptions::default()).is_err());
        let image = backend.load_buffer(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[test]
    fn bitmap_loader_only_takes_bmp() {
        let bytes = png(&DynamicImage::ImageRgb8(RgbImage::new(4, 3)));
        assert!(backend().load_bitmap(&bytes, &LoadOptions::default()).is_err());
    }

    #[test]
    fn centre_thumbnail_fills_then_crops() {
        let backend = backend();
        let bytes = png(&DynamicImage::ImageRgb8(RgbImage::new(400, 200)));
        let mut image = backend.load_buffer(&bytes, &LoadOptions::default()).unwrap();
        image
            .thumbnail(
                100,
                &ThumbnailOptions {
                    height: 100,
                    crop: Interesting::Centre,
                    size: SizeMode::Both,
                },
            )
            .unwrap();
        assert_eq!((image.width(), image.page_height()), (100, 100));
    }

    #[test]
    fn attention_finds_the_busy_half() {
        let mut img = RgbImage::new(200, 100);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            if x >= 100 && (x / 4 + y / 4) % 2 == 0 {
                *pixel = Rgb([255, 255, 255]);
            }
        }
        let frame = DynamicImage::ImageRgb8(img);
        let (left, top) = crop_origin(&frame, Interesting::Attention, 100, 100);
        assert!(left >= 90, "left was {}", left);
        assert_eq!(top, 0);
    }

    #[test]
    fn best_window_prefers_middle_on_ties() {
        assert_eq!(best_window(&[1, 1, 1, 1, 1], 3), 1);
        assert_eq!(best_window(&[0, 0, 0, 5, 5], 2), 3);
        assert_eq!(best_window(&[3, 3], 5), 0);
    }

    #[test]
    fn thumbnail_applies_orientation_first() {
        let backend = backend();
        let mut image = backend
            .load_memory(&RawPixels {
                data: vec![0; 40 * 20],
                width: 40,
                height: 20,
                bands: 1,
            })
            .unwrap();
        image.orientation = 6;
        image
            .thumbnail(
                10,
                &ThumbnailOptions {
                    height: 0,
                    crop: Interesting::None,
                    size: SizeMode::Both,
                },
            )
            .unwrap();
        assert_eq!((image.width(), image.page_height()), (10, 20));
        assert_eq!(image.orientation(), 1);
    }

    #[test]
    fn extract_checks_bounds_on_every_page() {
        let backend = backend();
        let mut image = backend
            .load_buffer(&gif(&[RED, GREEN]), &LoadOptions { frames: FrameFilter::All, ..Default::default() })
            .unwrap();
        assert!(image.extract_area_multi_page(4, 0, 5, 6).is_err());
        image.extract_area_multi_page(2, 1, 4, 4).unwrap();
        assert_eq!((image.width(), image.page_height(), image.pages()), (4, 4, 2));
        assert!(image.frames().iter().all(|f| f.width() == 4 && f.height() == 4));
    }

    #[test]
    fn rotate_filter_swaps_extent() {
        let backend = backend();
        let mut image = backend
            .load_memory(&RawPixels {
                data: vec![0; 6 * 2 * 3],
                width: 6,
                height: 2,
                bands: 3,
            })
            .unwrap();
        image.apply_filter(&FilterOp::Rotate(90)).unwrap();
        assert_eq!((image.width(), image.height()), (2, 6));
    }

    #[test]
    fn memory_with_wrong_length_fails() {
        let err = backend().load_memory(&RawPixels {
            data: vec![0; 5],
            width: 2,
            height: 2,
            bands: 3,
        });
        assert!(err.is_err());
    }

    #[test]
    fn grayscale_filter_keeps_geometry() {
        let backend = backend();
        let mut image = backend
            .load_memory(&RawPixels {
                data: vec![200; 3 * 3 * 3],
                width: 3,
                height: 3,
                bands: 3,
            })
            .unwrap();
        image.apply_filter(&FilterOp::Grayscale).unwrap();
        let luma = image.frames()[0].to_luma8();
        assert_eq!(luma.get_pixel(1, 1), &Luma([200]));
    }
}
