// thumbgate/src/processors/compressor.rs
use crate::backend::raster::RasterImage;
use crate::backend::ImageHandle;
use crate::core::{Result, ThumbnailError};
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{imageops, Delay, DynamicImage, Frame, ImageFormat, RgbaImage};
use oxipng::{optimize_from_memory, Options};
use std::io::Cursor;
use std::path::Path;

/// Encodes finished thumbnails.
///
/// GIF keeps every frame and its timing. Other formats hold a single image,
/// so the pages of a multi-frame thumbnail are stacked top to bottom.
pub struct Compressor {
    quality: u8,
    optimize_png: bool,
}

impl Compressor {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            optimize_png: true,
        }
    }

    pub fn with_png_optimization(mut self, optimize: bool) -> Self {
        self.optimize_png = optimize;
        self
    }

    /// Writes `image` to `path` in the format its extension names and returns
    /// the number of bytes written.
    pub fn save(&self, image: &RasterImage, path: &Path) -> Result<u64> {
        let format = self.detect_format(path);
        log::debug!(
            "Saving image to {} with format {:?}, quality: {}",
            path.display(),
            format,
            self.quality
        );

        let bytes = self.encode(image, format)?;
        std::fs::write(path, &bytes)?;
        log::info!("Saved image: {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes.len() as u64)
    }

    pub fn encode(&self, image: &RasterImage, format: ImageFormat) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());

        match format {
            ImageFormat::Gif => {
                let mut encoder = GifEncoder::new(&mut buffer);
                if image.is_animated() {
                    encoder.set_repeat(Repeat::Infinite)?;
                }
                let frames = image.frames().iter().enumerate().map(|(i, frame)| {
                    let delay = image
                        .delays()
                        .get(i)
                        .copied()
                        .unwrap_or_else(|| Delay::from_numer_denom_ms(100, 1));
                    Frame::from_parts(frame.to_rgba8(), 0, 0, delay)
                });
                encoder.encode_frames(frames)?;
            }
            ImageFormat::Jpeg => {
                let flat = DynamicImage::ImageRgb8(stacked(image).to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
                flat.write_with_encoder(encoder)?;
            }
            ImageFormat::Png => {
                stacked(image).write_to(&mut buffer, ImageFormat::Png)?;
                if self.optimize_png {
                    return self.optimize_png_bytes(&buffer.into_inner());
                }
            }
            ImageFormat::WebP => {
                let flat = DynamicImage::ImageRgba8(stacked(image).to_rgba8());
                flat.write_with_encoder(WebPEncoder::new_lossless(&mut buffer))?;
            }
            other => {
                DynamicImage::ImageRgba8(stacked(image).to_rgba8()).write_to(&mut buffer, other)?;
            }
        }

        Ok(buffer.into_inner())
    }

    fn optimize_png_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        optimize_from_memory(data, &Options::default())
            .map_err(|e| ThumbnailError::generic(format!("PNG optimization failed: {}", e)))
    }

    pub fn detect_format(&self, path: &Path) -> ImageFormat {
        match crate::utils::get_file_extension(path).as_deref() {
            Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
            Some("png") => ImageFormat::Png,
            Some("gif") => ImageFormat::Gif,
            Some("bmp") => ImageFormat::Bmp,
            Some("webp") => ImageFormat::WebP,
            Some("tiff") | Some("tif") => ImageFormat::Tiff,
            _ => ImageFormat::Jpeg,
        }
    }

    pub fn calculate_savings(&self, original_size: u64, compressed_size: u64) -> f64 {
        if original_size == 0 {
            return 0.0;
        }

        let savings = (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0;
        savings.max(0.0)
    }
}

/// All pages in one image, first page on top.
fn stacked(image: &RasterImage) -> DynamicImage {
    match image.frames() {
        [single] => single.clone(),
        frames => {
            let page_height = image.page_height();
            let mut canvas = RgbaImage::new(image.width(), image.height());
            for (i, frame) in frames.iter().enumerate() {
                let top = i as i64 * page_height as i64;
                imageops::replace(&mut canvas, &frame.to_rgba8(), 0, top);
            }
            DynamicImage::ImageRgba8(canvas)
        }
    }
}
