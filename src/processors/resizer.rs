// thumbgate/src/processors/resizer.rs
use crate::backend::{Interesting, SizeMode, ThumbnailOptions};
use crate::core::ResizeAlgorithm;
use image::{imageops::FilterType, DynamicImage};

/// Output geometry of one thumbnail call, per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub width: u32,
    pub page_height: u32,
    /// Box to crop to after resizing, when the call crops.
    pub crop: Option<(u32, u32)>,
}

impl ResizePlan {
    pub fn is_identity(&self, width: u32, page_height: u32) -> bool {
        self.width == width && self.page_height == page_height && self.crop.is_none()
    }
}

pub struct Resizer {
    algorithm: ResizeAlgorithm,
}

impl Resizer {
    pub fn new(algorithm: ResizeAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Works out the resize for a `width` x `options.height` thumbnail of a
    /// `src_width` x `src_page_height` page. A zero target is unconstrained.
    pub fn plan(
        src_width: u32,
        src_page_height: u32,
        width: u32,
        options: &ThumbnailOptions,
    ) -> ResizePlan {
        let target_w = (width > 0).then_some(width);
        let target_h = (options.height > 0).then_some(options.height);

        if target_w.is_none() && target_h.is_none() {
            return ResizePlan {
                width: src_width,
                page_height: src_page_height,
                crop: None,
            };
        }

        if let (SizeMode::Force, Some(w), Some(h)) = (options.size, target_w, target_h) {
            return ResizePlan {
                width: w,
                page_height: h,
                crop: None,
            };
        }

        let scale_x = target_w.map(|w| w as f64 / src_width.max(1) as f64);
        let scale_y = target_h.map(|h| h as f64 / src_page_height.max(1) as f64);
        let crops = options.crop != Interesting::None && target_w.is_some() && target_h.is_some();

        let mut scale = match (scale_x, scale_y) {
            (Some(x), Some(y)) if crops => x.max(y),
            (Some(x), Some(y)) => x.min(y),
            (Some(x), None) => x,
            (None, Some(y)) => y,
            (None, None) => 1.0,
        };
        if options.size == SizeMode::Down {
            scale = scale.min(1.0);
        }

        let new_w = ((src_width as f64 * scale).round() as u32).max(1);
        let new_h = ((src_page_height as f64 * scale).round() as u32).max(1);

        let crop = match (crops, target_w, target_h) {
            (true, Some(w), Some(h)) => Some((w.min(new_w), h.min(new_h))),
            _ => None,
        };

        ResizePlan {
            width: new_w,
            page_height: new_h,
            crop,
        }
    }

    pub fn resize_exact(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        if width == image.width() && height == image.height() {
            log::debug!("Image dimensions unchanged, skipping resize");
            return image.clone();
        }

        log::debug!(
            "Resizing image from {}x{} to {}x{}",
            image.width(),
            image.height(),
            width,
            height
        );

        image.resize_exact(width, height, self.get_filter_type())
    }

    fn get_filter_type(&self) -> FilterType {
        match self.algorithm {
            ResizeAlgorithm::Nearest => FilterType::Nearest,
            ResizeAlgorithm::Bilinear => FilterType::Triangle,
            ResizeAlgorithm::Bicubic => FilterType::CatmullRom,
            ResizeAlgorithm::Lanczos3 => FilterType::Lanczos3,
        }
    }
}
