// thumbgate/src/core/crop.rs
//! Crop strategy: which dimension drives the resize, and which rectangle of
//! the resized image is kept.
//!
//! Everything here is pure arithmetic over dimensions, so it is tested
//! without any image.

use super::{Result, ThumbnailError};
use crate::backend::{Interesting, SizeMode};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropPolicy {
    /// Fit inside the target, no crop.
    None,
    /// Resize to exactly the target, ignoring aspect ratio.
    Force,
    /// Centre crop that never enlarges; smaller sources pass through.
    DownOnly,
    /// Keep the bottom-right corner.
    HighAnchor,
    Centre,
    /// Saliency crop. Multi-frame sources fall back to a centre crop.
    Attention,
    /// Centre the crop on a fractional coordinate, each in [0, 1].
    FocalPoint { fx: f64, fy: f64 },
}

impl CropPolicy {
    pub fn focal(fx: f64, fy: f64) -> Self {
        Self::FocalPoint {
            fx: fx.clamp(0.0, 1.0),
            fy: fy.clamp(0.0, 1.0),
        }
    }

    /// Region hint passed to the backend's own thumbnail call.
    pub fn interesting(self) -> Interesting {
        match self {
            Self::None | Self::Force | Self::FocalPoint { .. } => Interesting::None,
            Self::DownOnly | Self::Centre => Interesting::Centre,
            Self::HighAnchor => Interesting::High,
            Self::Attention => Interesting::Attention,
        }
    }

    pub fn size_mode(self) -> SizeMode {
        match self {
            Self::Force => SizeMode::Force,
            Self::DownOnly => SizeMode::Down,
            _ => SizeMode::Both,
        }
    }

    /// Whether a separate extraction step follows the resize. A zero target
    /// dimension means "keep aspect", which leaves nothing to crop.
    pub fn extracts(self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && !matches!(self, Self::None | Self::Force)
    }
}

impl fmt::Display for CropPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Force => f.write_str("force"),
            Self::DownOnly => f.write_str("down"),
            Self::HighAnchor => f.write_str("high"),
            Self::Centre => f.write_str("centre"),
            Self::Attention => f.write_str("attention"),
            Self::FocalPoint { fx, fy } => write!(f, "focal:{},{}", fx, fy),
        }
    }
}

impl FromStr for CropPolicy {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "none" => Ok(Self::None),
            "force" => Ok(Self::Force),
            "down" => Ok(Self::DownOnly),
            "high" => Ok(Self::HighAnchor),
            "centre" | "center" => Ok(Self::Centre),
            "attention" | "smart" => Ok(Self::Attention),
            other => {
                let coords = other.strip_prefix("focal:").ok_or_else(|| {
                    ThumbnailError::InvalidParameter(format!("unknown crop policy: {}", other))
                })?;
                let (fx, fy) = coords.split_once(',').ok_or_else(|| {
                    ThumbnailError::InvalidParameter(format!("focal point needs x,y: {}", coords))
                })?;
                let parse = |v: &str| {
                    v.trim().parse::<f64>().map_err(|_| {
                        ThumbnailError::InvalidParameter(format!("bad focal coordinate: {}", v))
                    })
                };
                Ok(Self::focal(parse(fx)?, parse(fy)?))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleBy {
    Width,
    Height,
}

/// Scale by width when the target is relatively wider than the source, by
/// height otherwise. Either way the resized image covers the target.
pub fn select_scale_dimension(target_w: u32, target_h: u32, source_w: u32, source_h: u32) -> ScaleBy {
    let target = target_w as f64 / target_h as f64;
    let source = source_w as f64 / source_h.max(1) as f64;
    if target > source {
        ScaleBy::Width
    } else {
        ScaleBy::Height
    }
}

/// Width and height arguments for the resize step. The free dimension is
/// capped only by the configured maximum.
pub fn scale_step(by: ScaleBy, target_w: u32, target_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    match by {
        ScaleBy::Width => (target_w, max_h),
        ScaleBy::Height => (max_w, target_h),
    }
}

/// Width and page height as they will be displayed. Orientations 5-8 are
/// quarter turns, so the stored extents swap.
pub fn display_extent(width: u32, page_height: u32, orientation: u8) -> (u32, u32) {
    if orientation > 4 {
        (page_height, width)
    } else {
        (width, page_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl ExtractRect {
    fn clamped(left: f64, top: f64, scaled_w: u32, scaled_h: u32, w: u32, h: u32) -> Self {
        let width = w.min(scaled_w);
        let height = h.min(scaled_h);
        let max_left = (scaled_w - width) as f64;
        let max_top = (scaled_h - height) as f64;
        Self {
            left: left.min(max_left).max(0.0) as u32,
            top: top.min(max_top).max(0.0) as u32,
            width,
            height,
        }
    }

    pub fn is_whole(&self, scaled_w: u32, scaled_h: u32) -> bool {
        self.left == 0 && self.top == 0 && self.width == scaled_w && self.height == scaled_h
    }
}

/// Rectangle kept after the resize step, or `None` when the policy does not
/// extract.
pub fn extraction_rect(
    policy: CropPolicy,
    scaled_w: u32,
    scaled_page_h: u32,
    w: u32,
    h: u32,
) -> Option<ExtractRect> {
    if !policy.extracts(w, h) {
        return None;
    }
    let spare_w = scaled_w as f64 - w as f64;
    let spare_h = scaled_page_h as f64 - h as f64;
    let (left, top) = match policy {
        CropPolicy::HighAnchor => (spare_w, spare_h),
        CropPolicy::Centre | CropPolicy::Attention | CropPolicy::DownOnly => {
            ((spare_w / 2.0).floor(), (spare_h / 2.0).floor())
        }
        CropPolicy::FocalPoint { fx, fy } => return Some(focal_rect(scaled_w, scaled_page_h, w, h, fx, fy)),
        CropPolicy::None | CropPolicy::Force => (0.0, 0.0),
    };
    Some(ExtractRect::clamped(left, top, scaled_w, scaled_page_h, w, h))
}

pub fn focal_rect(scaled_w: u32, scaled_page_h: u32, w: u32, h: u32, fx: f64, fy: f64) -> ExtractRect {
    let left = scaled_w as f64 * fx - w as f64 / 2.0;
    let top = scaled_page_h as f64 * fy - h as f64 / 2.0;
    ExtractRect::clamped(left, top, scaled_w, scaled_page_h, w, h)
}
