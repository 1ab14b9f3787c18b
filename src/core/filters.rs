// thumbgate/src/core/filters.rs
//! Post-thumbnail filters.
//!
//! The set of filters is closed: [`FilterKind`] names every one. A
//! [`FilterRegistry`] is built once from config, and a misspelt name in the
//! disable list fails there rather than on some later request.

use super::{Result, ThumbnailError};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Grayscale,
    Brightness,
    Contrast,
    Hue,
    Blur,
    Sharpen,
    Rotate,
    StripExif,
}

impl FilterKind {
    pub const ALL: [FilterKind; 8] = [
        FilterKind::Grayscale,
        FilterKind::Brightness,
        FilterKind::Contrast,
        FilterKind::Hue,
        FilterKind::Blur,
        FilterKind::Sharpen,
        FilterKind::Rotate,
        FilterKind::StripExif,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Hue => "hue",
            Self::Blur => "blur",
            Self::Sharpen => "sharpen",
            Self::Rotate => "rotate",
            Self::StripExif => "strip_exif",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ThumbnailError::UnsupportedFilter(s.to_string()))
    }
}

/// A filter with its arguments parsed and range-checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOp {
    Grayscale,
    /// Added to every channel, -255..=255.
    Brightness(i32),
    /// Percent change, -100..=100.
    Contrast(f32),
    /// Hue rotation in degrees.
    Hue(i32),
    Blur(f32),
    Sharpen { sigma: f32, threshold: i32 },
    /// Clockwise, one of 90, 180, 270.
    Rotate(u16),
    StripExif,
}

impl FilterOp {
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::Grayscale => FilterKind::Grayscale,
            Self::Brightness(_) => FilterKind::Brightness,
            Self::Contrast(_) => FilterKind::Contrast,
            Self::Hue(_) => FilterKind::Hue,
            Self::Blur(_) => FilterKind::Blur,
            Self::Sharpen { .. } => FilterKind::Sharpen,
            Self::Rotate(_) => FilterKind::Rotate,
            Self::StripExif => FilterKind::StripExif,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterRegistry {
    enabled: HashSet<FilterKind>,
}

impl FilterRegistry {
    pub fn new(disabled: &[String]) -> Result<Self> {
        let mut enabled: HashSet<FilterKind> = FilterKind::ALL.into_iter().collect();
        for name in disabled {
            let kind: FilterKind = name.trim().parse()?;
            enabled.remove(&kind);
        }
        Ok(Self { enabled })
    }

    pub fn is_enabled(&self, kind: FilterKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Parses `name(arg,...)` into a typed op, refusing disabled filters.
    pub fn parse(&self, expr: &str) -> Result<FilterOp> {
        let expr = expr.trim();
        let (name, args) = match expr.find('(') {
            Some(open) => {
                let close = expr.rfind(')').filter(|&c| c > open).ok_or_else(|| {
                    ThumbnailError::InvalidParameter(format!("unbalanced filter: {}", expr))
                })?;
                (&expr[..open], &expr[open + 1..close])
            }
            None => (expr, ""),
        };

        let kind: FilterKind = name.trim().parse()?;
        if !self.is_enabled(kind) {
            return Err(ThumbnailError::UnsupportedFilter(kind.to_string()));
        }

        let args: Vec<&str> = args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect();

        build_op(kind, &args)
    }
}

fn build_op(kind: FilterKind, args: &[&str]) -> Result<FilterOp> {
    let op = match kind {
        FilterKind::Grayscale => FilterOp::Grayscale,
        FilterKind::StripExif => FilterOp::StripExif,
        FilterKind::Brightness => FilterOp::Brightness(arg::<i32>(kind, args, 0)?.clamp(-255, 255)),
        FilterKind::Contrast => FilterOp::Contrast(arg::<f32>(kind, args, 0)?.clamp(-100.0, 100.0)),
        FilterKind::Hue => FilterOp::Hue(arg(kind, args, 0)?),
        FilterKind::Blur => {
            let sigma: f32 = arg(kind, args, 0)?;
            if sigma <= 0.0 {
                return Err(invalid(kind, "sigma must be positive"));
            }
            FilterOp::Blur(sigma)
        }
        FilterKind::Sharpen => {
            let sigma: f32 = arg(kind, args, 0)?;
            let threshold = match args.get(1) {
                Some(_) => arg(kind, args, 1)?,
                None => 0,
            };
            FilterOp::Sharpen { sigma, threshold }
        }
        FilterKind::Rotate => {
            let degrees: i32 = arg(kind, args, 0)?;
            match degrees.rem_euclid(360) {
                0 => return Err(invalid(kind, "rotation must not be a multiple of 360")),
                d @ (90 | 180 | 270) => FilterOp::Rotate(d as u16),
                _ => return Err(invalid(kind, "rotation must be a multiple of 90")),
            }
        }
    };
    Ok(op)
}

fn arg<T: FromStr>(kind: FilterKind, args: &[&str], index: usize) -> Result<T> {
    let raw = args
        .get(index)
        .ok_or_else(|| invalid(kind, &format!("missing argument {}", index + 1)))?;
    raw.parse()
        .map_err(|_| invalid(kind, &format!("bad argument '{}'", raw)))
}

fn invalid(kind: FilterKind, reason: &str) -> ThumbnailError {
    ThumbnailError::InvalidParameter(format!("{}: {}", kind, reason))
}
