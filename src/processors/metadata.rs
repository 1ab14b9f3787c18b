// thumbgate/src/processors/metadata.rs
use crate::core::{Result, ThumbnailError};
use exif::{Exif, In, Reader, Tag};
use image::DynamicImage;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

/// EXIF access: orientation for the decoder, a readable summary for `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataProcessor;

impl MetadataProcessor {
    pub fn new() -> Self {
        Self
    }

    /// EXIF orientation tag of an encoded image, 0 when there is none.
    pub fn read_orientation(&self, bytes: &[u8]) -> u8 {
        let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return 0,
            Err(e) => {
                log::debug!("ignoring unreadable EXIF block: {}", e);
                return 0;
            }
        };
        Self::orientation_of(&exif)
    }

    fn orientation_of(exif: &Exif) -> u8 {
        exif.get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .filter(|v| (1..=8).contains(v))
            .map(|v| v as u8)
            .unwrap_or(0)
    }

    /// Turns a frame stored with `orientation` into display orientation.
    pub fn apply_orientation(image: &DynamicImage, orientation: u8) -> DynamicImage {
        match orientation {
            2 => image.fliph(),
            3 => image.rotate180(),
            4 => image.flipv(),
            5 => image.rotate90().fliph(),
            6 => image.rotate90(),
            7 => image.rotate270().fliph(),
            8 => image.rotate270(),
            _ => image.clone(),
        }
    }

    pub fn read_metadata(&self, path: &Path) -> Result<Option<Exif>> {
        let file = File::open(path)?;
        let mut bufreader = BufReader::new(&file);

        match Reader::new().read_from_container(&mut bufreader) {
            Ok(exif) => {
                log::debug!("Found EXIF data in {}", path.display());
                Ok(Some(exif))
            }
            Err(exif::Error::NotFound(_)) => {
                log::debug!("No EXIF data found in {}", path.display());
                Ok(None)
            }
            Err(e) => {
                log::warn!("Failed to read EXIF from {}: {}", path.display(), e);
                Err(ThumbnailError::InvalidParameter(format!("EXIF read error: {}", e)))
            }
        }
    }

    /// Label/value pairs for the tags worth showing next to a thumbnail.
    pub fn extract_common_metadata(&self, exif: &Exif) -> Vec<(String, String)> {
        const COMMON: [(Tag, &str); 8] = [
            (Tag::Make, "Camera Make"),
            (Tag::Model, "Camera Model"),
            (Tag::DateTimeOriginal, "Original Date/Time"),
            (Tag::Orientation, "Orientation"),
            (Tag::XResolution, "X Resolution"),
            (Tag::YResolution, "Y Resolution"),
            (Tag::Software, "Software"),
            (Tag::Copyright, "Copyright"),
        ];

        COMMON
            .iter()
            .filter_map(|(tag, label)| {
                let field = exif.get_field(*tag, In::PRIMARY)?;
                Some((
                    label.to_string(),
                    field.display_value().with_unit(exif).to_string(),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn marked() -> DynamicImage {
        // 3x2, red pixel in the top-left corner.
        let mut img = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn no_exif_means_unknown_orientation() {
        assert_eq!(MetadataProcessor::new().read_orientation(b"not an image"), 0);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let image = marked();
        for orientation in 5..=8 {
            let turned = MetadataProcessor::apply_orientation(&image, orientation);
            assert_eq!((turned.width(), turned.height()), (2, 3));
        }
        for orientation in [0, 1, 2, 3, 4] {
            let same = MetadataProcessor::apply_orientation(&image, orientation);
            assert_eq!((same.width(), same.height()), (3, 2));
        }
    }

    #[test]
    fn orientation_six_moves_top_left_to_top_right() {
        let turned = MetadataProcessor::apply_orientation(&marked(), 6).to_rgb8();
        assert_eq!(turned.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }
}
