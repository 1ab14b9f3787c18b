// thumbgate/src/utils/mod.rs
use crate::core::blob::BlobType;
use std::path::{Path, PathBuf};

/// Sniffs the container type from the first bytes of an encoded image.
pub fn detect_blob_type(bytes: &[u8]) -> BlobType {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => BlobType::Jpeg,
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => BlobType::Png,
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => BlobType::Gif,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => BlobType::Webp,
        [b'%', b'P', b'D', b'F', ..] => BlobType::Pdf,
        [b'B', b'M', ..] => BlobType::Bmp,
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => BlobType::Tiff,
        _ => BlobType::Unknown,
    }
}

pub fn generate_output_path(input_path: &Path, output_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let extension = input_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png");
    let filename = format!("{}_{}.{}", stem, suffix, extension);

    match output_dir {
        Some(dir) => dir.join(filename),
        None => input_path.with_file_name(filename),
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as usize).min(UNITS.len() - 1);
    let size = bytes_f64 / base.powi(exponent as i32);

    format!("{:.2} {}", size, UNITS[exponent])
}

pub fn is_supported_format(path: &Path) -> bool {
    const EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

    get_file_extension(path)
        .map(|ext| EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_magic_bytes() {
        assert_eq!(detect_blob_type(b"\xFF\xD8\xFF\xE0"), BlobType::Jpeg);
        assert_eq!(detect_blob_type(b"\x89PNG\r\n\x1a\n"), BlobType::Png);
        assert_eq!(detect_blob_type(b"GIF87a"), BlobType::Gif);
        assert_eq!(detect_blob_type(b"RIFF\0\0\0\0WEBPVP8 "), BlobType::Webp);
        assert_eq!(detect_blob_type(b"%PDF-1.4"), BlobType::Pdf);
        assert_eq!(detect_blob_type(b"II*\0"), BlobType::Tiff);
        assert_eq!(detect_blob_type(b"BM"), BlobType::Bmp);
        assert_eq!(detect_blob_type(b"RIFF\0\0\0\0WAVE"), BlobType::Unknown);
        assert_eq!(detect_blob_type(b""), BlobType::Unknown);
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
    }

    #[test]
    fn output_path_keeps_extension() {
        let path = generate_output_path(Path::new("/in/cat.JPG"), Some(Path::new("/out")), "thumb");
        assert_eq!(path, PathBuf::from("/out/cat_thumb.JPG"));
        let path = generate_output_path(Path::new("/in/dog.gif"), None, "thumb");
        assert_eq!(path, PathBuf::from("/in/dog_thumb.gif"));
    }

    #[test]
    fn supported_extensions_ignore_case() {
        assert!(is_supported_format(Path::new("a.WebP")));
        assert!(!is_supported_format(Path::new("a.pdf")));
        assert!(!is_supported_format(Path::new("noext")));
    }
}
