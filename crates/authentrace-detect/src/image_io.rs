//! Image decoding from file paths and inline data URLs.
//!
//! Both entry points return a hard [`AuthentraceError::Input`] naming the
//! offending source when decoding fails; undecodable images are never
//! downgraded to warnings or neutral scores.

use authentrace_core::{AuthentraceError, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image::DynamicImage;
use std::path::Path;

/// URL prefix identifying an inline base64-encoded image.
pub const DATA_IMAGE_PREFIX: &str = "data:image";

/// Decode an image from a file path.
///
/// # Errors
///
/// Returns [`AuthentraceError::Input`] with the path when the file is
/// missing, unreadable, or not a decodable image.
pub fn decode_path(path: &Path) -> Result<DynamicImage> {
    let img = image::open(path).map_err(|e| {
        AuthentraceError::input(format!("failed to decode image {}: {e}", path.display()))
    })?;
    ensure_non_empty(&img, &path.display().to_string())?;
    Ok(img)
}

/// Decode an inline `data:image/...;base64,` URL into an image.
///
/// This is the form embedding pages use for inline `<img>` sources.
///
/// # Errors
///
/// Returns [`AuthentraceError::Input`] when the URL is not a data-image URL,
/// the base64 payload is malformed, or the decoded bytes are not an image.
pub fn decode_data_url(url: &str) -> Result<DynamicImage> {
    if !url.starts_with(DATA_IMAGE_PREFIX) {
        return Err(AuthentraceError::input(format!(
            "not an inline image URL (expected '{DATA_IMAGE_PREFIX}...' prefix)"
        )));
    }
    let payload = url
        .split_once(";base64,")
        .map(|(_, rest)| rest)
        .ok_or_else(|| {
            AuthentraceError::input("inline image URL is missing a base64 payload".to_string())
        })?;
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| AuthentraceError::input(format!("invalid base64 image payload: {e}")))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| AuthentraceError::input(format!("failed to decode inline image: {e}")))?;
    ensure_non_empty(&img, "inline image")?;
    Ok(img)
}

fn ensure_non_empty(img: &DynamicImage, source: &str) -> Result<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(AuthentraceError::input(format!(
            "image {source} is empty (0x0)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_path_missing_file_names_path() {
        let err = decode_path(Path::new("/nonexistent/photo.png")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/photo.png"));
    }

    #[test]
    fn test_decode_path_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_image.jpg");
        std::fs::write(&path, b"definitely not jpeg bytes").unwrap();
        let err = decode_path(&path).unwrap_err();
        assert!(matches!(err, AuthentraceError::Input(_)));
    }

    #[test]
    fn test_decode_data_url_round_trip() {
        let encoded = BASE64_STANDARD.encode(png_bytes());
        let url = format!("data:image/png;base64,{encoded}");
        let img = decode_data_url(&url).unwrap();
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 4);
    }

    #[test]
    fn test_decode_data_url_rejects_plain_url() {
        let err = decode_data_url("https://example.com/cat.png").unwrap_err();
        assert!(matches!(err, AuthentraceError::Input(_)));
    }

    #[test]
    fn test_decode_data_url_rejects_bad_payload() {
        let err = decode_data_url("data:image/png;base64,@@@not-base64@@@").unwrap_err();
        assert!(matches!(err, AuthentraceError::Input(_)));
    }
}
