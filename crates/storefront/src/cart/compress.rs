//! Preview image compression for cart items.
//!
//! Customizer previews arrive as `data:` URLs. Large ones are downscaled and
//! re-encoded as JPEG so a cart snapshot stays within storage quotas.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

/// Previews larger than this (in data URL bytes) are compressed on add.
pub const PREVIEW_COMPRESS_THRESHOLD: usize = 48 * 1024;

/// Errors from preview compression.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("not a base64 data URL")]
    NotDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// How hard to squeeze a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Applied when an item is added to the cart.
    Standard,
    /// Applied once when every storage backend rejected the cart for size.
    Aggressive,
}

impl Compression {
    const fn max_dimension(self) -> u32 {
        match self {
            Self::Standard => 400,
            Self::Aggressive => 200,
        }
    }

    const fn quality(self) -> u8 {
        match self {
            Self::Standard => 70,
            Self::Aggressive => 50,
        }
    }
}

/// Downscale and re-encode a `data:image/...;base64,` URL as JPEG.
///
/// # Errors
///
/// Returns an error if the input is not a base64 data URL or does not decode
/// as a supported image.
pub fn compress_preview(data_url: &str, level: Compression) -> Result<String, CompressError> {
    let (header, payload) = data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or(CompressError::NotDataUrl)?;
    if !header.ends_with(";base64") {
        return Err(CompressError::NotDataUrl);
    }

    let bytes = STANDARD.decode(payload.trim())?;
    let img = image::load_from_memory(&bytes)?;

    let max = level.max_dimension();
    let img = if img.width() > max || img.height() > max {
        img.thumbnail(max, max)
    } else {
        img
    };

    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let encoder = JpegEncoder::new_with_quality(&mut cursor, level.quality());
        img.to_rgb8().write_with_encoder(encoder)?;
    }

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&buffer)))
}

/// Compress a preview if it is over the threshold.
///
/// Small previews and ones that fail to decode are returned unchanged; a
/// broken preview should not block adding an item to the cart.
#[must_use]
pub fn shrink_if_large(data_url: String, level: Compression, threshold: usize) -> String {
    if data_url.len() <= threshold {
        return data_url;
    }
    match compress_preview(&data_url, level) {
        Ok(compressed) if compressed.len() < data_url.len() => compressed,
        Ok(_) => data_url,
        Err(e) => {
            tracing::debug!(error = %e, "Preview compression skipped");
            data_url
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png_data_url(width: u32, height: u32) -> String {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8, 255])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(&bytes))
    }

    fn decoded_dimensions(data_url: &str) -> (u32, u32) {
        let payload = data_url.split_once(',').unwrap().1;
        let img = image::load_from_memory(&STANDARD.decode(payload).unwrap()).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_compress_preview_downscales_to_jpeg() {
        let original = png_data_url(800, 600);
        let compressed = compress_preview(&original, Compression::Standard).unwrap();

        assert!(compressed.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decoded_dimensions(&compressed), (400, 300));
    }

    #[test]
    fn test_aggressive_is_smaller_than_standard() {
        let original = png_data_url(800, 800);
        let standard = compress_preview(&original, Compression::Standard).unwrap();
        let aggressive = compress_preview(&original, Compression::Aggressive).unwrap();

        assert!(aggressive.len() < standard.len());
        assert_eq!(decoded_dimensions(&aggressive), (200, 200));
    }

    #[test]
    fn test_compress_preview_rejects_non_data_url() {
        assert!(matches!(
            compress_preview("https://cdn.example.vn/a.png", Compression::Standard),
            Err(CompressError::NotDataUrl)
        ));
        assert!(matches!(
            compress_preview("data:image/png,raw", Compression::Standard),
            Err(CompressError::NotDataUrl)
        ));
    }

    #[test]
    fn test_shrink_if_large_leaves_small_and_broken_previews() {
        let small = "data:image/png;base64,AAAA".to_string();
        assert_eq!(
            shrink_if_large(small.clone(), Compression::Standard, 1024),
            small
        );

        let broken = format!("data:image/png;base64,{}", "A".repeat(2048));
        assert_eq!(
            shrink_if_large(broken.clone(), Compression::Standard, 1024),
            broken
        );
    }
}
