//! QR rendering for issued tokens.
//!
//! The issuer only needs "string in, image bytes out", so rendering sits
//! behind [`QrEncoder`] and the PNG implementation is swappable in tests.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("qr encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("png encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

pub trait QrEncoder: Send + Sync {
    fn encode(&self, data: &str) -> Result<Vec<u8>, QrError>;
}

/// Rendering parameters.
#[derive(Debug, Clone)]
pub struct QrConfig {
    /// Edge length of one QR module, in pixels.
    pub module_size: u32,
    /// Surround the code with the standard 4-module white border.
    pub quiet_zone: bool,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            module_size: 10,
            quiet_zone: true,
        }
    }
}

/// Black-on-white PNG with low error correction; the symbol version is
/// picked automatically to fit the data.
pub struct PngQrEncoder {
    config: QrConfig,
}

impl PngQrEncoder {
    pub fn new(config: QrConfig) -> Self {
        Self { config }
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, data: &str) -> Result<Vec<u8>, QrError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)?;

        let module = self.config.module_size.max(1);
        let img = code
            .render::<Luma<u8>>()
            .module_dimensions(module, module)
            .quiet_zone(self.config.quiet_zone)
            .build();

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img).write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn decode(png: &[u8]) -> String {
        let img = image::load_from_memory(png).unwrap().to_luma8();
        let (w, h) = img.dimensions();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
            img.get_pixel(x as u32, y as u32).0[0]
        });
        let grids = prepared.detect_grids();
        assert_eq!(grids.len(), 1, "expected exactly one QR symbol");
        let (_meta, content) = grids[0].decode().unwrap();
        content
    }

    #[test]
    fn test_encode_produces_png() {
        let encoder = PngQrEncoder::new(QrConfig::default());
        let png = encoder.encode("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[test]
    fn test_encoded_png_scans_back_to_value() {
        let value = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
        let encoder = PngQrEncoder::new(QrConfig::default());
        let png = encoder.encode(value).unwrap();
        assert_eq!(decode(&png), value);
    }

    #[test]
    fn test_module_size_scales_image() {
        let value = "scale-check";
        let small = PngQrEncoder::new(QrConfig { module_size: 2, quiet_zone: true })
            .encode(value)
            .unwrap();
        let large = PngQrEncoder::new(QrConfig { module_size: 10, quiet_zone: true })
            .encode(value)
            .unwrap();

        let small = image::load_from_memory(&small).unwrap();
        let large = image::load_from_memory(&large).unwrap();
        assert_eq!(large.width(), small.width() * 5);
    }

    #[test]
    fn test_oversized_payload_is_an_error() {
        let encoder = PngQrEncoder::new(QrConfig::default());
        let too_long = "x".repeat(8_000);
        assert!(matches!(encoder.encode(&too_long), Err(QrError::Encode(_))));
    }
}
