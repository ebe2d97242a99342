//! PNG codec built on the `image` crate, pure Rust and statically linked.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Format sniffing | `image::guess_format` (magic bytes, not headers) |
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode | `image::ImageReader::decode` → `into_rgba8` |
//! | Encode | `image::codecs::png::PngEncoder` (RGBA8) |
//!
//! Only PNG is accepted on input. Anything else is rejected before a decoder
//! is chosen, even when the `image` crate could read it.

use super::backend::{CodecError, Dimensions, ImageCodec};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// PNG-only codec used by the service.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl PngCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Build a reader pinned to PNG, rejecting any other magic bytes.
fn png_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, CodecError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => {}
        _ => return Err(CodecError::UnsupportedFormat { expected: "PNG" }),
    }
    let mut reader = ImageReader::new(Cursor::new(bytes));
    reader.set_format(ImageFormat::Png);
    Ok(reader)
}

impl ImageCodec for PngCodec {
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, CodecError> {
        let (width, height) = png_reader(bytes)?
            .into_dimensions()
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, CodecError> {
        png_reader(bytes)?
            .decode()
            .map(|img| img.into_rgba8())
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }
}
