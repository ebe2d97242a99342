//! Image codec trait and shared types.
//!
//! The [`ImageCodec`] trait defines the three operations the request pipeline
//! needs from a codec: identify, decode and encode. Geometry and color work
//! happens on the decoded [`RgbaImage`], so the codec is the only place that
//! knows about a wire format.
//!
//! The production implementation is [`PngCodec`](super::png_codec::PngCodec).

use image::RgbaImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported image format (expected {expected})")]
    UnsupportedFormat { expected: &'static str },
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image codecs.
///
/// Implementations must be shareable across worker threads; every request
/// decodes into its own buffer, so no codec state is shared between requests.
pub trait ImageCodec: Send + Sync {
    /// Read the image dimensions from the header without decoding pixels.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, CodecError>;

    /// Decode the full image into an RGBA buffer.
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, CodecError>;

    /// Encode an RGBA buffer into the codec's wire format.
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, CodecError>;
}
