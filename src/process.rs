//! The per-request transformation pipeline.
//!
//! Runs on a worker after admission, entirely synchronous:
//!
//! ```text
//! RawRequest ──validate──▶ TransformRequest
//!            ──output_bounds + intersect──▶ Rect
//!            ──apply──▶ RgbaImage
//!            ──encode──▶ PNG bytes
//! ```
//!
//! An empty clipped region short-circuits before any pixel work and is
//! reported as [`ProcessError::EmptyRegion`]; the server turns that into 204.

use crate::imaging::{CodecError, ImageCodec, PngCodec, apply, intersect, output_bounds};
use crate::request::{RequestValidator, TransformRequest, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("requested area does not overlap the image")]
    EmptyRegion,
    #[error("internal error: {0}")]
    Internal(#[from] CodecError),
}

/// The parts of an HTTP request the pipeline looks at.
#[derive(Debug, Clone, Copy)]
pub struct RawRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub content_length: Option<u64>,
    pub body: &'a [u8],
}

pub fn process(validator: &RequestValidator, request: RawRequest<'_>) -> Result<Vec<u8>, ProcessError> {
    process_with_codec(&PngCodec::new(), validator, request)
}

/// Process a request using a specific codec (allows testing with mock).
pub fn process_with_codec(
    codec: &impl ImageCodec,
    validator: &RequestValidator,
    request: RawRequest<'_>,
) -> Result<Vec<u8>, ProcessError> {
    let TransformRequest {
        operation,
        area,
        image,
    } = validator.validate(
        codec,
        request.method,
        request.path,
        request.content_length,
        request.body,
    )?;

    let bounds = output_bounds(operation, image.width(), image.height());
    let region = intersect(bounds, area);
    if region.is_empty() {
        return Err(ProcessError::EmptyRegion);
    }

    let output = apply(operation, image, region);
    Ok(codec.encode(&output)?)
}
