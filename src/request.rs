//! Request validation.
//!
//! Turns the raw pieces of an HTTP request into a typed [`TransformRequest`].
//! Checks run in a fixed order and each failure has its own
//! [`ValidationError`] variant:
//!
//! 1. Method is `POST`
//! 2. `0 < Content-Length <= max_body_bytes`
//! 3. Path is exactly `/process/<operation>/<x>,<y>,<w>,<h>`
//! 4. Four coordinates, each an `i64` with magnitude at most 2^31
//! 5. Known operation; `threshold` takes an integer percentage in parentheses
//! 6. Body is a PNG within the configured dimensions
//!
//! ## Path grammar
//!
//! ```text
//! /process/rotate-cw/0,0,100,100
//! /process/threshold(30)/-5,-30,200,50
//!          └─ operation ─┘ └ x,y,w,h ┘
//! ```
//!
//! The keyword is case-sensitive, there are exactly two segments after it, and
//! a trailing slash is an error. Nothing is percent-decoded.

use crate::config::LimitsConfig;
use crate::imaging::{CodecError, ImageCodec, MAX_COORDINATE, Operation, RequestedRect};
use image::RgbaImage;
use thiserror::Error;

const PROCESS_PREFIX: &str = "/process/";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("method {0} is not allowed, expected POST")]
    Method(String),
    #[error("body length {length:?} is outside 1..={max}")]
    BodyLength { length: Option<u64>, max: usize },
    #[error("path does not match /process/<operation>/<x>,<y>,<w>,<h>")]
    Path,
    #[error("invalid coordinates: {0}")]
    Coordinates(String),
    #[error("unknown operation: {0}")]
    Operation(String),
    #[error("invalid threshold parameter: {0}")]
    ThresholdParameter(String),
    #[error("body is not a PNG image")]
    UnsupportedFormat,
    #[error("body could not be decoded: {0}")]
    Body(String),
    #[error("image is {width}x{height}, larger than {max_width}x{max_height}")]
    Dimensions {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
}

impl From<CodecError> for ValidationError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedFormat { .. } => ValidationError::UnsupportedFormat,
            other => ValidationError::Body(other.to_string()),
        }
    }
}

/// Operation and area parsed from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub operation: Operation,
    pub area: RequestedRect,
}

/// A fully validated request, owning its decoded image.
#[derive(Debug)]
pub struct TransformRequest {
    pub operation: Operation,
    pub area: RequestedRect,
    pub image: RgbaImage,
}

/// Size limits applied during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_body_bytes: usize,
    pub max_image_width: u32,
    pub max_image_height: u32,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for RequestLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            max_image_width: config.max_image_width,
            max_image_height: config.max_image_height,
        }
    }
}

/// Validates requests against a fixed set of limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator {
    limits: RequestLimits,
}

impl RequestValidator {
    pub fn new(limits: RequestLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> RequestLimits {
        self.limits
    }

    /// Whether a declared body length is acceptable.
    pub fn accepts_length(&self, content_length: Option<u64>) -> bool {
        matches!(content_length, Some(n) if n > 0 && n <= self.limits.max_body_bytes as u64)
    }

    /// Run every check in order and decode the body.
    pub fn validate(
        &self,
        codec: &impl ImageCodec,
        method: &str,
        path: &str,
        content_length: Option<u64>,
        body: &[u8],
    ) -> Result<TransformRequest, ValidationError> {
        if method != "POST" {
            return Err(ValidationError::Method(method.to_string()));
        }
        if !self.accepts_length(content_length) {
            return Err(ValidationError::BodyLength {
                length: content_length,
                max: self.limits.max_body_bytes,
            });
        }
        let Route { operation, area } = parse_route(path)?;
        let image = self.decode_body(codec, body)?;
        Ok(TransformRequest {
            operation,
            area,
            image,
        })
    }

    fn decode_body(&self, codec: &impl ImageCodec, body: &[u8]) -> Result<RgbaImage, ValidationError> {
        // Check the header first so oversized images are never decoded.
        let dims = codec.identify(body)?;
        if dims.width > self.limits.max_image_width || dims.height > self.limits.max_image_height {
            return Err(ValidationError::Dimensions {
                width: dims.width,
                height: dims.height,
                max_width: self.limits.max_image_width,
                max_height: self.limits.max_image_height,
            });
        }
        Ok(codec.decode(body)?)
    }
}

/// Split `/process/<operation>/<coords>` and parse both segments.
///
/// Coordinates are checked before the operation name.
pub fn parse_route(path: &str) -> Result<Route, ValidationError> {
    let rest = path
        .strip_prefix(PROCESS_PREFIX)
        .ok_or(ValidationError::Path)?;
    let mut segments = rest.split('/');
    let (Some(operation), Some(coords), None) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(ValidationError::Path);
    };
    if operation.is_empty() || coords.is_empty() {
        return Err(ValidationError::Path);
    }

    let area = parse_area(coords)?;
    let operation = parse_operation(operation)?;
    Ok(Route { operation, area })
}

/// Parse `x,y,w,h` into a [`RequestedRect`].
pub fn parse_area(segment: &str) -> Result<RequestedRect, ValidationError> {
    let values = segment
        .split(',')
        .map(parse_coordinate)
        .collect::<Result<Vec<_>, _>>()?;
    match values[..] {
        [x, y, width, height] => Ok(RequestedRect::new(x, y, width, height)),
        _ => Err(ValidationError::Coordinates(format!(
            "expected 4 values, got {}",
            values.len()
        ))),
    }
}

/// A leading `+` is allowed, as `i64::from_str` accepts it.
fn parse_coordinate(token: &str) -> Result<i64, ValidationError> {
    let value: i64 = token
        .parse()
        .map_err(|_| ValidationError::Coordinates(format!("'{token}' is not an integer")))?;
    if value.unsigned_abs() > MAX_COORDINATE.unsigned_abs() {
        return Err(ValidationError::Coordinates(format!(
            "{value} exceeds ±{MAX_COORDINATE}"
        )));
    }
    Ok(value)
}

/// Map a URL operation name onto an [`Operation`].
pub fn parse_operation(name: &str) -> Result<Operation, ValidationError> {
    match name {
        "rotate-cw" => Ok(Operation::RotateCw),
        "rotate-ccw" => Ok(Operation::RotateCcw),
        "flip-h" => Ok(Operation::FlipH),
        "flip-v" => Ok(Operation::FlipV),
        "grayscale" => Ok(Operation::Grayscale),
        "sepia" => Ok(Operation::Sepia),
        _ => match name.strip_prefix("threshold") {
            Some(param) => parse_threshold(param).map(Operation::Threshold),
            None => Err(ValidationError::Operation(name.to_string())),
        },
    }
}

/// Parse the `(N)` suffix of `threshold(N)`.
fn parse_threshold(param: &str) -> Result<u8, ValidationError> {
    let invalid = || ValidationError::ThresholdParameter(param.to_string());

    let digits = param
        .strip_prefix('(')
        .and_then(|p| p.strip_suffix(')'))
        .ok_or_else(invalid)?;
    // Reject signs, fractions and whitespace that `parse` would otherwise allow or misreport.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match digits.parse::<u32>() {
        Ok(percent) if percent <= 100 => Ok(percent as u8),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::PngCodec;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder, Rgba};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
            .unwrap();
        out
    }

    fn validate(method: &str, path: &str, body: &[u8]) -> Result<TransformRequest, ValidationError> {
        RequestValidator::default().validate(
            &PngCodec::new(),
            method,
            path,
            Some(body.len() as u64),
            body,
        )
    }

    // =========================================================================
    // Path structure
    // =========================================================================

    #[test]
    fn parse_route_accepts_every_operation() {
        let cases = [
            ("rotate-cw", Operation::RotateCw),
            ("rotate-ccw", Operation::RotateCcw),
            ("flip-h", Operation::FlipH),
            ("flip-v", Operation::FlipV),
            ("grayscale", Operation::Grayscale),
            ("sepia", Operation::Sepia),
            ("threshold(30)", Operation::Threshold(30)),
        ];
        for (name, expected) in cases {
            let route = parse_route(&format!("/process/{name}/-5,-30,200,50")).unwrap();
            assert_eq!(route.operation, expected);
            assert_eq!(route.area, RequestedRect::new(-5, -30, 200, 50));
        }
    }

    #[test]
    fn parse_route_rejects_bad_structure() {
        for path in [
            "/grayscale/-5,-30,200,50",
            "/process/",
            "/process/grayscale",
            "/process/grayscale/",
            "/processgrayscale-5,-30,200,50",
            "//process//grayscale//-5,-30,200,50",
            "///",
            "/PROCESS/GRAYSCALE/-5,-30,200,50",
            "/process/grayscale/-5,-30,200,50/",
            "/process/grayscale/extra/-5,-30,200,50",
            "/process//-5,-30,200,50",
            "process/grayscale/-5,-30,200,50",
        ] {
            assert_eq!(
                parse_route(path),
                Err(ValidationError::Path),
                "expected path error for {path}"
            );
        }
    }

    #[test]
    fn coordinates_are_checked_before_operation() {
        assert!(matches!(
            parse_route("/process/bogus/1,2,3"),
            Err(ValidationError::Coordinates(_))
        ));
        assert_eq!(
            parse_route("/process/bogus/1,2,3,4"),
            Err(ValidationError::Operation("bogus".to_string()))
        );
    }

    // =========================================================================
    // Coordinates
    // =========================================================================

    #[test]
    fn parse_area_rejects_malformed_lists() {
        for segment in [
            "-5,-30,200",
            "-5,-30,200,50,50",
            ",,,",
            "-5-3020050",
            "1,2,3,x",
            "1.5,2,3,4",
            "1,2,3,4?x=1",
        ] {
            assert!(
                matches!(parse_area(segment), Err(ValidationError::Coordinates(_))),
                "expected coordinate error for {segment}"
            );
        }
    }

    #[test]
    fn explicit_plus_sign_is_accepted() {
        assert_eq!(
            parse_area("+5,-5,+10,10").unwrap(),
            RequestedRect::new(5, -5, 10, 10)
        );
        assert!(parse_area("++5,0,1,1").is_err());
        assert!(parse_area("+-5,0,1,1").is_err());
    }

    #[test]
    fn coordinate_magnitude_limit_is_inclusive() {
        assert_eq!(
            parse_area("2147483648,-2147483648,2147483648,-2147483648").unwrap(),
            RequestedRect::new(MAX_COORDINATE, -MAX_COORDINATE, MAX_COORDINATE, -MAX_COORDINATE)
        );
        assert!(parse_area("-5,-30,200,2147483649").is_err());
        assert!(parse_area("-5,-30,200,-2147483649").is_err());
        assert!(parse_area("9223372036854775807,0,0,0").is_err());
        assert!(parse_area("-9223372036854775808,0,0,0").is_err());
        assert!(parse_area("99999999999999999999,0,0,0").is_err());
    }

    // =========================================================================
    // Operations
    // =========================================================================

    #[test]
    fn unknown_operations_rejected() {
        for name in ["gray", "sep", "thres", "rotate", "Grayscale", "grayscale(5)"] {
            assert_eq!(
                parse_operation(name),
                Err(ValidationError::Operation(name.to_string()))
            );
        }
    }

    #[test]
    fn threshold_accepts_full_range() {
        assert_eq!(parse_operation("threshold(0)"), Ok(Operation::Threshold(0)));
        assert_eq!(parse_operation("threshold(100)"), Ok(Operation::Threshold(100)));
        assert_eq!(parse_operation("threshold(007)"), Ok(Operation::Threshold(7)));
    }

    #[test]
    fn threshold_rejects_bad_parameters() {
        for name in [
            "threshold(abc)",
            "threshold(-1)",
            "threshold(101)",
            "threshold(5.5)",
            "threshold(3147483648)",
            "threshold(99999999999999999999)",
            "threshold(+5)",
            "threshold( 5)",
            "threshold",
            "threshold()",
            "threshold(",
            "threshold)",
            "threshold(5",
            "threshold5)",
            "threshold((5))",
        ] {
            assert!(
                matches!(
                    parse_operation(name),
                    Err(ValidationError::ThresholdParameter(_))
                ),
                "expected threshold error for {name}"
            );
        }
    }

    // =========================================================================
    // Full validation
    // =========================================================================

    #[test]
    fn validate_accepts_well_formed_request() {
        let request = validate("POST", "/process/sepia/0,0,10,10", &png(20, 10)).unwrap();
        assert_eq!(request.operation, Operation::Sepia);
        assert_eq!(request.area, RequestedRect::new(0, 0, 10, 10));
        assert_eq!(request.image.dimensions(), (20, 10));
    }

    #[test]
    fn validate_rejects_wrong_method_first() {
        let result = validate("PUT", "/nonsense", b"");
        assert_eq!(result.unwrap_err(), ValidationError::Method("PUT".to_string()));
    }

    #[test]
    fn validate_rejects_body_length() {
        let validator = RequestValidator::default();
        let codec = PngCodec::new();
        let path = "/process/sepia/0,0,1,1";

        for length in [None, Some(0), Some(102401)] {
            let err = validator
                .validate(&codec, "POST", path, length, b"")
                .unwrap_err();
            assert!(matches!(err, ValidationError::BodyLength { .. }), "{length:?}");
        }
        assert!(validator.accepts_length(Some(102400)));
        assert!(validator.accepts_length(Some(1)));
    }

    #[test]
    fn validate_checks_path_before_body() {
        let result = validate("POST", "/process/sepia", b"not a png");
        assert_eq!(result.unwrap_err(), ValidationError::Path);
    }

    #[test]
    fn validate_rejects_non_png_body() {
        let result = validate("POST", "/process/sepia/0,0,1,1", b"GIF89a not really");
        assert_eq!(result.unwrap_err(), ValidationError::UnsupportedFormat);
    }

    #[test]
    fn validate_rejects_corrupt_png() {
        let mut body = png(30, 30);
        body.truncate(body.len() - 20);
        let result = validate("POST", "/process/sepia/0,0,1,1", &body);
        assert!(matches!(result, Err(ValidationError::Body(_))));
    }

    #[test]
    fn validate_rejects_oversized_images() {
        let wide = validate("POST", "/process/flip-h/0,0,1,1", &png(1001, 1000));
        assert!(matches!(
            wide,
            Err(ValidationError::Dimensions {
                width: 1001,
                height: 1000,
                ..
            })
        ));
        let tall = validate("POST", "/process/flip-h/0,0,1,1", &png(1, 1001));
        assert!(matches!(tall, Err(ValidationError::Dimensions { .. })));

        let exact = validate("POST", "/process/flip-h/0,0,1,1", &png(1000, 1000));
        assert!(exact.is_ok());
    }

    #[test]
    fn validate_uses_configured_limits() {
        let validator = RequestValidator::new(RequestLimits {
            max_body_bytes: 100 * 1024,
            max_image_width: 8,
            max_image_height: 8,
        });
        let body = png(9, 4);
        let result = validator.validate(
            &PngCodec::new(),
            "POST",
            "/process/grayscale/0,0,1,1",
            Some(body.len() as u64),
            &body,
        );
        assert!(matches!(result, Err(ValidationError::Dimensions { max_width: 8, .. })));
    }

    #[test]
    fn codec_errors_map_to_body_errors() {
        assert_eq!(
            ValidationError::from(CodecError::UnsupportedFormat { expected: "PNG" }),
            ValidationError::UnsupportedFormat
        );
        assert!(matches!(
            ValidationError::from(CodecError::Decode("eof".into())),
            ValidationError::Body(_)
        ));
    }
}
