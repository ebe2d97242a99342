//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. They are the
//! interface between request parsing (which produces them from a URL) and the
//! [`operations`](super::operations) dispatcher (which does the pixel work).
//!
//! ## Types
//!
//! - [`Operation`]: One of the supported transformations, with its parameter.
//! - [`RequestedRect`]: Client-supplied area, signed and possibly inverted.
//! - [`Rect`]: Pixel-space rectangle; zero width or height means empty.

use std::fmt;

/// Largest accepted magnitude for any requested coordinate (2^31).
pub const MAX_COORDINATE: i64 = 1 << 31;

/// A supported transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Rotate 90° clockwise.
    RotateCw,
    /// Rotate 90° counter-clockwise.
    RotateCcw,
    /// Mirror left to right.
    FlipH,
    /// Mirror top to bottom.
    FlipV,
    /// Replace each color channel with the channel mean.
    Grayscale,
    /// Apply the fixed sepia color matrix.
    Sepia,
    /// Binarize; the value is a percentage of full intensity (0–100).
    Threshold(u8),
}

impl Operation {
    /// Whether the operation swaps the image's width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Operation::RotateCw | Operation::RotateCcw)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::RotateCw => f.write_str("rotate-cw"),
            Operation::RotateCcw => f.write_str("rotate-ccw"),
            Operation::FlipH => f.write_str("flip-h"),
            Operation::FlipV => f.write_str("flip-v"),
            Operation::Grayscale => f.write_str("grayscale"),
            Operation::Sepia => f.write_str("sepia"),
            Operation::Threshold(percent) => write!(f, "threshold({percent})"),
        }
    }
}

/// Area requested by the client, before clipping.
///
/// Negative `width`/`height` describe a rectangle drawn leftward/upward from
/// `(x, y)`. Values are kept as `i64` so that `x + width` can never overflow
/// for inputs within [`MAX_COORDINATE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl RequestedRect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Move the stored corner to the geometric minimum so width and height
    /// are non-negative.
    pub fn normalized(self) -> Self {
        let (x, width) = if self.width < 0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for RequestedRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Rectangle in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The full area of an image of the given size.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge, widened so it cannot overflow.
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge, widened so it cannot overflow.
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}
