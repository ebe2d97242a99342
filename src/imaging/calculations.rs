//! Pure calculation functions for region geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//! Requested coordinates may reach ±2^31 and are combined with image bounds,
//! so every intermediate value is computed in `i64`.

use super::params::{Operation, Rect, RequestedRect};

/// Intersect a requested area with a bounding rectangle.
///
/// The requested area is normalized first, so a negative width or height
/// behaves exactly like the equivalent positive rectangle. The result is
/// [`Rect::EMPTY`] unless the overlap is strictly positive on both axes.
///
/// # Examples
/// ```
/// # use image_transformer::imaging::{Rect, RequestedRect, intersect};
/// let bounds = Rect::from_size(100, 100);
/// let clipped = intersect(bounds, RequestedRect::new(-5, -30, 200, 50));
/// assert_eq!(clipped, Rect::new(0, 0, 100, 20));
/// ```
pub fn intersect(bounds: Rect, requested: RequestedRect) -> Rect {
    let area = requested.normalized();

    let x1 = i64::from(bounds.x).max(area.x);
    let x2 = bounds.right().min(area.x + area.width);
    let y1 = i64::from(bounds.y).max(area.y);
    let y2 = bounds.bottom().min(area.y + area.height);

    if x2 <= x1 || y2 <= y1 {
        return Rect::EMPTY;
    }

    // x1 >= bounds.x and x2 <= bounds.right(), so every value fits in u32.
    Rect::new(
        x1 as u32,
        y1 as u32,
        (x2 - x1) as u32,
        (y2 - y1) as u32,
    )
}

/// Intersect a requested area with an image of the given size.
pub fn clip_to_size(width: u32, height: u32, requested: RequestedRect) -> Rect {
    intersect(Rect::from_size(width, height), requested)
}

/// Bounds the requested area is clipped against for `operation`.
///
/// Rotations crop in the rotated coordinate space, so their bounds have width
/// and height swapped.
pub fn output_bounds(operation: Operation, width: u32, height: u32) -> Rect {
    if operation.swaps_axes() {
        Rect::from_size(height, width)
    } else {
        Rect::from_size(width, height)
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
