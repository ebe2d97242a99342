//! Transformation dispatch.
//!
//! Maps an [`Operation`] onto `image::imageops` primitives and the color
//! [`filters`](super::filters). The caller clips the requested area against
//! [`output_bounds`](super::calculations::output_bounds) first and only
//! dispatches non-empty regions.
//!
//! Geometric operations transform the whole image and then crop, because the
//! region is expressed in the transformed coordinate space. Color filters crop
//! first so only the returned pixels are touched.

use super::filters;
use super::params::{Operation, Rect};
use image::RgbaImage;
use image::imageops;

fn crop(image: &RgbaImage, region: Rect) -> RgbaImage {
    imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image()
}

/// Apply `operation` to `image` and return the `region` of the result.
///
/// Consumes the input; the returned image is a fresh buffer of exactly
/// `region.width × region.height` pixels.
pub fn apply(operation: Operation, mut image: RgbaImage, region: Rect) -> RgbaImage {
    debug_assert!(!region.is_empty(), "dispatch requires a non-empty region");

    match operation {
        Operation::RotateCw => crop(&imageops::rotate90(&image), region),
        Operation::RotateCcw => crop(&imageops::rotate270(&image), region),
        Operation::FlipH => {
            imageops::flip_horizontal_in_place(&mut image);
            crop(&image, region)
        }
        Operation::FlipV => {
            imageops::flip_vertical_in_place(&mut image);
            crop(&image, region)
        }
        Operation::Grayscale => {
            let mut out = crop(&image, region);
            filters::grayscale(&mut out);
            out
        }
        Operation::Sepia => {
            let mut out = crop(&image, region);
            filters::sepia(&mut out);
            out
        }
        Operation::Threshold(percent) => {
            let mut out = crop(&image, region);
            filters::threshold(&mut out, percent);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::calculations::{intersect, output_bounds};
    use crate::imaging::params::RequestedRect;
    use image::Rgba;

    /// 3×2 image where every pixel has a distinct red value: `10 * y + x`.
    fn numbered() -> RgbaImage {
        RgbaImage::from_fn(3, 2, |x, y| Rgba([(10 * y + x) as u8, 0, 0, 255]))
    }

    fn reds(image: &RgbaImage) -> Vec<Vec<u8>> {
        (0..image.height())
            .map(|y| (0..image.width()).map(|x| image.get_pixel(x, y)[0]).collect())
            .collect()
    }

    fn full(operation: Operation, image: &RgbaImage) -> Rect {
        output_bounds(operation, image.width(), image.height())
    }

    #[test]
    fn rotate_cw_full_image() {
        let img = numbered();
        let region = full(Operation::RotateCw, &img);
        let out = apply(Operation::RotateCw, img, region);
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(reds(&out), vec![vec![10, 0], vec![11, 1], vec![12, 2]]);
    }

    #[test]
    fn rotate_ccw_full_image() {
        let img = numbered();
        let region = full(Operation::RotateCcw, &img);
        let out = apply(Operation::RotateCcw, img, region);
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(reds(&out), vec![vec![2, 12], vec![1, 11], vec![0, 10]]);
    }

    #[test]
    fn rotate_crops_in_rotated_space() {
        let img = numbered();
        // Bottom row of the rotated 2×3 image; out of range for the original height.
        let region = intersect(
            full(Operation::RotateCw, &img),
            RequestedRect::new(0, 2, 2, 1),
        );
        assert_eq!(region, Rect::new(0, 2, 2, 1));
        let out = apply(Operation::RotateCw, img, region);
        assert_eq!(reds(&out), vec![vec![12, 2]]);
    }

    #[test]
    fn flips_mirror_then_crop() {
        let out = apply(Operation::FlipH, numbered(), Rect::new(0, 0, 3, 2));
        assert_eq!(reds(&out), vec![vec![2, 1, 0], vec![12, 11, 10]]);

        let out = apply(Operation::FlipV, numbered(), Rect::new(0, 0, 3, 2));
        assert_eq!(reds(&out), vec![vec![10, 11, 12], vec![0, 1, 2]]);

        let out = apply(Operation::FlipH, numbered(), Rect::new(1, 1, 2, 1));
        assert_eq!(reds(&out), vec![vec![11, 10]]);
    }

    #[test]
    fn color_filters_only_return_the_region() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let out = apply(Operation::Grayscale, img, Rect::new(2, 3, 4, 5));
        assert_eq!(out.dimensions(), (4, 5));
        assert!(out.pixels().all(|p| *p == Rgba([85, 85, 85, 255])));
    }

    #[test]
    fn sepia_and_threshold_dispatch() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let out = apply(Operation::Sepia, img.clone(), Rect::from_size(2, 2));
        assert_eq!(*out.get_pixel(1, 1), Rgba([100, 88, 69, 255]));

        let out = apply(Operation::Threshold(90), img, Rect::new(1, 1, 1, 1));
        assert_eq!(out.dimensions(), (1, 1));
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }
}
