//! Per-pixel color filters.
//!
//! Filters work in place on RGBA buffers and never touch the alpha channel.
//! Pixels are independent, so the buffer is split into pixel chunks and
//! processed in parallel with [rayon](https://docs.rs/rayon).
//!
//! | Filter | Formula |
//! |---|---|
//! | Grayscale | `R = G = B = (R + G + B) / 3` |
//! | Sepia | fixed 3×3 color matrix, fractions truncated, clamped to 255 |
//! | Threshold(p) | white if `(R + G + B) / 3 >= 255 * p / 100`, else black |

use image::RgbaImage;
use rayon::prelude::*;

/// Sepia color matrix, rows are the output R, G and B channels.
const SEPIA: [[f64; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Integer mean of the three color channels.
#[inline]
fn intensity(px: &[u8]) -> u8 {
    ((u16::from(px[0]) + u16::from(px[1]) + u16::from(px[2])) / 3) as u8
}

fn for_each_pixel(image: &mut RgbaImage, f: impl Fn(&mut [u8]) + Send + Sync) {
    let pixels: &mut [u8] = image;
    pixels.par_chunks_exact_mut(4).for_each(f);
}

pub fn grayscale(image: &mut RgbaImage) {
    for_each_pixel(image, |px| {
        let v = intensity(px);
        px[..3].fill(v);
    });
}

pub fn sepia(image: &mut RgbaImage) {
    for_each_pixel(image, |px| {
        let (r, g, b) = (f64::from(px[0]), f64::from(px[1]), f64::from(px[2]));
        for (channel, row) in SEPIA.iter().enumerate() {
            let value = r * row[0] + g * row[1] + b * row[2];
            // `as u8` on f64 truncates and saturates.
            px[channel] = value.min(255.0) as u8;
        }
    });
}

/// Binarize using `percent` of full intensity as the cut-off.
pub fn threshold(image: &mut RgbaImage, percent: u8) {
    let cutoff = 255 * u32::from(percent.min(100)) / 100;
    for_each_pixel(image, |px| {
        let v = if u32::from(intensity(px)) >= cutoff {
            255
        } else {
            0
        };
        px[..3].fill(v);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn two_pixels(a: Rgba<u8>, b: Rgba<u8>) -> RgbaImage {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, a);
        img.put_pixel(1, 0, b);
        img
    }

    #[test]
    fn grayscale_averages_channels() {
        let mut img = two_pixels(RED, WHITE);
        grayscale(&mut img);
        assert_eq!(*img.get_pixel(0, 0), Rgba([85, 85, 85, 255]));
        assert_eq!(*img.get_pixel(1, 0), WHITE);
    }

    #[test]
    fn grayscale_preserves_alpha() {
        let mut img = two_pixels(Rgba([10, 20, 30, 7]), Rgba([0, 0, 3, 0]));
        grayscale(&mut img);
        assert_eq!(*img.get_pixel(0, 0), Rgba([20, 20, 20, 7]));
        assert_eq!(*img.get_pixel(1, 0), Rgba([1, 1, 1, 0]));
    }

    #[test]
    fn sepia_truncates_and_clamps() {
        let mut img = two_pixels(RED, WHITE);
        sepia(&mut img);
        // 255 * .393 = 100.215, 255 * .349 = 88.995, 255 * .272 = 69.36
        assert_eq!(*img.get_pixel(0, 0), Rgba([100, 88, 69, 255]));
        // White overflows every channel except blue: 255 * .937 = 238.935
        assert_eq!(*img.get_pixel(1, 0), Rgba([255, 255, 238, 255]));
    }

    #[test]
    fn threshold_uses_integer_cutoff() {
        let mut low = two_pixels(RED, WHITE);
        threshold(&mut low, 30);
        assert_eq!(*low.get_pixel(0, 0), WHITE);
        assert_eq!(*low.get_pixel(1, 0), WHITE);

        let mut high = two_pixels(RED, WHITE);
        threshold(&mut high, 90);
        assert_eq!(*high.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*high.get_pixel(1, 0), WHITE);
    }

    #[test]
    fn threshold_extremes() {
        let black = Rgba([0, 0, 0, 255]);

        let mut zero = two_pixels(black, Rgba([1, 1, 1, 255]));
        threshold(&mut zero, 0);
        assert_eq!(*zero.get_pixel(0, 0), WHITE);
        assert_eq!(*zero.get_pixel(1, 0), WHITE);

        let mut full = two_pixels(Rgba([254, 254, 254, 255]), WHITE);
        threshold(&mut full, 100);
        assert_eq!(*full.get_pixel(0, 0), black);
        assert_eq!(*full.get_pixel(1, 0), WHITE);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        // 255 * 30 / 100 = 76 with integer division.
        let mut img = two_pixels(Rgba([76, 76, 76, 255]), Rgba([75, 75, 75, 255]));
        threshold(&mut img, 30);
        assert_eq!(*img.get_pixel(0, 0), WHITE);
        assert_eq!(*img.get_pixel(1, 0), Rgba([0, 0, 0, 255]));
    }
}
