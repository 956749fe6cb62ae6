//! Separable Gaussian blur for noise reduction.
//!
//! The kernel radius is the user-facing control. The kernel spans
//! `±ceil(radius)` taps with `sigma = radius / 3`, so the support covers
//! three standard deviations. Weights are normalized to sum to one.
//!
//! Both passes run through [`imageproc::filter::separable_filter_equal`]
//! on an `f32` image, so the affine result is not rounded before
//! blurring. Borders replicate the edge pixel.

use image::{ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;

/// Single-channel floating point image used between the affine step and
/// the final rounding.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Standard deviation used for a given kernel radius.
#[must_use]
pub fn sigma_for_radius(radius: f32) -> f32 {
    radius / 3.0
}

/// Whether `radius` yields a real blur.
///
/// Radii whose variance `sigma²` is zero, subnormal or not finite act as
/// the identity; the Gaussian weights are undefined there.
#[must_use]
pub fn is_effective_radius(radius: f32) -> bool {
    let sigma = sigma_for_radius(radius);
    radius > 0.0 && (sigma * sigma).is_normal()
}

/// Build a normalized 1-D Gaussian kernel of length `2 * ceil(radius) + 1`.
///
/// Radii that are not [effective](is_effective_radius) produce the
/// single-tap identity kernel. The kernel length grows with the radius;
/// callers bound it through [`crate::AdjustmentState::MAX_BLUR_RADIUS`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn gaussian_kernel(radius: f32) -> Vec<f32> {
    if !is_effective_radius(radius) {
        return vec![1.0];
    }
    let half = radius.ceil() as usize;
    let sigma = sigma_for_radius(radius);
    let denom = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (0..=2 * half)
        .map(|i| {
            let d = i as f32 - half as f32;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Blur a float image with the separable kernel for `radius`.
///
/// Horizontal pass first, then vertical. A radius that is not effective
/// returns the input unchanged.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &FloatImage, radius: f32) -> FloatImage {
    if !is_effective_radius(radius) || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let kernel = gaussian_kernel(radius);
    separable_filter_equal(image, &kernel)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    /// 10x10 image with a sharp 0-to-255 boundary at x=5.
    fn sharp_edge_image() -> FloatImage {
        FloatImage::from_fn(10, 10, |x, _y| Luma([if x < 5 { 0.0 } else { 255.0 }]))
    }

    fn value(image: &FloatImage, x: u32, y: u32) -> f32 {
        image.get_pixel(x, y).0[0]
    }

    #[test]
    fn zero_radius_returns_identical_image() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur(&img, 0.0), img);
    }

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(3.0);
        assert_eq!(kernel.len(), 7);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "kernel sum {sum}");
        for i in 0..3 {
            assert!((kernel[i] - kernel[6 - i]).abs() < 1e-7);
        }
        assert!(kernel[3] > kernel[2] && kernel[2] > kernel[1]);
    }

    #[test]
    fn fractional_radius_rounds_support_up() {
        assert_eq!(gaussian_kernel(1.4).len(), 5);
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
    }

    #[test]
    fn sigma_is_a_third_of_radius() {
        assert!((sigma_for_radius(4.5) - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn underflowing_variance_is_identity() {
        // sigma² underflows to zero here; the weights would be 0/0.
        assert!(!is_effective_radius(1e-23));
        assert_eq!(gaussian_kernel(1e-23), vec![1.0]);

        let img = FloatImage::from_pixel(3, 3, Luma([200.0]));
        let out = gaussian_blur(&img, 1e-23);
        assert!(out.pixels().all(|p| p.0[0].is_finite()));
        assert_eq!(out, img);
    }

    #[test]
    fn tiny_but_normal_radius_keeps_the_center_tap() {
        assert!(is_effective_radius(1e-10));
        let kernel = gaussian_kernel(1e-10);
        assert_eq!(kernel.len(), 3);
        assert!((kernel[1] - 1.0).abs() < f32::EPSILON);
        assert!(kernel[0].abs() < f32::EPSILON && kernel[2].abs() < f32::EPSILON);
    }

    #[test]
    fn non_finite_radius_is_not_effective() {
        assert!(!is_effective_radius(f32::NAN));
        assert!(!is_effective_radius(f32::INFINITY));
        assert!(!is_effective_radius(-1.0));
    }

    #[test]
    fn output_dimensions_preserved() {
        let img = FloatImage::new(17, 31);
        assert_eq!(gaussian_blur(&img, 2.0).dimensions(), (17, 31));
    }

    #[test]
    fn blur_smooths_sharp_edge() {
        let blurred = gaussian_blur(&sharp_edge_image(), 3.0);
        assert!(value(&blurred, 4, 5) > 0.5);
        assert!(value(&blurred, 5, 5) < 254.5);
        // Far from the edge the values are untouched.
        assert!(value(&blurred, 0, 5).abs() < 1e-3);
        assert!((value(&blurred, 9, 5) - 255.0).abs() < 1e-3);
    }

    #[test]
    fn borders_replicate_so_uniform_image_is_unchanged() {
        let img = FloatImage::from_pixel(10, 10, Luma([128.0]));
        let blurred = gaussian_blur(&img, 2.5);
        assert!(blurred.pixels().all(|p| (p.0[0] - 128.0).abs() < 1e-3));
    }

    #[test]
    fn blur_preserves_mass_on_interior_impulse() {
        let mut img = FloatImage::new(11, 11);
        img.put_pixel(5, 5, Luma([900.0]));
        let out = gaussian_blur(&img, 3.0);
        let total: f32 = out.pixels().map(|p| p.0[0]).sum();
        assert!((total - 900.0).abs() < 1e-2, "total {total}");
        assert!(value(&out, 5, 5) < 900.0);
        assert!((value(&out, 4, 5) - value(&out, 6, 5)).abs() < 1e-3);
    }

    #[test]
    fn kernel_wider_than_image_stays_finite() {
        let img = FloatImage::from_fn(2, 2, |x, y| Luma([(x * 2 + y) as f32 * 50.0]));
        let out = gaussian_blur(&img, 5.0);
        assert!(out.pixels().all(|p| p.0[0].is_finite() && (-1e-3..=150.001).contains(&p.0[0])));
    }

    #[test]
    fn blur_is_deterministic() {
        let img = FloatImage::from_fn(23, 19, |x, y| Luma([((x * 37 + y * 11) % 256) as f32]));
        assert_eq!(gaussian_blur(&img, 2.2), gaussian_blur(&img, 2.2));
    }
}
