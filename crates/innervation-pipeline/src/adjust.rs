//! Live contrast, brightness and blur adjustments.
//!
//! Produces the working buffer from the normalized buffer in a fixed
//! order:
//!
//! 1. per-pixel affine transform around mid-gray,
//!    `clamp((in - 128) * contrast + 128 + brightness, 0, 255)`
//! 2. separable Gaussian blur (see [`crate::blur`])
//! 3. rounding back to 8 bits
//!
//! This is the hot path while the user drags a slider, so both the
//! affine step and the blur run row-parallel. The function is pure:
//! identical inputs always give identical output.

use image::GrayImage;
use rayon::prelude::*;

use crate::blur::{FloatImage, gaussian_blur};
use crate::types::AdjustmentState;

/// Pivot of the contrast transform.
pub const CONTRAST_PIVOT: f32 = 128.0;

/// Apply the affine brightness/contrast transform to one value.
#[must_use]
pub fn affine(value: f32, contrast: f32, brightness: f32) -> f32 {
    (value - CONTRAST_PIVOT)
        .mul_add(contrast, CONTRAST_PIVOT + brightness)
        .clamp(0.0, 255.0)
}

/// Build the working buffer for `state` on top of `normalized`.
#[must_use = "returns the working buffer"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn apply_adjustments(normalized: &GrayImage, state: &AdjustmentState) -> GrayImage {
    if state.is_identity() {
        return normalized.clone();
    }

    let (w, h) = (normalized.width(), normalized.height());
    let plane: Vec<f32> = normalized
        .as_raw()
        .par_iter()
        .map(|&v| affine(f32::from(v), state.contrast, state.brightness))
        .collect();
    let Some(plane) = FloatImage::from_raw(w, h, plane) else {
        return normalized.clone();
    };

    let blurred = gaussian_blur(&plane, state.blur_radius);

    let pixels: Vec<u8> = blurred
        .as_raw()
        .par_iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_raw(w, h, pixels).unwrap_or_else(|| normalized.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gradient() -> GrayImage {
        GrayImage::from_fn(16, 16, |x, y| image::Luma([u8::try_from(x + 16 * y).unwrap()]))
    }

    #[test]
    fn defaults_are_identity() {
        let img = gradient();
        assert_eq!(apply_adjustments(&img, &AdjustmentState::default()), img);
    }

    #[test]
    fn unit_contrast_zero_brightness_no_blur_is_identity_through_math() {
        // Exercise the arithmetic path rather than the early return.
        for v in 0..=255u8 {
            let out = affine(f32::from(v), 1.0, 0.0).round();
            assert!((out - f32::from(v)).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn brightness_shifts_and_clamps() {
        let img = GrayImage::from_fn(3, 1, |x, _| image::Luma([[10, 128, 250][x as usize]]));
        let state = AdjustmentState::new(1.0, 20.0, 0.0).unwrap();
        let out = apply_adjustments(&img, &state);
        assert_eq!(out.as_raw(), &[30, 148, 255]);
    }

    #[test]
    fn contrast_expands_around_mid_gray() {
        let img = GrayImage::from_fn(3, 1, |x, _| image::Luma([[100, 128, 160][x as usize]]));
        let state = AdjustmentState::new(2.0, 0.0, 0.0).unwrap();
        let out = apply_adjustments(&img, &state);
        assert_eq!(out.as_raw(), &[72, 128, 192]);
    }

    #[test]
    fn zero_contrast_flattens_to_pivot_plus_brightness() {
        let state = AdjustmentState::new(0.0, -28.0, 0.0).unwrap();
        let out = apply_adjustments(&gradient(), &state);
        assert!(out.pixels().all(|p| p.0[0] == 100));
    }

    #[test]
    fn blur_runs_after_affine() {
        // A single bright column; brightness pushes the background to 0
        // before blurring, so the blur spreads only the column.
        let img = GrayImage::from_fn(9, 9, |x, _| image::Luma([if x == 4 { 200 } else { 20 }]));
        let state = AdjustmentState::new(1.0, -20.0, 3.0).unwrap();
        let out = apply_adjustments(&img, &state);
        assert_eq!(out.get_pixel(0, 4).0[0], 0);
        let center = out.get_pixel(4, 4).0[0];
        let beside = out.get_pixel(3, 4).0[0];
        assert!(center < 180 && beside > 0, "center={center} beside={beside}");
    }

    #[test]
    fn vanishing_blur_radius_leaves_pixels_alone() {
        let img = GrayImage::from_pixel(4, 4, image::Luma([200]));
        let state = AdjustmentState::new(1.0, 0.0, 1e-23).unwrap();
        assert!(!state.is_identity());
        assert_eq!(apply_adjustments(&img, &state), img);
    }

    #[test]
    fn adjustments_are_deterministic() {
        let state = AdjustmentState::new(1.7, 12.5, 2.4).unwrap();
        let img = gradient();
        assert_eq!(apply_adjustments(&img, &state), apply_adjustments(&img, &state));
    }
}
