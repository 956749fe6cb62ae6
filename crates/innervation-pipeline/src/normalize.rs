//! Percentile contrast stretch from raw samples to the 8-bit working range.
//!
//! The stretch maps the sample value at the low percentile to 0 and the
//! value at the high percentile to 255:
//!
//! ```text
//! out = round(clamp((in - low) / (high - low), 0, 1) * 255)
//! ```
//!
//! A percentile's value is the smallest sample whose cumulative count
//! reaches `ceil(p / 100 * N)` (clamped to `[1, N]`), so 0 selects the
//! minimum and 100 the maximum. When both bounds coincide the image has
//! no usable spread and every pixel becomes mid-gray.
//!
//! Runs once per loaded image. The stretch itself is a lookup table over
//! every possible sample value, so the per-pixel pass is a table read.

use image::GrayImage;
use rayon::prelude::*;

use crate::types::{ImageFrame, NormalizationParams, PipelineError, StretchBounds};

/// Output value for every pixel when the stretch is degenerate.
pub const MID_GRAY: u8 = 128;

/// Count occurrences of every sample value.
///
/// The returned vector has one bin per representable value at the
/// frame's depth.
#[must_use]
pub fn sample_histogram(frame: &ImageFrame) -> Vec<u64> {
    let bins = usize::from(frame.depth().max_value()) + 1;
    frame
        .samples()
        .par_chunks(4096)
        .fold(
            || vec![0u64; bins],
            |mut hist, chunk| {
                for &s in chunk {
                    hist[usize::from(s)] += 1;
                }
                hist
            },
        )
        .reduce(
            || vec![0u64; bins],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        )
}

/// Sample value at which the cumulative count first reaches the
/// percentile's rank.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile_value(histogram: &[u64], total: u64, percentile: f64) -> u16 {
    let rank = ((percentile * total as f64) / 100.0).ceil() as u64;
    let rank = rank.clamp(1, total.max(1));

    let mut cumulative = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= rank {
            return u16::try_from(value).unwrap_or(u16::MAX);
        }
    }
    u16::try_from(histogram.len().saturating_sub(1)).unwrap_or(u16::MAX)
}

/// Compute the clamp bounds for a frame.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the percentiles are out of
/// range or inverted.
pub fn stretch_bounds(
    frame: &ImageFrame,
    params: &NormalizationParams,
) -> Result<StretchBounds, PipelineError> {
    params.validate()?;
    let histogram = sample_histogram(frame);
    let total = histogram.iter().sum();
    let low = percentile_value(&histogram, total, params.low_percentile);
    let high = percentile_value(&histogram, total, params.high_percentile);
    // Monotone cumulative counts guarantee low <= high for low_p <= high_p.
    Ok(StretchBounds {
        low: low.min(high),
        high,
    })
}

/// Map every sample through the stretch defined by `bounds`.
#[must_use = "returns the normalized buffer"]
pub fn apply_stretch(frame: &ImageFrame, bounds: StretchBounds) -> GrayImage {
    let lut = stretch_lut(frame.depth().max_value(), bounds);
    let pixels: Vec<u8> = frame
        .samples()
        .par_iter()
        .map(|&s| lut[usize::from(s)])
        .collect();

    // Length equals width * height by ImageFrame's construction invariant.
    GrayImage::from_raw(frame.width(), frame.height(), pixels)
        .unwrap_or_else(|| GrayImage::new(frame.width(), frame.height()))
}

/// Compute the bounds and apply the stretch in one step.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for invalid percentiles.
pub fn percentile_stretch(
    frame: &ImageFrame,
    params: &NormalizationParams,
) -> Result<(GrayImage, StretchBounds), PipelineError> {
    let bounds = stretch_bounds(frame, params)?;
    log::debug!(
        "stretch {:.1}/{:.1} percentiles -> bounds {}..{}",
        params.low_percentile,
        params.high_percentile,
        bounds.low,
        bounds.high,
    );
    Ok((apply_stretch(frame, bounds), bounds))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stretch_lut(max_value: u16, bounds: StretchBounds) -> Vec<u8> {
    if bounds.is_degenerate() {
        return vec![MID_GRAY; usize::from(max_value) + 1];
    }
    let low = f64::from(bounds.low);
    let span = f64::from(bounds.high) - low;
    (0..=max_value)
        .map(|v| {
            let t = ((f64::from(v) - low) / span).clamp(0.0, 1.0);
            (t * 255.0).round() as u8
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::BitDepth;

    fn frame8(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> ImageFrame {
        ImageFrame::from_gray8(&GrayImage::from_fn(width, height, |x, y| {
            image::Luma([f(x, y)])
        }))
    }

    fn full_range() -> NormalizationParams {
        NormalizationParams {
            low_percentile: 0.0,
            high_percentile: 100.0,
        }
    }

    #[test]
    fn histogram_counts_every_sample() {
        let frame = frame8(4, 4, |x, _| if x < 2 { 10 } else { 20 });
        let hist = sample_histogram(&frame);
        assert_eq!(hist.len(), 256);
        assert_eq!(hist[10], 8);
        assert_eq!(hist[20], 8);
        assert_eq!(hist.iter().sum::<u64>(), 16);
    }

    #[test]
    fn zero_and_hundred_select_min_and_max() {
        let frame = frame8(4, 1, |x, _| [7, 30, 90, 200][x as usize]);
        let bounds = stretch_bounds(&frame, &full_range()).unwrap();
        assert_eq!(bounds, StretchBounds { low: 7, high: 200 });
    }

    #[test]
    fn default_percentiles_on_small_image() {
        // 16 pixels: rank(2%) = 1, rank(98%) = 16.
        let frame = frame8(4, 4, |x, y| if x < 2 && y < 2 { 250 } else { 50 });
        let bounds = stretch_bounds(&frame, &NormalizationParams::default()).unwrap();
        assert_eq!(bounds, StretchBounds { low: 50, high: 250 });
    }

    #[test]
    fn percentiles_clip_outliers() {
        // 100 pixels: one dark and one bright outlier.
        let frame = frame8(10, 10, |x, y| match (x, y) {
            (0, 0) => 0,
            (9, 9) => 255,
            _ => 100 + u8::try_from(x).unwrap(),
        });
        let bounds = stretch_bounds(&frame, &NormalizationParams::default()).unwrap();
        assert!(bounds.low >= 100, "low bound {} kept the outlier", bounds.low);
        assert!(bounds.high <= 109, "high bound {} kept the outlier", bounds.high);
    }

    #[test]
    fn stretch_maps_bounds_to_endpoints() {
        let frame = frame8(3, 1, |x, _| [50, 150, 250][x as usize]);
        let (out, _) = percentile_stretch(&frame, &full_range()).unwrap();
        assert_eq!(out.as_raw(), &[0, 128, 255]);
    }

    #[test]
    fn stretch_of_stretched_buffer_is_identity() {
        let frame = frame8(16, 16, |x, y| u8::try_from(x + 16 * y).unwrap());
        let (out, bounds) = percentile_stretch(&frame, &full_range()).unwrap();
        assert_eq!(bounds, StretchBounds { low: 0, high: 255 });
        let expected: Vec<u8> = frame.samples().iter().map(|&s| u8::try_from(s).unwrap()).collect();
        assert_eq!(out.as_raw(), &expected);

        let again = ImageFrame::from_gray8(&out);
        let (twice, _) = percentile_stretch(&again, &full_range()).unwrap();
        assert_eq!(twice, out);
    }

    #[test]
    fn uniform_image_becomes_mid_gray() {
        let frame = frame8(5, 5, |_, _| 77);
        let (out, bounds) = percentile_stretch(&frame, &NormalizationParams::default()).unwrap();
        assert!(bounds.is_degenerate());
        assert!(out.pixels().all(|p| p.0[0] == MID_GRAY));
    }

    #[test]
    fn sixteen_bit_frame_stretches_to_eight_bit() {
        let samples = vec![1000, 2000, 3000, 4000];
        let frame = ImageFrame::new(4, 1, BitDepth::Sixteen, samples).unwrap();
        let (out, bounds) = percentile_stretch(&frame, &full_range()).unwrap();
        assert_eq!(bounds, StretchBounds { low: 1000, high: 4000 });
        assert_eq!(out.as_raw(), &[0, 85, 170, 255]);
    }

    #[test]
    fn invalid_percentiles_rejected() {
        let frame = frame8(2, 2, |_, _| 1);
        let params = NormalizationParams {
            low_percentile: 99.0,
            high_percentile: 1.0,
        };
        assert!(matches!(
            percentile_stretch(&frame, &params),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
