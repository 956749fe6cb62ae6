//! Binarization cutoff: Otsu's method over the ROI, or a manual value.
//!
//! Otsu sweeps every split `t` in `1..=255`. Class 0 holds ROI pixels
//! with value `< t`, class 1 those `>= t`. The split maximizing the
//! between-class variance `w0 * w1 * (mean0 - mean1)^2` wins; ties go to
//! the lowest `t`. When the ROI holds a single intensity no split
//! separates two classes, and the cutoff falls back to that intensity.
//!
//! The histogram is built with a parallel fold/reduce over row chunks.

use image::GrayImage;
use rayon::prelude::*;

use crate::roi::RoiMask;
use crate::types::{Dimensions, PipelineError, ThresholdMode, ThresholdResult};

/// Number of intensity bins in the working buffer.
pub const BINS: usize = 256;

/// Largest valid cutoff in working-buffer units.
pub const MAX_THRESHOLD: f64 = 255.0;

/// Histogram of working-buffer values restricted to the ROI.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the buffer and mask
/// sizes differ.
pub fn roi_histogram(buffer: &GrayImage, mask: &RoiMask) -> Result<[u64; BINS], PipelineError> {
    check_dimensions(buffer, mask)?;
    let hist = buffer
        .as_raw()
        .par_chunks(4096)
        .zip(mask.as_slice().par_chunks(4096))
        .fold(
            || [0u64; BINS],
            |mut hist, (values, selected)| {
                for (&v, &inside) in values.iter().zip(selected) {
                    if inside {
                        hist[usize::from(v)] += 1;
                    }
                }
                hist
            },
        )
        .reduce(
            || [0u64; BINS],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );
    Ok(hist)
}

/// Otsu split over a histogram.
///
/// Returns `None` when the histogram is empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn otsu_level(histogram: &[u64; BINS]) -> Option<u8> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }
    let total_f = total as f64;
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &c)| v as f64 * c as f64)
        .sum();

    let mut best: Option<(usize, f64)> = None;
    let mut count_below = 0u64;
    let mut sum_below = 0.0f64;

    for t in 1..BINS {
        count_below += histogram[t - 1];
        sum_below += (t - 1) as f64 * histogram[t - 1] as f64;
        let count_above = total - count_below;
        if count_below == 0 || count_above == 0 {
            continue;
        }
        let w0 = count_below as f64 / total_f;
        let w1 = count_above as f64 / total_f;
        let mean0 = sum_below / count_below as f64;
        let mean1 = (sum_all - sum_below) / count_above as f64;
        let variance = w0 * w1 * (mean0 - mean1).powi(2);
        if best.is_none_or(|(_, v)| variance > v) {
            best = Some((t, variance));
        }
    }

    let level = match best {
        Some((t, _)) => t,
        // A single intensity: use it as the cutoff.
        None => histogram.iter().position(|&c| c > 0)?,
    };
    u8::try_from(level).ok()
}

/// Clamp a manual cutoff into the working buffer's range.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidThreshold`] for NaN or infinite
/// values.
pub fn clamp_manual(value: f64) -> Result<f64, PipelineError> {
    if !value.is_finite() {
        return Err(PipelineError::InvalidThreshold(value));
    }
    Ok(value.clamp(0.0, MAX_THRESHOLD))
}

/// Resolve `mode` against the current working buffer and ROI.
///
/// Automatic mode runs Otsu; manual mode only validates and clamps, so
/// re-resolving after every buffer change keeps the cutoff in range.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyRoi`] for an automatic threshold over
/// an empty mask, [`PipelineError::DimensionMismatch`] for mismatched
/// sizes, and [`PipelineError::InvalidThreshold`] for a non-finite
/// manual value.
pub fn resolve(
    mode: ThresholdMode,
    buffer: &GrayImage,
    mask: &RoiMask,
) -> Result<ThresholdResult, PipelineError> {
    let value = match mode {
        ThresholdMode::Automatic => {
            let histogram = roi_histogram(buffer, mask)?;
            let level = otsu_level(&histogram).ok_or(PipelineError::EmptyRoi)?;
            f64::from(level)
        }
        ThresholdMode::Manual(value) => {
            check_dimensions(buffer, mask)?;
            clamp_manual(value)?
        }
    };
    log::debug!("threshold {mode:?} resolved to {value}");
    Ok(ThresholdResult { mode, value })
}

pub(crate) fn check_dimensions(buffer: &GrayImage, mask: &RoiMask) -> Result<(), PipelineError> {
    let buffer_dims = Dimensions {
        width: buffer.width(),
        height: buffer.height(),
    };
    if buffer_dims == mask.dimensions() {
        Ok(())
    } else {
        Err(PipelineError::DimensionMismatch {
            buffer: buffer_dims,
            mask: mask.dimensions(),
        })
    }
}
