//! innervation-pipeline: Pure image analysis core (sans-IO).
//!
//! Measures the innervation index of a microscopy image, the share of
//! pixels inside a region of interest whose intensity reaches a cutoff:
//! decode -> percentile stretch -> contrast/brightness/blur ->
//! ROI rasterization -> threshold -> index.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and buffers. Batch sequencing lives in
//! `innervation-session`, filesystem access in `innervation-cli`.

pub mod adjust;
pub mod blur;
pub mod decode;
pub mod diagnostics;
pub mod index;
pub mod normalize;
pub mod overlay;
pub mod recompute;
pub mod roi;
pub mod threshold;
pub mod types;

pub use decode::{DecodeError, Decoder, FormatHint, ImageDecoder};
pub use diagnostics::{Clock, ImageDiagnostics, StageDiagnostics, StageMetrics, SystemClock};
pub use recompute::{RecomputeGeneration, Ticket};
pub use roi::{RoiDraft, RoiMask, RoiPolygon};
pub use types::{
    AdjustmentState, AnalysisConfig, BitDepth, Dimensions, GrayImage, ImageFrame, IndexResult,
    NormalizationParams, PipelineError, Point, RgbImage, StretchBounds, ThresholdMode,
    ThresholdResult,
};

/// Run the whole analysis on one decoded frame.
///
/// # Pipeline steps
///
/// 1. Percentile stretch with `config.normalization`
/// 2. Contrast, brightness and blur from `adjustment`
/// 3. Rasterize `polygon` (the whole image when `None`)
/// 4. Resolve `config.threshold` against the ROI
/// 5. Count ROI pixels at or above the cutoff
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] or
/// [`PipelineError::InvalidThreshold`] for a bad configuration, and
/// [`PipelineError::EmptyRoi`] if the polygon covers no pixels.
pub fn analyze(
    frame: &ImageFrame,
    config: &AnalysisConfig,
    adjustment: &AdjustmentState,
    polygon: Option<&RoiPolygon>,
) -> Result<(ThresholdResult, IndexResult), PipelineError> {
    config.validate()?;

    // 1. Percentile stretch.
    let (normalized, _) = normalize::percentile_stretch(frame, &config.normalization)?;

    // 2. Live adjustments.
    let working = adjust::apply_adjustments(&normalized, adjustment);

    // 3. ROI mask.
    let mask = match polygon {
        Some(polygon) => polygon.rasterize(frame.dimensions()),
        None => RoiMask::full(frame.dimensions()),
    };

    // 4. Threshold.
    let threshold = threshold::resolve(config.threshold, &working, &mask)?;

    // 5. Index.
    let result = index::compute_index(&working, &mask, threshold.value)?;
    Ok((threshold, result))
}
