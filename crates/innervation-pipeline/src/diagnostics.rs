//! Per-image diagnostics: timing and counts for each analysis stage.
//!
//! Timing goes through the [`Clock`] trait so callers choose the time
//! source. [`SystemClock`] uses the `web-time` crate, which maps to
//! `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{BitDepth, Dimensions, ThresholdMode};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Run `f` and measure it with `clock`.
pub fn timed<C: Clock, T>(clock: &C, f: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let value = f();
    (value, clock.elapsed(&start))
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration seconds must be finite and non-negative"))
    }
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Percentile stretch of the decoded frame.
    Normalize {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Source sample depth.
        depth: BitDepth,
        /// Sample value mapped to 0.
        low_bound: u16,
        /// Sample value mapped to 255.
        high_bound: u16,
    },
    /// Contrast, brightness and blur.
    Adjust {
        /// Contrast factor.
        contrast: f32,
        /// Brightness offset.
        brightness: f32,
        /// Blur kernel radius.
        blur_radius: f32,
        /// Gaussian sigma derived from the radius.
        sigma: f32,
    },
    /// Polygon to mask conversion.
    Rasterize {
        /// Vertices in the polygon.
        vertex_count: usize,
        /// Pixels inside the ROI.
        roi_pixel_count: u64,
        /// Pixels in the image.
        total_pixel_count: u64,
    },
    /// Cutoff selection.
    Threshold {
        /// Automatic or manual.
        mode: ThresholdMode,
        /// Resolved cutoff.
        value: f64,
    },
    /// Index computation.
    Index {
        /// Pixels inside the ROI.
        roi_pixel_count: u64,
        /// ROI pixels at or above the cutoff.
        above_threshold_count: u64,
        /// Resulting percentage.
        index_percent: f64,
    },
}

/// Diagnostics collected while analyzing one image.
///
/// `adjust` is `None` when the image was analyzed at the default
/// adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDiagnostics {
    /// Source identifier (usually the file name).
    pub identifier: String,
    /// Image dimensions.
    pub dimensions: Dimensions,
    /// Percentile stretch.
    pub normalize: StageDiagnostics,
    /// Live adjustments, if any were applied.
    pub adjust: Option<StageDiagnostics>,
    /// ROI rasterization.
    pub rasterize: StageDiagnostics,
    /// Threshold resolution.
    pub threshold: StageDiagnostics,
    /// Index computation.
    pub index: StageDiagnostics,
    /// Sum of all stage durations (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl ImageDiagnostics {
    /// Assemble diagnostics and compute the total duration.
    #[must_use]
    pub fn new(
        identifier: String,
        dimensions: Dimensions,
        normalize: StageDiagnostics,
        adjust: Option<StageDiagnostics>,
        rasterize: StageDiagnostics,
        threshold: StageDiagnostics,
        index: StageDiagnostics,
    ) -> Self {
        let total_duration = [&normalize, &rasterize, &threshold, &index]
            .into_iter()
            .chain(adjust.as_ref())
            .map(|s| s.duration)
            .sum();
        Self {
            identifier,
            dimensions,
            normalize,
            adjust,
            rasterize,
            threshold,
            index,
            total_duration,
        }
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("{}\n{}", self.identifier, "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.dimensions.width,
            self.dimensions.height,
            self.dimensions.pixel_count(),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());
        lines.push(format!(
            "{:<12} {:>10} {:>8}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(72));

        let total_ms = duration_ms(self.total_duration);
        let mut stages = vec![("Normalize", &self.normalize)];
        if let Some(ref adjust) = self.adjust {
            stages.push(("Adjust", adjust));
        }
        stages.push(("Rasterize", &self.rasterize));
        stages.push(("Threshold", &self.threshold));
        stages.push(("Index", &self.index));

        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<12} {ms:>8.3}ms {pct:>7.1}%  {details}"));
        }

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Normalize {
            width,
            height,
            depth,
            low_bound,
            high_bound,
        } => {
            let bits = match depth {
                BitDepth::Eight => 8,
                BitDepth::Sixteen => 16,
            };
            format!("{width}x{height} {bits}-bit stretch {low_bound}..{high_bound}")
        }
        StageMetrics::Adjust {
            contrast,
            brightness,
            blur_radius,
            sigma,
        } => format!(
            "contrast={contrast:.2} brightness={brightness:.1} radius={blur_radius:.1} sigma={sigma:.2}"
        ),
        StageMetrics::Rasterize {
            vertex_count,
            roi_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let coverage = if *total_pixel_count > 0 {
                *roi_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!("{vertex_count} vertices, {roi_pixel_count} px ({coverage:.1}% of image)")
        }
        StageMetrics::Threshold { mode, value } => match mode {
            ThresholdMode::Automatic => format!("otsu -> {value:.1}"),
            ThresholdMode::Manual(_) => format!("manual {value:.1}"),
        },
        StageMetrics::Index {
            roi_pixel_count,
            above_threshold_count,
            index_percent,
        } => format!("{above_threshold_count}/{roi_pixel_count} = {index_percent:.6}%"),
    }
}
