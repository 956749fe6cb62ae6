//! Shared types for the innervation analysis pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference the
/// normalized and working buffers without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for overlay previews.
pub use image::RgbImage;

/// A 2D point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Sample depth of the decoded source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    /// 8-bit sources; samples range 0-255.
    Eight,
    /// Deeper sources (10/12/16-bit), stored on the 16-bit scale.
    Sixteen,
}

impl BitDepth {
    /// Largest representable sample value at this depth.
    #[must_use]
    pub const fn max_value(self) -> u16 {
        match self {
            Self::Eight => u8::MAX as u16,
            Self::Sixteen => u16::MAX,
        }
    }
}

/// Raw single-channel pixel data for one decoded image.
///
/// Immutable once constructed. Samples are stored row-major; 8-bit
/// sources keep their original 0-255 values so the percentile stretch
/// sees the true histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    dimensions: Dimensions,
    depth: BitDepth,
    samples: Vec<u16>,
}

impl ImageFrame {
    /// Build a frame from raw row-major samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFrame`] if either dimension is
    /// zero, the sample count does not equal `width * height`, or a
    /// sample exceeds the depth's maximum value.
    pub fn new(
        width: u32,
        height: u32,
        depth: BitDepth,
        samples: Vec<u16>,
    ) -> Result<Self, PipelineError> {
        let dimensions = Dimensions { width, height };
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidFrame(format!(
                "dimensions must be positive, got {width}x{height}"
            )));
        }
        if samples.len() != dimensions.pixel_count() {
            return Err(PipelineError::InvalidFrame(format!(
                "expected {} samples for {width}x{height}, got {}",
                dimensions.pixel_count(),
                samples.len(),
            )));
        }
        let max = depth.max_value();
        if let Some(&bad) = samples.iter().find(|&&s| s > max) {
            return Err(PipelineError::InvalidFrame(format!(
                "sample {bad} exceeds {max} for {depth:?} depth"
            )));
        }
        Ok(Self {
            dimensions,
            depth,
            samples,
        })
    }

    /// Build an 8-bit frame from a grayscale image.
    #[must_use]
    pub fn from_gray8(image: &GrayImage) -> Self {
        Self {
            dimensions: Dimensions {
                width: image.width(),
                height: image.height(),
            },
            depth: BitDepth::Eight,
            samples: image.as_raw().iter().map(|&v| u16::from(v)).collect(),
        }
    }

    /// Build a 16-bit frame from a 16-bit grayscale image.
    #[must_use]
    pub fn from_gray16(image: &image::ImageBuffer<image::Luma<u16>, Vec<u16>>) -> Self {
        Self {
            dimensions: Dimensions {
                width: image.width(),
                height: image.height(),
            },
            depth: BitDepth::Sixteen,
            samples: image.as_raw().clone(),
        }
    }

    /// Frame dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Frame width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Source sample depth.
    #[must_use]
    pub const fn depth(&self) -> BitDepth {
        self.depth
    }

    /// Row-major samples.
    #[must_use]
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }
}

/// Percentiles used for the contrast stretch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    /// Percentile mapped to black (0-100).
    pub low_percentile: f64,
    /// Percentile mapped to white (0-100).
    pub high_percentile: f64,
}

impl NormalizationParams {
    /// Default low percentile.
    pub const DEFAULT_LOW_PERCENTILE: f64 = 2.0;
    /// Default high percentile.
    pub const DEFAULT_HIGH_PERCENTILE: f64 = 98.0;

    /// Check `0 <= low <= high <= 100`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when the percentiles are
    /// out of range, non-finite, or inverted.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let range = 0.0..=100.0;
        if !range.contains(&self.low_percentile) || !range.contains(&self.high_percentile) {
            return Err(PipelineError::InvalidConfig(format!(
                "percentiles must lie in [0, 100], got {}/{}",
                self.low_percentile, self.high_percentile,
            )));
        }
        if self.low_percentile > self.high_percentile {
            return Err(PipelineError::InvalidConfig(format!(
                "low percentile {} exceeds high percentile {}",
                self.low_percentile, self.high_percentile,
            )));
        }
        Ok(())
    }
}

impl Default for NormalizationParams {
    fn default() -> Self {
        Self {
            low_percentile: Self::DEFAULT_LOW_PERCENTILE,
            high_percentile: Self::DEFAULT_HIGH_PERCENTILE,
        }
    }
}

/// Sample values at the configured percentiles.
///
/// `low <= high` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StretchBounds {
    /// Sample value mapped to 0.
    pub low: u16,
    /// Sample value mapped to 255.
    pub high: u16,
}

impl StretchBounds {
    /// Whether the stretch collapses to a single value.
    #[must_use]
    pub const fn is_degenerate(self) -> bool {
        self.low == self.high
    }
}

/// Live intensity adjustments applied on top of the normalized buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentState {
    /// Multiplicative factor around mid-gray (128).
    pub contrast: f32,
    /// Additive offset in working-buffer units.
    pub brightness: f32,
    /// Gaussian blur radius in pixels; zero disables the blur.
    pub blur_radius: f32,
}

impl AdjustmentState {
    /// Default contrast (identity).
    pub const DEFAULT_CONTRAST: f32 = 1.0;
    /// Default brightness (identity).
    pub const DEFAULT_BRIGHTNESS: f32 = 0.0;
    /// Default blur radius (no blur).
    pub const DEFAULT_BLUR_RADIUS: f32 = 0.0;
    /// Largest accepted blur radius, in pixels.
    pub const MAX_BLUR_RADIUS: f32 = 5.0;

    /// Build a validated adjustment state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if any value is not
    /// finite or `blur_radius` lies outside `0..=MAX_BLUR_RADIUS`.
    pub fn new(contrast: f32, brightness: f32, blur_radius: f32) -> Result<Self, PipelineError> {
        if !contrast.is_finite() || !brightness.is_finite() || !blur_radius.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "adjustments must be finite, got contrast={contrast} brightness={brightness} blur_radius={blur_radius}"
            )));
        }
        if !(0.0..=Self::MAX_BLUR_RADIUS).contains(&blur_radius) {
            return Err(PipelineError::InvalidConfig(format!(
                "blur radius must be between 0 and {}, got {blur_radius}",
                Self::MAX_BLUR_RADIUS
            )));
        }
        Ok(Self {
            contrast,
            brightness,
            blur_radius,
        })
    }

    /// Whether applying this state leaves the buffer unchanged.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_identity(&self) -> bool {
        self.contrast == 1.0 && self.brightness == 0.0 && self.blur_radius == 0.0
    }
}

impl Default for AdjustmentState {
    fn default() -> Self {
        Self {
            contrast: Self::DEFAULT_CONTRAST,
            brightness: Self::DEFAULT_BRIGHTNESS,
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
        }
    }
}

/// How the binarization cutoff is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// Otsu's method over the ROI's histogram.
    #[default]
    Automatic,
    /// A fixed cutoff in working-buffer units, clamped to 0-255.
    Manual(f64),
}

/// A resolved cutoff for the current buffer and ROI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    /// The mode that produced the value.
    pub mode: ThresholdMode,
    /// Cutoff in working-buffer units; pixels `>=` this value count.
    pub value: f64,
}

/// Innervation index for one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexResult {
    /// Number of pixels inside the ROI.
    pub roi_pixel_count: u64,
    /// ROI pixels at or above the threshold.
    pub above_threshold_count: u64,
    /// `above_threshold_count / roi_pixel_count * 100`.
    pub index_percent: f64,
}

/// Per-batch analysis settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Contrast stretch percentiles applied when an image is loaded.
    pub normalization: NormalizationParams,
    /// Threshold mode each image starts with.
    pub threshold: ThresholdMode,
}

impl AnalysisConfig {
    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for bad percentiles and
    /// [`PipelineError::InvalidThreshold`] for a non-finite manual cutoff.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.normalization.validate()?;
        if let ThresholdMode::Manual(value) = self.threshold
            && !value.is_finite()
        {
            return Err(PipelineError::InvalidThreshold(value));
        }
        Ok(())
    }
}

/// Errors that can occur during analysis.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The format hint names a format the decoder cannot read.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Decoded pixel data does not describe a valid frame.
    #[error("invalid image frame: {0}")]
    InvalidFrame(String),

    /// Analysis configuration is invalid.
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),

    /// The polygon has too few vertices to enclose an area.
    #[error("ROI needs at least 3 vertices, got {count}")]
    InsufficientVertices {
        /// Number of vertices supplied.
        count: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("ROI vertex ({x}, {y}) is not finite")]
    InvalidVertex {
        /// Horizontal coordinate.
        x: f64,
        /// Vertical coordinate.
        y: f64,
    },

    /// The ROI mask covers no pixels.
    #[error("ROI contains no pixels")]
    EmptyRoi,

    /// Buffer and mask sizes disagree.
    #[error("dimension mismatch: buffer is {buffer:?}, mask is {mask:?}")]
    DimensionMismatch {
        /// Working buffer dimensions.
        buffer: Dimensions,
        /// Mask dimensions.
        mask: Dimensions,
    },

    /// Manual cutoff is NaN or infinite.
    #[error("threshold must be finite, got {0}")]
    InvalidThreshold(f64),
}
