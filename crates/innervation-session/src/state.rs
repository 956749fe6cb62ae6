//! Workflow states of a batch session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the session is in the per-image workflow.
///
/// ```text
/// Empty -> ImageLoaded -> Adjusting -> DrawingRoi -> RoiReady -> Calculated
///              ^                                                    |
///              +--------------- save / skip (next image) -----------+
///                                                                   v
///                                                           BatchComplete
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No batch loaded.
    Empty,
    /// A fresh image with default adjustments.
    ImageLoaded,
    /// Adjustments changed and no ROI frozen yet.
    Adjusting,
    /// Collecting polygon vertices.
    DrawingRoi,
    /// ROI frozen; ready to calculate.
    RoiReady,
    /// Index calculated for the current settings.
    Calculated,
    /// Every file in the batch has been handled.
    BatchComplete,
}

impl SessionState {
    /// Whether a current image exists in this state.
    #[must_use]
    pub const fn has_image(self) -> bool {
        !matches!(self, Self::Empty | Self::BatchComplete)
    }

    /// Whether a frozen ROI exists in this state.
    #[must_use]
    pub const fn has_frozen_roi(self) -> bool {
        matches!(self, Self::RoiReady | Self::Calculated)
    }

    /// States from which adjustments may change.
    #[must_use]
    pub const fn accepts_adjustment(self) -> bool {
        matches!(
            self,
            Self::ImageLoaded | Self::Adjusting | Self::RoiReady | Self::Calculated
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::ImageLoaded => "image loaded",
            Self::Adjusting => "adjusting",
            Self::DrawingRoi => "drawing ROI",
            Self::RoiReady => "ROI ready",
            Self::Calculated => "calculated",
            Self::BatchComplete => "batch complete",
        };
        f.write_str(name)
    }
}
