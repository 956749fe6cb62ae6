use innervation_pipeline::PipelineError;

use crate::state::SessionState;

/// Errors returned by session commands.
///
/// A failed command never changes the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The ROI is missing, unfinished, or has a bad vertex.
    #[error("invalid ROI: {0}")]
    InvalidRoi(String),

    /// The frozen ROI covers no pixels.
    #[error("ROI contains no pixels")]
    EmptyRoi,

    /// The command is not valid in the current state.
    #[error("cannot {command} while {state}")]
    InvalidTransition {
        /// Command name.
        command: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// The command needs a current image and there is none.
    #[error("no image loaded")]
    NoImage,

    /// `load_batch` was given no files.
    #[error("batch contains no files")]
    EmptyBatch,

    /// Contrast, brightness or blur radius out of range.
    #[error("invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// Analysis failure not covered above.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl SessionError {
    /// Map pipeline failures onto the session's vocabulary.
    pub(crate) fn from_analysis(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyRoi => Self::EmptyRoi,
            e @ (PipelineError::InsufficientVertices { .. } | PipelineError::InvalidVertex { .. }) => {
                Self::InvalidRoi(e.to_string())
            }
            other => Self::Pipeline(other),
        }
    }
}
