//! innervation-session: batch workflow for innervation index measurement.
//!
//! Drives the analysis pipeline through a per-image state machine:
//! load a batch, adjust each image, draw an ROI, threshold, calculate,
//! then save or skip and move on. Saved rows accumulate for export.

pub mod batch;
pub mod config;
mod error;
pub mod job;
pub mod session;
pub mod state;

pub use batch::{BatchFile, DecodeFailure};
pub use config::SessionConfig;
pub use error::SessionError;
pub use job::{AdjustmentJob, AdjustmentOutput};
pub use session::{Calculation, Session};
pub use state::SessionState;
