//! Adjustment recomputation that can run off the session's thread.
//!
//! [`Session::request_adjustment`](crate::Session::request_adjustment)
//! hands out an [`AdjustmentJob`] holding a shared snapshot of the
//! normalized buffer. The job runs anywhere; its [`AdjustmentOutput`]
//! goes back through
//! [`Session::apply_adjustment`](crate::Session::apply_adjustment),
//! which drops it if a newer request (or a new image) came in since.

use std::sync::Arc;
use std::time::Duration;

use innervation_pipeline::adjust::apply_adjustments;
use innervation_pipeline::diagnostics::timed;
use innervation_pipeline::{AdjustmentState, GrayImage, SystemClock, Ticket};

/// A pending adjustment of one image.
#[derive(Debug, Clone)]
#[must_use = "a job does nothing until run"]
pub struct AdjustmentJob {
    pub(crate) ticket: Ticket,
    pub(crate) normalized: Arc<GrayImage>,
    pub(crate) state: AdjustmentState,
}

impl AdjustmentJob {
    /// The request's ticket.
    pub const fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Adjustments this job applies.
    pub const fn state(&self) -> AdjustmentState {
        self.state
    }

    /// Compute the working buffer.
    pub fn run(self) -> AdjustmentOutput {
        let (working, duration) = timed(&SystemClock, || {
            apply_adjustments(&self.normalized, &self.state)
        });
        AdjustmentOutput {
            ticket: self.ticket,
            state: self.state,
            working,
            duration,
        }
    }
}

/// Result of [`AdjustmentJob::run`].
#[derive(Debug, Clone)]
pub struct AdjustmentOutput {
    pub(crate) ticket: Ticket,
    pub(crate) state: AdjustmentState,
    pub(crate) working: GrayImage,
    pub(crate) duration: Duration,
}

impl AdjustmentOutput {
    /// Ticket of the request that produced this output.
    #[must_use]
    pub const fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// The computed working buffer.
    #[must_use]
    pub const fn working(&self) -> &GrayImage {
        &self.working
    }
}
