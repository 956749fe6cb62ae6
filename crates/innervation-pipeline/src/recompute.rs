//! Last-request-wins bookkeeping for off-thread recomputation.
//!
//! Every request takes a [`Ticket`] carrying a monotonically increasing
//! generation. When the computation finishes, its ticket is checked
//! against the counter; only the most recent ticket is current, so
//! results for superseded requests are dropped instead of overwriting
//! newer state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one recompute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Raw generation number.
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0
    }
}

/// Shared generation counter.
///
/// Cloning shares the same counter, so a clone handed to a worker sees
/// requests issued after it was made.
#[derive(Debug, Clone, Default)]
pub struct RecomputeGeneration {
    latest: Arc<AtomicU64>,
}

impl RecomputeGeneration {
    /// Create a counter with no requests issued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new ticket, superseding every earlier one.
    pub fn next_ticket(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Invalidate all outstanding tickets without issuing a new one.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether `ticket` is still the latest request.
    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }
}
