use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Markers on a partial result. None of these is an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReasoningFlags {
    /// Inference stopped at the iteration cap before reaching a fixed point.
    pub depth_exceeded: bool,
    /// A size budget (paths, derived triples, merges) cut the result short.
    pub truncated: bool,
    /// The wall-clock budget ran out.
    pub timed_out: bool,
}

impl ReasoningFlags {
    /// True if no budget was hit.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !(self.depth_exceeded || self.truncated || self.timed_out)
    }

    pub(crate) fn warn_if_partial(&self, operation: &'static str) {
        if !self.is_complete() {
            warn!(
                operation,
                depth_exceeded = self.depth_exceeded,
                truncated = self.truncated,
                timed_out = self.timed_out,
                "Reasoning returned a partial result"
            );
        }
    }
}

/// Optional wall-clock deadline for one operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    pub(crate) fn new(limit: Option<Duration>) -> Self {
        Self {
            deadline: limit.map(|d| Instant::now() + d),
        }
    }

    pub(crate) fn unlimited() -> Self {
        Self { deadline: None }
    }

    pub(crate) fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
