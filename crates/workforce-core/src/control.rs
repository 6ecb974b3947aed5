//! Run control shared between the orchestrator and its host.
//!
//! A stop request is only honoured at year boundaries: a year that has
//! started always finishes (or fails) as a whole.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Sentinel for "no year completed yet".
const NONE_COMPLETED: i64 = i64::MIN;

#[derive(Debug)]
struct ControlState {
    stop_requested: AtomicBool,
    last_completed_year: AtomicI64,
}

/// Cloneable handle to the shared run state.
#[derive(Debug, Clone)]
pub struct RunControl {
    state: Arc<ControlState>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    /// Create a control handle with no stop requested.
    pub fn new() -> Self {
        Self {
            state: Arc::new(ControlState {
                stop_requested: AtomicBool::new(false),
                last_completed_year: AtomicI64::new(NONE_COMPLETED),
            }),
        }
    }

    /// Ask the run to stop at the next year boundary.
    pub fn request_stop(&self) {
        self.state.stop_requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.state.stop_requested.load(Ordering::Acquire)
    }

    /// Record that `year` was committed.
    pub fn mark_completed(&self, year: i32) {
        self.state
            .last_completed_year
            .store(i64::from(year), Ordering::Release);
    }

    /// Most recent committed year, if any.
    pub fn last_completed_year(&self) -> Option<i32> {
        match self.state.last_completed_year.load(Ordering::Acquire) {
            NONE_COMPLETED => None,
            year => i32::try_from(year).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let control = RunControl::new();
        let handle = control.clone();
        assert!(!control.is_stop_requested());
        handle.request_stop();
        assert!(control.is_stop_requested());

        assert_eq!(control.last_completed_year(), None);
        handle.mark_completed(2026);
        assert_eq!(control.last_completed_year(), Some(2026));
    }
}
