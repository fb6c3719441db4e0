//! Flow lifecycle
//!
//! `Idle -> Fetched -> Computed -> Posted`, with `Failed` reachable from any
//! non-terminal state. A flow with nothing to do goes straight from `Fetched`
//! to `Posted`.

use serde::Serialize;
use tracing::debug;

use crate::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    Idle,
    Fetched,
    Computed,
    Posted,
    Failed,
}

impl FlowState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Posted | FlowState::Failed)
    }

    #[must_use]
    pub fn can_advance_to(self, next: FlowState) -> bool {
        use FlowState::*;
        match (self, next) {
            (Idle, Fetched) | (Fetched, Computed) | (Fetched, Posted) | (Computed, Posted) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Outcome of one flow for one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowReport {
    pub flow: &'static str,
    pub state: FlowState,
    /// Result records posted
    pub posted: usize,
    /// Artifacts skipped because results already existed
    pub skipped: usize,
}

impl FlowReport {
    /// Report for a flow that failed before finishing
    #[must_use]
    pub fn failed(flow: &'static str) -> Self {
        Self {
            flow,
            state: FlowState::Failed,
            posted: 0,
            skipped: 0,
        }
    }
}

/// Tracks a flow's state and counters while it runs
#[derive(Debug)]
pub struct FlowRun {
    flow: &'static str,
    state: FlowState,
    posted: usize,
    skipped: usize,
}

impl FlowRun {
    #[must_use]
    pub fn new(flow: &'static str) -> Self {
        Self {
            flow,
            state: FlowState::Idle,
            posted: 0,
            skipped: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Move to `next`
    ///
    /// # Errors
    /// Returns [`FlowError::InvalidTransition`] for a transition outside the lifecycle.
    pub fn advance(&mut self, next: FlowState) -> Result<(), FlowError> {
        if !self.state.can_advance_to(next) {
            return Err(FlowError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("{}: {:?} -> {:?}", self.flow, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Inputs selected; `skipped` artifacts already have results
    pub fn fetched(&mut self, skipped: usize) -> Result<(), FlowError> {
        self.skipped += skipped;
        self.advance(FlowState::Fetched)
    }

    pub fn computed(&mut self) -> Result<(), FlowError> {
        self.advance(FlowState::Computed)
    }

    /// Count records posted; the flow may post several batches while `Computed`
    pub fn record_posted(&mut self, count: usize) {
        self.posted += count;
    }

    /// Finish as `Posted`
    pub fn finish(mut self) -> Result<FlowReport, FlowError> {
        self.advance(FlowState::Posted)?;
        Ok(FlowReport {
            flow: self.flow,
            state: self.state,
            posted: self.posted,
            skipped: self.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let mut run = FlowRun::new("blur");
        run.fetched(2).unwrap();
        run.computed().unwrap();
        run.record_posted(3);
        let report = run.finish().unwrap();
        assert_eq!(report.state, FlowState::Posted);
        assert_eq!(report.posted, 3);
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn test_nothing_to_compute() {
        let mut run = FlowRun::new("pose");
        run.fetched(5).unwrap();
        let report = run.finish().unwrap();
        assert_eq!(report.posted, 0);
        assert_eq!(report.skipped, 5);
    }

    #[test]
    fn test_out_of_order_transitions_rejected() {
        let mut run = FlowRun::new("pose");
        assert!(matches!(
            run.computed(),
            Err(FlowError::InvalidTransition {
                from: FlowState::Idle,
                to: FlowState::Computed
            })
        ));
        assert!(!FlowState::Posted.can_advance_to(FlowState::Failed));
        assert!(FlowState::Computed.can_advance_to(FlowState::Failed));
    }
}
