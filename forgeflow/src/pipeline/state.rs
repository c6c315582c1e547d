//! Pipeline state tracking.
//!
//! The tracker records the observable state machine of a run:
//! `Start -> StageProvisioned -> StageCopiedIn -> StageExecuted ->
//! ArtifactTransferred -> StageFinalized -> Done`, with `Failed`
//! reachable from anywhere and terminal. Once terminal, further
//! transitions are ignored - there is no resume.

use crate::core::PipelineState;
use parking_lot::RwLock;
use tracing::warn;

/// Records the state transitions of one pipeline invocation.
///
/// Shared between the orchestrator and the caller so the history stays
/// readable after a failed run.
#[derive(Debug)]
pub struct StateTracker {
    history: RwLock<Vec<PipelineState>>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Creates a tracker positioned at `Start`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: RwLock::new(vec![PipelineState::Start]),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn current(&self) -> PipelineState {
        self.history
            .read()
            .last()
            .cloned()
            .unwrap_or(PipelineState::Start)
    }

    /// Records a transition.
    ///
    /// Consecutive duplicates collapse (a stage with several copy steps
    /// is "copied in" once). Transitions after a terminal state are
    /// ignored with a warning.
    pub fn record(&self, state: PipelineState) {
        let mut history = self.history.write();

        if let Some(last) = history.last() {
            if last.is_terminal() {
                warn!(
                    attempted = state.label(),
                    "Ignoring transition after terminal state"
                );
                return;
            }
            if *last == state {
                return;
            }
        }

        history.push(state);
    }

    /// Records the terminal `Failed` state.
    pub fn fail(&self, reason: impl Into<String>) {
        self.record(PipelineState::Failed {
            reason: reason.into(),
        });
    }

    /// Returns true if the run ended in `Failed`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.current(), PipelineState::Failed { .. })
    }

    /// Returns the full transition history.
    #[must_use]
    pub fn history(&self) -> Vec<PipelineState> {
        self.history.read().clone()
    }
}
