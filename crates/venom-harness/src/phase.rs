//! Per-invocation run phases.
//!
//! `Init -> Built -> Mounted -> Executed -> ResultsCollected`, with any step
//! able to drop into `Failed`. Both terminal states are final.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Built,
    Mounted,
    Executed,
    ResultsCollected,
    Failed { reason: String },
}

impl RunPhase {
    fn ordinal(&self) -> Option<u8> {
        match self {
            RunPhase::Init => Some(0),
            RunPhase::Built => Some(1),
            RunPhase::Mounted => Some(2),
            RunPhase::Executed => Some(3),
            RunPhase::ResultsCollected => Some(4),
            RunPhase::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::ResultsCollected | RunPhase::Failed { .. })
    }

    /// Only single forward steps, or a drop into `Failed` from a live phase.
    pub fn can_advance_to(&self, next: &RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (Some(_), None) => true,
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Init => write!(f, "init"),
            RunPhase::Built => write!(f, "built"),
            RunPhase::Mounted => write!(f, "mounted"),
            RunPhase::Executed => write!(f, "executed"),
            RunPhase::ResultsCollected => write!(f, "results_collected"),
            RunPhase::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Records and logs the phase history of one invocation.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    run_id: String,
    history: Vec<RunPhase>,
}

impl PhaseTracker {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self::starting_at(run_id, RunPhase::Init)
    }

    /// Start part-way, e.g. at `Built` when the caller supplies the image.
    pub fn starting_at(run_id: impl Into<String>, phase: RunPhase) -> Self {
        PhaseTracker {
            run_id: run_id.into(),
            history: vec![phase],
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn current(&self) -> &RunPhase {
        // history is never empty
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: RunPhase) {
        if !self.current().can_advance_to(&next) {
            warn!(run_id = %self.run_id, from = %self.current(), to = %next, "Ignoring invalid phase transition");
            return;
        }
        info!(run_id = %self.run_id, from = %self.current(), to = %next, "Run phase");
        self.history.push(next);
    }

    pub fn fail(&mut self, reason: impl std::fmt::Display) {
        self.advance(RunPhase::Failed {
            reason: reason.to_string(),
        });
    }
}
