use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ProcessingState {
    Idle = 0,
    Sampling = 1,
    Processing = 2,
    Cancelling = 3,
    Completed = 4,
    Failed = 5,
    Cancelled = 6,
}

impl ProcessingState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessingState::Completed | ProcessingState::Failed | ProcessingState::Cancelled
        )
    }

    /// Transitions move forward only. `Cancelling` is entered from `Processing`
    /// and always resolves to `Cancelled`.
    pub fn can_transition_to(self, next: ProcessingState) -> bool {
        use ProcessingState::*;
        matches!(
            (self, next),
            (Idle, Sampling)
                | (Idle, Failed)
                | (Sampling, Processing)
                | (Sampling, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelling)
                | (Cancelling, Cancelled)
        )
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ProcessingState::Sampling,
            2 => ProcessingState::Processing,
            3 => ProcessingState::Cancelling,
            4 => ProcessingState::Completed,
            5 => ProcessingState::Failed,
            6 => ProcessingState::Cancelled,
            _ => ProcessingState::Idle,
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessingState::Idle => "idle",
            ProcessingState::Sampling => "sampling",
            ProcessingState::Processing => "processing",
            ProcessingState::Cancelling => "cancelling",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
            ProcessingState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Current state of a run, readable from any thread. Only the worker writes it.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ProcessingState::Idle as u8)))
    }

    pub fn get(&self) -> ProcessingState {
        ProcessingState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ProcessingState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
