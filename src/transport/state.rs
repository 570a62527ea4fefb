//! Exchange state machine.

/// Lifecycle of a single bridge call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeState {
    #[default]
    Idle,
    Spawning,
    AwaitingResponse,
    Terminal,
    TimedOut,
    ProcessExited,
    Failed,
    Reaping,
    Done,
}

/// Tracks the state of one exchange and traces every transition.
#[derive(Debug, Clone, Default)]
pub struct ExchangeStateMachine {
    state: ExchangeState,
}

impl ExchangeStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn transition(&mut self, new_state: ExchangeState) {
        tracing::debug!(from = ?self.state, to = ?new_state, "Exchange state transition");
        self.state = new_state;
    }
}
