use std::fmt;

use crate::helper::Termination;

/// Recording life cycle state. Owned by `App` and shown through the presenter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Recording,
    Processing,
    Typing,
    Error,
}

/// Identifies one helper process from spawn to exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// User input that drives the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Click,
    /// Click bound to a custom prompt, indexing `Config::custom_prompts`.
    Prompt(usize),
}

/// Asynchronous notifications delivered back to the state machine.
#[derive(Debug)]
pub enum Event {
    HelperExited {
        session: SessionId,
        termination: Termination,
    },
    WatchdogFired(SessionId),
    TypingFinished {
        session: SessionId,
        result: Result<(), String>,
    },
}
