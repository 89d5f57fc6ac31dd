use std::fmt;

/// Lifecycle of a dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    StoppedByUser,
    StoppedByFailure,
}

impl RunState {
    pub fn is_running(self) -> bool {
        self == RunState::Running
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::StoppedByUser | RunState::StoppedByFailure)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::StoppedByUser => write!(f, "stopped by user"),
            RunState::StoppedByFailure => write!(f, "stopped by failure"),
        }
    }
}
