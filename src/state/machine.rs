//! Daemon lifecycle states and legal transitions
//!
//! Uninitialized → Starting → Running → Stopping → Stopped, with
//! Starting and Running able to fall into Failed. Stopped and Failed
//! are terminal.

use crate::hotkey::{HookError, StreamError};

/// Why the daemon gave up on the hotkey feature
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    /// The global hook could not be installed
    #[error(transparent)]
    Hook(#[from] HookError),

    /// The event stream broke while running
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The listener thread could not be spawned
    #[error("failed to spawn listener thread: {0}")]
    Spawn(String),
}

/// The six states of the hotkey daemon
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DaemonState {
    /// Constructed, hotkey not yet started
    #[default]
    Uninitialized,
    /// Installing the global hook
    Starting,
    /// Listener thread is matching events
    Running,
    /// Hook closed, waiting for the listener to exit
    Stopping,
    /// Cleanly shut down
    Stopped,
    /// Hotkey unavailable; the host keeps running without it
    Failed(FailureReason),
}

impl DaemonState {
    /// Short state name for logs and health reports
    pub fn label(&self) -> &'static str {
        match self {
            DaemonState::Uninitialized => "uninitialized",
            DaemonState::Starting => "starting",
            DaemonState::Running => "running",
            DaemonState::Stopping => "stopping",
            DaemonState::Stopped => "stopped",
            DaemonState::Failed(_) => "failed",
        }
    }

    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, DaemonState::Stopped | DaemonState::Failed(_))
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            DaemonState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: &DaemonState) -> bool {
        use DaemonState::*;

        matches!(
            (self, next),
            (Uninitialized, Starting)
                | (Starting, Running)
                | (Starting, Failed(_))
                | (Running, Stopping)
                | (Running, Failed(_))
                | (Stopping, Stopped)
        )
    }
}

impl std::fmt::Display for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonState::Failed(reason) => write!(f, "Failed({})", reason),
            other => {
                let label = other.label();
                let mut chars = label.chars();
                if let Some(first) = chars.next() {
                    write!(f, "{}{}", first.to_ascii_uppercase(), chars.as_str())?;
                }
                Ok(())
            }
        }
    }
}
