//! Event source abstraction
//!
//! An [`EventSource`] installs a system-wide, pass-through key hook and
//! hands back a [`Hook`] that the listener thread reads from. Windowing
//! protocols plug in here without touching matching or dispatch.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::keys::{KeyCode, ModifierState};
use super::x11::X11Source;
use crate::config::Config;

/// A raw key transition observed by the hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: KeyCode,
    pub is_press: bool,
    /// Modifiers held at the moment of the transition
    pub modifier_state: ModifierState,
    pub timestamp: Instant,
}

impl KeyEvent {
    pub fn press(key_code: KeyCode, modifier_state: ModifierState) -> Self {
        Self {
            key_code,
            is_press: true,
            modifier_state,
            timestamp: Instant::now(),
        }
    }

    pub fn release(key_code: KeyCode, modifier_state: ModifierState) -> Self {
        Self {
            is_press: false,
            ..Self::press(key_code, modifier_state)
        }
    }
}

/// Errors installing the global hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("global key capture unsupported: {0}")]
    Unsupported(String),

    #[error("global key capture denied: {0}")]
    PermissionDenied(String),
}

/// Errors reading from an installed hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The hook was closed; the normal shutdown path
    #[error("event stream closed")]
    Closed,

    #[error("event stream failed: {0}")]
    Other(String),
}

/// Factory for a system-wide key hook
pub trait EventSource: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Install the hook. Events are observed, never suppressed.
    fn open(&mut self) -> Result<Arc<dyn Hook>, HookError>;
}

/// An installed hook; owns the OS-level handle until dropped
pub trait Hook: Send + Sync {
    /// Block until the next key transition.
    ///
    /// Returns [`StreamError::Closed`] once [`Hook::close`] has been called.
    fn read_next(&self) -> Result<KeyEvent, StreamError>;

    /// Release the hook and wake any blocked `read_next`. Idempotent.
    fn close(&self);
}

/// Fallback source for environments without global key capture
#[derive(Debug, Clone)]
pub struct UnsupportedSource {
    reason: String,
}

impl UnsupportedSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl EventSource for UnsupportedSource {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn open(&mut self) -> Result<Arc<dyn Hook>, HookError> {
        Err(HookError::Unsupported(self.reason.clone()))
    }
}

/// Pick an event source for the current environment
pub fn detect_source(config: &Config) -> Box<dyn EventSource> {
    match config.display.as_deref() {
        Some(name) if !name.is_empty() => {
            info!(display = %name, "using X11 event source");
            Box::new(X11Source::new(Some(name.to_string())))
        }
        _ => {
            debug!("no X11 display configured");
            Box::new(UnsupportedSource::new("no X11 display (DISPLAY is unset)"))
        }
    }
}
