//! State module for the daemon lifecycle
//!
//! Provides the lifecycle state enum with its transition rules:
//! - Uninitialized: constructed, not started
//! - Starting / Running: hook installed, listener matching events
//! - Stopping / Stopped: clean shutdown
//! - Failed: hotkey disabled, host keeps running

mod machine;

pub use machine::{DaemonState, FailureReason};
