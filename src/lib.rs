//! wallpaper-hotkey: global hotkey daemon for the wallpaper manager
//!
//! Listens for a key combination system-wide (Super+Alt+W by default)
//! and hands each press to a single-threaded consumer loop:
//! - Pass-through X11 key capture behind a pluggable event source
//! - Stateless hotkey matching
//! - Coalescing single-slot dispatch to the consumer thread
//! - Lifecycle controller that degrades instead of failing the host

pub mod config;
pub mod dispatch;
pub mod hotkey;
pub mod lifecycle;
pub mod state;

pub use config::Config;
pub use dispatch::{DispatchBridge, Dispatcher};
pub use hotkey::{
    detect_source, EventSource, Hook, HookError, HotkeyCombination, KeyEvent, StreamError,
};
pub use lifecycle::{ConfigError, HealthStatus, HotkeyDaemon};
pub use state::{DaemonState, FailureReason};
