//! Lifecycle module: daemon controller, health reporting and
//! process signal handling

mod controller;
mod health;
mod shutdown;

pub use controller::{ConfigError, HotkeyDaemon};
pub use health::HealthStatus;
pub use shutdown::{ProcessSignal, ShutdownSignal};
