//! Minimal health snapshot of the daemon
//!
//! Serialized as JSON into the log on demand; there is no socket or
//! file protocol.

use serde::Serialize;

use super::controller::HotkeyDaemon;
use crate::state::DaemonState;

/// Point-in-time daemon health
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Daemon version
    pub version: String,

    /// Lifecycle state label
    pub state: String,

    /// Failure reason when the hotkey is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Registered hotkey in textual form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,

    /// Event source backend in use
    pub source: String,

    /// Whether the hotkey is currently being listened for
    pub hotkey_active: bool,

    /// Callbacks dispatched so far
    pub deliveries: u64,

    /// Seconds since the daemon was constructed
    pub uptime_secs: u64,
}

impl HealthStatus {
    /// Capture the current health of `daemon`
    pub fn capture(daemon: &HotkeyDaemon, deliveries: u64) -> Self {
        let state = daemon.state();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: state.label().to_string(),
            failure: state.failure().map(|reason| reason.to_string()),
            hotkey: daemon.combination().map(|c| c.to_string()),
            source: daemon.source_name().to_string(),
            hotkey_active: state == DaemonState::Running,
            deliveries,
            uptime_secs: daemon.created_at().elapsed().as_secs(),
        }
    }

    /// True unless the hotkey feature has been lost
    pub fn is_healthy(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{HotkeyCombination, UnsupportedSource};

    #[test]
    fn test_capture_fresh_daemon() {
        let daemon = HotkeyDaemon::new(Box::new(UnsupportedSource::new("headless")));
        let health = HealthStatus::capture(&daemon, 0);

        assert_eq!(health.state, "uninitialized");
        assert_eq!(health.source, "unsupported");
        assert!(health.hotkey.is_none());
        assert!(!health.hotkey_active);
        assert!(health.is_healthy());
    }

    #[test]
    fn test_capture_failed_daemon() {
        let daemon = HotkeyDaemon::new(Box::new(UnsupportedSource::new("headless")));
        let _dispatcher = daemon
            .register_hotkey(HotkeyCombination::default(), || {})
            .unwrap();
        daemon.start().unwrap();

        let health = HealthStatus::capture(&daemon, 0);
        assert_eq!(health.state, "failed");
        assert_eq!(health.hotkey.as_deref(), Some("super+alt+w"));
        assert!(health.failure.unwrap().contains("headless"));
    }

    #[test]
    fn test_health_serialization() {
        let daemon = HotkeyDaemon::new(Box::new(UnsupportedSource::new("headless")));
        let json = serde_json::to_string(&HealthStatus::capture(&daemon, 3)).unwrap();
        assert!(json.contains("\"state\":\"uninitialized\""));
        assert!(json.contains("\"deliveries\":3"));
        assert!(!json.contains("failure"));
    }
}
