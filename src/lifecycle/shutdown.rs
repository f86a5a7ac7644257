//! Signal handling for graceful shutdown

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// What the daemon shell was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// SIGINT or SIGTERM: stop and exit
    Shutdown,
    /// SIGUSR1: report health and keep running
    ReportHealth,
}

/// Handles SIGTERM, SIGINT and SIGUSR1
pub struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
    sigusr1: Signal,
}

impl ShutdownSignal {
    /// Register the signal handlers. Requires a running tokio runtime.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sigusr1: signal(SignalKind::user_defined1())?,
        })
    }

    /// Wait for the next signal of interest
    pub async fn recv(&mut self) -> ProcessSignal {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
                ProcessSignal::Shutdown
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
                ProcessSignal::Shutdown
            }
            _ = self.sigusr1.recv() => {
                debug!("received SIGUSR1");
                ProcessSignal::ReportHealth
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigusr1_reports_health() {
        let mut signals = ShutdownSignal::new().unwrap();
        let status = Command::new("kill")
            .arg("-USR1")
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
        assert!(status.success());

        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(received, ProcessSignal::ReportHealth);
    }
}
