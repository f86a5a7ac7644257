//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::hotkey::HotkeyCombination;

/// Environment variable overriding the hotkey
pub const HOTKEY_ENV: &str = "WALLPAPER_HOTKEY";
/// Environment variable holding the command run on each hotkey press
pub const ACTION_ENV: &str = "WALLPAPER_HOTKEY_ACTION";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Global hotkey that triggers the action
    pub hotkey: HotkeyCombination,

    /// Command (program plus arguments) run when the hotkey fires
    pub action: Option<Vec<String>>,

    /// X11 display to hook; `None` when no display is available
    pub display: Option<String>,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Daemon log file
    pub log_file: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Self::from_lookup(&home, |key| std::env::var(key).ok())
    }

    fn from_lookup(home: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("wallpaper-manager");
        let log_file = data_dir.join("hotkey-daemon.log");

        let hotkey = match lookup(HOTKEY_ENV) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid {HOTKEY_ENV} value {raw:?}"))?,
            None => HotkeyCombination::default(),
        };

        let action = lookup(ACTION_ENV)
            .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty());

        let display = lookup("DISPLAY").filter(|d| !d.is_empty());

        Ok(Self {
            hotkey,
            action,
            display,
            data_dir,
            log_file,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::from_lookup("/home/test", |_| None).unwrap()
    }
}
