use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration for the diamond CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Per-session install switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Read and write the first-party content cache.
    pub cache: bool,
    /// Never touch the network. Implies `cache`.
    pub offline: bool,
    /// Record top-level installs in the project's `package.json`.
    pub save: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            cache: true,
            offline: false,
            save: true,
        }
    }
}

impl InstallOptions {
    /// Whether the content cache is consulted.
    #[must_use]
    pub fn use_cache(&self) -> bool {
        self.cache || self.offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::new(PathBuf::from("/tmp"))
            .with_verbosity(2)
            .with_json_logs(true);

        assert_eq!(config.cwd, PathBuf::from("/tmp"));
        assert_eq!(config.verbosity, 2);
        assert!(config.json_logs);
    }

    #[test]
    fn test_offline_implies_cache() {
        let opts = InstallOptions {
            cache: false,
            offline: true,
            save: false,
        };
        assert!(opts.use_cache());
        assert!(InstallOptions::default().use_cache());
    }
}
