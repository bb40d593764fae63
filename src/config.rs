//! Configuration management for inwatch
//!
//! Settings come from a TOML file, then `INWATCH_*` environment variables,
//! then command-line flags, each layer overriding the previous one.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};
use crate::filter::FilterPair;
use crate::flavor::{self, Flavor};
use crate::notifier::{DEFAULT_DEDUP_CAPACITY, DEFAULT_PROGRAM};
use crate::watcher::WatchOptions;

/// Watch settings as written in a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Only files whose absolute path matches are reported
    pub allow: Option<String>,
    /// Files whose absolute path matches are never reported
    pub reject: Option<String>,
    /// Dialect `allow` and `reject` are written in
    pub pattern_flavor: Flavor,
    /// Watch subdirectories too
    pub recursive: bool,
    /// Don't report files present at startup
    pub skip_initial: bool,
    /// Report files present at startup and exit
    pub scan_only: bool,
    /// Path of the `inotifywait` executable
    pub exec_path: String,
    /// Window for dropping repeated identical records, 0 to disable
    pub dedup_window_ms: u64,
    /// Number of distinct records remembered for duplicate detection
    pub dedup_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            allow: None,
            reject: None,
            pattern_flavor: Flavor::Rust,
            recursive: true,
            skip_initial: false,
            scan_only: false,
            exec_path: DEFAULT_PROGRAM.to_string(),
            dedup_window_ms: 0,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl WatchConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| WatchError::Config(format!("{}: {}", path.display(), err)))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `INWATCH_*` environment variables if present
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("INWATCH_ALLOW") {
            self.allow = Some(val);
        }

        if let Ok(val) = std::env::var("INWATCH_REJECT") {
            self.reject = Some(val);
        }

        if let Ok(val) = std::env::var("INWATCH_EXEC_PATH") {
            self.exec_path = val;
        }

        if let Ok(val) = std::env::var("INWATCH_DEDUP_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.dedup_window_ms = ms;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dedup_capacity == 0 {
            return Err("dedup_capacity must be greater than 0".to_string());
        }

        if self.exec_path.trim().is_empty() {
            return Err("exec_path must not be empty".to_string());
        }

        for (name, pattern) in [("allow", &self.allow), ("reject", &self.reject)] {
            if matches!(pattern, Some(p) if p.is_empty()) {
                return Err(format!("{} pattern must not be empty", name));
            }
        }

        Ok(())
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    /// Translate and compile the patterns, producing watch options
    pub fn into_options(self) -> Result<WatchOptions> {
        self.validate().map_err(WatchError::Config)?;

        let native = |pattern: Option<String>| {
            pattern.map(|p| flavor::translate(&p, self.pattern_flavor, Flavor::Rust))
        };
        let allow = native(self.allow.clone());
        let reject = native(self.reject.clone());
        let filter = FilterPair::compile(allow.as_deref(), reject.as_deref())?;

        Ok(WatchOptions {
            filter,
            recursive: self.recursive,
            skip_initial: self.skip_initial,
            scan_only: self.scan_only,
            exec_path: self.exec_path.clone(),
            dedup_window: self.dedup_window(),
            dedup_capacity: self.dedup_capacity,
        })
    }
}
