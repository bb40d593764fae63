use std::path::PathBuf;
use clap::{Parser, ValueEnum};

use crate::config::WatchConfig;
use crate::flavor::Flavor;

#[derive(Parser, Debug)]
#[command(name = "inwatch")]
#[command(version)]
#[command(about = "Report file add/change/remove events under a directory using inotifywait")]
#[command(long_about = "inwatch scans a directory, reports the files it finds, then follows inotifywait's event stream and reports every file added, changed or removed below it. Directory moves and deletions are expanded into per-file events.")]
pub struct Cli {
    /// Directory to watch
    #[arg(value_name = "PATH", help = "Path to watch (defaults to current directory)")]
    pub path: Option<PathBuf>,

    /// Only report files whose absolute path matches this pattern
    #[arg(long, value_name = "REGEX")]
    pub allow: Option<String>,

    /// Never report files whose absolute path matches this pattern
    #[arg(long, value_name = "REGEX")]
    pub reject: Option<String>,

    /// Regex dialect of --allow and --reject
    #[arg(long, value_name = "FLAVOR", value_parser = parse_flavor)]
    pub pattern_flavor: Option<Flavor>,

    /// Only watch the top-level directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Don't report files that exist at startup
    #[arg(long)]
    pub skip_initial: bool,

    /// Report files that exist at startup, then exit
    #[arg(long, conflicts_with = "skip_initial")]
    pub scan_only: bool,

    /// Path to the inotifywait executable
    #[arg(long, value_name = "PATH")]
    pub exec_path: Option<String>,

    /// Drop identical notifier records repeated within this many milliseconds
    #[arg(long, value_name = "MS")]
    pub dedup_ms: Option<u64>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Print the inotifywait command line and exit
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per event
    Json,
    /// `ADD path`
    Text,
    /// `A path`
    Compact,
}

fn parse_flavor(value: &str) -> Result<Flavor, String> {
    value.parse()
}

impl Cli {
    pub fn get_watch_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    /// File and environment settings with flags applied on top.
    pub fn watch_config(&self) -> crate::Result<WatchConfig> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::load(path)?,
            None => WatchConfig::default(),
        };
        config.apply_env();

        if let Some(allow) = &self.allow {
            config.allow = Some(allow.clone());
        }
        if let Some(reject) = &self.reject {
            config.reject = Some(reject.clone());
        }
        if let Some(flavor) = self.pattern_flavor {
            config.pattern_flavor = flavor;
        }
        if self.no_recursive {
            config.recursive = false;
        }
        if self.skip_initial {
            config.skip_initial = true;
        }
        if self.scan_only {
            config.scan_only = true;
        }
        if let Some(exec_path) = &self.exec_path {
            config.exec_path = exec_path.clone();
        }
        if let Some(ms) = self.dedup_ms {
            config.dedup_window_ms = ms;
        }

        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        let path = self.get_watch_path();

        if !path.exists() {
            return Err(format!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        if let Some(config) = &self.config {
            if !config.is_file() {
                return Err(format!("Config file not found: {}", config.display()));
            }
        }

        Ok(())
    }
}
