//! Configuration types.
//!
//! Everything is read from the environment once at startup and passed by
//! reference into each component. Delivery settings live next to the SMTP
//! code in [`crate::delivery::EmailConfig`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tokio::fs;

use crate::error::ConfigError;
use crate::validator::DEFAULT_MIN_SIZE_BYTES;

/// Default target e-reader format.
pub const DEFAULT_TARGET_FORMAT: &str = "mobi";

/// Default external conversion tool (Calibre).
pub const DEFAULT_CONVERT_COMMAND: &str = "ebook-convert";

/// Default append-only log file.
pub const DEFAULT_LOG_FILE: &str = "conversion.log";

/// Directory layout rooted at the inbox.
///
/// ```text
/// <inbox>/                 watched, files dropped here
/// <inbox>/kindle/          staging
/// <inbox>/kindle/<target>/ converted artifacts
/// <inbox>/processed/       archived originals
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub inbox: PathBuf,
    pub staging: PathBuf,
    pub output: PathBuf,
    pub archive: PathBuf,
}

impl Layout {
    /// Derive the layout from an inbox directory and the target format.
    pub fn new(inbox: impl Into<PathBuf>, target_format: &str) -> Self {
        let inbox = inbox.into();
        let staging = inbox.join("kindle");
        let output = staging.join(target_format);
        let archive = inbox.join("processed");
        Self {
            inbox,
            staging,
            output,
            archive,
        }
    }

    /// Create every directory of the layout if absent.
    pub async fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.inbox, &self.staging, &self.output, &self.archive] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Path of a file directly inside the inbox.
    pub fn inbox_path(&self, name: &str) -> PathBuf {
        self.inbox.join(name)
    }

    /// Path an original is archived to.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.archive.join(name)
    }

    /// Path of a converted artifact in the output directory.
    pub fn output_path(&self, artifact_name: &str) -> PathBuf {
        self.output.join(artifact_name)
    }
}

/// Bounded retry policy for the external converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Output must be strictly larger than this to count as converted.
    pub min_output_bytes: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            min_output_bytes: DEFAULT_MIN_SIZE_BYTES,
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Inbox, staging, output and archive directories.
    pub layout: Layout,
    /// Lower-cased target extension, without the dot.
    pub target_format: String,
    /// Program invoked as `<program> <input> <output>`.
    pub convert_command: String,
    /// Converter retry policy.
    pub retry: RetryPolicy,
    /// Window in which bursts of creation events collapse into one pass.
    /// Zero runs one full pass per event.
    pub debounce: Duration,
    /// Run one pass at startup before waiting for events.
    pub scan_on_start: bool,
    /// Show a progress bar during batch passes.
    pub show_progress: bool,
    /// Append-only log file.
    pub log_file: PathBuf,
}

impl RelayConfig {
    /// Build a config for the given inbox with all other settings at defaults.
    pub fn with_inbox(inbox: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::new(inbox, DEFAULT_TARGET_FORMAT),
            target_format: DEFAULT_TARGET_FORMAT.to_string(),
            convert_command: DEFAULT_CONVERT_COMMAND.to_string(),
            retry: RetryPolicy::default(),
            debounce: Duration::from_millis(500),
            scan_on_start: false,
            show_progress: true,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }

    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let inbox = std::env::var("KINDLE_INBOX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_inbox());

        let target_format = std::env::var("KINDLE_TARGET_FORMAT")
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .unwrap_or_else(|_| DEFAULT_TARGET_FORMAT.to_string());
        if target_format.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "KINDLE_TARGET_FORMAT".into(),
                message: "must not be empty".into(),
            });
        }

        let defaults = RetryPolicy::default();
        let max_attempts: u32 = env_parse("KINDLE_CONVERT_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "KINDLE_CONVERT_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }
        let retry = RetryPolicy {
            max_attempts,
            delay: Duration::from_secs(env_parse(
                "KINDLE_CONVERT_RETRY_SECS",
                defaults.delay.as_secs(),
            )?),
            min_output_bytes: env_parse("KINDLE_MIN_OUTPUT_BYTES", defaults.min_output_bytes)?,
        };

        Ok(Self {
            layout: Layout::new(inbox, &target_format),
            convert_command: std::env::var("KINDLE_CONVERT_CMD")
                .unwrap_or_else(|_| DEFAULT_CONVERT_COMMAND.to_string()),
            target_format,
            retry,
            debounce: Duration::from_millis(env_parse("KINDLE_DEBOUNCE_MS", 500)?),
            scan_on_start: env_parse("KINDLE_SCAN_ON_START", false)?,
            show_progress: env_parse("KINDLE_PROGRESS", true)?,
            log_file: std::env::var("KINDLE_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_FILE)),
        })
    }

    /// Directory of the log file, `.` for a bare file name.
    pub fn log_dir(&self) -> &Path {
        match self.log_file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

/// `~/Downloads/ebooks`, or `./ebooks` when `HOME` is unset.
fn default_inbox() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join("Downloads").join("ebooks"))
        .unwrap_or_else(|_| PathBuf::from("ebooks"))
}

/// Parse an optional environment variable, falling back to `default` when unset.
pub(crate) fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        Err(_) => Ok(default),
    }
}
