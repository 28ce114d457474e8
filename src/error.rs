//! Error types for kindle-relay.

use std::path::PathBuf;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External converter errors.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    NonZeroExit { program: String, status: String },

    #[error("Conversion produced invalid file: {}", path.display())]
    InvalidOutput { path: PathBuf },

    #[error("Conversion failed after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },
}

/// Mail delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery is not configured (set KINDLE_SMTP_USERNAME and KINDLE_TO_ADDRESS)")]
    NotConfigured,

    #[error("Failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP relay error: {0}")]
    Relay(String),

    #[error("SMTP send failed: {0}")]
    SendFailed(String),
}

/// Filesystem errors raised while processing one inbox file.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to remove stale artifact {}: {source}", path.display())]
    StaleArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {name} to archive: {source}")]
    Archive {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list inbox {}: {source}", path.display())]
    ListInbox {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem watcher errors.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to start watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error("Inbox {} does not exist", .0.display())]
    MissingInbox(PathBuf),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
