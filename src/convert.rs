//! External format conversion with bounded retries.
//!
//! The converter's exit status is not trusted on its own: after every attempt
//! the output is re-checked with [`crate::validator::is_valid`], and only a
//! validated file counts as converted.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::RetryPolicy;
use crate::error::ConvertError;
use crate::validator::is_valid;

/// Runs one conversion of `input` into `output`.
#[async_trait]
pub trait ConvertCommand: Send + Sync {
    async fn run(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Waits between attempts. Tests inject a recording fake.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Invokes an external program as `<program> <input> <output>`.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: String,
}

impl ExternalConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ConvertCommand for ExternalConverter {
    async fn run(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let status = Command::new(&self.program)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ConvertError::NonZeroExit {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Drives a [`ConvertCommand`] under a [`RetryPolicy`].
pub struct Converter {
    command: Arc<dyn ConvertCommand>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl Converter {
    pub fn new(
        command: Arc<dyn ConvertCommand>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            command,
            sleeper,
            policy,
        }
    }

    /// Production converter: external program, real sleeps.
    pub fn external(program: impl Into<String>, policy: RetryPolicy) -> Self {
        Self::new(
            Arc::new(ExternalConverter::new(program)),
            Arc::new(TokioSleeper),
            policy,
        )
    }

    /// Convert `input` into `output`, returning the validated output path.
    ///
    /// Never removes `output` on failure.
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<PathBuf, ConvertError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = self.command.run(input, output).await;

            // Exit status alone is not trusted; truncated output fails here.
            let outcome = match result {
                Ok(()) if is_valid(output, self.policy.min_output_bytes) => {
                    info!(
                        input = %input.display(),
                        output = %output.display(),
                        attempt,
                        "Conversion succeeded"
                    );
                    return Ok(output.to_path_buf());
                }
                Ok(()) => ConvertError::InvalidOutput {
                    path: output.to_path_buf(),
                },
                Err(e) => e,
            };

            warn!(
                input = %input.display(),
                attempt,
                max_attempts = attempts,
                "Conversion attempt failed: {outcome}"
            );
            last_error = outcome.to_string();

            if attempt < attempts {
                self.sleeper.sleep(self.policy.delay).await;
            }
        }

        Err(ConvertError::AttemptsExhausted {
            attempts,
            last_error,
        })
    }
}
