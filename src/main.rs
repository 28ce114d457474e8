use std::sync::Arc;

use kindle_relay::config::{DEFAULT_LOG_FILE, RelayConfig};
use kindle_relay::convert::Converter;
use kindle_relay::delivery::{Delivery, DisabledDelivery, EmailConfig, SmtpDelivery};
use kindle_relay::pipeline::{BatchRunner, FileProcessor};
use kindle_relay::progress::ConsoleProgress;
use kindle_relay::watcher::InboxWatcher;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let config = RelayConfig::from_env()?;
    let console = ConsoleProgress::new();
    let _log_guard = init_tracing(&config, console.clone());
    let email_config = EmailConfig::from_env()?;

    eprintln!("📚 Kindle Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Inbox: {}", config.layout.inbox.display());
    eprintln!("   Output: {}", config.layout.output.display());
    eprintln!("   Archive: {}", config.layout.archive.display());
    eprintln!(
        "   Converter: {} ({} attempts, {}s apart)",
        config.convert_command,
        config.retry.max_attempts,
        config.retry.delay.as_secs()
    );
    eprintln!("   Log: {}", config.log_file.display());

    if let Err(e) = run(config, email_config, console).await {
        tracing::error!("🚨 Fatal error: {e}");
        return Err(e.into());
    }

    Ok(())
}

/// Bootstrap directories, wire the pipeline and watch until Ctrl+C.
async fn run(
    config: RelayConfig,
    email_config: Option<EmailConfig>,
    console: ConsoleProgress,
) -> kindle_relay::error::Result<()> {
    config.layout.ensure_dirs().await?;

    // ── Delivery ────────────────────────────────────────────────────────
    let delivery: Arc<dyn Delivery> = match email_config {
        Some(email) => {
            eprintln!(
                "   Delivery: {} via {}:{}",
                email.to_address, email.smtp_host, email.smtp_port
            );
            Arc::new(SmtpDelivery::new(email))
        }
        None => {
            eprintln!("   Delivery: disabled (KINDLE_SMTP_USERNAME not set)");
            Arc::new(DisabledDelivery)
        }
    };

    // ── Pipeline ────────────────────────────────────────────────────────
    let converter = Converter::external(config.convert_command.clone(), config.retry);
    let processor = FileProcessor::from_config(&config, delivery, converter);
    let mut runner = BatchRunner::new(processor);
    if config.show_progress {
        runner = runner.with_progress(console);
    }
    let watcher =
        InboxWatcher::new(runner, config.debounce).with_scan_on_start(config.scan_on_start);

    eprintln!(
        "   Drop files in '{}' to process! Ctrl+C to exit.\n",
        config.layout.inbox.display()
    );

    watcher.run().await?;
    Ok(())
}

/// Console plus append-only log file. Hold the returned guard until exit.
///
/// Console lines go through `console` so they never tear the progress bar.
fn init_tracing(config: &RelayConfig, console: ConsoleProgress) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut log_guard = None;
    let file_layer = match std::fs::create_dir_all(config.log_dir()) {
        Ok(()) => {
            let file_name = config
                .log_file
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| DEFAULT_LOG_FILE.into());
            let appender = tracing_appender::rolling::never(config.log_dir(), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            log_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(env_filter.clone()),
            )
        }
        Err(e) => {
            eprintln!("Warning: failed to create log directory: {e}");
            None
        }
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(console)
        .with_target(false)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    log_guard
}
