//! Per-file state machine: classify → deliver → convert → archive.
//!
//! No step's failure stops the ones after it. Every recognized file is moved
//! to the archive once its processing has run, whether delivery or conversion
//! succeeded or not. Unrecognized files are never touched.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, error, info};

use crate::config::{Layout, RelayConfig};
use crate::convert::Converter;
use crate::delivery::Delivery;
use crate::error::PipelineError;
use crate::pipeline::rules::{artifact_name, classify};
use crate::pipeline::types::{Disposition, FileReport};

/// Runs the pipeline over individual inbox files.
pub struct FileProcessor {
    layout: Layout,
    target_format: String,
    delivery: Arc<dyn Delivery>,
    converter: Converter,
}

impl FileProcessor {
    pub fn new(
        layout: Layout,
        target_format: impl Into<String>,
        delivery: Arc<dyn Delivery>,
        converter: Converter,
    ) -> Self {
        Self {
            layout,
            target_format: target_format.into(),
            delivery,
            converter,
        }
    }

    /// Build from relay config with the given collaborators.
    pub fn from_config(
        config: &RelayConfig,
        delivery: Arc<dyn Delivery>,
        converter: Converter,
    ) -> Self {
        Self::new(
            config.layout.clone(),
            config.target_format.clone(),
            delivery,
            converter,
        )
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Process one file, named relative to the inbox.
    pub async fn process_file(&self, name: &str) -> FileReport {
        let disposition = classify(name, &self.target_format);
        let mut report = FileReport::new(name, disposition);
        let original = self.layout.inbox_path(name);

        match disposition {
            Disposition::Ignore => {
                debug!(file = name, "Skipping unrecognized file");
                return report;
            }
            Disposition::DeliverAndConvert => {
                info!(file = name, "Sending original");
                report.delivered = Some(self.deliver(&original).await);

                info!(file = name, target = %self.target_format, "Converting");
                report.converted = Some(self.convert(name, &original).await);
            }
            Disposition::AlreadyTarget => {
                info!(
                    file = name,
                    "Already {}, not sending via email", self.target_format
                );
            }
        }

        match self.archive(name).await {
            Ok(()) => {
                info!(file = name, "Moved original file to processed");
                report.archived = true;
            }
            Err(e) => error!(file = name, "{e}"),
        }

        report
    }

    async fn deliver(&self, original: &Path) -> bool {
        match self.delivery.deliver(original).await {
            Ok(()) => true,
            Err(e) => {
                error!(path = %original.display(), "Failed to send: {e}");
                false
            }
        }
    }

    async fn convert(&self, name: &str, original: &Path) -> bool {
        let artifact = artifact_name(name, &self.target_format);
        let output = self.layout.output_path(&artifact);

        // A stale artifact would satisfy the validator without a fresh run.
        match remove_stale(&output).await {
            Ok(true) => info!(path = %output.display(), "Removed old artifact"),
            Ok(false) => {}
            Err(e) => error!("{e}"),
        }

        match self.converter.convert(original, &output).await {
            Ok(path) => {
                info!(
                    artifact = %artifact,
                    dir = %self.layout.output.display(),
                    "Saved {}", path.display()
                );
                true
            }
            Err(e) => {
                error!(file = name, "Conversion failed for {name}: {e}");
                false
            }
        }
    }

    async fn archive(&self, name: &str) -> Result<(), PipelineError> {
        let from = self.layout.inbox_path(name);
        let to = self.layout.archive_path(name);
        move_file(&from, &to)
            .await
            .map_err(|source| PipelineError::Archive {
                name: name.to_string(),
                source,
            })
    }
}

/// Delete `path` if present. `Ok(true)` when something was removed.
async fn remove_stale(path: &Path) -> Result<bool, PipelineError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(PipelineError::StaleArtifact {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to).await {
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(from, to).await?;
            fs::remove_file(from).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::config::RetryPolicy;
    use crate::convert::{ConvertCommand, Sleeper};
    use crate::error::{ConvertError, DeliveryError};

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct FakeDelivery {
        log: CallLog,
        fail: bool,
    }

    #[async_trait]
    impl Delivery for FakeDelivery {
        async fn deliver(&self, path: &Path) -> Result<(), DeliveryError> {
            let name = path.file_name().unwrap().to_string_lossy();
            self.log.lock().unwrap().push(format!("deliver:{name}"));
            if self.fail {
                Err(DeliveryError::SendFailed("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Records whether a stale artifact was still present when invoked.
    struct FakeCommand {
        log: CallLog,
        output_size: usize,
    }

    #[async_trait]
    impl ConvertCommand for FakeCommand {
        async fn run(&self, _input: &Path, output: &Path) -> Result<(), ConvertError> {
            let name = output.file_name().unwrap().to_string_lossy();
            let stale = output.exists();
            self.log
                .lock()
                .unwrap()
                .push(format!("convert:{name}:stale={stale}"));
            // A directory squatting on the output path makes this fail.
            let _ = std::fs::write(output, vec![b'm'; self.output_size]);
            Ok(())
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    struct Fixture {
        _dir: TempDir,
        layout: Layout,
        log: CallLog,
        processor: FileProcessor,
    }

    async fn fixture(delivery_fails: bool, output_size: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path().join("ebooks"), "mobi");
        layout.ensure_dirs().await.unwrap();
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));

        let converter = Converter::new(
            Arc::new(FakeCommand {
                log: log.clone(),
                output_size,
            }),
            Arc::new(NoSleep),
            RetryPolicy::default(),
        );
        let processor = FileProcessor::new(
            layout.clone(),
            "mobi",
            Arc::new(FakeDelivery {
                log: log.clone(),
                fail: delivery_fails,
            }),
            converter,
        );

        Fixture {
            _dir: dir,
            layout,
            log,
            processor,
        }
    }

    fn drop_file(layout: &Layout, name: &str, size: usize) {
        std::fs::write(layout.inbox_path(name), vec![b'b'; size]).unwrap();
    }

    #[tokio::test]
    async fn epub_is_delivered_converted_and_archived() {
        let fx = fixture(false, 4096).await;
        drop_file(&fx.layout, "novel.epub", 2 * 1024 * 1024);

        let report = fx.processor.process_file("novel.epub").await;

        assert_eq!(report.disposition, Disposition::DeliverAndConvert);
        assert_eq!(report.delivered, Some(true));
        assert_eq!(report.converted, Some(true));
        assert!(report.archived);
        assert_eq!(
            *fx.log.lock().unwrap(),
            vec!["deliver:novel.epub", "convert:novel_epub.mobi:stale=false"]
        );
        assert!(fx.layout.output_path("novel_epub.mobi").exists());
        assert!(fx.layout.archive_path("novel.epub").exists());
        assert!(!fx.layout.inbox_path("novel.epub").exists());
    }

    #[tokio::test]
    async fn stale_artifact_is_removed_before_conversion() {
        let fx = fixture(false, 4096).await;
        drop_file(&fx.layout, "novel.epub", 10);
        std::fs::write(fx.layout.output_path("novel_epub.mobi"), b"old").unwrap();

        fx.processor.process_file("novel.epub").await;

        let log = fx.log.lock().unwrap();
        assert_eq!(log[1], "convert:novel_epub.mobi:stale=false");
        let fresh = std::fs::read(fx.layout.output_path("novel_epub.mobi")).unwrap();
        assert_eq!(fresh.len(), 4096);
    }

    #[tokio::test]
    async fn failures_still_archive() {
        // Delivery fails and every conversion output is truncated.
        let fx = fixture(true, 100).await;
        drop_file(&fx.layout, "paper.pdf", 10);

        let report = fx.processor.process_file("paper.pdf").await;

        assert_eq!(report.delivered, Some(false));
        assert_eq!(report.converted, Some(false));
        assert!(report.archived);
        let log = fx.log.lock().unwrap();
        assert_eq!(log.iter().filter(|l| l.starts_with("deliver:")).count(), 1);
        assert_eq!(log.iter().filter(|l| l.starts_with("convert:")).count(), 3);
        assert!(fx.layout.archive_path("paper.pdf").exists());
    }

    #[tokio::test]
    async fn target_format_is_only_archived() {
        let fx = fixture(false, 4096).await;
        drop_file(&fx.layout, "guide.mobi", 10);

        let report = fx.processor.process_file("guide.mobi").await;

        assert_eq!(report.disposition, Disposition::AlreadyTarget);
        assert_eq!(report.delivered, None);
        assert_eq!(report.converted, None);
        assert!(report.archived);
        assert!(fx.log.lock().unwrap().is_empty());
        assert!(fx.layout.archive_path("guide.mobi").exists());
    }

    #[tokio::test]
    async fn unknown_extension_is_untouched() {
        let fx = fixture(false, 4096).await;
        drop_file(&fx.layout, "readme.txt", 10);

        let report = fx.processor.process_file("readme.txt").await;

        assert_eq!(report.disposition, Disposition::Ignore);
        assert!(!report.archived);
        assert!(fx.log.lock().unwrap().is_empty());
        assert!(fx.layout.inbox_path("readme.txt").exists());
        assert!(!fx.layout.archive_path("readme.txt").exists());
    }

    #[tokio::test]
    async fn missing_original_reports_archive_failure() {
        let fx = fixture(false, 4096).await;

        let report = fx.processor.process_file("ghost.mobi").await;

        assert!(!report.archived);
    }

    #[tokio::test]
    async fn failed_archive_leaves_original_for_next_pass() {
        let fx = fixture(false, 4096).await;
        drop_file(&fx.layout, "paper.pdf", 10);
        let blocker = fx.layout.archive_path("paper.pdf");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let first = fx.processor.process_file("paper.pdf").await;
        assert!(!first.archived);
        assert_eq!(first.converted, Some(true));
        assert!(fx.layout.inbox_path("paper.pdf").exists());

        let second = fx.processor.process_file("paper.pdf").await;
        assert!(!second.archived);
        let log = fx.log.lock().unwrap();
        assert_eq!(
            log.iter().filter(|l| *l == "deliver:paper.pdf").count(),
            2
        );
        assert_eq!(log.iter().filter(|l| l.starts_with("convert:")).count(), 2);
    }

    #[tokio::test]
    async fn undeletable_artifact_does_not_stop_processing() {
        let fx = fixture(false, 4096).await;
        drop_file(&fx.layout, "novel.epub", 10);
        let squatter = fx.layout.output_path("novel_epub.mobi");
        std::fs::create_dir(&squatter).unwrap();
        std::fs::write(squatter.join("keep"), vec![0u8; 4096]).unwrap();

        let report = fx.processor.process_file("novel.epub").await;

        assert_eq!(report.delivered, Some(true));
        assert_eq!(report.converted, Some(false));
        assert!(report.archived);
        assert!(squatter.is_dir());
        let log = fx.log.lock().unwrap();
        assert_eq!(
            log.iter()
                .filter(|l| *l == "convert:novel_epub.mobi:stale=true")
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn remove_stale_reports_absence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a_pdf.mobi");
        assert!(!remove_stale(&path).await.unwrap());
        std::fs::write(&path, b"x").unwrap();
        assert!(remove_stale(&path).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remove_stale_rejects_a_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a_pdf.mobi");
        std::fs::create_dir(&path).unwrap();

        let err = remove_stale(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::StaleArtifact { .. }));
    }
}
