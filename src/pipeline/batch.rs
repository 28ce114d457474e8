//! Batch runner — one sequential pass over every file in the inbox.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::pipeline::processor::FileProcessor;
use crate::pipeline::types::BatchSummary;
use crate::progress::ConsoleProgress;

const PROGRESS_TEMPLATE: &str = "{msg}: {pos}/{len} [{bar:30}] {elapsed_precise}";

/// Runs the [`FileProcessor`] over the whole inbox.
pub struct BatchRunner {
    processor: FileProcessor,
    progress: Option<ConsoleProgress>,
}

impl BatchRunner {
    pub fn new(processor: FileProcessor) -> Self {
        Self {
            processor,
            progress: None,
        }
    }

    /// Draw a progress bar for each pass in `console`.
    pub fn with_progress(mut self, console: ConsoleProgress) -> Self {
        self.progress = Some(console);
        self
    }

    pub fn processor(&self) -> &FileProcessor {
        &self.processor
    }

    /// Process every regular file directly inside the inbox, one at a time.
    ///
    /// A file that fails never aborts the pass.
    pub async fn process_all(&self) -> BatchSummary {
        let inbox = &self.processor.layout().inbox;
        let files = match list_files(inbox).await {
            Ok(files) => files,
            Err(e) => {
                error!("{e}");
                return BatchSummary::default();
            }
        };

        debug!(count = files.len(), "Inbox listed");
        let progress = self.progress_bar(files.len() as u64);
        let mut summary = BatchSummary::default();

        for name in &files {
            progress.set_message(format!("Processing {name}"));
            let report = self.processor.process_file(name).await;
            summary.record(&report);
            progress.inc(1);
        }
        progress.finish_and_clear();

        if summary.seen > summary.ignored {
            info!(
                seen = summary.seen,
                archived = summary.archived,
                ignored = summary.ignored,
                delivery_failures = summary.delivery_failures,
                conversion_failures = summary.conversion_failures,
                archive_failures = summary.archive_failures,
                "Batch pass complete"
            );
        }
        summary
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        let Some(console) = self.progress.as_ref().filter(|_| len > 0) else {
            return ProgressBar::hidden();
        };
        let bar = console.bar(len);
        match ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=> ")),
            Err(e) => warn!("Invalid progress template: {e}"),
        }
        bar.set_message("Processing all files");
        bar
    }
}

/// Names of regular files directly inside `dir`, in directory-listing order.
///
/// Symlinks to files count as files. Names that are not valid UTF-8 are skipped.
pub async fn list_files(dir: &Path) -> Result<Vec<String>, PipelineError> {
    let list_err = |source| PipelineError::ListInbox {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir).await.map_err(list_err)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
        let is_file = fs::metadata(entry.path())
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push(name),
            Err(raw) => warn!(name = ?raw, "Skipping file with non UTF-8 name"),
        }
    }

    Ok(files)
}
