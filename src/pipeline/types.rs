//! Shared types for the file-intake pipeline.

// ── Disposition ─────────────────────────────────────────────────────

/// What the pipeline does with one inbox file, decided by extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Source format: email the original, convert it, archive it.
    DeliverAndConvert,
    /// Already in the target format: archive only.
    AlreadyTarget,
    /// Unrecognized or missing extension: leave the file untouched.
    Ignore,
}

impl Disposition {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DeliverAndConvert => "deliver_and_convert",
            Self::AlreadyTarget => "already_target",
            Self::Ignore => "ignore",
        }
    }

    /// Whether the original is moved to the archive after processing.
    pub fn archives(&self) -> bool {
        !matches!(self, Self::Ignore)
    }
}

// ── Per-file report ─────────────────────────────────────────────────

/// Outcome of running the pipeline over one inbox file.
///
/// `None` means the step was not applicable for the disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub name: String,
    pub disposition: Disposition,
    pub delivered: Option<bool>,
    pub converted: Option<bool>,
    pub archived: bool,
}

impl FileReport {
    pub(crate) fn new(name: &str, disposition: Disposition) -> Self {
        Self {
            name: name.to_string(),
            disposition,
            delivered: None,
            converted: None,
            archived: false,
        }
    }
}

// ── Batch summary ───────────────────────────────────────────────────

/// Totals for one full pass over the inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Regular files found in the inbox.
    pub seen: usize,
    pub ignored: usize,
    pub archived: usize,
    pub delivery_failures: usize,
    pub conversion_failures: usize,
    pub archive_failures: usize,
}

impl BatchSummary {
    pub(crate) fn record(&mut self, report: &FileReport) {
        self.seen += 1;
        if report.disposition == Disposition::Ignore {
            self.ignored += 1;
            return;
        }
        if report.delivered == Some(false) {
            self.delivery_failures += 1;
        }
        if report.converted == Some(false) {
            self.conversion_failures += 1;
        }
        if report.archived {
            self.archived += 1;
        } else {
            self.archive_failures += 1;
        }
    }
}
