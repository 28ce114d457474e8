//! Terminal progress shared between the batch bar and console logging.
//!
//! Log lines and the bar both go to stderr. Every console write hides the
//! bar, prints, and redraws it, so the two never interleave on one line.

use std::io::{self, Write};

use indicatif::{MultiProgress, ProgressBar};
use tracing_subscriber::fmt::MakeWriter;

/// Handle to the terminal's progress area. Cheap to clone.
#[derive(Clone)]
pub struct ConsoleProgress {
    multi: MultiProgress,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
        }
    }

    /// A bar of `len` steps drawn in this progress area.
    pub fn bar(&self, len: u64) -> ProgressBar {
        self.multi.add(ProgressBar::new(len))
    }

    /// Wrap `inner` so writes suspend any visible bar.
    pub fn writer<W: Write>(&self, inner: W) -> SuspendingWriter<W> {
        SuspendingWriter {
            multi: self.multi.clone(),
            inner,
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> MakeWriter<'a> for ConsoleProgress {
    type Writer = SuspendingWriter<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer(io::stderr())
    }
}

/// Writer that clears the progress area around every write.
pub struct SuspendingWriter<W> {
    multi: MultiProgress,
    inner: W,
}

impl<W: Write> Write for SuspendingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.multi.suspend(|| inner.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let inner = &mut self.inner;
        self.multi.suspend(|| inner.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
