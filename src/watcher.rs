//! Inbox watcher — creation events trigger full batch passes.
//!
//! The notify callback runs on the platform's notification thread and only
//! enqueues a [`RescanRequest`]. A single consumer drains the queue, folds
//! bursts that land within the debounce window into one request, and runs one
//! pass over the *entire* inbox per folded burst. Passes never overlap.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::WatchError;
use crate::pipeline::BatchRunner;

/// A file appeared in the inbox; the whole inbox should be rescanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescanRequest {
    pub path: PathBuf,
}

/// Long-lived loop over inbox creation events.
pub struct InboxWatcher {
    runner: BatchRunner,
    debounce: Duration,
    scan_on_start: bool,
}

impl InboxWatcher {
    pub fn new(runner: BatchRunner, debounce: Duration) -> Self {
        Self {
            runner,
            debounce,
            scan_on_start: false,
        }
    }

    /// Run one pass before waiting for the first event.
    pub fn with_scan_on_start(mut self, enabled: bool) -> Self {
        self.scan_on_start = enabled;
        self
    }

    /// Watch until Ctrl+C.
    pub async fn run(self) -> Result<(), WatchError> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received, shutting down..."),
                Err(e) => error!("Failed to listen for Ctrl+C: {e}"),
            }
        })
        .await
    }

    /// Watch until `shutdown` resolves. An in-flight pass finishes first.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        let inbox = self.runner.processor().layout().inbox.clone();
        if !inbox.is_dir() {
            return Err(WatchError::MissingInbox(inbox));
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        if self.scan_on_start {
            // Queued rather than run here: shutdown must be polled first.
            let _ = tx.send(RescanRequest {
                path: inbox.clone(),
            });
        }
        let mut watcher = subscribe(&inbox, tx)?;
        info!(inbox = %inbox.display(), "Watching for new files");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                request = rx.recv() => {
                    let Some(request) = request else {
                        warn!("Watch event stream ended");
                        break;
                    };
                    if request.path == inbox {
                        info!("Scanning files already in the inbox");
                    } else {
                        info!(path = %request.path.display(), "New file detected");
                    }
                    let folded = coalesce(&mut rx, self.debounce).await;
                    if folded > 1 {
                        debug!(events = folded, "Coalesced burst into one pass");
                    }
                    self.runner.process_all().await;
                }
            }
        }

        if let Err(e) = watcher.unwatch(&inbox) {
            debug!("Unwatch failed: {e}");
        }
        info!("Watcher stopped");
        Ok(())
    }
}

/// Subscribe to non-recursive creation events on `inbox`.
fn subscribe(
    inbox: &Path,
    tx: mpsc::UnboundedSender<RescanRequest>,
) -> Result<RecommendedWatcher, WatchError> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if let Some(path) = created_file(&event) {
                // Receiver gone means the loop is shutting down.
                let _ = tx.send(RescanRequest { path });
            }
        }
        Err(e) => warn!("Watch error: {e}"),
    })?;
    watcher.watch(inbox, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// The created non-directory path of a creation event, if any.
pub fn created_file(event: &Event) -> Option<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => event.paths.iter().find(|p| !p.is_dir()).cloned(),
        _ => None,
    }
}

/// Upper bound on one coalescing run, in debounce windows.
const MAX_COALESCE_WINDOWS: u32 = 10;

/// Drain requests until `window` passes without a new one.
///
/// Returns how many requests were folded, counting the one already received.
/// A zero window folds nothing, giving one pass per event. Folding stops after
/// `MAX_COALESCE_WINDOWS` windows even if requests keep arriving.
pub async fn coalesce(rx: &mut mpsc::UnboundedReceiver<RescanRequest>, window: Duration) -> usize {
    let mut folded = 1;
    if window.is_zero() {
        return folded;
    }
    let deadline = Instant::now() + window.saturating_mul(MAX_COALESCE_WINDOWS);
    loop {
        let wait = window.min(deadline.saturating_duration_since(Instant::now()));
        if wait.is_zero() {
            break;
        }
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(_)) => folded += 1,
            _ => break,
        }
    }
    folded
}
