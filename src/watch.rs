use std::{
    path::Path,
    thread,
    time::Duration,
};

use notify::{
    event::{CreateKind, MetadataKind, ModifyKind, RemoveKind},
    EventKind, RecursiveMode, Watcher,
};
use notify_debouncer_full::new_debouncer;
use tokio::sync::mpsc;

use crate::errors::{FileError, Result};

/// The kinds of filesystem changes a watch reports for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Renamed,
    Removed,
}

/// A live watch on a single file.
///
/// Change notifications arrive on `events`; dropping the subscription tears
/// the underlying watcher down.
#[derive(Debug)]
pub struct WatchSubscription {
    pub events: mpsc::Receiver<ChangeKind>,
    _guard: Guard,
}

struct Guard(#[allow(dead_code)] Box<dyn std::any::Any + Send>);

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Guard")
    }
}

impl WatchSubscription {
    /// Wrap a raw change channel. `guard` travels with the subscription
    /// and is dropped together with it, which is how implementations tie
    /// watcher teardown to the subscription's lifetime.
    pub fn new(
        events: mpsc::Receiver<ChangeKind>,
        guard: Box<dyn std::any::Any + Send>,
    ) -> Self {
        WatchSubscription {
            events,
            _guard: Guard(guard),
        }
    }
}

/// Delivers change notifications for a path.
pub trait WatchService: Send + Sync {
    fn watch(&self, path: &Path) -> Result<WatchSubscription>;
}

/// [`WatchService`] backed by a debounced `notify` watcher.
///
/// The watcher monitors the file's parent directory (non-recursively) so
/// that deletion and re-creation of the file keep being observed. The
/// debouncer collapses bursts of events and waits for writes to settle
/// before notifying, so readers never see partially-written files.
#[derive(Debug)]
pub struct NotifyWatchService {
    settle: Duration,
}

impl NotifyWatchService {
    pub fn new() -> Self {
        Self {
            settle: Duration::from_secs(2),
        }
    }

    /// Override the write-settle window (mostly useful in tests).
    pub fn with_settle(settle: Duration) -> Self {
        Self { settle }
    }
}

impl Default for NotifyWatchService {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchService for NotifyWatchService {
    fn watch(&self, path: &Path) -> Result<WatchSubscription> {
        log::debug!("Attempting to watch path: {:?}", path);

        let target_name = path
            .file_name()
            .ok_or_else(|| {
                FileError::Watch(format!("{:?} has no file name", path))
            })?
            .to_os_string();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                FileError::Watch(format!(
                    "{:?} has no parent directory",
                    path
                ))
            })?
            .to_path_buf();

        let (tx, rx) = mpsc::channel(100);

        // Setup the synchronous channel (notify debouncer expects this)
        let (sync_tx, sync_rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(self.settle, None, sync_tx)?;
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)?;
        log::info!(
            "Started debounced file system watcher for {:?}",
            path
        );

        // The debouncer delivers on a blocking channel; forward from a
        // dedicated thread into the async channel
        thread::spawn(move || {
            while let Ok(events) = sync_rx.recv() {
                let events = match events {
                    Ok(events) => events,
                    Err(errors) => {
                        for error in errors {
                            log::error!("Error receiving event: {:?}", error);
                        }
                        continue;
                    }
                };

                for event in events {
                    log::trace!("Received event: {:?}", event);

                    // Only events touching the watched file are relevant
                    if !event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(&target_name))
                    {
                        continue;
                    }

                    // We only care for:
                    // - file creations
                    // - file modifications
                    // - file renames
                    // - file deletions
                    let kind = match event.event.kind {
                        EventKind::Create(CreateKind::File) => {
                            ChangeKind::Created
                        }
                        EventKind::Modify(ModifyKind::Data(_))
                        // On macOS, force deleting a file triggers a
                        // metadata change event
                        | EventKind::Modify(ModifyKind::Metadata(
                            MetadataKind::Any,
                        )) => ChangeKind::Modified,
                        EventKind::Modify(ModifyKind::Name(_)) => {
                            ChangeKind::Renamed
                        }
                        EventKind::Remove(RemoveKind::File) => {
                            ChangeKind::Removed
                        }
                        _ => continue,
                    };

                    // Use blocking send to the async channel because we
                    // are in a separate thread
                    if tx.blocking_send(kind).is_err() {
                        log::debug!(
                            "Watch subscription dropped, stopping forwarder"
                        );
                        return;
                    }
                }
            }
        });

        Ok(WatchSubscription::new(rx, Box::new(debouncer)))
    }
}
