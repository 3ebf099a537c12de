//! Backend state file watcher.
//!
//! The parent directory is watched non-recursively so atomic rename
//! replacements are observed. Bursts of filesystem events are coalesced into
//! a single re-read of the whole file.

use crate::error::{GhostwireError, Result};
use crate::session::state::BackendStateUpdate;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Capacity of the notify → reader queue. A full queue already implies a
/// pending re-read, so overflow events are dropped.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Watches one JSON file and decodes it into [`BackendStateUpdate`]s.
pub struct StateFileWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StateFileWatcher {
    /// Create a watcher for `path`. Nothing is watched until [`start`](Self::start).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            watcher: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// The watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a watch is currently attached.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Create the parent directory and an empty `{}` file when missing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be created.
    pub fn ensure_file_exists(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            std::fs::write(&self.path, "{}")?;
        }
        Ok(())
    }

    /// Attach the watch and spawn the reader task.
    ///
    /// `on_update` fires once for every successful decode, starting with one
    /// synthetic read of the current contents. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the watch cannot be
    /// attached.
    pub fn start<F>(&mut self, mut on_update: F) -> Result<()>
    where
        F: FnMut(BackendStateUpdate) + Send + 'static,
    {
        if self.is_running() {
            return Ok(());
        }
        self.ensure_file_exists()?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                GhostwireError::Watcher(format!("{} has no file name", self.path.display()))
            })?;
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (tx, mut rx) = mpsc::channel::<Event>(EVENT_QUEUE_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.try_send(event);
                }
            },
            Config::default(),
        )?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let path = self.path.clone();

        self.task = Some(tokio::spawn(async move {
            if let Some(update) = read_update(&path).await {
                on_update(update);
            }
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                let Some(event) = event else { break };

                let mut relevant = is_relevant(&event, &file_name);
                while let Ok(queued) = rx.try_recv() {
                    relevant |= is_relevant(&queued, &file_name);
                }
                if !relevant {
                    continue;
                }
                if let Some(update) = read_update(&path).await {
                    on_update(update);
                }
            }
            debug!(path = %path.display(), "state file reader stopped");
        }));
        self.watcher = Some(watcher);

        info!(path = %self.path.display(), "watching backend state file");
        Ok(())
    }

    /// Detach the watch and end the reader task. Idempotent.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!(path = %self.path.display(), "stopped watching backend state file");
        }
        self.cancel.cancel();
        self.task = None;
    }
}

impl Drop for StateFileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Read and decode the whole state file. Failures yield `None`.
pub async fn read_update(path: &Path) -> Option<BackendStateUpdate> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "state file unreadable");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(update) => Some(update),
        Err(e) => {
            trace!(path = %path.display(), error = %e, "state file decode failed");
            None
        }
    }
}
