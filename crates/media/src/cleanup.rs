use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::store::{self, MediaCache};

/// How often the sweep wakes up.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Background sweep that deletes cache files older than the retention
/// window.
///
/// Constructing the task does not start it; `start` is idempotent and `stop`
/// exits a sleeping wait promptly. Sweep failures are logged and never
/// terminate the task.
pub struct CleanupTask {
    dir: PathBuf,
    interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl CleanupTask {
    pub fn new(cache: &MediaCache) -> Self {
        Self {
            dir: cache.dir().to_path_buf(),
            interval: SWEEP_INTERVAL,
            retention: cache.retention(),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Override the wake interval (used by tests).
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the sweep loop. A second call is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("media cleanup already running");
            return;
        }

        let dir = self.dir.clone();
        let interval = self.interval;
        let retention = self.retention;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            info!(dir = %dir.display(), "media cleanup started");
            loop {
                let removed = sweep_once(&dir, retention);
                if removed > 0 {
                    debug!(removed, "expired media removed");
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {},
                }
            }
            info!("media cleanup stopped");
        });
    }

    /// Signal the sweep loop to exit before its next pass.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// One sweep pass: delete every file in `dir` older than `retention`.
///
/// Returns the number of files removed. Unreadable entries and failed
/// deletes are logged and skipped.
pub fn sweep_once(dir: &Path, retention: Duration) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "media sweep could not list cache directory");
            return 0;
        },
    };

    let mut removed = 0;
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !store::is_expired(&path, retention) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove expired media"),
        }
    }
    removed
}
