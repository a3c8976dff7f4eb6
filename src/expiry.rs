//! Artifact expiry: the sweep itself and the background task that runs it.
//!
//! A sweep is two passes over the data root:
//!
//! 1. every regular file whose modification time is older than `now - ttl` is
//!    deleted;
//! 2. every directory below the root that is now empty is removed, children
//!    before parents, so a date directory emptied in pass 1 disappears in the
//!    same sweep.
//!
//! Failures on individual entries are logged and counted, never propagated.
//! The root itself is never removed.
//!
//! [`ExpiryHandle`] owns the background task. It is stopped through a oneshot
//! channel that the task checks between ticks, so a sweep in progress always
//! runs to completion.

use crate::config::ServiceConfig;
use crate::error::DocConvError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

// ── Sweep ────────────────────────────────────────────────────────────────────

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    /// Entries that could not be inspected or removed.
    pub errors: usize,
}

/// Delete artifacts older than `ttl` relative to `now`, then prune empty
/// directories below `root`. Blocking.
pub fn sweep_expired(root: &Path, ttl: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    if !root.is_dir() {
        debug!(root = %root.display(), "Data root missing, nothing to sweep");
        return report;
    }

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Failed to read entry during sweep");
                report.errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let modified = match entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified())
        {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to read modification time"
                );
                report.errors += 1;
                continue;
            }
        };

        // Files from the future have age zero.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= ttl {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(
                    path = %entry.path().display(),
                    age_secs = age.as_secs(),
                    "Expired artifact removed"
                );
                report.removed_files += 1;
            }
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to remove expired artifact"
                );
                report.errors += 1;
            }
        }
    }

    report.removed_dirs = prune_empty_dirs(root, &mut report.errors);
    report
}

fn prune_empty_dirs(root: &Path, errors: &mut usize) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Failed to read entry while pruning");
                *errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let is_empty = match std::fs::read_dir(entry.path()) {
            Ok(mut it) => it.next().is_none(),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to list directory");
                *errors += 1;
                continue;
            }
        };
        if !is_empty {
            continue;
        }

        match std::fs::remove_dir(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "Empty directory removed");
                removed += 1;
            }
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to remove empty directory"
                );
                *errors += 1;
            }
        }
    }
    removed
}

/// Run one sweep off the async runtime.
pub async fn sweep_once(root: PathBuf, ttl: Duration) -> Result<SweepReport, DocConvError> {
    tokio::task::spawn_blocking(move || sweep_expired(&root, ttl, SystemTime::now()))
        .await
        .map_err(|e| DocConvError::Internal(format!("Sweep task panicked: {e}")))
}

// ── Scheduler ────────────────────────────────────────────────────────────────

/// How a scheduler shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The task acknowledged the stop signal in time.
    Completed,
    /// The grace period ran out; the task was aborted.
    TimedOut,
}

/// Handle to the running expiry task.
#[derive(Debug)]
pub struct ExpiryHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

/// Start the expiry task for `config`, or return `None` when artifacts never
/// expire.
pub fn spawn_scheduler(config: &ServiceConfig) -> Option<ExpiryHandle> {
    let Some(ttl) = config.expiry.ttl() else {
        info!("Artifacts never expire; expiry scheduler not started");
        return None;
    };
    Some(ExpiryHandle::start(
        config.data_dir.clone(),
        ttl,
        config.sweep_interval,
    ))
}

impl ExpiryHandle {
    /// Spawn the periodic sweep. The first sweep happens one `interval` after
    /// start. Must be called from within a Tokio runtime.
    pub fn start(root: PathBuf, ttl: Duration, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            info!(
                root = %root.display(),
                ttl_secs = ttl.as_secs(),
                interval_secs = interval.as_secs(),
                "Expiry scheduler started"
            );
            let first_tick = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    _ = ticker.tick() => {
                        match sweep_once(root.clone(), ttl).await {
                            Ok(report) => info!(
                                removed_files = report.removed_files,
                                removed_dirs = report.removed_dirs,
                                errors = report.errors,
                                "Expiry sweep finished"
                            ),
                            Err(e) => warn!(error = %e, "Expiry sweep failed"),
                        }
                    }
                }
            }
            info!("Expiry scheduler stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    /// Ask the task to stop after its current tick. Idempotent.
    pub fn signal_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    /// Wait up to `timeout` for the task to finish; abort it otherwise.
    pub async fn join(&mut self, timeout: Duration) -> ShutdownOutcome {
        let Some(mut join_handle) = self.join_handle.take() else {
            return ShutdownOutcome::Completed;
        };
        match tokio::time::timeout(timeout, &mut join_handle).await {
            Ok(Ok(())) => ShutdownOutcome::Completed,
            Ok(Err(e)) => {
                warn!(error = %e, "Expiry scheduler task ended abnormally");
                ShutdownOutcome::Completed
            }
            Err(_) => {
                join_handle.abort();
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Expiry scheduler did not stop in time"
                );
                ShutdownOutcome::TimedOut
            }
        }
    }

    /// Signal, then wait up to `timeout`.
    pub async fn shutdown(mut self, timeout: Duration) -> ShutdownOutcome {
        self.signal_stop();
        self.join(timeout).await
    }
}

impl Drop for ExpiryHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(path: &Path, age: Duration) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"artifact").unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn removes_old_files_and_empty_dirs() {
        let root = tempfile::tempdir().unwrap();
        let old = root.path().join("20240101/old_1.pdf");
        let fresh = root.path().join("20240115/fresh_2.pdf");
        touch(&old, Duration::from_secs(2 * 3600));
        touch(&fresh, Duration::from_secs(30 * 60));

        let report = sweep_expired(root.path(), Duration::from_secs(3600), SystemTime::now());

        assert!(!old.exists());
        assert!(!root.path().join("20240101").exists());
        assert!(fresh.exists());
        assert!(root.path().exists());
        assert_eq!(report.removed_files, 1);
        assert_eq!(report.removed_dirs, 1);
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn prunes_nested_empty_dirs_in_one_pass() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("a/b/c")).unwrap();

        let report = sweep_expired(root.path(), Duration::from_secs(3600), SystemTime::now());
        assert_eq!(report.removed_dirs, 3);
        assert!(root.path().is_dir());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_root_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        let report = sweep_expired(&missing, Duration::from_secs(1), SystemTime::now());
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn disabled_expiry_does_not_spawn() {
        let config = ServiceConfig::builder()
            .expiry(crate::config::ExpiryPolicy::Never)
            .build()
            .unwrap();
        assert!(spawn_scheduler(&config).is_none());
    }

    #[tokio::test]
    async fn scheduler_stops_on_signal() {
        let root = tempfile::tempdir().unwrap();
        let handle = ExpiryHandle::start(
            root.path().to_path_buf(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );
        let outcome = handle.shutdown(Duration::from_secs(3)).await;
        assert_eq!(outcome, ShutdownOutcome::Completed);
    }

    #[tokio::test]
    async fn scheduler_sweeps_on_tick() {
        let root = tempfile::tempdir().unwrap();
        let old = root.path().join("20240101/old_1.pdf");
        touch(&old, Duration::from_secs(2 * 3600));

        let handle = ExpiryHandle::start(
            root.path().to_path_buf(),
            Duration::from_secs(3600),
            Duration::from_millis(50),
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while old.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!old.exists());
        let outcome = handle.shutdown(Duration::from_secs(3)).await;
        assert_eq!(outcome, ShutdownOutcome::Completed);
    }
}
