// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Filesystem-backed outbound envelope store.
//!
//! Queue layout (all under the store root):
//! - `new/`      pending envelopes
//! - `inflight/` claimed envelopes being delivered
//!
//! State transitions are single atomic renames, so any number of producer
//! and dispatcher processes can share the store without a lock file: the
//! loser of a claim race simply finds the source file gone. An envelope is
//! removed only after the dispatcher confirms recipient completion; failed
//! or pending deliveries are re-queued with backoff.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeus_core::{Envelope, write_json_atomic};

/// Errors from envelope store operations that the caller must surface.
///
/// Everything else (claim races, malformed files, missing acks) is a soft
/// condition expressed through `Option` returns.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A queue directory could not be created.
    #[error("create queue directory {path}: {source}")]
    CreateDir {
        /// Directory that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An envelope file could not be written.
    #[error("write envelope {path}: {source}")]
    Write {
        /// Target path of the failed write.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Durable set of outbound envelopes with atomic state transitions.
#[derive(Clone, Debug)]
pub struct EnvelopeStore {
    root: PathBuf,
}

impl EnvelopeStore {
    /// Create a store rooted at `root` (conventionally `<state>/queue`).
    ///
    /// Directories are created lazily by the operations that need them.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The `new/` directory.
    #[must_use]
    pub fn new_dir(&self) -> PathBuf {
        self.root.join("new")
    }

    /// The `inflight/` directory.
    #[must_use]
    pub fn inflight_dir(&self) -> PathBuf {
        self.root.join("inflight")
    }

    /// Create both queue directories.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CreateDir`] when either directory cannot be
    /// created.
    pub fn ensure_dirs(&self) -> Result<(), QueueError> {
        for dir in [self.new_dir(), self.inflight_dir()] {
            fs::create_dir_all(&dir).map_err(|source| QueueError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Persist `envelope` into `new/`, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] on directory creation or write failure; the
    /// caller retries or surfaces it.
    pub fn enqueue(&self, envelope: &Envelope) -> Result<PathBuf, QueueError> {
        self.ensure_dirs()?;
        let target = self.new_dir().join(envelope.file_name());
        write_json_atomic(&target, envelope).map_err(|source| QueueError::Write {
            path: target.display().to_string(),
            source,
        })?;
        debug!(target: "zeus.queue", id = %envelope.id, path = %target.display(), "enqueued envelope");
        Ok(target)
    }

    /// Decode the envelope at `path`, tolerating every failure.
    ///
    /// Unreadable or malformed files yield `None` so a poison envelope
    /// cannot block the dispatcher; the caller deletes and moves on.
    #[must_use]
    pub fn load(path: &Path) -> Option<Envelope> {
        let value = zeus_core::read_json_value(path)?;
        Envelope::from_value(&value)
    }

    /// Pending envelope paths, oldest first (mtime ascending, name as
    /// tiebreak).
    #[must_use]
    pub fn list_new(&self) -> Vec<PathBuf> {
        list_json_sorted(&self.new_dir())
    }

    /// Claimed envelope paths, oldest first.
    #[must_use]
    pub fn list_inflight(&self) -> Vec<PathBuf> {
        list_json_sorted(&self.inflight_dir())
    }

    /// Atomically move `new_path` into `inflight/`.
    ///
    /// Returns `None` when the source is not under `new/` or the rename
    /// fails — typically because another dispatcher claimed it first.
    pub fn claim(&self, new_path: &Path) -> Option<PathBuf> {
        if new_path.parent() != Some(self.new_dir().as_path()) {
            return None;
        }
        let target = self.inflight_dir().join(new_path.file_name()?);
        fs::rename(new_path, &target).ok()?;
        Some(target)
    }

    /// Delete an acknowledged envelope. A missing file is not an error.
    pub fn ack(&self, inflight_path: &Path) {
        let _ = fs::remove_file(inflight_path);
    }

    /// Return a claimed envelope to `new/` for a later attempt.
    ///
    /// Increments `attempts`, stamps `updated_at = now` and
    /// `next_attempt_at = now + delay_seconds`, rewrites the file in
    /// place, then renames it back. Returns `None` when either step
    /// fails; the stale-inflight reclaim will eventually recover the file.
    pub fn requeue(
        &self,
        inflight_path: &Path,
        envelope: &mut Envelope,
        now: f64,
        delay_seconds: f64,
    ) -> Option<PathBuf> {
        envelope.attempts += 1;
        envelope.updated_at = now;
        envelope.next_attempt_at = now + delay_seconds.max(0.0);

        write_json_atomic(inflight_path, envelope).ok()?;

        let target = self.new_dir().join(inflight_path.file_name()?);
        fs::rename(inflight_path, &target).ok()?;
        debug!(
            target: "zeus.queue",
            id = %envelope.id,
            attempts = envelope.attempts,
            next_attempt_at = envelope.next_attempt_at,
            "requeued envelope"
        );
        Some(target)
    }

    /// Return abandoned inflight envelopes to `new/`.
    ///
    /// Any inflight file whose `updated_at` is at least `lease_seconds`
    /// old is assumed orphaned by a crashed dispatcher and made claimable
    /// again with `next_attempt_at` reset. Malformed inflight files are
    /// unlinked. Returns the number of reclaimed envelopes.
    pub fn reclaim_stale_inflight(&self, lease_seconds: f64, now: f64) -> usize {
        if lease_seconds <= 0.0 {
            return 0;
        }

        let mut reclaimed = 0;
        for inflight in self.list_inflight() {
            let Some(mut envelope) = Self::load(&inflight) else {
                let _ = fs::remove_file(&inflight);
                continue;
            };

            if now - envelope.updated_at < lease_seconds {
                continue;
            }

            envelope.updated_at = now;
            envelope.next_attempt_at = 0.0;
            if write_json_atomic(&inflight, &envelope).is_err() {
                continue;
            }

            let Some(name) = inflight.file_name() else { continue };
            let target = self.new_dir().join(name);
            if fs::rename(&inflight, &target).is_err() {
                continue;
            }
            debug!(target: "zeus.queue", id = %envelope.id, "reclaimed stale inflight envelope");
            reclaimed += 1;
        }
        reclaimed
    }
}

fn list_json_sorted(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut paths: Vec<(u128, String, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .map(|path| {
            let mtime = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| {
                    modified
                        .duration_since(std::time::UNIX_EPOCH)
                        .ok()
                        .map(|d| d.as_nanos())
                })
                .unwrap_or(0);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (mtime, name, path)
        })
        .collect();

    paths.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    paths.into_iter().map(|(_, _, path)| path).collect()
}
