// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistent per-recipient delivery dedupe ledger.
//!
//! Maps `recipient_id → message_id → recorded_at`. An entry is written
//! the moment an inbox file lands (and refreshed when an acceptance
//! receipt is observed), so a crash between delivery and ack can never
//! produce a second inbox file for the same `(recipient, message)` pair.
//! Owned exclusively by the dispatcher process; persisted whole-file
//! atomically, TTL-pruned on every drain.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use zeus_core::{read_json_value, write_json_atomic};

/// The dedupe ledger, backed by `<state>/receipts.json`.
#[derive(Debug)]
pub struct DedupeLedger {
    path: PathBuf,
    map: BTreeMap<String, BTreeMap<String, f64>>,
    dirty: bool,
}

impl DedupeLedger {
    /// Load the ledger from `path`, skipping malformed entries.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut map: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

        if let Some(serde_json::Value::Object(raw)) = read_json_value(&path) {
            for (recipient, entries) in raw {
                let serde_json::Value::Object(entries) = entries else {
                    continue;
                };
                let mut per_recipient = BTreeMap::new();
                for (message_id, ts) in entries {
                    if let Some(ts) = ts.as_f64() {
                        per_recipient.insert(message_id, ts);
                    }
                }
                if !per_recipient.is_empty() {
                    map.insert(recipient, per_recipient);
                }
            }
        }

        Self {
            path,
            map,
            dirty: false,
        }
    }

    /// Whether `(recipient_id, message_id)` was already delivered and is
    /// still within `ttl_seconds`. Expired entries are dropped on read.
    pub fn has(&mut self, recipient_id: &str, message_id: &str, now: f64, ttl_seconds: f64) -> bool {
        let Some(per_recipient) = self.map.get_mut(recipient_id) else {
            return false;
        };
        let Some(&ts) = per_recipient.get(message_id) else {
            return false;
        };

        if ts < now - ttl_seconds {
            per_recipient.remove(message_id);
            if per_recipient.is_empty() {
                self.map.remove(recipient_id);
            }
            self.dirty = true;
            return false;
        }
        true
    }

    /// Record a delivery (or refresh on an observed acceptance).
    pub fn record(&mut self, recipient_id: &str, message_id: &str, now: f64) {
        self.map
            .entry(recipient_id.to_string())
            .or_default()
            .insert(message_id.to_string(), now);
        self.dirty = true;
    }

    /// Drop every entry older than `ttl_seconds`. Returns `true` when
    /// anything was removed.
    pub fn prune(&mut self, now: f64, ttl_seconds: f64) -> bool {
        let cutoff = now - ttl_seconds;
        let mut changed = false;

        self.map.retain(|_, per_recipient| {
            let before = per_recipient.len();
            per_recipient.retain(|_, ts| *ts >= cutoff);
            changed |= per_recipient.len() != before;
            !per_recipient.is_empty()
        });

        if changed {
            self.dirty = true;
        }
        changed
    }

    /// Persist the ledger when modified since the last flush.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; the ledger stays dirty so the
    /// next drain retries.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        write_json_atomic(&self.path, &self.map)?;
        self.dirty = false;
        Ok(())
    }
}
