// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Filesystem agent bus: inboxes, receipts, and capability heartbeats.
//!
//! Layout under the bus root:
//! - `inbox/<rid>/new/`      delivered messages awaiting consumption
//! - `receipts/<rid>/`       acceptance receipts published by recipients
//! - `caps/<rid>.json`       capability heartbeats published by recipients
//! - `processed/<rid>.json`  optional recipient-side ledger
//!
//! The dispatcher writes inbox files and only ever reads receipts and
//! heartbeats; recipients own everything they publish. Recipient ids are
//! sanitized before touching any path.

use std::path::PathBuf;
use tracing::debug;
use zeus_core::{
    BusReceipt, CapabilityHeartbeat, InboxMessage, ReceiptDisposition, read_json_value,
    sanitize_agent_id, write_json_atomic,
};

/// Errors from inbox delivery that the dispatcher turns into block reasons.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The recipient id sanitized to the empty string.
    #[error("recipient id sanitizes to empty: {raw:?}")]
    InvalidRecipient {
        /// The offending raw id.
        raw: String,
    },

    /// The payload was blank.
    #[error("refusing to deliver blank message {id}")]
    BlankMessage {
        /// Envelope id of the blank payload.
        id: String,
    },

    /// The inbox file could not be written.
    #[error("write inbox file {path}: {source}")]
    Write {
        /// Target path of the failed write.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Verdict of the capability gate for one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityHealth {
    /// The recipient can accept deliveries now.
    Healthy,
    /// The recipient cannot; the reason names the recipient and is shown
    /// to the operator verbatim.
    Blocked(String),
}

impl CapabilityHealth {
    /// Returns `true` for [`CapabilityHealth::Healthy`].
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// The block reason, when blocked.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Healthy => None,
            Self::Blocked(reason) => Some(reason),
        }
    }
}

/// Reader/writer over one bus root directory.
#[derive(Clone, Debug)]
pub struct BusStore {
    root: PathBuf,
}

impl BusStore {
    /// Create a store rooted at `root` (conventionally `<state>/bus`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `inbox/<rid>/new/` for a sanitized recipient id.
    #[must_use]
    pub fn inbox_new_dir(&self, recipient_id: &str) -> PathBuf {
        self.root
            .join("inbox")
            .join(sanitize_agent_id(recipient_id))
            .join("new")
    }

    /// `receipts/<rid>/<message_id>.json`.
    #[must_use]
    pub fn receipt_path(&self, recipient_id: &str, message_id: &str) -> PathBuf {
        self.root
            .join("receipts")
            .join(sanitize_agent_id(recipient_id))
            .join(format!("{}.json", message_id.trim()))
    }

    /// `caps/<rid>.json`.
    #[must_use]
    pub fn capability_path(&self, recipient_id: &str) -> PathBuf {
        self.root
            .join("caps")
            .join(format!("{}.json", sanitize_agent_id(recipient_id)))
    }

    /// `processed/<rid>.json` — the optional recipient-side ledger. The
    /// dispatcher never reads it; the path is exposed for extensions.
    #[must_use]
    pub fn processed_ledger_path(&self, recipient_id: &str) -> PathBuf {
        self.root
            .join("processed")
            .join(format!("{}.json", sanitize_agent_id(recipient_id)))
    }

    /// Materialize one inbox file for `recipient_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the recipient id is unroutable, the
    /// payload is blank, or the write fails.
    pub fn deliver(&self, recipient_id: &str, message: &InboxMessage) -> Result<PathBuf, BusError> {
        let clean = sanitize_agent_id(recipient_id);
        if clean.is_empty() {
            return Err(BusError::InvalidRecipient {
                raw: recipient_id.to_string(),
            });
        }
        if message.message.trim().is_empty() {
            return Err(BusError::BlankMessage {
                id: message.id.clone(),
            });
        }

        let target = self.inbox_new_dir(&clean).join(message.file_name());
        write_json_atomic(&target, message).map_err(|source| BusError::Write {
            path: target.display().to_string(),
            source,
        })?;
        debug!(
            target: "zeus.bus",
            recipient = %clean,
            id = %message.id,
            "delivered inbox message"
        );
        Ok(target)
    }

    /// Decode the receipt for `(recipient_id, message_id)`, tolerant.
    #[must_use]
    pub fn load_receipt(&self, recipient_id: &str, message_id: &str) -> Option<BusReceipt> {
        let value = read_json_value(&self.receipt_path(recipient_id, message_id))?;
        serde_json::from_value(value).ok()
    }

    /// Classify the receipt for `(recipient_id, message_id)`.
    ///
    /// `None` means no receipt file exists yet.
    #[must_use]
    pub fn receipt_disposition(
        &self,
        recipient_id: &str,
        message_id: &str,
    ) -> Option<ReceiptDisposition> {
        self.load_receipt(recipient_id, message_id)
            .map(|receipt| receipt.disposition(message_id))
    }

    /// Returns `true` when an acceptance receipt exists for
    /// `(recipient_id, message_id)`.
    #[must_use]
    pub fn has_accepted_receipt(&self, recipient_id: &str, message_id: &str) -> bool {
        self.receipt_disposition(recipient_id, message_id) == Some(ReceiptDisposition::Accepted)
    }

    /// Decode the capability heartbeat for `recipient_id`, tolerant.
    #[must_use]
    pub fn load_capability(&self, recipient_id: &str) -> Option<CapabilityHeartbeat> {
        let value = read_json_value(&self.capability_path(recipient_id))?;
        serde_json::from_value(value).ok()
    }

    /// Decide whether `recipient_id` can accept a delivery now.
    ///
    /// Block reasons, in precedence order: missing heartbeat file,
    /// explicitly disabled `queue_bus`, unparseable `updated_at`, and a
    /// heartbeat older than `max_age_s`. Negative age (producer clock
    /// ahead of ours) is treated as healthy.
    #[must_use]
    pub fn capability_health(
        &self,
        recipient_id: &str,
        max_age_s: f64,
        now: f64,
    ) -> CapabilityHealth {
        let clean = sanitize_agent_id(recipient_id);
        let Some(heartbeat) = self.load_capability(recipient_id) else {
            return CapabilityHealth::Blocked(format!(
                "missing capability heartbeat for {clean}"
            ));
        };

        if !heartbeat.supports_queue_bus() {
            return CapabilityHealth::Blocked(format!("capability disabled queue_bus for {clean}"));
        }

        let Some(updated_at) = heartbeat.updated_at_epoch() else {
            return CapabilityHealth::Blocked(format!(
                "capability heartbeat missing updated_at for {clean}"
            ));
        };

        let age = now - updated_at;
        if age > max_age_s {
            return CapabilityHealth::Blocked(format!(
                "stale capability heartbeat for {clean} ({age:.1}s > {max_age_s:.1}s)"
            ));
        }

        CapabilityHealth::Healthy
    }
}

/// Write a capability heartbeat for `recipient_id`.
///
/// Recipient-side extensions call this on their own cadence; it lives here
/// so tests and embedders share one writer.
///
/// # Errors
///
/// Returns the underlying I/O error when the write fails.
pub fn publish_capability(
    store: &BusStore,
    recipient_id: &str,
    heartbeat_value: &serde_json::Value,
) -> std::io::Result<()> {
    write_json_atomic(&store.capability_path(recipient_id), heartbeat_value)
}
