// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recipient-published acknowledgement and liveness artifacts.
//!
//! Both file shapes are produced by recipient-side extensions, outside the
//! dispatcher's trust boundary, so decoding is tolerant throughout: fields
//! may be absent or oddly typed and readers must degrade to a safe verdict.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a receipt resolves for the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptDisposition {
    /// The recipient accepted the message; delivery is complete.
    Accepted,
    /// The recipient hard-rejected; terminal for that recipient.
    Rejected,
    /// The recipient deferred; keep waiting.
    Deferred,
}

/// A receipt file under `bus/receipts/<recipient>/<message_id>.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BusReceipt {
    /// Message id this receipt acknowledges; empty means unstated.
    #[serde(default)]
    pub id: String,
    /// `accepted` / `rejected` / `deferred`; absent means accepted.
    #[serde(default)]
    pub status: String,
    /// Epoch seconds at acceptance, informational.
    #[serde(default)]
    pub accepted_at: f64,
    /// Recipient agent id, informational.
    #[serde(default)]
    pub agent_id: String,
}

impl BusReceipt {
    /// Classify this receipt for `message_id`.
    ///
    /// An id mismatch is treated as `Deferred` (the receipt does not speak
    /// for this message). Unknown status strings also defer, so a future
    /// status vocabulary cannot be misread as acceptance.
    #[must_use]
    pub fn disposition(&self, message_id: &str) -> ReceiptDisposition {
        let own_id = self.id.trim();
        if !own_id.is_empty() && own_id != message_id.trim() {
            return ReceiptDisposition::Deferred;
        }
        match self.status.trim().to_lowercase().as_str() {
            "" | "accepted" => ReceiptDisposition::Accepted,
            "rejected" => ReceiptDisposition::Rejected,
            _ => ReceiptDisposition::Deferred,
        }
    }
}

/// A capability heartbeat under `bus/caps/<recipient>.json`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CapabilityHeartbeat {
    /// Epoch seconds or ISO-8601 text; kept raw for tolerant parsing.
    #[serde(default)]
    pub updated_at: Option<serde_json::Value>,
    /// Feature flags declared by the recipient extension.
    #[serde(default)]
    pub supports: BTreeMap<String, bool>,
}

impl CapabilityHeartbeat {
    /// Returns `false` only when the extension explicitly disabled the
    /// queue bus; an absent flag counts as enabled.
    #[must_use]
    pub fn supports_queue_bus(&self) -> bool {
        self.supports.get("queue_bus").copied().unwrap_or(true)
    }

    /// Decode `updated_at` into epoch seconds.
    ///
    /// Accepts a JSON number, a numeric string, or an ISO-8601 timestamp
    /// with an optional `Z` suffix. Returns `None` when unparseable.
    #[must_use]
    pub fn updated_at_epoch(&self) -> Option<f64> {
        match self.updated_at.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(raw) => {
                let clean = raw.trim();
                if clean.is_empty() {
                    return None;
                }
                if let Ok(secs) = clean.parse::<f64>() {
                    return Some(secs);
                }
                if let Ok(dt) = DateTime::parse_from_rfc3339(clean) {
                    return Some(dt.timestamp_millis() as f64 / 1000.0);
                }
                // Offset-less ISO timestamps are read as UTC.
                chrono::NaiveDateTime::parse_from_str(clean, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.and_utc().timestamp_millis() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}
