// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-recipient delivered message file.

use crate::envelope::{DeliveryMode, Envelope};
use serde::{Deserialize, Serialize};

/// One delivered-to-one-recipient message, materialized under
/// `bus/inbox/<recipient>/new/`.
///
/// Recipient-side extensions consume and delete these files; the
/// dispatcher never reads them back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Envelope id; shared by every recipient of the same envelope.
    pub id: String,
    /// Epoch seconds at delivery.
    pub created_at: f64,
    /// Display name of the sender.
    #[serde(default)]
    pub source_name: String,
    /// Stable agent id of the sender.
    #[serde(default)]
    pub source_agent_id: String,
    /// Lowercased role of the sender.
    #[serde(default)]
    pub source_role: String,
    /// Injection hint mirrored from the envelope's delivery mode.
    #[serde(default)]
    pub deliver_as: DeliveryMode,
    /// Payload text.
    pub message: String,
}

impl InboxMessage {
    /// Build the inbox file payload for one recipient of `envelope`.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope, now: f64) -> Self {
        Self {
            id: envelope.id.clone(),
            created_at: now,
            source_name: envelope.source_name.clone(),
            source_agent_id: envelope.source_agent_id.clone(),
            source_role: envelope.source_role.clone(),
            deliver_as: envelope.delivery_mode,
            message: envelope.message.clone(),
        }
    }

    /// The inbox file name: zero-padded millisecond delivery timestamp
    /// plus the envelope id, so consumers see causal-within-producer order.
    #[must_use]
    pub fn file_name(&self) -> String {
        let ts_ms = (self.created_at.max(0.0) * 1000.0) as u64;
        format!("{ts_ms:013}-{}.json", self.id)
    }
}
