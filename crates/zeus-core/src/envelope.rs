// SPDX-License-Identifier: MIT OR Apache-2.0
//! The persisted outbound message envelope.
//!
//! Envelopes are written by producers into `queue/new/` and shepherded by
//! the dispatcher through `inflight/` until every resolved recipient has
//! acknowledged. Loading is deliberately tolerant: a file that cannot be
//! decoded into a well-formed envelope yields `None` rather than an error,
//! so one poison file can never stall the queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the `target_ref` of an envelope names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A single concrete agent id.
    Agent,
    /// A single hoplite id, owned by `target_owner_id`.
    Hoplite,
    /// Every hoplite in the phalanx owned by `target_owner_id`.
    Phalanx,
}

impl TargetKind {
    /// Parse a lowercase kind string; unknown kinds are rejected.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Some(Self::Agent),
            "hoplite" => Some(Self::Hoplite),
            "phalanx" => Some(Self::Phalanx),
            _ => None,
        }
    }

    /// The wire string for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Hoplite => "hoplite",
            Self::Phalanx => "phalanx",
        }
    }
}

/// How the recipient-side extension should inject the payload.
///
/// The bus core never branches on this; it is copied verbatim into the
/// delivered inbox file as a hint for the consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Queue behind the recipient's current turn.
    #[default]
    #[serde(rename = "followUp")]
    FollowUp,
    /// Interrupt and steer the recipient's current turn.
    #[serde(rename = "steer")]
    Steer,
}

impl DeliveryMode {
    /// Parse a mode string; anything unrecognized falls back to `FollowUp`.
    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim() {
            "steer" => Self::Steer,
            _ => Self::FollowUp,
        }
    }

    /// The wire string for this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FollowUp => "followUp",
            Self::Steer => "steer",
        }
    }
}

/// One outbound message's durable record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    /// Globally unique hex token (uuid v4, 128 bits of entropy).
    pub id: String,
    /// Display name of the sender.
    pub source_name: String,
    /// Stable agent id of the sender, empty for operator-originated sends.
    pub source_agent_id: String,
    /// Lowercased role of the sender (`hippeus` / `polemarch` / `hoplite`).
    pub source_role: String,
    /// Sender's coordinator id, when it has one.
    pub source_parent_id: String,
    /// Sender's phalanx id, when it belongs to one.
    pub source_phalanx_id: String,
    /// What `target_ref` names.
    pub target_kind: TargetKind,
    /// The target id (agent/hoplite) or phalanx group id.
    pub target_ref: String,
    /// Owning polemarch id for `hoplite` and `phalanx` targets.
    pub target_owner_id: String,
    /// Normalized copy of `target_ref` when `target_kind` is `agent`.
    pub target_agent_id: String,
    /// Display name of the target, advisory only.
    pub target_name: String,
    /// Injection hint copied into the delivered inbox file.
    pub delivery_mode: DeliveryMode,
    /// Payload text.
    pub message: String,
    /// Epoch seconds at creation.
    pub created_at: f64,
    /// Epoch seconds at the last state transition.
    pub updated_at: f64,
    /// Number of times the dispatcher re-queued this envelope.
    pub attempts: u32,
    /// Earliest epoch second at which the dispatcher may re-claim.
    pub next_attempt_at: f64,
}

impl Envelope {
    /// Start building a new envelope from the mandatory fields.
    #[must_use]
    pub fn builder(source_name: &str, message: &str) -> EnvelopeBuilder {
        EnvelopeBuilder::new(source_name, message)
    }

    /// Decode an envelope from a parsed JSON value.
    ///
    /// Unknown keys are ignored. Returns `None` when the value is not an
    /// object, the target kind is unrecognized, the target reference is
    /// empty, or `id`/`message` are missing — the conditions under which
    /// the dispatcher discards the file on load.
    #[must_use]
    pub fn from_value(raw: &serde_json::Value) -> Option<Self> {
        let obj = raw.as_object()?;

        let s = |key: &str| -> String {
            obj.get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let f = |key: &str| -> f64 { obj.get(key).and_then(serde_json::Value::as_f64).unwrap_or(0.0) };

        let kind_raw = s("target_kind");
        let target_kind = if kind_raw.is_empty() {
            TargetKind::Agent
        } else {
            TargetKind::parse(&kind_raw)?
        };

        let mut target_ref = s("target_ref");
        let mut target_agent_id = s("target_agent_id");
        if target_kind == TargetKind::Agent {
            if target_ref.is_empty() {
                target_ref = target_agent_id.clone();
            }
            if target_agent_id.is_empty() {
                target_agent_id = target_ref.clone();
            }
        }
        if target_ref.is_empty() {
            return None;
        }

        let id = s("id");
        // The raw payload must not be trimmed; only require it non-empty.
        let message = obj
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() || message.is_empty() {
            return None;
        }

        let attempts = obj
            .get("attempts")
            .and_then(serde_json::Value::as_f64)
            .map(|v| if v.is_sign_negative() { 0 } else { v as u32 })
            .unwrap_or(0);

        Some(Self {
            id,
            source_name: s("source_name"),
            source_agent_id: s("source_agent_id"),
            source_role: s("source_role").to_lowercase(),
            source_parent_id: s("source_parent_id"),
            source_phalanx_id: s("source_phalanx_id"),
            target_kind,
            target_ref,
            target_owner_id: s("target_owner_id"),
            target_agent_id,
            target_name: s("target_name"),
            delivery_mode: DeliveryMode::parse_or_default(&s("delivery_mode")),
            message,
            created_at: f("created_at"),
            updated_at: f("updated_at"),
            attempts,
            next_attempt_at: f("next_attempt_at"),
        })
    }

    /// The queue file name for this envelope: zero-padded millisecond
    /// creation timestamp plus the id, stable across requeues.
    #[must_use]
    pub fn file_name(&self) -> String {
        let ts_ms = (self.created_at.max(0.0) * 1000.0) as u64;
        format!("{ts_ms:013}-{}.json", self.id)
    }
}

/// Fluent constructor for [`Envelope`], mirroring producer-side defaults.
#[derive(Clone, Debug)]
pub struct EnvelopeBuilder {
    source_name: String,
    source_agent_id: String,
    source_role: String,
    source_parent_id: String,
    source_phalanx_id: String,
    target_kind: TargetKind,
    target_ref: String,
    target_owner_id: String,
    target_agent_id: String,
    target_name: String,
    delivery_mode: DeliveryMode,
    message: String,
}

impl EnvelopeBuilder {
    fn new(source_name: &str, message: &str) -> Self {
        Self {
            source_name: source_name.trim().to_string(),
            source_agent_id: String::new(),
            source_role: String::new(),
            source_parent_id: String::new(),
            source_phalanx_id: String::new(),
            target_kind: TargetKind::Agent,
            target_ref: String::new(),
            target_owner_id: String::new(),
            target_agent_id: String::new(),
            target_name: String::new(),
            delivery_mode: DeliveryMode::FollowUp,
            message: message.to_string(),
        }
    }

    /// Set the sender's stable agent id.
    #[must_use]
    pub fn source_agent_id(mut self, id: &str) -> Self {
        self.source_agent_id = id.trim().to_string();
        self
    }

    /// Set the sender's role (stored lowercased).
    #[must_use]
    pub fn source_role(mut self, role: &str) -> Self {
        self.source_role = role.trim().to_lowercase();
        self
    }

    /// Set the sender's coordinator id.
    #[must_use]
    pub fn source_parent_id(mut self, id: &str) -> Self {
        self.source_parent_id = id.trim().to_string();
        self
    }

    /// Set the sender's phalanx id.
    #[must_use]
    pub fn source_phalanx_id(mut self, id: &str) -> Self {
        self.source_phalanx_id = id.trim().to_string();
        self
    }

    /// Set the target kind and reference together.
    #[must_use]
    pub fn target(mut self, kind: TargetKind, target_ref: &str) -> Self {
        self.target_kind = kind;
        self.target_ref = target_ref.trim().to_string();
        self
    }

    /// Set the owning polemarch id for hoplite/phalanx targets.
    #[must_use]
    pub fn target_owner_id(mut self, id: &str) -> Self {
        self.target_owner_id = id.trim().to_string();
        self
    }

    /// Set the advisory display name of the target.
    #[must_use]
    pub fn target_name(mut self, name: &str) -> Self {
        self.target_name = name.trim().to_string();
        self
    }

    /// Set the delivery hint.
    #[must_use]
    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    /// Finalize the envelope, minting a fresh id and stamping `now`.
    ///
    /// For `agent` targets, `target_ref` and `target_agent_id` are
    /// mirrored onto each other when only one was provided.
    #[must_use]
    pub fn build(self, now: f64) -> Envelope {
        let mut target_ref = self.target_ref;
        let mut target_agent_id = self.target_agent_id;
        if self.target_kind == TargetKind::Agent {
            if target_ref.is_empty() {
                target_ref = target_agent_id.clone();
            }
            if target_agent_id.is_empty() {
                target_agent_id = target_ref.clone();
            }
        }

        Envelope {
            id: Uuid::new_v4().simple().to_string(),
            source_name: self.source_name,
            source_agent_id: self.source_agent_id,
            source_role: self.source_role,
            source_parent_id: self.source_parent_id,
            source_phalanx_id: self.source_phalanx_id,
            target_kind: self.target_kind,
            target_ref,
            target_owner_id: self.target_owner_id,
            target_agent_id,
            target_name: self.target_name,
            delivery_mode: self.delivery_mode,
            message: self.message,
            created_at: now,
            updated_at: now,
            attempts: 0,
            next_attempt_at: 0.0,
        }
    }
}
