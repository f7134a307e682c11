// SPDX-License-Identifier: MIT OR Apache-2.0
//! Producer-side validation and enqueue.
//!
//! Both ingress shapes — the in-process dashboard path and the `zeus-msg`
//! subprocess — funnel through [`enqueue_outbound`]: parse the symbolic
//! target, resolve it against sender identity and the fleet, stamp the
//! origin, persist via the envelope store.

use zeus_core::{DeliveryMode, Envelope, TargetKind, TargetSpec};
use zeus_fleet::{FleetSnapshot, NameMatch};
use zeus_queue::{EnvelopeStore, QueueError};

/// Sender identity stamped onto every produced envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceIdentity {
    /// Display name shown to recipients.
    pub name: String,
    /// Stable agent id; required for CLI producers.
    pub agent_id: String,
    /// Lowercased role.
    pub role: String,
    /// Coordinator id, when the sender has one.
    pub parent_id: String,
    /// Phalanx id, when the sender belongs to one.
    pub phalanx_id: String,
}

impl SourceIdentity {
    /// Build the identity from `ZEUS_*` process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ProduceError::MissingAgentId`] when `ZEUS_AGENT_ID` is
    /// unset or blank; everything else defaults to empty.
    pub fn from_env() -> Result<Self, ProduceError> {
        let var = |key: &str| std::env::var(key).unwrap_or_default().trim().to_string();

        let agent_id = var("ZEUS_AGENT_ID");
        if agent_id.is_empty() {
            return Err(ProduceError::MissingAgentId);
        }

        let name = {
            let explicit = var("ZEUS_AGENT_NAME");
            if explicit.is_empty() { agent_id.clone() } else { explicit }
        };

        Ok(Self {
            name,
            agent_id,
            role: var("ZEUS_ROLE").to_lowercase(),
            parent_id: var("ZEUS_PARENT_ID"),
            phalanx_id: var("ZEUS_PHALANX_ID"),
        })
    }
}

/// Errors from producing an envelope.
#[derive(Debug, thiserror::Error)]
pub enum ProduceError {
    /// `ZEUS_AGENT_ID` is required for subprocess producers.
    #[error("ZEUS_AGENT_ID is required")]
    MissingAgentId,

    /// The payload was empty or all whitespace.
    #[error("message payload is empty")]
    EmptyMessage,

    /// The symbolic target cannot be resolved for this sender.
    #[error("cannot resolve target {spec:?}: {reason}")]
    UnresolvedTarget {
        /// The raw `--to` value.
        spec: String,
        /// Why it failed.
        reason: String,
    },

    /// A display name matched several live agents.
    #[error("ambiguous display name {name:?} ({count} agents)")]
    AmbiguousName {
        /// The ambiguous name.
        name: String,
        /// Number of agents carrying it.
        count: usize,
    },

    /// The envelope store failed to persist.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A symbolic target resolved into envelope addressing fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// What the reference names.
    pub kind: TargetKind,
    /// Target id or phalanx group id.
    pub target_ref: String,
    /// Owning polemarch for hoplite/phalanx targets.
    pub owner_id: String,
}

/// Resolve a parsed [`TargetSpec`] for `identity` against `fleet`.
///
/// Display names resolve through the fleet; an unknown plain token falls
/// through as a literal agent id (the capability gate will surface it if
/// it never comes alive), but ambiguity is an error, never a silent pick.
///
/// # Errors
///
/// Returns [`ProduceError`] for targets this sender cannot address and
/// for ambiguous display names.
pub fn resolve_target_spec(
    spec: &TargetSpec,
    raw_spec: &str,
    identity: &SourceIdentity,
    fleet: &FleetSnapshot,
) -> Result<ResolvedTarget, ProduceError> {
    let unresolved = |reason: &str| ProduceError::UnresolvedTarget {
        spec: raw_spec.to_string(),
        reason: reason.to_string(),
    };

    match spec {
        TargetSpec::Polemarch => {
            if identity.parent_id.is_empty() {
                return Err(unresolved("sender has no polemarch"));
            }
            Ok(ResolvedTarget {
                kind: TargetKind::Agent,
                target_ref: identity.parent_id.clone(),
                owner_id: String::new(),
            })
        }

        TargetSpec::Phalanx => {
            let owner = if identity.parent_id.is_empty() {
                identity.agent_id.as_str()
            } else {
                identity.parent_id.as_str()
            };
            if owner.is_empty() {
                return Err(unresolved("sender has no phalanx owner"));
            }
            let phalanx_id = if identity.phalanx_id.is_empty() {
                format!("phalanx-{owner}")
            } else {
                identity.phalanx_id.clone()
            };
            Ok(ResolvedTarget {
                kind: TargetKind::Phalanx,
                target_ref: phalanx_id,
                owner_id: owner.to_string(),
            })
        }

        TargetSpec::Hoplite(id) => {
            let owner = if identity.parent_id.is_empty() {
                identity.agent_id.clone()
            } else {
                identity.parent_id.clone()
            };
            Ok(ResolvedTarget {
                kind: TargetKind::Hoplite,
                target_ref: id.clone(),
                owner_id: owner,
            })
        }

        TargetSpec::Agent(id) => Ok(ResolvedTarget {
            kind: TargetKind::Agent,
            target_ref: id.clone(),
            owner_id: String::new(),
        }),

        TargetSpec::Name(name) => match fleet.find_by_name(name) {
            NameMatch::Unique(agent) if !agent.agent_id.is_empty() => Ok(ResolvedTarget {
                kind: TargetKind::Agent,
                target_ref: agent.agent_id.clone(),
                owner_id: String::new(),
            }),
            NameMatch::Unique(_) => Err(unresolved("matched agent has no stable id")),
            NameMatch::Ambiguous(count) => Err(ProduceError::AmbiguousName {
                name: name.clone(),
                count,
            }),
            // Plain id fallback.
            NameMatch::None => Ok(ResolvedTarget {
                kind: TargetKind::Agent,
                target_ref: name.clone(),
                owner_id: String::new(),
            }),
        },
    }
}

/// Validate, stamp, and persist one outbound envelope.
///
/// Returns the enqueued envelope so callers can report its id or wait on
/// its delivery.
///
/// # Errors
///
/// Returns [`ProduceError`] on an empty payload, an unparseable or
/// unresolvable target, an ambiguous display name, or a store failure.
pub fn enqueue_outbound(
    store: &EnvelopeStore,
    raw_target: &str,
    message: &str,
    identity: &SourceIdentity,
    delivery_mode: DeliveryMode,
    fleet: &FleetSnapshot,
    now: f64,
) -> Result<Envelope, ProduceError> {
    if message.trim().is_empty() {
        return Err(ProduceError::EmptyMessage);
    }

    let spec = TargetSpec::parse(raw_target).ok_or_else(|| ProduceError::UnresolvedTarget {
        spec: raw_target.to_string(),
        reason: "empty target".to_string(),
    })?;
    let resolved = resolve_target_spec(&spec, raw_target, identity, fleet)?;

    let envelope = Envelope::builder(&identity.name, message)
        .source_agent_id(&identity.agent_id)
        .source_role(&identity.role)
        .source_parent_id(&identity.parent_id)
        .source_phalanx_id(&identity.phalanx_id)
        .target(resolved.kind, &resolved.target_ref)
        .target_owner_id(&resolved.owner_id)
        .delivery_mode(delivery_mode)
        .build(now);

    store.enqueue(&envelope)?;
    Ok(envelope)
}
