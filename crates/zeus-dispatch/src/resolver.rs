// SPDX-License-Identifier: MIT OR Apache-2.0
//! Envelope target resolution against the live fleet.

use zeus_core::{Envelope, TargetKind, is_valid_agent_id, sanitize_agent_id};
use zeus_fleet::{FleetSnapshot, PromotionSet};

/// Why an envelope's target could not be resolved this tick.
///
/// The display text is shown to the operator verbatim, so each variant
/// names the offending id.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    /// A phalanx member is live but never declared a routable id.
    #[error("missing @zeus_agent id for {name}")]
    MissingAgentId {
        /// Display name of the member without an id.
        name: String,
    },

    /// A hoplite target is not present in the fleet.
    #[error("unknown hoplite {id}")]
    UnknownHoplite {
        /// The requested hoplite id.
        id: String,
    },

    /// A phalanx target expanded to zero members.
    #[error("no hoplites in {phalanx_id}")]
    EmptyPhalanx {
        /// The phalanx group id.
        phalanx_id: String,
    },

    /// A phalanx/hoplite target carries no owner id to expand against.
    #[error("missing owner for {phalanx_id}")]
    MissingOwner {
        /// The phalanx group id.
        phalanx_id: String,
    },

    /// A recipient id contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid recipient id {id:?}")]
    InvalidRecipientId {
        /// The rejected raw id.
        id: String,
    },
}

/// Resolve `envelope`'s target into an ordered, de-duplicated list of
/// concrete recipient ids.
///
/// Resolution happens against the snapshot of the current tick: a hoplite
/// that joins mid-drain is picked up on the next pass. Promoted sub-agents
/// are roots and never expand with their old phalanx.
///
/// # Errors
///
/// Returns a [`ResolveError`] naming the first offending id; the
/// dispatcher surfaces it as a block reason and retries until the
/// stale-unresolved threshold.
pub fn resolve_recipients(
    envelope: &Envelope,
    fleet: &FleetSnapshot,
    promoted: &PromotionSet,
) -> Result<Vec<String>, ResolveError> {
    match envelope.target_kind {
        TargetKind::Agent => {
            let id = if envelope.target_agent_id.is_empty() {
                envelope.target_ref.as_str()
            } else {
                envelope.target_agent_id.as_str()
            };
            if !is_valid_agent_id(id) {
                return Err(ResolveError::InvalidRecipientId { id: id.to_string() });
            }
            Ok(vec![id.to_string()])
        }

        TargetKind::Hoplite => {
            let id = envelope.target_ref.as_str();
            if !is_valid_agent_id(id) {
                return Err(ResolveError::InvalidRecipientId { id: id.to_string() });
            }
            let known = fleet
                .get(id)
                .is_some_and(|agent| agent.role == zeus_fleet::AgentRole::Hoplite);
            if !known {
                return Err(ResolveError::UnknownHoplite { id: id.to_string() });
            }
            Ok(vec![id.to_string()])
        }

        TargetKind::Phalanx => {
            let owner = envelope.target_owner_id.as_str();
            if owner.is_empty() {
                return Err(ResolveError::MissingOwner {
                    phalanx_id: envelope.target_ref.clone(),
                });
            }

            let members = fleet.phalanx_members(owner, promoted);
            if members.is_empty() {
                return Err(ResolveError::EmptyPhalanx {
                    phalanx_id: envelope.target_ref.clone(),
                });
            }

            let mut recipients = Vec::with_capacity(members.len());
            for member in members {
                // Env-only identity is not trusted for routing.
                if member.agent_id.is_empty() || !member.authoritative_id {
                    return Err(ResolveError::MissingAgentId {
                        name: member.name.clone(),
                    });
                }
                let clean = sanitize_agent_id(&member.agent_id);
                if clean != member.agent_id || clean.is_empty() {
                    return Err(ResolveError::InvalidRecipientId {
                        id: member.agent_id.clone(),
                    });
                }
                if !recipients.contains(&clean) {
                    recipients.push(clean);
                }
            }
            Ok(recipients)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeus_fleet::{AgentRole, FleetAgent};

    fn hoplite(id: &str, name: &str, parent: &str) -> FleetAgent {
        FleetAgent {
            agent_id: id.to_string(),
            name: name.to_string(),
            role: AgentRole::Hoplite,
            parent_id: parent.to_string(),
            phalanx_id: format!("phalanx-{parent}"),
            ..FleetAgent::default()
        }
    }

    fn phalanx_envelope(owner: &str) -> Envelope {
        Envelope::builder("polemarch", "hello")
            .source_agent_id(owner)
            .target(TargetKind::Phalanx, &format!("phalanx-{owner}"))
            .target_owner_id(owner)
            .build(100.0)
    }

    #[test]
    fn agent_target_resolves_directly_without_fleet() {
        let env = Envelope::builder("s", "m")
            .target(TargetKind::Agent, "agent-7")
            .build(1.0);
        let got = resolve_recipients(&env, &FleetSnapshot::default(), &PromotionSet::default());
        assert_eq!(got.unwrap(), vec!["agent-7".to_string()]);
    }

    #[test]
    fn agent_target_rejects_bad_charset() {
        let env = Envelope::builder("s", "m")
            .target(TargetKind::Agent, "../etc")
            .build(1.0);
        let err = resolve_recipients(&env, &FleetSnapshot::default(), &PromotionSet::default())
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidRecipientId { .. }));
    }

    #[test]
    fn phalanx_expands_to_owned_hoplites_in_order() {
        let fleet = FleetSnapshot::from_agents(vec![
            hoplite("h1", "a", "p1"),
            hoplite("h2", "b", "p1"),
            hoplite("h3", "c", "p2"),
        ]);
        let got =
            resolve_recipients(&phalanx_envelope("p1"), &fleet, &PromotionSet::default()).unwrap();
        assert_eq!(got, vec!["h1".to_string(), "h2".to_string()]);
    }

    #[test]
    fn phalanx_member_without_id_fails_loudly() {
        let mut nameless = hoplite("", "hoplite-x", "p1");
        nameless.authoritative_id = false;
        let fleet = FleetSnapshot::from_agents(vec![nameless]);

        let err = resolve_recipients(&phalanx_envelope("p1"), &fleet, &PromotionSet::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "missing @zeus_agent id for hoplite-x");
    }

    #[test]
    fn phalanx_member_with_env_only_id_fails_loudly() {
        let mut untrusted = hoplite("h1", "hoplite-y", "p1");
        untrusted.authoritative_id = false;
        let fleet = FleetSnapshot::from_agents(vec![untrusted]);

        let err = resolve_recipients(&phalanx_envelope("p1"), &fleet, &PromotionSet::default())
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingAgentId { .. }));
    }

    #[test]
    fn promoted_members_leave_the_phalanx() {
        let fleet =
            FleetSnapshot::from_agents(vec![hoplite("h1", "a", "p1"), hoplite("h2", "b", "p1")]);
        let mut promoted = PromotionSet::default();
        promoted.promote("h2");

        let got = resolve_recipients(&phalanx_envelope("p1"), &fleet, &promoted).unwrap();
        assert_eq!(got, vec!["h1".to_string()]);
    }

    #[test]
    fn empty_phalanx_is_unresolved() {
        let err = resolve_recipients(
            &phalanx_envelope("p1"),
            &FleetSnapshot::default(),
            &PromotionSet::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ResolveError::EmptyPhalanx {
                phalanx_id: "phalanx-p1".into()
            }
        );
    }

    #[test]
    fn unknown_hoplite_is_unresolved() {
        let env = Envelope::builder("s", "m")
            .target(TargetKind::Hoplite, "missing-hoplite")
            .target_owner_id("p1")
            .build(1.0);
        let err = resolve_recipients(&env, &FleetSnapshot::default(), &PromotionSet::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown hoplite missing-hoplite");
    }
}
