// SPDX-License-Identifier: MIT OR Apache-2.0
//! Symbolic target grammar for producers.
//!
//! `--to` accepts `polemarch`, `phalanx`, `hoplite:<id>`, `agent:<id>`, or
//! a plain token. Plain tokens are display names when the fleet knows
//! them, otherwise they fall through as literal agent ids.

/// A parsed `--to` specifier, before identity and fleet resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetSpec {
    /// The sender's own coordinator.
    Polemarch,
    /// The sender's phalanx (own phalanx for a hoplite, owned phalanx for
    /// a polemarch).
    Phalanx,
    /// A specific hoplite by id.
    Hoplite(String),
    /// A specific agent by id.
    Agent(String),
    /// A display name or literal agent id, disambiguated against the fleet.
    Name(String),
}

impl TargetSpec {
    /// Parse a raw `--to` string. Returns `None` for an empty spec or an
    /// empty id after a `hoplite:`/`agent:` prefix.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let clean = spec.trim();
        if clean.is_empty() {
            return None;
        }

        if clean == "polemarch" {
            return Some(Self::Polemarch);
        }
        if clean == "phalanx" {
            return Some(Self::Phalanx);
        }
        if let Some(id) = clean.strip_prefix("hoplite:") {
            let id = id.trim();
            if id.is_empty() {
                return None;
            }
            return Some(Self::Hoplite(id.to_string()));
        }
        if let Some(id) = clean.strip_prefix("agent:") {
            let id = id.trim();
            if id.is_empty() {
                return None;
            }
            return Some(Self::Agent(id.to_string()));
        }

        Some(Self::Name(clean.to_string()))
    }
}
