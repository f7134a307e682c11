// SPDX-License-Identifier: MIT OR Apache-2.0
//! The live fleet view exported by the discovery layer.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Role of an agent in the fleet hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// A top-level, end-user-facing agent.
    #[default]
    Hippeus,
    /// A coordinator owning a phalanx of workers.
    Polemarch,
    /// A worker belonging to a polemarch's phalanx.
    Hoplite,
}

/// One live agent as reported by discovery.
///
/// `agent_id` may be empty for tmux sessions that never declared one;
/// such agents can be displayed but not routed to, and phalanx expansion
/// over them fails loudly rather than guessing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetAgent {
    /// Stable agent id, empty when unknown.
    #[serde(default)]
    pub agent_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Fleet role.
    #[serde(default)]
    pub role: AgentRole,
    /// Owning coordinator id, empty for roots.
    #[serde(default)]
    pub parent_id: String,
    /// Phalanx group id, empty when not in one.
    #[serde(default)]
    pub phalanx_id: String,
    /// Hosting backend (`kitty` / `tmux`).
    #[serde(default)]
    pub backend: String,
    /// Workspace path the agent runs in.
    #[serde(default)]
    pub workspace: String,
    /// Whether the agent is currently addressable at all.
    #[serde(default = "default_true")]
    pub addressable: bool,
    /// Whether `agent_id` comes from a trusted source (tmux option or
    /// start command) rather than environment only.
    #[serde(default = "default_true")]
    pub authoritative_id: bool,
}

fn default_true() -> bool {
    true
}

/// Outcome of a display-name lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum NameMatch<'a> {
    /// No agent carries that name.
    None,
    /// Exactly one agent carries that name.
    Unique(&'a FleetAgent),
    /// Several agents carry that name; the caller must error, not pick.
    Ambiguous(usize),
}

/// Read-only list of live agents, refreshed by discovery each poll.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    /// Live agents in discovery order.
    #[serde(default)]
    pub agents: Vec<FleetAgent>,
}

impl FleetSnapshot {
    /// Wrap a list of agents.
    #[must_use]
    pub fn from_agents(agents: Vec<FleetAgent>) -> Self {
        Self { agents }
    }

    /// Load the snapshot exported by discovery, tolerating absence and
    /// decode failures with an empty fleet. A transiently unreadable
    /// snapshot must degrade to "nothing resolvable", not a crash.
    #[must_use]
    pub fn load_or_empty(path: &Path) -> Self {
        zeus_core::read_json_value(path)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Find an agent by stable id.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<&FleetAgent> {
        if agent_id.is_empty() {
            return None;
        }
        self.agents.iter().find(|agent| agent.agent_id == agent_id)
    }

    /// Look up a display name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> NameMatch<'_> {
        let mut matches = self.agents.iter().filter(|agent| agent.name == name);
        let Some(first) = matches.next() else {
            return NameMatch::None;
        };
        let rest = matches.count();
        if rest == 0 {
            NameMatch::Unique(first)
        } else {
            NameMatch::Ambiguous(rest + 1)
        }
    }

    /// Hoplites owned by `owner_id`, in discovery order, excluding
    /// promoted sub-agents (promotion makes an agent a root, so it no
    /// longer rides with its old phalanx).
    #[must_use]
    pub fn phalanx_members<'a>(
        &'a self,
        owner_id: &str,
        promoted: &crate::PromotionSet,
    ) -> Vec<&'a FleetAgent> {
        if owner_id.is_empty() {
            return Vec::new();
        }
        self.agents
            .iter()
            .filter(|agent| agent.role == AgentRole::Hoplite && agent.parent_id == owner_id)
            .filter(|agent| agent.agent_id.is_empty() || !promoted.contains(&agent.agent_id))
            .collect()
    }
}
