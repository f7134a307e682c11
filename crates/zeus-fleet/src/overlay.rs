// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistent routing overlays: dependencies, priorities, promotions.
//!
//! Each map is one small JSON file, loaded tolerantly (a damaged file
//! degrades to an empty map) and rewritten whole-file-atomically after
//! every mutation. Loading validates entries individually so one bad
//! record never poisons the rest.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use zeus_core::{read_json_value, write_json_atomic};

/// Priority assigned to agents with no explicit entry.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Priorities at or above this value mean "paused".
pub const PAUSE_THRESHOLD: u8 = 4;

/// Errors from overlay mutations.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// The mutation would make the dependency graph cyclic.
    #[error("dependency {blocked} -> {blocker} would create cycle")]
    WouldCreateCycle {
        /// The agent that would be blocked.
        blocked: String,
        /// The agent that would block it.
        blocker: String,
    },

    /// An agent cannot block itself.
    #[error("agent {id} cannot depend on itself")]
    SelfDependency {
        /// The offending agent id.
        id: String,
    },

    /// The overlay file could not be persisted.
    #[error("persist overlay {path}: {source}")]
    Persist {
        /// Overlay file path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

fn persist<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), OverlayError> {
    write_json_atomic(path, value).map_err(|source| OverlayError::Persist {
        path: path.display().to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// DependencyMap
// ---------------------------------------------------------------------------

/// `{blocked_agent_id → blocker_agent_id}`, keyed by stable agent id.
///
/// Each agent has at most one blocker, so the graph is functional; cycle
/// detection is a walk along the blocker chain.
#[derive(Debug)]
pub struct DependencyMap {
    path: PathBuf,
    map: BTreeMap<String, String>,
}

impl DependencyMap {
    /// Load the map from `path`, skipping malformed entries.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut map = BTreeMap::new();
        if let Some(Value::Object(raw)) = read_json_value(&path) {
            for (blocked, blocker) in raw {
                let Some(blocker) = blocker.as_str() else { continue };
                let blocked = blocked.trim().to_string();
                let blocker = blocker.trim().to_string();
                if blocked.is_empty() || blocker.is_empty() || blocked == blocker {
                    continue;
                }
                map.insert(blocked, blocker);
            }
        }
        Self { path, map }
    }

    /// The blocker of `blocked_id`, if any.
    #[must_use]
    pub fn blocker_of(&self, blocked_id: &str) -> Option<&str> {
        self.map.get(blocked_id).map(String::as_str)
    }

    /// Number of recorded dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when no dependencies are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Record `blocked_id` as waiting on `blocker_id` and persist.
    ///
    /// # Errors
    ///
    /// Rejects self-dependencies and mutations that would close a cycle
    /// along the blocker chain; fails when persistence fails.
    pub fn set(&mut self, blocked_id: &str, blocker_id: &str) -> Result<(), OverlayError> {
        let blocked = blocked_id.trim();
        let blocker = blocker_id.trim();
        if blocked == blocker {
            return Err(OverlayError::SelfDependency {
                id: blocked.to_string(),
            });
        }

        // Walk the existing blocker chain from the proposed blocker; if it
        // reaches `blocked`, closing this edge would create a cycle.
        let mut cursor: &str = blocker;
        let mut hops = 0usize;
        loop {
            if cursor == blocked {
                return Err(OverlayError::WouldCreateCycle {
                    blocked: blocked.to_string(),
                    blocker: blocker.to_string(),
                });
            }
            match self.map.get(cursor) {
                Some(next) if hops <= self.map.len() => {
                    cursor = next;
                    hops += 1;
                }
                _ => break,
            }
        }

        self.map.insert(blocked.to_string(), blocker.to_string());
        persist(&self.path, &self.map)
    }

    /// Drop the dependency of `blocked_id`, persisting when present.
    ///
    /// Returns `true` when an entry was removed.
    pub fn clear(&mut self, blocked_id: &str) -> bool {
        if self.map.remove(blocked_id).is_none() {
            return false;
        }
        if let Err(err) = persist(&self.path, &self.map) {
            warn!(target: "zeus.fleet", %err, "failed to persist dependency map");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// PriorityMap
// ---------------------------------------------------------------------------

/// `{display_name → priority 1..=5}`. Entries at [`DEFAULT_PRIORITY`] are
/// not stored.
#[derive(Debug)]
pub struct PriorityMap {
    path: PathBuf,
    map: BTreeMap<String, u8>,
}

impl PriorityMap {
    /// Load the map from `path`, clamping values into `1..=5` and
    /// skipping malformed entries.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut map = BTreeMap::new();
        if let Some(Value::Object(raw)) = read_json_value(&path) {
            for (name, value) in raw {
                let Some(priority) = value.as_u64() else { continue };
                let name = name.trim().to_string();
                if name.is_empty() {
                    continue;
                }
                map.insert(name, (priority.clamp(1, 5)) as u8);
            }
        }
        Self { path, map }
    }

    /// Effective priority for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> u8 {
        self.map.get(name).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    /// Whether `name` is paused (priority at or above the threshold).
    #[must_use]
    pub fn is_paused(&self, name: &str) -> bool {
        self.get(name) >= PAUSE_THRESHOLD
    }

    /// Assign a priority and persist.
    ///
    /// # Errors
    ///
    /// Fails only when persistence fails.
    pub fn set(&mut self, name: &str, priority: u8) -> Result<(), OverlayError> {
        let clamped = priority.clamp(1, 5);
        if clamped == DEFAULT_PRIORITY {
            self.map.remove(name);
        } else {
            self.map.insert(name.to_string(), clamped);
        }
        persist(&self.path, &self.map)
    }

    /// Return `name` to the default priority, persisting when an entry
    /// existed. Returns `true` when something changed.
    pub fn reset(&mut self, name: &str) -> bool {
        if self.map.remove(name).is_none() {
            return false;
        }
        if let Err(err) = persist(&self.path, &self.map) {
            warn!(target: "zeus.fleet", %err, "failed to persist priority map");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// PromotionSet
// ---------------------------------------------------------------------------

/// Ids of sub-hippeis promoted to roots; stored as a sorted JSON list.
#[derive(Debug, Default)]
pub struct PromotionSet {
    path: Option<PathBuf>,
    set: BTreeSet<String>,
}

impl PromotionSet {
    /// Load the set from `path`, skipping non-string entries.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut set = BTreeSet::new();
        if let Some(Value::Array(raw)) = read_json_value(&path) {
            for value in raw {
                if let Some(id) = value.as_str() {
                    let id = id.trim();
                    if !id.is_empty() {
                        set.insert(id.to_string());
                    }
                }
            }
        }
        Self {
            path: Some(path),
            set,
        }
    }

    /// Whether `agent_id` has been promoted.
    #[must_use]
    pub fn contains(&self, agent_id: &str) -> bool {
        self.set.contains(agent_id)
    }

    /// Promote `agent_id`, persisting when backed by a file.
    pub fn promote(&mut self, agent_id: &str) {
        let id = agent_id.trim();
        if id.is_empty() || !self.set.insert(id.to_string()) {
            return;
        }
        self.flush();
    }

    /// Demote `agent_id`, persisting when backed by a file.
    pub fn demote(&mut self, agent_id: &str) {
        if self.set.remove(agent_id.trim()) {
            self.flush();
        }
    }

    fn flush(&self) {
        let Some(path) = &self.path else { return };
        if let Err(err) = persist(path, &self.set) {
            warn!(target: "zeus.fleet", %err, "failed to persist promotion set");
        }
    }
}
