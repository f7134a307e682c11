// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Typed settings for the Zeus message bus.
//!
//! Resolution order: built-in defaults ← optional TOML file ← `ZEUS_*`
//! environment variables. Every tunable the dispatcher and CLI consume
//! lives here, together with the derived state-directory paths.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found or unreadable.
    #[error("config file not readable: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
}

/// Runtime settings for the bus core.
#[derive(Clone, Debug, PartialEq)]
pub struct ZeusConfig {
    /// Root of all durable bus state.
    pub state_dir: PathBuf,
    /// Only root under which `--file` payloads are accepted.
    pub message_tmp_dir: PathBuf,
    /// Directory holding the discovery layer's fleet export.
    pub session_map_dir: PathBuf,
    /// Dispatcher tick interval in seconds.
    pub tick_interval: f64,
    /// Maximum capability heartbeat age before a recipient blocks.
    pub heartbeat_max_age: f64,
    /// Seconds an envelope may sit in `inflight/` before reclaim.
    pub inflight_lease: f64,
    /// Requeue delay after a capability block.
    pub blocked_retry_delay: f64,
    /// Upper bound of the receipt-wait backoff schedule.
    pub max_retry_delay: f64,
    /// Age past which an unresolvable envelope is dropped.
    pub stale_unresolved_after: f64,
    /// Retention of delivery dedupe records.
    pub dedupe_ttl: f64,
}

impl Default for ZeusConfig {
    fn default() -> Self {
        let state_dir = PathBuf::from("/tmp/zeus");
        Self {
            message_tmp_dir: state_dir.join("message-tmp"),
            session_map_dir: state_dir.clone(),
            state_dir,
            tick_interval: 0.5,
            heartbeat_max_age: 30.0,
            inflight_lease: 60.0,
            blocked_retry_delay: 2.0,
            max_retry_delay: 60.0,
            stale_unresolved_after: 86_400.0,
            dedupe_ttl: 86_400.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    dispatch: RawDispatch,
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    state_dir: Option<String>,
    message_tmp_dir: Option<String>,
    session_map_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDispatch {
    tick_interval: Option<f64>,
    heartbeat_max_age: Option<f64>,
    inflight_lease: Option<f64>,
    blocked_retry_delay: Option<f64>,
    max_retry_delay: Option<f64>,
    stale_unresolved_after: Option<f64>,
    dedupe_ttl: Option<f64>,
}

impl ZeusConfig {
    /// Load settings from an optional TOML file, then apply process
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a file was requested but is missing
    /// or malformed. A `None` path never fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(path, &env)
    }

    /// [`ZeusConfig::load`] with an explicit environment, for tests.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ZeusConfig::load`].
    pub fn load_with_env(
        path: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let raw = match path {
            Some(p) => {
                let content =
                    std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                        path: p.display().to_string(),
                    })?;
                toml::from_str::<RawConfig>(&content).map_err(|err| ConfigError::ParseError {
                    reason: err.to_string(),
                })?
            }
            None => RawConfig::default(),
        };

        let mut config = Self::default();

        if let Some(dir) = raw.paths.state_dir {
            config.set_state_dir(PathBuf::from(dir));
        }
        if let Some(dir) = raw.paths.message_tmp_dir {
            config.message_tmp_dir = PathBuf::from(dir);
        }
        if let Some(dir) = raw.paths.session_map_dir {
            config.session_map_dir = PathBuf::from(dir);
        }

        let d = raw.dispatch;
        let apply = |slot: &mut f64, value: Option<f64>| {
            if let Some(v) = value {
                if v.is_finite() && v >= 0.0 {
                    *slot = v;
                }
            }
        };
        apply(&mut config.tick_interval, d.tick_interval);
        apply(&mut config.heartbeat_max_age, d.heartbeat_max_age);
        apply(&mut config.inflight_lease, d.inflight_lease);
        apply(&mut config.blocked_retry_delay, d.blocked_retry_delay);
        apply(&mut config.max_retry_delay, d.max_retry_delay);
        apply(&mut config.stale_unresolved_after, d.stale_unresolved_after);
        apply(&mut config.dedupe_ttl, d.dedupe_ttl);

        config.apply_env(env);
        Ok(config)
    }

    fn set_state_dir(&mut self, dir: PathBuf) {
        // Derived paths follow the state dir unless set explicitly later.
        self.message_tmp_dir = dir.join("message-tmp");
        self.session_map_dir = dir.clone();
        self.state_dir = dir;
    }

    fn apply_env(&mut self, env: &HashMap<String, String>) {
        let non_blank = |key: &str| -> Option<&String> {
            env.get(key).filter(|value| !value.trim().is_empty())
        };

        if let Some(dir) = non_blank("ZEUS_STATE_DIR") {
            self.set_state_dir(PathBuf::from(dir.trim()));
        }
        if let Some(dir) = non_blank("ZEUS_MESSAGE_TMP_DIR") {
            self.message_tmp_dir = PathBuf::from(dir.trim());
        }
        if let Some(dir) = non_blank("ZEUS_SESSION_MAP_DIR") {
            self.session_map_dir = PathBuf::from(dir.trim());
        }
        if let Some(secs) = non_blank("ZEUS_POLL").and_then(|v| v.trim().parse::<f64>().ok()) {
            if secs.is_finite() && secs > 0.0 {
                self.tick_interval = secs;
            }
        }
    }

    /// Envelope store root: `<state>/queue`.
    #[must_use]
    pub fn queue_dir(&self) -> PathBuf {
        self.state_dir.join("queue")
    }

    /// Agent bus root: `<state>/bus`.
    #[must_use]
    pub fn bus_dir(&self) -> PathBuf {
        self.state_dir.join("bus")
    }

    /// Dispatcher dedupe ledger: `<state>/receipts.json`.
    #[must_use]
    pub fn receipts_file(&self) -> PathBuf {
        self.state_dir.join("receipts.json")
    }

    /// Dependency overlay: `<state>/dependencies.json`.
    #[must_use]
    pub fn dependencies_file(&self) -> PathBuf {
        self.state_dir.join("dependencies.json")
    }

    /// Priority overlay: `<state>/priorities.json`.
    #[must_use]
    pub fn priorities_file(&self) -> PathBuf {
        self.state_dir.join("priorities.json")
    }

    /// Promotion overlay: `<state>/promoted.json`.
    #[must_use]
    pub fn promoted_file(&self) -> PathBuf {
        self.state_dir.join("promoted.json")
    }

    /// Discovery's fleet export: `<session_map_dir>/fleet.json`.
    #[must_use]
    pub fn fleet_file(&self) -> PathBuf {
        self.session_map_dir.join("fleet.json")
    }
}
