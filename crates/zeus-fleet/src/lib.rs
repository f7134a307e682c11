// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Read-only fleet view and routing overlay maps.
//!
//! The discovery layer (kitty windows, tmux sessions, `/proc` probes)
//! exports a [`FleetSnapshot`] each poll; the bus core only consumes it.
//! Overlay maps — blocking dependencies, priorities, and promoted
//! sub-hippeis — are small JSON files under the state directory, read at
//! startup and rewritten atomically on every mutation.

mod overlay;
mod snapshot;

pub use overlay::{
    DEFAULT_PRIORITY, DependencyMap, OverlayError, PAUSE_THRESHOLD, PriorityMap, PromotionSet,
};
pub use snapshot::{AgentRole, FleetAgent, FleetSnapshot, NameMatch};
