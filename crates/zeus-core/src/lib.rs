// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Core data model for the Zeus message bus.
//!
//! This crate defines the persisted wire artifacts shared by every producer
//! and consumer of the bus: the outbound [`Envelope`], the per-recipient
//! [`InboxMessage`], recipient-published [`BusReceipt`]s and
//! [`CapabilityHeartbeat`]s, plus the recipient-id sanitizer and the
//! symbolic [`TargetSpec`] grammar used by producers.
//!
//! All timestamps are `f64` seconds since the Unix epoch, matching the
//! artifacts already on disk in deployed fleets. Functions that compare
//! ages take `now` explicitly so tests can inject a fake clock.

mod envelope;
mod fsio;
mod ident;
mod inbox;
mod receipt;
mod target;

pub use envelope::{DeliveryMode, Envelope, EnvelopeBuilder, TargetKind};
pub use fsio::{read_json_value, write_json_atomic};
pub use ident::{is_valid_agent_id, sanitize_agent_id};
pub use inbox::InboxMessage;
pub use receipt::{BusReceipt, CapabilityHeartbeat, ReceiptDisposition};
pub use target::TargetSpec;

/// Current wall-clock time as `f64` seconds since the Unix epoch.
///
/// Binaries call this once per tick and thread the value through every
/// store operation; library code never reads the clock on its own.
#[must_use]
pub fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
