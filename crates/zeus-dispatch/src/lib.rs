// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The autonomous message dispatcher.
//!
//! One [`Dispatcher::drain`] pass claims every eligible envelope, resolves
//! its symbolic target against the live fleet, gates each recipient on
//! capability health and the delivery dedupe ledger, fans out inbox files,
//! and acks once every recipient has published a receipt. Blocked queues
//! are surfaced to the operator with one notice per distinct reason.
//!
//! The loop is strictly single-threaded per process; concurrent host
//! processes stay safe because every queue transition is an exclusive
//! rename.

mod dedupe;
mod dispatcher;
mod notify;
mod outbound;
mod resolver;

pub use dedupe::DedupeLedger;
pub use dispatcher::{DispatchPolicy, Dispatcher, DrainOutcome, Overlays};
pub use notify::{DesktopNotifier, MemoryNotifier, Notifier, NullNotifier};
pub use outbound::{ProduceError, ResolvedTarget, SourceIdentity, enqueue_outbound, resolve_target_spec};
pub use resolver::{ResolveError, resolve_recipients};
