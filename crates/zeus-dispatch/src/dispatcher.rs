// SPDX-License-Identifier: MIT OR Apache-2.0
//! The envelope-draining loop.

use crate::dedupe::DedupeLedger;
use crate::notify::Notifier;
use crate::resolver::resolve_recipients;
use std::collections::HashMap;
use std::fs;
use tracing::{debug, warn};
use zeus_bus::{BusStore, CapabilityHealth};
use zeus_core::{Envelope, InboxMessage, ReceiptDisposition};
use zeus_fleet::{DependencyMap, FleetSnapshot, PriorityMap, PromotionSet};
use zeus_queue::EnvelopeStore;

/// Tunables for one dispatcher instance.
#[derive(Clone, Copy, Debug)]
pub struct DispatchPolicy {
    /// Maximum capability heartbeat age before a recipient blocks.
    pub heartbeat_max_age: f64,
    /// Seconds an envelope may sit in `inflight/` before reclaim.
    pub inflight_lease: f64,
    /// Requeue delay after a capability block; also the backoff base.
    pub blocked_retry_delay: f64,
    /// Upper bound of the receipt-wait backoff schedule.
    pub max_retry_delay: f64,
    /// Age past which an unresolvable envelope is dropped.
    pub stale_unresolved_after: f64,
    /// Retention of delivery dedupe records.
    pub dedupe_ttl: f64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            heartbeat_max_age: 30.0,
            inflight_lease: 60.0,
            blocked_retry_delay: 2.0,
            max_retry_delay: 60.0,
            stale_unresolved_after: 86_400.0,
            dedupe_ttl: 86_400.0,
        }
    }
}

/// Mutable routing overlays, loaded by the host and shared with the
/// dashboard's editing surfaces.
#[derive(Debug)]
pub struct Overlays {
    /// `{blocked_id → blocker_id}`; a delivery from the blocker clears it.
    pub dependencies: DependencyMap,
    /// `{display_name → 1..=5}`; a delivery to a paused agent unpauses it.
    pub priorities: PriorityMap,
    /// Promoted sub-hippeis, excluded from phalanx expansion.
    pub promoted: PromotionSet,
}

/// Counters for one drain pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Stale inflight envelopes returned to `new/`.
    pub reclaimed: usize,
    /// Inbox files written this pass.
    pub delivered: usize,
    /// Envelopes fully acknowledged and deleted.
    pub acked: usize,
    /// Envelopes requeued to wait for receipts or capability.
    pub requeued: usize,
    /// Envelopes left pending on a block or resolve failure.
    pub blocked: usize,
    /// Envelopes discarded (malformed or stale-unresolved).
    pub dropped: usize,
}

/// Drains the envelope store toward recipient inboxes.
pub struct Dispatcher<N: Notifier> {
    queue: EnvelopeStore,
    bus: BusStore,
    dedupe: DedupeLedger,
    policy: DispatchPolicy,
    notifier: N,
    // Last emitted block reason per envelope id; one notice per distinct
    // (envelope, reason) pair until the reason changes or the envelope
    // leaves the queue.
    notices: HashMap<String, String>,
}

impl<N: Notifier> Dispatcher<N> {
    /// Assemble a dispatcher over the given stores.
    pub fn new(
        queue: EnvelopeStore,
        bus: BusStore,
        dedupe: DedupeLedger,
        policy: DispatchPolicy,
        notifier: N,
    ) -> Self {
        Self {
            queue,
            bus,
            dedupe,
            policy,
            notifier,
            notices: HashMap::new(),
        }
    }

    /// One pass over the queue.
    ///
    /// Envelopes are visited oldest first; within one envelope,
    /// recipients in resolver order. Only per-envelope soft failures can
    /// occur; they are converted to notices and bounded retries, never a
    /// tick abort.
    pub fn drain(&mut self, fleet: &FleetSnapshot, overlays: &mut Overlays, now: f64) -> DrainOutcome {
        let mut outcome = DrainOutcome {
            reclaimed: self
                .queue
                .reclaim_stale_inflight(self.policy.inflight_lease, now),
            ..DrainOutcome::default()
        };
        self.dedupe.prune(now, self.policy.dedupe_ttl);

        for new_path in self.queue.list_new() {
            let Some(envelope) = EnvelopeStore::load(&new_path) else {
                let _ = fs::remove_file(&new_path);
                outcome.dropped += 1;
                continue;
            };

            if envelope.next_attempt_at > now {
                continue;
            }

            let recipients = match resolve_recipients(&envelope, fleet, &overlays.promoted) {
                Ok(recipients) => recipients,
                Err(err) => {
                    self.handle_unresolved(&new_path, &envelope, &err.to_string(), now, &mut outcome);
                    continue;
                }
            };

            let Some(inflight) = self.queue.claim(&new_path) else {
                // Another dispatcher claimed it first.
                continue;
            };
            let mut envelope = envelope;

            let mut block_reasons: Vec<String> = Vec::new();
            let mut awaiting_receipt = 0usize;

            for recipient in &recipients {
                match self.bus.receipt_disposition(recipient, &envelope.id) {
                    Some(ReceiptDisposition::Accepted) => {
                        self.dedupe.record(recipient, &envelope.id, now);
                        continue;
                    }
                    Some(ReceiptDisposition::Rejected) => {
                        warn!(
                            target: "zeus.dispatch",
                            recipient = %recipient,
                            id = %envelope.id,
                            "recipient rejected message"
                        );
                        self.dedupe.record(recipient, &envelope.id, now);
                        continue;
                    }
                    Some(ReceiptDisposition::Deferred) => {
                        awaiting_receipt += 1;
                        continue;
                    }
                    None => {}
                }

                if self
                    .dedupe
                    .has(recipient, &envelope.id, now, self.policy.dedupe_ttl)
                {
                    // Delivered on a prior pass; keep polling for the receipt.
                    awaiting_receipt += 1;
                    continue;
                }

                match self
                    .bus
                    .capability_health(recipient, self.policy.heartbeat_max_age, now)
                {
                    CapabilityHealth::Blocked(reason) => {
                        block_reasons.push(reason);
                        continue;
                    }
                    CapabilityHealth::Healthy => {}
                }

                let message = InboxMessage::from_envelope(&envelope, now);
                match self.bus.deliver(recipient, &message) {
                    Ok(_) => {
                        self.dedupe.record(recipient, &envelope.id, now);
                        self.apply_delivery_overlays(&envelope, recipient, fleet, overlays);
                        outcome.delivered += 1;
                        awaiting_receipt += 1;
                    }
                    Err(err) => block_reasons.push(err.to_string()),
                }
            }

            if !block_reasons.is_empty() {
                let reason = block_reasons.join("; ");
                self.notify_blocked(&envelope.id, &reason);
                let _ = self
                    .queue
                    .requeue(&inflight, &mut envelope, now, self.policy.blocked_retry_delay);
                outcome.blocked += 1;
            } else if awaiting_receipt == 0 {
                self.queue.ack(&inflight);
                self.notices.remove(&envelope.id);
                debug!(target: "zeus.dispatch", id = %envelope.id, "envelope acknowledged");
                outcome.acked += 1;
            } else {
                let delay = (self.policy.blocked_retry_delay * f64::from(envelope.attempts + 1))
                    .min(self.policy.max_retry_delay);
                let _ = self.queue.requeue(&inflight, &mut envelope, now, delay);
                outcome.requeued += 1;
            }
        }

        if let Err(err) = self.dedupe.flush() {
            warn!(target: "zeus.dispatch", %err, "failed to persist dedupe ledger");
        }
        outcome
    }

    fn handle_unresolved(
        &mut self,
        new_path: &std::path::Path,
        envelope: &Envelope,
        reason: &str,
        now: f64,
        outcome: &mut DrainOutcome,
    ) {
        if now - envelope.created_at > self.policy.stale_unresolved_after {
            self.notify_blocked(
                &envelope.id,
                &format!("{reason} (dropping stale envelope {})", envelope.id),
            );
            let _ = fs::remove_file(new_path);
            self.notices.remove(&envelope.id);
            outcome.dropped += 1;
            return;
        }

        self.notify_blocked(&envelope.id, reason);
        outcome.blocked += 1;
    }

    fn notify_blocked(&mut self, envelope_id: &str, reason: &str) {
        let known = self.notices.get(envelope_id).is_some_and(|last| last == reason);
        if known {
            return;
        }
        self.notices
            .insert(envelope_id.to_string(), reason.to_string());
        self.notifier.notify(&format!("Queue blocked: {reason}"));
    }

    fn apply_delivery_overlays(
        &self,
        envelope: &Envelope,
        recipient: &str,
        fleet: &FleetSnapshot,
        overlays: &mut Overlays,
    ) {
        // A message from the blocker releases the recipient's dependency.
        // The recipient stays paused in that case: the operator parked it,
        // and the blocker's message alone does not override that.
        let sender = envelope.source_agent_id.as_str();
        if !sender.is_empty() && overlays.dependencies.blocker_of(recipient) == Some(sender) {
            overlays.dependencies.clear(recipient);
            debug!(
                target: "zeus.dispatch",
                blocked = %recipient,
                blocker = %sender,
                "dependency released by delivery"
            );
            return;
        }

        if let Some(agent) = fleet.get(recipient) {
            if overlays.priorities.is_paused(&agent.name) {
                overlays.priorities.reset(&agent.name);
                debug!(
                    target: "zeus.dispatch",
                    recipient = %recipient,
                    name = %agent.name,
                    "paused recipient released by delivery"
                );
            }
        }
    }
}
