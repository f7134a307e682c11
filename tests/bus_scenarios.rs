// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end bus scenarios: producer → queue → dispatcher → inbox →
//! receipt → ack, over a real state directory.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use zeus_bus::BusStore;
use zeus_core::{DeliveryMode, Envelope, TargetKind};
use zeus_dispatch::{
    DedupeLedger, DispatchPolicy, Dispatcher, MemoryNotifier, Overlays, SourceIdentity,
    enqueue_outbound,
};
use zeus_fleet::{AgentRole, DependencyMap, FleetAgent, FleetSnapshot, PriorityMap, PromotionSet};
use zeus_queue::EnvelopeStore;

struct World {
    dir: TempDir,
    queue: EnvelopeStore,
    bus: BusStore,
    notifier: MemoryNotifier,
}

impl World {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            queue: EnvelopeStore::new(dir.path().join("queue")),
            bus: BusStore::new(dir.path().join("bus")),
            notifier: MemoryNotifier::new(),
            dir,
        }
    }

    fn dispatcher(&self) -> Dispatcher<&MemoryNotifier> {
        Dispatcher::new(
            self.queue.clone(),
            self.bus.clone(),
            DedupeLedger::load(self.dir.path().join("receipts.json")),
            DispatchPolicy::default(),
            &self.notifier,
        )
    }

    fn overlays(&self) -> Overlays {
        Overlays {
            dependencies: DependencyMap::load(self.dir.path().join("dependencies.json")),
            priorities: PriorityMap::load(self.dir.path().join("priorities.json")),
            promoted: PromotionSet::load(self.dir.path().join("promoted.json")),
        }
    }

    fn fresh_capability(&self, agent_id: &str, now: f64) {
        zeus_bus::publish_capability(
            &self.bus,
            agent_id,
            &serde_json::json!({
                "agent_id": agent_id,
                "updated_at": now,
                "supports": {"queue_bus": true, "receipt_v1": true},
            }),
        )
        .unwrap();
    }

    fn accept(&self, agent_id: &str, message_id: &str) {
        let path = self.bus.receipt_path(agent_id, message_id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!({
                "id": message_id,
                "status": "accepted",
                "accepted_at": 1234.0,
                "agent_id": agent_id,
            }))
            .unwrap(),
        )
        .unwrap();
    }

    fn inbox_files(&self, agent_id: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.bus.inbox_new_dir(agent_id)) else {
            return Vec::new();
        };
        let mut files: Vec<_> = entries.map(|e| e.unwrap().path()).collect();
        files.sort();
        files
    }
}

fn polemarch_fleet() -> FleetSnapshot {
    let hoplite = |id: &str, name: &str| FleetAgent {
        agent_id: id.to_string(),
        name: name.to_string(),
        role: AgentRole::Hoplite,
        parent_id: "polemarch-1".to_string(),
        phalanx_id: "phalanx-polemarch-1".to_string(),
        backend: "tmux".to_string(),
        ..FleetAgent::default()
    };
    FleetSnapshot::from_agents(vec![
        FleetAgent {
            agent_id: "polemarch-1".to_string(),
            name: "polemarch".to_string(),
            role: AgentRole::Polemarch,
            backend: "kitty".to_string(),
            ..FleetAgent::default()
        },
        hoplite("hoplite-1", "hoplite-a"),
        hoplite("hoplite-2", "hoplite-b"),
    ])
}

fn polemarch_identity() -> SourceIdentity {
    SourceIdentity {
        name: "polemarch".into(),
        agent_id: "polemarch-1".into(),
        role: "polemarch".into(),
        parent_id: String::new(),
        phalanx_id: String::new(),
    }
}

// Scenario 1: phalanx fan-out with waiting receipts.
#[test]
fn phalanx_fan_out_with_waiting_receipts() {
    let world = World::new();
    let fleet = polemarch_fleet();
    world.fresh_capability("hoplite-1", 100.0);
    world.fresh_capability("hoplite-2", 100.0);

    let envelope = enqueue_outbound(
        &world.queue,
        "phalanx",
        "hello",
        &polemarch_identity(),
        DeliveryMode::FollowUp,
        &fleet,
        100.0,
    )
    .unwrap();
    assert_eq!(envelope.target_kind, TargetKind::Phalanx);

    let mut dispatcher = world.dispatcher();
    let mut overlays = world.overlays();
    dispatcher.drain(&fleet, &mut overlays, 100.0);

    let files_1 = world.inbox_files("hoplite-1");
    let files_2 = world.inbox_files("hoplite-2");
    assert_eq!(files_1.len(), 1);
    assert_eq!(files_2.len(), 1);
    for file in [&files_1[0], &files_2[0]] {
        let payload: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(payload["message"], "hello");
        assert_eq!(payload["id"], serde_json::json!(envelope.id));
    }

    // Envelope survives until both receipts land.
    let pending = world.queue.list_new().len() + world.queue.list_inflight().len();
    assert_eq!(pending, 1);

    world.accept("hoplite-1", &envelope.id);
    world.accept("hoplite-2", &envelope.id);
    dispatcher.drain(&fleet, &mut overlays, 110.0);

    assert!(world.queue.list_new().is_empty());
    assert!(world.queue.list_inflight().is_empty());
}

// Scenario 2: a hoplite without a routable id blocks, one notice.
#[test]
fn missing_hoplite_id_blocks_with_single_notice() {
    let world = World::new();
    let fleet = FleetSnapshot::from_agents(vec![FleetAgent {
        agent_id: String::new(),
        name: "hoplite-x".to_string(),
        role: AgentRole::Hoplite,
        parent_id: "polemarch-1".to_string(),
        phalanx_id: "phalanx-polemarch-1".to_string(),
        backend: "tmux".to_string(),
        authoritative_id: false,
        ..FleetAgent::default()
    }]);

    enqueue_outbound(
        &world.queue,
        "phalanx",
        "fallback",
        &polemarch_identity(),
        DeliveryMode::FollowUp,
        &fleet,
        100.0,
    )
    .unwrap();

    let mut dispatcher = world.dispatcher();
    let mut overlays = world.overlays();
    dispatcher.drain(&fleet, &mut overlays, 100.0);
    dispatcher.drain(&fleet, &mut overlays, 102.0);

    let notices = world.notifier.messages();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("missing @zeus_agent id"));
    assert!(world.inbox_files("hoplite-x").is_empty());
    assert_eq!(world.queue.list_new().len(), 1);
}

// Scenario 3: stale unresolved envelopes are dropped with a final notice.
#[test]
fn stale_unresolved_is_dropped_after_threshold() {
    let world = World::new();

    let mut envelope = Envelope::builder("source", "payload")
        .source_agent_id("agent-source")
        .target(TargetKind::Hoplite, "unknown-hoplite")
        .target_owner_id("polemarch-1")
        .build(1.0);
    envelope.created_at = 1.0;
    world.queue.enqueue(&envelope).unwrap();

    let mut dispatcher = world.dispatcher();
    let mut overlays = world.overlays();
    dispatcher.drain(&FleetSnapshot::default(), &mut overlays, 200_000.0);

    assert!(world.queue.list_new().is_empty());
    assert!(world.queue.list_inflight().is_empty());
    assert!(!world.notifier.messages().is_empty());
}

// Scenario 4: missing capability defers briefly, then delivers.
#[test]
fn capability_missing_defers_then_delivers_on_heartbeat() {
    let world = World::new();
    let fleet = FleetSnapshot::from_agents(vec![FleetAgent {
        agent_id: "agent-target".to_string(),
        name: "target".to_string(),
        ..FleetAgent::default()
    }]);

    let envelope = Envelope::builder("source", "wake-up")
        .source_agent_id("agent-source")
        .target(TargetKind::Agent, "agent-target")
        .build(100.0);
    world.queue.enqueue(&envelope).unwrap();

    let mut dispatcher = world.dispatcher();
    let mut overlays = world.overlays();
    dispatcher.drain(&fleet, &mut overlays, 100.0);

    let queued = world.queue.list_new();
    assert_eq!(queued.len(), 1);
    let deferred = EnvelopeStore::load(&queued[0]).unwrap();
    assert_eq!(deferred.next_attempt_at, 102.0);
    assert!(world.inbox_files("agent-target").is_empty());

    world.fresh_capability("agent-target", 101.5);
    dispatcher.drain(&fleet, &mut overlays, 102.0);
    assert_eq!(world.inbox_files("agent-target").len(), 1);
}

// Scenario 5: a delivery to a paused agent unpauses it.
#[test]
fn send_to_paused_agent_unpauses() {
    let world = World::new();
    let fleet = FleetSnapshot::from_agents(vec![FleetAgent {
        agent_id: "agent-target".to_string(),
        name: "target".to_string(),
        ..FleetAgent::default()
    }]);
    world.fresh_capability("agent-target", 100.0);

    let mut overlays = world.overlays();
    overlays.priorities.set("target", 4).unwrap();

    let envelope = Envelope::builder("source", "wake-up")
        .source_agent_id("agent-source")
        .target(TargetKind::Agent, "agent-target")
        .build(100.0);
    world.queue.enqueue(&envelope).unwrap();

    let mut dispatcher = world.dispatcher();
    dispatcher.drain(&fleet, &mut overlays, 100.0);

    assert_eq!(world.inbox_files("agent-target").len(), 1);
    assert_eq!(overlays.priorities.get("target"), 3);
}

// Scenario 6: duplicate envelope ids deliver at most once per recipient.
#[test]
fn duplicate_envelope_id_delivers_at_most_once() {
    let world = World::new();
    let fleet = FleetSnapshot::from_agents(vec![FleetAgent {
        agent_id: "agent-target".to_string(),
        name: "target".to_string(),
        ..FleetAgent::default()
    }]);
    world.fresh_capability("agent-target", 100.0);

    let mut first = Envelope::builder("source", "hello")
        .source_agent_id("agent-source")
        .target(TargetKind::Agent, "agent-target")
        .build(100.0);
    first.id = "msg-dup".to_string();
    world.queue.enqueue(&first).unwrap();

    let mut second = Envelope::builder("source", "hello")
        .source_agent_id("agent-source")
        .target(TargetKind::Agent, "agent-target")
        .build(101.0);
    second.id = "msg-dup".to_string();
    world.queue.enqueue(&second).unwrap();

    let mut dispatcher = world.dispatcher();
    let mut overlays = world.overlays();
    dispatcher.drain(&fleet, &mut overlays, 101.0);
    world.accept("agent-target", "msg-dup");
    dispatcher.drain(&fleet, &mut overlays, 104.0);
    dispatcher.drain(&fleet, &mut overlays, 108.0);

    assert_eq!(world.inbox_files("agent-target").len(), 1);
    assert!(world.queue.list_new().is_empty());
    assert!(world.queue.list_inflight().is_empty());
}

// Crash recovery: a stale inflight envelope is reclaimed and completed.
#[test]
fn stale_inflight_is_reclaimed_and_completed() {
    let world = World::new();
    let fleet = FleetSnapshot::from_agents(vec![FleetAgent {
        agent_id: "agent-target".to_string(),
        name: "target".to_string(),
        ..FleetAgent::default()
    }]);
    world.fresh_capability("agent-target", 300.0);

    let mut envelope = Envelope::builder("source", "hello")
        .source_agent_id("agent-source")
        .target(TargetKind::Agent, "agent-target")
        .build(100.0);
    envelope.updated_at = 100.0;
    let queued = world.queue.enqueue(&envelope).unwrap();

    // A dispatcher claimed it and crashed.
    world.queue.claim(&queued).unwrap();
    assert_eq!(world.queue.list_inflight().len(), 1);

    let mut dispatcher = world.dispatcher();
    let mut overlays = world.overlays();
    // Past the 60 s lease: reclaimed and delivered in the same pass.
    let outcome = dispatcher.drain(&fleet, &mut overlays, 300.0);
    assert_eq!(outcome.reclaimed, 1);
    assert_eq!(world.inbox_files("agent-target").len(), 1);

    world.accept("agent-target", &envelope.id);
    dispatcher.drain(&fleet, &mut overlays, 305.0);
    assert!(world.queue.list_new().is_empty());
    assert!(world.queue.list_inflight().is_empty());
}
