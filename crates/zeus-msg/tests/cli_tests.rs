// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the `zeus-msg` binary.

use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use tempfile::TempDir;

fn zeus_msg(state: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("zeus-msg").expect("binary `zeus-msg` should be built");
    cmd.env_clear()
        .env("ZEUS_STATE_DIR", state.path())
        .env("ZEUS_AGENT_ID", "sender-1")
        .env("ZEUS_AGENT_NAME", "env-sender")
        .env("ZEUS_ROLE", "hoplite")
        .env("ZEUS_PARENT_ID", "polemarch-1")
        .env("ZEUS_PHALANX_ID", "phalanx-polemarch-1");
    cmd
}

fn queued_envelopes(state: &TempDir) -> Vec<serde_json::Value> {
    let new_dir = state.path().join("queue/new");
    let Ok(entries) = fs::read_dir(&new_dir) else {
        return Vec::new();
    };
    let mut paths: Vec<_> = entries.map(|e| e.unwrap().path()).collect();
    paths.sort();
    paths
        .iter()
        .map(|p| serde_json::from_str(&fs::read_to_string(p).unwrap()).unwrap())
        .collect()
}

fn write_payload(state: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let tmp_dir = state.path().join("message-tmp");
    fs::create_dir_all(&tmp_dir).unwrap();
    let path = tmp_dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

// ── Help & version ──────────────────────────────────────────────────

#[test]
fn help_flag_prints_usage() {
    let state = tempfile::tempdir().unwrap();
    zeus_msg(&state)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Queue autonomous polemarch/hoplite messages"))
        .stdout(contains("send"));
}

#[test]
fn version_flag_prints_version() {
    let state = tempfile::tempdir().unwrap();
    zeus_msg(&state)
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

// ── send ────────────────────────────────────────────────────────────

#[test]
fn send_polemarch_from_file_enqueues() {
    let state = tempfile::tempdir().unwrap();
    let payload = write_payload(&state, "m.md", "hello\n");

    zeus_msg(&state)
        .args(["send", "--to", "polemarch", "--file"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(contains("ZEUS_MSG_ENQUEUED="));

    let envelopes = queued_envelopes(&state);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0]["target_kind"], "agent");
    assert_eq!(envelopes[0]["target_agent_id"], "polemarch-1");
    assert_eq!(envelopes[0]["source_agent_id"], "sender-1");
    assert_eq!(envelopes[0]["source_name"], "env-sender");
    assert_eq!(envelopes[0]["message"], "hello\n");
}

#[test]
fn send_phalanx_uses_owner_fallback() {
    let state = tempfile::tempdir().unwrap();

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("zeus-msg").unwrap();
    cmd.env_clear()
        .env("ZEUS_STATE_DIR", state.path())
        .env("ZEUS_AGENT_ID", "polemarch-1")
        .env("ZEUS_ROLE", "polemarch");

    cmd.args(["send", "--to", "phalanx", "--text", "status"])
        .assert()
        .success();

    let envelopes = queued_envelopes(&state);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0]["target_kind"], "phalanx");
    assert_eq!(envelopes[0]["target_ref"], "phalanx-polemarch-1");
    assert_eq!(envelopes[0]["target_owner_id"], "polemarch-1");
}

#[test]
fn send_rejects_payload_outside_tmp_dir() {
    let state = tempfile::tempdir().unwrap();
    let outside = state.path().join("outside.md");
    fs::write(&outside, "nope\n").unwrap();

    zeus_msg(&state)
        .args(["send", "--to", "agent:agent-2", "--file"])
        .arg(&outside)
        .assert()
        .failure()
        .stderr(contains("invalid --file path"));

    assert!(queued_envelopes(&state).is_empty());
}

#[test]
fn send_requires_agent_id() {
    let state = tempfile::tempdir().unwrap();

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("zeus-msg").unwrap();
    cmd.env_clear().env("ZEUS_STATE_DIR", state.path());

    cmd.args(["send", "--to", "agent:agent-2", "--text", "hi"])
        .assert()
        .failure()
        .stderr(contains("ZEUS_AGENT_ID is required"));

    assert!(queued_envelopes(&state).is_empty());
}

#[test]
fn send_rejects_multiple_payload_sources() {
    let state = tempfile::tempdir().unwrap();
    let payload = write_payload(&state, "m.md", "hello\n");

    zeus_msg(&state)
        .args(["send", "--to", "agent:agent-2", "--text", "also", "--file"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(contains("exactly one of"));

    assert!(queued_envelopes(&state).is_empty());
}

#[test]
fn send_reads_piped_stdin_by_default() {
    let state = tempfile::tempdir().unwrap();

    zeus_msg(&state)
        .args(["send", "--to", "agent:agent-2"])
        .write_stdin("pipe-default")
        .assert()
        .success();

    let envelopes = queued_envelopes(&state);
    assert_eq!(envelopes[0]["message"], "pipe-default");
}

#[test]
fn send_from_flag_overrides_env_name() {
    let state = tempfile::tempdir().unwrap();

    zeus_msg(&state)
        .args([
            "send",
            "--to",
            "agent:agent-2",
            "--text",
            "hello",
            "--from",
            "manual-sender",
        ])
        .assert()
        .success();

    let envelopes = queued_envelopes(&state);
    assert_eq!(envelopes[0]["source_name"], "manual-sender");
}

#[test]
fn send_rejects_blank_from() {
    let state = tempfile::tempdir().unwrap();

    zeus_msg(&state)
        .args(["send", "--to", "agent:agent-2", "--text", "hello", "--from", "   "])
        .assert()
        .failure()
        .stderr(contains("--from must not be blank"));

    assert!(queued_envelopes(&state).is_empty());
}

#[test]
fn send_rejects_ambiguous_display_name() {
    let state = tempfile::tempdir().unwrap();
    fs::create_dir_all(state.path()).unwrap();
    fs::write(
        state.path().join("fleet.json"),
        serde_json::to_vec(&serde_json::json!({"agents": [
            {"agent_id": "aaaa", "name": "worker"},
            {"agent_id": "bbbb", "name": "worker"},
        ]}))
        .unwrap(),
    )
    .unwrap();

    zeus_msg(&state)
        .args(["send", "--to", "worker", "--text", "ping"])
        .assert()
        .failure()
        .stderr(contains("ambiguous display name"));

    assert!(queued_envelopes(&state).is_empty());
}

#[test]
fn send_wait_delivery_times_out_but_keeps_envelope() {
    let state = tempfile::tempdir().unwrap();

    zeus_msg(&state)
        .args([
            "send",
            "--to",
            "agent:agent-2",
            "--text",
            "wait-me",
            "--wait-delivery",
            "--timeout",
            "0.05",
        ])
        .assert()
        .failure()
        .stdout(contains("ZEUS_MSG_ENQUEUED="))
        .stderr(contains("timed out waiting for delivery"));

    assert_eq!(queued_envelopes(&state).len(), 1);
}

#[test]
fn send_wait_delivery_confirms_when_acked() {
    let state = tempfile::tempdir().unwrap();
    let new_dir = state.path().join("queue/new");

    // Simulate a dispatcher: delete whatever lands in new/.
    let watcher_dir = new_dir.clone();
    let watcher = std::thread::spawn(move || {
        for _ in 0..100 {
            if let Ok(entries) = fs::read_dir(&watcher_dir) {
                let mut deleted = false;
                for entry in entries.flatten() {
                    if entry.path().extension().is_some_and(|e| e == "json") {
                        let _ = fs::remove_file(entry.path());
                        deleted = true;
                    }
                }
                if deleted {
                    return;
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    });

    zeus_msg(&state)
        .args([
            "send",
            "--to",
            "agent:agent-2",
            "--text",
            "ok",
            "--wait-delivery",
            "--timeout",
            "5",
        ])
        .assert()
        .success()
        .stdout(contains("ZEUS_MSG_ENQUEUED="))
        .stdout(contains("ZEUS_MSG_DELIVERED="));

    watcher.join().unwrap();
}

#[test]
fn send_empty_payload_is_rejected() {
    let state = tempfile::tempdir().unwrap();

    zeus_msg(&state)
        .args(["send", "--to", "agent:agent-2", "--text", "   "])
        .assert()
        .failure()
        .stderr(contains("message payload is empty"));

    assert!(queued_envelopes(&state).is_empty());
}
