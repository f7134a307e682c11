// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `send` subcommand: payload sourcing, confinement, enqueue, and the
//! optional delivery wait.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;
use zeus_bus::BusStore;
use zeus_config::ZeusConfig;
use zeus_core::{DeliveryMode, Envelope, TargetKind};
use zeus_dispatch::{ProduceError, SourceIdentity, enqueue_outbound};
use zeus_fleet::FleetSnapshot;
use zeus_queue::EnvelopeStore;

/// Parsed `send` arguments.
#[derive(Clone, Debug, Default)]
pub struct SendArgs {
    /// Symbolic target: `polemarch` | `phalanx` | `hoplite:<id>` |
    /// `agent:<id>` | display name.
    pub to: String,
    /// Payload file, confined to the message tmp dir.
    pub file: Option<PathBuf>,
    /// Inline payload text.
    pub text: Option<String>,
    /// Read the payload from stdin explicitly.
    pub stdin: bool,
    /// Sender display name override.
    pub from_sender: Option<String>,
    /// Block until the dispatcher confirms delivery.
    pub wait_delivery: bool,
    /// Seconds to wait when `wait_delivery` is set.
    pub timeout: f64,
}

/// Successful send outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReport {
    /// Id of the enqueued envelope.
    pub envelope_id: String,
    /// Whether delivery was confirmed (always `false` without
    /// `wait_delivery`).
    pub delivered: bool,
}

/// Errors from the `send` subcommand; each maps to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// More than one of `--file` / `--text` / `--stdin` was given.
    #[error("use exactly one of --file, --text, or --stdin")]
    MultiplePayloadSources,

    /// `--from` was supplied but blank.
    #[error("--from must not be blank")]
    BlankFrom,

    /// The `--file` payload escapes the confinement root.
    #[error("invalid --file path (must be readable under {root})")]
    PayloadConfinement {
        /// The allowed root directory.
        root: String,
    },

    /// The payload could not be read.
    #[error("cannot read payload: {source}")]
    PayloadUnreadable {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// `--wait-delivery` elapsed without confirmation.
    #[error("timed out waiting for delivery of {id}")]
    DeliveryTimeout {
        /// Envelope id still queued.
        id: String,
    },

    /// Validation or persistence failure from the producer layer.
    #[error(transparent)]
    Produce(#[from] ProduceError),
}

/// Run `send` with identity taken from the process environment and the
/// payload read from `stdin` when no other source is given.
///
/// # Errors
///
/// Returns [`SendError`] on any validation, I/O, or timeout failure.
pub fn run(
    config: &ZeusConfig,
    args: &SendArgs,
    stdin: &mut dyn Read,
) -> Result<SendReport, SendError> {
    let identity = SourceIdentity::from_env()?;
    send_with_identity(config, args, identity, stdin)
}

/// Run `send` with an explicit identity (test seam).
///
/// # Errors
///
/// Returns [`SendError`] on any validation, I/O, or timeout failure.
pub fn send_with_identity(
    config: &ZeusConfig,
    args: &SendArgs,
    mut identity: SourceIdentity,
    stdin: &mut dyn Read,
) -> Result<SendReport, SendError> {
    if let Some(from) = &args.from_sender {
        let from = from.trim();
        if from.is_empty() {
            return Err(SendError::BlankFrom);
        }
        identity.name = from.to_string();
    }

    let payload = read_payload(config, args, stdin)?;

    let queue = EnvelopeStore::new(config.queue_dir());
    let fleet = FleetSnapshot::load_or_empty(&config.fleet_file());
    let envelope = enqueue_outbound(
        &queue,
        &args.to,
        &payload,
        &identity,
        DeliveryMode::FollowUp,
        &fleet,
        zeus_core::epoch_now(),
    )?;
    debug!(target: "zeus.msg", id = %envelope.id, to = %args.to, "enqueued");

    if !args.wait_delivery {
        return Ok(SendReport {
            envelope_id: envelope.id,
            delivered: false,
        });
    }

    let bus = BusStore::new(config.bus_dir());
    if wait_for_delivery(&queue, &bus, &envelope, args.timeout) {
        Ok(SendReport {
            envelope_id: envelope.id,
            delivered: true,
        })
    } else {
        Err(SendError::DeliveryTimeout { id: envelope.id })
    }
}

fn read_payload(
    config: &ZeusConfig,
    args: &SendArgs,
    stdin: &mut dyn Read,
) -> Result<String, SendError> {
    let explicit =
        usize::from(args.file.is_some()) + usize::from(args.text.is_some()) + usize::from(args.stdin);
    if explicit > 1 {
        return Err(SendError::MultiplePayloadSources);
    }

    if let Some(path) = &args.file {
        return read_confined(path, &config.message_tmp_dir);
    }
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }

    // Explicit --stdin, or the implicit piped default.
    let mut payload = String::new();
    stdin
        .read_to_string(&mut payload)
        .map_err(|source| SendError::PayloadUnreadable { source })?;
    Ok(payload)
}

/// Read a payload file, rejecting anything that does not resolve strictly
/// inside `allowed_root` after symlink and `..` normalization.
fn read_confined(path: &Path, allowed_root: &Path) -> Result<String, SendError> {
    let confinement = || SendError::PayloadConfinement {
        root: allowed_root.display().to_string(),
    };

    let root = std::fs::canonicalize(allowed_root).map_err(|_| confinement())?;
    let resolved = std::fs::canonicalize(path).map_err(|_| confinement())?;
    if !resolved.starts_with(&root) || resolved == root {
        return Err(confinement());
    }
    if !resolved.is_file() {
        return Err(confinement());
    }

    std::fs::read_to_string(&resolved).map_err(|source| SendError::PayloadUnreadable { source })
}

/// Poll until the envelope is confirmed delivered or `timeout` elapses.
///
/// Delivery is confirmed by the envelope leaving both queue directories,
/// or — for single-agent targets — by an acceptance receipt, whichever
/// comes first. The receipt path covers dispatchers fast enough to ack
/// before this process can observe the transient `inflight/` rename.
fn wait_for_delivery(
    queue: &EnvelopeStore,
    bus: &BusStore,
    envelope: &Envelope,
    timeout: f64,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs_f64(timeout.max(0.0));
    let file_name = envelope.file_name();

    loop {
        let in_new = queue.new_dir().join(&file_name).exists();
        let in_inflight = queue.inflight_dir().join(&file_name).exists();
        if !in_new && !in_inflight {
            return true;
        }

        if envelope.target_kind == TargetKind::Agent
            && !envelope.target_agent_id.is_empty()
            && bus.has_accepted_receipt(&envelope.target_agent_id, &envelope.id)
        {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
