// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use zeus_bus::BusStore;
use zeus_config::ZeusConfig;
use zeus_dispatch::{
    DedupeLedger, DesktopNotifier, DispatchPolicy, Dispatcher, Notifier, NullNotifier, Overlays,
};
use zeus_fleet::{DependencyMap, FleetSnapshot, PriorityMap, PromotionSet};
use zeus_queue::EnvelopeStore;

#[derive(Parser, Debug)]
#[command(name = "zeus-daemon", version, about = "Zeus message bus dispatcher daemon")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// State directory override (also settable via ZEUS_STATE_DIR).
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Tick interval override in seconds.
    #[arg(long)]
    tick: Option<f64>,

    /// Suppress desktop notifications.
    #[arg(long)]
    no_notify: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("zeus=debug")
    } else {
        EnvFilter::new("zeus=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ZeusConfig::load(args.config.as_deref()).context("load config")?;
    if let Some(state_dir) = args.state_dir {
        config.session_map_dir = state_dir.clone();
        config.message_tmp_dir = state_dir.join("message-tmp");
        config.state_dir = state_dir;
    }
    if let Some(tick) = args.tick {
        if tick.is_finite() && tick > 0.0 {
            config.tick_interval = tick;
        }
    }

    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("create state dir {}", config.state_dir.display()))?;
    std::fs::create_dir_all(&config.message_tmp_dir)
        .with_context(|| format!("create message tmp dir {}", config.message_tmp_dir.display()))?;

    let queue = EnvelopeStore::new(config.queue_dir());
    queue.ensure_dirs().context("create queue dirs")?;

    info!(
        state_dir = %config.state_dir.display(),
        tick = config.tick_interval,
        "zeus-daemon dispatching"
    );

    if args.no_notify {
        run_loop(&config, queue, NullNotifier).await
    } else {
        run_loop(&config, queue, DesktopNotifier).await
    }
}

async fn run_loop<N: Notifier>(config: &ZeusConfig, queue: EnvelopeStore, notifier: N) -> Result<()> {
    let bus = BusStore::new(config.bus_dir());
    let policy = DispatchPolicy {
        heartbeat_max_age: config.heartbeat_max_age,
        inflight_lease: config.inflight_lease,
        blocked_retry_delay: config.blocked_retry_delay,
        max_retry_delay: config.max_retry_delay,
        stale_unresolved_after: config.stale_unresolved_after,
        dedupe_ttl: config.dedupe_ttl,
    };
    let dedupe = DedupeLedger::load(config.receipts_file());
    let mut dispatcher = Dispatcher::new(queue, bus, dedupe, policy, notifier);

    let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(
        config.tick_interval.max(0.05),
    ));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Other processes (the dashboard, the CLI) mutate the
                // overlays between ticks; reload them fresh each pass.
                let mut overlays = Overlays {
                    dependencies: DependencyMap::load(config.dependencies_file()),
                    priorities: PriorityMap::load(config.priorities_file()),
                    promoted: PromotionSet::load(config.promoted_file()),
                };
                let fleet = FleetSnapshot::load_or_empty(&config.fleet_file());
                let now = zeus_core::epoch_now();

                let outcome = dispatcher.drain(&fleet, &mut overlays, now);
                if outcome != zeus_dispatch::DrainOutcome::default() {
                    debug!(
                        target: "zeus.daemon",
                        reclaimed = outcome.reclaimed,
                        delivered = outcome.delivered,
                        acked = outcome.acked,
                        requeued = outcome.requeued,
                        blocked = outcome.blocked,
                        dropped = outcome.dropped,
                        "drain pass"
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("wait for ctrl-c")?;
                info!("zeus-daemon shutting down");
                return Ok(());
            }
        }
    }
}
