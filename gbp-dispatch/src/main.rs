//! Playback dispatcher driver (gbp-dispatch) - Main entry point
//!
//! Runs a scripted command sequence against simulated players through the
//! dispatcher, the way a browser scripting bridge would: each player gets
//! its own caller thread, every player is torn down with a waited quit,
//! and the process-wide shutdown joins all workers before exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gbp_common::{PlaybackState, PlayerListener};
use gbp_dispatch::player::PlayerCall;
use gbp_dispatch::{CommandKind, DispatchConfig, Dispatcher, PushStatus, SimulatedPlayer, WorkerMode};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for gbp-dispatch
#[derive(Parser, Debug)]
#[command(name = "gbp-dispatch")]
#[command(about = "Drive simulated players through the playback command dispatcher")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "GBP_CONFIG")]
    config: Option<PathBuf>,

    /// Worker mode override (dedicated or pooled)
    #[arg(short, long, env = "GBP_MODE")]
    mode: Option<WorkerMode>,

    /// Number of simulated players
    #[arg(short, long, default_value_t = 2)]
    players: usize,

    /// Comma-separated command script pushed to every player
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_values_t = [CommandKind::Start, CommandKind::Pause, CommandKind::Start]
    )]
    script: Vec<CommandKind>,

    /// Simulated pipeline transition latency
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,

    /// Print the trace as JSON
    #[arg(long)]
    json: bool,
}

/// Logs player events the way a script error/state handler would see them
struct LogListener;

impl PlayerListener for LogListener {
    fn on_state_change(&self, player: &str, old: PlaybackState, new: PlaybackState) {
        info!("{}: state {} -> {}", player, old, new);
    }

    fn on_error(&self, player: &str, message: &str, detail: Option<&str>) {
        error!("{}: {} ({})", player, message, detail.unwrap_or("no debug info"));
    }

    fn on_eos(&self, player: &str) {
        info!("{}: end of stream", player);
    }
}

#[derive(Serialize)]
struct PlayerTrace {
    player: String,
    calls: Vec<PlayerCall>,
    final_state: PlaybackState,
    teardown: PushStatus,
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let mut config =
        DispatchConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gbp_dispatch={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting gbp-dispatch: {} players, {} workers, script {:?}",
        args.players, config.mode, args.script
    );

    let dispatcher = Dispatcher::init(config).context("Failed to initialize dispatcher")?;
    let latency = Duration::from_millis(args.latency_ms);
    let listener: Arc<dyn PlayerListener> = Arc::new(LogListener);

    let mut instances = Vec::with_capacity(args.players);
    for i in 0..args.players {
        let player = Arc::new(SimulatedPlayer::with_latency(format!("player-{}", i), latency));
        player.listeners().add(Arc::clone(&listener));
        let target = dispatcher.register(player.clone());
        dispatcher
            .start_worker(&target)
            .with_context(|| format!("Failed to start worker for player-{}", i))?;
        instances.push((player, target));
    }

    // One caller thread per player, like independent script contexts
    std::thread::scope(|scope| {
        for (_, target) in &instances {
            let dispatcher = &dispatcher;
            let script = &args.script;
            scope.spawn(move || {
                for kind in script {
                    dispatcher.push(target, *kind, None, false);
                }
            });
        }
    });

    let mut traces = Vec::with_capacity(instances.len());
    for (player, target) in &instances {
        let teardown = dispatcher.stop_worker(target);
        traces.push(PlayerTrace {
            player: target.name().to_string(),
            calls: player.calls(),
            final_state: player.state(),
            teardown,
        });
    }
    drop(instances);

    let report = dispatcher.shutdown().context("Dispatcher shutdown failed")?;
    info!(
        "Shutdown complete: {} dedicated workers joined, {} pool threads joined",
        report.joined_workers, report.pool_threads
    );

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&traces).context("Failed to serialize trace")?
        );
    } else {
        for trace in &traces {
            let calls: Vec<String> = trace.calls.iter().map(|c| format!("{:?}", c)).collect();
            println!(
                "{}: [{}] -> {} (teardown: {:?})",
                trace.player,
                calls.join(", "),
                trace.final_state,
                trace.teardown
            );
        }
    }

    Ok(())
}
