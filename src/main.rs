//! gesture-stage - hand gesture recognition driving a broadcast display.
//!
//! Landmark frames and pre-classified gestures come in, a debounced display
//! mode state machine runs on a single event loop, and a ~30 Hz snapshot
//! goes out to every connected viewer.

mod broadcast;
pub mod ipc;
mod producer;
mod runner;
mod session;
mod state;
pub mod tracking;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::broadcast::BroadcastConfig;
use crate::ipc::ServerConfig;
use crate::producer::ReplaySource;
use crate::runner::RunConfig;
use crate::session::ModeConfig;
use crate::state::StageConfig;

#[derive(Parser, Debug)]
#[command(name = "gesture-stage", about = "Gesture-driven display mode broadcaster")]
struct Cli {
    /// Address viewers connect to
    #[arg(long, default_value = "0.0.0.0:5000")]
    listen: SocketAddr,

    /// Broadcast period in milliseconds
    #[arg(long, default_value_t = 33)]
    tick_ms: u64,

    /// Minimum time between mode changes in milliseconds
    #[arg(long, default_value_t = 500)]
    cooldown_ms: u64,

    /// Time between autoplay photo advances in milliseconds
    #[arg(long, default_value_t = 2500)]
    autoplay_interval_ms: u64,

    /// Gesture smoothing window length
    #[arg(long, default_value_t = 5)]
    history: usize,

    /// Occurrences in the window needed to confirm a gesture
    #[arg(long, default_value_t = 3)]
    confirm_count: usize,

    /// Smooth network gesture labels like landmark-derived ones
    #[arg(long)]
    smooth_network_input: bool,

    /// JSON-lines landmark recording to replay
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay frame rate
    #[arg(long, default_value_t = 30.0)]
    replay_fps: f64,

    /// Restart the replay at end of file
    #[arg(long)]
    replay_loop: bool,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Log all viewer messages
    #[arg(long)]
    ipc_trace: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    /// Reject settings under which no smoothed gesture could ever confirm.
    fn validate(&self) -> anyhow::Result<()> {
        let window = self.history.max(1);
        if self.confirm_count > window {
            anyhow::bail!(
                "--confirm-count {} exceeds --history {}; no gesture could ever be confirmed",
                self.confirm_count,
                window
            );
        }
        Ok(())
    }

    fn run_config(&self) -> RunConfig {
        RunConfig {
            stage: StageConfig {
                mode: ModeConfig {
                    cooldown: Duration::from_millis(self.cooldown_ms),
                    confirm_count: self.confirm_count,
                },
                broadcast: BroadcastConfig {
                    tick: Duration::from_millis(self.tick_ms.max(1)),
                    autoplay_interval: Duration::from_millis(self.autoplay_interval_ms),
                },
                history: self.history,
                smooth_network_input: self.smooth_network_input,
                ..StageConfig::default()
            },
            server: ServerConfig {
                listen: self.listen,
                trace: self.ipc_trace,
            },
            replay: self
                .replay
                .as_ref()
                .map(|path| ReplaySource::new(path, self.replay_fps, self.replay_loop)),
            exit_after: self.exit_after.map(Duration::from_secs),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("gesture-stage {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    cli.validate()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesture_stage=info".into()),
        )
        .init();

    info!("gesture-stage v{} starting", env!("CARGO_PKG_VERSION"));
    info!(listen = %cli.listen, "viewer address");

    runner::run(cli.run_config())
}
