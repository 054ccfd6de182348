//! Event loop driver.
//!
//! Owns the calloop `EventLoop<StageState>`, wires the listener, the
//! broadcast timer and the producer channel into it, and runs until a
//! shutdown signal or the optional exit deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::channel::Event;
use calloop::EventLoop;
use tracing::{debug, info};

use crate::broadcast;
use crate::ipc::{ServerConfig, ViewerServer};
use crate::producer::{self, ProducerEvent, ReplaySource};
use crate::state::{StageConfig, StageState};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// How long one loop dispatch may block.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Process-level settings.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub stage: StageConfig,
    pub server: ServerConfig,
    /// Landmark recording to replay, if any.
    pub replay: Option<ReplaySource>,
    /// Exit after this long.
    pub exit_after: Option<Duration>,
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Route one producer event into the stage.
fn handle_producer_event(state: &mut StageState, event: ProducerEvent, now: Instant) {
    match event {
        ProducerEvent::Landmarks(frame) => {
            state.handle_landmark_frame(&frame, now);
        }
        ProducerEvent::Gesture(input) => {
            let transition = state.handle_gesture_input(&input, now);
            debug!(gesture = input.label().as_str(), ?transition, "replayed gesture");
        }
    }
}

/// Run the stage until shutdown.
pub fn run(config: RunConfig) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<StageState>::try_new()?;
    let handle = event_loop.handle();

    let tick = config.stage.broadcast.tick;
    let mut state = StageState::new(StageConfig {
        trace: config.server.trace,
        ..config.stage
    });

    let local = ViewerServer::bind(config.server.listen, &handle)?;
    broadcast::register(&handle, tick)?;

    if let Some(source) = config.replay {
        let channel = producer::spawn_landmark_source(source)?;
        handle
            .insert_source(channel, |event, _, state| match event {
                Event::Msg(event) => handle_producer_event(state, event, Instant::now()),
                Event::Closed => info!("landmark producer finished"),
            })
            .map_err(|e| e.error)?;
    }

    install_signal_handlers();

    let start_time = Instant::now();
    let mut last_status_log = Instant::now();

    info!(
        %local,
        tick_ms = tick.as_millis() as u64,
        history = state.smoother.capacity(),
        confirm = state.session.config.confirm_count,
        "gesture stage initialized, entering event loop"
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            state.running = false;
            break;
        }

        if let Some(dur) = config.exit_after {
            if start_time.elapsed() >= dur {
                info!("exit timer fired after {}s", dur.as_secs());
                state.running = false;
                break;
            }
        }

        if last_status_log.elapsed() >= STATUS_INTERVAL {
            info!(
                viewers = state.viewers.len(),
                mode = state.session.mode().as_str(),
                photo_index = state.session.photo_index(),
                "status"
            );
            last_status_log = Instant::now();
        }

        ViewerServer::poll_viewers(&mut state, Instant::now());

        event_loop.dispatch(Some(POLL_INTERVAL), &mut state)?;
    }

    info!(
        viewers = state.viewers.len(),
        photo_index = state.session.photo_index(),
        "gesture stage shutting down"
    );
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────
