//! Broadcast loop: advance autoplay and push the snapshot to every viewer
//! at a fixed cadence.

use std::time::{Duration, Instant};

use calloop::timer::{TimeoutAction, Timer};
use calloop::LoopHandle;
use tracing::debug;

use crate::ipc::dispatch;
use crate::state::StageState;

/// Broadcast tuning.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Time between broadcasts (~30 Hz).
    pub tick: Duration,
    /// Time between autoplay photo advances.
    pub autoplay_interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(33),
            autoplay_interval: Duration::from_millis(2500),
        }
    }
}

/// One broadcast tick.  Returns how many viewers the snapshot was queued for.
pub fn tick(state: &mut StageState, now: Instant) -> usize {
    let interval = state.broadcast.autoplay_interval;
    if state.session.advance_autoplay(interval, now) {
        debug!(photo_index = state.session.photo_index(), "autoplay advance");
    }

    if state.viewers.is_empty() {
        return 0;
    }
    match dispatch::snapshot_message(state) {
        Some(payload) => state.viewers.broadcast(&payload),
        None => 0,
    }
}

/// Register the periodic broadcast timer with the event loop.
pub fn register(loop_handle: &LoopHandle<'static, StageState>, period: Duration) -> anyhow::Result<()> {
    let timer = Timer::from_duration(period);
    loop_handle
        .insert_source(timer, move |_deadline, _, state| {
            tick(state, Instant::now());
            TimeoutAction::ToDuration(period)
        })
        .map_err(|e| e.error)?;
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────
