//! Session state and the display-mode state machine.
//!
//! `SessionState` is the single record of system truth that viewers see.
//! Transitions are gated by a cooldown; every operation takes `now`
//! explicitly so callers (and tests) control the clock.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::tracking::GestureLabel;

// ── Modes ──────────────────────────────────────────────────

/// What the display is currently showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayMode {
    #[default]
    Tree,
    Scatter,
    /// Pulse mode entered on every accepted pinch.
    Next,
    Heart,
    Autoplay,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tree => "TREE",
            Self::Scatter => "SCATTER",
            Self::Next => "NEXT",
            Self::Heart => "HEART",
            Self::Autoplay => "AUTOPLAY",
        }
    }

    /// Mode a gesture switches to, if any.
    pub fn for_gesture(gesture: GestureLabel) -> Option<Self> {
        match gesture {
            GestureLabel::Fist => Some(Self::Tree),
            GestureLabel::Open => Some(Self::Scatter),
            GestureLabel::Pinch => Some(Self::Next),
            GestureLabel::Peace => Some(Self::Heart),
            GestureLabel::ThumbsUp => Some(Self::Autoplay),
            GestureLabel::None => None,
        }
    }
}

// ── Hand position ──────────────────────────────────────────

/// Normalized hand center as shown to viewers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HandPosition {
    pub x: f32,
    pub y: f32,
    pub detected: bool,
}

// ── Config ─────────────────────────────────────────────────

/// Mode state machine tuning.
#[derive(Debug, Clone)]
pub struct ModeConfig {
    /// Minimum time between accepted mode changes.
    pub cooldown: Duration,
    /// Times the dominant label must appear in the smoothing window
    /// before it may drive a transition.
    pub confirm_count: usize,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(500),
            confirm_count: 3,
        }
    }
}

// ── Snapshot ───────────────────────────────────────────────

/// The outward view of the session, sent to viewers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub gesture: GestureLabel,
    pub mode: DisplayMode,
    pub hand: HandPosition,
    pub photo_index: u64,
    pub auto_play: bool,
}

// ── State ──────────────────────────────────────────────────

/// Outcome of offering a gesture to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Mode changed (or pulsed) to the given mode.
    Accepted(DisplayMode),
    /// Cooldown has not elapsed.
    CoolingDown,
    /// Gesture does not map to a mode, or was not confirmed.
    Ignored,
}

/// Shared session record.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub config: ModeConfig,
    /// Gesture currently shown to viewers.
    pub gesture: GestureLabel,
    mode: DisplayMode,
    pub hand: HandPosition,
    photo_index: u64,
    /// Instant of the last accepted transition.
    last_mode_change: Option<Instant>,
    /// Instant of the last autoplay advance (or autoplay start).
    last_autoplay_advance: Option<Instant>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(ModeConfig::default())
    }
}

impl SessionState {
    pub fn new(config: ModeConfig) -> Self {
        Self {
            config,
            gesture: GestureLabel::None,
            mode: DisplayMode::Tree,
            hand: HandPosition::default(),
            photo_index: 0,
            last_mode_change: None,
            last_autoplay_advance: None,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn photo_index(&self) -> u64 {
        self.photo_index
    }

    /// Autoplay is on exactly when the mode is `AUTOPLAY`.
    pub fn autoplay_active(&self) -> bool {
        self.mode == DisplayMode::Autoplay
    }

    pub fn last_mode_change(&self) -> Option<Instant> {
        self.last_mode_change
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_mode_change
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.cooldown)
    }

    /// Offer a raw gesture, guarded only by the cooldown.
    pub fn apply_gesture(&mut self, gesture: GestureLabel, now: Instant) -> Transition {
        let Some(target) = DisplayMode::for_gesture(gesture) else {
            return Transition::Ignored;
        };
        if !self.cooldown_elapsed(now) {
            return Transition::CoolingDown;
        }
        self.enter(target, now);
        Transition::Accepted(target)
    }

    /// Offer a smoothed gesture.  `occurrences` is how often it appears in
    /// the smoothing window.  Non-pinch gestures that would re-enter the
    /// current mode are ignored without touching the cooldown.
    pub fn apply_confirmed(
        &mut self,
        gesture: GestureLabel,
        occurrences: usize,
        now: Instant,
    ) -> Transition {
        let Some(target) = DisplayMode::for_gesture(gesture) else {
            return Transition::Ignored;
        };
        if occurrences < self.config.confirm_count {
            return Transition::Ignored;
        }
        if gesture != GestureLabel::Pinch && target == self.mode {
            return Transition::Ignored;
        }
        self.apply_gesture(gesture, now)
    }

    fn enter(&mut self, target: DisplayMode, now: Instant) {
        if target == DisplayMode::Next {
            self.photo_index += 1;
        }
        // Re-accepting AUTOPLAY while already in it keeps the advance grid.
        if target == DisplayMode::Autoplay && self.mode != DisplayMode::Autoplay {
            self.last_autoplay_advance = Some(now);
        }
        let previous = self.mode;
        self.mode = target;
        self.last_mode_change = Some(now);
        info!(
            from = previous.as_str(),
            mode = target.as_str(),
            photo_index = self.photo_index,
            "mode changed"
        );
    }

    /// Advance the photo index if autoplay is on and `interval` has passed
    /// since the last advance.  Returns true when the index moved.
    pub fn advance_autoplay(&mut self, interval: Duration, now: Instant) -> bool {
        if !self.autoplay_active() {
            return false;
        }
        let last = *self.last_autoplay_advance.get_or_insert(now);
        if now.saturating_duration_since(last) < interval {
            return false;
        }
        self.photo_index += 1;
        // Stay on the interval grid; after a stall, restart it from now.
        let next = last + interval;
        self.last_autoplay_advance = if now.saturating_duration_since(next) >= interval {
            Some(now)
        } else {
            Some(next)
        };
        true
    }

    /// Hand left the frame.
    pub fn hand_lost(&mut self) {
        self.hand.detected = false;
        self.gesture = GestureLabel::None;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            gesture: self.gesture,
            mode: self.mode,
            hand: self.hand,
            photo_index: self.photo_index,
            auto_play: self.autoplay_active(),
        }
    }

    #[cfg(test)]
    pub(crate) fn force(&mut self, mode: DisplayMode, photo_index: u64) {
        self.mode = mode;
        self.photo_index = photo_index;
    }
}

// ── Tests ──────────────────────────────────────────────────
