//! Stage state: the single struct owned by the event loop.
//!
//! Every producer (viewer sockets, the landmark replay thread) is drained
//! on the loop thread and funnels into the methods here, so session
//! mutation is serialized without locks.

use std::time::Instant;

use tracing::debug;

use crate::broadcast::BroadcastConfig;
use crate::ipc::{GestureInput, ViewerServer};
use crate::session::{HandPosition, ModeConfig, SessionState, Transition};
use crate::tracking::{
    classify, FeatureExtractor, GestureLabel, GestureSmoother, LandmarkFrame,
};
use crate::tracking::features::FeatureConfig;
use crate::tracking::smoothing::DEFAULT_HISTORY;

/// Everything needed to build a `StageState`.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub mode: ModeConfig,
    pub features: FeatureConfig,
    pub broadcast: BroadcastConfig,
    /// Smoothing window length.
    pub history: usize,
    /// Route network gesture labels through the smoother instead of
    /// straight to the state machine.
    pub smooth_network_input: bool,
    pub trace: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            mode: ModeConfig::default(),
            features: FeatureConfig::default(),
            broadcast: BroadcastConfig::default(),
            history: DEFAULT_HISTORY,
            smooth_network_input: false,
            trace: false,
        }
    }
}

/// Central stage state.
pub struct StageState {
    pub session: SessionState,
    pub smoother: GestureSmoother,
    pub extractor: FeatureExtractor,
    pub viewers: ViewerServer,
    pub broadcast: BroadcastConfig,
    pub smooth_network_input: bool,
    /// Shutdown flag.
    pub running: bool,
}

impl StageState {
    pub fn new(config: StageConfig) -> Self {
        Self {
            session: SessionState::new(config.mode),
            smoother: GestureSmoother::new(config.history),
            extractor: FeatureExtractor::new(config.features),
            viewers: ViewerServer::new(config.trace),
            broadcast: config.broadcast,
            smooth_network_input: config.smooth_network_input,
            running: true,
        }
    }

    /// A pre-classified gesture from the network.
    pub fn handle_gesture_input(&mut self, input: &GestureInput, now: Instant) -> Transition {
        let label = input.label();

        if self.smooth_network_input {
            if let Some(hand) = input.hand {
                if !hand.detected {
                    self.hand_lost();
                    return Transition::Ignored;
                }
                self.session.hand = hand.into();
            }
            return self.push_smoothed(label, now);
        }

        self.session.gesture = label;
        if let Some(hand) = input.hand {
            self.session.hand = hand.into();
        }
        self.session.apply_gesture(label, now)
    }

    /// One detector frame: extract, classify, smooth, maybe transition.
    pub fn handle_landmark_frame(&mut self, frame: &LandmarkFrame, now: Instant) -> Transition {
        if !frame.detected {
            self.hand_lost();
            return Transition::Ignored;
        }

        let features = match self.extractor.extract_points(&frame.landmarks) {
            Ok(f) => f,
            Err(reason) => {
                debug!(%reason, "frame rejected");
                return Transition::Ignored;
            }
        };

        self.session.hand = HandPosition {
            x: features.center[0],
            y: features.center[1],
            detected: true,
        };
        self.push_smoothed(classify(&features), now)
    }

    fn push_smoothed(&mut self, label: GestureLabel, now: Instant) -> Transition {
        let dominant = self.smoother.push(label);
        self.session.gesture = dominant;
        let occurrences = self.smoother.count(dominant);
        self.session.apply_confirmed(dominant, occurrences, now)
    }

    /// Hard reset of the smoothing window when the hand leaves the frame.
    pub fn hand_lost(&mut self) {
        if !self.smoother.is_empty() {
            let history: Vec<&str> = self.smoother.labels().map(|l| l.as_str()).collect();
            debug!(?history, "hand lost, clearing gesture history");
        }
        self.smoother.clear();
        self.session.hand_lost();
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::HandInput;
    use crate::session::DisplayMode;
    use crate::tracking::features::poses;
    use crate::tracking::hand_landmarks::HandLandmarks;
    use std::time::Duration;

    fn frame(hand: &HandLandmarks) -> LandmarkFrame {
        LandmarkFrame {
            detected: true,
            landmarks: poses::points(hand),
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn input(gesture: &str) -> GestureInput {
        GestureInput {
            gesture: Some(serde_json::Value::from(gesture)),
            hand: None,
        }
    }

    #[test]
    fn test_fist_fist_fist_open_open_stays_tree() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        let hands = [poses::fist(), poses::fist(), poses::fist(), poses::open(), poses::open()];
        for (i, hand) in hands.iter().enumerate() {
            s.handle_landmark_frame(&frame(hand), t0 + ms(33 * i as u64));
        }
        assert_eq!(s.smoother.dominant(), GestureLabel::Fist);
        assert_eq!(s.session.gesture, GestureLabel::Fist);
        assert_eq!(s.session.mode(), DisplayMode::Tree);
        assert!(!s.session.autoplay_active());
        assert!(s.session.last_mode_change().is_none());
    }

    #[test]
    fn test_confirmation_takes_three_frames() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        let open = frame(&poses::open());

        assert_eq!(s.handle_landmark_frame(&open, t0), Transition::Ignored);
        assert_eq!(s.handle_landmark_frame(&open, t0 + ms(33)), Transition::Ignored);
        assert_eq!(
            s.handle_landmark_frame(&open, t0 + ms(66)),
            Transition::Accepted(DisplayMode::Scatter)
        );
        assert_eq!(s.session.gesture, GestureLabel::Open);
        assert!(s.session.hand.detected);
        assert!((s.session.hand.y - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_held_pinch_pulses_once_per_cooldown() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        let pinch = frame(&poses::pinch());
        // 1 second of pinch at ~30 fps.
        for i in 0..30 {
            s.handle_landmark_frame(&pinch, t0 + ms(33 * i));
        }
        // Confirmed at frame 2 (66 ms), again at 566 ms.
        assert_eq!(s.session.photo_index(), 2);
        assert_eq!(s.session.mode(), DisplayMode::Next);
    }

    #[test]
    fn test_hand_lost_clears_history() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        for i in 0..4 {
            s.handle_landmark_frame(&frame(&poses::peace()), t0 + ms(33 * i));
        }
        assert_eq!(s.smoother.len(), 4);

        s.handle_landmark_frame(&LandmarkFrame::lost(), t0 + ms(200));
        assert!(s.smoother.is_empty());
        assert_eq!(s.smoother.dominant(), GestureLabel::None);
        assert_eq!(s.session.gesture, GestureLabel::None);
        assert!(!s.session.hand.detected);
        // Mode is left alone.
        assert_eq!(s.session.mode(), DisplayMode::Heart);
    }

    #[test]
    fn test_rejected_frame_contributes_nothing() {
        let mut s = StageState::new(StageConfig::default());
        let short = LandmarkFrame {
            detected: true,
            landmarks: poses::points(&poses::open())[..10].to_vec(),
        };
        assert_eq!(s.handle_landmark_frame(&short, Instant::now()), Transition::Ignored);
        assert!(s.smoother.is_empty());
        assert!(!s.session.hand.detected);
    }

    #[test]
    fn test_direct_input_cooldown() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        assert_eq!(
            s.handle_gesture_input(&input("OPEN"), t0),
            Transition::Accepted(DisplayMode::Scatter)
        );
        assert_eq!(
            s.handle_gesture_input(&input("PEACE"), t0 + ms(100)),
            Transition::CoolingDown
        );
        assert_eq!(s.session.mode(), DisplayMode::Scatter);
        // The label is still shown even though the mode held.
        assert_eq!(s.session.gesture, GestureLabel::Peace);
        assert_eq!(s.session.last_mode_change(), Some(t0));
    }

    #[test]
    fn test_direct_input_keeps_hand_when_absent() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        let with_hand = GestureInput {
            gesture: None,
            hand: Some(HandInput { x: 0.1, y: -0.3, detected: true }),
        };
        s.handle_gesture_input(&with_hand, t0);
        s.handle_gesture_input(&input("FIST"), t0 + ms(10));
        assert_eq!(s.session.hand, HandPosition { x: 0.1, y: -0.3, detected: true });
        assert_eq!(s.session.gesture, GestureLabel::Fist);
    }

    #[test]
    fn test_direct_thumbs_up_stream_keeps_autoplay_grid() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        let interval = s.broadcast.autoplay_interval;
        for i in 0..25 {
            s.handle_gesture_input(&input("THUMBS_UP"), t0 + ms(100 * i));
        }
        // Re-accepted several times, never re-armed.
        assert!(s.session.last_mode_change() > Some(t0));
        assert!(s.session.advance_autoplay(interval, t0 + ms(2500)));
        assert_eq!(s.session.photo_index(), 1);
    }

    #[test]
    fn test_thumbs_up_then_pinch_direct() {
        let mut s = StageState::new(StageConfig::default());
        let t0 = Instant::now();
        s.handle_gesture_input(&input("THUMBS_UP"), t0);
        assert_eq!(s.session.mode(), DisplayMode::Autoplay);
        assert!(s.session.autoplay_active());

        s.handle_gesture_input(&input("PINCH"), t0 + ms(500));
        assert_eq!(s.session.mode(), DisplayMode::Next);
        assert_eq!(s.session.photo_index(), 1);
        assert!(!s.session.autoplay_active());
    }

    #[test]
    fn test_smoothed_network_input() {
        let mut s = StageState::new(StageConfig {
            smooth_network_input: true,
            ..StageConfig::default()
        });
        let t0 = Instant::now();
        assert_eq!(s.handle_gesture_input(&input("PEACE"), t0), Transition::Ignored);
        assert_eq!(s.handle_gesture_input(&input("PEACE"), t0 + ms(20)), Transition::Ignored);
        assert_eq!(
            s.handle_gesture_input(&input("PEACE"), t0 + ms(40)),
            Transition::Accepted(DisplayMode::Heart)
        );

        let lost = GestureInput {
            gesture: Some(serde_json::Value::from("PEACE")),
            hand: Some(HandInput { x: 0.0, y: 0.0, detected: false }),
        };
        s.handle_gesture_input(&lost, t0 + ms(60));
        assert!(s.smoother.is_empty());
        assert_eq!(s.session.gesture, GestureLabel::None);
    }
}
