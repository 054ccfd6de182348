//! Geometric feature extraction from hand landmarks.
//!
//! Turns the 21 detector points of one hand into finger-extension flags,
//! thumb state, pinch ratio, hand scale and a normalized hand center.
//! Pure: nothing here touches session state.

use thiserror::Error;

use super::hand_landmarks::{HandLandmark, HandLandmarks, LandmarkPoint};

// ── Config ─────────────────────────────────────────────────

/// Thresholds for feature extraction.  Tuned for five specific poses.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Minimum wrist to middle-MCP distance for a usable hand.
    pub min_hand_scale: f32,
    /// A tip must be this many times farther from the wrist than its
    /// proximal joint for the finger to count as extended.
    pub extension_margin: f32,
    /// How far above the thumb MCP the thumb tip must sit to count as "up".
    pub thumb_up_offset: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_hand_scale: 0.02,
            extension_margin: 1.15,
            thumb_up_offset: 0.04,
        }
    }
}

// ── Features ───────────────────────────────────────────────

/// Per-frame geometric features of one hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSet {
    /// Extension flags ordered index, middle, ring, pinky.
    pub fingers: [bool; 4],
    pub thumb_up: bool,
    pub thumb_extended: bool,
    /// Thumb-tip to index-tip distance divided by hand scale.
    pub pinch_ratio: f32,
    pub hand_scale: f32,
    /// Middle MCP position remapped to [-1, 1] on both axes.
    pub center: [f32; 2],
}

impl FeatureSet {
    /// Number of non-thumb fingers extended.
    pub fn extended_count(&self) -> usize {
        self.fingers.iter().filter(|f| **f).count()
    }

    pub fn index_extended(&self) -> bool {
        self.fingers[0]
    }

    pub fn middle_extended(&self) -> bool {
        self.fingers[1]
    }

    pub fn ring_extended(&self) -> bool {
        self.fingers[2]
    }

    pub fn pinky_extended(&self) -> bool {
        self.fingers[3]
    }
}

/// Why a frame produced no features.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureRejection {
    #[error("hand too small (scale {scale:.4})")]
    HandTooSmall { scale: f32 },
    #[error("expected 21 landmarks, got {0}")]
    LandmarkCount(usize),
}

// ── Extractor ──────────────────────────────────────────────

/// Stateless landmark-to-feature converter.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    pub config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Extract features from a raw detector point list.
    pub fn extract_points(&self, points: &[LandmarkPoint]) -> Result<FeatureSet, FeatureRejection> {
        let hand = HandLandmarks::from_slice(points)
            .ok_or(FeatureRejection::LandmarkCount(points.len()))?;
        self.extract(&hand)
    }

    /// Extract features from one hand.
    pub fn extract(&self, hand: &HandLandmarks) -> Result<FeatureSet, FeatureRejection> {
        let scale = hand.distance(HandLandmark::Wrist, HandLandmark::MiddleMcp);
        if scale < self.config.min_hand_scale {
            return Err(FeatureRejection::HandTooSmall { scale });
        }

        let margin = self.config.extension_margin;
        let mut fingers = [false; 4];
        for (flag, (tip, pip)) in fingers.iter_mut().zip(HandLandmark::finger_joints()) {
            *flag = hand.distance(HandLandmark::Wrist, tip)
                > hand.distance(HandLandmark::Wrist, pip) * margin;
        }

        let wrist = hand.get(HandLandmark::Wrist);
        let thumb_tip = hand.get(HandLandmark::ThumbTip);
        let thumb_mcp = hand.get(HandLandmark::ThumbMcp);

        // Image y grows downward, so "up" means numerically smaller.
        let thumb_up = thumb_tip.y < thumb_mcp.y - self.config.thumb_up_offset;
        let thumb_extended =
            (thumb_tip.x - wrist.x).abs() > (thumb_mcp.x - wrist.x).abs() * margin;

        let pinch_ratio = hand.distance(HandLandmark::ThumbTip, HandLandmark::IndexTip) / scale;

        let mcp = hand.get(HandLandmark::MiddleMcp);
        let center = [mcp.x * 2.0 - 1.0, mcp.y * 2.0 - 1.0];

        Ok(FeatureSet {
            fingers,
            thumb_up,
            thumb_extended,
            pinch_ratio,
            hand_scale: scale,
            center,
        })
    }
}

// ── Test helpers ───────────────────────────────────────────

/// Canonical test hands in image coordinates: wrist at (0.5, 0.8),
/// middle MCP at (0.5, 0.6), so hand scale is 0.2.
#[cfg(test)]
pub(crate) mod poses {
    use super::super::hand_landmarks::{HandLandmark, HandLandmarks, LandmarkPoint, LANDMARK_COUNT};
    use HandLandmark::*;

    const FINGERS: [(HandLandmark, HandLandmark, HandLandmark, HandLandmark, f32); 4] = [
        (IndexMcp, IndexPip, IndexDip, IndexTip, 0.45),
        (MiddleMcp, MiddlePip, MiddleDip, MiddleTip, 0.50),
        (RingMcp, RingPip, RingDip, RingTip, 0.55),
        (PinkyMcp, PinkyPip, PinkyDip, PinkyTip, 0.60),
    ];

    /// Build a hand with the given finger extension and thumb tip.
    pub fn hand(extended: [bool; 4], thumb_tip: (f32, f32)) -> HandLandmarks {
        let mut hand = HandLandmarks::new([LandmarkPoint::default(); LANDMARK_COUNT]);
        hand.set(Wrist, 0.5, 0.8);
        hand.set(ThumbCmc, 0.42, 0.75);
        hand.set(ThumbMcp, 0.38, 0.70);
        hand.set(ThumbIp, 0.36, 0.68);
        hand.set(ThumbTip, thumb_tip.0, thumb_tip.1);
        for ((mcp, pip, dip, tip, x), ext) in FINGERS.into_iter().zip(extended) {
            hand.set(mcp, x, 0.6);
            hand.set(pip, x, 0.5);
            if ext {
                hand.set(dip, x, 0.4);
                hand.set(tip, x, 0.3);
            } else {
                hand.set(dip, x, 0.58);
                hand.set(tip, x, 0.62);
            }
        }
        hand
    }

    pub const THUMB_TUCKED: (f32, f32) = (0.42, 0.68);
    pub const THUMB_OUT: (f32, f32) = (0.25, 0.68);
    pub const THUMB_UP: (f32, f32) = (0.30, 0.50);

    pub fn fist() -> HandLandmarks {
        hand([false; 4], THUMB_TUCKED)
    }

    pub fn open() -> HandLandmarks {
        hand([true; 4], THUMB_OUT)
    }

    pub fn peace() -> HandLandmarks {
        hand([true, true, false, false], THUMB_TUCKED)
    }

    pub fn thumbs_up() -> HandLandmarks {
        hand([false; 4], THUMB_UP)
    }

    /// Index tip pulled in toward a thumb tip touching it.
    pub fn pinch() -> HandLandmarks {
        let mut h = hand([false; 4], (0.41, 0.42));
        h.set(IndexTip, 0.40, 0.40);
        h
    }

    /// Landmarks as a raw point list, as a detector would send them.
    pub fn points(hand: &HandLandmarks) -> Vec<LandmarkPoint> {
        (0..LANDMARK_COUNT)
            .map(|i| *hand.get(ALL[i]))
            .collect()
    }

    const ALL: [HandLandmark; LANDMARK_COUNT] = [
        Wrist, ThumbCmc, ThumbMcp, ThumbIp, ThumbTip, IndexMcp, IndexPip, IndexDip, IndexTip,
        MiddleMcp, MiddlePip, MiddleDip, MiddleTip, RingMcp, RingPip, RingDip, RingTip, PinkyMcp,
        PinkyPip, PinkyDip, PinkyTip,
    ];
}

// ── Tests ──────────────────────────────────────────────────
