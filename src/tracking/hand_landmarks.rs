//! Hand landmark data as delivered by an external 21-point hand detector.
//!
//! Indices follow the MediaPipe hand landmark convention.  Coordinates are
//! normalized to the frame (0.0-1.0 on x and y, z is relative depth).

use serde::Deserialize;

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks reported per detected hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

impl HandLandmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// (tip, proximal joint) pairs for the four non-thumb fingers,
    /// ordered index, middle, ring, pinky.
    pub fn finger_joints() -> [(HandLandmark, HandLandmark); 4] {
        [
            (Self::IndexTip, Self::IndexPip),
            (Self::MiddleTip, Self::MiddlePip),
            (Self::RingTip, Self::RingPip),
            (Self::PinkyTip, Self::PinkyPip),
        ]
    }
}

// ── Points ─────────────────────────────────────────────────

/// A single landmark position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(from = "[f32; 3]")]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance to another point in the image plane (z ignored).
    pub fn planar_distance(&self, other: &LandmarkPoint) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f32; 3]> for LandmarkPoint {
    fn from(p: [f32; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

// ── Frames ─────────────────────────────────────────────────

/// The full landmark set for one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    points: [LandmarkPoint; LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn new(points: [LandmarkPoint; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from a detector-provided slice.  Returns `None` unless the
    /// slice holds exactly 21 points.
    pub fn from_slice(points: &[LandmarkPoint]) -> Option<Self> {
        let points: [LandmarkPoint; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self::new(points))
    }

    pub fn get(&self, landmark: HandLandmark) -> &LandmarkPoint {
        &self.points[landmark.index()]
    }

    /// Planar distance between two landmarks of this hand.
    pub fn distance(&self, a: HandLandmark, b: HandLandmark) -> f32 {
        self.get(a).planar_distance(self.get(b))
    }

    #[cfg(test)]
    pub fn set(&mut self, landmark: HandLandmark, x: f32, y: f32) {
        self.points[landmark.index()] = LandmarkPoint::new(x, y, 0.0);
    }
}

/// One processed video frame from the detector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LandmarkFrame {
    /// Whether the detector found a hand in this frame.
    pub detected: bool,
    /// Landmarks of the first detected hand (empty when none).
    #[serde(default)]
    pub landmarks: Vec<LandmarkPoint>,
}

impl LandmarkFrame {
    /// Frame reporting no hand in view.
    #[cfg(test)]
    pub fn lost() -> Self {
        Self {
            detected: false,
            landmarks: Vec::new(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────
