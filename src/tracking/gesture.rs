//! Gesture classification from hand features.
//!
//! Rules are evaluated in a fixed priority order and the first match wins,
//! so a hand that satisfies several rules always resolves to the earliest.

use serde::Serialize;

use super::features::FeatureSet;

/// Pinch ratio below which thumb and index count as touching.
pub const PINCH_RATIO_MAX: f32 = 0.28;

// ── Gesture labels ─────────────────────────────────────────

/// Recognized hand poses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureLabel {
    #[default]
    None,
    /// All fingers curled, thumb tucked.
    Fist,
    /// Four or more fingers extended.
    Open,
    /// Thumb and index tips touching.
    Pinch,
    /// Index and middle extended, others curled.
    Peace,
    /// Thumb raised, fingers curled.
    ThumbsUp,
}

impl GestureLabel {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Fist => "FIST",
            Self::Open => "OPEN",
            Self::Pinch => "PINCH",
            Self::Peace => "PEACE",
            Self::ThumbsUp => "THUMBS_UP",
        }
    }

    /// Parse a wire label.  Anything unrecognized is `None`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "FIST" => Self::Fist,
            "OPEN" => Self::Open,
            "PINCH" => Self::Pinch,
            "PEACE" => Self::Peace,
            "THUMBS_UP" => Self::ThumbsUp,
            _ => Self::None,
        }
    }
}

// ── Classifier ─────────────────────────────────────────────

/// Map one frame's features to a gesture label.
pub fn classify(features: &FeatureSet) -> GestureLabel {
    let extended = features.extended_count();

    if extended == 0 && !features.thumb_extended {
        return GestureLabel::Fist;
    }

    if extended >= 4 {
        return GestureLabel::Open;
    }

    if features.pinch_ratio < PINCH_RATIO_MAX && extended <= 2 {
        return GestureLabel::Pinch;
    }

    if features.index_extended()
        && features.middle_extended()
        && !features.ring_extended()
        && !features.pinky_extended()
        && !features.thumb_extended
    {
        return GestureLabel::Peace;
    }

    if features.thumb_up && extended == 0 {
        return GestureLabel::ThumbsUp;
    }

    GestureLabel::None
}

// ── Tests ──────────────────────────────────────────────────
