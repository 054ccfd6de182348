//! Hand tracking pipeline: landmarks → features → gesture → smoothed gesture.
//!
//! Provides:
//! - `hand_landmarks`: 21-point detector frames
//! - `features`: geometric feature extraction
//! - `gesture`: ordered-rule classification
//! - `smoothing`: majority vote over a short history

pub mod features;
pub mod gesture;
pub mod hand_landmarks;
pub mod smoothing;

pub use features::FeatureExtractor;
pub use gesture::{classify, GestureLabel};
pub use hand_landmarks::LandmarkFrame;
pub use smoothing::GestureSmoother;
