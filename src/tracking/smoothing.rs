//! Majority-vote smoothing over the last few gesture labels.
//!
//! Single-frame misclassifications are voted out by the surrounding frames.
//! Ties go to the label seen most recently.

use std::collections::VecDeque;

use tracing::warn;

use super::gesture::GestureLabel;

/// Default history length.
pub const DEFAULT_HISTORY: usize = 5;

/// Bounded FIFO of recent labels with a dominant-label query.
#[derive(Debug, Clone)]
pub struct GestureSmoother {
    history: VecDeque<GestureLabel>,
    capacity: usize,
}

impl Default for GestureSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl GestureSmoother {
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            warn!("gesture history of 0 requested, using 1");
        }
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a label, evicting the oldest when full.  Returns the new
    /// dominant label.
    pub fn push(&mut self, label: GestureLabel) -> GestureLabel {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(label);
        self.dominant()
    }

    /// Most frequent label in the history, `None` when empty.
    pub fn dominant(&self) -> GestureLabel {
        // (label, count) in order of most recent occurrence.
        let mut tally: Vec<(GestureLabel, usize)> = Vec::with_capacity(self.history.len());
        for label in self.history.iter().rev() {
            match tally.iter_mut().find(|(l, _)| l == label) {
                Some((_, count)) => *count += 1,
                None => tally.push((*label, 1)),
            }
        }

        let mut best: Option<(GestureLabel, usize)> = None;
        for (label, count) in tally {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label).unwrap_or_default()
    }

    /// How many times `label` appears in the current window.
    pub fn count(&self, label: GestureLabel) -> usize {
        self.history.iter().filter(|l| **l == label).count()
    }

    /// Drop all history (hand left the frame).
    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Labels oldest first.
    pub fn labels(&self) -> impl Iterator<Item = GestureLabel> + '_ {
        self.history.iter().copied()
    }
}

// ── Tests ──────────────────────────────────────────────────
