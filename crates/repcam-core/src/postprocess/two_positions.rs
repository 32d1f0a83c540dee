//! Two-label repetition counter.

use tracing::debug;

use super::{check_index, check_threshold, resolve_label, Postprocessor};
use crate::domain::{ConfigError, LabelMap, RunResult};

/// Progress through one `position0 → position1` motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TwoPositionsState {
    /// Waiting for `position0` to cross its threshold.
    #[default]
    WaitingPos0,
    /// `position0` was seen; waiting for `position1`.
    ArmedPos0 {
        /// Frames spent armed so far.
        frames: u32,
    },
}

/// Counts completed `position0 → position1` sequences.
///
/// A `position1` crossing only counts after `position0` crossed. Without a
/// timeout an armed counter waits indefinitely.
#[derive(Debug, Clone)]
pub struct TwoPositionsRepCounter {
    labels: [usize; 2],
    thresholds: [f32; 2],
    out_key: String,
    timeout_frames: Option<u32>,
    state: TwoPositionsState,
    count: u32,
}

impl TwoPositionsRepCounter {
    /// Creates a counter watching label indices `labels[0]` then `labels[1]`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if an index is not below `num_labels` or a
    /// threshold is outside `0.0..=1.0`.
    pub fn new(
        labels: [usize; 2],
        thresholds: [f32; 2],
        out_key: impl Into<String>,
        num_labels: usize,
    ) -> Result<Self, ConfigError> {
        let out_key = out_key.into();
        Ok(Self {
            labels: [
                check_index(&out_key, labels[0], num_labels)?,
                check_index(&out_key, labels[1], num_labels)?,
            ],
            thresholds: [
                check_threshold(&out_key, thresholds[0])?,
                check_threshold(&out_key, thresholds[1])?,
            ],
            out_key,
            timeout_frames: None,
            state: TwoPositionsState::WaitingPos0,
            count: 0,
        })
    }

    /// Creates a counter from label names.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unknown labels or bad thresholds.
    pub fn from_labels(
        labels: &LabelMap,
        positions: [&str; 2],
        thresholds: [f32; 2],
        out_key: &str,
    ) -> Result<Self, ConfigError> {
        let first = resolve_label(labels, positions[0], out_key)?;
        let second = resolve_label(labels, positions[1], out_key)?;
        Self::new([first, second], thresholds, out_key, labels.len())
    }

    /// Abandons an armed motion after `frames` frames without a `position1`
    /// crossing. `None` waits forever.
    #[must_use]
    pub const fn with_timeout(mut self, frames: Option<u32>) -> Self {
        self.timeout_frames = frames;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TwoPositionsState {
        self.state
    }

    /// Reps counted so far.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }
}

impl Postprocessor for TwoPositionsRepCounter {
    fn name(&self) -> &'static str {
        "two_positions_rep_counter"
    }

    fn apply(&mut self, probabilities: &[f32], result: &mut RunResult) {
        let p = |i: usize| probabilities.get(self.labels[i]).copied().unwrap_or(0.0);

        self.state = match self.state {
            TwoPositionsState::WaitingPos0 if p(0) >= self.thresholds[0] => {
                TwoPositionsState::ArmedPos0 { frames: 0 }
            }
            TwoPositionsState::WaitingPos0 => TwoPositionsState::WaitingPos0,
            TwoPositionsState::ArmedPos0 { .. } if p(1) >= self.thresholds[1] => {
                self.count += 1;
                debug!("{}: rep {}", self.out_key, self.count);
                TwoPositionsState::WaitingPos0
            }
            TwoPositionsState::ArmedPos0 { frames } => {
                let frames = frames.saturating_add(1);
                match self.timeout_frames {
                    Some(limit) if frames >= limit => {
                        debug!("{}: motion abandoned after {frames} frames", self.out_key);
                        TwoPositionsState::WaitingPos0
                    }
                    _ => TwoPositionsState::ArmedPos0 { frames },
                }
            }
        };

        result.counts.set(&self.out_key, self.count);
    }

    fn reset(&mut self) {
        self.state = TwoPositionsState::WaitingPos0;
        self.count = 0;
    }
}
