//! Single-label repetition counter.

use tracing::debug;

use super::{check_index, check_threshold, resolve_label, Postprocessor};
use crate::domain::{ConfigError, LabelMap, RunResult};

/// Whether the watched label is currently above its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnePositionState {
    /// Below threshold, waiting for the next rep.
    #[default]
    Idle,
    /// Above threshold; the rep has been counted.
    Armed,
}

/// Counts how often one label's probability rises to its threshold.
///
/// A rep is counted on the `Idle → Armed` edge only, so staying above the
/// threshold for many frames counts once.
#[derive(Debug, Clone)]
pub struct OnePositionRepCounter {
    label: usize,
    threshold: f32,
    out_key: String,
    state: OnePositionState,
    count: u32,
}

impl OnePositionRepCounter {
    /// Creates a counter watching label index `label`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `label` is not below `num_labels` or the
    /// threshold is outside `0.0..=1.0`.
    pub fn new(
        label: usize,
        threshold: f32,
        out_key: impl Into<String>,
        num_labels: usize,
    ) -> Result<Self, ConfigError> {
        let out_key = out_key.into();
        Ok(Self {
            label: check_index(&out_key, label, num_labels)?,
            threshold: check_threshold(&out_key, threshold)?,
            out_key,
            state: OnePositionState::Idle,
            count: 0,
        })
    }

    /// Creates a counter watching the label called `position`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown label or a bad threshold.
    pub fn from_labels(
        labels: &LabelMap,
        position: &str,
        threshold: f32,
        out_key: &str,
    ) -> Result<Self, ConfigError> {
        let label = resolve_label(labels, position, out_key)?;
        Self::new(label, threshold, out_key, labels.len())
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> OnePositionState {
        self.state
    }

    /// Reps counted so far.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }
}

impl Postprocessor for OnePositionRepCounter {
    fn name(&self) -> &'static str {
        "one_position_rep_counter"
    }

    fn apply(&mut self, probabilities: &[f32], result: &mut RunResult) {
        let p = probabilities.get(self.label).copied().unwrap_or(0.0);
        let above = p >= self.threshold;

        match (self.state, above) {
            (OnePositionState::Idle, true) => {
                self.state = OnePositionState::Armed;
                self.count += 1;
                debug!("{}: rep {} (p={p:.3})", self.out_key, self.count);
            }
            (OnePositionState::Armed, false) => self.state = OnePositionState::Idle,
            _ => {}
        }

        result.counts.set(&self.out_key, self.count);
    }

    fn reset(&mut self) {
        self.state = OnePositionState::Idle;
        self.count = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn feed(counter: &mut OnePositionRepCounter, values: &[f32]) -> u32 {
        let mut result = RunResult::default();
        for v in values {
            counter.apply(&[1.0 - v, *v], &mut result);
        }
        result.count("reps").unwrap()
    }

    #[test]
    fn test_plateau_counts_once() {
        let mut counter = OnePositionRepCounter::new(1, 0.5, "reps", 2).unwrap();
        assert_eq!(feed(&mut counter, &[0.0, 0.9, 0.95, 0.9, 0.0]), 1);
        assert_eq!(counter.state(), OnePositionState::Idle);
    }

    #[test]
    fn test_each_rise_counts() {
        let mut counter = OnePositionRepCounter::new(1, 0.5, "reps", 2).unwrap();
        assert_eq!(feed(&mut counter, &[0.0, 0.6, 0.1, 0.7, 0.2, 0.8]), 3);
        assert_eq!(counter.state(), OnePositionState::Armed);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut counter = OnePositionRepCounter::new(1, 0.5, "reps", 2).unwrap();
        assert_eq!(feed(&mut counter, &[0.5]), 1);
    }

    #[test]
    fn test_count_written_before_first_rep() {
        let mut counter = OnePositionRepCounter::new(1, 0.5, "reps", 2).unwrap();
        assert_eq!(feed(&mut counter, &[0.1]), 0);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            OnePositionRepCounter::new(5, 0.5, "reps", 2),
            Err(ConfigError::IndexOutOfRange { index: 5, .. })
        ));
        assert!(matches!(
            OnePositionRepCounter::new(0, 1.5, "reps", 2),
            Err(ConfigError::Threshold { .. })
        ));
    }
}
