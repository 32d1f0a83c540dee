//! Sliding-window smoothing of classifier output.

// Allow common ML code patterns
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use std::collections::VecDeque;

use super::Postprocessor;
use crate::domain::{ConfigError, LabelMap, LabelScore, RunResult};

/// Configuration of the smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmootherConfig {
    /// Number of most recent probability vectors averaged.
    pub window: usize,
    /// Number of labels reported in `RunResult::top_k`.
    pub top_k: usize,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self { window: 4, top_k: 3 }
    }
}

/// Averages the last `window` probability vectors and ranks the labels.
pub struct ClassificationSmoother {
    config: SmootherConfig,
    labels: LabelMap,
    history: VecDeque<Vec<f32>>,
}

impl ClassificationSmoother {
    /// Creates a smoother for the given labels.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Zero` if `window` or `top_k` is zero.
    pub fn new(config: &SmootherConfig, labels: LabelMap) -> Result<Self, ConfigError> {
        if config.window == 0 {
            return Err(ConfigError::Zero("smoothing window"));
        }
        if config.top_k == 0 {
            return Err(ConfigError::Zero("top_k"));
        }
        Ok(Self {
            config: *config,
            labels,
            history: VecDeque::with_capacity(config.window),
        })
    }

    /// Element-wise mean of the buffered vectors.
    fn mean(&self) -> Vec<f32> {
        let len = self.history.front().map_or(0, Vec::len);
        let n = self.history.len() as f64;

        // f64 accumulation keeps the mean of identical inputs exact
        (0..len)
            .map(|i| {
                let sum: f64 = self
                    .history
                    .iter()
                    .map(|p| f64::from(p.get(i).copied().unwrap_or(0.0)))
                    .sum();
                (sum / n) as f32
            })
            .collect()
    }

    /// Top `k` labels, highest score first, ties in label index order.
    fn rank(&self, mean: &[f32]) -> Vec<LabelScore> {
        let mut order: Vec<usize> = (0..mean.len()).collect();
        order.sort_by(|a, b| mean[*b].total_cmp(&mean[*a]));
        order
            .into_iter()
            .take(self.config.top_k)
            .map(|index| LabelScore {
                label: self.labels.label(index).unwrap_or("?").to_string(),
                index,
                score: mean[index],
            })
            .collect()
    }
}

impl Postprocessor for ClassificationSmoother {
    fn name(&self) -> &'static str {
        "smoother"
    }

    fn apply(&mut self, probabilities: &[f32], result: &mut RunResult) {
        if self
            .history
            .front()
            .is_some_and(|p| p.len() != probabilities.len())
        {
            self.history.clear();
        }
        if self.history.len() == self.config.window {
            self.history.pop_front();
        }
        self.history.push_back(probabilities.to_vec());

        let mean = self.mean();
        result.top_k = self.rank(&mean);
        result.smoothed = Some(mean);
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn smoother(window: usize, top_k: usize) -> ClassificationSmoother {
        let labels = LabelMap::from_ordered(&["a", "b", "c", "d"]).unwrap();
        ClassificationSmoother::new(&SmootherConfig { window, top_k }, labels).unwrap()
    }

    fn run(s: &mut ClassificationSmoother, p: &[f32]) -> RunResult {
        let mut result = RunResult::new(0, p.to_vec());
        s.apply(p, &mut result);
        result
    }

    #[test]
    fn test_converges_to_repeated_input() {
        let mut s = smoother(4, 2);
        run(&mut s, &[1.0, 0.0, 0.0, 0.0]);
        let p = [0.1, 0.2, 0.3, 0.4];
        let mut result = RunResult::default();
        for _ in 0..4 {
            result = run(&mut s, &p);
        }
        assert_eq!(result.smoothed.unwrap(), p.to_vec());
    }

    #[test]
    fn test_mean_over_partial_window() {
        let mut s = smoother(4, 1);
        run(&mut s, &[1.0, 0.0, 0.0, 0.0]);
        let result = run(&mut s, &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(result.smoothed.unwrap(), vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_oldest_vector_dropped() {
        let mut s = smoother(2, 1);
        run(&mut s, &[1.0, 0.0, 0.0, 0.0]);
        run(&mut s, &[0.0, 1.0, 0.0, 0.0]);
        let result = run(&mut s, &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(result.smoothed.unwrap(), vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_top_k_ties_keep_index_order() {
        let mut s = smoother(1, 3);
        let result = run(&mut s, &[0.1, 0.3, 0.3, 0.3]);
        let order: Vec<&str> = result.top_k.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_zero_window_rejected() {
        let labels = LabelMap::from_ordered(&["a"]).unwrap();
        let err = ClassificationSmoother::new(&SmootherConfig { window: 0, top_k: 1 }, labels).err();
        assert_eq!(err, Some(ConfigError::Zero("smoothing window")));
    }
}
