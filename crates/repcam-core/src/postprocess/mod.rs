//! Postprocessing of raw classifier output.
//!
//! Each step implements `Postprocessor`. The chain runs steps strictly in
//! configured order; a step sees what earlier steps wrote into the
//! `RunResult`, never what later ones will write.

mod one_position;
mod smoother;
mod two_positions;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ConfigError, LabelMap, RunResult};

pub use one_position::{OnePositionRepCounter, OnePositionState};
pub use smoother::{ClassificationSmoother, SmootherConfig};
pub use two_positions::{TwoPositionsRepCounter, TwoPositionsState};

/// A stateful transform applied once per inference output.
pub trait Postprocessor: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Consumes one probability vector and adds this step's output to `result`.
    fn apply(&mut self, probabilities: &[f32], result: &mut RunResult);

    /// Returns to the initial state.
    fn reset(&mut self);
}

/// A repetition counter as written in configuration files, by label name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CounterSpec {
    /// Counts entries of one label above a threshold.
    OnePosition {
        /// Label to watch.
        position: String,
        /// Arming threshold.
        threshold: f32,
        /// Key the count is written under.
        out_key: String,
    },
    /// Counts `position0` then `position1` sequences.
    TwoPositions {
        /// First label of the motion.
        position0: String,
        /// Second label of the motion.
        position1: String,
        /// Threshold of the first label.
        threshold0: f32,
        /// Threshold of the second label.
        threshold1: f32,
        /// Key the count is written under.
        out_key: String,
        /// Frames after which an unfinished motion is abandoned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_frames: Option<u32>,
    },
}

impl CounterSpec {
    /// Output key of this counter.
    #[must_use]
    pub fn out_key(&self) -> &str {
        match self {
            Self::OnePosition { out_key, .. } | Self::TwoPositions { out_key, .. } => out_key,
        }
    }

    /// Resolves label names and builds the counter.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unknown labels or out-of-range thresholds.
    pub fn build(&self, labels: &LabelMap) -> Result<Box<dyn Postprocessor>, ConfigError> {
        match self {
            Self::OnePosition {
                position,
                threshold,
                out_key,
            } => Ok(Box::new(OnePositionRepCounter::from_labels(
                labels, position, *threshold, out_key,
            )?)),
            Self::TwoPositions {
                position0,
                position1,
                threshold0,
                threshold1,
                out_key,
                timeout_frames,
            } => {
                let counter = TwoPositionsRepCounter::from_labels(
                    labels,
                    [position0.as_str(), position1.as_str()],
                    [*threshold0, *threshold1],
                    out_key,
                )?
                .with_timeout(*timeout_frames);
                Ok(Box::new(counter))
            }
        }
    }
}

/// Configuration of a whole chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainConfig {
    /// Smoother settings; the smoother always runs first.
    pub smoothing: SmootherConfig,
    /// Counters, run after the smoother in this order.
    pub counters: Vec<CounterSpec>,
}

/// Ordered sequence of postprocessors.
#[derive(Default)]
pub struct PostprocessorChain {
    steps: Vec<Box<dyn Postprocessor>>,
}

impl PostprocessorChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    #[must_use]
    pub fn with(mut self, step: Box<dyn Postprocessor>) -> Self {
        self.steps.push(step);
        self
    }

    /// Builds a smoother followed by the configured counters.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unknown labels, bad thresholds, a zero
    /// smoothing window or top-k, or two counters sharing an output key.
    pub fn from_config(config: &ChainConfig, labels: &LabelMap) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for spec in &config.counters {
            if !seen.insert(spec.out_key()) {
                return Err(ConfigError::DuplicateKey(spec.out_key().to_string()));
            }
        }

        let mut chain = Self::new().with(Box::new(ClassificationSmoother::new(
            &config.smoothing,
            labels.clone(),
        )?));
        for spec in &config.counters {
            chain = chain.with(spec.build(labels)?);
        }

        debug!("Postprocessor chain: {:?}", chain.names());
        Ok(chain)
    }

    /// Names of the steps in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step on one probability vector.
    pub fn apply(&mut self, frame_index: u64, probabilities: &[f32]) -> RunResult {
        let mut result = RunResult::new(frame_index, probabilities.to_vec());
        for step in &mut self.steps {
            step.apply(probabilities, &mut result);
        }
        result
    }

    /// Resets every step.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
    }
}

/// Validates a threshold for `out_key`.
fn check_threshold(out_key: &str, value: f32) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Threshold {
            out_key: out_key.to_string(),
            value,
        })
    }
}

/// Resolves a label name for `out_key`.
fn resolve_label(labels: &LabelMap, label: &str, out_key: &str) -> Result<usize, ConfigError> {
    labels
        .index_of(label)
        .ok_or_else(|| ConfigError::UnknownLabel {
            out_key: out_key.to_string(),
            label: label.to_string(),
        })
}

/// Validates a label index for `out_key`.
fn check_index(out_key: &str, index: usize, num_labels: usize) -> Result<usize, ConfigError> {
    if index < num_labels {
        Ok(index)
    } else {
        Err(ConfigError::IndexOutOfRange {
            out_key: out_key.to_string(),
            index,
            num_labels,
        })
    }
}
