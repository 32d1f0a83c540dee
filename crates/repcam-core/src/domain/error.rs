//! Error types raised before streaming starts.
//!
//! Both families are static mistakes (bad files, bad configuration), so they
//! are reported before any stream resource is opened.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while loading checkpoints or label metadata.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The file does not exist.
    #[error("file not found: {}", path.display())]
    Missing {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The checkpoint could not be decoded.
    #[error("invalid checkpoint {}: {reason}", path.display())]
    Checkpoint {
        /// Checkpoint path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The label metadata is not a dense string → index mapping.
    #[error("invalid label metadata {}: {reason}", path.display())]
    Labels {
        /// Metadata path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Weights do not fit the target architecture (missing tensor or wrong shape).
    #[error("{stage} weights do not fit the architecture: {source}")]
    Architecture {
        /// Which stage failed: `extractor` or `classifier`.
        stage: &'static str,
        /// Error reported by candle while binding the tensor.
        #[source]
        source: candle_core::Error,
    },
}

/// Invalid postprocessor configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// A counter references a label the classifier does not know.
    #[error("counter '{out_key}' references unknown label '{label}'")]
    UnknownLabel {
        /// Output key of the offending counter.
        out_key: String,
        /// Label name that failed to resolve.
        label: String,
    },

    /// A label index is past the end of the probability vector.
    #[error("counter '{out_key}' uses label index {index}, but only {num_labels} labels exist")]
    IndexOutOfRange {
        /// Output key of the offending counter.
        out_key: String,
        /// Offending index.
        index: usize,
        /// Number of labels.
        num_labels: usize,
    },

    /// A threshold lies outside `0.0..=1.0`.
    #[error("counter '{out_key}' threshold {value} is not in 0.0..=1.0")]
    Threshold {
        /// Output key of the offending counter.
        out_key: String,
        /// Offending value.
        value: f32,
    },

    /// Two counters write the same output key.
    #[error("duplicate counter output key '{0}'")]
    DuplicateKey(String),

    /// Smoothing window or top-k is zero.
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}
