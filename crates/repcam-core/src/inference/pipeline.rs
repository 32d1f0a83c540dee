//! Two-stage composition of the extractor and the classifier head.

use candle_core::{Module, Tensor};

use super::{FeatureExtractor, LogisticRegression};

/// Feeds the output of `first` straight into `second`.
pub struct Pipe<A, B> {
    /// Stage 1.
    pub first: A,
    /// Stage 2.
    pub second: B,
}

impl<A, B> Pipe<A, B> {
    /// Composes two stages.
    pub const fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Module, B: Module> Module for Pipe<A, B> {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.first.forward(x)?;
        self.second.forward(&features)
    }
}

/// The assembled action recognition network.
pub type ActionPipeline = Pipe<FeatureExtractor, LogisticRegression>;
