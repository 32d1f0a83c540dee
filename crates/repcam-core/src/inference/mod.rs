//! ML inference using Candle.
//!
//! Provides checkpoint loading, the two-stage action recognition network
//! (feature extractor + logistic regression head), assembly of that network
//! from separately trained checkpoints, and the temporal inference engine.

mod assembler;
mod classifier;
mod device;
mod engine;
mod extractor;
mod loader;
mod pipeline;

pub use assembler::{
    merge_finetuned, AssembledModel, CheckpointPaths, ModelAssembler, CLASSIFIER_FILE, LABELS_FILE,
};
pub use classifier::LogisticRegression;
pub use device::DeviceChoice;
pub use engine::InferenceEngine;
pub use extractor::{ExtractorConfig, FeatureExtractor};
pub use loader::{load_weights, WeightMap};
pub use pipeline::{ActionPipeline, Pipe};
