//! Start-up assembly: everything that can fail before a stream is opened.

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::LabelMap;
use crate::inference::{CheckpointPaths, DeviceChoice, ExtractorConfig, InferenceEngine, ModelAssembler};
use crate::postprocess::{ChainConfig, PostprocessorChain};

/// Inputs needed to build the inference side of a run.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Checkpoint and label metadata locations.
    pub paths: CheckpointPaths,
    /// Network shape.
    pub extractor: ExtractorConfig,
    /// Execution backend.
    pub device: DeviceChoice,
    /// Smoother and counters.
    pub chain: ChainConfig,
}

/// Engine and chain ready to be handed to a `Controller`.
pub struct Prepared {
    /// Temporal inference engine.
    pub engine: InferenceEngine,
    /// Postprocessors in run order.
    pub chain: PostprocessorChain,
    /// Labels the engine predicts.
    pub labels: LabelMap,
}

/// Assembles the model, resolves the device and validates the chain.
///
/// # Errors
///
/// Returns an error for missing or malformed checkpoints and label metadata,
/// weights that do not fit the architecture, or counters that reference
/// unknown labels.
pub fn prepare(settings: &EngineSettings) -> Result<Prepared> {
    let device = settings.device.resolve();
    let assembler = ModelAssembler::new(settings.extractor, device);
    let model = assembler
        .assemble(&settings.paths)
        .context("Failed to assemble model")?;
    let labels = model.labels.clone();

    let chain = PostprocessorChain::from_config(&settings.chain, &labels)
        .context("Invalid postprocessor configuration")?;

    info!(
        "Model ready: {} labels, {} postprocessors",
        labels.len(),
        chain.len()
    );

    Ok(Prepared {
        engine: InferenceEngine::new(model),
        chain,
        labels,
    })
}
