//! Assembly of one runnable network from two independently trained checkpoints.
//!
//! The backbone checkpoint carries generic extractor weights. The classifier
//! checkpoint carries the head plus any extractor layers that were fine-tuned
//! together with it; those override the generic ones.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use tracing::{debug, info, warn};

use super::{
    load_weights, ActionPipeline, ExtractorConfig, FeatureExtractor, LogisticRegression, Pipe,
    WeightMap,
};
use crate::domain::{LabelMap, LoadError};

/// Classifier checkpoint file name inside a custom classifier directory.
pub const CLASSIFIER_FILE: &str = "classifier.safetensors";

/// Label metadata file name inside a custom classifier directory.
pub const LABELS_FILE: &str = "label2int.json";

/// Locations of the three inputs of an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    /// Generic backbone checkpoint.
    pub backbone: PathBuf,
    /// Classifier checkpoint (head + fine-tuned layers).
    pub classifier: PathBuf,
    /// `label → index` JSON metadata.
    pub labels: PathBuf,
}

impl CheckpointPaths {
    /// Resolves the classifier files of a custom classifier directory.
    #[must_use]
    pub fn from_classifier_dir(backbone: impl Into<PathBuf>, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            backbone: backbone.into(),
            classifier: dir.join(CLASSIFIER_FILE),
            labels: dir.join(LABELS_FILE),
        }
    }
}

/// Moves every layer present in both maps from `classifier` into `backbone`.
///
/// Keys only in `backbone` are untouched, keys only in `classifier` stay
/// there. Returns the moved keys in sorted order.
pub fn merge_finetuned(backbone: &mut WeightMap, classifier: &mut WeightMap) -> Vec<String> {
    let mut finetuned: Vec<String> = classifier
        .keys()
        .filter(|key| backbone.contains_key(*key))
        .cloned()
        .collect();
    finetuned.sort();

    for key in &finetuned {
        if let Some(tensor) = classifier.remove(key) {
            backbone.insert(key.clone(), tensor);
        }
    }

    finetuned
}

/// A network ready for inference, with the labels it predicts.
pub struct AssembledModel {
    /// Extractor → classifier composition.
    pub pipeline: ActionPipeline,
    /// Labels of the classifier outputs.
    pub labels: LabelMap,
    /// Backbone layers overridden by the classifier checkpoint.
    pub finetuned: Vec<String>,
    /// Device the weights live on.
    pub device: Device,
    /// Shape parameters the extractor was built with.
    pub config: ExtractorConfig,
}

/// Builds `AssembledModel`s for a fixed architecture and device.
pub struct ModelAssembler {
    config: ExtractorConfig,
    device: Device,
}

impl ModelAssembler {
    /// Creates an assembler.
    #[must_use]
    pub const fn new(config: ExtractorConfig, device: Device) -> Self {
        Self { config, device }
    }

    /// Loads both checkpoints and the label metadata, then assembles them.
    ///
    /// # Errors
    ///
    /// Returns a `LoadError` if any file is missing or unreadable, or if the
    /// weights do not fit the architecture.
    pub fn assemble(&self, paths: &CheckpointPaths) -> Result<AssembledModel, LoadError> {
        info!(
            "Assembling model from {} and {}",
            paths.backbone.display(),
            paths.classifier.display()
        );
        let backbone = load_weights(&paths.backbone, &self.device)?;
        let classifier = load_weights(&paths.classifier, &self.device)?;
        let labels = LabelMap::load(&paths.labels)?;
        self.assemble_weights(backbone, classifier, labels)
    }

    /// Assembles already loaded weight maps.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::Architecture` if a tensor is missing or mis-shaped.
    pub fn assemble_weights(
        &self,
        mut backbone: WeightMap,
        mut classifier: WeightMap,
        labels: LabelMap,
    ) -> Result<AssembledModel, LoadError> {
        let finetuned = merge_finetuned(&mut backbone, &mut classifier);
        if finetuned.is_empty() {
            debug!("No fine-tuned backbone layers in classifier checkpoint");
        } else {
            info!("Using {} fine-tuned backbone layers", finetuned.len());
            debug!("Fine-tuned layers: {finetuned:?}");
        }

        let unused: Vec<&String> = {
            let head_keys: HashSet<&str> = ["linear.weight", "linear.bias"].into_iter().collect();
            let mut keys: Vec<&String> = classifier
                .keys()
                .filter(|k| !head_keys.contains(k.as_str()))
                .collect();
            keys.sort();
            keys
        };
        if !unused.is_empty() {
            warn!("Ignoring classifier tensors unknown to the architecture: {unused:?}");
        }

        let vb = VarBuilder::from_tensors(backbone, DType::F32, &self.device);
        let extractor = FeatureExtractor::new(&self.config, vb).map_err(|source| {
            LoadError::Architecture {
                stage: "extractor",
                source,
            }
        })?;

        let vb = VarBuilder::from_tensors(classifier, DType::F32, &self.device);
        let head = LogisticRegression::new(extractor.feature_dim(), labels.len(), vb).map_err(
            |source| LoadError::Architecture {
                stage: "classifier",
                source,
            },
        )?;

        Ok(AssembledModel {
            pipeline: Pipe::new(extractor, head),
            labels,
            finetuned,
            device: self.device.clone(),
            config: self.config,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use candle_core::Tensor;

    fn scalar(value: f32) -> Tensor {
        Tensor::new(&[value], &Device::Cpu).unwrap()
    }

    fn value(map: &WeightMap, key: &str) -> f32 {
        map[key].to_vec1::<f32>().unwrap()[0]
    }

    #[test]
    fn test_merge_moves_common_keys_to_backbone() {
        let mut backbone = WeightMap::from([
            ("layer1".to_string(), scalar(1.0)),
            ("layer2".to_string(), scalar(2.0)),
        ]);
        let mut classifier = WeightMap::from([
            ("layer2".to_string(), scalar(20.0)),
            ("head".to_string(), scalar(5.0)),
        ]);

        let moved = merge_finetuned(&mut backbone, &mut classifier);

        assert_eq!(moved, vec!["layer2".to_string()]);
        assert_eq!(backbone.len(), 2);
        assert!((value(&backbone, "layer1") - 1.0).abs() < f32::EPSILON);
        assert!((value(&backbone, "layer2") - 20.0).abs() < f32::EPSILON);
        assert_eq!(classifier.len(), 1);
        assert!((value(&classifier, "head") - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_merge_without_overlap_is_noop() {
        let mut backbone = WeightMap::from([("a".to_string(), scalar(1.0))]);
        let mut classifier = WeightMap::from([("b".to_string(), scalar(2.0))]);

        assert!(merge_finetuned(&mut backbone, &mut classifier).is_empty());
        assert!(backbone.contains_key("a"));
        assert!(classifier.contains_key("b"));
    }

    #[test]
    fn test_paths_from_classifier_dir() {
        let paths = CheckpointPaths::from_classifier_dir("/b/backbone.safetensors", "/c/jumps");
        assert_eq!(paths.classifier, PathBuf::from("/c/jumps/classifier.safetensors"));
        assert_eq!(paths.labels, PathBuf::from("/c/jumps/label2int.json"));
    }

    #[test]
    fn test_missing_head_is_architecture_error() {
        let config = ExtractorConfig::default();
        let backbone: WeightMap = config
            .weight_shapes()
            .into_iter()
            .map(|(n, s)| (n, Tensor::zeros(s, DType::F32, &Device::Cpu).unwrap()))
            .collect();
        let labels = LabelMap::from_ordered(&["a", "b"]).unwrap();

        let assembler = ModelAssembler::new(config, Device::Cpu);
        let result = assembler.assemble_weights(backbone, WeightMap::new(), labels);
        assert!(matches!(
            result,
            Err(LoadError::Architecture {
                stage: "classifier",
                ..
            })
        ));
    }
}
