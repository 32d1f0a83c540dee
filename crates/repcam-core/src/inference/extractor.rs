//! Strided convolutional feature extractor.
//!
//! Runs a small conv stack on every frame of the temporal window, pools each
//! frame spatially, averages over time and projects to a fixed-size feature.

use candle_core::{Module, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};

/// Shape parameters of the feature extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Frames are resized to `frame_size × frame_size` before inference.
    pub frame_size: usize,
    /// Channel widths: input, then the output of each conv layer.
    pub channels: [usize; 4],
    /// Square kernel size of every conv layer.
    pub kernel_size: usize,
    /// Width of the output feature vector.
    pub feature_dim: usize,
    /// Number of frames in the temporal window.
    pub window: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            frame_size: 64,
            channels: [3, 16, 32, 64],
            kernel_size: 3,
            feature_dim: 128,
            window: 4,
        }
    }
}

impl ExtractorConfig {
    /// Names and shapes of every tensor the extractor binds.
    #[must_use]
    pub fn weight_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let k = self.kernel_size;
        let mut shapes = Vec::with_capacity(8);
        for (i, pair) in self.channels.windows(2).enumerate() {
            let name = format!("conv{}", i + 1);
            shapes.push((format!("{name}.weight"), vec![pair[1], pair[0], k, k]));
            shapes.push((format!("{name}.bias"), vec![pair[1]]));
        }
        let last = self.channels[self.channels.len() - 1];
        shapes.push(("proj.weight".to_string(), vec![self.feature_dim, last]));
        shapes.push(("proj.bias".to_string(), vec![self.feature_dim]));
        shapes
    }
}

/// Backbone stage of the pipeline.
pub struct FeatureExtractor {
    convs: Vec<Conv2d>,
    proj: Linear,
    feature_dim: usize,
}

impl FeatureExtractor {
    /// Binds the extractor to its weights.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ExtractorConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_config = Conv2dConfig {
            padding: config.kernel_size / 2,
            stride: 2,
            ..Conv2dConfig::default()
        };

        let convs = config
            .channels
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                conv2d(
                    pair[0],
                    pair[1],
                    config.kernel_size,
                    conv_config,
                    vb.pp(format!("conv{}", i + 1)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let last = config.channels[config.channels.len() - 1];
        let proj = linear(last, config.feature_dim, vb.pp("proj"))?;

        Ok(Self {
            convs,
            proj,
            feature_dim: config.feature_dim,
        })
    }

    /// Width of the produced feature vector.
    #[must_use]
    pub const fn feature_dim(&self) -> usize {
        self.feature_dim
    }
}

impl Module for FeatureExtractor {
    /// `(T, C, H, W)` window → `(1, feature_dim)` feature.
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = x.clone();
        for conv in &self.convs {
            h = conv.forward(&h)?.relu()?;
        }

        // Spatial pool per frame, then temporal pool over the window
        let h = h.mean((2, 3))?;
        let h = h.mean_keepdim(0)?;

        self.proj.forward(&h)?.relu()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use std::collections::HashMap;

    fn zero_weights(config: &ExtractorConfig) -> HashMap<String, Tensor> {
        config
            .weight_shapes()
            .into_iter()
            .map(|(name, shape)| {
                let t = Tensor::zeros(shape, DType::F32, &Device::Cpu).unwrap();
                (name, t)
            })
            .collect()
    }

    #[test]
    fn test_weight_shapes() {
        let config = ExtractorConfig::default();
        let shapes = config.weight_shapes();
        assert_eq!(shapes.len(), 8);
        assert_eq!(shapes[0], ("conv1.weight".to_string(), vec![16, 3, 3, 3]));
        assert_eq!(shapes[7], ("proj.bias".to_string(), vec![128]));
    }

    #[test]
    fn test_forward_shape() {
        let config = ExtractorConfig {
            frame_size: 16,
            ..ExtractorConfig::default()
        };
        let vb = VarBuilder::from_tensors(zero_weights(&config), DType::F32, &Device::Cpu);
        let extractor = FeatureExtractor::new(&config, vb).unwrap();

        let input = Tensor::zeros((config.window, 3, 16, 16), DType::F32, &Device::Cpu).unwrap();
        let out = extractor.forward(&input).unwrap();
        assert_eq!(out.dims(), &[1, config.feature_dim]);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let config = ExtractorConfig::default();
        let mut weights = zero_weights(&config);
        weights.insert(
            "proj.weight".to_string(),
            Tensor::zeros((7, 7), DType::F32, &Device::Cpu).unwrap(),
        );
        let vb = VarBuilder::from_tensors(weights, DType::F32, &Device::Cpu);
        assert!(FeatureExtractor::new(&config, vb).is_err());
    }
}
