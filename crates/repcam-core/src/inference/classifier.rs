//! Logistic regression head.

use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Classifier stage: one linear layer followed by softmax.
pub struct LogisticRegression {
    linear: Linear,
    num_out: usize,
}

impl LogisticRegression {
    /// Binds the head to its weights (`linear.weight`, `linear.bias`).
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor is missing or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(num_in: usize, num_out: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let linear = linear(num_in, num_out, vb.pp("linear"))?;
        Ok(Self { linear, num_out })
    }

    /// Number of output classes.
    #[must_use]
    pub const fn num_out(&self) -> usize {
        self.num_out
    }
}

impl Module for LogisticRegression {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let logits = self.linear.forward(x)?;
        candle_nn::ops::softmax_last_dim(&logits)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use std::collections::HashMap;

    #[test]
    fn test_output_is_distribution() {
        let device = Device::Cpu;
        let weights = HashMap::from([
            (
                "linear.weight".to_string(),
                Tensor::new(&[[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0]], &device).unwrap(),
            ),
            (
                "linear.bias".to_string(),
                Tensor::new(&[0.0f32, 0.5, -0.5], &device).unwrap(),
            ),
        ]);
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let head = LogisticRegression::new(2, 3, vb).unwrap();

        let x = Tensor::new(&[[0.3f32, 0.7]], &device).unwrap();
        let probs = head.forward(&x).unwrap().squeeze(0).unwrap();
        let probs = probs.to_vec1::<f32>().unwrap();

        assert_eq!(probs.len(), 3);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|p| *p > 0.0));
    }
}
