//! Temporal inference engine.

// Allow common ML code patterns
#![allow(clippy::cast_possible_truncation)]

use std::collections::VecDeque;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use image::imageops::FilterType;
use tracing::{debug, trace};

use super::{ActionPipeline, AssembledModel};
use crate::domain::{Frame, LabelMap, ProbabilityVector};
use crate::ports::FrameClassifier;

/// Runs the assembled network over a sliding window of recent frames.
///
/// Until the window is full it is padded by repeating the oldest buffered
/// frame, so a probability vector comes out of the very first call.
pub struct InferenceEngine {
    pipeline: ActionPipeline,
    labels: LabelMap,
    device: Device,
    frame_size: usize,
    window: usize,
    buffer: VecDeque<Tensor>,
}

impl InferenceEngine {
    /// Wraps an assembled model. The device was fixed at assembly time.
    #[must_use]
    pub fn new(model: AssembledModel) -> Self {
        let window = model.config.window.max(1);
        Self {
            pipeline: model.pipeline,
            labels: model.labels,
            device: model.device,
            frame_size: model.config.frame_size,
            window,
            buffer: VecDeque::with_capacity(window),
        }
    }

    /// Labels of the probability vectors this engine produces.
    #[must_use]
    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Device the network runs on.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Number of real (non-padded) frames currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops all temporal history.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Resizes a frame and converts it to a `(3, S, S)` tensor in `[0, 1]`.
    fn preprocess(&self, frame: &Frame) -> Result<Tensor> {
        let size = self.frame_size as u32;
        let resized = image::imageops::resize(&frame.image, size, size, FilterType::Triangle);

        let plane = self.frame_size * self.frame_size;
        let mut data = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + i] = f32::from(pixel[c]) / 255.0;
            }
        }

        Tensor::from_vec(data, (3, self.frame_size, self.frame_size), &self.device)
            .context("Failed to create frame tensor")
    }

    /// Stacks the buffered frames into a `(window, 3, S, S)` input.
    fn window_input(&self) -> Result<Tensor> {
        let oldest = self
            .buffer
            .front()
            .context("Temporal window is empty")?;
        let padding = self.window.saturating_sub(self.buffer.len());

        let frames: Vec<&Tensor> = std::iter::repeat(oldest)
            .take(padding)
            .chain(self.buffer.iter())
            .collect();

        Tensor::stack(&frames, 0).context("Failed to stack temporal window")
    }
}

impl FrameClassifier for InferenceEngine {
    fn num_labels(&self) -> usize {
        self.labels.len()
    }

    fn infer(&mut self, frame: &Frame) -> Result<ProbabilityVector> {
        let tensor = self.preprocess(frame)?;
        if self.buffer.len() == self.window {
            self.buffer.pop_front();
        }
        self.buffer.push_back(tensor);
        trace!("Frame {} buffered ({}/{})", frame.index, self.buffer.len(), self.window);

        let input = self.window_input()?;
        let output = self
            .pipeline
            .forward(&input)
            .context("Forward pass failed")?;
        let probabilities = output
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()
            .context("Failed to read classifier output")?;

        debug!("Frame {} inferred", frame.index);
        Ok(probabilities)
    }
}
