//! Synthetic frames and checkpoints for tests.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Rgb, RgbImage, RgbaImage};
use repcam_core::inference::{ExtractorConfig, CLASSIFIER_FILE, LABELS_FILE};
use safetensors::tensor::TensorView;
use safetensors::Dtype;

/// Builder for synthetic RGB frames.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticFrameBuilder {
    width: u32,
    height: u32,
}

impl Default for SyntheticFrameBuilder {
    fn default() -> Self {
        Self::new(32, 24)
    }
}

impl SyntheticFrameBuilder {
    /// Frames of `width × height` pixels.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A frame filled with one colour.
    #[must_use]
    pub fn solid(&self, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(self.width, self.height, Rgb(rgb))
    }

    /// A horizontal gradient, shifted by `phase` so consecutive frames differ.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn gradient(&self, phase: u32) -> RgbImage {
        let w = self.width.max(1);
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let v = (((x + phase) % w) * 255 / w) as u8;
            Rgb([v, (y % 256) as u8, 255 - v])
        })
    }

    /// `count` gradient frames.
    #[must_use]
    pub fn sequence(&self, count: u32) -> Vec<RgbImage> {
        (0..count).map(|i| self.gradient(i * 3)).collect()
    }

    /// Writes `count` numbered PNG frames into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a frame cannot be written.
    pub fn write_png_dir(&self, dir: &Path, count: u32) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        self.sequence(count)
            .into_iter()
            .enumerate()
            .map(|(i, img)| {
                let path = dir.join(format!("frame_{i:04}.png"));
                img.save(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                Ok(path)
            })
            .collect()
    }

    /// Writes `count` frames as an animated GIF, `delay_ms` apart.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or encoded.
    pub fn write_gif(&self, path: &Path, count: u32, delay_ms: u32) -> Result<()> {
        let file =
            fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut encoder = GifEncoder::new(file);
        encoder.set_repeat(Repeat::Infinite)?;
        for img in self.sequence(count) {
            let rgba: RgbaImage = image::DynamicImage::ImageRgb8(img).into_rgba8();
            let frame =
                image::Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1));
            encoder.encode_frame(frame)?;
        }
        Ok(())
    }
}

/// Writes small checkpoints that fit `ExtractorConfig`.
///
/// Backbone weights are a small positive constant so features stay finite.
/// The classifier head has zero weights and a bias that favours one label,
/// which makes predictions deterministic regardless of frame content.
/// `with_head_gain` makes the head weights non-zero so that predictions
/// follow frame brightness.
#[derive(Debug, Clone)]
pub struct CheckpointBuilder {
    config: ExtractorConfig,
    labels: Vec<String>,
    favoured: usize,
    finetuned: Vec<String>,
    extra: Vec<(String, Vec<usize>)>,
    head_outputs: Option<usize>,
    head_gain: f32,
}

impl CheckpointBuilder {
    /// A builder for a classifier over `labels`, on a tiny architecture.
    #[must_use]
    pub fn new(labels: &[&str]) -> Self {
        Self {
            config: Self::tiny_config(),
            labels: labels.iter().map(ToString::to_string).collect(),
            favoured: 0,
            finetuned: Vec::new(),
            extra: Vec::new(),
            head_outputs: None,
            head_gain: 0.0,
        }
    }

    /// An architecture small enough for fast tests.
    #[must_use]
    pub const fn tiny_config() -> ExtractorConfig {
        ExtractorConfig {
            frame_size: 16,
            channels: [3, 4, 8, 8],
            kernel_size: 3,
            feature_dim: 8,
            window: 2,
        }
    }

    /// Uses a different architecture.
    #[must_use]
    pub const fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// The architecture the written weights fit.
    #[must_use]
    pub const fn config(&self) -> ExtractorConfig {
        self.config
    }

    /// Makes the head favour the label at `index`.
    #[must_use]
    pub const fn favouring(mut self, index: usize) -> Self {
        self.favoured = index;
        self
    }

    /// Also writes backbone tensor `name` into the classifier checkpoint.
    #[must_use]
    pub fn finetune(mut self, name: &str) -> Self {
        self.finetuned.push(name.to_string());
        self
    }

    /// Adds a tensor unknown to the architecture to the classifier checkpoint.
    #[must_use]
    pub fn with_extra_tensor(mut self, name: &str, shape: &[usize]) -> Self {
        self.extra.push((name.to_string(), shape.to_vec()));
        self
    }

    /// Writes a head with `outputs` rows instead of one per label.
    #[must_use]
    pub const fn with_head_outputs(mut self, outputs: usize) -> Self {
        self.head_outputs = Some(outputs);
        self
    }

    /// Sets head row `r` to `gain * r`, so brighter input shifts probability
    /// towards later labels.
    #[must_use]
    pub const fn with_head_gain(mut self, gain: f32) -> Self {
        self.head_gain = gain;
        self
    }

    /// Writes the backbone checkpoint to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_backbone(&self, path: &Path) -> Result<()> {
        let tensors: Vec<(String, Vec<usize>, Vec<f32>)> = self
            .config
            .weight_shapes()
            .into_iter()
            .map(|(name, shape)| {
                let fill = if name.ends_with(".bias") { 0.0 } else { 0.01 };
                let data = vec![fill; shape.iter().product()];
                (name, shape, data)
            })
            .collect();
        write_safetensors(path, &tensors)
    }

    /// Writes `classifier.safetensors` and `label2int.json` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or a write fails.
    pub fn write_classifier_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let outputs = self.head_outputs.unwrap_or(self.labels.len());
        let features = self.config.feature_dim;
        let mut bias = vec![0.0_f32; outputs];
        if let Some(b) = bias.get_mut(self.favoured) {
            *b = 5.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let weight: Vec<f32> = (0..outputs * features)
            .map(|i| self.head_gain * (i / features) as f32)
            .collect();

        let mut tensors = vec![
            ("linear.weight".to_string(), vec![outputs, features], weight),
            ("linear.bias".to_string(), vec![outputs], bias),
        ];

        let shapes: HashMap<String, Vec<usize>> = self.config.weight_shapes().into_iter().collect();
        for name in &self.finetuned {
            let shape = shapes
                .get(name)
                .with_context(|| format!("{name} is not a backbone tensor"))?;
            tensors.push((name.clone(), shape.clone(), vec![0.02; shape.iter().product()]));
        }
        for (name, shape) in &self.extra {
            tensors.push((name.clone(), shape.clone(), vec![0.0; shape.iter().product()]));
        }

        write_safetensors(&dir.join(CLASSIFIER_FILE), &tensors)?;

        let class2int: BTreeMap<&str, usize> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_str(), i))
            .collect();
        let json = serde_json::to_string_pretty(&class2int)?;
        fs::write(dir.join(LABELS_FILE), json)?;
        Ok(())
    }

    /// Writes a backbone and a classifier directory under `root`.
    ///
    /// Returns `(backbone_path, classifier_dir)`.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails.
    pub fn write_all(&self, root: &Path) -> Result<(PathBuf, PathBuf)> {
        let backbone = root.join("backbone.safetensors");
        let classifier_dir = root.join("classifier");
        self.write_backbone(&backbone)?;
        self.write_classifier_dir(&classifier_dir)?;
        Ok((backbone, classifier_dir))
    }
}

fn write_safetensors(path: &Path, tensors: &[(String, Vec<usize>, Vec<f32>)]) -> Result<()> {
    let views = tensors
        .iter()
        .map(|(name, shape, data)| {
            let bytes: &[u8] = bytemuck::cast_slice(data);
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)?;
            Ok((name.clone(), view))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    safetensors::serialize_to_file(views, &None, path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
