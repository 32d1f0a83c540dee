//! Configuration file support for repcam.
//!
//! Layers, lowest priority first: the user file
//! `~/.config/repcam/config.toml`, the nearest `.repcam.toml` above the
//! working directory, then CLI flags (applied by `RunArgs::with_config`).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use repcam_core::postprocess::CounterSpec;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// File name under the user config directory.
const USER_FILE: &str = "config.toml";

/// File name searched for from the working directory upwards.
const PROJECT_FILE: &str = ".repcam.toml";

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General options.
    pub general: GeneralConfig,
    /// Model settings.
    pub model: ModelConfig,
    /// Smoothing settings.
    pub smoothing: SmoothingConfig,
    /// Capture settings.
    pub capture: CaptureConfig,
    /// Repetition counters, run in order after the smoother.
    pub counters: Vec<CounterSpec>,
}

/// General configuration options.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Camera device index.
    pub camera_id: Option<i32>,
    /// Run inference on a GPU when one is available.
    pub use_gpu: Option<bool>,
    /// Title shown by the display.
    pub title: Option<String>,
}

/// Model configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Backbone checkpoint path.
    pub backbone: Option<PathBuf>,
}

/// Smoothing configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Number of probability vectors averaged.
    pub window: Option<usize>,
    /// Number of labels reported per frame.
    pub top_k: Option<usize>,
}

/// Capture configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Playback rate of image-sequence inputs.
    pub fps: Option<f64>,
}

impl AppConfig {
    /// Reads the user file, then the nearest project file on top of it.
    ///
    /// Unreadable or malformed files are skipped with a warning; out-of-range
    /// values are reported but kept, and fail later when the chain is built.
    pub fn load() -> Self {
        let mut config = Self::default();

        for (layer, path) in [("user", xdg_config_path()), ("project", find_project_config())] {
            let Some(path) = path else { continue };
            if !path.is_file() {
                debug!("No {layer} config at {}", path.display());
                continue;
            }
            info!("Reading {layer} config {}", path.display());
            if let Some(layer_config) = load_file(&path) {
                config.merge(layer_config);
            }
        }

        if let Err(e) = config.validate() {
            eprintln!("warning: {e}");
        }

        config
    }

    /// Validate configuration values are within acceptable ranges.
    ///
    /// Label names are not checked here; they are resolved against the
    /// classifier when the model is assembled.
    fn validate(&self) -> Result<(), String> {
        if self.smoothing.window == Some(0) {
            return Err("smoothing.window must be at least 1".to_string());
        }
        if self.smoothing.top_k == Some(0) {
            return Err("smoothing.top_k must be at least 1".to_string());
        }
        if let Some(fps) = self.capture.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(format!("capture.fps must be positive, got {fps}"));
            }
        }

        let mut keys = HashSet::new();
        for counter in &self.counters {
            let key = counter.out_key();
            if !keys.insert(key) {
                return Err(format!("counters: duplicate out_key '{key}'"));
            }
            let thresholds = match counter {
                CounterSpec::OnePosition { threshold, .. } => vec![*threshold],
                CounterSpec::TwoPositions {
                    threshold0,
                    threshold1,
                    ..
                } => vec![*threshold0, *threshold1],
            };
            if let Some(t) = thresholds.iter().find(|t| !(0.0..=1.0).contains(*t)) {
                return Err(format!(
                    "counters: '{key}' threshold must be 0.0-1.0, got {t}"
                ));
            }
        }

        Ok(())
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    /// A non-empty counter list replaces the current one as a whole.
    fn merge(&mut self, other: Self) {
        // General
        self.general.camera_id = other.general.camera_id.or(self.general.camera_id);
        self.general.use_gpu = other.general.use_gpu.or(self.general.use_gpu);
        self.general.title = other.general.title.or_else(|| self.general.title.take());

        // Model
        self.model.backbone = other.model.backbone.or_else(|| self.model.backbone.take());

        // Smoothing
        self.smoothing.window = other.smoothing.window.or(self.smoothing.window);
        self.smoothing.top_k = other.smoothing.top_k.or(self.smoothing.top_k);

        // Capture
        self.capture.fps = other.capture.fps.or(self.capture.fps);

        // Counters
        if !other.counters.is_empty() {
            self.counters = other.counters;
        }
    }
}

/// `$XDG_CONFIG_HOME/repcam/config.toml` or the platform equivalent.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("repcam").join(USER_FILE))
}

fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Nearest `.repcam.toml` at or above `start`.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_FILE))
        .find(|path| path.is_file())
}

fn load_file(path: &Path) -> Option<AppConfig> {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| toml::from_str(&text).map_err(|e| e.to_string()));

    match parsed {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Ignoring config {}: {e}", path.display());
            None
        }
    }
}
