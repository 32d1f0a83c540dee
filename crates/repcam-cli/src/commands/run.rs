//! Run command - stream frames through a custom classifier.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use repcam_adapters::{
    recorder_for, resolve_backbone, ConsoleDisplay, JsonlSink, SinkGroup, SourceSpec,
};
use repcam_core::controller::{prepare, EngineSettings};
use repcam_core::inference::{CheckpointPaths, DeviceChoice, ExtractorConfig};
use repcam_core::postprocess::{ChainConfig, CounterSpec, SmootherConfig};
use repcam_core::{CancelToken, Controller, RunSummary, StopReason};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, info};

use super::ExitCode;
use crate::config::AppConfig;

/// Hardcoded default values.
mod defaults {
    pub const CAMERA_ID: i32 = 0;
    pub const TITLE: &str = "repcam";
}

/// Parse a strictly positive frame rate.
fn parse_fps(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not a positive frame rate"))
    }
}

/// Parse a count that must be at least 1.
fn parse_window(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{s}' is not a valid count")),
    }
}

/// Shared arguments for a streaming run.
#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// Directory holding classifier.safetensors and label2int.json
    #[arg(long = "custom_classifier", alias = "custom-classifier", value_name = "PATH")]
    pub custom_classifier: Option<PathBuf>,

    /// Camera device index (used when no --path_in is given)
    #[arg(long = "camera_id", alias = "camera-id", value_name = "CAMERA_ID")]
    pub camera_id: Option<i32>,

    /// Video to stream from: video file (with the `video` feature), animated
    /// GIF, image file or directory of frames
    #[arg(long = "path_in", alias = "path-in", value_name = "FILENAME")]
    pub path_in: Option<PathBuf>,

    /// Where to record annotated frames: *.gif, a video file (with the `video`
    /// feature), or a directory for PNG frames
    #[arg(long = "path_out", alias = "path-out", value_name = "FILENAME")]
    pub path_out: Option<PathBuf>,

    /// Title shown by the display
    #[arg(long)]
    pub title: Option<String>,

    /// Run inference on a GPU when one is available
    #[arg(long = "use_gpu", alias = "use-gpu")]
    pub use_gpu: bool,

    /// Backbone checkpoint (overrides default and config)
    #[arg(long, value_name = "FILE")]
    pub backbone: Option<PathBuf>,

    /// Write one JSON result per frame to this file ("-" for stdout)
    #[arg(long, value_name = "FILE")]
    pub results: Option<PathBuf>,

    /// Playback rate of image-sequence inputs
    #[arg(long, value_parser = parse_fps)]
    pub fps: Option<f64>,

    /// Number of probability vectors averaged by the smoother
    #[arg(long, value_parser = parse_window)]
    pub smoothing: Option<usize>,

    /// Suppress the live display
    #[arg(short, long)]
    pub quiet: bool,

    /// Number of labels ranked per frame (from config only).
    #[arg(skip)]
    top_k: Option<usize>,

    /// Counters (from config only).
    #[arg(skip)]
    counters: Vec<CounterSpec>,
}

impl RunArgs {
    /// Apply configuration file values, respecting CLI precedence.
    ///
    /// Layering priority (lowest to highest):
    /// 1. Hardcoded defaults (in accessor methods)
    /// 2. Config file values (XDG, then project-local)
    /// 3. CLI arguments (already set on self)
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        args.camera_id = args.camera_id.or(config.general.camera_id);
        if !args.use_gpu {
            args.use_gpu = config.general.use_gpu.unwrap_or(false);
        }
        if args.title.is_none() {
            args.title.clone_from(&config.general.title);
        }
        if args.backbone.is_none() {
            args.backbone.clone_from(&config.model.backbone);
        }
        args.fps = args.fps.or(config.capture.fps);
        args.smoothing = args.smoothing.or(config.smoothing.window);
        args.top_k = config.smoothing.top_k;
        args.counters.clone_from(&config.counters);
        args
    }

    /// Camera index with fallback to the hardcoded default.
    fn camera_id(&self) -> i32 {
        self.camera_id.unwrap_or(defaults::CAMERA_ID)
    }

    /// Display title with fallback to the hardcoded default.
    fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(defaults::TITLE)
    }

    /// Image-sequence frame rate with fallback to the adapter default.
    fn fps(&self) -> f64 {
        self.fps.unwrap_or(repcam_adapters::DEFAULT_FPS)
    }

    /// Smoother and counters.
    fn chain(&self) -> ChainConfig {
        let defaults = SmootherConfig::default();
        ChainConfig {
            smoothing: SmootherConfig {
                window: self.smoothing.unwrap_or(defaults.window),
                top_k: self.top_k.unwrap_or(defaults.top_k),
            },
            counters: self.counters.clone(),
        }
    }
}

/// Result of running the run command.
pub struct RunOutcome {
    /// What happened during streaming.
    #[allow(dead_code)] // Exposed for programmatic use
    pub summary: RunSummary,
    /// Exit code.
    pub exit_code: ExitCode,
}

/// Run the run command.
///
/// Expects `args` to have been processed through `with_config()` first
/// to apply configuration file settings.
pub fn run(args: &RunArgs) -> Result<RunOutcome> {
    let Some(classifier_dir) = args.custom_classifier.as_ref() else {
        anyhow::bail!("--custom_classifier is required. Use --help for usage information.");
    };

    // Everything that can fail statically fails here, before any device is opened
    let settings = EngineSettings {
        paths: CheckpointPaths::from_classifier_dir(
            resolve_backbone(args.backbone.as_deref()),
            classifier_dir,
        ),
        extractor: ExtractorConfig::default(),
        device: DeviceChoice::from_use_gpu(args.use_gpu),
        chain: args.chain(),
    };
    debug!("Engine settings: {settings:?}");
    let prepared = prepare(&settings)?;

    let source = SourceSpec::from_args(args.path_in.as_deref(), args.camera_id()).build(args.fps())?;
    let recorder = args
        .path_out
        .as_deref()
        .map(|path| recorder_for(path, args.fps()))
        .transpose()?;

    let mut display = SinkGroup::new().with(Box::new(ConsoleDisplay::new(args.title(), args.quiet)));
    if let Some(path) = &args.results {
        let sink = if path.as_os_str() == "-" {
            JsonlSink::stdout()
        } else {
            JsonlSink::create(path)?
        };
        display = display.with(Box::new(sink));
    }

    let mut controller = Controller::new(
        Box::new(prepared.engine),
        prepared.chain,
        source,
        Box::new(display),
    );
    if let Some(recorder) = recorder {
        controller = controller.with_recorder(recorder);
    }

    let cancel = CancelToken::new();
    register_signals(&cancel)?;

    let summary = controller.run(&cancel)?;
    info!(
        "Processed {} of {} frames ({} dropped)",
        summary.frames_processed, summary.frames_captured, summary.frames_dropped
    );

    let exit_code = exit_code_for(&summary.reason)?;
    Ok(RunOutcome { summary, exit_code })
}

/// SIGINT and SIGTERM request cancellation. A second signal after that
/// terminates immediately.
fn register_signals(cancel: &CancelToken) -> Result<()> {
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(
            signal,
            i32::from(ExitCode::Interrupted.code()),
            cancel.flag(),
        )
        .context("Failed to install signal handler")?;
        signal_hook::flag::register(signal, cancel.flag())
            .context("Failed to install signal handler")?;
    }
    Ok(())
}

/// Maps how streaming ended to a process exit code.
fn exit_code_for(reason: &StopReason) -> Result<ExitCode> {
    match reason {
        StopReason::EndOfStream => Ok(ExitCode::Success),
        StopReason::Cancelled => Ok(ExitCode::Interrupted),
        StopReason::Failed(reason) => anyhow::bail!("Streaming failed: {reason}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fps() {
        assert_eq!(parse_fps("12.5"), Ok(12.5));
        assert!(parse_fps("0").is_err());
        assert!(parse_fps("-3").is_err());
        assert!(parse_fps("fast").is_err());
    }

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("4"), Ok(4));
        assert!(parse_window("0").is_err());
        assert!(parse_window("-1").is_err());
    }

    #[test]
    fn test_cli_wins_over_config() {
        let config: AppConfig = toml::from_str(
            r"
[general]
camera_id = 3
title = 'from config'

[smoothing]
window = 8
top_k = 1
",
        )
        .unwrap();
        let cli = RunArgs {
            title: Some("from cli".into()),
            ..RunArgs::default()
        };

        let args = RunArgs::with_config(cli, &config);
        assert_eq!(args.title(), "from cli");
        assert_eq!(args.camera_id(), 3);
        let chain = args.chain();
        assert_eq!(chain.smoothing.window, 8);
        assert_eq!(chain.smoothing.top_k, 1);
    }

    #[test]
    fn test_defaults_without_config() {
        let args = RunArgs::with_config(RunArgs::default(), &AppConfig::default());
        assert_eq!(args.camera_id(), 0);
        assert_eq!(args.title(), "repcam");
        assert!((args.fps() - repcam_adapters::DEFAULT_FPS).abs() < f64::EPSILON);
        assert_eq!(args.chain().smoothing, SmootherConfig::default());
        assert!(!args.use_gpu);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&StopReason::EndOfStream).unwrap(), ExitCode::Success);
        assert_eq!(exit_code_for(&StopReason::Cancelled).unwrap(), ExitCode::Interrupted);
        assert!(exit_code_for(&StopReason::Failed("boom".into())).is_err());
        assert_eq!(ExitCode::Interrupted.code(), 130);
    }
}
