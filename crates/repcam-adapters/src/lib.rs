//! Repcam Adapters - External adapters for repcam.
//!
//! This crate provides adapters for:
//! - Frame sources (image sequences, animated GIFs, video files, cameras)
//! - Recorders with result overlays (GIF, PNG frames, video)
//! - Console display and JSON Lines results, fanned out to one sink
//! - Backbone checkpoint location
//! - Project tag documents

#[cfg(feature = "video")]
mod cv;
pub mod display;
pub mod fanout;
pub mod jsonl;
pub mod models;
pub mod overlay;
pub mod project;
pub mod recorder;
pub mod video;

pub use display::ConsoleDisplay;
pub use fanout::SinkGroup;
pub use jsonl::JsonlSink;
pub use models::{backbone_dir, default_backbone_path, resolve_backbone};
pub use project::ProjectConfig;
#[cfg(feature = "video")]
pub use recorder::VideoRecorder;
pub use recorder::{recorder_for, FrameDirRecorder, GifRecorder};
#[cfg(feature = "video")]
pub use video::CaptureSource;
pub use video::{FileFrameSource, SourceSpec, DEFAULT_FPS};
