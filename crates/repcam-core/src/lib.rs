//! Repcam Core - Streaming action recognition and rep counting
//!
//! This crate contains the domain types, the port traits at the edges of the
//! streaming loop, model assembly from two checkpoints, the temporal inference
//! engine, the postprocessor chain (smoother and rep counters), and the
//! controller that drives capture, inference and output.

pub mod controller;
pub mod domain;
pub mod inference;
pub mod ports;
pub mod postprocess;

pub use controller::{CancelToken, Controller, RunState, RunSummary, StopReason};
pub use domain::{
    ConfigError, Counts, Frame, LabelMap, LabelScore, LoadError, ProbabilityVector, RunResult,
};
pub use ports::{FrameClassifier, FrameSource, OutputSink};
