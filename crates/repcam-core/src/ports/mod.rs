//! Port definitions for hexagonal architecture.
//!
//! These traits define the boundaries between the streaming core and the
//! capture, inference and output adapters.

mod classifier;
mod frame_source;
mod output_sink;

pub use classifier::FrameClassifier;
pub use frame_source::FrameSource;
pub use output_sink::OutputSink;
