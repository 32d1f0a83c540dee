//! Test support utilities for repcam.
//!
//! Provides mocks of every core port, synthetic frame builders, and a writer
//! for small but architecturally valid checkpoints.
//!
//! # Example
//!
//! ```
//! use repcam_test_support::{MockFrameSource, MockOutputSink};
//!
//! let source = MockFrameSource::new(3);
//! let sink = MockOutputSink::new();
//! let tracker = sink.tracker();
//! assert_eq!(tracker.close_count(), 0);
//! # let _ = source;
//! ```

mod builders;
mod mocks;

pub use builders::{CheckpointBuilder, SyntheticFrameBuilder};
pub use mocks::{
    ClassifierTracker, MockClassifier, MockFrameSource, MockOutputSink, SinkTracker, SourceTracker,
};
