//! Core domain types shared by every stage of the stream.

mod error;
mod frame;
mod labels;
mod result;

pub use error::{ConfigError, LoadError};
pub use frame::Frame;
pub use labels::LabelMap;
pub use result::{Counts, LabelScore, ProbabilityVector, RunResult};
