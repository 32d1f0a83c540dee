//! Classifier port between capture and postprocessing.

use crate::domain::{Frame, ProbabilityVector};

/// Turns a stream of frames into one probability vector per frame.
///
/// Implementations may keep temporal state across calls, so a single caller
/// drives them.
pub trait FrameClassifier {
    /// Number of labels in every returned vector.
    fn num_labels(&self) -> usize;

    /// Advances the classifier by one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<ProbabilityVector>;
}
