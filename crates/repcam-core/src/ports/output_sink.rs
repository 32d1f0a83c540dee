//! Output sink port for rendering and recording results.

use crate::domain::{Frame, RunResult};

/// Port for consuming annotated frames, e.g. a display or a video recorder.
pub trait OutputSink {
    /// Human readable description used in logs.
    fn describe(&self) -> String;

    /// Acquires the window or output file.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be opened.
    fn open(&mut self) -> anyhow::Result<()>;

    /// Consumes one frame and its results. Called in capture order.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing fails.
    fn write(&mut self, frame: &Frame, result: &RunResult) -> anyhow::Result<()>;

    /// Flushes pending output and releases the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn close(&mut self) -> anyhow::Result<()>;
}
