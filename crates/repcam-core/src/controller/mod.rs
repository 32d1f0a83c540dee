//! End-to-end streaming loop.
//!
//! The controller moves through `Starting → Streaming → Stopping → Stopped`.
//! Capture runs on its own thread and hands frames over through a one-slot
//! drop-oldest buffer; inference, postprocessing and output run on the
//! caller's thread in capture order.

mod cancel;
mod capture;
mod setup;

use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info, warn};

use crate::domain::{Counts, RunResult};
use crate::ports::{FrameClassifier, FrameSource, OutputSink};
use crate::postprocess::PostprocessorChain;

pub use cancel::CancelToken;
pub use capture::CaptureStats;
pub use setup::{prepare, EngineSettings, Prepared};

use capture::Capture;

/// How long the loop waits for a frame before re-checking cancellation.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Resources not yet acquired.
    Starting,
    /// Frames flowing.
    Streaming,
    /// Releasing resources.
    Stopping,
    /// Terminal.
    Stopped,
}

/// Why streaming ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The source ran out of frames or failed to read one.
    EndOfStream,
    /// Cancellation was requested.
    Cancelled,
    /// Inference or output failed mid-stream.
    Failed(String),
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Why streaming ended.
    pub reason: StopReason,
    /// Frames read from the source.
    pub frames_captured: u64,
    /// Frames that went through inference and output.
    pub frames_processed: u64,
    /// Frames replaced by newer ones before inference.
    pub frames_dropped: u64,
    /// Counter values after the last processed frame.
    pub counts: Counts,
}

/// Drives frames from a source through inference and postprocessing into
/// the display and an optional recorder.
pub struct Controller {
    classifier: Option<Box<dyn FrameClassifier>>,
    chain: PostprocessorChain,
    source: Option<Box<dyn FrameSource>>,
    display: Box<dyn OutputSink>,
    recorder: Option<Box<dyn OutputSink>>,
    poll_interval: Duration,
    state: RunState,
}

impl Controller {
    /// Creates a controller in the `Starting` state. Nothing is opened yet.
    #[must_use]
    pub fn new(
        classifier: Box<dyn FrameClassifier>,
        chain: PostprocessorChain,
        source: Box<dyn FrameSource>,
        display: Box<dyn OutputSink>,
    ) -> Self {
        Self {
            classifier: Some(classifier),
            chain,
            source: Some(source),
            display,
            recorder: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: RunState::Starting,
        }
    }

    /// Also writes every frame to `recorder`.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Box<dyn OutputSink>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Changes how often cancellation is re-checked while no frame arrives.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Runs until end of stream, cancellation or a mid-stream failure.
    ///
    /// Every acquired resource is released exactly once, whatever the exit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller was already run, if the source or
    /// a sink cannot be opened, or if releasing a resource fails.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<RunSummary> {
        if self.state != RunState::Starting {
            anyhow::bail!("Controller cannot run from state {:?}", self.state);
        }

        let source = match self.start() {
            Ok(source) => source,
            Err(e) => {
                self.state = RunState::Stopped;
                return Err(e);
            }
        };

        let capture = match Capture::spawn(source) {
            Ok(capture) => capture,
            Err(failed) => {
                self.state = RunState::Stopping;
                if let Some(mut source) = failed.source {
                    close_source(source.as_mut());
                }
                let _ = self.release_sinks();
                self.state = RunState::Stopped;
                return Err(failed.error);
            }
        };

        self.state = RunState::Streaming;
        info!("Streaming");
        let (reason, processed, last) = self.stream(&capture, cancel);

        self.state = RunState::Stopping;
        info!("Stopping: {reason:?}");
        let captured = capture.stop();
        let released = self.release_sinks();
        if self.classifier.take().is_some() {
            debug!("Released inference engine");
        }
        self.state = RunState::Stopped;
        info!("Stopped");

        let stats = captured?;
        released?;

        Ok(RunSummary {
            reason,
            frames_captured: stats.captured,
            frames_processed: processed,
            frames_dropped: stats.dropped,
            counts: last.map(|r| r.counts).unwrap_or_default(),
        })
    }

    /// Opens the source, the display and the recorder, rolling back on failure.
    fn start(&mut self) -> Result<Box<dyn FrameSource>> {
        info!("Starting");
        let mut source = self
            .source
            .take()
            .context("Frame source already consumed")?;

        source
            .open()
            .with_context(|| format!("Failed to open {}", source.describe()))?;
        info!("Opened {}", source.describe());

        if let Err(e) = self.display.open() {
            close_source(source.as_mut());
            return Err(e.context(format!("Failed to open {}", self.display.describe())));
        }

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.open() {
                let e = e.context(format!("Failed to open {}", recorder.describe()));
                self.recorder = None;
                if let Err(close) = self.display.close() {
                    warn!("Failed to close display: {close:#}");
                }
                close_source(source.as_mut());
                return Err(e);
            }
            info!("Recording to {}", recorder.describe());
        }

        Ok(source)
    }

    /// The streaming loop. Returns why it ended, how many frames went
    /// through and the last result.
    fn stream(
        &mut self,
        capture: &Capture,
        cancel: &CancelToken,
    ) -> (StopReason, u64, Option<RunResult>) {
        let mut processed = 0u64;
        let mut last = None;

        let Some(classifier) = self.classifier.as_mut() else {
            return (StopReason::Failed("no classifier".into()), 0, None);
        };

        let reason = loop {
            if cancel.is_cancelled() {
                info!("Cancellation requested");
                break StopReason::Cancelled;
            }

            let frame = match capture.recv(self.poll_interval) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break StopReason::EndOfStream,
            };

            let probabilities = match classifier.infer(&frame) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Inference failed on frame {}: {e:#}", frame.index);
                    break StopReason::Failed(format!("{e:#}"));
                }
            };

            let result = self.chain.apply(frame.index, &probabilities);

            if let Err(e) = self.display.write(&frame, &result) {
                warn!("Display failed on frame {}: {e:#}", frame.index);
                break StopReason::Failed(format!("{e:#}"));
            }
            if let Some(recorder) = self.recorder.as_mut() {
                if let Err(e) = recorder.write(&frame, &result) {
                    warn!("Recording failed on frame {}: {e:#}", frame.index);
                    break StopReason::Failed(format!("{e:#}"));
                }
            }

            processed += 1;
            last = Some(result);
        };

        let stats = capture.stats();
        debug!(
            "Processed {processed} of {} captured frames ({} dropped)",
            stats.captured, stats.dropped
        );
        (reason, processed, last)
    }

    /// Closes the recorder and the display, each at most once.
    fn release_sinks(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Some(mut recorder) = self.recorder.take() {
            if let Err(e) = recorder.close() {
                warn!("Failed to close {}: {e:#}", recorder.describe());
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.display.close() {
            warn!("Failed to close {}: {e:#}", self.display.describe());
            first_error.get_or_insert(e);
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        // Unwinding out of `run` mid-stream still releases the sinks
        if matches!(self.state, RunState::Streaming | RunState::Stopping) {
            let _ = self.release_sinks();
            self.state = RunState::Stopped;
        }
    }
}

fn close_source(source: &mut dyn FrameSource) {
    if let Err(e) = source.close() {
        warn!("Failed to close {}: {e:#}", source.describe());
    }
}
