//! Mock implementations of core port traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};
use repcam_core::domain::{Frame, ProbabilityVector, RunResult};
use repcam_core::ports::{FrameClassifier, FrameSource, OutputSink};
use repcam_core::CancelToken;

/// Shared view of a `MockFrameSource` that survives handing it to a controller.
#[derive(Debug, Clone, Default)]
pub struct SourceTracker {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    read: Arc<AtomicUsize>,
}

impl SourceTracker {
    /// Times `open()` succeeded.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Times `close()` was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Frames handed out.
    #[must_use]
    pub fn frames_read(&self) -> usize {
        self.read.load(Ordering::SeqCst)
    }
}

/// Mock implementation of `FrameSource` for testing.
///
/// Yields small synthetic frames, optionally spaced by a fixed interval, and
/// records open/close calls.
pub struct MockFrameSource {
    remaining: Option<u64>,
    next_index: u64,
    interval: Duration,
    fail_open: bool,
    fail_at: Option<u64>,
    tracker: SourceTracker,
}

impl MockFrameSource {
    /// A source that yields `frames` frames, then ends.
    #[must_use]
    pub fn new(frames: u64) -> Self {
        Self {
            remaining: Some(frames),
            next_index: 0,
            interval: Duration::ZERO,
            fail_open: false,
            fail_at: None,
            tracker: SourceTracker::default(),
        }
    }

    /// A source that never ends on its own.
    #[must_use]
    pub fn endless() -> Self {
        Self {
            remaining: None,
            ..Self::new(0)
        }
    }

    /// Waits `interval` before every frame except the first.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Makes `open()` fail.
    #[must_use]
    pub const fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Makes reading frame `index` fail.
    #[must_use]
    pub const fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Handle for assertions after the source was moved.
    #[must_use]
    pub fn tracker(&self) -> SourceTracker {
        self.tracker.clone()
    }
}

impl FrameSource for MockFrameSource {
    fn describe(&self) -> String {
        "mock source".to_string()
    }

    fn open(&mut self) -> anyhow::Result<()> {
        if self.fail_open {
            anyhow::bail!("mock camera unavailable");
        }
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }

        let index = self.next_index;
        if self.fail_at == Some(index) {
            anyhow::bail!("mock decode error at frame {index}");
        }
        if index > 0 && !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        self.next_index += 1;
        self.tracker.read.fetch_add(1, Ordering::SeqCst);

        Ok(Some(Frame::new(index, SyntheticFrameImage::indexed(index))))
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Frame contents for mocks: a tiny image whose colour encodes the index.
struct SyntheticFrameImage;

impl SyntheticFrameImage {
    #[allow(clippy::cast_possible_truncation)]
    fn indexed(index: u64) -> RgbImage {
        let v = (index % 256) as u8;
        RgbImage::from_pixel(4, 4, Rgb([v, v, v]))
    }
}

/// Shared view of a `MockOutputSink`.
#[derive(Debug, Clone, Default)]
pub struct SinkTracker {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    results: Arc<Mutex<Vec<RunResult>>>,
}

impl SinkTracker {
    /// Times `open()` succeeded.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Times `close()` was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// All results written, in order.
    #[must_use]
    pub fn results(&self) -> Vec<RunResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frame indices written, in order.
    #[must_use]
    pub fn frame_indices(&self) -> Vec<u64> {
        self.results().iter().map(|r| r.frame_index).collect()
    }
}

/// Mock implementation of `OutputSink` for testing.
///
/// Captures results for later assertions.
#[derive(Default)]
pub struct MockOutputSink {
    fail_open: bool,
    fail_write_at: Option<u64>,
    tracker: SinkTracker,
}

impl MockOutputSink {
    /// Creates a new mock sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `open()` fail.
    #[must_use]
    pub const fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Makes writing frame `index` fail.
    #[must_use]
    pub const fn failing_write_at(mut self, index: u64) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    /// Handle for assertions after the sink was moved.
    #[must_use]
    pub fn tracker(&self) -> SinkTracker {
        self.tracker.clone()
    }
}

impl OutputSink for MockOutputSink {
    fn describe(&self) -> String {
        "mock sink".to_string()
    }

    fn open(&mut self) -> anyhow::Result<()> {
        if self.fail_open {
            anyhow::bail!("mock sink cannot be opened");
        }
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&mut self, frame: &Frame, result: &RunResult) -> anyhow::Result<()> {
        if self.fail_write_at == Some(frame.index) {
            anyhow::bail!("mock disk full");
        }
        self.tracker
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared view of a `MockClassifier`.
#[derive(Debug, Clone, Default)]
pub struct ClassifierTracker {
    seen: Arc<Mutex<Vec<u64>>>,
}

impl ClassifierTracker {
    /// Indices of the frames that reached inference, in order.
    #[must_use]
    pub fn seen(&self) -> Vec<u64> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Mock implementation of `FrameClassifier` for testing.
///
/// Replays a script of probability vectors (the last one repeats), with an
/// optional artificial delay per call.
pub struct MockClassifier {
    script: Vec<ProbabilityVector>,
    num_labels: usize,
    delay: Duration,
    cancel_at: Option<(usize, CancelToken)>,
    fail_at: Option<usize>,
    calls: usize,
    tracker: ClassifierTracker,
}

impl MockClassifier {
    /// Replays `script`, one vector per call.
    ///
    /// # Panics
    ///
    /// Panics if `script` is empty.
    #[must_use]
    pub fn scripted(script: Vec<ProbabilityVector>) -> Self {
        assert!(!script.is_empty(), "script must not be empty");
        let num_labels = script[0].len();
        Self {
            script,
            num_labels,
            delay: Duration::ZERO,
            cancel_at: None,
            fail_at: None,
            calls: 0,
            tracker: ClassifierTracker::default(),
        }
    }

    /// Always returns a uniform distribution over `num_labels` labels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(num_labels: usize) -> Self {
        Self::scripted(vec![vec![1.0 / num_labels as f32; num_labels]])
    }

    /// Sleeps `delay` inside every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests cancellation from inside the `call`-th call (zero based).
    #[must_use]
    pub fn cancelling_on_call(mut self, call: usize, token: CancelToken) -> Self {
        self.cancel_at = Some((call, token));
        self
    }

    /// Fails the `call`-th call (zero based).
    #[must_use]
    pub const fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }

    /// Handle for assertions after the classifier was moved.
    #[must_use]
    pub fn tracker(&self) -> ClassifierTracker {
        self.tracker.clone()
    }
}

impl FrameClassifier for MockClassifier {
    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn infer(&mut self, frame: &Frame) -> anyhow::Result<ProbabilityVector> {
        self.tracker
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.index);

        if let Some((call, token)) = &self.cancel_at {
            if *call == self.calls {
                token.cancel();
            }
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_at == Some(self.calls) {
            anyhow::bail!("mock inference failure");
        }

        let step = self.calls.min(self.script.len() - 1);
        self.calls += 1;
        Ok(self.script[step].clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_source_yields_then_ends() {
        let mut source = MockFrameSource::new(2);
        let tracker = source.tracker();
        source.open().unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap().index, 0);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 1);
        assert!(source.next_frame().unwrap().is_none());
        source.close().unwrap();
        assert_eq!(tracker.open_count(), 1);
        assert_eq!(tracker.close_count(), 1);
        assert_eq!(tracker.frames_read(), 2);
    }

    #[test]
    fn test_mock_source_failure() {
        let mut source = MockFrameSource::new(3).failing_at(1);
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn test_mock_sink_records() {
        let mut sink = MockOutputSink::new();
        let tracker = sink.tracker();
        let frame = Frame::new(3, RgbImage::new(1, 1));
        sink.write(&frame, &RunResult::new(3, vec![1.0])).unwrap();
        sink.close().unwrap();
        assert_eq!(tracker.frame_indices(), vec![3]);
        assert_eq!(tracker.close_count(), 1);
    }

    #[test]
    fn test_mock_classifier_repeats_last() {
        let mut classifier = MockClassifier::scripted(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let frame = Frame::new(0, RgbImage::new(1, 1));
        assert_eq!(classifier.infer(&frame).unwrap(), vec![1.0, 0.0]);
        assert_eq!(classifier.infer(&frame).unwrap(), vec![0.0, 1.0]);
        assert_eq!(classifier.infer(&frame).unwrap(), vec![0.0, 1.0]);
        assert_eq!(classifier.tracker().seen(), vec![0, 0, 0]);
    }
}
