//! Several sinks behind one `OutputSink`.

use anyhow::Result;
use repcam_core::{Frame, OutputSink, RunResult};
use tracing::warn;

/// Forwards every call to each member in order.
///
/// `open` rolls back the members already opened if a later one fails;
/// `close` closes every member and reports the first failure.
#[derive(Default)]
pub struct SinkGroup {
    sinks: Vec<Box<dyn OutputSink>>,
    opened: usize,
}

impl SinkGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a member.
    #[must_use]
    pub fn with(mut self, sink: Box<dyn OutputSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl OutputSink for SinkGroup {
    fn describe(&self) -> String {
        let names: Vec<String> = self.sinks.iter().map(|s| s.describe()).collect();
        names.join(" + ")
    }

    fn open(&mut self) -> Result<()> {
        let mut failure = None;
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if let Err(e) = sink.open() {
                failure = Some((i, e));
                break;
            }
            self.opened = i + 1;
        }

        let Some((failed, e)) = failure else {
            return Ok(());
        };
        for sink in self.sinks[..failed].iter_mut().rev() {
            if let Err(close) = sink.close() {
                warn!("Failed to close {}: {close:#}", sink.describe());
            }
        }
        self.opened = 0;
        Err(e)
    }

    fn write(&mut self, frame: &Frame, result: &RunResult) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write(frame, result)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for sink in self.sinks[..self.opened].iter_mut().rev() {
            if let Err(e) = sink.close() {
                warn!("Failed to close {}: {e:#}", sink.describe());
                first_error.get_or_insert(e);
            }
        }
        self.opened = 0;
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::RgbImage;
    use repcam_test_support::MockOutputSink;

    #[test]
    fn test_forwards_to_every_member() {
        let a = MockOutputSink::new();
        let b = MockOutputSink::new();
        let (pa, pb) = (a.tracker(), b.tracker());
        let mut group = SinkGroup::new().with(Box::new(a)).with(Box::new(b));

        group.open().unwrap();
        group
            .write(&Frame::new(5, RgbImage::new(1, 1)), &RunResult::new(5, vec![1.0]))
            .unwrap();
        group.close().unwrap();

        assert_eq!(pa.frame_indices(), vec![5]);
        assert_eq!(pb.frame_indices(), vec![5]);
        assert_eq!((pa.close_count(), pb.close_count()), (1, 1));
        assert_eq!(group.describe(), "mock sink + mock sink");
    }

    #[test]
    fn test_open_failure_rolls_back() {
        let a = MockOutputSink::new();
        let pa = a.tracker();
        let mut group = SinkGroup::new()
            .with(Box::new(a))
            .with(Box::new(MockOutputSink::new().failing_open()));

        assert!(group.open().is_err());
        assert_eq!(pa.open_count(), 1);
        assert_eq!(pa.close_count(), 1);

        group.close().unwrap();
        assert_eq!(pa.close_count(), 1);
    }
}
