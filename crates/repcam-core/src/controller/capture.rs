//! Capture worker with a one-slot, drop-oldest hand-off to inference.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, trace, warn};

use crate::domain::Frame;
use crate::ports::FrameSource;

/// Frame counters kept by the capture worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames read from the source.
    pub captured: u64,
    /// Frames evicted before inference picked them up.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    captured: AtomicU64,
    dropped: AtomicU64,
}

/// The capture thread could not be started.
pub(crate) struct SpawnError {
    /// What went wrong.
    pub(crate) error: anyhow::Error,
    /// The source, still open, unless the worker already took it.
    pub(crate) source: Option<Box<dyn FrameSource>>,
}

/// Pulls frames from a source on a dedicated thread.
///
/// At most one frame waits between capture and inference; a newer frame
/// replaces it. The source is closed by the worker when it exits.
pub(crate) struct Capture {
    frames: Receiver<Frame>,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl Capture {
    /// Starts the worker on an already opened source.
    ///
    /// If the thread cannot be started, the source is handed back so the
    /// caller can close it.
    pub(crate) fn spawn(source: Box<dyn FrameSource>) -> Result<Self, SpawnError> {
        Self::spawn_on(thread::Builder::new().name("capture".to_string()), source)
    }

    fn spawn_on(
        builder: thread::Builder,
        source: Box<dyn FrameSource>,
    ) -> Result<Self, SpawnError> {
        let (tx, rx) = bounded::<Frame>(1);
        let evict = rx.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        // The worker takes the source out of the slot once it is running
        let slot = Arc::new(Mutex::new(Some(source)));
        let worker_slot = Arc::clone(&slot);
        let worker_stop = Arc::clone(&stop);
        let worker_counters = Arc::clone(&counters);
        let spawned = builder.spawn(move || {
            let taken = worker_slot.lock().ok().and_then(|mut s| s.take());
            let Some(mut source) = taken else {
                anyhow::bail!("Frame source missing from capture slot");
            };
            pump(source.as_mut(), &tx, &evict, &worker_stop, &worker_counters);
            drop(tx);
            debug!("Releasing frame source {}", source.describe());
            source.close()
        });

        match spawned {
            Ok(handle) => Ok(Self {
                frames: rx,
                stop,
                counters,
                handle: Some(handle),
            }),
            Err(e) => {
                let source = slot.lock().ok().and_then(|mut s| s.take());
                Err(SpawnError {
                    error: anyhow::Error::new(e).context("Failed to spawn capture thread"),
                    source,
                })
            }
        }
    }

    /// Waits up to `timeout` for the most recent frame.
    pub(crate) fn recv(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        self.frames.recv_timeout(timeout)
    }

    /// Current counters.
    pub(crate) fn stats(&self) -> CaptureStats {
        CaptureStats {
            captured: self.counters.captured.load(Ordering::Acquire),
            dropped: self.counters.dropped.load(Ordering::Acquire),
        }
    }

    /// Stops the worker and waits for it to release the source.
    pub(crate) fn stop(mut self) -> Result<CaptureStats> {
        let result = self.join();
        let stats = self.stats();
        result.map(|()| stats)
    }

    fn join(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        // The worker never blocks on the channel, so the flag is enough
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("Capture thread panicked"))?
                .context("Failed to release frame source"),
            None => Ok(()),
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            warn!("{e:#}");
        }
    }
}

/// Reads until end of stream, a read error or a stop request.
fn pump(
    source: &mut dyn FrameSource,
    tx: &Sender<Frame>,
    evict: &Receiver<Frame>,
    stop: &AtomicBool,
    counters: &Counters,
) {
    while !stop.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                counters.captured.fetch_add(1, Ordering::AcqRel);
                offer(tx, evict, frame, counters);
            }
            Ok(None) => {
                info!("End of stream");
                return;
            }
            Err(e) => {
                warn!("Frame read failed, treating as end of stream: {e:#}");
                return;
            }
        }
    }
    debug!("Capture stopped on request");
}

/// Hands a frame over, evicting the one still waiting if the slot is full.
fn offer(tx: &Sender<Frame>, evict: &Receiver<Frame>, frame: Frame, counters: &Counters) {
    let frame = match tx.try_send(frame) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => return,
        Err(TrySendError::Full(frame)) => frame,
    };

    if let Ok(stale) = evict.try_recv() {
        counters.dropped.fetch_add(1, Ordering::AcqRel);
        trace!("Dropped frame {} in favour of {}", stale.index, frame.index);
    }

    if let Err(TrySendError::Full(frame)) = tx.try_send(frame) {
        counters.dropped.fetch_add(1, Ordering::AcqRel);
        trace!("Dropped frame {}", frame.index);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame(index: u64) -> Frame {
        Frame::new(index, RgbImage::new(1, 1))
    }

    #[test]
    fn test_offer_keeps_newest() {
        let (tx, rx) = bounded::<Frame>(1);
        let counters = Counters::default();

        offer(&tx, &rx, frame(0), &counters);
        offer(&tx, &rx, frame(1), &counters);
        offer(&tx, &rx, frame(2), &counters);

        assert_eq!(rx.try_recv().unwrap().index, 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 2);
    }

    struct ClosingSource {
        closed: Arc<AtomicBool>,
    }

    impl FrameSource for ClosingSource {
        fn describe(&self) -> String {
            "closing source".to_string()
        }

        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(None)
        }

        fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failed_spawn_returns_source() {
        let closed = Arc::new(AtomicBool::new(false));
        let source = Box::new(ClosingSource {
            closed: Arc::clone(&closed),
        });

        // No address space fits this stack
        let builder = thread::Builder::new().stack_size(usize::MAX / 2);
        let Err(failed) = Capture::spawn_on(builder, source) else {
            panic!("spawn with an impossible stack should fail");
        };
        assert!(failed.error.to_string().contains("capture thread"));

        let mut source = failed.source.unwrap();
        assert!(!closed.load(Ordering::SeqCst));
        source.close().unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_worker_closes_source_on_end_of_stream() {
        let closed = Arc::new(AtomicBool::new(false));
        let source = Box::new(ClosingSource {
            closed: Arc::clone(&closed),
        });
        let Ok(capture) = Capture::spawn(source) else {
            panic!("capture thread should start");
        };
        assert!(matches!(
            capture.recv(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        ));
        capture.stop().unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_offer_into_empty_slot_drops_nothing() {
        let (tx, rx) = bounded::<Frame>(1);
        let counters = Counters::default();

        offer(&tx, &rx, frame(0), &counters);
        assert_eq!(rx.try_recv().unwrap().index, 0);
        offer(&tx, &rx, frame(1), &counters);
        assert_eq!(rx.try_recv().unwrap().index, 1);
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 0);
    }
}
