//! Frame source port for camera or file capture.

use crate::domain::Frame;

/// Port for pulling frames from a capture device or a file.
///
/// The controller calls `open` once, then `next_frame` until it returns
/// `Ok(None)` (end of stream), then `close` exactly once. Capture runs on its
/// own thread, hence `Send`.
pub trait FrameSource: Send {
    /// Human readable description used in logs.
    fn describe(&self) -> String;

    /// Acquires the underlying device or file.
    ///
    /// # Errors
    ///
    /// Returns an error if the camera is unavailable or the file cannot be opened.
    fn open(&mut self) -> anyhow::Result<()>;

    /// Blocks until the next frame is available.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame cannot be read. The controller treats this
    /// as end of stream.
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;

    /// Releases the device or file.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing fails.
    fn close(&mut self) -> anyhow::Result<()>;
}
