//! Captured video frame.

use std::time::Instant;

use image::RgbImage;

/// A single frame pulled from a frame source.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture order index, starting at 0 for the first frame of a run.
    pub index: u64,
    /// Instant the frame was handed over by the source.
    pub captured_at: Instant,
    /// Decoded RGB pixels.
    pub image: RgbImage,
}

impl Frame {
    /// Creates a frame stamped with the current instant.
    #[must_use]
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            captured_at: Instant::now(),
            image,
        }
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
