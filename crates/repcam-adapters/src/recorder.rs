//! Recorders: write annotated frames to disk in capture order.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage};
use repcam_core::{Frame, OutputSink, RunResult};
use tracing::{debug, info};

use crate::overlay;
use crate::video::{extension, VIDEO_EXTENSIONS};

/// Delay of the first recorded GIF frame.
const FIRST_FRAME_DELAY: Duration = Duration::from_millis(62);

/// Colour quantization speed (1 slowest and best, 30 fastest).
const GIF_SPEED: i32 = 10;

/// Picks a recorder from the output path: `*.gif` records a GIF, video
/// extensions record a video, and an existing directory or a path without
/// an extension receives numbered PNG frames. Videos play at `fps`.
///
/// # Errors
///
/// Returns an error for any other extension, and for video paths in a
/// build without video support.
pub fn recorder_for(path: &Path, fps: f64) -> Result<Box<dyn OutputSink>> {
    match extension(path).as_deref() {
        Some("gif") => Ok(Box::new(GifRecorder::new(path.to_path_buf()))),
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => video_recorder(path, fps),
        Some(ext) if !path.is_dir() => anyhow::bail!(
            "Cannot record to {}: .{ext} is not a supported output \
             (use a .gif, a video file or a directory)",
            path.display()
        ),
        _ => Ok(Box::new(FrameDirRecorder::new(path.to_path_buf()))),
    }
}

#[cfg(feature = "video")]
#[allow(clippy::unnecessary_wraps)]
fn video_recorder(path: &Path, fps: f64) -> Result<Box<dyn OutputSink>> {
    Ok(Box::new(VideoRecorder::new(path.to_path_buf(), fps)))
}

#[cfg(not(feature = "video"))]
fn video_recorder(path: &Path, _fps: f64) -> Result<Box<dyn OutputSink>> {
    anyhow::bail!(
        "Cannot record to {}: repcam was built without video support \
         (rebuild with --features video, or record to a .gif)",
        path.display()
    )
}

/// Buffered output shared with the GIF encoder.
///
/// The encoder writes its trailer when dropped and discards any error, so
/// write failures are recorded here and reported by `finish`.
#[derive(Clone)]
struct TrackedWriter(Rc<RefCell<Tracked>>);

struct Tracked {
    inner: BufWriter<Box<dyn Write>>,
    error: Option<io::Error>,
}

impl TrackedWriter {
    fn new(inner: Box<dyn Write>) -> Self {
        Self(Rc::new(RefCell::new(Tracked {
            inner: BufWriter::new(inner),
            error: None,
        })))
    }

    fn record<T>(&self, result: io::Result<T>) -> io::Result<T> {
        result.map_err(|e| {
            let copy = io::Error::new(e.kind(), e.to_string());
            self.0.borrow_mut().error.get_or_insert(e);
            copy
        })
    }

    /// Returns the first write error, or flushes the buffer.
    fn finish(&self) -> io::Result<()> {
        let mut tracked = self.0.borrow_mut();
        if let Some(e) = tracked.error.take() {
            return Err(e);
        }
        tracked.inner.flush()
    }
}

impl Write for TrackedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.0.borrow_mut().inner.write(buf);
        self.record(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.0.borrow_mut().inner.flush();
        self.record(result)
    }
}

/// Records an animated GIF, keeping the capture timing between frames.
pub struct GifRecorder {
    name: String,
    path: Option<PathBuf>,
    writer: Option<Box<dyn Write>>,
    out: Option<TrackedWriter>,
    encoder: Option<GifEncoder<TrackedWriter>>,
    last_capture: Option<Instant>,
    written: u64,
}

impl GifRecorder {
    /// Creates a recorder for `path`. Nothing is written until `open`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            name: path.display().to_string(),
            path: Some(path),
            writer: None,
            out: None,
            encoder: None,
            last_capture: None,
            written: 0,
        }
    }

    /// Creates a recorder that writes the GIF into `writer`.
    #[must_use]
    pub fn to_writer(name: impl Into<String>, writer: Box<dyn Write>) -> Self {
        Self {
            name: name.into(),
            path: None,
            writer: Some(writer),
            out: None,
            encoder: None,
            last_capture: None,
            written: 0,
        }
    }

    fn create_output(&mut self) -> Result<Box<dyn Write>> {
        let Some(path) = &self.path else {
            return self
                .writer
                .take()
                .with_context(|| format!("GIF {} was already recorded", self.name));
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Box::new(file))
    }
}

impl OutputSink for GifRecorder {
    fn describe(&self) -> String {
        format!("GIF {}", self.name)
    }

    fn open(&mut self) -> Result<()> {
        let out = TrackedWriter::new(self.create_output()?);
        let mut encoder = GifEncoder::new_with_speed(out.clone(), GIF_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;
        self.out = Some(out);
        self.encoder = Some(encoder);
        Ok(())
    }

    fn write(&mut self, frame: &Frame, result: &RunResult) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .with_context(|| format!("{} is not open", self.name))?;

        let delay = self
            .last_capture
            .map_or(FIRST_FRAME_DELAY, |last| frame.captured_at.duration_since(last));
        self.last_capture = Some(frame.captured_at);

        let annotated = overlay::render(&frame.image, result);
        let rgba = DynamicImage::ImageRgb8(annotated).into_rgba8();
        encoder
            .encode_frame(image::Frame::from_parts(
                rgba,
                0,
                0,
                Delay::from_saturating_duration(delay),
            ))
            .with_context(|| format!("Failed to encode frame {}", frame.index))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };
        // Dropping the encoder writes the trailer
        drop(encoder);
        if let Some(out) = self.out.take() {
            out.finish()
                .with_context(|| format!("Failed to finish GIF {}", self.name))?;
        }
        info!("Recorded {} frames to {}", self.written, self.name);
        Ok(())
    }
}

/// Records numbered PNG frames into a directory.
pub struct FrameDirRecorder {
    dir: PathBuf,
    open: bool,
    written: u64,
}

impl FrameDirRecorder {
    /// Creates a recorder for `dir`. The directory is created on `open`.
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            open: false,
            written: 0,
        }
    }
}

impl OutputSink for FrameDirRecorder {
    fn describe(&self) -> String {
        format!("frame directory {}", self.dir.display())
    }

    fn open(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        self.open = true;
        Ok(())
    }

    fn write(&mut self, frame: &Frame, result: &RunResult) -> Result<()> {
        if !self.open {
            anyhow::bail!("{} is not open", self.describe());
        }
        let path = self.dir.join(format!("frame_{:06}.png", frame.index));
        overlay::render(&frame.image, result)
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote {}", path.display());
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            info!("Recorded {} frames to {}", self.written, self.dir.display());
        }
        Ok(())
    }
}

#[cfg(feature = "video")]
pub use encoder::VideoRecorder;

#[cfg(feature = "video")]
mod encoder {
    use std::fs;
    use std::path::PathBuf;

    use anyhow::{Context, Result};
    use opencv::core::Size;
    use opencv::prelude::*;
    use opencv::videoio::VideoWriter;
    use repcam_core::{Frame, OutputSink, RunResult};
    use tracing::info;

    use crate::cv::rgb_to_bgr;
    use crate::overlay;
    use crate::video::{extension, DEFAULT_FPS};

    /// Records an annotated video through OpenCV.
    ///
    /// The writer is created on the first frame, once the frame size is known.
    pub struct VideoRecorder {
        path: PathBuf,
        fps: f64,
        open: bool,
        writer: Option<VideoWriter>,
        written: u64,
    }

    impl VideoRecorder {
        /// Creates a recorder for `path` playing at `fps`.
        #[must_use]
        pub const fn new(path: PathBuf, fps: f64) -> Self {
            Self {
                path,
                fps,
                open: false,
                writer: None,
                written: 0,
            }
        }

        fn fourcc(&self) -> Result<i32> {
            let code = match extension(&self.path).as_deref() {
                Some("avi") => ['M', 'J', 'P', 'G'],
                Some("mkv") => ['X', 'V', 'I', 'D'],
                Some("webm") => ['V', 'P', '8', '0'],
                _ => ['m', 'p', '4', 'v'],
            };
            Ok(VideoWriter::fourcc(code[0], code[1], code[2], code[3])?)
        }

        fn start(&self, width: u32, height: u32) -> Result<VideoWriter> {
            let name = self.path.to_str().context("Video path is not valid UTF-8")?;
            let size = Size::new(
                i32::try_from(width).context("Frame too wide")?,
                i32::try_from(height).context("Frame too tall")?,
            );
            let fps = if self.fps.is_finite() && self.fps > 0.0 {
                self.fps
            } else {
                DEFAULT_FPS
            };
            let writer = VideoWriter::new(name, self.fourcc()?, fps, size, true)
                .with_context(|| format!("Failed to create {}", self.path.display()))?;
            if !writer.is_opened()? {
                anyhow::bail!("No encoder available for {}", self.path.display());
            }
            Ok(writer)
        }
    }

    impl OutputSink for VideoRecorder {
        fn describe(&self) -> String {
            format!("video {}", self.path.display())
        }

        fn open(&mut self) -> Result<()> {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            self.open = true;
            Ok(())
        }

        fn write(&mut self, frame: &Frame, result: &RunResult) -> Result<()> {
            if !self.open {
                anyhow::bail!("{} is not open", self.describe());
            }
            let annotated = overlay::render(&frame.image, result);
            if self.writer.is_none() {
                self.writer = Some(self.start(annotated.width(), annotated.height())?);
            }
            let mat = rgb_to_bgr(&annotated)?;
            if let Some(writer) = self.writer.as_mut() {
                writer
                    .write(&mat)
                    .with_context(|| format!("Failed to encode frame {}", frame.index))?;
            }
            self.written += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            if !self.open {
                return Ok(());
            }
            self.open = false;
            if let Some(mut writer) = self.writer.take() {
                writer
                    .release()
                    .with_context(|| format!("Failed to finish {}", self.path.display()))?;
            }
            info!("Recorded {} frames to {}", self.written, self.path.display());
            Ok(())
        }
    }
}
