//! Frame sources: image sequences, animated GIFs, and (optionally) video
//! files and cameras.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbImage};
use repcam_core::{Frame, FrameSource};
use tracing::{debug, info, warn};

/// Extensions accepted in an image-sequence directory.
const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Container extensions read and written through OpenCV.
pub(crate) const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "avi", "mkv", "webm"];

/// Playback rate of image sequences when none is configured.
pub const DEFAULT_FPS: f64 = 16.0;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Live camera by device index.
    Camera(i32),
    /// Video file, image file, image-sequence directory or animated GIF.
    File(PathBuf),
}

impl SourceSpec {
    /// A file source when `path_in` is given, the camera otherwise.
    #[must_use]
    pub fn from_args(path_in: Option<&Path>, camera_id: i32) -> Self {
        path_in.map_or(Self::Camera(camera_id), |p| Self::File(p.to_path_buf()))
    }

    /// Builds the source. Nothing is opened yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a camera or video file is requested in a build
    /// without the matching support.
    pub fn build(&self, fps: f64) -> Result<Box<dyn FrameSource>> {
        match self {
            Self::File(path) if is_video(path) => video_file_source(path, fps),
            Self::File(path) => Ok(Box::new(FileFrameSource::new(path.clone(), fps))),
            Self::Camera(id) => camera_source(*id),
        }
    }
}

#[cfg(feature = "camera")]
#[allow(clippy::unnecessary_wraps)]
fn camera_source(id: i32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(CaptureSource::camera(id)))
}

#[cfg(not(feature = "camera"))]
fn camera_source(id: i32) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "Camera {id} requested, but repcam was built without camera support \
         (rebuild with --features camera, or pass --path_in)"
    )
}

#[cfg(feature = "video")]
#[allow(clippy::unnecessary_wraps)]
fn video_file_source(path: &Path, fps: f64) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(CaptureSource::file(path.to_path_buf(), fps)))
}

#[cfg(not(feature = "video"))]
fn video_file_source(path: &Path, _fps: f64) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "Cannot read {}: repcam was built without video support \
         (rebuild with --features video, or pass an image directory or GIF)",
        path.display()
    )
}

/// True for paths with a video container extension.
pub(crate) fn is_video(path: &Path) -> bool {
    extension(path).is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

/// Frame interval for `fps`, falling back to [`DEFAULT_FPS`].
fn frame_interval(fps: f64) -> Duration {
    let fps = if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        warn!("Invalid fps {fps}, using {DEFAULT_FPS}");
        DEFAULT_FPS
    };
    Duration::from_secs_f64(1.0 / fps)
}

/// Releases frames no faster than their display delay.
#[derive(Default)]
struct Pacer {
    next_due: Option<Instant>,
}

impl Pacer {
    /// Sleeps until the next frame is due, then schedules the one after.
    fn wait(&mut self, delay: Duration) {
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + delay);
    }

    fn reset(&mut self) {
        self.next_due = None;
    }
}

/// Decoded frames waiting to be handed out.
enum Pending {
    /// Image files at a fixed interval. The first is decoded on open, the
    /// rest lazily.
    Files {
        first: Option<RgbImage>,
        paths: std::vec::IntoIter<PathBuf>,
        interval: Duration,
    },
    /// GIF frames with their own delays.
    Gif(std::vec::IntoIter<(RgbImage, Duration)>),
}

/// Plays back frames from disk in real time.
pub struct FileFrameSource {
    path: PathBuf,
    fps: f64,
    pending: Option<Pending>,
    next_index: u64,
    pacer: Pacer,
}

impl FileFrameSource {
    /// Creates a source for `path`; image sequences play at `fps`.
    #[must_use]
    pub fn new(path: PathBuf, fps: f64) -> Self {
        Self {
            path,
            fps,
            pending: None,
            next_index: 0,
            pacer: Pacer::default(),
        }
    }

    /// Decodes the first image up front so unreadable input fails `open`.
    fn image_files(&self, paths: Vec<PathBuf>) -> Result<Pending> {
        let mut paths = paths.into_iter();
        let first = paths.next().map(|path| decode_frame(&path)).transpose()?;
        Ok(Pending::Files {
            first,
            paths,
            interval: frame_interval(self.fps),
        })
    }
}

impl FrameSource for FileFrameSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn open(&mut self) -> Result<()> {
        let pending = if self.path.is_dir() {
            let paths = collect_frames(&self.path)?;
            if paths.is_empty() {
                anyhow::bail!("No frames found in {}", self.path.display());
            }
            info!("Playing {} frames from {}", paths.len(), self.path.display());
            self.image_files(paths)?
        } else if is_gif(&self.path) {
            let frames = decode_gif(&self.path)?;
            if frames.is_empty() {
                anyhow::bail!("No frames found in {}", self.path.display());
            }
            info!("Playing {} GIF frames from {}", frames.len(), self.path.display());
            Pending::Gif(frames.into_iter())
        } else if self.path.is_file() {
            self.image_files(vec![self.path.clone()])?
        } else {
            anyhow::bail!("Input does not exist: {}", self.path.display());
        };

        self.pending = Some(pending);
        self.next_index = 0;
        self.pacer.reset();
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let next = match self.pending.as_mut() {
            None => anyhow::bail!("{} is not open", self.describe()),
            Some(Pending::Files {
                first,
                paths,
                interval,
            }) => match first.take() {
                Some(image) => Some((image, *interval)),
                None => match paths.next() {
                    None => None,
                    Some(path) => Some((decode_frame(&path)?, *interval)),
                },
            },
            Some(Pending::Gif(frames)) => frames.next(),
        };

        let Some((image, delay)) = next else {
            return Ok(None);
        };
        self.pacer.wait(delay);

        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<()> {
        if self.pending.take().is_some() {
            debug!("Closed {}", self.describe());
        }
        Ok(())
    }
}

fn is_gif(path: &Path) -> bool {
    extension(path).is_some_and(|e| e == "gif")
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

fn decode_frame(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("Failed to decode frame {}", path.display()))?
        .into_rgb8())
}

/// Image files of a directory, sorted by file name.
fn collect_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && extension(path).is_some_and(|e| FRAME_EXTENSIONS.contains(&e.as_str()))
        })
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Decodes every frame of a GIF with its display delay.
fn decode_gif(path: &Path) -> Result<Vec<(RgbImage, Duration)>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let decoder = GifDecoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to read GIF {}", path.display()))?;

    decoder
        .into_frames()
        .map(|frame| {
            let frame = frame.with_context(|| format!("Failed to decode {}", path.display()))?;
            let delay = Duration::from(frame.delay());
            let image = image::DynamicImage::ImageRgba8(frame.into_buffer()).into_rgb8();
            Ok((image, delay))
        })
        .collect()
}

#[cfg(feature = "video")]
pub use capture::CaptureSource;

#[cfg(feature = "video")]
mod capture {
    use std::path::PathBuf;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use image::RgbImage;
    use opencv::core::Mat;
    use opencv::prelude::*;
    use opencv::videoio::{self, VideoCapture};
    use repcam_core::{Frame, FrameSource};
    use tracing::{debug, info};

    use super::{frame_interval, Pacer};
    use crate::cv::bgr_to_rgb;

    enum Device {
        Camera(i32),
        File(PathBuf),
    }

    /// Camera or video file read through OpenCV.
    ///
    /// Cameras deliver frames at their own rate. Files are paced by the
    /// rate stored in the container, or the configured one if it has none.
    pub struct CaptureSource {
        device: Device,
        fps: f64,
        capture: Option<VideoCapture>,
        first: Option<RgbImage>,
        interval: Duration,
        pacer: Pacer,
        next_index: u64,
    }

    impl CaptureSource {
        /// Live camera `id`. Nothing is opened yet.
        #[must_use]
        pub fn camera(id: i32) -> Self {
            Self::with_device(Device::Camera(id), 0.0)
        }

        /// Video file at `path`, paced at `fps` when the file has no rate.
        #[must_use]
        pub fn file(path: PathBuf, fps: f64) -> Self {
            Self::with_device(Device::File(path), fps)
        }

        fn with_device(device: Device, fps: f64) -> Self {
            Self {
                device,
                fps,
                capture: None,
                first: None,
                interval: Duration::ZERO,
                pacer: Pacer::default(),
                next_index: 0,
            }
        }

        fn read(capture: &mut VideoCapture) -> Result<Option<RgbImage>> {
            let mut mat = Mat::default();
            if !capture.read(&mut mat)? || mat.empty() {
                return Ok(None);
            }
            bgr_to_rgb(&mat).map(Some)
        }
    }

    impl FrameSource for CaptureSource {
        fn describe(&self) -> String {
            match &self.device {
                Device::Camera(id) => format!("camera {id}"),
                Device::File(path) => format!("video {}", path.display()),
            }
        }

        fn open(&mut self) -> Result<()> {
            let mut capture = match &self.device {
                Device::Camera(id) => {
                    let capture = VideoCapture::new(*id, videoio::CAP_ANY)
                        .with_context(|| format!("Failed to open camera {id}"))?;
                    if !capture.is_opened()? {
                        anyhow::bail!("Camera {id} is not available");
                    }
                    capture
                }
                Device::File(path) => {
                    if !path.is_file() {
                        anyhow::bail!("Input does not exist: {}", path.display());
                    }
                    let name = path.to_str().context("Video path is not valid UTF-8")?;
                    let capture = VideoCapture::from_file(name, videoio::CAP_ANY)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    if !capture.is_opened()? {
                        anyhow::bail!("Cannot read video {}", path.display());
                    }
                    capture
                }
            };

            let fps = capture.get(videoio::CAP_PROP_FPS)?;
            match &self.device {
                Device::Camera(id) => {
                    capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
                    info!("Camera {id} opened at {fps:.1} fps");
                    self.first = None;
                    self.interval = Duration::ZERO;
                }
                Device::File(path) => {
                    let first = Self::read(&mut capture)?.with_context(|| {
                        format!("No frames could be decoded from {}", path.display())
                    })?;
                    self.interval = frame_interval(if fps > 0.0 { fps } else { self.fps });
                    info!(
                        "Playing {} at {:.1} fps",
                        path.display(),
                        1.0 / self.interval.as_secs_f64()
                    );
                    self.first = Some(first);
                }
            }

            self.capture = Some(capture);
            self.pacer.reset();
            self.next_index = 0;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let capture = self
                .capture
                .as_mut()
                .with_context(|| format!("{} is not open", self.describe()))?;

            let image = match self.first.take() {
                Some(image) => image,
                None => match Self::read(capture)? {
                    Some(image) => image,
                    None => return Ok(None),
                },
            };
            if !self.interval.is_zero() {
                self.pacer.wait(self.interval);
            }

            let frame = Frame::new(self.next_index, image);
            self.next_index += 1;
            Ok(Some(frame))
        }

        fn close(&mut self) -> Result<()> {
            if let Some(mut capture) = self.capture.take() {
                capture.release()?;
                debug!("Released {}", self.describe());
            }
            self.first = None;
            Ok(())
        }
    }
}
