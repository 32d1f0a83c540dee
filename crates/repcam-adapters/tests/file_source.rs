//! Integration tests for file-based frame sources.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::{Duration, Instant};

use repcam_adapters::{FileFrameSource, SourceSpec};
use repcam_core::postprocess::{ChainConfig, PostprocessorChain};
use repcam_core::{CancelToken, Controller, FrameSource, LabelMap};
use repcam_test_support::{MockClassifier, MockOutputSink, SyntheticFrameBuilder};
use tempfile::TempDir;

fn drain(source: &mut dyn FrameSource) -> Vec<repcam_core::Frame> {
    source.open().expect("should open");
    let mut frames = Vec::new();
    while let Some(frame) = source.next_frame().unwrap() {
        frames.push(frame);
    }
    source.close().unwrap();
    frames
}

#[test]
fn test_png_directory_in_name_order() {
    let dir = TempDir::new().unwrap();
    let builder = SyntheticFrameBuilder::new(12, 10);
    builder.write_png_dir(dir.path(), 4).unwrap();
    // Files that are not frames are skipped
    std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

    let mut source = FileFrameSource::new(dir.path().to_path_buf(), 200.0);
    let frames = drain(&mut source);

    assert_eq!(frames.len(), 4);
    let indices: Vec<u64> = frames.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(frames[2].image, builder.gradient(6));
    assert_eq!((frames[0].width(), frames[0].height()), (12, 10));
}

#[test]
fn test_directory_is_paced_at_fps() {
    let dir = TempDir::new().unwrap();
    SyntheticFrameBuilder::new(4, 4)
        .write_png_dir(dir.path(), 3)
        .unwrap();

    let start = Instant::now();
    let frames = drain(&mut FileFrameSource::new(dir.path().to_path_buf(), 20.0));
    assert_eq!(frames.len(), 3);
    // Two intervals of 50ms between three frames
    assert!(start.elapsed() >= Duration::from_millis(95), "{:?}", start.elapsed());
}

#[test]
fn test_gif_frames_and_delays() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.gif");
    SyntheticFrameBuilder::new(16, 8)
        .write_gif(&path, 5, 20)
        .unwrap();

    let start = Instant::now();
    let frames = drain(&mut FileFrameSource::new(path, 1.0));
    assert_eq!(frames.len(), 5);
    assert_eq!((frames[4].width(), frames[4].height()), (16, 8));
    // Paced by the 20ms GIF delays, not by the 1 fps setting
    assert!(start.elapsed() < Duration::from_millis(900));
    assert!(start.elapsed() >= Duration::from_millis(75));
}

#[test]
fn test_single_image_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("still.png");
    SyntheticFrameBuilder::new(5, 5).solid([1, 2, 3]).save(&path).unwrap();

    let frames = drain(&mut FileFrameSource::new(path, 16.0));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].image.get_pixel(0, 0).0, [1, 2, 3]);
}

#[test]
fn test_missing_input_fails_on_open() {
    let dir = TempDir::new().unwrap();
    let spec = SourceSpec::File(dir.path().join("absent.gif"));
    let mut source = spec.build(16.0).unwrap();
    assert!(source.open().is_err());
}

#[test]
fn test_empty_directory_fails_on_open() {
    let dir = TempDir::new().unwrap();
    let mut source = FileFrameSource::new(dir.path().to_path_buf(), 16.0);
    let err = source.open().unwrap_err();
    assert!(err.to_string().contains("No frames"));
}

#[test]
fn test_corrupt_frame_is_an_error() {
    let dir = TempDir::new().unwrap();
    SyntheticFrameBuilder::new(4, 4)
        .write_png_dir(dir.path(), 1)
        .unwrap();
    std::fs::write(dir.path().join("frame_0001.png"), b"not a png").unwrap();

    let mut source = FileFrameSource::new(dir.path().to_path_buf(), 500.0);
    source.open().unwrap();
    assert!(source.next_frame().unwrap().is_some());
    assert!(source.next_frame().is_err());
}

#[test]
fn test_corrupt_single_image_fails_on_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("still.png");
    std::fs::write(&path, b"not a png").unwrap();

    let mut source = FileFrameSource::new(path, 16.0);
    let err = source.open().unwrap_err();
    assert!(err.to_string().contains("Failed to decode"), "{err}");
}

#[test]
fn test_corrupt_first_directory_frame_fails_on_open() {
    let dir = TempDir::new().unwrap();
    SyntheticFrameBuilder::new(4, 4)
        .write_png_dir(dir.path(), 3)
        .unwrap();
    std::fs::write(dir.path().join("frame_0000.png"), b"not a png").unwrap();

    let mut source = FileFrameSource::new(dir.path().to_path_buf(), 16.0);
    assert!(source.open().is_err());
}

#[test]
fn test_unreadable_video_fails_before_streaming() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"not a video at all").unwrap();

    // Rejected when built without video support, otherwise when opened
    let opened = SourceSpec::File(path.clone())
        .build(16.0)
        .and_then(|mut source| source.open());
    assert!(opened.is_err());

    let mut source = FileFrameSource::new(path, 16.0);
    assert!(source.open().is_err());
}

#[test]
fn test_controller_fails_on_corrupt_input() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"not a video at all").unwrap();

    let labels = LabelMap::from_ordered(&["a", "b"]).unwrap();
    let chain = PostprocessorChain::from_config(&ChainConfig::default(), &labels).unwrap();
    let display = MockOutputSink::new();
    let tracker = display.tracker();

    let mut controller = Controller::new(
        Box::new(MockClassifier::uniform(2)),
        chain,
        Box::new(FileFrameSource::new(path, 16.0)),
        Box::new(display),
    );
    assert!(controller.run(&CancelToken::new()).is_err());
    assert_eq!(tracker.open_count(), 0);
}
