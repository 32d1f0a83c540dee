//! Console display using indicatif.

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use repcam_core::{Counts, Frame, OutputSink, RunResult};

/// Live status line: title, current top label and counts.
pub struct ConsoleDisplay {
    title: String,
    quiet: bool,
    bar: Option<ProgressBar>,
    frames: u64,
    last_counts: Counts,
}

impl ConsoleDisplay {
    /// Creates a display. With `quiet`, nothing is printed.
    #[must_use]
    pub fn new(title: impl Into<String>, quiet: bool) -> Self {
        Self {
            title: title.into(),
            quiet,
            bar: None,
            frames: 0,
            last_counts: Counts::default(),
        }
    }

    /// Frames shown so far.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// One-line status for a result.
    #[must_use]
    pub fn status_line(&self, result: &RunResult) -> String {
        let mut line = self.title.clone();
        match result.top_label() {
            Some(top) => {
                let _ = write!(line, " | {} {:.0}%", top.label, top.score * 100.0);
            }
            None => line.push_str(" | -"),
        }
        for (key, count) in result.counts.iter() {
            let _ = write!(line, " | {key}: {count}");
        }
        line
    }

    fn summary(&self) -> String {
        let mut line = format!("{}: {} frames", self.title, self.frames);
        for (key, count) in self.last_counts.iter() {
            let _ = write!(line, ", {key} = {count}");
        }
        line
    }
}

impl OutputSink for ConsoleDisplay {
    fn describe(&self) -> String {
        format!("console display '{}'", self.title)
    }

    fn open(&mut self) -> Result<()> {
        let bar = if self.quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} frames {msg}")
            {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        bar.set_message(self.title.clone());
        self.bar = Some(bar);
        Ok(())
    }

    fn write(&mut self, _frame: &Frame, result: &RunResult) -> Result<()> {
        let line = self.status_line(result);
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.set_message(line);
        }
        self.frames += 1;
        self.last_counts.clone_from(&result.counts);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(bar) = self.bar.take() {
            if self.quiet {
                bar.finish_and_clear();
            } else {
                bar.finish_with_message(self.summary());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::RgbImage;
    use repcam_core::LabelScore;

    #[test]
    fn test_status_line() {
        let display = ConsoleDisplay::new("Gym", true);
        let mut result = RunResult::new(0, vec![0.9, 0.1]);
        result.top_k.push(LabelScore {
            label: "squat".into(),
            index: 0,
            score: 0.9,
        });
        result.counts.set("squats", 4);
        assert_eq!(display.status_line(&result), "Gym | squat 90% | squats: 4");
    }

    #[test]
    fn test_status_line_without_ranking() {
        let display = ConsoleDisplay::new("Gym", true);
        assert_eq!(display.status_line(&RunResult::default()), "Gym | -");
    }

    #[test]
    fn test_quiet_display_tracks_frames() {
        let mut display = ConsoleDisplay::new("Gym", true);
        display.open().unwrap();
        let frame = Frame::new(0, RgbImage::new(1, 1));
        display.write(&frame, &RunResult::default()).unwrap();
        display.write(&frame, &RunResult::default()).unwrap();
        display.close().unwrap();
        assert_eq!(display.frames(), 2);
        assert!(display.summary().starts_with("Gym: 2 frames"));
    }
}
