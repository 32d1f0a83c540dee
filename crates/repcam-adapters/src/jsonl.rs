//! JSON Lines result sink.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use repcam_core::{Frame, OutputSink, RunResult};

/// Writes one `RunResult` JSON object per frame.
pub struct JsonlSink {
    name: String,
    writer: Box<dyn Write>,
}

impl JsonlSink {
    /// Creates a sink writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new("stdout", Box::new(io::stdout()))
    }

    /// Creates a sink writing to a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self::new(
            path.display().to_string(),
            Box::new(BufWriter::new(file)),
        ))
    }

    /// Creates a sink writing to the given writer.
    #[must_use]
    pub fn new(name: impl Into<String>, writer: Box<dyn Write>) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }
}

impl OutputSink for JsonlSink {
    fn describe(&self) -> String {
        format!("results {}", self.name)
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, _frame: &Frame, result: &RunResult) -> Result<()> {
        let json = serde_json::to_string(result)?;
        writeln!(self.writer, "{json}")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
