//! Hand-off of finished samples to whatever ships them.

use crate::sample::Sample;
use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot write sample: {0}")]
    Io(#[from] io::Error),
    #[error("cannot encode sample: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait SampleSink {
    fn write(&mut self, sample: &Sample) -> Result<(), SinkError>;
}

/// Writes one JSON object per line and flushes after each sample.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonLinesSink<File> {
    /// Opens `path` for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> SampleSink for JsonLinesSink<W> {
    fn write(&mut self, sample: &Sample) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.out, sample)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    fn write(&mut self, sample: &Sample) -> Result<(), SinkError> {
        (**self).write(sample)
    }
}
