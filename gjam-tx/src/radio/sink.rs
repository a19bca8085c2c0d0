//! Destinations for transmit buffers produced by the software radio

use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Receives one transmit buffer per tick
pub trait IqSink: Send {
    fn write_block(&mut self, block: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}

/// Any `Write` (file, FIFO, stdout)
pub struct WriterSink<W> {
    inner: W,
    label: String,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(inner: W, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> IqSink for WriterSink<W> {
    fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
        self.inner.write_all(block)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Discards buffers, counting bytes
#[derive(Debug, Default)]
pub struct NullSink {
    bytes: u64,
}

impl NullSink {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl IqSink for NullSink {
    fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
        self.bytes += block.len() as u64;
        Ok(())
    }

    fn describe(&self) -> String {
        "null".to_string()
    }
}

/// Open a sink by name: `-` for stdout, `null` to discard, anything else is a path
///
/// Paths are opened for append without truncation so a FIFO works the same as a file.
pub fn open_sink(target: &str) -> Result<Box<dyn IqSink>> {
    match target {
        "-" => Ok(Box::new(WriterSink::new(
            BufWriter::new(io::stdout()),
            "stdout",
        ))),
        "null" => Ok(Box::new(NullSink::default())),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(path))
                .map_err(|e| Error::Radio(format!("Cannot open IQ output {}: {}", path, e)))?;
            Ok(Box::new(WriterSink::new(BufWriter::new(file), path)))
        }
    }
}
