//! Append-only JSONL output
//!
//! One serialized record per line, in the order `append` is called. The
//! destination is opened once per run in append mode, so a restarted run
//! continues the existing file.

use eyre::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

use crate::record::EventRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to {destination}: {source}")]
    Write {
        destination: String,
        #[source]
        source: io::Error,
    },
}

/// Destination for accepted records
pub trait EventSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), SinkError>;
}

/// A writer that can push its data to stable storage and undo a torn write
pub trait Durable: Write {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Length of the data written so far
    fn position(&mut self) -> io::Result<u64>;

    /// Drop everything past `len`
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Durable for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl Durable for Vec<u8> {
    fn position(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.truncate(usize::try_from(len).unwrap_or(usize::MAX));
        Ok(())
    }
}

/// Newline-delimited JSON sink
pub struct JsonlSink<W: Durable> {
    writer: W,
    destination: String,
    sync: bool,
    written: u64,
    line: Vec<u8>,
}

impl JsonlSink<File> {
    /// Open (or create) `path` for appending
    pub fn open(path: &Path, sync: bool) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;

        log::info!("Appending records to {}", path.display());
        Ok(Self::new(file, path.display().to_string(), sync))
    }
}

impl<W: Durable> JsonlSink<W> {
    pub fn new(writer: W, destination: impl Into<String>, sync: bool) -> Self {
        Self {
            writer,
            destination: destination.into(),
            sync,
            written: 0,
            line: Vec::with_capacity(4096),
        }
    }

    /// Records written by this sink since it was opened
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_err(&self, source: io::Error) -> SinkError {
        SinkError::Write {
            destination: self.destination.clone(),
            source,
        }
    }
}

impl<W: Durable> EventSink for JsonlSink<W> {
    fn append(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        // Record and separator go out in a single write
        self.line.clear();
        serde_json::to_writer(&mut self.line, record)?;
        self.line.push(b'\n');

        let start = self.writer.position().map_err(|e| self.write_err(e))?;
        if let Err(e) = self.writer.write_all(&self.line).and_then(|_| self.writer.flush()) {
            // Never leave a fragment for the next record to be glued onto
            if let Err(undo) = self.writer.truncate_to(start) {
                log::error!("Failed to remove partial record from {}: {}", self.destination, undo);
            }
            return Err(self.write_err(e));
        }
        if self.sync
            && let Err(e) = self.writer.sync()
        {
            return Err(self.write_err(e));
        }

        self.written += 1;
        log::debug!("Saved record #{} to {}", self.written, self.destination);
        Ok(())
    }
}
