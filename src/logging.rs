//! Historical logging of published snapshots to a JSON Lines file.

use crate::sampler::Snapshot;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Logger for appending snapshots to a JSON Lines file
pub struct SnapshotLogger {
    writer: BufWriter<File>,
    snapshots_written: u64,
}

impl SnapshotLogger {
    /// Create a new logger writing to the specified file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())
            .context("Failed to create snapshot log file")?;

        Ok(Self {
            writer: BufWriter::new(file),
            snapshots_written: 0,
        })
    }

    /// Append a snapshot to the log file
    pub fn log(&mut self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        writeln!(self.writer, "{}", json)?;
        self.snapshots_written += 1;

        // Flush every 10 snapshots to avoid losing data on crash
        if self.snapshots_written % 10 == 0 {
            self.writer.flush()?;
        }

        Ok(())
    }

    /// Flush any buffered data
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Get the number of snapshots written
    pub fn snapshots_written(&self) -> u64 {
        self.snapshots_written
    }
}

impl Drop for SnapshotLogger {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
