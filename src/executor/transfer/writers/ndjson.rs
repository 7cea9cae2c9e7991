//! Line-delimited JSON writer
//!
//! Each rendered line of a record becomes one line of the file, so a file
//! written with bulk metadata can be fed back to the import command as is.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::Result;
use crate::executor::transfer::record::TransferRecord;

use super::{Payload, RecordWriter, create_file};

/// Writer for newline-delimited JSON
pub struct NdjsonWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    payload: Payload,
    written: u64,
}

impl NdjsonWriter {
    /// Create the output file, truncating an existing one
    pub async fn create(path: &Path, payload: Payload) -> Result<Self> {
        let writer = create_file(path).await?;
        debug!("Created ndjson writer for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            payload,
            written: 0,
        })
    }
}

#[async_trait]
impl RecordWriter for NdjsonWriter {
    async fn write_record(&mut self, record: &TransferRecord) -> Result<()> {
        for line in self.payload.render(record)? {
            self.writer.write_all(&line.to_bytes()?).await?;
            self.writer.write_all(b"\n").await?;
        }
        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.writer.flush().await?;
        debug!("Finalized ndjson file: {} ({} records)", self.path.display(), self.written);
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }

    async fn file_size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}
