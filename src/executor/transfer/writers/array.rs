//! JSON array writer
//!
//! Produces `[`, the elements separated by `,`, and `]`. The opening bracket
//! is written with the first element, so an empty export is still `[]`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::Result;
use crate::executor::transfer::record::TransferRecord;

use super::{Payload, RecordWriter, create_file};

/// Writer for a single top-level JSON array
pub struct ArrayWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    payload: Payload,
    written: u64,
    elements: u64,
    finalized: bool,
}

impl ArrayWriter {
    /// Create the output file, truncating an existing one
    pub async fn create(path: &Path, payload: Payload) -> Result<Self> {
        let writer = create_file(path).await?;
        debug!("Created array writer for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            payload,
            written: 0,
            elements: 0,
            finalized: false,
        })
    }
}

#[async_trait]
impl RecordWriter for ArrayWriter {
    async fn write_record(&mut self, record: &TransferRecord) -> Result<()> {
        for line in self.payload.render(record)? {
            let separator: &[u8] = if self.elements == 0 { b"[\n" } else { b",\n" };
            self.writer.write_all(separator).await?;
            self.writer.write_all(&line.to_bytes()?).await?;
            self.elements += 1;
        }
        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if !self.finalized {
            let footer: &[u8] = if self.elements == 0 { b"[]\n" } else { b"\n]\n" };
            self.writer.write_all(footer).await?;
            self.finalized = true;
        }
        self.writer.flush().await?;
        debug!("Finalized array file: {} ({} records)", self.path.display(), self.written);
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }

    async fn file_size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}
