//! Bulk transfer pipeline
//!
//! Moves documents between the cluster and files, or between indices:
//! - export: scroll search -> file (ndjson or JSON array)
//! - import: file -> bulk requests
//! - copy: scroll search -> bulk requests into another index
//!
//! # Architecture
//!
//! Every transfer is one [`Session`] made of two tasks:
//!
//! 1. A producer ([`CursorProducer`] or [`FileReader`]) pushing
//!    [`TransferRecord`]s onto a bounded channel. A full channel blocks the
//!    producer, which bounds memory to the channel capacity.
//! 2. A sink ([`FileSink`] or [`BulkSink`]) consuming them.
//!
//! Completion, failure and cancellation never travel on the record channel.
//! Each stage has its own directive input and one-shot outcome output
//! (see [`control`]); the session waits for the first outcome and tells the
//! other stage to finish or stop. A Ctrl+C cancels through a
//! `CancellationToken` and ends the session as cancelled, not failed.

pub mod bulk_sink;
pub mod control;
pub mod coordinator;
pub mod cursor;
pub mod encoder;
pub mod file_sink;
pub mod producer;
pub mod progress;
pub mod reader;
pub mod record;
pub mod session;
pub mod sink;
pub mod writers;

#[cfg(test)]
pub(crate) mod testing;

pub use bulk_sink::{BulkSink, Destination};
pub use coordinator::{CopyOptions, ExportOptions, ImportOptions, TransferCoordinator};
pub use file_sink::FileSink;
pub use producer::{CursorProducer, parse_query};
pub use reader::FileReader;
pub use record::{Document, TransferRecord};
pub use session::{Session, TransferStatus, TransferSummary};
pub use writers::{OutputFormat, Payload};
