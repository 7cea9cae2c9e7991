//! shelastic library
//!
//! Core functionality of the shelastic Elasticsearch administration tool.
//! The heart of it is the bulk transfer pipeline in
//! [`executor::transfer`]: scroll export to a file, bulk import from a
//! file, and index-to-index copy, each run as a producer and a sink over a
//! bounded channel with a separate control protocol.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Search cluster client
//! - `error`: Error types and handling
//! - `executor`: Command execution (transfers and documents)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shelastic::config::Config;
//! use shelastic::connection::{HttpCluster, SearchTarget};
//! use shelastic::executor::transfer::{ExportOptions, OutputFormat, Payload, TransferCoordinator, parse_query};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let cluster = HttpCluster::connect(&config.connection).await?;
//!     let coordinator = TransferCoordinator::new(Arc::new(cluster), config.transfer);
//!
//!     let summary = coordinator
//!         .export(ExportOptions {
//!             source: SearchTarget::new(Some("logs".into()), None),
//!             query: parse_query(None)?,
//!             output: "logs.ndjson".into(),
//!             format: OutputFormat::NdJson,
//!             payload: Payload::Hit,
//!         })
//!         .await?;
//!     println!("exported {} documents", summary.written);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;

// Re-export commonly used types
pub use config::Config;
pub use connection::{HttpCluster, SearchCluster};
pub use error::{Result, ShelasticError};
pub use executor::{ExecutionContext, TransferCoordinator, TransferSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
