//! Command execution engine for shelastic
//!
//! This module provides the execution layer behind the CLI commands:
//! - Execution context shared by commands (cluster, config, cancellation)
//! - The bulk transfer pipeline (export, import, copy)
//! - Single-document commands (get, put, delete)

pub mod context;
pub mod documents;
pub mod transfer;

pub use context::ExecutionContext;
pub use documents::DocumentExecutor;
pub use transfer::{TransferCoordinator, TransferStatus, TransferSummary};
