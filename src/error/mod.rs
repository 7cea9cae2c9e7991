//! Error handling module for cluster and transfer operations.
//!
//! This module provides error handling for the shell with:
//! - Structured error information extracted from search-service error bodies
//! - Consistent JSON error formatting for logging
//! - Application-specific error kinds (transport, protocol, transfer, config)
//!
//! # Example
//!
//! ```rust,no_run
//! use shelastic::error::{Result, check_server_error};
//!
//! fn inspect(body: &serde_json::Value) -> Result<()> {
//!     // A body carrying an `error` field becomes a protocol error
//!     check_server_error(body)?;
//!     Ok(())
//! }
//! ```

pub mod kinds;
pub mod server;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ProtocolError, Result, ShelasticError, TransferError, TransportError,
};
pub use server::{ErrorInfo, check_server_error, extract_error_info};
