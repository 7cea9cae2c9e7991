use std::fmt;

use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// Structured error information extracted from a search-service error body.
///
/// Old servers report `"error": "<text>"`, newer ones an object with
/// `type`, `reason` and optional `index`/`caused_by`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub(crate) error_type: Option<String>,
    pub(crate) reason: Option<String>,
    pub(crate) index: Option<String>,
    pub(crate) status: Option<u16>,
    pub(crate) caused_by: Option<String>,
}

impl ErrorInfo {
    /// Human readable reason, falling back to the error type.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .or(self.error_type.as_deref())
            .unwrap_or("unknown error")
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())?;
        if let Some(kind) = &self.error_type {
            if self.reason.is_some() {
                write!(f, " ({kind})")?;
            }
        }
        if let Some(index) = &self.index {
            write!(f, " [index: {index}]")?;
        }
        if let Some(cause) = &self.caused_by {
            write!(f, ", caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Extract structured information from a response body carrying `error`.
///
/// Returns `None` when the body does not report an error.
pub fn extract_error_info(body: &Value) -> Option<ErrorInfo> {
    let error = body.get("error")?;
    let status = body
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok());

    let info = match error {
        Value::String(text) => ErrorInfo {
            reason: Some(text.clone()),
            status,
            ..ErrorInfo::default()
        },
        Value::Object(map) => ErrorInfo {
            error_type: map.get("type").and_then(Value::as_str).map(str::to_owned),
            reason: map.get("reason").and_then(Value::as_str).map(str::to_owned),
            index: map.get("index").and_then(Value::as_str).map(str::to_owned),
            status,
            caused_by: map
                .get("caused_by")
                .and_then(|c| c.get("reason"))
                .and_then(Value::as_str)
                .map(str::to_owned),
        },
        Value::Null => return None,
        other => ErrorInfo {
            reason: Some(other.to_string()),
            status,
            ..ErrorInfo::default()
        },
    };
    Some(info)
}

/// Fail with [`ProtocolError::Server`] when the body reports an error.
pub fn check_server_error(body: &Value) -> Result<()> {
    match extract_error_info(body) {
        Some(info) => Err(ProtocolError::Server(info).into()),
        None => Ok(()),
    }
}
