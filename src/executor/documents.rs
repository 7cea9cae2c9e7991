//! Single-document commands: get, put, delete

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ShelasticError};

use super::context::ExecutionContext;

/// Id placeholder asking the server to assign one.
pub const AUTO_ID: &str = "-";

/// Executor for document-by-id operations
pub struct DocumentExecutor {
    context: ExecutionContext,
}

impl DocumentExecutor {
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    /// Resolve the document type: explicit, else `_doc` on servers past 6.x.
    pub fn document_type(&self, doc_type: Option<&str>) -> Result<String> {
        match doc_type.filter(|t| !t.is_empty()) {
            Some(doc_type) => Ok(doc_type.to_string()),
            None if self.context.cluster().version().major > 6 => Ok("_doc".to_string()),
            None => Err(ShelasticError::Generic(
                "Please specify document type using --doc <type>".to_string(),
            )),
        }
    }

    /// Read a document; a missing one is an error.
    pub async fn get(&self, index: &str, doc_type: Option<&str>, id: &str) -> Result<Value> {
        let doc_type = self.document_type(doc_type)?;
        let body = self
            .context
            .cluster()
            .get_document(index, &doc_type, id)
            .await?;

        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Err(ShelasticError::Generic(format!(
                "Document '{id}' not found in index '{index}'"
            )));
        }
        Ok(body)
    }

    /// Store a document and return the server's `result` (created/updated).
    pub async fn put(
        &self,
        index: &str,
        doc_type: Option<&str>,
        id: &str,
        body: &Value,
    ) -> Result<String> {
        if !body.is_object() {
            return Err(ShelasticError::Generic(
                "Document body must be a JSON object".to_string(),
            ));
        }
        let doc_type = self.document_type(doc_type)?;
        let id = (id != AUTO_ID).then_some(id);
        debug!("Storing document {}/{}/{}", index, doc_type, id.unwrap_or(AUTO_ID));

        let response = self
            .context
            .cluster()
            .put_document(index, &doc_type, id, body)
            .await?;
        response
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ShelasticError::Generic("Failed to parse response".to_string()))
    }

    /// Delete a document; anything but `deleted` is an error.
    pub async fn delete(&self, index: &str, doc_type: Option<&str>, id: &str) -> Result<()> {
        let doc_type = self.document_type(doc_type)?;
        let response = self
            .context
            .cluster()
            .delete_document(index, &doc_type, id)
            .await?;

        match response.get("result").and_then(Value::as_str) {
            Some("deleted") => Ok(()),
            Some(other) => Err(ShelasticError::Generic(format!(
                "Failed to delete document: {other}"
            ))),
            None if response.get("found").and_then(Value::as_bool) == Some(true) => Ok(()),
            None => Err(ShelasticError::Generic(
                "Failed to parse response from server".to_string(),
            )),
        }
    }
}

/// Parse a document body given on the command line.
pub fn parse_body(text: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| ShelasticError::Generic(format!("Invalid document JSON: {e}")))
}
