//! Scroll cursor state and page decoding

use serde_json::Value;

use crate::error::{ProtocolError, Result, check_server_error};

/// Server-side pagination handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub token: String,
    pub ttl: String,
}

/// One decoded scroll response.
#[derive(Debug)]
pub struct ScrollPage {
    pub cursor: Cursor,
    /// Total hits for the whole query.
    pub total: u64,
    pub hits: Vec<Value>,
}

impl ScrollPage {
    /// Decode a scroll response.
    ///
    /// Missing `_scroll_id`, `hits`, `hits.total` or `hits.hits` is a fatal
    /// protocol error. `hits.total` may be a number or `{"value": n}`.
    pub fn decode(mut response: Value, ttl: &str) -> Result<Self> {
        check_server_error(&response)?;

        let token = response
            .get("_scroll_id")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingScrollId)?
            .to_string();

        let hits = response
            .get_mut("hits")
            .filter(|h| h.is_object())
            .ok_or(ProtocolError::MissingHits)?;

        let total = match hits.get("total") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::Object(obj)) => obj.get("value").and_then(Value::as_u64),
            _ => None,
        }
        .ok_or(ProtocolError::MissingHits)?;

        let hits = match hits.get_mut("hits").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(ProtocolError::MissingHits.into()),
        };

        Ok(Self {
            cursor: Cursor {
                token,
                ttl: ttl.to_string(),
            },
            total,
            hits,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_numeric_total() {
        let page = ScrollPage::decode(
            json!({
                "_scroll_id": "c1",
                "hits": { "total": 2, "hits": [ { "_id": "1" }, { "_id": "2" } ] }
            }),
            "2m",
        )
        .unwrap();
        assert_eq!(page.cursor.token, "c1");
        assert_eq!(page.cursor.ttl, "2m");
        assert_eq!(page.total, 2);
        assert_eq!(page.hits.len(), 2);
    }

    #[test]
    fn test_decode_object_total() {
        let page = ScrollPage::decode(
            json!({
                "_scroll_id": "c1",
                "hits": { "total": { "value": 7, "relation": "eq" }, "hits": [] }
            }),
            "2m",
        )
        .unwrap();
        assert_eq!(page.total, 7);
        assert!(page.is_empty());
    }

    #[test]
    fn test_decode_missing_scroll_id() {
        let err = ScrollPage::decode(json!({ "hits": { "total": 0, "hits": [] } }), "2m")
            .unwrap_err();
        assert!(err.to_string().contains("_scroll_id"));
    }

    #[test]
    fn test_decode_missing_total() {
        let err = ScrollPage::decode(json!({ "_scroll_id": "c", "hits": { "hits": [] } }), "2m")
            .unwrap_err();
        assert!(err.to_string().contains("no hits or total"));
    }

    #[test]
    fn test_decode_missing_hits() {
        assert!(ScrollPage::decode(json!({ "_scroll_id": "c" }), "2m").is_err());
        assert!(
            ScrollPage::decode(json!({ "_scroll_id": "c", "hits": { "total": 1 } }), "2m")
                .is_err()
        );
    }

    #[test]
    fn test_decode_server_error() {
        let err = ScrollPage::decode(
            json!({ "error": { "type": "search_context_missing_exception", "reason": "No search context found" } }),
            "2m",
        )
        .unwrap_err();
        assert!(err.to_string().contains("No search context found"));
    }
}
