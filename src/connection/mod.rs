//! Connection management for the search cluster
//!
//! This module provides the collaborator the transfer pipeline talks to:
//! - The [`SearchCluster`] trait: scroll search, bulk insert, document CRUD
//! - [`HttpCluster`], the HTTP+JSON implementation used by the shell
//! - Server version detection and the protocol quirks that depend on it

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::fmt;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::error::{ProtocolError, Result, TransportError, check_server_error};

/// Operations the transfer pipeline and document commands need from a cluster.
#[async_trait]
pub trait SearchCluster: Send + Sync {
    /// Version reported by the server at connect time.
    fn version(&self) -> ServerVersion;

    /// Start a scroll search and return the first response.
    async fn open_scroll(&self, target: &SearchTarget, query: &Value, ttl: &str) -> Result<Value>;

    /// Fetch the next scroll page for `scroll_id`, renewing it for `ttl`.
    async fn continue_scroll(&self, scroll_id: &str, ttl: &str) -> Result<Value>;

    /// Submit a line-delimited bulk body.
    async fn bulk(&self, body: String) -> Result<Value>;

    /// Read a document by id.
    async fn get_document(&self, index: &str, doc_type: &str, id: &str) -> Result<Value>;

    /// Store a document; `None` lets the server assign the id.
    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: Option<&str>,
        body: &Value,
    ) -> Result<Value>;

    /// Delete a document by id.
    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> Result<Value>;
}

/// Index and document type a search runs against. Empty parts mean "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTarget {
    pub index: Option<String>,
    pub doc_type: Option<String>,
}

impl SearchTarget {
    pub fn new(index: Option<String>, doc_type: Option<String>) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
        Self {
            index: non_empty(index),
            doc_type: non_empty(doc_type),
        }
    }

    /// Path of the scroll-opening search request.
    pub fn search_path(&self, ttl: &str) -> String {
        let mut path = String::new();
        for part in [&self.index, &self.doc_type].into_iter().flatten() {
            path.push('/');
            path.push_str(part);
        }
        format!("{path}/_search?scroll={ttl}")
    }
}

/// Parsed `major.minor.patch` server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse strings like `7.10.2` or `8.0.0-SNAPSHOT`.
    pub fn parse(text: &str) -> Option<Self> {
        let core = text.split(['-', '+']).next()?;
        let mut parts = core.split('.').map(|p| p.parse::<u32>());
        let major = parts.next()?.ok()?;
        let minor = parts.next().unwrap_or(Ok(0)).ok()?;
        let patch = parts.next().unwrap_or(Ok(0)).ok()?;
        Some(Self::new(major, minor, patch))
    }

    /// Sorting by `_doc` is the cheapest stable scroll order (2.1+).
    pub fn supports_doc_sort(&self) -> bool {
        (self.major, self.minor) >= (2, 1)
    }

    /// 1.x servers return no hits with the first scroll response.
    pub fn needs_priming_scroll(&self) -> bool {
        self.major < 2
    }

    /// 1.x servers only accept scroll continuation as GET with query params.
    pub fn uses_legacy_scroll_api(&self) -> bool {
        self.major < 2
    }

    /// Mapping types are gone from 7.0 on; hits still carry `_type: _doc`.
    pub fn has_mapping_types(&self) -> bool {
        self.major < 7
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the cluster reported about itself at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub version: ServerVersion,
}

/// Normalize a user supplied host into a base URL.
///
/// `host` becomes `http://host:9200`, `host:9201` becomes `http://host:9201`;
/// anything with a scheme is kept as is.
pub fn normalize_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else if host.contains(':') {
        format!("http://{host}")
    } else {
        format!("http://{host}:9200")
    }
}

enum RequestBody {
    Json(String),
    NdJson(String),
}

impl RequestBody {
    fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::NdJson(_) => "application/x-ndjson",
        }
    }

    fn into_text(self) -> String {
        match self {
            RequestBody::Json(s) | RequestBody::NdJson(s) => s,
        }
    }
}

/// HTTP+JSON cluster client
pub struct HttpCluster {
    client: Client,
    base_url: String,
    config: ConnectionConfig,
    info: ClusterInfo,
}

impl HttpCluster {
    /// Connect to the cluster and read its name and version
    ///
    /// # Arguments
    /// * `config` - Connection configuration
    ///
    /// # Returns
    /// * `Result<Self>` - Connected client or error
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let base_url = normalize_url(&config.url);
        reqwest::Url::parse(&base_url).map_err(|_| TransportError::InvalidUrl(base_url.clone()))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::RequestFailed {
                url: base_url.clone(),
                message: e.to_string(),
            })?;

        let mut cluster = Self {
            client,
            base_url,
            config: config.clone(),
            info: ClusterInfo {
                cluster_name: String::new(),
                version: ServerVersion::default(),
            },
        };

        let ping = cluster.request(Method::GET, "/", None).await?;
        cluster.info = parse_cluster_info(&ping)?;
        debug!(
            "Connected to cluster '{}' version {}",
            cluster.info.cluster_name, cluster.info.version
        );
        Ok(cluster)
    }

    /// Name and version reported by the cluster
    pub fn info(&self) -> &ClusterInfo {
        &self.info
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, method: Method, path: &str, body: Option<RequestBody>) -> Result<Value> {
        self.request_with_query(method, path, &[], body).await
    }

    /// Send a request whose query parameters are URL-encoded by the client.
    async fn request_with_query(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<RequestBody>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method.clone(), &url);
        if !query.is_empty() {
            req = req.query(query);
        }

        if let (Some(user), password) = (&self.config.username, &self.config.password) {
            req = req.basic_auth(user, password.as_ref());
        }

        if let Some(body) = body {
            req = req.header("Content-Type", body.content_type());
            let text = body.into_text();
            trace!("Request: {} {}\n{}", method, url, text);
            req = req.body(text);
        } else {
            trace!("Request: {} {}", method, url);
        }

        let response = req.send().await.map_err(|e| transport_error(&url, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&url, e))?;
        trace!("Response: {}\n{}", status, text);

        decode_response(&url, status, &text)
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(url.to_string())
    } else {
        TransportError::RequestFailed {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Turn a raw HTTP answer into a JSON body, surfacing server errors.
fn decode_response(url: &str, status: StatusCode, text: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(body) => {
            check_server_error(&body)?;
            if !status.is_success() && status != StatusCode::NOT_FOUND {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                    body: text.to_string(),
                }
                .into());
            }
            Ok(body)
        }
        Err(_) if !status.is_success() => Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: text.to_string(),
        }
        .into()),
        Err(e) => Err(ProtocolError::InvalidBody(e.to_string()).into()),
    }
}

fn parse_cluster_info(ping: &Value) -> Result<ClusterInfo> {
    let number = ping
        .pointer("/version/number")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::InvalidBody("ping response has no version.number".into()))?;
    let version = ServerVersion::parse(number)
        .ok_or_else(|| ProtocolError::InvalidBody(format!("unparsable version '{number}'")))?;
    let cluster_name = ping
        .get("cluster_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(ClusterInfo {
        cluster_name,
        version,
    })
}

fn document_path(index: &str, doc_type: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("/{index}/{doc_type}/{id}"),
        None => format!("/{index}/{doc_type}"),
    }
}

#[async_trait]
impl SearchCluster for HttpCluster {
    fn version(&self) -> ServerVersion {
        self.info.version
    }

    async fn open_scroll(&self, target: &SearchTarget, query: &Value, ttl: &str) -> Result<Value> {
        let body = serde_json::to_string(query)?;
        self.request(Method::POST, &target.search_path(ttl), Some(RequestBody::Json(body)))
            .await
    }

    async fn continue_scroll(&self, scroll_id: &str, ttl: &str) -> Result<Value> {
        if self.info.version.uses_legacy_scroll_api() {
            let query = [("scroll", ttl), ("scroll_id", scroll_id)];
            self.request_with_query(Method::GET, "/_search/scroll", &query, None)
                .await
        } else {
            let body = serde_json::json!({ "scroll": ttl, "scroll_id": scroll_id });
            self.request(
                Method::POST,
                "/_search/scroll",
                Some(RequestBody::Json(body.to_string())),
            )
            .await
        }
    }

    async fn bulk(&self, body: String) -> Result<Value> {
        self.request(Method::POST, "/_bulk", Some(RequestBody::NdJson(body)))
            .await
    }

    async fn get_document(&self, index: &str, doc_type: &str, id: &str) -> Result<Value> {
        self.request(Method::GET, &document_path(index, doc_type, Some(id)), None)
            .await
    }

    async fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: Option<&str>,
        body: &Value,
    ) -> Result<Value> {
        let method = if id.is_some() { Method::PUT } else { Method::POST };
        let body = RequestBody::Json(serde_json::to_string(body)?);
        self.request(method, &document_path(index, doc_type, id), Some(body))
            .await
    }

    async fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> Result<Value> {
        self.request(Method::DELETE, &document_path(index, doc_type, Some(id)), None)
            .await
    }
}
