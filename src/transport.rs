//! Network transport used to fetch remote RDF documents
//!
//! The transport is a dependency of the loader and is injected through
//! [`StoreBuilder`](crate::store::StoreBuilder); tests swap in an in-memory
//! implementation.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("{uri} returned status {status}")]
    Status { uri: String, status: u16 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URI scheme the transport can't fetch
    #[error("Unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A fetched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// Document text
    pub body: String,
    /// Media type announced by the server, without parameters
    pub content_type: Option<String>,
}

/// Fetches documents by URI
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `uri`, sending `accept` as the `Accept` header
    async fn load(&self, uri: &str, accept: &str) -> TransportResult<TransportResponse>;
}

/// Default transport: HTTP(S) through reqwest, `file://` from the local disk
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport with a default client and no timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport using an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client, timeout: None }
    }

    /// Fail HTTP fetches that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn load(&self, uri: &str, accept: &str) -> TransportResult<TransportResponse> {
        if let Some(path) = uri.strip_prefix("file://") {
            let body = tokio::fs::read_to_string(path).await?;
            return Ok(TransportResponse { body, content_type: None });
        }
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            let scheme = uri.split_once(':').map(|(s, _)| s).unwrap_or(uri);
            return Err(TransportError::UnsupportedScheme(scheme.to_string()));
        }

        debug!("Fetching {} (Accept: {})", uri, accept);
        let mut request = self.client.get(uri).header(ACCEPT, accept);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                uri: uri.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_string());
        let body = response.text().await?;

        Ok(TransportResponse { body, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_uri() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "<http://example.org/a> <http://example.org/b> \"c\" .").unwrap();
        let uri = format!("file://{}", file.path().display());

        let response = HttpTransport::new().load(&uri, "text/turtle").await.unwrap();
        assert!(response.body.contains("http://example.org/a"));
        assert_eq!(response.content_type, None);
    }

    #[tokio::test]
    async fn test_timeout_cuts_off_a_silent_server() {
        // Accepts the connection but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let transport = HttpTransport::new().with_timeout(Duration::from_millis(200));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            transport.load(&format!("http://{}/data.ttl", addr), "text/turtle"),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(TransportError::Http(e)) if e.is_timeout()));
        server.abort();
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let result = HttpTransport::new().load("ftp://example.org/data.ttl", "*/*").await;
        assert!(matches!(result, Err(TransportError::UnsupportedScheme(s)) if s == "ftp"));
    }
}
