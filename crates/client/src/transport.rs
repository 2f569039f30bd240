//! Transport seam: how a session opens the byte stream.
//!
//! [`HttpTransport`] is the production implementation.  Anything else that
//! can yield the stream's bytes (a proxy tunnel, an in-memory script in
//! tests) implements [`Transport`] and is injected through the builder.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::HeaderValue;
use reqwest::Url;

use crate::types::{ClientError, TransportError};

/// Stream of raw body chunks as delivered by the transport.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Everything needed to open one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub url: Url,
    /// Sent as `Last-Event-ID` so the server can resume after it.
    pub last_event_id: Option<String>,
}

impl StreamRequest {
    /// Request headers, in order.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Accept", "text/event-stream".to_owned()),
            ("Cache-Control", "no-cache".to_owned()),
            ("Connection", "keep-alive".to_owned()),
        ];
        if let Some(id) = &self.last_event_id {
            headers.push(("Last-Event-ID", id.clone()));
        }
        headers
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue the request and return the body stream.  A non-success status
    /// is an error; the session never reaches the connected state.
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;
}

/// `GET` over HTTP(S) via `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        let mut builder = self.http.get(request.url.clone());
        for (name, value) in request.headers() {
            match HeaderValue::from_str(&value) {
                Ok(value) => builder = builder.header(name, value),
                Err(_) => tracing::warn!(header = name, value = ?value, "skipping invalid header value"),
            }
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())))
            .boxed())
    }
}

/// Build `{base}/{path}/{token}?{param}={client_id}`.
///
/// The base URL's own path is kept; `path` may contain several segments.
/// Every segment and the query value are percent-encoded.  The query
/// parameter is omitted when `client_id` is empty.
pub fn stream_url(
    base_url: &str,
    stream_path: &str,
    token: &str,
    client_id_param: &str,
    client_id: &str,
) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ClientError::Config(format!("invalid base_url {base_url:?}: {e}")))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ClientError::Config(format!("base_url {base_url:?} cannot carry a path")))?;
        segments.pop_if_empty();
        segments.extend(stream_path.split('/').filter(|s| !s.is_empty()));
        segments.push(token);
    }

    if !client_id.is_empty() {
        url.query_pairs_mut().append_pair(client_id_param, client_id);
    }

    Ok(url)
}
