//! Builder pattern for constructing a [`StreamClient`].

use std::sync::Arc;
use std::time::Duration;

use crate::client::{Settings, StreamClient};
use crate::config::ClientConfig;
use crate::reconnect::ReconnectBackoff;
use crate::session::SessionSettings;
use crate::transport::{stream_url, HttpTransport, Transport};
use crate::types::ClientError;

/// Fluent builder for [`StreamClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use pl_client::StreamClientBuilder;
/// let client = StreamClientBuilder::new()
///     .base_url("https://push.example.com")
///     .token("3f1c9a")
///     .client_id("desk-7")
///     .heartbeat_timeout(std::time::Duration::from_secs(45))
///     .build()
///     .unwrap();
/// ```
pub struct StreamClientBuilder {
    pub(crate) base_url: String,
    pub(crate) stream_path: String,
    pub(crate) token: String,
    pub(crate) client_id: String,
    pub(crate) client_id_param: String,
    pub(crate) liveness_event: String,
    pub(crate) heartbeat_timeout: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) dedup_window: Duration,
    pub(crate) dedup_sweep_interval: Option<Duration>,
    pub(crate) max_frame_bytes: usize,
    pub(crate) send_last_event_id: bool,
    pub(crate) transport: Option<Arc<dyn Transport>>,
}

impl StreamClientBuilder {
    pub fn new() -> Self {
        Self::from_config(&ClientConfig::default())
    }

    /// Start from a deserialized [`ClientConfig`].
    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            stream_path: cfg.stream_path.clone(),
            token: cfg.token.clone(),
            client_id: cfg.client_id.clone(),
            client_id_param: cfg.client_id_param.clone(),
            liveness_event: cfg.liveness_event.clone(),
            heartbeat_timeout: Duration::from_millis(cfg.heartbeat_timeout_ms),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            read_timeout: Duration::from_millis(cfg.read_timeout_ms),
            reconnect_backoff: ReconnectBackoff::from(&cfg.reconnect),
            dedup_window: Duration::from_millis(cfg.dedup_window_ms),
            dedup_sweep_interval: cfg.dedup_sweep_interval_ms.map(Duration::from_millis),
            max_frame_bytes: cfg.max_frame_bytes,
            send_last_event_id: cfg.send_last_event_id,
            transport: None,
        }
    }

    // ── Endpoint / identity ──────────────────────────────────────────

    /// Server base address (e.g. `https://push.example.com`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Path between the base address and the token (default `stream`).
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Identity token, sent as the last path segment.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Secondary identity, sent as a query parameter.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Name of the query parameter carrying the client id (default `clientId`).
    pub fn client_id_param(mut self, name: impl Into<String>) -> Self {
        self.client_id_param = name.into();
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// `event:` name of liveness frames (default `heartbeat`).
    pub fn liveness_event(mut self, name: impl Into<String>) -> Self {
        self.liveness_event = name.into();
        self
    }

    /// Silence after which the connection is declared dead (default 45s).
    pub fn heartbeat_timeout(mut self, d: Duration) -> Self {
        self.heartbeat_timeout = d;
        self
    }

    /// Limit for receiving response headers (default 10s).
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// Limit between two body chunks (default 120s).
    pub fn read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout = d;
        self
    }

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// How long a seen event id suppresses redelivery (default 5 min).
    pub fn dedup_window(mut self, d: Duration) -> Self {
        self.dedup_window = d;
        self
    }

    /// How often expired ids are swept (default: the dedup window).
    pub fn dedup_sweep_interval(mut self, d: Duration) -> Self {
        self.dedup_sweep_interval = Some(d);
        self
    }

    /// Send `Last-Event-ID` when reconnecting (default on).
    pub fn send_last_event_id(mut self, enabled: bool) -> Self {
        self.send_last_event_id = enabled;
        self
    }

    // ── Limits ───────────────────────────────────────────────────────

    /// Largest accepted frame (default 1 MB).
    pub fn max_frame_bytes(mut self, n: usize) -> Self {
        self.max_frame_bytes = n;
        self
    }

    /// Replace the HTTP transport.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Build the [`StreamClient`].  Does not connect.
    pub fn build(self) -> Result<StreamClient, ClientError> {
        if self.base_url.is_empty() {
            return Err(ClientError::Config("base_url is required".into()));
        }
        if self.token.is_empty() {
            return Err(ClientError::Config("token is required".into()));
        }
        if self.liveness_event.trim().is_empty() {
            return Err(ClientError::Config("liveness_event must not be empty".into()));
        }
        for (name, value) in [
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("dedup_window", self.dedup_window),
        ] {
            if value.is_zero() {
                return Err(ClientError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.dedup_sweep_interval.is_some_and(|d| d.is_zero()) {
            return Err(ClientError::Config("dedup_sweep_interval must be non-zero".into()));
        }
        let backoff = &self.reconnect_backoff;
        if backoff.backoff_factor.is_nan() || backoff.backoff_factor < 1.0 {
            return Err(ClientError::Config("backoff_factor must be >= 1.0".into()));
        }
        if backoff.max_delay < backoff.initial_delay {
            return Err(ClientError::Config(
                "max_delay must not be shorter than initial_delay".into(),
            ));
        }

        let url = stream_url(
            &self.base_url,
            &self.stream_path,
            &self.token,
            &self.client_id_param,
            &self.client_id,
        )?;

        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(self.connect_timeout)?),
        };

        let settings = Settings {
            url,
            session: SessionSettings {
                liveness_event: self.liveness_event.trim().to_owned(),
                heartbeat_timeout: self.heartbeat_timeout,
                connect_timeout: self.connect_timeout,
                read_timeout: self.read_timeout,
                max_frame_bytes: self.max_frame_bytes,
            },
            reconnect_backoff: self.reconnect_backoff,
            dedup_window: self.dedup_window,
            dedup_sweep_interval: self.dedup_sweep_interval.unwrap_or(self.dedup_window),
            send_last_event_id: self.send_last_event_id,
        };

        Ok(StreamClient::new(settings, transport))
    }
}

impl Default for StreamClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
