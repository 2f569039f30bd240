//! The client façade and the reconnect loop behind it.
//!
//! All mutable state sits in one [`Inner`] behind a mutex.  Every background
//! task carries the *generation* it was spawned for; `connect()` and
//! `disconnect()` bump the generation, so a task that outlives its run can
//! neither deliver events nor touch the state of the next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use pl_protocol::Event;
use reqwest::header::HeaderValue;
use reqwest::Url;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupWindow;
use crate::reconnect::{ReconnectBackoff, ReconnectController};
use crate::session::{run_session, SessionEnd, SessionObserver, SessionSettings};
use crate::transport::{StreamRequest, Transport};
use crate::types::{ClientEvent, ConnectionState, LinkPhase};

/// Resolved configuration.  Produced by the builder.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub url: Url,
    pub session: SessionSettings,
    pub reconnect_backoff: ReconnectBackoff,
    pub dedup_window: Duration,
    pub dedup_sweep_interval: Duration,
    pub send_last_event_id: bool,
}

/// Long-lived push channel client.
///
/// Create via [`StreamClientBuilder`](crate::builder::StreamClientBuilder),
/// then call [`connect`](Self::connect).  The client keeps the stream open,
/// reconnecting with exponential back-off, until
/// [`disconnect`](Self::disconnect) is called or the client is dropped.
pub struct StreamClient {
    shared: Arc<Shared>,
}

struct Shared {
    settings: Settings,
    transport: Arc<dyn Transport>,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ClientEvent>>>,
    state_tx: watch::Sender<ConnectionState>,
}

struct Inner {
    generation: u64,
    controller: ReconnectController,
    dedup: DedupWindow,
    state: ConnectionState,
    run: Option<CancellationToken>,
}

impl StreamClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::StreamClientBuilder {
        crate::builder::StreamClientBuilder::new()
    }

    pub(crate) fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let inner = Inner {
            generation: 0,
            controller: ReconnectController::new(settings.reconnect_backoff.clone()),
            dedup: DedupWindow::new(settings.dedup_window),
            state: ConnectionState::default(),
            run: None,
        };

        Self {
            shared: Arc::new(Shared {
                settings,
                transport,
                inner: Mutex::new(inner),
                subscribers: Mutex::new(Vec::new()),
                state_tx,
            }),
        }
    }

    /// The endpoint this client streams from.
    pub fn stream_url(&self) -> &Url {
        &self.shared.settings.url
    }

    /// Start streaming.  A no-op while already connecting, connected or
    /// retrying.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.controller.start() {
            tracing::debug!(phase = ?inner.controller.phase(), "connect ignored; client already running");
            return;
        }

        inner.generation += 1;
        inner.dedup.clear();
        inner.state = ConnectionState::default();

        let cancel = CancellationToken::new();
        inner.run = Some(cancel.clone());
        self.shared.publish(&mut inner);

        let generation = inner.generation;
        drop(inner);

        tracing::info!(url = %self.shared.settings.url, generation, "event stream client started");
        tokio::spawn(supervise(self.shared.clone(), generation, cancel.clone()));
        tokio::spawn(sweep_dedup(self.shared.clone(), generation, cancel));
    }

    /// Stop streaming.  Cancels the heartbeat and reconnect timers, closes the
    /// stream, and guarantees nothing from the stopped run reaches
    /// subscribers.  A no-op when already stopped.
    ///
    /// The run is cancelled and fenced off before this returns; its task
    /// drops the session (timer and response) on its next poll.  A
    /// `connect()` issued right after may therefore open the new stream
    /// while the old response is still being released.  The old run can no
    /// longer deliver events or change state in that gap.
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        let Some(cancel) = inner.run.take() else {
            tracing::debug!("disconnect ignored; client not running");
            return;
        };
        cancel.cancel();

        let was_connected = inner.controller.phase() == LinkPhase::Connected;
        inner.controller.stop();
        inner.generation += 1;
        inner.dedup.clear();
        inner.state.connected = false;

        if was_connected {
            self.shared.emit(ClientEvent::Disconnected {
                reason: "disconnected by client".into(),
            });
        }
        self.shared.publish(&mut inner);
        tracing::info!("event stream client stopped");
    }

    /// Snapshot of the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.lock().state.clone()
    }

    /// Observe every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Register a new subscriber.  Drop the [`Subscription`] to unsubscribe.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().push(tx);
        Subscription { rx }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// One subscriber's view of the emitted events.
///
/// Each subscriber has its own unbounded queue: a slow subscriber never
/// slows the stream and never loses an event.  Events wait in the queue
/// until read, so a subscriber that stops reading should be dropped.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Subscription {
    /// Wait for the next event.  Returns `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}

impl Shared {
    /// Push the current snapshot to watchers.  Called with the lock held so
    /// snapshots are published in transition order.
    fn publish(&self, inner: &mut Inner) {
        inner.state.phase = inner.controller.phase();
        inner.state.reconnect_attempts = inner.controller.attempts();
        self.state_tx.send_replace(inner.state.clone());
    }

    /// Queue `event` for every live subscriber, forgetting dropped ones.
    fn emit(&self, event: ClientEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn stream_request(&self) -> StreamRequest {
        let last_event_id = if self.settings.send_last_event_id {
            self.inner.lock().state.last_event_id.clone()
        } else {
            None
        };
        StreamRequest {
            url: self.settings.url.clone(),
            last_event_id,
        }
    }

    /// Record a session's end.  Returns the back-off delay, or `None` if the
    /// run was stopped or superseded.
    fn session_ended(&self, generation: u64, end: &SessionEnd) -> Option<Duration> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }

        let was_connected = inner.controller.phase() == LinkPhase::Connected;
        let delay = inner.controller.on_session_ended()?;
        let reason = end.to_string();

        inner.state.connected = false;
        inner.state.last_error = Some(reason.clone());
        if was_connected {
            self.emit(ClientEvent::Disconnected {
                reason: reason.clone(),
            });
        }
        self.publish(&mut inner);

        tracing::warn!(
            reason = %reason,
            attempt = inner.controller.attempts(),
            delay_ms = delay.as_millis() as u64,
            "event stream lost; reconnecting"
        );
        Some(delay)
    }

    fn retry_due(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation || !inner.controller.on_retry_due() {
            return false;
        }
        self.publish(&mut inner);
        true
    }
}

/// The [`SessionObserver`] for one run.  Drops everything once its
/// generation is superseded.
struct RunObserver<'a> {
    shared: &'a Shared,
    generation: u64,
}

impl SessionObserver for RunObserver<'_> {
    fn on_open(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.generation != self.generation || !inner.controller.on_connected() {
            return;
        }
        inner.state.connected = true;
        inner.state.last_error = None;
        self.shared.emit(ClientEvent::Connected);
        self.shared.publish(&mut inner);
        tracing::info!(url = %self.shared.settings.url, "event stream connected");
    }

    fn on_liveness(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.generation != self.generation {
            return;
        }
        inner.state.last_liveness_at = Some(Utc::now());
        self.shared.publish(&mut inner);
        tracing::trace!("liveness signal");
    }

    fn on_event(&self, event: Event) {
        let mut inner = self.shared.inner.lock();
        if inner.generation != self.generation {
            return;
        }

        if !inner.dedup.should_accept(event.server_id(), Instant::now()) {
            inner.state.duplicates_suppressed += 1;
            self.shared.publish(&mut inner);
            tracing::debug!(id = %event.id, kind = %event.kind, "suppressed duplicate event");
            return;
        }

        // Only ids that can be echoed in `Last-Event-ID` are resumed from.
        if let Some(id) = event.server_id().filter(|id| HeaderValue::from_str(id).is_ok()) {
            inner.state.last_event_id = Some(id.to_owned());
        }
        inner.state.events_delivered += 1;
        self.shared.publish(&mut inner);
        self.shared.emit(ClientEvent::Event(event));
    }
}

/// Reconnect loop for one run: session, back-off, session, …
async fn supervise(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    loop {
        let request = shared.stream_request();
        let observer = RunObserver {
            shared: &shared,
            generation,
        };

        let end = tokio::select! {
            _ = cancel.cancelled() => break,
            end = run_session(
                shared.transport.as_ref(),
                &shared.settings.session,
                request,
                &observer,
            ) => end,
        };

        let Some(delay) = shared.session_ended(generation, &end) else {
            break;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        if !shared.retry_due(generation) {
            break;
        }
    }
    tracing::debug!(generation, "reconnect loop exited");
}

/// Periodically evict expired ids from the dedup window.
async fn sweep_dedup(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let period = shared.settings.dedup_sweep_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return;
        }
        let removed = inner.dedup.sweep(Instant::now());
        if removed > 0 {
            tracing::trace!(removed, retained = inner.dedup.len(), "swept dedup window");
        }
    }
}
