use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shared::types::client_config::{BackendConfig, ChannelConfig};
use shared::types::event::{PushEvent, events_path};

use crate::error::{ChannelError, TransportError};
use crate::net::{self, Endpoint};
use crate::sse::{SseMessage, SseParser};

// ---------------------------------------------------------------------------
// Channel state
// ---------------------------------------------------------------------------

/// Connection lifecycle of the live channel.
///
/// `Closed` is terminal: a closed channel never reconnects and never emits
/// another event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No session token bound yet.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// The event stream is up.
    Connected,
    /// The last connection failed or dropped; a retry is pending (or the
    /// retry cap was reached).
    Errored,
    /// Torn down by [`LiveChannel::close`]. Terminal.
    Closed,
}

impl ChannelState {
    /// Coarse status label for user-facing surfaces.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Idle => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Errored => "error",
            ChannelState::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition helper shared by the channel handle and its transport task.
/// Never resurrects a closed channel and never re-sends the current state.
fn advance_state(state: &watch::Sender<ChannelState>, next: ChannelState) {
    state.send_if_modified(|current| {
        if *current == ChannelState::Closed || *current == next {
            return false;
        }
        debug!("live channel state: {} -> {}", current, next);
        *current = next;
        true
    });
}

// ---------------------------------------------------------------------------
// Channel events
// ---------------------------------------------------------------------------

/// Everything the channel hands its single consumer.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A push message that decoded cleanly.
    Push(PushEvent),
    /// A frame whose payload was not valid JSON. Counted by the aggregator
    /// and otherwise ignored; the stream itself stays up.
    Malformed { error: String },
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Reconnect policy, copied out of [`ChannelConfig`] when the channel is
/// built.
#[derive(Debug, Clone)]
struct RetryPolicy {
    delay: Duration,
    jitter_ms: u64,
    max_retries: Option<u32>,
}

impl RetryPolicy {
    fn from_config(config: &ChannelConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.retry_delay_ms),
            jitter_ms: config.retry_jitter_ms,
            max_retries: config.max_retries,
        }
    }

    fn next_delay(&self) -> Duration {
        if self.jitter_ms == 0 {
            return self.delay;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter_ms);
        self.delay + Duration::from_millis(extra)
    }
}

// ---------------------------------------------------------------------------
// LiveChannel
// ---------------------------------------------------------------------------

/// Push-event subscription for one session.
///
/// Bound to a single session token by the first [`open`](Self::open) call.
/// Decoded events arrive on the receiver returned by [`new`](Self::new);
/// connection status is observable through [`state`](Self::state) and
/// [`state_changes`](Self::state_changes).
///
/// Lost connections are retried automatically after the configured delay for
/// as long as the channel is open. [`close`](Self::close) is terminal and
/// also runs on drop.
pub struct LiveChannel {
    endpoint: Endpoint,
    policy: RetryPolicy,
    state: Arc<watch::Sender<ChannelState>>,
    inner: Mutex<Inner>,
}

struct Inner {
    events_tx: Option<mpsc::UnboundedSender<ChannelEvent>>,
    token: Option<String>,
    task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl LiveChannel {
    /// Build a channel plus the consumer handle for its events. Nothing
    /// connects until [`open`](Self::open).
    pub fn new(
        backend: &BackendConfig,
        config: &ChannelConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>), TransportError> {
        let endpoint = Endpoint::from_base_url(&backend.resolved_base_url())?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ChannelState::Idle);

        let channel = Self {
            endpoint,
            policy: RetryPolicy::from_config(config),
            state: Arc::new(state),
            inner: Mutex::new(Inner {
                events_tx: Some(events_tx),
                token: None,
                task: None,
                shutdown: None,
            }),
        };
        Ok((channel, events_rx))
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch stream of state transitions, for callers rendering connection
    /// status.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Bind the channel to a session token and start the transport task.
    ///
    /// Calling again with the same token while the channel is connecting or
    /// connected is a no-op. A closed channel cannot be reopened.
    pub fn open(&self, session_token: &str) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();

        if self.state() == ChannelState::Closed {
            return Err(ChannelError::Closed);
        }

        if let Some(existing) = &inner.token {
            if existing == session_token {
                debug!("live channel already open for this session");
            } else {
                warn!(
                    "live channel already bound to {}; ignoring open for {}",
                    existing, session_token
                );
            }
            return Ok(());
        }

        let events = match &inner.events_tx {
            Some(tx) => tx.clone(),
            None => return Err(ChannelError::Closed),
        };

        info!("opening live channel for {}", session_token);
        inner.token = Some(session_token.to_string());
        advance_state(&self.state, ChannelState::Connecting);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = TransportTask {
            endpoint: self.endpoint.clone(),
            path: self.endpoint.request_path(&events_path(session_token)),
            policy: self.policy.clone(),
            state: Arc::clone(&self.state),
            events,
        };

        inner.shutdown = Some(shutdown_tx);
        inner.task = Some(tokio::spawn(task.run(shutdown_rx)));
        Ok(())
    }

    /// Tear the channel down. Safe to call any number of times; also runs on
    /// drop. The event receiver sees the queue drained to its end and then
    /// `None`.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();

        let newly_closed = self.state.send_if_modified(|current| {
            if *current == ChannelState::Closed {
                return false;
            }
            *current = ChannelState::Closed;
            true
        });

        if let Some(shutdown) = inner.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.events_tx = None;

        if newly_closed {
            info!("live channel closed");
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Transport task
// ---------------------------------------------------------------------------

enum Outcome {
    Shutdown,
    ConsumerGone,
    ConnectFailed(TransportError),
    StreamLost(String),
}

struct TransportTask {
    endpoint: Endpoint,
    path: String,
    policy: RetryPolicy,
    state: Arc<watch::Sender<ChannelState>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl TransportTask {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // Consecutive connect failures; resets once a stream comes up.
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            advance_state(&self.state, ChannelState::Connecting);

            match self.connect_once(&mut shutdown).await {
                Outcome::Shutdown => break,
                Outcome::ConsumerGone => {
                    info!("event consumer dropped; shutting the live channel down");
                    break;
                }
                Outcome::ConnectFailed(err) => {
                    warn!("live channel connect failed: {}", err);
                    failures += 1;
                }
                Outcome::StreamLost(reason) => {
                    warn!("live channel lost: {}", reason);
                    failures = 0;
                }
            }

            advance_state(&self.state, ChannelState::Errored);

            if let Some(cap) = self.policy.max_retries {
                if failures > cap {
                    warn!(
                        "live channel reconnect cap ({}) reached; staying in error state",
                        cap
                    );
                    return;
                }
            }

            let delay = self.policy.next_delay();
            debug!("reconnecting live channel in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        advance_state(&self.state, ChannelState::Closed);
    }

    async fn connect_once(&self, shutdown: &mut watch::Receiver<bool>) -> Outcome {
        debug!("opening event stream: {}", self.path);

        let response = tokio::select! {
            _ = shutdown.changed() => return Outcome::Shutdown,
            response = net::open_event_stream(&self.endpoint, &self.path) => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => return Outcome::ConnectFailed(err),
        };

        if !response.status().is_success() {
            return Outcome::ConnectFailed(TransportError::Status(response.status()));
        }

        info!("live channel connected: {}", self.path);
        advance_state(&self.state, ChannelState::Connected);

        self.pump(response.into_body(), shutdown).await
    }

    /// Read body frames, decode complete SSE messages, forward them. Runs
    /// until the stream drops, the consumer goes away, or shutdown.
    async fn pump(&self, mut body: Incoming, shutdown: &mut watch::Receiver<bool>) -> Outcome {
        let mut parser = SseParser::new();

        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => return Outcome::Shutdown,
                frame = body.frame() => frame,
            };

            match frame {
                None => return Outcome::StreamLost("event stream ended".to_string()),
                Some(Err(err)) => return Outcome::StreamLost(err.to_string()),
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        for message in parser.push(data) {
                            if !self.deliver(message) {
                                return Outcome::ConsumerGone;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Decode one SSE message and forward it. Returns false once the
    /// consumer side of the event queue is gone.
    fn deliver(&self, message: SseMessage) -> bool {
        // The backend tags events inside the JSON payload; the SSE `event:`
        // name is not used for routing.
        let event = match serde_json::from_str::<PushEvent>(&message.data) {
            Ok(push) => ChannelEvent::Push(push),
            Err(err) => {
                warn!("malformed push event: {}", err);
                ChannelEvent::Malformed {
                    error: err.to_string(),
                }
            }
        };
        self.events.send(event).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
