use tokio::sync::{mpsc, watch};
use tracing::info;

use shared::types::client_config::ClientConfig;
use shared::types::script::VERSION_SLOTS;

use crate::channel::{ChannelEvent, ChannelState, LiveChannel};
use crate::dispatch::{self, DispatchAck, Dispatcher};
use crate::error::{ChannelError, DispatchError, SessionError};
use crate::identity::SessionIdentity;
use crate::state::{Progress, SessionState, VersionSlot};

/// One generation exchange, end to end.
///
/// Owns the minted [`SessionIdentity`], the dispatcher and the live channel,
/// and folds everything the channel delivers into a [`SessionState`]. The
/// usual flow:
///
/// ```no_run
/// # async fn run() -> anyhow::Result<()> {
/// use client::GenerationSession;
/// use shared::types::client_config::ClientConfig;
///
/// let config = ClientConfig::default();
/// let mut session = GenerationSession::new(&config, "user-42")?;
///
/// session.connect()?;
/// session.start_generation("Fourier transform").await?;
///
/// while !session.state().is_complete() {
///     let Some(_event) = session.next_event().await else { break };
/// }
///
/// for slot in session.versions() {
///     println!("{}: {}", slot.style_title(), slot.summary());
/// }
/// # Ok(())
/// # }
/// ```
pub struct GenerationSession {
    identity: SessionIdentity,
    dispatcher: Dispatcher,
    channel: LiveChannel,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    state: SessionState,
}

impl GenerationSession {
    /// Build a session for a signed-in user. Mints the session token once;
    /// fails when the user id is blank or the backend URL is unusable.
    pub fn new(config: &ClientConfig, user_id: &str) -> Result<Self, SessionError> {
        let identity = SessionIdentity::mint(user_id)?;
        let dispatcher = Dispatcher::new(&config.backend)?;
        let (channel, events) = LiveChannel::new(&config.backend, &config.channel)?;

        info!("generation session ready: {}", identity.token());

        Ok(Self {
            identity,
            dispatcher,
            channel,
            events,
            state: SessionState::new(),
        })
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// The session token, stable until the session is dropped.
    pub fn session_token(&self) -> &str {
        self.identity.token()
    }

    /// Open the live channel for this session's token. Idempotent while the
    /// session is alive.
    pub fn connect(&self) -> Result<(), ChannelError> {
        self.channel.open(self.identity.token())
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Watch stream of channel state transitions.
    pub fn channel_states(&self) -> watch::Receiver<ChannelState> {
        self.channel.state_changes()
    }

    /// Kick off generation for a topic. Clears previously aggregated results
    /// first; a manual retry is exactly this call again.
    ///
    /// On a failed dispatch the session drops back to the idle phase and the
    /// error is returned as-is, carrying the backend's message when it sent
    /// one.
    pub async fn start_generation(&mut self, topic: &str) -> Result<DispatchAck, DispatchError> {
        dispatch::check_preconditions(topic, self.identity.user_id(), self.identity.token())?;

        self.state.begin_generation();

        match self
            .dispatcher
            .start_generation(topic, self.identity.user_id(), self.identity.token())
            .await
        {
            Ok(ack) => {
                self.state.seed_jobs(&ack.tokens, ack.total);
                Ok(ack)
            }
            Err(err) => {
                self.state.abort_generation();
                Err(err)
            }
        }
    }

    /// Wait for the next channel event and fold it into the session state.
    /// Returns `None` once the channel is closed and the queue is drained.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        let event = self.events.recv().await?;
        self.state.apply(&event);
        Some(event)
    }

    /// Fold in whatever is already queued without waiting; returns how many
    /// events were applied. For callers polling from a render loop.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.state.apply(&event);
            applied += 1;
        }
        applied
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn progress(&self) -> Progress {
        self.state.progress()
    }

    /// The three version slots as currently known.
    pub fn versions(&self) -> [VersionSlot; VERSION_SLOTS] {
        self.state.versions()
    }

    /// Tear down the live channel. Also happens on drop.
    pub fn close(&self) {
        self.channel.close();
    }
}
