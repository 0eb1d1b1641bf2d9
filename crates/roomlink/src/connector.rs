//! Session connector: a Tokio task that owns one session at a time.
//!
//! The connector runs as an actor. Callers talk to it through a cloneable
//! [`SessionHandle`]; everything that can change the session (commands,
//! transport events, connect results, the token refresh deadline, the
//! retry timer, the resume deadline) is serialized through one
//! `tokio::select!` loop. Connect
//! attempts and credential fetches run in spawned tasks and report back
//! tagged with the generation they started under, so a result that
//! outlives its session is recognised and dropped.

use std::sync::Arc;
use std::time::Duration;

use roomlink_protocol::{RawError, RoomName, TokenGrant, TransportEvent};
use roomlink_retry::{
    classify, ErrorCategory, GiveUpReason, ReconnectionPolicy, RetryDecision, RetryTimer,
};
use roomlink_roster::RosterTracker;
use roomlink_token::{
    CredentialSource, KeyValueStore, MemoryStore, NoCredentialSource, Token, TokenCache,
    TokenError, TokenGuardian,
};
use roomlink_transport::{EventStream, Transport, TransportError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::{ConnectorConfig, ExhaustionOutcome, SessionError, SessionState, SessionUpdate};

/// Capacity of the command channel between handles and the actor.
const COMMAND_BUFFER: usize = 32;

// ---------------------------------------------------------------------------
// Commands and completions
// ---------------------------------------------------------------------------

enum Command {
    Connect {
        token: String,
        url: String,
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    RefreshToken {
        token: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown,
}

/// Why a connect attempt did not succeed.
enum AttemptError {
    Transport(TransportError),
    TimedOut(Duration),
}

impl AttemptError {
    fn to_raw(&self) -> RawError {
        match self {
            Self::Transport(e) => e.to_raw(),
            Self::TimedOut(after) => {
                RawError::message(format!("connect timed out after {after:?}"))
                    .with_name("TimeoutError")
            }
        }
    }
}

/// Results reported back by spawned work.
enum Completion {
    Connect {
        generation: u64,
        attempt: u64,
        result: Result<(), AttemptError>,
    },
    Refresh {
        generation: u64,
        result: Result<TokenGrant, TokenError>,
    },
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle to a running connector. Cheap to clone.
///
/// Every method is safe to call from inside an update subscriber: commands
/// are queued for the actor, never run re-entrantly.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<Command>,
    updates: broadcast::Sender<SessionUpdate>,
    latest: watch::Receiver<SessionUpdate>,
}

impl SessionHandle {
    /// Starts a new session with `token` against `url`, tearing down the
    /// current one first.
    ///
    /// Returns the new session's generation once the attempt has started;
    /// the outcome arrives as updates.
    ///
    /// # Errors
    /// - [`SessionError::TokenInvalid`], [`SessionError::TokenExpired`]:
    ///   the token was rejected and nothing changed
    /// - [`SessionError::Unavailable`]: the connector has stopped
    pub async fn connect(&self, token: &str, url: &str) -> Result<u64, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect {
            token: token.to_owned(),
            url: url.to_owned(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Unavailable)?
    }

    /// Ends the current session. Idempotent.
    ///
    /// Resolves once the transport has been released.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply }).await?;
        rx.await.map_err(|_| SessionError::Unavailable)
    }

    /// Replaces the current session's token with a fresh one obtained
    /// outside the connector.
    pub async fn refresh_token(&self, token: &str) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RefreshToken {
            token: token.to_owned(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Unavailable)?
    }

    /// Stops the connector, disconnecting first. Other handles become
    /// unavailable.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    /// The latest published update.
    pub fn status(&self) -> SessionUpdate {
        self.latest.borrow().clone()
    }

    /// Every update from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// The latest update, as a `watch` receiver.
    pub fn watch(&self) -> watch::Receiver<SessionUpdate> {
        self.latest.clone()
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| SessionError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Wires a transport, a token store and a credential source into a
/// connector.
///
/// # Example
///
/// ```rust,no_run
/// use roomlink::prelude::*;
///
/// # async fn run(token: &str) -> Result<(), RoomlinkError> {
/// let session = SessionConnector::builder(WebSocketTransport::new())
///     .config(ConnectorConfig::default())
///     .spawn();
///
/// session.connect(token, "wss://rooms.example.com/signal").await?;
/// let mut updates = session.subscribe();
/// while let Ok(update) = updates.recv().await {
///     println!("{} with {} participants", update.state, update.roster.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SessionConnectorBuilder<T, S, C> {
    transport: T,
    store: S,
    credentials: C,
    config: ConnectorConfig,
}

impl<T, S, C> SessionConnectorBuilder<T, S, C>
where
    T: Transport,
    S: KeyValueStore,
    C: CredentialSource,
{
    /// Where the current token is cached. Defaults to a [`MemoryStore`].
    pub fn store<S2: KeyValueStore>(self, store: S2) -> SessionConnectorBuilder<T, S2, C> {
        SessionConnectorBuilder {
            transport: self.transport,
            store,
            credentials: self.credentials,
            config: self.config,
        }
    }

    /// Who to ask for a new token when a refresh is due. Defaults to
    /// [`NoCredentialSource`].
    pub fn credentials<C2: CredentialSource>(
        self,
        credentials: C2,
    ) -> SessionConnectorBuilder<T, S, C2> {
        SessionConnectorBuilder {
            transport: self.transport,
            store: self.store,
            credentials,
            config: self.config,
        }
    }

    pub fn config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawns the connector task on the current Tokio runtime.
    ///
    /// The task runs until [`SessionHandle::shutdown`] is called or every
    /// handle is dropped.
    pub fn spawn(self) -> SessionHandle {
        let config = self.config.validated();
        let (sender, commands) = mpsc::channel(COMMAND_BUFFER);
        let (updates, _) = broadcast::channel(config.update_buffer);
        let (latest_tx, latest) = watch::channel(SessionUpdate::initial());
        let (completions_tx, completions) = mpsc::unbounded_channel();

        let connector = SessionConnector {
            transport: Arc::new(self.transport),
            store: Arc::new(self.store),
            credentials: Arc::new(self.credentials),
            guardian: TokenGuardian::new(config.token.clone()),
            policy: ReconnectionPolicy::new(config.retry.clone()),
            retry: RetryTimer::new(),
            resume_deadline: RetryTimer::new(),
            roster: RosterTracker::new(),
            config,
            state: SessionState::Idle,
            generation: 0,
            session: None,
            events: None,
            attempt_task: None,
            commands,
            completions_tx,
            completions,
            updates: updates.clone(),
            latest: latest_tx,
        };
        tokio::spawn(connector.run());

        SessionHandle {
            sender,
            updates,
            latest,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConnector
// ---------------------------------------------------------------------------

/// The live session: where it connects and with which credential.
struct Session<S: KeyValueStore> {
    room: RoomName,
    url: String,
    /// `None` once the refresh deadline has destroyed the credential and no
    /// replacement has arrived.
    token: Option<String>,
    cache: TokenCache<Arc<S>>,
    /// Number of connect attempts started in this session.
    attempts: u64,
}

/// The connector actor. Built with [`SessionConnector::builder`].
pub struct SessionConnector<T, S: KeyValueStore, C> {
    transport: Arc<T>,
    store: Arc<S>,
    credentials: Arc<C>,
    config: ConnectorConfig,
    guardian: TokenGuardian,
    policy: ReconnectionPolicy,
    retry: RetryTimer,
    /// Bounds a reconnect the transport runs on its own.
    resume_deadline: RetryTimer,
    roster: RosterTracker,
    state: SessionState,
    generation: u64,
    session: Option<Session<S>>,
    events: Option<EventStream>,
    attempt_task: Option<JoinHandle<()>>,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    updates: broadcast::Sender<SessionUpdate>,
    latest: watch::Sender<SessionUpdate>,
}

impl<T: Transport> SessionConnector<T, MemoryStore, NoCredentialSource> {
    /// Starts building a connector around `transport`.
    pub fn builder(transport: T) -> SessionConnectorBuilder<T, MemoryStore, NoCredentialSource> {
        SessionConnectorBuilder {
            transport,
            store: MemoryStore::new(),
            credentials: NoCredentialSource,
            config: ConnectorConfig::default(),
        }
    }
}

async fn next_event(events: &mut Option<EventStream>) -> Option<TransportEvent> {
    match events {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

impl<T, S, C> SessionConnector<T, S, C>
where
    T: Transport,
    S: KeyValueStore,
    C: CredentialSource,
{
    async fn run(mut self) {
        info!("session connector started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = next_event(&mut self.events) => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!(generation = self.generation, "transport event stream closed");
                        self.events = None;
                    }
                },
                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion).await;
                }
                Some(expired) = self.guardian.wait_for_refresh() => {
                    self.handle_refresh_due(expired);
                }
                generation = self.retry.wait() => self.handle_retry(generation).await,
                generation = self.resume_deadline.wait() => {
                    self.handle_resume_deadline(generation).await;
                }
            }
        }

        self.end_session(SessionState::Disconnected, None).await;
        info!("session connector stopped");
    }

    // -- commands ----------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { token, url, reply } => {
                let result = self.connect(token, url).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.end_session(SessionState::Disconnected, None).await;
                let _ = reply.send(());
            }
            Command::RefreshToken { token, reply } => {
                let result = self.install_token(&token);
                let _ = reply.send(result);
            }
            Command::Shutdown => {}
        }
    }

    async fn connect(&mut self, raw: String, url: String) -> Result<u64, SessionError> {
        // Validate before touching the current session: a rejected token
        // changes nothing.
        let mut guardian = TokenGuardian::new(self.config.token.clone());
        let token = match guardian.accept(&raw) {
            Ok(token) => token.clone(),
            Err(e) => {
                warn!(error = %e, "token rejected");
                let error = SessionError::from(e);
                self.publish(Some(error.clone()));
                return Err(error);
            }
        };

        self.end_session(SessionState::Disconnected, None).await;

        let room = token
            .room_name()
            .cloned()
            .unwrap_or_else(|| RoomName::new(url.as_str()));
        let cache = TokenCache::new(Arc::clone(&self.store), &room);
        if let Err(e) = cache.save(&token) {
            warn!(%room, error = %e, "failed to cache token");
        }

        self.guardian = guardian;
        self.generation += 1;
        self.state = SessionState::Idle;
        self.policy.reset();
        self.roster.clear();
        self.events = Some(self.transport.subscribe());
        self.session = Some(Session {
            room: room.clone(),
            url,
            token: Some(raw),
            cache,
            attempts: 0,
        });
        info!(%room, generation = self.generation, "session starting");

        self.transition(SessionState::Connecting, None);
        self.start_attempt().await;
        Ok(self.generation)
    }

    /// Accepts a replacement token for the live session and caches it.
    fn install_token(&mut self, raw: &str) -> Result<(), SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::NoSession);
        };
        let token = self.guardian.accept(raw)?;
        if let Err(e) = session.cache.save(token) {
            warn!(room = %session.room, error = %e, "failed to cache token");
        }
        session.token = Some(raw.to_owned());
        info!(room = %session.room, generation = self.generation, "token refreshed");
        Ok(())
    }

    // -- connect attempts --------------------------------------------------

    /// Starts the next connect attempt with the session's current token.
    ///
    /// A session whose token was destroyed by the refresh deadline cannot
    /// present it again; it fails with [`SessionError::TokenExpired`].
    async fn start_attempt(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(token) = session.token.clone() else {
            warn!(
                room = %session.room,
                generation = self.generation,
                "no valid token to connect with"
            );
            let error = SessionError::TokenExpired("token expired before reconnect".into());
            self.end_session(SessionState::Failed, Some(error)).await;
            return;
        };
        session.attempts += 1;
        let (generation, attempt) = (self.generation, session.attempts);
        let transport = Arc::clone(&self.transport);
        let url = session.url.clone();
        let timeout = self.config.connect_timeout;
        let done = self.completions_tx.clone();
        debug!(room = %session.room, generation, attempt, "connect attempt started");

        let task = tokio::spawn(async move {
            let result = match time::timeout(timeout, transport.connect(&url, &token)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(AttemptError::Transport(e)),
                Err(_) => Err(AttemptError::TimedOut(timeout)),
            };
            let _ = done.send(Completion::Connect {
                generation,
                attempt,
                result,
            });
        });
        if let Some(previous) = self.attempt_task.replace(task) {
            previous.abort();
        }
    }

    async fn handle_retry(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale retry ignored");
            return;
        }
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::Reconnecting
        ) {
            debug!(generation, state = %self.state, "retry no longer needed");
            return;
        }
        trace!(generation, "retrying connect");
        self.start_attempt().await;
    }

    /// The transport has been resuming on its own for the whole retry
    /// budget without reporting back.
    async fn handle_resume_deadline(&mut self, generation: u64) {
        if generation != self.generation || self.state != SessionState::Reconnecting {
            debug!(generation, state = %self.state, "stale resume deadline ignored");
            return;
        }
        warn!(
            generation,
            budget_ms = self.config.retry.budget.as_millis() as u64,
            "transport did not resume within the retry budget"
        );
        let attempts = self.policy.attempts();
        self.exhaust(attempts).await;
    }

    // -- completions -------------------------------------------------------

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connect {
                generation,
                attempt,
                result,
            } => {
                let current = self.session.as_ref().map(|s| s.attempts);
                if generation != self.generation || current != Some(attempt) {
                    debug!(generation, attempt, "stale connect result ignored");
                    return;
                }
                self.attempt_task = None;
                self.handle_connect_result(result).await;
            }
            Completion::Refresh { generation, result } => {
                if generation != self.generation || self.session.is_none() {
                    debug!(generation, "stale token refresh ignored");
                    return;
                }
                let outcome = result
                    .map_err(SessionError::from)
                    .and_then(|grant| self.install_token(&grant.token));
                if let Err(error) = outcome {
                    warn!(generation, %error, "token refresh failed");
                    self.publish(Some(error));
                }
            }
        }
    }

    async fn handle_connect_result(&mut self, result: Result<(), AttemptError>) {
        if !matches!(
            self.state,
            SessionState::Connecting | SessionState::Reconnecting
        ) {
            debug!(state = %self.state, "connect result after state change ignored");
            return;
        }
        match result {
            Ok(()) => self.on_connected(),
            Err(failure) => {
                let raw = failure.to_raw();
                let category = classify(&raw);
                let error = match failure {
                    AttemptError::TimedOut(after) => SessionError::Timeout(after),
                    AttemptError::Transport(_) => SessionError::ConnectFailed {
                        category,
                        fatal: category.is_fatal(),
                        message: raw.to_string(),
                    },
                };
                self.on_failure(category, error).await;
            }
        }
    }

    fn on_connected(&mut self) {
        self.policy.reset();
        self.retry.cancel();
        self.resume_deadline.cancel();
        self.transition(SessionState::Connected, None);
    }

    /// Routes a classified failure to `Failed`, a retry, or the configured
    /// exhaustion outcome.
    async fn on_failure(&mut self, category: ErrorCategory, error: SessionError) {
        match self.policy.on_transient_failure(category) {
            RetryDecision::Retry { attempt, delay } => {
                let room = self.session.as_ref().map(|s| s.room.clone());
                warn!(
                    room = ?room,
                    generation = self.generation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "transient failure, retry scheduled"
                );
                self.retry.schedule(delay, self.generation);
                if self.state == SessionState::Connected {
                    self.transition(SessionState::Reconnecting, None);
                }
            }
            RetryDecision::GiveUp(GiveUpReason::Fatal(category)) => {
                warn!(generation = self.generation, %category, %error, "fatal failure");
                self.end_session(SessionState::Failed, Some(error)).await;
            }
            RetryDecision::GiveUp(reason) => {
                let attempts = match reason {
                    GiveUpReason::AttemptsExhausted { attempts } => attempts,
                    _ => self.policy.attempts(),
                };
                warn!(generation = self.generation, ?reason, "giving up on reconnect");
                self.exhaust(attempts).await;
            }
        }
    }

    /// Ends the session in the configured exhaustion outcome.
    async fn exhaust(&mut self, attempts: u32) {
        let terminal = match self.config.on_exhausted {
            ExhaustionOutcome::Disconnected => SessionState::Disconnected,
            ExhaustionOutcome::Failed => SessionState::Failed,
        };
        self.end_session(terminal, Some(SessionError::RetryBudgetExhausted { attempts }))
            .await;
    }

    // -- transport events --------------------------------------------------

    async fn handle_event(&mut self, event: TransportEvent) {
        if !self.state.is_live() {
            debug!(state = %self.state, ?event, "event outside a live session ignored");
            return;
        }
        match event {
            TransportEvent::Connected => {
                if self.state != SessionState::Connected {
                    self.on_connected();
                }
            }
            TransportEvent::Reconnecting => {
                if self.state == SessionState::Connected {
                    self.resume_deadline
                        .schedule(self.config.retry.budget, self.generation);
                    self.transition(SessionState::Reconnecting, None);
                }
            }
            TransportEvent::Reconnected => {
                if self.state == SessionState::Reconnecting {
                    self.on_connected();
                }
            }
            TransportEvent::Disconnected { reason } => {
                let raw = reason.unwrap_or_else(|| RawError::message("connection lost"));
                let category = classify(&raw);
                let error = SessionError::Transport {
                    category,
                    message: raw.to_string(),
                };
                self.on_failure(category, error).await;
            }
            TransportEvent::Error { error } => {
                let category = classify(&error);
                let error = SessionError::Transport {
                    category,
                    message: error.to_string(),
                };
                if category.is_fatal() {
                    warn!(generation = self.generation, %error, "fatal transport error");
                    self.end_session(SessionState::Failed, Some(error)).await;
                } else {
                    debug!(generation = self.generation, %error, "transient transport error");
                    self.publish(Some(error));
                }
            }
            event @ (TransportEvent::ParticipantJoined { .. }
            | TransportEvent::ParticipantLeft { .. }) => {
                if self.roster.apply_event(&event) {
                    self.publish(None);
                }
            }
        }
    }

    // -- token refresh -----------------------------------------------------

    fn handle_refresh_due(&mut self, expired: Token) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        // The guardian has already dropped it; later attempts must not
        // present it either.
        session.token = None;
        if let Err(e) = session.cache.clear() {
            warn!(room = %session.room, error = %e, "failed to clear cached token");
        }
        info!(room = %session.room, generation = self.generation, "token refresh due");

        let credentials = Arc::clone(&self.credentials);
        let room = session.room.clone();
        let identity = expired.identity().cloned();
        let generation = self.generation;
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = credentials.fetch(&room, identity.as_ref()).await;
            let _ = done.send(Completion::Refresh { generation, result });
        });
    }

    // -- teardown and publishing -------------------------------------------

    /// Ends the live session, if any, in `terminal`.
    ///
    /// Timers are cancelled before the transport release is awaited. The
    /// session is taken out first, so the transport is released once.
    async fn end_session(&mut self, terminal: SessionState, error: Option<SessionError>) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.generation += 1;
        self.retry.cancel();
        self.resume_deadline.cancel();
        self.guardian.invalidate();
        if let Some(task) = self.attempt_task.take() {
            task.abort();
        }
        self.events = None;
        self.roster.clear();
        if let Err(e) = session.cache.clear() {
            warn!(room = %session.room, error = %e, "failed to clear cached token");
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!(room = %session.room, error = %e, "transport release failed");
        }

        info!(room = %session.room, generation = self.generation, "session ended");
        self.transition(terminal, error);
    }

    fn transition(&mut self, next: SessionState, error: Option<SessionError>) {
        if !self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "transition refused");
            return;
        }
        info!(
            generation = self.generation,
            from = %self.state,
            to = %next,
            "session state changed"
        );
        self.state = next;
        self.publish(error);
    }

    fn publish(&self, error: Option<SessionError>) {
        let update = SessionUpdate {
            state: self.state,
            roster: self.roster.snapshot(),
            error,
            generation: self.generation,
        };
        // No subscribers is fine; the watch still holds the latest.
        let _ = self.updates.send(update.clone());
        self.latest.send_replace(update);
    }
}
