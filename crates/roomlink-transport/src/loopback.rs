//! In-memory transport that plays back a script.
//!
//! A `LoopbackTransport` never touches the network. Each `connect` call
//! consumes the next [`ConnectOutcome`] from a queue (falling back to an
//! immediate success) and events are pushed in by hand with
//! [`LoopbackTransport::emit`]. Clones share state, so a test can keep
//! one clone while the controller owns another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use roomlink_protocol::{RawError, TransportEvent};

use crate::{event_channel, EventSink, EventStream, Transport, TransportError};

/// How the next `connect` call resolves.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// Resolve `Ok(())` right away.
    Accept,
    /// Resolve with `TransportError::Rejected(error)` right away.
    Reject(RawError),
    /// Wait `after`, then resolve as `then` would.
    Delay {
        after: Duration,
        then: Box<ConnectOutcome>,
    },
    /// Never resolve.
    Hang,
}

impl ConnectOutcome {
    /// Shorthand for a delayed success.
    pub fn accept_after(after: Duration) -> Self {
        Self::Delay {
            after,
            then: Box::new(Self::Accept),
        }
    }
}

#[derive(Default)]
struct Inner {
    script: Mutex<VecDeque<ConnectOutcome>>,
    sink: Mutex<Option<EventSink>>,
    tokens: Mutex<Vec<String>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

/// Scripted [`Transport`] for tests and demos.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoopbackTransport {
    /// A transport whose connects all succeed immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome for a future `connect` call.
    pub fn push_outcome(&self, outcome: ConnectOutcome) -> &Self {
        lock(&self.inner.script).push_back(outcome);
        self
    }

    /// Delivers an event to the current subscriber.
    ///
    /// Returns `false` if nobody is subscribed or the stream was dropped.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match lock(&self.inner.sink).as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Number of `connect` calls so far.
    pub fn connect_calls(&self) -> usize {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `disconnect` calls so far.
    pub fn disconnect_calls(&self) -> usize {
        self.inner.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Tokens presented to `connect`, oldest first.
    pub fn presented_tokens(&self) -> Vec<String> {
        lock(&self.inner.tokens).clone()
    }
}

async fn resolve(outcome: ConnectOutcome) -> Result<(), TransportError> {
    let mut outcome = outcome;
    loop {
        match outcome {
            ConnectOutcome::Accept => return Ok(()),
            ConnectOutcome::Reject(raw) => return Err(TransportError::Rejected(raw)),
            ConnectOutcome::Delay { after, then } => {
                tokio::time::sleep(after).await;
                outcome = *then;
            }
            ConnectOutcome::Hang => return std::future::pending().await,
        }
    }
}

impl Transport for LoopbackTransport {
    async fn connect(&self, url: &str, token: &str) -> Result<(), TransportError> {
        let call = self.inner.connect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.inner.tokens).push(token.to_owned());
        let outcome = lock(&self.inner.script)
            .pop_front()
            .unwrap_or(ConnectOutcome::Accept);
        tracing::debug!(url, call, ?outcome, "loopback connect");
        resolve(outcome).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let calls = self.inner.disconnect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(calls, "loopback disconnect");
        Ok(())
    }

    fn subscribe(&self) -> EventStream {
        let (sink, stream) = event_channel();
        *lock(&self.inner.sink) = Some(sink);
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_without_script_accepts() {
        let transport = LoopbackTransport::new();
        assert!(transport.connect("loop://room", "tok").await.is_ok());
        assert_eq!(transport.connect_calls(), 1);
        assert_eq!(transport.presented_tokens(), vec!["tok".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_follows_script_in_order() {
        let transport = LoopbackTransport::new();
        transport
            .push_outcome(ConnectOutcome::Reject(RawError::message("nope")))
            .push_outcome(ConnectOutcome::Accept);

        assert!(matches!(
            transport.connect("u", "t").await,
            Err(TransportError::Rejected(_))
        ));
        assert!(transport.connect("u", "t").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_outcome_waits() {
        let transport = LoopbackTransport::new();
        transport.push_outcome(ConnectOutcome::accept_after(Duration::from_secs(3)));

        let start = tokio::time::Instant::now();
        transport.connect("u", "t").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_emit_reaches_latest_subscriber_only() {
        let transport = LoopbackTransport::new();
        assert!(!transport.emit(TransportEvent::Connected));

        let mut first = transport.subscribe();
        let mut second = transport.subscribe();
        assert!(transport.emit(TransportEvent::Reconnecting));

        assert_eq!(second.recv().await, Some(TransportEvent::Reconnecting));
        // The first stream lost its sender when the second subscribed.
        assert_eq!(first.recv().await, None);
    }

    #[tokio::test]
    async fn test_disconnect_counts_calls() {
        let transport = LoopbackTransport::new();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert_eq!(transport.disconnect_calls(), 2);
    }
}
