//! Transport abstraction layer for Roomlink.
//!
//! The session controller never talks to the network directly. It drives
//! a [`Transport`]: open the link, close it, and listen to what the link
//! reports through an [`EventStream`].
//!
//! # Feature Flags
//!
//! - `loopback` (default): [`LoopbackTransport`], an in-memory scripted
//!   transport for tests and demos
//! - `websocket` (default): [`WebSocketTransport`], JSON signalling over
//!   a WebSocket via `tokio-tungstenite`

mod error;
#[cfg(feature = "loopback")]
mod loopback;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "loopback")]
pub use loopback::{ConnectOutcome, LoopbackTransport};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use std::future::Future;

use roomlink_protocol::TransportEvent;
use tokio::sync::mpsc;

/// Sending half handed to a transport's event pump.
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half the controller reads transport events from.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// A link to a remote room.
///
/// The session controller never looks inside a transport. It asks for a
/// connection, asks for it to be released, and listens for what happens
/// in between. Swapping [`WebSocketTransport`] for [`LoopbackTransport`]
/// changes nothing else.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → the controller shares the transport (through an
///   `Arc`) with the task running the current connect attempt.
/// - `'static` → the transport outlives any single session and borrows
///   nothing from its caller.
///
/// Methods take `&self` and return `Send` futures so the controller can
/// run a connect attempt in its own task while it keeps processing
/// events. Implementations use interior mutability for their link state.
///
/// ## Events
///
/// [`subscribe`](Transport::subscribe) hands out a fresh stream. Only the
/// most recent subscriber receives events; the controller subscribes once
/// per session, so events from a previous session's link cannot leak
/// into the next one.
pub trait Transport: Send + Sync + 'static {
    /// Opens the link to `url`, presenting `token`.
    ///
    /// Resolves `Ok(())` once the room accepted the participant.
    fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the link and releases everything it holds.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts delivering events to a new stream.
    ///
    /// A transport has a single subscriber; subscribing again detaches
    /// the previous stream.
    fn subscribe(&self) -> EventStream;
}

/// Builds the event channel pair used by transports.
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}
