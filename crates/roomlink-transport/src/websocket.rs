//! JSON signalling transport over a WebSocket, using `tokio-tungstenite`.
//!
//! The room service pushes [`TransportEvent`]s as JSON text or binary
//! frames. The token travels as the `access_token` query parameter.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use roomlink_protocol::{Codec, JsonCodec, RawError, TransportEvent};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{event_channel, EventSink, EventStream, Transport, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

type SharedSink = Arc<StdMutex<Option<EventSink>>>;

/// An open link: the write half plus the task pumping the read half.
struct Link {
    writer: SplitSink<WsStream, Message>,
    pump: JoinHandle<()>,
}

/// A [`Transport`] that speaks JSON events over a WebSocket.
#[derive(Default)]
pub struct WebSocketTransport {
    link: Mutex<Option<Link>>,
    sink: SharedSink,
}

impl WebSocketTransport {
    /// Creates an unconnected transport.
    pub fn new() -> Self {
        Self::default()
    }
}

fn forward(sink: &SharedSink, event: TransportEvent) {
    let guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(tx) = guard.as_ref() {
        let _ = tx.send(event);
    }
}

/// Appends the token to the URL as a query parameter.
fn signal_url(url: &str, token: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}access_token={token}")
}

fn handshake_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            TransportError::Rejected(
                RawError::message(
                    status.canonical_reason().unwrap_or("handshake rejected"),
                )
                .with_code(status.as_u16()),
            )
        }
        tungstenite::Error::Io(io) => TransportError::ConnectFailed(io),
        other => TransportError::ConnectFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            other,
        )),
    }
}

/// Reads frames until the socket closes, forwarding decoded events.
async fn pump(mut reader: SplitStream<WsStream>, sink: SharedSink) {
    let codec = JsonCodec;
    loop {
        let data = match reader.next().await {
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Binary(data))) => data.to_vec(),
            Some(Ok(Message::Close(_))) | None => {
                forward(&sink, TransportEvent::Disconnected { reason: None });
                return;
            }
            Some(Ok(_)) => continue, // ping/pong/frame
            Some(Err(e)) => {
                let reason = RawError::message(format!("network error: {e}"));
                forward(&sink, TransportEvent::Disconnected { reason: Some(reason) });
                return;
            }
        };
        match codec.decode::<TransportEvent>(&data) {
            Ok(event) => forward(&sink, event),
            Err(e) => tracing::debug!(error = %e, "dropping undecodable signal frame"),
        }
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str, token: &str) -> Result<(), TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(signal_url(url, token))
            .await
            .map_err(handshake_error)?;
        tracing::info!(url, "signalling socket open");

        let (writer, reader) = ws.split();
        let pump = tokio::spawn(pump(reader, Arc::clone(&self.sink)));

        let previous = self.link.lock().await.replace(Link { writer, pump });
        if let Some(old) = previous {
            old.pump.abort();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut link) = self.link.lock().await.take() else {
            return Ok(());
        };
        link.pump.abort();
        link.writer.send(Message::Close(None)).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn subscribe(&self) -> EventStream {
        let (tx, rx) = event_channel();
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }
}
