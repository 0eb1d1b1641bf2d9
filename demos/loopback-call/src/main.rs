//! A scripted call against the in-memory loopback transport.
//!
//! Run with `RUST_LOG=roomlink=debug cargo run -p loopback-call` to see the
//! connector's own logs next to the updates printed here.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use roomlink::prelude::*;
use roomlink::protocol::TransportEvent;
use tracing_subscriber::EnvFilter;

const URL: &str = "loop://demo/signal";

/// An unsigned token; the loopback transport doesn't check signatures.
fn demo_token(identity: &str, room: &str, valid_for: Duration) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let claims = serde_json::json!({
        "sub": identity,
        "iat": now,
        "exp": now + valid_for.as_secs(),
        "video": { "room": room, "roomJoin": true },
    });
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

#[tokio::main]
async fn main() -> Result<(), RoomlinkError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let transport = LoopbackTransport::new();
    // First attempt hits an overloaded edge, the retry gets in.
    transport
        .push_outcome(ConnectOutcome::Reject(
            RawError::message("service unavailable").with_code(503),
        ))
        .push_outcome(ConnectOutcome::accept_after(Duration::from_millis(200)));

    let session = SessionConnector::builder(transport.clone())
        .config(ConnectorConfig {
            retry: RetryConfig {
                delay: DelayStrategy::Fixed {
                    delay: Duration::from_millis(300),
                },
                ..RetryConfig::default()
            },
            ..ConnectorConfig::default()
        })
        .spawn();

    let mut updates = session.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match serde_json::to_string(&update.summary()) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "unprintable update"),
            }
            if update.state.is_terminal() {
                break;
            }
        }
    });

    let token = demo_token("alice", "standup", Duration::from_secs(600));
    session.connect(&token, URL).await?;
    let mut watch = session.watch();
    watch
        .wait_for(|u| u.state == SessionState::Connected)
        .await
        .map_err(|_| SessionError::Unavailable)?;

    let script = [
        TransportEvent::ParticipantJoined {
            participant: Participant::local("alice", "Alice").with_media(MediaKind::Audio),
        },
        TransportEvent::ParticipantJoined {
            participant: Participant::remote("bob", "Bob").with_media(MediaKind::Video),
        },
        TransportEvent::ParticipantJoined {
            participant: Participant::remote("bob", "Bob"),
        },
        TransportEvent::Reconnecting,
        TransportEvent::Reconnected,
        TransportEvent::ParticipantLeft {
            id: ParticipantId::new("bob"),
        },
    ];
    for event in script {
        transport.emit(event);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    session.disconnect().await?;
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "printer task failed");
    }
    tracing::info!(
        connects = transport.connect_calls(),
        releases = transport.disconnect_calls(),
        "call finished"
    );
    Ok(())
}
