//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Relay the handshake to the backend untouched
//! - Splice the two upgraded connections once the backend answers 101
//!
//! # Data Flow
//! ```text
//! Client ←──── raw upgraded bytes ────→ Gateway ←──── raw upgraded bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level tunnel; frames are never decoded
//! - Either side closing ends the tunnel

use axum::http::{header, Request};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

/// True when `request` asks to switch to the WebSocket protocol.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    let connection_upgrade = request
        .headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let websocket = request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    connection_upgrade && websocket
}

/// Join the client and backend upgrades in a background task.
pub fn spawn_tunnel(client: OnUpgrade, backend: OnUpgrade, request_id: String) {
    tokio::spawn(async move {
        let (client, backend) = match tokio::try_join!(client, backend) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "WebSocket upgrade failed");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut backend = TokioIo::new(backend);

        match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
            Ok((sent, received)) => {
                tracing::debug!(request_id = %request_id, sent, received, "WebSocket tunnel closed");
            }
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "WebSocket tunnel ended with error");
            }
        }
    });
}
