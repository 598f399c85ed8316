//! `WebSocket` adapter for the session serving loop.
//!
//! Clients connect to `GET /api/ws`. The socket is split in two:
//!
//! - the **reader** runs [`serve_session`], which joins the registry,
//!   queues the snapshot and handles `count_moo` frames
//! - the **writer** drains the session's outbound queue into the socket,
//!   encoding each state message as a `mc|<count>` text frame
//!
//! Each frame write is bounded by the configured send timeout. When a
//! write fails or times out the writer stops, which closes the queue (so
//! the next broadcast evicts the session) and ends the reader. A session
//! evicted for a full queue ends the same way: the reader returns, the
//! writer gets one send timeout to flush, and the socket is closed.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use moo_core::{InboundFrame, ServerMessage, SessionEnd, SessionHandle, SessionId, serve_session};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` counter session.
///
/// # Route
///
/// `GET /api/ws`
pub async fn ws_counter(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Run one session to completion.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    let (handle, outbound) = SessionHandle::channel(state.ws.outbound_buffer);
    let session_id = handle.id();
    debug!(%session_id, "WebSocket client connected");

    let mut writer = tokio::spawn(write_outbound(
        sink,
        outbound,
        state.ws.send_timeout,
        session_id,
    ));
    let inbound = stream.map(|msg| msg.map(inbound_frame));

    let (end, writer_done) = tokio::select! {
        end = serve_session(&state.hub, handle, inbound, state.session_options()) => (end, false),
        _ = &mut writer => (SessionEnd::Transport("outbound writer stopped".to_owned()), true),
    };

    // Every sender is gone once the session has ended, so the writer
    // flushes what is left and closes the socket.
    if !writer_done
        && tokio::time::timeout(state.ws.send_timeout, &mut writer)
            .await
            .is_err()
    {
        writer.abort();
    }

    match &end {
        SessionEnd::PeerClosed => debug!(%session_id, "WebSocket client disconnected"),
        other => info!(%session_id, reason = ?other, "WebSocket session ended"),
    }
}

/// Forward queued state messages to the socket until the queue closes
/// or a write fails.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
    send_timeout: Duration,
    session_id: SessionId,
) {
    while let Some(message) = outbound.recv().await {
        let frame = Message::Text(message.encode().into());
        match tokio::time::timeout(send_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%session_id, "WebSocket send failed: {e}");
                return;
            }
            Err(_) => {
                warn!(
                    %session_id,
                    timeout_ms = send_timeout.as_millis(),
                    "WebSocket send timed out"
                );
                return;
            }
        }
    }
    // Queue closed: the session has left the registry.
    let _ = sink.close().await;
}

/// Map a socket message onto the transport-agnostic frame type.
fn inbound_frame(message: Message) -> InboundFrame {
    match message {
        Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => InboundFrame::Binary(bytes.to_vec()),
        Message::Close(_) => InboundFrame::Close,
        Message::Ping(_) | Message::Pong(_) => InboundFrame::Control,
    }
}
