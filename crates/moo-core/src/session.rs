//! Per-connection serving loop.
//!
//! [`serve_session`] drives one streaming connection from join to leave:
//!
//! 1. join the registry (through a [`Membership`] guard)
//! 2. enqueue a snapshot of the current count for this session
//! 3. wait for the next inbound frame; on `count_moo` increment and
//!    broadcast, on anything else keep waiting
//! 4. stop on peer close, transport error, idle timeout or eviction
//!
//! The guard leaves the registry on every exit path, including the
//! future being dropped mid-await.

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::error::Elapsed;
use tracing::{debug, trace};

use crate::hub::Hub;
use crate::registry::{Membership, SessionHandle};
use crate::wire::{ClientCommand, ServerMessage};

/// One inbound frame, as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text payload.
    Text(String),
    /// A binary payload.
    Binary(Vec<u8>),
    /// The peer asked to close the connection.
    Close,
    /// A transport-level control frame (ping, pong).
    Control,
}

impl InboundFrame {
    /// The command carried by this frame, if any.
    pub fn command(&self) -> Option<ClientCommand> {
        match self {
            Self::Text(text) => ClientCommand::parse(text),
            Self::Binary(bytes) => ClientCommand::parse_bytes(bytes),
            Self::Close | Self::Control => None,
        }
    }
}

/// Tunables for the serving loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// End the session if no frame arrives for this long. `None` waits
    /// forever.
    pub idle_timeout: Option<Duration>,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection or the stream ended.
    PeerClosed,
    /// The receive side reported an error.
    Transport(String),
    /// No frame arrived within the idle timeout.
    IdleTimeout,
    /// A broadcast found the session's queue closed or full and removed
    /// it from the registry.
    Evicted,
    /// The snapshot could not be queued; the writer was already gone.
    SnapshotFailed,
}

/// Serve one session until it ends, then leave the registry.
///
/// `handle` is the session's outbound queue; `inbound` yields frames from
/// the peer in receipt order. Only the receive is awaited; increments and
/// broadcasts complete without suspending.
///
/// The session ends as soon as a broadcast evicts it, so a peer that fell
/// behind is disconnected rather than left connected outside the
/// registry.
pub async fn serve_session<S, E>(
    hub: &Hub,
    handle: SessionHandle,
    inbound: S,
    options: SessionOptions,
) -> SessionEnd
where
    S: Stream<Item = Result<InboundFrame, E>>,
    E: Display,
{
    let eviction = handle.eviction_notice();
    let membership = Membership::acquire(hub.registry(), handle.clone());
    let session_id = membership.id();

    let snapshot = hub
        .registry()
        .send_snapshot(&handle, || ServerMessage::Count(hub.count()));
    if let Err(failure) = snapshot {
        debug!(%session_id, ?failure, "snapshot send failed");
        return SessionEnd::SnapshotFailed;
    }
    trace!(%session_id, "snapshot queued");
    drop(handle);

    let mut inbound = std::pin::pin!(inbound);
    loop {
        let next = tokio::select! {
            () = eviction.wait() => {
                debug!(%session_id, "session evicted");
                return SessionEnd::Evicted;
            }
            next = next_frame(inbound.as_mut(), options.idle_timeout) => match next {
                Ok(next) => next,
                Err(_) => return SessionEnd::IdleTimeout,
            },
        };

        match next {
            None | Some(Ok(InboundFrame::Close)) => return SessionEnd::PeerClosed,
            Some(Err(e)) => return SessionEnd::Transport(e.to_string()),
            Some(Ok(frame)) => match frame.command() {
                Some(ClientCommand::Increment) => {
                    let count = hub.increment_and_broadcast();
                    trace!(%session_id, count, "increment from session");
                }
                None => trace!(%session_id, "ignoring unrecognized frame"),
            },
        }
    }
}

/// Receive the next frame, failing with [`Elapsed`] if the idle timeout
/// runs out first.
async fn next_frame<S>(
    mut inbound: S,
    idle_timeout: Option<Duration>,
) -> Result<Option<S::Item>, Elapsed>
where
    S: Stream + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, inbound.next()).await,
        None => Ok(inbound.next().await),
    }
}
