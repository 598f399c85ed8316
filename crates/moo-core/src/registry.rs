//! Registry of live streaming sessions.
//!
//! [`BroadcastRegistry`] is the set of sessions that have completed the
//! join handshake. Membership is keyed by [`SessionId`], so joining the
//! same handle twice leaves exactly one entry.
//!
//! Every session pushes outbound messages through a bounded in-memory
//! queue ([`SessionHandle`]). Broadcasting clones the current membership
//! under the lock, releases the lock, then does a non-blocking enqueue
//! into each queue. A queue that is closed (the peer's writer is gone)
//! or full (the peer is not keeping up) costs that session its
//! membership as part of the same call. The caller never sees the
//! failure; the evicted session is told through its [`EvictionNotice`]
//! so it can end the connection instead of lingering outside the set.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::wire::ServerMessage;

/// Unique identifier for one streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a non-blocking send to a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The receiving side of the queue has been dropped.
    Closed,
    /// The queue is at capacity; the peer is not draining it.
    Full,
}

/// Fires once the registry has evicted a session after a failed send.
///
/// A notice raised before anyone waits is kept, so [`wait`](Self::wait)
/// returns immediately in that case.
#[derive(Debug, Clone, Default)]
pub struct EvictionNotice(Arc<Notify>);

impl EvictionNotice {
    /// Wait until the session is evicted.
    pub async fn wait(&self) {
        self.0.notified().await;
    }

    fn raise(&self) {
        self.0.notify_one();
    }
}

/// Sending half of one session's outbound queue.
///
/// Cheap to clone. All clones refer to the same session and compare
/// equal by [`SessionId`] inside the registry.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<ServerMessage>,
    connected_at: DateTime<Utc>,
    eviction: EvictionNotice,
}

impl SessionHandle {
    /// Create a handle with a fresh [`SessionId`] and a queue holding up
    /// to `capacity` undelivered messages (at least one).
    ///
    /// The returned receiver is drained by the transport's writer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: SessionId::new(),
            tx,
            connected_at: Utc::now(),
            eviction: EvictionNotice::default(),
        };
        (handle, rx)
    }

    /// Identifier of this session.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// When the session's connection was accepted.
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// The notice raised when a broadcast evicts this session.
    pub fn eviction_notice(&self) -> EvictionNotice {
        self.eviction.clone()
    }

    /// Enqueue a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SendFailure::Closed`] if the writer has gone away and
    /// [`SendFailure::Full`] if the queue is at capacity.
    pub fn try_send(&self, message: ServerMessage) -> Result<(), SendFailure> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Closed(_) => SendFailure::Closed,
            TrySendError::Full(_) => SendFailure::Full,
        })
    }
}

/// Outcome of one [`BroadcastRegistry::broadcast`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the message was enqueued for.
    pub delivered: usize,
    /// Sessions removed because their send failed.
    pub evicted: usize,
}

/// The process-wide set of joined sessions.
#[derive(Debug, Default)]
pub struct BroadcastRegistry {
    sessions: Mutex<BTreeMap<SessionId, SessionHandle>>,
}

impl BroadcastRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the membership set.
    ///
    /// A panic while holding the lock cannot leave the map half-updated
    /// (every critical section is a single insert, remove or clone), so
    /// a poisoned lock is simply recovered.
    fn members(&self) -> MutexGuard<'_, BTreeMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a session. Returns `false` if it was already a member.
    pub fn join(&self, handle: SessionHandle) -> bool {
        let id = handle.id;
        let (added, members) = {
            let mut sessions = self.members();
            let added = sessions.insert(id, handle).is_none();
            (added, sessions.len())
        };
        if added {
            debug!(session_id = %id, members, "session joined");
        }
        added
    }

    /// Remove a session. Returns `false` if it was not a member.
    pub fn leave(&self, id: SessionId) -> bool {
        let (removed, members) = {
            let mut sessions = self.members();
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };
        match removed {
            Some(handle) => {
                let connected_for = Utc::now().signed_duration_since(handle.connected_at);
                debug!(
                    session_id = %id,
                    members,
                    connected_secs = connected_for.num_seconds(),
                    "session left"
                );
                true
            }
            None => false,
        }
    }

    /// Whether `id` is currently joined.
    pub fn contains(&self, id: SessionId) -> bool {
        self.members().contains_key(&id)
    }

    /// Number of joined sessions.
    pub fn len(&self) -> usize {
        self.members().len()
    }

    /// Whether no sessions are joined.
    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    /// Queue a snapshot message for `handle` directly.
    ///
    /// `snapshot` is evaluated and enqueued while the membership lock is
    /// held, so no broadcast can take its member list in between. A
    /// broadcast that raced with the join is therefore queued after the
    /// snapshot and never behind a stale one. Only a non-blocking enqueue
    /// happens under the lock.
    ///
    /// # Errors
    ///
    /// Returns the [`SendFailure`] of the enqueue.
    pub fn send_snapshot<F>(&self, handle: &SessionHandle, snapshot: F) -> Result<(), SendFailure>
    where
        F: FnOnce() -> ServerMessage,
    {
        let _members = self.members();
        handle.try_send(snapshot())
    }

    /// Deliver `message` to every session joined at the moment of the call.
    ///
    /// Sessions whose queue is closed or full are removed and their
    /// [`EvictionNotice`] is raised. Sessions that
    /// join or leave while the broadcast is in flight may or may not see
    /// this message.
    pub fn broadcast(&self, message: ServerMessage) -> BroadcastReport {
        let snapshot: Vec<SessionHandle> = self.members().values().cloned().collect();

        let mut report = BroadcastReport::default();
        for handle in &snapshot {
            match handle.try_send(message) {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(failure) => {
                    warn!(
                        session_id = %handle.id,
                        ?failure,
                        "evicting session after failed send"
                    );
                    if self.leave(handle.id) {
                        handle.eviction.raise();
                    }
                    report.evicted = report.evicted.saturating_add(1);
                }
            }
        }
        report
    }
}

/// Scoped registry membership.
///
/// Joins on [`Membership::acquire`] and leaves when dropped, whichever
/// way the owning scope exits.
#[derive(Debug)]
pub struct Membership<'a> {
    registry: &'a BroadcastRegistry,
    id: SessionId,
}

impl<'a> Membership<'a> {
    /// Join `handle` to `registry` for the lifetime of the guard.
    pub fn acquire(registry: &'a BroadcastRegistry, handle: SessionHandle) -> Self {
        let id = handle.id();
        registry.join(handle);
        Self { registry, id }
    }

    /// The guarded session.
    pub const fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for Membership<'_> {
    fn drop(&mut self) {
        self.registry.leave(self.id);
    }
}
