//! Concurrent broadcast core for the moo counter service.
//!
//! This crate is transport-agnostic. It provides:
//!
//! - **[`CounterStore`]** -- the single process-wide counter with atomic
//!   read and increment-and-return
//! - **[`BroadcastRegistry`]** -- the set of live streaming sessions with
//!   join, leave and best-effort broadcast that evicts dead peers inline
//! - **[`Hub`]** -- both of the above, owned together and passed by
//!   reference into every connection
//! - **[`serve_session`]** -- the per-connection serving loop (join,
//!   snapshot, receive, guaranteed leave)
//! - **[`wire`]** -- the text encoding of outbound state messages and the
//!   recognized inbound commands
//!
//! # Architecture
//!
//! ```text
//! client frame --> serve_session --> Hub::increment_and_broadcast
//!                                        |-- CounterStore::increment
//!                                        '-- BroadcastRegistry::broadcast --> session queues
//! ```
//!
//! Each session owns a bounded outbound queue. Broadcasting is a
//! non-blocking enqueue into every queue, so no lock is ever held across
//! network I/O. The transport drains the queue into its socket.

pub mod counter;
pub mod error;
pub mod hub;
pub mod registry;
pub mod session;
pub mod wire;

// Re-export primary types for convenience.
pub use counter::CounterStore;
pub use error::WireError;
pub use hub::Hub;
pub use registry::{
    BroadcastRegistry, BroadcastReport, EvictionNotice, Membership, SendFailure, SessionHandle,
    SessionId,
};
pub use session::{InboundFrame, SessionEnd, SessionOptions, serve_session};
pub use wire::{ClientCommand, ServerMessage};
