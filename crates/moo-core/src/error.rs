//! Error types for the broadcast core.
//!
//! The core itself has no fatal failure modes: per-session I/O failures
//! are absorbed by the registry and unrecognized input is ignored. The
//! only fallible surface is decoding an outbound state message, which
//! clients (and tests) do.

use std::num::ParseIntError;

/// Errors produced when decoding a server state message.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The message has no `|` separating tag and value.
    #[error("missing separator in message: {0:?}")]
    MissingSeparator(String),

    /// The tag before the separator is not a known message tag.
    #[error("unknown message tag: {0:?}")]
    UnknownTag(String),

    /// The value after the separator is not a decimal counter value.
    #[error("invalid counter value {value:?}: {source}")]
    InvalidValue {
        /// The raw value text.
        value: String,
        /// The underlying integer parse error.
        source: ParseIntError,
    },
}
