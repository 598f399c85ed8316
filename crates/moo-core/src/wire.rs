//! Text wire format spoken over the streaming endpoint.
//!
//! The service uses a tagged scalar encoding. Every outbound state
//! message is a short tag, a `|` separator and the decimal value:
//!
//! ```text
//! mc|42
//! ```
//!
//! The only recognized inbound command is the literal `count_moo`
//! (surrounding whitespace is ignored). Every other payload is dropped
//! without a reply.

use std::fmt;

use crate::error::WireError;

/// Tag identifying a counter value message.
pub const COUNT_TAG: &str = "mc";

/// Separator between tag and value.
pub const SEPARATOR: char = '|';

/// Inbound token requesting an increment.
pub const INCREMENT_TOKEN: &str = "count_moo";

/// A message pushed from the server to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    /// The current counter value.
    Count(u64),
}

impl ServerMessage {
    /// Encode as a text frame payload.
    pub fn encode(self) -> String {
        self.to_string()
    }

    /// Decode a text frame payload produced by [`ServerMessage::encode`].
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] when the separator is missing, the tag is
    /// unknown, or the value is not a non-negative decimal integer.
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let (tag, value) = text
            .split_once(SEPARATOR)
            .ok_or_else(|| WireError::MissingSeparator(text.to_owned()))?;

        if tag != COUNT_TAG {
            return Err(WireError::UnknownTag(tag.to_owned()));
        }

        value
            .parse::<u64>()
            .map(Self::Count)
            .map_err(|source| WireError::InvalidValue {
                value: value.to_owned(),
                source,
            })
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(value) => write!(f, "{COUNT_TAG}{SEPARATOR}{value}"),
        }
    }
}

/// A recognized command sent by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Increment the shared counter by one.
    Increment,
}

impl ClientCommand {
    /// Recognize a text payload. Returns `None` for anything unrecognized.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            INCREMENT_TOKEN => Some(Self::Increment),
            _ => None,
        }
    }

    /// Recognize a binary payload by decoding it as UTF-8 first.
    pub fn parse_bytes(bytes: &[u8]) -> Option<Self> {
        std::str::from_utf8(bytes).ok().and_then(Self::parse)
    }
}
