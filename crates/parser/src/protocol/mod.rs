//! Core protocol types shared by the tokenizer, the sessions and the consumer.
//!
//! - [`message`]: the mutable [`HttpMessage`] model and its serialization
//! - [`payload`]: body framing items produced by the body decoders
//! - [`error`]: the public [`Error`] taxonomy and tokenizer [`ParseError`]s

use std::fmt;

mod message;
pub use message::HeaderField;
pub use message::HttpMessage;
pub use message::MessageKind;

mod payload;
pub use payload::PayloadItem;
pub use payload::PayloadSize;

mod error;
pub use error::BoxError;
pub use error::Error;
pub use error::ErrorKind;
pub use error::ErrorRecord;
pub use error::ParseError;

/// Caller supplied identifier of one captured connection.
pub type ConnectionId = u64;

/// Which side of a connection a captured buffer travelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Server to client, carries responses.
    Inbound,
    /// Client to server, carries requests.
    Outbound,
}

impl Direction {
    /// The kind of message travelling in this direction.
    pub fn message_kind(self) -> MessageKind {
        match self {
            Direction::Inbound => MessageKind::Response,
            Direction::Outbound => MessageKind::Request,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}
