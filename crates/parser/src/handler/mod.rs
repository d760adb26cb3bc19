//! The consumer side of a session.
//!
//! A [`ParserCallbacks`] implementation is handed to
//! [`Registry::connect`](crate::Registry::connect) and receives every
//! reconstructed message of that connection, synchronously from inside
//! [`SessionHandle::input`](crate::SessionHandle::input).
//!
//! For every message the calls arrive in this order:
//!
//! 1. `on_*_received` with an owned snapshot of the header section
//! 2. `on_*_body_started`, once, right before the first body byte
//! 3. `on_*_body_data`, any number of times
//! 4. `on_*_body_finished`, once
//!
//! Steps 2 to 4 only happen for messages that carry body bytes.

use crate::protocol::{BoxError, ConnectionId, Direction, ErrorRecord, HttpMessage};

/// What the tokenizer should do with the body framing of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadersOutcome {
    /// Frame the body according to the header section.
    #[default]
    Proceed,
    /// Treat the message as bodyless, e.g. the response to a `HEAD` request.
    SkipBody,
}

/// Answer of a body-started callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyStart {
    /// Undo `gzip`/`deflate` content coding before delivering body data.
    pub decode: bool,
}

impl BodyStart {
    /// Deliver the body bytes as they were captured.
    pub const fn raw() -> Self {
        Self { decode: false }
    }

    /// Deliver the body bytes with their content coding removed.
    pub const fn decoded() -> Self {
        Self { decode: true }
    }
}

/// Callbacks invoked for one connection.
///
/// Returning an error from a body-data callback abandons the rest of that
/// body: its remaining bytes are framed but dropped, no body-finished
/// follows, and `input` reports [`ErrorKind::Callback`](crate::ErrorKind::Callback).
pub trait ParserCallbacks {
    fn on_request_received(&mut self, id: ConnectionId, message: HttpMessage) -> HeadersOutcome;

    fn on_request_body_started(&mut self, id: ConnectionId) -> BodyStart;

    fn on_request_body_data(&mut self, id: ConnectionId, data: &[u8]) -> Result<(), BoxError>;

    fn on_request_body_finished(&mut self, id: ConnectionId);

    fn on_response_received(&mut self, id: ConnectionId, message: HttpMessage) -> HeadersOutcome;

    fn on_response_body_started(&mut self, id: ConnectionId) -> BodyStart;

    fn on_response_body_data(&mut self, id: ConnectionId, data: &[u8]) -> Result<(), BoxError>;

    fn on_response_body_finished(&mut self, id: ConnectionId);

    /// Called for every error recorded on the session, including each one
    /// hit while resynchronizing after malformed input.
    fn on_parse_error(&mut self, _id: ConnectionId, _direction: Direction, _error: &ErrorRecord) {}
}

impl<T: ParserCallbacks + ?Sized> ParserCallbacks for Box<T> {
    fn on_request_received(&mut self, id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
        (**self).on_request_received(id, message)
    }

    fn on_request_body_started(&mut self, id: ConnectionId) -> BodyStart {
        (**self).on_request_body_started(id)
    }

    fn on_request_body_data(&mut self, id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
        (**self).on_request_body_data(id, data)
    }

    fn on_request_body_finished(&mut self, id: ConnectionId) {
        (**self).on_request_body_finished(id);
    }

    fn on_response_received(&mut self, id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
        (**self).on_response_received(id, message)
    }

    fn on_response_body_started(&mut self, id: ConnectionId) -> BodyStart {
        (**self).on_response_body_started(id)
    }

    fn on_response_body_data(&mut self, id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
        (**self).on_response_body_data(id, data)
    }

    fn on_response_body_finished(&mut self, id: ConnectionId) {
        (**self).on_response_body_finished(id);
    }

    fn on_parse_error(&mut self, id: ConnectionId, direction: Direction, error: &ErrorRecord) {
        (**self).on_parse_error(id, direction, error);
    }
}
