//! Per-connection reconstruction state.
//!
//! A [`Session`] owns the tokenizer of one captured connection, the message
//! currently being rebuilt and its decode state. Both directions of the
//! connection are fed through the same session; the [`SessionMode`] tracks
//! which kind of message the tokenizer is set up for.
//!
//! # Resynchronization
//!
//! Malformed input never poisons a session. When the tokenizer rejects a
//! buffer, the error is recorded and the offending byte is fed on its own
//! into a fresh tokenizer. A byte that fails again is recorded and skipped,
//! and so is a rejected first byte of a message, which a fresh tokenizer
//! would reject the same way. Once a byte is accepted the rest of the buffer
//! is fed in one piece again. Every call therefore makes progress of at least
//! one byte per error.

use std::fmt;

use tracing::{debug, warn};

use crate::codec::{ExecuteError, Tokenizer, TokenizerMode};
use crate::config::ParserConfig;
use crate::connection::adapter::{Adapter, Exchange};
use crate::handler::ParserCallbacks;
use crate::logging::Logger;
use crate::protocol::{ConnectionId, Direction, Error, ErrorRecord, MessageKind};

/// Which messages the tokenizer of a session expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMode {
    /// Input has only come from one direction so far, the start line decides.
    AwaitingEither,
    AwaitingRequest,
    AwaitingResponse,
}

impl SessionMode {
    fn for_direction(direction: Direction) -> Self {
        match direction.message_kind() {
            MessageKind::Request => SessionMode::AwaitingRequest,
            MessageKind::Response => SessionMode::AwaitingResponse,
        }
    }

    fn tokenizer_mode(self) -> TokenizerMode {
        match self {
            SessionMode::AwaitingEither => TokenizerMode::Either,
            SessionMode::AwaitingRequest => TokenizerMode::Request,
            SessionMode::AwaitingResponse => TokenizerMode::Response,
        }
    }
}

/// Reconstruction state of one connection.
pub struct Session<C> {
    id: ConnectionId,
    callbacks: C,
    config: ParserConfig,
    logger: Logger,
    mode: SessionMode,
    last_direction: Option<Direction>,
    tokenizer: Tokenizer,
    exchange: Exchange,
    pending: Vec<Error>,
    last_error: Option<ErrorRecord>,
    inbound_closed: bool,
    outbound_closed: bool,
}

impl<C: ParserCallbacks> Session<C> {
    pub fn new(id: ConnectionId, callbacks: C, config: ParserConfig) -> Self {
        let mode = SessionMode::AwaitingEither;
        Self {
            id,
            callbacks,
            config,
            logger: Logger::global(),
            mode,
            last_direction: None,
            tokenizer: Tokenizer::new(mode.tokenizer_mode(), &config),
            exchange: Exchange::default(),
            pending: Vec::new(),
            last_error: None,
            inbound_closed: false,
            outbound_closed: false,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// The error recorded by the most recent failing operation.
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    /// Returns true if a message has begun but not completed yet.
    pub fn in_message(&self) -> bool {
        self.exchange.in_message()
    }

    pub fn is_closed(&self, direction: Direction) -> bool {
        match direction {
            Direction::Inbound => self.inbound_closed,
            Direction::Outbound => self.outbound_closed,
        }
    }

    /// Tears the session down and gives the callbacks back.
    pub fn into_callbacks(mut self) -> C {
        self.exchange.clear();
        self.callbacks
    }

    /// Feeds bytes captured in `direction`.
    ///
    /// All bytes are always consumed. The first error hit while doing so is
    /// returned: a syntax error for malformed input, or the codec or
    /// consumer error that abandoned a body.
    pub fn input(&mut self, direction: Direction, data: &[u8]) -> Result<(), Error> {
        let logger = self.logger.clone();
        logger.scope(|| self.input_inner(direction, data))
    }

    /// Marks one side of the connection closed.
    ///
    /// Closing the server side ends a response that runs until close, then
    /// prepares the session for the next request.
    pub fn disconnect(&mut self, direction: Direction) -> Result<(), Error> {
        let logger = self.logger.clone();
        logger.scope(|| self.disconnect_inner(direction))
    }

    /// Records an error of a registry operation that concerned this session.
    pub(crate) fn note_error(&mut self, error: &Error) {
        self.last_error = Some(ErrorRecord::from(error));
    }

    fn input_inner(&mut self, direction: Direction, data: &[u8]) -> Result<(), Error> {
        self.switch_mode(direction);

        let mut first_error = None;
        let mut done = 0;
        let mut replaying = false;

        while done < data.len() {
            let step = if replaying { &data[done..=done] } else { &data[done..] };
            let result = self.execute(step);
            self.flush_pending(direction, &mut first_error);

            match result {
                Ok(()) => {
                    done += step.len();
                    replaying = false;
                }
                Err(failure) => {
                    let offset = done + failure.consumed();
                    let skip = replaying || failure.at_message_start();
                    let error = Error::from(failure.into_error());
                    warn!(id = self.id, %direction, offset, cause = %error, "malformed http input, resynchronizing");
                    self.report(direction, error, &mut first_error);
                    self.restart();

                    if skip {
                        done = offset + 1;
                        replaying = false;
                    } else {
                        done = offset;
                        replaying = true;
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn disconnect_inner(&mut self, direction: Direction) -> Result<(), Error> {
        debug!(id = self.id, %direction, "disconnect");
        match direction {
            Direction::Outbound => {
                self.outbound_closed = true;
                Ok(())
            }
            Direction::Inbound if self.inbound_closed => Ok(()),
            Direction::Inbound => {
                self.inbound_closed = true;
                if !self.expects_response() {
                    return Ok(());
                }

                let mut first_error = None;
                let mut adapter = Adapter {
                    id: self.id,
                    callbacks: &mut self.callbacks,
                    exchange: &mut self.exchange,
                    config: &self.config,
                    pending: &mut self.pending,
                };
                let finished = self.tokenizer.finish(&mut adapter);

                self.flush_pending(direction, &mut first_error);
                if let Err(error) = finished {
                    self.report(direction, Error::from(error), &mut first_error);
                }

                self.exchange.clear();
                self.set_mode(SessionMode::AwaitingRequest);
                first_error.map_or(Ok(()), Err)
            }
        }
    }

    fn expects_response(&self) -> bool {
        match self.mode {
            SessionMode::AwaitingRequest => false,
            SessionMode::AwaitingResponse => true,
            SessionMode::AwaitingEither => self.last_direction != Some(Direction::Outbound),
        }
    }

    /// Pins the tokenizer to the kind of messages `direction` carries.
    ///
    /// Until input arrives from a second direction the session stays in
    /// [`SessionMode::AwaitingEither`].
    fn switch_mode(&mut self, direction: Direction) {
        let first_direction = self.mode == SessionMode::AwaitingEither
            && self.last_direction.is_none_or(|last| last == direction);
        self.last_direction = Some(direction);
        if first_direction {
            return;
        }

        let wanted = SessionMode::for_direction(direction);
        if self.mode != wanted {
            if self.exchange.in_message() {
                debug!(id = self.id, %direction, "direction changed inside a message, dropping it");
            }
            self.exchange.clear();
            self.set_mode(wanted);
        }
    }

    fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;
        self.tokenizer.reset(mode.tokenizer_mode());
    }

    fn restart(&mut self) {
        self.exchange.clear();
        self.tokenizer.reset(self.mode.tokenizer_mode());
    }

    fn execute(&mut self, data: &[u8]) -> Result<(), ExecuteError> {
        let mut adapter = Adapter {
            id: self.id,
            callbacks: &mut self.callbacks,
            exchange: &mut self.exchange,
            config: &self.config,
            pending: &mut self.pending,
        };
        self.tokenizer.execute(data, &mut adapter)
    }

    fn flush_pending(&mut self, direction: Direction, first_error: &mut Option<Error>) {
        for error in std::mem::take(&mut self.pending) {
            self.report(direction, error, first_error);
        }
    }

    /// Records `error` as the session's last error and tells the consumer.
    fn report(&mut self, direction: Direction, error: Error, first_error: &mut Option<Error>) {
        let record = ErrorRecord::from(&error);
        self.callbacks.on_parse_error(self.id, direction, &record);
        self.last_error = Some(record);
        if first_error.is_none() {
            *first_error = Some(error);
        }
    }
}

impl<C> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("last_direction", &self.last_direction)
            .field("tokenizer", &self.tokenizer)
            .field("exchange", &self.exchange)
            .field("last_error", &self.last_error)
            .field("inbound_closed", &self.inbound_closed)
            .field("outbound_closed", &self.outbound_closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BodyStart, HeadersOutcome};
    use crate::protocol::{BoxError, ErrorKind, HttpMessage};

    #[derive(Default)]
    struct Counter {
        requests: Vec<HttpMessage>,
        responses: Vec<HttpMessage>,
        body: Vec<u8>,
        finished: usize,
        errors: Vec<ErrorKind>,
    }

    impl ParserCallbacks for Counter {
        fn on_request_received(&mut self, _id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
            self.requests.push(message);
            HeadersOutcome::Proceed
        }

        fn on_request_body_started(&mut self, _id: ConnectionId) -> BodyStart {
            BodyStart::raw()
        }

        fn on_request_body_data(&mut self, _id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
            self.body.extend_from_slice(data);
            Ok(())
        }

        fn on_request_body_finished(&mut self, _id: ConnectionId) {
            self.finished += 1;
        }

        fn on_response_received(&mut self, _id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
            self.responses.push(message);
            HeadersOutcome::Proceed
        }

        fn on_response_body_started(&mut self, _id: ConnectionId) -> BodyStart {
            BodyStart::raw()
        }

        fn on_response_body_data(&mut self, _id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
            self.body.extend_from_slice(data);
            Ok(())
        }

        fn on_response_body_finished(&mut self, _id: ConnectionId) {
            self.finished += 1;
        }

        fn on_parse_error(&mut self, _id: ConnectionId, _direction: Direction, error: &ErrorRecord) {
            self.errors.push(error.kind());
        }
    }

    fn session() -> Session<Counter> {
        Session::new(1, Counter::default(), ParserConfig::default())
    }

    #[test]
    fn starts_awaiting_either() {
        let session = session();
        assert_eq!(session.mode(), SessionMode::AwaitingEither);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn mode_follows_direction() {
        let mut session = session();
        session.input(Direction::Outbound, b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(session.mode(), SessionMode::AwaitingEither);

        session.input(Direction::Inbound, b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert_eq!(session.mode(), SessionMode::AwaitingResponse);

        session.input(Direction::Outbound, b"GET /again HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(session.mode(), SessionMode::AwaitingRequest);

        assert_eq!(session.callbacks().requests.len(), 2);
        assert_eq!(session.callbacks().responses.len(), 1);
        assert_eq!(session.callbacks().finished, 0);
    }

    #[test]
    fn first_direction_detects_kind_from_start_line() {
        let mut session = session();
        session.input(Direction::Inbound, b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        session.input(Direction::Inbound, b"GET /late HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(session.mode(), SessionMode::AwaitingEither);

        assert_eq!(session.callbacks().responses.len(), 1);
        assert_eq!(session.callbacks().requests.len(), 1);
        assert_eq!(session.callbacks().requests[0].url(), Some(&b"/late"[..]));
    }

    #[test]
    fn inbound_disconnect_after_outbound_only_input() {
        let mut session = session();
        session.input(Direction::Outbound, b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nq=").unwrap();
        session.disconnect(Direction::Inbound).unwrap();

        assert!(session.in_message());
        session.input(Direction::Outbound, b"42").unwrap();
        assert_eq!(session.callbacks().body, b"q=42");
        assert_eq!(session.callbacks().finished, 1);
    }

    #[test]
    fn direction_switch_drops_partial_message() {
        let mut session = session();
        session.input(Direction::Outbound, b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").unwrap();
        assert!(session.in_message());

        session.input(Direction::Inbound, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").unwrap();
        assert!(!session.in_message());
        assert_eq!(session.callbacks().body, b"abcok");
        assert_eq!(session.callbacks().finished, 1);
    }

    #[test]
    fn inbound_disconnect_ends_until_close_body() {
        let mut session = session();
        session.input(Direction::Inbound, b"HTTP/1.0 200 OK\r\n\r\nstream").unwrap();
        assert_eq!(session.callbacks().finished, 0);

        session.disconnect(Direction::Inbound).unwrap();
        assert_eq!(session.callbacks().finished, 1);
        assert_eq!(session.callbacks().body, b"stream");
        assert_eq!(session.mode(), SessionMode::AwaitingRequest);
        assert!(session.is_closed(Direction::Inbound));
        assert!(!session.is_closed(Direction::Outbound));

        session.disconnect(Direction::Inbound).unwrap();
        assert_eq!(session.callbacks().finished, 1);
    }

    #[test]
    fn inbound_disconnect_inside_framed_body() {
        let mut session = session();
        session.input(Direction::Inbound, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").unwrap();

        let error = session.disconnect(Direction::Inbound).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::HttpSyntax);
        assert_eq!(session.last_error().map(ErrorRecord::kind), Some(ErrorKind::HttpSyntax));
        assert_eq!(session.callbacks().finished, 0);
        assert!(!session.in_message());
    }

    #[test]
    fn outbound_disconnect_keeps_state() {
        let mut session = session();
        session.input(Direction::Outbound, b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nq=").unwrap();
        session.disconnect(Direction::Outbound).unwrap();
        assert!(session.is_closed(Direction::Outbound));

        session.input(Direction::Outbound, b"42").unwrap();
        assert_eq!(session.callbacks().body, b"q=42");
        assert_eq!(session.callbacks().finished, 1);
    }

    #[test]
    fn resynchronizes_after_garbage() {
        let mut session = session();
        let error = session.input(Direction::Outbound, b"XYZZY not http\r\n\r\n").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::HttpSyntax);
        assert!(!session.callbacks().errors.is_empty());

        session.input(Direction::Outbound, b"GET /test HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        let requests = &session.callbacks().requests;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url(), Some(&b"/test"[..]));
        assert_eq!(session.last_error().map(ErrorRecord::kind), Some(ErrorKind::HttpSyntax));
    }

    #[test]
    fn into_callbacks_returns_consumer() {
        let mut session = session();
        session.input(Direction::Outbound, b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let counter = session.into_callbacks();
        assert_eq!(counter.requests.len(), 1);
    }
}
