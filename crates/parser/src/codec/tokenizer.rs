//! Event-driven HTTP/1.x tokenizer.
//!
//! The [`Tokenizer`] accepts arbitrarily fragmented input and reports what it
//! recognizes through a [`TokenizerHandler`]: message begin, start line
//! parts, one field/value pair per header, headers complete, body data,
//! chunk boundaries and message complete. It works in two phases per
//! message:
//!
//! 1. the header section is buffered and parsed by [`HeadDecoder`]
//! 2. the body, if any, is framed by a [`PayloadDecoder`] and streamed out
//!    as soon as bytes arrive
//!
//! A syntax error stops the tokenizer until [`Tokenizer::reset`] is called.
//! The error reports how many bytes of the failing slice were accepted
//! before the offending byte, so the caller can resume right there.

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{HeadDecoder, HeadError, MessageHead, StartLine};
use crate::config::ParserConfig;
use crate::handler::HeadersOutcome;
use crate::protocol::{MessageKind, ParseError, PayloadItem, PayloadSize};

/// Which start lines the tokenizer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerMode {
    Request,
    Response,
    /// A start line beginning with `HTTP/` is a response, anything else a request.
    Either,
}

impl TokenizerMode {
    fn expect(self) -> Option<MessageKind> {
        match self {
            TokenizerMode::Request => Some(MessageKind::Request),
            TokenizerMode::Response => Some(MessageKind::Response),
            TokenizerMode::Either => None,
        }
    }
}

impl From<MessageKind> for TokenizerMode {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Request => TokenizerMode::Request,
            MessageKind::Response => TokenizerMode::Response,
        }
    }
}

/// Receiver of tokenizer events.
///
/// Fragments belonging to one message always arrive between
/// [`on_message_begin`](Self::on_message_begin) and
/// [`on_message_complete`](Self::on_message_complete).
pub trait TokenizerHandler {
    fn on_message_begin(&mut self, kind: MessageKind);

    fn on_url(&mut self, url: &[u8]);

    fn on_status(&mut self, status_code: u16, reason: &[u8]);

    fn on_header_field(&mut self, name: &[u8]);

    /// Always follows the field name, with an empty slice for empty values.
    fn on_header_value(&mut self, value: &[u8]);

    /// The return value decides whether the body framing of the head is used
    /// or the message is treated as bodyless.
    fn on_headers_complete(&mut self, head: &MessageHead) -> HeadersOutcome;

    fn on_body(&mut self, data: &[u8]);

    fn on_chunk_header(&mut self, _size: u64) {}

    fn on_chunk_complete(&mut self) {}

    fn on_message_complete(&mut self);
}

/// A syntax error together with the position it was detected at.
#[derive(Debug, Error)]
#[error("{error} (after {consumed} bytes)")]
pub struct ExecuteError {
    consumed: usize,
    at_message_start: bool,
    #[source]
    error: ParseError,
}

impl ExecuteError {
    /// Bytes of the failing slice that were accepted before the error.
    ///
    /// This is the index of the offending byte, or zero when it arrived in
    /// an earlier slice.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Returns true if the offending byte was the first byte of a message.
    ///
    /// A reset tokenizer rejects such a byte the same way.
    pub fn at_message_start(&self) -> bool {
        self.at_message_start
    }

    pub fn error(&self) -> &ParseError {
        &self.error
    }

    pub fn into_error(self) -> ParseError {
        self.error
    }
}

/// Where [`Tokenizer::drive`] stopped.
enum Failure {
    /// The head decoder blamed the byte at an offset of the buffer.
    Head(HeadError),
    /// A body decoder already took the offending byte off the buffer.
    Payload(ParseError),
}

impl From<ParseError> for Failure {
    fn from(error: ParseError) -> Self {
        Failure::Payload(error)
    }
}

/// Incremental HTTP/1.x tokenizer for one direction at a time.
#[derive(Debug)]
pub struct Tokenizer {
    mode: TokenizerMode,
    head_decoder: HeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
    buf: BytesMut,
    failed: bool,
}

impl Tokenizer {
    pub fn new(mode: TokenizerMode, config: &ParserConfig) -> Self {
        Self {
            mode,
            head_decoder: HeadDecoder::new(mode.expect(), config.max_header_bytes(), config.max_headers()),
            payload_decoder: None,
            buf: BytesMut::new(),
            failed: false,
        }
    }

    pub fn mode(&self) -> TokenizerMode {
        self.mode
    }

    /// Returns true if the tokenizer stopped at a syntax error.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Returns true between messages, with nothing buffered.
    pub fn is_idle(&self) -> bool {
        !self.failed && self.payload_decoder.is_none() && self.buf.is_empty()
    }

    /// Drops any partial message and clears the error state.
    pub fn reset(&mut self, mode: TokenizerMode) {
        self.mode = mode;
        self.head_decoder.set_expect(mode.expect());
        self.payload_decoder = None;
        self.buf.clear();
        self.failed = false;
    }

    /// Feeds `data` and reports every event it completes.
    pub fn execute<H: TokenizerHandler>(&mut self, data: &[u8], handler: &mut H) -> Result<(), ExecuteError> {
        if self.failed {
            let error = ParseError::invalid_header("tokenizer has not been reset after an error");
            return Err(ExecuteError { consumed: 0, at_message_start: false, error });
        }

        let carried = self.buf.len();
        self.buf.extend_from_slice(data);

        let Err(failure) = self.drive(handler) else {
            return Ok(());
        };

        // bytes of carried + data that left the buffer before the failure
        let taken = carried + data.len() - self.buf.len();
        let (offending, at_start, error) = match failure {
            Failure::Head(e) => (taken + e.offset(), e.offset() == 0, e.into_error()),
            Failure::Payload(e) => (taken.saturating_sub(1), false, e),
        };
        let consumed = offending.saturating_sub(carried);
        let at_message_start = at_start && offending >= carried;
        trace!(consumed, at_message_start, %error, "tokenizer failed");
        self.fail();
        Err(ExecuteError { consumed, at_message_start, error })
    }

    /// Signals end of stream.
    ///
    /// Completes a body that runs until close. Ending the stream inside a
    /// header section or a framed body is an error, between messages it is
    /// a no-op. The tokenizer is idle afterwards in every case.
    pub fn finish<H: TokenizerHandler>(&mut self, handler: &mut H) -> Result<(), ParseError> {
        if self.failed {
            self.reset(self.mode);
            return Ok(());
        }

        let result = if self.payload_decoder.is_some() {
            self.drain_eof(handler)
        } else if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ParseError::unexpected_eof("connection closed inside a message head"))
        };

        self.reset(self.mode);
        result
    }

    fn fail(&mut self) {
        self.failed = true;
        self.head_decoder.reset();
        self.payload_decoder = None;
        self.buf.clear();
    }

    fn drive<H: TokenizerHandler>(&mut self, handler: &mut H) -> Result<(), Failure> {
        loop {
            if let Some(payload_decoder) = self.payload_decoder.as_mut() {
                let Some(item) = payload_decoder.decode(&mut self.buf)? else {
                    return Ok(());
                };
                self.emit_payload(item, handler);
                continue;
            }

            let Some(head) = self.head_decoder.decode_head(&mut self.buf).map_err(Failure::Head)? else {
                return Ok(());
            };
            self.emit_head(&head, handler);
        }
    }

    fn drain_eof<H: TokenizerHandler>(&mut self, handler: &mut H) -> Result<(), ParseError> {
        while let Some(payload_decoder) = self.payload_decoder.as_mut() {
            match payload_decoder.decode_eof(&mut self.buf)? {
                Some(item) => self.emit_payload(item, handler),
                None => return Err(ParseError::unexpected_eof("connection closed before the message body was complete")),
            }
        }
        Ok(())
    }

    fn emit_head<H: TokenizerHandler>(&mut self, head: &MessageHead, handler: &mut H) {
        handler.on_message_begin(head.kind());

        match head.start_line() {
            StartLine::Request { url, .. } => handler.on_url(url),
            StartLine::Response { status_code, reason } => handler.on_status(*status_code, reason),
        }

        for (name, value) in head.fields() {
            handler.on_header_field(name);
            handler.on_header_value(value);
        }

        let payload_size = match handler.on_headers_complete(head) {
            HeadersOutcome::Proceed => head.payload_size(),
            HeadersOutcome::SkipBody => PayloadSize::Empty,
        };
        trace!(kind = ?head.kind(), ?payload_size, "headers complete");

        if payload_size.is_empty() {
            handler.on_message_complete();
        } else {
            self.payload_decoder = Some(payload_size.into());
        }
    }

    fn emit_payload<H: TokenizerHandler>(&mut self, item: PayloadItem, handler: &mut H) {
        match item {
            PayloadItem::Chunk(bytes) => handler.on_body(&bytes),
            PayloadItem::ChunkHeader(size) => handler.on_chunk_header(size),
            PayloadItem::ChunkComplete => handler.on_chunk_complete(),
            PayloadItem::Eof => {
                self.payload_decoder = None;
                handler.on_message_complete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Begin(MessageKind),
        Url(Vec<u8>),
        Status(u16, Vec<u8>),
        Field(Vec<u8>),
        Value(Vec<u8>),
        HeadersComplete,
        Body(Vec<u8>),
        ChunkHeader(u64),
        ChunkComplete,
        Complete,
    }

    #[derive(Default)]
    struct Events {
        events: Vec<Event>,
        skip_body: bool,
    }

    impl Events {
        fn body(&self) -> Vec<u8> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::Body(data) => Some(data.clone()),
                    _ => None,
                })
                .flatten()
                .collect()
        }

        fn count(&self, wanted: &Event) -> usize {
            self.events.iter().filter(|event| *event == wanted).count()
        }
    }

    impl TokenizerHandler for Events {
        fn on_message_begin(&mut self, kind: MessageKind) {
            self.events.push(Event::Begin(kind));
        }

        fn on_url(&mut self, url: &[u8]) {
            self.events.push(Event::Url(url.to_vec()));
        }

        fn on_status(&mut self, status_code: u16, reason: &[u8]) {
            self.events.push(Event::Status(status_code, reason.to_vec()));
        }

        fn on_header_field(&mut self, name: &[u8]) {
            self.events.push(Event::Field(name.to_vec()));
        }

        fn on_header_value(&mut self, value: &[u8]) {
            self.events.push(Event::Value(value.to_vec()));
        }

        fn on_headers_complete(&mut self, _head: &MessageHead) -> HeadersOutcome {
            self.events.push(Event::HeadersComplete);
            if self.skip_body { HeadersOutcome::SkipBody } else { HeadersOutcome::Proceed }
        }

        fn on_body(&mut self, data: &[u8]) {
            // merge fragments so split input compares equal to whole input
            if let Some(Event::Body(last)) = self.events.last_mut() {
                last.extend_from_slice(data);
            } else {
                self.events.push(Event::Body(data.to_vec()));
            }
        }

        fn on_chunk_header(&mut self, size: u64) {
            self.events.push(Event::ChunkHeader(size));
        }

        fn on_chunk_complete(&mut self) {
            self.events.push(Event::ChunkComplete);
        }

        fn on_message_complete(&mut self) {
            self.events.push(Event::Complete);
        }
    }

    fn tokenizer(mode: TokenizerMode) -> Tokenizer {
        Tokenizer::new(mode, &ParserConfig::default())
    }

    const CHUNKED: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";

    #[test]
    fn simple_request() {
        let mut events = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Either);

        tokenizer.execute(b"GET /test HTTP/1.1\r\nHost: a\r\n\r\n", &mut events).unwrap();

        assert_eq!(
            events.events,
            vec![
                Event::Begin(MessageKind::Request),
                Event::Url(b"/test".to_vec()),
                Event::Field(b"Host".to_vec()),
                Event::Value(b"a".to_vec()),
                Event::HeadersComplete,
                Event::Complete,
            ]
        );
        assert!(tokenizer.is_idle());
    }

    #[test]
    fn chunked_response() {
        let mut events = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Response);

        tokenizer.execute(CHUNKED, &mut events).unwrap();

        assert_eq!(events.body(), b"hello world");
        assert_eq!(events.count(&Event::ChunkComplete), 3);
        assert_eq!(events.count(&Event::ChunkHeader(0)), 1);
        assert_eq!(events.events.last(), Some(&Event::Complete));
    }

    #[test]
    fn byte_at_a_time_matches_whole() {
        let mut whole = Events::default();
        tokenizer(TokenizerMode::Response).execute(CHUNKED, &mut whole).unwrap();

        let mut split = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Response);
        for byte in CHUNKED {
            tokenizer.execute(&[*byte], &mut split).unwrap();
        }

        assert_eq!(whole.events, split.events);
    }

    #[test]
    fn pipelined_requests() {
        let mut events = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Request);

        tokenizer
            .execute(b"POST /a HTTP/1.1\r\nContent-Length: 4\r\n\r\nq=42GET /b HTTP/1.1\r\n\r\n", &mut events)
            .unwrap();

        assert_eq!(events.count(&Event::Complete), 2);
        assert_eq!(events.body(), b"q=42");
        assert!(events.events.contains(&Event::Url(b"/b".to_vec())));
    }

    #[test]
    fn skip_body() {
        let mut events = Events { skip_body: true, ..Events::default() };
        let mut tokenizer = tokenizer(TokenizerMode::Response);

        tokenizer.execute(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n", &mut events).unwrap();

        assert_eq!(events.events.last(), Some(&Event::Complete));
        assert!(tokenizer.is_idle());
    }

    #[test]
    fn until_close_body() {
        let mut events = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Response);

        tokenizer.execute(b"HTTP/1.0 200 OK\r\n\r\nsome", &mut events).unwrap();
        tokenizer.execute(b" data", &mut events).unwrap();
        assert_eq!(events.count(&Event::Complete), 0);

        tokenizer.finish(&mut events).unwrap();
        assert_eq!(events.body(), b"some data");
        assert_eq!(events.count(&Event::Complete), 1);
    }

    #[test]
    fn finish_inside_framed_body() {
        let mut events = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Request);

        tokenizer.execute(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc", &mut events).unwrap();
        assert!(matches!(tokenizer.finish(&mut events), Err(ParseError::UnexpectedEof { .. })));
        assert!(tokenizer.is_idle());

        assert!(tokenizer.finish(&mut events).is_ok());
    }

    #[test]
    fn error_reports_position() {
        let mut events = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Request);

        let input = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabcXYZ";
        let error = tokenizer.execute(input, &mut events).unwrap_err();

        // the byte after the chunk data should have been CR
        assert_eq!(error.consumed(), input.len() - 3);
        assert!(!error.at_message_start());
        assert!(matches!(error.error(), ParseError::InvalidBody { .. }));
        assert!(tokenizer.has_failed());
        assert!(tokenizer.execute(b"GET", &mut events).is_err());

        tokenizer.reset(TokenizerMode::Request);
        tokenizer.execute(b"GET / HTTP/1.1\r\n\r\n", &mut events).unwrap();
        assert_eq!(events.count(&Event::Complete), 1);
    }

    #[test]
    fn head_error_after_complete_message() {
        let first: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nH";
        let rest: &[u8] = b"TTP/1.1 204 No Content\r\n\r\n";

        let mut whole = Events::default();
        let error = tokenizer(TokenizerMode::Response).execute(&[first, rest].concat(), &mut whole).unwrap_err();
        assert_eq!(error.consumed(), first.len());

        let mut split = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Response);
        tokenizer.execute(first, &mut split).unwrap();
        let error = tokenizer.execute(rest, &mut split).unwrap_err();
        assert_eq!(error.consumed(), 0);
        assert!(error.at_message_start());

        assert_eq!(whole.events, split.events);
        assert_eq!(whole.body(), b"H");
    }

    #[test]
    fn head_error_in_carried_bytes() {
        let mut events = Events::default();
        let mut tokenizer = tokenizer(TokenizerMode::Request);

        tokenizer.execute(b"GET / HTTP/1.1\r\nBad Name: x\r\n\r", &mut events).unwrap();
        let error = tokenizer.execute(b"\nGET /next HTTP/1.1\r\n\r\n", &mut events).unwrap_err();

        // the line feed that completed the head is the offending byte
        assert_eq!(error.consumed(), 0);
        assert!(!error.at_message_start());
        assert!(events.events.is_empty());
    }

    #[test]
    fn head_info_is_available() {
        struct MethodCapture(Option<Method>);

        impl TokenizerHandler for MethodCapture {
            fn on_message_begin(&mut self, _kind: MessageKind) {}
            fn on_url(&mut self, _url: &[u8]) {}
            fn on_status(&mut self, _status_code: u16, _reason: &[u8]) {}
            fn on_header_field(&mut self, _name: &[u8]) {}
            fn on_header_value(&mut self, _value: &[u8]) {}
            fn on_headers_complete(&mut self, head: &MessageHead) -> HeadersOutcome {
                if let StartLine::Request { method, .. } = head.start_line() {
                    self.0 = Method::from_bytes(method).ok();
                }
                HeadersOutcome::Proceed
            }
            fn on_body(&mut self, _data: &[u8]) {}
            fn on_message_complete(&mut self) {}
        }

        let mut handler = MethodCapture(None);
        tokenizer(TokenizerMode::Either).execute(b"DELETE /x HTTP/1.1\r\n\r\n", &mut handler).unwrap();
        assert_eq!(handler.0, Some(Method::DELETE));
    }
}
