#![allow(dead_code, reason = "each test binary uses a different part of the helpers")]

use std::io::Write;

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http_tap::{
    BodyStart, BoxError, ConnectionId, Direction, ErrorKind, ErrorRecord, HeadersOutcome, HttpMessage, MessageKind, ParserCallbacks,
};

/// One callback invocation, as seen by [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Received(MessageKind, HttpMessage),
    BodyStarted(MessageKind),
    BodyData(MessageKind, Vec<u8>),
    BodyFinished(MessageKind),
    ParseError(Direction, ErrorKind),
}

/// Records every callback and answers with configurable outcomes.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
    pub decode: bool,
    pub skip_body: bool,
    pub fail_body_data: bool,
}

impl Recorder {
    pub fn decoding() -> Self {
        Self { decode: true, ..Self::default() }
    }

    pub fn messages(&self, kind: MessageKind) -> Vec<&HttpMessage> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Received(k, message) if *k == kind => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn body(&self, kind: MessageKind) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::BodyData(k, data) if *k == kind => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn count(&self, wanted: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| wanted(event)).count()
    }

    /// Events with consecutive body data merged, so that the way the input
    /// was split does not show.
    pub fn normalized(&self) -> Vec<Event> {
        let mut events: Vec<Event> = Vec::new();
        for event in &self.events {
            match (events.last_mut(), event) {
                (Some(Event::BodyData(last_kind, last)), Event::BodyData(kind, data)) if last_kind == kind => {
                    last.extend_from_slice(data);
                }
                _ => events.push(event.clone()),
            }
        }
        events
    }

    fn received(&mut self, kind: MessageKind, message: HttpMessage) -> HeadersOutcome {
        self.events.push(Event::Received(kind, message));
        if self.skip_body { HeadersOutcome::SkipBody } else { HeadersOutcome::Proceed }
    }

    fn started(&mut self, kind: MessageKind) -> BodyStart {
        self.events.push(Event::BodyStarted(kind));
        BodyStart { decode: self.decode }
    }

    fn data(&mut self, kind: MessageKind, data: &[u8]) -> Result<(), BoxError> {
        if self.fail_body_data {
            return Err("consumer refused body data".into());
        }
        self.events.push(Event::BodyData(kind, data.to_vec()));
        Ok(())
    }
}

impl ParserCallbacks for Recorder {
    fn on_request_received(&mut self, _id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
        self.received(MessageKind::Request, message)
    }

    fn on_request_body_started(&mut self, _id: ConnectionId) -> BodyStart {
        self.started(MessageKind::Request)
    }

    fn on_request_body_data(&mut self, _id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
        self.data(MessageKind::Request, data)
    }

    fn on_request_body_finished(&mut self, _id: ConnectionId) {
        self.events.push(Event::BodyFinished(MessageKind::Request));
    }

    fn on_response_received(&mut self, _id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
        self.received(MessageKind::Response, message)
    }

    fn on_response_body_started(&mut self, _id: ConnectionId) -> BodyStart {
        self.started(MessageKind::Response)
    }

    fn on_response_body_data(&mut self, _id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
        self.data(MessageKind::Response, data)
    }

    fn on_response_body_finished(&mut self, _id: ConnectionId) {
        self.events.push(Event::BodyFinished(MessageKind::Response));
    }

    fn on_parse_error(&mut self, _id: ConnectionId, direction: Direction, error: &ErrorRecord) {
        self.events.push(Event::ParseError(direction, error.kind()));
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A response head announcing `body` with the given content coding.
pub fn encoded_response(encoding: &str, body: &[u8]) -> Vec<u8> {
    let mut raw = format!("HTTP/1.1 200 OK\r\nContent-Encoding: {encoding}\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    raw.extend_from_slice(body);
    raw
}

/// Turns the `\n` line ends of an indoc fixture into `\r\n`.
pub fn crlf(text: &str) -> Vec<u8> {
    text.replace('\n', "\r\n").into_bytes()
}
