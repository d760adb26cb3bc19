//! Decoder for the start line and header section of one message.
//!
//! The header section is buffered until it is complete, then parsed with
//! `httparse`. Instead of copying every name and value, the decoder records
//! their byte ranges inside the parsed buffer and hands out [`Bytes`] slices
//! of one frozen copy of the head.
//!
//! The decoder also derives the body framing ([`PayloadSize`]) from the
//! parsed fields, following RFC 9112 section 6.

use bytes::{Buf, Bytes, BytesMut};
use http::Version;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{MessageKind, ParseError, PayloadSize};

const RESPONSE_PREFIX: &[u8] = b"HTTP/";

/// Length of `HTTP/1.1 200 `, the reason phrase starts right after it.
const REASON_OFFSET: usize = 13;

/// The start line of a parsed head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Bytes, url: Bytes },
    Response { status_code: u16, reason: Bytes },
}

/// A parsed start line and header section.
#[derive(Debug, Clone)]
pub struct MessageHead {
    start_line: StartLine,
    version: Version,
    fields: Vec<(Bytes, Bytes)>,
    payload_size: PayloadSize,
}

impl MessageHead {
    pub fn kind(&self) -> MessageKind {
        match self.start_line {
            StartLine::Request { .. } => MessageKind::Request,
            StartLine::Response { .. } => MessageKind::Response,
        }
    }

    pub fn start_line(&self) -> &StartLine {
        &self.start_line
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Header fields as `(name, value)` in wire order.
    pub fn fields(&self) -> &[(Bytes, Bytes)] {
        &self.fields
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }
}

/// A head error and the offset of the byte that caused it.
///
/// The offset indexes the buffer passed to [`HeadDecoder::decode_head`] after
/// leading blank lines were removed from it.
#[derive(Debug)]
pub struct HeadError {
    offset: usize,
    error: ParseError,
}

impl HeadError {
    fn at(offset: usize, error: ParseError) -> Self {
        Self { offset, error }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn into_error(self) -> ParseError {
        self.error
    }
}

/// Parses message heads of the expected kind, `None` accepting both.
///
/// The decoder remembers how far it has scanned, so feeding a head in many
/// small pieces looks at every byte once. `httparse` runs over the start line
/// as soon as it ends and over the whole head once the empty line arrives.
#[derive(Debug, Clone)]
pub struct HeadDecoder {
    expect: Option<MessageKind>,
    max_header_bytes: usize,
    max_headers: usize,
    scanned: usize,
    start_line_checked: bool,
}

impl HeadDecoder {
    pub fn new(expect: Option<MessageKind>, max_header_bytes: usize, max_headers: usize) -> Self {
        Self { expect, max_header_bytes, max_headers, scanned: 0, start_line_checked: false }
    }

    pub fn set_expect(&mut self, expect: Option<MessageKind>) {
        self.expect = expect;
        self.reset();
    }

    /// Forgets the scan position of a partially buffered head.
    pub fn reset(&mut self) {
        self.scanned = 0;
        self.start_line_checked = false;
    }

    /// Decodes one head, reporting where an error was detected.
    pub fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<MessageHead>, HeadError> {
        let result = self.try_decode_head(src);
        if !matches!(result, Ok(None)) {
            self.reset();
        }
        result
    }

    fn detect_kind(&self, src: &[u8]) -> Option<MessageKind> {
        match self.expect {
            Some(kind) => Some(kind),
            None if src.len() < RESPONSE_PREFIX.len() && RESPONSE_PREFIX.starts_with(src) => None,
            None if src.starts_with(RESPONSE_PREFIX) => Some(MessageKind::Response),
            None => Some(MessageKind::Request),
        }
    }

    fn try_decode_head(&mut self, src: &mut BytesMut) -> Result<Option<MessageHead>, HeadError> {
        // empty lines ahead of a start line are tolerated
        let blank = src.iter().take_while(|b| matches!(b, b'\r' | b'\n')).count();
        src.advance(blank);

        if src.is_empty() {
            return Ok(None);
        }

        let Some(kind) = self.detect_kind(src) else {
            return Ok(None);
        };
        check_first_bytes(kind, src)?;

        let Some(head_len) = self.scan(kind, src)? else {
            let limit = self.max_header_bytes;
            ensure!(src.len() <= limit, HeadError::at(limit, ParseError::too_large_header(src.len(), limit)));
            return Ok(None);
        };

        let limit = self.max_header_bytes;
        ensure!(head_len <= limit, HeadError::at(limit, ParseError::too_large_header(head_len, limit)));

        // errors found by the full parse are blamed on the final line feed
        let last = head_len - 1;
        let parsed = {
            let head = &src[..head_len];
            let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
            let result = match kind {
                MessageKind::Request => parse_request(head, &mut headers, self.max_headers),
                MessageKind::Response => parse_response(head, &mut headers, self.max_headers),
            };
            result.map_err(|e| HeadError::at(last, e))?
        };
        let Some(parsed) = parsed else {
            return Err(HeadError::at(last, ParseError::invalid_header("unterminated header section")));
        };

        trace!(head_size = parsed.head_len, ?kind, "parsed message head");

        let payload_size =
            parse_payload(&parsed.start, &src[..parsed.head_len], &parsed.fields).map_err(|e| HeadError::at(last, e))?;

        let head_bytes = src.split_to(parsed.head_len).freeze();
        let fields: Vec<(Bytes, Bytes)> = parsed
            .fields
            .iter()
            .map(|index| (head_bytes.slice(index.name.0..index.name.1), head_bytes.slice(index.value.0..index.value.1)))
            .collect();

        let start_line = match parsed.start {
            ParsedStart::Request { method, url } => {
                StartLine::Request { method: head_bytes.slice(method.0..method.1), url: head_bytes.slice(url.0..url.1) }
            }
            ParsedStart::Response { status_code } => StartLine::Response { status_code, reason: reason_phrase(&head_bytes) },
        };

        Ok(Some(MessageHead { start_line, version: parsed.version, fields, payload_size }))
    }

    /// Looks for the end of the head in the bytes not scanned yet.
    ///
    /// The start line is validated the moment its line feed shows up.
    /// Returns the head length once a line feed follows an empty line.
    fn scan(&mut self, kind: MessageKind, src: &[u8]) -> Result<Option<usize>, HeadError> {
        let mut from = self.scanned;
        while let Some(pos) = src[from..].iter().position(|b| *b == b'\n') {
            let at = from + pos;
            if !self.start_line_checked {
                check_start_line(kind, &src[..=at], self.max_headers).map_err(|e| HeadError::at(at, e))?;
                self.start_line_checked = true;
            } else if src[..at].ends_with(b"\n") || src[..at].ends_with(b"\n\r") {
                return Ok(Some(at + 1));
            }
            from = at + 1;
        }

        self.scanned = src.len();
        Ok(None)
    }
}

impl Decoder for HeadDecoder {
    type Item = MessageHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_head(src).map_err(HeadError::into_error)
    }
}

fn is_token(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Rejects a head by its first bytes: a method token or the `HTTP/` prefix.
fn check_first_bytes(kind: MessageKind, src: &[u8]) -> Result<(), HeadError> {
    match kind {
        MessageKind::Request => {
            ensure!(src.first().copied().is_some_and(is_token), HeadError::at(0, ParseError::invalid_header("invalid token")));
        }
        MessageKind::Response => {
            if let Some(at) = src.iter().zip(RESPONSE_PREFIX).position(|(got, want)| got != want) {
                return Err(HeadError::at(at, ParseError::InvalidVersion(None)));
            }
        }
    }
    Ok(())
}

/// Runs `httparse` over a start line. A complete start line parses as partial.
fn check_start_line(kind: MessageKind, line: &[u8], max_headers: usize) -> Result<(), ParseError> {
    let result = match kind {
        MessageKind::Request => httparse::Request::new(&mut []).parse(line),
        MessageKind::Response => httparse::Response::new(&mut []).parse(line),
    };
    result.map(drop).map_err(|e| map_httparse_error(e, max_headers))
}

/// Byte ranges of one header field inside the parsed buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

enum ParsedStart {
    Request { method: (usize, usize), url: (usize, usize) },
    Response { status_code: u16 },
}

struct ParsedHead {
    start: ParsedStart,
    version: Version,
    fields: Vec<HeaderIndex>,
    head_len: usize,
}

fn range_of(base: &[u8], part: &[u8]) -> (usize, usize) {
    let start = part.as_ptr() as usize - base.as_ptr() as usize;
    (start, start + part.len())
}

fn record(base: &[u8], headers: &[httparse::Header<'_>]) -> Vec<HeaderIndex> {
    headers
        .iter()
        .map(|header| HeaderIndex { name: range_of(base, header.name.as_bytes()), value: range_of(base, header.value) })
        .collect()
}

fn map_httparse_error(e: httparse::Error, max_headers: usize) -> ParseError {
    match e {
        httparse::Error::TooManyHeaders => ParseError::too_many_headers(max_headers),
        httparse::Error::Version => ParseError::InvalidVersion(None),
        e => ParseError::invalid_header(e.to_string()),
    }
}

fn to_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        _ => Err(ParseError::InvalidVersion(version)),
    }
}

fn parse_request<'b>(
    src: &'b [u8],
    headers: &mut [httparse::Header<'b>],
    max_headers: usize,
) -> Result<Option<ParsedHead>, ParseError> {
    let mut req = httparse::Request::new(headers);
    let head_len = match req.parse(src).map_err(|e| map_httparse_error(e, max_headers))? {
        Status::Complete(head_len) => head_len,
        Status::Partial => return Ok(None),
    };

    let (Some(method), Some(path)) = (req.method, req.path) else {
        return Err(ParseError::invalid_header("incomplete request line"));
    };

    Ok(Some(ParsedHead {
        start: ParsedStart::Request { method: range_of(src, method.as_bytes()), url: range_of(src, path.as_bytes()) },
        version: to_version(req.version)?,
        fields: record(src, req.headers),
        head_len,
    }))
}

fn parse_response<'b>(
    src: &'b [u8],
    headers: &mut [httparse::Header<'b>],
    max_headers: usize,
) -> Result<Option<ParsedHead>, ParseError> {
    let mut res = httparse::Response::new(headers);
    let head_len = match res.parse(src).map_err(|e| map_httparse_error(e, max_headers))? {
        Status::Complete(head_len) => head_len,
        Status::Partial => return Ok(None),
    };

    let Some(status_code) = res.code else {
        return Err(ParseError::invalid_header("incomplete status line"));
    };

    Ok(Some(ParsedHead {
        start: ParsedStart::Response { status_code },
        version: to_version(res.version)?,
        fields: record(src, res.headers),
        head_len,
    }))
}

/// Takes the reason phrase verbatim from the status line.
///
/// `httparse` drops phrases containing obs-text, which would lose non-ASCII
/// reasons sent by real servers.
fn reason_phrase(head: &Bytes) -> Bytes {
    let line_end = head.iter().position(|b| *b == b'\n').unwrap_or(head.len());
    let line = head.slice(..line_end);
    let line = match line.last() {
        Some(b'\r') => line.slice(..line.len() - 1),
        _ => line,
    };

    if line.len() > REASON_OFFSET { line.slice(REASON_OFFSET..) } else { Bytes::new() }
}

fn find_fields<'a>(head: &'a [u8], fields: &'a [HeaderIndex], name: &'a str) -> impl Iterator<Item = &'a [u8]> {
    fields
        .iter()
        .filter(move |index| head[index.name.0..index.name.1].eq_ignore_ascii_case(name.as_bytes()))
        .map(move |index| &head[index.value.0..index.value.1])
}

/// Selects the body framing of a message according to RFC 9112 section 6.
fn parse_payload(start: &ParsedStart, head: &[u8], fields: &[HeaderIndex]) -> Result<PayloadSize, ParseError> {
    if let ParsedStart::Response { status_code } = start {
        if (100..200).contains(status_code) || *status_code == 204 || *status_code == 304 {
            return Ok(PayloadSize::Empty);
        }
    }

    let te_header = find_fields(head, fields, TRANSFER_ENCODING.as_str()).last();
    let cl_header = parse_content_length(find_fields(head, fields, CONTENT_LENGTH.as_str()))?;

    match (te_header, cl_header) {
        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
        (Some(te_value), None) if is_chunked(te_value) => Ok(PayloadSize::Chunked),
        (None, Some(length)) => Ok(PayloadSize::Length(length)),
        (_, None) => match start {
            ParsedStart::Request { .. } => Ok(PayloadSize::Empty),
            ParsedStart::Response { .. } => Ok(PayloadSize::UntilClose),
        },
    }
}

/// Parses all `Content-Length` values, which must agree.
fn parse_content_length<'a>(values: impl Iterator<Item = &'a [u8]>) -> Result<Option<u64>, ParseError> {
    let mut length = None;
    for value in values {
        let cl_str = std::str::from_utf8(value).map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
        let parsed =
            cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

        ensure!(length.is_none_or(|length| length == parsed), ParseError::invalid_content_length("conflicting values"));
        length = Some(parsed);
    }
    Ok(length)
}

/// Returns true if `chunked` is the final transfer coding.
fn is_chunked(value: &[u8]) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    value.rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}
