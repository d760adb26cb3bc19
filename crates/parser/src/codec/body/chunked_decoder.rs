//! Decoder for `Transfer-Encoding: chunked` bodies.
//!
//! Besides the chunk data, the decoder reports chunk boundaries
//! ([`PayloadItem::ChunkHeader`] and [`PayloadItem::ChunkComplete`]) so the
//! tokenizer can forward them as events. Chunk extensions and trailer fields
//! are validated for framing and otherwise ignored.

use std::task::Poll;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

use crate::protocol::{ParseError, PayloadItem};

/// State machine decoding one chunked body, byte by byte where needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Hex digits of the chunk size
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Chunk extensions, ignored
    Extension,
    /// LF ending the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after the data
    BodyCr,
    /// LF after the data
    BodyLf,
    /// A trailer field, ignored
    Trailer,
    /// LF ending a trailer field
    TrailerLf,
    /// CR of the final blank line, or the start of a trailer field
    EndCr,
    /// LF of the final blank line
    EndLf,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut item = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut item) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if item.is_some() {
                return Ok(item);
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

type Step = Poll<Result<ChunkedState, ParseError>>;

fn invalid(reason: &str) -> Step {
    Poll::Ready(Err(ParseError::invalid_body(reason)))
}

impl ChunkedState {
    fn step(&self, src: &mut BytesMut, remaining_size: &mut u64, item: &mut Option<PayloadItem>) -> Step {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, *remaining_size, item),
            Body => ChunkedState::read_body(src, remaining_size, item),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src, item),
            Trailer => ChunkedState::read_trailer(src),
            TrailerLf => ChunkedState::read_trailer_lf(src),
            EndCr => ChunkedState::read_end_cr(src),
            EndLf => ChunkedState::read_end_lf(src, item),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> Step {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return invalid("invalid chunk size line: invalid size"),
        };

        match size_per_chunk.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit))) {
            Some(size) => {
                *size_per_chunk = size;
                Poll::Ready(Ok(Size))
            }
            None => invalid("invalid overflow chunked length"),
        }
    }

    fn read_size_lws(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            // no more digits may follow the whitespace
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid("invalid chunk size linear white space"),
        }
    }

    fn read_extension(src: &mut BytesMut) -> Step {
        // extensions end at CRLF, a bare LF is rejected
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid("invalid chunk extension contains newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size_per_chunk: u64, item: &mut Option<PayloadItem>) -> Step {
        match try_next_byte!(src) {
            b'\n' => {
                *item = Some(PayloadItem::ChunkHeader(size_per_chunk));
                if size_per_chunk == 0 { Poll::Ready(Ok(EndCr)) } else { Poll::Ready(Ok(Body)) }
            }
            _ => invalid("invalid chunk size LF"),
        }
    }

    fn read_body(src: &mut BytesMut, size_per_chunk: &mut u64, item: &mut Option<PayloadItem>) -> Step {
        if src.is_empty() {
            return Poll::Ready(Ok(Body));
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let remaining = usize::try_from(*size_per_chunk).unwrap_or(usize::MAX);
        let read_size = remaining.min(src.len());

        *size_per_chunk -= read_size as u64;
        *item = Some(PayloadItem::Chunk(src.split_to(read_size).freeze()));

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => invalid("invalid chunk body CR"),
        }
    }

    fn read_body_lf(src: &mut BytesMut, item: &mut Option<PayloadItem>) -> Step {
        match try_next_byte!(src) {
            b'\n' => {
                *item = Some(PayloadItem::ChunkComplete);
                Poll::Ready(Ok(Size))
            }
            _ => invalid("invalid chunk body LF"),
        }
    }

    fn read_trailer(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(EndCr)),
            _ => invalid("invalid trailer end LF"),
        }
    }

    fn read_end_cr(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_lf(src: &mut BytesMut, item: &mut Option<PayloadItem>) -> Step {
        match try_next_byte!(src) {
            b'\n' => {
                *item = Some(PayloadItem::ChunkComplete);
                Poll::Ready(Ok(End))
            }
            _ => invalid("invalid chunk end LF"),
        }
    }
}
