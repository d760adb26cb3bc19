//! Streaming inflater for `gzip` and `deflate` encoded bodies.
//!
//! Body bytes reach the [`ContentDecoder`] in whatever fragments the capture
//! produced. Each [`feed`](ContentDecoder::feed) call appends the new bytes
//! to a carry buffer, inflates as much as possible into a fixed size output
//! buffer and hands every produced piece to a callback. Bytes the inflater
//! could not take yet stay at the front of the carry buffer for the next
//! call.

use flate2::{Decompress, FlushDecompress, Status};
use http::header::CONTENT_ENCODING;
use tracing::{debug, trace};

use crate::config::ParserConfig;
use crate::protocol::{Error, HttpMessage};

/// Content coding of a body, as far as it can be undone here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    /// zlib wrapped deflate stream
    Deflate,
    Gzip,
}

impl ContentEncoding {
    /// Maps a `Content-Encoding` value, unknown codings are passed through as identity.
    pub fn from_header_value(value: &[u8]) -> Self {
        let value = value.trim_ascii();
        if value.eq_ignore_ascii_case(b"gzip") || value.eq_ignore_ascii_case(b"x-gzip") {
            ContentEncoding::Gzip
        } else if value.eq_ignore_ascii_case(b"deflate") {
            ContentEncoding::Deflate
        } else {
            ContentEncoding::Identity
        }
    }

    /// Selects the encoding from the `Content-Encoding` field of `message`.
    pub fn select(message: &HttpMessage) -> Self {
        message
            .headers()
            .iter()
            .find(|field| field.name().eq_ignore_ascii_case(CONTENT_ENCODING.as_str().as_bytes()))
            .map_or(ContentEncoding::Identity, |field| ContentEncoding::from_header_value(field.value()))
    }

    pub fn name(self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Deflate => "deflate",
            ContentEncoding::Gzip => "gzip",
        }
    }
}

/// Inflate state of one body.
pub struct ContentDecoder {
    encoding: ContentEncoding,
    inflater: Option<Decompress>,
    carry: Vec<u8>,
    output: Vec<u8>,
    window: usize,
    finished: bool,
}

impl ContentDecoder {
    /// Prepares decoding of a body with the given encoding.
    ///
    /// Identity bodies get no buffers and are passed through unchanged.
    pub fn begin(encoding: ContentEncoding, config: &ParserConfig) -> Self {
        let inflater = match encoding {
            ContentEncoding::Identity => None,
            ContentEncoding::Deflate => Some(Decompress::new(true)),
            ContentEncoding::Gzip => Some(Decompress::new_gzip(15)),
        };

        let (carry, output) = match inflater {
            Some(_) => (Vec::with_capacity(config.decode_window_size()), vec![0; config.decode_buffer_size()]),
            None => (Vec::new(), Vec::new()),
        };

        debug!(encoding = encoding.name(), "begin content decoding");
        Self { encoding, inflater, carry, output, window: config.decode_window_size(), finished: false }
    }

    pub fn encoding(&self) -> ContentEncoding {
        self.encoding
    }

    /// Returns true once the compressed stream signalled its end.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Compressed bytes waiting for the next [`feed`](Self::feed).
    pub fn carried(&self) -> usize {
        self.carry.len()
    }

    /// Inflates `data` and passes every produced piece to `emit`.
    ///
    /// A single call may invoke `emit` several times, once per filled output
    /// buffer. Input after the end of the compressed stream is discarded.
    pub fn feed<F>(&mut self, data: &[u8], mut emit: F) -> Result<(), Error>
    where
        F: FnMut(&[u8]) -> Result<(), Error>,
    {
        let Some(inflater) = self.inflater.as_mut() else {
            if self.encoding == ContentEncoding::Identity && !data.is_empty() {
                emit(data)?;
            }
            return Ok(());
        };

        if self.finished {
            trace!(len = data.len(), "discard bytes after end of compressed stream");
            return Ok(());
        }

        self.carry.extend_from_slice(data);

        // runs until the inflater neither takes input nor flushes output
        let mut offset = 0;
        loop {
            let window_end = self.carry.len().min(offset + self.window);
            let before_in = inflater.total_in();
            let before_out = inflater.total_out();

            let status = inflater
                .decompress(&self.carry[offset..window_end], &mut self.output, FlushDecompress::None)
                .map_err(Error::codec)?;

            let consumed = usize::try_from(inflater.total_in() - before_in).unwrap_or(usize::MAX);
            let produced = usize::try_from(inflater.total_out() - before_out).unwrap_or(usize::MAX);
            offset += consumed;

            if produced > 0 {
                trace!(consumed, produced, "inflated body bytes");
                emit(&self.output[..produced])?;
            }

            if status == Status::StreamEnd {
                trace!(trailing = self.carry.len() - offset, "compressed stream ended");
                self.finished = true;
                offset = self.carry.len();
                break;
            }

            if consumed == 0 && produced == 0 {
                break;
            }
        }

        self.carry.drain(..offset);
        Ok(())
    }

    /// Releases the inflater and both buffers. Calling it again does nothing.
    pub fn end(&mut self) {
        if self.inflater.take().is_some() {
            debug!(encoding = self.encoding.name(), carried = self.carry.len(), "end content decoding");
        }
        self.carry = Vec::new();
        self.output = Vec::new();
    }
}

impl std::fmt::Debug for ContentDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDecoder")
            .field("encoding", &self.encoding)
            .field("carried", &self.carry.len())
            .field("output_size", &self.output.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
