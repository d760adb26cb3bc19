//! Tunables shared by every session of a registry.
//!
//! The defaults follow the limits of the classic C http tokenizer (80 KiB of
//! header section) and the recommended zlib chunk size for inflating bodies.

/// Default upper bound for the header section of one message, in bytes.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 80 * 1024;

/// Default upper bound for the number of header fields of one message.
pub const DEFAULT_MAX_HEADERS: usize = 128;

/// Default size of the buffer decompressed body data is inflated into.
pub const DEFAULT_DECODE_BUFFER_SIZE: usize = 256 * 1024;

/// Default number of compressed bytes handed to the inflater per step.
pub const DEFAULT_DECODE_WINDOW_SIZE: usize = 256 * 1024;

/// Configuration of the tokenizer limits and the content decoder buffers.
///
/// ```
/// use http_tap::ParserConfig;
///
/// let config = ParserConfig::default().with_decode_buffer_size(16 * 1024).with_max_headers(64);
/// assert_eq!(config.decode_buffer_size(), 16 * 1024);
/// assert_eq!(config.max_headers(), 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    max_header_bytes: usize,
    max_headers: usize,
    decode_buffer_size: usize,
    decode_window_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_headers: DEFAULT_MAX_HEADERS,
            decode_buffer_size: DEFAULT_DECODE_BUFFER_SIZE,
            decode_window_size: DEFAULT_DECODE_WINDOW_SIZE,
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum size of a message's start line plus header fields.
    ///
    /// A head that grows beyond this limit is rejected as a syntax error.
    #[must_use]
    pub fn with_max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.max_header_bytes = max_header_bytes.max(1);
        self
    }

    /// Maximum number of header fields accepted in one message.
    #[must_use]
    pub fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers.max(1);
        self
    }

    /// Capacity of the output buffer of the content decoder.
    ///
    /// Every filled buffer is delivered as one body-data callback, so this is
    /// also the largest chunk a consumer sees for a decoded body.
    #[must_use]
    pub fn with_decode_buffer_size(mut self, decode_buffer_size: usize) -> Self {
        self.decode_buffer_size = decode_buffer_size.max(1);
        self
    }

    /// Number of compressed bytes handed to the inflater in one step.
    ///
    /// Larger body fragments are inflated window by window; this bounds the
    /// input side of the decoder the same way the buffer size bounds the
    /// output side. It never rejects input.
    #[must_use]
    pub fn with_decode_window_size(mut self, decode_window_size: usize) -> Self {
        self.decode_window_size = decode_window_size.max(1);
        self
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn max_headers(&self) -> usize {
        self.max_headers
    }

    pub fn decode_buffer_size(&self) -> usize {
        self.decode_buffer_size
    }

    pub fn decode_window_size(&self) -> usize {
        self.decode_window_size
    }
}
