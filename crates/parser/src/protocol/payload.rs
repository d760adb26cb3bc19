use bytes::Bytes;

/// One item produced while framing a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A slice of body data, still content-encoded.
    Chunk(Bytes),
    /// The size line of a chunk was read, `0` announces the last chunk.
    ChunkHeader(u64),
    /// The CRLF closing a chunk was read.
    ChunkComplete,
    /// The body ended.
    Eof,
}

/// How the body of a message is delimited, derived from its header section.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` bytes follow the header section.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// A response body that runs until the server closes the connection.
    UntilClose,
    /// No body at all.
    Empty,
}

impl PayloadSize {
    /// Returns true if no body bytes follow, including `Content-Length: 0`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Length(0))
    }
}
