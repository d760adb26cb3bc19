use std::io;

use thiserror::Error;

use crate::protocol::ConnectionId;

/// Error type consumers return from a body-data callback to abort the body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by registry, session and message operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection {id} is already connected")]
    AlreadyConnected { id: ConnectionId },

    #[error("http syntax error: {source}")]
    HttpSyntax {
        #[from]
        source: ParseError,
    },

    #[error("content decoding error: {reason}")]
    Codec { reason: String },

    #[error("body consumer aborted: {source}")]
    Callback { source: BoxError },

    #[error("missing argument: {name}")]
    NullArgument { name: &'static str },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl Error {
    pub fn already_connected(id: ConnectionId) -> Self {
        Self::AlreadyConnected { id }
    }

    pub fn codec<S: ToString>(str: S) -> Self {
        Self::Codec { reason: str.to_string() }
    }

    pub fn callback<E: Into<BoxError>>(e: E) -> Self {
        Self::Callback { source: e.into() }
    }

    pub fn null_argument(name: &'static str) -> Self {
        Self::NullArgument { name }
    }

    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyConnected { .. } => ErrorKind::AlreadyConnected,
            Self::HttpSyntax { .. } => ErrorKind::HttpSyntax,
            Self::Codec { .. } => ErrorKind::Codec,
            Self::Callback { .. } => ErrorKind::Callback,
            Self::NullArgument { .. } => ErrorKind::NullArgument,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }
}

/// Classification of an [`Error`], as kept in a session's [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `connect` was called for an id that is still live.
    AlreadyConnected,
    /// The tokenizer rejected the byte stream.
    HttpSyntax,
    /// A compressed body could not be inflated.
    Codec,
    /// A body-data callback reported a failure.
    Callback,
    /// A required argument was empty.
    NullArgument,
    /// An argument did not fit the current state.
    InvalidArgument,
}

/// The last error a session ran into.
///
/// Failing operations overwrite it, successful ones leave it untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    kind: ErrorKind,
    message: String,
}

impl ErrorRecord {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable description, taken from the tokenizer or codec diagnostic.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&Error> for ErrorRecord {
    fn from(error: &Error) -> Self {
        Self { kind: error.kind(), message: error.to_string() }
    }
}

/// Syntax errors raised by the tokenizer.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unexpected end of stream: {reason}")]
    UnexpectedEof { reason: String },

    /// Required by the `Decoder` error bound, the decoders never return it.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unexpected_eof<S: ToString>(str: S) -> Self {
        Self::UnexpectedEof { reason: str.to_string() }
    }
}
