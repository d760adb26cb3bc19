//! Byte level processing of captured HTTP/1.x streams.
//!
//! - [`Tokenizer`]: turns fragmented input into [`TokenizerHandler`] events
//!   - header sections via the [`header`] decoders
//!   - body framing via the [`body`] decoders
//! - [`ContentDecoder`]: removes `gzip`/`deflate` content coding from body data
//!
//! Sessions drive these types; they are public for consumers that want to
//! tokenize a single stream without the session and registry layer.

pub mod body;
pub mod header;

mod content_decoder;
mod tokenizer;

pub use content_decoder::ContentDecoder;
pub use content_decoder::ContentEncoding;
pub use header::MessageHead;
pub use header::StartLine;
pub use tokenizer::ExecuteError;
pub use tokenizer::Tokenizer;
pub use tokenizer::TokenizerHandler;
pub use tokenizer::TokenizerMode;
