//! Body framing decoders.
//!
//! - [`PayloadDecoder`]: picks one of the strategies below per message
//! - `ChunkedDecoder`: `Transfer-Encoding: chunked`
//! - `LengthDecoder`: `Content-Length`

mod chunked_decoder;
mod length_decoder;
mod payload_decoder;

pub use payload_decoder::PayloadDecoder;
