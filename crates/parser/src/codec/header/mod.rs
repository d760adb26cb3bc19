//! Start line and header section parsing.
//!
//! [`HeadDecoder`] buffers bytes until a complete header section is
//! available and yields a [`MessageHead`] together with its body framing.

mod head_decoder;

pub use head_decoder::HeadDecoder;
pub use head_decoder::HeadError;
pub use head_decoder::MessageHead;
pub use head_decoder::StartLine;
