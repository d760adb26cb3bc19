//! Session lifecycle: the [`Registry`] of live connections, the per
//! connection [`Session`] and the adapter feeding tokenizer events into it.

mod adapter;
mod registry;
mod session;

pub use registry::Registry;
pub use registry::SessionHandle;
pub use session::Session;
pub use session::SessionMode;
