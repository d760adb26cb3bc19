//! Reconstruction of HTTP/1.x messages from captured connection traffic
//!
//! This crate rebuilds requests and responses from the raw bytes seen on both
//! directions of a connection, for example by an intercepting proxy. Input
//! may be fragmented arbitrarily, from single bytes up to whole buffers.
//! Bodies encoded with `gzip` or `deflate` can be inflated on the fly, and
//! everything is delivered synchronously through a callback trait.
//!
//! # Example
//!
//! ```
//! use http_tap::{BodyStart, BoxError, ConnectionId, Direction, HeadersOutcome, HttpMessage, Logger, ParserCallbacks, Registry};
//! use tracing::Level;
//!
//! #[derive(Default)]
//! struct Collect {
//!     urls: Vec<Vec<u8>>,
//!     body: Vec<u8>,
//! }
//!
//! impl ParserCallbacks for Collect {
//!     fn on_request_received(&mut self, _id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
//!         self.urls.extend(message.url().map(<[u8]>::to_vec));
//!         HeadersOutcome::Proceed
//!     }
//!     fn on_request_body_started(&mut self, _id: ConnectionId) -> BodyStart {
//!         BodyStart::decoded()
//!     }
//!     fn on_request_body_data(&mut self, _id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
//!         self.body.extend_from_slice(data);
//!         Ok(())
//!     }
//!     fn on_request_body_finished(&mut self, _id: ConnectionId) {}
//!     fn on_response_received(&mut self, _id: ConnectionId, _message: HttpMessage) -> HeadersOutcome {
//!         HeadersOutcome::Proceed
//!     }
//!     fn on_response_body_started(&mut self, _id: ConnectionId) -> BodyStart {
//!         BodyStart::raw()
//!     }
//!     fn on_response_body_data(&mut self, _id: ConnectionId, _data: &[u8]) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//!     fn on_response_body_finished(&mut self, _id: ConnectionId) {}
//! }
//!
//! let registry = Registry::new(Logger::stderr(Level::WARN));
//! let session = registry.connect(1, Collect::default()).unwrap();
//!
//! session.input(Direction::Outbound, b"POST /form HTTP/1.1\r\nContent-Le").unwrap();
//! session.input(Direction::Outbound, b"ngth: 4\r\n\r\nq=42").unwrap();
//!
//! let collected = registry.close(session).unwrap();
//! assert_eq!(collected.urls, vec![b"/form".to_vec()]);
//! assert_eq!(collected.body, b"q=42");
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: the [`HttpMessage`] model, directions, ids and errors
//! - [`codec`]: the event-driven tokenizer and the content decoder
//! - [`handler`]: the [`ParserCallbacks`] trait implemented by consumers
//! - [`connection`]: [`Registry`], [`Session`] and the glue between them
//! - [`config`] and [`logging`]: tunables and the shared log sink
//!
//! # Errors
//!
//! Malformed input never ends a session. The failing call returns
//! [`ErrorKind::HttpSyntax`], the session resynchronizes and later input is
//! parsed normally. A body that fails to inflate, or whose consumer
//! reports an error, is abandoned without affecting later messages.
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - one tokenizer per connection: switching direction in the middle of a
//!   message drops that message

pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod logging;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;

pub use codec::ContentEncoding;
pub use config::ParserConfig;
pub use connection::{Registry, Session, SessionHandle, SessionMode};
pub use handler::{BodyStart, HeadersOutcome, ParserCallbacks};
pub use logging::Logger;
pub use protocol::{BoxError, ConnectionId, Direction, Error, ErrorKind, ErrorRecord, HeaderField, HttpMessage, MessageKind};
