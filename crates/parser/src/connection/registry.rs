//! The table of live sessions, keyed by connection id.
//!
//! The table itself sits behind a mutex, so sessions can be connected and
//! closed from any thread. Each session lives in its own slot with its own
//! lock; feeding different sessions from different threads therefore never
//! contends on the table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::ParserConfig;
use crate::connection::session::Session;
use crate::handler::ParserCallbacks;
use crate::logging::Logger;
use crate::protocol::{ConnectionId, Direction, Error, ErrorRecord};

type Slot<C> = Arc<Mutex<Option<Session<C>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn session_closed() -> Error {
    Error::invalid_argument("session closed")
}

/// Owner of every session of a capture.
///
/// ```
/// use http_tap::{BodyStart, BoxError, ConnectionId, Direction, HeadersOutcome, HttpMessage, Logger, ParserCallbacks, Registry};
///
/// struct Print;
///
/// impl ParserCallbacks for Print {
///     fn on_request_received(&mut self, id: ConnectionId, message: HttpMessage) -> HeadersOutcome {
///         println!("{id}: {:?}", message.url());
///         HeadersOutcome::Proceed
///     }
///     fn on_request_body_started(&mut self, _id: ConnectionId) -> BodyStart { BodyStart::decoded() }
///     fn on_request_body_data(&mut self, _id: ConnectionId, _data: &[u8]) -> Result<(), BoxError> { Ok(()) }
///     fn on_request_body_finished(&mut self, _id: ConnectionId) {}
///     fn on_response_received(&mut self, _id: ConnectionId, _message: HttpMessage) -> HeadersOutcome {
///         HeadersOutcome::Proceed
///     }
///     fn on_response_body_started(&mut self, _id: ConnectionId) -> BodyStart { BodyStart::decoded() }
///     fn on_response_body_data(&mut self, _id: ConnectionId, _data: &[u8]) -> Result<(), BoxError> { Ok(()) }
///     fn on_response_body_finished(&mut self, _id: ConnectionId) {}
/// }
///
/// let registry = Registry::new(Logger::global());
/// let session = registry.connect(7, Print).unwrap();
/// session.input(Direction::Outbound, b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
/// registry.close(session).unwrap();
/// ```
pub struct Registry<C> {
    sessions: Mutex<HashMap<ConnectionId, Slot<C>>>,
    config: ParserConfig,
    logger: Logger,
}

impl<C: ParserCallbacks> Registry<C> {
    pub fn new(logger: Logger) -> Self {
        Self::with_config(logger, ParserConfig::default())
    }

    pub fn with_config(logger: Logger, config: ParserConfig) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), config, logger }
    }

    /// Creates the session of connection `id`.
    ///
    /// Fails with [`Error::AlreadyConnected`] while a session for `id` is
    /// live; the existing session is left alone apart from its error record.
    pub fn connect(&self, id: ConnectionId, callbacks: C) -> Result<SessionHandle<C>, Error> {
        self.logger.scope(|| {
            let mut sessions = lock(&self.sessions);

            if let Some(existing) = sessions.get(&id) {
                let error = Error::already_connected(id);
                warn!(id, "connection is already connected");
                // a callback of that very session may be calling us
                if let Ok(mut slot) = existing.try_lock() {
                    if let Some(session) = slot.as_mut() {
                        session.note_error(&error);
                    }
                }
                return Err(error);
            }

            let session = Session::new(id, callbacks, self.config).with_logger(self.logger.clone());
            let slot = Arc::new(Mutex::new(Some(session)));
            sessions.insert(id, Arc::clone(&slot));
            debug!(id, live = sessions.len(), "connected");

            Ok(SessionHandle { id, slot })
        })
    }

    /// Removes the session from the table and tears it down.
    ///
    /// Returns the callbacks the session was connected with.
    pub fn close(&self, handle: SessionHandle<C>) -> Result<C, Error> {
        self.logger.scope(|| {
            {
                let mut sessions = lock(&self.sessions);
                if sessions.get(&handle.id).is_some_and(|slot| Arc::ptr_eq(slot, &handle.slot)) {
                    sessions.remove(&handle.id);
                }
            }

            let session = lock(&handle.slot).take().ok_or_else(session_closed)?;
            debug!(id = handle.id, "session closed");
            Ok(session.into_callbacks())
        })
    }
}

impl<C> Registry<C> {
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        lock(&self.sessions).contains_key(&id)
    }

    /// Closes every remaining session. Handles still held afterwards report
    /// the session as closed.
    pub fn destroy(&self) {
        self.logger.scope(|| {
            let slots: Vec<(ConnectionId, Slot<C>)> = lock(&self.sessions).drain().collect();
            if slots.is_empty() {
                return;
            }

            info!(count = slots.len(), "destroying remaining sessions");
            for (id, slot) in slots {
                drop(lock(&slot).take());
                debug!(id, "session closed");
            }
        });
    }
}

impl<C> Drop for Registry<C> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("sessions", &self.len()).field("config", &self.config).finish_non_exhaustive()
    }
}

/// Exclusive access to one session of a [`Registry`].
///
/// The handle is not `Clone`; [`Registry::close`] consumes it.
pub struct SessionHandle<C> {
    id: ConnectionId,
    slot: Slot<C>,
}

impl<C: ParserCallbacks> SessionHandle<C> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// See [`Session::input`].
    pub fn input(&self, direction: Direction, data: &[u8]) -> Result<(), Error> {
        self.with_session(|session| session.input(direction, data))?
    }

    /// See [`Session::disconnect`].
    pub fn disconnect(&self, direction: Direction) -> Result<(), Error> {
        self.with_session(|session| session.disconnect(direction))?
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.with_session(|session| session.last_error().cloned()).ok().flatten()
    }

    /// Runs `f` on the session, unless it was closed.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session<C>) -> R) -> Result<R, Error> {
        let mut slot = lock(&self.slot);
        let session = slot.as_mut().ok_or_else(session_closed)?;
        Ok(f(session))
    }
}

impl<C> fmt::Debug for SessionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish_non_exhaustive()
    }
}
