//! The log sink shared by a registry and all of its sessions.
//!
//! Everything in this crate logs through `tracing`. A [`Logger`] decides
//! which subscriber receives those events: the globally installed one, or a
//! dedicated [`Dispatch`] that is made the default for the duration of every
//! registry and session operation.

use tracing::{Dispatch, Level};
use tracing_subscriber::FmtSubscriber;

/// Shared handle to a log sink.
///
/// Cloning is cheap, all clones feed the same subscriber.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Logs through whatever subscriber is installed globally.
    pub fn global() -> Self {
        Self { dispatch: None }
    }

    /// Logs human readable lines to stderr, up to `level`.
    pub fn stderr(level: Level) -> Self {
        let subscriber = FmtSubscriber::builder().with_max_level(level).with_writer(std::io::stderr).finish();
        Self::from_dispatch(Dispatch::new(subscriber))
    }

    /// Logs through a caller supplied dispatcher.
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch: Some(dispatch) }
    }

    /// Runs `f` with this logger's dispatcher as the default one.
    pub(crate) fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}
