//! Cooperative cancellation, observed at every suspension point.
//!
//! The core never cancels running producer work; a fired token only unblocks
//! waiters with [`Error::Canceled`](crate::Error::Canceled). Cancelling after
//! a cell has resolved has no effect on that cell's cached result.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use crate::event::Event;

/// Why a [`CancelToken`] fired. Cheap to clone and to embed in errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cause(Arc<str>);

impl Cause {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cause {
    fn from(cause: &str) -> Self {
        Cause(Arc::from(cause))
    }
}

impl From<String> for Cause {
    fn from(cause: String) -> Self {
        Cause(Arc::from(cause))
    }
}

/// A shareable cancellation signal carrying a cause.
///
/// Clones observe the same signal. Waits in this crate take a token and
/// return [`Error::Canceled`](crate::Error::Canceled) once it fires.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    cause: OnceLock<Cause>,
    event: Event,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Idempotent; only the first call's cause is kept.
    pub fn cancel(&self, cause: impl Into<Cause>) {
        let _ = self.shared.cause.set(cause.into());
        self.shared.event.fire();
    }

    pub fn is_canceled(&self) -> bool {
        self.shared.event.is_fired()
    }

    /// The cause, once fired.
    pub fn cause(&self) -> Option<Cause> {
        self.shared.cause.get().cloned()
    }

    pub(crate) fn poll_canceled(&self, cx: &mut Context<'_>) -> Poll<Cause> {
        match self.shared.event.poll_fired(cx) {
            Poll::Ready(()) => Poll::Ready(
                self.shared
                    .cause
                    .get()
                    .cloned()
                    .expect("cause is set before the token fires"),
            ),
            Poll::Pending => Poll::Pending,
        }
    }
}
