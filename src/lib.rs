//! Write-once promises for composing results produced by independently
//! running units of work.
//!
//! A producer obtains a promise, starts its work on whatever thread or task
//! it likes, and eventually resolves the promise exactly once. Any number of
//! waiters observe the result through one of two flavors:
//!
//! * [`pair`] is a single-consumption pair. The first read takes the value
//!   and later reads see [`Error::NoResult`], which makes accidental
//!   double-read bugs observable.
//! * [`poly`] is a multi-read cell. The result is cached permanently and
//!   served to unlimited concurrent readers, with completion callbacks.
//!
//! A [`memo::Memoizer`] upgrades a `pair` consumer to multi-read without a
//! mutex, and [`combine`] waits across many pending results at once,
//! delivering them in completion order. [`then`] chains a completed result
//! into a fresh cell.
//!
//! ```
//! use futures::executor::block_on;
//! use promise_kit::{poly, CancelToken, Promise};
//! use std::thread;
//!
//! let (promise, consumer) = poly::Producer::<String>::new();
//! let waiter = consumer.clone();
//! let token = CancelToken::new();
//! let task = thread::spawn(move || block_on(waiter.wait(&token)));
//! promise.resolve("done".into());
//! assert_eq!(task.join().unwrap().unwrap(), "done");
//! ```

pub mod combine;
mod event;
pub mod memo;
pub mod pair;
pub mod poly;
pub mod then;
pub mod token;

pub use combine::{for_each, wait_all_results, wait_all_values, wait_first, Awaitable, WaitHandle};
pub use memo::Memoizer;
pub use then::{and_then, transform};
pub use token::{CancelToken, Cause};

use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Failure type accepted from producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal conditions a waiter can observe. Cloneable so one cached failure
/// can be served to unlimited readers.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A non-blocking query found the cell still pending.
    #[error("future not ready")]
    NotReady,
    /// The producer side went away without ever delivering a value, or the
    /// value was already consumed.
    #[error("no result")]
    NoResult,
    /// A wait was interrupted by a [`CancelToken`].
    #[error("wait canceled: {0}")]
    Canceled(Cause),
    /// The producer completed with an error.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a producer-supplied failure.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Error::Failed(Arc::from(error.into()))
    }
}

/// The write-once half of a promise/consumer pair, implemented by
/// [`pair::Producer`] and [`poly::Producer`].
///
/// Resolution consumes the producer, so a second resolution is normally
/// unrepresentable; the backing cell additionally treats a repeated
/// completion as a fatal programming error and panics.
pub trait Promise<T>: Sized {
    /// The read half created alongside this producer.
    type Waiter;

    fn new() -> (Self, Self::Waiter);

    /// Fulfills the promise with a value.
    fn resolve(self, value: T);

    /// Breaks the promise with an error.
    fn reject(self, error: impl Into<BoxError>);

    /// Runs `f` synchronously and resolves or rejects with its outcome.
    fn complete_with(self, f: impl FnOnce() -> Result<T, BoxError>) {
        match f() {
            Ok(value) => self.resolve(value),
            Err(error) => self.reject(error),
        }
    }

    /// Runs `f` on a new thread, returning the waiter immediately.
    ///
    /// ```
    /// use futures::executor::block_on;
    /// use promise_kit::{pair, Promise};
    ///
    /// let consumer = pair::Producer::spawn(|| Ok("ready".to_string()));
    /// assert_eq!(block_on(consumer).unwrap(), "ready");
    /// ```
    fn spawn<F>(f: F) -> Self::Waiter
    where
        Self: Send + 'static,
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
    {
        let (promise, waiter) = Self::new();
        thread::spawn(move || promise.complete_with(f));
        waiter
    }
}
