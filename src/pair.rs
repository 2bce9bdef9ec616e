//! Single-consumption promise/future pair.
//!
//! The value is handed to the first reader that claims it; every later read
//! surfaces [`Error::NoResult`] instead of blocking forever, which makes
//! accidental double-consumption observable. Wrap the consumer with
//! [`Consumer::memoize`] when many readers need the result.
//!
//! # Examples
//!
//! ```
//! use futures::executor::block_on;
//! use promise_kit::{pair::Producer, Promise};
//! use std::thread;
//!
//! let (promise, consumer) = Producer::<String>::new();
//! let task = thread::spawn(move || block_on(consumer));
//! promise.resolve("hi".into());
//! assert_eq!(task.join().unwrap().unwrap(), "hi");
//! ```

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::memo::Memoizer;
use crate::token::CancelToken;
use crate::{BoxError, Error, Promise};

/// The write half. Resolving consumes it; dropping it unresolved closes the
/// handoff empty.
#[derive(Debug)]
pub struct Producer<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

/// The read half. The first successful read takes the value.
#[derive(Debug)]
pub struct Consumer<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

#[derive(Debug)]
struct Inner<T> {
    value: Option<Result<T, Error>>,
    closed: bool,
    wakers: Vec<Waker>,
}

/// Outcome of one non-blocking attempt to claim the handoff.
pub(crate) enum Claim<T> {
    /// This reader won the race and now owns the result.
    Value(Result<T, Error>),
    /// The handoff will never deliver a value to this reader: another reader
    /// already drained it, or the producer went away empty. The two cases
    /// are indistinguishable here.
    Exhausted,
    /// The producer is still running.
    Pending,
}

impl<T> Promise<T> for Producer<T> {
    type Waiter = Consumer<T>;

    fn new() -> (Self, Consumer<T>) {
        let inner = Arc::new(Mutex::new(Inner {
            value: None,
            closed: false,
            wakers: Vec::new(),
        }));
        (
            Self {
                inner: inner.clone(),
            },
            Consumer { inner },
        )
    }

    fn resolve(self, value: T) {
        self.complete(Ok(value));
    }

    fn reject(self, error: impl Into<BoxError>) {
        self.complete(Err(Error::failed(error)));
    }
}

impl<T> Producer<T> {
    fn complete(&self, result: Result<T, Error>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            panic!("promise completed twice");
        }
        inner.value = Some(result);
        inner.closed = true;
        let wakers = mem::take(&mut inner.wakers);
        drop(inner);
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T> Drop for Producer<T> {
    /// An abandoned producer closes the handoff empty; readers observe
    /// [`Error::NoResult`] instead of blocking forever.
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        let wakers = mem::take(&mut inner.wakers);
        drop(inner);
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T> Consumer<T> {
    /// One attempt to claim the result, registering `waker` when the
    /// producer is still running.
    pub(crate) fn claim(&self, waker: Option<&Waker>) -> Claim<T> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(result) = inner.value.take() {
            return Claim::Value(result);
        }
        if inner.closed {
            return Claim::Exhausted;
        }
        if let Some(waker) = waker {
            inner.wakers.push(waker.clone());
        }
        Claim::Pending
    }

    /// Non-blocking read. Returns [`Error::NotReady`] while the producer is
    /// still running; the first successful call consumes the value and later
    /// calls see [`Error::NoResult`].
    pub fn try_get(&self) -> Result<T, Error> {
        match self.claim(None) {
            Claim::Value(result) => result,
            Claim::Exhausted => Err(Error::NoResult),
            Claim::Pending => Err(Error::NotReady),
        }
    }

    /// Waits for the result or for `token` to fire, whichever happens first.
    pub fn wait<'a>(&'a self, token: &'a CancelToken) -> Wait<'a, T> {
        Wait {
            consumer: self,
            token,
        }
    }

    /// Hands this consumer to a [`Memoizer`] so unlimited readers can
    /// observe the result.
    pub fn memoize(self) -> Memoizer<T> {
        Memoizer::new(self)
    }
}

impl<T> Future for Consumer<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.claim(Some(cx.waker())) {
            Claim::Value(result) => Poll::Ready(result),
            Claim::Exhausted => Poll::Ready(Err(Error::NoResult)),
            Claim::Pending => Poll::Pending,
        }
    }
}

/// Future returned by [`Consumer::wait`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct Wait<'a, T> {
    consumer: &'a Consumer<T>,
    token: &'a CancelToken,
}

impl<T> Future for Wait<'_, T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.consumer.claim(Some(cx.waker())) {
            Claim::Value(result) => return Poll::Ready(result),
            Claim::Exhausted => return Poll::Ready(Err(Error::NoResult)),
            Claim::Pending => {}
        }
        match self.token.poll_canceled(cx) {
            Poll::Ready(cause) => Poll::Ready(Err(Error::Canceled(cause))),
            Poll::Pending => Poll::Pending,
        }
    }
}
