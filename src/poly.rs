//! Multi-read resolution cell: one writer, unlimited concurrent readers.
//!
//! The result is stored exactly once, a done signal fires, and from then on
//! every reader (including clones of the consumer) observes the identical
//! cached result. Callbacks registered before completion run synchronously
//! inside whichever thread performs the resolution, in registration order;
//! callbacks registered afterwards run immediately on the caller's thread.
//!
//! # Examples
//!
//! ```
//! use futures::executor::block_on;
//! use promise_kit::{poly::Producer, Promise};
//! use std::thread;
//!
//! let (promise, consumer) = Producer::<String>::new();
//! let second = consumer.clone();
//! let task1 = thread::spawn(move || block_on(consumer));
//! let task2 = thread::spawn(move || block_on(second));
//! promise.resolve("hi".into());
//! assert_eq!(task1.join().unwrap().unwrap(), "hi");
//! assert_eq!(task2.join().unwrap().unwrap(), "hi");
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};

use crate::combine::{Awaitable, WaitHandle};
use crate::event::Event;
use crate::token::CancelToken;
use crate::{BoxError, Error, Promise};

type Callback<T> = Box<dyn FnOnce(&Result<T, Error>) + Send>;

/// The write half. Resolving consumes it; dropping it unresolved completes
/// the cell with [`Error::NoResult`].
pub struct Producer<T> {
    shared: Arc<Inner<T>>,
}

/// The read half. Clones observe the same cell.
pub struct Consumer<T> {
    shared: Arc<Inner<T>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Inner<T> {
    done: Event,
    result: OnceLock<Result<T, Error>>,
    /// Callbacks queued before completion; `None` once drained.
    callbacks: Mutex<Option<Vec<Callback<T>>>>,
}

impl<T> Inner<T> {
    /// The single resolution transition: store, signal, drain callbacks.
    /// Completing an already-completed cell is a fatal programming error.
    fn complete(&self, result: Result<T, Error>) {
        if self.result.set(result).is_err() {
            panic!("promise completed twice");
        }
        self.done.fire();
        let callbacks = self.callbacks.lock().unwrap().take();
        if let Some(callbacks) = callbacks {
            let result = self.result.get().expect("result was just stored");
            for callback in callbacks {
                callback(result);
            }
        }
    }

    fn cached(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        self.result
            .get()
            .cloned()
            .expect("completed cell holds a result")
    }
}

impl<T> Promise<T> for Producer<T> {
    type Waiter = Consumer<T>;

    fn new() -> (Self, Consumer<T>) {
        let shared = Arc::new(Inner {
            done: Event::new(),
            result: OnceLock::new(),
            callbacks: Mutex::new(Some(Vec::new())),
        });
        (
            Self {
                shared: shared.clone(),
            },
            Consumer { shared },
        )
    }

    fn resolve(self, value: T) {
        self.shared.complete(Ok(value));
    }

    fn reject(self, error: impl Into<BoxError>) {
        self.shared.complete(Err(Error::failed(error)));
    }
}

impl<T> Producer<T> {
    /// Completes with a ready-made result, preserving error variants exactly.
    pub(crate) fn settle(self, result: Result<T, Error>) {
        self.shared.complete(result);
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        if !self.shared.done.is_fired() {
            self.shared.complete(Err(Error::NoResult));
        }
    }
}

impl<T> Consumer<T> {
    /// Non-blocking read: [`Error::NotReady`] until the cell completes, then
    /// the cached result, any number of times.
    pub fn try_get(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        if self.shared.done.is_fired() {
            self.shared.cached()
        } else {
            Err(Error::NotReady)
        }
    }

    /// Waits for completion or for `token` to fire, whichever happens first.
    /// Safe to call concurrently from any number of readers; once the cell
    /// has completed, cancellation no longer has any effect.
    pub fn wait<'a>(&'a self, token: &'a CancelToken) -> Wait<'a, T> {
        Wait {
            consumer: self,
            token,
        }
    }

    /// Registers `f` to run exactly once with the final result: queued
    /// before completion (run inside the resolving thread, in registration
    /// order), or immediately on this thread if the cell already completed.
    pub fn on_complete(&self, f: impl FnOnce(&Result<T, Error>) + Send + 'static) {
        let mut callbacks = self.shared.callbacks.lock().unwrap();
        match callbacks.as_mut() {
            Some(queue) => queue.push(Box::new(f)),
            None => {
                drop(callbacks);
                let result = self
                    .shared
                    .result
                    .get()
                    .expect("drained queue implies a stored result");
                f(result);
            }
        }
    }
}

impl<T: Clone> Future for Consumer<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.shared.done.poll_fired(cx) {
            Poll::Ready(()) => Poll::Ready(self.shared.cached()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Future returned by [`Consumer::wait`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Wait<'a, T> {
    consumer: &'a Consumer<T>,
    token: &'a CancelToken,
}

impl<T: Clone> Future for Wait<'_, T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.consumer.shared.done.poll_fired(cx).is_ready() {
            return Poll::Ready(self.consumer.shared.cached());
        }
        match self.token.poll_canceled(cx) {
            Poll::Ready(cause) => Poll::Ready(Err(Error::Canceled(cause))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Clone> Awaitable<T> for Consumer<T> {
    fn subscribe(&self) -> Box<dyn WaitHandle<T> + '_> {
        Box::new(CellHandle {
            shared: self.shared.as_ref(),
        })
    }
}

struct CellHandle<'a, T> {
    shared: &'a Inner<T>,
}

impl<T: Clone> WaitHandle<T> for CellHandle<'_, T> {
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<T, Error>> {
        match self.shared.done.poll_fired(cx) {
            Poll::Ready(()) => Poll::Ready(self.shared.cached()),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Producer;
    use crate::token::CancelToken;
    use crate::{Error, Promise};
    use futures::executor::block_on;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn resolve_wakes_every_consumer() {
        let (promise, consumer) = Producer::<String>::new();
        let second = consumer.clone();
        let task1 = thread::spawn(move || block_on(consumer));
        let task2 = thread::spawn(move || block_on(second));
        let task3 = thread::spawn(move || promise.resolve("value".into()));

        task3.join().expect("the writer thread has panicked");
        assert_eq!(task1.join().unwrap().unwrap(), "value");
        assert_eq!(task2.join().unwrap().unwrap(), "value");
    }

    #[test]
    fn reject_is_served_to_every_reader() {
        let (promise, consumer) = Producer::<String>::new();
        promise.reject("boom");

        for _ in 0..3 {
            assert!(matches!(consumer.try_get(), Err(Error::Failed(_))));
        }
    }

    #[test]
    fn try_get_is_idempotent_once_resolved() {
        let (promise, consumer) = Producer::<i32>::new();
        assert!(matches!(consumer.try_get(), Err(Error::NotReady)));

        promise.resolve(7);
        assert_eq!(consumer.try_get().unwrap(), 7);
        assert_eq!(consumer.try_get().unwrap(), 7);
    }

    #[test]
    fn dropped_producer_completes_with_no_result() {
        let (promise, consumer) = Producer::<i32>::new();
        drop(promise);
        assert!(matches!(consumer.try_get(), Err(Error::NoResult)));
    }

    #[test]
    fn cancel_after_resolution_returns_the_cached_result() {
        let (promise, consumer) = Producer::<i32>::new();
        let token = CancelToken::new();
        promise.resolve(3);
        token.cancel("too late");

        assert_eq!(block_on(consumer.wait(&token)).unwrap(), 3);
    }

    #[test]
    fn canceled_wait_reports_the_cause() {
        let (_promise, consumer) = Producer::<i32>::new();
        let token = CancelToken::new();
        token.cancel("deadline");

        let result = block_on(consumer.wait(&token));
        assert!(matches!(result, Err(Error::Canceled(cause)) if cause.as_str() == "deadline"));
    }

    #[test]
    fn callbacks_run_in_registration_order_on_the_resolver() {
        let (promise, consumer) = Producer::<i32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            let registered_on = thread::current().id();
            consumer.on_complete(move |result| {
                assert_eq!(result.as_ref().unwrap(), &1);
                // Queued callbacks run inside the resolving thread.
                assert_ne!(thread::current().id(), registered_on);
                order.lock().unwrap().push(i);
            });
        }

        let resolver = thread::spawn(move || promise.resolve(1));
        resolver.join().expect("the resolver thread has panicked");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let (promise, consumer) = Producer::<i32>::new();
        promise.resolve(2);

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        consumer.on_complete(move |result| {
            *sink.lock().unwrap() = Some(result.as_ref().unwrap() * 10);
        });
        assert_eq!(*seen.lock().unwrap(), Some(20));
    }

    #[test]
    #[should_panic(expected = "promise completed twice")]
    fn double_resolution_is_fatal() {
        let (promise, consumer) = Producer::<i32>::new();
        promise.resolve(1);
        consumer.shared.complete(Ok(2));
    }

    #[test]
    #[should_panic(expected = "promise completed twice")]
    fn rejecting_a_resolved_cell_is_fatal() {
        let (promise, consumer) = Producer::<i32>::new();
        promise.resolve(1);
        consumer.shared.complete(Err(Error::failed("late failure")));
    }
}
