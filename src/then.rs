//! Chains a completed result into a fresh cell.
//!
//! Both combinators short-circuit a failed source: the original error is
//! propagated into the new cell without invoking the transform.

use std::thread;

use crate::poly;
use crate::{BoxError, Promise};

/// Applies `f` to the source's value once it resolves, producing a new cell
/// completed with `f`'s outcome. `f` runs synchronously inside whichever
/// thread resolves the source (or on the caller's thread if the source has
/// already completed).
///
/// # Examples
///
/// ```
/// use futures::executor::block_on;
/// use promise_kit::{poly::Producer, then, Promise};
///
/// let (promise, consumer) = Producer::<i32>::new();
/// let doubled = then::transform(&consumer, |value| Ok(value * 2));
/// promise.resolve(21);
/// assert_eq!(block_on(doubled).unwrap(), 42);
/// ```
pub fn transform<T, S, F>(source: &poly::Consumer<T>, f: F) -> poly::Consumer<S>
where
    T: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
    F: FnOnce(T) -> Result<S, BoxError> + Send + 'static,
{
    let (promise, consumer) = poly::Producer::new();
    source.on_complete(move |result| match result {
        Ok(value) => promise.complete_with(|| f(value.clone())),
        Err(error) => promise.settle(Err(error.clone())),
    });
    consumer
}

/// Like [`transform`], but evaluates `f` on a newly spawned thread so the
/// resolving thread is not held up by the transform's cost. Cancellation
/// never interrupts a transform already in flight.
pub fn and_then<T, S, F>(source: &poly::Consumer<T>, f: F) -> poly::Consumer<S>
where
    T: Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
    F: FnOnce(T) -> Result<S, BoxError> + Send + 'static,
{
    let (promise, consumer) = poly::Producer::new();
    source.on_complete(move |result| {
        let result = result.clone();
        thread::spawn(move || match result {
            Ok(value) => promise.complete_with(|| f(value)),
            Err(error) => promise.settle(Err(error)),
        });
    });
    consumer
}
