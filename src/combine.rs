//! Fan-in over an arbitrary list of pending results plus a cancellation
//! token, delivering each result as it becomes ready.
//!
//! # Examples
//!
//! ```
//! use futures::executor::block_on;
//! use promise_kit::{combine, poly, Awaitable, CancelToken, Promise};
//!
//! let (p1, c1) = poly::Producer::new();
//! let (p2, c2) = poly::Producer::new();
//! p1.resolve(1);
//! p2.resolve(2);
//!
//! let token = CancelToken::new();
//! let items: Vec<&dyn Awaitable<i32>> = vec![&c1, &c2];
//! let results = block_on(combine::wait_all_results(&token, &items)).unwrap();
//! assert_eq!(results.into_iter().map(Result::unwrap).collect::<Vec<_>>(), [1, 2]);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::token::{CancelToken, Cause};
use crate::Error;

/// Capability the fan-in engine needs from an item. An implementation
/// supplies a done signal and an accessor for the terminal result.
/// Implemented by [`poly::Consumer`](crate::poly::Consumer) and
/// [`Memoizer`](crate::memo::Memoizer).
pub trait Awaitable<T> {
    /// Registers one waiter. Dropping the handle before it yields retracts
    /// the registration.
    fn subscribe(&self) -> Box<dyn WaitHandle<T> + '_>;
}

/// One registered wait; yields the item's terminal result once its done
/// signal has fired.
pub trait WaitHandle<T> {
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<T, Error>>;
}

/// Waits across `items`, invoking `on_ready(index, result)` for each item as
/// it becomes ready. The order among simultaneously-ready items is
/// unspecified.
///
/// `on_ready` returning `false` stops the iteration; every registration not
/// yet observed is retracted. If `token` fires first, all remaining
/// registrations are retracted, each unobserved index is delivered a
/// cancellation error, and that error is returned. An empty `items` list
/// returns immediately.
pub async fn for_each<'a, T>(
    token: &CancelToken,
    items: &'a [&'a dyn Awaitable<T>],
    mut on_ready: impl FnMut(usize, Result<T, Error>) -> bool,
) -> Result<(), Error> {
    let mut handles: Vec<Option<Box<dyn WaitHandle<T> + 'a>>> =
        items.iter().map(|item| Some(item.subscribe())).collect();
    let mut remaining = handles.len();
    let mut start = 0;

    while remaining > 0 {
        let next = NextReady {
            token,
            handles: &mut handles,
            start,
        };
        match next.await {
            Ok((chosen, result)) => {
                handles[chosen] = None;
                remaining -= 1;
                start = chosen + 1;
                if !on_ready(chosen, result) {
                    // Retract the unconsumed registrations before returning.
                    handles.clear();
                    return Ok(());
                }
            }
            Err(cause) => {
                let unobserved: Vec<usize> = handles
                    .iter()
                    .enumerate()
                    .filter_map(|(index, handle)| handle.is_some().then_some(index))
                    .collect();
                handles.clear();
                for index in unobserved {
                    if !on_ready(index, Err(Error::Canceled(cause.clone()))) {
                        break;
                    }
                }
                return Err(Error::Canceled(cause));
            }
        }
    }
    Ok(())
}

/// Resolves to the next ready item, or to the cancellation cause.
struct NextReady<'a, 'b, T> {
    token: &'a CancelToken,
    handles: &'a mut Vec<Option<Box<dyn WaitHandle<T> + 'b>>>,
    start: usize,
}

impl<T> Future for NextReady<'_, '_, T> {
    type Output = Result<(usize, Result<T, Error>), Cause>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Poll::Ready(cause) = this.token.poll_canceled(cx) {
            return Poll::Ready(Err(cause));
        }
        // The scan rotates so ties do not systematically favor low indices.
        let len = this.handles.len();
        for offset in 0..len {
            let index = (this.start + offset) % len;
            if let Some(handle) = this.handles[index].as_mut() {
                if let Poll::Ready(result) = handle.poll_ready(cx) {
                    return Poll::Ready(Ok((index, result)));
                }
            }
        }
        Poll::Pending
    }
}

/// Collects every item's result, success or failure, into an index-aligned
/// vector. Individual failures never short-circuit; only cancellation does.
pub async fn wait_all_results<T>(
    token: &CancelToken,
    items: &[&dyn Awaitable<T>],
) -> Result<Vec<Result<T, Error>>, Error> {
    let mut results: Vec<Option<Result<T, Error>>> = Vec::new();
    results.resize_with(items.len(), || None);

    for_each(token, items, |index, result| {
        results[index] = Some(result);
        true
    })
    .await?;

    Ok(results
        .into_iter()
        .map(|result| result.expect("every index yields exactly once"))
        .collect())
}

/// Collects every item's value into an index-aligned vector, stopping at the
/// first failure and returning it directly. The remaining registrations are
/// retracted, not resolved.
pub async fn wait_all_values<T>(
    token: &CancelToken,
    items: &[&dyn Awaitable<T>],
) -> Result<Vec<T>, Error> {
    let mut values: Vec<Option<T>> = Vec::new();
    values.resize_with(items.len(), || None);
    let mut failure = None;

    for_each(token, items, |index, result| match result {
        Ok(value) => {
            values[index] = Some(value);
            true
        }
        Err(error) => {
            failure = Some(error);
            false
        }
    })
    .await?;

    if let Some(error) = failure {
        return Err(error);
    }
    Ok(values
        .into_iter()
        .map(|value| value.expect("every item yielded a value"))
        .collect())
}

/// Returns the first ready item's result, success or failure. An empty list
/// is trivially done and yields the default value.
pub async fn wait_first<T: Default>(
    token: &CancelToken,
    items: &[&dyn Awaitable<T>],
) -> Result<T, Error> {
    let mut first = None;

    for_each(token, items, |_, result| {
        first = Some(result);
        false
    })
    .await?;

    match first {
        Some(result) => result,
        None => Ok(T::default()),
    }
}
