//! Lock-free adaptor that lets any number of concurrent readers observe a
//! single-consumption handoff.
//!
//! A mutex around the source would serialize the common already-resolved
//! path and still leave "closed without a value" ambiguous: a reader that
//! finds the handoff closed cannot tell whether it lost the race to another
//! reader or the producer never delivered anything. Instead every reader
//! races to claim the source directly, and a counter of in-flight racers
//! elects the one reader responsible for settling the cell when the source
//! closes empty: last one out resolves.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{ready, Context, Poll};

use crate::combine::{Awaitable, WaitHandle};
use crate::event::Event;
use crate::pair::{Claim, Consumer};
use crate::token::CancelToken;
use crate::Error;

/// Caches the result of a [`pair::Consumer`](crate::pair::Consumer) and
/// serves it to unlimited subsequent and concurrent readers.
///
/// Clones observe the same cell. Once the done signal has fired, every read
/// is a lock-free load of the cached result.
///
/// # Examples
///
/// ```
/// use futures::executor::block_on;
/// use promise_kit::{pair::Producer, CancelToken, Promise};
/// use std::thread;
///
/// let (promise, consumer) = Producer::<i32>::new();
/// let memo = consumer.memoize();
/// let token = CancelToken::new();
///
/// let readers: Vec<_> = (0..4)
///     .map(|_| {
///         let memo = memo.clone();
///         let token = token.clone();
///         thread::spawn(move || block_on(memo.wait(&token)))
///     })
///     .collect();
/// promise.resolve(1);
/// for reader in readers {
///     assert_eq!(reader.join().unwrap().unwrap(), 1);
/// }
/// ```
pub struct Memoizer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Memoizer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<T> {
    source: Consumer<T>,
    /// Readers currently racing to claim the source. Touched only through
    /// atomic increment, decrement and compare-and-swap.
    running: AtomicUsize,
    done: Event,
    /// Valid only once `done` has fired; written by exactly one reader.
    cell: OnceLock<Result<T, Error>>,
}

/// Where one registered reader stands in the race.
enum State {
    /// Counted in `running`, still trying to claim the source.
    Racing,
    /// Left the race after finding the source exhausted; another racer (or a
    /// releasing one) will fire the done signal.
    Parked,
    /// The cell is settled as far as this reader is concerned.
    Settled,
}

/// One registered reader. Dropping it before completion retracts the
/// registration, handing off the settling duty if it was the last racer.
struct Entry<'a, T> {
    shared: &'a Shared<T>,
    state: State,
}

impl<T> Memoizer<T> {
    pub(crate) fn new(source: Consumer<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                running: AtomicUsize::new(0),
                done: Event::new(),
                cell: OnceLock::new(),
            }),
        }
    }

    /// Waits for the result or for `token` to fire, whichever happens first.
    /// Any number of concurrent callers observe the identical result.
    pub fn wait<'a>(&'a self, token: &'a CancelToken) -> Wait<'a, T> {
        Wait {
            entry: self.shared.enter(),
            token,
        }
    }

    /// Non-blocking read: the cached result once available, otherwise
    /// [`Error::NotReady`].
    pub fn try_get(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        self.shared.try_get()
    }

    #[cfg(test)]
    pub(crate) fn running(&self) -> usize {
        self.shared.running.load(Ordering::SeqCst)
    }
}

impl<T> Shared<T> {
    fn enter(&self) -> Entry<'_, T> {
        if self.done.is_fired() {
            return Entry {
                shared: self,
                state: State::Settled,
            };
        }
        self.running.fetch_add(1, Ordering::SeqCst);
        Entry {
            shared: self,
            state: State::Racing,
        }
    }

    fn cached(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        self.cell
            .get()
            .cloned()
            .expect("fired done signal implies a cached result")
    }

    /// Settles the cell and fires the done signal. The race protocol
    /// guarantees a single writer.
    fn settle(&self, result: Result<T, Error>) {
        assert!(self.cell.set(result).is_ok(), "memoized result written twice");
        self.done.fire();
    }

    /// Drives one racing reader. `state` is the reader's own registration;
    /// the counter tracks how many registrations are still racing.
    fn poll_race(&self, state: &mut State, cx: &mut Context<'_>) -> Poll<()> {
        loop {
            match state {
                State::Settled => return Poll::Ready(()),
                State::Parked => {
                    ready!(self.done.poll_fired(cx));
                    *state = State::Settled;
                }
                State::Racing => {
                    if self.done.is_fired() {
                        // Someone else settled while we were queued; retract.
                        self.running.fetch_sub(1, Ordering::SeqCst);
                        *state = State::Settled;
                        continue;
                    }
                    match self.source.claim(Some(cx.waker())) {
                        Claim::Value(result) => {
                            self.settle(result);
                            self.running.fetch_sub(1, Ordering::SeqCst);
                            *state = State::Settled;
                        }
                        Claim::Exhausted => {
                            // Lost the race, or the producer left empty. A
                            // nonzero remainder after decrementing means a
                            // racer is still in flight and will settle the
                            // cell; reaching zero makes us a candidate to
                            // settle it ourselves, unless a newcomer slips
                            // in between the decrement and the swap.
                            if self.running.fetch_sub(1, Ordering::SeqCst) == 1
                                && self
                                    .running
                                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                                    .is_ok()
                            {
                                if !self.done.is_fired() {
                                    self.settle(Err(Error::NoResult));
                                }
                                self.running.fetch_sub(1, Ordering::SeqCst);
                                *state = State::Settled;
                            } else {
                                *state = State::Parked;
                            }
                        }
                        Claim::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }

    /// Retracts one racing registration without claiming anything. A reader
    /// that proves itself last takes over the settling duty from whatever
    /// terminal state the source is in, so parked readers are never
    /// stranded; a still-pending source is left untouched.
    fn leave_race(&self) {
        if self.running.fetch_sub(1, Ordering::SeqCst) == 1
            && self
                .running
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            if !self.done.is_fired() {
                match self.source.claim(None) {
                    Claim::Value(result) => self.settle(result),
                    Claim::Exhausted => self.settle(Err(Error::NoResult)),
                    Claim::Pending => {}
                }
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn try_get(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        if self.done.is_fired() {
            return self.cached();
        }
        self.running.fetch_add(1, Ordering::SeqCst);
        match self.source.claim(None) {
            Claim::Value(result) => {
                self.settle(result);
                self.running.fetch_sub(1, Ordering::SeqCst);
                self.cached()
            }
            Claim::Pending => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                Err(Error::NotReady)
            }
            Claim::Exhausted => {
                if self.running.fetch_sub(1, Ordering::SeqCst) == 1
                    && self
                        .running
                        .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                {
                    if !self.done.is_fired() {
                        self.settle(Err(Error::NoResult));
                    }
                    self.running.fetch_sub(1, Ordering::SeqCst);
                    self.cached()
                } else if self.done.is_fired() {
                    self.cached()
                } else {
                    // Another registration still holds the settling duty and
                    // may not be making progress right now. Never wait on it.
                    Err(Error::NotReady)
                }
            }
        }
    }
}

impl<'a, T> Entry<'a, T> {
    fn poll_done(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Entry { shared, state } = self;
        shared.poll_race(state, cx)
    }
}

impl<T> Drop for Entry<'_, T> {
    fn drop(&mut self) {
        if let State::Racing = self.state {
            self.shared.leave_race();
        }
    }
}

/// Future returned by [`Memoizer::wait`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Wait<'a, T> {
    entry: Entry<'a, T>,
    token: &'a CancelToken,
}

impl<T: Clone> Future for Wait<'_, T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.entry.poll_done(cx).is_ready() {
            return Poll::Ready(this.entry.shared.cached());
        }
        match this.token.poll_canceled(cx) {
            Poll::Ready(cause) => Poll::Ready(Err(Error::Canceled(cause))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Clone> Awaitable<T> for Memoizer<T> {
    fn subscribe(&self) -> Box<dyn WaitHandle<T> + '_> {
        Box::new(MemoHandle {
            entry: self.shared.enter(),
        })
    }
}

struct MemoHandle<'a, T> {
    entry: Entry<'a, T>,
}

impl<T: Clone> WaitHandle<T> for MemoHandle<'_, T> {
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<T, Error>> {
        match self.entry.poll_done(cx) {
            Poll::Ready(()) => Poll::Ready(self.entry.shared.cached()),
            Poll::Pending => Poll::Pending,
        }
    }
}
