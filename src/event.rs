use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};

/// A one-shot broadcast signal: fires at most once and is observable by any
/// number of pollers. The fired flag is the lock-free fast path; the waker
/// list is only touched while the signal is still pending.
#[derive(Debug, Default)]
pub(crate) struct Event {
    fired: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fires the signal, waking every registered poller. Returns whether this
    /// call made the transition; at most one caller ever sees `true`.
    pub(crate) fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let wakers = mem::take(&mut *self.wakers.lock().unwrap());
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Registers `cx` unless the signal already fired. The flag is re-checked
    /// under the waker lock so a concurrent `fire` cannot miss the waker.
    pub(crate) fn poll_fired(&self, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_fired() {
            return Poll::Ready(());
        }
        let mut wakers = self.wakers.lock().unwrap();
        if self.is_fired() {
            return Poll::Ready(());
        }
        wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::Event;
    use futures::task::noop_waker_ref;
    use std::task::{Context, Poll};

    #[test]
    fn fires_exactly_once() {
        let event = Event::new();
        assert!(!event.is_fired());
        assert!(event.fire());
        assert!(!event.fire());
        assert!(event.is_fired());
    }

    #[test]
    fn poll_after_fire_is_ready() {
        let event = Event::new();
        let mut cx = Context::from_waker(noop_waker_ref());
        assert_eq!(event.poll_fired(&mut cx), Poll::Pending);
        event.fire();
        assert_eq!(event.poll_fired(&mut cx), Poll::Ready(()));
    }
}
