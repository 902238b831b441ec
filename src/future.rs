//! Awaiting a [`Deferred`] from async code.
//!
//! The crate schedules nothing itself; a [`Settled`] future just parks its
//! waker on the deferred and is woken by whoever settles it. Any number of
//! futures may wait on the same deferred; each keeps one waker slot, which
//! it gives back when dropped.
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::deferred::State;
use crate::Deferred;

/// Resolves to a copy of the deferred's outcome.
///
/// # Examples
///
/// ```
/// use promise_chain::Deferred;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let d = Deferred::<String, String>::new();
/// let waiter = d.settled();
/// let task = thread::spawn(move || block_on(waiter));
/// d.resolve("Hi".into()).unwrap();
/// assert_eq!(task.join().unwrap(), Ok("Hi".to_string()));
/// ```
#[derive(Debug)]
pub struct Settled<T, E> {
    deferred: Deferred<T, E>,
    waiter: Option<u64>,
}

impl<T, E> Clone for Settled<T, E> {
    /// The clone waits on the same deferred under its own waker slot.
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
            waiter: None,
        }
    }
}

impl<T, E> Drop for Settled<T, E> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter.take() {
            self.deferred.lock().wakers.remove(&id);
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn settled(&self) -> Settled<T, E> {
        Settled {
            deferred: self.clone(),
            waiter: None,
        }
    }
}

impl<T: Clone, E: Clone> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut guard = this.deferred.lock();
        let inner = &mut *guard;
        match &inner.state {
            State::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(err) => Poll::Ready(Err(err.clone())),
            State::Pending(_) => {
                let id = *this.waiter.get_or_insert_with(|| {
                    inner.next_waiter += 1;
                    inner.next_waiter
                });
                let stale = inner
                    .wakers
                    .get(&id)
                    .map_or(true, |parked| !parked.will_wake(cx.waker()));
                if stale {
                    inner.wakers.insert(id, cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
