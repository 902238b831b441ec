use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Waker;
use std::vec;

use crate::dependent::Dependent;
use crate::drain::{self, Frame, Job};
use crate::{Error, IntoDeferred, Status};

fn outcome_status<T, E>(outcome: &Result<T, E>) -> Status {
    if outcome.is_ok() {
        Status::Fulfilled
    } else {
        Status::Rejected
    }
}

/// A settlement whose dependents are being fired by the drain.
struct Dispatch<T, E> {
    deferred: Deferred<T, E>,
    outcome: Result<T, E>,
    dependents: vec::IntoIter<Dependent<T, E>>,
    invocations: Vec<Status>,
}

impl<T, E> Frame for Dispatch<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn next_job(&mut self) -> Option<Job> {
        let dependent = self.dependents.next()?;
        let outcome = self.outcome.clone();
        Some(Box::new(move || dependent.fire(outcome)))
    }

    fn record(&mut self, status: Status) {
        self.invocations.push(status);
    }

    fn finish(self: Box<Self>) {
        let Dispatch {
            deferred,
            outcome,
            invocations,
            ..
        } = *self;
        deferred.lock().history.push(SettlementRecord {
            status: outcome_status(&outcome),
            invocations,
        });
    }
}

/// A failure callback for [`Deferred::then`]. Passing `None` instead
/// forwards the error unchanged into the derived deferred.
pub type FailureHandler<E, R> = Box<dyn FnOnce(E) -> R + Send>;

type Step<V, U, E2> = Box<dyn FnOnce(V) -> Deferred<U, E2> + Send>;

/// What one settlement did: the outcome, and for each dependent that was
/// queued at the time, the status of the deferred its callback produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRecord {
    pub status: Status,
    pub invocations: Vec<Status>,
}

pub(crate) enum State<T, E> {
    Pending(Vec<Dependent<T, E>>),
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    fn status(&self) -> Status {
        match self {
            State::Pending(_) => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }
}

pub(crate) struct Inner<T, E> {
    pub(crate) state: State<T, E>,
    /// Parked futures, keyed by the id each `Settled` took on first poll.
    pub(crate) wakers: HashMap<u64, Waker>,
    pub(crate) next_waiter: u64,
    history: Vec<SettlementRecord>,
}

/// The eventual outcome of a computation, either a `T` or an `E`.
///
/// Cloning a `Deferred` clones the handle, not the outcome: every clone
/// observes and settles the same state.
///
/// # Examples
///
/// ```
/// use promise_chain::{Deferred, Status};
///
/// let d = Deferred::<i32, String>::new();
/// let inner = Deferred::<i32, String>::new();
/// let hand_off = inner.clone();
/// let r = d.then(move |_| hand_off, None);
///
/// d.resolve(1).unwrap();
/// assert_eq!(r.status(), Status::Pending);
///
/// inner.resolve(99).unwrap();
/// assert_eq!(r.value(), Some(Ok(99)));
/// ```
pub struct Deferred<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        let queued = match &inner.state {
            State::Pending(queue) => queue.len(),
            _ => 0,
        };
        f.debug_struct("Deferred")
            .field("status", &inner.state.status())
            .field("queued", &queued)
            .finish()
    }
}

impl<T, E> Deferred<T, E> {
    /// A pending deferred with nothing queued on it.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending(Vec::new()),
                wakers: HashMap::new(),
                next_waiter: 0,
                history: Vec::new(),
            })),
        }
    }

    pub fn status(&self) -> Status {
        self.lock().state.status()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    pub fn is_settled(&self) -> bool {
        self.status().is_settled()
    }

    /// True when both handles share the same state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Settlements that had dependents queued, oldest first. Only useful for
    /// introspection; nothing in the crate reads it back.
    pub fn history(&self) -> Vec<SettlementRecord> {
        self.lock().history.clone()
    }

    /// Callbacks never run while this guard is alive.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// A deferred that is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        Self::settled_with(State::Fulfilled(value))
    }

    /// A deferred that is already rejected with `err`.
    pub fn rejected(err: E) -> Self {
        Self::settled_with(State::Rejected(err))
    }

    fn settled_with(state: State<T, E>) -> Self {
        let deferred = Self::new();
        deferred.lock().state = state;
        deferred
    }

    /// Fulfills the deferred and runs every queued dependent, oldest first.
    ///
    /// Fails with [`Error::AlreadySettled`] if the deferred has already been
    /// resolved or rejected; the first outcome is kept.
    pub fn resolve(&self, value: T) -> Result<(), Error<T, E>> {
        self.settle(Ok(value))
    }

    /// Rejects the deferred and runs every queued dependent, oldest first.
    ///
    /// Fails with [`Error::AlreadySettled`] under the same rule as
    /// [`Deferred::resolve`].
    pub fn reject(&self, err: E) -> Result<(), Error<T, E>> {
        self.settle(Err(err))
    }

    fn settle(&self, outcome: Result<T, E>) -> Result<(), Error<T, E>> {
        if let Some(dispatch) = self.transition(outcome)? {
            drain::run(Box::new(dispatch));
        }
        Ok(())
    }

    /// Settles on behalf of a deferred this one was following. Inside a
    /// running drain the dependents wait their turn instead of recursing.
    pub(crate) fn settle_forwarded(&self, outcome: Result<T, E>) -> Result<(), Error<T, E>> {
        if let Some(dispatch) = self.transition(outcome)? {
            drain::schedule(Box::new(dispatch));
        }
        Ok(())
    }

    /// Moves out of `Pending` and wakes waiting futures. Returns the queued
    /// dependents, if any, still to be fired.
    fn transition(&self, outcome: Result<T, E>) -> Result<Option<Dispatch<T, E>>, Error<T, E>> {
        let (dependents, wakers) = {
            let mut inner = self.lock();
            let dependents = match &mut inner.state {
                State::Pending(queue) => mem::take(queue),
                settled => {
                    let status = settled.status();
                    tracing::debug!(%status, "refusing to settle a deferred twice");
                    return Err(Error::AlreadySettled {
                        status,
                        attempted: outcome,
                    });
                }
            };
            inner.state = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(err) => State::Rejected(err.clone()),
            };
            (dependents, mem::take(&mut inner.wakers))
        };
        tracing::trace!(
            status = %outcome_status(&outcome),
            dependents = dependents.len(),
            "deferred settled"
        );

        for waker in wakers.into_values() {
            waker.wake();
        }
        if dependents.is_empty() {
            return Ok(None);
        }
        Ok(Some(Dispatch {
            deferred: self.clone(),
            invocations: Vec::with_capacity(dependents.len()),
            dependents: dependents.into_iter(),
            outcome,
        }))
    }

    /// Queues `dependent` while pending. Once settled, hands it back with a
    /// copy of the outcome so the caller can fire it without the lock.
    fn enqueue(&self, dependent: Dependent<T, E>) -> Option<(Dependent<T, E>, Result<T, E>)> {
        let mut inner = self.lock();
        match &mut inner.state {
            State::Pending(queue) => {
                queue.push(dependent);
                tracing::trace!(queued = queue.len(), "dependent registered");
                None
            }
            State::Fulfilled(value) => Some((dependent, Ok(value.clone()))),
            State::Rejected(err) => Some((dependent, Err(err.clone()))),
        }
    }

    fn register(&self, dependent: Dependent<T, E>) {
        if let Some((dependent, outcome)) = self.enqueue(dependent) {
            dependent.fire(outcome);
        }
    }

    /// Makes `self` settle the way `source` does, now or later, and reports
    /// where `source` stands afterwards.
    fn follow(&self, source: Deferred<T, E>) -> Status {
        source.register(Dependent::Forward(self.clone()));
        source.status()
    }

    /// Registers a success callback and an optional failure callback and
    /// returns the deferred that tracks whichever one runs.
    ///
    /// Callbacks may return anything [`IntoDeferred`]: a `Result`, a
    /// [`Resolution`](crate::Resolution), or another `Deferred`, in which
    /// case the returned deferred settles only when that one does. A
    /// deferred wrapped in `Ok` is not flattened; it becomes the value. Without a
    /// failure callback the error passes through unchanged. If `self` is
    /// already settled the matching callback runs before `then` returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Deferred, Status};
    ///
    /// let d = Deferred::<i32, String>::new();
    /// d.reject("boom".to_string()).unwrap();
    ///
    /// let r = d.then(|x| Ok(x), None);
    /// assert_eq!(r.value(), Some(Err("boom".to_string())));
    ///
    /// let recovered = d.then(|x| Ok(x), Some(Box::new(|e: String| Ok(e.len() as i32))));
    /// assert_eq!(recovered.value(), Some(Ok(4)));
    /// ```
    pub fn then<R, F>(
        &self,
        on_success: F,
        on_failure: Option<FailureHandler<E, R>>,
    ) -> Deferred<R::Value, E>
    where
        F: FnOnce(T) -> R + Send + 'static,
        R: IntoDeferred<Error = E> + 'static,
        R::Value: Clone + Send + 'static,
    {
        let on_rejected: Step<E, R::Value, E> = match on_failure {
            Some(handler) => Box::new(move |err| handler(err).into_deferred()),
            None => Box::new(|err| Deferred::rejected(err)),
        };
        self.chain(Box::new(move |value| on_success(value).into_deferred()), on_rejected)
    }

    /// Transforms the success value; errors pass through.
    pub fn map<U, F>(&self, f: F) -> Deferred<U, E>
    where
        F: FnOnce(T) -> U + Send + 'static,
        U: Clone + Send + 'static,
    {
        self.then(move |value| Ok::<U, E>(f(value)), None)
    }

    /// Continues with another deferred once this one is fulfilled.
    pub fn and_then<U, F>(&self, f: F) -> Deferred<U, E>
    where
        F: FnOnce(T) -> Deferred<U, E> + Send + 'static,
        U: Clone + Send + 'static,
    {
        self.then(f, None)
    }

    /// Handles a rejection; a success value passes through untouched.
    pub fn catch<R, F>(&self, f: F) -> Deferred<T, E>
    where
        F: FnOnce(E) -> R + Send + 'static,
        R: IntoDeferred<Value = T, Error = E>,
    {
        self.chain(
            Box::new(|value| Deferred::fulfilled(value)),
            Box::new(move |err| f(err).into_deferred()),
        )
    }

    /// Transforms the error; success values pass through.
    pub fn map_err<E2, F>(&self, f: F) -> Deferred<T, E2>
    where
        F: FnOnce(E) -> E2 + Send + 'static,
        E2: Clone + Send + 'static,
    {
        self.chain(
            Box::new(|value| Deferred::fulfilled(value)),
            Box::new(move |err| Deferred::rejected(f(err))),
        )
    }

    fn chain<U, E2>(
        &self,
        on_fulfilled: Step<T, U, E2>,
        on_rejected: Step<E, U, E2>,
    ) -> Deferred<U, E2>
    where
        U: Clone + Send + 'static,
        E2: Clone + Send + 'static,
    {
        let result = Deferred::new();
        let (ok_target, err_target) = (result.clone(), result.clone());
        self.register(Dependent::Handlers {
            on_fulfilled: Box::new(move |value| ok_target.follow(on_fulfilled(value))),
            on_rejected: Box::new(move |err| err_target.follow(on_rejected(err))),
        });
        result
    }

    /// A copy of the settled outcome, or `None` while pending.
    pub fn value(&self) -> Option<Result<T, E>> {
        match &self.lock().state {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(err) => Some(Err(err.clone())),
        }
    }
}
