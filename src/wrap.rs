use crate::Deferred;

/// Anything a `then` callback may hand back.
///
/// A `Deferred` converts to itself, so returning one from a callback makes
/// the derived deferred wait for it instead of settling to a deferred.
/// A `Result` is always a plain value: `Ok(deferred)` settles to the
/// deferred itself. Return the `Deferred`, or a [`Resolution::Deferred`],
/// to get the flattened outcome.
pub trait IntoDeferred {
    type Value;
    type Error;

    fn into_deferred(self) -> Deferred<Self::Value, Self::Error>;
}

impl<T, E> IntoDeferred for Deferred<T, E> {
    type Value = T;
    type Error = E;

    fn into_deferred(self) -> Deferred<T, E> {
        self
    }
}

impl<T, E> IntoDeferred for Result<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Value = T;
    type Error = E;

    fn into_deferred(self) -> Deferred<T, E> {
        match self {
            Ok(value) => Deferred::fulfilled(value),
            Err(err) => Deferred::rejected(err),
        }
    }
}

/// Either a plain value or a deferred one, for callbacks that produce both
/// on different paths.
#[derive(Debug, Clone)]
pub enum Resolution<T, E> {
    Value(T),
    Deferred(Deferred<T, E>),
}

impl<T, E> From<Deferred<T, E>> for Resolution<T, E> {
    fn from(deferred: Deferred<T, E>) -> Self {
        Resolution::Deferred(deferred)
    }
}

impl<T, E> IntoDeferred for Resolution<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Value = T;
    type Error = E;

    fn into_deferred(self) -> Deferred<T, E> {
        match self {
            Resolution::Value(value) => Deferred::fulfilled(value),
            Resolution::Deferred(deferred) => deferred,
        }
    }
}

/// Normalizes `x` into a deferred. An existing deferred comes back as the
/// very same handle; a plain value becomes an already fulfilled one.
///
/// ```
/// use promise_chain::{wrap, Deferred};
///
/// let d = Deferred::<i32, String>::new();
/// assert!(wrap(d.clone()).ptr_eq(&d));
/// assert_eq!(wrap(Ok::<i32, String>(3)).value(), Some(Ok(3)));
/// ```
pub fn wrap<R: IntoDeferred>(x: R) -> Deferred<R::Value, R::Error> {
    x.into_deferred()
}
