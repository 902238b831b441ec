use crate::{Deferred, Status};

pub(crate) type OnFulfilled<T> = Box<dyn FnOnce(T) -> Status + Send>;
pub(crate) type OnRejected<E> = Box<dyn FnOnce(E) -> Status + Send>;

/// Work queued on a pending [`Deferred`], consumed once when it settles.
pub(crate) enum Dependent<T, E> {
    /// A `then` registration. Each side returns the status of the deferred
    /// its callback produced.
    Handlers {
        on_fulfilled: OnFulfilled<T>,
        on_rejected: OnRejected<E>,
    },
    /// Copy the outcome into another deferred. Used to flatten a deferred
    /// returned from a callback into the `then` result.
    Forward(Deferred<T, E>),
}

impl<T, E> Dependent<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Runs the side matching `outcome`; the other side is dropped unused.
    pub(crate) fn fire(self, outcome: Result<T, E>) -> Status {
        match self {
            Dependent::Handlers {
                on_fulfilled,
                on_rejected,
            } => match outcome {
                Ok(value) => on_fulfilled(value),
                Err(err) => on_rejected(err),
            },
            Dependent::Forward(target) => {
                if let Err(err) = target.settle_forwarded(outcome) {
                    tracing::warn!(
                        status = %err.status(),
                        "dropping forwarded outcome, target deferred was settled elsewhere"
                    );
                }
                target.status()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Dependent;
    use crate::{Deferred, Status};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[test]
    fn handlers_only_run_the_matching_side() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (ok_seen, err_seen) = (seen.clone(), seen.clone());
        let dep: Dependent<i32, String> = Dependent::Handlers {
            on_fulfilled: Box::new(move |v| {
                ok_seen.lock().unwrap().push(format!("ok {v}"));
                Status::Fulfilled
            }),
            on_rejected: Box::new(move |e| {
                err_seen.lock().unwrap().push(format!("err {e}"));
                Status::Rejected
            }),
        };
        assert_eq!(dep.fire(Err("boom".into())), Status::Rejected);
        assert_eq!(*seen.lock().unwrap(), vec!["err boom".to_string()]);
    }

    #[test]
    fn forward_copies_the_outcome() {
        let target = Deferred::<i32, String>::new();
        let status = Dependent::Forward(target.clone()).fire(Ok(5));
        assert_eq!(status, Status::Fulfilled);
        assert_eq!(target.value(), Some(Ok(5)));
    }

    #[test]
    fn forward_into_settled_target_keeps_first_outcome() {
        let target = Deferred::<i32, String>::rejected("first".into());
        let status = Dependent::Forward(target.clone()).fire(Ok(5));
        assert_eq!(status, Status::Rejected);
        assert_eq!(target.value(), Some(Err("first".to_string())));
    }
}
