#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use promise_chain::{wrap, Deferred, Error, Status};
    use std::sync::{Arc, Mutex};
    use std::{thread, time::Duration};

    #[test]
    fn resolve_then_map() {
        let d = Deferred::<i32, String>::new();
        let r = d.then(|x| Ok(x + 1), None);
        d.resolve(41).unwrap();
        assert_eq!(r.status(), Status::Fulfilled);
        assert_eq!(r.value(), Some(Ok(42)));
    }

    #[test]
    fn reject_before_then_uses_default_handler() {
        let d = Deferred::<i32, String>::new();
        d.reject("boom".into()).unwrap();
        let r = d.then(|x| Ok(x), None);
        assert_eq!(r.status(), Status::Rejected);
        assert_eq!(r.value(), Some(Err("boom".to_string())));
    }

    #[test]
    fn flattened_result_waits_for_inner() {
        let d = Deferred::<i32, String>::new();
        let inner = Deferred::<i32, String>::new();
        let hand_off = inner.clone();
        let r = d.then(move |_| hand_off, None);
        d.resolve(1).unwrap();
        assert_eq!(r.status(), Status::Pending);
        inner.resolve(99).unwrap();
        assert_eq!(r.value(), Some(Ok(99)));
    }

    #[test]
    fn double_settlement_is_reported() {
        let d = Deferred::<i32, String>::new();
        d.reject("first".into()).unwrap();
        match d.reject("second".into()) {
            Err(Error::AlreadySettled { status, attempted }) => {
                assert_eq!(status, Status::Rejected);
                assert_eq!(attempted, Err("second".to_string()));
            }
            other => panic!("expected AlreadySettled, got {other:?}"),
        }
        assert_eq!(d.value(), Some(Err("first".to_string())));
    }

    #[test]
    fn wrap_returns_the_same_deferred() {
        let d = Deferred::<i32, String>::new();
        assert!(wrap(d.clone()).ptr_eq(&d));
    }

    #[test]
    fn recovery_midway_through_a_chain() {
        let d = Deferred::<i32, String>::new();
        let r = d
            .map(|x| x * 2)
            .catch(|e: String| Ok::<i32, String>(-(e.len() as i32)))
            .map(|x| x + 100);
        d.reject("oops".into()).unwrap();
        assert_eq!(r.value(), Some(Ok(96)));
    }

    #[test]
    fn settled_from_another_thread() {
        let d = Deferred::<i32, String>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let r = d.map(move |v| {
            sink.lock().unwrap().push(v);
            v
        });

        let producer = d.clone();
        let task = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.resolve(42)
        });
        task.join().expect("The producer thread has panicked").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![42]);
        assert_eq!(r.value(), Some(Ok(42)));
    }

    #[test]
    fn racing_producers_settle_once() {
        let d = Deferred::<usize, String>::new();
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let d = d.clone();
                thread::spawn(move || d.resolve(i).is_ok())
            })
            .collect();
        let winners = tasks
            .into_iter()
            .map(|t| t.join().expect("A producer thread has panicked"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(d.is_settled());
    }
}
