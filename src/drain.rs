//! Runs settled dependents without growing the native stack.
//!
//! Every settlement that has dependents becomes a [`Frame`] on a per-thread
//! stack. The top frame is always worked first, one dependent at a time, so
//! the order matches plain recursion. A forwarded settlement made while a
//! drain is running only pushes its frame; the running drain picks it up
//! next. A settlement made by user code drains its own frames before it
//! returns.
use std::cell::RefCell;

use crate::Status;

pub(crate) type Job = Box<dyn FnOnce() -> Status>;

pub(crate) trait Frame {
    /// The next dependent to fire, packaged with its copy of the outcome.
    fn next_job(&mut self) -> Option<Job>;
    fn record(&mut self, status: Status);
    /// Called once every dependent and everything they forwarded has run.
    fn finish(self: Box<Self>);
}

thread_local! {
    static FRAMES: RefCell<Vec<Box<dyn Frame>>> = RefCell::new(Vec::new());
}

enum Next {
    Fire(usize, Job),
    Finish(Box<dyn Frame>),
    Done,
}

/// Pushes `frame` and drains everything above the current depth.
pub(crate) fn run(frame: Box<dyn Frame>) {
    let base = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        frames.push(frame);
        frames.len() - 1
    });
    let _unwind = Unwind(base);
    loop {
        let next = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            if frames.len() <= base {
                return Next::Done;
            }
            let top = frames.len() - 1;
            match frames[top].next_job() {
                Some(job) => Next::Fire(top, job),
                None => frames.pop().map_or(Next::Done, Next::Finish),
            }
        });
        match next {
            Next::Fire(index, job) => {
                let status = job();
                FRAMES.with(|frames| {
                    if let Some(frame) = frames.borrow_mut().get_mut(index) {
                        frame.record(status);
                    }
                });
            }
            Next::Finish(frame) => frame.finish(),
            Next::Done => break,
        }
    }
}

/// Leaves `frame` for the drain already running on this thread, or runs it
/// now if there is none.
pub(crate) fn schedule(frame: Box<dyn Frame>) {
    let idle = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if frames.is_empty() {
            Some(frame)
        } else {
            frames.push(frame);
            None
        }
    });
    if let Some(frame) = idle {
        run(frame);
    }
}

#[cfg(test)]
pub(crate) fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Drops the frames a panicking callback left behind, so later drains on
/// this thread do not mistake them for a running one.
struct Unwind(usize);

impl Drop for Unwind {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let stale = FRAMES
            .try_with(|frames| match frames.try_borrow_mut() {
                Ok(mut frames) if frames.len() > self.0 => frames.split_off(self.0),
                _ => Vec::new(),
            })
            .unwrap_or_default();
        drop(stale);
    }
}

#[cfg(test)]
mod tests {
    use super::{run, schedule, Frame, Job, FRAMES};
    use crate::Status;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    struct Script {
        name: &'static str,
        jobs: Vec<Job>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Frame for Script {
        fn next_job(&mut self) -> Option<Job> {
            if self.jobs.is_empty() {
                None
            } else {
                Some(self.jobs.remove(0))
            }
        }

        fn record(&mut self, status: Status) {
            self.log.lock().unwrap().push(format!("{} saw {status}", self.name));
        }

        fn finish(self: Box<Self>) {
            self.log.lock().unwrap().push(format!("{} done", self.name));
        }
    }

    #[test]
    fn scheduled_frames_run_before_the_next_sibling() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let nested = log.clone();
        let child: Job = Box::new(|| Status::Rejected);
        let first: Job = Box::new(move || {
            schedule(Box::new(Script {
                name: "child",
                jobs: vec![child],
                log: nested,
            }));
            Status::Fulfilled
        });
        let second: Job = Box::new(|| Status::Pending);
        run(Box::new(Script {
            name: "parent",
            jobs: vec![first, second],
            log: log.clone(),
        }));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "parent saw fulfilled",
                "child saw rejected",
                "child done",
                "parent saw pending",
                "parent done",
            ]
        );
        FRAMES.with(|frames| assert!(frames.borrow().is_empty()));
    }
}
