use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::Error;

/// One-shot completion signal for synchronous requests: the dispatcher
/// posts the final status, the submitting thread waits for it. The first
/// post wins; later ones are dropped.
#[derive(Debug)]
pub struct Signal {
    result: Mutex<Option<Result<(), Error>>>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Signal {
        Signal {
            result: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn post(&self, result: Result<(), Error>) {
        let mut slot = self.result.lock().expect("signal mutex poisoned");
        if slot.is_none() {
            *slot = Some(result);
            self.cond.notify_all();
        }
    }

    /// Wait for the status. `None` on expiry of `timeout`.
    pub fn wait(&self, timeout: Option<Duration>)
        -> Option<Result<(), Error>>
    {
        let mut slot = self.result.lock().expect("signal mutex poisoned");
        match timeout {
            None => {
                while slot.is_none() {
                    slot = self.cond.wait(slot)
                        .expect("signal mutex poisoned");
                }
                *slot
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while slot.is_none() {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (guard, _) = self.cond
                        .wait_timeout(slot, deadline - now)
                        .expect("signal mutex poisoned");
                    slot = guard;
                }
                *slot
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::error::Error;

    use super::Signal;

    #[test]
    fn post_then_wait() {
        let signal = Signal::new();
        signal.post(Ok(()));
        assert_eq!(signal.wait(None), Some(Ok(())));
    }

    #[test]
    fn first_post_wins() {
        let signal = Signal::new();
        signal.post(Err(Error::NetworkError));
        signal.post(Ok(()));
        assert_eq!(signal.wait(None), Some(Err(Error::NetworkError)));
    }

    #[test]
    fn wait_times_out() {
        let signal = Signal::new();
        assert_eq!(signal.wait(Some(Duration::from_millis(10))), None);
    }

    #[test]
    fn cross_thread_wakeup() {
        let signal = Arc::new(Signal::new());
        let poster = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post(Ok(()));
        });
        assert_eq!(signal.wait(Some(Duration::from_secs(5))),
                   Some(Ok(())));
        handle.join().unwrap();
    }
}
