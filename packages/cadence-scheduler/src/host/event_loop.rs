use super::timeouts::TimeoutTable;
use super::{Host, HostCallback, TimeoutId, delay_to_duration};
use crate::error::SchedulerError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Instant;

/// Single-threaded event loop driven by the caller's thread.
///
/// Run-soon callbacks form a FIFO that is always drained before any delayed
/// callback is considered. When only delayed callbacks remain the thread
/// sleeps until the earliest deadline.
pub struct EventLoopHost {
    origin: Instant,
    soon: RefCell<VecDeque<HostCallback>>,
    timeouts: RefCell<TimeoutTable>,
}

impl EventLoopHost {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            soon: RefCell::new(VecDeque::new()),
            timeouts: RefCell::new(TimeoutTable::default()),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.soon.borrow().is_empty() && self.timeouts.borrow().len() == 0
    }

    /// Runs one turn: a run-soon callback if one is queued, otherwise the
    /// earliest delayed callback that is already due. Returns `false` when
    /// there was nothing to run yet.
    pub fn turn(&self) -> Result<bool, SchedulerError> {
        let callback = self.soon.borrow_mut().pop_front();
        if let Some(callback) = callback {
            callback()?;
            return Ok(true);
        }

        let now = self.now();
        let callback = self.timeouts.borrow_mut().take_due(now);
        match callback {
            Some(callback) => {
                callback()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs until nothing is queued, sleeping through gaps between timeouts.
    ///
    /// An error from a callback stops the loop and is returned; the loop can
    /// be resumed by calling `run` again.
    pub fn run(&self) -> Result<(), SchedulerError> {
        loop {
            if self.turn()? {
                continue;
            }

            let earliest = self.timeouts.borrow().earliest();
            let Some((_, deadline)) = earliest else {
                return Ok(());
            };

            let wait = deadline - self.now();
            if wait > 0.0 {
                tracing::trace!("event loop sleeping for {:.3}ms", wait);
                std::thread::sleep(delay_to_duration(wait));
            }
        }
    }
}

impl Default for EventLoopHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for EventLoopHost {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn request_soon(&self, callback: HostCallback) {
        self.soon.borrow_mut().push_back(callback);
    }

    fn request_after(&self, callback: HostCallback, delay_ms: f64) -> TimeoutId {
        let deadline = self.now() + delay_ms.max(0.0);
        self.timeouts.borrow_mut().insert(deadline, callback)
    }

    fn cancel_timeout(&self, id: TimeoutId) {
        self.timeouts.borrow_mut().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_soon_before_timeouts() {
        let host = Rc::new(EventLoopHost::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        host.request_after(
            Box::new(move || {
                l.borrow_mut().push("timeout");
                Ok(())
            }),
            0.0,
        );
        let l = log.clone();
        host.request_soon(Box::new(move || {
            l.borrow_mut().push("soon");
            Ok(())
        }));

        host.run().unwrap();
        assert_eq!(*log.borrow(), vec!["soon", "timeout"]);
        assert!(host.is_idle());
    }

    #[test]
    fn test_sleeps_until_deadline() {
        let host = Rc::new(EventLoopHost::new());
        let fired_at = Rc::new(Cell::new(0.0));

        let h = host.clone();
        let f = fired_at.clone();
        host.request_after(
            Box::new(move || {
                f.set(h.now());
                Ok(())
            }),
            5.0,
        );

        host.run().unwrap();
        assert!(fired_at.get() >= 5.0);
    }

    #[test]
    fn test_canceled_timeout_never_runs() {
        let host = EventLoopHost::new();
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let id = host.request_after(
            Box::new(move || {
                r.set(true);
                Ok(())
            }),
            1.0,
        );
        host.cancel_timeout(id);
        host.run().unwrap();
        assert!(!ran.get());
    }

    #[test]
    fn test_error_stops_loop() {
        let host = EventLoopHost::new();
        host.request_soon(Box::new(|| Err(SchedulerError::InvalidFrameRate(-1.0))));
        host.request_soon(Box::new(|| Ok(())));

        assert!(host.run().is_err());
        assert!(!host.is_idle());
        host.run().unwrap();
        assert!(host.is_idle());
    }
}
