use super::timeouts::TimeoutTable;
use super::{Host, HostCallback, TimeoutId};
use crate::error::SchedulerError;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Input-pending signal reported by a [`VirtualHost`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    /// Clicks, key presses.
    pub discrete: bool,
    /// Mouse moves, wheel.
    pub continuous: bool,
}

/// Deterministic host with a virtual clock.
///
/// Nothing happens on its own: time only moves through `advance_time` /
/// `set_time`, and queued callbacks only run when the owner drives them.
/// Callbacks may freely request more callbacks or move the clock.
#[derive(Default)]
pub struct VirtualHost {
    current_time: Cell<f64>,
    soon: RefCell<VecDeque<HostCallback>>,
    timeouts: RefCell<TimeoutTable>,
    input: Cell<Option<InputState>>,
}

impl VirtualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, time: f64) {
        self.current_time.set(time);
    }

    pub fn advance_time(&self, ms: f64) {
        self.current_time.set(self.current_time.get() + ms);
    }

    /// `None` makes the host report no input-pending capability at all.
    pub fn set_input_pending(&self, input: Option<InputState>) {
        self.input.set(input);
    }

    pub fn pending_soon(&self) -> usize {
        self.soon.borrow().len()
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.borrow().len()
    }

    pub fn next_timeout_at(&self) -> Option<f64> {
        self.timeouts.borrow().earliest().map(|(_, deadline)| deadline)
    }

    pub fn is_idle(&self) -> bool {
        self.pending_soon() == 0 && self.pending_timeouts() == 0
    }

    /// Runs the oldest run-soon callback, if any.
    pub fn run_next_soon(&self) -> Option<Result<(), SchedulerError>> {
        let callback = self.soon.borrow_mut().pop_front();
        callback.map(|callback| callback())
    }

    /// Runs every delayed callback that is due at the current time, earliest
    /// first. Returns how many ran.
    pub fn fire_due_timeouts(&self) -> Result<usize, SchedulerError> {
        let mut fired = 0;
        loop {
            let now = self.current_time.get();
            let callback = self.timeouts.borrow_mut().take_due(now);
            let Some(callback) = callback else {
                return Ok(fired);
            };
            fired += 1;
            callback()?;
        }
    }

    /// Runs run-soon callbacks and due timeouts until neither is left,
    /// without moving the clock. Stops at the first error.
    pub fn run_until_idle(&self) -> Result<(), SchedulerError> {
        loop {
            if let Some(result) = self.run_next_soon() {
                result?;
                continue;
            }
            if self.fire_due_timeouts()? == 0 {
                return Ok(());
            }
        }
    }

    /// Like `run_until_idle`, but also jumps the clock forward to each
    /// pending timeout until nothing at all is queued.
    pub fn run_all_timers(&self) -> Result<(), SchedulerError> {
        loop {
            self.run_until_idle()?;
            let Some(deadline) = self.next_timeout_at() else {
                return Ok(());
            };
            if deadline > self.current_time.get() {
                self.current_time.set(deadline);
            }
        }
    }

    pub fn advance_time_and_run(&self, ms: f64) -> Result<(), SchedulerError> {
        self.advance_time(ms);
        self.run_until_idle()
    }
}

impl Host for VirtualHost {
    fn now(&self) -> f64 {
        self.current_time.get()
    }

    fn request_soon(&self, callback: HostCallback) {
        self.soon.borrow_mut().push_back(callback);
    }

    fn request_after(&self, callback: HostCallback, delay_ms: f64) -> TimeoutId {
        let deadline = self.current_time.get() + delay_ms.max(0.0);
        self.timeouts.borrow_mut().insert(deadline, callback)
    }

    fn cancel_timeout(&self, id: TimeoutId) {
        self.timeouts.borrow_mut().remove(id);
    }

    fn is_input_pending(&self, include_continuous: bool) -> Option<bool> {
        self.input
            .get()
            .map(|input| input.discrete || (include_continuous && input.continuous))
    }
}
