use super::{Host, HostCallback, TimeoutId, delay_to_duration};
use slotmap::SlotMap;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Host backed by a tokio `LocalSet`.
///
/// Callbacks are `!Send`, so every request is spawned with `spawn_local`.
/// All methods must be called from inside `LocalSet::run_until` (or a task
/// spawned on the set). Errors have no caller to return to and are logged.
pub struct TokioHost {
    origin: Instant,
    timeouts: Rc<RefCell<SlotMap<TimeoutId, JoinHandle<()>>>>,
}

impl TokioHost {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            timeouts: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.borrow().len()
    }
}

impl Default for TokioHost {
    fn default() -> Self {
        Self::new()
    }
}

fn run_logged(callback: HostCallback) {
    if let Err(err) = callback() {
        tracing::error!("scheduled work failed: {}", err);
    }
}

impl Host for TokioHost {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn request_soon(&self, callback: HostCallback) {
        tokio::task::spawn_local(async move {
            tokio::task::yield_now().await;
            run_logged(callback);
        });
    }

    fn request_after(&self, callback: HostCallback, delay_ms: f64) -> TimeoutId {
        let delay = delay_to_duration(delay_ms);
        let timeouts = self.timeouts.clone();
        // The spawned task does not run before this borrow ends.
        self.timeouts.borrow_mut().insert_with_key(|id| {
            tokio::task::spawn_local(async move {
                tokio::time::sleep(delay).await;
                timeouts.borrow_mut().remove(id);
                run_logged(callback);
            })
        })
    }

    fn cancel_timeout(&self, id: TimeoutId) {
        let handle = self.timeouts.borrow_mut().remove(id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}
