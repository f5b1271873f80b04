use crate::error::SchedulerError;
use crate::guard::FlagGuard;
use crate::priority::PriorityLevel;
use crate::scheduler::Scheduler;
use crate::task::{BoxError, Continuation, TaskCallback};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// FIFO of callbacks that must finish before control returns to the caller.
///
/// A flush runs every entry to completion in one pass, at `Immediate`
/// priority, with no time slicing: continuations are invoked inline until
/// they report `Done`. Callbacks receive `true` (the `is_sync` flag).
///
/// Entries appended while a flush is running are picked up by that flush.
/// Calling `flush` from inside a flush does nothing.
#[derive(Clone)]
pub struct SyncCallbackQueue {
    inner: Rc<SyncQueueInner>,
}

struct SyncQueueInner {
    scheduler: Scheduler,
    // Slots are emptied as the flush takes them.
    queue: RefCell<SmallVec<[Option<TaskCallback>; 4]>>,
    includes_legacy: Cell<bool>,
    is_flushing: Cell<bool>,
}

impl SyncCallbackQueue {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Rc::new(SyncQueueInner {
                scheduler: scheduler.clone(),
                queue: RefCell::new(SmallVec::new()),
                includes_legacy: Cell::new(false),
                is_flushing: Cell::new(false),
            }),
        }
    }

    /// Appends a callback. Returns `true` if the queue was empty, in which
    /// case the caller is responsible for arranging a flush.
    pub fn enqueue<F>(&self, callback: F) -> bool
    where
        F: FnOnce(bool) -> crate::task::TaskResult + 'static,
    {
        let mut queue = self.inner.queue.borrow_mut();
        let was_empty = queue.is_empty();
        queue.push(Some(Box::new(callback)));
        was_empty
    }

    /// Like `enqueue`, and marks the queue as holding legacy-mode work for
    /// `flush_if_legacy`.
    pub fn enqueue_legacy<F>(&self, callback: F) -> bool
    where
        F: FnOnce(bool) -> crate::task::TaskResult + 'static,
    {
        self.inner.includes_legacy.set(true);
        self.enqueue(callback)
    }

    pub fn flush_if_legacy(&self) -> Result<(), SchedulerError> {
        if self.inner.includes_legacy.get() {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Runs every queued callback to completion.
    ///
    /// If a callback fails, it and every entry before it are dropped, a fresh
    /// flush is scheduled at `Immediate` priority for the entries after it,
    /// and the error is returned.
    pub fn flush(&self) -> Result<(), SchedulerError> {
        let Some(_flushing) = FlagGuard::try_acquire(&self.inner.is_flushing) else {
            tracing::trace!("sync queue already flushing");
            return Ok(());
        };
        if self.inner.queue.borrow().is_empty() {
            return Ok(());
        }

        self.inner
            .scheduler
            .run_with_priority(PriorityLevel::Immediate, || self.drain())
    }

    fn drain(&self) -> Result<(), SchedulerError> {
        let mut index = 0;
        loop {
            let entry = {
                let mut queue = self.inner.queue.borrow_mut();
                match queue.get_mut(index) {
                    Some(slot) => slot.take(),
                    None => break,
                }
            };

            if let Some(callback) = entry {
                if let Err(source) = run_to_completion(callback) {
                    self.recover_from(index);
                    return Err(SchedulerError::SyncCallbackFailed { index, source });
                }
            }
            index += 1;
        }

        tracing::trace!("sync queue flushed {} callbacks", index);
        self.inner.queue.borrow_mut().clear();
        self.inner.includes_legacy.set(false);
        Ok(())
    }

    fn recover_from(&self, failed: usize) {
        let remaining = {
            let mut queue = self.inner.queue.borrow_mut();
            queue.drain(..=failed);
            queue.len()
        };
        tracing::warn!(
            "sync callback {} failed, rescheduling flush for {} remaining",
            failed,
            remaining
        );

        let weak = Rc::downgrade(&self.inner);
        self.inner
            .scheduler
            .schedule_task(PriorityLevel::Immediate, move |_| {
                if let Some(inner) = weak.upgrade() {
                    SyncCallbackQueue { inner }.flush()?;
                }
                Ok(Continuation::Done)
            });
    }

    /// Number of callbacks still waiting to run.
    pub fn len(&self) -> usize {
        self.inner
            .queue
            .borrow()
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.is_flushing.get()
    }

    pub fn includes_legacy(&self) -> bool {
        self.inner.includes_legacy.get()
    }
}

fn run_to_completion(mut callback: TaskCallback) -> Result<(), BoxError> {
    loop {
        match callback(true)? {
            Continuation::Done => return Ok(()),
            Continuation::Continue(next) => callback = next,
        }
    }
}

impl fmt::Debug for SyncCallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCallbackQueue")
            .field("len", &self.len())
            .field("includes_legacy", &self.inner.includes_legacy.get())
            .field("is_flushing", &self.inner.is_flushing.get())
            .finish()
    }
}
