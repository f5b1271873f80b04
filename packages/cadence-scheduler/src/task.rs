use crate::heap::HeapItem;
use crate::priority::PriorityLevel;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Error type returned by user callbacks.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// What a callback returns when it finishes a slice of work.
pub type TaskResult = Result<Continuation, BoxError>;

/// A unit of work. The argument is `did_timeout` for scheduled tasks and
/// `is_sync` (always `true`) for the synchronous queue.
pub type TaskCallback = Box<dyn FnOnce(bool) -> TaskResult>;

/// Outcome of running a callback once.
pub enum Continuation {
    /// The work is finished.
    Done,
    /// Not finished: run this next, keeping the task's place in the queue.
    Continue(TaskCallback),
}

impl Continuation {
    pub fn continue_with<F>(callback: F) -> Self
    where
        F: FnOnce(bool) -> TaskResult + 'static,
    {
        Continuation::Continue(Box::new(callback))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Continuation::Done)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Done => f.write_str("Done"),
            Continuation::Continue(_) => f.write_str("Continue(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Options accepted by `Scheduler::schedule_task_with_options`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScheduleOptions {
    /// Milliseconds to wait before the task becomes eligible. Values `<= 0`
    /// mean "ready now".
    pub delay: f64,
}

impl ScheduleOptions {
    pub fn delayed(delay: f64) -> Self {
        Self { delay }
    }
}

pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) priority_level: PriorityLevel,
    pub(crate) start_time: f64,
    pub(crate) expiration_time: f64,
    pub(crate) sort_index: Cell<f64>,
    // `None` is the terminal marker: completed, canceled, or currently running.
    callback: RefCell<Option<TaskCallback>>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        priority_level: PriorityLevel,
        start_time: f64,
        callback: TaskCallback,
    ) -> Self {
        Self {
            id,
            priority_level,
            start_time,
            expiration_time: start_time + priority_level.timeout(),
            sort_index: Cell::new(-1.0),
            callback: RefCell::new(Some(callback)),
        }
    }

    pub(crate) fn take_callback(&self) -> Option<TaskCallback> {
        self.callback.borrow_mut().take()
    }

    pub(crate) fn set_callback(&self, callback: TaskCallback) {
        *self.callback.borrow_mut() = Some(callback);
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.callback.borrow().is_some()
    }
}

impl HeapItem for Task {
    fn sort_index(&self) -> f64 {
        self.sort_index.get()
    }

    fn id(&self) -> u64 {
        self.id.0
    }
}

/// Handle to a scheduled task, used for cancellation and inspection.
///
/// Handles are cheap to clone. Holding one after the task has finished is
/// fine; canceling a finished task does nothing.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) task: Rc<Task>,
}

impl TaskHandle {
    pub(crate) fn new(task: Rc<Task>) -> Self {
        Self { task }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn priority_level(&self) -> PriorityLevel {
        self.task.priority_level
    }

    pub fn start_time(&self) -> f64 {
        self.task.start_time
    }

    pub fn expiration_time(&self) -> f64 {
        self.task.expiration_time
    }

    pub fn sort_index(&self) -> f64 {
        self.task.sort_index.get()
    }

    /// `true` while the task still holds a callback to run. `false` once it
    /// completed, was canceled, or while its current callback is executing.
    pub fn is_pending(&self) -> bool {
        self.task.has_callback()
    }

    pub fn same_task(&self, other: &TaskHandle) -> bool {
        Rc::ptr_eq(&self.task, &other.task)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.task.id)
            .field("priority_level", &self.task.priority_level)
            .field("start_time", &self.task.start_time)
            .field("expiration_time", &self.task.expiration_time)
            .field("pending", &self.task.has_callback())
            .finish()
    }
}
