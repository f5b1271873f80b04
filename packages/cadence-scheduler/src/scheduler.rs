use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::guard::{FlagGuard, PriorityGuard};
use crate::heap::MinHeap;
use crate::host::{Host, TimeoutId};
use crate::priority::PriorityLevel;
use crate::profiling::{Profiler, ProfilingEvent, SchedulerStats};
use crate::task::{Continuation, ScheduleOptions, Task, TaskHandle, TaskId, TaskResult};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Cooperative priority scheduler.
///
/// Work is submitted with a priority and runs in time slices driven by the
/// [`Host`]. Between tasks the scheduler yields back to the host whenever
/// `should_yield` says so; inside a task, only the task itself can yield, by
/// returning [`Continuation::Continue`].
///
/// `Scheduler` is a cheap handle (`Rc` inside). Clone it into task callbacks
/// to schedule or cancel work reentrantly.
///
/// # Example
///
/// ```
/// use cadence_scheduler::{Continuation, PriorityLevel, Scheduler, VirtualHost};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let host = Rc::new(VirtualHost::new());
/// let scheduler = Scheduler::new(host.clone());
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let l = log.clone();
/// scheduler.schedule_task(PriorityLevel::Normal, move |_| {
///     l.borrow_mut().push("normal");
///     Ok(Continuation::Done)
/// });
/// let l = log.clone();
/// scheduler.schedule_task(PriorityLevel::Immediate, move |_| {
///     l.borrow_mut().push("immediate");
///     Ok(Continuation::Done)
/// });
///
/// host.run_until_idle().unwrap();
/// assert_eq!(*log.borrow(), vec!["immediate", "normal"]);
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

#[derive(Default)]
struct Queues {
    // Ready work, keyed by expiration time.
    task_queue: MinHeap<Rc<Task>>,
    // Delayed work, keyed by start time.
    timer_queue: MinHeap<Rc<Task>>,
}

struct SchedulerInner {
    weak_self: Weak<SchedulerInner>,
    host: Rc<dyn Host>,
    config: SchedulerConfig,
    queues: RefCell<Queues>,
    task_id_counter: Cell<u64>,
    current_task: RefCell<Option<Rc<Task>>>,
    current_priority: Cell<PriorityLevel>,

    is_performing_work: Cell<bool>,
    is_host_callback_scheduled: Cell<bool>,
    is_host_timeout_scheduled: Cell<bool>,
    is_paused: Cell<bool>,
    timeout_id: Cell<Option<TimeoutId>>,

    // Message loop state.
    is_message_loop_running: Cell<bool>,
    has_scheduled_host_callback: Cell<bool>,
    frame_interval: Cell<f64>,
    slice_start: Cell<f64>,
    needs_paint: Cell<bool>,

    profiler: RefCell<Profiler>,
}

impl Scheduler {
    pub fn new<H: Host + 'static>(host: Rc<H>) -> Self {
        Self::from_parts(host, SchedulerConfig::default())
    }

    pub fn with_config<H: Host + 'static>(
        host: Rc<H>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::from_parts(host, config))
    }

    fn from_parts(host: Rc<dyn Host>, config: SchedulerConfig) -> Self {
        let frame_interval = config.frame_yield_ms;
        let inner = Rc::new_cyclic(|weak_self| SchedulerInner {
            weak_self: weak_self.clone(),
            host,
            config,
            queues: RefCell::new(Queues::default()),
            task_id_counter: Cell::new(1),
            current_task: RefCell::new(None),
            current_priority: Cell::new(PriorityLevel::Normal),
            is_performing_work: Cell::new(false),
            is_host_callback_scheduled: Cell::new(false),
            is_host_timeout_scheduled: Cell::new(false),
            is_paused: Cell::new(false),
            timeout_id: Cell::new(None),
            is_message_loop_running: Cell::new(false),
            has_scheduled_host_callback: Cell::new(false),
            frame_interval: Cell::new(frame_interval),
            slice_start: Cell::new(-1.0),
            needs_paint: Cell::new(false),
            profiler: RefCell::new(Profiler::default()),
        });
        Self { inner }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn host(&self) -> Rc<dyn Host> {
        self.inner.host.clone()
    }

    pub fn now(&self) -> f64 {
        self.inner.host.now()
    }

    pub fn schedule_task<F>(&self, priority: PriorityLevel, callback: F) -> TaskHandle
    where
        F: FnOnce(bool) -> TaskResult + 'static,
    {
        self.schedule_task_with_options(priority, callback, ScheduleOptions::default())
    }

    pub fn schedule_task_with_options<F>(
        &self,
        priority: PriorityLevel,
        callback: F,
        options: ScheduleOptions,
    ) -> TaskHandle
    where
        F: FnOnce(bool) -> TaskResult + 'static,
    {
        self.inner.schedule_task(priority, Box::new(callback), options)
    }

    /// Marks the task as canceled. It stays in its queue until a traversal
    /// reaches it; its callback will never run.
    pub fn cancel_task(&self, handle: &TaskHandle) {
        let callback = handle.task.take_callback();
        if callback.is_some() {
            let now = self.inner.host.now();
            self.inner.profiler.borrow_mut().task_cancel(handle.id(), now);
            tracing::debug!("canceled task {}", handle.id());
        }
    }

    pub fn current_priority_level(&self) -> PriorityLevel {
        self.inner.current_priority.get()
    }

    /// Runs `f` with `priority` as the ambient level, restoring the previous
    /// level on every exit path.
    pub fn run_with_priority<F, R>(&self, priority: PriorityLevel, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = PriorityGuard::enter(&self.inner.current_priority, priority);
        f()
    }

    /// Runs `f` at the level that work spawned from the current context
    /// should get: urgent levels shift down to `Normal`.
    pub fn run_next<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let level = self.inner.current_priority.get().next_level();
        self.run_with_priority(level, f)
    }

    /// Captures the current ambient priority so it can be reinstated when the
    /// returned closure runs later, e.g. after an async boundary.
    pub fn wrap_callback<F, R>(&self, callback: F) -> impl FnOnce() -> R + use<F, R>
    where
        F: FnOnce() -> R,
    {
        let inner = self.inner.clone();
        let parent_priority = inner.current_priority.get();
        move || {
            let _guard = PriorityGuard::enter(&inner.current_priority, parent_priority);
            callback()
        }
    }

    /// Like [`wrap_callback`](Self::wrap_callback), for callbacks invoked more
    /// than once, such as event handlers. Every call runs at the priority
    /// captured here.
    pub fn wrap_callback_mut<F, R>(&self, mut callback: F) -> impl FnMut() -> R + use<F, R>
    where
        F: FnMut() -> R,
    {
        let inner = self.inner.clone();
        let parent_priority = inner.current_priority.get();
        move || {
            let _guard = PriorityGuard::enter(&inner.current_priority, parent_priority);
            callback()
        }
    }

    pub fn should_yield(&self) -> bool {
        self.inner.should_yield()
    }

    /// Signals that the host has a paint pending, so the current slice
    /// should end at the next yield check.
    pub fn request_paint(&self) {
        let inner = &self.inner;
        if inner.config.enable_is_input_pending && inner.host.is_input_pending(false).is_some() {
            inner.needs_paint.set(true);
        }
    }

    pub fn pause_execution(&self) {
        tracing::debug!("scheduler paused");
        self.inner.is_paused.set(true);
    }

    pub fn continue_execution(&self) {
        tracing::debug!("scheduler resumed");
        let inner = &self.inner;
        inner.is_paused.set(false);
        let has_work = !inner.queues.borrow().task_queue.is_empty();
        if has_work && !inner.is_host_callback_scheduled.get() && !inner.is_performing_work.get() {
            inner.is_host_callback_scheduled.set(true);
            inner.request_host_callback();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.is_paused.get()
    }

    /// Sets the slice length from a target frame rate. `0` restores the
    /// configured default. Values outside `0..=125` are reported and ignored.
    pub fn force_frame_rate(&self, fps: f64) -> Result<(), SchedulerError> {
        if !(0.0..=125.0).contains(&fps) {
            let err = SchedulerError::InvalidFrameRate(fps);
            tracing::error!("{}", err);
            return Err(err);
        }

        let interval = if fps > 0.0 {
            (1000.0 / fps).floor()
        } else {
            self.inner.config.frame_yield_ms
        };
        self.inner.frame_interval.set(interval);
        Ok(())
    }

    pub fn frame_interval(&self) -> f64 {
        self.inner.frame_interval.get()
    }

    /// Head of the ready queue. It may be a canceled task that has not been
    /// discarded yet.
    pub fn first_task(&self) -> Option<TaskHandle> {
        self.inner.peek_ready().map(TaskHandle::new)
    }

    /// The task whose callback is running right now, if any.
    pub fn current_task(&self) -> Option<TaskHandle> {
        self.inner.current_task.borrow().clone().map(TaskHandle::new)
    }

    /// Number of entries in the ready queue, canceled ones included.
    pub fn pending_tasks(&self) -> usize {
        self.inner.queues.borrow().task_queue.len()
    }

    /// Number of entries in the timer queue, canceled ones included.
    pub fn pending_timers(&self) -> usize {
        self.inner.queues.borrow().timer_queue.len()
    }

    pub fn has_pending_work(&self) -> bool {
        let queues = self.inner.queues.borrow();
        !queues.task_queue.is_empty() || !queues.timer_queue.is_empty()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.profiler.borrow().stats().clone()
    }

    pub fn start_logging_profiling_events(&self) {
        self.inner.profiler.borrow_mut().start_logging();
    }

    pub fn stop_logging_profiling_events(&self) -> Vec<ProfilingEvent> {
        self.inner.profiler.borrow_mut().stop_logging()
    }

    pub fn is_logging_profiling_events(&self) -> bool {
        self.inner.profiler.borrow().is_logging()
    }

    /// Drops all queued work and returns every flag to its initial state.
    /// Counters are kept.
    pub fn reset(&self) {
        let inner = &self.inner;
        if inner.is_performing_work.get() {
            tracing::warn!("scheduler reset while performing work");
        }
        let dropped = {
            let mut queues = inner.queues.borrow_mut();
            let dropped = queues.task_queue.len() + queues.timer_queue.len();
            queues.task_queue.clear();
            queues.timer_queue.clear();
            dropped
        };
        inner.cancel_host_timeout();
        inner.is_host_timeout_scheduled.set(false);
        inner.is_host_callback_scheduled.set(false);
        inner.has_scheduled_host_callback.set(false);
        inner.is_paused.set(false);
        inner.needs_paint.set(false);
        inner.current_priority.set(PriorityLevel::Normal);
        inner.frame_interval.set(inner.config.frame_yield_ms);
        tracing::info!("scheduler reset, dropped {} queued tasks", dropped);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.inner.queues.borrow();
        f.debug_struct("Scheduler")
            .field("ready", &queues.task_queue.len())
            .field("timers", &queues.timer_queue.len())
            .field("priority", &self.inner.current_priority.get())
            .field("performing_work", &self.inner.is_performing_work.get())
            .field("paused", &self.inner.is_paused.get())
            .finish()
    }
}

/// Cleanup for one `flush_work` call. Fields drop after `drop` runs, which
/// restores the ambient priority and clears the performing-work flag.
struct WorkScope<'a> {
    inner: &'a SchedulerInner,
    _priority: PriorityGuard<'a>,
    _performing: FlagGuard<'a>,
}

impl Drop for WorkScope<'_> {
    fn drop(&mut self) {
        self.inner.current_task.replace(None);
        let now = self.inner.host.now();
        self.inner.profiler.borrow_mut().suspend(now);
    }
}

/// One turn of the message loop. Re-posts itself unless the work loop
/// reported an empty ready queue, including when the slice failed.
struct MessageLoopTurn<'a> {
    inner: &'a SchedulerInner,
    has_more_work: bool,
}

impl Drop for MessageLoopTurn<'_> {
    fn drop(&mut self) {
        if self.has_more_work {
            self.inner.schedule_perform_work_until_deadline();
        } else {
            self.inner.is_message_loop_running.set(false);
            self.inner.has_scheduled_host_callback.set(false);
        }
        // Yielding gives the host a chance to paint.
        self.inner.needs_paint.set(false);
    }
}

impl SchedulerInner {
    fn next_task_id(&self) -> TaskId {
        let id = self.task_id_counter.get();
        self.task_id_counter.set(id + 1);
        TaskId(id)
    }

    fn schedule_task(
        &self,
        priority: PriorityLevel,
        callback: crate::task::TaskCallback,
        options: ScheduleOptions,
    ) -> TaskHandle {
        let current_time = self.host.now();
        let start_time = if options.delay > 0.0 {
            current_time + options.delay
        } else {
            current_time
        };

        let id = self.next_task_id();
        let task = Rc::new(Task::new(id, priority, start_time, callback));
        self.profiler.borrow_mut().task_scheduled();

        if start_time > current_time {
            task.sort_index.set(start_time);
            let is_earliest_timer = {
                let mut queues = self.queues.borrow_mut();
                queues.timer_queue.push(task.clone());
                queues.task_queue.is_empty()
                    && queues
                        .timer_queue
                        .peek()
                        .is_some_and(|head| Rc::ptr_eq(head, &task))
            };
            tracing::debug!(
                "scheduled delayed task {} ({:?}) starting at {:.1}",
                id,
                priority,
                start_time
            );
            if is_earliest_timer {
                self.request_host_timeout(start_time - current_time);
            }
        } else {
            task.sort_index.set(task.expiration_time);
            self.queues.borrow_mut().task_queue.push(task.clone());
            self.profiler
                .borrow_mut()
                .task_start(id, priority, current_time);
            tracing::debug!(
                "scheduled task {} ({:?}) expiring at {:.1}",
                id,
                priority,
                task.expiration_time
            );
            if !self.is_host_callback_scheduled.get() && !self.is_performing_work.get() {
                self.is_host_callback_scheduled.set(true);
                self.request_host_callback();
            }
        }

        TaskHandle::new(task)
    }

    fn peek_ready(&self) -> Option<Rc<Task>> {
        self.queues.borrow().task_queue.peek().cloned()
    }

    fn first_timer_start(&self) -> Option<f64> {
        self.queues
            .borrow()
            .timer_queue
            .peek()
            .map(|timer| timer.start_time)
    }

    /// Moves timers whose start time has passed into the ready queue and
    /// discards canceled timers found at the root.
    fn advance_timers(&self, current_time: f64) {
        let mut guard = self.queues.borrow_mut();
        let queues = &mut *guard;
        loop {
            let Some(timer) = queues.timer_queue.peek() else {
                return;
            };
            if !timer.has_callback() {
                queues.timer_queue.pop();
            } else if timer.start_time <= current_time {
                let Some(timer) = queues.timer_queue.pop() else {
                    return;
                };
                timer.sort_index.set(timer.expiration_time);
                self.profiler
                    .borrow_mut()
                    .task_start(timer.id, timer.priority_level, current_time);
                tracing::trace!("timer {} fired, moved to ready queue", timer.id);
                queues.task_queue.push(timer);
            } else {
                return;
            }
        }
    }

    fn handle_timeout(&self) {
        self.timeout_id.set(None);
        self.is_host_timeout_scheduled.set(false);
        let current_time = self.host.now();
        self.advance_timers(current_time);

        if !self.is_host_callback_scheduled.get() {
            if !self.queues.borrow().task_queue.is_empty() {
                self.is_host_callback_scheduled.set(true);
                self.request_host_callback();
            } else if let Some(start_time) = self.first_timer_start() {
                self.request_host_timeout(start_time - current_time);
            }
        }
    }

    fn request_host_timeout(&self, delay: f64) {
        // At most one delayed callback is outstanding.
        self.cancel_host_timeout();
        self.is_host_timeout_scheduled.set(true);

        let weak = self.weak_self.clone();
        let id = self.host.request_after(
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_timeout();
                }
                Ok(())
            }),
            delay,
        );
        tracing::debug!("requested host timeout in {:.1}ms", delay);
        self.timeout_id.set(Some(id));
    }

    fn cancel_host_timeout(&self) {
        if let Some(id) = self.timeout_id.take() {
            self.host.cancel_timeout(id);
        }
    }

    fn request_host_callback(&self) {
        self.has_scheduled_host_callback.set(true);
        if !self.is_message_loop_running.get() {
            self.is_message_loop_running.set(true);
            self.schedule_perform_work_until_deadline();
        }
    }

    fn schedule_perform_work_until_deadline(&self) {
        let weak = self.weak_self.clone();
        self.host.request_soon(Box::new(move || match weak.upgrade() {
            Some(inner) => inner.perform_work_until_deadline(),
            None => Ok(()),
        }));
    }

    fn perform_work_until_deadline(&self) -> Result<(), SchedulerError> {
        if !self.has_scheduled_host_callback.get() {
            self.is_message_loop_running.set(false);
            self.needs_paint.set(false);
            return Ok(());
        }

        let current_time = self.host.now();
        // Slice start, for measuring how long the host has been blocked.
        self.slice_start.set(current_time);

        let mut turn = MessageLoopTurn {
            inner: self,
            has_more_work: true,
        };
        let result = self.flush_work(true, current_time);
        if let Ok(has_more_work) = result {
            turn.has_more_work = has_more_work;
        }
        drop(turn);
        result.map(|_| ())
    }

    fn flush_work(
        &self,
        has_time_remaining: bool,
        initial_time: f64,
    ) -> Result<bool, SchedulerError> {
        self.profiler.borrow_mut().unsuspend(initial_time);

        // A new host callback is needed the next time work is scheduled.
        self.is_host_callback_scheduled.set(false);
        if self.is_host_timeout_scheduled.get() {
            // Superseded by this run.
            self.is_host_timeout_scheduled.set(false);
            self.cancel_host_timeout();
        }

        let _scope = WorkScope {
            inner: self,
            _priority: PriorityGuard::save(&self.current_priority),
            _performing: FlagGuard::hold(&self.is_performing_work),
        };
        self.work_loop(has_time_remaining, initial_time)
    }

    fn work_loop(
        &self,
        has_time_remaining: bool,
        initial_time: f64,
    ) -> Result<bool, SchedulerError> {
        let mut current_time = initial_time;
        self.advance_timers(current_time);

        while let Some(task) = self.peek_ready() {
            self.current_task.replace(Some(task.clone()));

            if self.is_paused.get() {
                // Report no more work so the host does not spin; continue_execution re-arms it.
                tracing::debug!("work loop paused with task {} pending", task.id);
                return Ok(false);
            }

            if task.expiration_time > current_time
                && (!has_time_remaining || self.should_yield())
            {
                // Not expired, but the slice is over.
                tracing::trace!("yielding to host with task {} pending", task.id);
                return Ok(true);
            }

            let Some(callback) = task.take_callback() else {
                // Canceled while queued.
                self.queues.borrow_mut().task_queue.pop();
                continue;
            };

            self.current_priority.set(task.priority_level);
            let did_timeout = task.expiration_time <= current_time;
            self.profiler
                .borrow_mut()
                .task_run(task.id, task.priority_level, current_time);
            tracing::trace!("running task {} (did_timeout: {})", task.id, did_timeout);

            let result = callback(did_timeout);
            current_time = self.host.now();

            match result {
                Ok(Continuation::Continue(next)) => {
                    task.set_callback(next);
                    self.profiler.borrow_mut().task_yield(task.id, current_time);
                    tracing::trace!("task {} yielded a continuation", task.id);
                }
                Ok(Continuation::Done) => {
                    self.profiler
                        .borrow_mut()
                        .task_complete(task.id, current_time);
                    // The callback may have scheduled more urgent work.
                    let mut queues = self.queues.borrow_mut();
                    if queues
                        .task_queue
                        .peek()
                        .is_some_and(|head| Rc::ptr_eq(head, &task))
                    {
                        queues.task_queue.pop();
                    }
                }
                Err(source) => {
                    self.profiler.borrow_mut().task_error(task.id, current_time);
                    tracing::warn!("task {} failed: {}", task.id, source);
                    return Err(SchedulerError::TaskFailed {
                        id: task.id,
                        source,
                    });
                }
            }

            self.advance_timers(current_time);
        }

        if let Some(start_time) = self.first_timer_start() {
            self.request_host_timeout(start_time - current_time);
        }
        Ok(false)
    }

    fn should_yield(&self) -> bool {
        let elapsed = self.host.now() - self.slice_start.get();
        if elapsed < self.frame_interval.get() {
            // Blocked for less than a frame.
            return false;
        }

        if self.config.enable_is_input_pending {
            if self.needs_paint.get() {
                return true;
            }
            if elapsed < self.config.continuous_yield_ms {
                // Only discrete input is worth interrupting for this early.
                if let Some(pending) = self.host.is_input_pending(false) {
                    return pending;
                }
            } else if elapsed < self.config.max_yield_ms {
                let include_continuous = self.config.enable_is_input_pending_continuous;
                if let Some(pending) = self.host.is_input_pending(include_continuous) {
                    return pending;
                }
            } else {
                // Blocked for long enough that unknown host work may be waiting.
                return true;
            }
        }

        // No input-pending signal to consult.
        true
    }
}
