//! Cooperative priority task scheduler.
//!
//! Work is submitted with a [`PriorityLevel`] and executed in bounded time
//! slices on a host event loop, so the host never appears blocked for long.
//! Long-running work yields mid-task by returning
//! [`Continuation::Continue`]. A separate [`SyncCallbackQueue`] holds work that
//! must finish before control returns to the caller.
//!
//! The scheduler never owns a thread. It is driven through the [`Host`]
//! trait: [`VirtualHost`] for deterministic tests, [`EventLoopHost`] for a
//! plain thread, and `TokioHost` (feature `tokio`) for a tokio `LocalSet`.

mod config;
mod error;
mod guard;
pub mod heap;
pub mod host;
mod priority;
pub mod profiling;
mod scheduler;
mod sync_queue;
mod task;

pub use config::{
    DEFAULT_CONTINUOUS_YIELD_MS, DEFAULT_FRAME_YIELD_MS, DEFAULT_MAX_YIELD_MS, SchedulerConfig,
};
pub use error::SchedulerError;
#[cfg(feature = "tokio")]
pub use host::TokioHost;
pub use host::{EventLoopHost, Host, HostCallback, InputState, TimeoutId, VirtualHost};
pub use priority::{
    IDLE_PRIORITY_TIMEOUT, IMMEDIATE_PRIORITY_TIMEOUT, LOW_PRIORITY_TIMEOUT, MAX_SIGNED_31_BIT_INT,
    NORMAL_PRIORITY_TIMEOUT, PriorityLevel, USER_BLOCKING_PRIORITY_TIMEOUT,
};
pub use profiling::{ProfilingEvent, SchedulerStats, events_to_json};
pub use scheduler::Scheduler;
pub use sync_queue::SyncCallbackQueue;
pub use task::{
    BoxError, Continuation, ScheduleOptions, TaskCallback, TaskHandle, TaskId, TaskResult,
};
