use crate::task::{BoxError, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task callback returned an error. The task is not retried.
    #[error("task {id} failed")]
    TaskFailed {
        id: TaskId,
        #[source]
        source: BoxError,
    },

    /// A synchronous callback failed. Entries queued after it are kept and
    /// a fresh flush has already been scheduled for them.
    #[error("sync callback at index {index} failed")]
    SyncCallbackFailed {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error(
        "force_frame_rate takes a value between 0 and 125, got {0}; \
         frame rates higher than 125 fps are not supported"
    )]
    InvalidFrameRate(f64),

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// The error returned by the user callback, if this error wraps one.
    pub fn callback_error(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::TaskFailed { source, .. }
            | SchedulerError::SyncCallbackFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
