//! Host bridge: the primitives a hosting event loop lends to the scheduler.
//!
//! The scheduler never owns a thread or an event loop. It asks the host to
//! call it back soon, or after a delay, and trusts the host's clock. Each
//! deployment target supplies its own adapter.

mod event_loop;
mod timeouts;
#[cfg(feature = "tokio")]
mod tokio_host;
mod virtual_host;

pub use event_loop::EventLoopHost;
#[cfg(feature = "tokio")]
pub use tokio_host::TokioHost;
pub use virtual_host::{InputState, VirtualHost};

use crate::error::SchedulerError;
use slotmap::new_key_type;
use std::time::Duration;

new_key_type! {
    /// Cancel token for a delayed host callback.
    pub struct TimeoutId;
}

/// Callback handed to the host. Errors are those raised by scheduled work
/// during the slice the callback drove; the host decides how to surface them.
pub type HostCallback = Box<dyn FnOnce() -> Result<(), SchedulerError>>;

pub trait Host {
    /// Monotonic clock in milliseconds.
    fn now(&self) -> f64;

    /// Run `callback` once, as soon as the current turn of the host loop ends.
    fn request_soon(&self, callback: HostCallback);

    /// Run `callback` once, no earlier than `delay_ms` from now.
    fn request_after(&self, callback: HostCallback, delay_ms: f64) -> TimeoutId;

    /// Cancel a delayed callback. Unknown or already-fired ids are ignored.
    fn cancel_timeout(&self, id: TimeoutId);

    /// Whether user input is waiting to be handled. `None` means the host has
    /// no way to tell, in which case the scheduler yields at every slice end.
    fn is_input_pending(&self, _include_continuous: bool) -> Option<bool> {
        None
    }
}

/// Converts a millisecond delay to a `Duration`. Negative and NaN delays
/// become zero; delays too large to represent saturate at `Duration::MAX`.
pub(crate) fn delay_to_duration(delay_ms: f64) -> Duration {
    if delay_ms.is_nan() || delay_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(delay_ms / 1000.0).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_to_duration() {
        assert_eq!(delay_to_duration(5.0), Duration::from_millis(5));
        assert_eq!(delay_to_duration(0.0), Duration::ZERO);
        assert_eq!(delay_to_duration(-10.0), Duration::ZERO);
        assert_eq!(delay_to_duration(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_huge_delay_saturates() {
        assert_eq!(delay_to_duration(1e300), Duration::MAX);
        assert_eq!(delay_to_duration(f64::INFINITY), Duration::MAX);
    }
}
