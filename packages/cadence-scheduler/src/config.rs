use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FRAME_YIELD_MS: f64 = 5.0;
pub const DEFAULT_CONTINUOUS_YIELD_MS: f64 = 50.0;
pub const DEFAULT_MAX_YIELD_MS: f64 = 300.0;

/// Tuning knobs for time slicing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Length of a time slice before `should_yield` starts returning `true`.
    pub frame_yield_ms: f64,
    /// Below this elapsed time only discrete input (clicks, keys) forces a yield.
    pub continuous_yield_ms: f64,
    /// Past this elapsed time the scheduler always yields.
    pub max_yield_ms: f64,
    /// Consult the host's input-pending signal and the paint flag.
    pub enable_is_input_pending: bool,
    /// Count continuous input (mouse moves) once past `continuous_yield_ms`.
    pub enable_is_input_pending_continuous: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_yield_ms: DEFAULT_FRAME_YIELD_MS,
            continuous_yield_ms: DEFAULT_CONTINUOUS_YIELD_MS,
            max_yield_ms: DEFAULT_MAX_YIELD_MS,
            enable_is_input_pending: true,
            enable_is_input_pending_continuous: true,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let intervals = [
            ("frame_yield_ms", self.frame_yield_ms),
            ("continuous_yield_ms", self.continuous_yield_ms),
            ("max_yield_ms", self.max_yield_ms),
        ];
        for (name, value) in intervals {
            if !value.is_finite() || value <= 0.0 {
                return Err(SchedulerError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if self.frame_yield_ms > self.continuous_yield_ms
            || self.continuous_yield_ms > self.max_yield_ms
        {
            return Err(SchedulerError::InvalidConfig(format!(
                "expected frame_yield_ms <= continuous_yield_ms <= max_yield_ms, got {} / {} / {}",
                self.frame_yield_ms, self.continuous_yield_ms, self.max_yield_ms
            )));
        }

        Ok(())
    }
}
