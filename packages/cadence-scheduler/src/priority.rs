use serde::{Deserialize, Serialize};

// Max 31 bit integer, used as the "never times out" sentinel.
pub const MAX_SIGNED_31_BIT_INT: f64 = 1_073_741_823.0;

pub const IMMEDIATE_PRIORITY_TIMEOUT: f64 = -1.0;
pub const USER_BLOCKING_PRIORITY_TIMEOUT: f64 = 250.0;
pub const NORMAL_PRIORITY_TIMEOUT: f64 = 5000.0;
pub const LOW_PRIORITY_TIMEOUT: f64 = 10000.0;
pub const IDLE_PRIORITY_TIMEOUT: f64 = MAX_SIGNED_31_BIT_INT;

/// Urgency class of a task.
///
/// Lower discriminants are more urgent. Each level maps to a timeout that
/// bounds how long a ready task may wait before it is treated as expired and
/// runs even if that overruns the current time slice.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum PriorityLevel {
    Immediate = 1,
    UserBlocking = 2,
    #[default]
    Normal = 3,
    Low = 4,
    Idle = 5,
}

impl PriorityLevel {
    pub const ALL: [PriorityLevel; 5] = [
        PriorityLevel::Immediate,
        PriorityLevel::UserBlocking,
        PriorityLevel::Normal,
        PriorityLevel::Low,
        PriorityLevel::Idle,
    ];

    /// Converts a raw level coming from outside the type system.
    /// Unknown values are normalized to `Normal` instead of failing.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => PriorityLevel::Immediate,
            2 => PriorityLevel::UserBlocking,
            3 => PriorityLevel::Normal,
            4 => PriorityLevel::Low,
            5 => PriorityLevel::Idle,
            _ => PriorityLevel::Normal,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Milliseconds added to a task's start time to get its expiration time.
    pub fn timeout(self) -> f64 {
        match self {
            PriorityLevel::Immediate => IMMEDIATE_PRIORITY_TIMEOUT,
            PriorityLevel::UserBlocking => USER_BLOCKING_PRIORITY_TIMEOUT,
            PriorityLevel::Normal => NORMAL_PRIORITY_TIMEOUT,
            PriorityLevel::Low => LOW_PRIORITY_TIMEOUT,
            PriorityLevel::Idle => IDLE_PRIORITY_TIMEOUT,
        }
    }

    /// Level used by `run_next`: urgent levels shift down to `Normal`,
    /// anything already below `Normal` is kept.
    pub fn next_level(self) -> Self {
        match self {
            PriorityLevel::Immediate | PriorityLevel::UserBlocking | PriorityLevel::Normal => {
                PriorityLevel::Normal
            }
            other => other,
        }
    }
}

impl From<u8> for PriorityLevel {
    fn from(raw: u8) -> Self {
        PriorityLevel::from_raw(raw)
    }
}
