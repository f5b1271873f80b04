use crate::priority::PriorityLevel;
use std::cell::Cell;

/// Holds a reentrancy flag for the lifetime of a region. The flag is reset
/// when the guard drops, which covers early returns, `?`, and unwinding.
pub(crate) struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> FlagGuard<'a> {
    /// Sets the flag unconditionally.
    pub(crate) fn hold(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }

    /// Returns `None` if the flag is already held.
    pub(crate) fn try_acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Swaps the ambient priority and puts the previous one back on drop.
pub(crate) struct PriorityGuard<'a> {
    current: &'a Cell<PriorityLevel>,
    previous: PriorityLevel,
}

impl<'a> PriorityGuard<'a> {
    pub(crate) fn enter(current: &'a Cell<PriorityLevel>, level: PriorityLevel) -> Self {
        let previous = current.replace(level);
        Self { current, previous }
    }

    /// Remembers the current level without changing it.
    pub(crate) fn save(current: &'a Cell<PriorityLevel>) -> Self {
        Self {
            current,
            previous: current.get(),
        }
    }
}

impl Drop for PriorityGuard<'_> {
    fn drop(&mut self) {
        self.current.set(self.previous);
    }
}
