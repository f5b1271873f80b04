use super::{HostCallback, TimeoutId};
use slotmap::SlotMap;

struct PendingTimeout {
    deadline: f64,
    // Breaks ties between equal deadlines in request order.
    seq: u64,
    callback: HostCallback,
}

/// Delayed callbacks keyed by their cancel token, shared by the adapters
/// that run their own loop.
#[derive(Default)]
pub(crate) struct TimeoutTable {
    entries: SlotMap<TimeoutId, PendingTimeout>,
    next_seq: u64,
}

impl TimeoutTable {
    pub(crate) fn insert(&mut self, deadline: f64, callback: HostCallback) -> TimeoutId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(PendingTimeout {
            deadline,
            seq,
            callback,
        })
    }

    pub(crate) fn remove(&mut self, id: TimeoutId) -> Option<HostCallback> {
        self.entries.remove(id).map(|timeout| timeout.callback)
    }

    pub(crate) fn earliest(&self) -> Option<(TimeoutId, f64)> {
        self.entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.deadline
                    .total_cmp(&b.deadline)
                    .then_with(|| a.seq.cmp(&b.seq))
            })
            .map(|(id, timeout)| (id, timeout.deadline))
    }

    /// Removes and returns the earliest callback whose deadline has passed.
    pub(crate) fn take_due(&mut self, now: f64) -> Option<HostCallback> {
        let (id, deadline) = self.earliest()?;
        if deadline > now {
            return None;
        }
        self.remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
