//! Scheduler counters and an optional event log.
//!
//! Counters are always maintained. The event log only records between
//! `start_logging` and `stop_logging`, so an idle profiler costs nothing
//! beyond a flag check.

use crate::priority::PriorityLevel;
use crate::task::TaskId;
use rustc_hash::FxHashMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProfilingEvent {
    TaskStart {
        id: TaskId,
        priority: PriorityLevel,
        time: f64,
    },
    TaskRun {
        id: TaskId,
        time: f64,
    },
    TaskYield {
        id: TaskId,
        time: f64,
    },
    TaskComplete {
        id: TaskId,
        time: f64,
    },
    TaskCancel {
        id: TaskId,
        time: f64,
    },
    TaskError {
        id: TaskId,
        time: f64,
    },
    SchedulerSuspend {
        time: f64,
    },
    SchedulerUnsuspend {
        time: f64,
    },
}

#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub tasks_scheduled: u64,
    /// Callback invocations, continuations included.
    pub tasks_run: u64,
    pub tasks_yielded: u64,
    pub tasks_completed: u64,
    pub tasks_canceled: u64,
    pub tasks_errored: u64,
    pub runs_by_priority: FxHashMap<PriorityLevel, u64>,
}

impl SchedulerStats {
    pub fn runs_at(&self, priority: PriorityLevel) -> u64 {
        self.runs_by_priority.get(&priority).copied().unwrap_or(0)
    }
}

#[derive(Default)]
pub(crate) struct Profiler {
    stats: SchedulerStats,
    events: Option<Vec<ProfilingEvent>>,
}

impl Profiler {
    pub(crate) fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub(crate) fn start_logging(&mut self) {
        self.events = Some(Vec::new());
    }

    pub(crate) fn stop_logging(&mut self) -> Vec<ProfilingEvent> {
        self.events.take().unwrap_or_default()
    }

    pub(crate) fn is_logging(&self) -> bool {
        self.events.is_some()
    }

    fn record(&mut self, event: ProfilingEvent) {
        if let Some(events) = self.events.as_mut() {
            events.push(event);
        }
    }

    pub(crate) fn task_scheduled(&mut self) {
        self.stats.tasks_scheduled += 1;
    }

    pub(crate) fn task_start(&mut self, id: TaskId, priority: PriorityLevel, time: f64) {
        self.record(ProfilingEvent::TaskStart { id, priority, time });
    }

    pub(crate) fn task_run(&mut self, id: TaskId, priority: PriorityLevel, time: f64) {
        self.stats.tasks_run += 1;
        *self.stats.runs_by_priority.entry(priority).or_insert(0) += 1;
        self.record(ProfilingEvent::TaskRun { id, time });
    }

    pub(crate) fn task_yield(&mut self, id: TaskId, time: f64) {
        self.stats.tasks_yielded += 1;
        self.record(ProfilingEvent::TaskYield { id, time });
    }

    pub(crate) fn task_complete(&mut self, id: TaskId, time: f64) {
        self.stats.tasks_completed += 1;
        self.record(ProfilingEvent::TaskComplete { id, time });
    }

    pub(crate) fn task_cancel(&mut self, id: TaskId, time: f64) {
        self.stats.tasks_canceled += 1;
        self.record(ProfilingEvent::TaskCancel { id, time });
    }

    pub(crate) fn task_error(&mut self, id: TaskId, time: f64) {
        self.stats.tasks_errored += 1;
        self.record(ProfilingEvent::TaskError { id, time });
    }

    pub(crate) fn suspend(&mut self, time: f64) {
        self.record(ProfilingEvent::SchedulerSuspend { time });
    }

    pub(crate) fn unsuspend(&mut self, time: f64) {
        self.record(ProfilingEvent::SchedulerUnsuspend { time });
    }
}

/// Serializes a drained event log, for dumping to a trace viewer or a file.
pub fn events_to_json(events: &[ProfilingEvent]) -> serde_json::Result<String> {
    serde_json::to_string(events)
}
