use cadence_scheduler::{
    Continuation, InputState, PriorityLevel, Scheduler, SchedulerConfig, SchedulerError,
    TaskResult, VirtualHost,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn setup() -> (Rc<VirtualHost>, Scheduler) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let host = Rc::new(VirtualHost::new());
    let scheduler = Scheduler::new(host.clone());
    (host, scheduler)
}

/// A task that burns `ms` of virtual time and logs its name.
fn busy(
    host: &Rc<VirtualHost>,
    log: &Rc<RefCell<Vec<String>>>,
    name: &str,
    ms: f64,
) -> impl FnOnce(bool) -> TaskResult + use<> {
    let host = host.clone();
    let log = log.clone();
    let name = name.to_string();
    move |_| {
        host.advance_time(ms);
        log.borrow_mut().push(name);
        Ok(Continuation::Done)
    }
}

#[test]
fn test_scheduler_yielding() {
    let (host, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    // Initially idle
    assert!(host.is_idle());
    assert!(!scheduler.has_pending_work());

    scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, "task1", 3.0));
    scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, "task2", 3.0));
    scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, "task3", 3.0));
    assert_eq!(host.pending_soon(), 1);

    // 6ms into the slice the frame budget is spent.
    host.run_next_soon().unwrap().unwrap();
    assert_eq!(*log.borrow(), vec!["task1", "task2"]);
    assert_eq!(host.pending_soon(), 1);

    host.run_next_soon().unwrap().unwrap();
    assert_eq!(*log.borrow(), vec!["task1", "task2", "task3"]);
    assert!(host.is_idle());
}

#[test]
fn test_expired_tasks_ignore_yield() {
    let (host, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    scheduler.schedule_task(PriorityLevel::Immediate, busy(&host, &log, "a", 10.0));
    scheduler.schedule_task(PriorityLevel::Immediate, busy(&host, &log, "b", 10.0));
    scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, "c", 10.0));

    host.run_next_soon().unwrap().unwrap();
    assert_eq!(*log.borrow(), vec!["a", "b"]);

    host.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn test_continuation_recomputes_did_timeout() {
    let (host, scheduler) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let h = host.clone();
    let s = seen.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |did_timeout| {
        s.borrow_mut().push(did_timeout);
        h.advance_time(6000.0);
        Ok(Continuation::continue_with(move |did_timeout| {
            s.borrow_mut().push(did_timeout);
            Ok(Continuation::Done)
        }))
    });

    host.run_until_idle().unwrap();
    assert_eq!(*seen.borrow(), vec![false, true]);

    let stats = scheduler.stats();
    assert_eq!(stats.tasks_run, 2);
    assert_eq!(stats.tasks_yielded, 1);
    assert_eq!(stats.tasks_completed, 1);
}

#[test]
fn test_continuation_keeps_its_place() {
    let (host, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    let s = scheduler.clone();
    let l = log.clone();
    let handle = scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        l.borrow_mut().push("a1".to_string());
        let urgent = l.clone();
        s.schedule_task(PriorityLevel::Immediate, move |_| {
            urgent.borrow_mut().push("urgent".to_string());
            Ok(Continuation::Done)
        });
        Ok(Continuation::continue_with(move |_| {
            l.borrow_mut().push("a2".to_string());
            Ok(Continuation::Done)
        }))
    });
    let l = log.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        l.borrow_mut().push("b".to_string());
        Ok(Continuation::Done)
    });

    host.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["a1", "urgent", "a2", "b"]);
    assert!(!handle.is_pending());
}

#[test]
fn test_long_task_yields_between_steps() {
    let (host, scheduler) = setup();
    let steps = Rc::new(Cell::new(0));

    fn step(host: Rc<VirtualHost>, steps: Rc<Cell<u32>>) -> TaskResult {
        host.advance_time(10.0);
        steps.set(steps.get() + 1);
        if steps.get() == 3 {
            Ok(Continuation::Done)
        } else {
            Ok(Continuation::continue_with(move |_| step(host, steps)))
        }
    }

    let h = host.clone();
    let s = steps.clone();
    let handle = scheduler.schedule_task(PriorityLevel::Normal, move |_| step(h, s));

    for expected in 1..=3 {
        assert!(handle.is_pending());
        host.run_next_soon().unwrap().unwrap();
        assert_eq!(steps.get(), expected);
    }
    assert!(host.is_idle());
    assert!(!handle.is_pending());
}

#[test]
fn test_should_yield_without_input_signal() {
    let (host, scheduler) = setup();
    let results = Rc::new(RefCell::new(Vec::new()));

    let h = host.clone();
    let s = scheduler.clone();
    let r = results.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        h.advance_time(4.0);
        r.borrow_mut().push(s.should_yield());
        h.advance_time(1.0);
        r.borrow_mut().push(s.should_yield());
        Ok(Continuation::Done)
    });

    host.run_until_idle().unwrap();
    assert_eq!(*results.borrow(), vec![false, true]);
}

#[test]
fn test_should_yield_with_input_signal() {
    let (host, scheduler) = setup();
    host.set_input_pending(Some(InputState::default()));
    let results = Rc::new(RefCell::new(Vec::new()));

    let h = host.clone();
    let s = scheduler.clone();
    let r = results.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        // No input: keep going past the frame interval.
        h.advance_time(10.0);
        r.borrow_mut().push(s.should_yield());

        // Continuous input only counts after 50ms.
        h.set_input_pending(Some(InputState {
            discrete: false,
            continuous: true,
        }));
        r.borrow_mut().push(s.should_yield());
        h.advance_time(50.0);
        r.borrow_mut().push(s.should_yield());

        // Past 300ms the scheduler yields regardless.
        h.set_input_pending(Some(InputState::default()));
        r.borrow_mut().push(s.should_yield());
        h.advance_time(300.0);
        r.borrow_mut().push(s.should_yield());
        Ok(Continuation::Done)
    });

    host.run_until_idle().unwrap();
    assert_eq!(*results.borrow(), vec![false, false, true, false, true]);
}

#[test]
fn test_discrete_input_forces_yield() {
    let (host, scheduler) = setup();
    host.set_input_pending(Some(InputState {
        discrete: true,
        continuous: false,
    }));
    let result = Rc::new(Cell::new(false));

    let h = host.clone();
    let s = scheduler.clone();
    let r = result.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        h.advance_time(6.0);
        r.set(s.should_yield());
        Ok(Continuation::Done)
    });

    host.run_until_idle().unwrap();
    assert!(result.get());
}

#[test]
fn test_request_paint_ends_slice() {
    let (host, scheduler) = setup();
    host.set_input_pending(Some(InputState::default()));
    let results = Rc::new(RefCell::new(Vec::new()));

    let h = host.clone();
    let s = scheduler.clone();
    let r = results.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        h.advance_time(10.0);
        r.borrow_mut().push(s.should_yield());
        s.request_paint();
        r.borrow_mut().push(s.should_yield());
        Ok(Continuation::Done)
    });
    host.run_until_idle().unwrap();
    assert_eq!(*results.borrow(), vec![false, true]);

    // The paint flag is cleared when the slice ends.
    let h = host.clone();
    let s = scheduler.clone();
    let r = results.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        h.advance_time(10.0);
        r.borrow_mut().push(s.should_yield());
        Ok(Continuation::Done)
    });
    host.run_until_idle().unwrap();
    assert_eq!(*results.borrow(), vec![false, true, false]);
}

#[test]
fn test_force_frame_rate() {
    let (host, scheduler) = setup();
    assert_eq!(scheduler.frame_interval(), 5.0);

    scheduler.force_frame_rate(60.0).unwrap();
    assert_eq!(scheduler.frame_interval(), 16.0);

    assert!(matches!(
        scheduler.force_frame_rate(200.0),
        Err(SchedulerError::InvalidFrameRate(_))
    ));
    assert!(scheduler.force_frame_rate(-1.0).is_err());
    assert!(scheduler.force_frame_rate(f64::NAN).is_err());
    assert_eq!(scheduler.frame_interval(), 16.0);

    let log = Rc::new(RefCell::new(Vec::new()));
    for name in ["a", "b", "c"] {
        scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, name, 6.0));
    }
    host.run_next_soon().unwrap().unwrap();
    assert_eq!(log.borrow().len(), 3);

    scheduler.force_frame_rate(0.0).unwrap();
    assert_eq!(scheduler.frame_interval(), 5.0);
}

#[test]
fn test_custom_frame_yield() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let host = Rc::new(VirtualHost::new());
    let config = SchedulerConfig {
        frame_yield_ms: 20.0,
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::with_config(host.clone(), config).unwrap();
    assert_eq!(scheduler.frame_interval(), 20.0);

    let log = Rc::new(RefCell::new(Vec::new()));
    for name in ["a", "b", "c", "d"] {
        scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, name, 7.0));
    }
    host.run_next_soon().unwrap().unwrap();
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn test_pause_from_inside_task() {
    let (host, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    let s = scheduler.clone();
    let l = log.clone();
    scheduler.schedule_task(PriorityLevel::Normal, move |_| {
        l.borrow_mut().push("pauser".to_string());
        s.pause_execution();
        Ok(Continuation::Done)
    });
    scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, "after", 0.0));

    host.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["pauser"]);
    assert!(scheduler.is_paused());

    scheduler.continue_execution();
    host.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["pauser", "after"]);
}

#[test]
fn test_task_error_surfaces_at_host() {
    let (host, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    let failing =
        scheduler.schedule_task(PriorityLevel::UserBlocking, |_| Err("render failed".into()));
    scheduler.schedule_task(PriorityLevel::Normal, busy(&host, &log, "next", 0.0));

    let err = host.run_until_idle().unwrap_err();
    match &err {
        SchedulerError::TaskFailed { id, .. } => assert_eq!(*id, failing.id()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.callback_error().unwrap().to_string(), "render failed");
    assert!(!failing.is_pending());

    // The remaining work runs on the next turn; the failed task is not retried.
    host.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec!["next"]);
    assert_eq!(scheduler.stats().tasks_errored, 1);
}
