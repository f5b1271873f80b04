use cadence_scheduler::{
    Continuation, PriorityLevel, ScheduleOptions, Scheduler, SyncCallbackQueue, VirtualHost,
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::rc::Rc;

fn benchmark_tasks(c: &mut Criterion) {
    c.bench_function("schedule_task 1000 mixed priorities", |b| {
        b.iter(|| {
            let host = Rc::new(VirtualHost::new());
            let scheduler = Scheduler::new(host.clone());
            for i in 0..1000u32 {
                let priority = PriorityLevel::ALL[(i % 5) as usize];
                scheduler.schedule_task(priority, move |_| {
                    black_box(i + 1);
                    Ok(Continuation::Done)
                });
            }
            host.run_until_idle().unwrap();
        })
    });
}

fn benchmark_cancel(c: &mut Criterion) {
    c.bench_function("schedule and cancel 1000", |b| {
        b.iter(|| {
            let host = Rc::new(VirtualHost::new());
            let scheduler = Scheduler::new(host.clone());
            let handles: Vec<_> = (0..1000)
                .map(|_| scheduler.schedule_task(PriorityLevel::Normal, |_| Ok(Continuation::Done)))
                .collect();
            for handle in handles.iter().step_by(2) {
                scheduler.cancel_task(handle);
            }
            host.run_until_idle().unwrap();
        })
    });
}

fn benchmark_timers(c: &mut Criterion) {
    c.bench_function("delayed tasks 1000", |b| {
        b.iter(|| {
            let host = Rc::new(VirtualHost::new());
            let scheduler = Scheduler::new(host.clone());
            for i in 0..1000u32 {
                scheduler.schedule_task_with_options(
                    PriorityLevel::Normal,
                    |_| Ok(Continuation::Done),
                    ScheduleOptions::delayed(f64::from(i % 50 + 1)),
                );
            }
            host.run_all_timers().unwrap();
        })
    });
}

fn benchmark_sync_queue(c: &mut Criterion) {
    c.bench_function("sync queue flush 1000", |b| {
        let scheduler = Scheduler::new(Rc::new(VirtualHost::new()));
        let queue = SyncCallbackQueue::new(&scheduler);
        b.iter(|| {
            for i in 0..1000u32 {
                queue.enqueue(move |_| {
                    black_box(i);
                    Ok(Continuation::Done)
                });
            }
            queue.flush().unwrap();
        })
    });
}

criterion_group!(
    benches,
    benchmark_tasks,
    benchmark_cancel,
    benchmark_timers,
    benchmark_sync_queue
);
criterion_main!(benches);
