use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskfiber::{Scheduler, SchedulerParams};

#[test]
fn no_task_is_lost_across_workers() {
    let scheduler = Scheduler::with_workers(4);
    let counter = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    let task_count = 5_000;
    for _ in 0..task_count {
        let counter = counter.clone();
        scheduler
            .submit_fn(&group, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("submission failed");
    }

    scheduler.wait(&group);
    assert_eq!(counter.load(Ordering::SeqCst), task_count);
    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn uneven_work_still_drains() {
    // Round-robin puts every fourth task on the slow path's worker; the
    // other workers must steal the backlog for the group to finish quickly.
    let scheduler = Scheduler::with_workers(4);
    let counter = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    let task_count = 400;
    for index in 0..task_count {
        let counter = counter.clone();
        scheduler
            .submit_fn(&group, move |_| {
                if index == 0 {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("submission failed");
    }

    scheduler.wait(&group);
    assert_eq!(counter.load(Ordering::SeqCst), task_count);
    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn single_worker_executes_everything_in_order_of_need() {
    let scheduler = Scheduler::with_workers(1);
    let counter = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    for _ in 0..100 {
        let counter = counter.clone();
        scheduler
            .submit_fn(&group, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("submission failed");
    }

    scheduler.wait(&group);
    assert_eq!(counter.load(Ordering::SeqCst), 100);
    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn pinned_workers_complete_work() {
    let scheduler = Scheduler::new(SchedulerParams {
        worker_count: 2,
        pin_workers: true,
        ..SchedulerParams::default()
    });
    let counter = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    for _ in 0..64 {
        let counter = counter.clone();
        scheduler
            .submit_fn(&group, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("submission failed");
    }

    scheduler.wait(&group);
    assert_eq!(counter.load(Ordering::SeqCst), 64);
    scheduler.shutdown().expect("shutdown failed");
}
