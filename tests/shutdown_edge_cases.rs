use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskfiber::Scheduler;

#[test]
fn shutdown_waits_for_running_tasks() {
    let scheduler = Scheduler::with_workers(2);
    let completed = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    for _ in 0..10 {
        let completed = completed.clone();
        scheduler
            .submit_fn(&group, move |_| {
                std::thread::sleep(Duration::from_millis(10));
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .expect("submission failed");
    }

    // No wait before shutdown: the drain itself must run everything.
    scheduler.shutdown().expect("shutdown failed");
    assert_eq!(completed.load(Ordering::SeqCst), 10);
}

#[test]
fn shutdown_with_no_work_returns_promptly() {
    let scheduler = Scheduler::with_workers(4);
    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn dropping_the_scheduler_drains_like_shutdown() {
    let completed = Arc::new(AtomicUsize::new(0));
    {
        let scheduler = Scheduler::with_workers(2);
        let group = scheduler.create_group();
        for _ in 0..10 {
            let completed = completed.clone();
            scheduler
                .submit_fn(&group, move |_| {
                    std::thread::sleep(Duration::from_millis(5));
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .expect("submission failed");
        }
    }
    assert_eq!(completed.load(Ordering::SeqCst), 10);
}

#[test]
fn tasks_submitted_from_tasks_drain_before_shutdown() {
    let scheduler = Scheduler::with_workers(2);
    let completed = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    let completed_outer = completed.clone();
    scheduler
        .submit_fn(&group, move |ctx| {
            let children = ctx.create_group();
            for _ in 0..5 {
                let completed = completed_outer.clone();
                ctx.submit_fn(&children, move |_| {
                    std::thread::sleep(Duration::from_millis(5));
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .expect("child submission failed");
            }
            ctx.wait(&children);
            completed_outer.fetch_add(1, Ordering::SeqCst);
        })
        .expect("submission failed");

    scheduler.shutdown().expect("shutdown failed");
    assert_eq!(completed.load(Ordering::SeqCst), 6);
}
