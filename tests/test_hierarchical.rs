use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskfiber::{Scheduler, TaskContext};

fn fork(ctx: &TaskContext, depth: usize, fan_out: usize, leaves: Arc<AtomicUsize>) {
    if depth == 0 {
        leaves.fetch_add(1, Ordering::SeqCst);
        return;
    }

    let children = ctx.create_group();
    for _ in 0..fan_out {
        let leaves = leaves.clone();
        ctx.submit_fn(&children, move |ctx| {
            fork(ctx, depth - 1, fan_out, leaves);
        })
        .expect("child submission failed");
    }
    ctx.wait(&children);
}

#[test]
fn three_level_fork_join() {
    let scheduler = Scheduler::with_workers(4);
    let leaves = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    let leaves_root = leaves.clone();
    scheduler
        .submit_fn(&group, move |ctx| {
            fork(ctx, 3, 4, leaves_root);
        })
        .expect("submission failed");

    scheduler.wait(&group);
    assert_eq!(leaves.load(Ordering::SeqCst), 4 * 4 * 4);
    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn deep_chain_on_one_worker() {
    // Every level parks a fiber on the single worker; the chain only
    // completes if each wait releases the thread for the next level.
    let scheduler = Scheduler::with_workers(1);
    let leaves = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    let leaves_root = leaves.clone();
    scheduler
        .submit_fn(&group, move |ctx| {
            fork(ctx, 6, 1, leaves_root);
        })
        .expect("submission failed");

    scheduler.wait(&group);
    assert_eq!(leaves.load(Ordering::SeqCst), 1);
    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn sibling_subtrees_share_workers() {
    let scheduler = Scheduler::with_workers(2);
    let leaves = Arc::new(AtomicUsize::new(0));
    let group = scheduler.create_group();

    for _ in 0..4 {
        let leaves = leaves.clone();
        scheduler
            .submit_fn(&group, move |ctx| {
                fork(ctx, 2, 3, leaves);
            })
            .expect("submission failed");
    }

    scheduler.wait(&group);
    assert_eq!(leaves.load(Ordering::SeqCst), 4 * 3 * 3);
    scheduler.shutdown().expect("shutdown failed");
}
