use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use taskfiber::{ChromeTracer, Scheduler, SchedulerParams};

fn main() {
    println!("taskfiber - fiber-based task scheduler\n");

    let worker_count = 4;
    let tracer = Arc::new(ChromeTracer::for_workers(worker_count));
    let scheduler = Scheduler::new(SchedulerParams {
        worker_count,
        observer: tracer.clone(),
        ..SchedulerParams::default()
    });
    println!("started {} worker threads\n", scheduler.worker_count());

    // Example 1: a single task.
    println!("example 1: single task");
    let group = scheduler.run(|_| {
        println!("  hello from a fiber task");
    });
    scheduler.wait(&group);
    println!("  done\n");

    // Example 2: parallel fan-out.
    println!("example 2: parallel fan-out");
    let sum = Arc::new(AtomicUsize::new(0));
    let task_count = 100;
    let group = scheduler.create_group();

    let start = Instant::now();
    for i in 0..task_count {
        let sum = sum.clone();
        scheduler
            .submit_fn(&group, move |_| {
                let mut local = 0usize;
                for j in 0..1000 {
                    local = local.wrapping_add(j);
                }
                std::hint::black_box(local);
                sum.fetch_add(i, Ordering::SeqCst);
            })
            .expect("submission failed");
    }
    scheduler.wait(&group);

    let expected: usize = (0..task_count).sum();
    println!("  ran {} tasks in {:?}", task_count, start.elapsed());
    println!(
        "  sum = {} (expected {})\n",
        sum.load(Ordering::SeqCst),
        expected
    );

    // Example 3: a task that forks children and waits without holding its
    // worker hostage.
    println!("example 3: nested fork and join");
    let group = scheduler.run(|ctx| {
        let children = ctx.create_group();
        for index in 0..8 {
            ctx.submit_fn(&children, move |ctx| {
                println!("  child {} on worker {}", index, ctx.worker_id());
            })
            .expect("child submission failed");
        }
        ctx.wait(&children);
        println!("  all children joined");
    });
    scheduler.wait(&group);
    println!();

    scheduler.shutdown().expect("shutdown failed");

    let trace_path = std::env::temp_dir().join("taskfiber-trace.json");
    match tracer.export_to_file(&trace_path) {
        Ok(()) => println!("trace written to {}", trace_path.display()),
        Err(error) => eprintln!("trace export failed: {}", error),
    }
}
