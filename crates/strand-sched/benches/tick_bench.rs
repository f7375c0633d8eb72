use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use strand_sched::{Event, Scheduler, TaskContext};

async fn spinner(ctx: TaskContext, _: ()) {
    let mut frames = 0u64;
    loop {
        frames += 1;
        black_box(frames);
        ctx.yield_now().await;
    }
}

async fn listener(ctx: TaskContext, event: Event) {
    while ctx.wait_event(&event).await.is_signaled() {}
}

fn bench_ticks(c: &mut Criterion) {
    let sched = Scheduler::new();

    // Setup 10,000 tasks
    for _ in 0..10_000 {
        sched.new_task("spinner", spinner, ());
    }
    sched.run_tasks();

    let mut group = c.benchmark_group("Scheduler Ticks");

    group.bench_function("run_tasks (10k spinning tasks)", |b| {
        b.iter(|| black_box(sched.run_tasks()));
    });

    group.bench_function("spawn + complete", |b| {
        let sched = Scheduler::new();
        b.iter(|| {
            sched.new_task(
                "oneshot",
                |_ctx, n: u32| async move {
                    black_box(n);
                },
                7,
            );
            sched.run_tasks();
        });
    });

    group.bench_function("signal (1k waiters)", |b| {
        b.iter_batched(
            || {
                let sched = Scheduler::new();
                let event = sched.new_event();
                for _ in 0..1_000 {
                    sched.new_task("listener", listener, event.clone());
                }
                (sched, event)
            },
            |(sched, event)| {
                sched.signal(&event);
                (sched, event)
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_ticks);
criterion_main!(benches);
