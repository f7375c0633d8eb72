// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use strand_sched::{CoStatus, Event, EventStatus, Scheduler, SchedulerConfig, TaskContext};

async fn idle(ctx: TaskContext, _: ()) {
    ctx.stall().await;
}

fn flag() -> (Rc<Cell<bool>>, Rc<Cell<bool>>) {
    let flag = Rc::new(Cell::new(false));
    (flag.clone(), flag)
}

// --- TEARDOWN ---

#[test]
fn test_finish_runs_every_finalizer_once() {
    // --- 1. ARRANGE ---
    let sched = Scheduler::new();
    let calls = Rc::new(Cell::new(0));
    let mut tasks = Vec::new();
    for i in 0..4 {
        let task = sched.new_task(format!("idle {i}"), idle, ());
        let calls = calls.clone();
        sched.set_finalizer(task, move || calls.set(calls.get() + 1));
        tasks.push(task);
    }
    sched.run_tasks();
    sched.cancel(tasks[0]);

    // --- 2. ACT ---
    sched.finish();

    // --- 3. ASSERT ---
    assert_eq!(calls.get(), 4, "Each finalizer should run exactly once");
    assert_eq!(sched.num_active(), 0);
    assert_eq!(sched.num_pending(), 0);
    assert_eq!(sched.stats().tasks_in_use, 0);
    assert!(tasks.iter().all(|&task| sched.unbox(task).is_none()));
}

#[test]
fn test_finish_fails_blocking_waits_first() {
    let sched = Scheduler::new();
    let event = sched.new_event();
    let seen: Rc<Cell<Option<EventStatus>>> = Rc::new(Cell::new(None));
    let cleaned_up = Rc::new(Cell::new(false));

    let out = seen.clone();
    let cleanup = cleaned_up.clone();
    sched.new_task(
        "blocked",
        move |ctx, event: Event| async move {
            let result = ctx.wait_event(&event).await;
            out.set(Some(result.status));
            cleanup.set(true);
            ctx.stall().await;
        },
        event.clone(),
    );
    sched.run_tasks();

    sched.finish();

    assert_eq!(seen.get(), Some(EventStatus::Canceled));
    assert!(cleaned_up.get(), "The waiter should get to clean up before it is killed");
    assert!(!event.is_live());
}

#[test]
fn test_finish_can_skip_the_event_pass() {
    let sched = Scheduler::with_config(SchedulerConfig {
        cancel_waits_on_finish: false,
        ..Default::default()
    });
    let event = sched.new_event();
    let (woken, seen) = flag();

    sched.new_task(
        "blocked",
        move |ctx, event: Event| async move {
            ctx.wait_event(&event).await;
            woken.set(true);
        },
        event.clone(),
    );
    sched.finish();

    assert!(!seen.get(), "The waiter must be killed without resuming");
    assert!(event.is_live(), "The event is not ours to cancel");
}

#[test]
fn test_finalizer_spawning_during_finish_is_drained() {
    let sched = Rc::new(Scheduler::new());
    let (spawned, seen) = flag();

    let task = sched.new_task("parent", idle, ());
    let weak = Rc::downgrade(&sched);
    sched.set_finalizer(task, move || {
        if let Some(sched) = weak.upgrade() {
            sched.new_task("late", idle, ());
            spawned.set(true);
        }
    });

    sched.finish();
    assert!(seen.get());
    assert_eq!(sched.num_pending() + sched.num_active(), 0);
}

#[test]
fn test_dropping_scheduler_tears_down_tasks() {
    let (finalized, seen) = flag();
    {
        let sched = Scheduler::new();
        let task = sched.new_task("leftover", idle, ());
        sched.set_finalizer(task, move || finalized.set(true));
    }
    assert!(seen.get());
}

// --- INVOCATION HELPERS ---

#[test]
fn test_delayed_task_starts_after_delay() {
    let sched = Scheduler::new();
    let (started, seen) = flag();

    sched.new_task_delayed(
        "delayed",
        2,
        move |_ctx, ()| async move {
            started.set(true);
        },
        (),
    );
    sched.run_tasks();
    assert!(!seen.get());
    sched.run_tasks();
    assert!(seen.get());
}

#[test]
fn test_negative_delay_never_starts() {
    let sched = Scheduler::new();
    let (started, seen) = flag();

    let task = sched.new_task_delayed(
        "never",
        -1,
        move |_ctx, ()| async move {
            started.set(true);
        },
        (),
    );
    sched.run_tasks();
    assert!(!seen.get());
    assert_eq!(sched.status(task), CoStatus::Dead);
}

#[test]
fn test_task_when_requires_signal() {
    let sched = Scheduler::new();
    let signaled = sched.new_event();
    let cancelled = sched.new_event();
    let ran = Rc::new(RefCell::new(Vec::new()));

    for (name, event) in [("on signal", &signaled), ("on cancel", &cancelled)] {
        let ran = ran.clone();
        sched.new_task_when(
            name,
            event,
            move |_ctx, name: &'static str| async move {
                ran.borrow_mut().push(name);
            },
            name,
        );
    }

    sched.signal(&signaled);
    sched.cancel_event(&cancelled);
    assert_eq!(*ran.borrow(), vec!["on signal"]);
}

#[test]
fn test_task_after_runs_on_cancel_too() {
    let sched = Scheduler::new();
    let event = sched.new_event();
    let (ran, seen) = flag();

    sched.new_task_after(
        "after",
        &event,
        move |_ctx, ()| async move {
            ran.set(true);
        },
        (),
    );
    sched.cancel_event(&event);
    assert!(seen.get());
}

#[test]
fn test_cancel_task_when_and_after() {
    let sched = Scheduler::new();
    let trigger = sched.new_event();
    let abort = sched.new_event();

    let on_signal = sched.new_task("on signal", idle, ());
    let on_cancel = sched.new_task("on cancel", idle, ());
    let survivor = sched.new_task("survivor", idle, ());

    sched.cancel_task_when(&trigger, on_signal);
    sched.cancel_task_after(&abort, on_cancel);
    sched.cancel_task_when(&abort, survivor);

    sched.signal(&trigger);
    sched.cancel_event(&abort);

    assert_eq!(sched.status(on_signal), CoStatus::Dead);
    assert_eq!(sched.status(on_cancel), CoStatus::Dead);
    assert_eq!(sched.status(survivor), CoStatus::Suspended);
}

#[test]
fn test_spawn_helpers_from_inside_a_task() {
    let sched = Scheduler::new();
    let ready = sched.new_event();
    let log = Rc::new(RefCell::new(Vec::new()));

    let out = log.clone();
    sched.new_task(
        "director",
        move |ctx, ready: Event| async move {
            let first = out.clone();
            ctx.spawn_when(
                "greeter",
                &ready,
                move |_ctx, ()| async move { first.borrow_mut().push("greet") },
                (),
            )
            .await;
            let second = out.clone();
            ctx.spawn_delayed(
                "follower",
                1,
                move |_ctx, ()| async move { second.borrow_mut().push("follow") },
                (),
            )
            .await;
            let target = ctx.spawn("target", idle, ()).await;
            ctx.cancel_task_after(&ready, target).await;
            ctx.signal(&ready).await;
            out.borrow_mut().push(if ctx.status(target).is_dead() {
                "target down"
            } else {
                "target up"
            });
        },
        ready.clone(),
    );
    sched.run_tasks();

    assert_eq!(*log.borrow(), vec!["greet", "target down", "follow"]);
}
