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

//! The game-loop facing side of the task scheduler.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use strand_core::{BoxedTask, CoStatus, ObjectLink, SchedulerConfig, TaskStats, TaskValue};

use crate::context::TaskContext;
use crate::event::Event;
use crate::runtime::Runtime;

/// A cooperative, single-threaded task scheduler.
///
/// Tasks are created with [`Scheduler::new_task`] and run up to their first
/// yield point right away. From then on the game loop calls
/// [`Scheduler::run_tasks`] once per tick, which resumes every live task once
/// in creation order and releases the dead ones.
///
/// Dropping a scheduler that still owns tasks tears them down as
/// [`Scheduler::finish`] does.
pub struct Scheduler {
    rt: Rc<Runtime>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.rt.num_pending())
            .field("active", &self.rt.num_active())
            .field("stats", &self.rt.stats())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler with the given configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            rt: Runtime::new(config),
        }
    }

    /// The configuration this scheduler was created with.
    pub fn config(&self) -> &SchedulerConfig {
        self.rt.config()
    }

    // --- Tasks ---

    /// Creates a task running `entry(ctx, arg)` and runs it up to its first yield point.
    ///
    /// The task joins the active list on the next [`Scheduler::run_tasks`].
    pub fn new_task<A, F, Fut>(&self, name: impl Into<String>, entry: F, arg: A) -> BoxedTask
    where
        F: FnOnce(TaskContext, A) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        self.rt.spawn(name.into(), None, entry, arg)
    }

    /// Creates a task whose body starts after `delay` ticks. A negative delay means never.
    pub fn new_task_delayed<A, F, Fut>(
        &self,
        name: impl Into<String>,
        delay: i32,
        entry: F,
        arg: A,
    ) -> BoxedTask
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.rt.spawn_delayed(name.into(), delay, entry, arg)
    }

    /// Creates a task whose body runs only if `event` is signaled.
    pub fn new_task_when<A, F, Fut>(
        &self,
        name: impl Into<String>,
        event: &Event,
        entry: F,
        arg: A,
    ) -> BoxedTask
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.rt
            .spawn_on_event(name.into(), event.clone(), false, entry, arg)
    }

    /// Creates a task whose body runs once `event` is signaled or cancelled.
    pub fn new_task_after<A, F, Fut>(
        &self,
        name: impl Into<String>,
        event: &Event,
        entry: F,
        arg: A,
    ) -> BoxedTask
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.rt
            .spawn_on_event(name.into(), event.clone(), true, entry, arg)
    }

    /// Kills `task` when `event` is signaled. Returns the watcher task.
    pub fn cancel_task_when(&self, event: &Event, task: BoxedTask) -> BoxedTask {
        self.rt.cancel_on_event(event.clone(), task, false)
    }

    /// Kills `task` when `event` is signaled or cancelled. Returns the watcher task.
    pub fn cancel_task_after(&self, event: &Event, task: BoxedTask) -> BoxedTask {
        self.rt.cancel_on_event(event.clone(), task, true)
    }

    /// Advances every live task by one step. Returns the number of tasks resumed.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a task body.
    pub fn run_tasks(&self) -> usize {
        self.rt.run_tasks()
    }

    /// Kills every task and returns all slots to the pool.
    ///
    /// With [`SchedulerConfig::cancel_waits_on_finish`] set, the events tasks
    /// are blocked on are cancelled first so waiters can observe the failure.
    /// Every finalizer runs exactly once.
    pub fn finish(&self) {
        self.rt.finish();
    }

    /// Resumes a suspended task by hand, passing it `value`.
    ///
    /// Returns the value the task yields next, if any. A task whose bound
    /// object is gone is killed instead and `None` is returned.
    ///
    /// # Panics
    ///
    /// Panics if the task is not suspended.
    pub fn resume(&self, task: BoxedTask, value: Option<TaskValue>) -> Option<TaskValue> {
        self.rt.resume(task, value)
    }

    /// Kills a task at its last yield point. Returns `false` if it was already dead.
    pub fn cancel(&self, task: BoxedTask) -> bool {
        self.rt.cancel(task)
    }

    /// The task's status. Handles to released or recycled slots report [`CoStatus::Dead`].
    pub fn status(&self, task: BoxedTask) -> CoStatus {
        self.rt.status(task)
    }

    /// Binds a task to a simulation object. `None` kills the task immediately.
    ///
    /// Binding a task that already died does nothing.
    ///
    /// # Panics
    ///
    /// Panics if the task is already bound or no longer exists.
    pub fn bind_to_object<L: ObjectLink + 'static>(&self, task: BoxedTask, link: Option<L>) {
        self.rt.bind(
            task,
            link.map(|link| Box::new(link) as Box<dyn ObjectLink>),
        );
    }

    /// Registers code to run once when the task dies.
    ///
    /// # Panics
    ///
    /// Panics if a finalizer was already set.
    pub fn set_finalizer(&self, task: BoxedTask, finalizer: impl FnOnce() + 'static) {
        self.rt.set_finalizer(task, Box::new(finalizer));
    }

    /// Checks a boxed handle against the pool. Returns the task if it still exists.
    pub fn unbox(&self, task: BoxedTask) -> Option<BoxedTask> {
        self.rt.is_valid(task).then_some(task)
    }

    /// Builds a handle to whatever task currently occupies slot `index`.
    ///
    /// A free slot yields a handle with generation zero, which never resolves.
    pub fn handle_at(&self, index: u32) -> BoxedTask {
        BoxedTask::new(index, self.rt.live_generation(index))
    }

    /// The name a task was created with.
    pub fn task_name(&self, task: BoxedTask) -> Option<String> {
        self.rt.task_name(task)
    }

    /// The event signaled when `task` completes and cancelled when it is finalized.
    pub fn finished_event(&self, task: BoxedTask) -> Option<Event> {
        self.rt.finished_event(task)
    }

    /// The task whose body is executing right now, if any.
    pub fn active_task(&self) -> Option<BoxedTask> {
        self.rt.active_task()
    }

    // --- Events ---

    /// Creates a live event.
    pub fn new_event(&self) -> Event {
        self.rt.new_event()
    }

    /// Gives `event` a fresh generation, cancelling it first if it is live.
    pub fn init_event(&self, event: &Event) {
        self.rt.init_event(event);
    }

    /// Signals `event`, resuming its waiters before returning.
    pub fn signal(&self, event: &Event) {
        self.rt.signal(event);
    }

    /// Signals `event` unless it was already signaled.
    pub fn signal_once(&self, event: &Event) {
        self.rt.signal_once(event);
    }

    /// Cancels `event`, failing all of its waiters.
    pub fn cancel_event(&self, event: &Event) {
        self.rt.cancel_event(event);
    }

    // --- Introspection ---

    /// Bookkeeping counters. All zero if stats collection is disabled.
    pub fn stats(&self) -> TaskStats {
        self.rt.stats()
    }

    /// Tasks created since the last tick.
    pub fn num_pending(&self) -> usize {
        self.rt.num_pending()
    }

    /// Tasks on the active list, including dead ones not yet released.
    pub fn num_active(&self) -> usize {
        self.rt.num_active()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if self.rt.num_pending() + self.rt.num_active() > 0 {
            self.rt.finish();
        }
    }
}
