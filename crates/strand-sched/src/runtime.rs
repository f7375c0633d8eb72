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

//! The shared scheduler state behind [`Scheduler`](crate::Scheduler) and [`TaskContext`].
//!
//! Task bodies call back into the runtime while they are being polled, so every
//! piece of state lives behind its own `RefCell` and borrows are kept short. No
//! borrow is held while a body is polled or dropped, or while a finalizer runs.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use strand_core::{
    BoxedTask, CoStatus, GenerationCounter, ObjectLink, SchedulerConfig, TaskStats, TaskValue,
};

use crate::context::TaskContext;
use crate::coroutine::{poll_body, TaskBody};
use crate::event::{Event, EventSnapshot};
use crate::pool::TaskPool;

pub(crate) struct Runtime {
    config: SchedulerConfig,
    pool: RefCell<TaskPool>,
    /// Tasks created since the last tick, in creation order.
    pending: RefCell<Vec<BoxedTask>>,
    /// Tasks advanced by every tick, in list order.
    active: RefCell<Vec<BoxedTask>>,
    /// Tasks whose bodies are on the call stack, innermost last.
    running: RefCell<Vec<BoxedTask>>,
    event_generations: RefCell<GenerationCounter>,
    stats: Cell<TaskStats>,
}

impl Runtime {
    pub(crate) fn new(config: SchedulerConfig) -> Rc<Self> {
        log::debug!(
            "Creating task scheduler with {} reserved task slots",
            config.pool_capacity
        );
        Rc::new(Self {
            pool: RefCell::new(TaskPool::with_capacity(config.pool_capacity)),
            pending: RefCell::new(Vec::with_capacity(config.pool_capacity)),
            active: RefCell::new(Vec::with_capacity(config.pool_capacity)),
            running: RefCell::new(Vec::new()),
            event_generations: RefCell::new(GenerationCounter::new()),
            stats: Cell::new(TaskStats::default()),
            config,
        })
    }

    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn record(&self, update: impl FnOnce(&mut TaskStats)) {
        if self.config.collect_stats {
            let mut stats = self.stats.get();
            update(&mut stats);
            self.stats.set(stats);
        }
    }

    pub(crate) fn stats(&self) -> TaskStats {
        self.stats.get()
    }

    pub(crate) fn num_pending(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn num_active(&self) -> usize {
        self.active.borrow().len()
    }

    pub(crate) fn active_task(&self) -> Option<BoxedTask> {
        self.running.borrow().last().copied()
    }

    // --- Tasks ---

    /// Creates a task, queues it as pending and runs it up to its first yield point.
    pub(crate) fn spawn<A, F, Fut>(
        self: &Rc<Self>,
        name: String,
        parent: Option<BoxedTask>,
        entry: F,
        arg: A,
    ) -> BoxedTask
    where
        F: FnOnce(TaskContext, A) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let finished = self.new_event();
        let (task, allocated) = self.pool.borrow_mut().acquire(name);
        self.record(|stats| {
            if allocated {
                stats.tasks_allocated += 1;
            }
            stats.tasks_in_use += 1;
            stats.peak_tasks_in_use = stats.peak_tasks_in_use.max(stats.tasks_in_use);
        });

        let body: TaskBody = Box::pin(entry(TaskContext::new(Rc::downgrade(self), task), arg));

        let orphaned = {
            let mut pool = self.pool.borrow_mut();
            let parent_alive = match parent {
                Some(parent) => match pool.get_mut(parent) {
                    Some(slot) if !slot.co.status().is_dead() => {
                        slot.data.subtasks.push(task);
                        true
                    }
                    _ => false,
                },
                None => true,
            };
            let slot = pool.slot_mut(task);
            slot.data.finished = Some(finished);
            if parent_alive {
                slot.data.parent = parent;
            }
            slot.co.recycle(body);
            log::trace!("Spawned task '{}' ({task})", slot.data.name);
            !parent_alive
        };

        self.pending.borrow_mut().push(task);

        if orphaned {
            log::debug!("Parent of {task} died before the subtask could start");
            self.cancel(task);
        } else {
            self.resume_unchecked(task, None);
        }
        debug_assert_ne!(self.status(task), CoStatus::Running);
        task
    }

    /// Spawns a task whose body starts after `delay` yields. A negative delay
    /// never starts the body and the task dies on its first step.
    pub(crate) fn spawn_delayed<A, F, Fut>(
        self: &Rc<Self>,
        name: String,
        delay: i32,
        entry: F,
        arg: A,
    ) -> BoxedTask
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.spawn(
            name,
            None,
            move |ctx: TaskContext, arg: A| async move {
                if let Ok(frames) = u32::try_from(delay) {
                    ctx.wait(frames).await;
                    entry(ctx, arg).await;
                }
            },
            arg,
        )
    }

    /// Spawns a task whose body runs after `event` is signaled, or after it
    /// ends either way when `unconditional` is set.
    pub(crate) fn spawn_on_event<A, F, Fut>(
        self: &Rc<Self>,
        name: String,
        event: Event,
        unconditional: bool,
        entry: F,
        arg: A,
    ) -> BoxedTask
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.spawn(
            name,
            None,
            move |ctx: TaskContext, arg: A| async move {
                let result = ctx.wait_event(&event).await;
                if result.is_signaled() || unconditional {
                    entry(ctx, arg).await;
                }
            },
            arg,
        )
    }

    /// Spawns a watcher that kills `target` once `event` fires.
    pub(crate) fn cancel_on_event(
        self: &Rc<Self>,
        event: Event,
        target: BoxedTask,
        unconditional: bool,
    ) -> BoxedTask {
        self.spawn(
            format!("cancel {target}"),
            None,
            move |ctx: TaskContext, target: BoxedTask| async move {
                let result = ctx.wait_event(&event).await;
                if result.is_signaled() || unconditional {
                    ctx.cancel(target).await;
                }
            },
            target,
        )
    }

    pub(crate) fn status(&self, task: BoxedTask) -> CoStatus {
        self.pool
            .borrow()
            .get(task)
            .map_or(CoStatus::Dead, |slot| slot.co.status())
    }

    pub(crate) fn is_valid(&self, task: BoxedTask) -> bool {
        self.pool.borrow().get(task).is_some()
    }

    pub(crate) fn live_generation(&self, index: u32) -> u32 {
        self.pool.borrow().live_generation(index)
    }

    pub(crate) fn task_name(&self, task: BoxedTask) -> Option<String> {
        self.pool
            .borrow()
            .get(task)
            .map(|slot| slot.data.name.clone())
    }

    pub(crate) fn finished_event(&self, task: BoxedTask) -> Option<Event> {
        self.pool
            .borrow()
            .get(task)
            .and_then(|slot| slot.data.finished.clone())
    }

    pub(crate) fn has_subtasks(&self, task: BoxedTask) -> bool {
        self.pool
            .borrow()
            .get(task)
            .is_some_and(|slot| !slot.data.subtasks.is_empty())
    }

    /// Resumes a suspended task, killing it instead if its bound object is gone.
    ///
    /// # Panics
    ///
    /// Panics if the task is not suspended.
    pub(crate) fn resume(&self, task: BoxedTask, arg: Option<TaskValue>) -> Option<TaskValue> {
        let object_lost = {
            let pool = self.pool.borrow();
            let slot = pool
                .get(task)
                .unwrap_or_else(|| panic!("cannot resume {task}: the task no longer exists"));
            assert_eq!(
                slot.co.status(),
                CoStatus::Suspended,
                "cannot resume '{}' ({task}): the task is {}",
                slot.data.name,
                slot.co.status()
            );
            slot.data.link.as_ref().is_some_and(|link| !link.is_alive())
        };

        if object_lost {
            log::debug!("Bound object of {task} no longer exists, killing the task");
            self.cancel(task);
            return None;
        }
        self.resume_unchecked(task, arg)
    }

    fn resume_unchecked(&self, task: BoxedTask, arg: Option<TaskValue>) -> Option<TaskValue> {
        let mut body = {
            let mut pool = self.pool.borrow_mut();
            let slot = pool.slot_mut(task);
            slot.data.inbox = arg;
            slot.co.enter()
        };

        self.record(|stats| stats.switches_this_frame += 1);
        self.running.borrow_mut().push(task);
        let poll = poll_body(&mut body);
        self.running.borrow_mut().pop();

        let (completed, yielded, spent) = {
            let mut pool = self.pool.borrow_mut();
            let slot = pool.slot_mut(task);
            let killed = slot.co.status().is_dead();
            let spent = slot.co.leave(body, poll.is_ready());
            slot.data.inbox = None;
            (poll.is_ready() && !killed, slot.data.outbox.take(), spent)
        };
        drop(spent);

        if completed {
            self.complete(task);
        }
        yielded
    }

    fn complete(&self, task: BoxedTask) {
        log::trace!("Task {task} completed");
        if let Some(finished) = self.finished_event(task) {
            self.signal(&finished);
        }
        self.finalize(task);
    }

    /// Force-kills a task at its last yield point and finalizes it.
    ///
    /// Returns `false` if the task was already dead or no longer exists.
    pub(crate) fn cancel(&self, task: BoxedTask) -> bool {
        let body = {
            let mut pool = self.pool.borrow_mut();
            let Some(slot) = pool.get_mut(task) else {
                return false;
            };
            if slot.co.status().is_dead() {
                return false;
            }
            log::debug!("Killing task '{}' ({task})", slot.data.name);
            slot.co.kill()
        };
        drop(body);
        self.finalize(task);
        true
    }

    /// Runs the once-only cleanup every dead task goes through.
    fn finalize(&self, task: BoxedTask) {
        let (link, finished, hosted, parent, subtasks, wait, finalizer) = {
            let mut pool = self.pool.borrow_mut();
            let Some(slot) = pool.get_mut(task) else {
                return;
            };
            let data = &mut slot.data;
            if data.finalized {
                return;
            }
            data.finalized = true;
            (
                data.link.take(),
                data.finished.clone(),
                std::mem::take(&mut data.hosted),
                data.parent.take(),
                std::mem::take(&mut data.subtasks),
                data.wait.take(),
                data.finalizer.take(),
            )
        };
        log::trace!("Finalizing task {task}");

        drop(link);

        if let Some(finished) = finished {
            self.cancel_event(&finished);
        }
        for event in hosted {
            self.cancel_event(&event);
        }

        if let Some(parent) = parent {
            if let Some(slot) = self.pool.borrow_mut().get_mut(parent) {
                slot.data.subtasks.retain(|sub| *sub != task);
            }
        }

        if let Some((event, snapshot)) = wait {
            if event.generation() == snapshot.generation {
                let pool = self.pool.borrow();
                event.retain_subscribers(|sub| sub != task && pool.get(sub).is_some());
            }
        }

        for sub in subtasks {
            if let Some(slot) = self.pool.borrow_mut().get_mut(sub) {
                slot.data.parent = None;
            }
            self.cancel(sub);
        }

        if let Some(finalizer) = finalizer {
            finalizer();
        }
    }

    /// Returns a dead task's slot to the pool.
    fn release(&self, task: BoxedTask) {
        let data = self.pool.borrow_mut().release(task);
        self.record(|stats| stats.tasks_in_use -= 1);
        log::trace!("Released task '{}' ({task})", data.name);
        drop(data);
    }

    pub(crate) fn bind(&self, task: BoxedTask, link: Option<Box<dyn ObjectLink>>) {
        {
            let mut pool = self.pool.borrow_mut();
            let slot = pool
                .get_mut(task)
                .unwrap_or_else(|| panic!("cannot bind {task}: the task no longer exists"));
            assert!(
                !slot.data.bound,
                "task '{}' ({task}) is already bound to an object",
                slot.data.name
            );
            if slot.data.finalized {
                log::debug!("Task {task} is already dead, ignoring its binding");
                return;
            }
            slot.data.bound = true;
            if link.is_some() {
                slot.data.link = link;
                return;
            }
        }
        log::debug!("Task {task} bound to a missing object");
        self.cancel(task);
    }

    /// Registers the finalizer of `task`. A task that was already finalized runs it on the spot.
    pub(crate) fn set_finalizer(&self, task: BoxedTask, finalizer: Box<dyn FnOnce()>) {
        {
            let mut pool = self.pool.borrow_mut();
            let slot = pool.get_mut(task).unwrap_or_else(|| {
                panic!("cannot set the finalizer of {task}: the task no longer exists")
            });
            assert!(
                !slot.data.finalizer_set,
                "task '{}' ({task}) already has a finalizer",
                slot.data.name
            );
            slot.data.finalizer_set = true;
            if !slot.data.finalized {
                slot.data.finalizer = Some(finalizer);
                return;
            }
        }
        log::debug!("Task {task} was already finalized, running its finalizer now");
        finalizer();
    }

    pub(crate) fn set_outbox(&self, task: BoxedTask, value: Option<TaskValue>) {
        if let Some(slot) = self.pool.borrow_mut().get_mut(task) {
            slot.data.outbox = value;
        }
    }

    pub(crate) fn take_inbox(&self, task: BoxedTask) -> Option<TaskValue> {
        self.pool
            .borrow_mut()
            .get_mut(task)
            .and_then(|slot| slot.data.inbox.take())
    }

    // --- Events ---

    pub(crate) fn new_event(&self) -> Event {
        let event = Event::default();
        self.init_event(&event);
        event
    }

    /// Gives `event` a fresh generation. A live event is cancelled first so its waiters fail.
    pub(crate) fn init_event(&self, event: &Event) {
        self.cancel_event(event);
        let generation = self.event_generations.borrow_mut().next_id();
        event.reset(generation);
    }

    /// Creates an event owned by `task`. A dead task gets one that is already cancelled.
    pub(crate) fn host_event(&self, task: BoxedTask) -> Event {
        let hosting = self
            .pool
            .borrow()
            .get(task)
            .is_some_and(|slot| !slot.data.finalized);
        if !hosting {
            return Event::default();
        }
        let event = self.new_event();
        if let Some(slot) = self.pool.borrow_mut().get_mut(task) {
            slot.data.hosted.push(event.clone());
        }
        event
    }

    pub(crate) fn signal(&self, event: &Event) {
        if let Some(subscribers) = event.begin_signal() {
            log::trace!(
                "Event #{} signaled, waking {} task(s)",
                event.generation(),
                subscribers.len()
            );
            self.wake(subscribers);
        }
    }

    pub(crate) fn signal_once(&self, event: &Event) {
        if event.signaled_count() == 0 {
            self.signal(event);
        }
    }

    pub(crate) fn cancel_event(&self, event: &Event) {
        if let Some(subscribers) = event.begin_cancel() {
            log::trace!("Event cancelled, waking {} task(s)", subscribers.len());
            self.wake(subscribers);
        }
    }

    /// Resumes every subscriber that is still suspended, in subscription order.
    fn wake(&self, subscribers: Vec<BoxedTask>) {
        for task in subscribers {
            if self.status(task) == CoStatus::Suspended {
                self.resume(task, None);
            }
        }
    }

    /// Registers `task` as a waiter on `event` and records what it is blocked on.
    ///
    /// Returns `None` without subscribing if the task is dead: its finalize pass
    /// already ran and would never take it off the list.
    pub(crate) fn subscribe(&self, task: BoxedTask, event: &Event) -> Option<EventSnapshot> {
        let mut pool = self.pool.borrow_mut();
        let slot = pool
            .get_mut(task)
            .filter(|slot| !slot.data.finalized && !slot.co.status().is_dead())?;
        let snapshot = event.snapshot();
        event.add_subscriber(task, self.config.event_min_capacity);
        slot.data.wait = Some((event.clone(), snapshot));
        Some(snapshot)
    }

    pub(crate) fn end_wait(&self, task: BoxedTask) {
        if let Some(slot) = self.pool.borrow_mut().get_mut(task) {
            slot.data.wait = None;
        }
    }

    // --- Ticking ---

    /// Advances every live task by one step and releases the dead ones.
    pub(crate) fn run_tasks(&self) -> usize {
        assert!(
            self.running.borrow().is_empty(),
            "run_tasks cannot be called from inside a task"
        );
        self.record(|stats| stats.switches_this_frame = 0);

        let mut active = std::mem::take(&mut *self.active.borrow_mut());
        active.append(&mut self.pending.borrow_mut());

        let mut resumed = 0;
        active.retain(|&task| {
            if self.status(task).is_dead() {
                self.release(task);
                false
            } else {
                self.resume(task, None);
                resumed += 1;
                true
            }
        });

        *self.active.borrow_mut() = active;
        log::trace!("Tick resumed {resumed} task(s)");
        resumed
    }

    /// Kills and releases every task the scheduler owns.
    pub(crate) fn finish(&self) {
        assert!(
            self.running.borrow().is_empty(),
            "finish cannot be called from inside a task"
        );
        if self.config.cancel_waits_on_finish {
            self.cancel_blocking_events();
        }

        // Finalizers may spawn new tasks, so keep draining until nothing is left.
        loop {
            let mut tasks = std::mem::take(&mut *self.active.borrow_mut());
            tasks.append(&mut self.pending.borrow_mut());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                self.cancel(task);
                self.release(task);
            }
        }
        log::debug!("Task scheduler finished: {}", self.stats());
    }

    /// Fails every wait still in progress, once per distinct event.
    fn cancel_blocking_events(&self) {
        let mut blocking: Vec<(Event, u32)> = Vec::new();
        {
            let pool = self.pool.borrow();
            let pending = self.pending.borrow();
            let active = self.active.borrow();
            for &task in active.iter().chain(pending.iter()) {
                let Some((event, snapshot)) = pool.get(task).and_then(|slot| slot.data.wait.as_ref())
                else {
                    continue;
                };
                if event.generation() == snapshot.generation
                    && !blocking.iter().any(|(seen, _)| seen.ptr_eq(event))
                {
                    blocking.push((event.clone(), snapshot.generation));
                }
            }
        }

        // Earlier cancellations can wake tasks that re-initialize later events.
        for (event, generation) in blocking {
            if event.generation() == generation {
                self.cancel_event(&event);
            }
        }
    }
}
