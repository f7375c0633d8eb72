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

//! The API available to code running inside a task.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use strand_core::{BoxedTask, CoStatus, EventStatus, ObjectLink, TaskValue, WaitResult};

use crate::event::{Event, EventSnapshot};
use crate::runtime::Runtime;

/// A task's view of the scheduler it runs on.
///
/// Every task body receives one as its first argument. It only holds a weak
/// reference to the scheduler, so bodies that keep it alive do not keep the
/// scheduler alive.
#[derive(Clone)]
pub struct TaskContext {
    rt: Weak<Runtime>,
    task: BoxedTask,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .finish()
    }
}

impl TaskContext {
    pub(crate) fn new(rt: Weak<Runtime>, task: BoxedTask) -> Self {
        Self { rt, task }
    }

    /// Must never be held across an `.await`: the body would keep the scheduler alive.
    fn runtime(&self) -> Rc<Runtime> {
        self.rt.upgrade().unwrap_or_else(|| {
            panic!(
                "{} used its task context after the scheduler was dropped",
                self.task
            )
        })
    }

    /// Returns `true` once this task was killed or has finished.
    fn is_dead(&self) -> bool {
        self.runtime().status(self.task).is_dead()
    }

    /// Makes `call` unless this task is already dead. The returned future stops
    /// the task for good if `call` ended up killing it.
    fn checked<T>(&self, call: impl FnOnce(&Rc<Runtime>) -> T) -> Checkpoint<T> {
        let rt = self.runtime();
        let value = if rt.status(self.task).is_dead() {
            log::debug!("{} is dead, skipping the call", self.task);
            None
        } else {
            Some(call(&rt))
        };
        Checkpoint {
            rt: self.rt.clone(),
            task: self.task,
            value,
        }
    }

    /// The handle of the task this context belongs to.
    pub fn this_task(&self) -> BoxedTask {
        self.task
    }

    /// The name the task was spawned with.
    pub fn name(&self) -> String {
        self.runtime().task_name(self.task).unwrap_or_default()
    }

    // --- Suspension ---

    /// Suspends the task until it is next resumed.
    pub async fn yield_now(&self) {
        self.yield_value(None).await;
    }

    /// Suspends the task, handing `value` to whoever resumed it.
    ///
    /// Completes with the value passed to the next resume.
    pub fn yield_value(&self, value: Option<TaskValue>) -> Yield {
        Yield {
            rt: self.rt.clone(),
            task: self.task,
            value,
            parked: false,
        }
    }

    /// Yields `frames` times and returns `frames`.
    pub async fn wait(&self, frames: u32) -> u32 {
        for _ in 0..frames {
            self.yield_now().await;
        }
        frames
    }

    /// Yields forever. The task only ends by being killed.
    pub async fn stall(&self) -> Infallible {
        loop {
            self.yield_now().await;
        }
    }

    /// Kills the calling task at this point. Nothing after the `.await` runs.
    ///
    /// ```ignore
    /// match ctx.die().await {}
    /// ```
    pub fn die(&self) -> Die {
        Die {
            rt: self.rt.clone(),
            task: self.task,
        }
    }

    /// Unwraps `value`, or kills the calling task if there is none.
    pub async fn or_die<T>(&self, value: Option<T>) -> T {
        match value {
            Some(value) => value,
            None => match self.die().await {},
        }
    }

    // --- Events ---

    /// Waits until `event` is signaled or cancelled.
    ///
    /// Returns immediately with [`EventStatus::Canceled`] if the event is not live.
    pub async fn wait_event(&self, event: &Event) -> WaitResult {
        self.wait_on(event, false).await
    }

    /// Like [`TaskContext::wait_event`], but returns at once if the event was
    /// already signaled at some point.
    pub async fn wait_event_once(&self, event: &Event) -> WaitResult {
        self.wait_on(event, true).await
    }

    /// Like [`TaskContext::wait_event`], but kills the calling task if the event
    /// is cancelled. Only ever returns signaled results.
    pub async fn wait_event_or_die(&self, event: &Event) -> WaitResult {
        let result = self.wait_event(event).await;
        if result.is_canceled() {
            match self.die().await {}
        }
        result
    }

    async fn wait_on(&self, event: &Event, once: bool) -> WaitResult {
        if self.is_dead() {
            match self.die().await {}
        }
        if !event.is_live() {
            return WaitResult {
                frames: 0,
                status: EventStatus::Canceled,
            };
        }
        if once && event.signaled_count() > 0 {
            return WaitResult {
                frames: 0,
                status: EventStatus::Signaled,
            };
        }

        let Some(snapshot) = self.subscribe(event) else {
            match self.die().await {}
        };
        let mut frames = 0;
        loop {
            self.yield_now().await;
            frames += 1;
            let status = event.poll(&snapshot);
            if status != EventStatus::Pending {
                self.end_wait();
                return WaitResult { frames, status };
            }
        }
    }

    fn subscribe(&self, event: &Event) -> Option<EventSnapshot> {
        self.runtime().subscribe(self.task, event)
    }

    fn end_wait(&self) {
        self.runtime().end_wait(self.task);
    }

    /// Creates a live event.
    pub fn new_event(&self) -> Event {
        self.runtime().new_event()
    }

    /// Creates a live event that is cancelled when this task dies.
    pub fn host_event(&self) -> Event {
        self.runtime().host_event(self.task)
    }

    /// Signals `event`, resuming its waiters before returning.
    ///
    /// ```ignore
    /// ctx.signal(&event).await;
    /// ```
    pub fn signal(&self, event: &Event) -> Checkpoint<()> {
        self.checked(|rt| rt.signal(event))
    }

    /// Signals `event` unless it was already signaled.
    pub fn signal_once(&self, event: &Event) -> Checkpoint<()> {
        self.checked(|rt| rt.signal_once(event))
    }

    /// Cancels `event`, failing all of its waiters.
    pub fn cancel_event(&self, event: &Event) -> Checkpoint<()> {
        self.checked(|rt| rt.cancel_event(event))
    }

    /// The event signaled when `task` completes. `None` if the task is gone.
    pub fn finished_event(&self, task: BoxedTask) -> Option<Event> {
        self.runtime().finished_event(task)
    }

    // --- Lifecycle ---

    /// Binds this task to a simulation object, or kills it if there is none.
    ///
    /// Once bound, the task is killed on the first resume after the object dies.
    ///
    /// # Panics
    ///
    /// Panics if the task is already bound.
    pub async fn bind<L: ObjectLink + 'static>(&self, link: Option<L>) {
        if self.is_dead() {
            match self.die().await {}
        }
        let missing = link.is_none();
        self.runtime().bind(
            self.task,
            link.map(|link| Box::new(link) as Box<dyn ObjectLink>),
        );
        if missing {
            match self.die().await {}
        }
    }

    /// Registers code to run once when this task dies, however it dies.
    ///
    /// If the task is already dead the finalizer runs right away.
    ///
    /// # Panics
    ///
    /// Panics if a finalizer was already set.
    pub fn set_finalizer(&self, finalizer: impl FnOnce() + 'static) {
        self.runtime().set_finalizer(self.task, Box::new(finalizer));
    }

    /// Kills another task. Completes with `false` if it was already dead.
    ///
    /// Cancelling this task or one of its parents means the `.await` never completes.
    pub fn cancel(&self, task: BoxedTask) -> Checkpoint<bool> {
        self.checked(|rt| rt.cancel(task))
    }

    /// The status of another task. Released tasks report [`CoStatus::Dead`].
    pub fn status(&self, task: BoxedTask) -> CoStatus {
        self.runtime().status(task)
    }

    // --- Spawning ---

    /// Spawns an independent task and runs it up to its first yield point.
    pub fn spawn<A, F, Fut>(
        &self,
        name: impl Into<String>,
        entry: F,
        arg: A,
    ) -> Checkpoint<BoxedTask>
    where
        F: FnOnce(TaskContext, A) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        self.checked(move |rt| rt.spawn(name.into(), None, entry, arg))
    }

    /// Spawns a task that is killed when this task dies.
    pub fn spawn_subtask<A, F, Fut>(
        &self,
        name: impl Into<String>,
        entry: F,
        arg: A,
    ) -> Checkpoint<BoxedTask>
    where
        F: FnOnce(TaskContext, A) -> Fut,
        Fut: Future<Output = ()> + 'static,
    {
        let parent = self.task;
        self.checked(move |rt| rt.spawn(name.into(), Some(parent), entry, arg))
    }

    /// Yields until every subtask of this task has died. Returns the number of frames waited.
    pub async fn wait_subtasks(&self) -> u32 {
        let mut frames = 0;
        while self.has_subtasks() {
            self.yield_now().await;
            frames += 1;
        }
        frames
    }

    fn has_subtasks(&self) -> bool {
        self.runtime().has_subtasks(self.task)
    }

    /// Spawns a task whose body starts after `delay` frames. A negative delay means never.
    pub fn spawn_delayed<A, F, Fut>(
        &self,
        name: impl Into<String>,
        delay: i32,
        entry: F,
        arg: A,
    ) -> Checkpoint<BoxedTask>
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.checked(move |rt| rt.spawn_delayed(name.into(), delay, entry, arg))
    }

    /// Spawns a task whose body runs only if `event` is signaled.
    pub fn spawn_when<A, F, Fut>(
        &self,
        name: impl Into<String>,
        event: &Event,
        entry: F,
        arg: A,
    ) -> Checkpoint<BoxedTask>
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.checked(move |rt| rt.spawn_on_event(name.into(), event.clone(), false, entry, arg))
    }

    /// Spawns a task whose body runs once `event` is signaled or cancelled.
    pub fn spawn_after<A, F, Fut>(
        &self,
        name: impl Into<String>,
        event: &Event,
        entry: F,
        arg: A,
    ) -> Checkpoint<BoxedTask>
    where
        A: 'static,
        F: FnOnce(TaskContext, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.checked(move |rt| rt.spawn_on_event(name.into(), event.clone(), true, entry, arg))
    }

    /// Kills `task` when `event` is signaled. Returns the watcher task.
    pub fn cancel_task_when(&self, event: &Event, task: BoxedTask) -> Checkpoint<BoxedTask> {
        self.checked(|rt| rt.cancel_on_event(event.clone(), task, false))
    }

    /// Kills `task` when `event` is signaled or cancelled. Returns the watcher task.
    pub fn cancel_task_after(&self, event: &Event, task: BoxedTask) -> Checkpoint<BoxedTask> {
        self.checked(|rt| rt.cancel_on_event(event.clone(), task, true))
    }
}

/// Future returned by [`TaskContext::yield_value`].
#[must_use = "futures do nothing unless you `.await` them"]
pub struct Yield {
    rt: Weak<Runtime>,
    task: BoxedTask,
    value: Option<TaskValue>,
    parked: bool,
}

impl Future for Yield {
    type Output = Option<TaskValue>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.parked {
            self.parked = true;
            let value = self.value.take();
            if let Some(rt) = self.rt.upgrade() {
                rt.set_outbox(self.task, value);
            }
            return Poll::Pending;
        }
        match self.rt.upgrade() {
            Some(rt) => Poll::Ready(rt.take_inbox(self.task)),
            None => Poll::Pending,
        }
    }
}

/// Future returned by [`TaskContext::die`]. It never completes.
#[must_use = "futures do nothing unless you `.await` them"]
pub struct Die {
    rt: Weak<Runtime>,
    task: BoxedTask,
}

impl Future for Die {
    type Output = Infallible;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Infallible> {
        if let Some(rt) = self.rt.upgrade() {
            rt.cancel(self.task);
        }
        Poll::Pending
    }
}

/// Future returned by the in-task calls that may resume other tasks.
///
/// The call has already been made by the time the future exists. Awaiting it
/// yields the call's result, unless one of the tasks it resumed killed the
/// caller: then it never completes, and nothing after the `.await` runs.
#[must_use = "a task killed by this call only stops once the result is `.await`ed"]
pub struct Checkpoint<T> {
    rt: Weak<Runtime>,
    task: BoxedTask,
    value: Option<T>,
}

// `value` is never pinned.
impl<T> Unpin for Checkpoint<T> {}

impl<T> Future for Checkpoint<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<T> {
        let alive = self
            .rt
            .upgrade()
            .is_some_and(|rt| !rt.status(self.task).is_dead());
        match self.value.take() {
            Some(value) if alive => Poll::Ready(value),
            value => {
                self.value = value;
                Poll::Pending
            }
        }
    }
}
