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

//! Broadcast events that tasks can wait on.
//!
//! An event carries a generation and a signal count. Waiters take a snapshot of
//! both when they start waiting and compare against it every time they are
//! resumed. Signaling bumps the count; cancelling zeroes both, which every
//! snapshot reads as a failure.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use strand_core::{BoxedTask, EventStatus};

struct EventState {
    generation: u32,
    signaled: u32,
    subscribers: Vec<BoxedTask>,
}

/// The generation and signal count of an event at the moment a wait started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSnapshot {
    /// The event generation at the time of the snapshot.
    pub generation: u32,
    /// The signal count at the time of the snapshot.
    pub signaled: u32,
}

/// A shared handle to a broadcast event.
///
/// Cloning the handle does not create a new event. A default-constructed event
/// has never been initialized and behaves exactly like a cancelled one; create
/// live events with [`Scheduler::new_event`](crate::Scheduler::new_event) or
/// bring one to life with [`Scheduler::init_event`](crate::Scheduler::init_event).
#[derive(Clone)]
pub struct Event {
    state: Rc<RefCell<EventState>>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(EventState {
                generation: 0,
                signaled: 0,
                subscribers: Vec::new(),
            })),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Event")
            .field("generation", &state.generation)
            .field("signaled", &state.signaled)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl Event {
    /// The current generation. Zero means cancelled or never initialized.
    pub fn generation(&self) -> u32 {
        self.state.borrow().generation
    }

    /// How many times the event was signaled since it was last initialized.
    pub fn signaled_count(&self) -> u32 {
        self.state.borrow().signaled
    }

    /// Returns `true` if the event is initialized and not cancelled.
    pub fn is_live(&self) -> bool {
        self.generation() != 0
    }

    /// The number of tasks currently registered as waiters.
    pub fn num_subscribers(&self) -> usize {
        self.state.borrow().subscribers.len()
    }

    /// Returns `true` if both handles refer to the same event.
    pub fn ptr_eq(&self, other: &Event) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Records the current generation and signal count.
    pub fn snapshot(&self) -> EventSnapshot {
        let state = self.state.borrow();
        EventSnapshot {
            generation: state.generation,
            signaled: state.signaled,
        }
    }

    /// Compares the event against a snapshot taken earlier.
    ///
    /// A changed or zero generation, or a signal count that went *down*, means
    /// the event was cancelled since the snapshot. A count that went up means
    /// it was signaled.
    pub fn poll(&self, snapshot: &EventSnapshot) -> EventStatus {
        let state = self.state.borrow();
        if state.generation == 0
            || state.generation != snapshot.generation
            || state.signaled < snapshot.signaled
        {
            EventStatus::Canceled
        } else if state.signaled > snapshot.signaled {
            EventStatus::Signaled
        } else {
            EventStatus::Pending
        }
    }

    /// Releases the subscriber storage. The event must no longer be live.
    ///
    /// # Panics
    ///
    /// Panics if the event is still live: a live event may still have waiters
    /// that expect to be woken.
    pub fn destroy(self) {
        let mut state = self.state.borrow_mut();
        assert_eq!(
            state.generation, 0,
            "an event must be cancelled before it is destroyed"
        );
        state.subscribers = Vec::new();
    }

    /// Gives the event a new generation and a zero signal count.
    ///
    /// The caller must make sure nobody is still subscribed.
    pub(crate) fn reset(&self, generation: u32) {
        let mut state = self.state.borrow_mut();
        debug_assert!(state.subscribers.is_empty());
        state.generation = generation;
        state.signaled = 0;
    }

    pub(crate) fn add_subscriber(&self, task: BoxedTask, min_capacity: usize) {
        let mut state = self.state.borrow_mut();
        if state.subscribers.capacity() == 0 {
            state.subscribers.reserve(min_capacity);
        }
        state.subscribers.push(task);
    }

    pub(crate) fn retain_subscribers(&self, mut keep: impl FnMut(BoxedTask) -> bool) {
        self.state
            .borrow_mut()
            .subscribers
            .retain(|task| keep(*task));
    }

    /// Bumps the signal count and drains the subscriber list.
    ///
    /// Returns `None` if the event is not live.
    pub(crate) fn begin_signal(&self) -> Option<Vec<BoxedTask>> {
        let mut state = self.state.borrow_mut();
        if state.generation == 0 {
            return None;
        }
        state.signaled = match state.signaled.checked_add(1) {
            Some(count) => count,
            None => panic!("event #{} signaled too many times", state.generation),
        };
        Some(state.subscribers.drain(..).collect())
    }

    /// Zeroes the generation and count and takes the subscriber storage.
    ///
    /// Returns `None` if the event was already cancelled.
    pub(crate) fn begin_cancel(&self) -> Option<Vec<BoxedTask>> {
        let mut state = self.state.borrow_mut();
        if state.generation == 0 {
            return None;
        }
        state.generation = 0;
        state.signaled = 0;
        Some(std::mem::take(&mut state.subscribers))
    }
}
