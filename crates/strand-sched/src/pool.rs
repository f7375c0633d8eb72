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

//! The recycling task pool.

use strand_core::{BoxedTask, GenerationCounter, ObjectLink, TaskValue};

use crate::coroutine::Coroutine;
use crate::event::{Event, EventSnapshot};

/// Everything a task owns for the span of one lifetime.
///
/// Released as a whole when the slot goes back to the free list, so that the
/// caller can drop it without holding the pool borrowed.
#[derive(Default)]
pub(crate) struct TaskData {
    pub(crate) name: String,
    pub(crate) link: Option<Box<dyn ObjectLink>>,
    pub(crate) bound: bool,
    pub(crate) finalizer: Option<Box<dyn FnOnce()>>,
    pub(crate) finalizer_set: bool,
    pub(crate) finalized: bool,
    pub(crate) inbox: Option<TaskValue>,
    pub(crate) outbox: Option<TaskValue>,
    /// Signaled when the body completes, cancelled when the task is finalized.
    pub(crate) finished: Option<Event>,
    /// Events whose lifetime is tied to this task.
    pub(crate) hosted: Vec<Event>,
    pub(crate) parent: Option<BoxedTask>,
    pub(crate) subtasks: Vec<BoxedTask>,
    /// The event this task is currently blocked on.
    pub(crate) wait: Option<(Event, EventSnapshot)>,
}

pub(crate) struct TaskSlot {
    /// Zero while the slot is in the free list.
    pub(crate) generation: u32,
    pub(crate) co: Coroutine,
    pub(crate) data: TaskData,
}

/// Owns every task slot ever created. Slots are never deallocated, only recycled.
pub(crate) struct TaskPool {
    slots: Vec<TaskSlot>,
    free: Vec<u32>,
    generations: GenerationCounter,
}

impl TaskPool {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            generations: GenerationCounter::new(),
        }
    }

    /// Hands out a slot with a fresh generation and an idle coroutine.
    ///
    /// Reuses the most recently released slot if there is one. The second value
    /// is `true` if a new slot had to be allocated.
    pub(crate) fn acquire(&mut self, name: String) -> (BoxedTask, bool) {
        let generation = self.generations.next_id();

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert_eq!(slot.generation, 0, "free slot with a live generation");
            slot.generation = generation;
            slot.data.name = name;
            return (BoxedTask::new(index, generation), false);
        }

        let index = u32::try_from(self.slots.len())
            .unwrap_or_else(|_| panic!("task pool exceeded {} slots", u32::MAX));
        self.slots.push(TaskSlot {
            generation,
            co: Coroutine::idle(),
            data: TaskData {
                name,
                ..Default::default()
            },
        });
        (BoxedTask::new(index, generation), true)
    }

    /// Resolves a handle, or `None` if the slot was released or recycled since.
    pub(crate) fn get(&self, task: BoxedTask) -> Option<&TaskSlot> {
        self.slots
            .get(task.index as usize)
            .filter(|slot| slot.generation != 0 && slot.generation == task.generation)
    }

    pub(crate) fn get_mut(&mut self, task: BoxedTask) -> Option<&mut TaskSlot> {
        self.slots
            .get_mut(task.index as usize)
            .filter(|slot| slot.generation != 0 && slot.generation == task.generation)
    }

    /// Resolves a handle the caller knows to be live.
    pub(crate) fn slot_mut(&mut self, task: BoxedTask) -> &mut TaskSlot {
        self.get_mut(task)
            .unwrap_or_else(|| panic!("{task} does not refer to a live task"))
    }

    /// The generation currently stored in slot `index`, or zero.
    pub(crate) fn live_generation(&self, index: u32) -> u32 {
        self.slots
            .get(index as usize)
            .map_or(0, |slot| slot.generation)
    }

    /// Returns a dead task's slot to the free list and hands back its data.
    pub(crate) fn release(&mut self, task: BoxedTask) -> TaskData {
        let slot = self.slot_mut(task);
        assert!(
            slot.co.status().is_dead(),
            "cannot release '{}' ({task}): the task is still {}",
            slot.data.name,
            slot.co.status()
        );
        debug_assert!(slot.data.finalized, "released a task that was never finalized");
        slot.generation = 0;
        let data = std::mem::take(&mut slot.data);
        self.free.push(task.index);
        data
    }
}
