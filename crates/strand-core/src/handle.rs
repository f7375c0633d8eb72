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

//! Generational handles into recycled pools.
//!
//! A handle is a `(index, generation)` pair. The pool owning the slot keeps the
//! slot's *current* generation; a handle is valid only while both agree. Bumping
//! the generation on reuse invalidates every outstanding copy of the old handle
//! in O(1), without tracking who holds them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A weak reference to a task slot in a scheduler's task pool.
///
/// The generation of a live task is never zero. A slot sitting in the free list
/// has generation zero, so a `BoxedTask` can never match a free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxedTask {
    /// The index of the task slot in the pool.
    pub index: u32,
    /// The generation the slot had when this handle was created.
    pub generation: u32,
}

impl BoxedTask {
    /// A handle that never resolves to any task.
    pub const NULL: BoxedTask = BoxedTask {
        index: u32::MAX,
        generation: 0,
    };

    /// Creates a handle from its raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns `true` if this is the null handle or any other handle with a zero generation.
    pub const fn is_null(&self) -> bool {
        self.generation == 0
    }
}

impl Default for BoxedTask {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for BoxedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}@{}", self.index, self.generation)
    }
}

/// A weak reference to a simulation object owned by an external object store.
///
/// The meaning of `generation` is owned by the store that issued the handle;
/// the scheduler only ever asks the store whether the handle still resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxedObject {
    /// The index of the object's slot in its store.
    pub index: u32,
    /// A generation counter that is incremented each time the slot is recycled.
    pub generation: u32,
}

impl BoxedObject {
    /// Creates a handle from its raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for BoxedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object#{}@{}", self.index, self.generation)
    }
}

/// A monotonically increasing source of non-zero generation ids.
///
/// Zero is reserved to mean "free" (tasks) or "cancelled" (events). The counter
/// is 32 bits wide and running out is treated as fatal: at one id per spawned
/// task it takes billions of spawns within a single scheduler's lifetime.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    last: u32,
}

impl GenerationCounter {
    /// Creates a counter whose first issued id is `1`.
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Issues the next generation id.
    ///
    /// # Panics
    ///
    /// Panics if the counter would wrap around to zero.
    pub fn next_id(&mut self) -> u32 {
        self.last = self
            .last
            .checked_add(1)
            .unwrap_or_else(|| panic!("generation counter exhausted after {} ids", u32::MAX));
        self.last
    }

    /// Returns the most recently issued id, or zero if none was issued yet.
    pub fn last(&self) -> u32 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_one_and_increases() {
        let mut counter = GenerationCounter::new();
        assert_eq!(counter.last(), 0);
        assert_eq!(counter.next_id(), 1);
        assert_eq!(counter.next_id(), 2);
        assert_eq!(counter.last(), 2);
    }

    #[test]
    #[should_panic(expected = "generation counter exhausted")]
    fn counter_refuses_to_wrap() {
        let mut counter = GenerationCounter { last: u32::MAX };
        counter.next_id();
    }

    #[test]
    fn null_task_handle() {
        assert!(BoxedTask::NULL.is_null());
        assert!(BoxedTask::default().is_null());
        assert!(!BoxedTask::new(0, 7).is_null());
        assert_eq!(BoxedTask::new(3, 9).to_string(), "Task#3@9");
    }
}
