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

//! The contract between the scheduler and a simulation-object subsystem.
//!
//! A task may be bound to a simulation object. Before every resume the scheduler
//! asks the binding whether the object still exists; once it does not, the task
//! is killed without running any more of its script. The scheduler never sees
//! the object itself, only an [`ObjectLink`] that can answer that one question.

/// A weak reference to a simulation object that can report whether the object
/// it was created for is still alive.
///
/// Implementations are typically a store handle plus a [`BoxedObject`](crate::BoxedObject)
/// compared against the store's live generation.
pub trait ObjectLink {
    /// Returns `true` while the referenced object still resolves.
    fn is_alive(&self) -> bool;
}

impl<F> ObjectLink for F
where
    F: Fn() -> bool,
{
    fn is_alive(&self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn closure_links_follow_their_source() {
        let alive = Rc::new(Cell::new(true));
        let link = {
            let alive = alive.clone();
            move || alive.get()
        };
        assert!(link.is_alive());
        alive.set(false);
        assert!(!link.is_alive());
    }
}
