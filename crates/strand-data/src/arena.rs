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

//! Generational object storage with weak links.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use strand_core::{BoxedObject, ObjectLink};

/// Slot storage shared between an [`ObjectArena`] and the [`ObjectWeak`] links it hands out.
struct ArenaSlots<T> {
    /// Every slot that has ever been created. The handle holds the slot's current
    /// generation; the value is `Some` only while the object is alive.
    slots: Vec<(BoxedObject, Option<T>)>,
    /// Indices available for reuse.
    freed: Vec<u32>,
    /// Number of occupied slots.
    alive: usize,
}

impl<T> ArenaSlots<T> {
    fn resolve(&self, handle: BoxedObject) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .and_then(|(slot_id, value)| {
                if slot_id.generation == handle.generation {
                    value.as_ref()
                } else {
                    None
                }
            })
    }

    fn resolve_mut(&mut self, handle: BoxedObject) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .and_then(|(slot_id, value)| {
                if slot_id.generation == handle.generation {
                    value.as_mut()
                } else {
                    None
                }
            })
    }
}

/// A shared, single-threaded store of simulation objects.
///
/// Cloning an `ObjectArena` clones the handle, not the objects: all clones see
/// the same slots. A slot's generation is incremented when the slot is reused;
/// until then a despawned slot holds `None` and resolves for nobody.
pub struct ObjectArena<T> {
    inner: Rc<RefCell<ArenaSlots<T>>>,
}

impl<T> Clone for ObjectArena<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ObjectArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectArena<T> {
    /// Creates a new, empty arena.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty arena with room for `capacity` objects.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ArenaSlots {
                slots: Vec::with_capacity(capacity),
                freed: Vec::new(),
                alive: 0,
            })),
        }
    }

    /// Stores `value` and returns a handle to it.
    ///
    /// Freed slots are reused first, with their generation incremented.
    ///
    /// # Panics
    ///
    /// Panics if a reused slot has run out of generations: its old handles
    /// would start resolving again.
    pub fn spawn(&self, value: T) -> BoxedObject {
        let mut inner = self.inner.borrow_mut();

        let handle = if let Some(index) = inner.freed.pop() {
            let (id_slot, value_slot) = &mut inner.slots[index as usize];
            id_slot.generation = id_slot.generation.checked_add(1).unwrap_or_else(|| {
                panic!("object slot {index} exhausted its {} generations", u32::MAX)
            });
            *value_slot = Some(value);
            *id_slot
        } else {
            let index = u32::try_from(inner.slots.len())
                .unwrap_or_else(|_| panic!("object arena exceeded {} slots", u32::MAX));
            let handle = BoxedObject::new(index, 0);
            inner.slots.push((handle, Some(value)));
            handle
        };
        inner.alive += 1;
        handle
    }

    /// Removes the object behind `handle`, returning it if the handle was still valid.
    pub fn despawn(&self, handle: BoxedObject) -> Option<T> {
        let mut inner = self.inner.borrow_mut();
        let (slot_id, value) = inner.slots.get_mut(handle.index as usize)?;
        if slot_id.generation != handle.generation {
            return None;
        }
        let removed = value.take()?;
        inner.freed.push(handle.index);
        inner.alive -= 1;
        log::trace!("Despawned {handle}");
        Some(removed)
    }

    /// Returns `true` if `handle` still refers to a live object.
    pub fn contains(&self, handle: BoxedObject) -> bool {
        self.inner.borrow().resolve(handle).is_some()
    }

    /// Runs `f` on the object behind `handle`, if it is still alive.
    pub fn with<R>(&self, handle: BoxedObject, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.borrow().resolve(handle).map(f)
    }

    /// Runs `f` on the object behind `handle` mutably, if it is still alive.
    pub fn with_mut<R>(&self, handle: BoxedObject, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.borrow_mut().resolve_mut(handle).map(f)
    }

    /// Returns a weak link to `handle` that a task can be bound to.
    pub fn weak(&self, handle: BoxedObject) -> ObjectWeak<T> {
        ObjectWeak {
            arena: Rc::downgrade(&self.inner),
            handle,
        }
    }

    /// Returns the handles of all live objects, in slot order.
    pub fn handles(&self) -> Vec<BoxedObject> {
        self.inner
            .borrow()
            .slots
            .iter()
            .filter(|(_, value)| value.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns the number of live objects.
    pub fn len(&self) -> usize {
        self.inner.borrow().alive
    }

    /// Returns `true` if the arena holds no live objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total number of slots, live and free.
    pub fn slot_count(&self) -> usize {
        self.inner.borrow().slots.len()
    }
}

/// A weak reference to an object in an [`ObjectArena`].
///
/// It resolves only while the arena exists and the slot's generation still
/// matches the one captured when the link was made.
pub struct ObjectWeak<T> {
    arena: Weak<RefCell<ArenaSlots<T>>>,
    handle: BoxedObject,
}

impl<T> Clone for ObjectWeak<T> {
    fn clone(&self) -> Self {
        Self {
            arena: self.arena.clone(),
            handle: self.handle,
        }
    }
}

impl<T> ObjectWeak<T> {
    /// The handle this link was created for.
    pub fn handle(&self) -> BoxedObject {
        self.handle
    }

    /// Runs `f` on the object if it still resolves.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let arena = self.arena.upgrade()?;
        let inner = arena.borrow();
        inner.resolve(self.handle).map(f)
    }
}

impl<T> ObjectLink for ObjectWeak<T> {
    fn is_alive(&self) -> bool {
        self.arena
            .upgrade()
            .is_some_and(|arena| arena.borrow().resolve(self.handle).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Fairy {
        hp: i32,
    }

    #[test]
    fn spawn_and_despawn() {
        let arena = ObjectArena::new();
        let a = arena.spawn(Fairy { hp: 10 });
        let b = arena.spawn(Fairy { hp: 20 });

        assert_eq!(a, BoxedObject::new(0, 0));
        assert_eq!(b, BoxedObject::new(1, 0));
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.despawn(a), Some(Fairy { hp: 10 }));
        assert!(!arena.contains(a));
        assert_eq!(arena.despawn(a), None, "double despawn must be a no-op");
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.with(b, |f| f.hp), Some(20));
    }

    #[test]
    fn recycled_slot_invalidates_old_handle() {
        let arena = ObjectArena::new();
        let old = arena.spawn(Fairy { hp: 1 });
        arena.despawn(old);

        let new = arena.spawn(Fairy { hp: 2 });
        assert_eq!(new.index, old.index, "the freed slot should be reused");
        assert_eq!(new.generation, old.generation + 1);
        assert!(!arena.contains(old));
        assert_eq!(arena.with(old, |f| f.hp), None);
        assert_eq!(arena.with(new, |f| f.hp), Some(2));
        assert_eq!(arena.slot_count(), 1);
    }

    #[test]
    #[should_panic(expected = "exhausted its")]
    fn exhausted_slot_generation_panics() {
        let arena = ObjectArena::new();
        let old = arena.spawn(Fairy { hp: 1 });
        arena.despawn(old);
        arena.inner.borrow_mut().slots[0].0.generation = u32::MAX;

        arena.spawn(Fairy { hp: 2 });
    }

    #[test]
    fn weak_links_track_liveness() {
        let arena = ObjectArena::new();
        let boss = arena.spawn(Fairy { hp: 500 });
        let link = arena.weak(boss);

        assert!(link.is_alive());
        arena.with_mut(boss, |f| f.hp -= 100);
        assert_eq!(link.with(|f| f.hp), Some(400));

        arena.despawn(boss);
        assert!(!link.is_alive());

        // Reusing the slot must not revive the old link.
        arena.spawn(Fairy { hp: 1 });
        assert!(!link.is_alive());
    }

    #[test]
    fn weak_link_outliving_arena() {
        let arena = ObjectArena::new();
        let handle = arena.spawn(Fairy { hp: 3 });
        let link = arena.weak(handle);
        drop(arena);
        assert!(!link.is_alive());
        assert_eq!(link.with(|f| f.hp), None);
    }

    #[test]
    fn handles_lists_live_objects_only() {
        let arena = ObjectArena::new();
        let a = arena.spawn(Fairy { hp: 1 });
        let b = arena.spawn(Fairy { hp: 2 });
        let c = arena.spawn(Fairy { hp: 3 });
        arena.despawn(b);
        assert_eq!(arena.handles(), vec![a, c]);
        assert!(!arena.is_empty());
    }
}
