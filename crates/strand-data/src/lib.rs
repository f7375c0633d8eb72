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

//! # Strand Data
//!
//! Storage for the simulation objects that tasks are bound to. The [`ObjectArena`]
//! recycles slots through a free list and hands out generational
//! [`BoxedObject`](strand_core::BoxedObject) handles, so a script holding a handle
//! to a destroyed object sees it fail to resolve instead of reaching a stranger.

#![warn(missing_docs)]

mod arena;

pub use arena::{ObjectArena, ObjectWeak};
