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

//! # Strand Core
//!
//! Foundational crate containing the handle types, status types and interface
//! contracts shared by the Strand task scheduler and the simulation code that
//! drives it.

#![warn(missing_docs)]

pub mod config;
pub mod handle;
pub mod object;
pub mod task;

pub use config::{ConfigError, ConfigResult, SchedulerConfig};
pub use handle::{BoxedObject, BoxedTask, GenerationCounter};
pub use object::ObjectLink;
pub use task::{CoStatus, EventStatus, TaskStats, TaskValue, WaitResult};
