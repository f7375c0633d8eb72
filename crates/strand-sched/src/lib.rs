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

//! # Strand Scheduler
//!
//! A cooperative, single-threaded task scheduler for simulation scripts.
//!
//! Behaviour is written as sequential `async` bodies that suspend at `.await`
//! points. The game loop drives every task once per tick through
//! [`Scheduler::run_tasks`]. Tasks can wait on [`Event`]s, be bound to simulation
//! objects so they die with them, and own subtasks that die with them.
//!
//! ```ignore
//! let sched = Scheduler::new();
//! let boss_down = sched.new_event();
//! sched.new_task("victory", |ctx, event: Event| async move {
//!     if ctx.wait_event(&event).await.is_signaled() {
//!         log::info!("Stage clear");
//!         ctx.spawn("credits", roll_credits, ()).await;
//!     }
//! }, boss_down.clone());
//! ```

#![warn(missing_docs)]

mod context;
mod coroutine;
mod event;
mod pool;
mod runtime;
mod scheduler;


pub use context::{Checkpoint, Die, TaskContext, Yield};
pub use event::{Event, EventSnapshot};
pub use scheduler::Scheduler;

pub use strand_core::{
    BoxedTask, CoStatus, EventStatus, SchedulerConfig, TaskStats, TaskValue, WaitResult,
};
