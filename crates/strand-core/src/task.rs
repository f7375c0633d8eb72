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

//! Status and result types shared by the scheduler and the code driving it.

use std::any::Any;
use std::fmt;

/// A value passed into a task on resume, or out of a task on yield.
pub type TaskValue = Box<dyn Any>;

/// The execution state of a task's suspension context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoStatus {
    /// The task is parked at a yield point and may be resumed.
    Suspended,
    /// The task's body is currently executing.
    Running,
    /// The task finished or was killed. Terminal.
    Dead,
}

impl CoStatus {
    /// Returns `true` for [`CoStatus::Dead`].
    #[inline]
    pub fn is_dead(self) -> bool {
        self == CoStatus::Dead
    }
}

impl fmt::Display for CoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoStatus::Suspended => "suspended",
            CoStatus::Running => "running",
            CoStatus::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// The outcome of comparing an event against a snapshot taken earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    /// Nothing changed since the snapshot.
    Pending,
    /// The event was signaled at least once since the snapshot.
    Signaled,
    /// The event was cancelled (or cancelled and re-initialized) since the snapshot.
    Canceled,
}

/// What a task observed when a wait on an event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitResult {
    /// How many times the task yielded while waiting.
    pub frames: u32,
    /// Either [`EventStatus::Signaled`] or [`EventStatus::Canceled`].
    pub status: EventStatus,
}

impl WaitResult {
    /// Returns `true` if the event fired.
    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.status == EventStatus::Signaled
    }

    /// Returns `true` if the event was cancelled.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.status == EventStatus::Canceled
    }
}

/// Bookkeeping counters maintained by a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Task slots ever allocated by the pool (recycled slots are not counted again).
    pub tasks_allocated: usize,
    /// Task slots currently handed out.
    pub tasks_in_use: usize,
    /// The highest `tasks_in_use` ever observed.
    pub peak_tasks_in_use: usize,
    /// Context switches into task bodies since the start of the current tick.
    pub switches_this_frame: usize,
}

impl fmt::Display for TaskStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} allocated / {} in use (peak {}), {} switches this frame",
            self.tasks_allocated, self.tasks_in_use, self.peak_tasks_in_use, self.switches_this_frame
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_result_predicates() {
        let ok = WaitResult {
            frames: 3,
            status: EventStatus::Signaled,
        };
        let failed = WaitResult {
            frames: 0,
            status: EventStatus::Canceled,
        };
        assert!(ok.is_signaled() && !ok.is_canceled());
        assert!(failed.is_canceled() && !failed.is_signaled());
    }

    #[test]
    fn stats_display() {
        let stats = TaskStats {
            tasks_allocated: 4,
            tasks_in_use: 2,
            peak_tasks_in_use: 3,
            switches_this_frame: 7,
        };
        assert_eq!(
            stats.to_string(),
            "4 allocated / 2 in use (peak 3), 7 switches this frame"
        );
    }
}
