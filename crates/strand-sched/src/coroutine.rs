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

//! The suspension primitive tasks are built on.
//!
//! A task body is a boxed future. Resuming polls it once; every `Pending` is a
//! yield point. Killing drops the future, so no code past the last yield point
//! ever runs. Wakers are never used: the scheduler decides when a body is polled.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use strand_core::CoStatus;

/// A type-erased task body.
pub(crate) type TaskBody = Pin<Box<dyn Future<Output = ()>>>;

/// Polls a body once.
pub(crate) fn poll_body(body: &mut TaskBody) -> Poll<()> {
    let mut cx = Context::from_waker(Waker::noop());
    body.as_mut().poll(&mut cx)
}

/// A suspension context: a body plus its status.
///
/// While a body is being polled it is moved out of the coroutine (status
/// `Running`), so that the body can reach back into the scheduler and resume
/// other tasks without aliasing its own storage.
pub(crate) struct Coroutine {
    body: Option<TaskBody>,
    status: CoStatus,
}

impl Coroutine {
    /// A coroutine with no body. It reports `Dead` until [`Coroutine::recycle`] is called.
    pub(crate) fn idle() -> Self {
        Self {
            body: None,
            status: CoStatus::Dead,
        }
    }

    /// Installs a fresh body in a dead coroutine.
    pub(crate) fn recycle(&mut self, body: TaskBody) {
        assert!(
            self.status.is_dead() && self.body.is_none(),
            "cannot recycle a coroutine that is still {}",
            self.status
        );
        self.body = Some(body);
        self.status = CoStatus::Suspended;
    }

    pub(crate) fn status(&self) -> CoStatus {
        self.status
    }

    /// Moves the body out for polling and marks the coroutine `Running`.
    pub(crate) fn enter(&mut self) -> TaskBody {
        assert_eq!(
            self.status,
            CoStatus::Suspended,
            "only a suspended coroutine can be entered"
        );
        match self.body.take() {
            Some(body) => {
                self.status = CoStatus::Running;
                body
            }
            None => unreachable!("suspended coroutine without a body"),
        }
    }

    /// Puts the body back after a poll.
    ///
    /// Returns the body if the coroutine is dead afterwards, either because the
    /// body completed or because it was killed while running. The caller drops
    /// it once no scheduler state is borrowed.
    pub(crate) fn leave(&mut self, body: TaskBody, completed: bool) -> Option<TaskBody> {
        if completed || self.status.is_dead() {
            self.status = CoStatus::Dead;
            return Some(body);
        }
        self.status = CoStatus::Suspended;
        self.body = Some(body);
        None
    }

    /// Marks the coroutine dead and hands back its body, if it is not currently out being polled.
    pub(crate) fn kill(&mut self) -> Option<TaskBody> {
        self.status = CoStatus::Dead;
        self.body.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct YieldOnce(bool);

    impl Future for YieldOnce {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                Poll::Pending
            }
        }
    }

    #[test]
    fn enter_leave_until_completion() {
        let steps = Rc::new(Cell::new(0));
        let counter = steps.clone();
        let mut co = Coroutine::idle();
        assert_eq!(co.status(), CoStatus::Dead);

        co.recycle(Box::pin(async move {
            counter.set(1);
            YieldOnce(false).await;
            counter.set(2);
        }));
        assert_eq!(co.status(), CoStatus::Suspended);

        let mut body = co.enter();
        assert_eq!(co.status(), CoStatus::Running);
        let poll = poll_body(&mut body);
        assert!(poll.is_pending());
        assert!(co.leave(body, false).is_none());
        assert_eq!(steps.get(), 1);

        let mut body = co.enter();
        assert!(poll_body(&mut body).is_ready());
        assert!(co.leave(body, true).is_some());
        assert_eq!(co.status(), CoStatus::Dead);
        assert_eq!(steps.get(), 2);
    }

    #[test]
    fn kill_while_running_discards_body_on_leave() {
        let mut co = Coroutine::idle();
        co.recycle(Box::pin(YieldOnce(false)));

        let mut body = co.enter();
        assert!(co.kill().is_none(), "the body is out being polled");
        assert!(poll_body(&mut body).is_pending());
        assert!(co.leave(body, false).is_some());
        assert_eq!(co.status(), CoStatus::Dead);
    }

    #[test]
    fn kill_suspended_returns_body() {
        let mut co = Coroutine::idle();
        co.recycle(Box::pin(YieldOnce(false)));
        assert!(co.kill().is_some());
        assert_eq!(co.status(), CoStatus::Dead);
    }
}
