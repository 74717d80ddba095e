//! Feed controller: turns the consumer's backpressure signals into scheduling.
//!
//! Two states. `need-data` arms one repeating producer work item, `enough-data`
//! disarms it. Both are no-ops from the wrong state, so repeated signals never
//! create a second producer or cancel twice.

use crate::producer::StopReason;
use crate::scheduler::{Priority, Scheduler, WorkHandle};
use crate::session::{FeedSession, FeedState};

#[derive(Debug, Default)]
pub struct FeedController {
    session: FeedSession,
}

impl FeedController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &FeedSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FeedSession {
        &mut self.session
    }

    /// Consumer wants data: arm the producer unless it is already armed.
    pub fn on_need_data(&mut self, hint: u32, sched: &mut impl Scheduler) {
        if let FeedState::Feeding(handle) = self.session.state() {
            tracing::trace!(hint, %handle, "need-data while feeding");
            return;
        }
        let handle = sched.schedule_repeating(Priority::HighIdle);
        self.session.set_state(FeedState::Feeding(handle));
        tracing::debug!(hint, %handle, "start feeding");
    }

    /// Consumer is full: disarm the producer if it is armed.
    pub fn on_enough_data(&mut self, sched: &mut impl Scheduler) {
        let FeedState::Feeding(handle) = self.session.state() else {
            tracing::trace!("enough-data while idle");
            return;
        };
        sched.cancel(handle);
        self.session.set_state(FeedState::Idle);
        tracing::debug!(%handle, "stop feeding");
    }

    /// The producer dispatch for `handle` returned stop and has been deregistered.
    ///
    /// Ignored when `handle` is not the current work item.
    pub fn on_work_stopped(&mut self, handle: WorkHandle, reason: &StopReason) {
        if self.session.work_handle() != Some(handle) {
            return;
        }
        self.session.set_state(FeedState::Idle);
        tracing::debug!(%handle, ?reason, "feeding stopped by producer");
    }
}
