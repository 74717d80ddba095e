use crate::scheduler::WorkHandle;

/// Whether the producer is currently allowed to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Feeding(WorkHandle),
}

/// State shared by the feed controller and the chunk producer for one stream.
#[derive(Debug)]
pub struct FeedSession {
    sample_count: u64,
    state: FeedState,
}

impl Default for FeedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSession {
    pub fn new() -> Self {
        Self {
            sample_count: 0,
            state: FeedState::Idle,
        }
    }

    /// Frames emitted so far.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Advance the frame counter, returning its value before the advance.
    pub fn advance(&mut self, frames: u64) -> u64 {
        let before = self.sample_count;
        self.sample_count = before.saturating_add(frames);
        before
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: FeedState) {
        self.state = state;
    }

    pub fn is_feeding(&self) -> bool {
        matches!(self.state, FeedState::Feeding(_))
    }

    pub fn work_handle(&self) -> Option<WorkHandle> {
        match self.state {
            FeedState::Feeding(h) => Some(h),
            FeedState::Idle => None,
        }
    }
}
