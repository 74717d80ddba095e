//! Cooperative scheduling of repeating work items.
//!
//! A work item stays registered until it is cancelled or its dispatch asks to stop.
//! Nothing here runs code; the main loop asks [`IdleQueue::next_due`] which item to
//! dispatch and reports back when the item is done.

use std::fmt;

/// Identifies one registered work item. Never reused within a scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkHandle(u64);

impl fmt::Display for WorkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work#{}", self.0)
    }
}

/// Dispatch priority, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Highest priority among idle work.
    HighIdle,
    DefaultIdle,
}

/// Registry of repeating work items.
pub trait Scheduler {
    /// Register a repeating work item; it runs until cancelled.
    fn schedule_repeating(&mut self, priority: Priority) -> WorkHandle;
    /// Deregister `handle`. Returns `false` when it was not registered.
    fn cancel(&mut self, handle: WorkHandle) -> bool;
    fn is_scheduled(&self, handle: WorkHandle) -> bool;
}

/// Priority-ordered set of repeating work items.
#[derive(Debug, Default)]
pub struct IdleQueue {
    items: Vec<(Priority, WorkHandle)>,
    next_id: u64,
    cursor: usize,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pick the next item to dispatch.
    ///
    /// Returns the highest-priority item; equal priorities take turns.
    pub fn next_due(&mut self) -> Option<WorkHandle> {
        let top = self.items.iter().map(|(p, _)| *p).min()?;
        let ready: Vec<WorkHandle> = self
            .items
            .iter()
            .filter(|(p, _)| *p == top)
            .map(|(_, h)| *h)
            .collect();
        let pick = ready[self.cursor % ready.len()];
        self.cursor = self.cursor.wrapping_add(1);
        Some(pick)
    }
}

impl Scheduler for IdleQueue {
    fn schedule_repeating(&mut self, priority: Priority) -> WorkHandle {
        self.next_id += 1;
        let handle = WorkHandle(self.next_id);
        self.items.push((priority, handle));
        handle
    }

    fn cancel(&mut self, handle: WorkHandle) -> bool {
        let before = self.items.len();
        self.items.retain(|(_, h)| *h != handle);
        self.items.len() != before
    }

    fn is_scheduled(&self, handle: WorkHandle) -> bool {
        self.items.iter().any(|(_, h)| *h == handle)
    }
}
