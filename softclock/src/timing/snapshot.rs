//! Read-only view of the pending set, for debugging.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::timing::scheduler::TimerHandle;
use crate::timing::slab::SlabIndex;
use crate::timing::tick::Tick;

/// One queued timer as seen when the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTimer {
    /// Id of the scheduler the timer belongs to.
    pub owner: u32,
    pub slot: u32,
    pub generation: u32,
    pub deadline: Tick,
    /// Ticks until the deadline; zero or negative when overdue.
    pub remaining: i32,
}

impl PendingTimer {
    /// Handle of the timer this row describes.
    #[must_use]
    pub fn handle(&self) -> TimerHandle {
        TimerHandle::from_parts(self.owner, SlabIndex::from(self.slot), self.generation)
    }
}

/// Every queued timer in firing order, plus the tick they were measured against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingSnapshot {
    pub now: Tick,
    pub timers: Vec<PendingTimer>,
}

impl fmt::Display for PendingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ticks now: {}", self.now)?;
        writeln!(f, "    ticks     deadline   slot/gen")?;
        for t in &self.timers {
            writeln!(
                f,
                "{:9} {:12} {:6}/{}",
                t.remaining, t.deadline, t.slot, t.generation
            )?;
        }
        Ok(())
    }
}
