//! Receiver ranking entries kept by a [`TimeKeeper`](crate::TimeKeeper).

use core::cmp::Ordering;

use crate::receiver::ReceiverId;
use crate::time::Time;

/// Immutable association of a receiver with its time and priority.
///
/// A triple only names its receiver by id; it never keeps it alive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RcvrTimeTriple {
    receiver: ReceiverId,
    time: Time,
    priority: i32,
    yielded: bool,
}

impl RcvrTimeTriple {
    pub fn new(receiver: ReceiverId, time: Time, priority: i32) -> Self {
        Self {
            receiver,
            time,
            priority,
            yielded: false,
        }
    }

    /// Marks a receiver that gave up its tie after a deadlock release.
    pub fn yielded(mut self, yielded: bool) -> Self {
        self.yielded = yielded;
        self
    }

    pub fn receiver(&self) -> ReceiverId {
        self.receiver
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_yielded(&self) -> bool {
        self.yielded
    }

    /// Ranking order: earlier time first, then receivers that did not yield,
    /// then higher priority, then lower receiver id.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then(self.yielded.cmp(&other.yielded))
            .then(other.priority.cmp(&self.priority))
            .then(self.receiver.cmp(&other.receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(id: u32, time: f64, priority: i32) -> RcvrTimeTriple {
        RcvrTimeTriple::new(ReceiverId(id), Time::new(time), priority)
    }

    #[test]
    fn earlier_time_ranks_first() {
        assert_eq!(triple(1, 1.0, 0).rank(&triple(2, 2.0, 99)), Ordering::Less);
    }

    #[test]
    fn ties_break_on_priority_then_id() {
        assert_eq!(triple(1, 3.0, 5).rank(&triple(2, 3.0, 10)), Ordering::Greater);
        assert_eq!(triple(1, 3.0, 5).rank(&triple(2, 3.0, 5)), Ordering::Less);
    }

    #[test]
    fn yielded_receiver_loses_its_tie() {
        let winner = triple(1, 3.0, 10).yielded(true);
        assert_eq!(winner.rank(&triple(2, 3.0, 0)), Ordering::Greater);
    }
}
