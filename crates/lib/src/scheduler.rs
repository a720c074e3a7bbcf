use crate::{Clock, RunId};
use std::{cmp::Reverse, collections::BinaryHeap};

/// Deferred delivery of interpolator ticks. The host hands each expired timer
/// back to `BalanceController::on_timer`.
pub trait Scheduler {
    fn schedule(&mut self, delay_millis: u64, run: RunId);
}

/// Timers ordered by due time, then by insertion order.
#[derive(Debug, Clone)]
pub struct TimerQueue<C> {
    clock: C,
    seq: u64,
    timers: BinaryHeap<Reverse<(i64, u64, RunId)>>,
}

impl<C: Clock> TimerQueue<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            seq: 0,
            timers: BinaryHeap::new(),
        }
    }

    /// Removes the earliest timer due at or before `until`.
    pub fn pop_due(&mut self, until: i64) -> Option<(i64, RunId)> {
        match self.timers.peek() {
            Some(Reverse((due, _, _))) if *due <= until => {
                self.timers.pop().map(|Reverse((due, _, run))| (due, run))
            }
            _ => None,
        }
    }

    pub fn next_due(&self) -> Option<i64> {
        self.timers.peek().map(|Reverse((due, _, _))| *due)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<C: Clock> Scheduler for TimerQueue<C> {
    fn schedule(&mut self, delay_millis: u64, run: RunId) {
        let delay = i64::try_from(delay_millis).unwrap_or(i64::MAX);
        let due = self.clock.now_millis().saturating_add(delay);
        self.seq += 1;
        self.timers.push(Reverse((due, self.seq, run)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    #[test]
    fn pops_in_due_order() {
        let clock = ManualClock::utc(1000);
        let mut queue = TimerQueue::new(clock.clone());
        queue.schedule(50, RunId::new(1));
        queue.schedule(10, RunId::new(2));
        clock.advance(5);
        queue.schedule(0, RunId::new(3));

        assert_eq!(queue.next_due(), Some(1005));
        assert_eq!(queue.pop_due(i64::MAX), Some((1005, RunId::new(3))));
        assert_eq!(queue.pop_due(i64::MAX), Some((1010, RunId::new(2))));
        assert_eq!(queue.pop_due(i64::MAX), Some((1050, RunId::new(1))));
        assert!(queue.is_empty());
    }

    #[test]
    fn keeps_timers_that_are_not_due() {
        let mut queue = TimerQueue::new(ManualClock::utc(0));
        queue.schedule(100, RunId::new(1));
        assert_eq!(queue.pop_due(99), None);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_due(100), Some((100, RunId::new(1))));
    }

    #[test]
    fn same_due_time_is_fifo() {
        let mut queue = TimerQueue::new(ManualClock::utc(0));
        queue.schedule(0, RunId::new(7));
        queue.schedule(0, RunId::new(3));
        assert_eq!(queue.pop_due(0), Some((0, RunId::new(7))));
        assert_eq!(queue.pop_due(0), Some((0, RunId::new(3))));
    }
}
