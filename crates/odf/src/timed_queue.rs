//! Non-blocking FIFO of time-stamped tokens.
//!
//! [`TimedReceiver`] holds the queue discipline shared by every receiver:
//! time stamps appended to one queue never decrease, a completion time turns
//! later tokens into [`Time::Inactive`] markers, and the receiver time only
//! moves forward.

use std::collections::VecDeque;

use log::warn;

use crate::error::{Error, Result};
use crate::receiver::ReceiverId;
use crate::time::Time;
use crate::token::{TimedToken, Token};

pub struct TimedReceiver<T> {
    id: ReceiverId,
    queue: VecDeque<TimedToken<T>>,
    capacity: Option<usize>,
    base_capacity: Option<usize>,
    /// Time of the last removed token, or the time a deadlock release
    /// advanced the empty queue to.
    last_time: Time,
    last_put: Time,
    completion_time: Option<Time>,
    producer_finished: bool,
}

impl<T> TimedReceiver<T> {
    /// Creates an empty queue; `None` means unbounded. A zero capacity is
    /// raised to one.
    pub fn new(id: ReceiverId, capacity: Option<usize>) -> Self {
        let capacity = capacity.map(|c| c.max(1));
        Self {
            id,
            queue: VecDeque::new(),
            capacity,
            base_capacity: capacity,
            last_time: Time::NotStarted,
            last_put: Time::NotStarted,
            completion_time: None,
            producer_finished: false,
        }
    }

    pub fn id(&self) -> ReceiverId {
        self.id
    }

    /// Appends a token and returns the time stamp it was queued with.
    pub fn put(&mut self, token: Token<T>, time: Time) -> Result<Time> {
        if !self.has_room() {
            return Err(Error::NoRoomAvailable);
        }
        let effective = self.effective_time(time)?;
        if effective.is_finite() && effective > time {
            warn!(
                "receiver {}: token at {} arrived behind receiver time {}, raised",
                self.id, time, effective
            );
        }
        self.queue.push_back(TimedToken::new(token, effective));
        self.last_put = effective;
        Ok(effective)
    }

    /// Time stamp a put at `time` would be queued with, without queuing.
    ///
    /// Applies the completion time, rejects regressions against the last
    /// appended time and raises late finite times to the receiver time.
    pub fn effective_time(&self, time: Time) -> Result<Time> {
        let admitted = self.admit(time)?;
        if admitted.is_finite() && admitted < self.last_time {
            Ok(self.last_time)
        } else {
            Ok(admitted)
        }
    }

    fn admit(&self, time: Time) -> Result<Time> {
        if !time.is_started() {
            return Err(Error::InvalidTime(time.to_wire()));
        }
        let effective = match self.completion_time {
            Some(limit) if time > limit => Time::Inactive,
            _ => time,
        };
        if effective < self.last_put {
            return Err(Error::TimeRegression {
                receiver: self.id,
                time: effective,
                last: self.last_put,
            });
        }
        Ok(effective)
    }

    pub fn get(&mut self) -> Result<TimedToken<T>> {
        let timed = self.queue.pop_front().ok_or(Error::NoTokenAvailable)?;
        debug_assert!(
            timed.time >= self.last_time,
            "receiver time moved backwards"
        );
        self.last_time = timed.time;
        Ok(timed)
    }

    #[inline]
    pub fn has_token(&self) -> bool {
        !self.queue.is_empty()
    }

    #[inline]
    pub fn has_room(&self) -> bool {
        self.capacity.map_or(true, |cap| self.queue.len() < cap)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn front(&self) -> Option<&TimedToken<T>> {
        self.queue.front()
    }

    pub fn peek_time(&self) -> Option<Time> {
        self.queue.front().map(|timed| timed.time)
    }

    /// Head time stamp, or the last removed time when empty. A drained queue
    /// whose producer finished reports [`Time::Inactive`].
    pub fn rcvr_time(&self) -> Time {
        match self.peek_time() {
            Some(time) => time,
            None if self.producer_finished => Time::Inactive,
            None => self.last_time,
        }
    }

    pub fn last_put_time(&self) -> Time {
        self.last_put
    }

    pub fn completion_time(&self) -> Option<Time> {
        self.completion_time
    }

    pub fn set_completion_time(&mut self, time: Option<Time>) {
        self.completion_time = time;
    }

    /// Adds one slot of capacity to a bounded queue.
    pub fn grow_capacity(&mut self) {
        if let Some(cap) = self.capacity.as_mut() {
            *cap += 1;
        }
    }

    /// Moves the time of an empty queue forward. Returns false when the queue
    /// holds tokens or `time` is not ahead of the receiver time.
    pub fn advance_time(&mut self, time: Time) -> bool {
        if !self.queue.is_empty() || time <= self.last_time {
            return false;
        }
        self.last_time = time;
        true
    }

    /// Records that no more tokens will be appended.
    pub fn finish_producer(&mut self) {
        self.producer_finished = true;
    }

    pub fn is_producer_finished(&self) -> bool {
        self.producer_finished
    }

    /// True when a null token at `time` would tell the consumer something new.
    pub fn lags(&self, time: Time) -> bool {
        time.is_finite()
            && !self.producer_finished
            && time > self.last_put
            && time > self.last_time
            && self.completion_time.map_or(true, |limit| time <= limit)
    }

    /// Drops queued tokens and restores the configured capacity. The
    /// completion time is kept.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.capacity = self.base_capacity;
        self.last_time = Time::NotStarted;
        self.last_put = Time::NotStarted;
        self.producer_finished = false;
    }
}
