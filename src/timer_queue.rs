// Copyright (c) 2023 The TQUIC Authors.
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

//! Event scheduler delivering typed timer events in expiry order.

use std::time::Duration;
use std::time::Instant;

use priority_queue::double_priority_queue::DoublePriorityQueue;

use crate::timer::Timer;

/// Identifies an armed timer: the router or flow owning it and the timer
/// (phase) tag it was armed with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Opaque router or flow identifier.
    pub owner: u64,

    /// Timer tag.
    pub timer: Timer,
}

impl TimerKey {
    pub fn new(owner: u64, timer: Timer) -> Self {
        Self { owner, timer }
    }
}

/// Store timers in a binary queue. Keep them sorted by which timer is going to expire first.
pub struct TimerQueue {
    timers: DoublePriorityQueue<TimerKey, Instant>,
}

impl TimerQueue {
    /// Create a new TimerQueue.
    pub fn new() -> Self {
        Self {
            timers: DoublePriorityQueue::new(),
        }
    }

    /// Creates an empty timer queue with a specific capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timers: DoublePriorityQueue::with_capacity(capacity),
        }
    }

    /// Return the number of timers in the queue.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Return if the timer queue is empty.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Schedule a timer after a relative delay, replacing any existing timer
    /// with the same key.
    pub fn add(&mut self, key: TimerKey, delay: Duration, now: Instant) {
        self.add_at(key, now + delay);
    }

    /// Schedule a timer at an absolute deadline, replacing any existing
    /// timer with the same key.
    pub fn add_at(&mut self, key: TimerKey, deadline: Instant) {
        _ = self.timers.push(key, deadline);
    }

    /// Cancel a timer.
    pub fn del(&mut self, key: &TimerKey) {
        _ = self.timers.remove(key);
    }

    /// Cancel every timer of the given owner.
    pub fn del_owner(&mut self, owner: u64) {
        let keys: Vec<TimerKey> = self
            .timers
            .iter()
            .filter(|(k, _)| k.owner == owner)
            .map(|(k, _)| *k)
            .collect();
        for k in keys {
            self.del(&k);
        }
    }

    /// Return the deadline of a timer, if it is scheduled.
    pub fn deadline(&self, key: &TimerKey) -> Option<Instant> {
        self.timers.get_priority(key).copied()
    }

    /// Return the deadline of the earliest expiring timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.peek_min().map(|(_, expires_at)| *expires_at)
    }

    /// Return the amount of time remaining for the earliest expiring timer.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        self.timers
            .peek_min()
            .map(|(_, expires_at)| expires_at.saturating_duration_since(now))
    }

    /// Return the next expired timer if any.
    pub fn next_expire(&mut self, now: Instant) -> Option<TimerKey> {
        match self.timers.peek_min() {
            Some((_, expires_at)) if *expires_at <= now => {
                self.timers.pop_min().map(|(key, _)| key)
            }
            _ => None,
        }
    }

    /// Clear all the timers
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(owner: u64, timer: Timer) -> TimerKey {
        TimerKey::new(owner, timer)
    }

    #[test]
    fn add() {
        let mut tq = TimerQueue::with_capacity(10);
        assert!(tq.is_empty());

        let now = Instant::now();
        tq.add(key(0, Timer::HoldDownFirst), Duration::from_millis(100), now);
        assert_eq!(tq.len(), 1);

        // Same owner, different timer.
        tq.add(key(0, Timer::Pacing), Duration::from_millis(200), now);
        assert_eq!(tq.len(), 2);

        // Rescheduling an existing timer replaces it.
        tq.add(key(0, Timer::Pacing), Duration::from_millis(300), now);
        assert_eq!(tq.len(), 2);
        assert_eq!(
            tq.deadline(&key(0, Timer::Pacing)),
            Some(now + Duration::from_millis(300))
        );
    }

    #[test]
    fn del() {
        let mut tq = TimerQueue::default();

        let now = Instant::now();
        tq.add(key(0, Timer::HoldDownFirst), Duration::from_millis(100), now);
        tq.add(key(1, Timer::HoldDownFirst), Duration::from_millis(100), now);
        tq.add(key(1, Timer::Pacing), Duration::from_millis(100), now);
        assert_eq!(tq.len(), 3);

        // Delete a non-existing timer.
        tq.del(&key(0, Timer::Pacing));
        assert_eq!(tq.len(), 3);

        tq.del(&key(0, Timer::HoldDownFirst));
        assert_eq!(tq.len(), 2);

        // Tear down a flow.
        tq.del_owner(1);
        assert!(tq.is_empty());
    }

    #[test]
    fn expired() {
        let mut tq = TimerQueue::default();

        let now = Instant::now();
        tq.add(key(0, Timer::QueueSampling), Duration::from_millis(100), now);
        tq.add(key(1, Timer::HoldDownFirst), Duration::from_millis(200), now);
        tq.add(key(2, Timer::HoldDownFirst), Duration::from_millis(300), now);
        assert!(tq.next_expire(now).is_none());
        assert_eq!(tq.len(), 3);

        let t = now + Duration::from_millis(100);
        assert_eq!(tq.next_expire(t), Some(key(0, Timer::QueueSampling)));
        assert_eq!(tq.len(), 2);

        tq.del(&key(2, Timer::HoldDownFirst));
        tq.add(key(3, Timer::Pacing), Duration::from_millis(1000), now);
        tq.add(key(4, Timer::Pacing), Duration::from_millis(1500), now);
        let t = now + Duration::from_millis(1000);
        assert_eq!(tq.next_expire(t), Some(key(1, Timer::HoldDownFirst)));
        assert_eq!(tq.next_expire(t), Some(key(3, Timer::Pacing)));
        assert_eq!(tq.next_expire(t), None);
        assert_eq!(tq.len(), 1);
    }

    #[test]
    fn time_remaining() {
        let mut tq = TimerQueue::default();

        let now = Instant::now();
        assert_eq!(tq.time_remaining(now), None);
        assert_eq!(tq.next_deadline(), None);

        tq.add(key(0, Timer::LoadMeasurement), Duration::from_millis(100), now);
        tq.add(key(1, Timer::LoadMeasurement), Duration::from_millis(200), now);
        assert_eq!(tq.time_remaining(now), Some(Duration::from_millis(100)));
        assert_eq!(
            tq.time_remaining(now + Duration::from_millis(150)),
            Some(Duration::ZERO)
        );
        assert_eq!(tq.next_deadline(), Some(now + Duration::from_millis(100)));
    }
}
