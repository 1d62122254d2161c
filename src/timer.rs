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

use std::time::Duration;
use std::time::Instant;

use strum::EnumCount;
use strum_macros::EnumCount;
use strum_macros::EnumIter;

/// Timers armed by routers and senders.
///
/// Hold-down timers carry their phase so that an expiry can be checked
/// against the phase the sender is in.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, EnumIter, EnumCount)]
pub enum Timer {
    /// Router: when to add the queue occupancy to the running sum.
    QueueSampling,

    /// Router: when to close the current measurement interval.
    LoadMeasurement,

    /// Sender: end of the freeze period following a decrease.
    HoldDownFirst,

    /// Sender: end of the cautious increase period following a freeze.
    HoldDownSecond,

    /// Sender: when to release the next paced packet.
    Pacing,
}

/// Associated timeout values with each `Timer`
#[derive(Debug, Copy, Clone, Default)]
pub struct TimerTable {
    expires: [Option<Instant>; Timer::COUNT],
}

impl TimerTable {
    /// Set expiration time for the given timer
    pub fn set(&mut self, timer: Timer, time: Instant) {
        self.expires[timer as usize] = Some(time);
    }

    /// Arm the given timer to expire after `delay`
    pub fn set_after(&mut self, timer: Timer, now: Instant, delay: Duration) {
        self.set(timer, now + delay);
    }

    /// Get expiration time for the given timer
    pub fn get(&self, timer: Timer) -> Option<Instant> {
        self.expires[timer as usize]
    }

    /// Cancel the given timer
    pub fn stop(&mut self, timer: Timer) {
        self.expires[timer as usize] = None;
    }

    /// Cancel all timers
    pub fn stop_all(&mut self) {
        self.expires = [None; Timer::COUNT];
    }

    /// Whether the given timer is armed
    pub fn is_pending(&self, timer: Timer) -> bool {
        self.expires[timer as usize].is_some()
    }

    /// Get the minimum expiration time of all timers
    pub fn next_timeout(&self) -> Option<Instant> {
        self.expires.iter().filter_map(|&x| x).min()
    }

    /// Check whether the given timer is expired
    pub fn is_expired(&self, timer: Timer, after: Instant) -> bool {
        self.expires[timer as usize].map_or(false, |x| x <= after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_operation() {
        let mut timers = TimerTable::default();
        assert_eq!(timers.next_timeout(), None);

        let now = Instant::now();
        let sampling = now + Duration::from_millis(10);
        let measurement = now + Duration::from_millis(200);
        timers.set(Timer::QueueSampling, sampling);
        timers.set_after(Timer::LoadMeasurement, now, Duration::from_millis(200));

        assert_eq!(timers.get(Timer::QueueSampling), Some(sampling));
        assert_eq!(timers.get(Timer::LoadMeasurement), Some(measurement));
        assert_eq!(timers.get(Timer::HoldDownFirst), None);
        assert!(timers.is_pending(Timer::QueueSampling));
        assert!(!timers.is_pending(Timer::Pacing));
        assert_eq!(timers.next_timeout(), Some(sampling));

        timers.stop(Timer::QueueSampling);
        assert_eq!(timers.get(Timer::QueueSampling), None);
        assert_eq!(timers.next_timeout(), Some(measurement));

        timers.stop_all();
        assert_eq!(timers.next_timeout(), None);
    }

    #[test]
    fn timer_expiration() {
        let mut timers = TimerTable::default();
        let now = Instant::now();
        let first = now + Duration::from_millis(200);
        let pacing = now + Duration::from_millis(30);
        timers.set(Timer::HoldDownFirst, first);
        timers.set(Timer::Pacing, pacing);

        assert!(!timers.is_expired(Timer::HoldDownFirst, now));
        assert!(!timers.is_expired(Timer::Pacing, now));

        assert!(timers.is_expired(Timer::Pacing, pacing));
        assert!(!timers.is_expired(Timer::HoldDownFirst, pacing));

        assert!(timers.is_expired(Timer::HoldDownFirst, first));
        assert!(!timers.is_expired(Timer::HoldDownSecond, first));
    }
}
