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

use std::cmp;
use std::time::Duration;

use super::round_timeout;
use crate::TIMER_GRANULARITY;

/// Largest window that is paced. Larger windows are sent as a burst.
const MAX_PACED_WINDOW: u64 = 64;

/// A window-bucket pacer for flows with a large RTT.
///
/// Small windows are spread over one RTT: a window of at most 2^n packets
/// is paced at rtt / 2^n. Pacing only applies when that interval exceeds
/// half of the router measurement interval; shorter intervals are below
/// what the timers can resolve, and the window is sent as a burst.
#[derive(Debug, Clone)]
pub struct Pacer {
    /// Enable pacing or not.
    enabled: bool,

    /// Intervals up to this value are not paced.
    minimal_interval: Duration,
}

impl Pacer {
    pub fn new(enabled: bool, t_rho: Duration) -> Self {
        Pacer {
            enabled,
            minimal_interval: round_timeout(t_rho / 2, TIMER_GRANULARITY, false),
        }
    }

    /// check whether pacing is enabled
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Intervals up to this value are sent as a burst.
    pub fn minimal_interval(&self) -> Duration {
        self.minimal_interval
    }

    /// Raw pacing interval of the window bucket, if the window is paced.
    pub fn bucket_interval(cwnd: f64, rtt: Duration) -> Option<Duration> {
        let cwnd = cwnd as u64;
        if cwnd <= 1 || cwnd > MAX_PACED_WINDOW {
            return None;
        }

        let bucket = cwnd.next_power_of_two();
        Some(rtt / bucket as u32)
    }

    /// Return the timer interval between two paced packets, or None if the
    /// window should be sent as a burst.
    pub fn interval(&self, cwnd: f64, rtt: Duration) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        match Self::bucket_interval(cwnd, rtt) {
            Some(interval) if interval > self.minimal_interval => Some(cmp::max(
                round_timeout(interval, TIMER_GRANULARITY, false),
                TIMER_GRANULARITY,
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets() {
        let rtt = Duration::from_millis(640);
        assert_eq!(Pacer::bucket_interval(0.5, rtt), None);
        assert_eq!(Pacer::bucket_interval(1.9, rtt), None);
        assert_eq!(Pacer::bucket_interval(2.0, rtt), Some(rtt / 2));
        assert_eq!(Pacer::bucket_interval(3.0, rtt), Some(rtt / 4));
        assert_eq!(Pacer::bucket_interval(4.9, rtt), Some(rtt / 4));
        assert_eq!(Pacer::bucket_interval(5.0, rtt), Some(rtt / 8));
        assert_eq!(Pacer::bucket_interval(16.0, rtt), Some(rtt / 16));
        assert_eq!(Pacer::bucket_interval(33.0, rtt), Some(rtt / 64));
        assert_eq!(Pacer::bucket_interval(64.9, rtt), Some(rtt / 64));
        assert_eq!(Pacer::bucket_interval(65.0, rtt), None);
    }

    #[test]
    fn pacer_disabled() {
        let p = Pacer::new(false, Duration::from_millis(200));
        assert!(!p.enabled());
        assert_eq!(p.interval(4.0, Duration::from_secs(2)), None);
    }

    #[test]
    fn pacer_interval() {
        let p = Pacer::new(true, Duration::from_millis(200));
        assert!(p.enabled());
        assert_eq!(p.minimal_interval(), Duration::from_millis(100));

        // 100ms RTT: rtt/2 = 50ms is not above the minimal interval.
        assert_eq!(p.interval(2.0, Duration::from_millis(100)), None);

        // 1s RTT with a window of 3: rtt/4 = 250ms.
        assert_eq!(
            p.interval(3.0, Duration::from_secs(1)),
            Some(Duration::from_millis(250))
        );

        // 1s RTT with a window of 10: rtt/16 = 62.5ms is a burst.
        assert_eq!(p.interval(10.0, Duration::from_secs(1)), None);

        // Rounded down to the granularity.
        assert_eq!(
            p.interval(2.0, Duration::from_millis(333)),
            Some(Duration::from_millis(160))
        );
    }
}
