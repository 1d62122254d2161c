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

use crate::TIMER_GRANULARITY;

/// RTT estimation for a flow.
///
/// Samples are taken from the data timestamp echoed by each new
/// acknowledgment. Receivers acknowledge every packet immediately, so no
/// acknowledgment delay is subtracted.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// The initial RTT used before the first sample.
    initial_rtt: Duration,

    /// The most recent RTT sample.
    latest_rtt: Duration,

    /// Exponentially weighted moving average of the RTT samples.
    smoothed_rtt: Option<Duration>,

    /// Mean variation of the RTT samples.
    rttvar: Duration,

    /// The minimum RTT observed.
    min_rtt: Duration,

    /// The maximum RTT observed.
    max_rtt: Duration,

    /// Number of samples taken.
    samples: u64,
}

impl RttEstimator {
    pub fn new(initial_rtt: Duration) -> Self {
        Self {
            initial_rtt,
            latest_rtt: initial_rtt,
            smoothed_rtt: None,
            rttvar: initial_rtt / 2,
            min_rtt: initial_rtt,
            max_rtt: initial_rtt,
            samples: 0,
        }
    }

    /// Return the current best RTT estimation.
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt.unwrap_or(self.latest_rtt)
    }

    /// Return the smoothed RTT, never less than the timer granularity.
    pub fn control_rtt(&self) -> Duration {
        cmp::max(self.smoothed_rtt(), TIMER_GRANULARITY)
    }

    /// Return the latest rtt sample
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    /// Return the Minimum RTT observed so far for this estimator.
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    /// Return the variation in the RTT samples using a mean variation.
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Return the Maximum RTT observed so far for this estimator.
    pub fn max_rtt(&self) -> Duration {
        self.max_rtt
    }

    /// Return the number of samples taken.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Whether at least one sample was taken.
    pub fn has_sample(&self) -> bool {
        self.smoothed_rtt.is_some()
    }

    /// Update estimator with the given RTT sample
    pub fn update(&mut self, rtt: Duration) {
        self.latest_rtt = rtt;
        self.samples += 1;

        let smoothed_rtt = match self.smoothed_rtt {
            Some(v) => v,
            None => {
                self.smoothed_rtt = Some(rtt);
                self.rttvar = rtt / 2;
                self.min_rtt = rtt;
                self.max_rtt = rtt;
                return;
            }
        };

        self.min_rtt = cmp::min(self.min_rtt, rtt);
        self.max_rtt = cmp::max(self.max_rtt, rtt);

        let var_sample = if smoothed_rtt > rtt {
            smoothed_rtt - rtt
        } else {
            rtt - smoothed_rtt
        };
        self.rttvar = (3 * self.rttvar + var_sample) / 4;
        self.smoothed_rtt = Some((7 * smoothed_rtt + rtt) / 8);
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        *self = Self::new(self.initial_rtt);
    }
}
