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

//! RTT scaling of the control laws.
//!
//! Flows with different RTTs must converge to the same rate, so the AI
//! increment grows with the square of the RTT and the MI exponent with the
//! ratio between the RTT and the router measurement interval.

use std::time::Duration;

use crate::flow::rtt::RttEstimator;
use crate::TYPICAL_RTT;

/// Below this fraction of the typical RTT the AI scale grows linearly.
const RTT_LEFT_BY_TD: f64 = 0.2;

/// Above this multiple of the typical RTT the AI scale grows linearly.
const RTT_RIGHT_BY_TD: f64 = 5.0;

/// Upper bound of the MI exponent.
const MAX_RTT_BY_TRHO: f64 = 2.5;

/// Cached RTT scaling terms, recomputed on every RTT update.
#[derive(Debug, Clone)]
pub struct RttScaling {
    /// RTT the terms were computed from.
    rtt: Duration,

    /// Router measurement interval.
    t_rho: Duration,

    /// AI scale, roughly the square of rtt / TYPICAL_RTT.
    ai_scale: f64,

    /// MI exponent, rtt / t_rho capped at MAX_RTT_BY_TRHO.
    rtt_by_trho: f64,
}

impl RttScaling {
    /// Create scaling terms for the typical RTT.
    pub fn new(t_rho: Duration) -> Self {
        let mut s = RttScaling {
            rtt: TYPICAL_RTT,
            t_rho,
            ai_scale: 1.0,
            rtt_by_trho: 0.0,
        };
        s.reset();
        s
    }

    /// Recompute the terms from the RTT estimation.
    pub fn update(&mut self, rtt: &RttEstimator) {
        self.rtt = rtt.control_rtt();

        let r = self.rtt.as_secs_f64() / TYPICAL_RTT.as_secs_f64();
        self.ai_scale = if r <= RTT_LEFT_BY_TD {
            r * RTT_LEFT_BY_TD
        } else if r <= RTT_RIGHT_BY_TD {
            r * r
        } else {
            (r - RTT_RIGHT_BY_TD) + RTT_RIGHT_BY_TD * RTT_RIGHT_BY_TD
        };

        self.rtt_by_trho =
            (self.rtt.as_secs_f64() / self.t_rho.as_secs_f64()).min(MAX_RTT_BY_TRHO);
    }

    /// Return to the terms of the typical RTT.
    ///
    /// The MI exponent is left uncapped here, like before the first sample.
    pub fn reset(&mut self) {
        self.rtt = TYPICAL_RTT;
        self.ai_scale = 1.0;
        self.rtt_by_trho = TYPICAL_RTT.as_secs_f64() / self.t_rho.as_secs_f64();
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn ai_scale(&self) -> f64 {
        self.ai_scale
    }

    pub fn rtt_by_trho(&self) -> f64 {
        self.rtt_by_trho
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn estimator(rtt: Duration) -> RttEstimator {
        let mut r = RttEstimator::new(TYPICAL_RTT);
        r.update(rtt);
        r
    }

    #[test]
    fn typical_rtt() {
        let s = RttScaling::new(Duration::from_millis(200));
        assert_eq!(s.rtt(), TYPICAL_RTT);
        assert!(close(s.ai_scale(), 1.0));
        assert!(close(s.rtt_by_trho(), 0.5));
    }

    #[test]
    fn piecewise_ai_scale() {
        let mut s = RttScaling::new(Duration::from_millis(200));

        // Floor at the timer granularity: r = 0.1.
        s.update(&estimator(Duration::from_millis(1)));
        assert_eq!(s.rtt(), Duration::from_millis(10));
        assert!(close(s.ai_scale(), 0.1 * 0.2));

        s.update(&estimator(Duration::from_millis(20)));
        assert!(close(s.ai_scale(), 0.2 * 0.2));

        s.update(&estimator(Duration::from_millis(300)));
        assert!(close(s.ai_scale(), 9.0));

        s.update(&estimator(Duration::from_millis(500)));
        assert!(close(s.ai_scale(), 25.0));

        s.update(&estimator(Duration::from_millis(800)));
        assert!(close(s.ai_scale(), 28.0));

        // The scale is continuous at both knees.
        let mut prev = 0.0;
        for ms in (10..2000).step_by(10) {
            s.update(&estimator(Duration::from_millis(ms)));
            assert!(s.ai_scale() > prev);
            prev = s.ai_scale();
        }
    }

    #[test]
    fn rtt_by_trho_capped() {
        let mut s = RttScaling::new(Duration::from_millis(200));
        s.update(&estimator(Duration::from_millis(100)));
        assert!(close(s.rtt_by_trho(), 0.5));
        s.update(&estimator(Duration::from_millis(400)));
        assert!(close(s.rtt_by_trho(), 2.0));
        s.update(&estimator(Duration::from_secs(2)));
        assert!(close(s.rtt_by_trho(), MAX_RTT_BY_TRHO));

        s.reset();
        assert_eq!(s.rtt(), TYPICAL_RTT);
        assert!(close(s.rtt_by_trho(), 0.5));
    }
}
