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

//! VCP driven by the raw load factor.
//!
//! Routers publish the load factor in hundredths of a percent instead of a
//! 2-bit code. Every acknowledgment applies a multiplicative term that
//! shrinks as the load factor approaches 100%, turns negative above it, and
//! an additive term. There is no hold-down.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::Action;
use super::Pacer;
use super::RateControlStats;
use super::RateController;
use super::RttScaling;
use super::VcpConfig;
use crate::flow::rtt::RttEstimator;
use crate::packet::PacketMeta;
use crate::tables::VcpTables;
use crate::timer::Timer;
use crate::timer::TimerTable;
use crate::Error;
use crate::Result;

/// Raw load factor of 100%.
const FULL_LOAD: f64 = 10_000.0;

/// Multiplicative term at or below the low load threshold.
const LOW_LOAD_MI: f64 = 0.0625;

/// Minimal window in packets.
const MINIMAL_WINDOW: f64 = 1.0;

/// VCP rate controller driven by the raw load factor.
#[derive(Debug)]
pub struct VcpRaw {
    /// Config
    config: VcpConfig,

    /// Statistics.
    stats: RateControlStats,

    /// Congestion window in packets.
    cwnd: f64,

    /// Direction of the latest adjustment.
    action: Action,

    /// Raw load factors up to this bound use `LOW_LOAD_MI`.
    low_bound: u16,

    /// Cached RTT scaling terms.
    scaling: RttScaling,

    /// Pacer.
    pacer: Pacer,

    /// Pacing timer.
    timers: TimerTable,
}

impl VcpRaw {
    pub fn new(config: VcpConfig, tables: Arc<VcpTables>) -> Self {
        let low = tables.low_threshold();

        Self {
            cwnd: config.initial_cwnd,
            action: Action::MI,
            low_bound: low.saturating_mul(100),
            scaling: RttScaling::new(config.t_rho),
            pacer: Pacer::new(config.pacing, config.t_rho),
            timers: TimerTable::default(),
            stats: Default::default(),
            config,
        }
    }

    /// Multiplicative term for a raw load factor.
    fn mi_term(&self, raw: u16) -> f64 {
        let m = if raw <= self.low_bound {
            LOW_LOAD_MI
        } else {
            self.config.k * (FULL_LOAD / raw as f64 - 1.0)
        };
        (1.0 + m).powf(self.scaling.rtt_by_trho()) - 1.0
    }

    /// Additive term.
    fn ai_term(&self) -> f64 {
        self.scaling.ai_scale() * self.config.alpha * self.config.w / self.cwnd
    }
}

impl RateController for VcpRaw {
    fn name(&self) -> &str {
        "VCP-RAW"
    }

    fn on_sent(&mut self, now: Instant, packet: &PacketMeta, paced: bool) {
        if paced {
            self.stats.paced_packets += 1;
        }
    }

    fn on_ack(&mut self, now: Instant, ack: &PacketMeta) -> Result<()> {
        self.check_ack(ack)?;

        let raw = ack.feedback.value();
        let change = self.mi_term(raw) + self.ai_term();
        self.action = if change < 0.0 {
            self.stats.cwnd_cuts += 1;
            Action::MD
        } else {
            Action::MI
        };

        self.cwnd = (self.cwnd + change).max(MINIMAL_WINDOW);
        if let Some(max_cwnd) = self.config.max_cwnd {
            self.cwnd = self.cwnd.min(max_cwnd);
        }
        self.stats.on_action(self.action);

        trace!(
            "{}. ack {} load factor {} change {:.4} cwnd {:.3}",
            self.name(),
            ack.seq,
            raw,
            change,
            self.cwnd
        );
        Ok(())
    }

    fn on_rtt_update(&mut self, rtt: &RttEstimator) {
        self.scaling.update(rtt);
    }

    fn timeout(&self) -> Option<Instant> {
        self.timers.next_timeout()
    }

    fn timer_deadline(&self, timer: Timer) -> Option<Instant> {
        self.timers.get(timer)
    }

    fn on_timer(&mut self, timer: Timer, now: Instant) -> Result<bool> {
        self.timers.stop(timer);
        match timer {
            Timer::Pacing => Ok(true),
            _ => Err(Error::InvalidState(format!(
                "{:?} is not used by {}",
                timer,
                self.name()
            ))),
        }
    }

    fn on_timeout(&mut self, now: Instant) -> Result<bool> {
        if self.timers.is_expired(Timer::Pacing, now) {
            return self.on_timer(Timer::Pacing, now);
        }
        Ok(false)
    }

    fn pacing_interval(&self) -> Option<Duration> {
        self.pacer.interval(self.cwnd, self.scaling.rtt())
    }

    fn schedule_pacing(&mut self, now: Instant) -> Option<Instant> {
        let interval = self.pacing_interval()?;
        self.timers.set_after(Timer::Pacing, now, interval);
        self.timers.get(Timer::Pacing)
    }

    fn congestion_window(&self) -> f64 {
        self.cwnd
    }

    fn initial_window(&self) -> f64 {
        self.config.initial_cwnd
    }

    fn action(&self) -> Action {
        self.action
    }

    fn stats(&self) -> &RateControlStats {
        &self.stats
    }

    fn reset(&mut self) {
        self.cwnd = self.config.initial_cwnd;
        self.action = Action::MI;
        self.stats = Default::default();
        self.scaling.reset();
        self.timers.stop_all();
    }

    fn close(&mut self) {
        self.timers.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion_control::HoldDownPhase;
    use crate::packet::FeedbackField;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn ack(seq: u64, load_factor: f64, now: Instant) -> PacketMeta {
        PacketMeta::ack(1, seq, 40, now, now).with_feedback(FeedbackField::raw(load_factor))
    }

    fn new_vcp_raw(initial_cwnd: f64) -> VcpRaw {
        VcpRaw::new(
            VcpConfig::new(Duration::from_millis(200), initial_cwnd, None),
            VcpTables::shared(),
        )
    }

    #[test]
    fn raw_low_load() -> Result<()> {
        let mut v = new_vcp_raw(2.0);
        let now = Instant::now();

        // At or below 80% the multiplicative term is 1/16.
        v.on_ack(now, &ack(1, 80.0, now))?;
        let expected = 2.0 + (1.0625f64.sqrt() - 1.0) + 1.0 / 2.0;
        assert!(close(v.congestion_window(), expected));
        assert_eq!(v.action(), Action::MI);
        assert_eq!(v.hold_down_phase(), HoldDownPhase::None);
        Ok(())
    }

    #[test]
    fn raw_low_load_ignores_gain() -> Result<()> {
        let mut conf = VcpConfig::new(Duration::from_millis(200), 2.0, None);
        conf.k = 0.5;
        let mut v = VcpRaw::new(conf, VcpTables::shared());
        let now = Instant::now();

        v.on_ack(now, &ack(1, 50.0, now))?;
        let expected = 2.0 + (1.0625f64.sqrt() - 1.0) + 1.0 / 2.0;
        assert!(close(v.congestion_window(), expected));

        // Above the low threshold the gain applies: m = 0.5 * (100/90 - 1).
        let cwnd = v.congestion_window();
        v.on_ack(now, &ack(2, 90.0, now))?;
        let m: f64 = 0.5 * (10_000.0 / 9_000.0 - 1.0);
        let expected = cwnd + ((1.0 + m).sqrt() - 1.0) + 1.0 / cwnd;
        assert!(close(v.congestion_window(), expected));
        Ok(())
    }

    #[test]
    fn raw_overload() -> Result<()> {
        let mut v = new_vcp_raw(100.0);
        let now = Instant::now();

        // 200% load: m = 0.25 * (0.5 - 1) = -0.125.
        v.on_ack(now, &ack(1, 200.0, now))?;
        let change = (0.875f64.sqrt() - 1.0) + 1.0 / 100.0;
        assert!(change < 0.0);
        assert!(close(v.congestion_window(), 100.0 + change));
        assert_eq!(v.action(), Action::MD);
        assert_eq!(v.stats().cwnd_cuts, 1);

        // No hold-down timer.
        assert_eq!(v.timeout(), None);
        Ok(())
    }

    #[test]
    fn raw_window_floor() -> Result<()> {
        let mut v = new_vcp_raw(1.0);
        let now = Instant::now();

        for i in 0..100 {
            v.on_ack(now, &ack(i, 600.0, now))?;
            assert!(v.congestion_window() >= 1.0);
        }
        Ok(())
    }

    #[test]
    fn raw_increment_shrinks_with_load() -> Result<()> {
        let now = Instant::now();
        let mut last = f64::MAX;
        for lf in [85.0, 90.0, 95.0, 99.0, 100.0, 110.0] {
            let mut v = new_vcp_raw(50.0);
            v.on_ack(now, &ack(1, lf, now))?;
            let inc = v.congestion_window() - 50.0;
            assert!(inc < last);
            last = inc;
        }
        Ok(())
    }

    #[test]
    fn raw_no_hold_down_timers() {
        let mut v = new_vcp_raw(2.0);
        let now = Instant::now();
        assert!(matches!(
            v.on_timer(Timer::HoldDownFirst, now),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(v.on_timeout(now), Ok(false));
    }

    #[test]
    fn raw_reset() -> Result<()> {
        let mut v = new_vcp_raw(2.0);
        let now = Instant::now();
        v.on_ack(now, &ack(1, 50.0, now))?;
        v.reset();
        assert_eq!(v.congestion_window(), 2.0);
        assert_eq!(v.stats().acks, 0);
        v.reset();
        assert_eq!(v.congestion_window(), 2.0);
        Ok(())
    }
}
