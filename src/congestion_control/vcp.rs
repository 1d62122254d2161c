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

//! VCP: Variable-structure congestion Control Protocol.
//!
//! Routers classify their load into three regions and stamp the most severe
//! one on every data packet. The sender picks a control law from the echoed
//! region: multiplicative increase while the path is lightly loaded,
//! additive increase near the target utilization and multiplicative
//! decrease on overload. After a decrease, the sender freezes for one router
//! measurement interval, so that the next feedback reflects the smaller
//! window, and only increases additively for one more RTT.
//!
//! See <https://doi.org/10.1145/1090191.1080103>.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::round_timeout;
use super::Action;
use super::HoldDownPhase;
use super::Pacer;
use super::RateControlStats;
use super::RateController;
use super::RttScaling;
use crate::flow::rtt::RttEstimator;
use crate::packet::LoadCode;
use crate::packet::PacketMeta;
use crate::tables::VcpTables;
use crate::timer::Timer;
use crate::timer::TimerTable;
use crate::Error;
use crate::Result;
use crate::SenderConfig;
use crate::TIMER_GRANULARITY;

/// Default MI gain applied to the distance between the load factor and 100%.
pub const DEFAULT_K: f64 = 0.25;

/// Default AI gain.
pub const DEFAULT_ALPHA: f64 = 1.0;

/// Default MD factor.
pub const DEFAULT_BETA: f64 = 0.875;

/// Default flow weight.
pub const DEFAULT_W: f64 = 1.0;

/// Default initial window in packets.
pub const DEFAULT_INITIAL_WINDOW: f64 = 2.0;

/// Minimal window in packets.
const MINIMAL_WINDOW: f64 = 1.0;

/// VCP configurable parameters.
#[derive(Debug, Clone)]
pub struct VcpConfig {
    /// Router load measurement interval.
    pub(super) t_rho: Duration,

    /// MI gain.
    pub(super) k: f64,

    /// AI gain.
    pub(super) alpha: f64,

    /// MD factor.
    pub(super) beta: f64,

    /// Flow weight.
    pub(super) w: f64,

    /// Initial window in packets.
    pub(super) initial_cwnd: f64,

    /// Upper bound of the window in packets.
    pub(super) max_cwnd: Option<f64>,

    /// Enable pacing for large RTTs.
    pub(super) pacing: bool,

    /// Bound the AI increment by the window-indexed limiter table.
    pub(super) ai_limiter: bool,
}

impl VcpConfig {
    pub fn new(t_rho: Duration, initial_cwnd: f64, max_cwnd: Option<f64>) -> Self {
        Self {
            t_rho,
            initial_cwnd,
            max_cwnd,
            ..Self::default()
        }
    }

    pub fn from_sender_config(conf: &SenderConfig) -> Self {
        Self {
            t_rho: conf.router_measurement_interval,
            k: conf.k,
            alpha: conf.alpha,
            beta: conf.beta,
            w: conf.w,
            initial_cwnd: conf.initial_window,
            max_cwnd: conf.max_window,
            pacing: conf.pacing,
            ai_limiter: conf.ai_limiter,
        }
    }
}

impl Default for VcpConfig {
    fn default() -> Self {
        Self {
            t_rho: crate::DEFAULT_MEASUREMENT_INTERVAL,
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            w: DEFAULT_W,
            initial_cwnd: DEFAULT_INITIAL_WINDOW,
            max_cwnd: None,
            pacing: true,
            ai_limiter: false,
        }
    }
}

/// VCP rate controller driven by the 2-bit load code.
#[derive(Debug)]
pub struct Vcp {
    /// Config
    config: VcpConfig,

    /// Shared lookup tables.
    tables: Arc<VcpTables>,

    /// Statistics.
    stats: RateControlStats,

    /// Congestion window in packets.
    cwnd: f64,

    /// Action taken on the latest acknowledgment.
    action: Action,

    /// Hold-down phase.
    phase: HoldDownPhase,

    /// MI parameter derived from the low load threshold.
    xi_by_lf: f64,

    /// Cached RTT scaling terms.
    scaling: RttScaling,

    /// Pacer.
    pacer: Pacer,

    /// Hold-down and pacing timers.
    timers: TimerTable,
}

impl Vcp {
    pub fn new(config: VcpConfig, tables: Arc<VcpTables>) -> Self {
        let xi_by_lf = config.k * (100.0 / tables.low_threshold() as f64 - 1.0);

        Self {
            cwnd: config.initial_cwnd,
            action: Action::MI,
            phase: HoldDownPhase::None,
            xi_by_lf,
            scaling: RttScaling::new(config.t_rho),
            pacer: Pacer::new(config.pacing, config.t_rho),
            timers: TimerTable::default(),
            stats: Default::default(),
            config,
            tables,
        }
    }

    /// Select the action for a load code and advance the hold-down phase.
    fn select_action(&mut self, code: LoadCode, now: Instant) -> Action {
        match code {
            LoadCode::Low => Action::MI,
            LoadCode::High => Action::AI,
            LoadCode::Over => match self.phase {
                HoldDownPhase::None => {
                    // First congestion signal: decrease, then freeze until the
                    // routers measured the smaller window.
                    self.phase = HoldDownPhase::First;
                    let interval = round_timeout(self.config.t_rho, TIMER_GRANULARITY, true);
                    self.timers.set_after(Timer::HoldDownFirst, now, interval);
                    Action::MD
                }
                HoldDownPhase::First => Action::FRZ,
                HoldDownPhase::Second => Action::AI,
            },
        }
    }

    fn ai_increment(&self) -> f64 {
        let inc = self.scaling.ai_scale() * self.config.alpha * self.config.w / self.cwnd;
        if self.config.ai_limiter {
            return inc.min(self.tables.ai_limiter(self.cwnd));
        }
        inc
    }

    fn mi_increment(&self) -> f64 {
        let xi = self.xi_by_lf.min(self.tables.mi_param(self.cwnd));
        (1.0 + xi).powf(self.scaling.rtt_by_trho()) - 1.0
    }

    fn decrease(&mut self) {
        self.stats.cwnd_cuts += 1;
        self.cwnd = (self.cwnd * self.config.beta).max(MINIMAL_WINDOW);
    }

    fn increase(&mut self, inc: f64) {
        self.cwnd += inc;
        if let Some(max_cwnd) = self.config.max_cwnd {
            self.cwnd = self.cwnd.min(max_cwnd);
        }
    }
}

impl RateController for Vcp {
    fn name(&self) -> &str {
        "VCP"
    }

    fn on_sent(&mut self, now: Instant, packet: &PacketMeta, paced: bool) {
        if paced {
            self.stats.paced_packets += 1;
        }
    }

    fn check_ack(&self, ack: &PacketMeta) -> Result<()> {
        if ack.is_data() {
            return Err(Error::InvalidPacket);
        }
        ack.feedback.code().map(|_| ())
    }

    fn on_ack(&mut self, now: Instant, ack: &PacketMeta) -> Result<()> {
        self.check_ack(ack)?;

        let code = ack.feedback.code()?;
        self.action = self.select_action(code, now);
        match self.action {
            Action::MD => self.decrease(),
            Action::AI => self.increase(self.ai_increment()),
            Action::MI => self.increase(self.mi_increment()),
            Action::FRZ => (),
        }
        self.stats.on_action(self.action);

        trace!(
            "{}. ack {} code {:?} phase {} action {} cwnd {:.3}",
            self.name(),
            ack.seq,
            code,
            self.phase,
            self.action,
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

        match (timer, self.phase) {
            (Timer::HoldDownFirst, HoldDownPhase::First) => {
                self.stats.hold_down_timeouts += 1;
                self.phase = HoldDownPhase::Second;
                let interval = round_timeout(self.scaling.rtt(), TIMER_GRANULARITY, true);
                self.timers.set_after(Timer::HoldDownSecond, now, interval);
                debug!("{}. hold-down second phase for {:?}", self.name(), interval);
                Ok(false)
            }

            (Timer::HoldDownSecond, HoldDownPhase::Second) => {
                self.stats.hold_down_timeouts += 1;
                self.phase = HoldDownPhase::None;
                debug!("{}. hold-down over, cwnd {:.3}", self.name(), self.cwnd);
                Ok(false)
            }

            (Timer::Pacing, _) => Ok(true),

            (timer, phase) => Err(Error::InvalidState(format!(
                "{:?} expired in phase {}",
                timer, phase
            ))),
        }
    }

    fn on_timeout(&mut self, now: Instant) -> Result<bool> {
        let mut release = false;
        for timer in [Timer::HoldDownFirst, Timer::HoldDownSecond, Timer::Pacing] {
            if self.timers.is_expired(timer, now) {
                release |= self.on_timer(timer, now)?;
            }
        }
        Ok(release)
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

    fn hold_down_phase(&self) -> HoldDownPhase {
        self.phase
    }

    fn stats(&self) -> &RateControlStats {
        &self.stats
    }

    fn reset(&mut self) {
        self.cwnd = self.config.initial_cwnd;
        self.action = Action::MI;
        self.phase = HoldDownPhase::None;
        self.stats = Default::default();
        self.scaling.reset();
        self.timers.stop_all();
    }

    fn close(&mut self) {
        self.timers.stop_all();
    }
}
