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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumIter;

use crate::flow::rtt::RttEstimator;
use crate::packet::PacketMeta;
use crate::tables::VcpTables;
use crate::timer::Timer;
use crate::Error;
use crate::Result;
use crate::SenderConfig;
pub use pacing::Pacer;
pub use scaling::RttScaling;
pub use vcp::Vcp;
pub use vcp::DEFAULT_ALPHA;
pub use vcp::DEFAULT_BETA;
pub use vcp::DEFAULT_INITIAL_WINDOW;
pub use vcp::DEFAULT_K;
pub use vcp::DEFAULT_W;
pub use vcp::VcpConfig;
pub use vcp_raw::VcpRaw;

/// Available control laws.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum ControlLaw {
    /// Routers publish a 2-bit load code and senders pick one of MI, AI and
    /// MD for every acknowledgment, with hold-down timers after a decrease.
    #[default]
    Coded,

    /// Routers publish the raw load factor and senders apply a combined
    /// multiplicative and additive adjustment without hold-down timers.
    Raw,
}

impl FromStr for ControlLaw {
    type Err = Error;

    fn from_str(law: &str) -> Result<ControlLaw> {
        if law.eq_ignore_ascii_case("coded") {
            Ok(ControlLaw::Coded)
        } else if law.eq_ignore_ascii_case("raw") {
            Ok(ControlLaw::Raw)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// The control law applied on the latest acknowledgment.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Display, EnumIter, Serialize)]
pub enum Action {
    /// Multiplicative increase.
    #[default]
    MI,

    /// Additive increase.
    AI,

    /// Multiplicative decrease.
    MD,

    /// Freeze, the window is left unchanged.
    FRZ,
}

/// Hold-down phase following a multiplicative decrease.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Display, EnumIter, Serialize)]
pub enum HoldDownPhase {
    /// No hold-down in progress.
    #[default]
    None,

    /// Freeze for about one router measurement interval.
    First,

    /// Additive increase only for about one RTT.
    Second,
}

/// Rate control statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RateControlStats {
    /// Number of new acknowledgments processed.
    pub acks: u64,

    /// Number of acknowledgments per action.
    pub mi_count: u64,
    pub ai_count: u64,
    pub md_count: u64,
    pub frz_count: u64,

    /// Number of window cuts.
    pub cwnd_cuts: u64,

    /// Number of hold-down timer expirations.
    pub hold_down_timeouts: u64,

    /// Number of packets released by the pacing timer.
    pub paced_packets: u64,
}

impl RateControlStats {
    pub(crate) fn on_action(&mut self, action: Action) {
        self.acks += 1;
        match action {
            Action::MI => self.mi_count += 1,
            Action::AI => self.ai_count += 1,
            Action::MD => self.md_count += 1,
            Action::FRZ => self.frz_count += 1,
        }
    }
}

/// Rate control interfaces shared by the control laws.
pub trait RateController {
    /// Name of the control law.
    fn name(&self) -> &str;

    /// Callback after a data packet was sent out. `paced` is true for the
    /// packets released by the pacing timer.
    fn on_sent(&mut self, now: Instant, packet: &PacketMeta, paced: bool) {}

    /// Check that an acknowledgment can be processed, without changing any
    /// state.
    fn check_ack(&self, ack: &PacketMeta) -> Result<()> {
        if ack.is_data() {
            return Err(Error::InvalidPacket);
        }
        Ok(())
    }

    /// Callback for processing a new acknowledgment.
    fn on_ack(&mut self, now: Instant, ack: &PacketMeta) -> Result<()>;

    /// Callback after the RTT estimation was updated.
    fn on_rtt_update(&mut self, rtt: &RttEstimator);

    /// Earliest deadline of the armed timers.
    fn timeout(&self) -> Option<Instant>;

    /// Deadline of the given timer if it is armed.
    fn timer_deadline(&self, timer: Timer) -> Option<Instant>;

    /// Deliver a timer event. Return true if a paced packet may be released.
    fn on_timer(&mut self, timer: Timer, now: Instant) -> Result<bool>;

    /// Process every timer expired at `now`. Return true if a paced packet
    /// may be released.
    fn on_timeout(&mut self, now: Instant) -> Result<bool>;

    /// Interval between paced packets at the current window, or None if the
    /// window should be sent as a burst.
    fn pacing_interval(&self) -> Option<Duration>;

    /// Arm the pacing timer.
    fn schedule_pacing(&mut self, now: Instant) -> Option<Instant>;

    /// Current congestion window in packets.
    fn congestion_window(&self) -> f64;

    /// Initial congestion window in packets.
    fn initial_window(&self) -> f64;

    /// Action taken on the latest acknowledgment.
    fn action(&self) -> Action;

    /// Current hold-down phase.
    fn hold_down_phase(&self) -> HoldDownPhase {
        HoldDownPhase::None
    }

    /// Rate control stats.
    fn stats(&self) -> &RateControlStats;

    /// Return to the initial state.
    fn reset(&mut self);

    /// Cancel every timer.
    fn close(&mut self);
}

impl fmt::Debug for dyn RateController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate controller {}.", self.name())
    }
}

/// Build a rate controller.
pub fn build_rate_controller(
    conf: &SenderConfig,
    tables: Arc<VcpTables>,
) -> Result<Box<dyn RateController>> {
    conf.validate()?;

    let vcp_conf = VcpConfig::from_sender_config(conf);
    match conf.control_law {
        ControlLaw::Coded => Ok(Box::new(Vcp::new(vcp_conf, tables))),
        ControlLaw::Raw => Ok(Box::new(VcpRaw::new(vcp_conf, tables))),
    }
}

/// Round a timer value to a multiple of the granularity.
///
/// The value is first rounded to the nearest millisecond. With `round_up`,
/// one granule is added when the value is below the granularity or when the
/// remainder reaches a fifth of the granularity.
pub fn round_timeout(tv: Duration, granularity: Duration, round_up: bool) -> Duration {
    let tv_ms = (tv.as_secs_f64() * 1000.0).round() as u64;
    let g_ms = granularity.as_millis().max(1) as u64;
    let r_ms = (g_ms as f64 * 0.2) as u64;

    let up = if !round_up {
        0
    } else if tv_ms < g_ms {
        1
    } else if tv_ms % g_ms < r_ms {
        0
    } else {
        1
    };

    Duration::from_millis((tv_ms / g_ms + up) * g_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_law_name() {
        let cases = [
            ("coded", Ok(ControlLaw::Coded)),
            ("Coded", Ok(ControlLaw::Coded)),
            ("CODED", Ok(ControlLaw::Coded)),
            ("raw", Ok(ControlLaw::Raw)),
            ("Raw", Ok(ControlLaw::Raw)),
            ("RAW", Ok(ControlLaw::Raw)),
            ("codde", Err(Error::InvalidConfig("unknown".into()))),
            ("", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, law) in cases {
            assert_eq!(ControlLaw::from_str(name), law);
        }
    }

    #[test]
    fn round_timeout_value() {
        let g = Duration::from_millis(10);
        let ms = Duration::from_millis;

        // Round down.
        assert_eq!(round_timeout(ms(200), g, false), ms(200));
        assert_eq!(round_timeout(ms(109), g, false), ms(100));
        assert_eq!(round_timeout(ms(7), g, false), ms(0));
        assert_eq!(round_timeout(Duration::from_micros(9_600), g, false), ms(10));

        // Round up.
        assert_eq!(round_timeout(ms(200), g, true), ms(200));
        assert_eq!(round_timeout(ms(201), g, true), ms(200));
        assert_eq!(round_timeout(ms(202), g, true), ms(210));
        assert_eq!(round_timeout(ms(7), g, true), ms(10));
        assert_eq!(round_timeout(ms(0), g, true), ms(10));
        assert_eq!(round_timeout(ms(157), g, true), ms(160));
    }

    #[test]
    fn build() -> Result<()> {
        let tables = VcpTables::shared();

        let mut conf = SenderConfig::default();
        let cc = build_rate_controller(&conf, tables.clone())?;
        assert_eq!(cc.name(), "VCP");
        assert_eq!(cc.congestion_window(), 2.0);
        assert_eq!(cc.action(), Action::MI);
        assert_eq!(cc.hold_down_phase(), HoldDownPhase::None);
        assert_eq!(format!("{:?}", cc), "rate controller VCP.");

        conf.set_control_law(ControlLaw::Raw);
        let cc = build_rate_controller(&conf, tables.clone())?;
        assert_eq!(cc.name(), "VCP-RAW");

        conf.set_router_measurement_interval(Duration::ZERO);
        assert!(build_rate_controller(&conf, tables).is_err());
        Ok(())
    }
}

mod pacing;
mod scaling;
mod vcp;
mod vcp_raw;
