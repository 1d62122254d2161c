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

//! An implementation of VCP, the Variable-structure congestion Control
//! Protocol.
//!
//! VCP is a closed-loop congestion control scheme with explicit feedback
//! from routers:
//!
//! * **Routers** measure the utilization and queue occupancy of their output
//!   links and compress them into a load factor. Every data packet leaving
//!   the link carries the most severe load factor seen along its path, as a
//!   2-bit code or as a raw value. See [`VcpQueue`].
//! * **Receivers** echo the load factor of each data packet back to the
//!   sender in its acknowledgment. See [`VcpSink`].
//! * **Senders** pick a control law per acknowledgment: multiplicative
//!   increase under low load, additive increase near the target
//!   utilization, multiplicative decrease on overload, followed by a
//!   hold-down period. See [`SenderFlow`] and [`RateController`].
//!
//! The crate does not forward packets itself. Routers are layered over any
//! [`LinkQueue`] and all components are driven by the caller through explicit
//! timestamps and timer callbacks, which [`TimerQueue`] can schedule.
//!
//! ## Get started
//!
//! See the `vcp_sim` tool in the `tools` directory for a single bottleneck
//! simulation built from the library's roles.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::cmp;
use std::time::Duration;

use crate::router::MAX_LINK_CAPACITY;
use crate::router::MIN_LINK_CAPACITY;

/// Granularity of the hold-down and pacing timers.
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(10);

/// Reference RTT of the control laws, also used before the first RTT sample.
pub const TYPICAL_RTT: Duration = Duration::from_millis(100);

/// Default router load measurement interval.
pub const DEFAULT_MEASUREMENT_INTERVAL: Duration = Duration::from_millis(200);

/// Default router queue sampling interval.
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(10);

/// Default weight of the steady queue in the utilization.
pub const DEFAULT_QUEUE_WEIGHT: f64 = 0.5;

/// Default data packet size in bytes.
pub const DEFAULT_PACKET_SIZE: usize = 1000;

/// A specialized [`Result`] type for vcp operations.
///
/// This type is used throughout the public API for any operation that
/// can produce an error.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Configurations of a router output link.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Length of a load measurement interval.
    pub measurement_interval: Duration,

    /// Interval between two queue occupancy samples.
    pub sampling_interval: Duration,

    /// Weight of the steady queue in the utilization.
    pub queue_weight: f64,

    /// Link capacity in bits per second. Must be set.
    pub capacity: Option<f64>,

    /// Publish the 2-bit load code. If false, the raw load factor is
    /// published instead.
    pub encode: bool,

    /// Smooth the load factor across measurement intervals.
    pub smoothing: bool,
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the load measurement interval.
    /// The default value is 200 milliseconds.
    pub fn set_measurement_interval(&mut self, v: Duration) {
        self.measurement_interval = v;
    }

    /// Set the queue sampling interval.
    /// The default value is 10 milliseconds.
    pub fn set_sampling_interval(&mut self, v: Duration) {
        self.sampling_interval = v;
    }

    /// Set the weight of the steady queue, clamped to [0, 1].
    /// The default value is 0.5.
    pub fn set_queue_weight(&mut self, v: f64) {
        self.queue_weight = v.clamp(0.0, 1.0);
    }

    /// Set the link capacity in bits per second.
    pub fn set_capacity(&mut self, bps: f64) {
        self.capacity = Some(bps);
    }

    /// Publish the 2-bit load code or the raw load factor.
    /// The default value is true.
    pub fn enable_encode(&mut self, v: bool) {
        self.encode = v;
    }

    /// Smooth the load factor across measurement intervals.
    /// The default value is false.
    pub fn enable_smoothing(&mut self, v: bool) {
        self.smoothing = v;
    }

    /// Check the configuration before the control loop starts.
    pub fn validate(&self) -> Result<()> {
        if self.measurement_interval.is_zero() {
            return Err(Error::InvalidConfig("zero measurement interval".into()));
        }
        if self.sampling_interval.is_zero() {
            return Err(Error::InvalidConfig("zero sampling interval".into()));
        }
        if !self.queue_weight.is_finite() || self.queue_weight < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "queue weight {}",
                self.queue_weight
            )));
        }

        match self.capacity {
            None => Err(Error::InvalidConfig("link capacity unset".into())),
            Some(c) if !(MIN_LINK_CAPACITY..=MAX_LINK_CAPACITY).contains(&c) => Err(
                Error::InvalidConfig(format!("link capacity {} bps out of range", c)),
            ),
            Some(_) => Ok(()),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> RouterConfig {
        RouterConfig {
            measurement_interval: DEFAULT_MEASUREMENT_INTERVAL,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            queue_weight: DEFAULT_QUEUE_WEIGHT,
            capacity: None,
            encode: true,
            smoothing: false,
        }
    }
}

/// Configurations of a sender.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Load measurement interval of the routers on the path.
    pub router_measurement_interval: Duration,

    /// Control law, matching whether the routers encode the load factor.
    pub control_law: ControlLaw,

    /// MI gain.
    pub k: f64,

    /// AI gain.
    pub alpha: f64,

    /// MD factor.
    pub beta: f64,

    /// Flow weight.
    pub w: f64,

    /// Initial congestion window in packets.
    pub initial_window: f64,

    /// Upper bound of the congestion window in packets.
    pub max_window: Option<f64>,

    /// Pace small windows on long paths.
    pub pacing: bool,

    /// Bound the AI increment by the window-indexed limiter table.
    pub ai_limiter: bool,

    /// Data packet size in bytes.
    pub packet_size: usize,
}

impl SenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the load measurement interval of the routers on the path.
    /// The default value is 200 milliseconds.
    pub fn set_router_measurement_interval(&mut self, v: Duration) {
        self.router_measurement_interval = v;
    }

    /// Set the control law.
    /// The default value is `ControlLaw::Coded`.
    pub fn set_control_law(&mut self, v: ControlLaw) {
        self.control_law = v;
    }

    /// Set the MI gain. The default value is 0.25.
    pub fn set_k(&mut self, v: f64) {
        self.k = v;
    }

    /// Set the AI gain. The default value is 1.0.
    pub fn set_alpha(&mut self, v: f64) {
        self.alpha = v;
    }

    /// Set the MD factor. The default value is 0.875.
    pub fn set_beta(&mut self, v: f64) {
        self.beta = v;
    }

    /// Set the flow weight. The default value is 1.0.
    pub fn set_weight(&mut self, v: f64) {
        self.w = v;
    }

    /// Set the initial congestion window in packets, at least one.
    /// The default value is 2.
    pub fn set_initial_window(&mut self, packets: f64) {
        self.initial_window = packets.max(1.0);
    }

    /// Set the upper bound of the congestion window in packets.
    /// The default value is None.
    pub fn set_max_window(&mut self, packets: Option<f64>) {
        self.max_window = packets;
    }

    /// Enable pacing of small windows on long paths.
    /// The default value is true.
    pub fn enable_pacing(&mut self, v: bool) {
        self.pacing = v;
    }

    /// Enable the AI limiter table.
    /// The default value is false.
    pub fn enable_ai_limiter(&mut self, v: bool) {
        self.ai_limiter = v;
    }

    /// Set the data packet size in bytes, at least one.
    /// The default value is 1000.
    pub fn set_packet_size(&mut self, v: usize) {
        self.packet_size = cmp::max(v, 1);
    }

    /// Check the configuration before the control loop starts.
    pub fn validate(&self) -> Result<()> {
        if self.router_measurement_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "zero router measurement interval".into(),
            ));
        }
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return Err(Error::InvalidConfig(format!("beta {}", self.beta)));
        }
        for (name, v) in [("k", self.k), ("alpha", self.alpha), ("w", self.w)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::InvalidConfig(format!("{} {}", name, v)));
            }
        }
        if !(self.initial_window >= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "initial window {}",
                self.initial_window
            )));
        }
        if let Some(max) = self.max_window {
            if !(max >= self.initial_window) {
                return Err(Error::InvalidConfig(format!("max window {}", max)));
            }
        }
        Ok(())
    }
}

impl Default for SenderConfig {
    fn default() -> SenderConfig {
        SenderConfig {
            router_measurement_interval: DEFAULT_MEASUREMENT_INTERVAL,
            control_law: ControlLaw::Coded,
            k: congestion_control::DEFAULT_K,
            alpha: congestion_control::DEFAULT_ALPHA,
            beta: congestion_control::DEFAULT_BETA,
            w: congestion_control::DEFAULT_W,
            initial_window: congestion_control::DEFAULT_INITIAL_WINDOW,
            max_window: None,
            pacing: true,
            ai_limiter: false,
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }
}


pub use crate::congestion_control::build_rate_controller;
pub use crate::congestion_control::Action;
pub use crate::congestion_control::ControlLaw;
pub use crate::congestion_control::HoldDownPhase;
pub use crate::congestion_control::RateControlStats;
pub use crate::congestion_control::RateController;
pub use crate::error::Error;
pub use crate::flow::rtt::RttEstimator;
pub use crate::flow::SenderFlow;
pub use crate::packet::FeedbackField;
pub use crate::packet::LoadCode;
pub use crate::packet::PacketKind;
pub use crate::packet::PacketMeta;
pub use crate::receiver::Acker;
pub use crate::receiver::AckGenerator;
pub use crate::receiver::FeedbackEcho;
pub use crate::receiver::VcpSink;
pub use crate::router::LinkQueue;
pub use crate::router::LoadEstimator;
pub use crate::router::LoadSample;
pub use crate::router::VcpQueue;
pub use crate::tables::VcpTables;
pub use crate::timer::Timer;
pub use crate::timer_queue::TimerKey;
pub use crate::timer_queue::TimerQueue;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

#[path = "flow/flow.rs"]
pub mod flow;

#[path = "router/router.rs"]
pub mod router;

#[path = "receiver/receiver.rs"]
pub mod receiver;

pub mod error;
pub mod packet;
pub mod tables;
pub mod timer;
pub mod timer_queue;
