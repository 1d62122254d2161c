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

//! Load factor measurement of an output link.
//!
//! Every measurement interval the router computes
//!
//! ```text
//! utilization = 8 * (load + queue_weight * steady_queue) / (capacity * elapsed)
//! load_factor = 100 * utilization / target_utilization
//! ```
//!
//! where `load` is the number of bytes that arrived during the interval and
//! `steady_queue` an EWMA of the queue occupancy sampled every sampling
//! interval. The load factor is then quantized into a 2-bit code, or
//! published as is when encoding is disabled.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::LoadSample;
use crate::packet::maybe_downgrade;
use crate::packet::FeedbackField;
use crate::packet::PacketMeta;
use crate::tables::VcpTables;
use crate::timer::Timer;
use crate::timer::TimerTable;
use crate::Error;
use crate::Result;
use crate::RouterConfig;

/// Lowest supported link capacity in bits per second.
pub const MIN_LINK_CAPACITY: f64 = 1e3;

/// Highest supported link capacity in bits per second.
pub const MAX_LINK_CAPACITY: f64 = 1e12;

/// Weight of the newest value in the steady queue and load factor EWMAs.
const EWMA_GAIN: f64 = 0.25;

/// Load estimator of one output link.
#[derive(Debug)]
pub struct VcpEstimator {
    /// Length of a load measurement interval.
    measurement_interval: Duration,

    /// Interval between two queue samples.
    sampling_interval: Duration,

    /// Weight of the steady queue in the utilization.
    queue_weight: f64,

    /// Publish the 2-bit code, or the raw load factor.
    encode: bool,

    /// Smooth the load factor across intervals.
    smoothing: bool,

    /// Shared lookup tables.
    tables: Arc<VcpTables>,

    /// Target utilization the load factor is computed against.
    dynamic_target: f64,

    /// Adjustment step of the target utilization.
    target_step: f64,

    /// Start of the current measurement interval.
    interval_start: Instant,

    /// Measurement state.
    sample: LoadSample,

    /// Sampling and measurement timers.
    timers: TimerTable,
}

impl VcpEstimator {
    pub fn new(conf: &RouterConfig, tables: Arc<VcpTables>, now: Instant) -> Result<Self> {
        conf.validate()?;
        let capacity = match conf.capacity {
            Some(v) => v,
            None => return Err(Error::InvalidConfig("link capacity unset".into())),
        };

        let mut e = VcpEstimator {
            measurement_interval: conf.measurement_interval,
            sampling_interval: conf.sampling_interval,
            queue_weight: conf.queue_weight,
            encode: conf.encode,
            smoothing: conf.smoothing,
            tables,
            dynamic_target: 0.0,
            target_step: 0.0,
            interval_start: now,
            sample: LoadSample::default(),
            timers: TimerTable::default(),
        };
        e.set_capacity(capacity)?;
        e.reset(now);
        Ok(e)
    }

    pub fn name(&self) -> &'static str {
        "VCP-ROUTER"
    }

    /// Count the bytes of an arriving packet, whether or not the queue
    /// accepts it.
    pub fn on_arrival(&mut self, size: usize) {
        self.sample.load = self.sample.load.saturating_add(size as u64);
    }

    /// Add a queue occupancy sample.
    pub fn sample_queue(&mut self, queue_bytes: usize) {
        self.sample.queue_sum = self.sample.queue_sum.saturating_add(queue_bytes as u64);
        self.sample.queue_samples += 1;
    }

    /// Close the current measurement interval, publish the new feedback and
    /// start the next interval.
    pub fn measure_load(&mut self, now: Instant) -> Result<FeedbackField> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed.is_zero() {
            return Err(Error::InvalidState(format!(
                "{}. zero measurement interval",
                self.name()
            )));
        }

        let name = self.name();
        let s = &mut self.sample;
        let avg_queue = if s.queue_samples > 0 {
            s.queue_sum as f64 / s.queue_samples as f64
        } else {
            0.0
        };
        s.steady_queue += EWMA_GAIN * (avg_queue - s.steady_queue);

        s.utilization = 8.0 * (s.load as f64 + self.queue_weight * s.steady_queue)
            / (s.capacity * elapsed.as_secs_f64());

        let load_factor = 100.0 * s.utilization / self.dynamic_target;
        s.load_factor = if self.smoothing {
            s.load_factor + EWMA_GAIN * (load_factor - s.load_factor)
        } else {
            load_factor
        };

        s.feedback = if self.encode {
            FeedbackField::coded(self.tables.encode(s.load_factor))
        } else {
            FeedbackField::raw(s.load_factor)
        };
        s.intervals += 1;

        trace!(
            "{}. interval {} load {} avg_queue {:.1} elapsed {:?}: {}",
            name,
            s.intervals,
            s.load,
            avg_queue,
            elapsed,
            s
        );

        s.load = 0;
        s.queue_sum = 0;
        s.queue_samples = 0;
        self.interval_start = now;
        self.timers
            .set_after(Timer::LoadMeasurement, now, self.measurement_interval);

        Ok(self.sample.feedback)
    }

    /// Stamp the published feedback on a departing data packet, unless an
    /// upstream router already stamped a more severe one.
    pub fn stamp_packet(&self, packet: PacketMeta) -> PacketMeta {
        if !packet.is_data() {
            return packet;
        }

        let feedback = maybe_downgrade(packet.feedback, self.sample.feedback);
        packet.with_feedback(feedback)
    }

    /// Set the link capacity in bits per second and derive the target
    /// utilization from it.
    pub fn set_capacity(&mut self, capacity: f64) -> Result<()> {
        if !(MIN_LINK_CAPACITY..=MAX_LINK_CAPACITY).contains(&capacity) {
            return Err(Error::InvalidConfig(format!(
                "link capacity {} bps out of range",
                capacity
            )));
        }

        let target = self.tables.target_utilization(capacity);
        self.sample.capacity = capacity;
        self.sample.target_utilization = target.target;
        self.dynamic_target = target.target;
        self.target_step = target.step;

        debug!(
            "{}. capacity {} bps target utilization {:.3}",
            self.name(),
            capacity,
            target.target
        );
        Ok(())
    }

    /// Target utilization the load factor is computed against.
    pub fn dynamic_target(&self) -> f64 {
        self.dynamic_target
    }

    /// Adjustment step of the target utilization.
    pub fn target_step(&self) -> f64 {
        self.target_step
    }

    pub fn timeout(&self) -> Option<Instant> {
        self.timers.next_timeout()
    }

    pub fn timer_deadline(&self, timer: Timer) -> Option<Instant> {
        self.timers.get(timer)
    }

    /// Deliver a timer event. `queue_bytes` is the current queue occupancy.
    pub fn on_timer(&mut self, timer: Timer, now: Instant, queue_bytes: usize) -> Result<()> {
        match timer {
            Timer::QueueSampling => {
                self.sample_queue(queue_bytes);
                self.timers
                    .set_after(Timer::QueueSampling, now, self.sampling_interval);
                Ok(())
            }

            Timer::LoadMeasurement => self.measure_load(now).map(|_| ()),

            _ => Err(Error::InvalidState(format!(
                "{:?} is not used by {}",
                timer,
                self.name()
            ))),
        }
    }

    /// Process every timer expired at `now`.
    pub fn on_timeout(&mut self, now: Instant, queue_bytes: usize) -> Result<()> {
        for timer in [Timer::QueueSampling, Timer::LoadMeasurement] {
            if self.timers.is_expired(timer, now) {
                self.on_timer(timer, now, queue_bytes)?;
            }
        }
        Ok(())
    }

    pub fn sample(&self) -> &LoadSample {
        &self.sample
    }

    /// Return every counter to its initial value and restart the timers.
    pub fn reset(&mut self, now: Instant) {
        self.sample = LoadSample {
            capacity: self.sample.capacity,
            target_utilization: self.sample.target_utilization,
            feedback: if self.encode {
                FeedbackField::INITIAL
            } else {
                FeedbackField::from_value(0)
            },
            ..LoadSample::default()
        };
        self.dynamic_target = self.sample.target_utilization;
        self.interval_start = now;

        self.timers.stop_all();
        self.timers
            .set_after(Timer::QueueSampling, now, self.sampling_interval);
        self.timers
            .set_after(Timer::LoadMeasurement, now, self.measurement_interval);
    }

    /// Cancel every timer.
    pub fn close(&mut self) {
        self.timers.stop_all();
    }
}
