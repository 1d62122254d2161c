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

//! Router side: measuring the link load and stamping it on packets.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::packet::FeedbackField;
use crate::packet::PacketMeta;
use crate::timer::Timer;
use crate::Result;
pub use estimator::VcpEstimator;
pub use estimator::MAX_LINK_CAPACITY;
pub use estimator::MIN_LINK_CAPACITY;
pub use vcp_queue::VcpQueue;

/// The packet queue of an output link.
pub trait LinkQueue {
    /// Add a packet to the queue. Return false if the packet was dropped.
    fn enqueue(&mut self, packet: PacketMeta) -> bool;

    /// Remove the packet at the head of the queue.
    fn dequeue(&mut self) -> Option<PacketMeta>;

    /// Number of bytes in the queue.
    fn byte_length(&self) -> usize;

    /// Number of packets in the queue.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Router-side load measurement.
pub trait LoadEstimator {
    /// Count an arriving packet in the current measurement interval.
    fn on_arrival(&mut self, packet: &PacketMeta);

    /// Add the current queue occupancy to the running sum.
    fn sample_queue(&mut self);

    /// Close the current measurement interval and publish a new feedback.
    fn measure_load(&mut self, now: Instant) -> Result<FeedbackField>;

    /// Stamp the published feedback on a departing packet.
    fn stamp_packet(&self, packet: PacketMeta) -> PacketMeta;

    /// Set the link capacity in bits per second.
    fn set_capacity(&mut self, capacity: f64) -> Result<()>;

    /// Earliest deadline of the armed timers.
    fn timeout(&self) -> Option<Instant>;

    /// Deadline of the given timer if it is armed.
    fn timer_deadline(&self, timer: Timer) -> Option<Instant>;

    /// Deliver a timer event.
    fn on_timer(&mut self, timer: Timer, now: Instant) -> Result<()>;

    /// Process every timer expired at `now`.
    fn on_timeout(&mut self, now: Instant) -> Result<()>;

    /// State of the current measurement.
    fn sample(&self) -> &LoadSample;

    /// Return every counter to its initial value and restart the timers.
    fn reset(&mut self, now: Instant);

    /// Cancel every timer.
    fn close(&mut self);
}

/// Load measurement state of a router.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadSample {
    /// Bytes arrived in the current interval.
    pub load: u64,

    /// Sum of the queue samples in the current interval.
    pub queue_sum: u64,

    /// Number of queue samples in the current interval.
    pub queue_samples: u64,

    /// EWMA of the average queue occupancy in bytes.
    pub steady_queue: f64,

    /// Utilization measured over the last interval.
    pub utilization: f64,

    /// Load factor in percent measured over the last interval.
    pub load_factor: f64,

    /// Published feedback.
    pub feedback: FeedbackField,

    /// Link capacity in bits per second.
    pub capacity: f64,

    /// Target utilization of the link.
    pub target_utilization: f64,

    /// Number of completed measurement intervals.
    pub intervals: u64,
}

impl LoadSample {
    /// Dump the sample as JSON.
    pub fn dump(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for LoadSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "util={:.4} lf={:.2} feedback={:?} steady_queue={:.1}",
            self.utilization, self.load_factor, self.feedback, self.steady_queue
        )
    }
}

mod estimator;
mod vcp_queue;
