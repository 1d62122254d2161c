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

use std::sync::Arc;
use std::time::Instant;

use super::LinkQueue;
use super::LoadEstimator;
use super::LoadSample;
use super::VcpEstimator;
use crate::packet::FeedbackField;
use crate::packet::PacketMeta;
use crate::tables::VcpTables;
use crate::timer::Timer;
use crate::Result;
use crate::RouterConfig;

/// An output queue measuring its own load.
///
/// Arrivals are counted before they are handed to the underlying queue, so
/// packets it drops still count as offered load. Departing data packets are
/// stamped with the published feedback.
#[derive(Debug)]
pub struct VcpQueue<Q: LinkQueue> {
    /// The underlying queue.
    queue: Q,

    /// Load estimator of the link.
    estimator: VcpEstimator,
}

impl<Q: LinkQueue> VcpQueue<Q> {
    pub fn new(queue: Q, conf: &RouterConfig, tables: Arc<VcpTables>, now: Instant) -> Result<Self> {
        Ok(VcpQueue {
            queue,
            estimator: VcpEstimator::new(conf, tables, now)?,
        })
    }

    /// Return the underlying queue.
    pub fn inner(&self) -> &Q {
        &self.queue
    }

    /// Return the load estimator.
    pub fn estimator(&self) -> &VcpEstimator {
        &self.estimator
    }
}

impl<Q: LinkQueue> LinkQueue for VcpQueue<Q> {
    fn enqueue(&mut self, packet: PacketMeta) -> bool {
        self.estimator.on_arrival(packet.size);
        self.queue.enqueue(packet)
    }

    fn dequeue(&mut self) -> Option<PacketMeta> {
        let packet = self.queue.dequeue()?;
        Some(self.estimator.stamp_packet(packet))
    }

    fn byte_length(&self) -> usize {
        self.queue.byte_length()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<Q: LinkQueue> LoadEstimator for VcpQueue<Q> {
    fn on_arrival(&mut self, packet: &PacketMeta) {
        self.estimator.on_arrival(packet.size);
    }

    fn sample_queue(&mut self) {
        self.estimator.sample_queue(self.queue.byte_length());
    }

    fn measure_load(&mut self, now: Instant) -> Result<FeedbackField> {
        self.estimator.measure_load(now)
    }

    fn stamp_packet(&self, packet: PacketMeta) -> PacketMeta {
        self.estimator.stamp_packet(packet)
    }

    fn set_capacity(&mut self, capacity: f64) -> Result<()> {
        self.estimator.set_capacity(capacity)
    }

    fn timeout(&self) -> Option<Instant> {
        self.estimator.timeout()
    }

    fn timer_deadline(&self, timer: Timer) -> Option<Instant> {
        self.estimator.timer_deadline(timer)
    }

    fn on_timer(&mut self, timer: Timer, now: Instant) -> Result<()> {
        let queue_bytes = self.queue.byte_length();
        self.estimator.on_timer(timer, now, queue_bytes)
    }

    fn on_timeout(&mut self, now: Instant) -> Result<()> {
        let queue_bytes = self.queue.byte_length();
        self.estimator.on_timeout(now, queue_bytes)
    }

    fn sample(&self) -> &LoadSample {
        self.estimator.sample()
    }

    fn reset(&mut self, now: Instant) {
        self.estimator.reset(now)
    }

    fn close(&mut self) {
        self.estimator.close()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::packet::LoadCode;

    /// Drop-tail queue bounded in bytes.
    #[derive(Debug, Default)]
    struct Fifo {
        packets: VecDeque<PacketMeta>,
        bytes: usize,
        limit: usize,
    }

    impl LinkQueue for Fifo {
        fn enqueue(&mut self, packet: PacketMeta) -> bool {
            if self.bytes + packet.size > self.limit {
                return false;
            }
            self.bytes += packet.size;
            self.packets.push_back(packet);
            true
        }

        fn dequeue(&mut self) -> Option<PacketMeta> {
            let packet = self.packets.pop_front()?;
            self.bytes -= packet.size;
            Some(packet)
        }

        fn byte_length(&self) -> usize {
            self.bytes
        }

        fn len(&self) -> usize {
            self.packets.len()
        }
    }

    fn new_queue(limit: usize, now: Instant) -> VcpQueue<Fifo> {
        let mut conf = RouterConfig::default();
        conf.set_capacity(1e7);
        let fifo = Fifo {
            limit,
            ..Fifo::default()
        };
        VcpQueue::new(fifo, &conf, VcpTables::shared(), now).unwrap()
    }

    #[test]
    fn dropped_packets_count_as_load() {
        let now = Instant::now();
        let mut q = new_queue(2_000, now);

        assert!(q.enqueue(PacketMeta::data(1, 0, 1_000, now)));
        assert!(q.enqueue(PacketMeta::data(1, 1, 1_000, now)));
        assert!(!q.enqueue(PacketMeta::data(1, 2, 1_000, now)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.byte_length(), 2_000);
        assert_eq!(q.sample().load, 3_000);
    }

    #[test]
    fn departures_are_stamped() -> Result<()> {
        let now = Instant::now();
        let mut q = new_queue(1_000_000, now);

        for seq in 0..240 {
            q.enqueue(PacketMeta::data(1, seq, 1_000, now));
        }
        q.enqueue(PacketMeta::ack(2, 0, 40, now, now));

        // Departures before the first measurement carry the initial code.
        let p = q.dequeue().unwrap();
        assert_eq!(p.feedback.code(), Ok(LoadCode::Low));

        q.measure_load(now + Duration::from_millis(200))?;
        assert_eq!(q.sample().feedback.code(), Ok(LoadCode::Over));
        assert!(!q.is_empty());

        let p = q.dequeue().unwrap();
        assert_eq!(p.feedback.code(), Ok(LoadCode::Over));

        while let Some(p) = q.dequeue() {
            if p.is_data() {
                assert_eq!(p.feedback.code(), Ok(LoadCode::Over));
            } else {
                assert_eq!(p.feedback, FeedbackField::INITIAL);
            }
        }
        assert!(q.is_empty());
        Ok(())
    }

    #[test]
    fn queue_sampling_timer() -> Result<()> {
        let now = Instant::now();
        let mut q = new_queue(1_000_000, now);
        q.enqueue(PacketMeta::data(1, 0, 1_500, now));

        let t = now + Duration::from_millis(10);
        assert_eq!(q.timeout(), Some(t));
        q.on_timeout(t)?;
        assert_eq!(q.sample().queue_sum, 1_500);
        assert_eq!(q.sample().queue_samples, 1);

        q.sample_queue();
        assert_eq!(q.sample().queue_sum, 3_000);

        q.on_timer(Timer::LoadMeasurement, t)?;
        assert_eq!(q.sample().intervals, 1);
        assert_eq!(q.sample().queue_samples, 0);

        q.reset(t);
        assert_eq!(q.sample().intervals, 0);
        assert_eq!(q.inner().len(), 1);
        assert_eq!(q.estimator().sample().load, 0);

        q.close();
        assert_eq!(q.timeout(), None);
        Ok(())
    }

    #[test]
    fn capacity_change() {
        let now = Instant::now();
        let mut q = new_queue(1_000, now);
        assert!(q.set_capacity(100.0).is_err());
        assert!(q.set_capacity(1e6).is_ok());
        assert_eq!(q.sample().capacity, 1e6);
        assert_eq!(q.sample().target_utilization, 0.90);
    }
}
