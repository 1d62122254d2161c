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

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fs::File;
use std::time::Instant;

use log::debug;

use vcp::LinkQueue;
use vcp::PacketMeta;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Return the log target for the given log file, or stderr if none.
pub fn log_target(log_file: &Option<String>) -> Result<env_logger::Target> {
    if let Some(log_file) = log_file {
        let file = File::create(log_file)?;
        return Ok(env_logger::Target::Pipe(Box::new(file)));
    }
    Ok(env_logger::Target::Stderr)
}

/// A FIFO link queue dropping arrivals once the buffer is full.
#[derive(Debug, Default)]
pub struct DropTailQueue {
    /// Queued packets.
    packets: VecDeque<PacketMeta>,

    /// Queued bytes.
    bytes: usize,

    /// Buffer size in packets.
    limit: usize,

    /// Number of packets dropped.
    drops: u64,
}

impl DropTailQueue {
    pub fn new(limit: usize) -> Self {
        DropTailQueue {
            packets: VecDeque::with_capacity(limit),
            bytes: 0,
            limit,
            drops: 0,
        }
    }

    /// Return the number of packets dropped.
    pub fn drops(&self) -> u64 {
        self.drops
    }
}

impl LinkQueue for DropTailQueue {
    fn enqueue(&mut self, packet: PacketMeta) -> bool {
        if self.packets.len() >= self.limit {
            debug!(
                "drop packet {} of flow {}, queue full",
                packet.seq, packet.flow_id
            );
            self.drops += 1;
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

/// Simulation events ordered by time, then by insertion order.
#[derive(Debug)]
pub struct EventQueue<E> {
    events: BTreeMap<(Instant, u64), E>,
    next_id: u64,
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        EventQueue {
            events: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Schedule an event at the given time.
    pub fn push(&mut self, at: Instant, event: E) {
        self.events.insert((at, self.next_id), event);
        self.next_id += 1;
    }

    /// Time of the earliest event.
    pub fn next_time(&self) -> Option<Instant> {
        self.events.keys().next().map(|(at, _)| *at)
    }

    /// Remove the earliest event if it is due at `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<E> {
        match self.next_time() {
            Some(at) if at <= now => self.events.pop_first().map(|(_, e)| e),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Jain's fairness index of the given throughputs.
pub fn fairness_index(rates: &[f64]) -> f64 {
    let sum: f64 = rates.iter().sum();
    let sum_sq: f64 = rates.iter().map(|r| r * r).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    sum * sum / (rates.len() as f64 * sum_sq)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn drop_tail() {
        let now = Instant::now();
        let mut q = DropTailQueue::new(2);
        assert!(q.enqueue(PacketMeta::data(1, 0, 1000, now)));
        assert!(q.enqueue(PacketMeta::data(1, 1, 500, now)));
        assert!(!q.enqueue(PacketMeta::data(1, 2, 1000, now)));
        assert_eq!(q.drops(), 1);
        assert_eq!(q.len(), 2);
        assert_eq!(q.byte_length(), 1500);

        assert_eq!(q.dequeue().map(|p| p.seq), Some(0));
        assert_eq!(q.byte_length(), 500);
        assert_eq!(q.dequeue().map(|p| p.seq), Some(1));
        assert!(q.dequeue().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn event_order() {
        let now = Instant::now();
        let mut events = EventQueue::new();
        events.push(now + Duration::from_millis(20), "c");
        events.push(now + Duration::from_millis(10), "a");
        events.push(now + Duration::from_millis(10), "b");
        assert_eq!(events.len(), 3);
        assert_eq!(events.next_time(), Some(now + Duration::from_millis(10)));

        assert_eq!(events.pop_expired(now), None);
        let t = now + Duration::from_millis(10);
        assert_eq!(events.pop_expired(t), Some("a"));
        assert_eq!(events.pop_expired(t), Some("b"));
        assert_eq!(events.pop_expired(t), None);
        assert_eq!(events.pop_expired(now + Duration::from_secs(1)), Some("c"));
        assert!(events.is_empty());
    }

    #[test]
    fn fairness() {
        assert_eq!(fairness_index(&[]), 1.0);
        assert!((fairness_index(&[5.0, 5.0, 5.0]) - 1.0).abs() < 1e-12);
        assert!((fairness_index(&[1.0, 0.0]) - 0.5).abs() < 1e-12);
    }
}
