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

use std::collections::BTreeSet;
use std::time::Instant;

use super::AckGenerator;
use super::DEFAULT_ACK_SIZE;
use crate::packet::PacketMeta;
use crate::Error;
use crate::Result;

/// Cumulative acknowledgment generator.
///
/// The acknowledged sequence number is the number of data packets received
/// in order, i.e. the next sequence number expected.
#[derive(Debug)]
pub struct Acker {
    /// Next sequence number expected.
    next_expected: u64,

    /// Sequence numbers received above a hole.
    out_of_order: BTreeSet<u64>,

    /// Size of an acknowledgment in bytes.
    ack_size: usize,
}

impl Acker {
    pub fn new(ack_size: usize) -> Self {
        Acker {
            next_expected: 0,
            out_of_order: BTreeSet::new(),
            ack_size,
        }
    }

    /// Whether a sequence number was already received.
    pub fn contains(&self, seq: u64) -> bool {
        seq < self.next_expected || self.out_of_order.contains(&seq)
    }

    fn record(&mut self, seq: u64) {
        if self.contains(seq) {
            return;
        }
        if seq > self.next_expected {
            self.out_of_order.insert(seq);
            return;
        }

        self.next_expected += 1;
        while self.out_of_order.remove(&self.next_expected) {
            self.next_expected += 1;
        }
    }
}

impl Default for Acker {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_SIZE)
    }
}

impl AckGenerator for Acker {
    fn on_data(&mut self, data: &PacketMeta, now: Instant) -> Result<PacketMeta> {
        if !data.is_data() {
            return Err(Error::InvalidPacket);
        }

        self.record(data.seq);
        Ok(PacketMeta::ack(
            data.flow_id,
            self.next_expected,
            self.ack_size,
            now,
            data.timestamp,
        ))
    }

    fn cumulative(&self) -> u64 {
        self.next_expected
    }

    fn reset(&mut self) {
        self.next_expected = 0;
        self.out_of_order.clear();
    }
}
