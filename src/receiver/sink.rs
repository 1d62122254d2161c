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

use std::time::Instant;

use log::*;

use super::Acker;
use super::AckGenerator;
use super::FeedbackEcho;
use super::SinkStats;
use crate::packet::PacketMeta;
use crate::Error;
use crate::Result;

/// A receiver acknowledging every data packet and echoing its feedback.
#[derive(Debug, Default)]
pub struct VcpSink<A: AckGenerator = Acker> {
    /// Acknowledgment primitive.
    acker: A,

    /// Time of the last reset. Packets sent earlier belong to a previous
    /// incarnation.
    last_reset: Option<Instant>,

    /// Statistics.
    stats: SinkStats,
}

impl<A: AckGenerator> VcpSink<A> {
    pub fn new(acker: A) -> Self {
        VcpSink {
            acker,
            last_reset: None,
            stats: SinkStats::default(),
        }
    }

    /// Return the acknowledgment primitive.
    pub fn acker(&self) -> &A {
        &self.acker
    }
}

impl<A: AckGenerator> FeedbackEcho for VcpSink<A> {
    fn on_data(&mut self, data: &PacketMeta, now: Instant) -> Result<Option<PacketMeta>> {
        if !data.is_data() {
            return Err(Error::InvalidPacket);
        }

        if matches!(self.last_reset, Some(t) if data.timestamp < t) {
            self.stats.discarded += 1;
            trace!("discard packet {} of a previous incarnation", data.seq);
            return Ok(None);
        }

        let delivered = self.acker.cumulative();
        let ack = self.acker.on_data(data, now)?.with_feedback(data.feedback);
        let delivered = self.acker.cumulative() - delivered;
        self.stats.bytes += delivered * data.size as u64;
        self.stats.acks += 1;
        Ok(Some(ack))
    }

    fn reset(&mut self, now: Instant) {
        self.acker.reset();
        self.last_reset = Some(now);
    }

    fn stats(&self) -> &SinkStats {
        &self.stats
    }
}
