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

//! Receiver side: acknowledging data and echoing its feedback.

use std::time::Instant;

use serde::Serialize;

use crate::packet::PacketMeta;
use crate::Result;
pub use acker::Acker;
pub use sink::VcpSink;

/// Default size of an acknowledgment in bytes.
pub const DEFAULT_ACK_SIZE: usize = 40;

/// Builds the acknowledgment of a data packet.
pub trait AckGenerator {
    /// Record a data packet and return its acknowledgment.
    fn on_data(&mut self, data: &PacketMeta, now: Instant) -> Result<PacketMeta>;

    /// Number of data packets received in order.
    fn cumulative(&self) -> u64;

    /// Forget every packet received.
    fn reset(&mut self);
}

/// Receiver-side feedback echo.
pub trait FeedbackEcho {
    /// Acknowledge a data packet, echoing its feedback field unchanged.
    /// Return None if the packet was discarded.
    fn on_data(&mut self, data: &PacketMeta, now: Instant) -> Result<Option<PacketMeta>>;

    /// Start a new incarnation. Packets sent before `now` are discarded.
    fn reset(&mut self, now: Instant);

    /// Receiver statistics.
    fn stats(&self) -> &SinkStats;
}

/// Receiver statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SinkStats {
    /// Data bytes delivered in order. Duplicates are not counted.
    pub bytes: u64,

    /// Acknowledgments sent.
    pub acks: u64,

    /// Packets of a previous incarnation discarded.
    pub discarded: u64,
}

mod acker;
mod sink;
