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

//! Sender side of a flow: sequence space, RTT and window bookkeeping around
//! a rate controller.

use std::sync::Arc;
use std::time::Instant;

use log::*;
use serde::Serialize;

use crate::congestion_control::build_rate_controller;
use crate::congestion_control::RateController;
use crate::flow::rtt::RttEstimator;
use crate::packet::PacketMeta;
use crate::tables::VcpTables;
use crate::timer::Timer;
use crate::Error;
use crate::Result;
use crate::SenderConfig;
use crate::TYPICAL_RTT;

/// Flow statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FlowStats {
    /// Data packets sent.
    pub sent: u64,

    /// Data packets released by the pacing timer.
    pub paced: u64,

    /// New acknowledgments received.
    pub acks: u64,

    /// Duplicate acknowledgments received.
    pub dup_acks: u64,
}

/// A window-controlled sender.
///
/// Data packets are numbered from zero. A packet may be sent while its
/// sequence number is below the number of acknowledged packets plus the
/// integer part of the congestion window, and below the application limit.
#[derive(Debug)]
pub struct SenderFlow {
    /// Flow identifier.
    flow_id: u64,

    /// Data packet size in bytes.
    packet_size: usize,

    /// Next sequence number to send.
    next_seq: u64,

    /// Number of packets acknowledged cumulatively.
    acked: u64,

    /// Number of packets the application made available.
    limit: u64,

    /// Rate controller.
    controller: Box<dyn RateController>,

    /// RTT estimator fed by the echoed timestamps.
    rtt: RttEstimator,

    /// Statistics.
    stats: FlowStats,
}

impl SenderFlow {
    /// Create a flow with an unlimited amount of data to send.
    pub fn new(flow_id: u64, conf: &SenderConfig, tables: Arc<VcpTables>) -> Result<Self> {
        let controller = build_rate_controller(conf, tables)?;
        Ok(Self::with_controller(flow_id, conf.packet_size, controller))
    }

    /// Create a flow around an existing rate controller.
    pub fn with_controller(
        flow_id: u64,
        packet_size: usize,
        controller: Box<dyn RateController>,
    ) -> Self {
        SenderFlow {
            flow_id,
            packet_size,
            next_seq: 0,
            acked: 0,
            limit: u64::MAX,
            controller,
            rtt: RttEstimator::new(TYPICAL_RTT),
            stats: FlowStats::default(),
        }
    }

    pub fn flow_id(&self) -> u64 {
        self.flow_id
    }

    /// Limit the number of packets the flow may send.
    pub fn set_limit(&mut self, packets: u64) {
        self.limit = packets;
    }

    /// Whether the window and the application limit allow one more packet.
    pub fn ok_to_send_one(&self) -> bool {
        let window = self.controller.congestion_window() as u64;
        self.next_seq < self.acked.saturating_add(window) && self.next_seq < self.limit
    }

    fn send_one(&mut self, now: Instant, paced: bool) -> PacketMeta {
        let packet = PacketMeta::data(self.flow_id, self.next_seq, self.packet_size, now);
        self.next_seq += 1;
        self.stats.sent += 1;
        if paced {
            self.stats.paced += 1;
        }
        self.controller.on_sent(now, &packet, paced);
        packet
    }

    /// Send what the window allows.
    ///
    /// Small windows on long paths send a single packet and arm the pacing
    /// timer for the next one. Otherwise the window is sent as a burst.
    pub fn send_much(&mut self, now: Instant) -> Vec<PacketMeta> {
        let mut out = Vec::new();
        if !self.ok_to_send_one() {
            return out;
        }

        if self.controller.pacing_interval().is_some() {
            out.push(self.send_one(now, false));
            if self.ok_to_send_one() {
                let next = self.controller.schedule_pacing(now);
                trace!("{}. flow {} paced until {:?}", self.controller.name(), self.flow_id, next);
            }
            return out;
        }

        while self.ok_to_send_one() {
            out.push(self.send_one(now, false));
        }
        out
    }

    /// Process an acknowledgment and return the packets it allows to send.
    pub fn on_ack(&mut self, ack: &PacketMeta, now: Instant) -> Result<Vec<PacketMeta>> {
        if ack.is_data() || ack.seq > self.next_seq {
            return Err(Error::InvalidPacket);
        }

        if ack.seq <= self.acked {
            self.stats.dup_acks += 1;
            return Ok(Vec::new());
        }

        // Nothing is committed for an acknowledgment the controller rejects.
        self.controller.check_ack(ack)?;

        self.acked = ack.seq;
        self.stats.acks += 1;

        if let Some(ts) = ack.ts_echo {
            self.rtt.update(now.saturating_duration_since(ts));
            self.controller.on_rtt_update(&self.rtt);
        }
        self.controller.on_ack(now, ack)?;

        Ok(self.send_much(now))
    }

    /// Earliest deadline of the controller timers.
    pub fn timeout(&self) -> Option<Instant> {
        self.controller.timeout()
    }

    /// Deadline of the given controller timer.
    pub fn timer_deadline(&self, timer: Timer) -> Option<Instant> {
        self.controller.timer_deadline(timer)
    }

    /// Deliver a timer event and return the packet it releases, if any.
    pub fn on_timer(&mut self, timer: Timer, now: Instant) -> Result<Vec<PacketMeta>> {
        let release = self.controller.on_timer(timer, now)?;
        Ok(self.release_paced(release, now))
    }

    /// Process the expired timers and return the packet they release, if any.
    pub fn on_timeout(&mut self, now: Instant) -> Result<Vec<PacketMeta>> {
        let release = self.controller.on_timeout(now)?;
        Ok(self.release_paced(release, now))
    }

    fn release_paced(&mut self, release: bool, now: Instant) -> Vec<PacketMeta> {
        if release && self.ok_to_send_one() {
            return vec![self.send_one(now, true)];
        }
        Vec::new()
    }

    /// Return to the initial state.
    pub fn reset(&mut self) {
        self.next_seq = 0;
        self.acked = 0;
        self.rtt.reset();
        self.stats = FlowStats::default();
        self.controller.reset();
    }

    /// Tear the flow down, cancelling its timers.
    pub fn close(&mut self) {
        self.controller.close();
    }

    pub fn controller(&self) -> &dyn RateController {
        self.controller.as_ref()
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn acked(&self) -> u64 {
        self.acked
    }

    /// Number of packets sent and not acknowledged.
    pub fn in_flight(&self) -> u64 {
        self.next_seq - self.acked
    }

    pub fn stats(&self) -> &FlowStats {
        &self.stats
    }
}


pub mod rtt;
