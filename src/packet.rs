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

//! Packet metadata and the load factor feedback field.

use std::fmt;
use std::time::Instant;

use bytes::Buf;
use bytes::BufMut;
use serde::Serialize;
use strum_macros::EnumIter;

use crate::Error;
use crate::Result;

/// Encoded length of the VCP shim header.
pub const VCP_HEADER_LEN: usize = 3;

const ACK_FLAG: u8 = 0x80;
const RAW_FLAG: u8 = 0x40;
const CODE_MASK: u8 = 0x03;

/// The 2-bit load code stamped by routers.
///
/// The numeric order is the severity order, so comparing two codes tells
/// which router is more congested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, Serialize)]
pub enum LoadCode {
    /// Load factor below the low threshold.
    Low = 1,

    /// Load factor between the low and the high threshold.
    High = 2,

    /// Load factor at or above the high threshold.
    Over = 3,
}

impl LoadCode {
    /// Decode a 2-bit value.
    pub fn from_bits(v: u16) -> Result<LoadCode> {
        match v {
            1 => Ok(LoadCode::Low),
            2 => Ok(LoadCode::High),
            3 => Ok(LoadCode::Over),
            _ => Err(Error::InvalidFeedback(v)),
        }
    }

    /// Return the 2-bit value.
    pub fn to_bits(self) -> u16 {
        self as u16
    }
}

/// Load factor feedback carried by data packets and echoed by ACKs.
///
/// Holds either a [`LoadCode`] or, when routers run with encoding disabled,
/// the raw load factor in hundredths of a percent.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FeedbackField(u16);

impl FeedbackField {
    /// The value stamped by senders before a packet enters the network.
    pub const INITIAL: FeedbackField = FeedbackField(LoadCode::Low as u16);

    /// Build a field from an encoded load code.
    pub fn coded(code: LoadCode) -> Self {
        FeedbackField(code.to_bits())
    }

    /// Build a field from a raw load factor in percent.
    pub fn raw(load_factor: f64) -> Self {
        let v = (load_factor * 100.0).round();
        if v <= 0.0 {
            FeedbackField(0)
        } else if v >= u16::MAX as f64 {
            FeedbackField(u16::MAX)
        } else {
            FeedbackField(v as u16)
        }
    }

    /// Build a field from the value found in a header.
    pub fn from_value(v: u16) -> Self {
        FeedbackField(v)
    }

    /// The numeric value of the field.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Decode the field as a 3-level code.
    pub fn code(&self) -> Result<LoadCode> {
        LoadCode::from_bits(self.0)
    }
}

impl Default for FeedbackField {
    fn default() -> Self {
        FeedbackField::INITIAL
    }
}

impl fmt::Debug for FeedbackField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Ok(code) => write!(f, "{:?}", code),
            Err(_) => write!(f, "raw({})", self.0),
        }
    }
}

/// Return the field a router should leave on a packet.
///
/// A router only replaces the current value when its own assessment is
/// strictly more severe, so the field that reaches the receiver carries the
/// most congested router on the path.
pub fn maybe_downgrade(current: FeedbackField, proposed: FeedbackField) -> FeedbackField {
    if current < proposed {
        proposed
    } else {
        current
    }
}

/// Packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketKind {
    /// Data packet, stamped by routers.
    Data,

    /// Acknowledgment, never stamped by routers.
    Ack,
}

/// Metadata of a packet travelling along the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketMeta {
    /// Flow the packet belongs to.
    pub flow_id: u64,

    /// Sequence number of a data packet. For acknowledgments, the cumulative
    /// number of in-order data packets received.
    pub seq: u64,

    /// Packet kind.
    pub kind: PacketKind,

    /// Packet size in bytes.
    pub size: usize,

    /// Time the packet was sent, or the time the acknowledgment was generated.
    pub timestamp: Instant,

    /// Timestamp of the data packet echoed by an acknowledgment.
    pub ts_echo: Option<Instant>,

    /// Load factor feedback.
    pub feedback: FeedbackField,
}

impl PacketMeta {
    /// Create a data packet carrying the initial feedback.
    pub fn data(flow_id: u64, seq: u64, size: usize, now: Instant) -> Self {
        PacketMeta {
            flow_id,
            seq,
            kind: PacketKind::Data,
            size,
            timestamp: now,
            ts_echo: None,
            feedback: FeedbackField::INITIAL,
        }
    }

    /// Create an acknowledgment.
    pub fn ack(flow_id: u64, seq: u64, size: usize, now: Instant, ts_echo: Instant) -> Self {
        PacketMeta {
            flow_id,
            seq,
            kind: PacketKind::Ack,
            size,
            timestamp: now,
            ts_echo: Some(ts_echo),
            feedback: FeedbackField::INITIAL,
        }
    }

    /// Whether the packet is a data packet.
    pub fn is_data(&self) -> bool {
        self.kind == PacketKind::Data
    }

    /// Return a copy of the packet carrying the given feedback.
    pub fn with_feedback(self, feedback: FeedbackField) -> Self {
        PacketMeta { feedback, ..self }
    }
}

/// The VCP shim header carrying the feedback field on the wire.
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+-------------------------------+
/// |A|R|  0  | code|     raw load factor (16)      |
/// +-+-+-+-+-+-+-+-+-------------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VcpHeader {
    /// Packet kind.
    pub kind: PacketKind,

    /// Whether the field is a raw load factor.
    pub raw: bool,

    /// Feedback field.
    pub feedback: FeedbackField,
}

impl VcpHeader {
    /// Encode the header into the given buffer.
    pub fn to_bytes(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.len() < VCP_HEADER_LEN {
            return Err(Error::BufferTooShort);
        }

        let mut first = 0;
        if self.kind == PacketKind::Ack {
            first |= ACK_FLAG;
        }

        if self.raw {
            buf.put_u8(first | RAW_FLAG);
            buf.put_u16(self.feedback.value());
        } else {
            let code = self.feedback.code()?;
            buf.put_u8(first | code.to_bits() as u8);
            buf.put_u16(0);
        }

        Ok(VCP_HEADER_LEN)
    }

    /// Decode the header from the given buffer.
    pub fn from_bytes(mut buf: &[u8]) -> Result<(VcpHeader, usize)> {
        if buf.len() < VCP_HEADER_LEN {
            return Err(Error::BufferTooShort);
        }

        let first = buf.get_u8();
        let raw_value = buf.get_u16();

        let kind = if first & ACK_FLAG != 0 {
            PacketKind::Ack
        } else {
            PacketKind::Data
        };
        let raw = first & RAW_FLAG != 0;

        let feedback = if raw {
            FeedbackField::from_value(raw_value)
        } else {
            // Reserved bits must be clear in coded mode.
            if first & !(ACK_FLAG | CODE_MASK) != 0 {
                return Err(Error::InvalidFeedback(first as u16));
            }
            let code = LoadCode::from_bits((first & CODE_MASK) as u16)?;
            FeedbackField::coded(code)
        };

        Ok((
            VcpHeader {
                kind,
                raw,
                feedback,
            },
            VCP_HEADER_LEN,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn load_code_order() {
        assert!(LoadCode::Low < LoadCode::High);
        assert!(LoadCode::High < LoadCode::Over);
        assert_eq!(LoadCode::from_bits(0), Err(Error::InvalidFeedback(0)));
        assert_eq!(LoadCode::from_bits(4), Err(Error::InvalidFeedback(4)));
        for code in LoadCode::iter() {
            assert_eq!(LoadCode::from_bits(code.to_bits()), Ok(code));
        }
    }

    #[test]
    fn downgrade_keeps_most_severe() {
        let low = FeedbackField::coded(LoadCode::Low);
        let high = FeedbackField::coded(LoadCode::High);
        let over = FeedbackField::coded(LoadCode::Over);

        assert_eq!(maybe_downgrade(low, high), high);
        assert_eq!(maybe_downgrade(high, low), high);
        assert_eq!(maybe_downgrade(over, high), over);
        assert_eq!(maybe_downgrade(high, high), high);

        // The final code is the maximum severity along any path.
        for path in [
            vec![LoadCode::Low, LoadCode::Over, LoadCode::High],
            vec![LoadCode::High, LoadCode::Low, LoadCode::Low],
            vec![LoadCode::Low, LoadCode::Low, LoadCode::Low],
        ] {
            let worst = *path.iter().max().unwrap();
            let field = path.iter().fold(FeedbackField::INITIAL, |f, c| {
                maybe_downgrade(f, FeedbackField::coded(*c))
            });
            assert_eq!(field.code(), Ok(worst));
        }
    }

    #[test]
    fn raw_field() {
        assert_eq!(FeedbackField::raw(92.5).value(), 9250);
        assert_eq!(FeedbackField::raw(-3.0).value(), 0);
        assert_eq!(FeedbackField::raw(1000.0).value(), u16::MAX);
        assert!(FeedbackField::raw(150.0) > FeedbackField::raw(92.0));
        assert_eq!(format!("{:?}", FeedbackField::raw(50.0)), "raw(5000)");
        assert_eq!(format!("{:?}", FeedbackField::INITIAL), "Low");
    }

    #[test]
    fn stamping_returns_new_packet() {
        let now = Instant::now();
        let pkt = PacketMeta::data(1, 7, 1000, now);
        assert!(pkt.is_data());
        assert_eq!(pkt.feedback, FeedbackField::INITIAL);

        let stamped = pkt.clone().with_feedback(FeedbackField::coded(LoadCode::Over));
        assert_eq!(stamped.feedback.code(), Ok(LoadCode::Over));
        assert_eq!(stamped.seq, pkt.seq);
        assert_eq!(pkt.feedback, FeedbackField::INITIAL);
    }

    #[test]
    fn header_codec() -> Result<()> {
        let mut buf = [0; VCP_HEADER_LEN];

        let hdr = VcpHeader {
            kind: PacketKind::Ack,
            raw: false,
            feedback: FeedbackField::coded(LoadCode::High),
        };
        assert_eq!(hdr.to_bytes(&mut buf)?, VCP_HEADER_LEN);
        assert_eq!(buf, [0x82, 0, 0]);
        assert_eq!(VcpHeader::from_bytes(&buf)?, (hdr, VCP_HEADER_LEN));

        let hdr = VcpHeader {
            kind: PacketKind::Data,
            raw: true,
            feedback: FeedbackField::raw(120.0),
        };
        hdr.to_bytes(&mut buf)?;
        assert_eq!(buf, [0x40, 0x2e, 0xe0]);
        assert_eq!(VcpHeader::from_bytes(&buf)?.0, hdr);

        Ok(())
    }

    #[test]
    fn header_codec_errors() {
        let mut short = [0; 2];
        let hdr = VcpHeader {
            kind: PacketKind::Data,
            raw: false,
            feedback: FeedbackField::INITIAL,
        };
        assert_eq!(hdr.to_bytes(&mut short), Err(Error::BufferTooShort));
        assert_eq!(VcpHeader::from_bytes(&short), Err(Error::BufferTooShort));

        // A coded header must carry one of the three codes.
        assert_eq!(
            VcpHeader::from_bytes(&[0x00, 0, 0]),
            Err(Error::InvalidFeedback(0))
        );
        assert_eq!(
            VcpHeader::from_bytes(&[0x13, 0, 0]),
            Err(Error::InvalidFeedback(0x13))
        );

        // A raw value cannot be written as a code.
        let hdr = VcpHeader {
            kind: PacketKind::Data,
            raw: false,
            feedback: FeedbackField::raw(80.0),
        };
        let mut buf = [0; VCP_HEADER_LEN];
        assert_eq!(hdr.to_bytes(&mut buf), Err(Error::InvalidFeedback(8000)));
    }
}
