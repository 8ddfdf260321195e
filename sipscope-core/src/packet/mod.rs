//! Captured packets as seen by the SIP layer.
//!
//! A [`Packet`] is one logical datagram: a single UDP payload, a reassembled
//! IP datagram, or one message cut out of a TCP stream. It owns the raw
//! [`Frame`]s that contributed to it, in capture order.
//!
//! Payload resolution:
//! 1. An explicit override set with [`Packet::set_payload`] wins.
//! 2. Otherwise the payload ranges of all frames are concatenated.
//! 3. After [`Packet::free_frames`] only the retained length survives.

mod address;
mod frame;

use std::borrow::Cow;
use std::net::IpAddr;

pub use address::Address;
pub use frame::{Frame, FrameHeader};

/// IP protocol numbers used by the dissector.
pub mod ip_proto {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Application classification of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    SipUdp,
    SipTcp,
    SipTls,
    SipWs,
    SipWss,
    Rtp,
    Rtcp,
}

impl PacketType {
    /// Short transport label shown in call listings.
    pub fn transport(&self) -> &'static str {
        match self {
            PacketType::SipUdp | PacketType::Rtp | PacketType::Rtcp => "UDP",
            PacketType::SipTcp => "TCP",
            PacketType::SipTls => "TLS",
            PacketType::SipWs => "WS",
            PacketType::SipWss => "WSS",
        }
    }

    pub fn is_sip(&self) -> bool {
        !matches!(self, PacketType::Rtp | PacketType::Rtcp)
    }
}

/// A logical datagram with its contributing frames.
#[derive(Debug, Clone)]
pub struct Packet {
    /// IP version (4 or 6).
    pub ip_version: u8,
    /// IP protocol number (6 = TCP, 17 = UDP).
    pub proto: u8,
    /// Source address; the port is zero until transport data is set.
    pub src: Address,
    /// Destination address.
    pub dst: Address,
    /// IP identification (fragment id for IPv6).
    pub ip_id: u32,
    /// IP payload bytes actually captured.
    pub ip_cap_len: u32,
    /// IP payload bytes announced by the header.
    pub ip_exp_len: u32,
    /// Sequence number of the last TCP segment that contributed.
    pub tcp_seq: u32,
    kind: Option<PacketType>,
    payload: Option<Vec<u8>>,
    retained_len: usize,
    retained_time: i64,
    frames: Vec<Frame>,
}

impl Packet {
    /// Create an empty packet with no frames and ports set to zero.
    pub fn new(ip_version: u8, proto: u8, src: IpAddr, dst: IpAddr, ip_id: u32) -> Self {
        Self {
            ip_version,
            proto,
            src: Address::new(src, 0),
            dst: Address::new(dst, 0),
            ip_id,
            ip_cap_len: 0,
            ip_exp_len: 0,
            tcp_seq: 0,
            kind: None,
            payload: None,
            retained_len: 0,
            retained_time: 0,
            frames: Vec::new(),
        }
    }

    /// Set source and destination ports.
    pub fn set_transport_data(&mut self, sport: u16, dport: u16) -> &mut Self {
        self.src.port = sport;
        self.dst.port = dport;
        self
    }

    /// Append a frame copying `data`, and return it for further enrichment.
    ///
    /// The frame's payload range initially covers all of `data`.
    pub fn add_frame(&mut self, header: FrameHeader, data: &[u8]) -> &mut Frame {
        self.frames.push(Frame::new(header, data.to_vec()));
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Append an already built frame.
    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn set_kind(&mut self, kind: PacketType) -> &mut Self {
        self.kind = Some(kind);
        self
    }

    pub fn kind(&self) -> Option<PacketType> {
        self.kind
    }

    /// Override the payload with an explicit copy of `payload`.
    pub fn set_payload(&mut self, payload: &[u8]) {
        self.payload = Some(payload.to_vec());
    }

    pub fn has_payload_override(&self) -> bool {
        self.payload.is_some()
    }

    /// Resolve the application payload.
    pub fn payload(&self) -> Cow<'_, [u8]> {
        if let Some(payload) = &self.payload {
            return Cow::Borrowed(payload);
        }
        match self.frames.as_slice() {
            [] => Cow::Borrowed(&[]),
            [frame] => Cow::Borrowed(frame.payload()),
            frames => Cow::Owned(
                frames
                    .iter()
                    .flat_map(|f| f.payload().iter().copied())
                    .collect(),
            ),
        }
    }

    pub fn payload_len(&self) -> usize {
        if let Some(payload) = &self.payload {
            return payload.len();
        }
        if self.frames.is_empty() {
            return self.retained_len;
        }
        self.frames.iter().map(|f| f.payload().len()).sum()
    }

    /// Timestamp of the first frame, in microseconds since the epoch.
    pub fn time(&self) -> i64 {
        self.frames
            .first()
            .map(|f| f.header.timestamp_us)
            .unwrap_or(self.retained_time)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    /// Release all frames, keeping payload length and timestamp.
    pub fn free_frames(&mut self) {
        self.retained_len = self.payload_len();
        self.retained_time = self.time();
        self.frames.clear();
        self.frames.shrink_to_fit();
    }
}
