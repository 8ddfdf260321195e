//! Frame dissection from the link layer up to SIP.
//!
//! [`Dissector::dissect`] walks one captured frame through the layer
//! parsers, reassembles IP fragments and TCP streams, and reports what it
//! found:
//!
//! ```text
//! frame ─► link ─► IPv4/IPv6 ─┬─► UDP ─┬─► SIP       ─► Dissected::Sip
//!                   │         │        └─► RTP/RTCP  ─► Dissected::Media
//!                   │         └─► TCP ─► StreamManager (SIP, WS, TLS)
//!                   │                        └─► SIP ─► Dissected::Sip
//!                   └─► fragment ─► FragmentReassembler ─► (UDP/TCP as above)
//! ```
//!
//! Nothing here fails: malformed, truncated or unknown data is counted in
//! [`DissectorStats`] and dropped.

mod fragment;
pub mod rtp;

use std::net::IpAddr;

use tracing::{debug, trace};

use crate::config::DissectorConfig;
use crate::packet::{ip_proto, Address, Frame, FrameHeader, Packet, PacketType};
use crate::protocol::{
    default_registry, parse_from, parse_packet, FieldValue, ParseContext, ParseResult,
    ProtocolRegistry, UDP_HEADER_LEN,
};
use crate::sip::{self, ParsedSip};
use crate::stream::{StreamConfig, StreamManager, StreamManagerStats, TcpFlags};

pub use fragment::{FragmentKey, FragmentReassembler, FragmentStats, Reassembled};

/// Result of dissecting a frame.
#[derive(Debug)]
pub enum Dissected {
    /// A complete SIP message with the packet it came from.
    Sip { packet: Packet, sip: ParsedSip },
    /// An RTP or RTCP datagram. Classified, not correlated.
    Media(Packet),
}

/// Dissection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DissectorStats {
    pub frames: u64,
    /// IP payload shorter than announced by the header.
    pub truncated: u64,
    pub fragments: u64,
    pub sip_udp: u64,
    /// SIP messages cut out of TCP, TLS or WebSocket streams.
    pub sip_stream: u64,
    pub media: u64,
    pub unrecognized: u64,
}

/// IP layer fields every transport path needs.
#[derive(Debug, Clone, Copy)]
struct IpHeader {
    name: &'static str,
    version: u8,
    proto: u8,
    src: IpAddr,
    dst: IpAddr,
    id: u32,
}

impl IpHeader {
    fn from_result(name: &'static str, result: &ParseResult<'_>) -> Option<Self> {
        Some(Self {
            name,
            version: result.get("version")?.as_u64()? as u8,
            proto: result.get("protocol")?.as_u64()? as u8,
            src: result.get("src_ip")?.as_ip()?,
            dst: result.get("dst_ip")?.as_ip()?,
            id: result.get("identification")?.as_u32()?,
        })
    }

    fn packet(&self, sport: u16, dport: u16) -> Packet {
        let mut packet = Packet::new(self.version, self.proto, self.src, self.dst, self.id);
        packet.set_transport_data(sport, dport);
        packet
    }
}

fn port(result: &ParseResult<'_>, name: &str) -> u16 {
    result.get(name).and_then(FieldValue::as_u16).unwrap_or(0)
}

/// Stateful frame dissector.
///
/// Keeps fragment groups and TCP connections between frames, so feed it
/// every frame of a capture in order.
pub struct Dissector {
    config: DissectorConfig,
    registry: ProtocolRegistry,
    fragments: FragmentReassembler,
    streams: StreamManager,
    stats: DissectorStats,
}

impl Dissector {
    pub fn new(config: DissectorConfig) -> Self {
        Self {
            registry: default_registry(),
            fragments: FragmentReassembler::new(config.max_fragment_groups),
            streams: StreamManager::new(StreamConfig::from(&config)),
            stats: DissectorStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &DissectorConfig {
        &self.config
    }

    /// Dissect one captured frame.
    ///
    /// A frame yields nothing while its datagram or stream is incomplete,
    /// and may yield several SIP messages once a TCP segment completes them.
    pub fn dissect(&mut self, link_type: u16, header: FrameHeader, data: &[u8]) -> Vec<Dissected> {
        self.stats.frames += 1;
        let layers = parse_packet(&self.registry, link_type, data);

        let Some(pos) = layers
            .iter()
            .position(|(name, _)| matches!(*name, "ipv4" | "ipv6"))
        else {
            trace!(link_type, len = data.len(), "no IP layer");
            self.stats.unrecognized += 1;
            return Vec::new();
        };

        let (ip_name, ip) = &layers[pos];
        if let Some(error) = &ip.error {
            debug!(%error, "malformed IP header");
            self.stats.unrecognized += 1;
            return Vec::new();
        }
        let Some(ip_header) = IpHeader::from_result(ip_name, ip) else {
            self.stats.unrecognized += 1;
            return Vec::new();
        };

        let payload_length = ip
            .get("payload_length")
            .and_then(FieldValue::as_u32)
            .unwrap_or(0) as usize;
        let start = data.len() - ip.remaining.len();
        if ip.remaining.len() < payload_length {
            debug!(
                captured = ip.remaining.len(),
                expected = payload_length,
                "truncated IP payload"
            );
            self.stats.truncated += 1;
            return Vec::new();
        }
        // Anything past the announced length is link-layer padding
        let end = start + payload_length;

        if ip.get("fragmented").and_then(FieldValue::as_bool) == Some(true) {
            let offset = ip
                .get("fragment_offset")
                .and_then(FieldValue::as_u16)
                .unwrap_or(0) as usize
                * 8;
            let more = ip.get("more_fragments").and_then(FieldValue::as_bool) == Some(true);
            let mut frame = Frame::new(header, data.to_vec());
            frame.set_payload_range(start..end);

            self.stats.fragments += 1;
            let key = FragmentKey {
                src: ip_header.src,
                dst: ip_header.dst,
                id: ip_header.id,
                proto: ip_header.proto,
            };
            return match self.fragments.add(key, offset, more, frame) {
                Some(datagram) => self.dissect_datagram(&ip_header, datagram),
                None => Vec::new(),
            };
        }

        let Some((transport_name, transport)) = layers.get(pos + 1) else {
            trace!(proto = ip_header.proto, "no transport layer");
            self.stats.unrecognized += 1;
            return Vec::new();
        };
        let transport_start = data.len() - transport.remaining.len();
        if transport.error.is_some() || transport_start > end {
            debug!(protocol = transport_name, "malformed transport header");
            self.stats.unrecognized += 1;
            return Vec::new();
        }

        let mut frame = Frame::new(header, data.to_vec());
        match *transport_name {
            "udp" => {
                let payload_end = transport_start + udp_payload_len(transport, end - transport_start);
                frame.set_payload_range(transport_start..payload_end);
                let mut packet = ip_header.packet(
                    port(transport, "src_port"),
                    port(transport, "dst_port"),
                );
                packet.ip_cap_len = payload_length as u32;
                packet.ip_exp_len = payload_length as u32;
                packet.push_frame(frame);
                self.classify_udp(packet).into_iter().collect()
            }
            "tcp" => {
                frame.set_payload_range(transport_start..end);
                self.dissect_tcp(&ip_header, transport, frame)
            }
            other => {
                trace!(protocol = other, "unsupported transport");
                self.stats.unrecognized += 1;
                Vec::new()
            }
        }
    }

    /// Continue with a reassembled IP datagram.
    fn dissect_datagram(&mut self, ip_header: &IpHeader, datagram: Reassembled) -> Vec<Dissected> {
        let context = ParseContext::for_ip_payload(ip_header.name, ip_header.proto);
        let layers = parse_from(&self.registry, context, &datagram.payload);
        let Some((transport_name, transport)) = layers.first() else {
            self.stats.unrecognized += 1;
            return Vec::new();
        };
        if transport.error.is_some() {
            debug!(protocol = transport_name, "malformed transport header in datagram");
            self.stats.unrecognized += 1;
            return Vec::new();
        }
        let transport_start = datagram.payload.len() - transport.remaining.len();
        trace!(
            id = ip_header.id,
            fragments = datagram.frames.len(),
            len = datagram.payload.len(),
            "datagram reassembled"
        );

        match *transport_name {
            "udp" => {
                let len = udp_payload_len(transport, transport.remaining.len());
                let mut packet = ip_header.packet(
                    port(transport, "src_port"),
                    port(transport, "dst_port"),
                );
                packet.ip_cap_len = datagram.cap_len;
                packet.ip_exp_len = datagram.exp_len;
                packet.set_payload(&transport.remaining[..len]);
                for frame in datagram.frames {
                    packet.push_frame(frame);
                }
                self.classify_udp(packet).into_iter().collect()
            }
            "tcp" => {
                // The stream layer takes one frame per segment: hand it the
                // stitched datagram, stamped with the first fragment's header
                let header = datagram
                    .frames
                    .first()
                    .map(|f| f.header)
                    .unwrap_or_default();
                let end = datagram.payload.len();
                let mut frame = Frame::new(header, datagram.payload.clone());
                frame.set_payload_range(transport_start..end);
                self.dissect_tcp(ip_header, transport, frame)
            }
            other => {
                trace!(protocol = other, "unsupported transport in datagram");
                self.stats.unrecognized += 1;
                Vec::new()
            }
        }
    }

    /// SIP first, then RTP/RTCP.
    fn classify_udp(&mut self, mut packet: Packet) -> Option<Dissected> {
        let parsed = sip::parse(&packet.payload());
        match parsed {
            Ok(sip) => {
                trace!(src = %packet.src, dst = %packet.dst, call_id = %sip.call_id, "sip/udp");
                packet.set_kind(PacketType::SipUdp);
                self.stats.sip_udp += 1;
                Some(Dissected::Sip { packet, sip })
            }
            Err(error) => {
                let media = if self.config.rtp {
                    rtp::classify(&packet.payload())
                } else {
                    None
                };
                if let Some(kind) = media {
                    packet.set_kind(kind);
                    self.stats.media += 1;
                    return Some(Dissected::Media(packet));
                }
                trace!(src = %packet.src, dst = %packet.dst, %error, "udp payload not recognized");
                self.stats.unrecognized += 1;
                None
            }
        }
    }

    fn dissect_tcp(
        &mut self,
        ip_header: &IpHeader,
        tcp: &ParseResult<'_>,
        frame: Frame,
    ) -> Vec<Dissected> {
        let src = Address::new(ip_header.src, port(tcp, "src_port"));
        let dst = Address::new(ip_header.dst, port(tcp, "dst_port"));
        let seq = tcp.get("seq").and_then(FieldValue::as_u32).unwrap_or(0);
        let flags = TcpFlags::from_bits(tcp.get("flags").and_then(FieldValue::as_u16).unwrap_or(0));

        let mut dissected = Vec::new();
        for msg in self.streams.process_segment(src, dst, seq, flags, frame) {
            match sip::parse(&msg.message.payload) {
                Ok(sip) => {
                    let mut packet =
                        Packet::new(ip_header.version, ip_proto::TCP, msg.src.ip, msg.dst.ip, ip_header.id);
                    packet
                        .set_transport_data(msg.src.port, msg.dst.port)
                        .set_kind(msg.kind);
                    packet.tcp_seq = msg.tcp_seq;
                    packet.set_payload(&msg.message.payload);
                    for frame in msg.frames {
                        packet.push_frame(frame);
                    }
                    trace!(src = %msg.src, dst = %msg.dst, call_id = %sip.call_id, kind = ?msg.kind, "sip/stream");
                    self.stats.sip_stream += 1;
                    dissected.push(Dissected::Sip { packet, sip });
                }
                Err(error) => {
                    debug!(src = %msg.src, dst = %msg.dst, %error, "stream message is not SIP");
                    self.stats.unrecognized += 1;
                }
            }
        }
        dissected
    }

    pub fn stats(&self) -> DissectorStats {
        self.stats
    }

    pub fn stream_stats(&self) -> StreamManagerStats {
        self.streams.stats()
    }

    pub fn fragment_stats(&self) -> FragmentStats {
        self.fragments.stats()
    }
}

impl Default for Dissector {
    fn default() -> Self {
        Self::new(DissectorConfig::default())
    }
}

/// UDP payload length bounded by both the UDP length field and the bytes
/// actually present.
fn udp_payload_len(udp: &ParseResult<'_>, available: usize) -> usize {
    let available = available.min(udp.remaining.len());
    match udp.get("length").and_then(FieldValue::as_u16) {
        Some(len) if len as usize >= UDP_HEADER_LEN => {
            (len as usize - UDP_HEADER_LEN).min(available)
        }
        _ => available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::*;
    use crate::protocol::{tcp_flags, LINKTYPE_ETHERNET};
    use std::net::{Ipv4Addr, Ipv6Addr};

    const ALICE: (Ipv4Addr, u16) = (Ipv4Addr::new(10, 0, 0, 1), 5060);
    const BOB: (Ipv4Addr, u16) = (Ipv4Addr::new(10, 0, 0, 2), 5060);

    const OPTIONS: &[u8] = b"OPTIONS sip:bob@biloxi.com SIP/2.0\r\n\
        Call-ID: opt-1\r\n\
        From: <sip:alice@atlanta.com>;tag=1\r\n\
        To: <sip:bob@biloxi.com>\r\n\
        CSeq: 1 OPTIONS\r\n\
        Content-Length: 0\r\n\r\n";

    fn header(ts: i64, len: usize) -> FrameHeader {
        FrameHeader {
            timestamp_us: ts,
            captured_len: len as u32,
            original_len: len as u32,
        }
    }

    fn dissect(dissector: &mut Dissector, frame: &[u8]) -> Vec<Dissected> {
        dissector.dissect(LINKTYPE_ETHERNET, header(1_000, frame.len()), frame)
    }

    // Test 1: SIP over UDP
    #[test]
    fn test_sip_udp() {
        let mut dissector = Dissector::default();
        let frame = udp_frame(ALICE, BOB, OPTIONS);
        let out = dissect(&mut dissector, &frame);

        assert_eq!(out.len(), 1);
        let Dissected::Sip { packet, sip } = &out[0] else {
            panic!("expected SIP");
        };
        assert_eq!(sip.call_id, "opt-1");
        assert_eq!(packet.kind(), Some(PacketType::SipUdp));
        assert_eq!(packet.src.to_string(), "10.0.0.1:5060");
        assert_eq!(packet.payload().as_ref(), OPTIONS);
        assert_eq!(packet.frames().len(), 1);
        assert_eq!(packet.time(), 1_000);
        assert_eq!(dissector.stats().sip_udp, 1);
    }

    // Test 2: Ethernet padding is not part of the payload
    #[test]
    fn test_padding_trimmed() {
        let mut dissector = Dissector::default();
        let mut frame = udp_frame(ALICE, BOB, OPTIONS);
        frame.extend_from_slice(&[0u8; 6]);
        let out = dissect(&mut dissector, &frame);

        let Some(Dissected::Sip { packet, .. }) = out.first() else {
            panic!("expected SIP");
        };
        assert_eq!(packet.payload_len(), OPTIONS.len());
    }

    // Test 3: Snapped capture is dropped
    #[test]
    fn test_truncated() {
        let mut dissector = Dissector::default();
        let frame = udp_frame(ALICE, BOB, OPTIONS);
        let snapped = &frame[..frame.len() - 20];
        assert!(dissect(&mut dissector, snapped).is_empty());
        assert_eq!(dissector.stats().truncated, 1);
    }

    // Test 4: RTP classification can be disabled
    #[test]
    fn test_rtp() {
        let mut rtp = vec![0x80, 0x08];
        rtp.extend_from_slice(&[0u8; 170]);
        let frame = udp_frame(
            (Ipv4Addr::new(10, 0, 0, 1), 4000),
            (Ipv4Addr::new(10, 0, 0, 2), 4002),
            &rtp,
        );

        let mut dissector = Dissector::default();
        let out = dissect(&mut dissector, &frame);
        assert!(matches!(&out[..], [Dissected::Media(p)] if p.kind() == Some(PacketType::Rtp)));

        let mut no_rtp = Dissector::new(DissectorConfig {
            rtp: false,
            ..Default::default()
        });
        assert!(dissect(&mut no_rtp, &frame).is_empty());
        assert_eq!(no_rtp.stats().unrecognized, 1);
    }

    // Test 5: Fragmented SIP datagram, delivered out of order
    #[test]
    fn test_fragmented_udp() {
        let mut dissector = Dissector::default();
        let frames = fragmented_udp_frames(ALICE, BOB, 4242, OPTIONS, 64);
        assert!(frames.len() > 2);

        let mut out = Vec::new();
        for frame in frames.iter().rev() {
            out.extend(dissect(&mut dissector, frame));
        }

        assert_eq!(out.len(), 1);
        let Dissected::Sip { packet, sip } = &out[0] else {
            panic!("expected SIP");
        };
        assert_eq!(sip.cseq, 1);
        assert_eq!(packet.frames().len(), frames.len());
        assert_eq!(packet.payload().as_ref(), OPTIONS);
        assert_eq!(packet.ip_cap_len, packet.ip_exp_len);
        assert_eq!(packet.ip_exp_len as usize, OPTIONS.len() + UDP_HEADER_LEN);
        assert_eq!(dissector.stats().fragments, frames.len() as u64);
    }

    // Test 6: SIP split over two TCP segments
    #[test]
    fn test_sip_tcp() {
        let mut dissector = Dissector::default();
        let syn = tcp_frame_with_flags(ALICE, BOB, 99, tcp_flags::SYN as u8, b"");
        let (head, tail) = OPTIONS.split_at(40);
        let first = tcp_frame(ALICE, BOB, 100, head);
        let second = tcp_frame(ALICE, BOB, 140, tail);

        assert!(dissect(&mut dissector, &syn).is_empty());
        assert!(dissect(&mut dissector, &first).is_empty());
        let out = dissect(&mut dissector, &second);

        assert_eq!(out.len(), 1);
        let Dissected::Sip { packet, sip } = &out[0] else {
            panic!("expected SIP");
        };
        assert_eq!(sip.call_id, "opt-1");
        assert_eq!(packet.kind(), Some(PacketType::SipTcp));
        assert_eq!(packet.frames().len(), 2);
        assert_eq!(packet.tcp_seq, 140);
        assert_eq!(packet.payload().as_ref(), OPTIONS);
        assert_eq!(dissector.stats().sip_stream, 1);
    }

    // Test 7: IPv6 UDP
    #[test]
    fn test_sip_udp_ipv6() {
        let udp = UdpBuilder::new().src_port(5060).dst_port(5060).payload(OPTIONS).build();
        let ip = Ipv6Builder::new()
            .src(Ipv6Addr::LOCALHOST)
            .dst(Ipv6Addr::LOCALHOST)
            .next_header(17)
            .payload(&udp)
            .build();
        let frame = EthernetBuilder::new().ipv6().payload(&ip).build();

        let mut dissector = Dissector::default();
        let out = dissect(&mut dissector, &frame);
        let Some(Dissected::Sip { packet, .. }) = out.first() else {
            panic!("expected SIP");
        };
        assert_eq!(packet.ip_version, 6);
        assert_eq!(packet.src.to_string(), "::1:5060");
    }

    // Test 8: Garbage never panics and is counted
    #[test]
    fn test_garbage() {
        let mut dissector = Dissector::default();
        assert!(dissect(&mut dissector, &[0xde, 0xad]).is_empty());
        let frame = udp_frame(ALICE, BOB, b"hello world");
        assert!(dissect(&mut dissector, &frame).is_empty());
        assert_eq!(dissector.stats().unrecognized, 2);
    }
}
