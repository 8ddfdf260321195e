//! Frame builders for tests and fuzz seeds.
//!
//! Builders produce wire-format bytes with lengths filled in. Checksums are
//! left zero: no layer validates them.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Builder for Ethernet II frames.
#[derive(Debug, Clone)]
pub struct EthernetBuilder {
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    ethertype: u16,
    vlan: Option<u16>,
    payload: Vec<u8>,
}

impl Default for EthernetBuilder {
    fn default() -> Self {
        Self {
            src_mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            dst_mac: [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb],
            ethertype: 0x0800,
            vlan: None,
            payload: Vec::new(),
        }
    }
}

impl EthernetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn ipv4(self) -> Self {
        self.ethertype(0x0800)
    }

    pub fn ipv6(self) -> Self {
        self.ethertype(0x86DD)
    }

    /// Insert an 802.1Q tag with the given VLAN id.
    pub fn vlan(mut self, vlan_id: u16) -> Self {
        self.vlan = Some(vlan_id);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(18 + self.payload.len());
        frame.extend_from_slice(&self.dst_mac);
        frame.extend_from_slice(&self.src_mac);
        if let Some(vlan_id) = self.vlan {
            frame.extend_from_slice(&0x8100u16.to_be_bytes());
            frame.extend_from_slice(&(vlan_id & 0x0FFF).to_be_bytes());
        }
        frame.extend_from_slice(&self.ethertype.to_be_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }
}

/// Builder for IPv4 datagrams.
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    identification: u16,
    flags_fragment: u16,
    protocol: u8,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    total_length: Option<u16>,
    payload: Vec<u8>,
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self {
            identification: 0x0001,
            flags_fragment: 0x4000, // DF
            protocol: 17,
            src: Ipv4Addr::new(192, 168, 1, 1),
            dst: Ipv4Addr::new(192, 168, 1, 2),
            total_length: None,
            payload: Vec::new(),
        }
    }
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src(mut self, ip: Ipv4Addr) -> Self {
        self.src = ip;
        self
    }

    pub fn dst(mut self, ip: Ipv4Addr) -> Self {
        self.dst = ip;
        self
    }

    pub fn identification(mut self, id: u16) -> Self {
        self.identification = id;
        self
    }

    /// Mark as a fragment. `offset` is in 8-octet units.
    pub fn fragment(mut self, offset: u16, more: bool) -> Self {
        self.flags_fragment = (offset & 0x1FFF) | if more { 0x2000 } else { 0 };
        self
    }

    /// Override the announced total length.
    pub fn total_length(mut self, len: u16) -> Self {
        self.total_length = Some(len);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_length = self
            .total_length
            .unwrap_or(20 + self.payload.len() as u16);
        let mut packet = Vec::with_capacity(20 + self.payload.len());

        packet.push(0x45);
        packet.push(0x00);
        packet.extend_from_slice(&total_length.to_be_bytes());
        packet.extend_from_slice(&self.identification.to_be_bytes());
        packet.extend_from_slice(&self.flags_fragment.to_be_bytes());
        packet.push(64);
        packet.push(self.protocol);
        packet.extend_from_slice(&[0x00, 0x00]);
        packet.extend_from_slice(&self.src.octets());
        packet.extend_from_slice(&self.dst.octets());
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Builder for IPv6 datagrams, optionally with a fragment header.
#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    next_header: u8,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    /// (id, offset in 8-octet units, more)
    fragment: Option<(u32, u16, bool)>,
    payload: Vec<u8>,
}

impl Default for Ipv6Builder {
    fn default() -> Self {
        Self {
            next_header: 17,
            src: "2001:db8::1".parse().unwrap_or(Ipv6Addr::LOCALHOST),
            dst: "2001:db8::2".parse().unwrap_or(Ipv6Addr::LOCALHOST),
            fragment: None,
            payload: Vec::new(),
        }
    }
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_header(mut self, nh: u8) -> Self {
        self.next_header = nh;
        self
    }

    pub fn src(mut self, ip: Ipv6Addr) -> Self {
        self.src = ip;
        self
    }

    pub fn dst(mut self, ip: Ipv6Addr) -> Self {
        self.dst = ip;
        self
    }

    pub fn fragment(mut self, id: u32, offset: u16, more: bool) -> Self {
        self.fragment = Some((id, offset, more));
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let ext_len = if self.fragment.is_some() { 8 } else { 0 };
        let payload_length = (ext_len + self.payload.len()) as u16;
        let first_nh = if self.fragment.is_some() {
            44
        } else {
            self.next_header
        };

        let mut packet = Vec::with_capacity(40 + payload_length as usize);
        packet.extend_from_slice(&[0x60, 0x00, 0x00, 0x00]);
        packet.extend_from_slice(&payload_length.to_be_bytes());
        packet.push(first_nh);
        packet.push(64);
        packet.extend_from_slice(&self.src.octets());
        packet.extend_from_slice(&self.dst.octets());
        if let Some((id, offset, more)) = self.fragment {
            packet.push(self.next_header);
            packet.push(0);
            let offset_flags = (offset << 3) | u16::from(more);
            packet.extend_from_slice(&offset_flags.to_be_bytes());
            packet.extend_from_slice(&id.to_be_bytes());
        }
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Builder for UDP datagrams.
#[derive(Debug, Clone)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl Default for UdpBuilder {
    fn default() -> Self {
        Self {
            src_port: 5060,
            dst_port: 5060,
            payload: Vec::new(),
        }
    }
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = 8 + self.payload.len() as u16;
        let mut datagram = Vec::with_capacity(length as usize);
        datagram.extend_from_slice(&self.src_port.to_be_bytes());
        datagram.extend_from_slice(&self.dst_port.to_be_bytes());
        datagram.extend_from_slice(&length.to_be_bytes());
        datagram.extend_from_slice(&[0x00, 0x00]);
        datagram.extend_from_slice(&self.payload);
        datagram
    }
}

/// Builder for TCP segments.
#[derive(Debug, Clone)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    payload: Vec<u8>,
}

impl Default for TcpBuilder {
    fn default() -> Self {
        Self {
            src_port: 40000,
            dst_port: 5060,
            seq: 1,
            ack: 0,
            flags: 0x18, // PSH+ACK
            payload: Vec::new(),
        }
    }
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn ack_num(mut self, ack: u32) -> Self {
        self.ack = ack;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn syn(self) -> Self {
        self.flags(0x02)
    }

    pub fn syn_ack(self) -> Self {
        self.flags(0x12)
    }

    pub fn fin(self) -> Self {
        self.flags(0x11)
    }

    pub fn rst(self) -> Self {
        self.flags(0x04)
    }

    pub fn psh_ack(self) -> Self {
        self.flags(0x18)
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut segment = Vec::with_capacity(20 + self.payload.len());
        segment.extend_from_slice(&self.src_port.to_be_bytes());
        segment.extend_from_slice(&self.dst_port.to_be_bytes());
        segment.extend_from_slice(&self.seq.to_be_bytes());
        segment.extend_from_slice(&self.ack.to_be_bytes());
        segment.push(5 << 4); // data offset: 20 bytes
        segment.push(self.flags);
        segment.extend_from_slice(&65535u16.to_be_bytes());
        segment.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // checksum, urgent
        segment.extend_from_slice(&self.payload);
        segment
    }
}

/// Build an Ethernet/IPv4/UDP frame.
pub fn udp_frame(src: (Ipv4Addr, u16), dst: (Ipv4Addr, u16), payload: &[u8]) -> Vec<u8> {
    let udp = UdpBuilder::new()
        .src_port(src.1)
        .dst_port(dst.1)
        .payload(payload)
        .build();
    let ipv4 = Ipv4Builder::new()
        .src(src.0)
        .dst(dst.0)
        .protocol(17)
        .payload(&udp)
        .build();
    EthernetBuilder::new().ipv4().payload(&ipv4).build()
}

/// Build an Ethernet/IPv4/TCP frame with PSH+ACK and the given sequence number.
pub fn tcp_frame(
    src: (Ipv4Addr, u16),
    dst: (Ipv4Addr, u16),
    seq: u32,
    payload: &[u8],
) -> Vec<u8> {
    tcp_frame_with_flags(src, dst, seq, 0x18, payload)
}

/// Build an Ethernet/IPv4/TCP frame with explicit flags.
pub fn tcp_frame_with_flags(
    src: (Ipv4Addr, u16),
    dst: (Ipv4Addr, u16),
    seq: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let tcp = TcpBuilder::new()
        .src_port(src.1)
        .dst_port(dst.1)
        .seq(seq)
        .flags(flags)
        .payload(payload)
        .build();
    let ipv4 = Ipv4Builder::new()
        .src(src.0)
        .dst(dst.0)
        .protocol(6)
        .payload(&tcp)
        .build();
    EthernetBuilder::new().ipv4().payload(&ipv4).build()
}

/// Split a UDP datagram into Ethernet/IPv4 fragments of at most
/// `chunk` payload bytes (rounded down to a multiple of 8).
pub fn fragmented_udp_frames(
    src: (Ipv4Addr, u16),
    dst: (Ipv4Addr, u16),
    id: u16,
    payload: &[u8],
    chunk: usize,
) -> Vec<Vec<u8>> {
    let udp = UdpBuilder::new()
        .src_port(src.1)
        .dst_port(dst.1)
        .payload(payload)
        .build();
    let chunk = (chunk / 8).max(1) * 8;
    let pieces: Vec<&[u8]> = udp.chunks(chunk).collect();
    let last = pieces.len().saturating_sub(1);

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let ipv4 = Ipv4Builder::new()
                .src(src.0)
                .dst(dst.0)
                .protocol(17)
                .identification(id)
                .fragment((i * chunk / 8) as u16, i != last)
                .payload(piece)
                .build();
            EthernetBuilder::new().ipv4().payload(&ipv4).build()
        })
        .collect()
}
