//! TCP protocol parser.
//!
//! Only the fields stream reassembly needs are extracted: ports, sequence
//! number and flags. Payload is routed to the stream layer.

use smallvec::SmallVec;

use etherparse::TcpHeaderSlice;

use super::{FieldValue, ParseContext, ParseResult, PayloadMode, Protocol};

/// IP protocol number for TCP.
pub const IP_PROTO_TCP: u8 = 6;

/// TCP flag bits.
pub mod flags {
    pub const FIN: u16 = 0x001;
    pub const SYN: u16 = 0x002;
    pub const RST: u16 = 0x004;
    pub const PSH: u16 = 0x008;
    pub const ACK: u16 = 0x010;
}

#[derive(Debug, Clone, Copy)]
pub struct TcpProtocol;

impl Protocol for TcpProtocol {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn display_name(&self) -> &'static str {
        "TCP"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(proto) if proto == IP_PROTO_TCP as u64 => Some(100),
            _ => None,
        }
    }

    fn parse<'a>(&self, data: &'a [u8], _context: &ParseContext) -> ParseResult<'a> {
        match TcpHeaderSlice::from_slice(data) {
            Ok(tcp) => {
                let mut tcp_flags: u16 = 0;
                for (set, bit) in [
                    (tcp.fin(), flags::FIN),
                    (tcp.syn(), flags::SYN),
                    (tcp.rst(), flags::RST),
                    (tcp.psh(), flags::PSH),
                    (tcp.ack(), flags::ACK),
                ] {
                    if set {
                        tcp_flags |= bit;
                    }
                }

                let mut fields = SmallVec::new();
                fields.push(("src_port", FieldValue::UInt16(tcp.source_port())));
                fields.push(("dst_port", FieldValue::UInt16(tcp.destination_port())));
                fields.push(("seq", FieldValue::UInt32(tcp.sequence_number())));
                fields.push(("ack", FieldValue::UInt32(tcp.acknowledgment_number())));
                fields.push(("flags", FieldValue::UInt16(tcp_flags)));

                let mut child_hints = SmallVec::new();
                child_hints.push(("src_port", tcp.source_port() as u64));
                child_hints.push(("dst_port", tcp.destination_port() as u64));
                child_hints.push(("transport", IP_PROTO_TCP as u64));

                let header_len = tcp.slice().len();
                ParseResult::success(fields, &data[header_len..], child_hints)
            }
            Err(e) => ParseResult::error(format!("TCP parse error: {e}"), data),
        }
    }

    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::Stream
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["ipv4", "ipv6"]
    }
}
