//! UDP protocol parser.

use smallvec::SmallVec;

use etherparse::UdpHeaderSlice;

use super::{FieldValue, ParseContext, ParseResult, PayloadMode, Protocol};

/// IP protocol number for UDP.
pub const IP_PROTO_UDP: u8 = 17;

/// UDP header length in bytes.
pub const UDP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct UdpProtocol;

impl Protocol for UdpProtocol {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn display_name(&self) -> &'static str {
        "UDP"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(proto) if proto == IP_PROTO_UDP as u64 => Some(100),
            _ => None,
        }
    }

    fn parse<'a>(&self, data: &'a [u8], _context: &ParseContext) -> ParseResult<'a> {
        match UdpHeaderSlice::from_slice(data) {
            Ok(udp) => {
                let mut fields = SmallVec::new();
                fields.push(("src_port", FieldValue::UInt16(udp.source_port())));
                fields.push(("dst_port", FieldValue::UInt16(udp.destination_port())));
                fields.push(("length", FieldValue::UInt16(udp.length())));

                let mut child_hints = SmallVec::new();
                child_hints.push(("src_port", udp.source_port() as u64));
                child_hints.push(("dst_port", udp.destination_port() as u64));
                child_hints.push(("transport", IP_PROTO_UDP as u64));

                ParseResult::success(fields, &data[UDP_HEADER_LEN..], child_hints)
            }
            Err(e) => ParseResult::error(format!("UDP parse error: {e}"), data),
        }
    }

    /// Datagram payloads are classified by the dissector (SIP, RTP, RTCP).
    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::None
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["ipv4", "ipv6"]
    }
}
