//! IPv4 protocol parser.
//!
//! Besides the header fields, the parser reports the announced payload
//! length so the dissector can detect snapped captures and strip
//! Ethernet padding. Fragments stop the chain: their payload is not a
//! transport header until the datagram has been reassembled.

use smallvec::SmallVec;

use etherparse::Ipv4HeaderSlice;

use super::ethernet::ethertype;
use super::{FieldValue, ParseContext, ParseResult, Protocol};

#[derive(Debug, Clone, Copy)]
pub struct Ipv4Protocol;

impl Protocol for Ipv4Protocol {
    fn name(&self) -> &'static str {
        "ipv4"
    }

    fn display_name(&self) -> &'static str {
        "IPv4"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        match context.hint("ethertype") {
            Some(et) if et == ethertype::IPV4 as u64 => Some(100),
            _ => None,
        }
    }

    fn parse<'a>(&self, data: &'a [u8], _context: &ParseContext) -> ParseResult<'a> {
        match Ipv4HeaderSlice::from_slice(data) {
            Ok(ipv4) => {
                let header_len = ipv4.slice().len();
                let total_len = ipv4.total_len() as usize;
                // Segmentation offload leaves total length zeroed
                let payload_length = if total_len == 0 {
                    data.len() - header_len
                } else {
                    total_len.saturating_sub(header_len)
                };

                let fragment_offset = ipv4.fragments_offset().value();
                let more_fragments = ipv4.more_fragments();
                let fragmented = more_fragments || fragment_offset > 0;
                let protocol = ipv4.protocol().0;

                let mut fields = SmallVec::new();
                fields.push(("version", FieldValue::UInt8(4)));
                fields.push(("header_length", FieldValue::UInt16(header_len as u16)));
                fields.push(("payload_length", FieldValue::UInt32(payload_length as u32)));
                fields.push((
                    "identification",
                    FieldValue::UInt32(ipv4.identification() as u32),
                ));
                fields.push(("more_fragments", FieldValue::Bool(more_fragments)));
                fields.push(("fragment_offset", FieldValue::UInt16(fragment_offset)));
                fields.push(("fragmented", FieldValue::Bool(fragmented)));
                fields.push(("protocol", FieldValue::UInt8(protocol)));
                fields.push(("src_ip", FieldValue::ipv4(&ipv4.source())));
                fields.push(("dst_ip", FieldValue::ipv4(&ipv4.destination())));

                let mut child_hints = SmallVec::new();
                child_hints.push(("ip_version", 4));
                if !fragmented {
                    child_hints.push(("ip_protocol", protocol as u64));
                }

                ParseResult::success(fields, &data[header_len..], child_hints)
            }
            Err(e) => ParseResult::error(format!("IPv4 parse error: {e}"), data),
        }
    }

    fn child_protocols(&self) -> &[&'static str] {
        &["tcp", "udp"]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["ethernet", "linux_sll", "raw_ip", "vlan"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::Ipv4Builder;
    use std::net::{IpAddr, Ipv4Addr};

    fn context() -> ParseContext {
        let mut context = ParseContext::new(1);
        context.insert_hint("ethertype", 0x0800);
        context
    }

    // Test 1: Plain UDP datagram
    #[test]
    fn test_parse_ipv4_udp() {
        let packet = Ipv4Builder::new()
            .src(Ipv4Addr::new(10, 0, 0, 1))
            .dst(Ipv4Addr::new(10, 0, 0, 2))
            .protocol(17)
            .payload(&[0xAA; 8])
            .build();

        let result = Ipv4Protocol.parse(&packet, &context());

        assert!(result.is_ok());
        assert_eq!(result.hint("ip_protocol"), Some(17));
        assert_eq!(result.get("payload_length"), Some(&FieldValue::UInt32(8)));
        assert_eq!(
            result.get("src_ip").and_then(|v| v.as_ip()),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        );
        assert_eq!(result.remaining.len(), 8);
    }

    // Test 2: Fragments carry no ip_protocol hint
    #[test]
    fn test_fragment_stops_chain() {
        let packet = Ipv4Builder::new()
            .protocol(17)
            .identification(0x1234)
            .fragment(185, false)
            .payload(&[0u8; 16])
            .build();

        let result = Ipv4Protocol.parse(&packet, &context());

        assert!(result.is_ok());
        assert_eq!(result.hint("ip_protocol"), None);
        assert_eq!(result.get("fragmented"), Some(&FieldValue::Bool(true)));
        assert_eq!(result.get("fragment_offset"), Some(&FieldValue::UInt16(185)));
        assert_eq!(result.get("identification"), Some(&FieldValue::UInt32(0x1234)));
    }

    // Test 3: First fragment has MF set and offset zero
    #[test]
    fn test_first_fragment_is_fragmented() {
        let packet = Ipv4Builder::new()
            .protocol(17)
            .fragment(0, true)
            .payload(&[0u8; 16])
            .build();

        let result = Ipv4Protocol.parse(&packet, &context());
        assert_eq!(result.get("fragmented"), Some(&FieldValue::Bool(true)));
    }

    // Test 4: Snapped capture reports the announced length
    #[test]
    fn test_truncated_payload_length() {
        let mut packet = Ipv4Builder::new().protocol(17).payload(&[0u8; 100]).build();
        packet.truncate(60);

        let result = Ipv4Protocol.parse(&packet, &context());
        assert!(result.is_ok());
        assert_eq!(result.get("payload_length"), Some(&FieldValue::UInt32(100)));
        assert_eq!(result.remaining.len(), 40);
    }

    #[test]
    fn test_parse_ipv4_too_short() {
        let result = Ipv4Protocol.parse(&[0x45, 0x00, 0x00], &context());
        assert!(!result.is_ok());
    }
}
