//! Linux SLL (cooked capture) header parser.
//!
//! Captures taken on the "any" interface use LINKTYPE_LINUX_SLL (113)
//! instead of a real link-layer header.

use smallvec::SmallVec;

use super::{FieldValue, ParseContext, ParseResult, Protocol};

/// PCAP link type for Linux SLL captures.
pub const LINKTYPE_LINUX_SLL: u16 = 113;

/// Linux SLL header length in bytes.
pub const LINUX_SLL_HEADER_LEN: usize = 16;

/// ARPHRD types whose protocol field is an EtherType.
pub mod arphrd {
    pub const ETHER: u16 = 1;
    pub const LOOPBACK: u16 = 772;
}

#[derive(Debug, Clone, Copy)]
pub struct LinuxSllProtocol;

impl Protocol for LinuxSllProtocol {
    fn name(&self) -> &'static str {
        "linux_sll"
    }

    fn display_name(&self) -> &'static str {
        "Linux SLL"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        if context.is_root() && context.link_type == LINKTYPE_LINUX_SLL {
            return Some(100);
        }
        None
    }

    fn parse<'a>(&self, data: &'a [u8], _context: &ParseContext) -> ParseResult<'a> {
        if data.len() < LINUX_SLL_HEADER_LEN {
            return ParseResult::error(
                format!("Linux SLL header too short: {} bytes", data.len()),
                data,
            );
        }

        // All header fields are big-endian
        let pkt_type = u16::from_be_bytes([data[0], data[1]]);
        let arphrd_type = u16::from_be_bytes([data[2], data[3]]);
        let protocol = u16::from_be_bytes([data[14], data[15]]);

        let mut fields = SmallVec::new();
        fields.push(("packet_type", FieldValue::UInt16(pkt_type)));
        fields.push(("arphrd_type", FieldValue::UInt16(arphrd_type)));
        fields.push(("protocol", FieldValue::UInt16(protocol)));

        let mut child_hints = SmallVec::new();
        if matches!(arphrd_type, arphrd::ETHER | arphrd::LOOPBACK) {
            child_hints.push(("ethertype", protocol as u64));
        }

        ParseResult::success(fields, &data[LINUX_SLL_HEADER_LEN..], child_hints)
    }

    fn child_protocols(&self) -> &[&'static str] {
        &["ipv4", "ipv6", "vlan"]
    }
}
