//! Ethernet II protocol parser.

use smallvec::SmallVec;

use etherparse::Ethernet2HeaderSlice;

use super::{FieldValue, ParseContext, ParseResult, Protocol};

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u16 = 1;

/// EtherType values the dissector follows.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ: u16 = 0x88A8;
}

/// Ethernet II protocol parser.
#[derive(Debug, Clone, Copy)]
pub struct EthernetProtocol;

impl Protocol for EthernetProtocol {
    fn name(&self) -> &'static str {
        "ethernet"
    }

    fn display_name(&self) -> &'static str {
        "Ethernet II"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        if context.is_root() && context.link_type == LINKTYPE_ETHERNET {
            return Some(100);
        }
        None
    }

    fn parse<'a>(&self, data: &'a [u8], _context: &ParseContext) -> ParseResult<'a> {
        match Ethernet2HeaderSlice::from_slice(data) {
            Ok(eth) => {
                let mut fields = SmallVec::new();

                fields.push(("src_mac", FieldValue::mac(&eth.source())));
                fields.push(("dst_mac", FieldValue::mac(&eth.destination())));
                fields.push(("ethertype", FieldValue::UInt16(eth.ether_type().0)));

                let mut child_hints = SmallVec::new();
                child_hints.push(("ethertype", eth.ether_type().0 as u64));

                let header_len = eth.slice().len();
                ParseResult::success(fields, &data[header_len..], child_hints)
            }
            Err(e) => ParseResult::error(format!("Ethernet parse error: {e}"), data),
        }
    }

    fn child_protocols(&self) -> &[&'static str] {
        &["ipv4", "ipv6", "vlan"]
    }
}
