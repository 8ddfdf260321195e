//! IEEE 802.1Q / 802.1ad VLAN tag parser.

use smallvec::SmallVec;

use super::ethernet::ethertype;
use super::{FieldValue, ParseContext, ParseResult, Protocol};

#[derive(Debug, Clone, Copy)]
pub struct VlanProtocol;

impl Protocol for VlanProtocol {
    fn name(&self) -> &'static str {
        "vlan"
    }

    fn display_name(&self) -> &'static str {
        "802.1Q VLAN"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        match context.hint("ethertype") {
            Some(etype) if etype == ethertype::VLAN as u64 => Some(100),
            Some(etype) if etype == ethertype::QINQ as u64 => Some(100),
            _ => None,
        }
    }

    fn parse<'a>(&self, data: &'a [u8], _context: &ParseContext) -> ParseResult<'a> {
        // The TPID was consumed by the parent; TCI and inner EtherType remain
        if data.len() < 4 {
            return ParseResult::error("VLAN tag too short".to_string(), data);
        }

        let tci = u16::from_be_bytes([data[0], data[1]]);
        let vlan_id = tci & 0x0FFF;
        let inner_ethertype = u16::from_be_bytes([data[2], data[3]]);

        let mut fields = SmallVec::new();
        fields.push(("vlan_id", FieldValue::UInt16(vlan_id)));
        fields.push(("inner_ethertype", FieldValue::UInt16(inner_ethertype)));

        let mut child_hints = SmallVec::new();
        child_hints.push(("ethertype", inner_ethertype as u64));

        ParseResult::success(fields, &data[4..], child_hints)
    }

    fn child_protocols(&self) -> &[&'static str] {
        &["ipv4", "ipv6", "vlan"]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["ethernet", "linux_sll", "vlan"]
    }
}
