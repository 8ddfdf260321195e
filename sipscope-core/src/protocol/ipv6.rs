//! IPv6 protocol parser with extension header walking.

use etherparse::Ipv6HeaderSlice;
use smallvec::SmallVec;

use super::ethernet::ethertype;
use super::{FieldValue, ParseContext, ParseResult, Protocol};

/// IPv6 Next Header values for extension headers.
pub mod next_header {
    pub const HOP_BY_HOP: u8 = 0;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const AH: u8 = 51;
    pub const DESTINATION: u8 = 60;
    pub const MOBILITY: u8 = 135;
}

fn is_extension_header(nh: u8) -> bool {
    matches!(
        nh,
        next_header::HOP_BY_HOP
            | next_header::ROUTING
            | next_header::FRAGMENT
            | next_header::DESTINATION
            | next_header::AH
            | next_header::MOBILITY
    )
}

/// Fragment header contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FragmentHeader {
    /// Offset in 8-octet units.
    offset: u16,
    more: bool,
    id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Ipv6Protocol;

impl Protocol for Ipv6Protocol {
    fn name(&self) -> &'static str {
        "ipv6"
    }

    fn display_name(&self) -> &'static str {
        "IPv6"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        match context.hint("ethertype") {
            Some(et) if et == ethertype::IPV6 as u64 => Some(100),
            _ => None,
        }
    }

    fn parse<'a>(&self, data: &'a [u8], _context: &ParseContext) -> ParseResult<'a> {
        match Ipv6HeaderSlice::from_slice(data) {
            Ok(ipv6) => {
                let base_header_len = ipv6.slice().len();
                let (protocol, ext_consumed, fragment) =
                    walk_extension_headers(ipv6.next_header().0, &data[base_header_len..]);

                let payload_length = (ipv6.payload_length() as usize).saturating_sub(ext_consumed);
                let (frag_offset, frag_more, frag_id) = fragment
                    .map(|f| (f.offset, f.more, f.id))
                    .unwrap_or((0, false, 0));
                let fragmented = frag_more || frag_offset > 0;

                let mut fields = SmallVec::new();
                fields.push(("version", FieldValue::UInt8(6)));
                fields.push((
                    "header_length",
                    FieldValue::UInt16((base_header_len + ext_consumed) as u16),
                ));
                fields.push(("payload_length", FieldValue::UInt32(payload_length as u32)));
                fields.push(("identification", FieldValue::UInt32(frag_id)));
                fields.push(("more_fragments", FieldValue::Bool(frag_more)));
                fields.push(("fragment_offset", FieldValue::UInt16(frag_offset)));
                fields.push(("fragmented", FieldValue::Bool(fragmented)));
                fields.push(("protocol", FieldValue::UInt8(protocol)));
                fields.push(("src_ip", FieldValue::ipv6(&ipv6.source())));
                fields.push(("dst_ip", FieldValue::ipv6(&ipv6.destination())));

                let mut child_hints = SmallVec::new();
                child_hints.push(("ip_version", 6));
                if !fragmented {
                    child_hints.push(("ip_protocol", protocol as u64));
                }

                let total_consumed = (base_header_len + ext_consumed).min(data.len());
                ParseResult::success(fields, &data[total_consumed..], child_hints)
            }
            Err(e) => ParseResult::error(format!("IPv6 parse error: {e}"), data),
        }
    }

    fn child_protocols(&self) -> &[&'static str] {
        &["tcp", "udp"]
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["ethernet", "linux_sll", "raw_ip", "vlan"]
    }
}

/// Skip extension headers.
/// Returns (upper_layer_protocol, bytes_consumed, fragment_header).
fn walk_extension_headers(first_nh: u8, data: &[u8]) -> (u8, usize, Option<FragmentHeader>) {
    let mut offset = 0;
    let mut current_nh = first_nh;
    let mut fragment = None;

    while is_extension_header(current_nh) && offset < data.len() {
        let rest = &data[offset..];
        let parsed = match current_nh {
            next_header::FRAGMENT => parse_fragment_header(rest).map(|(nh, frag)| {
                fragment = Some(frag);
                (nh, 8)
            }),
            next_header::AH => parse_ah_header(rest),
            _ => parse_generic_ext_header(rest),
        };
        match parsed {
            Some((next_nh, consumed)) => {
                current_nh = next_nh;
                offset += consumed;
            }
            None => break,
        }
    }

    (current_nh, offset, fragment)
}

/// Hop-by-Hop, Routing, Destination Options and Mobility share one layout.
fn parse_generic_ext_header(data: &[u8]) -> Option<(u8, usize)> {
    if data.len() < 2 {
        return None;
    }
    // Length is in 8-octet units, not counting the first 8 octets
    let total_len = (data[1] as usize + 1) * 8;
    if data.len() < total_len {
        return None;
    }
    Some((data[0], total_len))
}

fn parse_fragment_header(data: &[u8]) -> Option<(u8, FragmentHeader)> {
    if data.len() < 8 {
        return None;
    }
    let offset_and_flags = u16::from_be_bytes([data[2], data[3]]);
    Some((
        data[0],
        FragmentHeader {
            offset: offset_and_flags >> 3,
            more: (offset_and_flags & 0x0001) != 0,
            id: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        },
    ))
}

fn parse_ah_header(data: &[u8]) -> Option<(u8, usize)> {
    if data.len() < 8 {
        return None;
    }
    // AH length is in 4-octet units, minus 2
    let total_len = (data[1] as usize + 2) * 4;
    if data.len() < total_len {
        return None;
    }
    Some((data[0], total_len))
}
