//! Headerless and loopback link types.
//!
//! Covers captures where the frame starts with the IP header (raw IP) or
//! with a 4-byte address family word (BSD loopback, `DLT_NULL`/`DLT_LOOP`).

use smallvec::SmallVec;

use super::ethernet::ethertype;
use super::{FieldValue, ParseContext, ParseResult, Protocol};

/// Link type constants handled here.
pub mod linktype {
    /// BSD loopback, family in host byte order.
    pub const NULL: u16 = 0;
    /// Raw IP (some BSDs).
    pub const RAW_BSD: u16 = 12;
    /// Raw IP (some other BSDs).
    pub const RAW_BSD_ALT: u16 = 14;
    /// Raw IP.
    pub const RAW: u16 = 101;
    /// OpenBSD loopback, family in network byte order.
    pub const LOOP: u16 = 108;
    /// Raw IPv4.
    pub const IPV4: u16 = 228;
    /// Raw IPv6.
    pub const IPV6: u16 = 229;
}

/// Address family values seen in loopback headers.
/// IPv6 differs between BSD flavours.
const AF_INET: u32 = 2;
const AF_INET6: [u32; 3] = [24, 28, 30];

#[derive(Debug, Clone, Copy)]
pub struct RawIpProtocol;

impl RawIpProtocol {
    fn ethertype_for_version(data: &[u8]) -> Option<u16> {
        match data.first().map(|b| b >> 4) {
            Some(4) => Some(ethertype::IPV4),
            Some(6) => Some(ethertype::IPV6),
            _ => None,
        }
    }

    fn ethertype_for_family(family: u32) -> Option<u16> {
        if family == AF_INET {
            Some(ethertype::IPV4)
        } else if AF_INET6.contains(&family) {
            Some(ethertype::IPV6)
        } else {
            None
        }
    }
}

impl Protocol for RawIpProtocol {
    fn name(&self) -> &'static str {
        "raw_ip"
    }

    fn display_name(&self) -> &'static str {
        "Raw IP / Loopback"
    }

    fn can_parse(&self, context: &ParseContext) -> Option<u32> {
        if !context.is_root() {
            return None;
        }
        match context.link_type {
            linktype::NULL
            | linktype::LOOP
            | linktype::RAW
            | linktype::RAW_BSD
            | linktype::RAW_BSD_ALT
            | linktype::IPV4
            | linktype::IPV6 => Some(100),
            _ => None,
        }
    }

    fn parse<'a>(&self, data: &'a [u8], context: &ParseContext) -> ParseResult<'a> {
        let (header_len, ether_type) = match context.link_type {
            linktype::NULL | linktype::LOOP => {
                let Some(word) = data.get(..4).and_then(|b| <[u8; 4]>::try_from(b).ok()) else {
                    return ParseResult::error(
                        format!("Loopback header too short: {} bytes", data.len()),
                        data,
                    );
                };
                // DLT_NULL stores the family in the capturing host's byte order
                let family = if context.link_type == linktype::LOOP {
                    u32::from_be_bytes(word)
                } else {
                    let le = u32::from_le_bytes(word);
                    if le > 0xFFFF {
                        u32::from_be_bytes(word)
                    } else {
                        le
                    }
                };
                (4, Self::ethertype_for_family(family))
            }
            linktype::IPV4 => (0, Some(ethertype::IPV4)),
            linktype::IPV6 => (0, Some(ethertype::IPV6)),
            _ => (0, Self::ethertype_for_version(data)),
        };

        let mut fields = SmallVec::new();
        let mut child_hints = SmallVec::new();
        match ether_type {
            Some(etype) => {
                fields.push(("ethertype", FieldValue::UInt16(etype)));
                child_hints.push(("ethertype", etype as u64));
            }
            None => {
                return ParseResult::error(
                    "Raw IP: unknown network protocol".to_string(),
                    &data[header_len..],
                )
            }
        }

        ParseResult::success(fields, &data[header_len..], child_hints)
    }

    fn child_protocols(&self) -> &[&'static str] {
        &["ipv4", "ipv6"]
    }
}
