//! Link, network and transport layer parsing.
//!
//! This module provides:
//! - [`Protocol`] trait for implementing layer parsers
//! - [`ProtocolRegistry`] for priority-based parser selection
//! - Built-in parsers for every layer below the application payload
//!
//! ## Supported Layers
//!
//! | Layer | Protocols |
//! |-------|-----------|
//! | Link | Ethernet, Linux SLL, VLAN (802.1Q/802.1ad), BSD loopback, raw IP |
//! | Network | IPv4, IPv6 (with extension headers) |
//! | Transport | TCP, UDP |
//!
//! Application payloads are not chained: UDP payloads are classified by the
//! dissector and TCP payloads go through stream reassembly.
//!
//! ## Example
//!
//! ```rust
//! use sipscope_core::protocol::{default_registry, parse_packet};
//!
//! let registry = default_registry();
//! let frame: &[u8] = &[
//!     0xff, 0xff, 0xff, 0xff, 0xff, 0xff,  // dst mac
//!     0x00, 0x00, 0x00, 0x00, 0x00, 0x00,  // src mac
//!     0x08, 0x00,                          // ethertype (IPv4)
//! ];
//!
//! let layers = parse_packet(&registry, 1, frame);
//! assert_eq!(layers[0].0, "ethernet");
//! ```

mod context;
mod field;
mod registry;

mod ethernet;
mod ipv4;
mod ipv6;
mod linux_sll;
mod raw;
mod tcp;
mod udp;
mod vlan;

#[doc(hidden)]
pub mod test_utils;

pub use context::{FieldEntry, HintEntry, ParseContext, ParseResult};
pub use field::FieldValue;
pub use registry::{BuiltinProtocol, PayloadMode, Protocol, ProtocolRegistry};

pub use ethernet::EthernetProtocol;
pub use ipv4::Ipv4Protocol;
pub use ipv6::Ipv6Protocol;
pub use linux_sll::LinuxSllProtocol;
pub use raw::RawIpProtocol;
pub use tcp::TcpProtocol;
pub use udp::UdpProtocol;
pub use vlan::VlanProtocol;

pub use ethernet::{ethertype, LINKTYPE_ETHERNET};
pub use ipv6::next_header;
pub use linux_sll::LINKTYPE_LINUX_SLL;
pub use raw::linktype;
pub use tcp::{flags as tcp_flags, IP_PROTO_TCP};
pub use udp::{IP_PROTO_UDP, UDP_HEADER_LEN};

/// Create a registry with all built-in layer parsers.
pub fn default_registry() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();

    // Layer 2
    registry.register(EthernetProtocol);
    registry.register(LinuxSllProtocol);
    registry.register(RawIpProtocol);
    registry.register(VlanProtocol);

    // Layer 3
    registry.register(Ipv4Protocol);
    registry.register(Ipv6Protocol);

    // Layer 4
    registry.register(TcpProtocol);
    registry.register(UdpProtocol);

    registry
}

/// Parse a frame through all layers it contains.
///
/// Returns one `(protocol_name, result)` pair per layer, outermost first.
/// Stops at the first layer that fails, that has no known child, or whose
/// payload is not chained (TCP, UDP).
pub fn parse_packet<'a>(
    registry: &ProtocolRegistry,
    link_type: u16,
    data: &'a [u8],
) -> Vec<(&'static str, ParseResult<'a>)> {
    parse_from(registry, ParseContext::new(link_type), data)
}

/// Continue parsing from an arbitrary context.
///
/// Used to parse the transport header of a reassembled IP datagram.
pub fn parse_from<'a>(
    registry: &ProtocolRegistry,
    mut context: ParseContext,
    data: &'a [u8],
) -> Vec<(&'static str, ParseResult<'a>)> {
    // Typical frame has 3-4 layers (Eth/[VLAN]/IP/UDP)
    let mut results = Vec::with_capacity(4);
    let mut remaining = data;

    while !remaining.is_empty() {
        let Some(parser) = registry.find_parser(&context) else {
            break;
        };

        let result = parser.parse(remaining, &context);

        context.parent_protocol = Some(parser.name());
        context.hints = result.child_hints.clone();
        context.offset += remaining.len() - result.remaining.len();

        let should_stop = result.error.is_some() || parser.payload_mode() != PayloadMode::Chain;
        remaining = result.remaining;

        results.push((parser.name(), result));

        if should_stop {
            break;
        }
    }

    results
}
