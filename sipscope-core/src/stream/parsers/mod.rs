//! Stream protocol parsers.

mod sip;
mod tls;
mod websocket;

pub use sip::SipStreamParser;
pub use tls::TlsStreamParser;
pub use websocket::WebSocketStreamParser;

#[cfg(test)]
pub(crate) fn test_context(sip_port: bool) -> super::StreamContext {
    use std::net::{IpAddr, Ipv4Addr};

    super::StreamContext {
        connection_id: 1,
        direction: super::Direction::ToServer,
        src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        src_port: 40000,
        dst_port: if sip_port { 5060 } else { 9999 },
        bytes_parsed: 0,
        messages_parsed: 0,
        sip_port,
    }
}
