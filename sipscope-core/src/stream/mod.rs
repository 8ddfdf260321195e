//! TCP stream processing and application-layer framing.
//!
//! SIP over TCP has no message boundaries at the transport layer, so
//! segments are tracked per connection, reassembled into ordered byte
//! streams and cut into messages by stream parsers.
//!
//! ## Components
//!
//! - [`ConnectionTracker`] - Tracks TCP connections via 3-way handshake
//! - [`TcpReassembler`] - Reassembles TCP segments, remembering which frame carried each byte
//! - [`StreamManager`] - Coordinates tracking, reassembly, and parsing
//! - [`StreamParser`] - Trait for application-layer framers
//! - [`StreamRegistry`] - Registry of stream parsers
//!
//! ## Built-in Stream Parsers
//!
//! - SIP (Content-Length framing)
//! - WebSocket (upgrade handshake and frame unmasking, SIP inside)
//! - TLS (records recognised and skipped)
//!
//! ## Example
//!
//! ```rust
//! use std::net::{IpAddr, Ipv4Addr};
//! use sipscope_core::packet::{Address, Frame, FrameHeader};
//! use sipscope_core::stream::{StreamManager, TcpFlags};
//!
//! let mut manager = StreamManager::with_defaults();
//! let client = Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 40000);
//! let server = Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 5060);
//!
//! let sip = b"OPTIONS sip:pbx SIP/2.0\r\nContent-Length: 0\r\n\r\n";
//! let frame = Frame::new(FrameHeader::default(), sip.to_vec());
//! let flags = TcpFlags { ack: true, ..Default::default() };
//!
//! let messages = manager.process_segment(client, server, 1, flags, frame);
//! assert_eq!(messages.len(), 1);
//! ```

mod connection;
mod context;
mod manager;
mod parser;
pub mod parsers;
mod reassembly;
mod registry;

pub use connection::{Connection, ConnectionKey, ConnectionState, ConnectionTracker, TcpFlags};
pub use context::{Direction, ParsedMessage, StreamContext, StreamParseResult};
pub use manager::{StreamConfig, StreamManager, StreamManagerStats, StreamMessage};
pub use parser::StreamParser;
pub use parsers::{SipStreamParser, TlsStreamParser, WebSocketStreamParser};
pub use reassembly::{StreamBuffer, StreamKey, StreamStats, TcpReassembler};
pub use registry::StreamRegistry;
