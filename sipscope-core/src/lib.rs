//! # sipscope-core
//!
//! Packet-to-call correlation for SIP captures.
//!
//! This crate turns captured frames into SIP messages and groups them into
//! calls. It reassembles IP fragments and TCP streams, recognizes SIP over
//! UDP, TCP and WebSocket, tracks call state, collapses retransmissions and
//! derives the display attributes a call list needs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipscope_core::prelude::*;
//!
//! let storage = Arc::new(Storage::new(StorageConfig::default())?);
//! let mut pipeline = Pipeline::new(DissectorConfig::default(), Arc::clone(&storage));
//!
//! let mut reader = PcapReader::open("calls.pcap")?;
//! pipeline.run(&mut reader)?;
//!
//! for call in storage.calls() {
//!     let call = call.read();
//!     println!(
//!         "{} {} {}",
//!         call.index(),
//!         call.call_id(),
//!         call.attribute(AttributeId::CallState).unwrap_or_default()
//!     );
//! }
//! # Ok::<(), sipscope_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        sipscope-core                                |
//! +---------------------------------------------------------------------+
//! |  pcap/       - PCAP/PCAPNG reading, gzip                            |
//! |  protocol/   - Protocol trait, link/IP/transport parsers            |
//! |  stream/     - TCP reassembly, SIP/WebSocket/TLS stream framing     |
//! |  dissect/    - frame dissection, IP fragments, RTP classification   |
//! |  packet/     - Frame and Packet model                               |
//! |  sip/        - SIP and SDP parsing, SipMessage                      |
//! |  call/       - Call correlation, state, retransmissions             |
//! |  attribute/  - attribute registry and colors                        |
//! |  storage/    - call index, capture filters, queries                 |
//! |  pipeline    - capture-to-storage driver                            |
//! |  error/      - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```

pub mod attribute;
pub mod call;
pub mod config;
pub mod dissect;
pub mod error;
pub mod packet;
pub mod pcap;
pub mod pipeline;
pub mod prelude;
pub mod protocol;
pub mod sip;
pub mod storage;
pub mod stream;

// Re-export commonly used types at crate root for convenience
pub use attribute::{AttrColor, AttributeHeader, AttributeId, Color};
pub use call::{Call, CallState};
pub use config::{DisplaySettings, DissectorConfig, RetransPolicy, StorageConfig};
pub use dissect::{Dissected, Dissector, DissectorStats};
pub use error::{CaptureError, Error, ProtocolError, Result, SipError, StorageError};
pub use packet::{Address, Frame, FrameHeader, Packet, PacketType};
pub use pcap::{PacketRef, PcapReader, RawPacket};
pub use pipeline::{Pipeline, PipelineStats};
pub use protocol::{
    default_registry, parse_from, parse_packet, BuiltinProtocol, FieldValue, ParseContext,
    ParseResult, Protocol, ProtocolRegistry,
};
pub use sip::{Method, SipMessage};
pub use storage::{CallQuery, CallRef, Storage, StorageStats, Stored};
pub use stream::{StreamConfig, StreamManager, StreamMessage, TcpFlags};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
