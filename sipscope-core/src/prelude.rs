//! Convenient re-exports for common usage.
//!
//! ```rust
//! use sipscope_core::prelude::*;
//!
//! let storage = Storage::new(StorageConfig::default()).unwrap();
//! assert_eq!(storage.count(), 0);
//! ```

// Capture and pipeline
pub use crate::pcap::{PacketRef, PcapReader, RawPacket};
pub use crate::pipeline::{Pipeline, PipelineStats};

// Configuration
pub use crate::config::{DisplaySettings, DissectorConfig, RetransPolicy, StorageConfig};

// Calls and storage
pub use crate::attribute::AttributeId;
pub use crate::call::{Call, CallState};
pub use crate::sip::{Method, SipMessage};
pub use crate::storage::{CallQuery, CallRef, Storage};

// Error types
pub use crate::error::{Error, Result};
