//! Error types for sipscope-core.
//!
//! This module provides structured error types for all sipscope-core operations:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`CaptureError`] - Errors from PCAP file reading
//! - [`ProtocolError`] - Errors from link/network/transport parsing
//! - [`SipError`] - Errors from SIP message parsing
//! - [`StorageError`] - Errors from storage filters and queries
//!
//! Dissection never propagates these to the pipeline caller: malformed
//! packets are classified as unrecognized and skipped. The variants exist
//! so parsers can describe *why* something was rejected in logs and tests.

use thiserror::Error;

/// Main error type for sipscope-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading a capture file
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Error during protocol parsing
    #[error("Protocol parse error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error during SIP parsing
    #[error("SIP parse error: {0}")]
    Sip(#[from] SipError),

    /// Error configuring or querying storage
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture file reading.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },
}

/// Errors related to protocol parsing.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Packet too short for protocol header
    #[error("{protocol}: packet too short (need {needed} bytes, have {have})")]
    PacketTooShort {
        protocol: &'static str,
        needed: usize,
        have: usize,
    },

    /// Invalid header field value
    #[error("{protocol}: invalid {field}: {reason}")]
    InvalidField {
        protocol: &'static str,
        field: &'static str,
        reason: String,
    },

    /// Capture snapped the datagram short
    #[error("{protocol}: truncated capture ({captured} of {expected} bytes)")]
    Truncated {
        protocol: &'static str,
        captured: usize,
        expected: usize,
    },
}

/// Errors related to SIP message parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SipError {
    /// Payload does not start with a SIP request or status line
    #[error("not a SIP message")]
    NotSip,

    /// Start line looked like SIP but could not be parsed
    #[error("invalid start line")]
    InvalidStartLine,

    /// A mandatory header is missing
    #[error("missing {header} header")]
    MissingHeader { header: &'static str },

    /// CSeq header is malformed
    #[error("invalid CSeq header")]
    InvalidCSeq,

    /// Content-Length header is malformed
    #[error("invalid Content-Length header")]
    InvalidContentLength,

    /// Message is not complete yet
    #[error("incomplete message (need {needed} bytes, have {have})")]
    Incomplete { needed: usize, have: usize },
}

/// Errors related to storage configuration and queries.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Match or filter expression is not a valid regex
    #[error("invalid match expression: {0}")]
    InvalidMatchExpression(#[from] regex::Error),

    /// Attribute name does not exist
    #[error("unknown attribute: {name}")]
    UnknownAttribute { name: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
