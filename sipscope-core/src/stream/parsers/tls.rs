//! TLS record layer.
//!
//! No keys are available, so records are only recognised and skipped.
//! This keeps SIP over TLS connections from being misread as plain SIP.

use crate::stream::{StreamContext, StreamParseResult, StreamParser};

/// TLS content types.
mod content_type {
    pub const CHANGE_CIPHER_SPEC: u8 = 20;
    pub const APPLICATION_DATA: u8 = 23;
}

/// TLS record header length.
const RECORD_HEADER_LEN: usize = 5;

/// Largest ciphertext a record may carry (2^14 + 2048).
const MAX_RECORD_LEN: usize = 18432;

/// TLS stream parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsStreamParser;

impl TlsStreamParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a TLS record header: (content_type, version, length).
    fn parse_record_header(data: &[u8]) -> Option<(u8, u16, u16)> {
        if data.len() < RECORD_HEADER_LEN {
            return None;
        }
        let content_type = data[0];
        let version = u16::from_be_bytes([data[1], data[2]]);
        let length = u16::from_be_bytes([data[3], data[4]]);
        Some((content_type, version, length))
    }

    /// Check the bytes present so far against a record header.
    fn plausible_prefix(data: &[u8]) -> bool {
        let type_ok = data.first().map_or(true, |t| {
            (content_type::CHANGE_CIPHER_SPEC..=content_type::APPLICATION_DATA).contains(t)
        });
        let major_ok = data.get(1).map_or(true, |&major| major == 3);
        let minor_ok = data.get(2).map_or(true, |&minor| minor <= 4);
        type_ok && major_ok && minor_ok
    }
}

impl StreamParser for TlsStreamParser {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn display_name(&self) -> &'static str {
        "TLS"
    }

    fn can_parse_stream(&self, context: &StreamContext) -> bool {
        // A 3-byte signature is too weak to claim arbitrary connections
        context.sip_port
    }

    fn parse_stream(&self, data: &[u8], _context: &StreamContext) -> StreamParseResult {
        if !Self::plausible_prefix(data) {
            return StreamParseResult::NotThisProtocol;
        }

        let Some((_, _, length)) = Self::parse_record_header(data) else {
            return StreamParseResult::NeedMore {
                minimum_bytes: Some(RECORD_HEADER_LEN),
            };
        };

        let length = length as usize;
        if length > MAX_RECORD_LEN {
            return StreamParseResult::NotThisProtocol;
        }

        let record_len = RECORD_HEADER_LEN + length;
        if data.len() < record_len {
            return StreamParseResult::NeedMore {
                minimum_bytes: Some(record_len),
            };
        }

        StreamParseResult::Complete {
            messages: Vec::new(),
            bytes_consumed: record_len,
        }
    }
}
