//! SIP over TCP.
//!
//! Messages are framed by Content-Length. One reassembled buffer may hold
//! several messages, and one message may span several segments.

use crate::error::SipError;
use crate::sip::{detect, message_length, Detection};
use crate::stream::{ParsedMessage, StreamContext, StreamParseResult, StreamParser};

/// SIP stream parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SipStreamParser;

impl SipStreamParser {
    pub fn new() -> Self {
        Self
    }

    /// Offset of the next line that could start a SIP message.
    fn resync_offset(data: &[u8]) -> usize {
        let mut pos = 0;
        while let Some(nl) = data[pos..].iter().position(|&b| b == b'\n') {
            pos += nl + 1;
            if pos >= data.len() || detect(&data[pos..]) != Detection::NotSip {
                return pos;
            }
        }
        data.len()
    }
}

impl StreamParser for SipStreamParser {
    fn name(&self) -> &'static str {
        "sip"
    }

    fn display_name(&self) -> &'static str {
        "SIP"
    }

    fn can_parse_stream(&self, _context: &StreamContext) -> bool {
        // Content decides; SIP may run on any port
        true
    }

    fn parse_stream(&self, data: &[u8], context: &StreamContext) -> StreamParseResult {
        // CRLF keep-alives between messages
        let keepalive = data
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        if keepalive > 0 {
            return StreamParseResult::Complete {
                messages: Vec::new(),
                bytes_consumed: keepalive,
            };
        }

        match detect(data) {
            Detection::Undecided => return StreamParseResult::NeedMore { minimum_bytes: None },
            Detection::NotSip if context.messages_parsed == 0 && context.bytes_parsed == 0 => {
                return StreamParseResult::NotThisProtocol;
            }
            Detection::NotSip => {
                return StreamParseResult::Error {
                    message: "lost SIP framing".to_string(),
                    skip_bytes: Some(Self::resync_offset(data)),
                };
            }
            Detection::Sip => {}
        }

        match message_length(data) {
            Ok(len) => StreamParseResult::Complete {
                messages: vec![ParsedMessage {
                    protocol: "sip",
                    connection_id: context.connection_id,
                    message_id: context.messages_parsed as u32,
                    direction: context.direction,
                    payload: data[..len].to_vec(),
                }],
                bytes_consumed: len,
            },
            Err(SipError::Incomplete { needed, .. }) => StreamParseResult::NeedMore {
                minimum_bytes: Some(needed),
            },
            Err(e) => StreamParseResult::Error {
                message: e.to_string(),
                skip_bytes: Some(Self::resync_offset(data)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parsers::test_context;

    const OPTIONS: &[u8] = b"OPTIONS sip:pbx SIP/2.0\r\nCall-ID: k1\r\nContent-Length: 4\r\n\r\nbody";

    // Test 1: Two messages in one buffer are cut one at a time
    #[test]
    fn test_two_messages() {
        let parser = SipStreamParser::new();
        let data = [OPTIONS, OPTIONS].concat();

        match parser.parse_stream(&data, &test_context(true)) {
            StreamParseResult::Complete {
                messages,
                bytes_consumed,
            } => {
                assert_eq!(bytes_consumed, OPTIONS.len());
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].payload, OPTIONS);
                assert_eq!(messages[0].protocol, "sip");
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
    }

    // Test 2: Body not complete yet
    #[test]
    fn test_partial_body() {
        let parser = SipStreamParser::new();
        let partial = &OPTIONS[..OPTIONS.len() - 2];

        match parser.parse_stream(partial, &test_context(true)) {
            StreamParseResult::NeedMore { minimum_bytes } => {
                assert_eq!(minimum_bytes, Some(OPTIONS.len()));
            }
            other => panic!("Expected NeedMore, got {:?}", other),
        }
    }

    // Test 3: Keep-alive CRLFs are consumed silently
    #[test]
    fn test_keepalive() {
        let parser = SipStreamParser::new();
        match parser.parse_stream(b"\r\n\r\nOPT", &test_context(true)) {
            StreamParseResult::Complete {
                messages,
                bytes_consumed,
            } => {
                assert!(messages.is_empty());
                assert_eq!(bytes_consumed, 4);
            }
            other => panic!("Expected Complete, got {:?}", other),
        }
    }

    // Test 4: Foreign stream is refused, established stream resyncs
    #[test]
    fn test_not_sip() {
        let parser = SipStreamParser::new();
        let http = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";

        assert!(matches!(
            parser.parse_stream(http, &test_context(true)),
            StreamParseResult::NotThisProtocol
        ));

        let mut ctx = test_context(true);
        ctx.messages_parsed = 3;
        let data = [&b"garbage\r\n"[..], OPTIONS].concat();
        match parser.parse_stream(&data, &ctx) {
            StreamParseResult::Error { skip_bytes, .. } => assert_eq!(skip_bytes, Some(9)),
            other => panic!("Expected Error, got {:?}", other),
        }
    }
}
