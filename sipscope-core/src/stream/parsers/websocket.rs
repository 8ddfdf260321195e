//! SIP over WebSocket (RFC 7118).
//!
//! The HTTP Upgrade handshake is consumed, then each data frame is
//! unmasked and handed to the SIP parser.

use httparse::{Request, Response, Status, EMPTY_HEADER};

use crate::stream::{StreamContext, StreamParseResult, StreamParser};

/// Maximum number of headers in the upgrade handshake.
const MAX_HEADERS: usize = 64;

/// Frames larger than this are treated as garbage.
const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

mod opcode {
    pub const CONTINUATION: u8 = 0x0;
    pub const TEXT: u8 = 0x1;
    pub const BINARY: u8 = 0x2;
    pub const CLOSE: u8 = 0x8;
    pub const PING: u8 = 0x9;
    pub const PONG: u8 = 0xA;
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    opcode: u8,
    mask: Option<[u8; 4]>,
    header_len: usize,
    payload_len: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum FrameParse {
    Header(FrameHeader),
    Incomplete(usize),
    Invalid,
}

/// WebSocket stream parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketStreamParser;

impl WebSocketStreamParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_frame_header(data: &[u8]) -> FrameParse {
        if data.len() < 2 {
            return FrameParse::Incomplete(2);
        }
        let fin = data[0] & 0x80 != 0;
        let rsv = data[0] & 0x70;
        let op = data[0] & 0x0F;
        let masked = data[1] & 0x80 != 0;
        let len7 = (data[1] & 0x7F) as u64;

        let valid_op = matches!(
            op,
            opcode::CONTINUATION
                | opcode::TEXT
                | opcode::BINARY
                | opcode::CLOSE
                | opcode::PING
                | opcode::PONG
        );
        if rsv != 0 || !valid_op {
            return FrameParse::Invalid;
        }
        // Control frames are never fragmented and carry at most 125 bytes
        if op >= opcode::CLOSE && (!fin || len7 > 125) {
            return FrameParse::Invalid;
        }

        let (payload_len, mut header_len) = match len7 {
            126 => {
                if data.len() < 4 {
                    return FrameParse::Incomplete(4);
                }
                (u16::from_be_bytes([data[2], data[3]]) as u64, 4)
            }
            127 => {
                if data.len() < 10 {
                    return FrameParse::Incomplete(10);
                }
                let mut len = [0u8; 8];
                len.copy_from_slice(&data[2..10]);
                (u64::from_be_bytes(len), 10)
            }
            n => (n, 2),
        };
        if payload_len > MAX_FRAME_LEN {
            return FrameParse::Invalid;
        }

        let mask = if masked {
            if data.len() < header_len + 4 {
                return FrameParse::Incomplete(header_len + 4);
            }
            let mut key = [0u8; 4];
            key.copy_from_slice(&data[header_len..header_len + 4]);
            header_len += 4;
            Some(key)
        } else {
            None
        };

        FrameParse::Header(FrameHeader {
            opcode: op,
            mask,
            header_len,
            payload_len: payload_len as usize,
        })
    }

    /// Consume the client's `GET ... Upgrade: websocket` request.
    fn parse_upgrade_request(data: &[u8]) -> StreamParseResult {
        let mut headers = [EMPTY_HEADER; MAX_HEADERS];
        let mut req = Request::new(&mut headers);

        match req.parse(data) {
            Ok(Status::Complete(header_len)) => {
                let upgrade = req.headers.iter().any(|h| {
                    h.name.eq_ignore_ascii_case("upgrade")
                        && String::from_utf8_lossy(h.value)
                            .to_ascii_lowercase()
                            .contains("websocket")
                });
                if upgrade {
                    StreamParseResult::Complete {
                        messages: Vec::new(),
                        bytes_consumed: header_len,
                    }
                } else {
                    StreamParseResult::NotThisProtocol
                }
            }
            Ok(Status::Partial) => StreamParseResult::NeedMore {
                minimum_bytes: None,
            },
            Err(_) => StreamParseResult::NotThisProtocol,
        }
    }

    /// Consume the server's `101 Switching Protocols` response.
    fn parse_upgrade_response(data: &[u8]) -> StreamParseResult {
        let mut headers = [EMPTY_HEADER; MAX_HEADERS];
        let mut resp = Response::new(&mut headers);

        match resp.parse(data) {
            Ok(Status::Complete(header_len)) if resp.code == Some(101) => {
                StreamParseResult::Complete {
                    messages: Vec::new(),
                    bytes_consumed: header_len,
                }
            }
            Ok(Status::Complete(_)) | Err(_) => StreamParseResult::NotThisProtocol,
            Ok(Status::Partial) => StreamParseResult::NeedMore {
                minimum_bytes: None,
            },
        }
    }
}

fn unmask(payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    match mask {
        Some(key) => payload
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % 4])
            .collect(),
        None => payload.to_vec(),
    }
}

impl StreamParser for WebSocketStreamParser {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn display_name(&self) -> &'static str {
        "WebSocket"
    }

    fn can_parse_stream(&self, _context: &StreamContext) -> bool {
        true
    }

    fn parse_stream(&self, data: &[u8], context: &StreamContext) -> StreamParseResult {
        if data.starts_with(b"GET ") {
            return Self::parse_upgrade_request(data);
        }
        if data.starts_with(b"HTTP/") {
            return Self::parse_upgrade_response(data);
        }
        if b"GET ".starts_with(data) || b"HTTP/".starts_with(data) {
            return StreamParseResult::NeedMore { minimum_bytes: None };
        }

        // Without the handshake only a SIP port makes a frame believable
        let established = context.bytes_parsed > 0;
        if !established && !context.sip_port {
            return StreamParseResult::NotThisProtocol;
        }

        let header = match Self::parse_frame_header(data) {
            FrameParse::Header(header) => header,
            FrameParse::Incomplete(needed) => {
                return StreamParseResult::NeedMore {
                    minimum_bytes: Some(needed),
                }
            }
            FrameParse::Invalid if established => {
                return StreamParseResult::Error {
                    message: "invalid WebSocket frame".to_string(),
                    skip_bytes: Some(data.len()),
                }
            }
            FrameParse::Invalid => return StreamParseResult::NotThisProtocol,
        };

        let total = header.header_len + header.payload_len;
        if data.len() < total {
            return StreamParseResult::NeedMore {
                minimum_bytes: Some(total),
            };
        }

        match header.opcode {
            opcode::TEXT | opcode::BINARY | opcode::CONTINUATION => StreamParseResult::Transform {
                child_protocol: "sip",
                child_data: unmask(&data[header.header_len..total], header.mask),
                bytes_consumed: total,
            },
            _ => StreamParseResult::Complete {
                messages: Vec::new(),
                bytes_consumed: total,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parsers::test_context;

    fn masked_text_frame(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut frame = vec![0x81];
        if payload.len() < 126 {
            frame.push(0x80 | payload.len() as u8);
        } else {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        frame.extend_from_slice(&key);
        frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        frame
    }

    fn established() -> StreamContext {
        let mut ctx = test_context(false);
        ctx.bytes_parsed = 200;
        ctx
    }

    // Test 1: Upgrade request and response are consumed
    #[test]
    fn test_handshake() {
        let parser = WebSocketStreamParser::new();
        let request = b"GET / HTTP/1.1\r\nHost: pbx\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Protocol: sip\r\n\r\n";
        match parser.parse_stream(request, &test_context(false)) {
            StreamParseResult::Complete {
                messages,
                bytes_consumed,
            } => {
                assert!(messages.is_empty());
                assert_eq!(bytes_consumed, request.len());
            }
            other => panic!("Expected Complete, got {:?}", other),
        }

        let response = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n";
        assert!(matches!(
            parser.parse_stream(response, &test_context(false)),
            StreamParseResult::Complete { bytes_consumed, .. } if bytes_consumed == response.len()
        ));
    }

    // Test 2: Plain HTTP is not WebSocket
    #[test]
    fn test_plain_http() {
        let parser = WebSocketStreamParser::new();
        assert!(matches!(
            parser.parse_stream(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n", &test_context(false)),
            StreamParseResult::NotThisProtocol
        ));
    }

    // Test 3: Masked text frame is unmasked for the SIP parser
    #[test]
    fn test_masked_text_frame() {
        let parser = WebSocketStreamParser::new();
        let sip = b"OPTIONS sip:pbx SIP/2.0\r\nContent-Length: 0\r\n\r\n";
        let frame = masked_text_frame(sip, [1, 2, 3, 4]);

        match parser.parse_stream(&frame, &established()) {
            StreamParseResult::Transform {
                child_protocol,
                child_data,
                bytes_consumed,
            } => {
                assert_eq!(child_protocol, "sip");
                assert_eq!(child_data, sip);
                assert_eq!(bytes_consumed, frame.len());
            }
            other => panic!("Expected Transform, got {:?}", other),
        }
    }

    // Test 4: 16-bit length and partial frame
    #[test]
    fn test_extended_length() {
        let parser = WebSocketStreamParser::new();
        let payload = vec![b'x'; 300];
        let frame = masked_text_frame(&payload, [9, 9, 9, 9]);
        assert_eq!(frame.len(), 2 + 2 + 4 + 300);

        match parser.parse_stream(&frame[..100], &established()) {
            StreamParseResult::NeedMore { minimum_bytes } => {
                assert_eq!(minimum_bytes, Some(frame.len()));
            }
            other => panic!("Expected NeedMore, got {:?}", other),
        }
    }

    // Test 5: Ping is consumed without output
    #[test]
    fn test_control_frame() {
        let parser = WebSocketStreamParser::new();
        let ping = [0x89, 0x02, b'h', b'i'];
        assert!(matches!(
            parser.parse_stream(&ping, &established()),
            StreamParseResult::Complete { ref messages, bytes_consumed: 4 } if messages.is_empty()
        ));
    }

    // Test 6: Frames without a handshake need a SIP port
    #[test]
    fn test_mid_stream_detection() {
        let parser = WebSocketStreamParser::new();
        let frame = masked_text_frame(b"SIP/2.0 200 OK\r\n\r\n", [0, 0, 0, 0]);

        assert!(matches!(
            parser.parse_stream(&frame, &test_context(false)),
            StreamParseResult::NotThisProtocol
        ));
        assert!(matches!(
            parser.parse_stream(&frame, &test_context(true)),
            StreamParseResult::Transform { .. }
        ));
    }
}
