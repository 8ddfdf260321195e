use std::net::IpAddr;

/// Direction of data flow in a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ToServer,
    ToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToServer => "to_server",
            Direction::ToClient => "to_client",
        }
    }
}

/// Context for stream parsing.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub connection_id: u64,
    pub direction: Direction,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Bytes already consumed from this direction.
    pub bytes_parsed: usize,
    /// Messages already produced from this direction.
    pub messages_parsed: usize,
    /// Either endpoint uses a configured SIP port.
    pub sip_port: bool,
}

/// Result of stream parsing.
#[derive(Debug, Clone)]
pub enum StreamParseResult {
    /// Consumed `bytes_consumed` bytes, producing zero or more messages.
    Complete {
        messages: Vec<ParsedMessage>,
        bytes_consumed: usize,
    },

    /// Consumed a framing unit whose content must be parsed by `child_protocol`
    /// (WebSocket frames carrying SIP).
    Transform {
        child_protocol: &'static str,
        child_data: Vec<u8>,
        bytes_consumed: usize,
    },

    /// Need more data before parsing can proceed.
    NeedMore { minimum_bytes: Option<usize> },

    /// This stream doesn't match our protocol.
    NotThisProtocol,

    /// Stream is malformed. Skip `skip_bytes` to resynchronise, or stop.
    Error {
        message: String,
        skip_bytes: Option<usize>,
    },
}

/// One application message cut from a stream.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub protocol: &'static str,
    pub connection_id: u64,
    pub message_id: u32,
    pub direction: Direction,
    /// The complete message bytes.
    pub payload: Vec<u8>,
}
