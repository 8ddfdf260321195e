use tracing::{debug, trace, warn};

use crate::config::{DissectorConfig, DEFAULT_SIP_PORTS};
use crate::packet::{Address, Frame, PacketType};

use super::{
    parsers::{SipStreamParser, TlsStreamParser, WebSocketStreamParser},
    Connection, ConnectionKey, ConnectionTracker, Direction, ParsedMessage, StreamContext,
    StreamParseResult, StreamRegistry, TcpFlags, TcpReassembler,
};

/// Configuration for the StreamManager.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum bytes buffered per direction before the buffer is dropped.
    pub max_connection_buffer: usize,
    /// Ports whose connections may be claimed on weak evidence.
    pub sip_ports: Vec<u16>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_connection_buffer: 16 * 1024 * 1024,
            sip_ports: DEFAULT_SIP_PORTS.to_vec(),
        }
    }
}

impl From<&DissectorConfig> for StreamConfig {
    fn from(config: &DissectorConfig) -> Self {
        Self {
            max_connection_buffer: config.max_connection_buffer,
            sip_ports: config.sip_ports.clone(),
        }
    }
}

/// An application message cut from a TCP stream.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub message: ParsedMessage,
    /// Transport the message travelled over.
    pub kind: PacketType,
    pub src: Address,
    pub dst: Address,
    /// Captured frames that carried any byte of the message, in stream order.
    pub frames: Vec<Frame>,
    /// Sequence number of the last contributing segment.
    pub tcp_seq: u32,
}

/// Counters kept across all connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamManagerStats {
    pub segments: u64,
    pub messages: u64,
    pub tls_records: u64,
    pub parse_errors: u64,
    pub buffer_overflows: u64,
    pub unrecognized_bytes: u64,
}

/// Central orchestrator for TCP stream processing.
pub struct StreamManager {
    connections: ConnectionTracker,
    reassembler: TcpReassembler,
    stream_registry: StreamRegistry,
    config: StreamConfig,
    stats: StreamManagerStats,
}

impl StreamManager {
    /// Create a manager with the SIP, WebSocket and TLS parsers registered.
    pub fn new(config: StreamConfig) -> Self {
        let mut registry = StreamRegistry::new();
        registry.register(SipStreamParser::new());
        registry.register(WebSocketStreamParser::new());
        registry.register(TlsStreamParser::new());
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: StreamConfig, stream_registry: StreamRegistry) -> Self {
        Self {
            connections: ConnectionTracker::new(),
            reassembler: TcpReassembler::new(),
            stream_registry,
            config,
            stats: StreamManagerStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(StreamConfig::default())
    }

    /// Get mutable access to the stream registry for parser registration.
    pub fn registry_mut(&mut self) -> &mut StreamRegistry {
        &mut self.stream_registry
    }

    /// Process a TCP segment whose payload is `frame.payload()`.
    ///
    /// Returns every message completed by this segment.
    pub fn process_segment(
        &mut self,
        src: Address,
        dst: Address,
        seq: u32,
        flags: TcpFlags,
        mut frame: Frame,
    ) -> Vec<StreamMessage> {
        let mut messages = Vec::new();
        self.stats.segments += 1;

        let (conn, direction) = self.connections.get_or_create(
            src.ip,
            src.port,
            dst.ip,
            dst.port,
            flags,
            seq,
            frame.header.timestamp_us,
        );
        let connection_id = conn.id;
        let key = conn.key.clone();

        ConnectionTracker::update_state(conn, flags, direction, seq);

        if flags.syn {
            self.reassembler
                .get_or_create(connection_id, direction)
                .set_initial_seq(seq);
        }

        let payload_len = frame.payload().len();
        if payload_len > 0 {
            ConnectionTracker::add_bytes(conn, direction, payload_len);
            trace!(connection_id, seq, payload_len, "tcp segment");

            frame.set_tcp_seq(seq);
            self.reassembler
                .add_segment(connection_id, direction, seq, frame);
            self.enforce_buffer_limit(connection_id, direction);

            self.try_parse(&key, direction, src, dst, &mut messages);
        }

        if flags.fin {
            self.reassembler.mark_fin(connection_id, direction);
        }

        if flags.rst || (flags.fin && self.is_fully_closed(connection_id)) {
            self.finalize_connection(&key);
        }

        messages
    }

    /// Drop a direction whose buffered bytes exceed the limit.
    fn enforce_buffer_limit(&mut self, connection_id: u64, direction: Direction) {
        let buffered = self
            .reassembler
            .get(connection_id, direction)
            .map_or(0, |b| b.buffered_bytes());

        if buffered > self.config.max_connection_buffer {
            warn!(
                connection_id,
                buffered,
                limit = self.config.max_connection_buffer,
                "stream buffer limit exceeded, dropping buffered data"
            );
            self.reassembler.reset(connection_id, direction);
            self.stats.buffer_overflows += 1;
        }
    }

    /// Parse as many messages as the reassembled data allows.
    fn try_parse(
        &mut self,
        key: &ConnectionKey,
        direction: Direction,
        src: Address,
        dst: Address,
        messages: &mut Vec<StreamMessage>,
    ) {
        loop {
            let Some(conn) = self.connections.get(key) else {
                break;
            };
            let connection_id = conn.id;
            let context = self.build_context(conn, direction, src, dst);

            let data = self.reassembler.get_contiguous(connection_id, direction);
            if data.is_empty() {
                break;
            }
            let available = data.len();

            let outcome = run_parsers(&self.stream_registry, conn.app_protocol, data, &context);
            let Some((parser_name, result)) = outcome else {
                debug!(connection_id, bytes = available, "no stream parser claims data");
                self.stats.unrecognized_bytes += available as u64;
                self.consume(key, direction, available);
                break;
            };

            match result {
                StreamParseResult::Complete {
                    messages: parsed,
                    bytes_consumed,
                } => {
                    if bytes_consumed == 0 && parsed.is_empty() {
                        break;
                    }
                    self.claim(key, parser_name);
                    if parser_name == "tls" {
                        self.stats.tls_records += 1;
                    }

                    let frames = self.consume(key, direction, bytes_consumed);
                    let kind = packet_type(parser_name);
                    for message in parsed {
                        self.emit(key, message, kind, src, dst, frames.clone(), messages);
                    }
                }

                StreamParseResult::Transform {
                    child_protocol,
                    child_data,
                    bytes_consumed,
                } => {
                    self.claim(key, parser_name);
                    let frames = self.consume(key, direction, bytes_consumed);
                    self.parse_transformed(
                        key,
                        &context,
                        child_protocol,
                        &child_data,
                        packet_type(parser_name),
                        &frames,
                        messages,
                    );
                    if bytes_consumed == 0 {
                        break;
                    }
                }

                StreamParseResult::NeedMore { .. } => break,

                StreamParseResult::NotThisProtocol => {
                    self.stats.unrecognized_bytes += available as u64;
                    self.consume(key, direction, available);
                    break;
                }

                StreamParseResult::Error {
                    message,
                    skip_bytes,
                } => {
                    debug!(connection_id, parser = parser_name, %message, ?skip_bytes, "stream parse error");
                    self.stats.parse_errors += 1;
                    match skip_bytes {
                        Some(skip) if skip > 0 => {
                            self.consume(key, direction, skip);
                        }
                        _ => {
                            self.consume(key, direction, available);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Parse data unwrapped by a framing parser (WebSocket payloads).
    #[allow(clippy::too_many_arguments)]
    fn parse_transformed(
        &mut self,
        key: &ConnectionKey,
        context: &StreamContext,
        child_protocol: &str,
        data: &[u8],
        kind: PacketType,
        frames: &[Frame],
        messages: &mut Vec<StreamMessage>,
    ) {
        let Some(parser) = self.stream_registry.get_parser(child_protocol) else {
            return;
        };

        let mut parsed = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let mut child_context = context.clone();
            child_context.messages_parsed += parsed.len();
            match parser.parse_stream(&data[offset..], &child_context) {
                StreamParseResult::Complete {
                    messages: msgs,
                    bytes_consumed,
                } if bytes_consumed > 0 => {
                    offset += bytes_consumed;
                    parsed.extend(msgs);
                }
                _ => break,
            }
        }

        for message in parsed {
            self.emit(
                key,
                message,
                kind,
                context_src(context),
                context_dst(context),
                frames.to_vec(),
                messages,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        key: &ConnectionKey,
        message: ParsedMessage,
        kind: PacketType,
        src: Address,
        dst: Address,
        frames: Vec<Frame>,
        messages: &mut Vec<StreamMessage>,
    ) {
        if let Some(conn) = self.connections.get_mut(key) {
            conn.add_message(message.direction);
        }
        self.stats.messages += 1;

        let tcp_seq = frames
            .iter()
            .rev()
            .find_map(|f| f.tcp_seq())
            .unwrap_or_default();

        messages.push(StreamMessage {
            message,
            kind,
            src,
            dst,
            frames,
            tcp_seq,
        });
    }

    /// Bind the connection to the first parser that accepted its data.
    fn claim(&mut self, key: &ConnectionKey, parser_name: &'static str) {
        if let Some(conn) = self.connections.get_mut(key) {
            if conn.app_protocol.is_none() {
                debug!(connection_id = conn.id, parser = parser_name, "stream claimed");
                conn.app_protocol = Some(parser_name);
            }
        }
    }

    fn consume(&mut self, key: &ConnectionKey, direction: Direction, bytes: usize) -> Vec<Frame> {
        let Some(conn) = self.connections.get_mut(key) else {
            return Vec::new();
        };
        conn.add_consumed(direction, bytes);
        self.reassembler.consume(conn.id, direction, bytes)
    }

    fn build_context(
        &self,
        conn: &Connection,
        direction: Direction,
        src: Address,
        dst: Address,
    ) -> StreamContext {
        let sip_port = self.config.sip_ports.contains(&src.port)
            || self.config.sip_ports.contains(&dst.port);

        StreamContext {
            connection_id: conn.id,
            direction,
            src_ip: src.ip,
            dst_ip: dst.ip,
            src_port: src.port,
            dst_port: dst.port,
            bytes_parsed: conn.consumed(direction) as usize,
            messages_parsed: conn.messages(direction) as usize,
            sip_port,
        }
    }

    /// Check if connection is fully closed (both sides FIN'd).
    fn is_fully_closed(&self, connection_id: u64) -> bool {
        self.reassembler
            .is_complete(connection_id, Direction::ToServer)
            && self
                .reassembler
                .is_complete(connection_id, Direction::ToClient)
    }

    fn finalize_connection(&mut self, key: &ConnectionKey) {
        if let Some(conn) = self.connections.remove(key) {
            trace!(
                connection_id = conn.id,
                state = conn.state.as_str(),
                "connection finished"
            );
            self.reassembler.remove(conn.id);
        }
    }

    /// Get all tracked connections.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.connections()
    }

    pub fn stats(&self) -> StreamManagerStats {
        self.stats
    }
}

/// Run the bound parser, or try candidates in registration order.
///
/// Returns `None` when no parser accepts the data.
fn run_parsers(
    registry: &StreamRegistry,
    bound: Option<&'static str>,
    data: &[u8],
    context: &StreamContext,
) -> Option<(&'static str, StreamParseResult)> {
    if let Some(name) = bound {
        let parser = registry.get_parser(name)?;
        return match parser.parse_stream(data, context) {
            StreamParseResult::NotThisProtocol => None,
            result => Some((name, result)),
        };
    }

    registry.candidates(context).find_map(|parser| {
        match parser.parse_stream(data, context) {
            StreamParseResult::NotThisProtocol => None,
            result => Some((parser.name(), result)),
        }
    })
}

/// Transport classification by the parser that framed the stream.
fn packet_type(parser_name: &str) -> PacketType {
    match parser_name {
        "websocket" => PacketType::SipWs,
        "tls" => PacketType::SipTls,
        _ => PacketType::SipTcp,
    }
}

fn context_src(context: &StreamContext) -> Address {
    Address::new(context.src_ip, context.src_port)
}

fn context_dst(context: &StreamContext) -> Address {
    Address::new(context.dst_ip, context.dst_port)
}
