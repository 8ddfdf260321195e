use std::collections::HashMap;
use std::net::IpAddr;

use super::Direction;

/// Normalized connection key (lower IP/port first for consistent lookup).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ConnectionKey {
    ip_a: IpAddr,
    port_a: u16,
    ip_b: IpAddr,
    port_b: u16,
}

impl ConnectionKey {
    /// Ensures (ip_a, port_a) <= (ip_b, port_b) lexicographically.
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) -> Self {
        if (src_ip, src_port) <= (dst_ip, dst_port) {
            Self {
                ip_a: src_ip,
                port_a: src_port,
                ip_b: dst_ip,
                port_b: dst_port,
            }
        } else {
            Self {
                ip_a: dst_ip,
                port_a: dst_port,
                ip_b: src_ip,
                port_b: src_port,
            }
        }
    }

    pub fn ports(&self) -> (u16, u16) {
        (self.port_a, self.port_b)
    }

    fn is_from_a(&self, src_ip: IpAddr, src_port: u16) -> bool {
        src_ip == self.ip_a && src_port == self.port_a
    }
}

/// TCP connection state (simplified state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    Closed,
    Reset,
    /// Connection started mid-capture (no SYN seen).
    MidStream,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::SynSent => "syn_sent",
            ConnectionState::SynReceived => "syn_received",
            ConnectionState::Established => "established",
            ConnectionState::FinWait1 => "fin_wait_1",
            ConnectionState::FinWait2 => "fin_wait_2",
            ConnectionState::CloseWait => "close_wait",
            ConnectionState::Closing => "closing",
            ConnectionState::LastAck => "last_ack",
            ConnectionState::TimeWait => "time_wait",
            ConnectionState::Closed => "closed",
            ConnectionState::Reset => "reset",
            ConnectionState::MidStream => "mid_stream",
        }
    }

    /// Both sides have sent FIN, or the connection was reset.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ConnectionState::TimeWait
                | ConnectionState::Closed
                | ConnectionState::Reset
                | ConnectionState::LastAck
                | ConnectionState::Closing
        )
    }
}

/// TCP flags for state transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    /// Decode from the flags field emitted by the TCP layer parser.
    pub fn from_bits(bits: u16) -> Self {
        use crate::protocol::tcp_flags::*;
        Self {
            syn: bits & SYN != 0,
            ack: bits & ACK != 0,
            fin: bits & FIN != 0,
            rst: bits & RST != 0,
        }
    }
}

/// A tracked TCP connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: u64,
    pub key: ConnectionKey,
    pub state: ConnectionState,

    /// True if ip_a/port_a is the client (sent SYN).
    pub client_is_a: bool,

    pub client_isn: u32,
    pub server_isn: u32,

    /// Timing (microseconds).
    pub start_time: i64,
    pub last_activity: i64,

    pub packets_to_server: u32,
    pub packets_to_client: u32,

    /// Byte counts (payload only).
    pub bytes_to_server: u64,
    pub bytes_to_client: u64,

    /// Bytes handed to stream parsers, per direction.
    pub consumed_to_server: u64,
    pub consumed_to_client: u64,

    /// Messages cut from each direction.
    pub messages_to_server: u32,
    pub messages_to_client: u32,

    /// Stream parser that claimed this connection.
    pub app_protocol: Option<&'static str>,
}

impl Connection {
    /// Determine direction based on source IP/port.
    pub fn direction(&self, src_ip: IpAddr, src_port: u16) -> Direction {
        if self.key.is_from_a(src_ip, src_port) == self.client_is_a {
            Direction::ToServer
        } else {
            Direction::ToClient
        }
    }

    pub fn consumed(&self, direction: Direction) -> u64 {
        match direction {
            Direction::ToServer => self.consumed_to_server,
            Direction::ToClient => self.consumed_to_client,
        }
    }

    pub fn add_consumed(&mut self, direction: Direction, bytes: usize) {
        match direction {
            Direction::ToServer => self.consumed_to_server += bytes as u64,
            Direction::ToClient => self.consumed_to_client += bytes as u64,
        }
    }

    pub fn messages(&self, direction: Direction) -> u32 {
        match direction {
            Direction::ToServer => self.messages_to_server,
            Direction::ToClient => self.messages_to_client,
        }
    }

    pub fn add_message(&mut self, direction: Direction) {
        match direction {
            Direction::ToServer => self.messages_to_server += 1,
            Direction::ToClient => self.messages_to_client += 1,
        }
    }
}

/// Tracks TCP connections.
pub struct ConnectionTracker {
    connections: HashMap<ConnectionKey, Connection>,
    next_id: u64,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    /// Get or create a connection for the given segment.
    /// Returns (connection, direction).
    pub fn get_or_create(
        &mut self,
        src_ip: IpAddr,
        src_port: u16,
        dst_ip: IpAddr,
        dst_port: u16,
        flags: TcpFlags,
        seq: u32,
        timestamp: i64,
    ) -> (&mut Connection, Direction) {
        let key = ConnectionKey::new(src_ip, src_port, dst_ip, dst_port);
        let next_id = &mut self.next_id;

        let conn = self.connections.entry(key.clone()).or_insert_with(|| {
            let (state, client_is_a, client_isn) = if flags.syn && !flags.ack {
                // Sender of the SYN is the client
                (ConnectionState::SynSent, key.is_from_a(src_ip, src_port), seq)
            } else {
                // Mid-stream: lower port is the server
                (ConnectionState::MidStream, key.port_a > key.port_b, 0)
            };

            let id = *next_id;
            *next_id += 1;

            Connection {
                id,
                key: key.clone(),
                state,
                client_is_a,
                client_isn,
                server_isn: 0,
                start_time: timestamp,
                last_activity: timestamp,
                packets_to_server: 0,
                packets_to_client: 0,
                bytes_to_server: 0,
                bytes_to_client: 0,
                consumed_to_server: 0,
                consumed_to_client: 0,
                messages_to_server: 0,
                messages_to_client: 0,
                app_protocol: None,
            }
        });

        conn.last_activity = timestamp;
        let direction = conn.direction(src_ip, src_port);
        (conn, direction)
    }

    /// Update connection state based on TCP flags.
    pub fn update_state(conn: &mut Connection, flags: TcpFlags, direction: Direction, seq: u32) {
        use ConnectionState::*;

        match direction {
            Direction::ToServer => conn.packets_to_server += 1,
            Direction::ToClient => conn.packets_to_client += 1,
        }

        if flags.rst {
            conn.state = Reset;
            return;
        }

        conn.state = match (conn.state, flags.syn, flags.ack, flags.fin) {
            // SYN-ACK from server
            (SynSent, true, true, false) if direction == Direction::ToClient => {
                conn.server_isn = seq;
                SynReceived
            }
            (SynReceived, false, true, false) if direction == Direction::ToServer => Established,

            (Established | MidStream, false, _, true) => match direction {
                Direction::ToServer => FinWait1,
                Direction::ToClient => CloseWait,
            },

            (FinWait1, false, true, false) => FinWait2,
            (CloseWait, false, _, true) => LastAck,
            (FinWait2, false, _, true) => TimeWait,
            (LastAck, false, true, false) => Closed,

            // Simultaneous close
            (FinWait1, false, _, true) => Closing,
            (Closing, false, true, false) => TimeWait,

            (MidStream, false, true, false) => Established,

            (current, _, _, _) => current,
        };
    }

    /// Add payload bytes to connection stats.
    pub fn add_bytes(conn: &mut Connection, direction: Direction, bytes: usize) {
        match direction {
            Direction::ToServer => conn.bytes_to_server += bytes as u64,
            Direction::ToClient => conn.bytes_to_client += bytes as u64,
        }
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&Connection> {
        self.connections.get(key)
    }

    pub fn get_mut(&mut self, key: &ConnectionKey) -> Option<&mut Connection> {
        self.connections.get_mut(key)
    }

    pub fn remove(&mut self, key: &ConnectionKey) -> Option<Connection> {
        self.connections.remove(key)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
