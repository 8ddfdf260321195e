//! Runtime configuration for dissection, storage and display.
//!
//! Every setting is an explicit value passed to the component that needs it.
//! There is no global settings registry: the CLI builds these structs from
//! its arguments and hands them to [`Pipeline`](crate::Pipeline).

/// Default ports probed for SIP over UDP and TCP.
pub const DEFAULT_SIP_PORTS: [u16; 9] = [5060, 5061, 5062, 8080, 8088, 443, 80, 10080, 10443];

/// Settings for the packet dissector.
#[derive(Debug, Clone)]
pub struct DissectorConfig {
    /// Maximum bytes buffered per TCP connection before it is reset.
    pub max_connection_buffer: usize,
    /// Maximum number of incomplete IP fragment groups kept at once.
    pub max_fragment_groups: usize,
    /// Classify non-SIP UDP datagrams as RTP/RTCP.
    pub rtp: bool,
    /// Ports on which TCP payloads are tried as SIP even mid-stream.
    pub sip_ports: Vec<u16>,
}

impl Default for DissectorConfig {
    fn default() -> Self {
        Self {
            max_connection_buffer: 16 * 1024 * 1024, // 16 MB per connection
            max_fragment_groups: 1024,
            rtp: true,
            sip_ports: DEFAULT_SIP_PORTS.to_vec(),
        }
    }
}

/// How retransmitted messages are detected within a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetransPolicy {
    /// Never mark messages as retransmissions.
    Disabled,
    /// Same source, same start line and same CSeq as an earlier message.
    #[default]
    Loose,
    /// Loose, plus identical destination and identical payload bytes.
    Strict,
}

/// Settings for call storage.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Maximum number of calls kept. Zero means unlimited.
    pub limit: usize,
    /// When the limit is reached, evict the oldest call instead of
    /// rejecting new ones.
    pub rotate: bool,
    /// Only create calls whose first message is an INVITE.
    pub invite_only: bool,
    /// Regular expression a call's first message payload must match.
    pub match_expr: Option<String>,
    /// Store calls that do *not* match `match_expr`.
    pub match_invert: bool,
    /// Case-insensitive matching for `match_expr`.
    pub match_icase: bool,
    /// Keep raw frames attached to stored messages.
    pub keep_frames: bool,
    /// Retransmission detection policy.
    pub retransmission: RetransPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            limit: 20_000,
            rotate: false,
            invite_only: false,
            match_expr: None,
            match_invert: false,
            match_icase: false,
            keep_frames: true,
            retransmission: RetransPolicy::default(),
        }
    }
}

/// Presentation settings consulted by attribute colorizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    /// Whether attribute values are colorized at all.
    pub colorize: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self { colorize: true }
    }
}
