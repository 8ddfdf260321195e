use super::{StreamContext, StreamParseResult};

/// Trait for parsing application protocols from reassembled streams.
pub trait StreamParser: Send + Sync {
    /// Protocol identifier (e.g. "sip", "websocket").
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Check if this parser can handle the stream based on context.
    fn can_parse_stream(&self, context: &StreamContext) -> bool;

    /// Parse from reassembled stream bytes.
    ///
    /// Called repeatedly as more data becomes available.
    /// Parsers are stateless; all state lives in the manager.
    fn parse_stream(&self, data: &[u8], context: &StreamContext) -> StreamParseResult;
}
