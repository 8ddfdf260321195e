//! Parse context and per-layer results.

use smallvec::SmallVec;

use super::FieldValue;

/// Field entry for parse results: (field_name, value).
/// The lifetime ties borrowed values to the frame data.
pub type FieldEntry<'data> = (&'static str, FieldValue<'data>);

/// Hint entry for next-layer selection: (hint_name, value).
pub type HintEntry = (&'static str, u64);

/// Context handed from one layer to the next while walking a frame.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Link type from the capture header (e.g. 1 = Ethernet).
    pub link_type: u16,

    /// Layer that selected the current one.
    pub parent_protocol: Option<&'static str>,

    /// Selection hints left by the parent (ethertype, ip_protocol, ...).
    pub hints: SmallVec<[HintEntry; 4]>,

    /// Offset into the frame where the current layer starts.
    pub offset: usize,
}

impl ParseContext {
    /// Start a context at the link layer.
    pub fn new(link_type: u16) -> Self {
        Self {
            link_type,
            parent_protocol: None,
            hints: SmallVec::new(),
            offset: 0,
        }
    }

    /// Start a context directly above an IP layer.
    ///
    /// Used to parse the transport header of a reassembled datagram.
    pub fn for_ip_payload(parent: &'static str, ip_protocol: u8) -> Self {
        let mut ctx = Self::new(0);
        ctx.parent_protocol = Some(parent);
        ctx.set_hint("ip_protocol", ip_protocol as u64);
        ctx
    }

    #[inline]
    pub fn hint(&self, key: &str) -> Option<u64> {
        self.hints.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Append a hint. May create duplicates; see [`set_hint`](Self::set_hint).
    #[inline]
    pub fn insert_hint(&mut self, key: &'static str, value: u64) {
        self.hints.push((key, value));
    }

    /// Update an existing hint or append it.
    #[inline]
    pub fn set_hint(&mut self, key: &'static str, value: u64) {
        if let Some(entry) = self.hints.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.hints.push((key, value));
        }
    }

    #[inline]
    pub fn clear_hints(&mut self) {
        self.hints.clear();
    }

    /// True at the start of the frame.
    pub fn is_root(&self) -> bool {
        self.parent_protocol.is_none()
    }
}

/// Result of parsing one layer.
///
/// `remaining` is always a suffix of the input handed to the parser, so the
/// parse loop can derive absolute offsets from its length.
#[derive(Debug, Clone)]
pub struct ParseResult<'data> {
    /// Extracted header fields.
    pub fields: SmallVec<[FieldEntry<'data>; 16]>,

    /// Bytes after this layer's header.
    pub remaining: &'data [u8],

    /// Hints for selecting the next layer.
    pub child_hints: SmallVec<[HintEntry; 4]>,

    /// Set when the layer could not be parsed completely.
    pub error: Option<String>,
}

impl<'data> ParseResult<'data> {
    pub fn success(
        fields: SmallVec<[FieldEntry<'data>; 16]>,
        remaining: &'data [u8],
        child_hints: SmallVec<[HintEntry; 4]>,
    ) -> Self {
        Self {
            fields,
            remaining,
            child_hints,
            error: None,
        }
    }

    pub fn error(error: String, remaining: &'data [u8]) -> Self {
        Self {
            fields: SmallVec::new(),
            remaining,
            child_hints: SmallVec::new(),
            error: Some(error),
        }
    }

    /// Some fields were extracted before an error stopped the layer.
    pub fn partial(
        fields: SmallVec<[FieldEntry<'data>; 16]>,
        remaining: &'data [u8],
        error: String,
    ) -> Self {
        Self {
            fields,
            remaining,
            child_hints: SmallVec::new(),
            error: Some(error),
        }
    }

    /// Get a field value by name (linear search, N is small).
    pub fn get(&self, name: &str) -> Option<&FieldValue<'data>> {
        self.fields.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn hint(&self, name: &str) -> Option<u64> {
        self.child_hints
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_hint_access() {
        let mut ctx = ParseContext::new(1);
        ctx.insert_hint("ip_protocol", 17);
        ctx.insert_hint("dst_port", 5060);

        assert_eq!(ctx.hint("ip_protocol"), Some(17));
        assert_eq!(ctx.hint("dst_port"), Some(5060));
        assert_eq!(ctx.hint("nonexistent"), None);
    }

    #[test]
    fn test_context_set_hint_update() {
        let mut ctx = ParseContext::new(1);
        ctx.set_hint("ip_protocol", 6);
        ctx.set_hint("ip_protocol", 17);

        assert_eq!(ctx.hint("ip_protocol"), Some(17));
        assert_eq!(ctx.hints.len(), 1);
    }

    #[test]
    fn test_context_clear_hints() {
        let mut ctx = ParseContext::new(1);
        ctx.insert_hint("ethertype", 0x0800);
        ctx.clear_hints();
        assert_eq!(ctx.hint("ethertype"), None);
        assert!(ctx.is_root());
    }

    #[test]
    fn test_context_for_ip_payload() {
        let ctx = ParseContext::for_ip_payload("ipv4", 17);
        assert_eq!(ctx.parent_protocol, Some("ipv4"));
        assert_eq!(ctx.hint("ip_protocol"), Some(17));
        assert!(!ctx.is_root());
    }

    #[test]
    fn test_parse_result_success() {
        let mut fields = SmallVec::new();
        fields.push(("src_port", FieldValue::UInt16(5060)));
        let mut hints = SmallVec::new();
        hints.push(("transport", 17u64));

        let result = ParseResult::success(fields, &[], hints);

        assert!(result.is_ok());
        assert_eq!(result.get("src_port"), Some(&FieldValue::UInt16(5060)));
        assert_eq!(result.hint("transport"), Some(17));
    }

    #[test]
    fn test_parse_result_error() {
        let result = ParseResult::error("too short".to_string(), &[1, 2, 3]);
        assert!(!result.is_ok());
        assert_eq!(result.remaining, &[1, 2, 3]);
    }
}
