use std::ops::Range;

/// Capture metadata of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Capture timestamp in microseconds since the epoch.
    pub timestamp_us: i64,
    /// Bytes present in the capture.
    pub captured_len: u32,
    /// Bytes on the wire.
    pub original_len: u32,
}

/// One captured link-layer frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    data: Vec<u8>,
    payload: Range<usize>,
    tcp_seq: Option<u32>,
}

impl Frame {
    pub fn new(header: FrameHeader, data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            header,
            data,
            payload: 0..len,
            tcp_seq: None,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The slice of this frame that belongs to the packet payload.
    pub fn payload(&self) -> &[u8] {
        self.data.get(self.payload.clone()).unwrap_or(&[])
    }

    /// Restrict the payload to `range`, clamped to the frame data.
    pub fn set_payload_range(&mut self, range: Range<usize>) -> &mut Self {
        let end = range.end.min(self.data.len());
        let start = range.start.min(end);
        self.payload = start..end;
        self
    }

    /// Drop the first `n` bytes of the payload.
    pub fn skip_payload(&mut self, n: usize) -> &mut Self {
        self.payload.start = (self.payload.start + n).min(self.payload.end);
        self
    }

    pub fn set_tcp_seq(&mut self, seq: u32) -> &mut Self {
        self.tcp_seq = Some(seq);
        self
    }

    pub fn tcp_seq(&self) -> Option<u32> {
        self.tcp_seq
    }
}
