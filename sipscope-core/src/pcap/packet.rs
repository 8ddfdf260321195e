use bytes::Bytes;

use crate::packet::FrameHeader;

/// A captured record that owns its bytes.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Frame number (1-indexed).
    pub frame_number: u64,
    /// Timestamp in microseconds since epoch.
    pub timestamp_us: i64,
    /// Captured length (may be less than original).
    pub captured_len: u32,
    /// Original length on the wire.
    pub original_len: u32,
    /// Link layer type (e.g., 1 = Ethernet).
    pub link_type: u16,
    pub data: Bytes,
}

impl RawPacket {
    /// Borrow this record as a [`PacketRef`].
    pub fn as_packet_ref(&self) -> PacketRef<'_> {
        PacketRef {
            frame_number: self.frame_number,
            timestamp_us: self.timestamp_us,
            captured_len: self.captured_len,
            original_len: self.original_len,
            link_type: self.link_type,
            data: &self.data,
        }
    }

    /// Check if the packet was truncated during capture.
    pub fn is_truncated(&self) -> bool {
        self.captured_len < self.original_len
    }
}

/// A captured record borrowed from the reader's buffer.
///
/// Only valid for the duration of a `process_packets` callback.
#[derive(Debug, Clone, Copy)]
pub struct PacketRef<'a> {
    pub frame_number: u64,
    pub timestamp_us: i64,
    pub captured_len: u32,
    pub original_len: u32,
    pub link_type: u16,
    pub data: &'a [u8],
}

impl PacketRef<'_> {
    /// Per-frame header carried into the packet model.
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            timestamp_us: self.timestamp_us,
            captured_len: self.captured_len,
            original_len: self.original_len,
        }
    }

    pub fn to_raw(&self) -> RawPacket {
        RawPacket {
            frame_number: self.frame_number,
            timestamp_us: self.timestamp_us,
            captured_len: self.captured_len,
            original_len: self.original_len,
            link_type: self.link_type,
            data: Bytes::copy_from_slice(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Header mirrors the record metadata
    #[test]
    fn test_header() {
        let data = [0u8; 8];
        let packet = PacketRef {
            frame_number: 3,
            timestamp_us: 1_500_000,
            captured_len: 8,
            original_len: 60,
            link_type: 1,
            data: &data,
        };

        let header = packet.header();
        assert_eq!(header.timestamp_us, 1_500_000);
        assert_eq!(header.captured_len, 8);
        assert_eq!(header.original_len, 60);

        let raw = packet.to_raw();
        assert!(raw.is_truncated());
        assert_eq!(raw.as_packet_ref().data, &data);
    }
}
