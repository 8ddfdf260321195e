//! IPv4/IPv6 fragment reassembly.
//!
//! Fragments are grouped by (source, destination, identification,
//! protocol). A group completes once its fragments cover every byte up to
//! the length announced by the last fragment. Overlapping bytes count once.
//! Groups that never complete are evicted oldest first when the group limit
//! is reached.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

use tracing::{trace, warn};

use crate::packet::Frame;

/// Identifies the fragments of one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub id: u32,
    pub proto: u8,
}

/// A datagram stitched back together.
#[derive(Debug)]
pub struct Reassembled {
    /// One frame per fragment, in capture order.
    pub frames: Vec<Frame>,
    /// IP payload in offset order.
    pub payload: Vec<u8>,
    pub cap_len: u32,
    pub exp_len: u32,
}

#[derive(Debug, Default)]
struct FragmentGroup {
    /// (byte offset, frame) in capture order.
    fragments: Vec<(usize, Frame)>,
    /// Distinct payload bytes captured so far.
    cap_len: u32,
    /// End of the contiguous run of bytes starting at offset 0.
    contiguous: u32,
    /// Known once the last fragment (MF=0) arrived.
    exp_len: Option<u32>,
}

impl FragmentGroup {
    fn is_complete(&self) -> bool {
        self.exp_len.is_some_and(|exp| self.contiguous >= exp)
    }

    /// Recompute `cap_len` and `contiguous` from the fragment ranges.
    fn update_coverage(&mut self) {
        let mut ranges: Vec<(usize, usize)> = self
            .fragments
            .iter()
            .map(|(offset, frame)| (*offset, offset + frame.payload().len()))
            .collect();
        ranges.sort_unstable();

        let mut covered = 0;
        let mut reach = 0;
        let mut contiguous = true;
        for (start, end) in ranges {
            if start > reach {
                contiguous = false;
            }
            if contiguous {
                self.contiguous = end.max(reach) as u32;
            }
            covered += end.saturating_sub(start.max(reach));
            reach = reach.max(end);
        }
        self.cap_len = covered as u32;
    }

    fn stitch(self) -> Reassembled {
        let exp_len = self.exp_len.unwrap_or(self.cap_len);
        let mut payload = vec![0u8; exp_len as usize];

        let mut order: Vec<usize> = (0..self.fragments.len()).collect();
        order.sort_by_key(|&i| self.fragments[i].0);
        for i in order {
            let (offset, frame) = &self.fragments[i];
            let data = frame.payload();
            let end = (offset + data.len()).min(payload.len());
            if *offset < end {
                payload[*offset..end].copy_from_slice(&data[..end - offset]);
            }
        }

        Reassembled {
            frames: self.fragments.into_iter().map(|(_, frame)| frame).collect(),
            payload,
            cap_len: self.cap_len,
            exp_len,
        }
    }
}

/// Statistics for fragment reassembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FragmentStats {
    pub fragments: u64,
    pub reassembled: u64,
    pub duplicates: u64,
    pub evicted: u64,
    pub pending_groups: usize,
}

/// Collects fragments until their datagram is complete.
#[derive(Debug)]
pub struct FragmentReassembler {
    groups: HashMap<FragmentKey, FragmentGroup>,
    /// Group creation order, oldest first.
    order: VecDeque<FragmentKey>,
    max_groups: usize,
    stats: FragmentStats,
}

impl FragmentReassembler {
    pub fn new(max_groups: usize) -> Self {
        Self {
            groups: HashMap::new(),
            order: VecDeque::new(),
            max_groups: max_groups.max(1),
            stats: FragmentStats::default(),
        }
    }

    /// Add one fragment.
    ///
    /// `offset` is in bytes. `frame`'s payload range must cover exactly
    /// the fragment's IP payload. Returns the datagram once complete.
    pub fn add(
        &mut self,
        key: FragmentKey,
        offset: usize,
        more: bool,
        frame: Frame,
    ) -> Option<Reassembled> {
        self.stats.fragments += 1;

        if !self.groups.contains_key(&key) {
            if self.groups.len() >= self.max_groups {
                self.evict_oldest();
            }
            self.order.push_back(key);
        }
        let group = self.groups.entry(key).or_default();

        if group.fragments.iter().any(|(o, _)| *o == offset) {
            trace!(id = key.id, offset, "duplicate fragment");
            self.stats.duplicates += 1;
            return None;
        }

        let len = frame.payload().len() as u32;
        if !more {
            group.exp_len = Some(offset as u32 + len);
        }
        group.fragments.push((offset, frame));
        group.update_coverage();
        trace!(
            id = key.id,
            offset,
            len,
            cap_len = group.cap_len,
            exp_len = ?group.exp_len,
            "fragment"
        );

        if !group.is_complete() {
            return None;
        }

        let group = self.groups.remove(&key)?;
        self.order.retain(|k| *k != key);
        self.stats.reassembled += 1;
        Some(group.stitch())
    }

    fn evict_oldest(&mut self) {
        while let Some(oldest) = self.order.pop_front() {
            if let Some(group) = self.groups.remove(&oldest) {
                warn!(
                    id = oldest.id,
                    src = %oldest.src,
                    fragments = group.fragments.len(),
                    "fragment group limit reached, evicting oldest"
                );
                self.stats.evicted += 1;
                return;
            }
        }
    }

    pub fn stats(&self) -> FragmentStats {
        FragmentStats {
            pending_groups: self.groups.len(),
            ..self.stats
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FrameHeader;
    use std::net::Ipv4Addr;

    fn key(id: u32) -> FragmentKey {
        FragmentKey {
            src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            id,
            proto: 17,
        }
    }

    fn fragment(ts: i64, data: &[u8]) -> Frame {
        Frame::new(
            FrameHeader {
                timestamp_us: ts,
                ..Default::default()
            },
            data.to_vec(),
        )
    }

    // Test 1: In-order fragments
    #[test]
    fn test_in_order() {
        let mut reassembler = FragmentReassembler::new(16);
        assert!(reassembler.add(key(1), 0, true, fragment(1, b"abcdefgh")).is_none());
        let done = reassembler.add(key(1), 8, false, fragment(2, b"ijk")).unwrap();

        assert_eq!(done.payload, b"abcdefghijk");
        assert_eq!(done.frames.len(), 2);
        assert_eq!(done.cap_len, 11);
        assert_eq!(done.exp_len, 11);
        assert!(reassembler.is_empty());
    }

    // Test 2: Last fragment first; frames stay in capture order
    #[test]
    fn test_out_of_order() {
        let mut reassembler = FragmentReassembler::new(16);
        assert!(reassembler.add(key(1), 16, false, fragment(1, b"qr")).is_none());
        assert!(reassembler.add(key(1), 0, true, fragment(2, b"abcdefgh")).is_none());
        let done = reassembler.add(key(1), 8, true, fragment(3, b"ijklmnop")).unwrap();

        assert_eq!(done.payload, b"abcdefghijklmnopqr");
        let times: Vec<i64> = done.frames.iter().map(|f| f.header.timestamp_us).collect();
        assert_eq!(times, vec![1, 2, 3]);
    }

    // Test 3: Duplicate fragments are not counted twice
    #[test]
    fn test_duplicate() {
        let mut reassembler = FragmentReassembler::new(16);
        reassembler.add(key(1), 0, true, fragment(1, b"abcdefgh"));
        assert!(reassembler.add(key(1), 0, true, fragment(2, b"abcdefgh")).is_none());
        let done = reassembler.add(key(1), 8, false, fragment(3, b"i")).unwrap();

        assert_eq!(done.payload, b"abcdefghi");
        assert_eq!(reassembler.stats().duplicates, 1);
    }

    // Test 4: Interleaved datagrams do not mix
    #[test]
    fn test_interleaved_groups() {
        let mut reassembler = FragmentReassembler::new(16);
        reassembler.add(key(1), 0, true, fragment(1, b"11111111"));
        reassembler.add(key(2), 0, true, fragment(2, b"22222222"));
        let two = reassembler.add(key(2), 8, false, fragment(3, b"2")).unwrap();
        let one = reassembler.add(key(1), 8, false, fragment(4, b"1")).unwrap();

        assert_eq!(two.payload, b"222222222");
        assert_eq!(one.payload, b"111111111");
    }

    // Test 5: Oldest incomplete group is evicted at the limit
    #[test]
    fn test_eviction() {
        let mut reassembler = FragmentReassembler::new(2);
        reassembler.add(key(1), 0, true, fragment(1, b"aaaaaaaa"));
        reassembler.add(key(2), 0, true, fragment(2, b"bbbbbbbb"));
        reassembler.add(key(3), 0, true, fragment(3, b"cccccccc"));

        assert_eq!(reassembler.len(), 2);
        assert_eq!(reassembler.stats().evicted, 1);
        // Group 1 lost its first fragment and cannot complete
        assert!(reassembler.add(key(1), 8, false, fragment(4, b"a")).is_none());
        assert!(reassembler.add(key(3), 8, false, fragment(5, b"c")).is_some());
    }

    // Test 6: Overlapping fragments still complete the datagram
    #[test]
    fn test_overlapping_fragments() {
        let mut reassembler = FragmentReassembler::new(16);
        assert!(reassembler.add(key(1), 0, true, fragment(1, b"abcdefgh")).is_none());
        assert!(reassembler.add(key(1), 4, true, fragment(2, b"efghijkl")).is_none());
        let done = reassembler.add(key(1), 12, false, fragment(3, b"mn")).unwrap();

        assert_eq!(done.payload, b"abcdefghijklmn");
        assert_eq!(done.cap_len, 14);
        assert_eq!(done.exp_len, 14);
        assert_eq!(done.frames.len(), 3);
        assert!(reassembler.is_empty());
    }

    // Test 7: A hole keeps the group open even with enough bytes captured
    #[test]
    fn test_hole_not_complete() {
        let mut reassembler = FragmentReassembler::new(16);
        assert!(reassembler.add(key(1), 0, true, fragment(1, b"abcd")).is_none());
        assert!(reassembler.add(key(1), 8, true, fragment(2, b"ijklmnop")).is_none());
        assert!(reassembler.add(key(1), 12, false, fragment(3, b"mnop")).is_none());
        assert_eq!(reassembler.len(), 1);

        let done = reassembler.add(key(1), 4, true, fragment(4, b"efgh")).unwrap();
        assert_eq!(done.payload, b"abcdefghijklmnop");
    }
}
