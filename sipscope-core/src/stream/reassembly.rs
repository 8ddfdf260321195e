use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::packet::Frame;

use super::Direction;

/// A frame whose payload sits in the reassembled buffer.
#[derive(Debug, Clone)]
struct Contributor {
    start_seq: u32,
    end_seq: u32,
    frame: Frame,
}

/// Buffer for one direction of a TCP stream.
///
/// Every byte of the reassembled data remembers the frame it came from, so a
/// message cut from the stream can be attributed to the frames carrying it.
#[derive(Debug)]
pub struct StreamBuffer {
    /// Next expected sequence number.
    expected_seq: u32,
    /// Initial sequence number (from SYN or the first segment seen).
    initial_seq: Option<u32>,
    /// Sequence number of the first byte in `reassembled`.
    base_seq: u32,
    /// Out-of-order frames keyed by payload offset from `initial_seq`, so
    /// iteration follows sequence order across a wrap.
    pending: BTreeMap<u32, Frame>,
    pending_bytes: usize,
    /// Contiguous reassembled data ready for parsing.
    reassembled: Vec<u8>,
    contributors: VecDeque<Contributor>,
    pub segment_count: u32,
    pub retransmit_count: u32,
    pub out_of_order_count: u32,
    pub fin_received: bool,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self {
            expected_seq: 0,
            initial_seq: None,
            base_seq: 0,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            reassembled: Vec::new(),
            contributors: VecDeque::new(),
            segment_count: 0,
            retransmit_count: 0,
            out_of_order_count: 0,
            fin_received: false,
        }
    }

    /// Set the initial sequence number (from SYN).
    pub fn set_initial_seq(&mut self, seq: u32) {
        self.initial_seq = Some(seq);
        // SYN consumes one seq
        self.expected_seq = seq.wrapping_add(1);
        self.base_seq = self.expected_seq;
    }

    /// Add a segment whose payload is `frame.payload()`, starting at `seq`.
    ///
    /// Segments wholly before the expected sequence number are retransmissions
    /// and dropped. Partial overlaps are trimmed to their new bytes.
    pub fn add_segment(&mut self, seq: u32, mut frame: Frame) {
        let len = frame.payload().len();
        if len == 0 {
            return;
        }
        self.segment_count += 1;

        if self.initial_seq.is_none() {
            self.initial_seq = Some(seq);
            self.expected_seq = seq;
            self.base_seq = seq;
        }

        let mut seq = seq;
        if seq_lt(seq, self.expected_seq) {
            if seq_le(seq_add(seq, len), self.expected_seq) {
                self.retransmit_count += 1;
                return;
            }
            let overlap = self.expected_seq.wrapping_sub(seq) as usize;
            frame.skip_payload(overlap);
            seq = self.expected_seq;
        }

        if seq == self.expected_seq {
            self.append(seq, frame);
            self.flush_pending();
        } else if self.pending.contains_key(&self.offset(seq)) {
            self.retransmit_count += 1;
        } else {
            self.out_of_order_count += 1;
            self.pending_bytes += frame.payload().len();
            self.pending.insert(self.offset(seq), frame);
        }
    }

    fn offset(&self, seq: u32) -> u32 {
        seq.wrapping_sub(self.initial_seq.unwrap_or(seq))
    }

    fn append(&mut self, seq: u32, frame: Frame) {
        let len = frame.payload().len();
        self.reassembled.extend_from_slice(frame.payload());
        self.expected_seq = seq_add(seq, len);
        self.contributors.push_back(Contributor {
            start_seq: seq,
            end_seq: self.expected_seq,
            frame,
        });
    }

    /// Move pending frames that are now in order into the buffer.
    fn flush_pending(&mut self) {
        while let Some((offset, mut frame)) = self.pending.pop_first() {
            let seq = self.initial_seq.unwrap_or(0).wrapping_add(offset);
            self.pending_bytes -= frame.payload().len();
            if seq == self.expected_seq {
                self.append(seq, frame);
            } else if seq_lt(seq, self.expected_seq) {
                let end = seq_add(seq, frame.payload().len());
                if seq_lt(self.expected_seq, end) {
                    frame.skip_payload(self.expected_seq.wrapping_sub(seq) as usize);
                    let expected = self.expected_seq;
                    self.append(expected, frame);
                } else {
                    self.retransmit_count += 1;
                }
            } else {
                // Gap - can't continue
                self.pending_bytes += frame.payload().len();
                self.pending.insert(offset, frame);
                break;
            }
        }
    }

    /// Get contiguous reassembled data.
    pub fn get_contiguous(&self) -> &[u8] {
        &self.reassembled
    }

    /// Consume bytes from the front of the reassembled buffer.
    ///
    /// Returns the frames that carried any of the consumed bytes, oldest
    /// first. A frame straddling the cut is returned and also kept for the
    /// bytes that remain.
    pub fn consume(&mut self, bytes: usize) -> Vec<Frame> {
        let bytes = bytes.min(self.reassembled.len());
        if bytes == 0 {
            return Vec::new();
        }
        let cut = seq_add(self.base_seq, bytes);

        let frames = self
            .contributors
            .iter()
            .take_while(|c| seq_lt(c.start_seq, cut))
            .map(|c| c.frame.clone())
            .collect();

        while self
            .contributors
            .front()
            .is_some_and(|c| seq_le(c.end_seq, cut))
        {
            self.contributors.pop_front();
        }

        self.reassembled.drain(..bytes);
        self.base_seq = cut;
        frames
    }

    /// Bytes held in memory, reassembled or waiting for a gap to fill.
    pub fn buffered_bytes(&self) -> usize {
        self.reassembled.len() + self.pending_bytes
    }

    /// Check if stream is complete (FIN received, nothing pending).
    pub fn is_complete(&self) -> bool {
        self.fin_received && self.pending.is_empty()
    }

    pub fn available(&self) -> usize {
        self.reassembled.len()
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Key for stream buffer lookup.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct StreamKey {
    pub connection_id: u64,
    pub direction: Direction,
}

/// TCP stream reassembler.
pub struct TcpReassembler {
    streams: HashMap<StreamKey, StreamBuffer>,
}

impl TcpReassembler {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
        }
    }

    pub fn get_or_create(&mut self, connection_id: u64, direction: Direction) -> &mut StreamBuffer {
        let key = StreamKey {
            connection_id,
            direction,
        };
        self.streams.entry(key).or_default()
    }

    pub fn get(&self, connection_id: u64, direction: Direction) -> Option<&StreamBuffer> {
        self.streams.get(&StreamKey {
            connection_id,
            direction,
        })
    }

    /// Add a segment to the appropriate stream.
    pub fn add_segment(&mut self, connection_id: u64, direction: Direction, seq: u32, frame: Frame) {
        if frame.payload().is_empty() {
            return;
        }
        self.get_or_create(connection_id, direction)
            .add_segment(seq, frame);
    }

    pub fn get_contiguous(&self, connection_id: u64, direction: Direction) -> &[u8] {
        self.get(connection_id, direction)
            .map(|b| b.get_contiguous())
            .unwrap_or(&[])
    }

    /// Consume bytes from a stream, returning the frames that carried them.
    pub fn consume(&mut self, connection_id: u64, direction: Direction, bytes: usize) -> Vec<Frame> {
        let key = StreamKey {
            connection_id,
            direction,
        };
        self.streams
            .get_mut(&key)
            .map(|buffer| buffer.consume(bytes))
            .unwrap_or_default()
    }

    pub fn mark_fin(&mut self, connection_id: u64, direction: Direction) {
        self.get_or_create(connection_id, direction).fin_received = true;
    }

    pub fn is_complete(&self, connection_id: u64, direction: Direction) -> bool {
        self.get(connection_id, direction)
            .map(|b| b.is_complete())
            .unwrap_or(false)
    }

    /// Drop everything buffered for one direction.
    pub fn reset(&mut self, connection_id: u64, direction: Direction) {
        self.streams.remove(&StreamKey {
            connection_id,
            direction,
        });
    }

    /// Remove both directions (connection closed).
    pub fn remove(&mut self, connection_id: u64) {
        self.streams.retain(|k, _| k.connection_id != connection_id);
    }

    pub fn stats(&self, connection_id: u64, direction: Direction) -> Option<StreamStats> {
        self.get(connection_id, direction).map(|b| StreamStats {
            segment_count: b.segment_count,
            retransmit_count: b.retransmit_count,
            out_of_order_count: b.out_of_order_count,
            bytes_available: b.available(),
            bytes_buffered: b.buffered_bytes(),
        })
    }
}

impl Default for TcpReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream statistics.
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub segment_count: u32,
    pub retransmit_count: u32,
    pub out_of_order_count: u32,
    pub bytes_available: usize,
    pub bytes_buffered: usize,
}

// Sequence number comparison helpers
fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

fn seq_add(a: u32, n: usize) -> u32 {
    a.wrapping_add(n as u32)
}
