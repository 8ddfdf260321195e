//! Fuzz target for TCP stream reassembly and stream framing.
//!
//! The input is split into segments, each prefixed by a one-byte flags
//! value and a sequence delta, and fed to a single connection.
//! Tests:
//! - Out-of-order and overlapping segments
//! - SIP, WebSocket and TLS stream parsers
//! - Buffer limits

#![no_main]

use libfuzzer_sys::fuzz_target;
use sipscope_core::packet::{Address, Frame, FrameHeader};
use sipscope_core::stream::{StreamManager, TcpFlags};
use std::net::{IpAddr, Ipv4Addr};

fuzz_target!(|data: &[u8]| {
    let mut manager = StreamManager::with_defaults();
    let client = Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 40000);
    let server = Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 5060);

    let mut seq: u32 = 1000;
    let mut rest = data;
    while let [flags, delta, len, tail @ ..] = rest {
        let take = (*len as usize).min(tail.len());
        let (payload, next) = tail.split_at(take);
        rest = next;

        let flags = TcpFlags::from_bits(u16::from(*flags));
        seq = seq.wrapping_add(u32::from(*delta)).wrapping_sub(128);

        let (src, dst) = if delta & 1 == 0 {
            (client, server)
        } else {
            (server, client)
        };
        let frame = Frame::new(FrameHeader::default(), payload.to_vec());
        let _ = manager.process_segment(src, dst, seq, flags, frame);
    }
    let _ = manager.stats();
});
