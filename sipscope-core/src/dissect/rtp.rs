//! RTP and RTCP recognition.
//!
//! Only the fixed header is checked; media streams are classified, never
//! decoded or correlated.

use crate::packet::PacketType;

/// Fixed RTP header length.
pub const RTP_HEADER_LEN: usize = 12;

/// RTCP packet types: SR, RR, SDES, BYE, APP.
const RTCP_TYPES: std::ops::RangeInclusive<u8> = 200..=204;

/// Classify a UDP payload as RTP or RTCP.
pub fn classify(payload: &[u8]) -> Option<PacketType> {
    if payload.len() < RTP_HEADER_LEN {
        return None;
    }
    // Version 2 in the top two bits
    if payload[0] >> 6 != 2 {
        return None;
    }

    if RTCP_TYPES.contains(&payload[1]) {
        return Some(PacketType::Rtcp);
    }

    let payload_type = payload[1] & 0x7F;
    match payload_type {
        0..=34 | 96..=127 => Some(PacketType::Rtp),
        _ => None,
    }
}
