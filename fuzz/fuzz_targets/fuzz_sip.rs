//! Fuzz target for SIP and SDP parsing.
//!
//! Tests:
//! - Start line and header parsing
//! - Content-Length framing
//! - SDP media extraction
//! - Message attribute derivation

#![no_main]

use libfuzzer_sys::fuzz_target;
use sipscope_core::attribute::AttributeId;
use sipscope_core::call::Call;
use sipscope_core::config::RetransPolicy;
use sipscope_core::packet::{ip_proto, Packet};
use sipscope_core::sip::{self, SipMessage};
use std::net::{IpAddr, Ipv4Addr};

fuzz_target!(|data: &[u8]| {
    let _ = sip::detect(data);
    let _ = sip::message_length(data);
    let _ = sip::sdp::parse(data);

    let Ok(parsed) = sip::parse(data) else {
        return;
    };

    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let mut packet = Packet::new(4, ip_proto::UDP, ip, ip, 0);
    packet.set_transport_data(5060, 5060).set_payload(data);

    let msg = SipMessage::new(packet, parsed);
    let _ = msg.header();

    let mut call = Call::new(1, msg.clone());
    call.add_message(msg, RetransPolicy::Strict);
    for id in AttributeId::ALL {
        let _ = call.attribute(id);
    }
});
