//! End-to-end call scenarios through the pipeline.
//!
//! Each test builds Ethernet frames, feeds them to a [`Pipeline`] as
//! captured records and checks the calls that end up in storage.

use std::net::Ipv4Addr;
use std::sync::Arc;

use sipscope_core::attribute::AttributeId;
use sipscope_core::call::CallState;
use sipscope_core::config::{DissectorConfig, RetransPolicy, StorageConfig};
use sipscope_core::packet::PacketType;
use sipscope_core::pcap::PacketRef;
use sipscope_core::pipeline::Pipeline;
use sipscope_core::protocol::tcp_flags;
use sipscope_core::protocol::test_utils::{
    fragmented_udp_frames, tcp_frame, tcp_frame_with_flags, udp_frame,
};
use sipscope_core::storage::{CallQuery, Storage};

// ============================================================================
// Helpers
// ============================================================================

const ALICE: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 168, 1, 10), 5060);
const PBX: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 168, 1, 1), 5060);

const SECOND: i64 = 1_000_000;

/// A SIP message from alice's side of the dialog.
fn sip(start_line: &str, call_id: &str, cseq: &str, extra: &str, body: &str) -> Vec<u8> {
    format!(
        "{start_line}\r\n\
         Via: SIP/2.0/UDP 192.168.1.10:5060;branch=z9hG4bK-{cseq_num}\r\n\
         From: \"Alice\" <sip:alice@example.com>;tag=a1\r\n\
         To: <sip:bob@example.com>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: {cseq}\r\n\
         {extra}\
         Content-Length: {len}\r\n\r\n{body}",
        cseq_num = cseq.split(' ').next().unwrap_or("0"),
        len = body.len(),
    )
    .into_bytes()
}

fn invite(call_id: &str) -> Vec<u8> {
    sip("INVITE sip:bob@example.com SIP/2.0", call_id, "1 INVITE", "", "")
}

fn response(status: &str, call_id: &str, cseq: &str) -> Vec<u8> {
    sip(&format!("SIP/2.0 {status}"), call_id, cseq, "", "")
}

struct Replay {
    pipeline: Pipeline,
    storage: Arc<Storage>,
    frame_number: u64,
}

impl Replay {
    fn new(config: StorageConfig) -> Self {
        let storage = Arc::new(Storage::new(config).unwrap());
        Self {
            pipeline: Pipeline::new(DissectorConfig::default(), Arc::clone(&storage)),
            storage,
            frame_number: 0,
        }
    }

    /// Feed one Ethernet frame captured at `secs`.
    fn frame(&mut self, secs: i64, data: &[u8]) -> usize {
        self.frame_number += 1;
        let packet = PacketRef {
            frame_number: self.frame_number,
            timestamp_us: 1_700_000_000 * SECOND + secs * SECOND,
            captured_len: data.len() as u32,
            original_len: data.len() as u32,
            link_type: 1,
            data,
        };
        self.pipeline.process(&packet)
    }

    fn from_alice(&mut self, secs: i64, payload: &[u8]) -> usize {
        self.frame(secs, &udp_frame(ALICE, PBX, payload))
    }

    fn from_pbx(&mut self, secs: i64, payload: &[u8]) -> usize {
        self.frame(secs, &udp_frame(PBX, ALICE, payload))
    }

    fn attribute(&self, call_id: &str, id: AttributeId) -> Option<String> {
        self.storage.find(call_id)?.read().attribute(id)
    }
}

// ============================================================================
// Call state
// ============================================================================

#[test]
fn test_completed_call() {
    let mut replay = Replay::new(StorageConfig::default());
    let id = "completed@example.com";

    replay.from_alice(0, &invite(id));
    replay.from_pbx(0, &response("100 Trying", id, "1 INVITE"));
    replay.from_pbx(1, &response("180 Ringing", id, "1 INVITE"));
    replay.from_pbx(2, &response("200 OK", id, "1 INVITE"));
    replay.from_alice(2, &sip("ACK sip:bob@example.com SIP/2.0", id, "1 ACK", "", ""));
    replay.from_alice(65, &sip("BYE sip:bob@example.com SIP/2.0", id, "2 BYE", "", ""));
    replay.from_pbx(66, &response("200 OK", id, "2 BYE"));

    assert_eq!(replay.storage.count(), 1);
    let call = replay.storage.find(id).unwrap();
    let call = call.read();
    assert_eq!(call.state(), Some(CallState::Completed));
    assert_eq!(call.msg_count(), 7);

    assert_eq!(call.attribute(AttributeId::CallState).as_deref(), Some("COMPLETED"));
    assert_eq!(call.attribute(AttributeId::ConvDur).as_deref(), Some("1:03"));
    assert_eq!(call.attribute(AttributeId::TotalDur).as_deref(), Some("1:06"));
    assert_eq!(call.attribute(AttributeId::Transport).as_deref(), Some("UDP"));
    assert_eq!(
        call.attribute(AttributeId::SipFrom).as_deref(),
        Some("alice@example.com")
    );
    assert_eq!(call.attribute(AttributeId::Src).as_deref(), Some("192.168.1.10:5060"));
}

#[test]
fn test_retransmitted_invite_stays_in_setup() {
    let mut replay = Replay::new(StorageConfig::default());
    let id = "retrans@example.com";

    replay.from_alice(0, &invite(id));
    replay.from_alice(1, &invite(id));
    replay.from_alice(3, &invite(id));

    let call = replay.storage.find(id).unwrap();
    let call = call.read();
    assert_eq!(call.state(), Some(CallState::CallSetup));
    assert_eq!(call.msg_count(), 3);

    let flags: Vec<bool> = call.messages().iter().map(|m| m.is_retrans()).collect();
    assert_eq!(flags, vec![false, true, true]);
    assert_eq!(replay.storage.stats(&CallQuery::new()).retransmissions, 2);
}

#[test]
fn test_retransmitted_final_response_does_not_move_state() {
    let mut replay = Replay::new(StorageConfig::default());
    let id = "late-200@example.com";

    replay.from_alice(0, &invite(id));
    replay.from_pbx(1, &response("200 OK", id, "1 INVITE"));
    replay.from_alice(5, &sip("BYE sip:bob@example.com SIP/2.0", id, "2 BYE", "", ""));
    // 200 for the INVITE retransmitted after the call ended
    replay.from_pbx(6, &response("200 OK", id, "1 INVITE"));

    assert_eq!(
        replay.attribute(id, AttributeId::CallState).as_deref(),
        Some("COMPLETED")
    );
}

#[test]
fn test_rejected_busy_cancelled_diverted() {
    let mut replay = Replay::new(StorageConfig::default());

    replay.from_alice(0, &invite("busy@example.com"));
    replay.from_pbx(1, &response("486 Busy Here", "busy@example.com", "1 INVITE"));

    replay.from_alice(0, &invite("rejected@example.com"));
    replay.from_pbx(
        1,
        &response("403 Forbidden", "rejected@example.com", "1 INVITE"),
    );

    replay.from_alice(0, &invite("cancel@example.com"));
    replay.from_alice(
        2,
        &sip("CANCEL sip:bob@example.com SIP/2.0", "cancel@example.com", "1 CANCEL", "", ""),
    );

    replay.from_alice(0, &invite("moved@example.com"));
    replay.from_pbx(
        1,
        &response("302 Moved Temporarily", "moved@example.com", "1 INVITE"),
    );

    let state = |id: &str| replay.storage.find(id).unwrap().read().state();
    assert_eq!(state("busy@example.com"), Some(CallState::Busy));
    assert_eq!(state("rejected@example.com"), Some(CallState::Rejected));
    assert_eq!(state("cancel@example.com"), Some(CallState::Cancelled));
    assert_eq!(state("moved@example.com"), Some(CallState::Diverted));
}

#[test]
fn test_register_dialog_has_no_state() {
    let mut replay = Replay::new(StorageConfig::default());
    let id = "register@example.com";

    replay.from_alice(
        0,
        &sip("REGISTER sip:example.com SIP/2.0", id, "1 REGISTER", "", ""),
    );
    replay.from_pbx(0, &response("200 OK", id, "1 REGISTER"));

    assert_eq!(replay.attribute(id, AttributeId::CallState), None);
    assert_eq!(replay.attribute(id, AttributeId::Method).as_deref(), Some("REGISTER"));
}

// ============================================================================
// Capture filters
// ============================================================================

#[test]
fn test_invite_only_and_limit() {
    let mut replay = Replay::new(StorageConfig {
        invite_only: true,
        limit: 2,
        ..Default::default()
    });

    assert_eq!(
        replay.from_alice(0, &sip("OPTIONS sip:pbx SIP/2.0", "opt@x", "1 OPTIONS", "", "")),
        0
    );
    assert_eq!(replay.from_alice(0, &invite("one@x")), 1);
    assert_eq!(replay.from_alice(0, &invite("two@x")), 1);
    assert_eq!(replay.from_alice(0, &invite("three@x")), 0);

    // Messages of known calls are still accepted
    assert_eq!(replay.from_pbx(1, &response("180 Ringing", "one@x", "1 INVITE")), 1);
    assert_eq!(replay.storage.count(), 2);
}

#[test]
fn test_rotate_evicts_oldest() {
    let mut replay = Replay::new(StorageConfig {
        limit: 2,
        rotate: true,
        ..Default::default()
    });

    replay.from_alice(0, &invite("one@x"));
    replay.from_alice(1, &invite("two@x"));
    replay.from_alice(2, &invite("three@x"));

    assert!(replay.storage.find("one@x").is_none());
    let indexes: Vec<usize> = replay
        .storage
        .calls()
        .iter()
        .map(|call| call.read().index())
        .collect();
    assert_eq!(indexes, vec![2, 3]);
}

#[test]
fn test_match_expression() {
    let mut replay = Replay::new(StorageConfig {
        match_expr: Some("^INVITE sip:BOB@".into()),
        match_icase: true,
        ..Default::default()
    });

    assert_eq!(replay.from_alice(0, &invite("bob@x")), 1);
    assert_eq!(
        replay.from_alice(
            0,
            &sip("INVITE sip:carol@example.com SIP/2.0", "carol@x", "1 INVITE", "", "")
        ),
        0
    );
}

#[test]
fn test_strict_retransmission_needs_identical_payload() {
    let mut replay = Replay::new(StorageConfig {
        retransmission: RetransPolicy::Strict,
        ..Default::default()
    });
    let id = "strict@x";

    replay.from_alice(0, &invite(id));
    replay.from_alice(
        1,
        &sip("INVITE sip:bob@example.com SIP/2.0", id, "1 INVITE", "Subject: again\r\n", ""),
    );
    replay.from_alice(2, &invite(id));

    let call = replay.storage.find(id).unwrap();
    let flags: Vec<bool> = call.read().messages().iter().map(|m| m.is_retrans()).collect();
    assert_eq!(flags, vec![false, false, true]);
}

// ============================================================================
// Transports and reassembly
// ============================================================================

#[test]
fn test_sip_over_tcp_split_segments() {
    let mut replay = Replay::new(StorageConfig::default());
    let id = "tcp@example.com";
    let first = invite(id);
    let bye = sip("BYE sip:bob@example.com SIP/2.0", id, "2 BYE", "", "");

    let syn = tcp_frame_with_flags(ALICE, PBX, 999, tcp_flags::SYN as u8, b"");
    assert_eq!(replay.frame(0, &syn), 0);

    // INVITE split in two, the second segment also carries the BYE
    let (head, tail) = first.split_at(30);
    let mut tail = tail.to_vec();
    tail.extend_from_slice(&bye);
    assert_eq!(replay.frame(0, &tcp_frame(ALICE, PBX, 1000, head)), 0);
    assert_eq!(
        replay.frame(1, &tcp_frame(ALICE, PBX, 1000 + head.len() as u32, &tail)),
        2
    );

    let call = replay.storage.find(id).unwrap();
    let call = call.read();
    assert_eq!(call.msg_count(), 2);
    assert_eq!(call.first_message().packet().kind(), Some(PacketType::SipTcp));
    assert_eq!(call.first_message().packet().frames().len(), 2);
    assert_eq!(call.attribute(AttributeId::Transport).as_deref(), Some("TCP"));
}

#[test]
fn test_fragmented_invite_with_sdp() {
    let mut replay = Replay::new(StorageConfig::default());
    let id = "frag@example.com";
    let sdp = "v=0\r\n\
               o=alice 1 1 IN IP4 192.168.1.10\r\n\
               s=-\r\n\
               c=IN IP4 192.168.1.10\r\n\
               t=0 0\r\n\
               m=audio 49170 RTP/AVP 8 0 101\r\n\
               a=rtpmap:101 telephone-event/8000\r\n";
    let payload = sip(
        "INVITE sip:bob@example.com SIP/2.0",
        id,
        "1 INVITE",
        "Content-Type: application/sdp\r\n",
        sdp,
    );

    let frames = fragmented_udp_frames(ALICE, PBX, 77, &payload, 128);
    assert!(frames.len() > 2);
    let (last, rest) = frames.split_last().unwrap();
    for frame in rest {
        assert_eq!(replay.frame(0, frame), 0);
    }
    assert_eq!(replay.frame(0, last), 1);

    let call = replay.storage.find(id).unwrap();
    let call = call.read();
    let msg = call.first_message();
    assert_eq!(msg.packet().frames().len(), frames.len());
    assert_eq!(msg.medias().len(), 1);
    assert_eq!(msg.medias()[0].port, 49170);
    assert_eq!(msg.preferred_codec_alias(), Some("g711a"));
}

#[test]
fn test_rtp_is_not_correlated() {
    let mut replay = Replay::new(StorageConfig::default());
    let mut rtp = vec![0x80, 0x08, 0x00, 0x01];
    rtp.extend_from_slice(&[0u8; 168]);

    let rtp_frame = udp_frame((ALICE.0, 49170), (PBX.0, 30000), &rtp);
    assert_eq!(replay.frame(0, &rtp_frame), 0);

    assert_eq!(replay.storage.count(), 0);
    assert_eq!(replay.pipeline.stats().media, 1);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_related_calls_by_x_call_id() {
    let mut replay = Replay::new(StorageConfig::default());

    replay.from_alice(0, &invite("leg-a@example.com"));
    replay.from_pbx(
        0,
        &sip(
            "INVITE sip:bob@example.com SIP/2.0",
            "leg-b@example.com",
            "1 INVITE",
            "X-Call-ID: leg-a@example.com\r\n",
            "",
        ),
    );
    replay.from_alice(1, &invite("unrelated@example.com"));

    let a = replay.storage.find("leg-a@example.com").unwrap().read().index();
    let b = replay.storage.find("leg-b@example.com").unwrap().read().index();

    let ids = |index: usize| -> Vec<String> {
        replay
            .storage
            .related(index)
            .iter()
            .map(|call| call.read().call_id().to_string())
            .collect()
    };
    assert_eq!(ids(a), vec!["leg-b@example.com"]);
    assert_eq!(ids(b), vec!["leg-a@example.com"]);
    assert_eq!(
        replay.attribute("leg-b@example.com", AttributeId::XCallId).as_deref(),
        Some("leg-a@example.com")
    );
}

#[test]
fn test_query_filter_and_sort() {
    let mut replay = Replay::new(StorageConfig::default());

    replay.from_alice(0, &invite("short@x"));
    replay.from_alice(0, &invite("long@x"));
    replay.from_pbx(1, &response("180 Ringing", "long@x", "1 INVITE"));
    replay.from_pbx(2, &response("486 Busy Here", "long@x", "1 INVITE"));
    replay.from_alice(
        0,
        &sip("OPTIONS sip:pbx SIP/2.0", "ping@x", "1 OPTIONS", "", ""),
    );

    let query = CallQuery::new()
        .filter(AttributeId::Method, "^invite$")
        .unwrap()
        .sort_by(AttributeId::MsgCnt, true);
    let ids: Vec<String> = replay
        .storage
        .query(&query)
        .iter()
        .map(|call| call.read().call_id().to_string())
        .collect();
    assert_eq!(ids, vec!["long@x", "short@x"]);

    let stats = replay.storage.stats(&query);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.displayed, 2);
}
