//! Call storage and index.
//!
//! [`Storage`] is the single place calls live. The pipeline thread is the
//! only writer; any number of readers may take snapshots concurrently.
//!
//! ## Locking
//!
//! The index (Call-ID map, X-Call-ID links, creation order) sits behind one
//! `RwLock`. Each call has its own `RwLock`. The index lock is never held
//! while waiting for a call lock, so readers holding a call may still query
//! the index.
//!
//! ## Capture filters
//!
//! New calls pass through [`Storage::check_packet`] filters in order:
//! 1. `invite_only`: the first message must be an INVITE
//! 2. `match_expr`: the first message payload must match (or not, with
//!    `match_invert`)
//! 3. `limit`: a full storage drops the new call, or evicts the oldest one
//!    with `rotate`
//!
//! Messages of calls already stored are always accepted.

mod query;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::bytes::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::attribute::AttributeId;
use crate::call::Call;
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::packet::Packet;
use crate::sip::{Method, ParsedSip, SipMessage};

pub use query::CallQuery;

/// Shared handle to a stored call.
pub type CallRef = Arc<RwLock<Call>>;

/// Where a message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stored {
    /// Index of the call the message was added to.
    pub call_index: usize,
    /// The message created the call.
    pub new_call: bool,
    /// The message was detected as a retransmission.
    pub retrans: bool,
}

/// Storage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Calls currently stored.
    pub total: usize,
    /// Calls matching the query passed to [`Storage::stats`].
    pub displayed: usize,
    /// Messages stored since creation.
    pub messages: u64,
    pub retransmissions: u64,
    /// New calls dropped by capture filters or the limit.
    pub rejected: u64,
    /// Calls evicted by rotation.
    pub evicted: u64,
}

struct Entry {
    call: CallRef,
    call_id: String,
    /// X-Call-IDs this call refers to.
    xcall_ids: Vec<String>,
}

#[derive(Default)]
struct CallIndex {
    calls: BTreeMap<usize, Entry>,
    by_call_id: HashMap<String, usize>,
    /// Referenced Call-ID -> calls referring to it.
    xrefs: HashMap<String, Vec<usize>>,
    last_index: usize,
}

impl CallIndex {
    fn insert(&mut self, index: usize, call_id: String, call: Call) {
        self.by_call_id.insert(call_id.clone(), index);
        self.calls.insert(
            index,
            Entry {
                call: Arc::new(RwLock::new(call)),
                call_id,
                xcall_ids: Vec::new(),
            },
        );
    }

    fn lookup(&self, call_id: &str) -> Option<(usize, CallRef)> {
        let &i = self.by_call_id.get(call_id)?;
        self.calls.get(&i).map(|entry| (i, Arc::clone(&entry.call)))
    }

    fn link(&mut self, index: usize, xcall_id: String) {
        let Some(entry) = self.calls.get_mut(&index) else {
            return;
        };
        if entry.xcall_ids.contains(&xcall_id) || entry.call_id == xcall_id {
            return;
        }
        entry.xcall_ids.push(xcall_id.clone());
        self.xrefs.entry(xcall_id).or_default().push(index);
    }

    fn remove(&mut self, index: usize) -> Option<CallRef> {
        let entry = self.calls.remove(&index)?;
        self.by_call_id.remove(&entry.call_id);
        for xcall_id in &entry.xcall_ids {
            if let Some(referrers) = self.xrefs.get_mut(xcall_id) {
                referrers.retain(|&i| i != index);
                if referrers.is_empty() {
                    self.xrefs.remove(xcall_id);
                }
            }
        }
        Some(entry.call)
    }
}

/// The live collection of calls.
pub struct Storage {
    config: StorageConfig,
    matcher: Option<Regex>,
    index: RwLock<CallIndex>,
    changed: AtomicBool,
    messages: AtomicU64,
    retransmissions: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
}

impl Storage {
    /// Create a storage, compiling the configured match expression.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let matcher = config
            .match_expr
            .as_deref()
            .map(|expr| {
                RegexBuilder::new(expr)
                    .case_insensitive(config.match_icase)
                    .build()
            })
            .transpose()?;

        Ok(Self {
            config,
            matcher,
            index: RwLock::new(CallIndex::default()),
            changed: AtomicBool::new(false),
            messages: AtomicU64::new(0),
            retransmissions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Store a parsed SIP message.
    ///
    /// Returns `None` when the message would start a new call that the
    /// capture filters reject.
    ///
    /// Meant for a single writer (the pipeline). Concurrent writers still
    /// never create two calls for one Call-ID, but capture filters may then
    /// judge a message that a racing writer already made part of a call.
    pub fn check_packet(&self, packet: Packet, sip: ParsedSip) -> Option<Stored> {
        let existing = {
            let index = self.index.read();
            index.lookup(&sip.call_id)
        };

        let stored = match existing {
            Some((call_index, call)) => {
                self.append(call_index, &call, self.new_message(packet, sip))
            }
            None => self.create_call(packet, sip)?,
        };

        self.messages.fetch_add(1, Ordering::Relaxed);
        if stored.retrans {
            self.retransmissions.fetch_add(1, Ordering::Relaxed);
        }
        self.changed.store(true, Ordering::Release);
        Some(stored)
    }

    fn create_call(&self, packet: Packet, sip: ParsedSip) -> Option<Stored> {
        if self.config.invite_only && sip.method() != Some(Method::Invite) {
            debug!(call_id = %sip.call_id, "not an INVITE dialog, skipped");
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if let Some(matcher) = &self.matcher {
            if matcher.is_match(&packet.payload()) == self.config.match_invert {
                debug!(call_id = %sip.call_id, "match expression filtered call");
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        let msg = self.new_message(packet, sip);
        let call_id = msg.call_id().to_string();
        let xcall_id = msg.xcall_id().map(str::to_owned);

        let mut index = self.index.write();
        if let Some((call_index, call)) = index.lookup(&call_id) {
            // Created by another writer since the first lookup
            drop(index);
            return Some(self.append(call_index, &call, msg));
        }
        if self.config.limit > 0 && index.calls.len() >= self.config.limit {
            if !self.config.rotate {
                debug!(%call_id, limit = self.config.limit, "call limit reached");
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            if let Some(oldest) = index.calls.keys().next().copied() {
                index.remove(oldest);
                self.evicted.fetch_add(1, Ordering::Relaxed);
                warn!(evicted = oldest, limit = self.config.limit, "call limit reached, rotating");
            }
        }

        index.last_index += 1;
        let call_index = index.last_index;
        index.insert(call_index, call_id, Call::new(call_index, msg));
        if let Some(xcall_id) = xcall_id {
            index.link(call_index, xcall_id);
        }

        Some(Stored {
            call_index,
            new_call: true,
            retrans: false,
        })
    }

    fn append(&self, call_index: usize, call: &CallRef, msg: SipMessage) -> Stored {
        let xcall_id = msg.xcall_id().map(str::to_owned);
        let retrans = call.write().add_message(msg, self.config.retransmission);
        if let Some(xcall_id) = xcall_id {
            self.index.write().link(call_index, xcall_id);
        }
        Stored {
            call_index,
            new_call: false,
            retrans,
        }
    }

    fn new_message(&self, packet: Packet, sip: ParsedSip) -> SipMessage {
        let mut msg = SipMessage::new(packet, sip);
        if !self.config.keep_frames {
            msg.release_frames();
        }
        msg
    }

    /// Snapshot of all calls in creation order.
    pub fn calls(&self) -> Vec<CallRef> {
        self.index
            .read()
            .calls
            .values()
            .map(|entry| Arc::clone(&entry.call))
            .collect()
    }

    /// Call by its 1-based index.
    pub fn call(&self, index: usize) -> Option<CallRef> {
        self.index
            .read()
            .calls
            .get(&index)
            .map(|entry| Arc::clone(&entry.call))
    }

    pub fn find(&self, call_id: &str) -> Option<CallRef> {
        self.index.read().lookup(call_id).map(|(_, call)| call)
    }

    /// Calls linked to `index` through X-Call-ID, in either direction.
    pub fn related(&self, index: usize) -> Vec<CallRef> {
        let calls = self.index.read();
        let Some(entry) = calls.calls.get(&index) else {
            return Vec::new();
        };

        let mut related = BTreeSet::new();
        for xcall_id in &entry.xcall_ids {
            if let Some(&i) = calls.by_call_id.get(xcall_id) {
                related.insert(i);
            }
        }
        if let Some(referrers) = calls.xrefs.get(&entry.call_id) {
            related.extend(referrers.iter().copied());
        }
        related.remove(&index);

        related
            .into_iter()
            .filter_map(|i| calls.calls.get(&i))
            .map(|entry| Arc::clone(&entry.call))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.index.read().calls.len()
    }

    pub fn stats(&self, query: &CallQuery) -> StorageStats {
        let total = self.count();
        let displayed = if query.filters().is_empty() {
            total
        } else {
            self.query(query).len()
        };
        StorageStats {
            total,
            displayed,
            messages: self.messages.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Remove a call. Related calls are kept.
    pub fn remove(&self, index: usize) -> Option<CallRef> {
        let removed = self.index.write().remove(index);
        if removed.is_some() {
            self.changed.store(true, Ordering::Release);
        }
        removed
    }

    /// Drop every call and restart numbering.
    pub fn clear(&self) {
        *self.index.write() = CallIndex::default();
        self.changed.store(true, Ordering::Release);
    }

    /// Whether anything changed since the last call. Resets the flag.
    pub fn has_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Filtered and sorted snapshot.
    pub fn query(&self, query: &CallQuery) -> Vec<CallRef> {
        let mut rows: Vec<(CallRef, SortKey)> = self
            .calls()
            .into_iter()
            .filter_map(|call| {
                let key = {
                    let guard = call.read();
                    if !query.matches(&guard) {
                        return None;
                    }
                    query
                        .sort()
                        .map(|(id, _)| SortKey::of(&guard, id))
                        .unwrap_or(SortKey::Number(guard.index()))
                };
                Some((call, key))
            })
            .collect();

        if let Some((_, descending)) = query.sort() {
            rows.sort_by(|(_, a), (_, b)| {
                let ordering = a.cmp(b);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        rows.into_iter().map(|(call, _)| call).collect()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            config: StorageConfig::default(),
            matcher: None,
            index: RwLock::new(CallIndex::default()),
            changed: AtomicBool::new(false),
            messages: AtomicU64::new(0),
            retransmissions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }
}

/// Sort key computed once per call, so sorting never re-locks calls.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Number(usize),
    Text(Option<String>),
}

impl SortKey {
    fn of(call: &Call, id: AttributeId) -> Self {
        match id {
            AttributeId::CallIndex => SortKey::Number(call.index()),
            AttributeId::MsgCnt => SortKey::Number(call.msg_count()),
            _ => SortKey::Text(call.attribute(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallState;
    use crate::config::RetransPolicy;
    use crate::packet::{ip_proto, FrameHeader, PacketType};
    use crate::sip::parse;
    use std::net::{IpAddr, Ipv4Addr};

    fn sip(first_line: &str, call_id: &str, cseq: &str, extra: &str) -> String {
        format!(
            "{first_line}\r\nCall-ID: {call_id}\r\nFrom: <sip:alice@atlanta.com>;tag=1\r\n\
             To: <sip:bob@biloxi.com>\r\nCSeq: {cseq}\r\n{extra}Content-Length: 0\r\n\r\n"
        )
    }

    fn store(storage: &Storage, text: &str, ts: i64) -> Option<Stored> {
        let mut packet = Packet::new(
            4,
            ip_proto::UDP,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            0,
        );
        packet.set_transport_data(5060, 5060).set_kind(PacketType::SipUdp);
        packet.add_frame(
            FrameHeader {
                timestamp_us: ts,
                ..Default::default()
            },
            text.as_bytes(),
        );
        let parsed = parse(text.as_bytes()).unwrap();
        storage.check_packet(packet, parsed)
    }

    fn invite(call_id: &str) -> String {
        sip("INVITE sip:bob@biloxi.com SIP/2.0", call_id, "1 INVITE", "")
    }

    // Test 1: Messages group by Call-ID
    #[test]
    fn test_groups_by_call_id() {
        let storage = Storage::default();
        let first = store(&storage, &invite("a"), 0).unwrap();
        let second = store(&storage, &invite("b"), 1).unwrap();
        let ok = store(&storage, &sip("SIP/2.0 200 OK", "a", "1 INVITE", ""), 2).unwrap();

        assert!(first.new_call && second.new_call);
        assert!(!ok.new_call);
        assert_eq!(ok.call_index, first.call_index);
        assert_eq!(storage.count(), 2);

        let call = storage.find("a").unwrap();
        assert_eq!(call.read().msg_count(), 2);
        assert_eq!(call.read().state(), Some(CallState::InCall));
        assert!(storage.has_changed());
        assert!(!storage.has_changed());
    }

    // Test 2: Retransmission is counted but creates no call
    #[test]
    fn test_retransmission_counted() {
        let storage = Storage::default();
        store(&storage, &invite("a"), 0);
        let again = store(&storage, &invite("a"), 500_000).unwrap();

        assert!(again.retrans);
        let stats = storage.stats(&CallQuery::new());
        assert_eq!(stats.total, 1);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.retransmissions, 1);
    }

    // Test 3: invite_only and match filters apply to new calls only
    #[test]
    fn test_capture_filters() {
        let storage = Storage::new(StorageConfig {
            invite_only: true,
            match_expr: Some("x-tenant: blue".to_string()),
            match_icase: true,
            ..Default::default()
        })
        .unwrap();

        let register = sip("REGISTER sip:biloxi.com SIP/2.0", "r", "1 REGISTER", "");
        assert!(store(&storage, &register, 0).is_none());

        let red = sip("INVITE sip:bob@biloxi.com SIP/2.0", "red", "1 INVITE", "X-Tenant: red\r\n");
        assert!(store(&storage, &red, 1).is_none());

        let blue = sip("INVITE sip:bob@biloxi.com SIP/2.0", "blue", "1 INVITE", "X-Tenant: BLUE\r\n");
        assert!(store(&storage, &blue, 2).is_some());

        // Follow-ups never go through the filters
        let ack = sip("ACK sip:bob@biloxi.com SIP/2.0", "blue", "1 ACK", "");
        assert!(store(&storage, &ack, 3).is_some());

        assert_eq!(storage.count(), 1);
        assert_eq!(storage.stats(&CallQuery::new()).rejected, 2);
    }

    // Test 4: Inverted match
    #[test]
    fn test_match_invert() {
        let storage = Storage::new(StorageConfig {
            match_expr: Some("OPTIONS".to_string()),
            match_invert: true,
            ..Default::default()
        })
        .unwrap();

        let options = sip("OPTIONS sip:biloxi.com SIP/2.0", "o", "1 OPTIONS", "");
        assert!(store(&storage, &options, 0).is_none());
        assert!(store(&storage, &invite("i"), 1).is_some());
    }

    // Test 5: Limit without and with rotation
    #[test]
    fn test_limit_and_rotate() {
        let strict = Storage::new(StorageConfig {
            limit: 2,
            ..Default::default()
        })
        .unwrap();
        for id in ["a", "b", "c"] {
            store(&strict, &invite(id), 0);
        }
        assert_eq!(strict.count(), 2);
        assert!(strict.find("c").is_none());

        let rotating = Storage::new(StorageConfig {
            limit: 2,
            rotate: true,
            ..Default::default()
        })
        .unwrap();
        for id in ["a", "b", "c"] {
            store(&rotating, &invite(id), 0);
        }
        assert_eq!(rotating.count(), 2);
        assert!(rotating.find("a").is_none());
        let indices: Vec<usize> = rotating.calls().iter().map(|c| c.read().index()).collect();
        assert_eq!(indices, vec![2, 3]);
        assert_eq!(rotating.stats(&CallQuery::new()).evicted, 1);
    }

    // Test 6: X-Call-ID links resolve both ways
    #[test]
    fn test_related_calls() {
        let storage = Storage::default();
        let a_leg = store(&storage, &invite("leg-a"), 0).unwrap();
        let b_leg = store(
            &storage,
            &sip("INVITE sip:carol@chicago.com SIP/2.0", "leg-b", "1 INVITE", "X-Call-ID: leg-a\r\n"),
            1,
        )
        .unwrap();
        store(&storage, &invite("unrelated"), 2);

        let from_a: Vec<String> = storage
            .related(a_leg.call_index)
            .iter()
            .map(|c| c.read().call_id().to_string())
            .collect();
        let from_b: Vec<String> = storage
            .related(b_leg.call_index)
            .iter()
            .map(|c| c.read().call_id().to_string())
            .collect();
        assert_eq!(from_a, vec!["leg-b"]);
        assert_eq!(from_b, vec!["leg-a"]);

        // Removing one leg leaves the other in place
        storage.remove(a_leg.call_index);
        assert!(storage.find("leg-b").is_some());
        assert!(storage.related(b_leg.call_index).is_empty());
    }

    // Test 7: Query filters and numeric sort
    #[test]
    fn test_query() {
        let storage = Storage::default();
        store(&storage, &invite("a"), 0);
        store(&storage, &invite("b"), 0);
        for cseq in 2..12 {
            let info = sip("INFO sip:bob@biloxi.com SIP/2.0", "b", &format!("{cseq} INFO"), "");
            store(&storage, &info, 1);
        }
        store(
            &storage,
            &sip("OPTIONS sip:biloxi.com SIP/2.0", "c", "1 OPTIONS", ""),
            0,
        );

        let by_count = storage.query(&CallQuery::new().sort_by(AttributeId::MsgCnt, true));
        let ids: Vec<String> = by_count.iter().map(|c| c.read().call_id().to_string()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let invites = CallQuery::new().filter(AttributeId::Method, "^invite$").unwrap();
        assert_eq!(storage.query(&invites).len(), 2);
        assert_eq!(storage.stats(&invites).displayed, 2);
        assert_eq!(storage.stats(&invites).total, 3);

        // Calls without a value never match a filter
        let states = CallQuery::new().filter(AttributeId::CallState, ".*").unwrap();
        assert_eq!(storage.query(&states).len(), 2);
    }

    // Test 8: Clearing restarts numbering
    #[test]
    fn test_clear() {
        let storage = Storage::default();
        store(&storage, &invite("a"), 0);
        storage.clear();
        assert_eq!(storage.count(), 0);
        assert_eq!(store(&storage, &invite("a"), 0).unwrap().call_index, 1);
    }

    // Test 9: Frames are released when not kept
    #[test]
    fn test_keep_frames_disabled() {
        let storage = Storage::new(StorageConfig {
            keep_frames: false,
            retransmission: RetransPolicy::Strict,
            ..Default::default()
        })
        .unwrap();
        store(&storage, &invite("a"), 0);
        let again = store(&storage, &invite("a"), 1).unwrap();

        let call = storage.find("a").unwrap();
        let call = call.read();
        assert!(call.messages().iter().all(|m| m.packet().frames().is_empty()));
        assert!(!call.first_message().payload().is_empty());
        assert!(again.retrans);
    }

    // Test 10: Readers take snapshots while the pipeline writes
    #[test]
    fn test_concurrent_readers() {
        use std::thread;

        const CALLS: usize = 200;

        let storage = Arc::new(Storage::default());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let storage = Arc::clone(&storage);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..CALLS {
                    let call_id = format!("call-{i}");
                    let ts = i as i64 * 1_000;
                    store(&storage, &invite(&call_id), ts).unwrap();
                    store(&storage, &sip("SIP/2.0 200 OK", &call_id, "1 INVITE", ""), ts + 1).unwrap();
                    let bye = sip("BYE sip:bob@biloxi.com SIP/2.0", &call_id, "2 BYE", "");
                    store(&storage, &bye, ts + 2).unwrap();
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut readers = vec![];
        for _ in 0..2 {
            let storage = Arc::clone(&storage);
            let done = Arc::clone(&done);
            readers.push(thread::spawn(move || {
                let query = CallQuery::new().sort_by(AttributeId::MsgCnt, true);
                let mut seen: HashMap<usize, usize> = HashMap::new();
                loop {
                    let finished = done.load(Ordering::Acquire);
                    for call in storage.calls().into_iter().chain(storage.query(&query)) {
                        let call = call.read();
                        let count = call.messages().len();
                        assert_eq!(count, call.msg_count());
                        let last = seen.entry(call.index()).or_insert(0);
                        assert!(count >= *last, "message count went backwards");
                        *last = count;
                    }
                    if finished {
                        break;
                    }
                }
                seen.len()
            }));
        }

        writer.join().unwrap();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), CALLS);
        }

        assert_eq!(storage.count(), CALLS);
        for call in storage.calls() {
            let call = call.read();
            assert_eq!(call.msg_count(), 3);
            assert_eq!(call.state(), Some(CallState::Completed));
        }
    }

    // Test 11: Racing writers never split a Call-ID into two calls
    #[test]
    fn test_concurrent_writers_share_calls() {
        use std::thread;

        const CALLS: usize = 100;

        let storage = Arc::new(Storage::default());
        let writers: Vec<_> = (0..2)
            .map(|_| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for i in 0..CALLS {
                        store(&storage, &invite(&format!("race-{i}")), i as i64).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(storage.count(), CALLS);
        for call in storage.calls() {
            assert_eq!(call.read().msg_count(), 2);
        }
        let stats = storage.stats(&CallQuery::new());
        assert_eq!(stats.messages, 2 * CALLS as u64);
    }

    #[test]
    fn test_invalid_match_expression() {
        let result = Storage::new(StorageConfig {
            match_expr: Some("(".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(StorageError::InvalidMatchExpression(_))));
    }
}
