//! A stored SIP message and its derived attributes.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compact_str::CompactString;

use super::method::{is_request, reqresp_str, Method};
use super::parser::ParsedSip;
use super::sdp::SdpMedia;
use crate::attribute::AttributeId;
use crate::packet::{Address, Packet};

const DATE_FORMAT: &str = "%Y/%m/%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// One SIP message bound to the packet it was parsed from.
///
/// The message owns its packet. The owning call is referenced by index
/// only; resolve it through [`Storage`](crate::storage::Storage).
///
/// Media descriptors are reference counted: a retransmission shares the
/// list of the message it repeats instead of holding its own copy.
#[derive(Debug, Clone)]
pub struct SipMessage {
    packet: Packet,
    reqresp: u16,
    resp_str: Option<CompactString>,
    call_id: String,
    xcall_id: Option<String>,
    from: String,
    to: String,
    cseq: u32,
    cseq_method: CompactString,
    reason_txt: Option<String>,
    warning: Option<u16>,
    medias: Arc<Vec<SdpMedia>>,
    retrans: bool,
    call_index: usize,
}

impl SipMessage {
    pub fn new(packet: Packet, sip: ParsedSip) -> Self {
        Self {
            packet,
            reqresp: sip.reqresp,
            resp_str: sip.resp_str,
            call_id: sip.call_id,
            xcall_id: sip.xcall_id,
            from: sip.from,
            to: sip.to,
            cseq: sip.cseq,
            cseq_method: sip.cseq_method,
            reason_txt: sip.reason_txt,
            warning: sip.warning,
            medias: Arc::new(sip.medias),
            retrans: false,
            call_index: 0,
        }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn packet_mut(&mut self) -> &mut Packet {
        &mut self.packet
    }

    /// Drop the captured frames, keeping the message payload.
    pub fn release_frames(&mut self) {
        if !self.packet.has_payload_override() {
            let payload = self.packet.payload().into_owned();
            self.packet.set_payload(&payload);
        }
        self.packet.free_frames();
    }

    /// Method code for requests, status code for responses.
    pub fn reqresp(&self) -> u16 {
        self.reqresp
    }

    pub fn is_request(&self) -> bool {
        is_request(self.reqresp)
    }

    pub fn method(&self) -> Option<Method> {
        Method::from_code(self.reqresp)
    }

    /// Non-standard start line text, if the message carried one.
    pub fn resp_str(&self) -> Option<&str> {
        self.resp_str.as_deref()
    }

    /// Method name or response text, preferring the custom reason phrase.
    pub fn reqresp_str(&self) -> Cow<'_, str> {
        match &self.resp_str {
            Some(text) => Cow::Borrowed(text.as_str()),
            None => reqresp_str(self.reqresp),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn xcall_id(&self) -> Option<&str> {
        self.xcall_id.as_deref()
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn cseq_method(&self) -> &str {
        &self.cseq_method
    }

    pub fn reason_txt(&self) -> Option<&str> {
        self.reason_txt.as_deref()
    }

    pub fn warning(&self) -> Option<u16> {
        self.warning
    }

    pub fn medias(&self) -> &[SdpMedia] {
        &self.medias
    }

    /// Share the media list of `original` instead of keeping our own.
    pub(crate) fn share_medias(&mut self, original: &SipMessage) {
        self.medias = Arc::clone(&original.medias);
    }

    pub fn shares_medias_with(&self, other: &SipMessage) -> bool {
        Arc::ptr_eq(&self.medias, &other.medias)
    }

    pub fn is_retrans(&self) -> bool {
        self.retrans
    }

    pub(crate) fn set_retrans(&mut self, retrans: bool) {
        self.retrans = retrans;
    }

    /// Index of the owning call.
    pub fn call_index(&self) -> usize {
        self.call_index
    }

    pub(crate) fn set_call_index(&mut self, index: usize) {
        self.call_index = index;
    }

    pub fn src(&self) -> Address {
        self.packet.src
    }

    pub fn dst(&self) -> Address {
        self.packet.dst
    }

    pub fn payload(&self) -> Cow<'_, [u8]> {
        self.packet.payload()
    }

    /// Capture time in microseconds since the epoch.
    pub fn time(&self) -> i64 {
        self.packet.time()
    }

    /// Whether this message was captured before `other`.
    ///
    /// Every message is older than no message at all, and no message is
    /// older than itself. Equal timestamps are not older.
    pub fn is_older(&self, other: Option<&SipMessage>) -> bool {
        match other {
            None => true,
            Some(other) if std::ptr::eq(self, other) => false,
            Some(other) => self.time() < other.time(),
        }
    }

    /// Alias of the first format of the first media line.
    pub fn preferred_codec_alias(&self) -> Option<&str> {
        self.medias
            .first()?
            .formats
            .first()
            .map(|format| format.alias.as_str())
    }

    /// `"<date> <time> <src> -> <dst>"`
    pub fn header(&self) -> String {
        format!(
            "{} {} {} -> {}",
            self.date().unwrap_or_default(),
            self.time_of_day().unwrap_or_default(),
            self.src(),
            self.dst()
        )
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.time())
    }

    fn date(&self) -> Option<String> {
        self.timestamp().map(|ts| ts.format(DATE_FORMAT).to_string())
    }

    fn time_of_day(&self) -> Option<String> {
        self.timestamp().map(|ts| ts.format(TIME_FORMAT).to_string())
    }

    /// Compute a message-level attribute.
    ///
    /// Returns `None` when the message has no value for it.
    ///
    /// # Panics
    ///
    /// Call-level attributes (index, Call-ID, state, durations, ...) are not
    /// known to a single message; asking for one is a programming error.
    pub fn attribute(&self, id: AttributeId) -> Option<String> {
        match id {
            AttributeId::Src => Some(self.src().to_string()),
            AttributeId::Dst => Some(self.dst().to_string()),
            AttributeId::Method => Some(self.reqresp_str().into_owned()),
            AttributeId::SipFrom => Some(self.from.clone()),
            AttributeId::SipTo => Some(self.to.clone()),
            AttributeId::SipFromUser => user_part(&self.from),
            AttributeId::SipToUser => user_part(&self.to),
            AttributeId::Date => self.date(),
            AttributeId::Time => self.time_of_day(),
            other => panic!("Unhandled attribute {} ({})", other.name(), other as u8),
        }
    }
}

/// `alice@atlanta.com` -> `alice`. No `@` means no user part.
fn user_part(uri: &str) -> Option<String> {
    uri.split_once('@').map(|(user, _)| user.to_string())
}
