//! Calls: SIP messages grouped by Call-ID.
//!
//! A [`Call`] owns its messages in arrival order. Calls started by an
//! INVITE additionally track a [`CallState`]:
//!
//! ```text
//!             2xx               BYE
//! CALL SETUP ──────► IN CALL ──────► COMPLETED
//!     │
//!     ├── CANCEL ─────► CANCELLED
//!     ├── 486/600 ────► BUSY
//!     ├── 3xx ────────► DIVERTED
//!     └── 4xx-6xx ────► REJECTED
//! ```
//!
//! Only responses to the INVITE that opened the current transaction move a
//! call out of CALL SETUP. Terminal states are never left; later messages
//! are still appended.

mod state;

use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::attribute::AttributeId;
use crate::config::RetransPolicy;
use crate::sip::{Method, SipMessage};

pub use state::CallState;

/// All messages sharing one Call-ID.
#[derive(Debug, Clone)]
pub struct Call {
    index: usize,
    call_id: String,
    /// First X-Call-ID seen in this call.
    xcall_id: Option<String>,
    /// Never empty.
    messages: Vec<SipMessage>,
    state: Option<CallState>,
    invite_cseq: u32,
    conv_start: Option<usize>,
    conv_end: Option<usize>,
    reason_txt: Option<String>,
    warning: Option<u16>,
}

impl Call {
    /// Create a call from its first message.
    ///
    /// `index` is the 1-based creation order assigned by storage.
    pub fn new(index: usize, first: SipMessage) -> Self {
        let state = (first.method() == Some(Method::Invite)).then_some(CallState::CallSetup);
        let mut call = Self {
            index,
            call_id: first.call_id().to_string(),
            xcall_id: None,
            messages: Vec::new(),
            state,
            invite_cseq: first.cseq(),
            conv_start: None,
            conv_end: None,
            reason_txt: None,
            warning: None,
        };
        call.add_message(first, RetransPolicy::Disabled);
        call
    }

    /// Append a message.
    ///
    /// Returns `true` when the message was detected as a retransmission. A
    /// retransmission shares the media list of the message it repeats and
    /// never changes the call state.
    pub fn add_message(&mut self, mut msg: SipMessage, policy: RetransPolicy) -> bool {
        msg.set_call_index(self.index);
        if self.xcall_id.is_none() {
            self.xcall_id = msg.xcall_id().map(str::to_owned);
        }

        if let Some(original) = self.find_retrans(&msg, policy) {
            trace!(
                call_id = %self.call_id,
                cseq = msg.cseq(),
                method = %msg.reqresp_str(),
                "retransmission"
            );
            msg.share_medias(&self.messages[original]);
            msg.set_retrans(true);
            self.messages.push(msg);
            return true;
        }

        if let Some(text) = msg.reason_txt() {
            self.reason_txt = Some(text.to_string());
        }
        if let Some(code) = msg.warning() {
            self.warning = Some(code);
        }

        self.messages.push(msg);
        self.update_state(self.messages.len() - 1);
        false
    }

    /// Position of an earlier message that `msg` repeats.
    pub fn find_retrans(&self, msg: &SipMessage, policy: RetransPolicy) -> Option<usize> {
        if policy == RetransPolicy::Disabled {
            return None;
        }
        self.messages.iter().rposition(|prev| {
            let loose = prev.src() == msg.src()
                && prev.reqresp() == msg.reqresp()
                && prev.cseq() == msg.cseq()
                && prev.cseq_method() == msg.cseq_method();
            match policy {
                RetransPolicy::Strict => {
                    loose && prev.dst() == msg.dst() && prev.payload() == msg.payload()
                }
                _ => loose,
            }
        })
    }

    fn update_state(&mut self, pos: usize) {
        let Some(current) = self.state else {
            return;
        };
        if current.is_terminal() {
            return;
        }

        let msg = &self.messages[pos];
        let next = match msg.method() {
            Some(Method::Invite) => {
                self.invite_cseq = msg.cseq();
                None
            }
            Some(Method::Bye) if current == CallState::InCall => Some(CallState::Completed),
            Some(Method::Cancel) if current == CallState::CallSetup => Some(CallState::Cancelled),
            Some(_) => None,
            None if current != CallState::CallSetup
                || msg.cseq() != self.invite_cseq
                || !msg.cseq_method().eq_ignore_ascii_case(Method::Invite.as_str()) =>
            {
                None
            }
            None => match msg.reqresp() {
                200..=299 => Some(CallState::InCall),
                300..=399 => Some(CallState::Diverted),
                486 | 600 => Some(CallState::Busy),
                400..=699 => Some(CallState::Rejected),
                _ => None,
            },
        };

        if let Some(next) = next {
            match next {
                CallState::InCall => self.conv_start = Some(pos),
                CallState::Completed => self.conv_end = Some(pos),
                _ => {}
            }
            debug!(call_id = %self.call_id, from = %current, to = %next, "call state");
            self.state = Some(next);
        }
    }

    /// 1-based creation order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn xcall_id(&self) -> Option<&str> {
        self.xcall_id.as_deref()
    }

    pub fn messages(&self) -> &[SipMessage] {
        &self.messages
    }

    pub fn msg_count(&self) -> usize {
        self.messages.len()
    }

    pub fn first_message(&self) -> &SipMessage {
        &self.messages[0]
    }

    pub fn last_message(&self) -> &SipMessage {
        &self.messages[self.messages.len() - 1]
    }

    /// State of an INVITE dialog, `None` for other dialogs.
    pub fn state(&self) -> Option<CallState> {
        self.state
    }

    pub fn is_invite(&self) -> bool {
        self.state.is_some()
    }

    /// CSeq of the INVITE that opened the current transaction.
    pub fn invite_cseq(&self) -> u32 {
        self.invite_cseq
    }

    /// The 2xx that established the conversation.
    pub fn conv_start(&self) -> Option<&SipMessage> {
        self.conv_start.map(|pos| &self.messages[pos])
    }

    /// The message that ended the conversation.
    pub fn conv_end(&self) -> Option<&SipMessage> {
        self.conv_end.map(|pos| &self.messages[pos])
    }

    pub fn reason_txt(&self) -> Option<&str> {
        self.reason_txt.as_deref()
    }

    pub fn warning(&self) -> Option<u16> {
        self.warning
    }

    /// Release captured frames of every message.
    pub fn free_frames(&mut self) {
        for msg in &mut self.messages {
            msg.release_frames();
        }
    }

    /// Compute an attribute for this call.
    ///
    /// Call-level attributes are answered here; all others come from the
    /// first message.
    pub fn attribute(&self, id: AttributeId) -> Option<String> {
        match id {
            AttributeId::CallIndex => Some(self.index.to_string()),
            AttributeId::CallId => Some(self.call_id.clone()),
            AttributeId::XCallId => self.xcall_id.clone(),
            AttributeId::Transport => self
                .first_message()
                .packet()
                .kind()
                .map(|kind| kind.transport().to_string()),
            AttributeId::MsgCnt => Some(self.messages.len().to_string()),
            AttributeId::CallState => self.state.map(|state| state.as_str().to_string()),
            AttributeId::ConvDur => self.conv_start().map(|start| {
                let end = self.conv_end().unwrap_or_else(|| self.last_message());
                duration(start, end)
            }),
            AttributeId::TotalDur => Some(duration(self.first_message(), self.last_message())),
            AttributeId::ReasonTxt => self.reason_txt.clone(),
            AttributeId::Warning => self.warning.map(|code| code.to_string()),
            _ => self.first_message().attribute(id),
        }
    }

    /// Order two calls by an attribute.
    ///
    /// Numeric attributes compare as numbers, the rest as text. Calls with
    /// no value sort first.
    pub fn compare(&self, other: &Call, id: AttributeId) -> Ordering {
        match id {
            AttributeId::CallIndex => self.index.cmp(&other.index),
            AttributeId::MsgCnt => self.messages.len().cmp(&other.messages.len()),
            _ => self.attribute(id).cmp(&other.attribute(id)),
        }
    }
}

/// `M:SS` between two messages.
fn duration(start: &SipMessage, end: &SipMessage) -> String {
    let secs = (end.time() - start.time()).max(0) / 1_000_000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
