//! Display attributes of calls and messages.
//!
//! Every value a call list can show or filter on is identified by an
//! [`AttributeId`]. The static table behind [`header`] carries its display
//! metadata:
//!
//! | Id | Name | Title | Width |
//! |----|------|-------|-------|
//! | `CallIndex` | `index` | Idx | 4 |
//! | `SipFrom` | `sipfrom` | SIP From | 25 |
//! | `SipFromUser` | `sipfromuser` | SIP From User | 20 |
//! | `SipTo` | `sipto` | SIP To | 25 |
//! | `SipToUser` | `siptouser` | SIP To User | 20 |
//! | `Src` | `src` | Source | 22 |
//! | `Dst` | `dst` | Destination | 22 |
//! | `CallId` | `callid` | Call-ID | 50 |
//! | `XCallId` | `xcallid` | X-Call-ID | 50 |
//! | `Date` | `date` | Date | 10 |
//! | `Time` | `time` | Time | 8 |
//! | `Method` | `method` | Method | 10 |
//! | `Transport` | `transport` | Trans | 3 |
//! | `MsgCnt` | `msgcnt` | Msgs | 5 |
//! | `CallState` | `state` | Call State | 10 |
//! | `ConvDur` | `convdur` | ConvDur | 7 |
//! | `TotalDur` | `totaldur` | TotalDur | 8 |
//! | `ReasonTxt` | `reason` | Reason Text | 25 |
//! | `Warning` | `warning` | Warning | 4 |
//!
//! Values themselves are computed by [`Call::attribute`](crate::call::Call::attribute)
//! and [`SipMessage::attribute`](crate::sip::SipMessage::attribute).

mod color;

use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;

pub use color::{color, AttrColor, Color, Colorizer};

/// Closed set of displayable attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AttributeId {
    CallIndex,
    SipFrom,
    SipFromUser,
    SipTo,
    SipToUser,
    Src,
    Dst,
    CallId,
    XCallId,
    Date,
    Time,
    Method,
    Transport,
    MsgCnt,
    CallState,
    ConvDur,
    TotalDur,
    ReasonTxt,
    Warning,
}

impl AttributeId {
    pub const ALL: [AttributeId; 19] = [
        AttributeId::CallIndex,
        AttributeId::SipFrom,
        AttributeId::SipFromUser,
        AttributeId::SipTo,
        AttributeId::SipToUser,
        AttributeId::Src,
        AttributeId::Dst,
        AttributeId::CallId,
        AttributeId::XCallId,
        AttributeId::Date,
        AttributeId::Time,
        AttributeId::Method,
        AttributeId::Transport,
        AttributeId::MsgCnt,
        AttributeId::CallState,
        AttributeId::ConvDur,
        AttributeId::TotalDur,
        AttributeId::ReasonTxt,
        AttributeId::Warning,
    ];

    pub fn name(self) -> &'static str {
        header(self).name
    }

    /// Attributes whose values compare as integers.
    pub fn is_numeric(self) -> bool {
        matches!(self, AttributeId::CallIndex | AttributeId::MsgCnt)
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        find_by_name(s).ok_or_else(|| StorageError::UnknownAttribute {
            name: s.to_string(),
        })
    }
}

/// Display metadata for one attribute.
#[derive(Debug, Clone, Copy)]
pub struct AttributeHeader {
    pub id: AttributeId,
    /// Internal name used in column lists and filters.
    pub name: &'static str,
    /// Short column title. Falls back to `desc` when absent.
    pub title: Option<&'static str>,
    pub desc: &'static str,
    /// Preferred column width in characters.
    pub width: usize,
    pub colorizer: Option<Colorizer>,
}

const fn entry(
    id: AttributeId,
    name: &'static str,
    title: Option<&'static str>,
    desc: &'static str,
    width: usize,
    colorizer: Option<Colorizer>,
) -> AttributeHeader {
    AttributeHeader {
        id,
        name,
        title,
        desc,
        width,
        colorizer,
    }
}

// Indexed by `AttributeId as usize`
static ATTRIBUTES: [AttributeHeader; 19] = [
    entry(AttributeId::CallIndex, "index", Some("Idx"), "Call Index", 4, None),
    entry(AttributeId::SipFrom, "sipfrom", None, "SIP From", 25, None),
    entry(AttributeId::SipFromUser, "sipfromuser", None, "SIP From User", 20, None),
    entry(AttributeId::SipTo, "sipto", None, "SIP To", 25, None),
    entry(AttributeId::SipToUser, "siptouser", None, "SIP To User", 20, None),
    entry(AttributeId::Src, "src", None, "Source", 22, None),
    entry(AttributeId::Dst, "dst", None, "Destination", 22, None),
    entry(AttributeId::CallId, "callid", None, "Call-ID", 50, None),
    entry(AttributeId::XCallId, "xcallid", None, "X-Call-ID", 50, None),
    entry(AttributeId::Date, "date", None, "Date", 10, None),
    entry(AttributeId::Time, "time", None, "Time", 8, None),
    entry(
        AttributeId::Method,
        "method",
        None,
        "Method",
        10,
        Some(color::sip_method),
    ),
    entry(AttributeId::Transport, "transport", Some("Trans"), "Transport", 3, None),
    entry(AttributeId::MsgCnt, "msgcnt", Some("Msgs"), "Message Count", 5, None),
    entry(
        AttributeId::CallState,
        "state",
        None,
        "Call State",
        10,
        Some(color::call_state),
    ),
    entry(
        AttributeId::ConvDur,
        "convdur",
        Some("ConvDur"),
        "Conversation Duration",
        7,
        None,
    ),
    entry(
        AttributeId::TotalDur,
        "totaldur",
        Some("TotalDur"),
        "Total Duration",
        8,
        None,
    ),
    entry(
        AttributeId::ReasonTxt,
        "reason",
        Some("Reason Text"),
        "Reason Text",
        25,
        None,
    ),
    entry(AttributeId::Warning, "warning", Some("Warning"), "Warning code", 4, None),
];

/// Display metadata of an attribute.
pub fn header(id: AttributeId) -> &'static AttributeHeader {
    &ATTRIBUTES[id as usize]
}

pub fn name(id: AttributeId) -> &'static str {
    header(id).name
}

/// Column title, or the description when no short title is configured.
pub fn title(id: AttributeId) -> &'static str {
    let header = header(id);
    header.title.unwrap_or(header.desc)
}

pub fn description(id: AttributeId) -> &'static str {
    header(id).desc
}

pub fn width(id: AttributeId) -> usize {
    header(id).width
}

/// Look up an attribute by its internal name, ignoring case.
pub fn find_by_name(name: &str) -> Option<AttributeId> {
    ATTRIBUTES
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.id)
}
