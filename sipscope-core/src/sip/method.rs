//! SIP request methods and response codes.
//!
//! Requests and responses share one numeric space: methods use small codes
//! (below 100) and responses use their status code.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::SipError;

/// SIP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Method {
    Register = 1,
    Invite,
    Subscribe,
    Notify,
    Options,
    Publish,
    Message,
    Cancel,
    Bye,
    Ack,
    Prack,
    Info,
    Refer,
    Update,
}

impl Method {
    pub const ALL: [Method; 14] = [
        Method::Register,
        Method::Invite,
        Method::Subscribe,
        Method::Notify,
        Method::Options,
        Method::Publish,
        Method::Message,
        Method::Cancel,
        Method::Bye,
        Method::Ack,
        Method::Prack,
        Method::Info,
        Method::Refer,
        Method::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Options => "OPTIONS",
            Method::Publish => "PUBLISH",
            Method::Message => "MESSAGE",
            Method::Cancel => "CANCEL",
            Method::Bye => "BYE",
            Method::Ack => "ACK",
            Method::Prack => "PRACK",
            Method::Info => "INFO",
            Method::Refer => "REFER",
            Method::Update => "UPDATE",
        }
    }

    /// Numeric code used in `reqresp`.
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.code() == code)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = SipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or(SipError::InvalidStartLine)
    }
}

/// Request codes are below this value; responses are at or above it.
pub const RESPONSE_MIN: u16 = 100;

pub fn is_request(reqresp: u16) -> bool {
    reqresp < RESPONSE_MIN
}

/// Standard reason phrase for a status code.
pub fn reason_phrase(code: u16) -> Option<&'static str> {
    let phrase = match code {
        100 => "Trying",
        180 => "Ringing",
        181 => "Call is Being Forwarded",
        182 => "Queued",
        183 => "Session Progress",
        199 => "Early Dialog Terminated",
        200 => "OK",
        202 => "Accepted",
        204 => "No Notification",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        305 => "Use Proxy",
        380 => "Alternative Service",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Conditional Request Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Unsupported URI Scheme",
        417 => "Unknown Resource-Priority",
        420 => "Bad Extension",
        421 => "Extension Required",
        422 => "Session Interval Too Small",
        423 => "Interval Too Brief",
        424 => "Bad Location Information",
        428 => "Use Identity Header",
        429 => "Provide Referrer Identity",
        430 => "Flow Failed",
        433 => "Anonymity Disallowed",
        436 => "Bad Identity-Info",
        437 => "Unsupported Certificate",
        438 => "Invalid Identity Header",
        439 => "First Hop Lacks Outbound Support",
        470 => "Consent Needed",
        480 => "Temporarily Unavailable",
        481 => "Call/Transaction Does Not Exist",
        482 => "Loop Detected",
        483 => "Too Many Hops",
        484 => "Address Incomplete",
        485 => "Ambiguous",
        486 => "Busy Here",
        487 => "Request Terminated",
        488 => "Not Acceptable Here",
        489 => "Bad Event",
        491 => "Request Pending",
        493 => "Undecipherable",
        494 => "Security Agreement Required",
        500 => "Server Internal Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Server Time-out",
        505 => "Version Not Supported",
        513 => "Message Too Large",
        580 => "Precondition Failure",
        600 => "Busy Everywhere",
        603 => "Decline",
        604 => "Does Not Exist Anywhere",
        606 => "Not Acceptable",
        _ => return None,
    };
    Some(phrase)
}

/// Standard text for a `reqresp` value: the method name for requests,
/// `"<code> <phrase>"` for responses.
///
/// Unknown codes render as the bare number.
pub fn reqresp_str(reqresp: u16) -> Cow<'static, str> {
    if let Some(method) = Method::from_code(reqresp) {
        return Cow::Borrowed(method.as_str());
    }
    match reason_phrase(reqresp) {
        Some(phrase) => Cow::Owned(format!("{reqresp} {phrase}")),
        None => Cow::Owned(reqresp.to_string()),
    }
}
