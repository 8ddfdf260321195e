//! SIP and SDP parsing.
//!
//! [`parse`] turns one complete SIP message into a [`ParsedSip`]. The
//! correlator wraps it together with its [`Packet`](crate::packet::Packet)
//! into a [`SipMessage`], which derives display attributes on demand.
//!
//! [`detect`] and [`message_length`] are the framing primitives used by the
//! stream layer to cut messages out of TCP and WebSocket streams.

mod message;
mod method;
mod parser;
pub mod sdp;

pub use message::SipMessage;
pub use method::{is_request, reason_phrase, reqresp_str, Method, RESPONSE_MIN};
pub use parser::{detect, message_length, parse, uri_user_host, Detection, ParsedSip};
pub use sdp::{SdpFormat, SdpMedia};
