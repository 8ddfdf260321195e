//! SIP message parsing and stream framing.

use compact_str::CompactString;
use tracing::trace;

use super::method::{reason_phrase, reqresp_str, Method};
use super::sdp::{self, SdpMedia};
use crate::error::SipError;

const SIP_VERSION: &str = "SIP/2.0";

/// Start lines longer than this without a line break are not SIP.
const MAX_START_LINE: usize = 2048;

/// Fields extracted from one SIP message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSip {
    /// Method code for requests, status code for responses.
    pub reqresp: u16,
    /// Start line text when it differs from the standard one.
    pub resp_str: Option<CompactString>,
    pub call_id: String,
    pub xcall_id: Option<String>,
    /// `user@host` of the From URI.
    pub from: String,
    /// `user@host` of the To URI.
    pub to: String,
    pub cseq: u32,
    pub cseq_method: CompactString,
    /// `text` parameter of the Reason header.
    pub reason_txt: Option<String>,
    /// Code of the Warning header.
    pub warning: Option<u16>,
    pub medias: Vec<SdpMedia>,
}

impl ParsedSip {
    pub fn is_request(&self) -> bool {
        super::method::is_request(self.reqresp)
    }

    pub fn method(&self) -> Option<Method> {
        Method::from_code(self.reqresp)
    }
}

/// Outcome of looking at the first bytes of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Sip,
    NotSip,
    /// Too few bytes to tell.
    Undecided,
}

/// Check whether `data` starts with a SIP request or status line.
pub fn detect(data: &[u8]) -> Detection {
    let line_end = data.iter().position(|&b| b == b'\n');
    let line = match line_end {
        Some(end) => &data[..end],
        None if data.len() > MAX_START_LINE => return Detection::NotSip,
        None => data,
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    // Status line
    let status_prefix = b"SIP/2.0 ";
    if line.starts_with(status_prefix) {
        return Detection::Sip;
    }
    if line_end.is_none() && status_prefix.starts_with(line) {
        return Detection::Undecided;
    }

    // Request line: METHOD SP URI SP SIP/2.0
    let token_len = line
        .iter()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if token_len == 0 {
        return Detection::NotSip;
    }
    if token_len == line.len() {
        // Still reading the method token
        return if line_end.is_none() && token_len <= 16 {
            Detection::Undecided
        } else {
            Detection::NotSip
        };
    }
    if line[token_len] != b' ' {
        return Detection::NotSip;
    }

    match line_end {
        Some(_) if line.ends_with(SIP_VERSION.as_bytes()) => Detection::Sip,
        Some(_) => Detection::NotSip,
        None => Detection::Undecided,
    }
}

/// Find the end of the header section, returning (headers_len, separator_len).
fn header_end(data: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = find(data, b"\r\n\r\n") {
        return Some((pos, 4));
    }
    find(data, b"\n\n").map(|pos| (pos, 2))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Length of the first complete SIP message in `data`.
///
/// The header section ends at the first empty line and the body is
/// Content-Length bytes long (zero when absent).
pub fn message_length(data: &[u8]) -> Result<usize, SipError> {
    let Some((headers_len, sep_len)) = header_end(data) else {
        return Err(SipError::Incomplete {
            needed: data.len() + 1,
            have: data.len(),
        });
    };

    let headers = String::from_utf8_lossy(&data[..headers_len]);
    let content_length = header_lines(&headers)
        .filter(|(name, _)| matches_header(name, "content-length", Some("l")))
        .map(|(_, value)| value.parse::<usize>().map_err(|_| SipError::InvalidContentLength))
        .next()
        .transpose()?
        .unwrap_or(0);

    let total = headers_len + sep_len + content_length;
    if data.len() < total {
        return Err(SipError::Incomplete {
            needed: total,
            have: data.len(),
        });
    }
    Ok(total)
}

/// Iterate `(name, value)` pairs of the header lines, unfolding continuations.
///
/// The first line (the start line) is skipped.
fn header_lines<'a>(headers: &'a str) -> impl Iterator<Item = (&'a str, String)> + 'a {
    let mut lines = headers.lines().skip(1).peekable();
    std::iter::from_fn(move || loop {
        let line = lines.next()?;
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let mut value = value.trim().to_string();
        while let Some(next) = lines.peek() {
            if !next.starts_with([' ', '\t']) {
                break;
            }
            value.push(' ');
            value.push_str(next.trim());
            lines.next();
        }
        return Some((name.trim(), value));
    })
}

fn matches_header(name: &str, long: &str, compact: Option<&str>) -> bool {
    name.eq_ignore_ascii_case(long) || compact.is_some_and(|c| name.eq_ignore_ascii_case(c))
}

/// Parse one complete SIP message.
pub fn parse(payload: &[u8]) -> Result<ParsedSip, SipError> {
    if detect(payload) != Detection::Sip {
        return Err(SipError::NotSip);
    }

    let (headers_len, body_start) = match header_end(payload) {
        Some((len, sep)) => (len, len + sep),
        None => (payload.len(), payload.len()),
    };
    let headers = String::from_utf8_lossy(&payload[..headers_len]);
    let start_line = headers.lines().next().unwrap_or_default().trim_end();

    let (reqresp, resp_str) = parse_start_line(start_line)?;

    let mut call_id = None;
    let mut xcall_id = None;
    let mut from = None;
    let mut to = None;
    let mut cseq = None;
    let mut content_length = None;
    let mut content_type = None;
    let mut reason_txt = None;
    let mut warning = None;

    for (name, value) in header_lines(&headers) {
        if matches_header(name, "call-id", Some("i")) {
            call_id.get_or_insert(value);
        } else if matches_header(name, "from", Some("f")) {
            from.get_or_insert_with(|| uri_user_host(&value));
        } else if matches_header(name, "to", Some("t")) {
            to.get_or_insert_with(|| uri_user_host(&value));
        } else if matches_header(name, "cseq", None) {
            if cseq.is_none() {
                cseq = Some(parse_cseq(&value)?);
            }
        } else if matches_header(name, "content-length", Some("l")) {
            if content_length.is_none() {
                content_length =
                    Some(value.parse::<usize>().map_err(|_| SipError::InvalidContentLength)?);
            }
        } else if matches_header(name, "content-type", Some("c")) {
            content_type.get_or_insert(value);
        } else if matches_header(name, "x-call-id", Some("x-cid")) {
            xcall_id.get_or_insert(value);
        } else if matches_header(name, "reason", None) {
            if reason_txt.is_none() {
                reason_txt = reason_text(&value);
            }
        } else if matches_header(name, "warning", None) {
            if warning.is_none() {
                warning = value.get(..3).and_then(|code| code.parse().ok());
            }
        }
    }

    let call_id = call_id
        .filter(|id| !id.is_empty())
        .ok_or(SipError::MissingHeader { header: "Call-ID" })?;
    let from = from.ok_or(SipError::MissingHeader { header: "From" })?;
    let to = to.ok_or(SipError::MissingHeader { header: "To" })?;
    let (cseq, cseq_method) = cseq.ok_or(SipError::MissingHeader { header: "CSeq" })?;

    let body = payload.get(body_start..).unwrap_or_default();
    let body = match content_length {
        Some(len) => &body[..len.min(body.len())],
        None => body,
    };
    let medias = parse_body(body, content_type.as_deref());

    trace!(reqresp, call_id = %call_id, medias = medias.len(), "parsed SIP message");

    Ok(ParsedSip {
        reqresp,
        resp_str,
        call_id,
        xcall_id,
        from,
        to,
        cseq,
        cseq_method,
        reason_txt,
        warning,
        medias,
    })
}

fn parse_start_line(line: &str) -> Result<(u16, Option<CompactString>), SipError> {
    if let Some(rest) = line.strip_prefix("SIP/2.0 ") {
        let rest = rest.trim_start();
        let code: u16 = rest
            .get(..3)
            .and_then(|c| c.parse().ok())
            .filter(|c| (100..700).contains(c))
            .ok_or(SipError::InvalidStartLine)?;
        let phrase = rest[3..].trim();

        let text = if phrase.is_empty() {
            code.to_string()
        } else {
            format!("{code} {phrase}")
        };
        let standard = reason_phrase(code).is_some() && reqresp_str(code) == text;
        let resp_str = (!standard).then(|| CompactString::new(text));
        return Ok((code, resp_str));
    }

    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or(SipError::InvalidStartLine)?;
    let _uri = parts.next().ok_or(SipError::InvalidStartLine)?;
    match parts.next() {
        Some(SIP_VERSION) => {}
        _ => return Err(SipError::NotSip),
    }
    let method: Method = method.parse()?;
    Ok((method.code(), None))
}

/// `314159 INVITE` -> (314159, "INVITE")
fn parse_cseq(value: &str) -> Result<(u32, CompactString), SipError> {
    let mut parts = value.split_whitespace();
    let number = parts
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or(SipError::InvalidCSeq)?;
    let method = parts.next().ok_or(SipError::InvalidCSeq)?;
    Ok((number, CompactString::new(method)))
}

/// Extract `user@host` from a From/To header value.
///
/// `"Alice" <sip:alice@atlanta.com;transport=tcp>;tag=1928` -> `alice@atlanta.com`
pub fn uri_user_host(value: &str) -> String {
    let uri = match (value.find('<'), value.find('>')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => value.split(';').next().unwrap_or(value),
    };
    let uri = uri.trim();
    let uri = ["sips:", "sip:", "tel:"]
        .iter()
        .find_map(|scheme| {
            uri.get(..scheme.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
                .map(|_| &uri[scheme.len()..])
        })
        .unwrap_or(uri);
    let end = uri.find([';', '?']).unwrap_or(uri.len());
    uri[..end].to_string()
}

/// `Q.850;cause=16;text="Normal call clearing"` -> `Normal call clearing`
fn reason_text(value: &str) -> Option<String> {
    let start = value.find("text=")? + "text=".len();
    let text = &value[start..];
    let text = match text.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or(quoted),
        None => text.split(';').next().unwrap_or(text),
    };
    Some(text.trim().to_string())
}

fn parse_body(body: &[u8], content_type: Option<&str>) -> Vec<SdpMedia> {
    if body.is_empty() {
        return Vec::new();
    }
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    if content_type.starts_with("multipart/") {
        if let Some(boundary) = boundary_param(&content_type) {
            return multipart_sdp(body, &boundary)
                .map(sdp::parse)
                .unwrap_or_default();
        }
    }
    if content_type.starts_with("application/sdp") || body.starts_with(b"v=") {
        return sdp::parse(body);
    }
    Vec::new()
}

fn boundary_param(content_type: &str) -> Option<String> {
    let start = content_type.find("boundary=")? + "boundary=".len();
    let value = content_type[start..].split(';').next()?.trim().trim_matches('"');
    (!value.is_empty()).then(|| value.to_string())
}

/// Body of the first `application/sdp` part.
fn multipart_sdp<'a>(body: &'a [u8], boundary: &str) -> Option<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut rest = body;

    while let Some(pos) = find_ignore_case(rest, delimiter) {
        rest = &rest[pos + delimiter.len()..];
        let next = find_ignore_case(rest, delimiter).unwrap_or(rest.len());
        let part = &rest[..next];
        if let Some((headers_len, sep)) = header_end(part) {
            let headers = String::from_utf8_lossy(&part[..headers_len]).to_ascii_lowercase();
            if headers.contains("application/sdp") {
                return Some(&part[headers_len + sep..]);
            }
        }
    }
    None
}

fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
