//! SDP body parsing.
//!
//! Only what the call list needs is extracted: media lines with their
//! connection address, port and format list.

use compact_str::CompactString;

/// One payload format of a media line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpFormat {
    /// RTP payload type.
    pub id: u32,
    /// Codec name, e.g. `g711u` or `opus`.
    pub alias: CompactString,
}

/// One `m=` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpMedia {
    pub media_type: CompactString,
    /// Connection address (`c=`), media level overriding session level.
    pub address: Option<CompactString>,
    pub port: u16,
    pub formats: Vec<SdpFormat>,
}

/// Alias for static RTP payload types.
pub fn static_alias(id: u32) -> Option<&'static str> {
    let alias = match id {
        0 => "g711u",
        3 => "gsm",
        4 => "g723",
        5 | 6 | 16 | 17 => "dvi4",
        7 => "lpc",
        8 => "g711a",
        9 => "g722",
        10 | 11 => "l16",
        12 => "qcelp",
        13 => "cn",
        14 => "mpa",
        15 => "g728",
        18 => "g729",
        25 => "celb",
        26 => "jpeg",
        28 => "nv",
        31 => "h261",
        32 => "mpv",
        33 => "mp2t",
        34 => "h263",
        _ => return None,
    };
    Some(alias)
}

/// Parse an SDP body into its media descriptions.
///
/// Lines that cannot be parsed are skipped; an empty or unrelated body
/// yields no media.
pub fn parse(body: &[u8]) -> Vec<SdpMedia> {
    let text = String::from_utf8_lossy(body);
    let mut session_address: Option<CompactString> = None;
    let mut medias: Vec<SdpMedia> = Vec::new();
    // rtpmap lines seen for the current media
    let mut rtpmaps: Vec<(u32, CompactString)> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        let Some((kind, value)) = line.split_once('=') else {
            continue;
        };

        match kind {
            "c" => {
                let address = parse_connection(value);
                match medias.last_mut() {
                    Some(media) => media.address = address.or(media.address.take()),
                    None => session_address = address,
                }
            }
            "m" => {
                if let Some(media) = medias.last_mut() {
                    apply_rtpmaps(media, &rtpmaps);
                }
                rtpmaps.clear();
                if let Some(media) = parse_media(value, session_address.clone()) {
                    medias.push(media);
                }
            }
            "a" => {
                if let Some(map) = parse_rtpmap(value) {
                    rtpmaps.push(map);
                }
            }
            _ => {}
        }
    }

    if let Some(media) = medias.last_mut() {
        apply_rtpmaps(media, &rtpmaps);
    }

    medias
}

/// `IN IP4 10.0.0.1` -> `10.0.0.1`
fn parse_connection(value: &str) -> Option<CompactString> {
    let mut parts = value.split_whitespace();
    let _net = parts.next()?;
    let _addrtype = parts.next()?;
    let address = parts.next()?;
    // Strip multicast TTL suffix
    let address = address.split('/').next().unwrap_or(address);
    Some(CompactString::new(address))
}

/// `audio 4000 RTP/AVP 0 8 101`
fn parse_media(value: &str, address: Option<CompactString>) -> Option<SdpMedia> {
    let mut parts = value.split_whitespace();
    let media_type = parts.next()?;
    // Port may carry a port count (`4000/2`)
    let port = parts.next()?.split('/').next()?.parse().ok()?;
    let _proto = parts.next()?;

    let formats = parts
        .filter_map(|fmt| fmt.parse::<u32>().ok())
        .map(|id| SdpFormat {
            id,
            alias: static_alias(id)
                .map(CompactString::new)
                .unwrap_or_else(|| CompactString::new(id.to_string())),
        })
        .collect();

    Some(SdpMedia {
        media_type: CompactString::new(media_type),
        address,
        port,
        formats,
    })
}

/// `rtpmap:101 telephone-event/8000` -> (101, "telephone-event")
fn parse_rtpmap(value: &str) -> Option<(u32, CompactString)> {
    let rest = value.strip_prefix("rtpmap:")?;
    let (id, encoding) = rest.split_once(char::is_whitespace)?;
    let id = id.trim().parse().ok()?;
    let name = encoding.trim().split('/').next()?;
    if name.is_empty() {
        return None;
    }
    Some((id, CompactString::new(name)))
}

/// Dynamic payload types take their alias from rtpmap.
fn apply_rtpmaps(media: &mut SdpMedia, rtpmaps: &[(u32, CompactString)]) {
    for format in media.formats.iter_mut() {
        if static_alias(format.id).is_some() {
            continue;
        }
        if let Some((_, name)) = rtpmaps.iter().find(|(id, _)| *id == format.id) {
            format.alias = name.clone();
        }
    }
}
