//! Byte scanners for the SIP/SDP lines the correlators care about
//!
//! Each scanner looks for one line type in a raw payload and returns a
//! [`Scan`]: the value span, `Missing` when the marker is absent, or
//! `Malformed` when the marker is present but the span fails its length
//! heuristic. Nothing here allocates or validates protocol conformance.
//!
//! A marker only counts when it is found past the first byte of the payload;
//! a SIP message always starts with its request or status line.

use memchr::memmem;

/// SDP connection line, `c=IN IP4 ` / `c=IN IP6 `
pub const CONNECTION_MARKER: &[u8] = b"c=IN IP";
/// SDP audio media line
pub const AUDIO_MEDIA_MARKER: &[u8] = b"m=audio ";
/// SDP RTCP port attribute (RFC 3605)
pub const RTCP_ATTRIBUTE_MARKER: &[u8] = b"a=rtcp:";
/// Long form Call-ID header, matched on its prefix
pub const CALL_ID_MARKER: &[u8] = b"Call-I";
/// Compact form Call-ID header
pub const COMPACT_CALL_ID_MARKER: &[u8] = b"i: ";

pub(crate) const CRLF: &[u8] = b"\r\n";
const RTP_TOKEN: &[u8] = b" RTP";
const CALL_ID_NAME: &[u8] = b"Call-ID:";

/// Shortest connection line, `c=IN IP4 1.1.1.1`
pub const MIN_CONNECTION_SPAN: usize = 16;
/// Shortest media line prefix, `m=audio 1000`
pub const MIN_MEDIA_SPAN: usize = 12;
/// Shortest RTCP attribute, `a=rtcp:1000`
pub const MIN_RTCP_ATTRIBUTE_SPAN: usize = 11;
/// Longest CRLF terminated RTCP attribute, `a=rtcp:65535`
pub const MAX_RTCP_ATTRIBUTE_SPAN: usize = 13;
/// Shortest Call-ID header, `Call-ID: a`
pub const MIN_CALL_ID_SPAN: usize = 10;
/// Shortest compact Call-ID header, `i: a`
pub const MIN_COMPACT_CALL_ID_SPAN: usize = 4;

/// Outcome of scanning for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan<'a> {
    /// The field value
    Found(&'a [u8]),
    /// The marker does not occur
    Missing,
    /// The marker occurs but the field fails its length heuristic; carries
    /// the payload from the marker on, for diagnostics
    Malformed(&'a [u8]),
}

impl<'a> Scan<'a> {
    /// The value, if found
    pub fn found(self) -> Option<&'a [u8]> {
        match self {
            Scan::Found(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the field was found
    pub fn is_found(&self) -> bool {
        matches!(self, Scan::Found(_))
    }
}

/// Offset of the first occurrence of `needle`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memmem::find(haystack, needle)
}

/// Offset of the first occurrence of `needle`, ignored when at offset 0
pub fn find_marker(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    find(haystack, needle).filter(|&pos| pos > 0)
}

/// Whether `haystack` contains `needle` anywhere
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// Whether the payload carries both an SDP connection line and an audio
/// media line
pub fn has_audio_sdp(payload: &[u8]) -> bool {
    find_marker(payload, CONNECTION_MARKER).is_some() && find_marker(payload, AUDIO_MEDIA_MARKER).is_some()
}

/// Connection address, the text between `c=IN IPx ` and CRLF
pub fn connection_address(payload: &[u8]) -> Scan<'_> {
    let Some(pos) = find_marker(payload, CONNECTION_MARKER) else {
        return Scan::Missing;
    };
    let rest = &payload[pos..];
    match find(rest, CRLF) {
        // skip the address type digit and the separating space
        Some(end) if end >= MIN_CONNECTION_SPAN => Scan::Found(&rest[CONNECTION_MARKER.len() + 2..end]),
        _ => Scan::Malformed(rest),
    }
}

/// RTP port of the audio media line, the text between `m=audio ` and ` RTP`
pub fn audio_media_port(payload: &[u8]) -> Scan<'_> {
    let Some(pos) = find_marker(payload, AUDIO_MEDIA_MARKER) else {
        return Scan::Missing;
    };
    let rest = &payload[pos..];
    match find(rest, RTP_TOKEN) {
        Some(end) if end >= MIN_MEDIA_SPAN => Scan::Found(&rest[AUDIO_MEDIA_MARKER.len()..end]),
        _ => Scan::Malformed(rest),
    }
}

/// Explicit RTCP port of an `a=rtcp:` attribute
///
/// A CRLF terminated attribute is accepted when 11 to 13 bytes long. Any
/// other shape (attribute carrying an address, no CRLF at all) falls back to
/// the text up to the next space.
pub fn rtcp_attribute_port(payload: &[u8]) -> Scan<'_> {
    let Some(pos) = find_marker(payload, RTCP_ATTRIBUTE_MARKER) else {
        return Scan::Missing;
    };
    let rest = &payload[pos..];
    if let Some(end) = find(rest, CRLF) {
        if (MIN_RTCP_ATTRIBUTE_SPAN..=MAX_RTCP_ATTRIBUTE_SPAN).contains(&end) {
            return Scan::Found(&rest[RTCP_ATTRIBUTE_MARKER.len()..end]);
        }
    }
    match memchr::memchr(b' ', rest) {
        Some(end) if end >= MIN_RTCP_ATTRIBUTE_SPAN => Scan::Found(&rest[RTCP_ATTRIBUTE_MARKER.len()..end]),
        _ => Scan::Malformed(rest),
    }
}

/// Raw Call-ID header value, untrimmed
///
/// The long form wins whenever its marker is present, even if its span is
/// malformed; the compact `i: ` form is only consulted when no long form
/// marker exists.
pub fn call_id_header(payload: &[u8]) -> Scan<'_> {
    if let Some(pos) = find_marker(payload, CALL_ID_MARKER) {
        let rest = &payload[pos..];
        return match find(rest, CRLF) {
            Some(end) if end >= MIN_CALL_ID_SPAN => Scan::Found(&rest[CALL_ID_NAME.len()..end]),
            _ => Scan::Malformed(rest),
        };
    }
    if let Some(pos) = find_marker(payload, COMPACT_CALL_ID_MARKER) {
        let rest = &payload[pos..];
        return match find(rest, CRLF) {
            Some(end) if end >= MIN_COMPACT_CALL_ID_SPAN => Scan::Found(&rest[COMPACT_CALL_ID_MARKER.len()..end]),
            _ => Scan::Malformed(rest),
        };
    }
    Scan::Missing
}

/// Strip ASCII whitespace from both ends
pub fn trim(value: &[u8]) -> &[u8] {
    value.trim_ascii()
}
