//! Free-text log line correlation
//!
//! Stateless: pulls a call identifier out of a single log line, or falls back
//! to classifying the line by severity keyword. No cache is involved.

use bytes::Bytes;
use tracing::debug;

use crate::scan::{contains, find, find_marker};

const ID_MARKER: &[u8] = b"ID=";
const BRACKET_MARKER: &[u8] = b": [";
const PORT_TERMINATOR: &[u8] = b" port ";
const BRACKET_TERMINATOR: &[u8] = b"]: ";

/// Shortest `ID=a` match
const MIN_ID_SPAN: usize = 4;
/// Shortest `: [abcde port ` match
const MIN_PORT_SPAN: usize = 8;
/// Shortest `: [a]: ` match
const MIN_BRACKET_SPAN: usize = 4;
/// Identifiers must be strictly longer than this
const MIN_ID_LEN: usize = 4;
/// Identifiers must be strictly shorter than this
const MAX_ID_LEN: usize = 80;

/// Code of a line that matched nothing
pub const CODE_NONE: u8 = 0;
/// Code of a line carrying a call identifier
pub const CODE_IDENTIFIER: u8 = 100;
/// Code of a line only matching a severity keyword
pub const CODE_SEVERITY: u8 = 112;

/// What a log line correlated to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMatch {
    /// Nothing usable in the line
    None,
    /// A call identifier
    Identifier(Bytes),
    /// Severity classification: `alert`, `warning` or `error`
    Severity(&'static str),
}

impl LogMatch {
    /// Numeric code: 0, 100 or 112
    pub fn code(&self) -> u8 {
        match self {
            LogMatch::None => CODE_NONE,
            LogMatch::Identifier(_) => CODE_IDENTIFIER,
            LogMatch::Severity(_) => CODE_SEVERITY,
        }
    }

    /// The identifier or the severity label
    pub fn call_id(&self) -> Option<Bytes> {
        match self {
            LogMatch::None => None,
            LogMatch::Identifier(id) => Some(id.clone()),
            LogMatch::Severity(label) => Some(Bytes::from_static(label.as_bytes())),
        }
    }

    /// Flatten into `(code, call_id)`
    pub fn into_parts(self) -> (u8, Option<Bytes>) {
        let code = self.code();
        (code, self.call_id())
    }
}

/// Stateless log line correlator
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCorrelator;

impl LogCorrelator {
    pub fn new() -> Self {
        Self
    }

    /// Classify one log line; the first rule whose marker is present decides
    pub fn correlate(&self, line: &[u8]) -> LogMatch {
        correlate_line(line)
    }
}

/// Classify one log line
///
/// Priority: `ID=` identifier, `: [` bracketed identifier, then the severity
/// keywords `alert`, `WARN`, `ERR`. A present identifier marker with a bad
/// span rejects the line without trying later rules.
pub fn correlate_line(line: &[u8]) -> LogMatch {
    if let Some(pos) = find_marker(line, ID_MARKER) {
        return match id_assignment(&line[pos..]) {
            Some(id) => found(id, line),
            None => reject(&line[pos..]),
        };
    }

    if let Some(pos) = find_marker(line, BRACKET_MARKER) {
        return match bracketed_id(&line[pos..]) {
            Some(id) => found(id, line),
            None => reject(&line[pos..]),
        };
    }

    if contains(line, b"alert") {
        LogMatch::Severity("alert")
    } else if contains(line, b"WARN") {
        LogMatch::Severity("warning")
    } else if contains(line, b"ERR") {
        LogMatch::Severity("error")
    } else {
        LogMatch::None
    }
}

/// `ID=<id>` up to the next space, or the rest of a short line
fn id_assignment(rest: &[u8]) -> Option<&[u8]> {
    match memchr::memchr(b' ', rest) {
        Some(end) if end >= MIN_ID_SPAN => Some(&rest[ID_MARKER.len()..end]),
        _ if rest.len() > MIN_ID_LEN && rest.len() < MAX_ID_LEN => Some(&rest[ID_MARKER.len()..]),
        _ => None,
    }
}

/// `: [<id> port ` or `: [<id>]: `
fn bracketed_id(rest: &[u8]) -> Option<&[u8]> {
    let id = match find(rest, PORT_TERMINATOR) {
        Some(end) if end >= MIN_PORT_SPAN => &rest[BRACKET_MARKER.len()..end],
        _ => match find(rest, BRACKET_TERMINATOR) {
            Some(end) if end >= MIN_BRACKET_SPAN => &rest[BRACKET_MARKER.len()..end],
            _ => return None,
        },
    };
    (id.len() > MIN_ID_LEN && id.len() < MAX_ID_LEN).then_some(id)
}

fn found(id: &[u8], line: &[u8]) -> LogMatch {
    debug!(
        target: "log",
        "Found CallID: {} in Logline: '{}'",
        String::from_utf8_lossy(id),
        String::from_utf8_lossy(line)
    );
    LogMatch::Identifier(Bytes::copy_from_slice(id))
}

fn reject(rest: &[u8]) -> LogMatch {
    debug!(target: "log", "No end or fishy Call-ID in '{}'", String::from_utf8_lossy(rest));
    LogMatch::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parts(line: &str) -> (u8, Option<Vec<u8>>) {
        let (code, id) = correlate_line(line.as_bytes()).into_parts();
        (code, id.map(|id| id.to_vec()))
    }

    #[test]
    fn test_id_assignment() {
        assert_eq!(parts("foo ID=abc123 bar"), (100, Some(b"abc123".to_vec())));
        assert_eq!(parts("call ID=abc123"), (100, Some(b"abc123".to_vec())));
    }

    #[test]
    fn test_id_assignment_short_span_takes_rest_of_line() {
        // space right after the marker: the whole remainder is taken
        assert_eq!(parts("x ID= trailing"), (100, Some(b" trailing".to_vec())));
    }

    #[test]
    fn test_id_assignment_rejected() {
        // "ID=a" alone is not longer than 4 bytes
        assert_eq!(parts("x ID=a"), (0, None));
        let long = format!("x ID={}", "z".repeat(100));
        assert_eq!(parts(&long), (0, None));
        // a rejected identifier does not fall through to severity keywords
        assert_eq!(parts("ERR ID=a"), (0, None));
    }

    #[test]
    fn test_bracketed_port() {
        let line = "rtpengine[123]: [5c4f7a8e-1234@host port 30000]: stream started";
        assert_eq!(parts(line), (100, Some(b"5c4f7a8e-1234@host".to_vec())));
    }

    #[test]
    fn test_bracketed_plain() {
        let line = "rtpengine[123]: [callid-42]: Received command 'offer'";
        assert_eq!(parts(line), (100, Some(b"callid-42".to_vec())));
    }

    #[test]
    fn test_bracketed_rejected() {
        // identifier of exactly 4 bytes is too short
        assert_eq!(parts("daemon: [abcd]: hello"), (0, None));
        // no terminator at all
        assert_eq!(parts("daemon: [abcdefgh"), (0, None));
    }

    #[test]
    fn test_severity_keywords() {
        assert_eq!(parts("kernel alert raised"), (112, Some(b"alert".to_vec())));
        assert_eq!(parts("WARN disk almost full"), (112, Some(b"warning".to_vec())));
        assert_eq!(parts("ERR something broke"), (112, Some(b"error".to_vec())));
        // alert outranks the others
        assert_eq!(parts("ERR WARN alert"), (112, Some(b"alert".to_vec())));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(parts("nothing interesting"), (0, None));
        assert_eq!(parts(""), (0, None));
        assert_eq!(correlate_line(b"warn lowercase").code(), CODE_NONE);
    }

    #[test]
    fn test_marker_at_line_start_is_ignored() {
        assert_eq!(parts("ID=abc123 ERR"), (112, Some(b"error".to_vec())));
    }

    proptest! {
        #[test]
        fn never_panics(line in proptest::collection::vec(any::<u8>(), 0..200)) {
            let (code, id) = correlate_line(&line).into_parts();
            prop_assert!(matches!(code, CODE_NONE | CODE_IDENTIFIER | CODE_SEVERITY));
            prop_assert_eq!(code == CODE_NONE, id.is_none());
        }
    }
}
