//! SDP address/port extraction
//!
//! Learns which CallID owns a media address by reading the SDP body of SIP
//! messages. The RTCP endpoint announced for the audio stream (connection
//! address plus RTCP port) is written to the address/port cache, where the
//! RTCP correlator later finds it.

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use crate::cache::CacheHandle;
use crate::scan::{self, Scan};

/// Why an SDP payload was not cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpRejection {
    /// No `c=IN IP` or no `m=audio ` line
    NotSdp,
    /// Connection line missing its CRLF or too short
    Address,
    /// RTCP attribute or media port failed its length heuristic
    Port,
    /// No Call-ID header
    MissingCallId,
    /// Call-ID header failed its length heuristic or is blank
    CallId,
}

/// Extracts `address‖rtcp-port -> CallID` entries from SIP/SDP payloads
#[derive(Clone)]
pub struct SdpExtractor {
    address_port: CacheHandle,
}

impl SdpExtractor {
    /// Create an extractor writing into `address_port`
    pub fn new(address_port: CacheHandle) -> Self {
        Self { address_port }
    }

    /// Scan `payload` and cache its RTCP endpoint under its CallID
    ///
    /// Every failure is a logged, silent abort; the cache is only written
    /// once address, port and CallID were all located.
    pub fn extract(&self, payload: &[u8]) -> Result<(), SdpRejection> {
        let (key, call_id) = scan_sdp(payload)?;
        self.address_port.set(&key, call_id);
        debug!(
            target: "sdp",
            "Cached {} -> {}",
            String::from_utf8_lossy(&key),
            String::from_utf8_lossy(call_id)
        );
        Ok(())
    }
}

/// Locate the RTCP endpoint key and the trimmed CallID of an SDP payload
pub fn scan_sdp(payload: &[u8]) -> Result<(BytesMut, &[u8]), SdpRejection> {
    if !scan::has_audio_sdp(payload) {
        return Err(SdpRejection::NotSdp);
    }

    let address = match scan::connection_address(payload) {
        Scan::Found(address) => address,
        other => {
            debug!(target: "sdp", "No end or fishy SDP IP in '{}'", lossy_rest(other));
            return Err(SdpRejection::Address);
        }
    };

    let mut key = BytesMut::with_capacity(address.len() + 5);
    key.put_slice(address);

    match scan::rtcp_attribute_port(payload) {
        Scan::Found(port) => key.put_slice(port),
        Scan::Malformed(rest) => {
            debug!(target: "sdp", "No end or fishy SDP RTCP Port in '{}'", String::from_utf8_lossy(rest));
            return Err(SdpRejection::Port);
        }
        Scan::Missing => match scan::audio_media_port(payload) {
            Scan::Found(port) => {
                key.put_slice(port);
                increment_last_byte(&mut key);
            }
            other => {
                debug!(target: "sdp", "No end or fishy SDP RTP Port in '{}'", lossy_rest(other));
                return Err(SdpRejection::Port);
            }
        },
    }

    let call_id = match scan::call_id_header(payload) {
        Scan::Found(raw) => scan::trim(raw),
        Scan::Malformed(rest) => {
            debug!(target: "sdp", "No end or fishy Call-ID in '{}'", String::from_utf8_lossy(rest));
            return Err(SdpRejection::CallId);
        }
        Scan::Missing => {
            warn!(target: "sdp", "No Call-ID in '{}'", String::from_utf8_lossy(payload));
            return Err(SdpRejection::MissingCallId);
        }
    };
    if call_id.is_empty() {
        debug!(target: "sdp", "Blank Call-ID in SDP payload");
        return Err(SdpRejection::CallId);
    }

    Ok((key, call_id))
}

/// Derive the conventional RTCP port (RTP + 1) by bumping the last digit's
/// byte value. A trailing '9' becomes ':' rather than carrying.
fn increment_last_byte(key: &mut BytesMut) {
    if let Some(last) = key.last_mut() {
        *last = last.wrapping_add(1);
    }
}

fn lossy_rest(scan: Scan<'_>) -> String {
    match scan {
        Scan::Found(bytes) | Scan::Malformed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Scan::Missing => String::new(),
    }
}
