//! NG control protocol correlation
//!
//! NG commands (as spoken between SIP proxies and rtpengine) are tagged with a
//! cookie. A command carrying a `call-id` teaches the cookie cache which call
//! the cookie belongs to; a later reply carrying `SSRC` statistics under the
//! same cookie is then reported against that call.

pub mod bencode;

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::cache::CacheHandle;
use crate::error::NgError;
use crate::outcome::Outcome;
use crate::stats::CorrelationStats;

pub use bencode::BencodeNgDecoder;

/// Dictionary key carrying the CallID
pub const CALL_ID_KEY: &str = "call-id";
/// Dictionary key carrying per-SSRC QoS statistics
pub const SSRC_KEY: &str = "SSRC";

/// Generic decoded NG value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NgValue {
    Bytes(Bytes),
    Integer(i64),
    List(Vec<NgValue>),
    Dict(BTreeMap<String, NgValue>),
}

impl NgValue {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            NgValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, NgValue>> {
        match self {
            NgValue::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}

/// JSON rendering: byte strings become (lossy UTF-8) strings, dictionaries
/// keep their sorted key order
///
/// Byte strings are emitted as text, not base64; bytes that are not valid
/// UTF-8 become U+FFFD.
impl Serialize for NgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NgValue::Bytes(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            NgValue::Integer(number) => serializer.serialize_i64(*number),
            NgValue::List(items) => items.serialize(serializer),
            NgValue::Dict(entries) => entries.serialize(serializer),
        }
    }
}

/// One decoded NG payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgMessage {
    pub cookie: Bytes,
    pub value: NgValue,
}

/// NG wire decoding
pub trait NgDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<NgMessage, NgError>;
}

/// Correlates NG SSRC statistics with the CallID learnt for their cookie
#[derive(Clone)]
pub struct NgCorrelator {
    decoder: Arc<dyn NgDecoder>,
    cookie: CacheHandle,
    stats: Arc<CorrelationStats>,
}

impl NgCorrelator {
    pub fn new(decoder: Arc<dyn NgDecoder>, cookie: CacheHandle, stats: Arc<CorrelationStats>) -> Self {
        Self { decoder, cookie, stats }
    }

    /// Decode `payload`, remember its `call-id` and resolve its `SSRC` stats
    ///
    /// The `SSRC` lookup sees the cookie cache as it was before this payload:
    /// a CallID must have been learnt from an earlier payload, even when one
    /// payload carries both keys.
    pub fn correlate(&self, payload: &[u8]) -> Outcome {
        let outcome = self.correlate_inner(payload);
        let counter = match &outcome {
            Outcome::Correlated { .. } => &self.stats.ng_correlated,
            Outcome::Uncorrelated => &self.stats.ng_uncorrelated,
            Outcome::Skipped => &self.stats.ng_skipped,
        };
        CorrelationStats::bump(counter);
        outcome
    }

    fn correlate_inner(&self, payload: &[u8]) -> Outcome {
        let message = match self.decoder.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "ng", "{}", e);
                return Outcome::Skipped;
            }
        };
        if message.cookie.is_empty() {
            debug!(target: "ng", "Empty NG cookie");
            return Outcome::Skipped;
        }
        let Some(entries) = message.value.as_dict() else {
            debug!(target: "ng", "NG payload is not a dictionary");
            return Outcome::Skipped;
        };

        let outcome = match entries.get(SSRC_KEY) {
            Some(ssrc) => self.lookup(&message.cookie, ssrc),
            None => Outcome::Skipped,
        };

        if let Some(call_id) = entries.get(CALL_ID_KEY) {
            self.remember(&message.cookie, call_id);
        }

        outcome
    }

    fn lookup(&self, cookie: &[u8], ssrc: &NgValue) -> Outcome {
        let report = match serde_json::to_vec(ssrc) {
            Ok(json) => Bytes::from(json),
            Err(e) => {
                warn!(target: "ng", "{}", e);
                return Outcome::Skipped;
            }
        };

        match self.cookie.get(cookie) {
            Some(call_id) => {
                debug!(
                    target: "ng",
                    "Found CallID: {} and QOS stats: {}",
                    String::from_utf8_lossy(&call_id),
                    String::from_utf8_lossy(&report)
                );
                Outcome::Correlated { report, call_id }
            }
            None => {
                debug!(
                    target: "ng",
                    "No CallID cached for cookie '{}'",
                    String::from_utf8_lossy(cookie)
                );
                Outcome::Uncorrelated
            }
        }
    }

    fn remember(&self, cookie: &[u8], call_id: &NgValue) {
        match call_id.as_bytes() {
            Some(call_id) if !call_id.is_empty() => self.cookie.set(cookie, call_id),
            _ => debug!(target: "ng", "Ignoring unusable call-id value {:?}", call_id),
        }
    }
}
