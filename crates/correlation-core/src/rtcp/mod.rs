//! RTCP to CallID correlation
//!
//! RTCP reports carry no call identifier. A report is attributed to a call by
//! its SSRC when the SSRC was seen before, otherwise by the socket address it
//! travelled on, matched against the RTCP endpoints announced in SDP. A hit
//! through the address path is promoted into the SSRC cache so later reports
//! of the same stream resolve directly.

pub mod decoder;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::cache::CacheHandle;
use crate::outcome::Outcome;
use crate::stats::CorrelationStats;

pub use decoder::{CompoundRtcpDecoder, QosReport, RtcpReportBlock, SenderInfo};

/// What an RTCP decoder extracted from one datagram
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcpDecoded {
    /// Opaque SSRC key
    pub ssrc: Option<Bytes>,
    /// Encoded QoS report; `None` for purely informational packets
    pub report: Option<Bytes>,
    /// Human readable notes about discarded or malformed parts
    pub diagnostic: Option<String>,
}

/// Binary RTCP decoding
pub trait RtcpDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> RtcpDecoded;
}

/// Address/port cache key of an observed socket: textual IP immediately
/// followed by the textual port
pub fn address_port_key(addr: SocketAddr) -> String {
    format!("{}{}", addr.ip().to_canonical(), addr.port())
}

/// Resolves RTCP reports to CallIDs through the SSRC and address/port caches
#[derive(Clone)]
pub struct RtcpCorrelator {
    decoder: Arc<dyn RtcpDecoder>,
    address_port: CacheHandle,
    ssrc: CacheHandle,
    stats: Arc<CorrelationStats>,
}

impl RtcpCorrelator {
    pub fn new(
        decoder: Arc<dyn RtcpDecoder>,
        address_port: CacheHandle,
        ssrc: CacheHandle,
        stats: Arc<CorrelationStats>,
    ) -> Self {
        Self {
            decoder,
            address_port,
            ssrc,
            stats,
        }
    }

    /// Decode `payload` observed from `src` to `dst` and find its CallID
    ///
    /// Lookup order: SSRC cache, then the source address, then the
    /// destination address. The SSRC check and the promotion write are not
    /// atomic; racing workers promote the same value.
    pub fn correlate(&self, src: SocketAddr, dst: SocketAddr, payload: &[u8]) -> Outcome {
        let decoded = self.decoder.decode(payload);
        let ssrc = decoded.ssrc.filter(|ssrc| !ssrc.is_empty());

        if let Some(info) = &decoded.diagnostic {
            debug!(
                target: "rtcp",
                "ssrc={}, src={}, dst={}, {}",
                ssrc.as_deref().map(hex).unwrap_or_default(),
                src,
                dst,
                info
            );
        }

        let Some(report) = decoded.report.filter(|report| !report.is_empty()) else {
            CorrelationStats::bump(&self.stats.rtcp_skipped);
            return Outcome::Skipped;
        };

        if let Some(ssrc) = &ssrc {
            if let Some(call_id) = self.ssrc.get(ssrc) {
                debug!(
                    target: "rtcp",
                    "Found '{}:{}' in SSRC cache src={}, dst={}",
                    hex(ssrc),
                    String::from_utf8_lossy(&call_id),
                    src,
                    dst
                );
                CorrelationStats::bump(&self.stats.rtcp_correlated);
                return Outcome::Correlated { report, call_id };
            }
        }

        for (direction, addr) in [("src", src), ("dst", dst)] {
            let key = address_port_key(addr);
            if let Some(call_id) = self.address_port.get(key.as_bytes()) {
                debug!(
                    target: "rtcp",
                    "Found '{}:{}' in address/port cache via {}",
                    key,
                    String::from_utf8_lossy(&call_id),
                    direction
                );
                self.promote(ssrc.as_deref(), &call_id);
                CorrelationStats::bump(&self.stats.rtcp_correlated);
                return Outcome::Correlated { report, call_id };
            }
        }

        debug!(
            target: "rtcp",
            "No correlationID for src={}, dst={}, payload={}",
            src,
            dst,
            String::from_utf8_lossy(&report)
        );
        CorrelationStats::bump(&self.stats.rtcp_uncorrelated);
        Outcome::Uncorrelated
    }

    fn promote(&self, ssrc: Option<&[u8]>, call_id: &[u8]) {
        match ssrc {
            Some(ssrc) => {
                self.ssrc.set(ssrc, call_id);
                CorrelationStats::bump(&self.stats.rtcp_promoted);
            }
            None => debug!(target: "rtcp", "No SSRC in report, skipping promotion"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
