//! Correlation engine
//!
//! Owns the caches and wires them into the four correlators. One engine is
//! shared (behind an `Arc`) by every packet worker of a capture agent; all
//! entry points take `&self`.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheHandle, CacheSet};
use crate::config::CorrelatorConfig;
use crate::logline::{LogCorrelator, LogMatch};
use crate::ng::{BencodeNgDecoder, NgCorrelator, NgDecoder};
use crate::outcome::Outcome;
use crate::rtcp::{CompoundRtcpDecoder, RtcpCorrelator, RtcpDecoder};
use crate::sdp::{SdpExtractor, SdpRejection};
use crate::stats::{CorrelationStats, StatsSnapshot};

/// Entry point for all correlation work
#[derive(Clone)]
pub struct CorrelationEngine {
    caches: CacheSet,
    sdp: SdpExtractor,
    rtcp: RtcpCorrelator,
    log: LogCorrelator,
    ng: NgCorrelator,
    stats: Arc<CorrelationStats>,
}

impl CorrelationEngine {
    /// Engine with byte-budget caches and the default decoders
    pub fn new(config: &CorrelatorConfig) -> Self {
        Self::builder().config(config.clone()).build()
    }

    pub fn builder() -> CorrelationEngineBuilder {
        CorrelationEngineBuilder::default()
    }

    /// Learn the RTCP endpoint of a SIP/SDP payload
    pub fn extract_sdp(&self, payload: &[u8]) -> Result<(), SdpRejection> {
        let result = self.sdp.extract(payload);
        let counter = match result {
            Ok(()) => &self.stats.sdp_cached,
            Err(_) => &self.stats.sdp_rejected,
        };
        CorrelationStats::bump(counter);
        result
    }

    /// Attribute an RTCP datagram seen from `src` to `dst` to a call
    pub fn correlate_rtcp(&self, src: SocketAddr, dst: SocketAddr, payload: &[u8]) -> Outcome {
        self.rtcp.correlate(src, dst, payload)
    }

    /// Extract a call identifier or severity from a log line
    pub fn correlate_log(&self, line: &[u8]) -> LogMatch {
        let matched = self.log.correlate(line);
        let counter = match matched {
            LogMatch::Identifier(_) => &self.stats.log_identifier,
            LogMatch::Severity(_) => &self.stats.log_severity,
            LogMatch::None => &self.stats.log_unmatched,
        };
        CorrelationStats::bump(counter);
        matched
    }

    /// Learn or resolve NG cookies
    pub fn correlate_ng(&self, payload: &[u8]) -> Outcome {
        self.ng.correlate(payload)
    }

    /// Handles to the caches, e.g. to share the cookie cache
    pub fn caches(&self) -> &CacheSet {
        &self.caches
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Builder for [`CorrelationEngine`] allowing caches and decoders to be
/// swapped
#[derive(Default)]
pub struct CorrelationEngineBuilder {
    config: CorrelatorConfig,
    address_port: Option<CacheHandle>,
    ssrc: Option<CacheHandle>,
    cookie: Option<CacheHandle>,
    rtcp_decoder: Option<Arc<dyn RtcpDecoder>>,
    ng_decoder: Option<Arc<dyn NgDecoder>>,
}

impl CorrelationEngineBuilder {
    /// Budgets for caches not supplied explicitly
    pub fn config(mut self, config: CorrelatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn address_port_cache(mut self, cache: CacheHandle) -> Self {
        self.address_port = Some(cache);
        self
    }

    pub fn ssrc_cache(mut self, cache: CacheHandle) -> Self {
        self.ssrc = Some(cache);
        self
    }

    /// Use an externally owned cookie cache
    pub fn cookie_cache(mut self, cache: CacheHandle) -> Self {
        self.cookie = Some(cache);
        self
    }

    pub fn rtcp_decoder(mut self, decoder: Arc<dyn RtcpDecoder>) -> Self {
        self.rtcp_decoder = Some(decoder);
        self
    }

    pub fn ng_decoder(mut self, decoder: Arc<dyn NgDecoder>) -> Self {
        self.ng_decoder = Some(decoder);
        self
    }

    pub fn build(self) -> CorrelationEngine {
        let defaults = CacheSet::from_config(&self.config);
        let caches = CacheSet {
            address_port: self.address_port.unwrap_or(defaults.address_port),
            ssrc: self.ssrc.unwrap_or(defaults.ssrc),
            cookie: self.cookie.unwrap_or(defaults.cookie),
        };
        let stats = Arc::new(CorrelationStats::new());
        let rtcp_decoder = self
            .rtcp_decoder
            .unwrap_or_else(|| Arc::new(CompoundRtcpDecoder::new()));
        let ng_decoder = self
            .ng_decoder
            .unwrap_or_else(|| Arc::new(BencodeNgDecoder::new()));

        info!(
            target: "engine",
            "Correlation engine ready (address/port {} B, ssrc {} B, cookie {} B)",
            self.config.address_port_cache_bytes,
            self.config.ssrc_cache_bytes,
            self.config.cookie_cache_bytes
        );

        CorrelationEngine {
            sdp: SdpExtractor::new(caches.address_port.clone()),
            rtcp: RtcpCorrelator::new(rtcp_decoder, caches.address_port.clone(), caches.ssrc.clone(), stats.clone()),
            log: LogCorrelator::new(),
            ng: NgCorrelator::new(ng_decoder, caches.cookie.clone(), stats.clone()),
            caches,
            stats,
        }
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::builder().build()
    }
}
