//! CallID correlation for rvoip capture agents
//!
//! Captured VoIP traffic is only useful once every packet can be tied back to
//! the call it belongs to. SIP carries the CallID; RTCP, NG control messages
//! and media relay log lines do not. This crate bridges that gap:
//!
//! - [`sdp`] reads SIP/SDP payloads and remembers which RTCP endpoint belongs
//!   to which CallID
//! - [`rtcp`] attributes RTCP reports to a CallID by SSRC or by socket address
//! - [`logline`] extracts call identifiers or a severity from log lines
//! - [`ng`] ties NG `SSRC` statistics to the `call-id` seen for their cookie
//!
//! All state lives in bounded concurrent caches ([`cache`]) shared by the
//! [`CorrelationEngine`].
//!
//! ```
//! use std::net::SocketAddr;
//! use rvoip_correlation_core::prelude::*;
//!
//! let engine = CorrelationEngine::default();
//! let invite = b"INVITE sip:bob@example.com SIP/2.0\r\n\
//!     Call-ID: doc-call@example.com\r\n\r\n\
//!     v=0\r\nc=IN IP4 192.0.2.10\r\nm=audio 40000 RTP/AVP 0\r\n";
//! engine.extract_sdp(invite).unwrap();
//!
//! let src: SocketAddr = "192.0.2.10:40001".parse().unwrap();
//! let dst: SocketAddr = "198.51.100.1:6000".parse().unwrap();
//! // an RTCP receiver report without report blocks
//! let rtcp = [0x80, 201, 0, 1, 0, 0, 0, 7];
//! let outcome = engine.correlate_rtcp(src, dst, &rtcp);
//! assert_eq!(outcome.call_id().unwrap().as_ref(), b"doc-call@example.com");
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod logline;
pub mod ng;
pub mod outcome;
pub mod rtcp;
pub mod scan;
pub mod sdp;
pub mod stats;

pub use cache::{ByteBudgetCache, CacheHandle, CacheSet, CorrelationCache};
pub use config::{CorrelatorConfig, LogSettings};
pub use engine::{CorrelationEngine, CorrelationEngineBuilder};
pub use error::{CorrelationError, NgError, Result, RtcpError};
pub use logging::{setup_logging, LoggingConfig};
pub use logline::{LogCorrelator, LogMatch};
pub use ng::{BencodeNgDecoder, NgCorrelator, NgDecoder, NgMessage, NgValue};
pub use outcome::Outcome;
pub use rtcp::{CompoundRtcpDecoder, RtcpCorrelator, RtcpDecoded, RtcpDecoder};
pub use sdp::{SdpExtractor, SdpRejection};
pub use stats::{CorrelationStats, StatsSnapshot};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        CorrelationEngine, CorrelationEngineBuilder, CorrelatorConfig,
        Outcome, LogMatch, SdpRejection, StatsSnapshot,
        CorrelationError, Result,
    };

    pub use crate::cache::{ByteBudgetCache, CacheHandle, CorrelationCache};
}
