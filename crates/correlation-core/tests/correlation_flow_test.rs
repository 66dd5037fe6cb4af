//! End to end correlation flows through the public engine API

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::{BufMut, Bytes, BytesMut};
use rvoip_correlation_core::prelude::*;
use rvoip_correlation_core::{LogCorrelator, NgValue, RtcpDecoded, RtcpDecoder};

const CALL_ID: &[u8] = b"3c26700b5a8f@alice.example.org";

fn invite(connection: &str, media: &str, extra: &str) -> Vec<u8> {
    format!(
        "INVITE sip:bob@example.org SIP/2.0\r\n\
         Via: SIP/2.0/UDP alice.example.org;branch=z9hG4bK74bf9\r\n\
         Call-ID: 3c26700b5a8f@alice.example.org\r\n\
         CSeq: 1 INVITE\r\n\
         Content-Type: application/sdp\r\n\r\n\
         v=0\r\no=alice 2890844526 2890844526 IN IP4 alice.example.org\r\n\
         s=-\r\n{}\r\nt=0 0\r\n{}\r\n{}",
        connection, media, extra
    )
    .into_bytes()
}

/// Minimal RTCP receiver report without report blocks
fn receiver_report(ssrc: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(0x80);
    buf.put_u8(201);
    buf.put_u16(1);
    buf.put_u32(ssrc);
    buf.to_vec()
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// Cache recording every key it was asked for
#[derive(Default)]
struct RecordingCache {
    inner: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    reads: Mutex<Vec<Vec<u8>>>,
}

impl RecordingCache {
    fn reads(&self) -> Vec<Vec<u8>> {
        self.reads.lock().unwrap().clone()
    }
}

impl CorrelationCache for RecordingCache {
    fn set(&self, key: &[u8], value: &[u8]) {
        let mut entries = self.inner.lock().unwrap();
        entries.retain(|(k, _)| k != key);
        entries.push((key.to_vec(), value.to_vec()));
    }

    fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.reads.lock().unwrap().push(key.to_vec());
        self.inner
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| Bytes::copy_from_slice(v))
    }
}

#[test]
fn rtcp_resolves_through_sdp_then_ssrc() {
    let engine = CorrelationEngine::default();
    engine
        .extract_sdp(&invite("c=IN IP4 192.0.2.10", "m=audio 49170 RTP/AVP 0 8", ""))
        .unwrap();

    let outcome = engine.correlate_rtcp(addr("192.0.2.10:49171"), addr("198.51.100.7:20000"), &receiver_report(0x1111));
    assert_eq!(outcome.call_id().unwrap().as_ref(), CALL_ID);

    let report: serde_json::Value = serde_json::from_slice(outcome.report().unwrap()).unwrap();
    assert_eq!(report["type"], 201);
    assert_eq!(report["ssrc"], 0x1111);

    // the stream moved (NAT rebinding) but the promoted SSRC still resolves
    let outcome = engine.correlate_rtcp(addr("203.0.113.5:1024"), addr("203.0.113.6:1025"), &receiver_report(0x1111));
    assert_eq!(outcome.call_id().unwrap().as_ref(), CALL_ID);
}

#[test]
fn explicit_rtcp_attribute_is_used_verbatim() {
    let engine = CorrelationEngine::default();
    engine
        .extract_sdp(&invite("c=IN IP4 192.0.2.10", "m=audio 49170 RTP/AVP 0", "a=rtcp:53020\r\n"))
        .unwrap();

    let miss = engine.correlate_rtcp(addr("192.0.2.10:49171"), addr("198.51.100.7:1"), &receiver_report(1));
    assert_eq!(miss, Outcome::Uncorrelated);

    let hit = engine.correlate_rtcp(addr("198.51.100.7:1"), addr("192.0.2.10:53020"), &receiver_report(2));
    assert_eq!(hit.call_id().unwrap().as_ref(), CALL_ID);
}

#[test]
fn ssrc_hit_never_reads_address_cache() {
    let address_port = Arc::new(RecordingCache::default());
    let ssrc = Arc::new(RecordingCache::default());
    ssrc.set(&0x2222u32.to_be_bytes(), b"known-call");

    let engine = CorrelationEngine::builder()
        .address_port_cache(address_port.clone())
        .ssrc_cache(ssrc.clone())
        .build();

    let outcome = engine.correlate_rtcp(addr("10.1.1.1:5000"), addr("10.1.1.2:5002"), &receiver_report(0x2222));
    assert_eq!(outcome.call_id().unwrap().as_ref(), b"known-call");
    assert!(address_port.reads().is_empty());
}

#[test]
fn address_lookup_order_is_source_then_destination() {
    let address_port = Arc::new(RecordingCache::default());
    let engine = CorrelationEngine::builder()
        .address_port_cache(address_port.clone())
        .build();

    let outcome = engine.correlate_rtcp(addr("10.1.1.1:5001"), addr("[::ffff:10.1.1.2]:5003"), &receiver_report(3));
    assert_eq!(outcome, Outcome::Uncorrelated);
    assert_eq!(address_port.reads(), vec![b"10.1.1.15001".to_vec(), b"10.1.1.25003".to_vec()]);
}

#[test]
fn informational_rtcp_is_skipped() {
    let engine = CorrelationEngine::default();
    // BYE only
    let bye = [0x81, 203, 0, 1, 0, 0, 0, 9];
    assert_eq!(engine.correlate_rtcp(addr("10.0.0.1:1"), addr("10.0.0.2:2"), &bye), Outcome::Skipped);
    // truncated
    assert_eq!(engine.correlate_rtcp(addr("10.0.0.1:1"), addr("10.0.0.2:2"), &[0x80]), Outcome::Skipped);
    assert_eq!(engine.stats().rtcp_skipped, 2);
}

#[test]
fn custom_rtcp_decoder_is_honoured() {
    struct Opaque;
    impl RtcpDecoder for Opaque {
        fn decode(&self, payload: &[u8]) -> RtcpDecoded {
            RtcpDecoded {
                ssrc: Some(Bytes::copy_from_slice(&payload[..2])),
                report: Some(Bytes::from_static(b"opaque")),
                diagnostic: None,
            }
        }
    }

    let engine = CorrelationEngine::builder().rtcp_decoder(Arc::new(Opaque)).build();
    engine.caches().ssrc.set(b"ab", b"call-ab");
    let outcome = engine.correlate_rtcp(addr("10.0.0.1:1"), addr("10.0.0.2:2"), b"abcd");
    assert_eq!(
        outcome.into_parts(),
        (Some(Bytes::from_static(b"opaque")), Some(Bytes::from_static(b"call-ab")))
    );
}

#[test]
fn short_connection_address_writes_nothing() {
    let address_port = Arc::new(RecordingCache::default());
    let engine = CorrelationEngine::builder()
        .address_port_cache(address_port.clone())
        .build();

    let payload = invite("c=IN IP4 1.1.1.", "m=audio 49170 RTP/AVP 0", "");
    assert_eq!(engine.extract_sdp(&payload), Err(SdpRejection::Address));
    assert!(address_port.inner.lock().unwrap().is_empty());
}

#[test]
fn new_call_resolves_with_full_address_cache() {
    let address_port = Arc::new(ByteBudgetCache::new("address_port", 4096));
    for i in 0..2000u32 {
        let key = format!("198.51.100.{}{}", i % 250, 30000 + i);
        address_port.set(key.as_bytes(), b"earlier-call@host");
        for _ in 0..3 {
            let _ = address_port.get(key.as_bytes());
        }
    }
    address_port.entry_count();

    let engine = CorrelationEngine::builder()
        .address_port_cache(address_port.clone())
        .build();
    engine
        .extract_sdp(&invite("c=IN IP4 192.0.2.10", "m=audio 49170 RTP/AVP 0", ""))
        .unwrap();
    address_port.entry_count();

    let outcome = engine.correlate_rtcp(addr("192.0.2.10:49171"), addr("198.51.100.7:1"), &receiver_report(0x5151));
    assert_eq!(outcome.call_id().unwrap().as_ref(), CALL_ID);
}

#[test]
fn sdp_extraction_is_idempotent() {
    let engine = CorrelationEngine::default();
    let payload = invite("c=IN IP4 192.0.2.10", "m=audio 49170 RTP/AVP 0", "");
    for _ in 0..3 {
        engine.extract_sdp(&payload).unwrap();
    }
    assert_eq!(
        engine.caches().address_port.get(b"192.0.2.1049171").unwrap().as_ref(),
        CALL_ID
    );
    assert_eq!(engine.stats().sdp_cached, 3);
}

#[test]
fn log_lines() {
    let correlator = LogCorrelator::new();
    let cases: &[(&str, u8, Option<&str>)] = &[
        ("sems[42]: session ID=9f8e7d6c-call started", 100, Some("9f8e7d6c-call")),
        ("rtpengine[7]: [3c26700b5a8f@alice port 30000]: unkernelize", 100, Some("3c26700b5a8f@alice")),
        ("rtpengine[7]: [3c26700b5a8f@alice]: Final packet stats", 100, Some("3c26700b5a8f@alice")),
        ("kamailio: ERR: tm [t_reply.c:123]", 112, Some("error")),
        ("freeswitch: alert trunk down", 112, Some("alert")),
        ("asterisk: WARN codec mismatch", 112, Some("warning")),
        ("all quiet", 0, None),
    ];
    for (line, code, id) in cases {
        let (got_code, got_id) = correlator.correlate(line.as_bytes()).into_parts();
        assert_eq!(got_code, *code, "{}", line);
        assert_eq!(got_id.as_deref(), id.map(str::as_bytes), "{}", line);
    }
}

#[test]
fn ng_cookie_flow() {
    let engine = CorrelationEngine::default();

    let offer = b"8421_7 d7:call-id30:3c26700b5a8f@alice.example.org7:command5:offere";
    assert_eq!(engine.correlate_ng(offer), Outcome::Skipped);

    let delete = b"8421_7 d4:SSRCd4:4660d11:packet lossi3eee6:result2:oke";
    let outcome = engine.correlate_ng(delete);
    assert_eq!(outcome.call_id().unwrap().as_ref(), CALL_ID);
    let report: serde_json::Value = serde_json::from_slice(outcome.report().unwrap()).unwrap();
    assert_eq!(report["4660"]["packet loss"], 3);

    // unknown cookie
    let other = b"9999_1 d4:SSRCd1:1i1eee";
    assert_eq!(engine.correlate_ng(other), Outcome::Uncorrelated);

    let stats = engine.stats();
    assert_eq!((stats.ng_correlated, stats.ng_uncorrelated, stats.ng_skipped), (1, 1, 1));
}

#[test]
fn ng_value_renders_as_json() {
    let value = rvoip_correlation_core::ng::bencode::decode_value(b"d3:mosl1:4i3ee3:ssrci7ee").unwrap();
    assert!(matches!(value, NgValue::Dict(_)));
    assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"mos":["4",3],"ssrc":7}"#);
}

#[test]
fn engine_shared_across_workers() {
    let engine = Arc::new(CorrelationEngine::default());
    engine
        .extract_sdp(&invite("c=IN IP4 192.0.2.10", "m=audio 49170 RTP/AVP 0", ""))
        .unwrap();

    let handles: Vec<_> = (0..8u32)
        .map(|worker| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..100u32 {
                    let ssrc = worker * 1000 + i;
                    let outcome =
                        engine.correlate_rtcp(addr("192.0.2.10:49171"), addr("198.51.100.7:1"), &receiver_report(ssrc));
                    assert_eq!(outcome.call_id().unwrap().as_ref(), CALL_ID);
                    engine.correlate_log(b"noise WARN");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = engine.stats();
    assert_eq!(stats.rtcp_correlated, 800);
    assert_eq!(stats.rtcp_promoted, 800);
    assert_eq!(stats.log_severity, 800);
    assert_eq!(
        engine.caches().ssrc.get(&7042u32.to_be_bytes()).unwrap().as_ref(),
        CALL_ID
    );
}
