//! Compound RTCP decoding into an SSRC key and a JSON QoS report

use bytes::{Buf, Bytes};
use serde::Serialize;

use super::{RtcpDecoded, RtcpDecoder};
use crate::error::RtcpError;

/// RTCP packet types (RFC 3550, RFC 4585, RFC 3611)
pub const RTCP_SR: u8 = 200;
pub const RTCP_RR: u8 = 201;
pub const RTCP_SDES: u8 = 202;
pub const RTCP_BYE: u8 = 203;
pub const RTCP_APP: u8 = 204;
pub const RTCP_RTPFB: u8 = 205;
pub const RTCP_PSFB: u8 = 206;
pub const RTCP_XR: u8 = 207;

const HEADER_SIZE: usize = 4;

type Result<T> = std::result::Result<T, RtcpError>;

/// Report block in RTCP SR/RR packets
/// Defined in RFC 3550 Section 6.4.1 and 6.4.2
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RtcpReportBlock {
    /// SSRC identifier of the source this report is for
    pub ssrc: u32,

    /// Fraction of packets lost since last report
    pub fraction_lost: u8,

    /// Cumulative number of packets lost
    pub cumulative_lost: u32,

    /// Extended highest sequence number received
    pub highest_seq: u32,

    /// Interarrival jitter estimate
    pub jitter: u32,

    /// Last SR timestamp from this source
    pub last_sr: u32,

    /// Delay since last SR from this source (in units of 1/65536 seconds)
    pub delay_since_last_sr: u32,
}

impl RtcpReportBlock {
    /// Size of a report block in bytes
    pub const SIZE: usize = 24;

    /// Parse a report block from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        ensure(buf, Self::SIZE)?;

        let ssrc = buf.get_u32();

        // Fraction lost (8 bits) + cumulative lost (24 bits)
        let fraction_lost = buf.get_u8();
        let cumulative_lost = (buf.get_u8() as u32) << 16 | (buf.get_u8() as u32) << 8 | buf.get_u8() as u32;

        Ok(Self {
            ssrc,
            fraction_lost,
            cumulative_lost,
            highest_seq: buf.get_u32(),
            jitter: buf.get_u32(),
            last_sr: buf.get_u32(),
            delay_since_last_sr: buf.get_u32(),
        })
    }
}

/// Sender information of an SR packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderInfo {
    /// NTP timestamp, integer part
    pub ntp_timestamp_sec: u32,
    /// NTP timestamp, fractional part
    pub ntp_timestamp_frac: u32,
    pub rtp_timestamp: u32,
    /// Sender's packet count
    pub packets: u32,
    /// Sender's octet count
    pub octets: u32,
}

impl SenderInfo {
    pub const SIZE: usize = 20;

    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        ensure(buf, Self::SIZE)?;
        Ok(Self {
            ntp_timestamp_sec: buf.get_u32(),
            ntp_timestamp_frac: buf.get_u32(),
            rtp_timestamp: buf.get_u32(),
            packets: buf.get_u32(),
            octets: buf.get_u32(),
        })
    }
}

/// QoS summary of one compound RTCP packet
///
/// Built from the first SR or RR; report blocks of later SR/RR packets in
/// the same compound are appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QosReport {
    /// Packet type of the first SR/RR
    #[serde(rename = "type")]
    pub packet_type: u8,
    /// Sender SSRC
    pub ssrc: u32,
    /// Number of report blocks announced by the headers
    pub report_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_information: Option<SenderInfo>,
    pub report_blocks: Vec<RtcpReportBlock>,
    /// SSRC of the first SDES chunk, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdes_ssrc: Option<u32>,
}

impl QosReport {
    fn new(packet_type: u8, ssrc: u32) -> Self {
        Self {
            packet_type,
            ssrc,
            report_count: 0,
            sender_information: None,
            report_blocks: Vec::new(),
            sdes_ssrc: None,
        }
    }
}

/// Everything extracted from a compound packet before serialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSummary {
    pub report: Option<QosReport>,
    pub diagnostics: Vec<String>,
}

/// Decoder for compound RTCP packets (RFC 3550 Section 6.1)
///
/// Keys reports by the sender SSRC of the first SR or RR. BYE, APP, feedback
/// and XR packets carry no QoS data used for correlation and are discarded
/// with a diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompoundRtcpDecoder;

impl CompoundRtcpDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl RtcpDecoder for CompoundRtcpDecoder {
    fn decode(&self, payload: &[u8]) -> RtcpDecoded {
        let summary = parse_compound(payload);
        let mut diagnostics = summary.diagnostics;

        let mut decoded = RtcpDecoded::default();
        if let Some(report) = summary.report {
            decoded.ssrc = Some(Bytes::copy_from_slice(&report.ssrc.to_be_bytes()));
            match serde_json::to_vec(&report) {
                Ok(json) => decoded.report = Some(Bytes::from(json)),
                Err(e) => diagnostics.push(format!("Failed to encode QoS report: {}", e)),
            }
        }
        if !diagnostics.is_empty() {
            decoded.diagnostic = Some(diagnostics.join("; "));
        }
        decoded
    }
}

/// Walk every packet of a compound RTCP datagram
pub fn parse_compound(payload: &[u8]) -> CompoundSummary {
    let mut summary = CompoundSummary::default();
    let mut buf = payload;

    if buf.len() < HEADER_SIZE {
        summary.diagnostics.push(
            RtcpError::BufferTooSmall {
                required: HEADER_SIZE,
                available: buf.len(),
            }
            .to_string(),
        );
        return summary;
    }

    while buf.len() >= HEADER_SIZE {
        let version = buf[0] >> 6;
        if version != 2 {
            summary.diagnostics.push(RtcpError::UnsupportedVersion(version).to_string());
            break;
        }
        let report_count = buf[0] & 0x1f;
        let packet_type = buf[1];
        let length = (u16::from_be_bytes([buf[2], buf[3]]) as usize + 1) * 4;
        if length > buf.len() {
            summary.diagnostics.push(
                RtcpError::FishyLength {
                    declared: length,
                    available: buf.len(),
                }
                .to_string(),
            );
            break;
        }

        let (packet, rest) = buf.split_at(length);
        let mut body = &packet[HEADER_SIZE..];
        buf = rest;

        let parsed = match packet_type {
            RTCP_SR => parse_sender_report(&mut body, report_count, &mut summary),
            RTCP_RR => parse_receiver_report(&mut body, report_count, &mut summary),
            RTCP_SDES => parse_sdes(&mut body, report_count, &mut summary),
            other => {
                summary
                    .diagnostics
                    .push(format!("Discard RTCP packet type: {} ({})", other, packet_type_name(other)));
                Ok(())
            }
        };
        if let Err(e) = parsed {
            summary.diagnostics.push(e.to_string());
            break;
        }
    }

    summary
}

fn parse_sender_report(buf: &mut &[u8], report_count: u8, summary: &mut CompoundSummary) -> Result<()> {
    ensure(buf, 4)?;
    let ssrc = buf.get_u32();
    let sender_info = SenderInfo::parse(buf)?;
    let blocks = parse_report_blocks(buf, report_count)?;

    let report = summary.report.get_or_insert_with(|| {
        let mut report = QosReport::new(RTCP_SR, ssrc);
        report.sender_information = Some(sender_info);
        report
    });
    report.report_count = report.report_count.saturating_add(report_count);
    report.report_blocks.extend(blocks);
    Ok(())
}

fn parse_receiver_report(buf: &mut &[u8], report_count: u8, summary: &mut CompoundSummary) -> Result<()> {
    ensure(buf, 4)?;
    let ssrc = buf.get_u32();
    let blocks = parse_report_blocks(buf, report_count)?;

    let report = summary
        .report
        .get_or_insert_with(|| QosReport::new(RTCP_RR, ssrc));
    report.report_count = report.report_count.saturating_add(report_count);
    report.report_blocks.extend(blocks);
    Ok(())
}

fn parse_report_blocks(buf: &mut &[u8], report_count: u8) -> Result<Vec<RtcpReportBlock>> {
    let mut blocks = Vec::with_capacity(report_count as usize);
    for _ in 0..report_count {
        blocks.push(RtcpReportBlock::parse(buf)?);
    }
    Ok(blocks)
}

fn parse_sdes(buf: &mut &[u8], chunk_count: u8, summary: &mut CompoundSummary) -> Result<()> {
    if chunk_count == 0 {
        return Ok(());
    }
    ensure(buf, 4)?;
    let ssrc = buf.get_u32();
    if let Some(report) = summary.report.as_mut() {
        report.sdes_ssrc.get_or_insert(ssrc);
    }
    Ok(())
}

fn ensure(buf: &mut impl Buf, required: usize) -> Result<()> {
    if buf.remaining() < required {
        return Err(RtcpError::BufferTooSmall {
            required,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn packet_type_name(packet_type: u8) -> &'static str {
    match packet_type {
        RTCP_BYE => "BYE",
        RTCP_APP => "APP",
        RTCP_RTPFB => "RTPFB",
        RTCP_PSFB => "PSFB",
        RTCP_XR => "XR",
        _ => "unknown",
    }
}
