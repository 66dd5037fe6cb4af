//! Error types for the correlation core
//!
//! Correlation itself never fails towards the caller: malformed payloads are
//! logged and reported as [`crate::Outcome::Skipped`]. The errors here cover
//! the surrounding plumbing (configuration, logging setup) and the structural
//! failures reported by the wire decoders.

use thiserror::Error;

/// Crate-level error type
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// Configuration file could not be read
    #[error("Configuration I/O error: {0}")]
    ConfigIo(String),

    /// Configuration content could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    /// Configuration parsed but holds unusable values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Logging subsystem could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for correlation-core operations
pub type Result<T> = std::result::Result<T, CorrelationError>;

/// Structural failures of the RTCP wire format
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RtcpError {
    /// Buffer too small for the next field
    #[error("Buffer too small for RTCP packet: need {required} but have {available}")]
    BufferTooSmall {
        required: usize,
        available: usize,
    },

    /// RTCP version field is not 2
    #[error("Unsupported RTCP version {0}")]
    UnsupportedVersion(u8),

    /// Declared length runs past the end of the datagram
    #[error("Fishy RTCP length: header declares {declared} bytes but {available} remain")]
    FishyLength {
        declared: usize,
        available: usize,
    },
}

/// Structural failures of an NG control payload
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NgError {
    /// Payload is empty
    #[error("Empty NG payload")]
    Empty,

    /// No space separated cookie in front of the message
    #[error("No NG cookie found")]
    MissingCookie,

    /// Input ended in the middle of a value
    #[error("Unexpected end of bencoded data at offset {0}")]
    UnexpectedEof(usize),

    /// Byte that cannot start or continue a bencoded value
    #[error("Invalid bencode byte {byte:#04x} at offset {offset}")]
    InvalidByte {
        byte: u8,
        offset: usize,
    },

    /// Integer or length field is not a valid number
    #[error("Invalid bencode number at offset {0}")]
    InvalidNumber(usize),

    /// Dictionary key is not valid UTF-8
    #[error("Non UTF-8 dictionary key at offset {0}")]
    InvalidKey(usize),

    /// Lists and dictionaries nested deeper than the decoder allows
    #[error("Bencode nesting deeper than {0} levels")]
    TooDeep(usize),

    /// Bytes left over after the top level value
    #[error("{0} trailing bytes after bencoded value")]
    TrailingData(usize),
}
