//! Core types for the rtldavis decoder library
//!
//! This module defines the records produced by the frame parser, the readings
//! produced by the payload decoder, and the packets handed to the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::observation::Observation;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Errors that can occur while decoding or supervising the receiver
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("CRC mismatch on data packet {0}")]
    CrcMismatch(String),

    #[error("Malformed data line: {0}")]
    MalformedLine(String),

    #[error("Receiver radio error: channel {channel} frequency error {freq_error}")]
    ReceiverRadio { channel: u8, freq_error: i64 },

    #[error("Receiver process is no longer running")]
    ProcessDied,

    #[error("No data received from receiver for {0} seconds")]
    ProcessStalled(u64),

    #[error("Failed to start receiver: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`DecoderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// One record was dropped, processing continues
    Transient,
    /// Receiver reported an out-of-range frequency error
    ReceiverRadio,
    /// Receiver process exited
    ProcessDied,
    /// Receiver produced no data within the stall threshold
    ProcessStalled,
    /// Invalid configuration, never retried
    Configuration,
    /// Other I/O failure (spawn, pipes)
    Io,
}

impl DecoderError {
    /// Classify this error
    pub fn kind(&self) -> FailureKind {
        match self {
            DecoderError::CrcMismatch(_) | DecoderError::MalformedLine(_) => FailureKind::Transient,
            DecoderError::ReceiverRadio { .. } => FailureKind::ReceiverRadio,
            DecoderError::ProcessDied => FailureKind::ProcessDied,
            DecoderError::ProcessStalled(_) => FailureKind::ProcessStalled,
            DecoderError::Config(_) => FailureKind::Configuration,
            DecoderError::Spawn(_) | DecoderError::IoError(_) => FailureKind::Io,
        }
    }

    /// True if the current receiver session must be terminated
    pub fn is_fatal(&self) -> bool {
        self.kind() != FailureKind::Transient
    }
}

/// Unit system tag attached to readings and packets
///
/// Serialized as the host's numeric unit system code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum UnitSystem {
    Us,
    Metric,
    /// Metric with wind in m/s and rain in mm
    MetricWx,
}

impl From<UnitSystem> for u8 {
    fn from(units: UnitSystem) -> u8 {
        match units {
            UnitSystem::Us => 0x01,
            UnitSystem::Metric => 0x10,
            UnitSystem::MetricWx => 0x11,
        }
    }
}

impl TryFrom<u8> for UnitSystem {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0x01 => Ok(UnitSystem::Us),
            0x10 => Ok(UnitSystem::Metric),
            0x11 => Ok(UnitSystem::MetricWx),
            other => Err(format!("unknown unit system 0x{:02X}", other)),
        }
    }
}

/// A validated data packet: 8 payload bytes plus the receiver's
/// per-transmitter cumulative message counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket {
    pub bytes: [u8; 8],
    pub counters: [u32; 4],
}

impl RawPacket {
    /// Upper-case hex rendering of the payload bytes
    pub fn hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }
}

/// A channel/frequency report from the receiver's hopping loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReport {
    /// Hop channel index (0-7 on EU)
    pub channel_idx: u8,
    /// Center frequency in Hz
    pub frequency: u64,
    /// Signed frequency error
    pub freq_error: i32,
    /// 0-based transmitter id, only present in newer receiver versions
    pub transmitter: Option<u8>,
}

/// One record recognized by the frame parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Data(RawPacket),
    Channel(ChannelReport),
}

/// Observation value types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    Integer(i64),
    Float(f64),
}

impl ObservationValue {
    /// Integer value; `None` for floats
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ObservationValue::Integer(v) => Some(*v),
            ObservationValue::Float(_) => None,
        }
    }
}

impl From<f64> for ObservationValue {
    fn from(v: f64) -> Self {
        ObservationValue::Float(v)
    }
}

impl From<i64> for ObservationValue {
    fn from(v: i64) -> Self {
        ObservationValue::Integer(v)
    }
}
