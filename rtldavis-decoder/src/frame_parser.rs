//! Line recognizers for the receiver's stderr stream
//!
//! Each line is tried against the data-packet recognizer, then the
//! channel-report recognizer; the first match wins. Anything else is
//! informational output and is dropped.
//!
//! ```text
//! 13:44:13.116046 5106B2FF73007661 5 3 2 1
//! 13:44:14.000000 Hop: {ChannelIdx:3 ChannelFreq:868437250 FreqError:431 Transmitter:1}
//! ```

use regex::Regex;
use std::collections::VecDeque;
use std::num::IntErrorKind;
use std::sync::LazyLock;

use crate::config::DebugLevels;
use crate::types::{ChannelReport, DecoderError, RawPacket, Record, Result};
use crate::wire;

/// Frequency error magnitude above which the receiver must be restarted
pub const MAX_FREQ_ERROR: i64 = 20000;

static DATA_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d\d:\d\d:\d\d.\d{6} [0-9A-F][0-7][0-9A-F]{14}").expect("valid data identifier")
});

static DATA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"([0-9A-F]{2})([0-9A-F]{2})([0-9A-F]{2})([0-9A-F]{2})",
        r"([0-9A-F]{2})([0-9A-F]{2})([0-9A-F]{2})([0-9A-F]{2})",
        r" (\d+) (\d+) (\d+) (\d+)"
    ))
    .expect("valid data pattern")
});

static CHANNEL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ChannelIdx:").expect("valid channel identifier"));

/// Receiver version 13 and later report the transmitter id
static CHANNEL_PATTERN_V13: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ChannelIdx:(\d+) ChannelFreq:(\d+) FreqError:([\d-]+) Transmitter:(\d+)")
        .expect("valid v13 channel pattern")
});

static CHANNEL_PATTERN_V12: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ChannelIdx:(\d+) ChannelFreq:(\d+) FreqError:([\d-]+)")
        .expect("valid v12 channel pattern")
});

/// Turns receiver output lines into [`Record`]s
#[derive(Debug, Clone, Default)]
pub struct FrameParser {
    debug: DebugLevels,
}

impl FrameParser {
    pub fn new(debug: DebugLevels) -> Self {
        Self { debug }
    }

    /// Parse `lines` front to back, removing each line as it is consumed
    ///
    /// The returned iterator yields one item per recognized line. Transient
    /// failures (bad CRC, malformed data line) are yielded as errors so the
    /// caller can log them and continue; a receiver radio error is fatal.
    pub fn parse_lines<'a>(&'a self, lines: &'a mut VecDeque<String>) -> Records<'a> {
        Records {
            parser: self,
            lines,
            dropped: 0,
        }
    }

    /// Parse a single line; `Ok(None)` for blank and unrecognized lines
    pub fn parse_line(&self, line: &str) -> Result<Option<Record>> {
        let payload = line.trim();
        if payload.is_empty() {
            if self.debug.rtld >= 2 {
                log::debug!("blank line");
            }
            return Ok(None);
        }

        if DATA_IDENTIFIER.is_match(payload) {
            return self.parse_data(payload).map(Some);
        }
        if CHANNEL_IDENTIFIER.is_match(payload) {
            return self.parse_channel(payload).map(Some);
        }

        if self.debug.rtld >= 1 {
            log::info!("info: {}", payload);
        } else {
            log::trace!("info: {}", payload);
        }
        Ok(None)
    }

    fn parse_data(&self, payload: &str) -> Result<Record> {
        let caps = DATA_PATTERN
            .captures(payload)
            .ok_or_else(|| DecoderError::MalformedLine(payload.to_string()))?;

        if self.debug.rtld >= 2 {
            log::debug!("data: {}", payload);
        }

        let mut bytes = [0u8; 8];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&caps[i + 1], 16)
                .map_err(|_| DecoderError::MalformedLine(payload.to_string()))?;
        }

        if !wire::crc_ok(&bytes) {
            return Err(DecoderError::CrcMismatch(caps[0][..16].to_string()));
        }

        let mut counters = [0u32; 4];
        for (i, counter) in counters.iter_mut().enumerate() {
            *counter = caps[i + 9]
                .parse()
                .map_err(|_| DecoderError::MalformedLine(payload.to_string()))?;
        }

        let packet = RawPacket { bytes, counters };
        if self.debug.rtld >= 3 {
            log::debug!("data_pkt: {} counters={:?}", packet.hex(), packet.counters);
        }
        Ok(Record::Data(packet))
    }

    fn parse_channel(&self, payload: &str) -> Result<Record> {
        let malformed = || DecoderError::MalformedLine(payload.to_string());

        let (caps, transmitter) = match CHANNEL_PATTERN_V13.captures(payload) {
            Some(caps) => {
                let transmitter = caps[4].parse::<u8>().map_err(|_| malformed())?;
                (caps, Some(transmitter))
            }
            None => (CHANNEL_PATTERN_V12.captures(payload).ok_or_else(malformed)?, None),
        };

        if self.debug.rtld >= 2 {
            log::debug!("chan: {}", payload);
        }

        let channel_idx = caps[1].parse::<u8>().map_err(|_| malformed())?;
        let frequency = caps[2].parse::<u64>().map_err(|_| malformed())?;
        // saturate so that absurd readings still count as out of range
        let freq_error = match caps[3].parse::<i64>() {
            Ok(v) => v,
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => i64::MAX,
            Err(e) if *e.kind() == IntErrorKind::NegOverflow => i64::MIN,
            Err(_) => return Err(malformed()),
        };

        if freq_error.unsigned_abs() > MAX_FREQ_ERROR.unsigned_abs() {
            return Err(DecoderError::ReceiverRadio {
                channel: channel_idx,
                freq_error,
            });
        }
        let freq_error = freq_error as i32;

        Ok(Record::Channel(ChannelReport {
            channel_idx,
            frequency,
            freq_error,
            transmitter,
        }))
    }
}

/// Lazy record iterator over a line queue, see [`FrameParser::parse_lines`]
pub struct Records<'a> {
    parser: &'a FrameParser,
    lines: &'a mut VecDeque<String>,
    dropped: usize,
}

impl Records<'_> {
    /// Number of blank or unrecognized lines consumed so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.lines.pop_front() {
            match self.parser.parse_line(&line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => self.dropped += 1,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(lines: &[&str]) -> VecDeque<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_data_line() {
        let parser = FrameParser::default();
        let record = parser
            .parse_line("13:44:13.116046 5106B2FF73007661 5 3 2 1")
            .unwrap()
            .unwrap();
        assert_eq!(
            record,
            Record::Data(RawPacket {
                bytes: [0x51, 0x06, 0xB2, 0xFF, 0x73, 0x00, 0x76, 0x61],
                counters: [5, 3, 2, 1],
            })
        );
    }

    #[test]
    fn test_crc_failure_is_transient() {
        let parser = FrameParser::default();
        let err = parser
            .parse_line("13:44:13.116046 5106B2FF73007662 5 3 2 1")
            .unwrap_err();
        assert!(matches!(err, DecoderError::CrcMismatch(ref hex) if hex == "5106B2FF73007662"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_data_line_without_counters_is_malformed() {
        let parser = FrameParser::default();
        let err = parser.parse_line("13:44:13.116046 5106B2FF73007661").unwrap_err();
        assert!(matches!(err, DecoderError::MalformedLine(_)));
    }

    #[test]
    fn test_channel_line_versions() {
        let parser = FrameParser::default();
        let v13 = parser
            .parse_line("13:44:14.000000 Hop: {ChannelIdx:3 ChannelFreq:868437250 FreqError:431 Transmitter:1}")
            .unwrap()
            .unwrap();
        assert_eq!(
            v13,
            Record::Channel(ChannelReport {
                channel_idx: 3,
                frequency: 868437250,
                freq_error: 431,
                transmitter: Some(1),
            })
        );

        let v12 = parser
            .parse_line("13:44:14.000000 Hop: {ChannelIdx:0 ChannelFreq:868077250 FreqError:-1200}")
            .unwrap()
            .unwrap();
        assert_eq!(
            v12,
            Record::Channel(ChannelReport {
                channel_idx: 0,
                frequency: 868077250,
                freq_error: -1200,
                transmitter: None,
            })
        );
    }

    #[test]
    fn test_frequency_error_threshold() {
        let parser = FrameParser::default();
        assert!(parser
            .parse_line("Hop: {ChannelIdx:2 ChannelFreq:868271250 FreqError:20000 Transmitter:0}")
            .is_ok());

        let err = parser
            .parse_line("Hop: {ChannelIdx:2 ChannelFreq:868271250 FreqError:-20001 Transmitter:0}")
            .unwrap_err();
        assert!(matches!(
            err,
            DecoderError::ReceiverRadio { channel: 2, freq_error: -20001 }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_frequency_error_beyond_integer_range_is_fatal() {
        let parser = FrameParser::default();
        let err = parser
            .parse_line("Hop: {ChannelIdx:1 ChannelFreq:868171250 FreqError:4294967296 Transmitter:0}")
            .unwrap_err();
        assert!(matches!(
            err,
            DecoderError::ReceiverRadio { channel: 1, freq_error: 4294967296 }
        ));

        let err = parser
            .parse_line("Hop: {ChannelIdx:1 ChannelFreq:868171250 FreqError:-99999999999999999999999}")
            .unwrap_err();
        assert!(matches!(
            err,
            DecoderError::ReceiverRadio { channel: 1, freq_error: i64::MIN }
        ));
        assert!(err.is_fatal());

        // not a number at all
        let err = parser
            .parse_line("Hop: {ChannelIdx:1 ChannelFreq:868171250 FreqError:12-3}")
            .unwrap_err();
        assert!(matches!(err, DecoderError::MalformedLine(_)));
    }

    #[test]
    fn test_parse_lines_consumes_and_counts_dropped() {
        let parser = FrameParser::default();
        let mut lines = queue(&[
            "",
            "Init channels: 5",
            "13:44:13.116046 5106B2FF73007661 5 3 2 1",
            "   ",
            "13:44:14.000000 Hop: {ChannelIdx:3 ChannelFreq:868437250 FreqError:431 Transmitter:1}",
            "13:44:15.000000 E000004E05007261 6 3 2 1",
        ]);

        let mut records = parser.parse_lines(&mut lines);
        assert!(matches!(records.next(), Some(Ok(Record::Data(_)))));
        assert_eq!(records.dropped(), 2);
        assert!(matches!(records.next(), Some(Ok(Record::Channel(_)))));
        assert_eq!(records.dropped(), 3);
        drop(records);

        // one line left unconsumed
        assert_eq!(lines.len(), 1);
        let rest: Vec<_> = parser.parse_lines(&mut lines).collect();
        assert_eq!(rest.len(), 1);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_lowercase_hex_is_not_data() {
        let parser = FrameParser::default();
        assert_eq!(
            parser.parse_line("13:44:13.116046 5106b2ff73007661 5 3 2 1").unwrap(),
            None
        );
    }
}
