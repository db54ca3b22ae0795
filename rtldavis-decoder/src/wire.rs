//! Bit-field accessors for the 8-byte transmitter frame
//!
//! Byte layout: `b0` header (message type, battery flag, channel), `b1`/`b2`
//! wind speed/direction (or leaf/soil subtype and potential), `b3..b5` the
//! message-type dependent payload, `b6`/`b7` CRC-16/XMODEM.
//!
//! A valid frame has a CRC of zero when computed over all 8 bytes.

use crc::{Crc, CRC_16_XMODEM};

/// Frame checksum algorithm
pub const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Raw 10-bit value meaning "no sensor"
pub const NO_SENSOR_10BIT: u16 = 0x3FF;

pub type Frame = [u8; 8];

/// True if the CRC over the whole frame is zero
pub fn crc_ok(frame: &Frame) -> bool {
    FRAME_CRC.checksum(frame) == 0
}

/// Append the big-endian CRC of `payload` to form a valid frame
pub fn seal(payload: [u8; 6]) -> Frame {
    let crc = FRAME_CRC.checksum(&payload).to_be_bytes();
    let mut frame = [0u8; 8];
    frame[..6].copy_from_slice(&payload);
    frame[6..].copy_from_slice(&crc);
    frame
}

/// Build a header byte from its fields (inverse of the header accessors)
pub fn encode_header(message_type: u8, battery_low: bool, channel: u8) -> u8 {
    ((message_type & 0x0F) << 4) | (u8::from(battery_low) << 3) | (channel.wrapping_sub(1) & 0x07)
}

// --- header (b0) ---

/// 1-based channel: `b0[2:0] + 1`
pub fn channel(frame: &Frame) -> u8 {
    (frame[0] & 0x07) + 1
}

/// Low battery flag: `b0[3]`
pub fn battery_low(frame: &Frame) -> bool {
    (frame[0] >> 3) & 0x01 == 1
}

/// Message type nibble: `b0[7:4]`
pub fn message_type(frame: &Frame) -> u8 {
    frame[0] >> 4
}

// --- wind (b1, b2) ---

/// Raw wind speed in mph: `b1`
pub fn wind_speed_raw(frame: &Frame) -> u8 {
    frame[1]
}

/// Raw wind direction: `b2`
pub fn wind_dir_raw(frame: &Frame) -> u8 {
    frame[2]
}

// --- message payload (b3..b5) ---

/// 10-bit value `b3[7:0] b4[7:6]` (supercap, UV, solar radiation, solar power)
pub fn value_10bit(frame: &Frame) -> u16 {
    ((u16::from(frame[3]) << 2) + (u16::from(frame[4]) >> 6)) & 0x3FF
}

/// Rain time-between-tips `b4[5:4] b3[7:0]`
pub fn rain_time_raw(frame: &Frame) -> u16 {
    ((u16::from(frame[4]) & 0x30) << 4) + u16::from(frame[3])
}

/// Light rain flag: `b4[6]`; clear means heavy rain in 1/16 s units
pub fn rain_is_light(frame: &Frame) -> bool {
    frame[4] & 0x40 != 0
}

/// 12-bit temperature `b3[7:0] b4[7:4]`
pub fn temp_raw(frame: &Frame) -> u16 {
    (u16::from(frame[3]) << 4) + (u16::from(frame[4]) >> 4)
}

/// Digital sensor flag: `b4[3]` (temperature and humidity)
pub fn is_digital(frame: &Frame) -> bool {
    frame[4] & 0x08 != 0
}

/// 12-bit humidity `b4[7:4] b3[7:0]`
pub fn humidity_raw(frame: &Frame) -> u16 {
    ((u16::from(frame[4]) >> 4) << 8) + u16::from(frame[3])
}

/// Full humidity word `b4 b3`, including the flag bits
pub fn humidity_word(frame: &Frame) -> u16 {
    (u16::from(frame[4]) << 8) + u16::from(frame[3])
}

/// 10-minute gust in mph: `b3`
pub fn gust_raw(frame: &Frame) -> u8 {
    frame[3]
}

/// Gust index: `b5[7:4]`
pub fn gust_index(frame: &Frame) -> u8 {
    frame[5] >> 4
}

/// Raw rain tip counter including the unused top bit: `b3`
pub fn rain_count_raw(frame: &Frame) -> u8 {
    frame[3]
}

// --- leaf/soil station ---

/// Leaf/soil data subtype: `b1[1:0]`, 1 = soil, 2 = leaf
pub fn leaf_soil_subtype(frame: &Frame) -> u8 {
    frame[1] & 0x03
}

/// 1-based probe index: `b1[7:5] + 1`
pub fn leaf_soil_sensor(frame: &Frame) -> u8 {
    ((frame[1] & 0xE0) >> 5) + 1
}

/// 10-bit probe temperature `b3[7:0] b5[7:6]`
pub fn leaf_soil_temp_raw(frame: &Frame) -> u16 {
    ((u16::from(frame[3]) << 2) + (u16::from(frame[5]) >> 6)) & 0x3FF
}

/// 10-bit probe potential `b2[7:0] b4[7:6]`
pub fn leaf_soil_potential_raw(frame: &Frame) -> u16 {
    ((u16::from(frame[2]) << 2) + (u16::from(frame[4]) >> 6)) & 0x3FF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_known_frames() {
        assert!(crc_ok(&[0x51, 0x06, 0xB2, 0xFF, 0x73, 0x00, 0x76, 0x61]));
        assert!(crc_ok(&[0xE0, 0x00, 0x00, 0x4E, 0x05, 0x00, 0x72, 0x61]));
        assert!(crc_ok(&[0xF2, 0x09, 0x1A, 0x55, 0xC0, 0x00, 0x62, 0xE6]));
        assert!(!crc_ok(&[0x51, 0x06, 0xB2, 0xFF, 0x73, 0x00, 0x76, 0x62]));
    }

    #[test]
    fn test_seal_matches_real_frame() {
        let frame = seal([0x51, 0x06, 0xB2, 0xFF, 0x73, 0x00]);
        assert_eq!(frame, [0x51, 0x06, 0xB2, 0xFF, 0x73, 0x00, 0x76, 0x61]);
    }

    #[test]
    fn test_corrupted_byte_fails_crc() {
        let frame = seal([0xA0, 0x00, 0x00, 0xC9, 0x3D, 0x00]);
        for i in 0..8 {
            let mut bad = frame;
            bad[i] ^= 0x10;
            assert!(!crc_ok(&bad), "byte {} corruption passed", i);
        }
    }

    #[test]
    fn test_header_round_trip() {
        for message_type in 0..16u8 {
            for channel in 1..=8u8 {
                for battery in [false, true] {
                    let frame = seal([encode_header(message_type, battery, channel), 0, 0, 0, 0, 0]);
                    assert!(crc_ok(&frame));
                    assert_eq!(wire_header(&frame), (message_type, battery, channel));
                }
            }
        }
    }

    fn wire_header(frame: &Frame) -> (u8, bool, u8) {
        (message_type(frame), battery_low(frame), channel(frame))
    }

    #[test]
    fn test_payload_fields() {
        let uv = [0x40, 0x00, 0x00, 0x12, 0x45, 0x00, 0xB5, 0x2A];
        assert_eq!(value_10bit(&uv), 73);

        let rain = [0x50, 0x00, 0x00, 0x1B, 0x15, 0x00, 0x3F, 0x80];
        assert_eq!(rain_time_raw(&rain), 0x11B);
        assert!(!rain_is_light(&rain));

        let humidity = [0xA0, 0x00, 0x00, 0xC9, 0x3D, 0x00, 0x2A, 0x87];
        assert_eq!(humidity_raw(&humidity), 969);
        assert!(is_digital(&humidity));
        assert_eq!(humidity_word(&humidity), 0x3DC9);

        let soil = [0xF2, 0x09, 0x1A, 0x55, 0xC0, 0x00, 0x62, 0xE6];
        assert_eq!(channel(&soil), 3);
        assert_eq!(leaf_soil_subtype(&soil), 1);
        assert_eq!(leaf_soil_sensor(&soil), 1);
        assert_eq!(leaf_soil_temp_raw(&soil), 340);
        assert_eq!(leaf_soil_potential_raw(&soil), 107);
    }
}
