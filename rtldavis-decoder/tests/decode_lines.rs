// End-to-end decoding of receiver output lines
use chrono::DateTime;
use rtldavis_decoder::{
    wire, DriverConfig, FrameParser, ObservationValue, PacketPipeline, Record,
};
use std::collections::VecDeque;

fn queue(lines: &[&str]) -> VecDeque<String> {
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

#[test]
fn test_data_line_then_channel_report() {
    let parser = FrameParser::default();
    let mut lines = queue(&[
        "13:44:13.116046 5106B2FF73007661 5 3 2 1",
        "13:44:14.000000 Hop: {ChannelIdx:3 ChannelFreq:868437250 FreqError:431 Transmitter:1}",
    ]);

    let mut records = parser.parse_lines(&mut lines);
    let first = records.next().unwrap().unwrap();
    let second = records.next().unwrap().unwrap();
    assert!(records.next().is_none());
    assert_eq!(records.dropped(), 0);

    match first {
        Record::Data(packet) => {
            assert_eq!(packet.hex(), "5106B2FF73007661");
            assert_eq!(packet.counters, [5, 3, 2, 1]);
        }
        other => panic!("expected data packet, got {:?}", other),
    }
    match second {
        Record::Channel(report) => {
            assert_eq!(report.channel_idx, 3);
            assert_eq!(report.frequency, 868_437_250);
            assert_eq!(report.freq_error, 431);
            assert_eq!(report.transmitter, Some(1));
        }
        other => panic!("expected channel report, got {:?}", other),
    }
}

#[test]
fn test_single_byte_corruption_is_rejected() {
    let good = [0x51u8, 0x06, 0xB2, 0xFF, 0x73, 0x00, 0x76, 0x61];
    assert!(wire::crc_ok(&good));

    let parser = FrameParser::default();
    for i in 0..good.len() {
        for flip in [0x01u8, 0x10, 0xFF] {
            let mut frame = good;
            frame[i] ^= flip;
            assert!(!wire::crc_ok(&frame), "byte {} flip {:02X}", i, flip);

            let hex: String = frame.iter().map(|b| format!("{:02X}", b)).collect();
            let line = format!("13:44:13.116046 {} 5 3 2 1", hex);
            match parser.parse_line(&line) {
                // a corrupted first nibble may no longer look like a data line
                Ok(None) => {}
                Ok(Some(record)) => panic!("corrupted frame accepted: {:?}", record),
                Err(e) => assert!(!e.is_fatal()),
            }
        }
    }
}

#[test]
fn test_pipeline_to_json() {
    let config = DriverConfig::new().with_channels(2, 0, 0, 0, 0);
    let mut pipeline = PacketPipeline::new(&config).unwrap();
    let mut lines = queue(&[
        "Init channels: 5",
        "13:44:13.116046 5106B2FF73007661 5 3 2 1",
        "13:44:14.000000 Hop: {ChannelIdx:3 ChannelFreq:868437250 FreqError:431 Transmitter:1}",
    ]);

    let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let batch = pipeline.process(&mut lines, now).unwrap();
    assert_eq!(batch.received, 2);
    // channel 2 is transmitter id 1, the only one reporting frequency errors
    assert_eq!(batch.packets.len(), 2);
    assert_eq!(batch.packets[1].get("heatingTemp"), Some(ObservationValue::Integer(431)));

    let packet = &batch.packets[0];
    assert_eq!(packet.get("txBatteryStatus"), Some(ObservationValue::Integer(0)));

    let json = serde_json::to_value(packet).unwrap();
    assert_eq!(json["dateTime"], 1_700_000_000);
    assert_eq!(json["usUnits"], 0x11);
    assert_eq!(json["rainRate"], 0.0);
    let wind_dir = json["windDir"].as_f64().unwrap();
    assert!((wind_dir - 248.264822).abs() < 1e-5);
}
