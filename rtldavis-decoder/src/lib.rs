//! rtldavis Telemetry Decoder Library
//!
//! Decodes the output of the `rtldavis` software-defined-radio receiver into
//! weather observations from Davis Instruments wireless transmitters.
//!
//! # Architecture
//!
//! - [`frame_parser`] recognizes data packets and channel reports in the
//!   receiver's stderr stream and verifies packet CRCs
//! - [`payload_decoder`] turns an 8-byte packet into calibrated observations
//! - [`calibration`] holds the wind, soil moisture and leaf wetness tables
//! - [`link_quality`] derives per-transmitter reception statistics
//! - [`supervisor`] runs the receiver process and reads its output
//! - [`driver`] ties everything together and emits host packets
//!
//! The library does NOT:
//! - Talk to the radio hardware (the receiver process does)
//! - Store or publish observations
//!
//! # Example Usage
//!
//! ```no_run
//! use rtldavis_decoder::{Driver, DriverConfig, FrequencyBand};
//!
//! let config = DriverConfig::new()
//!     .with_frequency(FrequencyBand::EU)
//!     .with_channels(1, 0, 0, 0, 0);
//!
//! let mut driver = Driver::start(&config).unwrap();
//! loop {
//!     match driver.poll() {
//!         Ok(packets) => {
//!             for packet in packets {
//!                 println!("{:?}", packet);
//!             }
//!         }
//!         Err(e) if e.is_fatal() => break,
//!         Err(e) => eprintln!("decode error: {}", e),
//!     }
//! }
//! ```

// Public modules
pub mod calibration;
pub mod config;
pub mod driver;
pub mod frame_parser;
pub mod link_quality;
pub mod observation;
pub mod payload_decoder;
pub mod supervisor;
pub mod types;
pub mod wire;

// Re-export main types for convenience
pub use config::{DebugLevels, DriverConfig, FrequencyBand, RainBucket, StationType, TransmitterConfig};
pub use driver::{Batch, Driver, PacketPipeline};
pub use frame_parser::FrameParser;
pub use link_quality::{ArchiveStats, LinkQualityTracker};
pub use observation::{Observation, SensorMap};
pub use payload_decoder::PayloadDecoder;
pub use supervisor::{LaunchOptions, ProcessSupervisor};
pub use types::{
    ChannelReport, DecoderError, FailureKind, LoopPacket, ObservationValue, RawPacket, Record,
    Result, SensorReading, Timestamp, UnitSystem,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: the default configuration is usable
        let config = DriverConfig::new();
        let validated = config.validate().unwrap();
        assert_eq!(validated.transmitters.count(), 1);
        assert!(!validated.sensor_map.is_empty());
        assert!(!VERSION.is_empty());
    }
}
