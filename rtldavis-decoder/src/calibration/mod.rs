//! Calibration tables and interpolation
//!
//! Static lookup data used by the payload decoder:
//! - thermistor resistance curve (outside temperature, leaf/soil probes)
//! - soil-moisture and leaf-wetness potential tables
//! - wind speed error-correction matrix and wind direction formulas
//! - theoretical loop times per transmitter channel

pub mod soil;
pub mod wind;

pub use soil::{lookup_potential, thermistor_temp, PotentialTable, LEAF_WETNESS, SOIL_MOISTURE};
pub use wind::{wind_dir_pro, wind_dir_vue, wind_speed_corrected};

/// Reference temperature (°C) for leaf/soil probes
///
/// Used when a probe has no temperature sensor and as the temperature the
/// raw potential tables were recorded at.
pub const DEFAULT_SOIL_TEMP: f64 = 24.0;

/// Miles per hour to meters per second
pub const MPH_TO_MPS: f64 = 1609.34 / 3600.0;

/// Theoretical seconds between two transmissions for channels 1..8
///
/// The last entry is a sentinel used for slots without an active transmitter.
pub const LOOP_TIMES: [f64; 9] = [
    2.5625, 2.625, 2.6875, 2.75, 2.8125, 2.875, 2.9375, 3.0, 100.0,
];

/// Index into [`LOOP_TIMES`] for an inactive slot
pub const INACTIVE_LOOP_SLOT: usize = 8;

/// Loop time for a 0-based transmitter id (`None` = inactive slot)
pub fn loop_time(transmitter_id: Option<u8>) -> f64 {
    match transmitter_id {
        Some(id) if (id as usize) < INACTIVE_LOOP_SLOT => LOOP_TIMES[id as usize],
        _ => LOOP_TIMES[INACTIVE_LOOP_SLOT],
    }
}
