//! Thermistor curve and leaf/soil potential tables

use super::DEFAULT_SOIL_TEMP;

/// Resistance conversion constants for the Davis thermistor divider
const DIVIDER_A: f64 = 18.81099;
const DIVIDER_B: f64 = 0.0009988027;

/// Steinhart-Hart parameters
const SH_S1: f64 = 0.002783573;
const SH_S2: f64 = 0.0002509406;

/// A raw-to-potential lookup table recorded at [`DEFAULT_SOIL_TEMP`]
#[derive(Debug, Clone, Copy)]
pub struct PotentialTable {
    /// Name used in log messages
    pub name: &'static str,
    /// Temperature correction factor applied before lookup
    pub norm_factor: f64,
    /// Normalized raw values, ascending
    pub raw: &'static [f64],
    /// Potential for each raw entry
    pub potential: &'static [f64],
}

/// Soil moisture potential (centibar), correction factor 0.009
pub const SOIL_MOISTURE: PotentialTable = PotentialTable {
    name: "soil_moisture",
    norm_factor: 0.009,
    raw: &[
        99.2, 140.1, 218.7, 226.9, 266.8, 391.7, 475.6, 538.2, 596.1, 673.7, 720.1,
    ],
    potential: &[
        0.0, 1.0, 9.0, 10.0, 15.0, 35.0, 55.0, 75.0, 100.0, 150.0, 200.0,
    ],
};

/// Leaf wetness (0 = dry .. 15 = wet), not temperature corrected
pub const LEAF_WETNESS: PotentialTable = PotentialTable {
    name: "leaf_wetness",
    norm_factor: 0.0,
    raw: &[857.0, 864.0, 895.0, 911.0, 940.0, 952.0, 991.0, 1013.0],
    potential: &[15.0, 14.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0],
};

/// Convert a raw 10-bit thermistor value to °C
///
/// The raw value is first converted to a resistance in kΩ, then run through
/// the Steinhart-Hart equation. Raw values outside the divider's range
/// (non-positive resistance) fall back to [`DEFAULT_SOIL_TEMP`].
pub fn thermistor_temp(temp_raw: f64) -> f64 {
    let r = DIVIDER_A / (1.0 / temp_raw - DIVIDER_B) / 1000.0;

    if !(r > 0.0) || !r.is_finite() {
        log::error!(
            "thermistor_temp failed for temp_raw {} r (k ohm) {}",
            temp_raw,
            r
        );
        return DEFAULT_SOIL_TEMP;
    }

    let temp = 1.0 / (SH_S1 + SH_S2 * r.ln()) - 273.0;
    log::trace!("r (k ohm) {} temp_raw {} thermistor_temp {}", r, temp_raw, temp);
    temp
}

/// Look up a potential from a raw sensor value
///
/// The raw value is normalized to the table's reference temperature with
/// `raw * (1 + norm_factor * (sensor_temp - DEFAULT_SOIL_TEMP))`, then
/// interpolated linearly between the two bracketing table rows. Values below
/// the first row clamp to the first potential, values at or above the last row
/// clamp to the last potential.
pub fn lookup_potential(table: &PotentialTable, sensor_raw: f64, sensor_temp: f64) -> f64 {
    let norm = sensor_raw * (1.0 + table.norm_factor * (sensor_temp - DEFAULT_SOIL_TEMP));
    let last = table.raw.len() - 1;

    if norm >= table.raw[last] {
        log::trace!(
            "{}: raw={} norm={} >= {}, potential={}",
            table.name,
            sensor_raw,
            norm,
            table.raw[last],
            table.potential[last]
        );
        return table.potential[last];
    }

    match table.raw.iter().position(|&r| norm < r) {
        Some(0) | None => table.potential[0],
        Some(x) => {
            let per_raw = (table.potential[x] - table.potential[x - 1])
                / (table.raw[x] - table.raw[x - 1]);
            let potential = table.potential[x - 1] + (norm - table.raw[x - 1]) * per_raw;
            log::trace!(
                "{}: raw={} norm={} RAW={}..{} potential={}",
                table.name,
                sensor_raw,
                norm,
                table.raw[x - 1],
                table.raw[x],
                potential
            );
            potential
        }
    }
}
