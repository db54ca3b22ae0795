//! Observation kinds and the host field-name mapping
//!
//! Every value the decoder can produce is an [`Observation`]. The host stores
//! values under its own field names; [`SensorMap`] translates between the two
//! and is validated once when the driver is configured.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::{DecoderError, ObservationValue, Result};

/// Highest leaf/soil probe index
pub const MAX_PROBE: u8 = 8;
/// Number of temp/hum transmitters with their own observations
pub const MAX_EXTRA_TH: u8 = 2;
/// Number of transmitters tracked by link statistics
pub const MAX_PCT_GOOD: u8 = 4;
/// Number of hop channels whose frequency error is reported
pub const MAX_FREQ_ERROR: u8 = 5;

/// A decoded observation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Observation {
    WindSpeed,
    WindDir,
    WindSpeedRaw,
    WindSpeedEc,
    Temperature,
    Humidity,
    /// Temperature of temp/hum transmitter 1 or 2
    ExtraTemp(u8),
    /// Humidity of temp/hum transmitter 1 or 2
    ExtraHumid(u8),
    RainRate,
    /// Rain since the previous packet (mm)
    Rain,
    /// Raw 7-bit tip counter
    RainCount,
    SolarRadiation,
    Uv,
    SupercapVolt,
    SolarPower,
    SoilTemp(u8),
    LeafTemp(u8),
    SoilMoisture(u8),
    LeafWetness(u8),
    BatIss,
    BatAnemometer,
    BatLeafSoil,
    BatTh1,
    BatTh2,
    PctGoodAll,
    /// Reception quality of tracked transmitter 0-3
    PctGood(u8),
    /// Frequency error of hop channel 0-4
    FreqError(u8),
}

impl Observation {
    /// Canonical observation name
    pub fn name(&self) -> String {
        match self {
            Observation::WindSpeed => "wind_speed".into(),
            Observation::WindDir => "wind_dir".into(),
            Observation::WindSpeedRaw => "wind_speed_raw".into(),
            Observation::WindSpeedEc => "wind_speed_ec".into(),
            Observation::Temperature => "temperature".into(),
            Observation::Humidity => "humidity".into(),
            Observation::ExtraTemp(n) => format!("temp_{}", n),
            Observation::ExtraHumid(n) => format!("humid_{}", n),
            Observation::RainRate => "rain_rate".into(),
            Observation::Rain => "rain".into(),
            Observation::RainCount => "rain_count".into(),
            Observation::SolarRadiation => "solar_radiation".into(),
            Observation::Uv => "uv".into(),
            Observation::SupercapVolt => "supercap_volt".into(),
            Observation::SolarPower => "solar_power".into(),
            Observation::SoilTemp(n) => format!("soil_temp_{}", n),
            Observation::LeafTemp(n) => format!("leaf_temp_{}", n),
            Observation::SoilMoisture(n) => format!("soil_moisture_{}", n),
            Observation::LeafWetness(n) => format!("leaf_wetness_{}", n),
            Observation::BatIss => "bat_iss".into(),
            Observation::BatAnemometer => "bat_anemometer".into(),
            Observation::BatLeafSoil => "bat_leaf_soil".into(),
            Observation::BatTh1 => "bat_th_1".into(),
            Observation::BatTh2 => "bat_th_2".into(),
            Observation::PctGoodAll => "pct_good_all".into(),
            Observation::PctGood(n) => format!("pct_good_{}", n),
            Observation::FreqError(n) => format!("freqError{}", n),
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn indexed(
    name: &str,
    prefix: &str,
    range: std::ops::RangeInclusive<u8>,
    make: fn(u8) -> Observation,
) -> Option<Result<Observation>> {
    let suffix = name.strip_prefix(prefix)?;
    let n = match suffix.parse::<u8>() {
        Ok(n) => n,
        Err(_) => {
            return Some(Err(DecoderError::Config(format!(
                "invalid observation index in '{}'",
                name
            ))))
        }
    };
    if !range.contains(&n) {
        return Some(Err(DecoderError::Config(format!(
            "observation index out of range in '{}' (expected {}..={})",
            name,
            range.start(),
            range.end()
        ))));
    }
    Some(Ok(make(n)))
}

impl FromStr for Observation {
    type Err = DecoderError;

    fn from_str(name: &str) -> Result<Self> {
        let fixed = match name {
            "wind_speed" => Some(Observation::WindSpeed),
            "wind_dir" => Some(Observation::WindDir),
            "wind_speed_raw" => Some(Observation::WindSpeedRaw),
            "wind_speed_ec" => Some(Observation::WindSpeedEc),
            "temperature" => Some(Observation::Temperature),
            "humidity" => Some(Observation::Humidity),
            "rain_rate" => Some(Observation::RainRate),
            "rain" => Some(Observation::Rain),
            "rain_count" => Some(Observation::RainCount),
            "solar_radiation" => Some(Observation::SolarRadiation),
            "uv" => Some(Observation::Uv),
            "supercap_volt" => Some(Observation::SupercapVolt),
            "solar_power" => Some(Observation::SolarPower),
            "bat_iss" => Some(Observation::BatIss),
            "bat_anemometer" => Some(Observation::BatAnemometer),
            "bat_leaf_soil" => Some(Observation::BatLeafSoil),
            "bat_th_1" => Some(Observation::BatTh1),
            "bat_th_2" => Some(Observation::BatTh2),
            "pct_good_all" => Some(Observation::PctGoodAll),
            _ => None,
        };
        if let Some(observation) = fixed {
            return Ok(observation);
        }

        indexed(name, "temp_", 1..=MAX_EXTRA_TH, Observation::ExtraTemp)
            .or_else(|| indexed(name, "humid_", 1..=MAX_EXTRA_TH, Observation::ExtraHumid))
            .or_else(|| indexed(name, "soil_temp_", 1..=MAX_PROBE, Observation::SoilTemp))
            .or_else(|| indexed(name, "leaf_temp_", 1..=MAX_PROBE, Observation::LeafTemp))
            .or_else(|| indexed(name, "soil_moisture_", 1..=MAX_PROBE, Observation::SoilMoisture))
            .or_else(|| indexed(name, "leaf_wetness_", 1..=MAX_PROBE, Observation::LeafWetness))
            .or_else(|| indexed(name, "pct_good_", 0..=MAX_PCT_GOOD - 1, Observation::PctGood))
            .or_else(|| indexed(name, "freqError", 0..=MAX_FREQ_ERROR - 1, Observation::FreqError))
            .unwrap_or_else(|| Err(DecoderError::Config(format!("unknown observation '{}'", name))))
    }
}

/// Default host field name to observation mapping
const DEFAULT_SENSOR_MAP: &[(&str, &str)] = &[
    ("windSpeed", "wind_speed"),
    ("windDir", "wind_dir"),
    ("outTemp", "temperature"),
    ("outHumidity", "humidity"),
    ("rainRate", "rain_rate"),
    ("rain", "rain"),
    ("radiation", "solar_radiation"),
    ("UV", "uv"),
    ("soilTemp1", "soil_temp_1"),
    ("soilTemp2", "soil_temp_2"),
    ("soilTemp3", "soil_temp_3"),
    ("soilTemp4", "soil_temp_4"),
    ("leafTemp1", "leaf_temp_1"),
    ("extraHumid1", "humid_1"),
    ("extraHumid2", "humid_2"),
    ("soilMoist1", "soil_moisture_1"),
    ("soilMoist2", "soil_moisture_2"),
    ("soilMoist3", "soil_moisture_3"),
    ("soilMoist4", "soil_moisture_4"),
    ("leafWet1", "leaf_wetness_1"),
    ("leafWet2", "leaf_wetness_2"),
    ("rxCheckPercent", "pct_good_all"),
    ("txBatteryStatus", "bat_iss"),
    ("supplyVoltage", "supercap_volt"),
    ("referenceVoltage", "solar_power"),
    ("windBatteryStatus", "bat_anemometer"),
    ("rainBatteryStatus", "bat_leaf_soil"),
    ("outTempBatteryStatus", "bat_th_1"),
    ("inTempBatteryStatus", "bat_th_2"),
    // unused host columns repurposed for link statistics
    ("extraTemp1", "pct_good_0"),
    ("extraTemp2", "pct_good_1"),
    ("extraTemp3", "pct_good_2"),
    ("leafTemp2", "pct_good_3"),
    ("consBatteryVoltage", "freqError0"),
    ("hail", "freqError1"),
    ("hailRate", "freqError2"),
    ("heatingTemp", "freqError3"),
    ("heatingVoltage", "freqError4"),
];

/// Validated mapping from host field names to observations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorMap {
    fields: BTreeMap<String, Observation>,
}

impl Default for SensorMap {
    fn default() -> Self {
        let fields = DEFAULT_SENSOR_MAP
            .iter()
            .filter_map(|(field, name)| {
                name.parse::<Observation>()
                    .ok()
                    .map(|observation| (field.to_string(), observation))
            })
            .collect();
        Self { fields }
    }
}

impl SensorMap {
    /// Default map with `overrides` (field name -> observation name) applied
    ///
    /// Unknown observation names are rejected.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut map = Self::default();
        for (field, name) in overrides {
            let observation = name.parse::<Observation>()?;
            map.fields.insert(field.clone(), observation);
        }
        Ok(map)
    }

    /// Observation stored under `field`
    pub fn get(&self, field: &str) -> Option<Observation> {
        self.fields.get(field).copied()
    }

    /// Host field names that store `observation`
    pub fn fields_for(&self, observation: Observation) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |(_, o)| **o == observation)
            .map(|(field, _)| field.as_str())
    }

    /// Copy every mapped observation from `values` into `out` under its field names
    pub fn apply(
        &self,
        values: &BTreeMap<Observation, ObservationValue>,
        out: &mut BTreeMap<String, ObservationValue>,
    ) {
        for (field, observation) in &self.fields {
            if let Some(value) = values.get(observation) {
                out.insert(field.clone(), *value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for SensorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .fields
            .iter()
            .map(|(field, observation)| format!("{}: {}", field, observation))
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_name_round_trip() {
        for observation in [
            Observation::WindSpeed,
            Observation::ExtraTemp(2),
            Observation::SoilMoisture(4),
            Observation::LeafWetness(1),
            Observation::PctGood(3),
            Observation::FreqError(0),
            Observation::BatTh2,
        ] {
            assert_eq!(observation.name().parse::<Observation>().unwrap(), observation);
        }
        assert_eq!(Observation::FreqError(4).to_string(), "freqError4");
    }

    #[test]
    fn test_unknown_and_out_of_range_names() {
        assert!("pressure".parse::<Observation>().is_err());
        assert!("pct_good_4".parse::<Observation>().is_err());
        assert!("freqError5".parse::<Observation>().is_err());
        assert!("soil_temp_0".parse::<Observation>().is_err());
        assert!("temp_x".parse::<Observation>().is_err());
    }

    #[test]
    fn test_default_sensor_map_is_complete() {
        let map = SensorMap::default();
        assert_eq!(map.len(), DEFAULT_SENSOR_MAP.len());
        assert_eq!(map.get("rxCheckPercent"), Some(Observation::PctGoodAll));
        assert_eq!(map.get("leafTemp2"), Some(Observation::PctGood(3)));
        assert_eq!(map.get("heatingVoltage"), Some(Observation::FreqError(4)));
        assert_eq!(map.get("extraTemp1"), Some(Observation::PctGood(0)));
    }

    #[test]
    fn test_sensor_map_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("extraTemp1".to_string(), "temp_1".to_string());
        let map = SensorMap::with_overrides(&overrides).unwrap();
        assert_eq!(map.get("extraTemp1"), Some(Observation::ExtraTemp(1)));
        assert_eq!(map.fields_for(Observation::PctGood(0)).count(), 0);

        overrides.insert("pressure".to_string(), "pressure".to_string());
        assert!(SensorMap::with_overrides(&overrides).is_err());
    }

    #[test]
    fn test_sensor_map_apply() {
        let map = SensorMap::default();
        let mut values = BTreeMap::new();
        values.insert(Observation::Temperature, ObservationValue::Float(21.0));
        values.insert(Observation::WindSpeedRaw, ObservationValue::Integer(6));

        let mut out = BTreeMap::new();
        map.apply(&values, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out["outTemp"], ObservationValue::Float(21.0));
    }
}
