//! Driver configuration types
//!
//! [`DriverConfig`] is the serde-deserializable startup configuration.
//! [`DriverConfig::validate`] checks it once and derives the immutable
//! [`TransmitterConfig`], [`RainBucket`] and [`SensorMap`] used by the
//! decoding components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::observation::SensorMap;
use crate::types::{DecoderError, Result};

/// Default receiver command
pub const DEFAULT_CMD: &str = "/home/pi/work/bin/rtldavis";

/// Highest transmitter channel
pub const MAX_CHANNEL: u8 = 8;

/// Radio band the receiver hops on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrequencyBand {
    US,
    NZ,
    #[default]
    EU,
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyBand::US => write!(f, "US"),
            FrequencyBand::NZ => write!(f, "NZ"),
            FrequencyBand::EU => write!(f, "EU"),
        }
    }
}

/// Rain collector size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RainBucket {
    /// 0.01 inch per tip
    Inch,
    /// 0.2 mm per tip
    Metric,
}

impl RainBucket {
    /// Map the configuration selector (0 or 1)
    pub fn from_type(bucket_type: u8) -> Result<Self> {
        match bucket_type {
            0 => Ok(RainBucket::Inch),
            1 => Ok(RainBucket::Metric),
            other => Err(DecoderError::Config(format!(
                "invalid rain_bucket_type {} (expected 0 or 1)",
                other
            ))),
        }
    }

    /// Rain per tip in mm
    pub fn rain_per_tip(&self) -> f64 {
        match self {
            RainBucket::Inch => 0.254,
            RainBucket::Metric => 0.2,
        }
    }
}

/// Selects the wind direction formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationType {
    /// Vantage Pro / Pro2, potentiometer vane
    #[default]
    Pro,
    /// Vantage Vue, hall-effect vane
    Vue,
}

/// Verbosity knobs, 0 = off, 3 = most verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugLevels {
    /// Packet parsing and decoding
    pub parse: u8,
    /// Rain counter bookkeeping
    pub rain: u8,
    /// Raw receiver output
    pub rtld: u8,
}

impl DebugLevels {
    pub fn any(&self) -> bool {
        self.parse > 0 || self.rain > 0 || self.rtld > 0
    }
}

/// Logical transmitter roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Iss,
    Anemometer,
    LeafSoil,
    TempHum1,
    TempHum2,
}

/// Channel assignment for each role, derived once at startup
///
/// Channels are 1-based; 0 means the role is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitterConfig {
    pub iss: u8,
    pub anemometer: u8,
    pub leaf_soil: u8,
    pub temp_hum_1: u8,
    pub temp_hum_2: u8,
    /// Bit `i` set means channel `i + 1` is active
    pub mask: u8,
    /// 0-based ids of the active transmitters, ascending
    pub active_ids: Vec<u8>,
}

impl TransmitterConfig {
    /// Build from role channels, rejecting out-of-range and duplicate channels
    pub fn new(iss: u8, anemometer: u8, leaf_soil: u8, temp_hum_1: u8, temp_hum_2: u8) -> Result<Self> {
        if iss == 0 {
            return Err(DecoderError::Config("iss_channel must be 1..8".into()));
        }

        let roles = [
            ("iss_channel", iss),
            ("anemometer_channel", anemometer),
            ("leaf_soil_channel", leaf_soil),
            ("temp_hum_1_channel", temp_hum_1),
            ("temp_hum_2_channel", temp_hum_2),
        ];

        let mut mask = 0u8;
        for (name, channel) in roles {
            if channel > MAX_CHANNEL {
                return Err(DecoderError::Config(format!(
                    "{} {} out of range 0..{}",
                    name, channel, MAX_CHANNEL
                )));
            }
            if channel == 0 {
                continue;
            }
            let bit = 1u8 << (channel - 1);
            if mask & bit != 0 {
                return Err(DecoderError::Config(format!(
                    "{} {} is already assigned to another role",
                    name, channel
                )));
            }
            mask |= bit;
        }

        let active_ids = (0..MAX_CHANNEL).filter(|i| mask & (1 << i) != 0).collect();

        Ok(Self {
            iss,
            anemometer,
            leaf_soil,
            temp_hum_1,
            temp_hum_2,
            mask,
            active_ids,
        })
    }

    /// Role owning a 1-based channel
    pub fn role_of(&self, channel: u8) -> Option<Role> {
        if channel == 0 {
            return None;
        }
        if channel == self.iss {
            Some(Role::Iss)
        } else if channel == self.anemometer {
            Some(Role::Anemometer)
        } else if channel == self.temp_hum_1 {
            Some(Role::TempHum1)
        } else if channel == self.temp_hum_2 {
            Some(Role::TempHum2)
        } else if channel == self.leaf_soil {
            Some(Role::LeafSoil)
        } else {
            None
        }
    }

    /// Number of active transmitters
    pub fn count(&self) -> usize {
        self.active_ids.len()
    }
}

/// Everything derived from a validated [`DriverConfig`]
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub transmitters: TransmitterConfig,
    pub rain_bucket: RainBucket,
    pub sensor_map: SensorMap,
    pub debug: DebugLevels,
}

/// Startup configuration for the driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Receiver executable (with optional extra arguments)
    #[serde(default = "default_cmd")]
    pub cmd: String,

    /// Prepended to PATH for the receiver
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Replaces LD_LIBRARY_PATH for the receiver
    #[serde(default)]
    pub ld_library_path: Option<PathBuf>,

    #[serde(default)]
    pub transceiver_frequency: FrequencyBand,

    #[serde(default = "default_iss_channel")]
    pub iss_channel: u8,

    #[serde(default)]
    pub anemometer_channel: u8,

    #[serde(default)]
    pub leaf_soil_channel: u8,

    #[serde(default)]
    pub temp_hum_1_channel: u8,

    #[serde(default)]
    pub temp_hum_2_channel: u8,

    /// 0 = 0.01 in, 1 = 0.2 mm
    #[serde(default = "default_rain_bucket_type")]
    pub rain_bucket_type: u8,

    #[serde(default)]
    pub station_type: StationType,

    #[serde(default)]
    pub debug_parse: u8,

    #[serde(default)]
    pub debug_rain: u8,

    #[serde(default)]
    pub debug_rtld: u8,

    /// Store pct_good per transmitter in archive records, not only the aggregate
    #[serde(default)]
    pub save_pct_good_per_transmitter: bool,

    /// Log the raw humidity word whenever it changes
    #[serde(default)]
    pub log_humidity_raw: bool,

    /// Host field name -> observation name overrides
    #[serde(default)]
    pub sensor_map: BTreeMap<String, String>,

    /// Seconds without data before the receiver counts as stalled
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,

    /// Maximum wait for receiver output per poll
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_cmd() -> String {
    DEFAULT_CMD.to_string()
}

fn default_iss_channel() -> u8 {
    1
}

fn default_rain_bucket_type() -> u8 {
    1
}

fn default_stall_timeout() -> u64 {
    150
}

fn default_drain_timeout() -> u64 {
    10
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cmd: default_cmd(),
            path: None,
            ld_library_path: None,
            transceiver_frequency: FrequencyBand::default(),
            iss_channel: default_iss_channel(),
            anemometer_channel: 0,
            leaf_soil_channel: 0,
            temp_hum_1_channel: 0,
            temp_hum_2_channel: 0,
            rain_bucket_type: default_rain_bucket_type(),
            station_type: StationType::default(),
            debug_parse: 0,
            debug_rain: 0,
            debug_rtld: 0,
            save_pct_good_per_transmitter: false,
            log_humidity_raw: false,
            sensor_map: BTreeMap::new(),
            stall_timeout_secs: default_stall_timeout(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl DriverConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the receiver command
    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = cmd.into();
        self
    }

    /// Builder method: set the frequency band
    pub fn with_frequency(mut self, band: FrequencyBand) -> Self {
        self.transceiver_frequency = band;
        self
    }

    /// Builder method: set all role channels
    pub fn with_channels(
        mut self,
        iss: u8,
        anemometer: u8,
        leaf_soil: u8,
        temp_hum_1: u8,
        temp_hum_2: u8,
    ) -> Self {
        self.iss_channel = iss;
        self.anemometer_channel = anemometer;
        self.leaf_soil_channel = leaf_soil;
        self.temp_hum_1_channel = temp_hum_1;
        self.temp_hum_2_channel = temp_hum_2;
        self
    }

    /// Builder method: set the rain bucket selector
    pub fn with_rain_bucket_type(mut self, bucket_type: u8) -> Self {
        self.rain_bucket_type = bucket_type;
        self
    }

    /// Builder method: set the station type
    pub fn with_station_type(mut self, station_type: StationType) -> Self {
        self.station_type = station_type;
        self
    }

    /// Builder method: set the stall timeout
    pub fn with_stall_timeout(mut self, secs: u64) -> Self {
        self.stall_timeout_secs = secs;
        self
    }

    /// Builder method: set the drain timeout
    pub fn with_drain_timeout(mut self, secs: u64) -> Self {
        self.drain_timeout_secs = secs;
        self
    }

    /// Builder method: store per-transmitter pct_good
    pub fn with_pct_good_per_transmitter(mut self, enabled: bool) -> Self {
        self.save_pct_good_per_transmitter = enabled;
        self
    }

    /// Builder method: add a sensor map override
    pub fn add_sensor_mapping(mut self, field: impl Into<String>, observation: impl Into<String>) -> Self {
        self.sensor_map.insert(field.into(), observation.into());
        self
    }

    pub fn debug_levels(&self) -> DebugLevels {
        DebugLevels {
            parse: self.debug_parse,
            rain: self.debug_rain,
            rtld: self.debug_rtld,
        }
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Check the configuration and derive the runtime tables
    pub fn validate(&self) -> Result<ValidatedConfig> {
        if self.cmd.split_whitespace().next().is_none() {
            return Err(DecoderError::Config("cmd must not be empty".into()));
        }
        if self.stall_timeout_secs == 0 {
            return Err(DecoderError::Config("stall_timeout_secs must be positive".into()));
        }

        let transmitters = TransmitterConfig::new(
            self.iss_channel,
            self.anemometer_channel,
            self.leaf_soil_channel,
            self.temp_hum_1_channel,
            self.temp_hum_2_channel,
        )?;
        let rain_bucket = RainBucket::from_type(self.rain_bucket_type)?;
        let sensor_map = SensorMap::with_overrides(&self.sensor_map)?;

        Ok(ValidatedConfig {
            transmitters,
            rain_bucket,
            sensor_map,
            debug: self.debug_levels(),
        })
    }

    /// Receiver command line: `<cmd> -tf <band> -tr <mask>`
    pub fn receiver_command(&self, transmitters: &TransmitterConfig) -> String {
        format!(
            "{} -tf {} -tr {}",
            self.cmd, self.transceiver_frequency, transmitters.mask
        )
    }
}
