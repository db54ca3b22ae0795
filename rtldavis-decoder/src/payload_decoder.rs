//! Payload decoding
//!
//! Turns a validated [`RawPacket`] into a [`SensorReading`]. The channel in
//! the header selects the transmitter role; ISS, anemometer and temp/hum
//! transmitters share one format keyed by the message type nibble, the
//! leaf/soil station has its own.

use crate::calibration::{
    lookup_potential, thermistor_temp, wind_dir_pro, wind_dir_vue, wind_speed_corrected,
    DEFAULT_SOIL_TEMP, LEAF_WETNESS, MPH_TO_MPS, SOIL_MOISTURE,
};
use crate::config::{DebugLevels, RainBucket, Role, StationType, TransmitterConfig};
use crate::observation::Observation;
use crate::types::{RawPacket, SensorReading, Timestamp};
use crate::wire::{self, Frame, NO_SENSOR_10BIT};

/// Gated debug logging on the parse verbosity knob
macro_rules! dbg_parse {
    ($decoder:expr, $level:expr, $($arg:tt)+) => {
        if $decoder.debug.parse >= $level {
            log::debug!($($arg)+);
        }
    };
}

/// Message types of the ISS/anemometer/temp-hum format
mod message {
    pub const SUPERCAP: u8 = 0x2;
    pub const UNKNOWN_3: u8 = 0x3;
    pub const UV: u8 = 0x4;
    pub const RAIN_RATE: u8 = 0x5;
    pub const SOLAR_RADIATION: u8 = 0x6;
    pub const SOLAR_POWER: u8 = 0x7;
    pub const TEMPERATURE: u8 = 0x8;
    pub const GUST: u8 = 0x9;
    pub const HUMIDITY: u8 = 0xA;
    pub const UNKNOWN_C: u8 = 0xC;
    pub const RAIN_COUNT: u8 = 0xE;
    pub const LEAF_SOIL: u8 = 0xF;
}

const SUBTYPE_SOIL: u8 = 1;
const SUBTYPE_LEAF: u8 = 2;

/// Raw rain time meaning no rain
const NO_RAIN: u16 = 0x3FF;
/// Raw temperature meaning no sensor
const NO_TEMP_SENSOR: u16 = 0xFFC;
/// Raw rain count meaning no sensor
const NO_RAIN_SENSOR: u8 = 0x80;

/// Decodes data packets for one transmitter configuration
pub struct PayloadDecoder {
    transmitters: TransmitterConfig,
    rain_per_tip: f64,
    station_type: StationType,
    debug: DebugLevels,
    log_humidity_raw: bool,
    last_humidity_word: Option<u16>,
}

impl PayloadDecoder {
    pub fn new(
        transmitters: TransmitterConfig,
        rain_bucket: RainBucket,
        station_type: StationType,
        debug: DebugLevels,
        log_humidity_raw: bool,
    ) -> Self {
        Self {
            transmitters,
            rain_per_tip: rain_bucket.rain_per_tip(),
            station_type,
            debug,
            log_humidity_raw,
            last_humidity_word: None,
        }
    }

    /// Decode one packet
    ///
    /// Unknown channels and message types are logged and produce a reading
    /// without values.
    pub fn decode(&mut self, packet: &RawPacket, timestamp: Timestamp) -> SensorReading {
        let frame = &packet.bytes;
        let channel = wire::channel(frame);
        let battery_low = i64::from(wire::battery_low(frame));
        let mut reading = SensorReading::new(timestamp, channel);

        match self.transmitters.role_of(channel) {
            Some(Role::LeafSoil) => {
                reading.set(Observation::BatLeafSoil, battery_low);
                self.decode_leaf_soil(frame, &mut reading);
            }
            Some(role) => {
                let battery = match role {
                    Role::Iss => Observation::BatIss,
                    Role::Anemometer => Observation::BatAnemometer,
                    Role::TempHum1 => Observation::BatTh1,
                    _ => Observation::BatTh2,
                };
                reading.set(battery, battery_low);
                self.decode_wind(frame, &mut reading);
                self.decode_message(frame, role, &mut reading);
            }
            None => {
                log::error!(
                    "unknown station with channel: {}, raw message: {}",
                    channel,
                    packet.hex()
                );
            }
        }

        reading
    }

    fn decode_wind(&self, frame: &Frame, reading: &mut SensorReading) {
        let speed_raw = wire::wind_speed_raw(frame);
        let dir_raw = wire::wind_dir_raw(frame);
        if speed_raw == 0 && dir_raw == 0 {
            return;
        }

        let dir_pro = wind_dir_pro(dir_raw);
        let dir_vue = wind_dir_vue(dir_raw);
        let speed_ec = wind_speed_corrected(speed_raw, dir_raw).round_ties_even();
        let wind_dir = match self.station_type {
            StationType::Pro => dir_pro,
            StationType::Vue => dir_vue,
        };

        reading.set(Observation::WindSpeedRaw, i64::from(speed_raw));
        reading.set(Observation::WindSpeedEc, speed_ec as i64);
        reading.set(Observation::WindSpeed, speed_ec * MPH_TO_MPS);
        reading.set(Observation::WindDir, wind_dir);

        dbg_parse!(
            self,
            2,
            "WS={} WD={} WS_raw={} WS_ec={} WD_raw={} WD_pro={} WD_vue={}",
            speed_ec * MPH_TO_MPS,
            wind_dir,
            speed_raw,
            speed_ec,
            dir_raw,
            dir_pro,
            dir_vue
        );
    }

    fn decode_message(&mut self, frame: &Frame, role: Role, reading: &mut SensorReading) {
        let message_type = wire::message_type(frame);
        match message_type {
            message::SUPERCAP => {
                let raw = wire::value_10bit(frame);
                if raw != NO_SENSOR_10BIT {
                    let volt = f64::from(raw) / 300.0;
                    reading.set(Observation::SupercapVolt, volt);
                    dbg_parse!(self, 2, "supercap_volt_raw=0x{:03x} value={}", raw, volt);
                }
            }
            message::UV => {
                let raw = wire::value_10bit(frame);
                if raw != NO_SENSOR_10BIT {
                    let uv = f64::from(raw) / 50.0;
                    reading.set(Observation::Uv, uv);
                    dbg_parse!(self, 2, "uv_raw=0x{:04x} value={}", raw, uv);
                }
            }
            message::RAIN_RATE => {
                let raw = wire::rain_time_raw(frame);
                dbg_parse!(self, 2, "time_between_tips_raw=0x{:03x} ({})", raw, raw);
                // only the ISS has a rain collector
                if role == Role::Iss {
                    let rain_rate = self.rain_rate(frame, raw);
                    reading.set(Observation::RainRate, rain_rate);
                }
            }
            message::SOLAR_RADIATION => {
                let raw = wire::value_10bit(frame);
                if raw < 0x3FE {
                    let radiation = f64::from(raw) * 1.757936;
                    reading.set(Observation::SolarRadiation, radiation);
                    dbg_parse!(self, 2, "solar_radiation_raw=0x{:04x} value={}", raw, radiation);
                }
            }
            message::SOLAR_POWER => {
                let raw = wire::value_10bit(frame);
                if raw != NO_SENSOR_10BIT {
                    let power = f64::from(raw) / 300.0;
                    reading.set(Observation::SolarPower, power);
                    dbg_parse!(self, 2, "solar_power_raw=0x{:03x} solar_power={}", raw, power);
                }
            }
            message::TEMPERATURE => self.decode_temperature(frame, role, reading),
            message::GUST => {
                let gust = wire::gust_raw(frame);
                let index = wire::gust_index(frame);
                // no host field for the 10-minute gust
                if !(gust == 0 && index == 0) {
                    dbg_parse!(self, 2, "W10={} gust_index_raw={}", gust, index);
                }
            }
            message::HUMIDITY => self.decode_humidity(frame, role, reading),
            message::RAIN_COUNT => {
                let raw = wire::rain_count_raw(frame);
                if raw != NO_RAIN_SENSOR {
                    // counters wrap at 127 or 255, drop the top bit so both wrap at 127
                    let count = raw & 0x7F;
                    reading.set(Observation::RainCount, i64::from(count));
                    dbg_parse!(self, 2, "rain_count_raw=0x{:02x} value={}", raw, count);
                }
            }
            message::UNKNOWN_3 | message::UNKNOWN_C => {
                dbg_parse!(
                    self,
                    1,
                    "unknown message with type=0x{:02x}; pkt[3]=0x{:02x} pkt[4]=0x{:02x} pkt[5]=0x{:02x}",
                    message_type,
                    frame[3],
                    frame[4],
                    frame[5]
                );
            }
            other => {
                log::error!("unknown message type 0x{:01x}", other);
            }
        }
    }

    /// Rain rate in mm/h from the time between tips
    fn rain_rate(&self, frame: &Frame, raw: u16) -> f64 {
        if raw == NO_RAIN {
            dbg_parse!(self, 3, "no_rain=0 mm/h");
            return 0.0;
        }

        let time_between_tips = if wire::rain_is_light(frame) {
            f64::from(raw)
        } else {
            // heavy rain, 1/16 s resolution
            f64::from(raw) / 16.0
        };
        let rate = 3600.0 / time_between_tips * self.rain_per_tip;
        dbg_parse!(
            self,
            2,
            "{}_rain={} mm/h, time_between_tips={} s",
            if wire::rain_is_light(frame) { "light" } else { "heavy" },
            rate,
            time_between_tips
        );
        rate
    }

    fn decode_temperature(&self, frame: &Frame, role: Role, reading: &mut SensorReading) {
        let raw = wire::temp_raw(frame);
        if raw == NO_TEMP_SENSOR {
            return;
        }

        let temp_c = if wire::is_digital(frame) {
            let temp_f = f64::from(raw) / 10.0;
            let temp_c = (temp_f - 32.0) * 5.0 / 9.0;
            dbg_parse!(self, 2, "digital temp_raw=0x{:03x} temp_f={} temp_c={}", raw, temp_f, temp_c);
            temp_c
        } else {
            let raw_10bit = f64::from(raw) / 4.0;
            let temp_c = thermistor_temp(raw_10bit);
            dbg_parse!(self, 2, "thermistor temp_raw={} temp_c={}", raw_10bit, temp_c);
            temp_c
        };

        let observation = match role {
            Role::TempHum1 => Observation::ExtraTemp(1),
            Role::TempHum2 => Observation::ExtraTemp(2),
            _ => Observation::Temperature,
        };
        reading.set(observation, temp_c);
    }

    fn decode_humidity(&mut self, frame: &Frame, role: Role, reading: &mut SensorReading) {
        let raw = wire::humidity_raw(frame);
        if raw == 0 {
            return;
        }

        let humidity = if wire::is_digital(frame) {
            f64::from(raw) / 10.0
        } else {
            f64::from(raw) * -0.301 + 710.23
        };

        match role {
            Role::TempHum1 => reading.set(Observation::ExtraHumid(1), humidity),
            Role::TempHum2 => reading.set(Observation::ExtraHumid(2), humidity),
            Role::Anemometer => log::info!(
                "humidity sensor of anemometer transmitter kit not in sensor map: {}",
                humidity
            ),
            _ => reading.set(Observation::Humidity, humidity),
        }
        dbg_parse!(self, 2, "humidity_raw=0x{:03x} value={}", raw, humidity);

        if self.log_humidity_raw {
            // the bits used by older sensors are unknown, log the whole word
            let word = wire::humidity_word(frame);
            if self.last_humidity_word.is_some_and(|last| last != word) {
                log::info!("humidity_raw= {:04x}", word);
            }
            self.last_humidity_word = Some(word);
        }
    }

    fn decode_leaf_soil(&self, frame: &Frame, reading: &mut SensorReading) {
        let data_type = wire::message_type(frame);
        if data_type != message::LEAF_SOIL {
            dbg_parse!(self, 2, "leaf_soil: ignoring data type 0x{:x}", data_type);
            return;
        }

        let subtype = wire::leaf_soil_subtype(frame);
        let sensor = wire::leaf_soil_sensor(frame);
        let temp_raw = wire::leaf_soil_temp_raw(frame);
        let potential_raw = f64::from(wire::leaf_soil_potential_raw(frame));
        let temp_present = frame[3] != 0xFF;
        let mut temp_c = DEFAULT_SOIL_TEMP;

        match subtype {
            SUBTYPE_SOIL => {
                if temp_present {
                    temp_c = thermistor_temp(f64::from(temp_raw));
                    reading.set(Observation::SoilTemp(sensor), temp_c);
                    dbg_parse!(self, 2, "soil_temp_{}={} 0x{:03x}", sensor, temp_c, temp_raw);
                }
                if frame[2] != 0xFF {
                    let moisture = lookup_potential(&SOIL_MOISTURE, potential_raw, temp_c);
                    reading.set(Observation::SoilMoisture(sensor), moisture);
                    dbg_parse!(self, 2, "soil_moisture_{}={} 0x{:03x}", sensor, moisture, potential_raw as u16);
                }
            }
            SUBTYPE_LEAF => {
                if temp_present {
                    temp_c = thermistor_temp(f64::from(temp_raw));
                    reading.set(Observation::LeafTemp(sensor), temp_c);
                    dbg_parse!(self, 2, "leaf_temp_{}={} 0x{:03x}", sensor, temp_c, temp_raw);
                }
                if frame[2] != 0 {
                    let wetness = lookup_potential(&LEAF_WETNESS, potential_raw, temp_c);
                    reading.set(Observation::LeafWetness(sensor), wetness);
                    dbg_parse!(self, 2, "leaf_wetness_{}={} 0x{:03x}", sensor, wetness, potential_raw as u16);
                }
            }
            other => {
                log::error!("unknown leaf/soil subtype {} (temp_raw 0x{:03x})", other, temp_raw);
            }
        }
    }
}
