//! Read-decode-emit orchestration
//!
//! [`PacketPipeline`] turns queued receiver lines into host packets and owns
//! all decoding state (rain counter, link statistics, duplicate filter).
//! [`Driver`] runs a pipeline against a live receiver process and detects
//! dead or stalled sessions.

use chrono::Utc;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::{DebugLevels, DriverConfig, FrequencyBand, TransmitterConfig};
use crate::frame_parser::FrameParser;
use crate::link_quality::{LinkQualityTracker, MAX_TRACKED};
use crate::observation::{Observation, SensorMap, MAX_FREQ_ERROR};
use crate::payload_decoder::PayloadDecoder;
use crate::supervisor::{LaunchOptions, ProcessSupervisor};
use crate::types::{
    ChannelReport, DecoderError, LoopPacket, ObservationValue, RawPacket, Record, Result,
    SensorReading, Timestamp,
};

/// Frequency errors are reported for one transmitter at a time, for this long
pub const FREQ_ERROR_WINDOW_SECS: i64 = 2 * 24 * 3600;

/// Offset of the window boundaries from midnight UTC
pub const FREQ_ERROR_WINDOW_OFFSET_SECS: i64 = 3 * 3600;

/// Transmitter whose frequency errors are stored at `now_ts`
///
/// Time is cut into [`FREQ_ERROR_WINDOW_SECS`] windows that rotate through
/// the active transmitter ids in order.
pub fn store_target(now_ts: i64, active_ids: &[u8]) -> Option<u8> {
    if active_ids.is_empty() {
        return None;
    }
    let cycle = FREQ_ERROR_WINDOW_SECS * active_ids.len() as i64;
    let index = (now_ts - FREQ_ERROR_WINDOW_OFFSET_SECS).rem_euclid(cycle) / FREQ_ERROR_WINDOW_SECS;
    active_ids.get(index as usize).copied()
}

/// Converts the 7-bit rain tip counter into rain amounts
#[derive(Debug, Clone)]
pub struct RainCounter {
    rain_per_tip: f64,
    last_count: Option<u8>,
    debug: u8,
}

impl RainCounter {
    pub fn new(rain_per_tip: f64, debug: u8) -> Self {
        Self {
            rain_per_tip,
            last_count: None,
            debug,
        }
    }

    /// Rain (mm) since the previous count; the first count yields 0
    pub fn update(&mut self, count: u8) -> f64 {
        let mut tips = match self.last_count {
            Some(last) => i16::from(count) - i16::from(last),
            None => 0,
        };
        if tips < 0 {
            log::info!("rain counter wraparound detected rain_count={}", tips);
            tips += 128;
        }
        self.last_count = Some(count);

        let rain = f64::from(tips) * self.rain_per_tip;
        if self.debug > 0 {
            log::debug!("rain={} rain_count={} last_rain_count={}", rain, tips, count);
        }
        rain
    }

    pub fn last_count(&self) -> Option<u8> {
        self.last_count
    }
}

/// Output of one [`PacketPipeline::process`] pass
#[derive(Debug, Default)]
pub struct Batch {
    /// Packets for the host, in arrival order
    pub packets: Vec<LoopPacket>,
    /// Records recognized, including duplicates and reports that produced no packet
    pub received: usize,
    /// Records dropped because of transient decode failures
    pub rejected: usize,
}

/// Decoding state for one driver session
pub struct PacketPipeline {
    parser: FrameParser,
    decoder: PayloadDecoder,
    stats: LinkQualityTracker,
    rain: RainCounter,
    sensor_map: SensorMap,
    transmitters: TransmitterConfig,
    band: FrequencyBand,
    save_pct_good_per_transmitter: bool,
    debug: DebugLevels,
    last_record: Option<Record>,
}

impl PacketPipeline {
    /// Validate `config` and build the decoding components
    pub fn new(config: &DriverConfig) -> Result<Self> {
        let validated = config.validate()?;
        let debug = validated.debug;

        log::info!("using frequency {}", config.transceiver_frequency);
        log::info!("using iss_channel {}", validated.transmitters.iss);
        log::info!("using anemometer_channel {}", validated.transmitters.anemometer);
        log::info!("using leaf_soil_channel {}", validated.transmitters.leaf_soil);
        log::info!("using temp_hum_1_channel {}", validated.transmitters.temp_hum_1);
        log::info!("using temp_hum_2_channel {}", validated.transmitters.temp_hum_2);
        log::info!("using transmitters {}", validated.transmitters.mask);
        log::info!("sensor map is: {}", validated.sensor_map);

        Ok(Self {
            parser: FrameParser::new(debug),
            decoder: PayloadDecoder::new(
                validated.transmitters.clone(),
                validated.rain_bucket,
                config.station_type,
                debug,
                config.log_humidity_raw,
            ),
            stats: LinkQualityTracker::new(&validated.transmitters),
            rain: RainCounter::new(validated.rain_bucket.rain_per_tip(), debug.rain),
            sensor_map: validated.sensor_map,
            transmitters: validated.transmitters,
            band: config.transceiver_frequency,
            save_pct_good_per_transmitter: config.save_pct_good_per_transmitter,
            debug,
            last_record: None,
        })
    }

    pub fn transmitters(&self) -> &TransmitterConfig {
        &self.transmitters
    }

    pub fn sensor_map(&self) -> &SensorMap {
        &self.sensor_map
    }

    /// Consume `lines` and convert every recognized record
    ///
    /// Transient failures drop the offending record; a fatal failure aborts
    /// the pass and leaves the remaining lines queued.
    pub fn process(&mut self, lines: &mut VecDeque<String>, now: Timestamp) -> Result<Batch> {
        let mut batch = Batch::default();
        for item in self.parser.parse_lines(lines) {
            let record = match item {
                Ok(record) => record,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::info!("missed (unparsed): {}", e);
                    batch.rejected += 1;
                    continue;
                }
            };
            batch.received += 1;

            if let Record::Data(packet) = &record {
                self.stats.update_counts(packet.counters);
            }

            if self.last_record.as_ref() == Some(&record) {
                if self.debug.parse >= 3 {
                    log::debug!("ignoring duplicate packet {:?}", record);
                }
                continue;
            }
            self.last_record = Some(record);

            let packet = match record {
                Record::Data(raw) => Self::data_to_packet(
                    &mut self.decoder,
                    &mut self.rain,
                    &self.sensor_map,
                    &raw,
                    now,
                ),
                Record::Channel(report) => Self::channel_to_packet(
                    self.band,
                    &self.transmitters,
                    &self.sensor_map,
                    self.debug,
                    &report,
                    now,
                ),
            };

            if let Some(packet) = packet {
                if self.debug.parse >= 3 {
                    log::debug!("pkt= {:?}", packet);
                }
                batch.packets.push(packet);
            }
        }

        Ok(batch)
    }

    fn data_to_packet(
        decoder: &mut PayloadDecoder,
        rain: &mut RainCounter,
        sensor_map: &SensorMap,
        raw: &RawPacket,
        now: Timestamp,
    ) -> Option<LoopPacket> {
        let mut reading = decoder.decode(raw, now);
        if let Some(count) = reading.get(Observation::RainCount).and_then(|v| v.as_i64()) {
            let amount = rain.update(count as u8);
            reading.set(Observation::Rain, amount);
        }
        Self::reading_to_packet(sensor_map, &reading)
    }

    fn channel_to_packet(
        band: FrequencyBand,
        transmitters: &TransmitterConfig,
        sensor_map: &SensorMap,
        debug: DebugLevels,
        report: &ChannelReport,
        now: Timestamp,
    ) -> Option<LoopPacket> {
        if band != FrequencyBand::EU {
            if debug.rtld >= 3 {
                log::debug!("Don't store freqErrors for frequency band {}", band);
            }
            return None;
        }

        if let Some(transmitter) = report.transmitter {
            let target = store_target(now.timestamp(), &transmitters.active_ids);
            if target != Some(transmitter) {
                if debug.rtld >= 3 {
                    log::debug!(
                        "Don't store freqErr: {} for transm: {}",
                        report.freq_error,
                        transmitter
                    );
                }
                return None;
            }
        }

        if report.channel_idx >= MAX_FREQ_ERROR {
            return None;
        }

        let mut reading = SensorReading::new(now, 0);
        reading.set(
            Observation::FreqError(report.channel_idx),
            i64::from(report.freq_error),
        );
        if debug.rtld >= 3 {
            log::debug!(
                "Store freqError{}: {} for transmitter: {:?}",
                report.channel_idx,
                report.freq_error,
                report.transmitter
            );
        }
        Self::reading_to_packet(sensor_map, &reading)
    }

    fn reading_to_packet(sensor_map: &SensorMap, reading: &SensorReading) -> Option<LoopPacket> {
        let mut packet = LoopPacket::new(reading.timestamp);
        packet.us_units = reading.unit_system;
        sensor_map.apply(&reading.values, &mut packet.fields);
        if packet.fields.is_empty() {
            None
        } else {
            Some(packet)
        }
    }

    /// Close the archive period and return the fields for the archive record
    ///
    /// Always carries the aggregate reception quality when it is known; the
    /// per-transmitter values are added only when configured and more than
    /// one transmitter is active.
    pub fn new_archive_record(&mut self, now: Timestamp) -> LoopPacket {
        let stats = self.stats.rollover(now.timestamp());
        let mut record = LoopPacket::new(now);

        let Some(pct_good_all) = stats.pct_good_all else {
            return record;
        };
        for field in self.sensor_map.fields_for(Observation::PctGoodAll) {
            record
                .fields
                .insert(field.to_string(), ObservationValue::Float(pct_good_all));
        }

        let tr_count = self.transmitters.count();
        if self.save_pct_good_per_transmitter && tr_count > 1 {
            for slot in 0..tr_count.min(MAX_TRACKED) {
                let Some(pct_good) = stats.pct_good(slot) else {
                    continue;
                };
                for field in self.sensor_map.fields_for(Observation::PctGood(slot as u8)) {
                    record
                        .fields
                        .insert(field.to_string(), ObservationValue::Float(pct_good));
                }
            }
        }
        record
    }
}

/// A pipeline attached to a running receiver
pub struct Driver {
    pipeline: PacketPipeline,
    supervisor: Option<ProcessSupervisor>,
    pending: VecDeque<String>,
    last_received: Instant,
    stall_timeout: Duration,
    drain_timeout: Duration,
    command_line: String,
}

impl Driver {
    /// Validate `config` and launch the receiver
    pub fn start(config: &DriverConfig) -> Result<Self> {
        let pipeline = PacketPipeline::new(config)?;
        let command_line = config.receiver_command(pipeline.transmitters());
        let options = LaunchOptions::from_command_line(
            &command_line,
            config.path.clone(),
            config.ld_library_path.clone(),
        )?;
        let supervisor = ProcessSupervisor::startup(options)?;

        Ok(Self {
            pipeline,
            supervisor: Some(supervisor),
            pending: VecDeque::new(),
            last_received: Instant::now(),
            stall_timeout: config.stall_timeout(),
            drain_timeout: config.drain_timeout(),
            command_line,
        })
    }

    /// Full receiver command line, including band and transmitter mask
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_some()
    }

    /// Pull receiver output for at most the drain timeout and decode it
    ///
    /// A fatal error shuts the session down; further calls fail with
    /// [`DecoderError::ProcessDied`].
    pub fn poll(&mut self) -> Result<Vec<LoopPacket>> {
        match self.poll_session() {
            Ok(packets) => Ok(packets),
            Err(e) => {
                if e.is_fatal() {
                    log::error!("{}", e);
                    self.shutdown();
                }
                Err(e)
            }
        }
    }

    fn poll_session(&mut self) -> Result<Vec<LoopPacket>> {
        let supervisor = self.supervisor.as_mut().ok_or(DecoderError::ProcessDied)?;

        if !supervisor.running() || supervisor.stderr_closed() {
            let remaining: Vec<String> = supervisor
                .drain_stderr(Duration::ZERO)
                .into_iter()
                .map(|l| l.trim_end().to_string())
                .collect();
            if !remaining.is_empty() {
                log::error!("err: {:?}", remaining);
            }
            return Err(DecoderError::ProcessDied);
        }

        // must exceed the receiver's own init time (EU 16 s, others 133 s)
        let silent = self.last_received.elapsed();
        if silent > self.stall_timeout {
            return Err(DecoderError::ProcessStalled(silent.as_secs()));
        }

        for line in supervisor.drain_stdout() {
            log::info!("out: {}", line.trim_end());
        }

        let lines = supervisor.drain_stderr(self.drain_timeout);
        self.pending.extend(lines);

        let batch = self.pipeline.process(&mut self.pending, Utc::now())?;
        if batch.received > 0 {
            self.last_received = Instant::now();
        }
        Ok(batch.packets)
    }

    /// Close the archive period, see [`PacketPipeline::new_archive_record`]
    pub fn new_archive_record(&mut self, now: Timestamp) -> LoopPacket {
        self.pipeline.new_archive_record(now)
    }

    /// Stop the receiver; safe to call more than once
    pub fn shutdown(&mut self) {
        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.shutdown();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
