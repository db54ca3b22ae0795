//! Per-transmitter reception quality
//!
//! The receiver reports, with every data packet, the number of messages it
//! has received from each of the first four active transmitters since it
//! started. At each archive boundary the tracker compares the messages
//! received in the period with the theoretical maximum derived from the
//! transmitter's loop time.

use crate::calibration::loop_time;
use crate::config::TransmitterConfig;

/// Number of transmitters the receiver reports counters for
pub const MAX_TRACKED: usize = 4;

/// Statistics of one tracked transmitter for the last archive period
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitterStats {
    /// Position in the receiver's counter tuple
    pub slot: usize,
    /// 0-based transmitter id
    pub transmitter_id: u8,
    /// Messages expected in the period
    pub max_count: i64,
    /// Messages received in the period
    pub count: i64,
    pub missed: i64,
    pub pct_good: f64,
}

/// Result of an archive period rollover
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArchiveStats {
    /// Period length in seconds, 0 for the first rollover
    pub period: i64,
    /// Transmitters with a valid count this period
    pub transmitters: Vec<TransmitterStats>,
    /// Aggregate over all valid transmitters
    pub pct_good_all: Option<f64>,
}

impl ArchiveStats {
    /// pct_good of a counter slot, if valid this period
    pub fn pct_good(&self, slot: usize) -> Option<f64> {
        self.transmitters
            .iter()
            .find(|t| t.slot == slot)
            .map(|t| t.pct_good)
    }
}

/// Accumulates message counters between archive boundaries
#[derive(Debug, Clone)]
pub struct LinkQualityTracker {
    /// Transmitter id per counter slot
    slots: [Option<u8>; MAX_TRACKED],
    curr_cnt: [u32; MAX_TRACKED],
    last_cnt: [u32; MAX_TRACKED],
    /// Unix time of the previous boundary, 0 before the first one
    last_ts: i64,
}

impl LinkQualityTracker {
    pub fn new(transmitters: &TransmitterConfig) -> Self {
        let mut slots = [None; MAX_TRACKED];
        for (slot, id) in slots.iter_mut().zip(&transmitters.active_ids) {
            *slot = Some(*id);
        }
        if transmitters.count() > MAX_TRACKED {
            log::info!(
                "{} active transmitters, link statistics cover the first {}",
                transmitters.count(),
                MAX_TRACKED
            );
        }
        Self {
            slots,
            curr_cnt: [0; MAX_TRACKED],
            last_cnt: [0; MAX_TRACKED],
            last_ts: 0,
        }
    }

    /// Record the receiver's cumulative message counters
    pub fn update_counts(&mut self, counters: [u32; MAX_TRACKED]) {
        self.curr_cnt = counters;
    }

    /// Latest cumulative counters
    pub fn current_counts(&self) -> [u32; MAX_TRACKED] {
        self.curr_cnt
    }

    /// Close the archive period ending at `now_ts` (unix seconds)
    ///
    /// The first call only establishes the baseline. Afterwards each slot
    /// with a positive count gets `max_count = period // loop_time`,
    /// `missed = max_count - count` and `pct_good = 100 * count / max_count`.
    /// The current counters become the baseline of the next period.
    pub fn rollover(&mut self, now_ts: i64) -> ArchiveStats {
        log::debug!(
            "ARCHIVE_STATS: last time: last_cnt[0-3]: {:12} {:8} {:8} {:8} {:8}",
            self.last_ts,
            self.last_cnt[0],
            self.last_cnt[1],
            self.last_cnt[2],
            self.last_cnt[3]
        );
        log::debug!(
            "ARCHIVE_STATS: curr time: curr_cnt[0-3]: {:12} {:8} {:8} {:8} {:8}",
            now_ts,
            self.curr_cnt[0],
            self.curr_cnt[1],
            self.curr_cnt[2],
            self.curr_cnt[3]
        );

        let mut stats = ArchiveStats::default();
        if self.last_ts > 0 {
            stats = self.summarize(now_ts - self.last_ts);
        }

        self.last_ts = now_ts;
        self.last_cnt = self.curr_cnt;
        stats
    }

    fn summarize(&self, period: i64) -> ArchiveStats {
        let mut stats = ArchiveStats {
            period,
            ..Default::default()
        };
        let mut total_count = 0;
        let mut total_missed = 0;
        let mut total_max_count = 0;

        for slot in 0..MAX_TRACKED {
            if self.curr_cnt[slot] == 0 {
                continue;
            }
            let Some(transmitter_id) = self.slots[slot] else {
                continue;
            };

            let max_count = (period as f64 / loop_time(Some(transmitter_id))).floor() as i64;
            // negative after a receiver restart reset its counters
            let count = i64::from(self.curr_cnt[slot]) - i64::from(self.last_cnt[slot]);
            if count <= 0 || max_count <= 0 {
                continue;
            }

            let missed = max_count - count;
            let pct_good = 100.0 * count as f64 / max_count as f64;
            log::debug!(
                "ARCHIVE_STATS: station {}: max_count= {:4} count={:4} missed={:4} pct_good={:6.2}",
                slot + 1,
                max_count,
                count,
                missed,
                pct_good
            );

            total_count += count;
            total_missed += missed;
            total_max_count += max_count;
            stats.transmitters.push(TransmitterStats {
                slot,
                transmitter_id,
                max_count,
                count,
                missed,
                pct_good,
            });
        }

        if total_max_count > 0 {
            let pct_good_all = 100.0 * total_count as f64 / total_max_count as f64;
            log::debug!(
                "ARCHIVE_STATS: total_max_count={} total_count={} total_missed={} pctGood={:6.2}",
                total_max_count,
                total_count,
                total_missed,
                pct_good_all
            );
            stats.pct_good_all = Some(pct_good_all);
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(iss: u8, anemometer: u8, leaf_soil: u8) -> LinkQualityTracker {
        LinkQualityTracker::new(&TransmitterConfig::new(iss, anemometer, leaf_soil, 0, 0).unwrap())
    }

    #[test]
    fn test_first_rollover_is_baseline() {
        let mut t = tracker(1, 0, 0);
        t.update_counts([50, 0, 0, 0]);
        let stats = t.rollover(1_700_000_000);
        assert_eq!(stats, ArchiveStats::default());
        assert_eq!(stats.pct_good_all, None);
    }

    #[test]
    fn test_single_transmitter_period() {
        let mut t = tracker(1, 0, 0);
        t.update_counts([50, 0, 0, 0]);
        t.rollover(1_700_000_000);

        t.update_counts([150, 0, 0, 0]);
        let stats = t.rollover(1_700_000_300);
        assert_eq!(stats.period, 300);
        assert_eq!(stats.transmitters.len(), 1);

        let tx = &stats.transmitters[0];
        assert_eq!(tx.transmitter_id, 0);
        assert_eq!(tx.max_count, 117);
        assert_eq!(tx.count, 100);
        assert_eq!(tx.missed, 17);
        assert!((tx.pct_good - 85.47).abs() < 0.01);
        assert_eq!(stats.pct_good_all, Some(tx.pct_good));
    }

    #[test]
    fn test_multiple_transmitters_aggregate() {
        // channels 1 and 3 -> ids 0 and 2
        let mut t = tracker(1, 0, 3);
        t.update_counts([10, 20, 0, 0]);
        t.rollover(1000);

        t.update_counts([110, 120, 0, 0]);
        let stats = t.rollover(1300);

        // 300 / 2.6875 = 111.6 -> 111
        assert_eq!(stats.transmitters[1].transmitter_id, 2);
        assert_eq!(stats.transmitters[1].max_count, 111);
        assert_eq!(stats.pct_good(1), Some(100.0 * 100.0 / 111.0));

        let expected = 100.0 * 200.0 / (117.0 + 111.0);
        assert!((stats.pct_good_all.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_counter_reset_is_skipped() {
        let mut t = tracker(1, 2, 0);
        t.update_counts([500, 400, 0, 0]);
        t.rollover(1000);

        // receiver restarted, slot 0 went backwards
        t.update_counts([20, 500, 0, 0]);
        let stats = t.rollover(1300);
        assert_eq!(stats.transmitters.len(), 1);
        assert_eq!(stats.transmitters[0].slot, 1);
        assert_eq!(stats.pct_good(0), None);
    }

    #[test]
    fn test_rollover_resets_baseline() {
        let mut t = tracker(1, 0, 0);
        t.update_counts([100, 0, 0, 0]);
        t.rollover(1000);
        t.update_counts([200, 0, 0, 0]);
        t.rollover(1300);

        // nothing received in the next period
        let stats = t.rollover(1600);
        assert!(stats.transmitters.is_empty());
        assert_eq!(stats.pct_good_all, None);
    }

    #[test]
    fn test_zero_length_period() {
        let mut t = tracker(1, 0, 0);
        t.update_counts([1, 0, 0, 0]);
        t.rollover(1000);
        t.update_counts([2, 0, 0, 0]);
        let stats = t.rollover(1001);
        assert!(stats.transmitters.is_empty());
    }
}
