//! Per-channel delivery-stream health: pulse boundaries, clock regression,
//! and sequence-number gaps.

use crate::error::DataError;
use ned_common::PulseTimestamp;

/// What one accepted batch told us about the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Observation {
    /// The timestamp differs from the previous one on this channel. On the
    /// pulse channel this gates the charge integrator.
    pub(crate) new_pulse: bool,
    /// Sequence numbers skipped since the last batch, zero when contiguous.
    pub(crate) newly_missing: u64,
}

/// Sequence and timestamp state for one subscribed channel.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChannelTracker {
    name: String,
    last_timestamp: Option<PulseTimestamp>,
    last_sequence: Option<u32>,
    sequence_count: u64,
    missing_packets: u64,
    missing_from: Option<u32>,
}

impl ChannelTracker {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn sequence_count(&self) -> u64 {
        self.sequence_count
    }

    pub(crate) fn missing_packets(&self) -> u64 {
        self.missing_packets
    }

    pub(crate) fn missing_from(&self) -> Option<u32> {
        self.missing_from
    }

    pub(crate) fn last_sequence(&self) -> Option<u32> {
        self.last_sequence
    }

    /// Record one batch timestamp. A timestamp strictly before the last
    /// accepted one is a clock regression: the batch is rejected and no state
    /// changes.
    pub(crate) fn observe(
        &mut self,
        timestamp: PulseTimestamp,
    ) -> Result<Observation, DataError> {
        if let Some(last) = self.last_timestamp {
            if timestamp.precedes(&last) {
                return Err(DataError::BadTimeStamp {
                    got: timestamp,
                    last,
                });
            }
        }

        let new_pulse = match self.last_timestamp {
            Some(last) => !last.same_pulse(&timestamp),
            None => true,
        };

        let sequence = timestamp.pulse_id;
        let mut newly_missing = 0;
        if let Some(last_sequence) = self.last_sequence {
            if sequence != last_sequence.wrapping_add(1) {
                newly_missing = u64::from(sequence.wrapping_sub(last_sequence)) + 1;
                self.missing_from = Some(last_sequence.wrapping_add(1));
                self.missing_packets += newly_missing;
            }
        }

        self.last_sequence = Some(sequence);
        self.last_timestamp = Some(timestamp);
        self.sequence_count += 1;

        Ok(Observation {
            new_pulse,
            newly_missing,
        })
    }

    pub(crate) fn reset(&mut self) {
        self.last_timestamp = None;
        self.last_sequence = None;
        self.sequence_count = 0;
        self.missing_packets = 0;
        self.missing_from = None;
    }
}

/// Running proton-charge total, fed exactly once per distinct pulse on the
/// pulse channel.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ChargeIntegrator {
    total: f64,
    pulse_count: u64,
}

impl ChargeIntegrator {
    pub(crate) fn record(&mut self, charge: f64) {
        self.total += charge;
        self.pulse_count += 1;
    }

    pub(crate) fn total(&self) -> f64 {
        self.total
    }

    pub(crate) fn pulse_count(&self) -> u64 {
        self.pulse_count
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stamp(secs: u32, nanos: u32, pulse_id: u32) -> PulseTimestamp {
        PulseTimestamp::new(secs, nanos, pulse_id)
    }

    #[test]
    fn contiguous_sequences_record_no_gap() {
        let mut tracker = ChannelTracker::new("events".into());
        for seq in 5..9 {
            let obs = tracker.observe(stamp(100 + seq, 0, seq)).unwrap();
            assert_eq!(obs.newly_missing, 0);
        }
        assert_eq!(tracker.missing_packets(), 0);
        assert_eq!(tracker.missing_from(), None);
        assert_eq!(tracker.sequence_count(), 4);
    }

    #[test]
    fn sequence_gap_is_counted_and_located() {
        let mut tracker = ChannelTracker::new("events".into());
        tracker.observe(stamp(100, 0, 5)).unwrap();
        let obs = tracker.observe(stamp(101, 0, 8)).unwrap();

        assert_eq!(obs.newly_missing, 4);
        assert_eq!(tracker.missing_packets(), 4);
        assert_eq!(tracker.missing_from(), Some(6));
        assert_eq!(tracker.last_sequence(), Some(8));
    }

    #[test]
    fn first_packet_never_counts_as_a_gap() {
        let mut tracker = ChannelTracker::new("events".into());
        let obs = tracker.observe(stamp(100, 0, 4000)).unwrap();

        assert_eq!(obs.newly_missing, 0);
        assert!(obs.new_pulse);
        assert_eq!(tracker.missing_packets(), 0);
    }

    #[test]
    fn clock_regression_rejects_batch_and_leaves_state_untouched() {
        let mut tracker = ChannelTracker::new("events".into());
        tracker.observe(stamp(100, 500, 5)).unwrap();

        assert!(matches!(
            tracker.observe(stamp(100, 499, 6)),
            Err(DataError::BadTimeStamp { .. })
        ));

        assert_eq!(tracker.last_sequence(), Some(5));
        assert_eq!(tracker.sequence_count(), 1);
        assert_eq!(tracker.missing_packets(), 0);
    }

    #[test]
    fn repeated_timestamp_is_not_a_new_pulse() {
        let mut tracker = ChannelTracker::new("pulse".into());

        let first = tracker.observe(stamp(100, 0, 1)).unwrap();
        assert!(first.new_pulse);

        let repeat = tracker.observe(stamp(100, 0, 1)).unwrap();
        assert!(!repeat.new_pulse);

        let next = tracker.observe(stamp(100, 1, 2)).unwrap();
        assert!(next.new_pulse);
    }

    #[test]
    fn charge_integrates_once_per_distinct_pulse() {
        let mut tracker = ChannelTracker::new("pulse".into());
        let mut integrator = ChargeIntegrator::default();

        for ts in [stamp(100, 0, 1), stamp(100, 0, 1), stamp(100, 1, 2)] {
            if tracker.observe(ts).unwrap().new_pulse {
                integrator.record(1.5);
            }
        }

        assert_eq!(integrator.pulse_count(), 2);
        assert_eq!(integrator.total(), 3.0);
    }

    #[test]
    fn reset_returns_the_sentinel_state() {
        let mut tracker = ChannelTracker::new("events".into());
        tracker.observe(stamp(100, 0, 5)).unwrap();
        tracker.observe(stamp(101, 0, 9)).unwrap();

        tracker.reset();

        assert_eq!(tracker.last_sequence(), None);
        assert_eq!(tracker.sequence_count(), 0);
        assert_eq!(tracker.missing_packets(), 0);
        assert_eq!(tracker.missing_from(), None);

        // Next packet after reset is first again: no gap.
        let obs = tracker.observe(stamp(102, 0, 50)).unwrap();
        assert_eq!(obs.newly_missing, 0);
    }
}
