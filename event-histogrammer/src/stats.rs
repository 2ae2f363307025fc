//! Throttled publication of derived counters. Histogram accumulation is
//! never skipped; only the derived statistics are rate-limited.

use crate::accumulator::EngineCore;
use metrics::{counter, gauge};
use ned_common::metrics::{names, scopes};
use std::time::{Duration, Instant};

/// Everything published on one statistics update.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StatsReport {
    pub(crate) event_rate: f64,
    pub(crate) per_detector_rates: Vec<f64>,
    pub(crate) total_events: u64,
    pub(crate) pulse_count: u64,
    pub(crate) proton_charge: f64,
    pub(crate) channels: Vec<ChannelReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChannelReport {
    pub(crate) sequence_count: u64,
    pub(crate) missing_packets: u64,
    pub(crate) missing_from: Option<u32>,
}

/// Wall-clock throttle for the derived counters.
#[derive(Debug)]
pub(crate) struct StatsThrottle {
    period: Duration,
    last_publish: Instant,
}

impl StatsThrottle {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            last_publish: Instant::now(),
        }
    }

    /// Drain the engine's rate counters if the period has elapsed. Under the
    /// threshold nothing changes and `None` is returned.
    pub(crate) fn tick(&mut self, now: Instant, core: &mut EngineCore) -> Option<StatsReport> {
        let elapsed = now.saturating_duration_since(self.last_publish);
        if elapsed < self.period {
            return None;
        }
        self.last_publish = now;

        let elapsed_secs = elapsed.as_secs_f64();
        let (global, per_detector) = core.take_since_update();

        Some(StatsReport {
            event_rate: global as f64 / elapsed_secs,
            per_detector_rates: per_detector
                .into_iter()
                .map(|events| events as f64 / elapsed_secs)
                .collect(),
            total_events: core.total_events(),
            pulse_count: core.charge.pulse_count(),
            proton_charge: core.charge.total(),
            channels: core
                .channels
                .iter()
                .map(|tracker| ChannelReport {
                    sequence_count: tracker.sequence_count(),
                    missing_packets: tracker.missing_packets(),
                    missing_from: tracker.missing_from(),
                })
                .collect(),
        })
    }

    /// Restart the throttle window, e.g. on acquisition start.
    pub(crate) fn restart(&mut self, now: Instant) {
        self.last_publish = now;
    }
}

/// Push one report out through the metrics registry.
pub(crate) fn emit(report: &StatsReport) {
    gauge!(names::EVENT_RATE).set(report.event_rate);
    for (detector, rate) in report.per_detector_rates.iter().enumerate() {
        gauge!(names::EVENT_RATE, &vec![scopes::detector_label(detector)]).set(*rate);
    }
    counter!(names::EVENTS_PROCESSED).absolute(report.total_events);
    counter!(names::PULSE_COUNT).absolute(report.pulse_count);
    gauge!(names::PROTON_CHARGE).set(report.proton_charge);
    for (channel, state) in report.channels.iter().enumerate() {
        let labels = vec![scopes::channel_label(channel)];
        counter!(names::SEQUENCE_COUNT, &labels).absolute(state.sequence_count);
        counter!(names::MISSING_PACKETS, &labels).absolute(state.missing_packets);
        if let Some(missing_from) = state.missing_from {
            gauge!(names::MISSING_FROM, &labels).set(f64::from(missing_from));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::detector::DetectorConfig;
    use ned_common::{EventBatch, PulseTimestamp};

    fn loaded_engine() -> EngineCore {
        let mut core = EngineCore::new(
            vec![DetectorConfig::new(0, 9)],
            vec!["pulse".into()],
        );
        core.reallocate(20).unwrap();
        core.accumulate(
            0,
            &EventBatch {
                pixel_ids: vec![1, 2, 3, 4],
                time_of_flight: vec![1, 2, 3, 4],
                timestamp: PulseTimestamp::new(100, 0, 1),
                proton_charge: 0.5,
            },
        )
        .unwrap();
        core
    }

    #[test]
    fn under_the_period_nothing_is_published_or_reset() {
        let mut core = loaded_engine();
        let mut throttle = StatsThrottle::new(Duration::from_secs(10));
        let start = Instant::now();
        throttle.restart(start);

        assert!(throttle.tick(start + Duration::from_secs(5), &mut core).is_none());

        // The counters survive for the next tick.
        let report = throttle
            .tick(start + Duration::from_secs(10), &mut core)
            .unwrap();
        assert_eq!(report.total_events, 4);
        assert_eq!(report.event_rate, 4.0 / 10.0);
    }

    #[test]
    fn publishing_resets_the_rate_accumulators() {
        let mut core = loaded_engine();
        let mut throttle = StatsThrottle::new(Duration::from_secs(2));
        let start = Instant::now();
        throttle.restart(start);

        let first = throttle
            .tick(start + Duration::from_secs(2), &mut core)
            .unwrap();
        assert_eq!(first.event_rate, 2.0);
        assert_eq!(first.per_detector_rates, vec![2.0]);

        // No new events: the next window reports a zero rate but keeps the
        // running totals.
        let second = throttle
            .tick(start + Duration::from_secs(4), &mut core)
            .unwrap();
        assert_eq!(second.event_rate, 0.0);
        assert_eq!(second.total_events, 4);
        assert_eq!(second.pulse_count, 1);
        assert_eq!(second.proton_charge, 0.5);
    }

    #[test]
    fn report_carries_per_channel_stream_health() {
        let mut core = loaded_engine();
        core.accumulate(
            0,
            &EventBatch {
                pixel_ids: vec![],
                time_of_flight: vec![],
                timestamp: PulseTimestamp::new(101, 0, 5),
                proton_charge: 0.0,
            },
        )
        .unwrap();

        let mut throttle = StatsThrottle::new(Duration::ZERO);
        let report = throttle.tick(Instant::now(), &mut core).unwrap();

        let channel = &report.channels[0];
        assert_eq!(channel.sequence_count, 2);
        assert_eq!(channel.missing_packets, 5);
        assert_eq!(channel.missing_from, Some(2));
    }
}
