//! Metric registration for the Prometheus endpoint.

use metrics::{Unit, describe_counter, describe_gauge};
use ned_common::metrics::names;

pub(crate) fn register() {
    describe_counter!(
        names::BATCHES_RECEIVED,
        Unit::Count,
        "Number of event batches received"
    );
    describe_counter!(
        names::FAILURES,
        Unit::Count,
        "Number of failures encountered"
    );
    describe_counter!(
        names::EVENTS_PROCESSED,
        Unit::Count,
        "Number of events accumulated into the histograms"
    );
    describe_gauge!(
        names::EVENT_RATE,
        "Events per second over the last statistics window"
    );
    describe_counter!(
        names::FRAMES_PUBLISHED,
        Unit::Count,
        "Number of frame snapshots published"
    );
    describe_counter!(names::PULSE_COUNT, Unit::Count, "Number of distinct pulses");
    describe_gauge!(names::PROTON_CHARGE, "Integrated proton charge");
    describe_counter!(
        names::SEQUENCE_COUNT,
        Unit::Count,
        "Number of packets accepted per channel"
    );
    describe_counter!(
        names::MISSING_PACKETS,
        Unit::Count,
        "Number of packets missing per channel"
    );
    describe_gauge!(
        names::MISSING_FROM,
        "Sequence number the most recent gap started at"
    );
    describe_gauge!(
        names::ACQUISITION_STATE,
        "Controller state (0 idle, 1 starting, 2 acquiring, 3 stopping, 4 error)"
    );
    describe_gauge!(names::BUFFER_SIZE, "Histogram buffer size in bins");
}
