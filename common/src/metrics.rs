use metrics::{describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "ned_histogrammer_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1);
}

pub mod names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "ned_histogrammer_";

    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const BATCHES_RECEIVED: &str = concatcp!(METRIC_NAME_PREFIX, "batches_received");
    pub const EVENTS_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "events_processed");
    pub const EVENT_RATE: &str = concatcp!(METRIC_NAME_PREFIX, "event_rate");
    pub const FRAMES_PUBLISHED: &str = concatcp!(METRIC_NAME_PREFIX, "frames_published");
    pub const PULSE_COUNT: &str = concatcp!(METRIC_NAME_PREFIX, "pulse_count");
    pub const PROTON_CHARGE: &str = concatcp!(METRIC_NAME_PREFIX, "proton_charge");
    pub const SEQUENCE_COUNT: &str = concatcp!(METRIC_NAME_PREFIX, "sequence_count");
    pub const MISSING_PACKETS: &str = concatcp!(METRIC_NAME_PREFIX, "missing_packets");
    pub const MISSING_FROM: &str = concatcp!(METRIC_NAME_PREFIX, "missing_from");
    pub const ACQUISITION_STATE: &str = concatcp!(METRIC_NAME_PREFIX, "acquisition_state");
    pub const BUFFER_SIZE: &str = concatcp!(METRIC_NAME_PREFIX, "buffer_size");
}

pub mod batches_received {
    #[derive(Debug, Clone, Eq, Hash, PartialEq)]
    pub enum BatchKind {
        Event,
        Unexpected,
    }

    // Label building function
    pub fn get_label(batch_kind: BatchKind) -> (&'static str, &'static str) {
        (
            "batch_kind",
            match batch_kind {
                BatchKind::Event => "event",
                BatchKind::Unexpected => "unexpected",
            },
        )
    }
}

pub mod failures {
    #[derive(Debug, Clone, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        BadTimestamp,
        ConnectionFailed,
        KafkaPublishFailed,
        LengthMismatch,
        UnableToDecodeMessage,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::BadTimestamp => "bad_timestamp",
                FailureKind::ConnectionFailed => "connection_failed",
                FailureKind::KafkaPublishFailed => "kafka_publish_failed",
                FailureKind::LengthMismatch => "length_mismatch",
                FailureKind::UnableToDecodeMessage => "unable_to_decode_message",
            },
        )
    }
}

pub mod scopes {
    use crate::{ChannelId, DetectorId};

    pub fn detector_label(detector: DetectorId) -> (&'static str, String) {
        ("detector", detector.to_string())
    }

    pub fn channel_label(channel: ChannelId) -> (&'static str, String) {
        ("channel", channel.to_string())
    }
}
