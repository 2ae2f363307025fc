pub mod metrics;

use rdkafka::ClientConfig;

pub type PixelId = u32;
pub type TimeOfFlight = u32;
pub type Counts = u32;
pub type FrameId = u32;

pub type DetectorId = usize;
pub type ChannelId = usize;

/// Upper bound on configured detectors; checked at the configuration
/// boundary, never assumed in the hot loop.
pub const MAX_DETECTORS: usize = 4;

/// Upper bound on subscribed event channels.
pub const MAX_CHANNELS: usize = 4;

/// Pulse timestamp as delivered by the upstream source: seconds plus
/// fractional nanoseconds, and the integer sequence tag ("user tag")
/// embedded alongside them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PulseTimestamp {
    pub secs: u32,
    pub nanos: u32,
    pub pulse_id: u32,
}

impl PulseTimestamp {
    pub fn new(secs: u32, nanos: u32, pulse_id: u32) -> Self {
        Self {
            secs,
            nanos,
            pulse_id,
        }
    }

    /// Wall-clock ordering. The pulse sequence tag takes no part in this,
    /// it is tracked separately for gap detection.
    pub fn precedes(&self, other: &PulseTimestamp) -> bool {
        (self.secs, self.nanos) < (other.secs, other.nanos)
    }

    /// Two timestamps mark the same pulse when their clock fields agree.
    pub fn same_pulse(&self, other: &PulseTimestamp) -> bool {
        (self.secs, self.nanos) == (other.secs, other.nanos)
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.secs) + f64::from(self.nanos) * 1e-9
    }
}

/// One delivered unit of neutron events: two parallel sequences plus the
/// originating pulse timestamp and the accumulated proton charge.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventBatch {
    pub pixel_ids: Vec<PixelId>,
    pub time_of_flight: Vec<TimeOfFlight>,
    pub timestamp: PulseTimestamp,
    pub proton_charge: f64,
}

impl EventBatch {
    pub fn event_count(&self) -> usize {
        self.pixel_ids.len()
    }

    /// The two sequences must be the same length for the batch to be usable.
    pub fn is_well_formed(&self) -> bool {
        self.pixel_ids.len() == self.time_of_flight.len()
    }
}

pub fn generate_kafka_client_config(
    broker_address: &str,
    username: &Option<String>,
    password: &Option<String>,
) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config.set("bootstrap.servers", broker_address);

    if let (Some(username), Some(password)) = (username, password) {
        client_config
            .set("sasl.mechanism", "SCRAM-SHA-256")
            .set("security.protocol", "sasl-ssl")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    client_config
}
