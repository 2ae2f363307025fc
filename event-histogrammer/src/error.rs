use ned_common::{ChannelId, DetectorId, PixelId, PulseTimestamp};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("detector {detector}: pixel range start {start} exceeds end {end}")]
    InvalidPixelRange {
        detector: DetectorId,
        start: PixelId,
        end: PixelId,
    },
    #[error("{count} detectors configured, at most {max} supported")]
    TooManyDetectors { count: usize, max: usize },
    #[error("{count} channels configured, at most {max} supported")]
    TooManyChannels { count: usize, max: usize },
    #[error("no detectors configured")]
    NoDetectors,
    #[error("no channels configured")]
    NoChannels,
    #[error("detector {detector}: pixel map has {len} entries, expected {expected}")]
    PixelMapLength {
        detector: DetectorId,
        len: usize,
        expected: usize,
    },
    #[error("detector {detector}: pixel map entry {value} outside [{start}, {end}]")]
    PixelMapOutOfRange {
        detector: DetectorId,
        value: PixelId,
        start: PixelId,
        end: PixelId,
    },
    #[error("detector {detector}: pixel ROI row width must be non-zero")]
    ZeroRowWidth { detector: DetectorId },
    #[error("option refers to detector {detector}, but only {count} are configured")]
    UnknownDetector { detector: DetectorId, count: usize },
}

#[derive(Debug, Error)]
pub(crate) enum AllocationError {
    #[error("computed histogram buffer size is zero")]
    EmptyLayout,
    #[error("histogram buffer cannot be reallocated while acquiring")]
    AcquisitionActive,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("channel {name}: connection timed out after {timeout_ms} ms")]
    Timeout { name: String, timeout_ms: u64 },
    #[error("channel {name}: {message}")]
    Provider { name: String, message: String },
}

#[derive(Debug, Error)]
pub(crate) enum DataError {
    #[error("batch rejected: {pixels} pixel IDs but {tofs} time-of-flight values")]
    LengthMismatch { pixels: usize, tofs: usize },
    #[error("batch rejected: timestamp {got:?} precedes last seen {last:?}")]
    BadTimeStamp {
        got: PulseTimestamp,
        last: PulseTimestamp,
    },
    #[error("payload truncated: needed {expected} more bytes, had {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("payload has {extra} trailing bytes")]
    TrailingBytes { extra: usize },
    #[error("no channel with id {0} is configured")]
    UnknownChannel(ChannelId),
}

#[derive(Debug, Error)]
pub(crate) enum FileFormatError {
    #[error("table file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("table file {path:?}: missing element count line")]
    MissingCount { path: PathBuf },
    #[error("table file {path:?}: invalid element count {line:?}")]
    InvalidCount { path: PathBuf, line: String },
    #[error("table file {path:?}: element count {count} exceeds maximum {max}")]
    TooManyLines {
        path: PathBuf,
        count: usize,
        max: usize,
    },
    #[error("table file {path:?}: whitespace in data line {line_number}")]
    Whitespace { path: PathBuf, line_number: usize },
    #[error("table file {path:?}: unparsable token {token:?} at line {line_number}")]
    BadToken {
        path: PathBuf,
        line_number: usize,
        token: String,
    },
    #[error("table file {path:?}: expected {expected} data lines, found {found}")]
    CountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

/// Setup-time failures that abort a `start()` transition. These drive the
/// controller into its recoverable `Error` state; they never unwind through
/// the ingestion loop.
#[derive(Debug, Error)]
pub(crate) enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
