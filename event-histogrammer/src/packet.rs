//! Wire format for event batches and published frames: little-endian scalar
//! fields in a fixed order, length-prefixed arrays.
//!
//! Batch payload: `secs: u32`, `nanos: u32`, `pulse_id: u32`,
//! `proton_charge: f64`, `count: u32`, then `count` pixel IDs and `count`
//! TOF values. Frame payload: `frame_id: u32`, `timestamp_secs: f64`,
//! `count: u32`, then `count` histogram counts.

use crate::{error::DataError, publisher::FrameSnapshot};
use ned_common::{EventBatch, PulseTimestamp};
use std::mem::size_of;

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DataError> {
        match self.bytes.split_first_chunk::<N>() {
            Some((chunk, rest)) => {
                self.bytes = rest;
                Ok(*chunk)
            }
            None => Err(DataError::Truncated {
                expected: N,
                actual: self.bytes.len(),
            }),
        }
    }

    fn load_u32(&mut self) -> Result<u32, DataError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn load_f64(&mut self) -> Result<f64, DataError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn load_u32_vec(&mut self, count: usize) -> Result<Vec<u32>, DataError> {
        let needed = count * size_of::<u32>();
        if self.bytes.len() < needed {
            return Err(DataError::Truncated {
                expected: needed,
                actual: self.bytes.len(),
            });
        }
        (0..count).map(|_| self.load_u32()).collect()
    }

    fn finish(self) -> Result<(), DataError> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(DataError::TrailingBytes {
                extra: self.bytes.len(),
            })
        }
    }
}

pub(crate) fn decode_batch(bytes: &[u8]) -> Result<EventBatch, DataError> {
    let mut reader = Reader::new(bytes);

    let secs = reader.load_u32()?;
    let nanos = reader.load_u32()?;
    let pulse_id = reader.load_u32()?;
    let proton_charge = reader.load_f64()?;
    let count = reader.load_u32()? as usize;
    let pixel_ids = reader.load_u32_vec(count)?;
    let time_of_flight = reader.load_u32_vec(count)?;
    reader.finish()?;

    Ok(EventBatch {
        pixel_ids,
        time_of_flight,
        timestamp: PulseTimestamp::new(secs, nanos, pulse_id),
        proton_charge,
    })
}

pub(crate) fn encode_batch(batch: &EventBatch) -> Vec<u8> {
    let count = batch.event_count();
    let mut bytes = Vec::with_capacity(5 * size_of::<u32>() + size_of::<f64>() + 8 * count);
    bytes.extend_from_slice(&batch.timestamp.secs.to_le_bytes());
    bytes.extend_from_slice(&batch.timestamp.nanos.to_le_bytes());
    bytes.extend_from_slice(&batch.timestamp.pulse_id.to_le_bytes());
    bytes.extend_from_slice(&batch.proton_charge.to_le_bytes());
    bytes.extend_from_slice(&(count as u32).to_le_bytes());
    for pixel in &batch.pixel_ids {
        bytes.extend_from_slice(&pixel.to_le_bytes());
    }
    for tof in &batch.time_of_flight {
        bytes.extend_from_slice(&tof.to_le_bytes());
    }
    bytes
}

pub(crate) fn encode_frame(snapshot: &FrameSnapshot) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(
        2 * size_of::<u32>() + size_of::<f64>() + 4 * snapshot.counts.len(),
    );
    bytes.extend_from_slice(&snapshot.frame_id.to_le_bytes());
    bytes.extend_from_slice(&snapshot.timestamp_secs.to_le_bytes());
    bytes.extend_from_slice(&(snapshot.counts.len() as u32).to_le_bytes());
    for count in &snapshot.counts {
        bytes.extend_from_slice(&count.to_le_bytes());
    }
    bytes
}

pub(crate) fn decode_frame(bytes: &[u8]) -> Result<FrameSnapshot, DataError> {
    let mut reader = Reader::new(bytes);

    let frame_id = reader.load_u32()?;
    let timestamp_secs = reader.load_f64()?;
    let count = reader.load_u32()? as usize;
    let counts = reader.load_u32_vec(count)?;
    reader.finish()?;

    Ok(FrameSnapshot {
        frame_id,
        timestamp_secs,
        counts,
    })
}
