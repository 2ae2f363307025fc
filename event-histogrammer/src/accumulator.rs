//! The hot path: classify each event of a batch onto every detector whose
//! pixel range contains it, and update the shared histogram buffer.

use crate::{
    buffer::{AllocationStatus, BufferLayout, HistogramBuffer},
    channel::{ChannelTracker, ChargeIntegrator},
    detector::DetectorConfig,
    error::{AllocationError, DataError},
};
use ned_common::{ChannelId, EventBatch, TimeOfFlight};

/// Index of the channel whose timestamps define pulse boundaries.
pub(crate) const PULSE_CHANNEL: ChannelId = 0;

/// All cross-task mutable acquisition state, guarded by a single lock.
/// Lookup tables inside the detector configs are swapped whole, never
/// mutated, so the lock is held only for the batch walk itself.
#[derive(Debug)]
pub(crate) struct EngineCore {
    pub(crate) buffer: HistogramBuffer,
    pub(crate) detectors: Vec<DetectorConfig>,
    pub(crate) channels: Vec<ChannelTracker>,
    pub(crate) charge: ChargeIntegrator,
    pub(crate) allocation: AllocationStatus,
    acquiring: bool,
    events_since_update: u64,
    per_detector_since_update: Vec<u64>,
    total_events: u64,
}

impl EngineCore {
    pub(crate) fn new(detectors: Vec<DetectorConfig>, channel_names: Vec<String>) -> Self {
        let per_detector_since_update = vec![0; detectors.len()];
        let channels = channel_names.into_iter().map(ChannelTracker::new).collect();
        Self {
            buffer: HistogramBuffer::unallocated(),
            detectors,
            channels,
            charge: ChargeIntegrator::default(),
            allocation: AllocationStatus::default(),
            acquiring: false,
            events_since_update: 0,
            per_detector_since_update,
            total_events: 0,
        }
    }

    /// Rebuild the buffer from the current detector configuration. On
    /// failure the previous buffer stays in place and the status records the
    /// failure.
    pub(crate) fn reallocate(&mut self, tof_max: TimeOfFlight) -> Result<(), AllocationError> {
        if self.acquiring {
            return Err(AllocationError::AcquisitionActive);
        }
        match BufferLayout::allocate(&self.detectors, tof_max) {
            Ok(layout) => {
                self.buffer = HistogramBuffer::new(layout);
                self.allocation = AllocationStatus::Ok;
                Ok(())
            }
            Err(e) => {
                self.allocation = AllocationStatus::Failed;
                Err(e)
            }
        }
    }

    pub(crate) fn needs_reallocation(&self) -> bool {
        self.allocation != AllocationStatus::Ok
    }

    pub(crate) fn set_acquiring(&mut self, acquiring: bool) {
        self.acquiring = acquiring;
    }

    /// Clear every per-acquisition counter and tracker; the buffer layout is
    /// kept, its counts zeroed.
    pub(crate) fn reset_for_start(&mut self) {
        self.buffer.zero();
        for tracker in &mut self.channels {
            tracker.reset();
        }
        self.charge.reset();
        self.events_since_update = 0;
        self.per_detector_since_update.fill(0);
        self.total_events = 0;
    }

    pub(crate) fn total_events(&self) -> u64 {
        self.total_events
    }

    /// Drain the event counters accumulated since the last statistics
    /// publish: the global total followed by the per-detector split.
    pub(crate) fn take_since_update(&mut self) -> (u64, Vec<u64>) {
        let global = std::mem::take(&mut self.events_since_update);
        let per_detector = self
            .per_detector_since_update
            .iter_mut()
            .map(std::mem::take)
            .collect();
        (global, per_detector)
    }

    /// Process one event batch from `channel`. Malformed batches and clock
    /// regressions reject the whole batch with no state change.
    pub(crate) fn accumulate(
        &mut self,
        channel: ChannelId,
        batch: &EventBatch,
    ) -> Result<(), DataError> {
        if !batch.is_well_formed() {
            return Err(DataError::LengthMismatch {
                pixels: batch.pixel_ids.len(),
                tofs: batch.time_of_flight.len(),
            });
        }
        let observation = self
            .channels
            .get_mut(channel)
            .ok_or(DataError::UnknownChannel(channel))?
            .observe(batch.timestamp)?;

        if channel == PULSE_CHANNEL && observation.new_pulse {
            self.charge.record(batch.proton_charge);
        }

        let Self {
            buffer,
            detectors,
            events_since_update,
            per_detector_since_update,
            total_events,
            ..
        } = self;
        let tof_max = f64::from(buffer.layout().tof_max());

        for (&pixel, &tof) in batch.pixel_ids.iter().zip(&batch.time_of_flight) {
            // Overlapping ranges are not an error: each matching detector
            // counts the event independently.
            for (detector, config) in detectors.iter().enumerate() {
                if !config.contains(pixel) {
                    continue;
                }

                let effective = config.transform.effective_tof(pixel, tof);
                let idx = config.remap(pixel);

                let in_tof_window = config
                    .tof_roi()
                    .map(|roi| roi.accepts(effective))
                    .unwrap_or(true);
                if in_tof_window {
                    if let Some(slot) = buffer.layout().pixel_slot(detector, idx) {
                        buffer.bump(slot);
                    }
                }

                if effective >= 0.0 && effective <= tof_max && config.xy_accepts(idx) {
                    let bin = effective as TimeOfFlight;
                    if let Some(slot) = buffer.layout().tof_slot(detector, bin) {
                        buffer.bump(slot);
                    }
                }

                *events_since_update = events_since_update.wrapping_add(1);
                if let Some(counter) = per_detector_since_update.get_mut(detector) {
                    *counter = counter.wrapping_add(1);
                }
                *total_events = total_events.wrapping_add(1);
            }
        }

        Ok(())
    }
}
