use crate::{
    detector::DetectorConfig,
    error::{AllocationError, ConfigError},
};
use ned_common::{Counts, DetectorId, PixelId, TimeOfFlight};

/// Where one detector's two histogram regions sit in the flat buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DetectorRegion {
    pub(crate) pixel_start: PixelId,
    pub(crate) pixel_end: PixelId,
    pub(crate) pixel_offset: usize,
    pub(crate) pixel_size: usize,
    pub(crate) tof_offset: usize,
}

/// Buffer layout computed from the current detector configuration: all
/// pixel-histogram regions in detector order, followed by one TOF region of
/// `tof_max + 1` bins per detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BufferLayout {
    regions: Vec<DetectorRegion>,
    tof_max: TimeOfFlight,
    total_size: usize,
}

impl BufferLayout {
    /// A layout with no regions at all; index lookups always miss.
    pub(crate) fn empty() -> Self {
        Self {
            regions: Vec::new(),
            tof_max: 0,
            total_size: 0,
        }
    }

    pub(crate) fn allocate(
        detectors: &[DetectorConfig],
        tof_max: TimeOfFlight,
    ) -> Result<Self, AllocationError> {
        let mut regions = Vec::with_capacity(detectors.len());
        let mut offset = 0_usize;

        for (detector, config) in detectors.iter().enumerate() {
            if config.pixel_start > config.pixel_end {
                return Err(ConfigError::InvalidPixelRange {
                    detector,
                    start: config.pixel_start,
                    end: config.pixel_end,
                }
                .into());
            }
            let pixel_size = (config.pixel_end - config.pixel_start + 1) as usize;
            regions.push(DetectorRegion {
                pixel_start: config.pixel_start,
                pixel_end: config.pixel_end,
                pixel_offset: offset,
                pixel_size,
                tof_offset: 0,
            });
            offset += pixel_size;
        }

        let tof_size = tof_max as usize + 1;
        for region in &mut regions {
            region.tof_offset = offset;
            offset += tof_size;
        }

        if offset == 0 {
            return Err(AllocationError::EmptyLayout);
        }

        Ok(Self {
            regions,
            tof_max,
            total_size: offset,
        })
    }

    pub(crate) fn total_size(&self) -> usize {
        self.total_size
    }

    pub(crate) fn tof_max(&self) -> TimeOfFlight {
        self.tof_max
    }

    pub(crate) fn regions(&self) -> &[DetectorRegion] {
        &self.regions
    }

    /// Slot of the pixel-histogram bucket for `idx` on `detector`, or `None`
    /// when `idx` lies outside the detector's pixel range.
    pub(crate) fn pixel_slot(&self, detector: DetectorId, idx: PixelId) -> Option<usize> {
        let region = self.regions.get(detector)?;
        if idx < region.pixel_start || idx > region.pixel_end {
            return None;
        }
        Some(region.pixel_offset + (idx - region.pixel_start) as usize)
    }

    /// Slot of the TOF-histogram bucket for `bin` on `detector`, or `None`
    /// when `bin` exceeds `tof_max`.
    pub(crate) fn tof_slot(&self, detector: DetectorId, bin: TimeOfFlight) -> Option<usize> {
        let region = self.regions.get(detector)?;
        if bin > self.tof_max {
            return None;
        }
        Some(region.tof_offset + bin as usize)
    }
}

/// Whether the shared buffer matches the current configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocationStatus {
    Ok,
    #[default]
    ReallocationPending,
    Failed,
}

/// The shared flat counter array. Counters wrap on overflow.
#[derive(Debug)]
pub(crate) struct HistogramBuffer {
    layout: BufferLayout,
    counts: Vec<Counts>,
}

impl HistogramBuffer {
    pub(crate) fn unallocated() -> Self {
        Self {
            layout: BufferLayout::empty(),
            counts: Vec::new(),
        }
    }

    pub(crate) fn new(layout: BufferLayout) -> Self {
        let counts = vec![0; layout.total_size()];
        Self { layout, counts }
    }

    pub(crate) fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub(crate) fn counts(&self) -> &[Counts] {
        &self.counts
    }

    pub(crate) fn zero(&mut self) {
        self.counts.fill(0);
    }

    pub(crate) fn bump(&mut self, slot: usize) {
        if let Some(cell) = self.counts.get_mut(slot) {
            *cell = cell.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn detector(start: PixelId, end: PixelId) -> DetectorConfig {
        DetectorConfig::new(start, end)
    }

    #[test]
    fn layout_size_is_pixel_regions_plus_tof_regions() {
        let detectors = [detector(0, 99), detector(200, 249), detector(1000, 1000)];
        let layout = BufferLayout::allocate(&detectors, 50).unwrap();

        assert_eq!(layout.total_size(), 100 + 50 + 1 + 3 * 51);

        let regions = layout.regions();
        assert_eq!(regions[0].pixel_offset, 0);
        assert_eq!(regions[1].pixel_offset, 100);
        assert_eq!(regions[2].pixel_offset, 150);
        assert_eq!(regions[0].tof_offset, 151);
        assert_eq!(regions[1].tof_offset, 151 + 51);
        assert_eq!(regions[2].tof_offset, 151 + 102);
    }

    #[test]
    fn inverted_pixel_range_is_a_config_error() {
        let detectors = [detector(0, 99), detector(300, 200)];
        assert!(matches!(
            BufferLayout::allocate(&detectors, 50),
            Err(AllocationError::Config(ConfigError::InvalidPixelRange {
                detector: 1,
                start: 300,
                end: 200,
            }))
        ));
    }

    #[test]
    fn no_detectors_yields_empty_layout_error() {
        assert!(matches!(
            BufferLayout::allocate(&[], 50),
            Err(AllocationError::EmptyLayout)
        ));
    }

    #[test]
    fn failed_allocation_leaves_previous_buffer_untouched() {
        let layout = BufferLayout::allocate(&[detector(10, 19)], 5).unwrap();
        let mut buffer = HistogramBuffer::new(layout);
        buffer.bump(3);

        assert!(BufferLayout::allocate(&[detector(20, 10)], 5).is_err());

        assert_eq!(buffer.counts()[3], 1);
        assert_eq!(buffer.counts().len(), 10 + 6);
    }

    #[test]
    fn pixel_slot_rejects_out_of_range_ids() {
        let layout = BufferLayout::allocate(&[detector(100, 199)], 50).unwrap();

        assert_eq!(layout.pixel_slot(0, 100), Some(0));
        assert_eq!(layout.pixel_slot(0, 150), Some(50));
        assert_eq!(layout.pixel_slot(0, 199), Some(99));
        assert_eq!(layout.pixel_slot(0, 99), None);
        assert_eq!(layout.pixel_slot(0, 200), None);
        assert_eq!(layout.pixel_slot(1, 150), None);
    }

    #[test]
    fn tof_slot_rejects_bins_past_tof_max() {
        let layout = BufferLayout::allocate(&[detector(100, 199)], 50).unwrap();

        assert_eq!(layout.tof_slot(0, 0), Some(100));
        assert_eq!(layout.tof_slot(0, 50), Some(150));
        assert_eq!(layout.tof_slot(0, 51), None);
    }

    #[test]
    fn bump_wraps_instead_of_overflowing() {
        let layout = BufferLayout::allocate(&[detector(0, 0)], 0).unwrap();
        let mut buffer = HistogramBuffer::new(layout);

        buffer.counts[0] = Counts::MAX;
        buffer.bump(0);
        assert_eq!(buffer.counts()[0], 0);
    }

    #[test]
    fn bump_out_of_bounds_is_ignored() {
        let layout = BufferLayout::allocate(&[detector(0, 0)], 0).unwrap();
        let mut buffer = HistogramBuffer::new(layout);

        buffer.bump(100);
        assert!(buffer.counts().iter().all(|&c| c == 0));
    }
}
