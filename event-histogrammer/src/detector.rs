use crate::{error::ConfigError, transform::TransformSettings};
use ned_common::{DetectorId, PixelId, TimeOfFlight};
use std::sync::Arc;

/// TOF window filter on the pixel histogram: only events whose effective TOF
/// lies inside `[start, start + size]` are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TofRoi {
    pub(crate) start: TimeOfFlight,
    pub(crate) size: TimeOfFlight,
}

impl TofRoi {
    pub(crate) fn accepts(&self, effective_tof: f64) -> bool {
        effective_tof >= f64::from(self.start)
            && effective_tof <= f64::from(self.start) + f64::from(self.size)
    }
}

/// 2-D sub-region filter on the TOF histogram, interpreting remapped pixel
/// indices as rows of `row_width` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PixelXyRoi {
    pub(crate) start_x: u32,
    pub(crate) size_x: u32,
    pub(crate) start_y: u32,
    pub(crate) size_y: u32,
    pub(crate) row_width: u32,
}

impl PixelXyRoi {
    fn accepts(&self, relative_pixel: u32) -> bool {
        let x = relative_pixel % self.row_width;
        let y = relative_pixel / self.row_width;
        x >= self.start_x
            && x <= self.start_x + self.size_x
            && y >= self.start_y
            && y <= self.start_y + self.size_y
    }
}

/// Static per-detector configuration mirrored into the hot loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct DetectorConfig {
    pub(crate) pixel_start: PixelId,
    pub(crate) pixel_end: PixelId,
    tof_roi: Option<TofRoi>,
    pixel_xy_roi: Option<PixelXyRoi>,
    pixel_map: Option<Arc<Vec<PixelId>>>,
    pub(crate) transform: TransformSettings,
}

impl DetectorConfig {
    pub(crate) fn new(pixel_start: PixelId, pixel_end: PixelId) -> Self {
        Self {
            pixel_start,
            pixel_end,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self, detector: DetectorId) -> Result<(), ConfigError> {
        if self.pixel_start > self.pixel_end {
            return Err(ConfigError::InvalidPixelRange {
                detector,
                start: self.pixel_start,
                end: self.pixel_end,
            });
        }
        if let Some(roi) = &self.pixel_xy_roi {
            if roi.row_width == 0 {
                return Err(ConfigError::ZeroRowWidth { detector });
            }
        }
        Ok(())
    }

    pub(crate) fn pixel_count(&self) -> usize {
        (self.pixel_end - self.pixel_start + 1) as usize
    }

    pub(crate) fn contains(&self, pixel: PixelId) -> bool {
        pixel >= self.pixel_start && pixel <= self.pixel_end
    }

    pub(crate) fn tof_roi(&self) -> Option<TofRoi> {
        self.tof_roi
    }

    pub(crate) fn pixel_xy_roi(&self) -> Option<PixelXyRoi> {
        self.pixel_xy_roi
    }

    /// The two ROI filters are mutually exclusive: enabling one clears the
    /// other.
    pub(crate) fn set_tof_roi(&mut self, roi: TofRoi) {
        self.tof_roi = Some(roi);
        self.pixel_xy_roi = None;
    }

    pub(crate) fn set_pixel_xy_roi(&mut self, roi: PixelXyRoi) {
        self.pixel_xy_roi = Some(roi);
        self.tof_roi = None;
    }

    pub(crate) fn has_pixel_map(&self) -> bool {
        self.pixel_map.is_some()
    }

    /// Install a remap table of one entry per pixel in range. Any violation
    /// clears the table entirely; nothing partial is kept.
    pub(crate) fn set_pixel_map(
        &mut self,
        detector: DetectorId,
        table: Vec<PixelId>,
    ) -> Result<(), ConfigError> {
        self.pixel_map = None;

        if table.len() != self.pixel_count() {
            return Err(ConfigError::PixelMapLength {
                detector,
                len: table.len(),
                expected: self.pixel_count(),
            });
        }
        if let Some(&value) = table.iter().find(|value| !self.contains(**value)) {
            return Err(ConfigError::PixelMapOutOfRange {
                detector,
                value,
                start: self.pixel_start,
                end: self.pixel_end,
            });
        }

        self.pixel_map = Some(Arc::new(table));
        Ok(())
    }

    /// Histogram index for a raw pixel ID: the remap table entry when one is
    /// loaded, the raw ID otherwise.
    pub(crate) fn remap(&self, pixel: PixelId) -> PixelId {
        match &self.pixel_map {
            Some(map) => map
                .get((pixel - self.pixel_start) as usize)
                .copied()
                .unwrap_or(pixel),
            None => pixel,
        }
    }

    /// Whether the TOF histogram accepts this (already remapped) index.
    /// XY filtering only means anything when a pixel map is active; with no
    /// map every index passes.
    pub(crate) fn xy_accepts(&self, idx: PixelId) -> bool {
        match (&self.pixel_xy_roi, self.has_pixel_map()) {
            (Some(roi), true) => roi.accepts(idx - self.pixel_start),
            _ => true,
        }
    }
}
