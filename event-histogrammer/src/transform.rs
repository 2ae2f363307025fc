//! Pure conversions of a (pixel, time-of-flight) pair into a derived
//! time-of-flight value, used to histogram in d-space or energy-transfer
//! units instead of raw TOF.

use ned_common::{PixelId, TimeOfFlight};
use std::sync::Arc;

/// Mass of the neutron in kg.
const NEUTRON_MASS_KG: f64 = 1.674954e-27;

/// One electron-volt in joules.
const JOULES_PER_EV: f64 = 1.602176565e-19;

#[derive(Debug, Clone, Default)]
pub(crate) enum TofTransform {
    /// Pass the raw TOF through unchanged.
    #[default]
    Identity,
    /// Per-pixel multiplier lookup, for fixed-geometry instruments where a
    /// static table converts TOF to d-space.
    ArrayMultiply { table: Arc<Vec<f64>> },
    /// Energy transfer for indirect-geometry inelastic detectors. The final
    /// energy `Ef` (eV) and secondary flight path `L2` (m) are per-pixel
    /// arrays; `l1` is the primary flight path in metres and the TOF is
    /// taken in seconds.
    ///
    /// deltaE = (1/2)·Mn·(L1 / (TOF − L2·sqrt(Mn/(2·Ef))))² − Ef
    DeltaE {
        l1: f64,
        ef: Arc<Vec<f64>>,
        l2: Arc<Vec<f64>>,
    },
}

impl TofTransform {
    /// Derived TOF value for one event. Pixel IDs beyond the loaded arrays
    /// yield 0, matching the table-lookup contract.
    pub(crate) fn apply(&self, pixel: PixelId, tof: TimeOfFlight) -> f64 {
        match self {
            TofTransform::Identity => f64::from(tof),
            TofTransform::ArrayMultiply { table } => table
                .get(pixel as usize)
                .map(|multiplier| f64::from(tof) * multiplier)
                .unwrap_or(0.0),
            TofTransform::DeltaE { l1, ef, l2 } => {
                match (ef.get(pixel as usize), l2.get(pixel as usize)) {
                    (Some(&ef), Some(&l2)) => delta_e(*l1, ef, l2, f64::from(tof)),
                    _ => 0.0,
                }
            }
        }
    }

    pub(crate) fn is_identity(&self) -> bool {
        matches!(self, TofTransform::Identity)
    }
}

fn delta_e(l1: f64, ef_ev: f64, l2: f64, tof_secs: f64) -> f64 {
    let ef = ef_ev * JOULES_PER_EV;
    if ef <= 0.0 {
        return 0.0;
    }
    let flight_time = tof_secs - l2 * (NEUTRON_MASS_KG / (2.0 * ef)).sqrt();
    if flight_time <= 0.0 {
        return 0.0;
    }
    let ei = 0.5 * NEUTRON_MASS_KG * (l1 / flight_time).powi(2);
    (ei - ef) / JOULES_PER_EV
}

/// Per-detector transform settings: the kind of conversion plus the linear
/// rescale applied after it. A disabled transform, or an enabled one with no
/// table loaded, leaves the raw TOF untouched.
#[derive(Debug, Clone)]
pub(crate) struct TransformSettings {
    pub(crate) enabled: bool,
    pub(crate) scale: f64,
    pub(crate) offset: f64,
    pub(crate) transform: TofTransform,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 1.0,
            offset: 0.0,
            transform: TofTransform::Identity,
        }
    }
}

impl TransformSettings {
    pub(crate) fn effective_tof(&self, pixel: PixelId, tof: TimeOfFlight) -> f64 {
        if self.enabled && !self.transform.is_identity() {
            self.transform.apply(pixel, tof) * self.scale + self.offset
        } else {
            f64::from(tof)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn identity_passes_tof_through() {
        let settings = TransformSettings::default();
        assert_eq!(settings.effective_tof(5, 1234), 1234.0);
    }

    #[test]
    fn array_multiply_uses_pixel_lookup() {
        let transform = TofTransform::ArrayMultiply {
            table: Arc::new(vec![0.0, 0.5, 2.0]),
        };
        assert_approx_eq!(transform.apply(1, 100), 50.0);
        assert_approx_eq!(transform.apply(2, 100), 200.0);
    }

    #[test]
    fn array_multiply_out_of_range_pixel_yields_zero() {
        let transform = TofTransform::ArrayMultiply {
            table: Arc::new(vec![1.0]),
        };
        assert_eq!(transform.apply(7, 100), 0.0);
    }

    #[test]
    fn scale_and_offset_apply_after_the_lookup() {
        let settings = TransformSettings {
            enabled: true,
            scale: 2.0,
            offset: 3.0,
            transform: TofTransform::ArrayMultiply {
                table: Arc::new(vec![10.0]),
            },
        };
        // 5 * 10 * 2 + 3
        assert_approx_eq!(settings.effective_tof(0, 5), 103.0);
    }

    #[test]
    fn enabled_without_a_table_leaves_tof_unchanged() {
        let settings = TransformSettings {
            enabled: true,
            scale: 2.0,
            offset: 3.0,
            transform: TofTransform::Identity,
        };
        assert_eq!(settings.effective_tof(0, 5), 5.0);
    }

    #[test]
    fn delta_e_matches_closed_form() {
        let l1 = 2.0;
        let ef_ev = 5.0;
        let l2 = 0.3;
        let tof = 1.0;

        let transform = TofTransform::DeltaE {
            l1,
            ef: Arc::new(vec![ef_ev]),
            l2: Arc::new(vec![l2]),
        };

        let ef_joules = ef_ev * JOULES_PER_EV;
        let flight = tof - l2 * (NEUTRON_MASS_KG / (2.0 * ef_joules)).sqrt();
        let expected =
            (0.5 * NEUTRON_MASS_KG * (l1 / flight).powi(2) - ef_joules) / JOULES_PER_EV;

        assert_approx_eq!(transform.apply(0, 1), expected);
    }

    #[test]
    fn delta_e_out_of_range_pixel_yields_zero() {
        let transform = TofTransform::DeltaE {
            l1: 2.0,
            ef: Arc::new(vec![5.0]),
            l2: Arc::new(vec![0.3]),
        };
        assert_eq!(transform.apply(3, 1), 0.0);
    }

    #[test]
    fn delta_e_negative_flight_time_yields_zero() {
        // L2 term larger than the TOF itself.
        let transform = TofTransform::DeltaE {
            l1: 2.0,
            ef: Arc::new(vec![1e-30]),
            l2: Arc::new(vec![1e6]),
        };
        assert_eq!(transform.apply(0, 1), 0.0);
    }
}
