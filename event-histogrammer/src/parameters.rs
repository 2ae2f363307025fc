//! Command-line surface. Compound per-detector options are comma-joined
//! values parsed through `FromStr` wrappers.

use crate::{
    detector::{DetectorConfig, PixelXyRoi, TofRoi},
    error::ConfigError,
    table,
    transform::TofTransform,
};
use anyhow::{Error, anyhow};
use clap::Parser;
use ned_common::{DetectorId, MAX_CHANNELS, MAX_DETECTORS, PixelId, TimeOfFlight};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc};

/// `start,end` inclusive pixel ID range.
#[derive(Debug, Clone)]
pub(crate) struct PixelRangeWrapper {
    pub(crate) start: PixelId,
    pub(crate) end: PixelId,
}

impl FromStr for PixelRangeWrapper {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(',').collect::<Vec<_>>().as_slice() {
            [start, end] => Ok(PixelRangeWrapper {
                start: start.parse()?,
                end: end.parse()?,
            }),
            _ => Err(anyhow!(
                "Incorrect number of parameters in pixel range, expected pattern '*,*', got '{s}'"
            )),
        }
    }
}

/// `detector,start,size` TOF window on the pixel histogram.
#[derive(Debug, Clone)]
pub(crate) struct TofRoiArg {
    pub(crate) detector: DetectorId,
    pub(crate) roi: TofRoi,
}

impl FromStr for TofRoiArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(',').collect::<Vec<_>>().as_slice() {
            [detector, start, size] => Ok(TofRoiArg {
                detector: detector.parse()?,
                roi: TofRoi {
                    start: start.parse()?,
                    size: size.parse()?,
                },
            }),
            _ => Err(anyhow!(
                "Incorrect number of parameters in TOF ROI, expected pattern '*,*,*', got '{s}'"
            )),
        }
    }
}

/// `detector,start_x,size_x,start_y,size_y,row_width` pixel sub-region on
/// the TOF histogram.
#[derive(Debug, Clone)]
pub(crate) struct PixelXyRoiArg {
    pub(crate) detector: DetectorId,
    pub(crate) roi: PixelXyRoi,
}

impl FromStr for PixelXyRoiArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(',').collect::<Vec<_>>().as_slice() {
            [detector, start_x, size_x, start_y, size_y, row_width] => Ok(PixelXyRoiArg {
                detector: detector.parse()?,
                roi: PixelXyRoi {
                    start_x: start_x.parse()?,
                    size_x: size_x.parse()?,
                    start_y: start_y.parse()?,
                    size_y: size_y.parse()?,
                    row_width: row_width.parse()?,
                },
            }),
            _ => Err(anyhow!(
                "Incorrect number of parameters in pixel ROI, expected pattern '*,*,*,*,*,*', got '{s}'"
            )),
        }
    }
}

/// `detector,path` pixel remap table file.
#[derive(Debug, Clone)]
pub(crate) struct PixelMapArg {
    pub(crate) detector: DetectorId,
    pub(crate) path: PathBuf,
}

impl FromStr for PixelMapArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(',').collect::<Vec<_>>().as_slice() {
            [detector, path] => Ok(PixelMapArg {
                detector: detector.parse()?,
                path: PathBuf::from(path),
            }),
            _ => Err(anyhow!(
                "Incorrect number of parameters in pixel map, expected pattern '*,*', got '{s}'"
            )),
        }
    }
}

/// TOF transform selection:
/// `detector,multiply,table_path` or `detector,delta-e,l1,ef_path,l2_path`.
#[derive(Debug, Clone)]
pub(crate) struct TransformArg {
    pub(crate) detector: DetectorId,
    pub(crate) kind: TransformKind,
}

#[derive(Debug, Clone)]
pub(crate) enum TransformKind {
    Multiply { table: PathBuf },
    DeltaE { l1: f64, ef: PathBuf, l2: PathBuf },
}

impl FromStr for TransformArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(',').collect::<Vec<_>>().as_slice() {
            [detector, "multiply", table] => Ok(TransformArg {
                detector: detector.parse()?,
                kind: TransformKind::Multiply {
                    table: PathBuf::from(table),
                },
            }),
            [detector, "delta-e", l1, ef, l2] => Ok(TransformArg {
                detector: detector.parse()?,
                kind: TransformKind::DeltaE {
                    l1: l1.parse()?,
                    ef: PathBuf::from(ef),
                    l2: PathBuf::from(l2),
                },
            }),
            _ => Err(anyhow!(
                "Unrecognised transform, expected '*,multiply,*' or '*,delta-e,*,*,*', got '{s}'"
            )),
        }
    }
}

/// `detector,scale,offset` linear rescale applied after the transform.
#[derive(Debug, Clone)]
pub(crate) struct RescaleArg {
    pub(crate) detector: DetectorId,
    pub(crate) scale: f64,
    pub(crate) offset: f64,
}

impl FromStr for RescaleArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(',').collect::<Vec<_>>().as_slice() {
            [detector, scale, offset] => Ok(RescaleArg {
                detector: detector.parse()?,
                scale: scale.parse()?,
                offset: offset.parse()?,
            }),
            _ => Err(anyhow!(
                "Incorrect number of parameters in rescale, expected pattern '*,*,*', got '{s}'"
            )),
        }
    }
}

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub(crate) struct Cli {
    #[clap(long)]
    pub(crate) broker: String,

    #[clap(long)]
    pub(crate) username: Option<String>,

    #[clap(long)]
    pub(crate) password: Option<String>,

    #[clap(long = "group")]
    pub(crate) consumer_group: String,

    /// Event topics, one per channel in channel order. Channel 0 defines
    /// pulse boundaries.
    #[clap(long = "channel", required = true)]
    pub(crate) channel_topics: Vec<String>,

    /// Topic frame snapshots are published to.
    #[clap(long)]
    pub(crate) frame_topic: String,

    /// Upper bound of the TOF histogram axis, in TOF units.
    #[clap(long, default_value = "160000")]
    pub(crate) tof_max: TimeOfFlight,

    /// Inclusive pixel ID range of one detector, repeatable.
    #[clap(long = "detector", required = true)]
    pub(crate) detectors: Vec<PixelRangeWrapper>,

    #[clap(long = "tof-roi")]
    pub(crate) tof_rois: Vec<TofRoiArg>,

    #[clap(long = "pixel-roi")]
    pub(crate) pixel_xy_rois: Vec<PixelXyRoiArg>,

    #[clap(long = "pixel-map")]
    pub(crate) pixel_maps: Vec<PixelMapArg>,

    #[clap(long = "transform")]
    pub(crate) transforms: Vec<TransformArg>,

    #[clap(long = "transform-rescale")]
    pub(crate) rescales: Vec<RescaleArg>,

    /// Frame snapshot publication period in milliseconds.
    #[clap(long, default_value = "500")]
    pub(crate) frame_update_period_ms: u64,

    /// Minimum interval between derived-statistics publications.
    #[clap(long, default_value = "1000")]
    pub(crate) event_update_period_ms: u64,

    #[clap(long, default_value = "5000")]
    pub(crate) connect_timeout_ms: u64,

    #[clap(long, default_value = "127.0.0.1:9090")]
    pub(crate) observability_address: SocketAddr,
}

impl Cli {
    /// Assemble and validate the per-detector configuration, loading every
    /// referenced table file.
    pub(crate) fn build_detectors(&self) -> anyhow::Result<Vec<DetectorConfig>> {
        if self.detectors.is_empty() {
            return Err(ConfigError::NoDetectors.into());
        }
        if self.detectors.len() > MAX_DETECTORS {
            return Err(ConfigError::TooManyDetectors {
                count: self.detectors.len(),
                max: MAX_DETECTORS,
            }
            .into());
        }
        if self.channel_topics.is_empty() {
            return Err(ConfigError::NoChannels.into());
        }
        if self.channel_topics.len() > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels {
                count: self.channel_topics.len(),
                max: MAX_CHANNELS,
            }
            .into());
        }

        let mut detectors: Vec<DetectorConfig> = self
            .detectors
            .iter()
            .map(|range| DetectorConfig::new(range.start, range.end))
            .collect();
        for (detector, config) in detectors.iter().enumerate() {
            config.validate(detector)?;
        }

        let count = detectors.len();
        let lookup = move |detector: DetectorId| -> Result<(), ConfigError> {
            if detector < count {
                Ok(())
            } else {
                Err(ConfigError::UnknownDetector { detector, count })
            }
        };

        for arg in &self.pixel_maps {
            lookup(arg.detector)?;
            let map = table::load_pixel_table(&arg.path)?;
            detectors[arg.detector].set_pixel_map(arg.detector, map)?;
        }
        for arg in &self.tof_rois {
            lookup(arg.detector)?;
            detectors[arg.detector].set_tof_roi(arg.roi);
        }
        for arg in &self.pixel_xy_rois {
            lookup(arg.detector)?;
            detectors[arg.detector].set_pixel_xy_roi(arg.roi);
            detectors[arg.detector].validate(arg.detector)?;
        }
        for arg in &self.transforms {
            lookup(arg.detector)?;
            let transform = match &arg.kind {
                TransformKind::Multiply { table } => TofTransform::ArrayMultiply {
                    table: Arc::new(table::load_transform_table(table)?),
                },
                TransformKind::DeltaE { l1, ef, l2 } => TofTransform::DeltaE {
                    l1: *l1,
                    ef: Arc::new(table::load_transform_table(ef)?),
                    l2: Arc::new(table::load_transform_table(l2)?),
                },
            };
            detectors[arg.detector].transform.transform = transform;
            detectors[arg.detector].transform.enabled = true;
        }
        for arg in &self.rescales {
            lookup(arg.detector)?;
            detectors[arg.detector].transform.scale = arg.scale;
            detectors[arg.detector].transform.offset = arg.offset;
        }

        Ok(detectors)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cli(extra: &[&str]) -> Cli {
        let mut args = vec![
            "event-histogrammer",
            "--broker",
            "localhost:19092",
            "--group",
            "test",
            "--channel",
            "events-0",
            "--frame-topic",
            "frames",
            "--detector",
            "0,99",
        ];
        args.extend_from_slice(extra);
        Cli::parse_from(args)
    }

    #[test]
    fn pixel_range_wrapper_parses() {
        let range = PixelRangeWrapper::from_str("100,199").unwrap();
        assert_eq!(range.start, 100);
        assert_eq!(range.end, 199);

        assert!(PixelRangeWrapper::from_str("100").is_err());
        assert!(PixelRangeWrapper::from_str("a,b").is_err());
    }

    #[test]
    fn transform_wrapper_parses_both_kinds() {
        assert!(matches!(
            TransformArg::from_str("0,multiply,/tmp/dspace.tab").unwrap().kind,
            TransformKind::Multiply { .. }
        ));
        assert!(matches!(
            TransformArg::from_str("1,delta-e,2.5,/tmp/ef.tab,/tmp/l2.tab")
                .unwrap()
                .kind,
            TransformKind::DeltaE { l1, .. } if l1 == 2.5
        ));
        assert!(TransformArg::from_str("0,unknown,/tmp/x").is_err());
    }

    #[test]
    fn build_applies_rois_with_mutual_exclusion() {
        let cli = cli(&["--tof-roi", "0,100,50"]);
        let detectors = cli.build_detectors().unwrap();
        assert!(detectors[0].tof_roi().is_some());

        let cli = cli_with_both_rois();
        let detectors = cli.build_detectors().unwrap();
        // The pixel ROI is applied after the TOF ROI and displaces it.
        assert!(detectors[0].tof_roi().is_none());
        assert!(detectors[0].pixel_xy_roi().is_some());
    }

    fn cli_with_both_rois() -> Cli {
        cli(&["--tof-roi", "0,100,50", "--pixel-roi", "0,0,4,0,4,10"])
    }

    #[test]
    fn build_loads_pixel_map_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "100\n").unwrap();
        for pixel in (0..100).rev() {
            writeln!(file, "{pixel}").unwrap();
        }

        let path = file.path().to_str().unwrap().to_owned();
        let cli = cli(&["--pixel-map", &format!("0,{path}")]);
        let detectors = cli.build_detectors().unwrap();

        assert!(detectors[0].has_pixel_map());
        assert_eq!(detectors[0].remap(0), 99);
    }

    #[test]
    fn option_for_unconfigured_detector_is_rejected() {
        let cli = cli(&["--tof-roi", "3,100,50"]);
        assert!(cli.build_detectors().is_err());
    }

    #[test]
    fn too_many_detectors_are_rejected() {
        let cli = cli(&[
            "--detector", "100,199",
            "--detector", "200,299",
            "--detector", "300,399",
            "--detector", "400,499",
        ]);
        assert!(cli.build_detectors().is_err());
    }
}
