use std::path::PathBuf;

use serde::Serialize;

use crate::geometry::BoxShape;
use crate::records::CoordFormat;

/// Replica-exchange markers found in a trajectory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemdInfo {
    pub kinds: Vec<String>,
    /// (min, max, mean) over the per-frame thermostat temperatures.
    pub temp_range: Option<(f64, f64, f64)>,
}

/// Metadata from one trajectory file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryRecord {
    pub path: PathBuf,
    pub warnings: Vec<String>,

    pub format: CoordFormat,
    pub title: Option<String>,
    pub program: Option<String>,
    pub conventions: Option<String>,

    pub natom: Option<usize>,
    pub n_frames: usize,

    pub time_start: Option<f64>,
    pub time_end: Option<f64>,
    /// Mean of the per-frame time differences, ps.
    pub avg_dt_ps: Option<f64>,

    pub has_box: bool,
    pub box_shape: Option<BoxShape>,
    /// (min, max, mean) volume over all frames, Å³.
    pub volume_stats: Option<(f64, f64, f64)>,

    pub has_coordinates: bool,
    pub has_velocities: bool,
    pub has_forces: bool,

    pub remd: Option<RemdInfo>,
}

impl TrajectoryRecord {
    pub fn new(path: PathBuf, format: CoordFormat) -> Self {
        Self {
            path,
            warnings: Vec::new(),
            format,
            title: None,
            program: None,
            conventions: None,
            natom: None,
            n_frames: 0,
            time_start: None,
            time_end: None,
            avg_dt_ps: None,
            has_box: false,
            box_shape: None,
            volume_stats: None,
            has_coordinates: false,
            has_velocities: false,
            has_forces: false,
            remd: None,
        }
    }

    /// `time_end − time_start`, ps.
    pub fn duration_ps(&self) -> Option<f64> {
        Some(self.time_end? - self.time_start?)
    }
}
