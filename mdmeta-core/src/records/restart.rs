use std::path::PathBuf;

use serde::Serialize;

use crate::geometry::PeriodicBox;
use crate::records::CoordFormat;

/// A single snapshot: the ending state of one stage and the starting state
/// of the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartRecord {
    pub path: PathBuf,
    pub warnings: Vec<String>,

    pub format: CoordFormat,
    pub title: Option<String>,
    pub program: Option<String>,
    pub program_version: Option<String>,
    pub conventions: Option<String>,

    pub natom: Option<usize>,
    /// Simulation clock at the snapshot, picoseconds.
    pub time_ps: Option<f64>,

    pub has_coordinates: bool,
    pub has_velocities: bool,
    pub has_forces: bool,

    pub periodic_box: Option<PeriodicBox>,
}

impl RestartRecord {
    pub fn new(path: PathBuf, format: CoordFormat) -> Self {
        Self {
            path,
            warnings: Vec::new(),
            format,
            title: None,
            program: None,
            program_version: None,
            conventions: None,
            natom: None,
            time_ps: None,
            has_coordinates: false,
            has_velocities: false,
            has_forces: false,
            periodic_box: None,
        }
    }

    pub fn has_box(&self) -> bool {
        self.periodic_box.is_some()
    }
}
