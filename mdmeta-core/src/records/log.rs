use std::path::PathBuf;

use serde::Serialize;

use crate::stats::StreamingStats;

///
/// Streaming aggregates over the frame records of one log.
///
/// All per-quantity statistics are Welford accumulators so the memory cost
/// is independent of how many frames the log holds.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThermoAggregates {
    pub count: u64,
    pub time_start: f64,
    pub time_end: f64,

    pub temperature: StreamingStats,
    pub pressure: StreamingStats,
    pub total_energy: StreamingStats,
    pub density: StreamingStats,
    pub volume: StreamingStats,

    pub first_density: Option<f64>,
    pub last_density: Option<f64>,
    pub first_volume: Option<f64>,
    pub last_volume: Option<f64>,

    pub sum_bond: f64,
    pub sum_angle: f64,
    pub sum_dihedral: f64,
    pub sum_vdw: f64,
    pub sum_elec: f64,
}

impl ThermoAggregates {
    /// `(time_end − time_start)` in ns.
    pub fn duration_ns(&self) -> f64 {
        (self.time_end - self.time_start) / 1000.0
    }

    /// Mean spacing between frames, ps. Zero until two frames are seen.
    pub fn avg_interval_ps(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.time_end - self.time_start) / (self.count - 1).max(1) as f64
    }

    /// Coverage including the final frame's own interval (fencepost
    /// correction): N frames spaced dt apart cover N·dt, not (N−1)·dt.
    pub fn true_coverage_ns(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let interval = self.avg_interval_ps();
        if interval == 0.0 {
            return 0.0;
        }
        (self.time_end - self.time_start + interval) / 1000.0
    }
}

/// Metadata and aggregates from one engine log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub path: PathBuf,
    pub warnings: Vec<String>,

    pub program: String,
    pub version: Option<String>,
    pub run_date: Option<String>,
    pub gpu_model: Option<String>,

    pub natom: Option<usize>,
    pub nres: Option<usize>,
    pub box_type: Option<String>,

    pub run_type: String,
    pub dt: Option<f64>,
    pub nstlim: Option<i64>,
    pub cutoff: Option<f64>,
    pub thermostat: Option<String>,
    pub target_temp: Option<f64>,
    pub barostat: Option<String>,
    pub shake_active: bool,
    pub coord_freq: Option<i64>,

    pub stats: ThermoAggregates,

    pub ns_per_day: Option<f64>,
    pub wall_seconds: Option<f64>,
    pub finished_properly: bool,
}

impl LogRecord {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            warnings: Vec::new(),
            program: "SANDER".to_string(),
            version: None,
            run_date: None,
            gpu_model: None,
            natom: None,
            nres: None,
            box_type: None,
            run_type: "MD".to_string(),
            dt: None,
            nstlim: None,
            cutoff: None,
            thermostat: None,
            target_temp: None,
            barostat: None,
            shake_active: false,
            coord_freq: None,
            stats: ThermoAggregates::default(),
            ns_per_day: None,
            wall_seconds: None,
            finished_properly: false,
        }
    }

    /// End of the sampled window, when any frame was seen.
    pub fn time_end(&self) -> Option<f64> {
        (self.stats.count > 0).then_some(self.stats.time_end)
    }
}
