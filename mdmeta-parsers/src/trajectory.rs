//! Trajectory file parser and multi-file sequence analysis.
//!
//! ASCII trajectories carry almost nothing on their own (frame geometry
//! needs the topology), so only the title is extracted. NetCDF trajectories
//! yield the time axis, per-frame box volumes, content flags, and
//! replica-exchange markers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::Array2;

use mdmeta_core::geometry::{BoxShape, frame_volumes};
use mdmeta_core::records::{CoordFormat, RemdInfo, TrajectoryRecord};
use mdmeta_core::stats::StreamingStats;
use mdmeta_netcdf::{NcError, NetcdfBackend, NetcdfFile, VarData};

use crate::error::ParseError;
use crate::restart::detect_format;

/// Per-frame spacings that wobble more than this (ps) get a warning.
const DT_JITTER_TOLERANCE: f64 = 0.01;

pub fn parse(path: &Path) -> Result<TrajectoryRecord, ParseError> {
    parse_with_backend(path, mdmeta_netcdf::default_backend())
}

pub fn parse_with_backend(
    path: &Path,
    backend: &dyn NetcdfBackend,
) -> Result<TrajectoryRecord, ParseError> {
    match detect_format(path)? {
        CoordFormat::NetCdf => Ok(parse_netcdf(path, backend)),
        CoordFormat::Ascii => parse_ascii(path),
    }
}

fn parse_ascii(path: &Path) -> Result<TrajectoryRecord, ParseError> {
    let mut record = TrajectoryRecord::new(path.to_path_buf(), CoordFormat::Ascii);
    let file = File::open(path).map_err(|e| ParseError::read(path, e))?;
    let mut reader = BufReader::new(file);
    let mut title = String::new();
    reader.read_line(&mut title)?;
    record.title = Some(title.trim().to_string());
    record.warnings.push(
        "ASCII format: no detailed metadata (time, box, atom count) extractable without a topology."
            .to_string(),
    );
    Ok(record)
}

fn parse_netcdf(path: &Path, backend: &dyn NetcdfBackend) -> TrajectoryRecord {
    let mut record = TrajectoryRecord::new(path.to_path_buf(), CoordFormat::NetCdf);
    let mut ds = match backend.open(path) {
        Ok(ds) => ds,
        Err(NcError::BackendUnavailable(msg)) => {
            record
                .warnings
                .push(format!("NetCDF detected but no backend available: {}", msg));
            return record;
        }
        Err(e) => {
            record
                .warnings
                .push(format!("Error parsing NetCDF structure: {}", e));
            return record;
        }
    };

    project_netcdf(&mut record, ds.as_mut());
    record
}

fn project_netcdf(record: &mut TrajectoryRecord, ds: &mut dyn NetcdfFile) {
    record.title = ds.attribute("title");
    record.program = ds.attribute("program");
    record.conventions = ds.attribute("Conventions");
    record.natom = ds.dimension_len("atom");

    if ds.has_variable("time") {
        match ds.read_variable("time") {
            Ok(times) => apply_time_axis(record, &times.values),
            Err(e) => record.warnings.push(format!("Failed to read time: {}", e)),
        }
    } else if let Some(shape) = ds.variable_shape("coordinates") {
        // No time axis: the coordinate leading dimension still counts frames.
        record.n_frames = shape.first().copied().unwrap_or(0);
    }

    record.has_coordinates = ds.has_variable("coordinates");
    record.has_velocities = ds.has_variable("velocities");
    record.has_forces = ds.has_variable("forces");

    if ds.has_variable("cell_lengths") {
        record.has_box = true;
        let lengths = ds.read_variable("cell_lengths").ok();
        let angles = if ds.has_variable("cell_angles") {
            ds.read_variable("cell_angles").ok()
        } else {
            None
        };
        apply_box(record, lengths, angles);
    }

    // temp0 along the frame axis marks temperature replica exchange;
    // remd_dimtype marks the multi-dimensional variant.
    let mut remd = RemdInfo::default();
    if ds.has_variable("temp0") {
        remd.kinds.push("T-REMD (temp0)".to_string());
        if let Ok(temps) = ds.read_variable("temp0") {
            remd.temp_range = min_max_mean(&temps.values);
        }
    }
    if ds.has_variable("remd_dimtype") {
        remd.kinds.push("Multi-D REMD".to_string());
    }
    if !remd.kinds.is_empty() {
        record.remd = Some(remd);
    }
}

fn apply_time_axis(record: &mut TrajectoryRecord, times: &[f64]) {
    record.n_frames = times.len();
    if times.is_empty() {
        return;
    }
    record.time_start = Some(times[0]);
    record.time_end = Some(times[times.len() - 1]);

    if times.len() > 1 {
        let mut deltas = StreamingStats::new();
        for pair in times.windows(2) {
            deltas.push(pair[1] - pair[0]);
        }
        record.avg_dt_ps = Some(deltas.mean);
        if deltas.stdev() > DT_JITTER_TOLERANCE {
            record
                .warnings
                .push("Variable timestep detected within file.".to_string());
        }
    }
}

fn apply_box(record: &mut TrajectoryRecord, lengths: Option<VarData>, angles: Option<VarData>) {
    let Some(lengths) = lengths else {
        record
            .warnings
            .push("cell_lengths present but unreadable".to_string());
        return;
    };
    let Some(lengths) = as_frame_matrix(&lengths) else {
        record
            .warnings
            .push("cell_lengths has an unexpected shape".to_string());
        return;
    };

    let angles = angles.and_then(|a| as_frame_matrix(&a));
    record.box_shape = Some(match &angles {
        Some(a) => BoxShape::from_angles(&[a[[0, 0]], a[[0, 1]], a[[0, 2]]]),
        None => BoxShape::Orthogonal,
    });

    let vols = frame_volumes(lengths.view(), angles.as_ref().map(|a| a.view()));
    if let Some((min, max, mean)) = min_max_mean(vols.as_slice().unwrap_or(&[])) {
        record.volume_stats = Some((min, max, mean));
    }
}

/// Coerce `(n, 3)` or a lone `(3,)` row into a frame matrix.
fn as_frame_matrix(data: &VarData) -> Option<Array2<f64>> {
    match data.shape.len() {
        1 if data.values.len() == 3 => {
            Array2::from_shape_vec((1, 3), data.values.clone()).ok()
        }
        2 if data.shape[1] == 3 => {
            Array2::from_shape_vec((data.shape[0], 3), data.values.clone()).ok()
        }
        _ => None,
    }
}

fn min_max_mean(values: &[f64]) -> Option<(f64, f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some((min, max, mean))
}

/// One detected discontinuity between two trajectory files.
#[derive(Debug, Clone)]
pub struct SequenceGap {
    pub earlier: std::path::PathBuf,
    pub later: std::path::PathBuf,
    pub end_ps: f64,
    pub start_ps: f64,
    pub expected_start_ps: f64,
}

/// Continuity summary over a set of trajectory files.
#[derive(Debug, Clone, Default)]
pub struct SequenceSummary {
    pub n_files: usize,
    pub total_frames: usize,
    pub time_start: Option<f64>,
    pub time_end: Option<f64>,
    pub gaps: Vec<SequenceGap>,
    pub global_avg_volume: Option<f64>,
}

impl SequenceSummary {
    pub fn is_continuous(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn total_ns(&self) -> Option<f64> {
        Some((self.time_end? - self.time_start?) / 1000.0)
    }
}

///
/// Order trajectory records by start time and flag every junction where the
/// next file does not begin one timestep after the previous one ended
/// (tolerance: 10% of the timestep, at least 0.1 ps).
///
pub fn analyze_sequence(records: &[TrajectoryRecord]) -> SequenceSummary {
    let mut valid: Vec<&TrajectoryRecord> = records
        .iter()
        .filter(|r| r.format == CoordFormat::NetCdf && r.time_start.is_some())
        .collect();
    valid.sort_by(|a, b| {
        a.time_start
            .partial_cmp(&b.time_start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut summary = SequenceSummary {
        n_files: valid.len(),
        total_frames: valid.iter().map(|r| r.n_frames).sum(),
        time_start: valid.first().and_then(|r| r.time_start),
        time_end: valid.last().and_then(|r| r.time_end),
        ..Default::default()
    };

    for pair in valid.windows(2) {
        let (curr, next) = (pair[0], pair[1]);
        let (Some(end), Some(start)) = (curr.time_end, next.time_start) else {
            continue;
        };
        let dt_ref = curr.avg_dt_ps.or(next.avg_dt_ps).unwrap_or(1.0);
        let expected = end + dt_ref;
        let tolerance = (dt_ref * 0.1).max(0.1);
        if (start - expected).abs() > tolerance {
            summary.gaps.push(SequenceGap {
                earlier: curr.path.clone(),
                later: next.path.clone(),
                end_ps: end,
                start_ps: start,
                expected_start_ps: expected,
            });
        }
    }

    let avg_vols: Vec<f64> = valid
        .iter()
        .filter_map(|r| r.volume_stats.map(|(_, _, mean)| mean))
        .collect();
    if !avg_vols.is_empty() {
        summary.global_avg_volume = Some(avg_vols.iter().sum::<f64>() / avg_vols.len() as f64);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdmeta_netcdf::writer::{NcDim, NcVarSpec, NcWriter};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn netcdf_traj(
        dir: &TempDir,
        name: &str,
        times: &[f64],
        lengths_per_frame: Option<&[f64; 3]>,
    ) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut w = NcWriter::new();
        w.global_attr("title", "prod");
        w.global_attr("Conventions", "AMBER");
        let frame = w.dim("frame", NcDim::Record);
        let atom = w.dim("atom", NcDim::Fixed(2));
        let spatial = w.dim("spatial", NcDim::Fixed(3));
        w.set_numrecs(times.len() as u32);
        w.var(NcVarSpec::double("time", vec![frame]), times.to_vec());
        w.var(
            NcVarSpec::float("coordinates", vec![frame, atom, spatial]),
            vec![0.0; times.len() * 6],
        );
        if let Some(l) = lengths_per_frame {
            let cell = w.dim("cell_spatial", NcDim::Fixed(3));
            w.var(
                NcVarSpec::double("cell_lengths", vec![frame, cell]),
                times.iter().flat_map(|_| l.iter().copied()).collect(),
            );
            w.var(
                NcVarSpec::double("cell_angles", vec![frame, cell]),
                times.iter().flat_map(|_| [90.0, 90.0, 90.0]).collect(),
            );
        }
        w.write(&path).unwrap();
        path
    }

    #[test]
    fn ascii_trajectory_title_only() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "legacy trajectory\n 1.0 2.0 3.0\n").unwrap();
        let record = parse(file.path()).unwrap();
        assert_eq!(record.format, CoordFormat::Ascii);
        assert_eq!(record.title.as_deref(), Some("legacy trajectory"));
        assert_eq!(record.warnings.len(), 1);
    }

    #[test]
    fn netcdf_time_axis_and_box() {
        let dir = TempDir::new().unwrap();
        let path = netcdf_traj(
            &dir,
            "a.nc",
            &[10.0, 20.0, 30.0, 40.0],
            Some(&[30.0, 30.0, 30.0]),
        );
        let record = parse(&path).unwrap();

        assert_eq!(record.n_frames, 4);
        assert_eq!(record.natom, Some(2));
        assert_eq!(record.time_start, Some(10.0));
        assert_eq!(record.time_end, Some(40.0));
        assert_eq!(record.avg_dt_ps, Some(10.0));
        assert_eq!(record.box_shape, Some(BoxShape::Orthogonal));
        let (vmin, vmax, vmean) = record.volume_stats.unwrap();
        assert!((vmin - 27000.0).abs() < 1e-6);
        assert!((vmax - 27000.0).abs() < 1e-6);
        assert!((vmean - 27000.0).abs() < 1e-6);
        assert!(record.has_coordinates);
        assert!(record.warnings.is_empty());
    }

    #[test]
    fn jittery_time_axis_warns() {
        let dir = TempDir::new().unwrap();
        let path = netcdf_traj(&dir, "j.nc", &[0.0, 1.0, 2.0, 3.5, 4.5], None);
        let record = parse(&path).unwrap();

        let avg = record.avg_dt_ps.unwrap();
        assert!((avg - 1.125).abs() < 1e-9);
        assert!(
            record
                .warnings
                .iter()
                .any(|w| w.contains("Variable timestep"))
        );
    }

    #[test]
    fn steady_time_axis_does_not_warn() {
        let dir = TempDir::new().unwrap();
        let path = netcdf_traj(&dir, "s.nc", &[0.0, 0.5, 1.0, 1.5], None);
        let record = parse(&path).unwrap();
        assert_eq!(record.avg_dt_ps, Some(0.5));
        assert!(record.warnings.is_empty());
    }

    #[test]
    fn remd_markers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("remd.nc");
        let mut w = NcWriter::new();
        let frame = w.dim("frame", NcDim::Record);
        w.set_numrecs(3);
        w.var(NcVarSpec::double("time", vec![frame]), vec![1.0, 2.0, 3.0]);
        w.var(
            NcVarSpec::double("temp0", vec![frame]),
            vec![280.0, 300.0, 320.0],
        );
        w.write(&path).unwrap();

        let record = parse(&path).unwrap();
        let remd = record.remd.unwrap();
        assert_eq!(remd.kinds, vec!["T-REMD (temp0)".to_string()]);
        assert_eq!(remd.temp_range, Some((280.0, 320.0, 300.0)));
    }

    #[test]
    fn sequence_gap_detection() {
        let dir = TempDir::new().unwrap();
        let a = parse(&netcdf_traj(&dir, "a.nc", &[0.0, 1.0, 2.0], None)).unwrap();
        let b = parse(&netcdf_traj(&dir, "b.nc", &[3.0, 4.0, 5.0], None)).unwrap();
        let c = parse(&netcdf_traj(&dir, "c.nc", &[50.0, 51.0, 52.0], None)).unwrap();

        let summary = analyze_sequence(&[a, b, c]);
        assert_eq!(summary.n_files, 3);
        assert_eq!(summary.total_frames, 9);
        assert_eq!(summary.gaps.len(), 1);
        assert_eq!(summary.gaps[0].end_ps, 5.0);
        assert_eq!(summary.gaps[0].start_ps, 50.0);
        assert!(!summary.is_continuous());
        assert!((summary.total_ns().unwrap() - 0.052).abs() < 1e-12);
    }
}
