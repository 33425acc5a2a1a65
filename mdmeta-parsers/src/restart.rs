//! Restart/coordinate file parser.
//!
//! Detection is a four-byte sniff: `CDF` means binary NetCDF, anything else
//! is the Fortran-formatted ASCII layout (title line, `NATOM [TIME]`, then
//! 6F12.7 coordinate lines with optional velocity block and box line).

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use mdmeta_core::geometry::PeriodicBox;
use mdmeta_core::records::{CoordFormat, RestartRecord};
use mdmeta_netcdf::{NcError, NetcdfBackend, NetcdfFile};

use crate::error::ParseError;

const COORDS_PER_LINE: usize = 6;

/// Sniff the container format from the leading magic bytes. Zero-byte and
/// short files fall through to ASCII.
pub fn detect_format(path: &Path) -> Result<CoordFormat, ParseError> {
    let mut file = File::open(path).map_err(|e| ParseError::read(path, e))?;
    let mut magic = [0u8; 4];
    let n = file.read(&mut magic)?;
    if n >= 3 && &magic[..3] == b"CDF" {
        Ok(CoordFormat::NetCdf)
    } else {
        Ok(CoordFormat::Ascii)
    }
}

/// Parse a restart file with the default NetCDF backend.
pub fn parse(path: &Path) -> Result<RestartRecord, ParseError> {
    parse_with_backend(path, mdmeta_netcdf::default_backend())
}

pub fn parse_with_backend(
    path: &Path,
    backend: &dyn NetcdfBackend,
) -> Result<RestartRecord, ParseError> {
    match detect_format(path)? {
        CoordFormat::NetCdf => Ok(parse_netcdf(path, backend)),
        CoordFormat::Ascii => parse_ascii(path),
    }
}

fn parse_ascii(path: &Path) -> Result<RestartRecord, ParseError> {
    let mut record = RestartRecord::new(path.to_path_buf(), CoordFormat::Ascii);
    let file = File::open(path).map_err(|e| ParseError::read(path, e))?;
    let mut reader = BufReader::new(file);

    // Title line may contain arbitrary bytes if the file is mislabeled.
    let mut raw = Vec::new();
    reader.read_until(b'\n', &mut raw)?;
    trim_line_ending(&mut raw);
    match std::str::from_utf8(&raw) {
        Ok(s) => record.title = Some(s.trim().to_string()),
        Err(_) => {
            record.title = Some("Binary/Corrupted Header".to_string());
            record
                .warnings
                .push("Could not decode title line.".to_string());
        }
    }

    raw.clear();
    let n = reader.read_until(b'\n', &mut raw)?;
    if n == 0 {
        record
            .warnings
            .push("File is empty or truncated after title.".to_string());
        return Ok(record);
    }
    let line2 = String::from_utf8_lossy(&raw);
    let mut parts = line2.split_whitespace();
    let Some(natom) = parts.next().and_then(|t| t.parse::<usize>().ok()) else {
        record.warnings.push(format!(
            "Could not parse NATOM/TIME from line 2: '{}'",
            line2.trim()
        ));
        return Ok(record);
    };
    record.natom = Some(natom);
    if let Some(t) = parts.next() {
        if let Ok(time) = t.replace(['D', 'd'], "e").parse::<f64>() {
            record.time_ps = Some(time);
        }
    }

    // Count body lines and remember the last non-blank one; the body never
    // needs to be held in memory.
    let mut body_lines = 0usize;
    let mut last_nonblank = String::new();
    for line in reader.lines() {
        let line = line.unwrap_or_default();
        body_lines += 1;
        if !line.trim().is_empty() {
            last_nonblank = line;
        }
    }

    let coord_lines = (3 * natom).div_ceil(COORDS_PER_LINE);
    record.has_coordinates = true;

    let trailing = if body_lines >= 2 * coord_lines {
        record.has_velocities = true;
        body_lines - 2 * coord_lines
    } else if body_lines >= coord_lines {
        body_lines - coord_lines
    } else {
        record.warnings.push(format!(
            "File too short. Expected at least {} lines for {} atoms, found {}.",
            coord_lines, natom, body_lines
        ));
        return Ok(record);
    };

    if trailing >= 1 {
        if trailing > 1 {
            record.warnings.push(format!(
                "Unexpected trailing lines ({}). Assuming box exists at end.",
                trailing
            ));
        }
        match parse_box_line(&last_nonblank) {
            Some(b) => record.periodic_box = Some(b),
            None => record
                .warnings
                .push(format!("Failed to parse box line: '{}'", last_nonblank.trim())),
        }
    }

    Ok(record)
}

/// Final line of the file: `a b c [alpha beta gamma]`. Three values mean an
/// orthogonal box with implied 90-degree angles.
fn parse_box_line(line: &str) -> Option<PeriodicBox> {
    let vals: Vec<f64> = line
        .split_whitespace()
        .map_while(|t| t.parse::<f64>().ok())
        .collect();
    if vals.len() < 3 {
        return None;
    }
    let lengths = [vals[0], vals[1], vals[2]];
    let angles = if vals.len() >= 6 {
        [vals[3], vals[4], vals[5]]
    } else {
        [90.0, 90.0, 90.0]
    };
    Some(PeriodicBox::new(lengths, angles))
}

fn parse_netcdf(path: &Path, backend: &dyn NetcdfBackend) -> RestartRecord {
    let mut record = RestartRecord::new(path.to_path_buf(), CoordFormat::NetCdf);
    let mut ds = match backend.open(path) {
        Ok(ds) => ds,
        Err(NcError::BackendUnavailable(msg)) => {
            record.warnings.push(format!(
                "NetCDF detected but no backend available: {}",
                msg
            ));
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

fn project_netcdf(record: &mut RestartRecord, ds: &mut dyn NetcdfFile) {
    record.title = ds.attribute("title");
    record.program = ds.attribute("program");
    record.program_version = ds.attribute("programVersion");
    record.conventions = ds.attribute("Conventions");
    record.natom = ds.dimension_len("atom");

    if ds.has_variable("time") {
        match ds.read_variable("time") {
            Ok(var) => record.time_ps = var.last(),
            Err(e) => record.warnings.push(format!("Failed to read time: {}", e)),
        }
    }

    record.has_coordinates = ds.has_variable("coordinates");
    record.has_velocities = ds.has_variable("velocities");
    record.has_forces = ds.has_variable("forces");

    if ds.has_variable("cell_lengths") {
        let lengths = ds
            .read_variable("cell_lengths")
            .ok()
            .and_then(|v| v.last_row().map(<[f64]>::to_vec));
        let angles = if ds.has_variable("cell_angles") {
            ds.read_variable("cell_angles")
                .ok()
                .and_then(|v| v.last_row().map(<[f64]>::to_vec))
        } else {
            None
        };
        match lengths {
            Some(l) if l.len() >= 3 => {
                let a = angles
                    .filter(|a| a.len() >= 3)
                    .map_or([90.0, 90.0, 90.0], |a| [a[0], a[1], a[2]]);
                record.periodic_box = Some(PeriodicBox::new([l[0], l[1], l[2]], a));
            }
            _ => record
                .warnings
                .push("cell_lengths present but unreadable".to_string()),
        }
    }
}

fn trim_line_ending(raw: &mut Vec<u8>) {
    while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
        raw.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdmeta_netcdf::UnavailableBackend;
    use mdmeta_netcdf::writer::{NcDim, NcVarSpec, NcWriter};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const COORD_LINE: &str =
        "   1.0000000   2.0000000   3.0000000   4.0000000   5.0000000   6.0000000\n";
    const VEL_LINE: &str =
        "   0.0010000   0.0020000   0.0030000   0.0040000   0.0050000   0.0060000\n";
    const BOX_LINE: &str =
        "  40.0000000  40.0000000  40.0000000  90.0000000  90.0000000  90.0000000\n";

    fn ascii_restart(natom: usize, body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "test restart\n{:6}   100.5000000\n{}", natom, body).unwrap();
        file
    }

    /// Three atoms fill one and a half coordinate lines.
    fn three_atom_coords() -> String {
        format!("{}{}", COORD_LINE, "   7.0000000   8.0000000   9.0000000\n")
    }

    #[test]
    fn ascii_coords_only() {
        let file = ascii_restart(3, &three_atom_coords());
        let record = parse(file.path()).unwrap();
        assert_eq!(record.format, CoordFormat::Ascii);
        assert_eq!(record.title.as_deref(), Some("test restart"));
        assert_eq!(record.natom, Some(3));
        assert_eq!(record.time_ps, Some(100.5));
        assert!(record.has_coordinates);
        assert!(!record.has_velocities);
        assert!(record.periodic_box.is_none());
    }

    #[test]
    fn ascii_coords_and_box() {
        let body = format!("{}{}", three_atom_coords(), BOX_LINE);
        let file = ascii_restart(3, &body);
        let record = parse(file.path()).unwrap();
        assert!(!record.has_velocities);
        let b = record.periodic_box.unwrap();
        assert_eq!(b.lengths, [40.0, 40.0, 40.0]);
        assert!((b.volume - 64000.0).abs() < 1e-6);
    }

    #[test]
    fn ascii_coords_velocities_box() {
        let body = format!(
            "{}{}  40.0000000  40.0000000  40.0000000\n",
            COORD_LINE, VEL_LINE
        );
        // Two atoms: one coordinate line, one velocity line, one box line.
        let file = ascii_restart(2, &body);
        let record = parse(file.path()).unwrap();
        assert!(record.has_velocities);
        let b = record.periodic_box.unwrap();
        // Three-value box line defaults the angles to 90.
        assert_eq!(b.angles, [90.0, 90.0, 90.0]);
    }

    #[test]
    fn ascii_trailing_noise_still_reads_box() {
        // Six atoms: three coordinate lines, a box line, then a stray blank
        // line. The final non-blank line is still taken as the box.
        let coords = COORD_LINE.repeat(3);
        let body = format!("{}{}\n", coords, BOX_LINE);
        let file = ascii_restart(6, &body);
        let record = parse(file.path()).unwrap();
        assert!(record.periodic_box.is_some());
        assert!(record.warnings.iter().any(|w| w.contains("trailing lines")));
    }

    #[test]
    fn ascii_d_exponent_time() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "t\n     1   1.0050000D+03\n   1.0   2.0   3.0\n").unwrap();
        let record = parse(file.path()).unwrap();
        assert_eq!(record.time_ps, Some(1005.0));
    }

    #[test]
    fn zero_byte_file_is_ascii_with_warning() {
        let file = NamedTempFile::new().unwrap();
        let record = parse(file.path()).unwrap();
        assert_eq!(record.format, CoordFormat::Ascii);
        assert_eq!(record.warnings.len(), 1);
        assert!(record.warnings[0].contains("empty or truncated"));
    }

    #[test]
    fn truncated_body_warns() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "t\n   100\n   1.0   2.0\n").unwrap();
        let record = parse(file.path()).unwrap();
        assert!(record.warnings.iter().any(|w| w.contains("File too short")));
    }

    fn netcdf_restart(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("eq.ncrst");
        let mut w = NcWriter::new();
        w.global_attr("title", "equilibrated");
        w.global_attr("program", "pmemd");
        w.global_attr("programVersion", "22.0");
        w.global_attr("Conventions", "AMBERRESTART");
        let atom = w.dim("atom", NcDim::Fixed(4));
        let spatial = w.dim("spatial", NcDim::Fixed(3));
        let cell = w.dim("cell_spatial", NcDim::Fixed(3));
        w.var(NcVarSpec::double("time", vec![]), vec![1000.5]);
        w.var(
            NcVarSpec::double("coordinates", vec![atom, spatial]),
            (0..12).map(f64::from).collect(),
        );
        w.var(
            NcVarSpec::double("velocities", vec![atom, spatial]),
            (0..12).map(f64::from).collect(),
        );
        w.var(
            NcVarSpec::double("cell_lengths", vec![cell]),
            vec![30.0, 30.0, 30.0],
        );
        w.var(
            NcVarSpec::double("cell_angles", vec![cell]),
            vec![90.0, 90.0, 90.0],
        );
        w.write(&path).unwrap();
        path
    }

    #[test]
    fn netcdf_restart_fields() {
        let dir = TempDir::new().unwrap();
        let path = netcdf_restart(&dir);
        let record = parse(&path).unwrap();

        assert_eq!(record.format, CoordFormat::NetCdf);
        assert_eq!(record.title.as_deref(), Some("equilibrated"));
        assert_eq!(record.program.as_deref(), Some("pmemd"));
        assert_eq!(record.conventions.as_deref(), Some("AMBERRESTART"));
        assert_eq!(record.natom, Some(4));
        assert_eq!(record.time_ps, Some(1000.5));
        assert!(record.has_coordinates);
        assert!(record.has_velocities);
        assert!(!record.has_forces);
        let b = record.periodic_box.unwrap();
        assert!((b.volume - 27000.0).abs() < 1e-6);
        assert!(record.warnings.is_empty());
    }

    #[test]
    fn missing_backend_keeps_format_and_warns() {
        let dir = TempDir::new().unwrap();
        let path = netcdf_restart(&dir);
        let record = parse_with_backend(&path, &UnavailableBackend).unwrap();
        assert_eq!(record.format, CoordFormat::NetCdf);
        assert_eq!(record.natom, None);
        assert_eq!(record.warnings.len(), 1);
        assert!(record.warnings[0].contains("no backend"));
    }
}
