//! Binary-NetCDF access for restart and trajectory files.
//!
//! The parsers only need four capabilities: open a file, look up a global
//! attribute, measure a dimension, and materialize a (small) variable.
//! [`NetcdfBackend`] captures exactly that seam; the built-in backend decodes
//! the classic container directly, and a refusing stub stands in wherever a
//! backend is deliberately absent.

pub mod classic;
pub mod error;
pub mod writer;

use std::path::Path;
use std::sync::OnceLock;

pub use error::NcError;

/// A materialized variable: values flattened row-major plus the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct VarData {
    pub values: Vec<f64>,
    pub shape: Vec<usize>,
}

impl VarData {
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// The final row for 2-D data; the whole slice when 1-D.
    pub fn last_row(&self) -> Option<&[f64]> {
        if self.values.is_empty() {
            return None;
        }
        if self.shape.len() >= 2 {
            let row_len: usize = self.shape[1..].iter().product();
            if row_len == 0 || self.values.len() < row_len {
                return None;
            }
            let start = self.values.len() - row_len;
            Some(&self.values[start..])
        } else {
            Some(&self.values)
        }
    }

    pub fn n_rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }
}

/// One open NetCDF file.
pub trait NetcdfFile {
    fn attribute(&self, name: &str) -> Option<String>;
    fn dimension_len(&self, name: &str) -> Option<usize>;
    fn has_variable(&self, name: &str) -> bool;
    /// Shape without materializing the data.
    fn variable_shape(&self, name: &str) -> Option<Vec<usize>>;
    fn read_variable(&mut self, name: &str) -> Result<VarData, NcError>;
}

/// Something that can open NetCDF files.
pub trait NetcdfBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn open(&self, path: &Path) -> Result<Box<dyn NetcdfFile>, NcError>;
}

/// The built-in pure-Rust classic-container backend.
pub struct ClassicBackend;

impl NetcdfBackend for ClassicBackend {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn NetcdfFile>, NcError> {
        Ok(Box::new(classic::ClassicFile::open(path)?))
    }
}

/// A backend that refuses every open. Upstream turns the refusal into a
/// warning on the record, never a hard error.
pub struct UnavailableBackend;

impl NetcdfBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn open(&self, _path: &Path) -> Result<Box<dyn NetcdfFile>, NcError> {
        Err(NcError::BackendUnavailable(
            "no binary-NetCDF backend in this build".to_string(),
        ))
    }
}

static DEFAULT_BACKEND: OnceLock<&'static dyn NetcdfBackend> = OnceLock::new();

/// The process-wide backend, probed once on first use.
pub fn default_backend() -> &'static dyn NetcdfBackend {
    *DEFAULT_BACKEND.get_or_init(|| &ClassicBackend)
}

/// Open with the default backend.
pub fn open(path: &Path) -> Result<Box<dyn NetcdfFile>, NcError> {
    default_backend().open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{NcDim, NcVarSpec, NcWriter};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn restart_fixture(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("min.ncrst");
        let mut w = NcWriter::new();
        w.global_attr("title", "minimized system");
        w.global_attr("program", "pmemd");
        w.global_attr("programVersion", "22.0");
        let atom = w.dim("atom", NcDim::Fixed(6));
        let spatial = w.dim("spatial", NcDim::Fixed(3));
        let cell_spatial = w.dim("cell_spatial", NcDim::Fixed(3));
        w.var(NcVarSpec::double("time", vec![]), vec![1000.5]);
        w.var(
            NcVarSpec::double("coordinates", vec![atom, spatial]),
            (0..18).map(f64::from).collect(),
        );
        w.var(
            NcVarSpec::double("cell_lengths", vec![cell_spatial]),
            vec![61.0, 62.0, 63.0],
        );
        w.var(
            NcVarSpec::double("cell_angles", vec![cell_spatial]),
            vec![90.0, 90.0, 90.0],
        );
        w.write(&path).unwrap();
        path
    }

    #[test]
    fn round_trips_a_fixed_size_file() {
        let dir = TempDir::new().unwrap();
        let path = restart_fixture(&dir);

        let mut file = open(&path).unwrap();
        assert_eq!(file.attribute("title").as_deref(), Some("minimized system"));
        assert_eq!(file.attribute("program").as_deref(), Some("pmemd"));
        assert_eq!(file.dimension_len("atom"), Some(6));
        assert!(file.has_variable("coordinates"));
        assert!(!file.has_variable("velocities"));

        let time = file.read_variable("time").unwrap();
        assert_eq!(time.values, vec![1000.5]);
        assert_eq!(time.shape, Vec::<usize>::new());

        let lengths = file.read_variable("cell_lengths").unwrap();
        assert_eq!(lengths.last_row(), Some(&[61.0, 62.0, 63.0][..]));
    }

    #[test]
    fn round_trips_record_variables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("traj.nc");

        let mut w = NcWriter::new();
        let frame = w.dim("frame", NcDim::Record);
        let cell_spatial = w.dim("cell_spatial", NcDim::Fixed(3));
        w.set_numrecs(4);
        w.var(
            NcVarSpec::double("time", vec![frame]),
            vec![10.0, 20.0, 30.0, 40.0],
        );
        w.var(
            NcVarSpec::float("cell_lengths", vec![frame, cell_spatial]),
            vec![
                60.0, 60.0, 60.0, //
                60.5, 60.5, 60.5, //
                61.0, 61.0, 61.0, //
                61.5, 61.5, 61.5,
            ],
        );
        w.write(&path).unwrap();

        let mut file = open(&path).unwrap();
        assert_eq!(file.dimension_len("frame"), Some(4));

        let time = file.read_variable("time").unwrap();
        assert_eq!(time.shape, vec![4]);
        assert_eq!(time.values, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(time.last(), Some(40.0));

        let lengths = file.read_variable("cell_lengths").unwrap();
        assert_eq!(lengths.shape, vec![4, 3]);
        assert_eq!(lengths.last_row(), Some(&[61.5, 61.5, 61.5][..]));
    }

    #[rstest]
    #[case(b"GARBAGE!".to_vec())]
    #[case(b"CDF\x07rest".to_vec())]
    fn rejects_non_classic_bytes(#[case] bytes: Vec<u8>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.nc");
        std::fs::write(&path, bytes).unwrap();
        assert!(open(&path).is_err());
    }

    #[test]
    fn stub_backend_refuses() {
        let dir = TempDir::new().unwrap();
        let path = restart_fixture(&dir);
        let result = UnavailableBackend.open(&path);
        assert!(matches!(result, Err(NcError::BackendUnavailable(_))));
    }
}
