//! Normalized manifest handling.
//!
//! A manifest is an ordered list of stage entries (or a name-keyed mapping
//! that the loader has already flattened into `(name, entry)` pairs in
//! insertion order). File paths resolve against a base directory; every
//! missing reference across the whole manifest is collected into a single
//! error so the caller sees the complete damage at once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MissingFile, ProtocolError};
use crate::stage::{FileKind, StageRole};

/// `notes: "one"` or `notes: ["several", "lines"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Notes {
    One(String),
    Many(Vec<String>),
}

impl Notes {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Notes::One(s) => vec![s],
            Notes::Many(v) => v,
        }
    }
}

/// `gaps: 2.5` or `gaps: {expected: 2.5, tolerance: 0.1, notes: ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GapSpec {
    Expected(f64),
    Detailed {
        #[serde(default)]
        expected: Option<f64>,
        #[serde(default)]
        tolerance: Option<f64>,
        #[serde(default)]
        notes: Option<Notes>,
    },
}

/// The five per-kind path slots, usable nested under `files` or flattened
/// at the entry's top level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSet {
    #[serde(default)]
    pub prmtop: Option<PathBuf>,
    #[serde(default)]
    pub inpcrd: Option<PathBuf>,
    #[serde(default)]
    pub mdin: Option<PathBuf>,
    #[serde(default)]
    pub mdout: Option<PathBuf>,
    #[serde(default)]
    pub mdcrd: Option<PathBuf>,
}

impl FileSet {
    pub fn get(&self, kind: FileKind) -> Option<&PathBuf> {
        match kind {
            FileKind::Topology => self.prmtop.as_ref(),
            FileKind::Restart => self.inpcrd.as_ref(),
            FileKind::InputDeck => self.mdin.as_ref(),
            FileKind::Log => self.mdout.as_ref(),
            FileKind::Trajectory => self.mdcrd.as_ref(),
        }
    }

    fn merged_with(&self, fallback: Option<&FileSet>) -> FileSet {
        let pick = |a: &Option<PathBuf>, b: Option<&PathBuf>| a.clone().or_else(|| b.cloned());
        let f = |kind| fallback.and_then(|f| f.get(kind));
        FileSet {
            prmtop: pick(&self.prmtop, f(FileKind::Topology)),
            inpcrd: pick(&self.inpcrd, f(FileKind::Restart)),
            mdin: pick(&self.mdin, f(FileKind::InputDeck)),
            mdout: pick(&self.mdout, f(FileKind::Log)),
            mdcrd: pick(&self.mdcrd, f(FileKind::Trajectory)),
        }
    }
}

/// One stage entry as loaded from a manifest document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stage_role: Option<StageRole>,
    #[serde(flatten)]
    pub paths: FileSet,
    #[serde(default)]
    pub files: Option<FileSet>,
    #[serde(default)]
    pub gaps: Option<GapSpec>,
    #[serde(default)]
    pub notes: Option<Notes>,
}

impl ManifestEntry {
    /// Top-level paths win over the nested `files` block.
    pub fn file_set(&self) -> FileSet {
        self.paths.merged_with(self.files.as_ref())
    }
}

/// A validated, ordered manifest: every entry named, names unique, gap
/// tolerances non-negative.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Result<Self, ProtocolError> {
        let manifest = Self { entries };
        manifest.check()?;
        Ok(manifest)
    }

    /// Build from `(key, entry)` pairs of a name-keyed mapping, keeping
    /// insertion order. The key becomes the name unless the entry carries
    /// its own.
    pub fn from_named(pairs: Vec<(String, ManifestEntry)>) -> Result<Self, ProtocolError> {
        let entries = pairs
            .into_iter()
            .map(|(key, mut entry)| {
                entry.name.get_or_insert(key);
                entry
            })
            .collect();
        Self::from_entries(entries)
    }

    fn check(&self) -> Result<(), ProtocolError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            let name = entry.name.as_deref().unwrap_or("");
            if name.is_empty() {
                return Err(ProtocolError::InvalidManifest(
                    "every stage entry needs a non-empty name".to_string(),
                ));
            }
            if !seen.insert(name.to_string()) {
                return Err(ProtocolError::InvalidManifest(format!(
                    "duplicate stage name '{name}'"
                )));
            }
            if let Some(GapSpec::Detailed {
                tolerance: Some(tol),
                ..
            }) = &entry.gaps
            {
                if *tol < 0.0 {
                    return Err(ProtocolError::InvalidManifest(format!(
                        "stage '{name}': gap tolerance must be non-negative, got {tol}"
                    )));
                }
            }
        }
        Ok(())
    }

    ///
    /// Resolve every referenced path against `base_dir` and verify it
    /// exists. All missing references are reported in one error.
    ///
    pub fn resolve(&self, base_dir: &Path) -> Result<Vec<ResolvedEntry>, ProtocolError> {
        let mut resolved = Vec::with_capacity(self.entries.len());
        let mut missing = Vec::new();

        for entry in &self.entries {
            let name = entry.name.clone().unwrap_or_default();
            let files = entry.file_set();
            let mut paths = Vec::new();
            for kind in [
                FileKind::Topology,
                FileKind::Restart,
                FileKind::InputDeck,
                FileKind::Log,
                FileKind::Trajectory,
            ] {
                if let Some(raw) = files.get(kind) {
                    let path = if raw.is_absolute() {
                        raw.clone()
                    } else {
                        base_dir.join(raw)
                    };
                    if path.is_file() {
                        paths.push((kind, path));
                    } else {
                        missing.push(MissingFile {
                            stage: name.clone(),
                            kind,
                            path,
                        });
                    }
                }
            }
            resolved.push(ResolvedEntry {
                entry: entry.clone(),
                name,
                paths,
            });
        }

        if !missing.is_empty() {
            return Err(ProtocolError::MissingFiles(missing));
        }
        Ok(resolved)
    }
}

/// A manifest entry with its paths resolved and confirmed present.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub entry: ManifestEntry,
    pub name: String,
    pub paths: Vec<(FileKind, PathBuf)>,
}

impl ResolvedEntry {
    /// `(expected_gap, tolerance, extra notes)` from the gap spec.
    pub fn gap_fields(&self) -> (Option<f64>, Option<f64>, Vec<String>) {
        match &self.entry.gaps {
            None => (None, None, Vec::new()),
            Some(GapSpec::Expected(e)) => (Some(*e), None, Vec::new()),
            Some(GapSpec::Detailed {
                expected,
                tolerance,
                notes,
            }) => (
                *expected,
                *tolerance,
                notes.clone().map(Notes::into_vec).unwrap_or_default(),
            ),
        }
    }
}
