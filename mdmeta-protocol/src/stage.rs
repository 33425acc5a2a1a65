use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use mdmeta_core::records::{
    InputDeckRecord, LogRecord, RestartRecord, TopologyRecord, TrajectoryRecord,
};

/// The closed set of protocol stage roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageRole {
    Minimization,
    Heating,
    Equilibration,
    Production,
}

impl StageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageRole::Minimization => "minimization",
            StageRole::Heating => "heating",
            StageRole::Equilibration => "equilibration",
            StageRole::Production => "production",
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimization" => Ok(StageRole::Minimization),
            "heating" => Ok(StageRole::Heating),
            "equilibration" => Ok(StageRole::Equilibration),
            "production" => Ok(StageRole::Production),
            other => Err(format!("not a stage role: {other}")),
        }
    }
}

/// The five artifact kinds a stage can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Topology,
    Restart,
    InputDeck,
    Log,
    Trajectory,
}

impl FileKind {
    /// The short key used in manifests and validation notes.
    pub fn manifest_key(&self) -> &'static str {
        match self {
            FileKind::Topology => "prmtop",
            FileKind::Restart => "inpcrd",
            FileKind::InputDeck => "mdin",
            FileKind::Log => "mdout",
            FileKind::Trajectory => "mdcrd",
        }
    }

    /// Classify a file by its final extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "prmtop" | "parm7" | "top" => Some(FileKind::Topology),
            "mdin" | "in" => Some(FileKind::InputDeck),
            "mdout" | "out" => Some(FileKind::Log),
            "mdcrd" | "nc" | "crd" | "x" => Some(FileKind::Trajectory),
            "rst" | "rst7" | "ncrst" | "restrt" | "inpcrd" => Some(FileKind::Restart),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// High-level outcome of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub intent: String,
    pub result: String,
    pub evidence: String,
}

///
/// One node of a simulation protocol: a name, an optional role, at most one
/// record per artifact kind, and the notes the validator attaches.
///
/// The topology may be shared across stages (a global topology applied by
/// the assembler); it is read-only once parsed, so an `Arc` handle is all a
/// stage holds.
///
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub name: String,
    pub role: Option<StageRole>,

    pub topology: Option<Arc<TopologyRecord>>,
    pub restart: Option<RestartRecord>,
    pub input_deck: Option<InputDeckRecord>,
    pub log: Option<LogRecord>,
    pub trajectory: Option<TrajectoryRecord>,

    pub restart_path: Option<PathBuf>,

    pub expected_gap_ps: Option<f64>,
    pub gap_tolerance_ps: Option<f64>,
    /// Filled in by the validator only.
    pub observed_gap_ps: Option<f64>,

    pub validation: Vec<String>,
    pub continuity: Vec<String>,
    /// Free-text notes carried over from the manifest.
    pub notes: Vec<String>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Atom counts from every attached record that reports one, labelled by
    /// manifest key.
    pub fn atom_counts(&self) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        if let Some(n) = self.topology.as_ref().and_then(|t| t.natom) {
            out.push(("prmtop", n));
        }
        if let Some(n) = self.restart.as_ref().and_then(|r| r.natom) {
            out.push(("inpcrd", n));
        }
        if let Some(n) = self.log.as_ref().and_then(|l| l.natom) {
            out.push(("mdout", n));
        }
        if let Some(n) = self.trajectory.as_ref().and_then(|t| t.natom) {
            out.push(("mdcrd", n));
        }
        out
    }

    /// The integrator timestep, preferring the declared deck value over the
    /// log's echo of it.
    pub fn dt_ps(&self) -> Option<f64> {
        self.input_deck
            .as_ref()
            .and_then(InputDeckRecord::dt_ps)
            .or_else(|| self.log.as_ref().and_then(|l| l.dt))
    }

    /// Step count, deck first, log fallback.
    pub fn length_steps(&self) -> Option<i64> {
        self.input_deck
            .as_ref()
            .and_then(InputDeckRecord::steps)
            .or_else(|| self.log.as_ref().and_then(|l| l.nstlim))
    }

    /// `steps × dt`, picoseconds.
    pub fn planned_duration_ps(&self) -> Option<f64> {
        Some(self.length_steps()? as f64 * self.dt_ps()?)
    }

    pub fn summary(&self) -> StageSummary {
        let intent = self
            .role
            .map(|r| r.to_string())
            .or_else(|| self.input_deck.as_ref().map(|d| d.stage_role.clone()))
            .unwrap_or_else(|| "Unknown".to_string());
        let result = match &self.log {
            Some(log) if log.finished_properly => "Completed".to_string(),
            Some(_) => "Unclear".to_string(),
            None => "Unknown".to_string(),
        };
        StageSummary {
            intent,
            result,
            evidence: self.validation.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("minimization", StageRole::Minimization)]
    #[case("HEATING", StageRole::Heating)]
    #[case("Equilibration", StageRole::Equilibration)]
    #[case("production", StageRole::Production)]
    fn role_round_trip(#[case] text: &str, #[case] role: StageRole) {
        assert_eq!(text.parse::<StageRole>().unwrap(), role);
        assert_eq!(role.to_string(), role.as_str());
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("annealing".parse::<StageRole>().is_err());
    }

    #[rstest]
    #[case("sys.prmtop", Some(FileKind::Topology))]
    #[case("sys.parm7", Some(FileKind::Topology))]
    #[case("prod.mdin", Some(FileKind::InputDeck))]
    #[case("prod.in", Some(FileKind::InputDeck))]
    #[case("prod.out", Some(FileKind::Log))]
    #[case("prod.nc", Some(FileKind::Trajectory))]
    #[case("prod.x", Some(FileKind::Trajectory))]
    #[case("prod.rst7", Some(FileKind::Restart))]
    #[case("prod.ncrst", Some(FileKind::Restart))]
    #[case("notes.txt", None)]
    #[case("README", None)]
    fn extension_classification(#[case] name: &str, #[case] expected: Option<FileKind>) {
        assert_eq!(FileKind::from_path(Path::new(name)), expected);
    }
}
