use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::residues::SolventKind;

///
/// Everything we know about a topology file: dimensions, chemistry, box,
/// composition, and the derived classification strings.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologyRecord {
    pub path: PathBuf,
    pub warnings: Vec<String>,

    pub version: Option<String>,
    pub title: Option<String>,
    pub force_field_type: Option<String>,
    pub force_field_features: Vec<String>,

    pub natom: Option<usize>,
    pub nres: Option<usize>,
    pub nbond: Option<usize>,

    /// Sum over per-atom masses, in amu.
    pub total_mass: f64,
    /// Net partial charge in elementary units (raw sum already rescaled).
    pub total_charge: f64,
    pub is_neutral: bool,

    pub box_lengths: Option<[f64; 3]>,
    pub box_angles: Option<[f64; 3]>,
    pub box_volume: Option<f64>,
    /// g/cc, only when a box with positive volume is present.
    pub density: Option<f64>,

    pub solvent_kind: SolventKind,
    pub simulation_category: String,

    pub residue_composition: HashMap<String, usize>,
    pub num_solute_residues: Option<usize>,
    pub num_solvent_molecules: Option<usize>,

    pub hmr_active: Option<bool>,
    pub hmr_hydrogen_mass_range: Option<(f64, f64)>,
    pub hmr_summary: Option<String>,
}

impl TopologyRecord {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            warnings: Vec::new(),
            version: None,
            title: None,
            force_field_type: None,
            force_field_features: Vec::new(),
            natom: None,
            nres: None,
            nbond: None,
            total_mass: 0.0,
            total_charge: 0.0,
            is_neutral: false,
            box_lengths: None,
            box_angles: None,
            box_volume: None,
            density: None,
            solvent_kind: SolventKind::Vacuum,
            simulation_category: String::new(),
            residue_composition: HashMap::new(),
            num_solute_residues: None,
            num_solvent_molecules: None,
            hmr_active: None,
            hmr_hydrogen_mass_range: None,
            hmr_summary: None,
        }
    }

    pub fn has_box(&self) -> bool {
        self.box_lengths.is_some()
    }
}
