use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::value::ParamValue;

/// One `&wt` namelist entry: a quantity varied on a step schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightScheduleEntry {
    /// Upper-cased TYPE keyword (TEMP0, REST, CUT, END, ...).
    pub quantity: String,
    pub istep1: Option<ParamValue>,
    pub istep2: Option<ParamValue>,
    pub value1: Option<ParamValue>,
    pub value2: Option<ParamValue>,
    pub increment: Option<ParamValue>,
    pub multiplier: Option<ParamValue>,
}

impl WeightScheduleEntry {
    /// `TYPE='END'` closes the schedule block.
    pub fn is_terminal(&self) -> bool {
        self.quantity.eq_ignore_ascii_case("END")
    }
}

/// A namelist other than `&cntrl`, preserved as parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Namelist {
    pub name: String,
    pub parameters: HashMap<String, ParamValue>,
}

/// Feature flags derived from the control deck.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeckFeatures {
    /// GB model description when igb != 0.
    pub implicit_solvent: Option<String>,
    pub restraints_active: bool,
    pub nmr_options: bool,
    pub qmmm_active: bool,
    pub has_temp_ramp: bool,
    pub has_restraint_schedule: bool,
    pub has_cutoff_schedule: bool,
    pub uses_free_energy: bool,
    pub uses_constant_ph: bool,
    pub uses_constant_redox: bool,
    pub uses_gamd: bool,
    pub uses_remd: bool,
}

///
/// Parsed control deck: the raw namelist content plus the interpreted
/// protocol fields (with engine-manual defaults applied).
///
/// Values that came in as shell placeholders stay `ParamValue::Text`; any
/// arithmetic helper returns `None` for them rather than guessing.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDeckRecord {
    pub path: PathBuf,
    pub warnings: Vec<String>,

    pub title: String,
    pub cntrl: HashMap<String, ParamValue>,
    pub extra_namelists: Vec<Namelist>,
    pub weight_schedules: Vec<WeightScheduleEntry>,
    pub restraint_definitions: Vec<String>,

    pub simulation_type: String,
    pub stage_role: String,
    pub ensemble: String,

    pub length_steps: Option<ParamValue>,
    pub dt: ParamValue,
    pub restart_flag: Option<ParamValue>,

    pub energy_freq: ParamValue,
    pub coord_freq: ParamValue,
    pub restart_freq: ParamValue,
    pub traj_format: String,

    pub cutoff: ParamValue,
    pub thermostat: String,
    pub target_temp: ParamValue,
    pub barostat: String,
    pub pbc: String,
    pub constraints: String,

    pub features: DeckFeatures,
}

impl InputDeckRecord {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            warnings: Vec::new(),
            title: "Unknown Title".to_string(),
            cntrl: HashMap::new(),
            extra_namelists: Vec::new(),
            weight_schedules: Vec::new(),
            restraint_definitions: Vec::new(),
            simulation_type: "Molecular Dynamics (MD)".to_string(),
            stage_role: "Generic MD Stage".to_string(),
            ensemble: "Unknown".to_string(),
            length_steps: None,
            dt: ParamValue::Float(0.001),
            restart_flag: None,
            energy_freq: ParamValue::Int(50),
            coord_freq: ParamValue::Int(0),
            restart_freq: ParamValue::Int(1),
            traj_format: "NetCDF".to_string(),
            cutoff: ParamValue::Float(8.0),
            thermostat: "Constant Energy (NVE)".to_string(),
            target_temp: ParamValue::Float(300.0),
            barostat: "None".to_string(),
            pbc: "Vacuum".to_string(),
            constraints: "None".to_string(),
            features: DeckFeatures::default(),
        }
    }

    /// Step count when numeric (placeholder decks report None).
    pub fn steps(&self) -> Option<i64> {
        self.length_steps.as_ref().and_then(ParamValue::as_int)
    }

    pub fn dt_ps(&self) -> Option<f64> {
        self.dt.as_float()
    }

    /// `nstlim * dt`, picoseconds.
    pub fn duration_ps(&self) -> Option<f64> {
        let steps = self.steps()? as f64;
        let dt = self.dt_ps()?;
        Some(steps * dt)
    }
}
