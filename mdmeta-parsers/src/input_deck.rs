//! Input-deck parser: free-text title, Fortran namelists, weight schedules,
//! trailing restraint definitions, and the interpreted protocol fields.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use mdmeta_core::ParamValue;
use mdmeta_core::records::{DeckFeatures, InputDeckRecord, Namelist, WeightScheduleEntry};

use crate::error::ParseError;

fn namelist_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)&(?P<name>[a-z0-9_]+)(?P<body>.*?)(?:/|&end)").unwrap()
    })
}

fn kv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?x)
            (?P<key>[A-Za-z0-9_]+)\s*=\s*
            (?P<value>
                '(?:[^']|\\')*'        # single-quoted
              | "(?:[^"]|\\")*"        # double-quoted
              | \$\{[^}]+\}            # ${VAR}
              | \$\([^)]+\)            # $(cmd)
              | [^,/\s]+               # bare token
            )"#,
        )
        .unwrap()
    })
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[!#][^\n]*").unwrap())
}

fn parse_namelist_body(body: &str) -> HashMap<String, ParamValue> {
    let mut out = HashMap::new();
    for caps in kv_re().captures_iter(body) {
        let key = caps["key"].to_ascii_lowercase();
        out.insert(key, ParamValue::from_token(&caps["value"]));
    }
    out
}

pub fn parse(path: &Path) -> Result<InputDeckRecord, ParseError> {
    let content = fs::read_to_string(path).map_err(|e| ParseError::read(path, e))?;
    let mut record = InputDeckRecord::new(path.to_path_buf());
    if content.is_empty() {
        return Ok(record);
    }

    // Title: the first line that is not blank, a comment, or a namelist.
    let mut title_end = 0usize;
    let mut found = false;
    for line in content.lines() {
        let clean = line.trim();
        if clean.is_empty() || clean.starts_with('#') || clean.starts_with('!') {
            title_end += line.len() + 1;
            continue;
        }
        if clean.starts_with('&') {
            record.title = "Untitled".to_string();
        } else {
            record.title = clean.to_string();
            title_end += line.len() + 1;
        }
        found = true;
        break;
    }
    if !found {
        return Ok(record);
    }

    let rest = &content[title_end.min(content.len())..];
    let stripped = comment_re().replace_all(rest, "").into_owned();

    let mut last_end = 0usize;
    for caps in namelist_re().captures_iter(&stripped) {
        let name = caps["name"].to_ascii_lowercase();
        let params = parse_namelist_body(&caps["body"]);
        if name == "cntrl" {
            record.cntrl.extend(params);
        } else {
            if name == "wt" {
                record.weight_schedules.push(weight_entry(&params));
            }
            record.extra_namelists.push(Namelist {
                name: name.clone(),
                parameters: params,
            });
        }
        last_end = caps.get(0).unwrap().end();
    }

    // Whatever follows the final namelist is the restraint block.
    record.restraint_definitions = stripped[last_end..]
        .lines()
        .map(str::trim)
        .filter(|l| {
            !l.is_empty()
                && !l.starts_with('&')
                && !l.eq_ignore_ascii_case("END")
                && !l.eq_ignore_ascii_case("EOF")
        })
        .map(str::to_string)
        .collect();

    interpret(&mut record);
    Ok(record)
}

fn weight_entry(params: &HashMap<String, ParamValue>) -> WeightScheduleEntry {
    let quantity = params
        .get("type")
        .map(|v| v.to_string().trim_matches(['\'', '"']).to_ascii_uppercase())
        .unwrap_or_default();
    WeightScheduleEntry {
        quantity,
        istep1: params.get("istep1").cloned(),
        istep2: params.get("istep2").cloned(),
        value1: params.get("value1").cloned(),
        value2: params.get("value2").cloned(),
        increment: params.get("iinc").cloned(),
        multiplier: params.get("imult").cloned(),
    }
}

fn as_int(v: Option<&ParamValue>) -> Option<i64> {
    v.and_then(ParamValue::as_int)
}

fn as_float(v: Option<&ParamValue>) -> Option<f64> {
    v.and_then(ParamValue::as_float)
}

/// Map the raw `&cntrl` values (plus `&wt`) to the semantic fields,
/// applying the engine-manual defaults where a key is absent.
fn interpret(record: &mut InputDeckRecord) {
    let c = record.cntrl.clone();
    let get = |key: &str| c.get(key);

    let imin = as_int(get("imin"));
    record.simulation_type = match imin {
        None if get("imin").is_some() => {
            format!("Variable (imin={})", get("imin").unwrap())
        }
        None | Some(0) => "Molecular Dynamics (MD)".to_string(),
        Some(1) => "Minimization".to_string(),
        Some(5) => "Trajectory Analysis (minimization)".to_string(),
        Some(6) => "MD (Energy/Gradient only)".to_string(),
        Some(other) => format!("Unknown (imin={})", other),
    };

    record.length_steps = get("nstlim").cloned();
    record.dt = get("dt").cloned().unwrap_or(ParamValue::Float(0.001));
    record.restart_flag = get("irest").cloned();

    record.energy_freq = get("ntpr").cloned().unwrap_or(ParamValue::Int(50));
    record.coord_freq = get("ntwx").cloned().unwrap_or(ParamValue::Int(0));
    record.restart_freq = get("ntwr")
        .cloned()
        .or_else(|| get("nstlim").cloned())
        .unwrap_or(ParamValue::Int(1));
    record.traj_format = match as_int(get("ioutfm")) {
        Some(0) => "ASCII".to_string(),
        _ => "NetCDF".to_string(),
    };

    let ntt = as_int(get("ntt"));
    record.thermostat = match ntt {
        None if get("ntt").is_some() => get("ntt").unwrap().to_string(),
        None | Some(0) => "Constant Energy (NVE)".to_string(),
        Some(1) => "Berendsen".to_string(),
        Some(2) => "Andersen".to_string(),
        Some(3) => "Langevin Dynamics".to_string(),
        Some(5) => "Adaptive Thermostat".to_string(),
        Some(9) => "Optimized Isokinetic (OIN)".to_string(),
        Some(10) => "Stochastic Isokinetic".to_string(),
        Some(11) => "Bussi (Stochastic Berendsen)".to_string(),
        Some(other) => format!("Unknown (ntt={})", other),
    };
    record.target_temp = get("temp0").cloned().unwrap_or(ParamValue::Float(300.0));

    let ntp = as_int(get("ntp"));
    let igb = as_int(get("igb"));

    // ntb default chain: no box under GB, constant pressure when a barostat
    // is requested, constant volume otherwise.
    let ntb = match get("ntb") {
        Some(v) => v.as_int(),
        None => Some(match (igb, ntp) {
            (Some(g), _) if g > 0 => 0,
            (_, Some(p)) if p > 0 => 2,
            _ => 1,
        }),
    };

    record.pbc = match ntb {
        None => format!("Template/Variable (ntb={})", get("ntb").unwrap()),
        Some(0) => "Vacuum / No PBC".to_string(),
        Some(1) => "PBC / Constant Volume".to_string(),
        Some(n) if n >= 2 => "PBC / Constant Pressure".to_string(),
        Some(n) => format!("Unknown (ntb={})", n),
    };

    record.barostat = match ntp {
        Some(p) if p > 0 => {
            let scaling = match p {
                2 => "Anisotropic",
                3 => "Semi-Isotropic",
                _ => "Isotropic",
            };
            let algo = match as_int(get("barostat")) {
                Some(2) => "Monte Carlo",
                _ => "Berendsen",
            };
            format!("{} ({})", algo, scaling)
        }
        _ => "None".to_string(),
    };

    record.constraints = match as_int(get("ntc")) {
        None if get("ntc").is_some() => get("ntc").unwrap().to_string(),
        None | Some(1) => "None".to_string(),
        Some(2) => "H-bonds".to_string(),
        Some(3) => "All bonds".to_string(),
        Some(other) => format!("ntc={}", other),
    };

    record.cutoff = get("cut").cloned().unwrap_or_else(|| {
        if igb.is_some_and(|g| g > 0) {
            ParamValue::Float(9999.0)
        } else {
            ParamValue::Float(8.0)
        }
    });

    let mut features = DeckFeatures::default();
    let implicit = matches!(get("igb"), Some(v) if v.to_string() != "0");
    if implicit {
        features.implicit_solvent = Some(format!("GB Model {}", get("igb").unwrap()));
        record.pbc = "Implicit solvent (no periodic box)".to_string();
    }
    features.restraints_active = matches!(get("ntr"), Some(v) if v.to_string() != "0");
    features.nmr_options = matches!(get("nmropt"), Some(v) if v.to_string() != "0");
    features.qmmm_active = matches!(get("ifqnt"), Some(v) if v.to_string() != "0");
    features.uses_free_energy = [as_int(get("icfe")), as_int(get("infe")), as_int(get("ifmbar"))]
        .iter()
        .any(|v| *v == Some(1));
    features.uses_constant_ph =
        as_int(get("icnstph")) == Some(1) || as_int(get("iphmd")) == Some(1);
    features.uses_constant_redox = c.contains_key("solve");
    features.uses_gamd = as_int(get("igamd")).is_some_and(|v| v != 0);
    features.uses_remd = as_int(get("numexchg")).is_some_and(|v| v != 0);

    for entry in &record.weight_schedules {
        match entry.quantity.as_str() {
            "TEMP0" => features.has_temp_ramp = true,
            "REST" | "RESTS" | "RESTL" | "NOESY" | "SHIFTS" => {
                features.has_restraint_schedule = true
            }
            "CUT" => features.has_cutoff_schedule = true,
            _ => {}
        }
    }

    record.ensemble = classify_ensemble(ntb, ntt, ntp, implicit);
    record.features = features;
    record.stage_role = classify_stage(record, imin);
    push_warnings(record);
}

fn classify_ensemble(
    ntb: Option<i64>,
    ntt: Option<i64>,
    ntp: Option<i64>,
    implicit: bool,
) -> String {
    let thermostatted = ntt.is_some_and(|t| t != 0);
    if implicit {
        return if thermostatted {
            "Implicit-solvent NVT".to_string()
        } else {
            "Implicit-solvent NVE".to_string()
        };
    }
    let Some(ntb) = ntb else {
        return "Unknown ensemble (template)".to_string();
    };
    match ntb {
        0 => {
            if thermostatted {
                "NVT (no PBC)".to_string()
            } else {
                "NVE (no PBC)".to_string()
            }
        }
        1 => {
            if thermostatted {
                "NVT (PBC, constant volume)".to_string()
            } else {
                "NVE (PBC, constant volume)".to_string()
            }
        }
        _ => {
            let base = if thermostatted { "NPT" } else { "NPH" };
            match ntp {
                None => format!("{} (unknown barostat)", base),
                Some(1) => format!("{} (isotropic)", base),
                Some(2) => format!("{} (anisotropic)", base),
                Some(3) => format!("{} (semi-isotropic)", base),
                Some(p) => format!("{} (ntp={})", base, p),
            }
        }
    }
}

/// Stage role, by fixed priority: the minimization flag, then title cues,
/// then duration buckets.
fn classify_stage(record: &InputDeckRecord, imin: Option<i64>) -> String {
    let title = record.title.to_ascii_lowercase();
    let restrained = record.features.restraints_active;
    let ensemble = &record.ensemble;

    if imin.is_some_and(|v| v != 0) || title.contains("minim") {
        return "Energy minimization".to_string();
    }

    if title.contains("heat") || title.contains("thermal") {
        return "Heating / thermalization".to_string();
    }
    if title.contains("equil") || title.contains("nvt") || title.contains("npt equil") {
        return if restrained {
            format!("Equilibration with positional restraints [{}]", ensemble)
        } else {
            format!("Equilibration [{}]", ensemble)
        };
    }
    if title.contains("prod") {
        return if restrained {
            format!("Production with restraints [{}]", ensemble)
        } else {
            format!("Production [{}]", ensemble)
        };
    }

    if let Some(total_ps) = record.duration_ps().filter(|ps| *ps > 0.0) {
        let total_ns = total_ps / 1000.0;
        return if total_ns < 0.1 {
            if restrained {
                format!("Short restrained equilibration ({:.3} ns)", total_ns)
            } else {
                format!("Short MD segment ({:.3} ns)", total_ns)
            }
        } else if total_ns <= 5.0 {
            if restrained {
                format!("Equilibration with restraints ({:.3} ns)", total_ns)
            } else {
                format!("Short production or equilibration ({:.3} ns)", total_ns)
            }
        } else if restrained {
            format!("Long production run with restraints ({:.3} ns)", total_ns)
        } else {
            format!("Production run ({:.3} ns)", total_ns)
        };
    }

    format!("Generic MD stage [{}]", ensemble)
}

fn push_warnings(record: &mut InputDeckRecord) {
    let ntx = as_int(record.cntrl.get("ntx"));
    let irest = as_int(record.cntrl.get("irest"));
    if irest == Some(1) {
        if let Some(ntx) = ntx {
            if !matches!(ntx, 4 | 5 | 7) {
                record.warnings.push(format!(
                    "irest=1 but ntx={} (typical restart uses ntx=4, 5, or 7).",
                    ntx
                ));
            }
        }
    }

    if let Some(dt) = record.dt_ps() {
        if dt > 0.004 {
            record.warnings.push(format!(
                "Unusually large timestep dt={} ps (check hydrogen mass repartitioning / constraints).",
                dt
            ));
        }
    }

    if record.title.to_ascii_lowercase().contains("restraint")
        && !record.features.restraints_active
    {
        record
            .warnings
            .push("Title mentions restraints but ntr=0 in &cntrl.".to_string());
    }
}
