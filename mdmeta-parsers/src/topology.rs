//! Topology file parser.
//!
//! The format is a sequence of `%FLAG` sections, each preceded by a
//! `%FORMAT (NkindWidth[.prec])` descriptor, with data laid out in fixed
//! width columns and no separators. Empty or `*`-filled chunks (Fortran
//! overflow) become missing cells rather than errors.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use mdmeta_core::records::TopologyRecord;
use mdmeta_core::residues::{self, SolventKind, simulation_category};

use crate::error::ParseError;

/// Raw partial charges are stored rescaled; dividing the sum by this
/// constant yields elementary units.
pub const CHARGE_SCALE: f64 = 18.2223;

/// amu/Å³ → g/cc.
pub const DENSITY_SCALE: f64 = 1.66054;

/// Net charges below this magnitude count as neutral.
pub const NEUTRALITY_THRESHOLD: f64 = 1e-2;

fn format_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(\s*(?P<count>\d+)\s*(?P<kind>[aiefAIEF])\s*(?P<width>\d+)(?:\.(?P<prec>\d+))?\s*\)")
            .unwrap()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Alpha,
    Integer,
    Real,
}

/// One decoded fixed-width chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
    Missing,
}

impl Cell {
    fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Cell::Float(f) => Some(*f),
            Cell::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FortranFormat {
    count: usize,
    kind: FieldKind,
    width: usize,
}

impl FortranFormat {
    fn parse(descriptor: &str) -> Option<Self> {
        let caps = format_re().captures(descriptor)?;
        let kind = match caps["kind"].to_ascii_uppercase().as_str() {
            "A" => FieldKind::Alpha,
            "I" => FieldKind::Integer,
            _ => FieldKind::Real,
        };
        Some(Self {
            count: caps["count"].parse().ok()?,
            kind,
            width: caps["width"].parse().ok()?,
        })
    }

    fn decode_line(&self, line: &str, out: &mut Vec<Cell>) {
        let line = line.trim_end_matches(['\n', '\r']);
        for k in 0..self.count {
            let start = k * self.width;
            if start >= line.len() {
                break;
            }
            let end = (start + self.width).min(line.len());
            // Fixed-width sections are ASCII; a slice landing inside a
            // multi-byte character means a corrupt line, not a panic.
            let Some(chunk) = line.get(start..end) else {
                break;
            };
            out.push(self.decode_chunk(chunk));
        }
    }

    fn decode_chunk(&self, chunk: &str) -> Cell {
        let token = chunk.trim();
        if token.is_empty() {
            return match self.kind {
                FieldKind::Alpha => Cell::Text(String::new()),
                _ => Cell::Missing,
            };
        }
        match self.kind {
            FieldKind::Alpha => Cell::Text(token.to_string()),
            FieldKind::Integer => token
                .parse::<i64>()
                .map(Cell::Int)
                .unwrap_or(Cell::Missing),
            FieldKind::Real => token
                .replace(['D', 'd'], "e")
                .parse::<f64>()
                .map(Cell::Float)
                .unwrap_or(Cell::Missing),
        }
    }
}

/// Scanned sections of a topology file, filtered to the flags of interest.
pub struct TopologySections {
    pub version: Option<String>,
    pub sections: HashMap<String, Vec<Cell>>,
    pub warnings: Vec<String>,
}

impl TopologySections {
    fn get(&self, flag: &str) -> Option<&Vec<Cell>> {
        self.sections.get(flag)
    }
}

/// Scan the file once, keeping only `target_flags` (or everything when
/// `None`). Unparseable `%FORMAT` descriptors drop their section with a
/// warning; `%COMMENT` lines inside a section are skipped.
pub fn read_sections(
    path: &Path,
    target_flags: Option<&HashSet<&str>>,
) -> Result<TopologySections, ParseError> {
    let file = File::open(path).map_err(|e| ParseError::read(path, e))?;
    let reader = BufReader::new(file);

    let mut out = TopologySections {
        version: None,
        sections: HashMap::new(),
        warnings: Vec::new(),
    };

    let mut current: Option<(String, FortranFormat, Vec<Cell>)> = None;

    for line in reader.lines() {
        let line = line?;

        if line.starts_with("%VERSION") {
            if let Some(rest) = line.split_once('=') {
                out.version = rest.1.split_whitespace().next().map(str::to_string);
            }
            continue;
        }

        if line.starts_with("%FLAG") {
            if let Some((flag, _, cells)) = current.take() {
                out.sections.insert(flag, cells);
            }
            let flag = line.split_whitespace().nth(1).map(str::to_string);
            // Stash the name; the format descriptor on the next line
            // completes the section header.
            if let Some(flag) = flag {
                let wanted = target_flags.is_none_or(|t| t.contains(flag.as_str()));
                if wanted {
                    // Format filled in when %FORMAT arrives; a zero-count
                    // placeholder keeps unformatted data out.
                    current = Some((
                        flag,
                        FortranFormat {
                            count: 0,
                            kind: FieldKind::Alpha,
                            width: 1,
                        },
                        Vec::new(),
                    ));
                } else {
                    current = None;
                }
            }
            continue;
        }

        if line.starts_with("%FORMAT") {
            if let Some((flag, fmt, _)) = current.as_mut() {
                let descriptor = line.splitn(2, "FORMAT").nth(1).unwrap_or("").trim();
                match FortranFormat::parse(descriptor) {
                    Some(parsed) => *fmt = parsed,
                    None => {
                        out.warnings.push(format!(
                            "Unsupported format {:?} for flag {}; section dropped",
                            descriptor, flag
                        ));
                        current = None;
                    }
                }
            }
            continue;
        }

        if line.starts_with("%COMMENT") {
            continue;
        }

        if let Some((_, fmt, cells)) = current.as_mut() {
            fmt.decode_line(&line, cells);
        }
    }

    if let Some((flag, _, cells)) = current.take() {
        out.sections.insert(flag, cells);
    }

    Ok(out)
}

fn joined_text(cells: &[Cell]) -> String {
    cells
        .iter()
        .filter_map(Cell::as_text)
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

/// Parse a topology file into its metadata record.
pub fn parse(path: &Path) -> Result<TopologyRecord, ParseError> {
    let target: HashSet<&str> = [
        "TITLE",
        "CTITLE",
        "POINTERS",
        "CHARGE",
        "MASS",
        "RESIDUE_LABEL",
        "BOX_DIMENSIONS",
        "RADIUS_SET",
        "SOLVENT_POINTERS",
        "ATOMIC_NUMBER",
        "FORCE_FIELD_TYPE",
        "CMAP_COUNT",
    ]
    .into_iter()
    .collect();

    let scanned = read_sections(path, Some(&target))?;
    let mut record = TopologyRecord::new(path.to_path_buf());
    record.version = scanned.version.clone();
    record.warnings = scanned.warnings.clone();

    if let Some(cells) = scanned.get("TITLE") {
        record.title = Some(joined_text(cells));
    }
    if let Some(cells) = scanned.get("CTITLE") {
        record.title = Some(joined_text(cells));
        record
            .force_field_features
            .push("CHAMBER (CHARMM converted)".to_string());
    }
    if let Some(cells) = scanned.get("FORCE_FIELD_TYPE") {
        record.force_field_type = Some(joined_text(cells));
    }
    if scanned.get("CMAP_COUNT").is_some() {
        record.force_field_features.push("CMAP Correction".to_string());
    }

    if let Some(pointers) = scanned.get("POINTERS") {
        let ptr = |i: usize| pointers.get(i).and_then(Cell::as_int).map(|v| v as usize);
        record.natom = ptr(0);
        record.nres = ptr(11);
        record.nbond = ptr(12);
    }

    if let Some(charges) = scanned.get("CHARGE") {
        let raw_sum: f64 = charges.iter().filter_map(Cell::as_float).sum();
        record.total_charge = raw_sum / CHARGE_SCALE;
        record.is_neutral = record.total_charge.abs() < NEUTRALITY_THRESHOLD;
    }

    let masses = scanned.get("MASS");
    if let Some(masses) = masses {
        record.total_mass = masses.iter().filter_map(Cell::as_float).sum();
    }

    if let (Some(masses), Some(numbers)) = (masses, scanned.get("ATOMIC_NUMBER")) {
        let hydrogen_masses: Vec<f64> = masses
            .iter()
            .zip(numbers)
            .filter(|(_, z)| z.as_int() == Some(1))
            .filter_map(|(m, _)| m.as_float())
            .collect();

        if hydrogen_masses.is_empty() {
            record.hmr_active = Some(false);
        } else {
            let min = hydrogen_masses.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = hydrogen_masses
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            record.hmr_hydrogen_mass_range = Some((min, max));
            record.hmr_summary = Some(format!(
                "{:.3}-{:.3} amu across {} H",
                min,
                max,
                hydrogen_masses.len()
            ));
            // Repartitioned either by outright heavy hydrogens, or by a
            // spread from normal (<= 1.1) up to elevated (>= 1.5).
            record.hmr_active = Some(max >= 2.0 || (max >= 1.5 && min <= 1.1));
        }
    }

    if let Some(box_data) = scanned.get("BOX_DIMENSIONS").filter(|c| c.len() >= 4) {
        let vals: Vec<Option<f64>> = box_data.iter().take(4).map(Cell::as_float).collect();
        if let [Some(beta), Some(a), Some(b), Some(c)] = vals[..] {
            record.box_lengths = Some([a, b, c]);
            record.box_angles = Some([90.0, beta, 90.0]);
            let volume = a * b * c;
            record.box_volume = Some(volume);
            if volume > 0.0 {
                record.density = Some(record.total_mass / volume * DENSITY_SCALE);
            }
            record.force_field_features.push(
                if (beta - 90.0).abs() > 0.01 {
                    "Truncated Octahedron/Triclinic"
                } else {
                    "Orthorhombic Box"
                }
                .to_string(),
            );
            record.solvent_kind = SolventKind::Explicit;
        }
    } else if let Some(radius_set) = scanned.get("RADIUS_SET") {
        record.solvent_kind = SolventKind::Implicit;
        let radii = joined_text(radius_set);
        if !radii.is_empty() {
            record.force_field_features.push(format!("GB Radii: {}", radii));
        }
    }

    if let Some(labels) = scanned.get("RESIDUE_LABEL") {
        for label in labels.iter().filter_map(Cell::as_text) {
            *record
                .residue_composition
                .entry(label.to_string())
                .or_insert(0) += 1;
        }
        let ion_count: usize = record
            .residue_composition
            .iter()
            .filter(|(label, _)| residues::ION_RESNAMES.contains(&label.as_str()))
            .map(|(_, count)| *count)
            .sum();
        if ion_count > 0 {
            record
                .force_field_features
                .push(format!("Contains Ions ({})", ion_count));
        }
    }

    if let Some(solv) = scanned.get("SOLVENT_POINTERS").filter(|c| c.len() >= 3) {
        record.num_solute_residues = solv[0].as_int().map(|v| v as usize);
        record.num_solvent_molecules = solv[2].as_int().map(|v| v as usize);
    }

    record.simulation_category =
        simulation_category(&record.residue_composition, record.solvent_kind);

    Ok(record)
}
