//! Directory discovery: enumerate simulation artifacts, group them into
//! stages by stem, infer roles, and link restart files between stages.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use mdmeta_core::records::RestartRecord;
use mdmeta_parsers::{restart, topology};

use crate::assemble::{attach_file, role_from_deck};
use crate::error::ProtocolError;
use crate::protocol::Protocol;
use crate::stage::{FileKind, Stage, StageRole};
use crate::validate;

/// Restart auto-linking scores (see [`score_restart_candidate`]).
const SCORE_PREV_STAGE_STEM: i32 = 5;
const SCORE_SEQUENCE_PREDECESSOR: i32 = 10;
const SCORE_SAME_SEQUENCE_NUMBER: i32 = 3;
const SCORE_TIME_CONTINUITY: i32 = 20;
const SCORE_THRESHOLD: i32 = 5;

/// Restart times within this many ps of the previous trajectory's end count
/// as continuous.
const RESTART_TIME_TOLERANCE_PS: f64 = 0.1;

/// Timesteps at or above this suggest a hydrogen-mass-repartitioned system.
const HMR_DT_THRESHOLD_PS: f64 = 0.004;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub root: PathBuf,
    pub recursive: bool,
    /// Regex applied to file names; non-matching files are skipped.
    pub pattern_filter: Option<String>,
    /// Ordered `(regex, role)` rules matched against stage names.
    pub grouping_rules: Vec<(String, StageRole)>,
    pub include_roles: Vec<StageRole>,
    pub include_stems: Vec<String>,
    /// Explicit restart assignment, keyed by stage name or role.
    pub restart_files: HashMap<String, PathBuf>,
    pub auto_detect_restarts: bool,
    pub global_topology: Option<PathBuf>,
    /// Topology attached to stages whose timestep implies repartitioned
    /// hydrogens.
    pub hmr_topology: Option<PathBuf>,
    pub skip_cross_stage_validation: bool,
}

impl DiscoveryConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            pattern_filter: None,
            grouping_rules: Vec::new(),
            include_roles: Vec::new(),
            include_stems: Vec::new(),
            restart_files: HashMap::new(),
            auto_detect_restarts: false,
            global_topology: None,
            hmr_topology: None,
            skip_cross_stage_validation: false,
        }
    }
}

/// Where a stem sits in a numbered sequence of stems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePosition {
    pub base: String,
    pub number: u64,
}

fn trailing_number(stem: &str) -> Option<(String, u64)> {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(.+?)[-_.]?(\d{2,})$").unwrap());
    let caps = re.captures(stem)?;
    Some((caps[1].to_string(), caps[2].parse().ok()?))
}

fn leading_number(stem: &str) -> Option<u64> {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(\d{2,})[-_.]?(.+)$").unwrap());
    let caps = re.captures(stem)?;
    caps[1].parse().ok()
}

///
/// Detect numbered sequences among the stage stems of one directory. Two
/// rules, applied in order: a trailing numeric suffix groups stems sharing
/// the base (`prod_001`, `prod_002`); a leading numeric prefix groups every
/// remaining prefixed stem (`01_heat`, `02_equil`), since those name the
/// pipeline position rather than a common base. Only groups of two or more
/// stems materialize.
///
pub fn detect_sequences(stems: &[String]) -> HashMap<String, SequencePosition> {
    let mut out = HashMap::new();

    let mut trailing_groups: HashMap<String, Vec<(String, u64)>> = HashMap::new();
    for stem in stems {
        if let Some((base, num)) = trailing_number(stem) {
            trailing_groups.entry(base).or_default().push((stem.clone(), num));
        }
    }
    for (base, members) in trailing_groups {
        if members.len() >= 2 {
            for (stem, num) in members {
                out.insert(stem, SequencePosition {
                    base: base.clone(),
                    number: num,
                });
            }
        }
    }

    let leading: Vec<(String, u64)> = stems
        .iter()
        .filter(|stem| !out.contains_key(*stem))
        .filter_map(|stem| leading_number(stem).map(|num| (stem.clone(), num)))
        .collect();
    if leading.len() >= 2 {
        for (stem, num) in leading {
            out.insert(stem, SequencePosition {
                base: String::new(),
                number: num,
            });
        }
    }

    out
}

/// Path-based role hints, checked in fixed order; first hit wins.
fn role_from_path(stem: &str, parent: Option<&str>) -> Option<StageRole> {
    const TABLE: &[(&str, StageRole)] = &[
        ("min", StageRole::Minimization),
        ("em", StageRole::Minimization),
        ("heat", StageRole::Heating),
        ("warm", StageRole::Heating),
        ("equil", StageRole::Equilibration),
        ("nvt", StageRole::Equilibration),
        ("npt", StageRole::Equilibration),
        ("prod", StageRole::Production),
    ];
    let stem = stem.to_ascii_lowercase();
    let parent = parent.map(str::to_ascii_lowercase);
    for (needle, role) in TABLE {
        if stem.contains(needle) || parent.as_deref().is_some_and(|p| p.contains(needle)) {
            return Some(*role);
        }
    }
    None
}

/// Content-based role hints from the control deck.
fn role_from_content(stage: &Stage) -> Option<StageRole> {
    let deck = stage.input_deck.as_ref();
    let get_int = |key: &str| {
        deck.and_then(|d| d.cntrl.get(key))
            .and_then(mdmeta_core::ParamValue::as_int)
    };
    let get_float = |key: &str| {
        deck.and_then(|d| d.cntrl.get(key))
            .and_then(mdmeta_core::ParamValue::as_float)
    };

    if get_int("imin") == Some(1) {
        return Some(StageRole::Minimization);
    }
    if let (Some(tempi), Some(temp0)) = (get_float("tempi"), get_float("temp0")) {
        if tempi < temp0 && tempi < 50.0 {
            return Some(StageRole::Heating);
        }
    }
    if get_int("ntr") == Some(1) || get_int("ibelly") == Some(1) {
        return Some(StageRole::Equilibration);
    }
    let steps = stage.length_steps()?;
    if steps > 500_000 {
        return Some(StageRole::Production);
    }
    None
}

struct GroupingRule {
    regex: Regex,
    role: StageRole,
}

fn compile_rules(rules: &[(String, StageRole)]) -> Vec<GroupingRule> {
    rules
        .iter()
        .map(|(pattern, role)| {
            let regex = Regex::new(pattern)
                .unwrap_or_else(|_| Regex::new(&regex::escape(pattern)).unwrap());
            GroupingRule {
                regex,
                role: *role,
            }
        })
        .collect()
}

fn enumerate_files(root: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                enumerate_files(&path, true, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn file_name_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

///
/// Discover a protocol under a root directory.
///
/// Stages are ordered by stem lexicographically; role inference applies the
/// fixed priority: grouping rules, then the input deck's own classification,
/// then deck content, then path substrings.
///
pub fn discover(config: &DiscoveryConfig) -> Result<Protocol, ProtocolError> {
    let pattern = config
        .pattern_filter
        .as_ref()
        .map(|p| {
            Regex::new(p).map_err(|e| ProtocolError::InvalidPattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .transpose()?;
    let rules = compile_rules(&config.grouping_rules);

    let mut files = Vec::new();
    enumerate_files(&config.root, config.recursive, &mut files)?;

    // Group by stem (path minus final extension); one file per kind per
    // stem, lexically-first path winning a collision.
    let mut grouped: BTreeMap<PathBuf, HashMap<FileKind, PathBuf>> = BTreeMap::new();
    for path in files {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let Some(pattern) = &pattern {
            if !pattern.is_match(name) {
                continue;
            }
        }
        let Some(kind) = FileKind::from_path(&path) else {
            continue;
        };
        // Under auto-detection, restart files are link candidates rather
        // than stage members: the restart an engine writes carries its own
        // stem, but the stage that reads it is the successor.
        if kind == FileKind::Restart && config.auto_detect_restarts {
            continue;
        }
        let stem_key = path.with_extension("");
        let slot = grouped.entry(stem_key).or_default().entry(kind);
        slot.and_modify(|existing| {
            if path < *existing {
                *existing = path.clone();
            }
        })
        .or_insert_with(|| path.clone());
    }

    // Sequences are per-directory; stems from different directories never
    // join the same numbering.
    let mut by_dir: HashMap<PathBuf, Vec<String>> = HashMap::new();
    for key in grouped.keys() {
        let dir = key.parent().map(Path::to_path_buf).unwrap_or_default();
        by_dir.entry(dir).or_default().push(file_name_stem(key));
    }
    let mut sequences: HashMap<String, SequencePosition> = HashMap::new();
    for stems in by_dir.values() {
        for (stem, position) in detect_sequences(stems) {
            sequences.entry(stem).or_insert(position);
        }
    }

    // Build stages in lexical stem order.
    let mut stages: Vec<Stage> = Vec::new();
    for (stem_key, kinds) in &grouped {
        let name = file_name_stem(stem_key);
        let mut stage = Stage::new(name.clone());
        for (kind, path) in kinds {
            attach_file(&mut stage, *kind, path)?;
        }

        // Role inference, fixed priority.
        stage.role = rules
            .iter()
            .find(|r| r.regex.is_match(&name))
            .map(|r| r.role)
            .or_else(|| stage.input_deck.as_ref().and_then(role_from_deck))
            .or_else(|| role_from_content(&stage))
            .or_else(|| {
                let parent = stem_key
                    .parent()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str());
                role_from_path(&name, parent)
            });

        stages.push(stage);
    }

    link_explicit_restarts(&mut stages, config)?;
    if config.auto_detect_restarts {
        link_auto_restarts(&mut stages, &config.root, &sequences)?;
    }
    attach_shared_topologies(&mut stages, config)?;

    // Filters run after classification and role inference.
    if !config.include_stems.is_empty() {
        stages.retain(|s| config.include_stems.iter().any(|k| *k == s.name));
    }
    if !config.include_roles.is_empty() {
        stages.retain(|s| {
            s.role
                .is_some_and(|r| config.include_roles.contains(&r))
        });
    }

    let mut protocol = Protocol::new(stages);
    if !config.skip_cross_stage_validation {
        validate::validate(&mut protocol);
    }
    Ok(protocol)
}

fn link_explicit_restarts(
    stages: &mut [Stage],
    config: &DiscoveryConfig,
) -> Result<(), ProtocolError> {
    if config.restart_files.is_empty() {
        return Ok(());
    }
    for stage in stages.iter_mut() {
        let by_name = config.restart_files.get(&stage.name);
        let by_role = stage
            .role
            .and_then(|r| config.restart_files.get(r.as_str()));
        if let Some(path) = by_name.or(by_role) {
            stage.restart = Some(restart::parse(path)?);
            stage.restart_path = Some(path.clone());
        }
    }
    Ok(())
}

/// Candidate score for assigning `candidate` as the restart of the stage at
/// `index`. `None` means the atom-count hard filter rejected it.
fn score_restart_candidate(
    stages: &[Stage],
    index: usize,
    candidate: &RestartRecord,
    candidate_stem: &str,
    sequences: &HashMap<String, SequencePosition>,
) -> Option<i32> {
    let stage = &stages[index];
    if let (Some((_, stage_atoms)), Some(candidate_atoms)) =
        (stage.atom_counts().first(), candidate.natom)
    {
        if *stage_atoms != candidate_atoms {
            return None;
        }
    }

    let mut score = 0;
    let prev = index.checked_sub(1).map(|i| &stages[i]);

    if let Some(prev) = prev {
        if candidate_stem == prev.name {
            score += SCORE_PREV_STAGE_STEM;
        }
        if let (Some(end), Some(start)) = (
            prev.trajectory.as_ref().and_then(|t| t.time_end),
            candidate.time_ps,
        ) {
            if (start - end).abs() <= RESTART_TIME_TOLERANCE_PS {
                score += SCORE_TIME_CONTINUITY;
            }
        }
    }

    if let Some(position) = sequences.get(&stage.name) {
        let candidate_position = trailing_number(candidate_stem)
            .or_else(|| leading_number(candidate_stem).map(|num| (String::new(), num)));
        if let Some((base, num)) = candidate_position {
            if base == position.base {
                if num + 1 == position.number {
                    score += SCORE_SEQUENCE_PREDECESSOR;
                } else if num == position.number {
                    score += SCORE_SAME_SEQUENCE_NUMBER;
                }
            }
        }
    }

    Some(score)
}

fn link_auto_restarts(
    stages: &mut Vec<Stage>,
    root: &Path,
    sequences: &HashMap<String, SequencePosition>,
) -> Result<(), ProtocolError> {
    // Restart-eligible files at the top of the root only.
    let mut candidates: Vec<(PathBuf, String)> = Vec::new();
    let mut files = Vec::new();
    enumerate_files(root, false, &mut files)?;
    for path in files {
        if FileKind::from_path(&path) == Some(FileKind::Restart) {
            let stem = file_name_stem(&path);
            candidates.push((path, stem));
        }
    }
    if candidates.is_empty() {
        return Ok(());
    }

    let mut parsed: HashMap<PathBuf, RestartRecord> = HashMap::new();
    for (path, _) in &candidates {
        parsed.insert(path.clone(), restart::parse(path)?);
    }

    for index in 0..stages.len() {
        if stages[index].restart.is_some() {
            continue;
        }
        let mut best: Option<(i32, &PathBuf)> = None;
        for (path, stem) in &candidates {
            let record = &parsed[path];
            let Some(score) = score_restart_candidate(stages, index, record, stem, sequences)
            else {
                continue;
            };
            if best.is_none_or(|(b, _)| score > b) {
                best = Some((score, path));
            }
        }
        if let Some((score, path)) = best {
            if score >= SCORE_THRESHOLD {
                stages[index].restart = Some(parsed[path].clone());
                stages[index].restart_path = Some(path.clone());
            }
        }
    }
    Ok(())
}

/// Share one parsed topology with every stage that lacks its own. The HMR
/// variant goes to stages whose timestep implies repartitioned hydrogens;
/// neither ever replaces a topology a stage already has.
fn attach_shared_topologies(
    stages: &mut [Stage],
    config: &DiscoveryConfig,
) -> Result<(), ProtocolError> {
    let hmr = config
        .hmr_topology
        .as_ref()
        .map(|p| topology::parse(p).map(Arc::new))
        .transpose()?;
    let global = config
        .global_topology
        .as_ref()
        .map(|p| topology::parse(p).map(Arc::new))
        .transpose()?;

    if let Some(hmr) = &hmr {
        for stage in stages.iter_mut() {
            if stage.topology.is_none()
                && stage.dt_ps().is_some_and(|dt| dt >= HMR_DT_THRESHOLD_PS)
            {
                stage.topology = Some(Arc::clone(hmr));
            }
        }
    }
    if let Some(global) = &global {
        for stage in stages.iter_mut() {
            if stage.topology.is_none() {
                stage.topology = Some(Arc::clone(global));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn trailing_sequences_detected() {
        let stems = strings(&["prod_001", "prod_002", "prod_003", "minimize"]);
        let seq = detect_sequences(&stems);
        assert_eq!(seq.len(), 3);
        assert_eq!(
            seq.get("prod_002"),
            Some(&SequencePosition {
                base: "prod".to_string(),
                number: 2
            })
        );
        assert!(!seq.contains_key("minimize"));
    }

    #[test]
    fn leading_sequences_detected() {
        let stems = strings(&["01_heat", "02_equil", "03_prod"]);
        let seq = detect_sequences(&stems);
        assert_eq!(seq.get("01_heat").map(|p| p.number), Some(1));
        assert_eq!(seq.get("03_prod").map(|p| p.number), Some(3));
    }

    #[test]
    fn trailing_rule_wins_over_leading() {
        // Both rules could match `01_run_02`; the trailing rule is tried
        // first and groups by the `01_run` base.
        let stems = strings(&["01_run_02", "01_run_03"]);
        let seq = detect_sequences(&stems);
        assert_eq!(
            seq.get("01_run_02"),
            Some(&SequencePosition {
                base: "01_run".to_string(),
                number: 2
            })
        );
    }

    #[test]
    fn single_member_groups_do_not_materialize() {
        let stems = strings(&["prod_001", "heat_01"]);
        let seq = detect_sequences(&stems);
        assert!(seq.is_empty());
    }

    #[test]
    fn short_numbers_are_not_sequences() {
        // Single digits don't meet the two-digit minimum.
        let stems = strings(&["prod_1", "prod_2"]);
        assert!(detect_sequences(&stems).is_empty());
    }

    #[rstest]
    #[case("step1_min", None, Some(StageRole::Minimization))]
    #[case("heat_300K", None, Some(StageRole::Heating))]
    #[case("warmup", None, Some(StageRole::Heating))]
    #[case("npt_equil", None, Some(StageRole::Equilibration))]
    #[case("nvt_run", None, Some(StageRole::Equilibration))]
    #[case("prod_001", None, Some(StageRole::Production))]
    #[case("run_42", Some("production"), Some(StageRole::Production))]
    #[case("run_42", None, None)]
    fn path_role_table(
        #[case] stem: &str,
        #[case] parent: Option<&str>,
        #[case] expected: Option<StageRole>,
    ) {
        assert_eq!(role_from_path(stem, parent), expected);
    }
}
