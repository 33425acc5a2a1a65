//! End-to-end protocol assembly over synthetic on-disk fixtures.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use mdmeta_netcdf::writer::{NcDim, NcVarSpec, NcWriter};
use mdmeta_protocol::{
    BuildOptions, DiscoveryConfig, Manifest, ManifestEntry, ProtocolError, StageRole,
    build_protocol, discover,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Minimal topology: pointers (and optionally a box).
fn prmtop_text(natom: usize, with_box: bool) -> String {
    let mut out = String::new();
    out.push_str("%VERSION  VERSION_STAMP = V0001.000  DATE = 01/15/24\n");
    out.push_str("%FLAG TITLE\n%FORMAT(20a4)\nsystem\n");
    out.push_str("%FLAG POINTERS\n%FORMAT(10I8)\n");
    let mut pointers = vec![0i64; 20];
    pointers[0] = natom as i64;
    pointers[11] = 3;
    pointers[12] = 2;
    for chunk in pointers.chunks(10) {
        for v in chunk {
            write!(out, "{:8}", v).unwrap();
        }
        out.push('\n');
    }
    out.push_str("%FLAG RESIDUE_LABEL\n%FORMAT(20a4)\nALA WAT WAT\n");
    if with_box {
        out.push_str("%FLAG BOX_DIMENSIONS\n%FORMAT(5E16.8)\n");
        out.push_str("  9.00000000E+01  8.00000000E+01  8.00000000E+01  8.00000000E+01\n");
    }
    out
}

fn mdin_text(nstlim: u64, dt: f64, ntwx: u64) -> String {
    format!(
        "production stage\n &cntrl\n  imin=0, irest=1, ntx=5,\n  nstlim={}, dt={},\n  ntt=3, temp0=300.0, ntp=1,\n  ntc=2, cut=9.0,\n  ntpr=5000, ntwx={},\n /\n",
        nstlim, dt, ntwx
    )
}

fn mdout_text(
    natom: usize,
    nstlim: u64,
    dt: f64,
    ntwx: u64,
    frame_times: &[f64],
    finished: bool,
) -> String {
    let mut out = String::new();
    out.push_str("| PMEMD implementation of SANDER, Release 22\n");
    out.push_str("| Run on 01/15/2024 at 09:41:11\n\n");
    out.push_str("|  1.  RESOURCE   USE:\n\n");
    writeln!(out, " NATOM  = {:7} NTYPES =      18", natom).unwrap();
    out.push_str(" NRES   =       3\n\n");
    out.push_str("|  2.  CONTROL  DATA  FOR  THE  RUN\n\n");
    writeln!(out, "     nstlim  = {:9}, dt      = {:9.5}", nstlim, dt).unwrap();
    out.push_str("     ntt     =         3, temp0   = 300.00000\n");
    out.push_str("     ntp     =         1, ntc     =         2\n");
    writeln!(out, "     ntwx    = {:9}, cut     =   9.00000", ntwx).unwrap();
    out.push_str("     BOX TYPE: RECTILINEAR\n\n");
    for (i, t) in frame_times.iter().enumerate() {
        writeln!(
            out,
            " NSTEP = {:9}   TIME(PS) = {:12.3}  TEMP(K) =   300.12  PRESS =      1.2",
            (i as u64 + 1) * ntwx,
            t
        )
        .unwrap();
        out.push_str(" Etot   =  -40430.1234  EKtot   =   12526.5961  EPtot      =  -52956.4464\n");
        out.push_str(" BOND   =     508.9678  ANGLE   =    1290.1804  DIHED      =    1114.1630\n");
        out.push_str(" VOLUME =  648136.5118\n");
        out.push_str("                                               Density    =     1.0370\n");
        out.push_str(" -----------------------------------------------------------------------\n");
    }
    if finished {
        out.push_str("   5.  TIMINGS\n");
        out.push_str("|  Final Performance Info:\n");
        out.push_str("|         ns/day =      85.16   seconds/ns =    1014.50\n");
        out.push_str("|  Total wall time:        20290    seconds\n");
    }
    out
}

fn write_traj(
    dir: &Path,
    name: &str,
    natom: usize,
    times: &[f64],
    box_lengths: Option<[f64; 3]>,
) -> PathBuf {
    let path = dir.join(name);
    let mut w = NcWriter::new();
    w.global_attr("title", "trajectory");
    w.global_attr("Conventions", "AMBER");
    let frame = w.dim("frame", NcDim::Record);
    let _atom = w.dim("atom", NcDim::Fixed(natom));
    w.set_numrecs(times.len() as u32);
    w.var(NcVarSpec::double("time", vec![frame]), times.to_vec());
    if let Some(lengths) = box_lengths {
        let cell = w.dim("cell_spatial", NcDim::Fixed(3));
        w.var(
            NcVarSpec::double("cell_lengths", vec![frame, cell]),
            times.iter().flat_map(|_| lengths).collect(),
        );
        w.var(
            NcVarSpec::double("cell_angles", vec![frame, cell]),
            times.iter().flat_map(|_| [90.0, 90.0, 90.0]).collect(),
        );
    }
    w.write(&path).unwrap();
    path
}

/// ASCII restart carrying only the header (atom count and clock).
fn restart_header_text(natom: usize, time_ps: f64) -> String {
    format!("restart\n{:6} {:13.7}\n", natom, time_ps)
}

fn entry(name: &str) -> ManifestEntry {
    ManifestEntry {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

#[test]
fn single_production_stage() {
    let dir = TempDir::new().unwrap();
    let natom = 64528;
    write_file(dir.path(), "sys.top", &prmtop_text(natom, true));
    write_file(dir.path(), "prod.in", &mdin_text(5_000_000, 0.004, 25_000));

    // 200 frames, 1020 ps through 20920 ps.
    let times: Vec<f64> = (0..200).map(|i| 1020.0 + 100.0 * i as f64).collect();
    write_file(
        dir.path(),
        "prod.out",
        &mdout_text(natom, 5_000_000, 0.004, 25_000, &times, true),
    );
    write_traj(dir.path(), "prod.nc", natom, &times, Some([80.0, 80.0, 80.0]));

    let mut e = entry("prod");
    e.stage_role = Some(StageRole::Production);
    e.paths.prmtop = Some(PathBuf::from("sys.top"));
    e.paths.mdin = Some(PathBuf::from("prod.in"));
    e.paths.mdout = Some(PathBuf::from("prod.out"));
    e.paths.mdcrd = Some(PathBuf::from("prod.nc"));

    let manifest = Manifest::from_entries(vec![e]).unwrap();
    let protocol = build_protocol(&manifest, dir.path(), &BuildOptions::default()).unwrap();

    assert_eq!(protocol.len(), 1);
    let stage = &protocol.stages[0];
    assert_eq!(stage.role, Some(StageRole::Production));
    assert_eq!(stage.validation, Vec::<String>::new());

    let totals = protocol.totals();
    assert_eq!(totals.steps, 5_000_000);
    assert!((totals.time_ps - 20_000.0).abs() < 1e-6);

    let log = stage.log.as_ref().unwrap();
    assert!(log.finished_properly);
    assert_eq!(log.stats.count, 200);
    assert_eq!(log.stats.time_start, 1020.0);
    assert_eq!(log.stats.time_end, 20920.0);
}

#[test]
fn equilibration_to_production_continuity() {
    let dir = TempDir::new().unwrap();
    // Equilibration trajectory ends at 1000.0 ps with 0.5 ps frames.
    let times: Vec<f64> = (0..10).map(|i| 995.5 + 0.5 * i as f64).collect();
    write_traj(dir.path(), "eq.nc", 3, &times, None);
    // Production restarts half a picosecond later: one frame interval.
    write_file(dir.path(), "prod.rst7", &restart_header_text(3, 1000.5));

    let mut eq = entry("eq");
    eq.stage_role = Some(StageRole::Equilibration);
    eq.paths.mdcrd = Some(PathBuf::from("eq.nc"));
    let mut prod = entry("prod");
    prod.stage_role = Some(StageRole::Production);
    prod.paths.inpcrd = Some(PathBuf::from("prod.rst7"));

    let manifest = Manifest::from_entries(vec![eq, prod]).unwrap();
    let protocol = build_protocol(&manifest, dir.path(), &BuildOptions::default()).unwrap();

    let prod = &protocol.stages[1];
    assert_eq!(prod.observed_gap_ps, Some(0.0));
    assert_eq!(prod.continuity, Vec::<String>::new());
}

#[test]
fn atom_count_mismatch_between_topology_and_restart() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "sys.top", &prmtop_text(64528, false));
    write_file(dir.path(), "start.rst7", &restart_header_text(64530, 0.0));

    let mut e = entry("stage1");
    e.paths.prmtop = Some(PathBuf::from("sys.top"));
    e.paths.inpcrd = Some(PathBuf::from("start.rst7"));

    let manifest = Manifest::from_entries(vec![e]).unwrap();
    let protocol = build_protocol(&manifest, dir.path(), &BuildOptions::default()).unwrap();

    assert_eq!(
        protocol.stages[0].validation,
        vec!["Atom count mismatch across ['prmtop', 'inpcrd']: [64528, 64530]".to_string()]
    );
}

#[test]
fn missing_manifest_files_fail_together() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.mdin", "deck\n &cntrl\n /\n");

    let mut a = entry("first");
    a.paths.mdin = Some(PathBuf::from("a.mdin"));
    a.paths.mdout = Some(PathBuf::from("first.mdout"));
    let mut b = entry("second");
    b.paths.mdcrd = Some(PathBuf::from("second.nc"));

    let manifest = Manifest::from_entries(vec![a, b]).unwrap();
    let err = build_protocol(&manifest, dir.path(), &BuildOptions::default()).unwrap_err();

    let ProtocolError::MissingFiles(missing) = &err else {
        panic!("expected MissingFiles, got {err:?}");
    };
    assert_eq!(missing.len(), 2);
    let message = err.to_string();
    assert!(message.contains("stage 'first', mdout: "));
    assert!(message.contains("stage 'second', mdcrd: "));
}

#[test]
fn auto_detect_links_sequence_predecessors() {
    let dir = TempDir::new().unwrap();
    for stem in ["prod_001", "prod_002", "prod_003"] {
        write_file(
            dir.path(),
            &format!("{stem}.in"),
            &mdin_text(5_000_000, 0.004, 25_000),
        );
    }
    write_file(dir.path(), "prod_001.rst7", &restart_header_text(3, 20_000.0));
    write_file(dir.path(), "prod_002.rst7", &restart_header_text(3, 40_000.0));

    let mut config = DiscoveryConfig::new(dir.path());
    config.auto_detect_restarts = true;
    let protocol = discover(&config).unwrap();

    assert_eq!(protocol.len(), 3);
    let names: Vec<&str> = protocol.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["prod_001", "prod_002", "prod_003"]);

    assert_eq!(protocol.stages[0].restart_path, None);
    assert_eq!(
        protocol.stages[1].restart_path,
        Some(dir.path().join("prod_001.rst7"))
    );
    assert_eq!(
        protocol.stages[2].restart_path,
        Some(dir.path().join("prod_002.rst7"))
    );
    // Deck classification alone makes these production stages.
    assert!(
        protocol
            .stages
            .iter()
            .all(|s| s.role == Some(StageRole::Production))
    );
}

#[test]
fn discovery_orders_and_filters_by_role() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "b_prod.in", &mdin_text(5_000_000, 0.004, 25_000));
    write_file(
        dir.path(),
        "a_min.in",
        "minimize\n &cntrl\n  imin=1, maxcyc=500,\n /\n",
    );
    write_file(dir.path(), "notes.txt", "not a simulation file\n");

    let config = DiscoveryConfig::new(dir.path());
    let protocol = discover(&config).unwrap();
    let names: Vec<&str> = protocol.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a_min", "b_prod"]);
    assert_eq!(protocol.stages[0].role, Some(StageRole::Minimization));

    let mut filtered = DiscoveryConfig::new(dir.path());
    filtered.include_roles = vec![StageRole::Production];
    let protocol = discover(&filtered).unwrap();
    assert_eq!(protocol.len(), 1);
    assert_eq!(protocol.stages[0].name, "b_prod");
}

#[test]
fn grouping_rules_take_priority_over_deck_classification() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "run_a.in", &mdin_text(5_000_000, 0.004, 25_000));

    let mut config = DiscoveryConfig::new(dir.path());
    config.grouping_rules = vec![("^run_".to_string(), StageRole::Equilibration)];
    let protocol = discover(&config).unwrap();
    // The deck says production, the explicit rule wins.
    assert_eq!(protocol.stages[0].role, Some(StageRole::Equilibration));
}

#[test]
fn global_topology_is_shared_across_stages() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "sys.top", &prmtop_text(64528, true));
    write_file(dir.path(), "s1.in", &mdin_text(1_000, 0.002, 100));
    write_file(dir.path(), "s2.in", &mdin_text(1_000, 0.002, 100));

    let mut config = DiscoveryConfig::new(dir.path());
    config.global_topology = Some(dir.path().join("sys.top"));
    config.include_stems = vec!["s1".to_string(), "s2".to_string()];
    let protocol = discover(&config).unwrap();

    assert_eq!(protocol.len(), 2);
    let first = protocol.stages[0].topology.as_ref().unwrap();
    let second = protocol.stages[1].topology.as_ref().unwrap();
    // One parse, two holders.
    assert!(std::sync::Arc::ptr_eq(first, second));
    assert_eq!(first.natom, Some(64528));
}

#[test]
fn validation_runs_once_through_build() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "sys.top", &prmtop_text(64528, false));
    write_file(dir.path(), "start.rst7", &restart_header_text(64530, 0.0));

    let mut e = entry("stage1");
    e.paths.prmtop = Some(PathBuf::from("sys.top"));
    e.paths.inpcrd = Some(PathBuf::from("start.rst7"));

    let manifest = Manifest::from_entries(vec![e]).unwrap();
    let mut protocol = build_protocol(&manifest, dir.path(), &BuildOptions::default()).unwrap();
    mdmeta_protocol::validate::validate(&mut protocol);

    let mismatches = protocol.stages[0]
        .validation
        .iter()
        .filter(|n| n.contains("Atom count mismatch"))
        .count();
    assert_eq!(mismatches, 1);
}

#[test]
fn skip_validation_leaves_notes_empty() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "sys.top", &prmtop_text(64528, false));
    write_file(dir.path(), "start.rst7", &restart_header_text(64530, 0.0));

    let mut e = entry("stage1");
    e.paths.prmtop = Some(PathBuf::from("sys.top"));
    e.paths.inpcrd = Some(PathBuf::from("start.rst7"));

    let manifest = Manifest::from_entries(vec![e]).unwrap();
    let options = BuildOptions {
        skip_cross_stage_validation: true,
    };
    let protocol = build_protocol(&manifest, dir.path(), &options).unwrap();
    assert!(protocol.stages[0].validation.is_empty());
}

#[test]
fn manifest_notes_survive_into_stage() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.mdin", "deck\n &cntrl\n nstlim=100,\n /\n");

    let mut e = entry("stage");
    e.paths.mdin = Some(PathBuf::from("a.mdin"));
    e.notes = Some(mdmeta_protocol::Notes::One(
        "prmtop intentionally omitted".to_string(),
    ));

    let manifest = Manifest::from_entries(vec![e]).unwrap();
    let protocol = build_protocol(&manifest, dir.path(), &BuildOptions::default()).unwrap();
    assert_eq!(
        protocol.stages[0].notes,
        vec!["prmtop intentionally omitted".to_string()]
    );
}
