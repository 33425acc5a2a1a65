//! Human-readable summaries of parsed records.

use std::fmt::Write as _;

use mdmeta_core::records::{
    InputDeckRecord, LogRecord, RestartRecord, TopologyRecord, TrajectoryRecord,
};
use mdmeta_parsers::trajectory::SequenceSummary;
use mdmeta_protocol::Protocol;

fn basename(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn push_warnings(out: &mut String, warnings: &[String]) {
    if !warnings.is_empty() {
        out.push_str("Warnings:\n");
        for w in warnings {
            writeln!(out, "  - {}", w).unwrap();
        }
    }
}

pub fn topology(record: &TopologyRecord) -> String {
    let mut s = String::new();
    writeln!(
        s,
        "File: {} ({})",
        basename(&record.path),
        record.version.as_deref().unwrap_or("unknown version")
    )
    .unwrap();
    writeln!(s, "Title: {}", record.title.as_deref().unwrap_or("N/A")).unwrap();

    s.push_str("\n[System Properties]\n");
    let fmt_count = |n: Option<usize>| n.map_or("unknown".to_string(), |v| v.to_string());
    writeln!(s, "  Atoms:    {}", fmt_count(record.natom)).unwrap();
    writeln!(s, "  Residues: {}", fmt_count(record.nres)).unwrap();
    writeln!(s, "  Mass:     {:.2} Da", record.total_mass).unwrap();
    writeln!(
        s,
        "  Charge:   {:.4} e ({})",
        record.total_charge,
        if record.is_neutral { "Neutral" } else { "Charged" }
    )
    .unwrap();

    s.push_str("\n[Simulation Environment]\n");
    writeln!(s, "  Category: {}", record.simulation_category).unwrap();
    if let (Some([a, b, c]), Some(volume)) = (record.box_lengths, record.box_volume) {
        writeln!(s, "  Dims:     {:.2} x {:.2} x {:.2} A", a, b, c).unwrap();
        writeln!(s, "  Volume:   {:.2} A^3", volume).unwrap();
        if let Some(density) = record.density {
            writeln!(s, "  Density:  {:.4} g/cc", density).unwrap();
        }
    }

    if record.force_field_type.is_some() || !record.force_field_features.is_empty() {
        s.push_str("\n[Force Field]\n");
        if let Some(fft) = &record.force_field_type {
            writeln!(s, "  Type:     {}", fft).unwrap();
        }
        if !record.force_field_features.is_empty() {
            writeln!(s, "  Features: {}", record.force_field_features.join(", ")).unwrap();
        }
    }
    if let Some(summary) = &record.hmr_summary {
        writeln!(
            s,
            "  H masses: {} (HMR {})",
            summary,
            if record.hmr_active == Some(true) {
                "active"
            } else {
                "inactive"
            }
        )
        .unwrap();
    }

    push_warnings(&mut s, &record.warnings);
    s
}

pub fn restart(record: &RestartRecord) -> String {
    let mut s = String::new();
    writeln!(s, "File: {}", basename(&record.path)).unwrap();
    writeln!(s, "Format: {}", record.format.as_str()).unwrap();
    if let Some(program) = &record.program {
        writeln!(
            s,
            "Program: {} {}",
            program,
            record.program_version.as_deref().unwrap_or("")
        )
        .unwrap();
    }
    writeln!(s, "Title: {}", record.title.as_deref().unwrap_or("N/A")).unwrap();
    writeln!(
        s,
        "Atoms: {}",
        record.natom.map_or("unknown".to_string(), |n| n.to_string())
    )
    .unwrap();
    match record.time_ps {
        Some(t) => writeln!(s, "Time:  {:.4} ps", t).unwrap(),
        None => s.push_str("Time:  N/A\n"),
    }

    let mut contents = Vec::new();
    if record.has_coordinates {
        contents.push("Coordinates");
    }
    if record.has_velocities {
        contents.push("Velocities");
    }
    if record.has_forces {
        contents.push("Forces");
    }
    writeln!(s, "Contains: {}", contents.join(", ")).unwrap();

    match &record.periodic_box {
        Some(b) => {
            s.push_str("Box Type: Periodic\n");
            writeln!(
                s,
                "  Dimensions: {:.4}  {:.4}  {:.4} A",
                b.lengths[0], b.lengths[1], b.lengths[2]
            )
            .unwrap();
            writeln!(
                s,
                "  Angles:     {:.4}  {:.4}  {:.4} degrees",
                b.angles[0], b.angles[1], b.angles[2]
            )
            .unwrap();
            writeln!(s, "  Volume:     {:.2} A^3", b.volume).unwrap();
        }
        None => s.push_str("Box Type: None (Vacuum / Infinite)\n"),
    }

    push_warnings(&mut s, &record.warnings);
    s
}

pub fn input_deck(record: &InputDeckRecord) -> String {
    let mut s = String::new();
    writeln!(s, "File: {}", basename(&record.path)).unwrap();
    writeln!(s, "Title: {}", record.title).unwrap();
    writeln!(s, "Simulation type: {}", record.simulation_type).unwrap();
    writeln!(s, "Stage role: {}", record.stage_role).unwrap();
    writeln!(s, "Ensemble: {}", record.ensemble).unwrap();

    match (record.steps(), record.dt_ps()) {
        (Some(steps), Some(dt)) => writeln!(
            s,
            "Length: {} steps ({:.3} ns, dt={} ps)",
            steps,
            steps as f64 * dt / 1000.0,
            dt
        )
        .unwrap(),
        _ => writeln!(
            s,
            "Length: {} (dt={})",
            record
                .length_steps
                .as_ref()
                .map_or("unset".to_string(), |v| v.to_string()),
            record.dt
        )
        .unwrap(),
    }

    writeln!(
        s,
        "Conditions: T={} K ({}); {}; Pressure: {}; Cutoff: {} A; Constraints: {}",
        record.target_temp,
        record.thermostat,
        record.pbc,
        record.barostat,
        record.cutoff,
        record.constraints
    )
    .unwrap();
    writeln!(
        s,
        "Output: E every {} steps, coords every {} steps, restart every {} steps, traj format: {}",
        record.energy_freq, record.coord_freq, record.restart_freq, record.traj_format
    )
    .unwrap();

    let f = &record.features;
    let mut feats = Vec::new();
    if f.restraints_active {
        feats.push("positional restraints".to_string());
    }
    if f.nmr_options {
        feats.push("NMR / &wt options".to_string());
    }
    if f.qmmm_active {
        feats.push("QM/MM".to_string());
    }
    if let Some(gb) = &f.implicit_solvent {
        feats.push(gb.clone());
    }
    if f.has_temp_ramp {
        feats.push("TEMP0 schedule".to_string());
    }
    if f.has_restraint_schedule {
        feats.push("restraint-weight schedule".to_string());
    }
    if f.has_cutoff_schedule {
        feats.push("cutoff schedule".to_string());
    }
    if f.uses_free_energy {
        feats.push("free energy / TI / MBAR".to_string());
    }
    if f.uses_constant_ph {
        feats.push("constant pH MD".to_string());
    }
    if f.uses_constant_redox {
        feats.push("constant redox MD".to_string());
    }
    if f.uses_gamd {
        feats.push("Gaussian Accelerated MD".to_string());
    }
    if f.uses_remd {
        feats.push("Replica Exchange MD".to_string());
    }
    if !feats.is_empty() {
        writeln!(s, "Features: {}", feats.join("; ")).unwrap();
    }

    for entry in &record.weight_schedules {
        if entry.is_terminal() {
            continue;
        }
        let fmt = |v: &Option<mdmeta_core::ParamValue>| {
            v.as_ref().map_or("?".to_string(), |x| x.to_string())
        };
        writeln!(
            s,
            "&wt {}: {} -> {} (steps {}-{})",
            entry.quantity,
            fmt(&entry.value1),
            fmt(&entry.value2),
            fmt(&entry.istep1),
            fmt(&entry.istep2)
        )
        .unwrap();
    }

    if !record.restraint_definitions.is_empty() {
        writeln!(
            s,
            "Restraints section: {} lines (starts with: '{}')",
            record.restraint_definitions.len(),
            record.restraint_definitions[0]
        )
        .unwrap();
    }

    push_warnings(&mut s, &record.warnings);
    s
}

pub fn log(record: &LogRecord) -> String {
    let mut s = String::new();
    writeln!(s, "File: {}", basename(&record.path)).unwrap();
    writeln!(
        s,
        "Program: {} {} ({})",
        record.program,
        record.version.as_deref().unwrap_or("unknown"),
        record.run_date.as_deref().unwrap_or("date unknown")
    )
    .unwrap();
    if let Some(gpu) = &record.gpu_model {
        writeln!(s, "Hardware: GPU ({})", gpu).unwrap();
    }
    writeln!(
        s,
        "System: {} atoms, {} residues ({})",
        record.natom.map_or("?".to_string(), |n| n.to_string()),
        record.nres.map_or("?".to_string(), |n| n.to_string()),
        record.box_type.as_deref().unwrap_or("no box reported")
    )
    .unwrap();

    let mut config = format!(
        "{} | dt={} ps | cut={} A",
        record.run_type,
        record.dt.map_or("?".to_string(), |v| v.to_string()),
        record.cutoff.map_or("?".to_string(), |v| v.to_string())
    );
    if record.shake_active {
        config.push_str(" | SHAKE");
    }
    writeln!(s, "Config: {}", config).unwrap();

    if let (Some(nstlim), Some(dt)) = (record.nstlim, record.dt) {
        writeln!(
            s,
            "Protocol: {} steps ({:.3} ns)",
            nstlim,
            nstlim as f64 * dt / 1000.0
        )
        .unwrap();
    }

    let st = &record.stats;
    if st.count > 0 {
        writeln!(s, "Statistics ({} frames):", st.count).unwrap();
        writeln!(
            s,
            "  Time:    {:.1} -> {:.1} ps (true coverage: {:.3} ns)",
            st.time_start,
            st.time_end,
            st.true_coverage_ns()
        )
        .unwrap();
        if let Some((mean, stdev)) = st.temperature.summary() {
            writeln!(s, "  Temp:    {:.2} +/- {:.2} K", mean, stdev).unwrap();
        }
        if let Some((mean, stdev)) = st.pressure.summary() {
            writeln!(s, "  Press:   {:.1} +/- {:.1} bar", mean, stdev).unwrap();
        }
        if let Some((mean, stdev)) = st.density.summary() {
            writeln!(s, "  Density: {:.4} +/- {:.4} g/cc", mean, stdev).unwrap();
        }
        if let Some((mean, stdev)) = st.total_energy.summary() {
            writeln!(s, "  Etot:    {:.1} +/- {:.1} kcal/mol", mean, stdev).unwrap();
        }
    }

    if record.finished_properly {
        s.push_str("Status: Finished correctly\n");
        if let Some(nsday) = record.ns_per_day {
            writeln!(s, "Performance: {:.2} ns/day", nsday).unwrap();
        }
        if let Some(wall) = record.wall_seconds {
            writeln!(s, "Wall time: {:.2} hours", wall / 3600.0).unwrap();
        }
    } else {
        s.push_str("Status: Incomplete / crashed\n");
    }

    push_warnings(&mut s, &record.warnings);
    s
}

pub fn trajectory(record: &TrajectoryRecord) -> String {
    let mut s = String::new();
    writeln!(
        s,
        "File: {} [{}]",
        basename(&record.path),
        record.format.as_str()
    )
    .unwrap();
    writeln!(
        s,
        "  Atoms:  {}",
        record.natom.map_or("?".to_string(), |n| n.to_string())
    )
    .unwrap();
    writeln!(s, "  Frames: {}", record.n_frames).unwrap();
    if let (Some(start), Some(end)) = (record.time_start, record.time_end) {
        writeln!(
            s,
            "  Time:   {:.1} -> {:.1} ps (dt={})",
            start,
            end,
            record
                .avg_dt_ps
                .map_or("?".to_string(), |dt| format!("{:.3}", dt))
        )
        .unwrap();
    }
    if let Some((vmin, vmax, vavg)) = record.volume_stats {
        writeln!(
            s,
            "  Volume: {:.1} A^3 (range {:.1}-{:.1}) [{:?}]",
            vavg,
            vmin,
            vmax,
            record.box_shape.expect("volume implies a box")
        )
        .unwrap();
    }
    if let Some(remd) = &record.remd {
        writeln!(s, "  REMD:   {}", remd.kinds.join(", ")).unwrap();
        if let Some((tmin, tmax, tavg)) = remd.temp_range {
            writeln!(
                s,
                "  Temp0:  avg {:.1} K (range {:.1}-{:.1} K)",
                tavg, tmin, tmax
            )
            .unwrap();
        }
    }
    push_warnings(&mut s, &record.warnings);
    s
}

pub fn log_sequence(summary: &mdmeta_parsers::log::LogSequenceSummary) -> String {
    let mut s = String::new();
    writeln!(
        s,
        "--- Production Sequence Analysis ({} files) ---",
        summary.n_files
    )
    .unwrap();
    if let (Some(start), Some(end)) = (summary.time_start, summary.time_end) {
        writeln!(s, "Timeline: {:.1} to {:.1} ps", start, end).unwrap();
    }
    if let Some(ns) = summary.total_ns {
        writeln!(
            s,
            "Total simulation time: {:.3} ns ({} frames)",
            ns, summary.total_frames
        )
        .unwrap();
    }
    for gap in &summary.gaps {
        writeln!(
            s,
            "  [Gap] {} ends {:.1} | {} starts {:.1} (expected ~{:.1})",
            basename(&gap.earlier),
            gap.end_ps,
            basename(&gap.later),
            gap.start_ps,
            gap.expected_start_ps
        )
        .unwrap();
    }
    if summary.is_continuous() {
        s.push_str("Continuity: Continuous\n");
    } else {
        writeln!(s, "Continuity: {} discontinuities detected", summary.gaps.len()).unwrap();
    }
    s
}

pub fn trajectory_sequence(summary: &SequenceSummary) -> String {
    let mut s = String::new();
    writeln!(s, "--- Sequence Analysis ({} files) ---", summary.n_files).unwrap();
    writeln!(s, "Total frames: {}", summary.total_frames).unwrap();
    if let (Some(start), Some(end)) = (summary.time_start, summary.time_end) {
        writeln!(s, "Time coverage: {:.2} to {:.2} ps", start, end).unwrap();
    }
    if let Some(ns) = summary.total_ns() {
        writeln!(s, "Total duration: {:.3} ns", ns).unwrap();
    }
    for gap in &summary.gaps {
        writeln!(
            s,
            "  [Gap/Overlap] {} ends {:.2} | {} starts {:.2} (expected ~{:.2})",
            basename(&gap.earlier),
            gap.end_ps,
            basename(&gap.later),
            gap.start_ps,
            gap.expected_start_ps
        )
        .unwrap();
    }
    if summary.is_continuous() {
        s.push_str("Status: Continuous (no gaps detected)\n");
    } else {
        writeln!(s, "Status: {} discontinuities found", summary.gaps.len()).unwrap();
    }
    if let Some(vol) = summary.global_avg_volume {
        writeln!(s, "Global avg volume: {:.2} A^3", vol).unwrap();
    }
    s
}

pub fn protocol(protocol: &Protocol) -> String {
    let mut s = String::new();
    writeln!(s, "Protocol summary ({} stages):", protocol.len()).unwrap();
    for (idx, stage) in protocol.stages.iter().enumerate() {
        let summary = stage.summary();
        writeln!(
            s,
            "  {}. {}: {} [{}]",
            idx + 1,
            stage.name,
            summary.intent,
            summary.result
        )
        .unwrap();
        if let Some(deck) = &stage.input_deck {
            writeln!(
                s,
                "     mdin: steps={}, dt={} ps, ensemble={}",
                deck.length_steps
                    .as_ref()
                    .map_or("unset".to_string(), |v| v.to_string()),
                deck.dt,
                deck.ensemble
            )
            .unwrap();
        }
        if let Some(log) = &stage.log {
            let st = &log.stats;
            if st.count > 0 {
                writeln!(
                    s,
                    "     mdout: frames={}, time={:.0}-{:.0} ps, status={}",
                    st.count,
                    st.time_start,
                    st.time_end,
                    if log.finished_properly {
                        "complete"
                    } else {
                        "incomplete"
                    }
                )
                .unwrap();
            }
        }
        if let Some(gap) = stage.observed_gap_ps {
            writeln!(s, "     gap from previous stage: {:.4} ps", gap).unwrap();
        }
        for note in stage.validation.iter().chain(&stage.continuity) {
            writeln!(s, "     [note] {}", note).unwrap();
        }
        for note in &stage.notes {
            writeln!(s, "     [manifest] {}", note).unwrap();
        }
    }

    let totals = protocol.totals();
    writeln!(
        s,
        "Totals: {} steps, {:.3} ns",
        totals.steps,
        totals.time_ps / 1000.0
    )
    .unwrap();
    s
}
