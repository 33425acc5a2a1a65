//! Per-stage consistency checks and inter-stage continuity.
//!
//! Everything here produces notes, not errors: callers decide what is
//! disqualifying. The pass is idempotent — note lists and the observed gap
//! are cleared on entry, so running it twice never duplicates anything.

use crate::protocol::Protocol;
use crate::stage::Stage;

/// Two timestamps this close (ps) count as the same instant when no
/// expected gap is declared, absorbing float noise in the time axes.
const FLOAT_NOISE_TOLERANCE_PS: f64 = 1e-6;

pub fn validate(protocol: &mut Protocol) {
    for stage in &mut protocol.stages {
        stage.validation.clear();
        stage.continuity.clear();
        stage.observed_gap_ps = None;
        validate_stage(stage);
    }

    for i in 1..protocol.stages.len() {
        let (earlier, later) = protocol.stages.split_at_mut(i);
        check_continuity(&earlier[i - 1], &mut later[0]);
    }
}

fn validate_stage(stage: &mut Stage) {
    check_atoms(stage);
    check_box(stage);
    check_timing(stage);
    check_sampling(stage);
}

fn check_atoms(stage: &mut Stage) {
    let counts = stage.atom_counts();
    if counts.is_empty() {
        stage
            .validation
            .push("No atom counts available for validation.".to_string());
        return;
    }
    let first = counts[0].1;
    if counts.iter().any(|(_, n)| *n != first) {
        let labels = counts
            .iter()
            .map(|(label, _)| format!("'{}'", label))
            .collect::<Vec<_>>()
            .join(", ");
        let values = counts
            .iter()
            .map(|(_, n)| n.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        stage
            .validation
            .push(format!("Atom count mismatch across [{}]: [{}]", labels, values));
    }
}

fn check_box(stage: &mut Stage) {
    let mut boxes = Vec::new();
    if stage.topology.as_ref().is_some_and(|t| t.has_box()) {
        boxes.push("prmtop");
    }
    if stage.restart.as_ref().is_some_and(|r| r.has_box()) {
        boxes.push("inpcrd");
    }
    if stage.trajectory.as_ref().is_some_and(|t| t.has_box) {
        boxes.push("mdcrd");
    }
    if stage.log.as_ref().is_some_and(|l| l.box_type.is_some()) {
        boxes.push("mdout");
    }
    if boxes.len() == 1 {
        stage.validation.push(format!(
            "Only {} reports box information; check consistency.",
            boxes[0]
        ));
    }
}

fn check_timing(stage: &mut Stage) {
    let deck = stage.input_deck.as_ref();
    let log = stage.log.as_ref();

    let deck_steps = deck.and_then(|d| d.steps());
    let deck_dt = deck.and_then(|d| d.dt_ps());
    let log_steps = log.and_then(|l| l.nstlim);
    let log_dt = log.and_then(|l| l.dt);

    if let (Some(a), Some(b)) = (deck_steps, log_steps) {
        if a != b {
            stage.validation.push(format!(
                "Step count differs between mdin and mdout ({} vs {}).",
                a, b
            ));
        }
    }
    if let (Some(a), Some(b)) = (deck_dt, log_dt) {
        if (a - b).abs() > f64::EPSILON {
            stage.validation.push(format!(
                "Timestep differs between mdin and mdout ({} vs {}).",
                a, b
            ));
        }
    }

    // Planned duration vs what the trajectory actually spans. A trajectory
    // of N frames covers one frame interval less than the planned run, so
    // the tolerance includes the frame spacing.
    if let (Some(planned), Some(traj)) = (stage.planned_duration_ps(), stage.trajectory.as_ref())
    {
        if let Some(covered) = traj.duration_ps() {
            let tolerance = [1e-6, traj.avg_dt_ps.unwrap_or(0.0), stage.dt_ps().unwrap_or(0.0)]
                .into_iter()
                .fold(f64::MIN, f64::max);
            // The planned duration is a float product; give the boundary a
            // hair of slack so steps*dt landing exactly one frame interval
            // short does not trip on representation error.
            if (planned - covered).abs() - tolerance > 1e-9 {
                stage.validation.push(format!(
                    "Trajectory covers {:.3} ps but mdin declares {:.3} ps.",
                    covered, planned
                ));
            }
        }
    }
}

fn check_sampling(stage: &mut Stage) {
    let deck_freq = stage
        .input_deck
        .as_ref()
        .and_then(|d| d.coord_freq.as_int());
    let log_freq = stage.log.as_ref().and_then(|l| l.coord_freq);
    if let (Some(a), Some(b)) = (deck_freq, log_freq) {
        if a != b {
            stage.validation.push(format!(
                "Coordinate write frequency differs between mdin and mdout ({} vs {}).",
                a, b
            ));
        }
    }
}

///
/// Continuity between consecutive stages: the later stage's restart time
/// against the earlier stage's trajectory end.
///
/// Without a declared expected gap, anything within one frame interval of
/// the earlier trajectory collapses to zero (a restart written one write
/// interval after the final frame is continuous, not a gap).
///
fn check_continuity(earlier: &Stage, later: &mut Stage) {
    let end = earlier.trajectory.as_ref().and_then(|t| t.time_end);
    let start = later.restart.as_ref().and_then(|r| r.time_ps);

    let (end, start) = match (end, start) {
        (Some(end), Some(start)) => (end, start),
        (Some(_), None) => {
            later.continuity.push(
                "Continuity with previous stage cannot be verified (restart time unknown)."
                    .to_string(),
            );
            return;
        }
        (None, Some(_)) => {
            later.continuity.push(
                "Continuity with previous stage cannot be verified (previous trajectory end unknown)."
                    .to_string(),
            );
            return;
        }
        (None, None) => return,
    };

    let mut gap = start - end;

    if later.expected_gap_ps.is_none() {
        let frame_interval = earlier
            .trajectory
            .as_ref()
            .and_then(|t| t.avg_dt_ps)
            .or_else(|| earlier.dt_ps());
        let collapse = frame_interval
            .unwrap_or(0.0)
            .max(FLOAT_NOISE_TOLERANCE_PS);
        if gap.abs() <= collapse {
            gap = 0.0;
        }
    }

    later.observed_gap_ps = Some(gap);

    if gap < 0.0 {
        later.continuity.push(format!(
            "Stage overlaps previous one: starts {:.4} ps before the previous trajectory ends.",
            -gap
        ));
    } else if gap > 0.0 && later.expected_gap_ps.is_none() {
        later.continuity.push(format!(
            "Gap of {:.4} ps between previous trajectory end ({:.4} ps) and restart ({:.4} ps).",
            gap, end, start
        ));
    }

    if let Some(expected) = later.expected_gap_ps {
        let tolerance = later.gap_tolerance_ps.unwrap_or(FLOAT_NOISE_TOLERANCE_PS);
        if (gap - expected).abs() <= tolerance {
            later.continuity.push(format!(
                "Observed gap {:.4} ps is within the expected {:.4} ± {:.4} ps.",
                gap, expected, tolerance
            ));
        } else {
            later.continuity.push(format!(
                "Observed gap {:.4} ps is outside the expected {:.4} ± {:.4} ps.",
                gap, expected, tolerance
            ));
        }
    }
}
