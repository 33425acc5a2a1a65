//! Log parser: one streaming pass over an engine log of arbitrary size.
//!
//! Frame records anchor on lines carrying both `NSTEP =` and `TIME(PS)`;
//! each anchor plus up to nine continuation lines is mined for `key = value`
//! pairs and fed into the streaming aggregates. Summary blocks (averages,
//! RMS fluctuations) are gated off so their repeated key/value lines do not
//! count as frames.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use mdmeta_core::records::LogRecord;

use crate::error::ParseError;

/// Continuation lines folded into one frame record after the anchor.
const FRAME_CONTINUATION_LINES: usize = 9;

fn kv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z0-9_()./-]+)\s*=\s*([-\d.*]+)").unwrap())
}

/// `key = value` pairs from a line. Fortran overflow (`*******`) maps to
/// `None` so a blown-up pressure doesn't poison the statistics.
fn extract_key_values(line: &str) -> HashMap<String, Option<f64>> {
    kv_re()
        .captures_iter(line)
        .map(|caps| {
            let key = caps[1].to_string();
            let raw = caps[2].trim_matches(',');
            let value = if raw.contains('*') {
                None
            } else {
                raw.parse::<f64>().ok()
            };
            (key, value)
        })
        .collect()
}

struct FrameCapture {
    combined: String,
    remaining: usize,
}

pub fn parse(path: &Path) -> Result<LogRecord, ParseError> {
    let file = File::open(path).map_err(|e| ParseError::read(path, e))?;
    let reader = BufReader::new(file);
    let mut record = LogRecord::new(path.to_path_buf());

    let mut in_summary_section = false;
    let mut resource_scan = 0usize;
    let mut capture: Option<FrameCapture> = None;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => {
                record
                    .warnings
                    .push("Non-UTF-8 bytes in log; remainder skipped.".to_string());
                break;
            }
        };

        // A frame in progress swallows following lines until a separator,
        // a blank, or the continuation budget runs out.
        if let Some(cap) = capture.as_mut() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.contains("---") || cap.remaining == 0 {
                let combined = capture.take().unwrap().combined;
                apply_frame(&mut record, &combined);
            } else {
                cap.combined.push(' ');
                cap.combined.push_str(trimmed);
                cap.remaining -= 1;
                continue;
            }
        }

        // Engine identity and run header.
        if line.contains("PMEMD implementation of SANDER")
            || (line.contains("Amber") && line.contains("PMEMD"))
        {
            record.program = "PMEMD".to_string();
        }
        if record.version.is_none() && line.contains("Release") {
            if let Some(rest) = line.split("Release").nth(1) {
                record.version = rest
                    .split_whitespace()
                    .next()
                    .map(|t| t.trim_matches(',').to_string());
            }
        }
        if let Some(rest) = line.strip_prefix("| Run on") {
            record.run_date = Some(rest.trim().to_string());
        }
        if line.contains("CUDA Device Name:") {
            record.gpu_model = line.splitn(2, ':').nth(1).map(|s| s.trim().to_string());
        }

        // The resource-use block carries NATOM/NRES a few lines below its
        // banner.
        if line.contains("RESOURCE   USE") {
            resource_scan = 15;
        } else if resource_scan > 0 {
            resource_scan -= 1;
            if line.contains("CONTROL  DATA") {
                resource_scan = 0;
            } else {
                let kvs = extract_key_values(&line);
                if let Some(Some(v)) = kvs.get("NATOM") {
                    record.natom = Some(*v as usize);
                }
                if let Some(Some(v)) = kvs.get("NRES") {
                    record.nres = Some(*v as usize);
                }
            }
        }

        if line.contains("BOX TYPE:") {
            record.box_type = line.splitn(2, ':').nth(1).map(|s| s.trim().to_string());
        }

        // Control-section captures; the kv scan tolerates the compressed
        // `t = 1000.0, dt = 0.00400` layout.
        if line.contains('=') {
            let lower = line.to_ascii_lowercase();
            if lower.contains("nstlim")
                || lower.contains("dt")
                || lower.contains("cut")
                || lower.contains("ntt")
                || lower.contains("temp0")
                || lower.contains("ntp")
                || lower.contains("ntc")
                || lower.contains("ntwx")
            {
                let kvs = extract_key_values(&line);
                apply_control_values(&mut record, &kvs);
            }
        }

        // Summary-section gating.
        if line.contains("A V E R A G E S") || line.contains("R M S  F L U C T U A T I O N S") {
            in_summary_section = true;
        }
        if line.contains("Final Performance Info") || line.contains("TIMINGS") {
            in_summary_section = false;
        }

        if line.contains("NSTEP =") && line.contains("TIME(PS)") && !in_summary_section {
            capture = Some(FrameCapture {
                combined: line.trim().to_string(),
                remaining: FRAME_CONTINUATION_LINES,
            });
            continue;
        }

        if line.contains("Final Performance Info") {
            record.finished_properly = true;
        }
        if line.contains("ns/day =") {
            if let Some(Some(v)) = extract_key_values(&line).get("ns/day") {
                record.ns_per_day = Some(*v);
            }
        }
        if line.contains("Total wall time:") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if let Some(idx) = parts.iter().position(|p| p.contains("time:")) {
                record.wall_seconds = parts.get(idx + 1).and_then(|t| t.parse::<f64>().ok());
            }
        }
    }

    if let Some(cap) = capture.take() {
        apply_frame(&mut record, &cap.combined);
    }

    Ok(record)
}

fn apply_control_values(record: &mut LogRecord, kvs: &HashMap<String, Option<f64>>) {
    let get = |key: &str| kvs.get(key).copied().flatten();
    if let Some(v) = get("nstlim") {
        record.nstlim = Some(v as i64);
    }
    if let Some(v) = get("dt") {
        record.dt = Some(v);
    }
    if let Some(v) = get("cut") {
        record.cutoff = Some(v);
    }
    if let Some(v) = get("ntt") {
        record.thermostat = Some(thermostat_name(v as i64));
    }
    if let Some(v) = get("temp0") {
        record.target_temp = Some(v);
    }
    if let Some(v) = get("ntp") {
        record.barostat = Some(barostat_name(v as i64));
    }
    if let Some(v) = get("ntc") {
        if v as i64 > 1 {
            record.shake_active = true;
        }
    }
    if let Some(v) = get("ntwx") {
        record.coord_freq = Some(v as i64);
    }
}

fn thermostat_name(ntt: i64) -> String {
    match ntt {
        0 => "Constant Energy (NVE)".to_string(),
        1 => "Berendsen".to_string(),
        2 => "Andersen".to_string(),
        3 => "Langevin".to_string(),
        9 => "Optimized Isokinetic".to_string(),
        10 => "Stochastic Isokinetic".to_string(),
        other => other.to_string(),
    }
}

fn barostat_name(ntp: i64) -> String {
    match ntp {
        0 => "None".to_string(),
        1 => "Berendsen".to_string(),
        2 => "Monte Carlo".to_string(),
        other => other.to_string(),
    }
}

fn apply_frame(record: &mut LogRecord, combined: &str) {
    let kvs = extract_key_values(combined);
    let get = |key: &str| kvs.get(key).copied().flatten();
    let stats = &mut record.stats;

    stats.count += 1;
    if let Some(t) = get("TIME(PS)") {
        if stats.count == 1 {
            stats.time_start = t;
        }
        stats.time_end = t;
    }

    if let Some(v) = get("TEMP(K)") {
        stats.temperature.push(v);
    }
    if let Some(v) = get("PRESS") {
        stats.pressure.push(v);
    }
    if let Some(v) = get("Etot") {
        stats.total_energy.push(v);
    }
    if let Some(v) = get("Density") {
        stats.density.push(v);
        stats.first_density.get_or_insert(v);
        stats.last_density = Some(v);
    }
    if let Some(v) = get("VOLUME") {
        stats.volume.push(v);
        stats.first_volume.get_or_insert(v);
        stats.last_volume = Some(v);
    }

    stats.sum_bond += get("BOND").unwrap_or(0.0);
    stats.sum_angle += get("ANGLE").unwrap_or(0.0);
    stats.sum_dihedral += get("DIHED").unwrap_or(0.0);
    // The 1-4 components match the kv pattern by their trailing token.
    stats.sum_vdw += get("VDWAALS").unwrap_or(0.0) + get("NB").unwrap_or(0.0);
    stats.sum_elec += get("EELEC").unwrap_or(0.0) + get("EEL").unwrap_or(0.0);
}

/// One junction where a log does not pick up where the previous one ended.
#[derive(Debug, Clone)]
pub struct LogGap {
    pub earlier: std::path::PathBuf,
    pub later: std::path::PathBuf,
    pub end_ps: f64,
    pub start_ps: f64,
    pub expected_start_ps: f64,
}

/// Continuity summary over the frame records of several logs.
#[derive(Debug, Clone, Default)]
pub struct LogSequenceSummary {
    pub n_files: usize,
    pub total_frames: u64,
    pub time_start: Option<f64>,
    pub time_end: Option<f64>,
    /// Coverage including one trailing frame interval, ns.
    pub total_ns: Option<f64>,
    pub gaps: Vec<LogGap>,
}

impl LogSequenceSummary {
    pub fn is_continuous(&self) -> bool {
        self.gaps.is_empty()
    }
}

///
/// Order logs by their first frame time and flag junctions where the next
/// log starts away from the previous end plus one frame interval
/// (tolerance: 10% of the interval, at least 0.1 ps).
///
pub fn analyze_sequence(records: &[LogRecord]) -> LogSequenceSummary {
    let mut valid: Vec<&LogRecord> = records.iter().filter(|r| r.stats.count > 0).collect();
    valid.sort_by(|a, b| {
        a.stats
            .time_start
            .partial_cmp(&b.stats.time_start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut summary = LogSequenceSummary {
        n_files: valid.len(),
        total_frames: valid.iter().map(|r| r.stats.count).sum(),
        time_start: valid.first().map(|r| r.stats.time_start),
        time_end: valid.last().map(|r| r.stats.time_end),
        ..Default::default()
    };

    if let (Some(start), Some(end)) = (summary.time_start, summary.time_end) {
        // The reference interval comes from the first multi-frame file.
        let interval = valid
            .iter()
            .map(|r| r.stats.avg_interval_ps())
            .find(|i| *i > 0.0)
            .unwrap_or(0.0);
        summary.total_ns = Some((end - start + interval) / 1000.0);
    }

    for pair in valid.windows(2) {
        let (curr, next) = (pair[0], pair[1]);
        let interval = curr.stats.avg_interval_ps();
        let expected = curr.stats.time_end + interval;
        let actual = next.stats.time_start;
        let diff = actual - expected;
        if diff.abs() > interval * 0.1 && diff.abs() > 0.1 {
            summary.gaps.push(LogGap {
                earlier: curr.path.clone(),
                later: next.path.clone(),
                end_ps: curr.stats.time_end,
                start_ps: actual,
                expected_start_ps: expected,
            });
        }
    }

    summary
}
