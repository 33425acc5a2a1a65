use std::path::Path;

use anyhow::Result;
use clap::ArgMatches;
use serde::Serialize;

use mdmeta_parsers::{input_deck, log, restart, topology, trajectory};

use crate::summary;

fn files(matches: &ArgMatches) -> Vec<&String> {
    matches
        .get_many::<String>("files")
        .expect("at least one input file is required")
        .collect()
}

fn emit<T: Serialize>(matches: &ArgMatches, record: &T, text: String) -> Result<()> {
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

pub fn run_topology(matches: &ArgMatches) -> Result<()> {
    for file in files(matches) {
        let record = topology::parse(Path::new(file))?;
        emit(matches, &record, summary::topology(&record))?;
    }
    Ok(())
}

pub fn run_restart(matches: &ArgMatches) -> Result<()> {
    for file in files(matches) {
        let record = restart::parse(Path::new(file))?;
        emit(matches, &record, summary::restart(&record))?;
    }
    Ok(())
}

pub fn run_input(matches: &ArgMatches) -> Result<()> {
    for file in files(matches) {
        let record = input_deck::parse(Path::new(file))?;
        emit(matches, &record, summary::input_deck(&record))?;
    }
    Ok(())
}

pub fn run_log(matches: &ArgMatches) -> Result<()> {
    let mut records = Vec::new();
    for file in files(matches) {
        let record = log::parse(Path::new(file))?;
        emit(matches, &record, summary::log(&record))?;
        records.push(record);
    }
    if matches.get_flag("sequence") && records.len() > 1 {
        let analysis = log::analyze_sequence(&records);
        println!("{}", summary::log_sequence(&analysis));
    }
    Ok(())
}

pub fn run_traj(matches: &ArgMatches) -> Result<()> {
    let mut records = Vec::new();
    for file in files(matches) {
        let record = trajectory::parse(Path::new(file))?;
        emit(matches, &record, summary::trajectory(&record))?;
        records.push(record);
    }
    if matches.get_flag("sequence") && records.len() > 1 {
        let analysis = trajectory::analyze_sequence(&records);
        println!("{}", summary::trajectory_sequence(&analysis));
    }
    Ok(())
}
