mod inspect;
mod protocol;
mod summary;

use anyhow::Result;
use clap::Command;

pub mod consts {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const BIN_NAME: &str = "mdmeta";
}

fn build_parser() -> Command {
    Command::new(consts::BIN_NAME)
        .bin_name(consts::BIN_NAME)
        .version(consts::VERSION)
        .about("Extract metadata and reproducibility provenance from MD simulation files.")
        .subcommand_required(true)
        .subcommand(inspect::cli::create_topology_cli())
        .subcommand(inspect::cli::create_restart_cli())
        .subcommand(inspect::cli::create_input_cli())
        .subcommand(inspect::cli::create_log_cli())
        .subcommand(inspect::cli::create_traj_cli())
        .subcommand(protocol::cli::create_protocol_cli())
}

fn main() -> Result<()> {
    let app = build_parser();
    let matches = app.get_matches();

    match matches.subcommand() {
        Some((inspect::cli::TOPOLOGY_CMD, matches)) => inspect::handlers::run_topology(matches),
        Some((inspect::cli::RESTART_CMD, matches)) => inspect::handlers::run_restart(matches),
        Some((inspect::cli::INPUT_CMD, matches)) => inspect::handlers::run_input(matches),
        Some((inspect::cli::LOG_CMD, matches)) => inspect::handlers::run_log(matches),
        Some((inspect::cli::TRAJ_CMD, matches)) => inspect::handlers::run_traj(matches),
        Some((protocol::cli::PROTOCOL_CMD, matches)) => protocol::handlers::run_protocol(matches),
        _ => unreachable!("subcommand is required"),
    }
}
