use clap::{Arg, ArgAction, Command};

pub const TOPOLOGY_CMD: &str = "topology";
pub const RESTART_CMD: &str = "restart";
pub const INPUT_CMD: &str = "input";
pub const LOG_CMD: &str = "log";
pub const TRAJ_CMD: &str = "traj";

fn single_file_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(Arg::new("files").required(true).num_args(1..))
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Emit the raw record as JSON instead of a summary"),
        )
}

pub fn create_topology_cli() -> Command {
    single_file_command(TOPOLOGY_CMD, "Summarize topology files (prmtop/parm7)")
}

pub fn create_restart_cli() -> Command {
    single_file_command(RESTART_CMD, "Summarize restart/coordinate files (ASCII or NetCDF)")
}

pub fn create_input_cli() -> Command {
    single_file_command(INPUT_CMD, "Summarize input decks (mdin)")
}

pub fn create_log_cli() -> Command {
    single_file_command(LOG_CMD, "Summarize engine logs (mdout)").arg(
        Arg::new("sequence")
            .long("sequence")
            .action(ArgAction::SetTrue)
            .help("Also analyze the logs as one time-ordered sequence"),
    )
}

pub fn create_traj_cli() -> Command {
    single_file_command(TRAJ_CMD, "Summarize trajectory files (mdcrd/nc)").arg(
        Arg::new("sequence")
            .long("sequence")
            .action(ArgAction::SetTrue)
            .help("Also analyze the files as one time-ordered sequence"),
    )
}
