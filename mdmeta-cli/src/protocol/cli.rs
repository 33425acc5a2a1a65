use clap::{Arg, ArgAction, Command};

pub const PROTOCOL_CMD: &str = "protocol";

pub fn create_protocol_cli() -> Command {
    Command::new(PROTOCOL_CMD)
        .about("Assemble and validate a multi-stage simulation protocol")
        .arg(
            Arg::new("dir")
                .help("Directory to discover simulation files in")
                .required_unless_present("manifest"),
        )
        .arg(
            Arg::new("manifest")
                .long("manifest")
                .short('m')
                .help("Manifest file (YAML, JSON, or TOML); paths resolve against its directory"),
        )
        .arg(
            Arg::new("recursive")
                .long("recursive")
                .short('r')
                .action(ArgAction::SetTrue)
                .help("Recurse into subdirectories during discovery"),
        )
        .arg(
            Arg::new("pattern")
                .long("pattern")
                .help("Only consider file names matching this regex"),
        )
        .arg(
            Arg::new("rule")
                .long("rule")
                .action(ArgAction::Append)
                .value_name("PATTERN=ROLE")
                .help("Stage-name regex to role mapping, first match wins"),
        )
        .arg(
            Arg::new("include-role")
                .long("include-role")
                .action(ArgAction::Append)
                .help("Keep only stages with one of these roles"),
        )
        .arg(
            Arg::new("include-stem")
                .long("include-stem")
                .action(ArgAction::Append)
                .help("Keep only stages with one of these names"),
        )
        .arg(
            Arg::new("restart")
                .long("restart")
                .action(ArgAction::Append)
                .value_name("NAME=PATH")
                .help("Explicit restart file for a stage name or role"),
        )
        .arg(
            Arg::new("auto-restarts")
                .long("auto-restarts")
                .action(ArgAction::SetTrue)
                .help("Score and link restart files to the stages that consume them"),
        )
        .arg(
            Arg::new("global-topology")
                .long("global-topology")
                .help("Topology shared by every stage that lacks one"),
        )
        .arg(
            Arg::new("hmr-topology")
                .long("hmr-topology")
                .help("Topology for stages whose timestep implies repartitioned hydrogens"),
        )
        .arg(
            Arg::new("skip-validation")
                .long("skip-validation")
                .action(ArgAction::SetTrue)
                .help("Skip per-stage and cross-stage validation"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Emit the full serialized protocol as JSON"),
        )
        .arg(
            Arg::new("methods")
                .long("methods")
                .action(ArgAction::SetTrue)
                .conflicts_with("json")
                .help("Emit the pruned methods view as JSON"),
        )
}
