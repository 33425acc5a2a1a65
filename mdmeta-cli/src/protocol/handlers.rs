use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ArgMatches;

use mdmeta_protocol::{
    BuildOptions, DiscoveryConfig, Protocol, StageRole, build_protocol, discover,
};

use crate::protocol::manifest_file::load_manifest;
use crate::summary;

fn collect_pairs(matches: &ArgMatches, id: &str) -> Result<Vec<(String, String)>> {
    matches
        .get_many::<String>(id)
        .unwrap_or_default()
        .map(|raw| {
            raw.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| format!("--{} expects KEY=VALUE, got '{}'", id, raw))
        })
        .collect()
}

fn parse_roles(matches: &ArgMatches, id: &str) -> Result<Vec<StageRole>> {
    matches
        .get_many::<String>(id)
        .unwrap_or_default()
        .map(|raw| raw.parse::<StageRole>().map_err(anyhow::Error::msg))
        .collect()
}

fn build_from_manifest(matches: &ArgMatches, manifest_path: &str) -> Result<Protocol> {
    let path = Path::new(manifest_path);
    let manifest = load_manifest(path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let options = BuildOptions {
        skip_cross_stage_validation: matches.get_flag("skip-validation"),
    };
    Ok(build_protocol(&manifest, base_dir, &options)?)
}

fn build_from_discovery(matches: &ArgMatches, dir: &str) -> Result<Protocol> {
    let mut config = DiscoveryConfig::new(dir);
    config.recursive = matches.get_flag("recursive");
    config.pattern_filter = matches.get_one::<String>("pattern").cloned();
    config.skip_cross_stage_validation = matches.get_flag("skip-validation");
    config.auto_detect_restarts = matches.get_flag("auto-restarts");
    config.global_topology = matches.get_one::<String>("global-topology").map(PathBuf::from);
    config.hmr_topology = matches.get_one::<String>("hmr-topology").map(PathBuf::from);

    for (pattern, role) in collect_pairs(matches, "rule")? {
        let role = role.parse::<StageRole>().map_err(anyhow::Error::msg)?;
        config.grouping_rules.push((pattern, role));
    }
    config.include_roles = parse_roles(matches, "include-role")?;
    config.include_stems = matches
        .get_many::<String>("include-stem")
        .unwrap_or_default()
        .cloned()
        .collect();
    config.restart_files = collect_pairs(matches, "restart")?
        .into_iter()
        .map(|(k, v)| (k, PathBuf::from(v)))
        .collect::<HashMap<_, _>>();

    Ok(discover(&config)?)
}

pub fn run_protocol(matches: &ArgMatches) -> Result<()> {
    let protocol = match matches.get_one::<String>("manifest") {
        Some(manifest_path) => build_from_manifest(matches, manifest_path)?,
        None => {
            let Some(dir) = matches.get_one::<String>("dir") else {
                bail!("either a discovery directory or --manifest is required");
            };
            build_from_discovery(matches, dir)?
        }
    };

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&protocol.to_full_view())?);
    } else if matches.get_flag("methods") {
        println!(
            "{}",
            serde_json::to_string_pretty(&protocol.to_methods_view())?
        );
    } else {
        println!("{}", summary::protocol(&protocol));
    }
    Ok(())
}
