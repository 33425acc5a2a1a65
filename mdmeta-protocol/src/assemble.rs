//! Building a [`Protocol`] from a normalized manifest.

use std::path::Path;
use std::sync::Arc;

use mdmeta_parsers::{input_deck, log, restart, topology, trajectory};

use crate::error::ProtocolError;
use crate::manifest::Manifest;
use crate::protocol::Protocol;
use crate::stage::{FileKind, Stage, StageRole};
use crate::validate;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub skip_cross_stage_validation: bool,
}

/// Parse one artifact into the matching slot of a stage.
pub(crate) fn attach_file(
    stage: &mut Stage,
    kind: FileKind,
    path: &Path,
) -> Result<(), ProtocolError> {
    match kind {
        FileKind::Topology => {
            stage.topology = Some(Arc::new(topology::parse(path)?));
        }
        FileKind::Restart => {
            stage.restart = Some(restart::parse(path)?);
            stage.restart_path = Some(path.to_path_buf());
        }
        FileKind::InputDeck => {
            stage.input_deck = Some(input_deck::parse(path)?);
        }
        FileKind::Log => {
            stage.log = Some(log::parse(path)?);
        }
        FileKind::Trajectory => {
            stage.trajectory = Some(trajectory::parse(path)?);
        }
    }
    Ok(())
}

/// The closed role implied by a deck's descriptive stage classification.
/// Matching is on the leading word: hedged descriptions like "Short
/// production or equilibration" stay unclassified for later layers.
pub(crate) fn role_from_deck(deck: &mdmeta_core::records::InputDeckRecord) -> Option<StageRole> {
    let text = deck.stage_role.to_ascii_lowercase();
    if text.starts_with("energy minimization") {
        Some(StageRole::Minimization)
    } else if text.starts_with("heating") {
        Some(StageRole::Heating)
    } else if text.starts_with("equilibration") || text.starts_with("short restrained equil") {
        Some(StageRole::Equilibration)
    } else if text.starts_with("production") || text.starts_with("long production") {
        Some(StageRole::Production)
    } else {
        None
    }
}

///
/// Build a protocol from a manifest: resolve paths (all missing references
/// fail together, before anything is parsed), parse every referenced file,
/// and validate unless asked not to.
///
/// Stage order is exactly the manifest's order.
///
pub fn build_protocol(
    manifest: &Manifest,
    base_dir: &Path,
    options: &BuildOptions,
) -> Result<Protocol, ProtocolError> {
    let resolved = manifest.resolve(base_dir)?;

    let mut stages = Vec::with_capacity(resolved.len());
    for item in &resolved {
        let mut stage = Stage::new(item.name.clone());
        stage.role = item.entry.stage_role;

        for (kind, path) in &item.paths {
            attach_file(&mut stage, *kind, path)?;
        }
        if stage.role.is_none() {
            stage.role = stage.input_deck.as_ref().and_then(role_from_deck);
        }

        let (expected, tolerance, gap_notes) = item.gap_fields();
        stage.expected_gap_ps = expected;
        stage.gap_tolerance_ps = tolerance;
        if let Some(notes) = item.entry.notes.clone() {
            stage.notes.extend(notes.into_vec());
        }
        stage.notes.extend(gap_notes);

        stages.push(stage);
    }

    let mut protocol = Protocol::new(stages);
    if !options.skip_cross_stage_validation {
        validate::validate(&mut protocol);
    }
    Ok(protocol)
}
