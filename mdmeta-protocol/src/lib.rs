//! Protocol assembly for MD simulation metadata.
//!
//! Single files parse into records (re-exported from `mdmeta-parsers`);
//! this crate groups them into an ordered, validated multi-stage
//! [`Protocol`] — from an explicit [`Manifest`] or by directory discovery —
//! and serializes the result.

pub mod assemble;
pub mod discover;
pub mod error;
pub mod manifest;
pub mod protocol;
pub mod stage;
pub mod validate;
pub mod views;

pub use assemble::{BuildOptions, build_protocol};
pub use discover::{DiscoveryConfig, discover};
pub use error::{MissingFile, ProtocolError};
pub use manifest::{GapSpec, Manifest, ManifestEntry, Notes};
pub use protocol::{Protocol, Totals};
pub use stage::{FileKind, Stage, StageRole, StageSummary};

pub use mdmeta_parsers::input_deck::parse as parse_input_deck;
pub use mdmeta_parsers::log::parse as parse_log;
pub use mdmeta_parsers::restart::parse as parse_restart;
pub use mdmeta_parsers::topology::parse as parse_topology;
pub use mdmeta_parsers::trajectory::parse as parse_trajectory;
