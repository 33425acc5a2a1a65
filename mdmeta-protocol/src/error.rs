use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::stage::FileKind;

/// One manifest reference that does not exist on disk.
#[derive(Debug, Clone)]
pub struct MissingFile {
    pub stage: String,
    pub kind: FileKind,
    pub path: PathBuf,
}

impl fmt::Display for MissingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage '{}', {}: {}",
            self.stage,
            self.kind.manifest_key(),
            self.path.display()
        )
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Every missing reference in the manifest, reported together.
    #[error("Manifest references missing files: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    MissingFiles(Vec<MissingFile>),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid discovery pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error(transparent)]
    Parse(#[from] mdmeta_parsers::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
