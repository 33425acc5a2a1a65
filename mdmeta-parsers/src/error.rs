use std::path::PathBuf;

use thiserror::Error;

/// Fatal parser failures. Anything recoverable (bad chunk, truncated block,
/// missing backend) lands in the record's `warnings` instead.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Can't read file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        ParseError::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}
