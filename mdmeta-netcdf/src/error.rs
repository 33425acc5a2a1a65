use thiserror::Error;

#[derive(Error, Debug)]
pub enum NcError {
    #[error("Not a classic NetCDF file (bad magic)")]
    BadMagic,

    #[error("Unsupported NetCDF format version byte: {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported external type id: {0}")]
    UnsupportedType(u32),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("No such variable: {0}")]
    NoSuchVariable(String),

    #[error("Variable {name} is too large to materialize ({elements} elements)")]
    VariableTooLarge { name: String, elements: usize },

    #[error("No NetCDF backend is available: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
