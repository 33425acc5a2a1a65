//! Single-file parsers for the five MD artifact kinds.
//!
//! Every parser returns a record with partial data plus warnings for
//! anything recoverable; only I/O failures surface as errors.

pub mod error;
pub mod input_deck;
pub mod log;
pub mod restart;
pub mod topology;
pub mod trajectory;

pub use error::ParseError;
