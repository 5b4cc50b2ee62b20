//! Crate-wide error type for `quill-api`.
//!
//! Follows the pack's convention (see `nervusdb-v2-query/src/error.rs`): a
//! plain enum with a hand-written `Display`, not a derive-macro error type.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A label name failed §6.3 validation.
    InvalidLabelName(String),
    /// A relationship-type name failed §6.3 validation.
    InvalidRelTypeName(String),
    /// A variable name failed §6.3 validation.
    InvalidVariableName(String),
    /// `point(...)` was constructed with an out-of-range latitude/longitude.
    InvalidPointCoordinates(String),
    /// A property value could not be decoded from its encoded form.
    Decode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidLabelName(name) => write!(f, "invalid label name: {name:?}"),
            Error::InvalidRelTypeName(name) => {
                write!(f, "invalid relationship-type name: {name:?}")
            }
            Error::InvalidVariableName(name) => write!(f, "invalid variable name: {name:?}"),
            Error::InvalidPointCoordinates(msg) => write!(f, "invalid point coordinates: {msg}"),
            Error::Decode(msg) => write!(f, "failed to decode value: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
