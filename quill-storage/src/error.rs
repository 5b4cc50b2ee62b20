//! Error type for the graph store (spec.md §4.1).

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// `add_edge` was given an endpoint that is not present in `node_by_id`.
    MissingEndpoint { src: u32, dst: u32 },
    /// An operation referenced a node id that does not exist.
    UnknownNode(u32),
    /// An operation referenced an edge id that does not exist.
    UnknownEdge(u32),
    /// Deleting a node with incident edges was attempted without `detach`.
    ConstraintViolation(String),
    Api(quill_api::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingEndpoint { src, dst } => {
                write!(f, "edge endpoint missing: src={src} dst={dst}")
            }
            Error::UnknownNode(id) => write!(f, "unknown node id: {id}"),
            Error::UnknownEdge(id) => write!(f, "unknown edge id: {id}"),
            Error::ConstraintViolation(msg) => write!(f, "constraint violation: {msg}"),
            Error::Api(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<quill_api::Error> for Error {
    fn from(e: quill_api::Error) -> Self {
        Error::Api(e)
    }
}
