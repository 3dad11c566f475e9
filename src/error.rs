//! Error kinds for the loader, construction pass, and emitter.

use crate::expander::ExpandError;
use crate::origin::Origin;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of this crate, each carrying source location when one is
/// available. Mirrors the kinds enumerated in the error-handling design: parse,
/// duplicate key, directive type error, missing field, name lookup, template,
/// I/O, and include cycles.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {message}", origin.as_ref().map(ToString::to_string).unwrap_or_default())]
    Parse {
        message: String,
        origin: Option<Origin>,
    },

    #[error(
        "duplicate key {key:?}: first declared at {first}, redeclared at {second}"
    )]
    DuplicateKey {
        key: String,
        first: Origin,
        second: Origin,
    },

    #[error("{}: {message}", origin.as_ref().map(ToString::to_string).unwrap_or_default())]
    TypeError {
        message: String,
        origin: Option<Origin>,
    },

    #[error("{}: {message}", origin.as_ref().map(ToString::to_string).unwrap_or_default())]
    MissingField {
        message: String,
        origin: Option<Origin>,
    },

    #[error("{}: {message}", origin.as_ref().map(ToString::to_string).unwrap_or_default())]
    NameLookup {
        message: String,
        origin: Option<Origin>,
    },

    #[error("{}: {message}", origin.as_ref().map(ToString::to_string).unwrap_or_default())]
    Template {
        message: String,
        origin: Option<Origin>,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        origin: Option<Origin>,
    },

    #[error("include cycle detected: {path}")]
    Cycle { path: String, origin: Option<Origin> },
}

impl Error {
    pub fn parse(message: impl Into<String>, origin: Option<Origin>) -> Self {
        Error::Parse {
            message: message.into(),
            origin,
        }
    }

    pub fn type_error(message: impl Into<String>, origin: Option<Origin>) -> Self {
        Error::TypeError {
            message: message.into(),
            origin,
        }
    }

    pub fn missing_field(message: impl Into<String>, origin: Option<Origin>) -> Self {
        Error::MissingField {
            message: message.into(),
            origin,
        }
    }

    pub fn name_lookup(message: impl Into<String>, origin: Option<Origin>) -> Self {
        Error::NameLookup {
            message: message.into(),
            origin,
        }
    }

    pub fn io(message: impl Into<String>, origin: Option<Origin>) -> Self {
        Error::Io {
            message: message.into(),
            origin,
        }
    }

    pub fn from_expand(err: ExpandError, origin: Option<Origin>) -> Self {
        Error::Template {
            message: err.to_string(),
            origin,
        }
    }
}

impl From<yaml_rust2::ScanError> for Error {
    fn from(err: yaml_rust2::ScanError) -> Self {
        let marker = err.marker();
        Error::Parse {
            message: err.to_string(),
            origin: Some(Origin::new(None, marker.line(), marker.col() + 1)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            origin: None,
        }
    }
}
