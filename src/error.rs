use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned while loading an env file.
///
/// Variants name the offending path or key but never a value, since values
/// routinely hold secrets.
#[derive(Debug, Error)]
pub enum Error {
    /// The file does not exist and the caller asked for it to be required.
    #[error("env file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The file exists but could not be opened.
    #[error("failed to open env file {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading failed after the file was opened.
    #[error("failed to read env file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target environment rejected an entry.
    #[error("failed to set environment variable {key:?}: {reason}")]
    SetVar { key: String, reason: SetVarReason },
}

/// Why an entry could not be written to the target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetVarReason {
    EmptyKey,
    KeyContainsEquals,
    KeyContainsNul,
    ValueContainsNul,
    /// The line matched but its value is not valid UTF-8 (e.g. Latin-1 text).
    ValueNotUtf8,
}

impl Display for SetVarReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "key is empty"),
            Self::KeyContainsEquals => write!(f, "key contains '='"),
            Self::KeyContainsNul => write!(f, "key contains a NUL byte"),
            Self::ValueContainsNul => write!(f, "value contains a NUL byte"),
            Self::ValueNotUtf8 => write!(f, "value is not valid UTF-8"),
        }
    }
}
