//! Load strictly formatted `KEY=value` files into the environment.
//!
//! Every line is trimmed and matched against `^([a-zA-Z][a-zA-Z0-9_]+)=(.*)$`.
//! Matching lines become entries with the value kept verbatim; blank lines,
//! `#` comments and anything else are skipped without error.
//!
//! [`EnvLoader::load`] writes into an in-memory map by default, and
//! [`read_file`] returns the extracted mapping without applying it.
//! [`load`] applies entries to the process environment directly and is
//! `unsafe`, because callers must guarantee no concurrent process-environment
//! access.

mod env;
mod error;
mod loader;
mod model;
mod parser;

pub use env::TargetEnv;
pub use error::{Error, SetVarReason};
pub use loader::{EnvLoader, load, read_file};
pub use model::{Entry, LoadReport};
pub use parser::{parse_line, parse_reader, parse_str};
