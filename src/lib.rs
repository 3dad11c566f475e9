//! # esp-yaml-config
//!
//! A YAML configuration-document loader for an embedded-firmware build tool:
//! a tag-extended construction pass, a templated string-expansion layer, and a
//! directive evaluator (`!secret`, `!include`, `!for`, `!if`, `!merge`, ...)
//! that together turn a main document plus a constellation of auxiliary
//! documents into one merged, source-annotated tree.
//!
//! ## Design
//!
//! Three mechanisms compose across the API surface: the [`value::AnnotatedValue`]
//! model (every node keeps its source [`origin::Origin`]), the
//! [`environment::Environment`] driving [`expander`] expansion, and the
//! directive table in `directives` invoked from the construction pass
//! (`constructor`). A [`loader::Loader`] owns the per-load [`secrets::SecretRegistry`]
//! and document cache so that multiple concurrent loads never share state —
//! see the crate's design notes on why that state is not a global singleton.
//!
//! ## Example
//!
//! ```rust,no_run
//! use esp_yaml_config::{Environment, Loader};
//! use std::path::Path;
//!
//! let mut loader = Loader::new();
//! let vars = loader.load_vars(Path::new("device.yaml"), &[]).unwrap();
//! let doc = loader.load(Path::new("device.yaml"), true, vars).unwrap();
//! println!("{}", loader.dump(&doc));
//! ```

mod constructor;
mod directives;
mod emit;
mod environment;
mod error;
mod expander;
mod loader;
mod merge;
mod origin;
mod raw;
mod secrets;
mod value;

pub use emit::{dump, secret_scalar};
pub use environment::Environment;
pub use error::{Error, Result};
pub use expander::ExpandError;
pub use loader::{FileReader, FsFileReader, GitFetchSpec, GitFetcher, Loader, UnsupportedGitFetcher};
pub use origin::Origin;
pub use secrets::SecretRegistry;
pub use value::{AnnotatedValue, ValueKind};
