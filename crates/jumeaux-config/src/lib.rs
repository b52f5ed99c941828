//! Layered configuration for jumeaux
//!
//! A run is configured by an ordered list of YAML documents: a base file,
//! any number of override files, and finally the command-line arguments.
//! Each document is a partial [`ConfigDocument`]; [`resolve`] folds them
//! into one immutable [`jumeaux_core::RunConfig`].
//!
//! The YAML loader supports two custom tags:
//!
//! - `!include path` - Splice another YAML file
//! - `!env_var VAR` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use jumeaux_config::{load_documents, report_key, resolve, InputSource};
//!
//! let documents = load_documents(&["config.yml", "override.yml"])?;
//! let config = resolve(&documents)?;
//! let inputs = vec![InputSource::read("requests.txt")?];
//! let key = report_key(&config, &inputs);
//! ```

mod document;
mod error;
mod key;
mod loader;
mod resolver;

pub use document::{ConfigDocument, EndpointPatch, Merge, MergeMode, OutputPatch, PipelinePatch};
pub use error::{ConfigError, ConfigResult};
pub use key::{report_key, InputSource};
pub use loader::{document_from_value, load_documents, YamlLoader};
pub use resolver::{resolve, resolve_from_report, DEFAULT_MAX_RETRIES};
