//! Dataset registry: named simulation/observation datasets and the rules
//! that recognise their files.
//!
//! Loaded once from YAML (templates expanded at load time) and read-only
//! afterwards. Matching files against identifiers is left to consumers.

mod entry;
mod parser;
mod resolver;
mod validate;

use thiserror::Error;

pub use entry::{DatasetEntry, DatasetType, Identifier, MatchMode, NAME_CONTAINS_KEY};
pub use parser::{parse_document, ExpandedDocument, MERGE_KEY};
pub use resolver::{Registry, BUNDLED_REGISTRY};
pub use validate::{
    validate_registry, EntryField, ValidationDiagnostic, ValidationReport, ValidationSeverity,
};

/// Any failure while loading or serialising a registry. Loading is atomic:
/// on error no registry is produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read registry source '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry YAML: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("invalid registry document: {0}")]
    InvalidDocument(String),

    #[error("'{entry}' references undefined template '{template}'")]
    UndefinedTemplate { entry: String, template: String },

    #[error("template '{0}' inherits from itself")]
    TemplateCycle(String),

    #[error("template '{name}' is invalid: {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("entry '{name}' is invalid: {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("entry '{0}' has no identifiers")]
    MissingIdentifiers(String),

    #[error("entry '{entry}' has an invalid identifier '{key}': {reason}")]
    InvalidIdentifier {
        entry: String,
        key: String,
        reason: String,
    },

    #[error("'{key}' is claimed by both '{first}' and '{second}'")]
    DuplicateName {
        key: String,
        first: String,
        second: String,
    },

    #[error("failed to serialise registry: {0}")]
    Serialize(#[source] serde_yaml::Error),
}
