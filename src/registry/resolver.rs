//! Read-only dataset registry: loads once, resolves names and aliases.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::config::bundled_resource;
use crate::registry::entry::DatasetEntry;
use crate::registry::parser::{expand_document, parse_document, ExpandedDocument, DATA_KEY, DEFS_KEY};
use crate::registry::ConfigError;

/// Resource name of the registry compiled into the crate.
pub const BUNDLED_REGISTRY: &str = "simulations.yaml";

/// Dataset entries in declaration order with a name/alias index.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<DatasetEntry>,
    index: HashMap<String, usize>,
    templates: Mapping,
}

impl Registry {
    /// Load from any reader; the reader is consumed and dropped before returning.
    pub fn load<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_reader(reader).map_err(ConfigError::Parse)?;
        Self::from_document(expand_document(root)?)
    }

    /// Load a registry file from disk.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::load(file)?;
        info!(path = %path.display(), entries = registry.len(), "loaded dataset registry");
        Ok(registry)
    }

    /// Load a registry file and wrap it for sharing across threads.
    pub fn load_shared(path: impl AsRef<Path>) -> Result<Arc<Self>, ConfigError> {
        Self::load_file(path).map(Arc::new)
    }

    /// Load from YAML text.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Self::from_document(parse_document(source)?)
    }

    /// The registry compiled into the crate.
    pub fn bundled() -> Result<Self, ConfigError> {
        let source = bundled_resource(BUNDLED_REGISTRY).unwrap_or_default();
        let registry = Self::from_yaml_str(source)?;
        debug!(entries = registry.len(), "loaded bundled dataset registry");
        Ok(registry)
    }

    fn from_document(doc: ExpandedDocument) -> Result<Self, ConfigError> {
        let mut registry = Registry {
            entries: Vec::with_capacity(doc.entries.len()),
            index: HashMap::new(),
            templates: doc.templates,
        };
        for (name, body) in doc.entries {
            let entry = DatasetEntry::from_mapping(&name, body)?;
            registry.insert(entry)?;
        }
        Ok(registry)
    }

    /// Register an entry under its name and aliases. Any key already owned by
    /// another entry is a collision.
    fn insert(&mut self, entry: DatasetEntry) -> Result<(), ConfigError> {
        let position = self.entries.len();
        for key in entry.keys() {
            if let Some(&owner) = self.index.get(key) {
                return Err(ConfigError::DuplicateName {
                    key: key.to_string(),
                    first: self.entries[owner].name.clone(),
                    second: entry.name.clone(),
                });
            }
        }
        for key in entry.keys() {
            self.index.insert(key.to_string(), position);
        }
        debug!(
            entry = %entry.name,
            aliases = entry.aliases.len(),
            identifiers = entry.identifiers.len(),
            "registered dataset entry"
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Exact, case-sensitive lookup by canonical name or alias.
    pub fn resolve(&self, name_or_alias: &str) -> Option<&DatasetEntry> {
        self.index
            .get(name_or_alias)
            .map(|&position| &self.entries[position])
    }

    pub fn contains(&self, name_or_alias: &str) -> bool {
        self.index.contains_key(name_or_alias)
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DatasetEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Every name and alias the registry answers to.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw `defs` section as loaded (before expansion into entries).
    pub fn templates(&self) -> &Mapping {
        &self.templates
    }

    /// Entries sharing a unit convention.
    pub fn entries_with_unit_file<'a>(
        &'a self,
        unit_file: &'a str,
    ) -> impl Iterator<Item = &'a DatasetEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.unit_file.as_deref() == Some(unit_file))
    }

    /// Document form with templates already applied to every entry.
    pub fn to_document(&self) -> Mapping {
        let mut data = Mapping::new();
        for entry in &self.entries {
            data.insert(Value::String(entry.name.clone()), Value::Mapping(entry.to_mapping()));
        }
        let mut root = Mapping::new();
        root.insert(Value::String(DEFS_KEY.to_string()), Value::Mapping(Mapping::new()));
        root.insert(Value::String(DATA_KEY.to_string()), Value::Mapping(data));
        root
    }

    /// Serialise back to the configuration format; reloading yields an equal registry.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.to_document()).map_err(ConfigError::Serialize)
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a DatasetEntry;
    type IntoIter = std::slice::Iter<'a, DatasetEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
