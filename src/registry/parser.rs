//! Parses registry YAML and expands templates into each entry.
//!
//! A document has a `defs` section of named templates and a `data` section of
//! entries. An entry (or template) pulls in template fields through the `<<`
//! key, which may name a template, hold a YAML alias (already a mapping once
//! parsed), or list several of either. Explicit keys win over inherited ones;
//! among several bases the earlier one wins.

use std::collections::HashMap;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::registry::entry::scalar_text;
use crate::registry::ConfigError;

pub const DEFS_KEY: &str = "defs";
pub const DATA_KEY: &str = "data";
pub const MERGE_KEY: &str = "<<";

/// Document with templates expanded, entries in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ExpandedDocument {
    pub templates: Mapping,
    pub entries: Vec<(String, Mapping)>,
}

/// Parse YAML text and expand all template references.
pub fn parse_document(source: &str) -> Result<ExpandedDocument, ConfigError> {
    let root: Value = serde_yaml::from_str(source).map_err(ConfigError::Parse)?;
    expand_document(root)
}

/// Expand an already parsed YAML value.
pub fn expand_document(root: Value) -> Result<ExpandedDocument, ConfigError> {
    let Value::Mapping(mut root) = root else {
        return Err(ConfigError::InvalidDocument(
            "top level must be a mapping".to_string(),
        ));
    };

    let templates = match root.remove(DEFS_KEY) {
        None | Some(Value::Null) => Mapping::new(),
        Some(Value::Mapping(defs)) => defs,
        Some(_) => {
            return Err(ConfigError::InvalidDocument(format!(
                "'{DEFS_KEY}' must be a mapping of templates"
            )))
        }
    };

    let data = match root.remove(DATA_KEY) {
        Some(Value::Mapping(data)) => data,
        Some(Value::Null) => Mapping::new(),
        None => {
            return Err(ConfigError::InvalidDocument(format!(
                "missing '{DATA_KEY}' section"
            )))
        }
        Some(_) => {
            return Err(ConfigError::InvalidDocument(format!(
                "'{DATA_KEY}' must be a mapping of dataset entries"
            )))
        }
    };

    let mut expander = TemplateExpander::new(&templates);
    let mut entries = Vec::with_capacity(data.len());
    for (raw_name, body) in &data {
        let name = entry_name(raw_name)?;
        let body = match body {
            Value::Mapping(body) => body,
            Value::Null => {
                return Err(ConfigError::MissingIdentifiers(name));
            }
            _ => {
                return Err(ConfigError::InvalidEntry {
                    name,
                    reason: "entry body must be a mapping".to_string(),
                })
            }
        };
        let expanded = expander.expand(&name, body)?;
        debug!(entry = %name, fields = expanded.len(), "expanded dataset entry");
        entries.push((name, expanded));
    }

    Ok(ExpandedDocument { templates, entries })
}

/// Entry keys are strings; plain scalars such as `2MASS` or `42` are accepted
/// by their textual form.
fn entry_name(raw: &Value) -> Result<String, ConfigError> {
    let Some(name) = scalar_text(raw) else {
        return Err(ConfigError::InvalidEntry {
            name: format!("{raw:?}"),
            reason: "entry key must be a string".to_string(),
        });
    };
    if name.trim().is_empty() {
        return Err(ConfigError::InvalidEntry {
            name,
            reason: "entry key must be a non-empty string".to_string(),
        });
    }
    Ok(name)
}

/// Resolves `<<` references against the `defs` section, memoising templates.
struct TemplateExpander<'a> {
    defs: &'a Mapping,
    resolved: HashMap<String, Mapping>,
}

impl<'a> TemplateExpander<'a> {
    fn new(defs: &'a Mapping) -> Self {
        TemplateExpander {
            defs,
            resolved: HashMap::new(),
        }
    }

    fn expand(&mut self, owner: &str, body: &Mapping) -> Result<Mapping, ConfigError> {
        let mut stack = Vec::new();
        self.expand_mapping(owner, body, &mut stack)
    }

    fn expand_mapping(
        &mut self,
        owner: &str,
        body: &Mapping,
        stack: &mut Vec<String>,
    ) -> Result<Mapping, ConfigError> {
        let mut out = Mapping::new();
        let mut bases: Vec<Mapping> = Vec::new();

        for (key, value) in body {
            if key.as_str() == Some(MERGE_KEY) {
                self.collect_bases(owner, value, stack, &mut bases)?;
            } else {
                out.insert(key.clone(), value.clone());
            }
        }

        for base in bases {
            for (key, value) in base {
                if !out.contains_key(&key) {
                    out.insert(key, value);
                }
            }
        }
        Ok(out)
    }

    fn collect_bases(
        &mut self,
        owner: &str,
        reference: &Value,
        stack: &mut Vec<String>,
        bases: &mut Vec<Mapping>,
    ) -> Result<(), ConfigError> {
        match reference {
            Value::String(template) => bases.push(self.template(owner, template, stack)?),
            Value::Mapping(inline) => bases.push(self.expand_mapping(owner, inline, stack)?),
            Value::Sequence(items) => {
                for item in items {
                    if item.is_sequence() {
                        return Err(ConfigError::InvalidEntry {
                            name: owner.to_string(),
                            reason: format!("nested sequences are not valid under '{MERGE_KEY}'"),
                        });
                    }
                    self.collect_bases(owner, item, stack, bases)?;
                }
            }
            _ => {
                return Err(ConfigError::InvalidEntry {
                    name: owner.to_string(),
                    reason: format!("'{MERGE_KEY}' must name a template or hold a mapping"),
                })
            }
        }
        Ok(())
    }

    fn template(
        &mut self,
        owner: &str,
        name: &str,
        stack: &mut Vec<String>,
    ) -> Result<Mapping, ConfigError> {
        if let Some(done) = self.resolved.get(name) {
            return Ok(done.clone());
        }
        if stack.iter().any(|seen| seen == name) {
            return Err(ConfigError::TemplateCycle(name.to_string()));
        }

        let defs = self.defs;
        let body = match defs.get(name) {
            Some(Value::Mapping(body)) => body,
            Some(_) => {
                return Err(ConfigError::InvalidTemplate {
                    name: name.to_string(),
                    reason: "template must be a mapping".to_string(),
                })
            }
            None => {
                return Err(ConfigError::UndefinedTemplate {
                    entry: owner.to_string(),
                    template: name.to_string(),
                })
            }
        };

        stack.push(name.to_string());
        let expanded = self.expand_mapping(name, body, stack);
        stack.pop();
        let expanded = expanded?;

        debug!(template = %name, "resolved template");
        self.resolved.insert(name.to_string(), expanded.clone());
        Ok(expanded)
    }
}
