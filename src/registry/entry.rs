//! Typed dataset entries and their identifier rules.
//!
//! Entries are built from an already template-expanded YAML mapping; see
//! [`crate::registry::parser`] for the expansion step.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::registry::ConfigError;

/// Identifier key holding a path substring rule.
pub const NAME_CONTAINS_KEY: &str = "name_contains";

/// Simulation code family tag (`type:` in YAML).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Series,
    Dataset,
}

impl DatasetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Dataset => "dataset",
        }
    }
}

/// How a [`Identifier::FieldMatches`] rule compares its content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Exact,
    Substring,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "exact" => Some(Self::Exact),
            "substring" => Some(Self::Substring),
            _ => None,
        }
    }
}

/// One predicate used to recognise a dataset's files. All identifiers of an
/// entry must hold together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identifier {
    /// The file path contains `substring`.
    PathContains { substring: String },
    /// Metadata attribute `section.field` equals `value`.
    FieldEquals {
        section: String,
        field: String,
        value: Value,
    },
    /// Metadata attribute `section.field` matches `content` under `mode`.
    FieldMatches {
        section: String,
        field: String,
        content: String,
        mode: MatchMode,
    },
}

impl Identifier {
    /// Metadata section the rule reads, `None` for path rules.
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::PathContains { .. } => None,
            Self::FieldEquals { section, .. } | Self::FieldMatches { section, .. } => {
                Some(section.as_str())
            }
        }
    }
}

/// A named dataset with its identification rules and unit convention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<DatasetType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_file: Option<String>,
    pub identifiers: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Fields the registry does not interpret, kept for serialisation.
    #[serde(skip_serializing_if = "Mapping::is_empty")]
    pub extra: Mapping,
}

/// Shape of an expanded entry as written in YAML.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    aliases: Vec<Value>,
    #[serde(rename = "type", default)]
    dataset_type: Option<DatasetType>,
    #[serde(default)]
    unitfile: Option<String>,
    #[serde(default)]
    identifiers: Option<Mapping>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    suite: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(flatten)]
    extra: Mapping,
}

/// Text of a scalar key: strings as written, numbers and booleans in their
/// YAML spelling. Null, sequences and mappings have none.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl DatasetEntry {
    /// Build an entry from its template-expanded mapping.
    pub fn from_mapping(name: &str, mapping: Mapping) -> Result<Self, ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidEntry {
                name: name.to_string(),
                reason: "entry key must be a non-empty string".to_string(),
            });
        }

        let raw: RawEntry = serde_yaml::from_value(Value::Mapping(mapping)).map_err(|err| {
            ConfigError::InvalidEntry {
                name: name.to_string(),
                reason: err.to_string(),
            }
        })?;

        let identifiers = match raw.identifiers {
            Some(rules) => parse_identifiers(name, &rules)?,
            None => Vec::new(),
        };
        if identifiers.is_empty() {
            return Err(ConfigError::MissingIdentifiers(name.to_string()));
        }

        let mut aliases: Vec<String> = Vec::with_capacity(raw.aliases.len());
        for alias in &raw.aliases {
            let Some(alias) = scalar_text(alias).filter(|alias| !alias.trim().is_empty()) else {
                return Err(ConfigError::InvalidEntry {
                    name: name.to_string(),
                    reason: format!("alias {alias:?} must be a non-empty scalar"),
                });
            };
            if alias != name && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        Ok(DatasetEntry {
            name: name.to_string(),
            aliases,
            dataset_type: raw.dataset_type,
            unit_file: raw.unitfile,
            identifiers,
            code: raw.code,
            suite: raw.suite,
            tags: raw.tags,
            extra: raw.extra,
        })
    }

    /// Serialise back into the configuration shape (no templates).
    pub fn to_mapping(&self) -> Mapping {
        let mut out = Mapping::new();
        if !self.aliases.is_empty() {
            out.insert(key("aliases"), string_seq(&self.aliases));
        }
        if let Some(kind) = self.dataset_type {
            out.insert(key("type"), key(kind.as_str()));
        }
        if let Some(unit_file) = &self.unit_file {
            out.insert(key("unitfile"), key(unit_file));
        }
        if let Some(code) = &self.code {
            out.insert(key("code"), key(code));
        }
        if let Some(suite) = &self.suite {
            out.insert(key("suite"), key(suite));
        }
        if !self.tags.is_empty() {
            out.insert(key("tags"), string_seq(&self.tags));
        }
        out.insert(key("identifiers"), Value::Mapping(identifiers_to_mapping(&self.identifiers)));
        for (k, v) in &self.extra {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    /// True if every identifier is a path rule (no metadata available).
    pub fn is_path_only(&self) -> bool {
        self.identifiers
            .iter()
            .all(|rule| matches!(rule, Identifier::PathContains { .. }))
    }

    /// Canonical name followed by aliases.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

fn key(value: &str) -> Value {
    Value::String(value.to_string())
}

fn string_seq(values: &[String]) -> Value {
    Value::Sequence(values.iter().map(|v| key(v)).collect())
}

fn invalid_identifier(entry: &str, rule: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidIdentifier {
        entry: entry.to_string(),
        key: rule.to_string(),
        reason: reason.into(),
    }
}

/// Parse an `identifiers:` mapping into typed rules, preserving order.
fn parse_identifiers(entry: &str, rules: &Mapping) -> Result<Vec<Identifier>, ConfigError> {
    let mut out = Vec::new();
    for (rule_key, rule) in rules {
        let Some(rule_key) = rule_key.as_str() else {
            return Err(invalid_identifier(
                entry,
                &format!("{rule_key:?}"),
                "identifier keys must be strings",
            ));
        };

        if rule_key == NAME_CONTAINS_KEY {
            match rule {
                Value::String(substring) if !substring.is_empty() => {
                    out.push(Identifier::PathContains {
                        substring: substring.clone(),
                    });
                }
                Value::Sequence(items) if !items.is_empty() => {
                    for item in items {
                        let Some(substring) = item.as_str().filter(|s| !s.is_empty()) else {
                            return Err(invalid_identifier(
                                entry,
                                rule_key,
                                "expected non-empty strings",
                            ));
                        };
                        out.push(Identifier::PathContains {
                            substring: substring.to_string(),
                        });
                    }
                }
                _ => {
                    return Err(invalid_identifier(
                        entry,
                        rule_key,
                        "expected a non-empty string or list of strings",
                    ))
                }
            }
            continue;
        }

        let Value::Mapping(fields) = rule else {
            return Err(invalid_identifier(
                entry,
                rule_key,
                "expected a mapping of metadata fields",
            ));
        };
        if fields.is_empty() {
            return Err(invalid_identifier(entry, rule_key, "section has no fields"));
        }
        for (field, expected) in fields {
            let Some(field) = field.as_str() else {
                return Err(invalid_identifier(entry, rule_key, "field names must be strings"));
            };
            let context = format!("{rule_key}.{field}");
            out.push(parse_field_rule(entry, rule_key, field, expected, &context)?);
        }
    }
    Ok(out)
}

fn parse_field_rule(
    entry: &str,
    section: &str,
    field: &str,
    expected: &Value,
    context: &str,
) -> Result<Identifier, ConfigError> {
    match expected {
        Value::Null => Err(invalid_identifier(entry, context, "missing expected value")),
        Value::Mapping(spec) => {
            let content = spec
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid_identifier(entry, context, "expected 'content' string"))?;
            let mode = match spec.get("match") {
                None => MatchMode::default(),
                Some(raw) => raw.as_str().and_then(MatchMode::parse).ok_or_else(|| {
                    invalid_identifier(entry, context, "'match' must be 'substring' or 'exact'")
                })?,
            };
            Ok(Identifier::FieldMatches {
                section: section.to_string(),
                field: field.to_string(),
                content: content.to_string(),
                mode,
            })
        }
        value => Ok(Identifier::FieldEquals {
            section: section.to_string(),
            field: field.to_string(),
            value: value.clone(),
        }),
    }
}

fn identifiers_to_mapping(identifiers: &[Identifier]) -> Mapping {
    let mut out = Mapping::new();
    let mut paths: Vec<Value> = Vec::new();
    for rule in identifiers {
        match rule {
            Identifier::PathContains { substring } => {
                if paths.is_empty() {
                    // Reserve the key position of the first path rule.
                    out.insert(key(NAME_CONTAINS_KEY), Value::Null);
                }
                paths.push(key(substring));
            }
            Identifier::FieldEquals {
                section,
                field,
                value,
            } => {
                insert_field(&mut out, section, field, value.clone());
            }
            Identifier::FieldMatches {
                section,
                field,
                content,
                mode,
            } => {
                let mut spec = Mapping::new();
                spec.insert(key("content"), key(content));
                spec.insert(key("match"), key(mode.as_str()));
                insert_field(&mut out, section, field, Value::Mapping(spec));
            }
        }
    }
    if !paths.is_empty() {
        let value = if paths.len() == 1 {
            paths.remove(0)
        } else {
            Value::Sequence(paths)
        };
        out.insert(key(NAME_CONTAINS_KEY), value);
    }
    out
}

fn insert_field(out: &mut Mapping, section: &str, field: &str, value: Value) {
    if let Some(Value::Mapping(fields)) = out.get_mut(section) {
        fields.insert(key(field), value);
        return;
    }
    let mut fields = Mapping::new();
    fields.insert(key(field), value);
    out.insert(key(section), Value::Mapping(fields));
}
