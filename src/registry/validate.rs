//! Non-fatal checks over a loaded registry (unit files, weak identifiers).

use std::fmt;

use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Part of an entry a diagnostic points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    UnitFile,
    Identifiers,
}

impl EntryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnitFile => "unitfile",
            Self::Identifiers => "identifiers",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDiagnostic {
    pub severity: ValidationSeverity,
    /// Canonical name of the entry.
    pub entry: String,
    /// `None` when the finding concerns the entry as a whole.
    pub field: Option<EntryField>,
    pub message: String,
}

impl fmt::Display for ValidationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.entry)?;
        if let Some(field) = self.field {
            write!(f, ".{}", field.as_str())?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.count(ValidationSeverity::Error) > 0
    }

    pub fn count(&self, severity: ValidationSeverity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == severity)
            .count()
    }

    /// Diagnostics about the entry named `name`.
    pub fn for_entry<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ValidationDiagnostic> {
        self.diagnostics.iter().filter(move |diag| diag.entry == name)
    }
}

/// Check every entry's unit file with `unit_file_exists`, and flag entries
/// that can only be recognised by path.
pub fn validate_registry<F>(registry: &Registry, unit_file_exists: F) -> ValidationReport
where
    F: Fn(&str) -> bool,
{
    let mut diagnostics = Vec::new();

    for entry in registry {
        let mut note = |severity, field, message: String| {
            diagnostics.push(ValidationDiagnostic {
                severity,
                entry: entry.name.clone(),
                field,
                message,
            })
        };

        match entry.unit_file.as_deref() {
            Some(unit_file) if unit_file.trim().is_empty() => note(
                ValidationSeverity::Error,
                Some(EntryField::UnitFile),
                "empty unit file reference".to_string(),
            ),
            Some(unit_file) if !unit_file_exists(unit_file) => note(
                ValidationSeverity::Error,
                Some(EntryField::UnitFile),
                format!("unit file '{unit_file}' not found"),
            ),
            Some(_) => {}
            None => note(
                ValidationSeverity::Info,
                None,
                "no unit convention declared".to_string(),
            ),
        }

        if entry.is_path_only() {
            note(
                ValidationSeverity::Warning,
                Some(EntryField::Identifiers),
                "recognised by path substring only".to_string(),
            );
        }
    }

    // Stable, so declaration order holds within one severity.
    diagnostics.sort_by_key(|diag| diag.severity);
    ValidationReport { diagnostics }
}
