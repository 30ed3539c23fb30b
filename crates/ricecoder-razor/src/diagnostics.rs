//! Structured diagnostics reported by the markup translator and the toolchain

use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the compilation
    Error,
    /// Reported but does not fail the compilation
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Position of a diagnostic inside a source document (1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Document the position refers to
    pub document: String,
    /// Line number
    pub line: usize,
    /// Column number
    pub column: usize,
}

/// A message reported while translating or compiling a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable identifier, e.g. `RZ1001` or `RZC1061`
    pub id: String,
    /// Severity
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// Where the problem was found, if known
    pub location: Option<Location>,
}

impl Diagnostic {
    /// Create a diagnostic without a location
    pub fn new(id: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            message: message.into(),
            location: None,
        }
    }

    /// Create an error diagnostic
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, Severity::Error, message)
    }

    /// Create a warning diagnostic
    pub fn warning(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, Severity::Warning, message)
    }

    /// Attach a location
    pub fn at(mut self, document: impl Into<String>, line: usize, column: usize) -> Self {
        self.location = Some(Location {
            document: document.into(),
            line,
            column,
        });
        self
    }

    /// Whether this diagnostic fails a compilation
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(
                f,
                "{}({},{}): ",
                location.document, location.line, location.column
            )?;
        }
        write!(f, "{} {}: {}", self.severity, self.id, self.message)
    }
}

/// Whether any diagnostic in the list is an error
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let diagnostic = Diagnostic::error("RZ1001", "Unterminated comment").at("a.cshtml", 3, 7);
        assert_eq!(
            diagnostic.to_string(),
            "a.cshtml(3,7): error RZ1001: Unterminated comment"
        );
    }

    #[test]
    fn test_display_without_location() {
        let diagnostic = Diagnostic::warning("RZC0168", "unused");
        assert_eq!(diagnostic.to_string(), "warning RZC0168: unused");
    }

    #[test]
    fn test_has_errors() {
        assert!(!has_errors(&[Diagnostic::warning("W", "w")]));
        assert!(has_errors(&[
            Diagnostic::warning("W", "w"),
            Diagnostic::error("E", "e")
        ]));
    }

    #[test]
    fn test_severity_wire_names() {
        assert_eq!(serde_json::to_string(&Severity::Error).unwrap(), "\"error\"");
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"warning\"");
        assert!(serde_json::from_str::<Severity>("\"info\"").is_err());
    }
}
