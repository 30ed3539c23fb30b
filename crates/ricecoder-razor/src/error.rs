//! Error types for template compilation and execution

use std::string::FromUtf8Error;

use thiserror::Error;

use crate::diagnostics::{Diagnostic, Severity};

/// Errors that can occur while registering or running templates
#[derive(Debug, Error)]
pub enum RazorError {
    /// No template is registered under the requested name
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Source generation or compilation failed
    #[error(
        "Template compilation failed with {} diagnostic(s){}",
        .diagnostics.len(),
        first_error(.diagnostics)
    )]
    Compilation {
        /// Diagnostics in the order the translator or toolchain reported them
        diagnostics: Vec<Diagnostic>,
    },

    /// A compiled template type could not be loaded or constructed
    #[error("Template instantiation failed: {0}")]
    Instantiation(String),

    /// A model member was read that is neither declared nor recorded
    #[error("Model has no member named '{0}'")]
    MissingMember(String),

    /// A template failed while executing
    #[error("Template execution failed: {0}")]
    Execution(String),

    /// Writing to the output sink failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Materialized output was not valid UTF-8
    #[error("Template output is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    /// Engine configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RazorError {
    /// Build a compilation error from a diagnostic list
    pub fn compilation(diagnostics: Vec<Diagnostic>) -> Self {
        RazorError::Compilation { diagnostics }
    }

    /// Diagnostics carried by a compilation error, empty for every other kind
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            RazorError::Compilation { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// Whether this is a `TemplateNotFound` error
    pub fn is_not_found(&self) -> bool {
        matches!(self, RazorError::TemplateNotFound(_))
    }
}

impl From<config::ConfigError> for RazorError {
    fn from(err: config::ConfigError) -> Self {
        RazorError::Config(err.to_string())
    }
}

fn first_error(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

/// Result type for razor operations
pub type Result<T> = std::result::Result<T, RazorError>;
