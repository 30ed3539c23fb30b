//! Engine configuration

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{RazorError, Result};

/// Environment variable prefix, e.g. `RAZOR_CLASS_NAME`
pub const ENV_PREFIX: &str = "RAZOR";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the generated template type inside the contract namespace
    pub class_name: String,
    /// Compilation assembly name; defaults to the contract's assembly name
    pub assembly_name: Option<String>,
    /// Extension of the generated markup document names
    pub document_extension: String,
    /// Log generated source at debug level
    pub trace_generated_source: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            class_name: "Template".to_string(),
            assembly_name: None,
            document_extension: ".cshtml".to_string(),
            trace_generated_source: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional TOML file and `RAZOR_*` variables
    ///
    /// Environment variables take precedence over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.class_name.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_alphanumeric() || c == '_') {
            return Err(RazorError::Config(format!(
                "class_name must be an identifier, got '{}'",
                self.class_name
            )));
        }

        if !self.document_extension.starts_with('.') || self.document_extension.len() < 2 {
            return Err(RazorError::Config(format!(
                "document_extension must start with '.', got '{}'",
                self.document_extension
            )));
        }

        if self
            .assembly_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(RazorError::Config(
                "assembly_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
