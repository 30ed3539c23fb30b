//! Source generation from markup
//!
//! Configures the markup translator for the chosen contract: the generated
//! type is placed in the contract's namespace under the configured class
//! name, so it can later be found as `{namespace}.{class_name}`.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    config::EngineConfig,
    contract::BaseKind,
    error::{RazorError, Result},
    markup::{MarkupTranslator, SourceDocument, TranslationOptions},
};

/// Output of a successful generation
#[derive(Debug, Clone)]
pub struct GeneratedSource {
    /// Name given to the markup document
    pub document: String,
    /// Qualified name the generated template type will have
    pub type_name: String,
    /// Program source
    pub source: String,
}

/// Generates program source from markup
#[derive(Clone)]
pub struct SourceGenerator {
    translator: Arc<dyn MarkupTranslator>,
    class_name: String,
    document_extension: String,
}

impl SourceGenerator {
    /// Create a generator around a translator
    pub fn new(translator: Arc<dyn MarkupTranslator>, config: &EngineConfig) -> Self {
        Self {
            translator,
            class_name: config.class_name.clone(),
            document_extension: config.document_extension.clone(),
        }
    }

    /// Generate program source for `markup` compiled against `base`
    ///
    /// Translator failures surface as [`RazorError::Compilation`].
    pub fn generate(&self, base: &BaseKind, markup: &str) -> Result<GeneratedSource> {
        let document = SourceDocument {
            name: document_name(markup, &self.document_extension),
            content: markup.to_string(),
        };
        let options = TranslationOptions {
            namespace: base.namespace().to_string(),
            class_name: self.class_name.clone(),
            base_type: normalize_type_name(&base.type_name()),
        };

        debug!(
            document = %document.name,
            base_type = %options.base_type,
            "Generating template source"
        );

        let source = self
            .translator
            .translate(&document, &options)
            .map_err(RazorError::compilation)?;

        Ok(GeneratedSource {
            type_name: format!("{}.{}", options.namespace, options.class_name),
            document: document.name,
            source,
        })
    }
}

/// Rewrite a reflection-style generic name into angle-bracket syntax
///
/// ``razor.runtime.TemplateBase`1[app.Person]`` becomes
/// `razor.runtime.TemplateBase<app.Person>`.
pub fn normalize_type_name(name: &str) -> String {
    arity_regex().replace_all(name, "<").replace(']', ">")
}

fn arity_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"`\d+\[").expect("Invalid regex"))
}

/// Deterministic document name derived from the markup checksum
pub fn document_name(markup: &str, extension: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(markup.as_bytes());
    let digest = hasher.finalize();
    format!("{}{}", hex::encode(&digest[..6]), extension)
}
