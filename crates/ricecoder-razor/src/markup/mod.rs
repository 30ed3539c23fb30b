//! Markup translation
//!
//! Turns Razor-style markup into template program source. The engine only
//! depends on the [`MarkupTranslator`] trait; [`RazorTranslator`] is the
//! bundled implementation.
//!
//! Supported markup:
//! - `@Model.Name`, `@item.Title`, `@Helper(args)` implicit expressions
//! - `@( expr )` explicit expressions
//! - `@{ Model.Member = expr; }` code blocks
//! - `@if (expr) { ... } else { ... }` and `@foreach (var x in expr) { ... }`
//! - `@* comment *@` and `@@` for a literal `@`

pub mod parser;

use crate::diagnostics::Diagnostic;

pub use parser::{Assignment, MarkupExpr, MarkupNode, MarkupParser, Span};

/// A markup document handed to a translator
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Document name used in diagnostics and `#line` directives
    pub name: String,
    /// Markup text
    pub content: String,
}

/// Settings for the generated program
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    /// Namespace of the generated template type
    pub namespace: String,
    /// Name of the generated template type
    pub class_name: String,
    /// Contract type in generic syntax, e.g. `razor.runtime.TemplateBase<app.Person>`
    pub base_type: String,
}

/// Translates markup into program source
pub trait MarkupTranslator: Send + Sync {
    /// Translate a document, or report why it cannot be translated
    fn translate(
        &self,
        document: &SourceDocument,
        options: &TranslationOptions,
    ) -> Result<String, Vec<Diagnostic>>;
}

/// Razor-subset translator
#[derive(Debug, Clone, Default)]
pub struct RazorTranslator;

impl RazorTranslator {
    /// Create a translator
    pub fn new() -> Self {
        Self
    }
}

impl MarkupTranslator for RazorTranslator {
    fn translate(
        &self,
        document: &SourceDocument,
        options: &TranslationOptions,
    ) -> Result<String, Vec<Diagnostic>> {
        let nodes = MarkupParser::parse(&document.content, &document.name)?;

        let mut writer = SourceWriter::new(&document.name);
        writer.line(&format!(
            "// <auto-generated document={} />",
            quote(&document.name)
        ));
        writer.line(&format!("namespace {};", options.namespace));
        writer.blank();
        writer.line(&format!(
            "template {} : {};",
            options.class_name, options.base_type
        ));
        writer.blank();
        writer.open("execute {");
        writer.nodes(&nodes);
        writer.close("}");

        Ok(writer.finish())
    }
}

/// Indenting writer for generated source
struct SourceWriter<'d> {
    out: String,
    indent: usize,
    document: &'d str,
}

impl<'d> SourceWriter<'d> {
    fn new(document: &'d str) -> Self {
        Self {
            out: String::new(),
            indent: 0,
            document,
        }
    }

    fn nodes(&mut self, nodes: &[MarkupNode]) {
        for node in nodes {
            self.node(node);
        }
    }

    fn node(&mut self, node: &MarkupNode) {
        match node {
            MarkupNode::Text(text) => {
                self.line(&format!("literal {};", quote(text)));
            }
            MarkupNode::Expression { expr, span } => {
                self.line_directive(*span);
                self.line(&format!("write {};", expression(expr)));
            }
            MarkupNode::Code(statements) => {
                for statement in statements {
                    self.line_directive(statement.span);
                    self.line(&format!(
                        "set {} = {};",
                        statement.target.join("."),
                        expression(&statement.value)
                    ));
                }
            }
            MarkupNode::If {
                condition,
                span,
                then,
                otherwise,
            } => {
                self.line_directive(*span);
                self.open(&format!("if {} {{", expression(condition)));
                self.nodes(then);
                if otherwise.is_empty() {
                    self.close("}");
                } else {
                    self.indent -= 1;
                    self.open("} else {");
                    self.nodes(otherwise);
                    self.close("}");
                }
            }
            MarkupNode::ForEach {
                variable,
                source,
                span,
                body,
            } => {
                self.line_directive(*span);
                self.open(&format!("foreach {} in {} {{", variable, expression(source)));
                self.nodes(body);
                self.close("}");
            }
        }
    }

    /// Map the next generated line back to a markup position
    fn line_directive(&mut self, span: Span) {
        self.out.push_str(&format!(
            "#line {} {} {}\n",
            span.line,
            span.column,
            quote(self.document)
        ));
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.indent += 1;
    }

    fn close(&mut self, text: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

fn expression(expr: &MarkupExpr) -> String {
    match expr {
        MarkupExpr::Literal(value) => value.to_string(),
        MarkupExpr::Path(path) => path.join("."),
        MarkupExpr::Call { name, args } => {
            let args: Vec<String> = args.iter().map(expression).collect();
            format!("{}({})", name, args.join(", "))
        }
    }
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}
