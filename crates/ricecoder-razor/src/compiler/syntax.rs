//! Lexer and parser for generated template program source
//!
//! ```text
//! namespace razor.runtime;
//! template Template : razor.runtime.TemplateBase<app.Person>;
//! execute {
//!     literal "Hello ";
//! #line 1 8 "a1b2c3.cshtml"
//!     write Model.Name;
//! }
//! ```
//!
//! A `#line L C "document"` directive maps every token on the following line
//! to that markup position.

use serde_json::{Number, Value};

use crate::diagnostics::{Diagnostic, Location};

/// Document name used for positions not mapped by `#line`
pub const GENERATED_DOCUMENT: &str = "<generated>";

/// Expression in program source
#[derive(Debug, Clone, PartialEq)]
pub enum ExprSyntax {
    /// Literal value
    Literal(Value),
    /// Member path rooted at `Model` or a loop variable
    Path(Vec<String>),
    /// Helper call
    Call {
        /// Helper name
        name: String,
        /// Arguments
        args: Vec<ExprSyntax>,
    },
}

/// Statement in program source
#[derive(Debug, Clone, PartialEq)]
pub enum StmtSyntax {
    /// `literal "text";`
    Literal(String),
    /// `write expr;`
    Write {
        /// Written expression
        expr: ExprSyntax,
        /// Statement position
        location: Location,
    },
    /// `set Model.Member = expr;`
    Set {
        /// Assigned path
        target: Vec<String>,
        /// Assigned value
        value: ExprSyntax,
        /// Statement position
        location: Location,
    },
    /// `if expr { ... } else { ... }`
    If {
        /// Condition
        condition: ExprSyntax,
        /// Then branch
        then: Vec<StmtSyntax>,
        /// Else branch
        otherwise: Vec<StmtSyntax>,
        /// Statement position
        location: Location,
    },
    /// `foreach x in expr { ... }`
    ForEach {
        /// Loop variable
        variable: String,
        /// Sequence
        source: ExprSyntax,
        /// Body
        body: Vec<StmtSyntax>,
        /// Statement position
        location: Location,
    },
}

/// Parsed program
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxTree {
    /// Declared namespace
    pub namespace: String,
    /// Declared template type name
    pub template_name: String,
    /// Contract type in generic syntax, whitespace removed
    pub base_type: String,
    /// Position of the template declaration
    pub template_location: Location,
    /// Entry operation body
    pub body: Vec<StmtSyntax>,
}

impl SyntaxTree {
    /// Qualified name of the declared template type
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.template_name)
    }
}

/// Parse program source
///
/// Returns every lexical error found, or the first syntax error.
pub fn parse(source: &str) -> Result<SyntaxTree, Vec<Diagnostic>> {
    let (tokens, mut diagnostics) = lex(source);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let mut parser = Parser {
        tokens,
        position: 0,
    };
    parser.parse_unit().map_err(|diagnostic| {
        diagnostics.push(diagnostic);
        diagnostics
    })
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Number(Number),
    Punct(char),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    location: Location,
}

fn lex(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut mapped: Option<Location> = None;
    let mut last_line = 1;

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;

        if line.trim_start().starts_with("#line") {
            match parse_line_directive(line.trim_start()) {
                Some(location) => mapped = Some(location),
                None => diagnostics.push(
                    Diagnostic::error("RZC1576", "Invalid #line directive")
                        .at(GENERATED_DOCUMENT, line_no, 1),
                ),
            }
            continue;
        }

        let mapping = mapped.take();
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let location = mapping.clone().unwrap_or_else(|| Location {
                document: GENERATED_DOCUMENT.to_string(),
                line: line_no,
                column: i + 1,
            });

            if c.is_whitespace() {
                i += 1;
            } else if c == '/' && chars.get(i + 1) == Some(&'/') {
                break;
            } else if c.is_alphabetic() || c == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(chars[start..i].iter().collect()),
                    location,
                });
            } else if c == '"' {
                let start = i;
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    match chars[i] {
                        '\\' => i += 2,
                        '"' => {
                            i += 1;
                            closed = true;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                let literal: String = chars[start..i.min(chars.len())].iter().collect();
                match closed.then(|| serde_json::from_str::<String>(&literal)) {
                    Some(Ok(text)) => tokens.push(Token {
                        kind: TokenKind::Str(text),
                        location,
                    }),
                    Some(Err(_)) => diagnostics.push(diagnostic_at(
                        "RZC1009",
                        "Unrecognized escape sequence",
                        location,
                    )),
                    None => diagnostics.push(diagnostic_at(
                        "RZC1010",
                        "Newline in constant",
                        location,
                    )),
                }
            } else if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if matches!(chars.get(i), Some('e' | 'E')) {
                    let sign = usize::from(matches!(chars.get(i + 1), Some('+' | '-')));
                    if chars.get(i + 1 + sign).is_some_and(|d| d.is_ascii_digit()) {
                        i += 1 + sign;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let lexeme: String = chars[start..i].iter().collect();
                match lexeme.parse::<Number>() {
                    Ok(number) => tokens.push(Token {
                        kind: TokenKind::Number(number),
                        location,
                    }),
                    Err(_) => diagnostics.push(diagnostic_at(
                        "RZC1013",
                        format!("Invalid number '{}'", lexeme),
                        location,
                    )),
                }
            } else if ".;{}(),=:<>".contains(c) {
                tokens.push(Token {
                    kind: TokenKind::Punct(c),
                    location,
                });
                i += 1;
            } else {
                diagnostics.push(diagnostic_at(
                    "RZC1056",
                    format!("Unexpected character '{}'", c),
                    location,
                ));
                i += 1;
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        location: Location {
            document: GENERATED_DOCUMENT.to_string(),
            line: last_line,
            column: 1,
        },
    });
    (tokens, diagnostics)
}

/// `#line 3 8 "doc.cshtml"`
fn parse_line_directive(line: &str) -> Option<Location> {
    let rest = line.strip_prefix("#line")?.trim();
    let mut parts = rest.splitn(3, ' ');
    let line_no = parts.next()?.parse().ok()?;
    let column = parts.next()?.parse().ok()?;
    let document = serde_json::from_str::<String>(parts.next()?.trim()).ok()?;
    Some(Location {
        document,
        line: line_no,
        column,
    })
}

fn diagnostic_at(id: &str, message: impl Into<String>, location: Location) -> Diagnostic {
    let mut diagnostic = Diagnostic::error(id, message);
    diagnostic.location = Some(location);
    diagnostic
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

type ParseResult<T> = Result<T, Diagnostic>;

impl Parser {
    fn parse_unit(&mut self) -> ParseResult<SyntaxTree> {
        self.expect_keyword("namespace")?;
        let namespace = self.parse_qualified_name()?;
        self.expect_punct(';')?;

        let template_location = self.peek().location.clone();
        self.expect_keyword("template")?;
        let template_name = self.expect_ident()?;
        self.expect_punct(':')?;
        let base_type = self.parse_type()?;
        self.expect_punct(';')?;

        self.expect_keyword("execute")?;
        self.expect_punct('{')?;
        let body = self.parse_block()?;

        if self.peek().kind != TokenKind::Eof {
            return Err(self.unexpected("end of file"));
        }

        Ok(SyntaxTree {
            namespace,
            template_name,
            base_type,
            template_location,
            body,
        })
    }

    /// Statements up to and including the closing `}`
    fn parse_block(&mut self) -> ParseResult<Vec<StmtSyntax>> {
        let mut statements = Vec::new();
        loop {
            match &self.peek().kind {
                TokenKind::Punct('}') => {
                    self.advance();
                    return Ok(statements);
                }
                TokenKind::Eof => {
                    return Err(diagnostic_at(
                        "RZC1513",
                        "} expected",
                        self.peek().location.clone(),
                    ))
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<StmtSyntax> {
        let location = self.peek().location.clone();
        let keyword = self.expect_ident()?;

        match keyword.as_str() {
            "literal" => {
                let text = match self.advance().kind {
                    TokenKind::Str(text) => text,
                    _ => return Err(self.previous_error("RZC1525", "String literal expected")),
                };
                self.expect_punct(';')?;
                Ok(StmtSyntax::Literal(text))
            }
            "write" => {
                let expr = self.parse_expr()?;
                self.expect_punct(';')?;
                Ok(StmtSyntax::Write { expr, location })
            }
            "set" => {
                let target = self.parse_path()?;
                self.expect_punct('=')?;
                let value = self.parse_expr()?;
                self.expect_punct(';')?;
                Ok(StmtSyntax::Set {
                    target,
                    value,
                    location,
                })
            }
            "if" => {
                let condition = self.parse_expr()?;
                self.expect_punct('{')?;
                let then = self.parse_block()?;
                let otherwise = if self.peek_keyword("else") {
                    self.advance();
                    self.expect_punct('{')?;
                    self.parse_block()?
                } else {
                    Vec::new()
                };
                Ok(StmtSyntax::If {
                    condition,
                    then,
                    otherwise,
                    location,
                })
            }
            "foreach" => {
                let variable = self.expect_ident()?;
                self.expect_keyword("in")?;
                let source = self.parse_expr()?;
                self.expect_punct('{')?;
                let body = self.parse_block()?;
                Ok(StmtSyntax::ForEach {
                    variable,
                    source,
                    body,
                    location,
                })
            }
            other => Err(diagnostic_at(
                "RZC1002",
                format!("Unknown statement '{}'", other),
                location,
            )),
        }
    }

    fn parse_expr(&mut self) -> ParseResult<ExprSyntax> {
        let token = self.advance();
        match token.kind {
            TokenKind::Str(text) => Ok(ExprSyntax::Literal(Value::String(text))),
            TokenKind::Number(number) => Ok(ExprSyntax::Literal(Value::Number(number))),
            TokenKind::Ident(ident) => match ident.as_str() {
                "true" => Ok(ExprSyntax::Literal(Value::Bool(true))),
                "false" => Ok(ExprSyntax::Literal(Value::Bool(false))),
                "null" => Ok(ExprSyntax::Literal(Value::Null)),
                _ if self.peek().kind == TokenKind::Punct('(') => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    Ok(ExprSyntax::Call { name: ident, args })
                }
                _ => {
                    let mut path = vec![ident];
                    while self.peek().kind == TokenKind::Punct('.') {
                        self.advance();
                        path.push(self.expect_ident()?);
                    }
                    Ok(ExprSyntax::Path(path))
                }
            },
            _ => Err(diagnostic_at(
                "RZC1525",
                "Invalid expression term",
                token.location,
            )),
        }
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<ExprSyntax>> {
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::Punct(')') {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.advance().kind {
                TokenKind::Punct(',') => continue,
                TokenKind::Punct(')') => return Ok(args),
                _ => return Err(self.previous_error("RZC1026", ") expected")),
            }
        }
    }

    fn parse_path(&mut self) -> ParseResult<Vec<String>> {
        let mut path = vec![self.expect_ident()?];
        while self.peek().kind == TokenKind::Punct('.') {
            self.advance();
            path.push(self.expect_ident()?);
        }
        Ok(path)
    }

    fn parse_qualified_name(&mut self) -> ParseResult<String> {
        Ok(self.parse_path()?.join("."))
    }

    /// Qualified name with optional generic arguments, rendered without whitespace
    fn parse_type(&mut self) -> ParseResult<String> {
        let mut name = self.parse_qualified_name()?;
        if self.peek().kind == TokenKind::Punct('<') {
            self.advance();
            let mut args = vec![self.parse_type()?];
            while self.peek().kind == TokenKind::Punct(',') {
                self.advance();
                args.push(self.parse_type()?);
            }
            self.expect_punct('>')?;
            name = format!("{}<{}>", name, args.join(","));
        }
        Ok(name)
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.peek_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", keyword)))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(ident) => {
                let ident = ident.clone();
                self.advance();
                Ok(ident)
            }
            _ => Err(diagnostic_at(
                "RZC1001",
                "Identifier expected",
                self.peek().location.clone(),
            )),
        }
    }

    fn expect_punct(&mut self, punct: char) -> ParseResult<()> {
        if self.peek().kind == TokenKind::Punct(punct) {
            self.advance();
            Ok(())
        } else {
            Err(diagnostic_at(
                "RZC1002",
                format!("{} expected", punct),
                self.peek().location.clone(),
            ))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(ident) if ident == keyword)
    }

    fn peek(&self) -> &Token {
        // The token list always ends with Eof, which is never consumed
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        diagnostic_at(
            "RZC1003",
            format!("Syntax error, {} expected", expected),
            self.peek().location.clone(),
        )
    }

    fn previous_error(&self, id: &str, message: &str) -> Diagnostic {
        let index = self.position.saturating_sub(1);
        diagnostic_at(id, message, self.tokens[index].location.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SOURCE: &str = r#"// <auto-generated document="doc.cshtml" />
namespace razor.runtime;

template Template : razor.runtime.TemplateBase < app.Person >;

execute {
    literal "Hello ";
#line 1 8 "doc.cshtml"
    write Model.Name;
    set Model.Count = -2;
    if Upper(Model.Name, "x") {
        literal "a";
    } else {
        foreach item in Model.Items {
            write item.Title;
        }
    }
}
"#;

    #[test]
    fn test_parse_full_program() {
        let tree = parse(SOURCE).unwrap();
        assert_eq!(tree.qualified_name(), "razor.runtime.Template");
        assert_eq!(tree.base_type, "razor.runtime.TemplateBase<app.Person>");
        assert_eq!(tree.body.len(), 4);
        assert_eq!(tree.body[0], StmtSyntax::Literal("Hello ".to_string()));
        assert!(matches!(
            &tree.body[2],
            StmtSyntax::Set { value: ExprSyntax::Literal(v), .. } if *v == json!(-2)
        ));
        assert!(matches!(
            &tree.body[3],
            StmtSyntax::If { condition: ExprSyntax::Call { args, .. }, otherwise, .. }
                if args.len() == 2 && otherwise.len() == 1
        ));
    }

    #[test]
    fn test_line_directive_maps_next_line_only() {
        let tree = parse(SOURCE).unwrap();
        let StmtSyntax::Write { location, .. } = &tree.body[1] else {
            panic!("expected write");
        };
        assert_eq!(location.document, "doc.cshtml");
        assert_eq!((location.line, location.column), (1, 8));

        let StmtSyntax::Set { location, .. } = &tree.body[2] else {
            panic!("expected set");
        };
        assert_eq!(location.document, GENERATED_DOCUMENT);
        assert_eq!(location.line, 10);
    }

    #[test]
    fn test_missing_semicolon() {
        let source = "namespace a;\ntemplate T : a.B;\nexecute {\n    write Model.Name\n}\n";
        let diagnostics = parse(source).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, "RZC1002");
        assert_eq!(diagnostics[0].location.as_ref().unwrap().line, 5);
    }

    #[test]
    fn test_unclosed_body() {
        let source = "namespace a;\ntemplate T : a.B;\nexecute {\n    literal \"x\";\n";
        let diagnostics = parse(source).unwrap_err();
        assert_eq!(diagnostics[0].id, "RZC1513");
    }

    #[test]
    fn test_lexer_reports_all_bad_characters() {
        let source = "namespace a;\ntemplate T : a.B;\nexecute {\n    write $;\n    write #;\n}\n";
        let diagnostics = parse(source).unwrap_err();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.id == "RZC1056"));
        assert_eq!(diagnostics[0].location.as_ref().unwrap().line, 4);
        assert_eq!(diagnostics[1].location.as_ref().unwrap().line, 5);
    }

    #[test]
    fn test_unterminated_string() {
        let source = "namespace a;\ntemplate T : a.B;\nexecute {\n    literal \"open;\n}\n";
        let diagnostics = parse(source).unwrap_err();
        assert_eq!(diagnostics[0].id, "RZC1010");
    }

    #[test]
    fn test_exponent_numbers() {
        let source = "namespace a;\ntemplate T : a.B;\nexecute {\n    write 1e-7;\n    write 1e20;\n    write -2.5E+3;\n}\n";
        let tree = parse(source).unwrap();
        let values: Vec<f64> = tree
            .body
            .iter()
            .map(|stmt| match stmt {
                StmtSyntax::Write {
                    expr: ExprSyntax::Literal(value),
                    ..
                } => value.as_f64().unwrap(),
                other => panic!("unexpected statement {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![1e-7, 1e20, -2500.0]);
    }

    #[test]
    fn test_exponent_without_digits_is_not_consumed() {
        let source = "namespace a;\ntemplate T : a.B;\nexecute {\n    write 1e;\n}\n";
        let diagnostics = parse(source).unwrap_err();
        assert_eq!(diagnostics[0].id, "RZC1002");
    }

    #[test]
    fn test_garbage_source() {
        let diagnostics = parse("this is not a template program").unwrap_err();
        assert_eq!(diagnostics[0].id, "RZC1003");
    }
}
