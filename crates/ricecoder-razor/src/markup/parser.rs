//! Razor markup parser
//!
//! Parses template markup into a node tree: literal text, `@` expressions,
//! `@{ }` code blocks, `@if` and `@foreach` blocks. Comments (`@* *@`) are
//! dropped and `@@` produces a literal `@`.

use serde_json::{Number, Value};

use crate::diagnostics::Diagnostic;

/// Expression embedded in markup
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupExpr {
    /// String, number, boolean or null literal
    Literal(Value),
    /// Member path such as `Model.Name` or `item.Title`
    Path(Vec<String>),
    /// Helper call such as `Upper(Model.Name)`
    Call {
        /// Helper name
        name: String,
        /// Arguments
        args: Vec<MarkupExpr>,
    },
}

/// Source position of a construct (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Line number
    pub line: usize,
    /// Column number
    pub column: usize,
}

/// A member assignment inside a `@{ }` block
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Assigned path, e.g. `["Model", "Counter"]`
    pub target: Vec<String>,
    /// Assigned value
    pub value: MarkupExpr,
    /// Position of the target
    pub span: Span,
}

/// Parsed markup element
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    /// Literal output
    Text(String),
    /// Expression whose value is written
    Expression {
        /// Expression
        expr: MarkupExpr,
        /// Position of the expression
        span: Span,
    },
    /// Code block with assignments
    Code(Vec<Assignment>),
    /// Conditional block
    If {
        /// Condition
        condition: MarkupExpr,
        /// Position of the condition
        span: Span,
        /// Markup rendered when the condition holds
        then: Vec<MarkupNode>,
        /// Markup rendered otherwise
        otherwise: Vec<MarkupNode>,
    },
    /// Loop block
    ForEach {
        /// Loop variable
        variable: String,
        /// Sequence expression
        source: MarkupExpr,
        /// Position of the sequence expression
        span: Span,
        /// Markup rendered per item
        body: Vec<MarkupNode>,
    },
}

/// Markup parser
pub struct MarkupParser;

impl MarkupParser {
    /// Parse markup into nodes
    ///
    /// # Arguments
    /// * `content` - Markup text
    /// * `document` - Document name used in diagnostic locations
    pub fn parse(content: &str, document: &str) -> Result<Vec<MarkupNode>, Vec<Diagnostic>> {
        let mut parser = Parser::new(content, document);
        parser.parse_nodes(None).map_err(|d| vec![d])
    }
}

/// Internal parser state machine
struct Parser<'d> {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    document: &'d str,
}

type ParseResult<T> = Result<T, Diagnostic>;

impl<'d> Parser<'d> {
    fn new(content: &str, document: &'d str) -> Self {
        Self {
            chars: content.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            document,
        }
    }

    /// Parse nodes until end of input, or until the closing `}` of `block`
    fn parse_nodes(&mut self, block: Option<(&str, Span)>) -> ParseResult<Vec<MarkupNode>> {
        let mut nodes = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            let Some(ch) = self.peek_char() else {
                if let Some((keyword, span)) = block {
                    return Err(self.error_at(
                        "RZ1006",
                        format!(
                            "The {} block is missing a closing \"}}\" character",
                            keyword
                        ),
                        span,
                    ));
                }
                break;
            };

            match ch {
                '}' if block.is_some() && depth == 0 => {
                    self.consume_char();
                    break;
                }
                '{' if block.is_some() => {
                    depth += 1;
                    text.push(ch);
                    self.consume_char();
                }
                '}' if block.is_some() => {
                    depth -= 1;
                    text.push(ch);
                    self.consume_char();
                }
                '@' => {
                    if self.is_email_at() {
                        text.push(ch);
                        self.consume_char();
                        continue;
                    }
                    if let Some(node) = self.parse_transition(&mut text)? {
                        flush_text(&mut text, &mut nodes);
                        nodes.push(node);
                    }
                }
                _ => {
                    text.push(ch);
                    self.consume_char();
                }
            }
        }

        flush_text(&mut text, &mut nodes);
        Ok(nodes)
    }

    /// Parse the construct after an `@`
    ///
    /// Escapes and comments only touch `text` and return `None`.
    fn parse_transition(&mut self, text: &mut String) -> ParseResult<Option<MarkupNode>> {
        let start = self.span();
        self.consume_char(); // @

        match self.peek_char() {
            Some('@') => {
                self.consume_char();
                text.push('@');
                Ok(None)
            }
            Some('*') => {
                self.consume_char();
                self.skip_comment(start)?;
                Ok(None)
            }
            Some('(') => {
                self.consume_char();
                let span = self.span();
                let expr = self.parse_expr()?;
                self.skip_whitespace();
                self.expect_char(')', "The explicit expression is missing a closing \")\"")?;
                Ok(Some(MarkupNode::Expression { expr, span }))
            }
            Some('{') => {
                self.consume_char();
                Ok(Some(MarkupNode::Code(self.parse_code_block(start)?)))
            }
            Some(c) if is_ident_start(c) => {
                let span = self.span();
                let ident = self.read_identifier();
                match ident.as_str() {
                    "if" => self.parse_if(span).map(Some),
                    "foreach" => self.parse_foreach(span).map(Some),
                    _ => {
                        let expr = self.parse_implicit(ident)?;
                        Ok(Some(MarkupNode::Expression { expr, span }))
                    }
                }
            }
            Some(c) => Err(self.error(
                "RZ1005",
                format!("\"{}\" is not valid at the start of a code block", c),
            )),
            None => Err(self.error(
                "RZ1005",
                "End-of-file was found after the \"@\" character",
            )),
        }
    }

    fn skip_comment(&mut self, start: Span) -> ParseResult<()> {
        while self.position < self.chars.len() {
            if self.peek_char() == Some('*') && self.peek_ahead(1) == Some('@') {
                self.consume_char();
                self.consume_char();
                return Ok(());
            }
            self.consume_char();
        }

        Err(self.error_at(
            "RZ1004",
            "End-of-file was found before the \"*@\" comment terminator",
            start,
        ))
    }

    /// `@Model.Name`, `@item.Title`, `@Upper(Model.Name)`
    ///
    /// A trailing `.` that is not followed by an identifier stays literal.
    fn parse_implicit(&mut self, first: String) -> ParseResult<MarkupExpr> {
        if self.peek_char() == Some('(') {
            self.consume_char();
            let args = self.parse_arguments()?;
            return Ok(MarkupExpr::Call { name: first, args });
        }

        let mut path = vec![first];
        while self.peek_char() == Some('.') && self.peek_ahead(1).is_some_and(is_ident_start) {
            self.consume_char();
            path.push(self.read_identifier());
        }
        Ok(MarkupExpr::Path(path))
    }

    fn parse_code_block(&mut self, start: Span) -> ParseResult<Vec<Assignment>> {
        let mut statements = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek_char() {
                None => {
                    return Err(self.error_at(
                        "RZ1006",
                        "The code block is missing a closing \"}\" character",
                        start,
                    ))
                }
                Some('}') => {
                    self.consume_char();
                    return Ok(statements);
                }
                Some(c) if is_ident_start(c) => {
                    let span = self.span();
                    let target = self.parse_path()?;
                    self.skip_whitespace();
                    self.expect_char('=', "Expected \"=\" in assignment")?;
                    let value = self.parse_expr()?;
                    self.skip_whitespace();
                    self.expect_char(';', "Expected \";\" after statement")?;
                    statements.push(Assignment {
                        target,
                        value,
                        span,
                    });
                }
                Some(c) => {
                    return Err(self.error(
                        "RZ1007",
                        format!("Unexpected \"{}\" in code block", c),
                    ))
                }
            }
        }
    }

    fn parse_if(&mut self, start: Span) -> ParseResult<MarkupNode> {
        self.skip_whitespace();
        self.expect_char('(', "Expected \"(\" after \"if\"")?;
        let span = self.span();
        let condition = self.parse_expr()?;
        self.skip_whitespace();
        self.expect_char(')', "Expected \")\" after condition")?;
        let then = self.parse_block_body("if", start)?;

        let otherwise = if self.try_consume_else() {
            self.skip_whitespace();
            if self.starts_with_keyword("if") {
                let nested = self.span();
                self.read_identifier();
                vec![self.parse_if(nested)?]
            } else {
                self.parse_block_body("else", start)?
            }
        } else {
            Vec::new()
        };

        Ok(MarkupNode::If {
            condition,
            span,
            then,
            otherwise,
        })
    }

    fn parse_foreach(&mut self, start: Span) -> ParseResult<MarkupNode> {
        self.skip_whitespace();
        self.expect_char('(', "Expected \"(\" after \"foreach\"")?;
        self.skip_whitespace();
        if !self.starts_with_keyword("var") {
            return Err(self.error("RZ1009", "Expected \"var\" in foreach declaration"));
        }
        self.read_identifier();
        self.skip_whitespace();
        if !self.peek_char().is_some_and(is_ident_start) {
            return Err(self.error("RZ1009", "Expected loop variable name"));
        }
        let variable = self.read_identifier();
        self.skip_whitespace();
        if !self.starts_with_keyword("in") {
            return Err(self.error("RZ1009", "Expected \"in\" in foreach declaration"));
        }
        self.read_identifier();
        let span = {
            self.skip_whitespace();
            self.span()
        };
        let source = self.parse_expr()?;
        self.skip_whitespace();
        self.expect_char(')', "Expected \")\" after foreach declaration")?;
        let body = self.parse_block_body("foreach", start)?;

        Ok(MarkupNode::ForEach {
            variable,
            source,
            span,
            body,
        })
    }

    fn parse_block_body(&mut self, keyword: &str, start: Span) -> ParseResult<Vec<MarkupNode>> {
        self.skip_whitespace();
        if self.peek_char() != Some('{') {
            return Err(self.error(
                "RZ1008",
                format!("Expected \"{{\" to open the {} block", keyword),
            ));
        }
        self.consume_char();
        self.parse_nodes(Some((keyword, start)))
    }

    /// Consume whitespace and `else` when an else branch follows
    fn try_consume_else(&mut self) -> bool {
        let saved = (self.position, self.line, self.column);
        self.skip_whitespace();
        if self.starts_with_keyword("else") {
            self.read_identifier();
            return true;
        }
        (self.position, self.line, self.column) = saved;
        false
    }

    fn parse_expr(&mut self) -> ParseResult<MarkupExpr> {
        self.skip_whitespace();
        match self.peek_char() {
            Some('"') => self.parse_string().map(|s| MarkupExpr::Literal(Value::String(s))),
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number(),
            Some(c) if is_ident_start(c) => {
                let ident = self.read_identifier();
                match ident.as_str() {
                    "true" => return Ok(MarkupExpr::Literal(Value::Bool(true))),
                    "false" => return Ok(MarkupExpr::Literal(Value::Bool(false))),
                    "null" => return Ok(MarkupExpr::Literal(Value::Null)),
                    _ => {}
                }
                self.skip_whitespace_inline();
                if self.peek_char() == Some('(') {
                    self.consume_char();
                    let args = self.parse_arguments()?;
                    return Ok(MarkupExpr::Call { name: ident, args });
                }
                let mut path = vec![ident];
                path.extend(self.parse_path_tail()?);
                Ok(MarkupExpr::Path(path))
            }
            Some(c) => Err(self.error("RZ1001", format!("Unexpected \"{}\" in expression", c))),
            None => Err(self.error("RZ1001", "Expected an expression")),
        }
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<MarkupExpr>> {
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek_char() == Some(')') {
            self.consume_char();
            return Ok(args);
        }

        loop {
            args.push(self.parse_expr()?);
            self.skip_whitespace();
            match self.peek_char() {
                Some(',') => {
                    self.consume_char();
                }
                Some(')') => {
                    self.consume_char();
                    return Ok(args);
                }
                _ => return Err(self.error("RZ1001", "Expected \",\" or \")\" in argument list")),
            }
        }
    }

    fn parse_path(&mut self) -> ParseResult<Vec<String>> {
        let mut path = vec![self.read_identifier()];
        path.extend(self.parse_path_tail()?);
        Ok(path)
    }

    fn parse_path_tail(&mut self) -> ParseResult<Vec<String>> {
        let mut segments = Vec::new();
        while self.peek_char() == Some('.') {
            self.consume_char();
            if !self.peek_char().is_some_and(is_ident_start) {
                return Err(self.error("RZ1001", "Expected member name after \".\""));
            }
            segments.push(self.read_identifier());
        }
        Ok(segments)
    }

    fn parse_string(&mut self) -> ParseResult<String> {
        let start = self.span();
        self.consume_char(); // "
        let mut result = String::new();

        while let Some(ch) = self.consume_char() {
            match ch {
                '"' => return Ok(result),
                '\\' => match self.consume_char() {
                    Some('n') => result.push('\n'),
                    Some('t') => result.push('\t'),
                    Some('r') => result.push('\r'),
                    Some(c @ ('"' | '\\')) => result.push(c),
                    Some(c) => {
                        return Err(self.error(
                            "RZ1002",
                            format!("Unrecognized escape sequence \"\\{}\"", c),
                        ))
                    }
                    None => break,
                },
                '\n' => break,
                _ => result.push(ch),
            }
        }

        Err(self.error_at("RZ1002", "Unterminated string literal", start))
    }

    fn parse_number(&mut self) -> ParseResult<MarkupExpr> {
        let start = self.span();
        let mut lexeme = String::new();
        if self.peek_char() == Some('-') {
            lexeme.push('-');
            self.consume_char();
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || (c == '.' && self.peek_ahead(1).is_some_and(|n| n.is_ascii_digit())) {
                lexeme.push(c);
                self.consume_char();
            } else {
                break;
            }
        }

        let number = if lexeme.contains('.') {
            lexeme.parse::<f64>().ok().and_then(Number::from_f64)
        } else {
            lexeme.parse::<i64>().ok().map(Number::from)
        };

        number
            .map(|n| MarkupExpr::Literal(Value::Number(n)))
            .ok_or_else(|| self.error_at("RZ1003", format!("Invalid number \"{}\"", lexeme), start))
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.consume_char();
            } else {
                break;
            }
        }
        ident
    }

    /// `@` preceded by an alphanumeric character, as in `user@example.com`
    fn is_email_at(&self) -> bool {
        self.position > 0
            && self.chars[self.position - 1].is_alphanumeric()
            && self.peek_ahead(1).is_some_and(|c| c.is_alphanumeric())
    }

    fn starts_with_keyword(&self, keyword: &str) -> bool {
        let len = keyword.chars().count();
        let matches = keyword
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i) == Some(c));
        matches && !self.peek_ahead(len).is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn expect_char(&mut self, expected: char, message: &str) -> ParseResult<()> {
        if self.peek_char() == Some(expected) {
            self.consume_char();
            Ok(())
        } else {
            Err(self.error("RZ1001", message))
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn consume_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.consume_char();
        }
    }

    fn skip_whitespace_inline(&mut self) {
        while self.peek_char().is_some_and(|c| c == ' ' || c == '\t') {
            self.consume_char();
        }
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, id: &str, message: impl Into<String>) -> Diagnostic {
        self.error_at(id, message, self.span())
    }

    fn error_at(&self, id: &str, message: impl Into<String>, span: Span) -> Diagnostic {
        Diagnostic::error(id, message).at(self.document, span.line, span.column)
    }
}

fn flush_text(text: &mut String, nodes: &mut Vec<MarkupNode>) {
    if !text.is_empty() {
        nodes.push(MarkupNode::Text(std::mem::take(text)));
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(content: &str) -> Vec<MarkupNode> {
        MarkupParser::parse(content, "test.cshtml").unwrap()
    }

    fn parse_err(content: &str) -> Diagnostic {
        MarkupParser::parse(content, "test.cshtml")
            .unwrap_err()
            .remove(0)
    }

    fn path(segments: &[&str]) -> MarkupExpr {
        MarkupExpr::Path(segments.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_parse_implicit_expression() {
        let nodes = parse("Hello @Model.Name!");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], MarkupNode::Text("Hello ".to_string()));
        assert!(matches!(
            &nodes[1],
            MarkupNode::Expression { expr, span } if *expr == path(&["Model", "Name"]) && span.column == 8
        ));
        assert_eq!(nodes[2], MarkupNode::Text("!".to_string()));
    }

    #[test]
    fn test_trailing_dot_stays_literal() {
        let nodes = parse("Bye @Model.Name.");
        assert_eq!(nodes.last(), Some(&MarkupNode::Text(".".to_string())));
    }

    #[test]
    fn test_escape_and_email() {
        let nodes = parse("@@home mail me at ada@example.com");
        assert_eq!(
            nodes,
            vec![MarkupNode::Text("@home mail me at ada@example.com".to_string())]
        );
    }

    #[test]
    fn test_comment_is_dropped() {
        let nodes = parse("a@* hidden @Model.X *@b");
        assert_eq!(nodes, vec![MarkupNode::Text("ab".to_string())]);
    }

    #[test]
    fn test_explicit_expression_with_call() {
        let nodes = parse("@(Upper(Model.Name, \"x\"))");
        assert!(matches!(
            &nodes[0],
            MarkupNode::Expression { expr: MarkupExpr::Call { name, args }, .. }
                if name == "Upper" && args.len() == 2
        ));
    }

    #[test]
    fn test_code_block_assignments() {
        let nodes = parse("@{ Model.Counter = 1; Model.Label = \"a\\\"b\"; }");
        let MarkupNode::Code(statements) = &nodes[0] else {
            panic!("expected code block");
        };
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].target, vec!["Model", "Counter"]);
        assert_eq!(statements[0].value, MarkupExpr::Literal(json!(1)));
        assert_eq!(statements[1].value, MarkupExpr::Literal(json!("a\"b")));
    }

    #[test]
    fn test_if_else_blocks() {
        let nodes = parse("@if (Model.Show) {yes} else {no}");
        let MarkupNode::If {
            condition,
            then,
            otherwise,
            ..
        } = &nodes[0]
        else {
            panic!("expected if block");
        };
        assert_eq!(*condition, path(&["Model", "Show"]));
        assert_eq!(then, &vec![MarkupNode::Text("yes".to_string())]);
        assert_eq!(otherwise, &vec![MarkupNode::Text("no".to_string())]);
    }

    #[test]
    fn test_if_without_else_keeps_following_whitespace() {
        let nodes = parse("@if (Model.Show) {yes} tail");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1], MarkupNode::Text(" tail".to_string()));
    }

    #[test]
    fn test_else_if_chain() {
        let nodes = parse("@if (Model.A) {a} else if (Model.B) {b} else {c}");
        let MarkupNode::If { otherwise, .. } = &nodes[0] else {
            panic!("expected if block");
        };
        assert!(matches!(&otherwise[0], MarkupNode::If { otherwise, .. } if otherwise.len() == 1));
    }

    #[test]
    fn test_foreach_block_with_nested_braces() {
        let nodes = parse("@foreach (var item in Model.Items) {{@item.Name}}");
        let MarkupNode::ForEach {
            variable,
            source,
            body,
            ..
        } = &nodes[0]
        else {
            panic!("expected foreach block");
        };
        assert_eq!(variable, "item");
        assert_eq!(*source, path(&["Model", "Items"]));
        assert_eq!(body.len(), 3);
        assert_eq!(body[0], MarkupNode::Text("{".to_string()));
        assert_eq!(body[2], MarkupNode::Text("}".to_string()));
    }

    #[test]
    fn test_unterminated_comment() {
        let diagnostic = parse_err("a @* never closed");
        assert_eq!(diagnostic.id, "RZ1004");
        assert_eq!(diagnostic.location.unwrap().column, 3);
    }

    #[test]
    fn test_unclosed_if_block() {
        let diagnostic = parse_err("@if (Model.A) { open");
        assert_eq!(diagnostic.id, "RZ1006");
    }

    #[test]
    fn test_invalid_transition() {
        assert_eq!(parse_err("cost: @ 5").id, "RZ1005");
        assert_eq!(parse_err("end @").id, "RZ1005");
    }

    #[test]
    fn test_unterminated_explicit_expression() {
        let diagnostic = parse_err("@(Model.Name");
        assert_eq!(diagnostic.id, "RZ1001");
    }

    #[test]
    fn test_diagnostic_line_tracking() {
        let diagnostic = parse_err("line one\nline two @(\"open");
        let location = diagnostic.location.unwrap();
        assert_eq!(diagnostic.id, "RZ1002");
        assert_eq!(location.line, 2);
        assert_eq!(location.document, "test.cshtml");
    }
}
