//! UVL feature model reader
//!
//! Reads the boolean subset of the Universal Variability Language:
//!
//! ```text
//! namespace Pizza
//!
//! features
//!     Pizza {abstract}
//!         mandatory
//!             Topping
//!         alternative
//!             Normal
//!             "Big Size"
//!         [1..*]
//!             Cheese
//!             Ham
//!
//! constraints
//!     Ham => !"Big Size"
//! ```
//!
//! Indentation gives structure: a feature's children are group keywords, a
//! group's children are features. Constraint operators bind `!`, `&`, `|`,
//! `=>`, `<=>` from tightest to loosest. Arithmetic and comparison
//! constraints are skipped with a warning.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::domain::{Expr, FeatureId, FeatureModel, ModelError, RelationKind};

/// Syntax error with the 1-based source line (0 when not tied to a line)
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct UvlError {
    pub line: usize,
    pub message: String,
}

impl UvlError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    fn model(line: usize, err: ModelError) -> Self {
        Self::new(line, err.to_string())
    }
}

/// Source of feature models for the pipeline
pub trait ModelReader {
    fn read(&self, path: &Path) -> Result<FeatureModel, UvlError>;
}

/// Result of parsing one UVL document
#[derive(Debug, Clone)]
pub struct UvlDocument {
    pub model: FeatureModel,
    pub namespace: Option<String>,
    /// Constraints dropped because they use arithmetic or comparisons
    pub skipped_constraints: usize,
}

/// Reader for `.uvl` files
#[derive(Debug, Clone, Copy, Default)]
pub struct UvlReader;

impl UvlReader {
    pub fn new() -> Self {
        Self
    }

    /// Parses UVL source text
    pub fn parse(&self, source: &str) -> Result<UvlDocument, UvlError> {
        Parser::default().run(source)
    }
}

impl ModelReader for UvlReader {
    fn read(&self, path: &Path) -> Result<FeatureModel, UvlError> {
        let source = fs::read_to_string(path)
            .map_err(|e| UvlError::new(0, format!("cannot read {}: {}", path.display(), e)))?;
        self.parse(&source).map(|doc| doc.model)
    }
}

const TYPE_KEYWORDS: [&str; 4] = ["Boolean", "Integer", "Real", "String"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Namespace,
    Imports,
    Include,
    Features,
    Constraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Mandatory,
    Optional,
    Or,
    Alternative,
    Bounds { min: usize, max: Option<usize> },
}

#[derive(Debug)]
enum Frame {
    Feature {
        indent: usize,
        id: FeatureId,
    },
    Group {
        indent: usize,
        line: usize,
        parent: FeatureId,
        kind: GroupKind,
        children: Vec<FeatureId>,
    },
}

impl Frame {
    fn indent(&self) -> usize {
        match self {
            Frame::Feature { indent, .. } | Frame::Group { indent, .. } => *indent,
        }
    }
}

#[derive(Default)]
struct Parser {
    model: FeatureModel,
    namespace: Option<String>,
    skipped: usize,
    stack: Vec<Frame>,
}

impl Parser {
    fn run(mut self, source: &str) -> Result<UvlDocument, UvlError> {
        let mut section = Section::None;

        for (idx, raw) in source.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw);
            if line.trim().is_empty() {
                continue;
            }

            let indent = indentation(line);
            let content = line.trim();

            if indent == 0 {
                if section == Section::Features {
                    self.close_frames(0)?;
                }
                section = self.open_section(content, line_no)?;
                continue;
            }

            match section {
                Section::None => {
                    return Err(UvlError::new(line_no, "indented line outside any section"))
                }
                Section::Namespace | Section::Imports | Section::Include => {}
                Section::Features => self.feature_line(indent, content, line_no)?,
                Section::Constraints => self.constraint_line(content, line_no)?,
            }
        }

        self.close_frames(0)?;

        Ok(UvlDocument {
            model: self.model,
            namespace: self.namespace,
            skipped_constraints: self.skipped,
        })
    }

    fn open_section(&mut self, content: &str, line_no: usize) -> Result<Section, UvlError> {
        let mut words = content.split_whitespace();
        let keyword = words.next().unwrap_or_default();

        match keyword {
            "namespace" => {
                self.namespace = words.next().map(|n| n.trim_matches('"').to_string());
                Ok(Section::Namespace)
            }
            "imports" => Ok(Section::Imports),
            "include" => Ok(Section::Include),
            "features" => Ok(Section::Features),
            "constraints" => Ok(Section::Constraints),
            other => Err(UvlError::new(line_no, format!("unknown section '{}'", other))),
        }
    }

    /// Pops every frame indented at or beyond `indent`, emitting group relations
    fn close_frames(&mut self, indent: usize) -> Result<(), UvlError> {
        while self.stack.last().is_some_and(|f| f.indent() >= indent) {
            if let Some(Frame::Group {
                line,
                parent,
                kind,
                children,
                ..
            }) = self.stack.pop()
            {
                self.emit_group(line, parent, kind, children)?;
            }
        }
        Ok(())
    }

    fn emit_group(
        &mut self,
        line: usize,
        parent: FeatureId,
        kind: GroupKind,
        children: Vec<FeatureId>,
    ) -> Result<(), UvlError> {
        if children.is_empty() {
            return Ok(());
        }

        let relation = match kind {
            GroupKind::Mandatory | GroupKind::Optional => {
                let single = if kind == GroupKind::Mandatory {
                    RelationKind::Mandatory
                } else {
                    RelationKind::Optional
                };
                for child in children {
                    self.model
                        .add_relation(parent, vec![child], single)
                        .map_err(|e| UvlError::model(line, e))?;
                }
                return Ok(());
            }
            GroupKind::Or => RelationKind::Or,
            GroupKind::Alternative => RelationKind::Alternative,
            GroupKind::Bounds { min, max } => {
                let max = max.unwrap_or(children.len());
                if min > max || max > children.len() {
                    return Err(UvlError::new(
                        line,
                        format!(
                            "invalid group bounds [{}..{}] for {} children",
                            min,
                            max,
                            children.len()
                        ),
                    ));
                }
                RelationKind::from_bounds(min, max, children.len())
            }
        };

        self.model
            .add_relation(parent, children, relation)
            .map_err(|e| UvlError::model(line, e))
    }

    fn feature_line(&mut self, indent: usize, content: &str, line_no: usize) -> Result<(), UvlError> {
        self.close_frames(indent)?;

        match self.stack.last() {
            None => {
                if self.model.root().is_some() {
                    return Err(UvlError::new(line_no, "a model can only have one root feature"));
                }
                let name = parse_feature_name(content, line_no)?;
                let id = self
                    .model
                    .add_feature(name)
                    .map_err(|e| UvlError::model(line_no, e))?;
                self.model
                    .set_root(id)
                    .map_err(|e| UvlError::model(line_no, e))?;
                self.stack.push(Frame::Feature { indent, id });
            }
            Some(Frame::Feature { id, .. }) => {
                let parent = *id;
                let kind = parse_group(content, line_no)?;
                self.stack.push(Frame::Group {
                    indent,
                    line: line_no,
                    parent,
                    kind,
                    children: Vec::new(),
                });
            }
            Some(Frame::Group { .. }) => {
                let name = parse_feature_name(content, line_no)?;
                let id = self
                    .model
                    .add_feature(name)
                    .map_err(|e| UvlError::model(line_no, e))?;
                if let Some(Frame::Group { children, .. }) = self.stack.last_mut() {
                    children.push(id);
                }
                self.stack.push(Frame::Feature { indent, id });
            }
        }

        Ok(())
    }

    fn constraint_line(&mut self, content: &str, line_no: usize) -> Result<(), UvlError> {
        let tokens = tokenize(content, line_no)?;

        if tokens.iter().any(|t| matches!(t, Token::Arithmetic(_))) {
            tracing::warn!(line = line_no, constraint = content, "Skipping non-boolean constraint");
            self.skipped += 1;
            return Ok(());
        }

        let mut cursor = Cursor {
            tokens: &tokens,
            pos: 0,
            line: line_no,
        };
        let expr = cursor.equiv()?;
        if cursor.pos != tokens.len() {
            return Err(UvlError::new(line_no, "unexpected trailing tokens in constraint"));
        }

        self.model
            .add_constraint(expr)
            .map_err(|e| UvlError::model(line_no, e))
    }
}

/// Removes a `//` comment that is not inside a quoted name
fn strip_comment(line: &str) -> &str {
    let mut in_quote = false;
    let bytes = line.as_bytes();
    for i in 0..bytes.len() {
        match bytes[i] {
            b'"' => in_quote = !in_quote,
            b'/' if !in_quote && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Leading whitespace width, counting a tab as four columns
fn indentation(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn parse_feature_name(content: &str, line_no: usize) -> Result<String, UvlError> {
    let mut rest = content;
    if let Some((first, tail)) = content.split_once(char::is_whitespace) {
        if TYPE_KEYWORDS.contains(&first) {
            rest = tail.trim_start();
        }
    }

    if let Some(quoted) = rest.strip_prefix('"') {
        return match quoted.find('"') {
            Some(end) => Ok(quoted[..end].to_string()),
            None => Err(UvlError::new(line_no, "unterminated quoted feature name")),
        };
    }

    let name: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '{')
        .collect();
    if name.is_empty() {
        return Err(UvlError::new(line_no, "expected a feature name"));
    }
    Ok(name)
}

fn parse_group(content: &str, line_no: usize) -> Result<GroupKind, UvlError> {
    match content {
        "mandatory" => return Ok(GroupKind::Mandatory),
        "optional" => return Ok(GroupKind::Optional),
        "or" => return Ok(GroupKind::Or),
        "alternative" => return Ok(GroupKind::Alternative),
        _ => {}
    }

    let bounds = content
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| {
            UvlError::new(line_no, format!("expected a group keyword, found '{}'", content))
        })?;

    let invalid = || UvlError::new(line_no, format!("invalid group bounds '{}'", content));
    let parse = |s: &str| s.trim().parse::<usize>().map_err(|_| invalid());

    match bounds.split_once("..") {
        None => {
            let n = parse(bounds)?;
            Ok(GroupKind::Bounds { min: n, max: Some(n) })
        }
        Some((min, max)) => {
            let min = parse(min)?;
            let max = if max.trim() == "*" { None } else { Some(parse(max)?) };
            if max.is_some_and(|m| m < min) {
                return Err(invalid());
            }
            Ok(GroupKind::Bounds { min, max })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Not,
    And,
    Or,
    Implies,
    Equiv,
    LParen,
    RParen,
    Arithmetic(String),
}

fn tokenize(content: &str, line_no: usize) -> Result<Vec<Token>, UvlError> {
    let mut tokens = Vec::new();
    let mut chars = content.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '!' if chars.peek().map(|(_, n)| *n) == Some('=') => {
                chars.next();
                tokens.push(Token::Arithmetic("!=".to_string()));
            }
            '!' => tokens.push(Token::Not),
            '&' => tokens.push(Token::And),
            '|' => tokens.push(Token::Or),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '"' => {
                let rest = &content[start + 1..];
                let end = rest
                    .find('"')
                    .ok_or_else(|| UvlError::new(line_no, "unterminated quoted name"))?;
                tokens.push(Token::Name(rest[..end].to_string()));
                // Skip the quoted body and the closing quote
                for _ in 0..rest[..end].chars().count() + 1 {
                    chars.next();
                }
            }
            '=' | '<' | '>' => {
                let rest = &content[start..];
                if rest.starts_with("<=>") {
                    chars.next();
                    chars.next();
                    tokens.push(Token::Equiv);
                } else if rest.starts_with("=>") {
                    chars.next();
                    tokens.push(Token::Implies);
                } else {
                    tokens.push(Token::Arithmetic(c.to_string()));
                }
            }
            '+' | '-' | '*' | '/' | ',' => tokens.push(Token::Arithmetic(c.to_string())),
            _ => {
                let mut name = String::from(c);
                while let Some((_, n)) = chars.peek() {
                    if n.is_whitespace() || "!&|()\"=<>+-*/,".contains(*n) {
                        break;
                    }
                    name.push(*n);
                    chars.next();
                }
                if name.parse::<f64>().is_ok() {
                    tokens.push(Token::Arithmetic(name));
                } else {
                    tokens.push(Token::Name(name));
                }
            }
        }
    }

    Ok(tokens)
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn equiv(&mut self) -> Result<Expr, UvlError> {
        let mut left = self.implies()?;
        while self.eat(&Token::Equiv) {
            let right = self.implies()?;
            left = Expr::equiv(left, right);
        }
        Ok(left)
    }

    fn implies(&mut self) -> Result<Expr, UvlError> {
        let left = self.disjunction()?;
        if self.eat(&Token::Implies) {
            let right = self.implies()?;
            return Ok(Expr::implies(left, right));
        }
        Ok(left)
    }

    fn disjunction(&mut self) -> Result<Expr, UvlError> {
        let mut left = self.conjunction()?;
        while self.eat(&Token::Or) {
            let right = self.conjunction()?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn conjunction(&mut self) -> Result<Expr, UvlError> {
        let mut left = self.unary()?;
        while self.eat(&Token::And) {
            let right = self.unary()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, UvlError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| UvlError::new(self.line, "constraint ends unexpectedly"))?;
        self.pos += 1;

        match token {
            Token::Not => Ok(Expr::not(self.unary()?)),
            Token::LParen => {
                let inner = self.equiv()?;
                if !self.eat(&Token::RParen) {
                    return Err(UvlError::new(self.line, "missing ')' in constraint"));
                }
                Ok(inner)
            }
            Token::Name(name) => Ok(Expr::var(name)),
            other => Err(UvlError::new(
                self.line,
                format!("unexpected {:?} in constraint", other),
            )),
        }
    }
}
