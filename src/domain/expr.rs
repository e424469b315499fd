//! Cross-tree constraint expressions
//!
//! Constraints are kept as a boolean AST over feature names and rendered
//! directly into the connective vocabulary of the logic toolchain:
//!
//! | Operator | Rendered |
//! |----------|----------|
//! | NOT | `not a` |
//! | AND | `a and b` |
//! | OR | `a or b` |
//! | IMPLIES, REQUIRES | `a -> b` |
//! | EXCLUDES | `a -> not b` |
//! | EQUIV | `a <-> b` |
//! | XOR | `a XOR b` |

/// Connectives understood by the logic toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    Not,
    And,
    Or,
    Implies,
    Equiv,
    Xor,
}

impl Connective {
    pub fn token(&self) -> &'static str {
        match self {
            Connective::Not => "not",
            Connective::And => "and",
            Connective::Or => "or",
            Connective::Implies => "->",
            Connective::Equiv => "<->",
            Connective::Xor => "XOR",
        }
    }

    fn is_associative(&self) -> bool {
        matches!(self, Connective::And | Connective::Or)
    }
}

/// Boolean expression over feature names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Equiv(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Requires(Box<Expr>, Box<Expr>),
    Excludes(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(e: Expr) -> Self {
        Expr::Not(Box::new(e))
    }

    pub fn and(l: Expr, r: Expr) -> Self {
        Expr::And(Box::new(l), Box::new(r))
    }

    pub fn or(l: Expr, r: Expr) -> Self {
        Expr::Or(Box::new(l), Box::new(r))
    }

    pub fn implies(l: Expr, r: Expr) -> Self {
        Expr::Implies(Box::new(l), Box::new(r))
    }

    pub fn equiv(l: Expr, r: Expr) -> Self {
        Expr::Equiv(Box::new(l), Box::new(r))
    }

    pub fn xor(l: Expr, r: Expr) -> Self {
        Expr::Xor(Box::new(l), Box::new(r))
    }

    pub fn requires(l: Expr, r: Expr) -> Self {
        Expr::Requires(Box::new(l), Box::new(r))
    }

    pub fn excludes(l: Expr, r: Expr) -> Self {
        Expr::Excludes(Box::new(l), Box::new(r))
    }

    /// Feature names in order of first appearance
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Var(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Not(e) => e.collect_variables(names),
            Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Implies(l, r)
            | Expr::Equiv(l, r)
            | Expr::Xor(l, r)
            | Expr::Requires(l, r)
            | Expr::Excludes(l, r) => {
                l.collect_variables(names);
                r.collect_variables(names);
            }
        }
    }

    /// Evaluates under an assignment of feature names to values
    pub fn eval(&self, value: &impl Fn(&str) -> bool) -> bool {
        match self {
            Expr::Var(name) => value(name.as_str()),
            Expr::Not(e) => !e.eval(value),
            Expr::And(l, r) => l.eval(value) && r.eval(value),
            Expr::Or(l, r) => l.eval(value) || r.eval(value),
            Expr::Implies(l, r) | Expr::Requires(l, r) => !l.eval(value) || r.eval(value),
            Expr::Excludes(l, r) => !l.eval(value) || !r.eval(value),
            Expr::Equiv(l, r) => l.eval(value) == r.eval(value),
            Expr::Xor(l, r) => l.eval(value) != r.eval(value),
        }
    }

    /// The binary connective at the top of this node, if any
    fn connective(&self) -> Option<Connective> {
        match self {
            Expr::Var(_) | Expr::Not(_) => None,
            Expr::And(..) => Some(Connective::And),
            Expr::Or(..) => Some(Connective::Or),
            Expr::Implies(..) | Expr::Requires(..) | Expr::Excludes(..) => {
                Some(Connective::Implies)
            }
            Expr::Equiv(..) => Some(Connective::Equiv),
            Expr::Xor(..) => Some(Connective::Xor),
        }
    }

    /// Renders into toolchain syntax, resolving names through `resolve`
    ///
    /// Nested binary operators are always parenthesised, except chains of the
    /// same associative operator.
    pub fn render(&self, resolve: &impl Fn(&str) -> String) -> String {
        let mut out = String::new();
        self.write(&mut out, resolve);
        out
    }

    fn write(&self, out: &mut String, resolve: &impl Fn(&str) -> String) {
        match self {
            Expr::Var(name) => out.push_str(&resolve(name.as_str())),
            Expr::Not(e) => {
                out.push_str(Connective::Not.token());
                out.push(' ');
                e.write_operand(out, None, resolve);
            }
            Expr::Excludes(l, r) => {
                l.write_operand(out, Some(Connective::Implies), resolve);
                out.push_str(" -> not ");
                r.write_operand(out, None, resolve);
            }
            Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Implies(l, r)
            | Expr::Equiv(l, r)
            | Expr::Xor(l, r)
            | Expr::Requires(l, r) => {
                let op = self.connective();
                l.write_operand(out, op, resolve);
                if let Some(op) = op {
                    out.push(' ');
                    out.push_str(op.token());
                    out.push(' ');
                }
                r.write_operand(out, op, resolve);
            }
        }
    }

    fn write_operand(
        &self,
        out: &mut String,
        parent: Option<Connective>,
        resolve: &impl Fn(&str) -> String,
    ) {
        let wrap = match (self.connective(), parent) {
            (None, _) => false,
            (Some(own), Some(p)) => !(own == p && own.is_associative()),
            (Some(_), None) => true,
        };

        if wrap {
            out.push('(');
            self.write(out, resolve);
            out.push(')');
        } else {
            self.write(out, resolve);
        }
    }
}

/// A cross-tree constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    expr: Expr,
}

impl Constraint {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}
