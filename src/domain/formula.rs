//! Feature model to propositional logic
//!
//! Turns the feature tree and cross-tree constraints of a model into one
//! textual formula per line:
//!
//! 1. the root, asserted true
//! 2. one line per relation, in stack order from the root
//! 3. one line per constraint, in source order
//!
//! | Kind | Line |
//! |------|------|
//! | Mandatory | `p <-> c` |
//! | Optional | `c -> p` |
//! | Or | `p <-> (c1 or ... or cn)` |
//! | Alternative | `(ci <-> (not cj and ... and p))` per child, joined by `and` |
//! | Mutex | `(p <-> not (c1 or ... or cn)) or (<alternative>)` |
//! | Cardinality | `p <-> (T1 or T2 ...)`, one term per admissible child subset |
//!
//! Cardinality expansion enumerates every k-subset for k in `[min, max]` and
//! grows combinatorially with the number of children. No cap is applied.

use thiserror::Error;

use super::expr::Connective;
use super::model::{validate_shape, FeatureId, FeatureModel, ModelError, Relation, RelationKind};
use super::names::NameMapping;

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("Malformed relation: {0}")]
    Structure(#[from] ModelError),

    #[error("Feature has no sanitized name: {0}")]
    Unmapped(String),
}

/// Ordered propositional formulas for one model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formula {
    lines: Vec<String>,
}

impl Formula {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Expressions file content: one formula per line, newline-terminated
    pub fn to_expressions(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Compiles a feature model through a name mapping
pub struct FormulaCompiler<'a> {
    model: &'a FeatureModel,
    mapping: &'a NameMapping,
}

impl<'a> FormulaCompiler<'a> {
    pub fn new(model: &'a FeatureModel, mapping: &'a NameMapping) -> Self {
        Self { model, mapping }
    }

    /// Produces the formula; a model without a root yields an empty one
    pub fn compile(&self) -> Result<Formula, CompileError> {
        let root = match self.model.root() {
            Some(root) => root,
            None => return Ok(Formula::default()),
        };

        let mut lines = vec![self.name(root.id)?.to_string()];

        let mut stack = vec![root.id];
        while let Some(feature) = stack.pop() {
            for relation in self.model.relations_of(feature) {
                lines.push(self.relation(relation)?);
                stack.extend(relation.children.iter().copied());
            }
        }

        for constraint in self.model.constraints() {
            let expr = constraint.expr();
            for var in expr.variables() {
                self.sanitized(var)?;
            }
            lines.push(expr.render(&|name: &str| {
                self.mapping.get(name).unwrap_or(name).to_string()
            }));
        }

        Ok(Formula { lines })
    }

    fn sanitized(&self, original: &str) -> Result<&'a str, CompileError> {
        self.mapping
            .get(original)
            .ok_or_else(|| CompileError::Unmapped(original.to_string()))
    }

    fn name(&self, id: FeatureId) -> Result<&'a str, CompileError> {
        self.sanitized(&self.model.feature(id).name)
    }

    fn relation(&self, relation: &Relation) -> Result<String, CompileError> {
        let parent = self.name(relation.parent)?;
        validate_shape(parent, relation.children.len(), relation.kind)?;

        let children = relation
            .children
            .iter()
            .map(|c| self.name(*c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match relation.kind {
            RelationKind::Mandatory => mandatory(parent, children[0]),
            RelationKind::Optional => optional(parent, children[0]),
            RelationKind::Or => or_group(parent, &children),
            RelationKind::Alternative => alternative(parent, &children),
            RelationKind::Mutex => mutex(parent, &children),
            RelationKind::Cardinality { min, max } => cardinality(parent, &children, min, max),
        })
    }
}

/// Convenience wrapper over [`FormulaCompiler`]
pub fn compile(model: &FeatureModel, mapping: &NameMapping) -> Result<Formula, CompileError> {
    FormulaCompiler::new(model, mapping).compile()
}

fn join(items: &[String], op: Connective) -> String {
    items.join(&format!(" {} ", op.token()))
}

fn negated(name: &str) -> String {
    format!("{} {}", Connective::Not.token(), name)
}

fn mandatory(parent: &str, child: &str) -> String {
    format!("{} {} {}", parent, Connective::Equiv.token(), child)
}

fn optional(parent: &str, child: &str) -> String {
    format!("{} {} {}", child, Connective::Implies.token(), parent)
}

fn or_group(parent: &str, children: &[&str]) -> String {
    let names: Vec<String> = children.iter().map(|c| c.to_string()).collect();
    format!(
        "{} {} ({})",
        parent,
        Connective::Equiv.token(),
        join(&names, Connective::Or)
    )
}

fn alternative(parent: &str, children: &[&str]) -> String {
    let per_child: Vec<String> = children
        .iter()
        .enumerate()
        .map(|(i, child)| {
            let mut conjuncts: Vec<String> = children
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, other)| negated(other))
                .collect();
            conjuncts.push(parent.to_string());
            format!(
                "({} {} ({}))",
                child,
                Connective::Equiv.token(),
                join(&conjuncts, Connective::And)
            )
        })
        .collect();
    join(&per_child, Connective::And)
}

fn mutex(parent: &str, children: &[&str]) -> String {
    let names: Vec<String> = children.iter().map(|c| c.to_string()).collect();
    format!(
        "({} {} {} ({})) {} ({})",
        parent,
        Connective::Equiv.token(),
        Connective::Not.token(),
        join(&names, Connective::Or),
        Connective::Or.token(),
        alternative(parent, children)
    )
}

fn cardinality(parent: &str, children: &[&str], min: usize, max: usize) -> String {
    let mut terms = Vec::new();
    for k in min..=max {
        for selected in Combinations::new(children.len(), k) {
            let mut literals: Vec<String> =
                selected.iter().map(|i| children[*i].to_string()).collect();
            literals.extend(
                (0..children.len())
                    .filter(|i| !selected.contains(i))
                    .map(|i| negated(children[i])),
            );
            terms.push(join(&literals, Connective::And));
        }
    }

    format!(
        "{} {} ({})",
        parent,
        Connective::Equiv.token(),
        join(&terms, Connective::Or)
    )
}

/// Lexicographic k-subsets of `0..n`
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let current = self.indices.clone();
        let k = self.indices.len();

        // Rightmost index that can still move forward
        match (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Expr;
    use std::collections::HashMap;

    /// Evaluates a line of toolchain syntax
    ///
    /// Precedence from tightest: `not`, `and`, `or`/`XOR`, `->`, `<->`.
    fn eval(line: &str, values: &HashMap<String, bool>) -> bool {
        let spaced = line.replace('(', " ( ").replace(')', " ) ");
        let tokens: Vec<&str> = spaced.split_whitespace().collect();
        let mut pos = 0;
        let result = equiv(&tokens, &mut pos, values);
        assert_eq!(pos, tokens.len(), "trailing tokens in {:?}", line);
        result
    }

    fn equiv(t: &[&str], pos: &mut usize, v: &HashMap<String, bool>) -> bool {
        let mut left = implies(t, pos, v);
        while t.get(*pos) == Some(&"<->") {
            *pos += 1;
            left = left == implies(t, pos, v);
        }
        left
    }

    fn implies(t: &[&str], pos: &mut usize, v: &HashMap<String, bool>) -> bool {
        let left = disjunction(t, pos, v);
        if t.get(*pos) == Some(&"->") {
            *pos += 1;
            let right = implies(t, pos, v);
            return !left || right;
        }
        left
    }

    fn disjunction(t: &[&str], pos: &mut usize, v: &HashMap<String, bool>) -> bool {
        let mut left = conjunction(t, pos, v);
        loop {
            match t.get(*pos) {
                Some(&"or") => {
                    *pos += 1;
                    let right = conjunction(t, pos, v);
                    left = left || right;
                }
                Some(&"XOR") => {
                    *pos += 1;
                    let right = conjunction(t, pos, v);
                    left = left != right;
                }
                _ => return left,
            }
        }
    }

    fn conjunction(t: &[&str], pos: &mut usize, v: &HashMap<String, bool>) -> bool {
        let mut left = unary(t, pos, v);
        while t.get(*pos) == Some(&"and") {
            *pos += 1;
            let right = unary(t, pos, v);
            left = left && right;
        }
        left
    }

    fn unary(t: &[&str], pos: &mut usize, v: &HashMap<String, bool>) -> bool {
        let token = t[*pos];
        *pos += 1;
        match token {
            "not" => !unary(t, pos, v),
            "(" => {
                let inner = equiv(t, pos, v);
                assert_eq!(t[*pos], ")");
                *pos += 1;
                inner
            }
            name => *v.get(name).unwrap_or_else(|| panic!("unbound {}", name)),
        }
    }

    /// Model `p` with one relation over `n` children named c0..c{n-1}
    fn single_relation(n: usize, kind: RelationKind) -> (FeatureModel, NameMapping) {
        let mut model = FeatureModel::new();
        let p = model.add_feature("p").unwrap();
        let children: Vec<_> = (0..n)
            .map(|i| model.add_feature(format!("c{}", i)).unwrap())
            .collect();
        model.set_root(p).unwrap();
        model.add_relation(p, children, kind).unwrap();
        let mapping = NameMapping::sanitize(model.feature_names());
        (model, mapping)
    }

    /// Calls `check(p, selected_children, formula_value)` for every assignment
    fn truth_table(n: usize, kind: RelationKind, check: impl Fn(bool, usize, bool)) {
        let (model, mapping) = single_relation(n, kind);
        let formula = compile(&model, &mapping).unwrap();
        assert_eq!(formula.len(), 2);
        let line = &formula.lines()[1];

        for bits in 0..(1u32 << (n + 1)) {
            let mut values = HashMap::new();
            let p = bits & 1 == 1;
            values.insert("p".to_string(), p);
            let mut count = 0;
            for i in 0..n {
                let on = bits >> (i + 1) & 1 == 1;
                if on {
                    count += 1;
                }
                values.insert(format!("c{}", i), on);
            }
            check(p, count, eval(line, &values));
        }
    }

    #[test]
    fn mandatory_is_equivalence() {
        truth_table(1, RelationKind::Mandatory, |p, count, value| {
            assert_eq!(value, p == (count == 1));
        });
    }

    #[test]
    fn optional_child_implies_parent() {
        truth_table(1, RelationKind::Optional, |p, count, value| {
            assert_eq!(value, count == 0 || p);
        });
    }

    #[test]
    fn or_group_needs_one_child_iff_parent() {
        for n in 1..=4 {
            truth_table(n, RelationKind::Or, |p, count, value| {
                assert_eq!(value, p == (count >= 1));
            });
        }
    }

    #[test]
    fn alternative_is_exactly_one() {
        for n in 1..=5 {
            truth_table(n, RelationKind::Alternative, |p, count, value| {
                let expected = (p && count == 1) || (!p && count == 0);
                assert_eq!(value, expected, "n={} p={} count={}", n, p, count);
            });
        }
    }

    #[test]
    fn cardinality_counts_selected_children() {
        for n in 1..=4 {
            for min in 0..=n {
                for max in min..=n {
                    truth_table(n, RelationKind::Cardinality { min, max }, |p, count, value| {
                        let in_range = count >= min && count <= max;
                        assert_eq!(value, p == in_range, "n={} [{}..{}] p={} count={}", n, min, max, p, count);
                    });
                }
            }
        }
    }

    #[test]
    fn mutex_allows_at_most_one_under_parent() {
        for n in 2..=4 {
            truth_table(n, RelationKind::Mutex, |p, count, value| {
                if p {
                    assert_eq!(value, count <= 1);
                } else {
                    // The construction leaves children unconstrained when the
                    // parent is deselected
                    assert!(value);
                }
            });
        }
    }

    #[test]
    fn relation_lines_have_expected_shape() {
        let (model, mapping) = single_relation(3, RelationKind::Or);
        assert_eq!(compile(&model, &mapping).unwrap().lines()[1], "p <-> (c0 or c1 or c2)");

        let (model, mapping) = single_relation(2, RelationKind::Alternative);
        assert_eq!(
            compile(&model, &mapping).unwrap().lines()[1],
            "(c0 <-> (not c1 and p)) and (c1 <-> (not c0 and p))"
        );

        let (model, mapping) = single_relation(1, RelationKind::Alternative);
        assert_eq!(compile(&model, &mapping).unwrap().lines()[1], "(c0 <-> (p))");

        let (model, mapping) = single_relation(2, RelationKind::Mutex);
        assert_eq!(
            compile(&model, &mapping).unwrap().lines()[1],
            "(p <-> not (c0 or c1)) or ((c0 <-> (not c1 and p)) and (c1 <-> (not c0 and p)))"
        );
    }

    #[test]
    fn cardinality_omits_empty_conjuncts() {
        let (model, mapping) = single_relation(2, RelationKind::Cardinality { min: 0, max: 2 });
        assert_eq!(
            compile(&model, &mapping).unwrap().lines()[1],
            "p <-> (not c0 and not c1 or c0 and not c1 or c1 and not c0 or c0 and c1)"
        );
    }

    #[test]
    fn end_to_end_lines() {
        let mut model = FeatureModel::new();
        let r = model.add_feature("R").unwrap();
        let a = model.add_feature("A").unwrap();
        model.add_feature("B").unwrap();
        model.set_root(r).unwrap();
        model.add_relation(r, vec![a], RelationKind::Mandatory).unwrap();
        model
            .add_constraint(Expr::and(Expr::var("A"), Expr::var("B")))
            .unwrap();

        let mapping = NameMapping::sanitize(model.feature_names());
        let formula = compile(&model, &mapping).unwrap();

        assert_eq!(formula.to_expressions(), "R\nR <-> A\nA and B\n");
    }

    #[test]
    fn no_root_gives_empty_formula() {
        let mut model = FeatureModel::new();
        model.add_feature("Orphan").unwrap();
        let mapping = NameMapping::sanitize(model.feature_names());

        let formula = compile(&model, &mapping).unwrap();
        assert!(formula.is_empty());
        assert_eq!(formula.to_expressions(), "");
    }

    #[test]
    fn traversal_is_stack_ordered_and_deterministic() {
        let mut model = FeatureModel::new();
        let r = model.add_feature("R").unwrap();
        let a = model.add_feature("A").unwrap();
        let b = model.add_feature("B").unwrap();
        let a1 = model.add_feature("A1").unwrap();
        let b1 = model.add_feature("B1").unwrap();
        model.set_root(r).unwrap();
        model.add_relation(r, vec![a], RelationKind::Mandatory).unwrap();
        model.add_relation(r, vec![b], RelationKind::Optional).unwrap();
        model.add_relation(a, vec![a1], RelationKind::Optional).unwrap();
        model.add_relation(b, vec![b1], RelationKind::Mandatory).unwrap();

        let mapping = NameMapping::sanitize(model.feature_names());
        let first = compile(&model, &mapping).unwrap();
        let second = compile(&model, &mapping).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.lines(),
            &["R", "R <-> A", "B -> R", "B <-> B1", "A1 -> A"]
        );
    }

    #[test]
    fn sanitized_names_flow_into_relations_and_constraints() {
        let mut model = FeatureModel::new();
        let r = model.add_feature("My Root").unwrap();
        let a = model.add_feature("not").unwrap();
        model.set_root(r).unwrap();
        model.add_relation(r, vec![a], RelationKind::Optional).unwrap();
        model
            .add_constraint(Expr::excludes(Expr::var("not"), Expr::var("My Root")))
            .unwrap();

        let mapping = NameMapping::sanitize(model.feature_names());
        let formula = compile(&model, &mapping).unwrap();

        assert_eq!(
            formula.lines(),
            &["My_Root", "not_ -> My_Root", "not_ -> not My_Root"]
        );
    }

    #[test]
    fn unmapped_feature_fails_fast() {
        let (model, _) = single_relation(2, RelationKind::Or);
        let partial = NameMapping::sanitize(["p", "c0"]);

        assert_eq!(
            compile(&model, &partial),
            Err(CompileError::Unmapped("c1".to_string()))
        );
    }

    #[test]
    fn combinations_are_lexicographic() {
        let all: Vec<_> = Combinations::new(4, 2).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(Combinations::new(3, 0).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
        assert_eq!(Combinations::new(2, 3).count(), 0);
    }
}
