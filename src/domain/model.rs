//! Feature model
//!
//! A feature model is a tree of named features joined by parent-child
//! relations, plus a list of cross-tree constraints. Features are stored in
//! declaration order and addressed by [`FeatureId`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::expr::{Constraint, Expr};
use super::tree::{FeatureTree, TreeError};

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Duplicate feature name: {0}")]
    DuplicateFeature(String),

    #[error("Unknown feature id: {0}")]
    UnknownFeatureId(FeatureId),

    #[error("Constraint references unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Relation of {parent} has no children")]
    EmptyRelation { parent: String },

    #[error("{kind} relation of {parent} must have exactly one child, got {children}")]
    Arity {
        kind: &'static str,
        parent: String,
        children: usize,
    },

    #[error("Invalid cardinality [{min}..{max}] for {children} children of {parent}")]
    Cardinality {
        parent: String,
        min: usize,
        max: usize,
        children: usize,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Index of a feature inside its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(usize);

impl FeatureId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
}

/// How the children of a relation constrain each other and their parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The child is selected iff the parent is
    Mandatory,
    /// The child may only be selected with its parent
    Optional,
    /// At least one child iff the parent
    Or,
    /// Exactly one child iff the parent
    Alternative,
    /// At most one child
    Mutex,
    /// Between `min` and `max` children
    Cardinality { min: usize, max: usize },
}

impl RelationKind {
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Mandatory => "mandatory",
            RelationKind::Optional => "optional",
            RelationKind::Or => "or",
            RelationKind::Alternative => "alternative",
            RelationKind::Mutex => "mutex",
            RelationKind::Cardinality { .. } => "cardinality",
        }
    }

    /// Classifies group bounds over `children` children
    ///
    /// `[1..1]` is an alternative, `[0..1]` a mutex and `[1..n]` an or-group;
    /// any other bounds stay a plain cardinality.
    pub fn from_bounds(min: usize, max: usize, children: usize) -> Self {
        match (min, max) {
            (1, 1) => RelationKind::Alternative,
            (0, 1) => RelationKind::Mutex,
            (1, m) if m == children => RelationKind::Or,
            _ => RelationKind::Cardinality { min, max },
        }
    }
}

/// A parent feature and its ordered children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub parent: FeatureId,
    pub children: Vec<FeatureId>,
    pub kind: RelationKind,
}

/// An immutable-once-built feature model
#[derive(Debug, Clone, Default)]
pub struct FeatureModel {
    features: Vec<Feature>,
    by_name: HashMap<String, FeatureId>,
    root: Option<FeatureId>,
    relations: Vec<Relation>,
    /// Relation indices per parent, in insertion order
    relations_by_parent: HashMap<FeatureId, Vec<usize>>,
    constraints: Vec<Constraint>,
    tree: FeatureTree,
}

impl FeatureModel {
    /// Creates an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feature, failing if the name is taken
    pub fn add_feature(&mut self, name: impl Into<String>) -> Result<FeatureId, ModelError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ModelError::DuplicateFeature(name));
        }

        let id = FeatureId(self.features.len());
        self.features.push(Feature {
            id,
            name: name.clone(),
        });
        self.by_name.insert(name, id);
        self.tree.add_feature(id);
        Ok(id)
    }

    /// Marks a feature as the root of the tree
    pub fn set_root(&mut self, id: FeatureId) -> Result<(), ModelError> {
        self.check_id(id)?;
        self.root = Some(id);
        Ok(())
    }

    /// Adds a relation after checking its shape and that the tree stays a tree
    pub fn add_relation(
        &mut self,
        parent: FeatureId,
        children: Vec<FeatureId>,
        kind: RelationKind,
    ) -> Result<(), ModelError> {
        self.check_id(parent)?;
        for child in &children {
            self.check_id(*child)?;
        }
        validate_shape(&self.features[parent.0].name, children.len(), kind)?;

        for child in &children {
            self.tree.attach(parent, *child)?;
        }

        self.relations_by_parent
            .entry(parent)
            .or_default()
            .push(self.relations.len());
        self.relations.push(Relation {
            parent,
            children,
            kind,
        });
        Ok(())
    }

    /// Adds a cross-tree constraint; every name it mentions must be a feature
    pub fn add_constraint(&mut self, expr: Expr) -> Result<(), ModelError> {
        if let Some(unknown) = expr
            .variables()
            .into_iter()
            .find(|name| !self.by_name.contains_key(*name))
        {
            return Err(ModelError::UnknownFeature(unknown.to_string()));
        }
        self.constraints.push(Constraint::new(expr));
        Ok(())
    }

    fn check_id(&self, id: FeatureId) -> Result<(), ModelError> {
        if id.0 < self.features.len() {
            Ok(())
        } else {
            Err(ModelError::UnknownFeatureId(id))
        }
    }

    pub fn root(&self) -> Option<&Feature> {
        self.root.map(|id| &self.features[id.0])
    }

    pub fn feature(&self, id: FeatureId) -> &Feature {
        &self.features[id.0]
    }

    pub fn feature_by_name(&self, name: &str) -> Option<&Feature> {
        self.by_name.get(name).map(|id| &self.features[id.0])
    }

    /// All features in declaration order
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Relations whose parent is `id`, in insertion order
    pub fn relations_of(&self, id: FeatureId) -> impl Iterator<Item = &Relation> {
        self.relations_by_parent
            .get(&id)
            .into_iter()
            .flatten()
            .map(|idx| &self.relations[*idx])
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn tree(&self) -> &FeatureTree {
        &self.tree
    }

    /// Features the root cannot reach; all of them when there is no root
    pub fn detached_features(&self) -> Vec<&Feature> {
        let reachable: Vec<FeatureId> = match self.root {
            Some(root) => self.tree.reachable_from(root),
            None => Vec::new(),
        };
        self.features
            .iter()
            .filter(|f| !reachable.contains(&f.id))
            .collect()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

/// Checks the arity and bounds invariants of a relation
pub(crate) fn validate_shape(
    parent: &str,
    children: usize,
    kind: RelationKind,
) -> Result<(), ModelError> {
    if children == 0 {
        return Err(ModelError::EmptyRelation {
            parent: parent.to_string(),
        });
    }

    match kind {
        RelationKind::Mandatory | RelationKind::Optional if children != 1 => {
            Err(ModelError::Arity {
                kind: kind.label(),
                parent: parent.to_string(),
                children,
            })
        }
        RelationKind::Cardinality { min, max } if min > max || max > children => {
            Err(ModelError::Cardinality {
                parent: parent.to_string(),
                min,
                max,
                children,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(names: &[&str]) -> (FeatureModel, Vec<FeatureId>) {
        let mut model = FeatureModel::new();
        let ids = names.iter().map(|n| model.add_feature(*n).unwrap()).collect();
        (model, ids)
    }

    #[test]
    fn features_keep_declaration_order() {
        let (model, _) = model_with(&["Root", "B", "A"]);
        let names: Vec<_> = model.feature_names().collect();
        assert_eq!(names, vec!["Root", "B", "A"]);
    }

    #[test]
    fn duplicate_feature_rejected() {
        let (mut model, _) = model_with(&["Root"]);
        assert_eq!(
            model.add_feature("Root"),
            Err(ModelError::DuplicateFeature("Root".to_string()))
        );
    }

    #[test]
    fn mandatory_needs_one_child() {
        let (mut model, ids) = model_with(&["R", "A", "B"]);
        let result = model.add_relation(ids[0], vec![ids[1], ids[2]], RelationKind::Mandatory);
        assert!(matches!(result, Err(ModelError::Arity { children: 2, .. })));
    }

    #[test]
    fn cardinality_bounds_checked() {
        let (mut model, ids) = model_with(&["R", "A", "B"]);
        let children = vec![ids[1], ids[2]];

        let too_wide = RelationKind::Cardinality { min: 1, max: 3 };
        assert!(matches!(
            model.add_relation(ids[0], children.clone(), too_wide),
            Err(ModelError::Cardinality { .. })
        ));

        let inverted = RelationKind::Cardinality { min: 2, max: 1 };
        assert!(matches!(
            model.add_relation(ids[0], children.clone(), inverted),
            Err(ModelError::Cardinality { .. })
        ));

        let ok = RelationKind::Cardinality { min: 0, max: 2 };
        assert!(model.add_relation(ids[0], children, ok).is_ok());
    }

    #[test]
    fn child_with_two_parents_rejected() {
        let (mut model, ids) = model_with(&["R", "A", "B"]);
        model
            .add_relation(ids[0], vec![ids[2]], RelationKind::Optional)
            .unwrap();
        let result = model.add_relation(ids[1], vec![ids[2]], RelationKind::Optional);
        assert!(matches!(result, Err(ModelError::Tree(_))));
    }

    #[test]
    fn constraint_with_unknown_feature_rejected() {
        let (mut model, _) = model_with(&["R", "A"]);
        let expr = Expr::and(Expr::var("A"), Expr::var("Ghost"));
        assert_eq!(
            model.add_constraint(expr),
            Err(ModelError::UnknownFeature("Ghost".to_string()))
        );
        assert_eq!(model.constraint_count(), 0);
    }

    #[test]
    fn relations_listed_per_parent_in_order() {
        let (mut model, ids) = model_with(&["R", "A", "B", "C"]);
        model
            .add_relation(ids[0], vec![ids[1]], RelationKind::Mandatory)
            .unwrap();
        model
            .add_relation(ids[0], vec![ids[2], ids[3]], RelationKind::Or)
            .unwrap();

        let kinds: Vec<_> = model.relations_of(ids[0]).map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RelationKind::Mandatory, RelationKind::Or]);
        assert_eq!(model.relations_of(ids[1]).count(), 0);
    }

    #[test]
    fn group_bounds_classification() {
        assert_eq!(RelationKind::from_bounds(1, 1, 3), RelationKind::Alternative);
        assert_eq!(RelationKind::from_bounds(0, 1, 3), RelationKind::Mutex);
        assert_eq!(RelationKind::from_bounds(1, 3, 3), RelationKind::Or);
        assert_eq!(
            RelationKind::from_bounds(2, 3, 3),
            RelationKind::Cardinality { min: 2, max: 3 }
        );
    }

    #[test]
    fn detached_features_outside_root_subtree() {
        let (mut model, ids) = model_with(&["Root", "A", "Loose"]);
        assert_eq!(model.detached_features().len(), 3);

        model.set_root(ids[0]).unwrap();
        model
            .add_relation(ids[0], vec![ids[1]], RelationKind::Optional)
            .unwrap();

        let detached: Vec<_> = model.detached_features().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(detached, vec!["Loose"]);
    }
}
