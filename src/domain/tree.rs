//! Feature tree structure
//!
//! Tracks parent-child edges between features so that a model can never
//! contain a cycle or a feature with two parents. Uses petgraph for graph
//! operations.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::HashMap;
use thiserror::Error;

use super::model::FeatureId;

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("Adding {child} under {parent} would create a cycle")]
    CycleDetected { parent: FeatureId, child: FeatureId },

    #[error("Feature {child} already has parent {existing}")]
    MultipleParents {
        child: FeatureId,
        existing: FeatureId,
    },

    #[error("Feature {0} cannot be its own child")]
    SelfParent(FeatureId),

    #[error("Feature not in tree: {0}")]
    FeatureNotFound(FeatureId),
}

/// Parent-to-child edges of a feature model
#[derive(Debug, Clone, Default)]
pub struct FeatureTree {
    /// Edge direction is parent -> child
    graph: DiGraph<FeatureId, ()>,

    /// Map from FeatureId to node index
    node_map: HashMap<FeatureId, NodeIndex>,
}

impl FeatureTree {
    /// Creates an empty tree
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Adds a feature as an unattached node
    pub fn add_feature(&mut self, id: FeatureId) {
        if !self.node_map.contains_key(&id) {
            let idx = self.graph.add_node(id);
            self.node_map.insert(id, idx);
        }
    }

    fn index_of(&self, id: FeatureId) -> Result<NodeIndex, TreeError> {
        self.node_map
            .get(&id)
            .copied()
            .ok_or(TreeError::FeatureNotFound(id))
    }

    /// Attaches `child` under `parent`
    pub fn attach(&mut self, parent: FeatureId, child: FeatureId) -> Result<(), TreeError> {
        if parent == child {
            return Err(TreeError::SelfParent(child));
        }

        let parent_idx = self.index_of(parent)?;
        let child_idx = self.index_of(child)?;

        if let Some(existing) = self.parent(child) {
            return Err(TreeError::MultipleParents { child, existing });
        }

        let edge = self.graph.add_edge(parent_idx, child_idx, ());

        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(TreeError::CycleDetected { parent, child });
        }

        Ok(())
    }

    /// Returns the parent of a feature, if attached
    pub fn parent(&self, id: FeatureId) -> Option<FeatureId> {
        let idx = self.node_map.get(&id)?;
        self.graph
            .neighbors_directed(*idx, Direction::Incoming)
            .next()
            .and_then(|p| self.graph.node_weight(p).copied())
    }

    /// Returns the direct children of a feature
    pub fn children(&self, id: FeatureId) -> Vec<FeatureId> {
        let idx = match self.node_map.get(&id) {
            Some(idx) => *idx,
            None => return vec![],
        };

        let mut children: Vec<_> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|c| self.graph.node_weight(c).copied())
            .collect();
        children.sort();
        children
    }

    /// Returns every feature reachable from `root`, root included
    pub fn reachable_from(&self, root: FeatureId) -> Vec<FeatureId> {
        let idx = match self.node_map.get(&root) {
            Some(idx) => *idx,
            None => return vec![],
        };

        let mut dfs = Dfs::new(&self.graph, idx);
        let mut reached = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            if let Some(id) = self.graph.node_weight(node) {
                reached.push(*id);
            }
        }
        reached.sort();
        reached
    }

    /// Returns true if the tree contains the feature
    pub fn contains(&self, id: FeatureId) -> bool {
        self.node_map.contains_key(&id)
    }

    /// Returns the number of features in the tree
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FeatureModel;

    fn ids(n: usize) -> (FeatureTree, Vec<FeatureId>) {
        // FeatureId is opaque outside the model, so borrow ids from one
        let mut model = FeatureModel::new();
        let ids: Vec<_> = (0..n)
            .map(|i| model.add_feature(format!("f{}", i)).unwrap())
            .collect();
        let mut tree = FeatureTree::new();
        for id in &ids {
            tree.add_feature(*id);
        }
        (tree, ids)
    }

    #[test]
    fn empty_tree() {
        let tree = FeatureTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn attach_children() {
        let (mut tree, id) = ids(3);
        tree.attach(id[0], id[1]).unwrap();
        tree.attach(id[0], id[2]).unwrap();

        assert_eq!(tree.children(id[0]), vec![id[1], id[2]]);
        assert_eq!(tree.parent(id[1]), Some(id[0]));
        assert_eq!(tree.parent(id[0]), None);
    }

    #[test]
    fn cycle_detection() {
        let (mut tree, id) = ids(3);
        tree.attach(id[0], id[1]).unwrap();
        tree.attach(id[1], id[2]).unwrap();

        let result = tree.attach(id[2], id[0]);
        assert!(matches!(result, Err(TreeError::CycleDetected { .. })));
        assert!(tree.children(id[2]).is_empty());
    }

    #[test]
    fn self_parent_rejected() {
        let (mut tree, id) = ids(1);
        assert_eq!(tree.attach(id[0], id[0]), Err(TreeError::SelfParent(id[0])));
    }

    #[test]
    fn second_parent_rejected() {
        let (mut tree, id) = ids(3);
        tree.attach(id[0], id[2]).unwrap();

        let result = tree.attach(id[1], id[2]);
        assert_eq!(
            result,
            Err(TreeError::MultipleParents {
                child: id[2],
                existing: id[0]
            })
        );
    }

    #[test]
    fn reachable_excludes_detached_features() {
        let (mut tree, id) = ids(4);
        tree.attach(id[0], id[1]).unwrap();
        tree.attach(id[1], id[2]).unwrap();

        assert_eq!(tree.reachable_from(id[0]), vec![id[0], id[1], id[2]]);
        assert!(!tree.reachable_from(id[0]).contains(&id[3]));
    }
}
