//! Append-only annotation side tables.
//!
//! Analyses attach facts to nodes without mutating them. A store is owned by
//! the analysis that writes it; once the analysis has terminated the store is
//! handed out read-only. Entries can be added but never replaced or removed.

use std::collections::HashMap;

use super::NodeId;

/// A typed, append-only map from nodes to annotation values.
#[derive(Debug)]
pub struct AnnotationStore<T> {
    entries: HashMap<NodeId, T>,
}

impl<T> Default for AnnotationStore<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> AnnotationStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an annotation to a node.
    ///
    /// # Panics
    /// Panics if the node is already annotated; annotations are append-only.
    pub fn attach(&mut self, node: NodeId, value: T) {
        let previous = self.entries.insert(node, value);
        assert!(previous.is_none(), "node {node} is already annotated");
    }

    /// The annotation attached to a node, if any.
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&T> {
        self.entries.get(&node)
    }

    /// Checks whether a node carries an annotation.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    /// Iterates over all annotated nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.entries.iter().map(|(&n, v)| (n, v))
    }

    /// The number of annotated nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Node, NodeManager, Type};

    #[test]
    fn attach_and_read() {
        let mut mgr = NodeManager::new();
        let int = mgr.intern_ty(Type::Int);
        let lit = mgr.intern(Node::Literal {
            ty: int,
            value: "0".into(),
        });
        let mut store = AnnotationStore::new();
        store.attach(lit, "fact");
        assert_eq!(store.get(lit), Some(&"fact"));
        assert!(store.contains(lit));
    }

    #[test]
    #[should_panic(expected = "already annotated")]
    fn double_attach_panics() {
        let mut mgr = NodeManager::new();
        let int = mgr.intern_ty(Type::Int);
        let lit = mgr.intern(Node::Literal {
            ty: int,
            value: "0".into(),
        });
        let mut store = AnnotationStore::new();
        store.attach(lit, 1);
        store.attach(lit, 2);
    }
}
