use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::{Node, NodeId, NodeManager};

/// The address of a node relative to a root node.
///
/// An address is a root id plus the sequence of child indices leading to the
/// addressed node. Unlike a bare [`NodeId`], an address distinguishes
/// several occurrences of one shared (hash-consed) node beneath the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeAddress {
    root: NodeId,
    path: Vec<u16>,
}

impl NodeAddress {
    /// Creates the address of the root node itself.
    #[must_use]
    pub const fn new(root: NodeId) -> Self {
        Self {
            root,
            path: Vec::new(),
        }
    }

    /// The root this address is relative to.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// The child-index path from the root to the addressed node.
    #[must_use]
    pub fn path(&self) -> &[u16] {
        &self.path
    }

    /// Checks whether this address denotes the root node.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// The number of steps from the root to the addressed node.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// The address of the `idx`-th child of the addressed node.
    #[must_use]
    pub fn child(&self, idx: usize) -> Self {
        let mut path = self.path.clone();
        path.push(u16::try_from(idx).expect("child index overflow"));
        Self {
            root: self.root,
            path,
        }
    }

    /// The address of the parent of the addressed node, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.path.is_empty() {
            return None;
        }
        let mut path = self.path.clone();
        path.pop();
        Some(Self {
            root: self.root,
            path,
        })
    }

    /// Checks whether this address is a (non-strict) prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.root == other.root
            && self.path.len() <= other.path.len()
            && other.path[..self.path.len()] == self.path[..]
    }

    /// Resolves the address to the node it denotes.
    ///
    /// # Panics
    /// Panics if a path step addresses a non-existing child, which indicates
    /// an address constructed against a different program.
    #[must_use]
    pub fn resolve(&self, mgr: &NodeManager) -> NodeId {
        let mut current = self.root;
        for &step in &self.path {
            let children = mgr.node(current).children();
            current = children[step as usize];
        }
        current
    }

    /// Resolves the address and returns the denoted node.
    #[must_use]
    pub fn node<'m>(&self, mgr: &'m NodeManager) -> &'m Node {
        mgr.node(self.resolve(mgr))
    }
}

impl From<NodeId> for NodeAddress {
    fn from(root: NodeId) -> Self {
        Self::new(root)
    }
}

impl Display for NodeAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        if !self.path.is_empty() {
            write!(f, "-{}", self.path.iter().join("-"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Node, Type};

    #[test]
    fn navigation_round_trip() {
        let mut mgr = NodeManager::new();
        let int = mgr.intern_ty(Type::Int);
        let one = mgr.intern(Node::Literal {
            ty: int,
            value: "1".into(),
        });
        let two = mgr.intern(Node::Literal {
            ty: int,
            value: "2".into(),
        });
        let tuple_ty = mgr.intern_ty(Type::Tuple(vec![int, int]));
        let tuple = mgr.intern(Node::Tuple {
            ty: tuple_ty,
            elems: vec![one, two],
        });

        let addr = NodeAddress::new(tuple);
        assert!(addr.is_root());
        let second = addr.child(1);
        assert_eq!(second.resolve(&mgr), two);
        assert_eq!(second.parent(), Some(addr.clone()));
        assert!(addr.is_prefix_of(&second));
        assert!(!second.is_prefix_of(&addr));
    }
}
