//! The intermediate representation consumed by the analyses.
//!
//! Nodes are hash-consed by a [`NodeManager`]: structurally equal nodes share
//! one [`NodeId`], so node identity doubles as structural equality. The
//! manager also interns types and owns the catalog of primitive operators
//! ([`lang::Basic`]), which analyses receive through their context instead of
//! a global registry.

pub mod annotations;
pub mod builder;
pub mod check;
pub mod lang;
pub mod node;
pub mod visit;

mod address;

pub use address::NodeAddress;
pub use builder::Builder;
pub use node::{Node, NodeId, NodeKind, TyId, Type};

use std::collections::HashMap;

/// The exclusive owner of all nodes and types of one program.
///
/// The manager is non-copyable; destroying it invalidates every [`NodeId`]
/// and [`TyId`] it handed out.
#[derive(Debug, Default)]
pub struct NodeManager {
    nodes: Vec<Node>,
    node_index: HashMap<Node, NodeId>,
    types: Vec<Type>,
    type_index: HashMap<Type, TyId>,
}

impl NodeManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical id for the given node, interning it on first use.
    pub fn intern(&mut self, node: Node) -> NodeId {
        if let Some(&id) = self.node_index.get(&node) {
            return id;
        }
        let id = NodeId(u32::try_from(self.nodes.len()).expect("node arena overflow"));
        self.nodes.push(node.clone());
        self.node_index.insert(node, id);
        id
    }

    /// Returns the canonical id for the given type, interning it on first use.
    pub fn intern_ty(&mut self, ty: Type) -> TyId {
        if let Some(&id) = self.type_index.get(&ty) {
            return id;
        }
        let id = TyId(u32::try_from(self.types.len()).expect("type arena overflow"));
        self.types.push(ty.clone());
        self.type_index.insert(ty, id);
        id
    }

    /// The node stored under the given id.
    ///
    /// # Panics
    /// Panics if the id was produced by a different manager.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// The type stored under the given id.
    ///
    /// # Panics
    /// Panics if the id was produced by a different manager.
    #[must_use]
    pub fn ty(&self, id: TyId) -> &Type {
        &self.types[id.0 as usize]
    }

    /// The type of an expression node, if `id` denotes an expression.
    #[must_use]
    pub fn type_of(&self, id: NodeId) -> Option<TyId> {
        self.node(id).ty()
    }

    /// The number of nodes interned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates over all interned nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (NodeId(u32::try_from(idx).expect("node arena overflow")), node))
    }

    /// Checks whether no node has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The number of reference layers wrapped around the given type.
    #[must_use]
    pub fn ref_rank(&self, mut ty: TyId) -> usize {
        let mut rank = 0;
        while let Type::Ref(elem) = self.ty(ty) {
            rank += 1;
            ty = *elem;
        }
        rank
    }

    /// Parses the integer value of an integer literal.
    #[must_use]
    pub fn int_value(&self, id: NodeId) -> Option<i64> {
        match self.node(id) {
            Node::Literal { value, ty } if *self.ty(*ty) == Type::Int => value.parse().ok(),
            _ => None,
        }
    }

    /// Rebuilds the tree under `root` with every node in `map` replaced.
    ///
    /// Replacement applies to whole sub-trees: a mapped node is substituted
    /// without descending into it.
    pub fn substitute(
        &mut self,
        root: NodeId,
        map: &HashMap<NodeId, NodeId>,
    ) -> NodeId {
        if let Some(&replacement) = map.get(&root) {
            return replacement;
        }
        let node = self.node(root).clone();
        let rebuilt = match node {
            Node::Literal { .. } | Node::Variable { .. } | Node::Break | Node::Continue => {
                return root;
            }
            Node::Call { ty, callee, args } => Node::Call {
                ty,
                callee: self.substitute(callee, map),
                args: args.into_iter().map(|a| self.substitute(a, map)).collect(),
            },
            Node::Lambda { ty, params, body } => Node::Lambda {
                ty,
                params,
                body: self.substitute(body, map),
            },
            Node::Bind { ty, params, call } => Node::Bind {
                ty,
                params,
                call: self.substitute(call, map),
            },
            Node::Tuple { ty, elems } => Node::Tuple {
                ty,
                elems: elems.into_iter().map(|e| self.substitute(e, map)).collect(),
            },
            Node::Struct { ty, fields } => Node::Struct {
                ty,
                fields: fields
                    .into_iter()
                    .map(|(n, e)| (n, self.substitute(e, map)))
                    .collect(),
            },
            Node::Cast { ty, expr } => Node::Cast {
                ty,
                expr: self.substitute(expr, map),
            },
            Node::Job { ty, body } => Node::Job {
                ty,
                body: self.substitute(body, map),
            },
            Node::Decl { var, init } => Node::Decl {
                var: self.substitute(var, map),
                init: self.substitute(init, map),
            },
            Node::Compound { stmts } => Node::Compound {
                stmts: stmts.into_iter().map(|s| self.substitute(s, map)).collect(),
            },
            Node::If {
                cond,
                then_stmt,
                else_stmt,
            } => Node::If {
                cond: self.substitute(cond, map),
                then_stmt: self.substitute(then_stmt, map),
                else_stmt: self.substitute(else_stmt, map),
            },
            Node::While { cond, body } => Node::While {
                cond: self.substitute(cond, map),
                body: self.substitute(body, map),
            },
            Node::For {
                iter,
                start,
                end,
                step,
                body,
            } => Node::For {
                iter: self.substitute(iter, map),
                start: self.substitute(start, map),
                end: self.substitute(end, map),
                step: self.substitute(step, map),
                body: self.substitute(body, map),
            },
            Node::Switch {
                value,
                cases,
                default,
            } => Node::Switch {
                value: self.substitute(value, map),
                cases: cases
                    .into_iter()
                    .map(|(c, s)| (self.substitute(c, map), self.substitute(s, map)))
                    .collect(),
                default: self.substitute(default, map),
            },
            Node::Return { expr } => Node::Return {
                expr: self.substitute(expr, map),
            },
        };
        self.intern(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let mut mgr = NodeManager::new();
        let int = mgr.intern_ty(Type::Int);
        let a = mgr.intern(Node::Literal {
            ty: int,
            value: "42".into(),
        });
        let b = mgr.intern(Node::Literal {
            ty: int,
            value: "42".into(),
        });
        let c = mgr.intern(Node::Literal {
            ty: int,
            value: "43".into(),
        });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn ref_rank_counts_nesting() {
        let mut mgr = NodeManager::new();
        let int = mgr.intern_ty(Type::Int);
        let r1 = mgr.intern_ty(Type::Ref(int));
        let r2 = mgr.intern_ty(Type::Ref(r1));
        assert_eq!(mgr.ref_rank(int), 0);
        assert_eq!(mgr.ref_rank(r1), 1);
        assert_eq!(mgr.ref_rank(r2), 2);
    }

    #[test]
    fn int_literals_parse() {
        let mut mgr = NodeManager::new();
        let int = mgr.intern_ty(Type::Int);
        let lit = mgr.intern(Node::Literal {
            ty: int,
            value: "-7".into(),
        });
        assert_eq!(mgr.int_value(lit), Some(-7));
    }
}
