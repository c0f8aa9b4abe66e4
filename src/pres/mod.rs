//! The typed facade over Presburger sets, maps and symbolic cardinalities.
//!
//! The facade owns every external object through a per-analysis [`Context`]
//! and exposes the operations the polyhedral layer needs: construction from
//! strings and from affine forms, the boolean set algebra, domain/range/
//! reverse/apply on relations, lexicographic extrema, cardinality and flow
//! dependences, and code generation back to IR. String parsing is confined
//! to this outermost boundary; all internal composition is handle to handle.
//!
//! The backing engine evaluates unions of convex integer polyhedra (with
//! stride constraints) exactly on the affine class produced by the SCoP
//! layer and answers [`ModelingError`] outside it.

pub mod codegen;

mod map;
mod parse;
mod set;

pub use map::{DependenceInfo, Map, compute_flow};
pub use set::{Point, Pwqp, Set, Space};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ir::NodeId;

/// A feature outside the modeled fragment was requested.
///
/// The caller receives this instead of a wrong answer and falls back to the
/// conservative top of its analysis lattice.
#[derive(Debug, Clone, thiserror::Error)]
#[error("modeling limitation: {reason}")]
pub struct ModelingError {
    /// What exceeded the modeled fragment.
    pub reason: String,
}

impl ModelingError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A named association between an IR node and its tuple name inside the
/// engine.
pub type TupleName = (NodeId, String);

#[derive(Debug, Default)]
struct ContextInner {
    tuples: BTreeMap<String, NodeId>,
    next_id: u32,
}

/// The owner of all engine resources of one analysis.
///
/// The context maintains the bidirectional association between IR nodes and
/// tuple names so that results of polyhedral operations can be traced back
/// to the program. Handles created within a context keep it alive; the
/// context is not shared across analyses.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Rc<RefCell<ContextInner>>,
}

impl Context {
    /// Creates a fresh context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tuple name for an IR node.
    ///
    /// Registering the same name twice is permitted only for the same node;
    /// renaming would invalidate earlier results.
    ///
    /// # Panics
    /// Panics when a name is re-registered for a different node.
    pub fn insert_tuple(&self, (node, name): TupleName) {
        let mut inner = self.inner.borrow_mut();
        if let Some(&existing) = inner.tuples.get(&name) {
            assert_eq!(existing, node, "tuple name `{name}` is already taken");
            return;
        }
        inner.tuples.insert(name, node);
    }

    /// The IR node a tuple name stands for.
    #[must_use]
    pub fn tuple(&self, name: &str) -> Option<NodeId> {
        self.inner.borrow().tuples.get(name).copied()
    }

    /// A dimension name unique within this context.
    #[must_use]
    pub fn fresh_name(&self, prefix: &str) -> String {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        format!("{prefix}{}", inner.next_id)
    }
}
