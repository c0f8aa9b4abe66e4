//! Iteration vectors, the basis of all affine forms.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ir::NodeId;

/// One position of an [`IterationVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// A loop iterator variable.
    Iterator(NodeId),
    /// A symbolic program parameter.
    Parameter(NodeId),
    /// The constant-term position.
    Constant,
}

/// An ordered list of loop iterators and symbolic parameters, closed by the
/// constant position.
///
/// Elements are only ever appended; positions of existing elements are
/// stable for the lifetime of the vector. Affine functions store their
/// coefficients relative to the layout `iterators ++ parameters ++ constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IterationVector {
    iters: Vec<NodeId>,
    params: Vec<NodeId>,
}

impl IterationVector {
    /// Creates an empty vector holding only the constant position.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            iters: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Creates a vector from iterator and parameter variables.
    #[must_use]
    pub fn with(iters: Vec<NodeId>, params: Vec<NodeId>) -> Self {
        let mut result = Self::new();
        for it in iters {
            result.add_iterator(it);
        }
        for p in params {
            result.add_parameter(p);
        }
        result
    }

    /// The number of positions including the constant.
    #[must_use]
    pub fn size(&self) -> usize {
        self.iters.len() + self.params.len() + 1
    }

    /// The number of iterator positions.
    #[must_use]
    pub fn iter_count(&self) -> usize {
        self.iters.len()
    }

    /// The number of parameter positions.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// The iterator variables in order.
    #[must_use]
    pub fn iterators(&self) -> &[NodeId] {
        &self.iters
    }

    /// The parameter variables in order.
    #[must_use]
    pub fn parameters(&self) -> &[NodeId] {
        &self.params
    }

    /// Appends an iterator, returning its position.
    ///
    /// Adding a variable twice is a no-op returning the existing position.
    ///
    /// # Panics
    /// Panics if the variable is already registered as a parameter.
    pub fn add_iterator(&mut self, var: NodeId) -> usize {
        assert!(
            !self.params.contains(&var),
            "variable {var} is already a parameter"
        );
        if let Some(pos) = self.iters.iter().position(|&v| v == var) {
            return pos;
        }
        self.iters.push(var);
        self.iters.len() - 1
    }

    /// Appends a parameter, returning its position.
    ///
    /// Adding a variable twice is a no-op returning the existing position.
    ///
    /// # Panics
    /// Panics if the variable is already registered as an iterator.
    pub fn add_parameter(&mut self, var: NodeId) -> usize {
        assert!(
            !self.iters.contains(&var),
            "variable {var} is already an iterator"
        );
        if let Some(pos) = self.params.iter().position(|&v| v == var) {
            return self.iters.len() + pos;
        }
        self.params.push(var);
        self.iters.len() + self.params.len() - 1
    }

    /// The element at the given position.
    ///
    /// # Panics
    /// Panics if the position is outside the vector.
    #[must_use]
    pub fn element(&self, pos: usize) -> Element {
        if pos < self.iters.len() {
            Element::Iterator(self.iters[pos])
        } else if pos < self.iters.len() + self.params.len() {
            Element::Parameter(self.params[pos - self.iters.len()])
        } else if pos == self.size() - 1 {
            Element::Constant
        } else {
            panic!("position {pos} outside iteration vector of size {}", self.size())
        }
    }

    /// The position of the given element, if present.
    #[must_use]
    pub fn index_of(&self, element: &Element) -> Option<usize> {
        match element {
            Element::Iterator(var) => self.iters.iter().position(|v| v == var),
            Element::Parameter(var) => self
                .params
                .iter()
                .position(|v| v == var)
                .map(|p| p + self.iters.len()),
            Element::Constant => Some(self.size() - 1),
        }
    }

    /// Checks whether the variable occurs as an iterator.
    #[must_use]
    pub fn contains_iterator(&self, var: NodeId) -> bool {
        self.iters.contains(&var)
    }

    /// Checks whether the variable occurs as a parameter.
    #[must_use]
    pub fn contains_parameter(&self, var: NodeId) -> bool {
        self.params.contains(&var)
    }

    /// Checks whether every element of `other` occurs in `self`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.iters.iter().all(|&v| self.contains_iterator(v))
            && other.params.iter().all(|&v| self.contains_parameter(v))
    }
}

impl Display for IterationVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}|{}|1)",
            self.iters.iter().join(","),
            self.params.iter().join(",")
        )
    }
}

/// The order-preserving distinct union of two iteration vectors.
#[must_use]
pub fn merge(lhs: &IterationVector, rhs: &IterationVector) -> IterationVector {
    let mut result = lhs.clone();
    for &it in &rhs.iters {
        result.add_iterator(it);
    }
    for &p in &rhs.params {
        result.add_parameter(p);
    }
    result
}

/// A position translation from a source vector into a target vector.
///
/// Entry `i` names the target position of source position `i`.
pub type IndexTransMap = Vec<usize>;

/// Computes the translation of positions of `source` into `target`.
///
/// # Panics
/// Panics if `target` does not cover `source`; rebasing onto a narrower
/// vector indicates a caller bug.
#[must_use]
pub fn transform(target: &IterationVector, source: &IterationVector) -> IndexTransMap {
    (0..source.size())
        .map(|pos| {
            let element = source.element(pos);
            target.index_of(&element).unwrap_or_else(|| {
                panic!("variable of {element:?} not found in target iteration vector")
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, NodeManager};

    fn vars(n: u32) -> (NodeManager, Vec<NodeId>) {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let vars = (1..=n).map(|id| b.variable(int, id)).collect();
        (mgr, vars)
    }

    #[test]
    fn layout_is_iterators_parameters_constant() {
        let (_mgr, v) = vars(3);
        let mut iv = IterationVector::new();
        iv.add_iterator(v[0]);
        assert_eq!(iv.size(), 2);
        iv.add_parameter(v[2]);
        assert_eq!(iv.size(), 3);
        iv.add_iterator(v[1]);
        assert_eq!(iv.size(), 4);

        assert_eq!(iv.element(0), Element::Iterator(v[0]));
        assert_eq!(iv.element(1), Element::Iterator(v[1]));
        assert_eq!(iv.element(2), Element::Parameter(v[2]));
        assert_eq!(iv.element(3), Element::Constant);
    }

    #[test]
    fn merge_is_distinct_and_order_preserving() {
        let (_mgr, v) = vars(3);
        let mut lhs = IterationVector::new();
        lhs.add_iterator(v[0]);
        lhs.add_parameter(v[2]);

        let mut rhs = IterationVector::new();
        rhs.add_parameter(v[2]);
        rhs.add_iterator(v[1]);

        let merged = merge(&lhs, &rhs);
        assert_eq!(merged.element(0), Element::Iterator(v[0]));
        assert_eq!(merged.element(1), Element::Iterator(v[1]));
        assert_eq!(merged.element(2), Element::Parameter(v[2]));
        assert_eq!(merged.element(3), Element::Constant);

        // merging with an empty vector is the identity
        assert_eq!(merge(&lhs, &IterationVector::new()), lhs);
        assert_eq!(merge(&IterationVector::new(), &lhs), lhs);
    }

    #[test]
    fn transform_translates_positions() {
        let (_mgr, v) = vars(5);
        let source = IterationVector::with(vec![v[0]], vec![v[2]]);
        let target = IterationVector::with(vec![v[3], v[0], v[1]], vec![v[4], v[2]]);

        let map = transform(&target, &source);
        assert_eq!(map, vec![1, 4, 5]);
    }

    #[test]
    #[should_panic(expected = "not found in target iteration vector")]
    fn transform_onto_narrower_vector_panics() {
        let (_mgr, v) = vars(2);
        let source = IterationVector::with(vec![v[0], v[1]], vec![]);
        let target = IterationVector::with(vec![v[0]], vec![]);
        let _ = transform(&target, &source);
    }
}
