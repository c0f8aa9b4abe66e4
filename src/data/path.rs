//! Data paths addressing sub-components of structured values.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

/// An index into one layer of a structured value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Index {
    /// A named field of a record.
    Field(String),
    /// A component of a tuple.
    Component(usize),
    /// An element of an array or vector.
    Element(ElementIndex),
}

/// The index of an array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementIndex {
    /// A statically known element position.
    Concrete(i64),
    /// The summary element covering every position.
    Unknown,
}

/// The kind of an [`Index`], stored on compound nodes to pick the matching
/// projection and mutation routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKind {
    /// Record-field indexing.
    Field,
    /// Tuple-component indexing.
    Component,
    /// Array-element indexing.
    Element,
}

impl Index {
    /// The kind of this index.
    #[must_use]
    pub const fn kind(&self) -> IndexKind {
        match self {
            Index::Field(_) => IndexKind::Field,
            Index::Component(_) => IndexKind::Component,
            Index::Element(_) => IndexKind::Element,
        }
    }

    /// Creates a field index.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Index::Field(name.into())
    }

    /// Creates an element index for a known position.
    #[must_use]
    pub const fn element(pos: i64) -> Self {
        Index::Element(ElementIndex::Concrete(pos))
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Index::Field(name) => write!(f, ".{name}"),
            Index::Component(pos) => write!(f, "#{pos}"),
            Index::Element(ElementIndex::Concrete(pos)) => write!(f, "[{pos}]"),
            Index::Element(ElementIndex::Unknown) => write!(f, "[*]"),
        }
    }
}

/// A sequence of index steps addressing a sub-component of a composite.
///
/// The empty path is the *root* path addressing the value as a whole. Paths
/// compose at both ends: [`DataPath::append`] adds an innermost step,
/// [`DataPath::prepend`] an outermost one.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataPath {
    steps: Vec<Index>,
}

impl DataPath {
    /// The root path.
    #[must_use]
    pub const fn root() -> Self {
        Self { steps: Vec::new() }
    }

    /// Creates a path from its steps, outermost first.
    #[must_use]
    pub fn new(steps: Vec<Index>) -> Self {
        Self { steps }
    }

    /// Checks whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps of this path, outermost first.
    #[must_use]
    pub fn steps(&self) -> &[Index] {
        &self.steps
    }

    /// This path extended by one innermost step.
    #[must_use]
    pub fn append(&self, step: Index) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// This path extended by one outermost step.
    #[must_use]
    pub fn prepend(&self, step: Index) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.push(step);
        steps.extend(self.steps.iter().cloned());
        Self { steps }
    }

    /// The concatenation `self ++ inner`, descending further into the value.
    #[must_use]
    pub fn concat(&self, inner: &Self) -> Self {
        let mut steps = self.steps.clone();
        steps.extend(inner.steps.iter().cloned());
        Self { steps }
    }

    /// The concatenation `outer ++ self`, ascending to an enclosing value.
    #[must_use]
    pub fn concat_outer(&self, outer: &Self) -> Self {
        outer.concat(self)
    }

    /// Checks whether this path is a (non-strict) prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.steps.len() <= other.steps.len() && other.steps[..self.steps.len()] == self.steps[..]
    }

    /// Checks whether the addressed regions overlap.
    ///
    /// Two paths overlap iff one is a prefix of the other; sibling paths
    /// address disjoint sub-components.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl Display for DataPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "<>");
        }
        write!(f, "{}", self.steps.iter().join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition() {
        let root = DataPath::root();
        assert!(root.is_root());

        let x = root.append(Index::field("x"));
        let xi = x.append(Index::element(3));
        assert_eq!(xi.steps().len(), 2);

        // prepending the missing outer step reproduces the appended path
        let i = root.append(Index::element(3));
        assert_eq!(i.prepend(Index::field("x")), xi);

        // concat in both directions
        assert_eq!(x.concat(&i), xi);
        assert_eq!(i.concat_outer(&x), xi);
    }

    #[test]
    fn overlap_is_prefix_based() {
        let x = DataPath::root().append(Index::field("x"));
        let y = DataPath::root().append(Index::field("y"));
        let xi = x.append(Index::element(0));

        assert!(DataPath::root().overlaps(&xi));
        assert!(x.overlaps(&xi));
        assert!(xi.overlaps(&x));
        assert!(!x.overlaps(&y));
        assert!(!xi.overlaps(&y));
    }
}
