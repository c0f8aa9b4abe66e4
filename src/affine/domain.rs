//! Iteration domains.

use std::fmt::{self, Display, Formatter};

use super::constraint::{AffineConstraint, Combiner, Relation};
use super::function::AffineFunction;
use super::iter_vec::IterationVector;

/// The set of integer points an iterator nest visits, described by affine
/// constraints over an [`IterationVector`].
///
/// Besides proper constraint sets the domain has two distinguished states:
/// the *universe* (no constraint) and the *empty* domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationDomain {
    iv: IterationVector,
    constraint: Option<Combiner>,
    empty: bool,
}

impl IterationDomain {
    /// The unconstrained domain over the given vector.
    #[must_use]
    pub fn universe(iv: IterationVector) -> Self {
        Self {
            iv,
            constraint: None,
            empty: false,
        }
    }

    /// The empty domain over the given vector.
    #[must_use]
    pub fn empty(iv: IterationVector) -> Self {
        Self {
            iv,
            constraint: None,
            empty: true,
        }
    }

    /// The domain described by a constraint combination.
    #[must_use]
    pub fn new(iv: IterationVector, constraint: Combiner) -> Self {
        Self {
            iv,
            constraint: Some(constraint),
            empty: false,
        }
    }

    /// The domain described by coefficient rows, each read as `f(x) ≥ 0`.
    ///
    /// An empty row list yields the empty domain.
    #[must_use]
    pub fn from_coeffs(iv: IterationVector, rows: &[Vec<i64>]) -> Self {
        let mut constraint: Option<Combiner> = None;
        for row in rows {
            let atom = Combiner::atom(AffineConstraint::new(
                AffineFunction::new(&iv, row.clone()),
                Relation::Ge,
            ));
            constraint = Some(match constraint {
                Some(c) => c.and(atom),
                None => atom,
            });
        }
        match constraint {
            Some(constraint) => Self::new(iv, constraint),
            None => Self::empty(iv),
        }
    }

    /// A copy of `other` rebased onto the wider vector `iv`.
    ///
    /// # Panics
    /// Panics if `iv` does not cover the vector of `other`.
    #[must_use]
    pub fn rebased(iv: IterationVector, other: &Self) -> Self {
        let constraint = other
            .constraint
            .as_ref()
            .map(|c| c.to_base(&other.iv, &iv));
        Self {
            iv,
            constraint,
            empty: other.empty,
        }
    }

    /// The underlying iteration vector.
    #[must_use]
    pub const fn iteration_vector(&self) -> &IterationVector {
        &self.iv
    }

    /// The constraint combination, if the domain is neither universe nor
    /// empty.
    #[must_use]
    pub const fn constraint(&self) -> Option<&Combiner> {
        self.constraint.as_ref()
    }

    /// Checks whether this is the unconstrained domain.
    #[must_use]
    pub const fn is_universe(&self) -> bool {
        !self.empty && self.constraint.is_none()
    }

    /// Checks whether this is the empty domain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.empty
    }

    /// Checks whether the domain contains the given integer point.
    #[must_use]
    pub fn contains(&self, point: &[i64]) -> bool {
        if self.empty {
            return false;
        }
        self.constraint.as_ref().is_none_or(|c| c.holds_at(point))
    }

    /// The intersection of two domains over the same vector.
    ///
    /// # Panics
    /// Panics if the vectors differ.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        assert_eq!(self.iv, other.iv, "domains over different vectors");
        if self.empty || other.empty {
            return Self::empty(self.iv.clone());
        }
        let constraint = match (&self.constraint, &other.constraint) {
            (None, None) => None,
            (Some(c), None) | (None, Some(c)) => Some(c.clone()),
            (Some(a), Some(b)) => Some(a.clone().and(b.clone())),
        };
        Self {
            iv: self.iv.clone(),
            constraint,
            empty: false,
        }
    }

    /// The union of two domains over the same vector.
    ///
    /// # Panics
    /// Panics if the vectors differ.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        assert_eq!(self.iv, other.iv, "domains over different vectors");
        if self.empty {
            return other.clone();
        }
        if other.empty {
            return self.clone();
        }
        let constraint = match (&self.constraint, &other.constraint) {
            (None, _) | (_, None) => None,
            (Some(a), Some(b)) => Some(a.clone().or(b.clone())),
        };
        Self {
            iv: self.iv.clone(),
            constraint,
            empty: false,
        }
    }

    /// The complement of this domain.
    #[must_use]
    pub fn complement(&self) -> Self {
        if self.empty {
            return Self::universe(self.iv.clone());
        }
        match &self.constraint {
            None => Self::empty(self.iv.clone()),
            Some(c) => Self {
                iv: self.iv.clone(),
                constraint: Some(c.clone().not()),
                empty: false,
            },
        }
    }
}

impl Display for IterationDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.empty {
            return write!(f, "{{}}");
        }
        match &self.constraint {
            None => write!(f, "{{ universe }}"),
            Some(c) => write!(f, "{{ {} }}", c.to_dnf().display(&self.iv)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, NodeManager};

    fn iv() -> IterationVector {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        IterationVector::with(vec![i], vec![])
    }

    fn range(iv: &IterationVector, lo: i64, hi: i64) -> IterationDomain {
        // i - lo ≥ 0  and  hi - i ≥ 0
        IterationDomain::from_coeffs(iv.clone(), &[vec![1, -lo], vec![-1, hi]])
    }

    #[test]
    fn membership() {
        let iv = iv();
        let dom = range(&iv, 10, 99);
        assert!(dom.contains(&[10]));
        assert!(dom.contains(&[99]));
        assert!(!dom.contains(&[9]));
        assert!(!dom.contains(&[100]));
    }

    #[test]
    fn universe_and_empty() {
        let iv = iv();
        let universe = IterationDomain::universe(iv.clone());
        let empty = IterationDomain::empty(iv.clone());
        assert!(universe.is_universe());
        assert!(empty.is_empty());
        assert!(universe.contains(&[12345]));
        assert!(!empty.contains(&[0]));

        let dom = range(&iv, 0, 5);
        assert!(dom.intersect(&empty).is_empty());
        assert_eq!(dom.union(&empty), dom);
        assert!(dom.intersect(&universe).contains(&[3]));
        assert!(dom.union(&universe).is_universe());
    }

    #[test]
    fn set_algebra() {
        let iv = iv();
        let a = range(&iv, 0, 10);
        let b = range(&iv, 5, 15);
        let both = a.intersect(&b);
        let either = a.union(&b);
        let not_a = a.complement();
        for i in -5..20 {
            assert_eq!(both.contains(&[i]), a.contains(&[i]) && b.contains(&[i]));
            assert_eq!(either.contains(&[i]), a.contains(&[i]) || b.contains(&[i]));
            assert_eq!(not_a.contains(&[i]), !a.contains(&[i]));
        }
    }
}
