//! Abstract lattices.
//!
//! Two lattice flavours are used across the crate. [`Lattice`] is the
//! accumulation-oriented interface of the constraint solver: values grow
//! from ⊥ through `meet_assign` until a fixpoint is reached. Bounded
//! lattices with explicit ⊤/⊥ and user-supplied join/meet operations are
//! built through [`make_lattice`] and the semilattice factories; they back
//! the dataflow framework.

use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};

/// A lattice whose values accumulate information starting from ⊥.
///
/// Implementations are lightweight descriptors (mostly zero-sized) carried
/// by constraints and assignments; the abstract values live in the
/// [`Assignment`](crate::solver::Assignment).
pub trait Lattice: Debug + 'static {
    /// The abstract values of this lattice.
    type Value: Clone + PartialEq + Debug + 'static;

    /// The least element; unset assignment slots read as this value.
    fn bottom(&self) -> Self::Value;

    /// Merges `b` into `a` and reports whether `a` changed.
    ///
    /// After the call `a` equals the combination of the previous `a` and
    /// `b`; the operation is idempotent, commutative and associative.
    fn meet_assign(&self, a: &mut Self::Value, b: &Self::Value) -> bool;

    /// Checks the lattice order `a ⊑ b`.
    ///
    /// The default derives the order from [`Lattice::meet_assign`]: `a` is
    /// below `b` iff merging `a` into `b` changes nothing.
    fn less(&self, a: &Self::Value, b: &Self::Value) -> bool {
        let mut probe = b.clone();
        !self.meet_assign(&mut probe, a)
    }

    /// Combines two values without mutating either.
    fn meet(&self, a: &Self::Value, b: &Self::Value) -> Self::Value {
        let mut result = a.clone();
        self.meet_assign(&mut result, b);
        result
    }
}

/// The powerset lattice over an element type, ordered by inclusion.
///
/// ⊥ is the empty set; `meet_assign` is union, so information only grows.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SetLattice<E> {
    _marker: std::marker::PhantomData<fn() -> E>,
}

impl<E> Clone for SetLattice<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for SetLattice<E> {}

impl<E> SetLattice<E> {
    /// Creates the powerset lattice descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E> Lattice for SetLattice<E>
where
    E: Clone + Ord + Debug + 'static,
{
    type Value = BTreeSet<E>;

    fn bottom(&self) -> Self::Value {
        BTreeSet::new()
    }

    fn meet_assign(&self, a: &mut Self::Value, b: &Self::Value) -> bool {
        let before = a.len();
        a.extend(b.iter().cloned());
        a.len() != before
    }

    fn less(&self, a: &Self::Value, b: &Self::Value) -> bool {
        a.is_subset(b)
    }
}

/// The binary operation of a [`BoundedLattice`].
pub type Operation<T> = Box<dyn Fn(&T, &T) -> T>;

/// A bounded lattice with explicit ⊤ and ⊥.
///
/// Depending on which operations are present, the instance is a lower
/// semilattice (meet only), an upper semilattice (join only) or a full
/// lattice. Invoking an absent operation is a framework bug and panics.
pub struct BoundedLattice<T> {
    top: T,
    bottom: T,
    join: Option<Operation<T>>,
    meet: Option<Operation<T>>,
}

impl<T: Debug> Debug for BoundedLattice<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedLattice")
            .field("top", &self.top)
            .field("bottom", &self.bottom)
            .field("join", &self.join.as_ref().map(|_| ".."))
            .field("meet", &self.meet.as_ref().map(|_| ".."))
            .finish()
    }
}

impl<T> BoundedLattice<T>
where
    T: Clone + PartialEq,
{
    /// The greatest element.
    #[must_use]
    pub const fn top(&self) -> &T {
        &self.top
    }

    /// The least element.
    #[must_use]
    pub const fn bottom(&self) -> &T {
        &self.bottom
    }

    /// Checks whether the meet operation is defined.
    #[must_use]
    pub const fn is_lower_semilattice(&self) -> bool {
        self.meet.is_some()
    }

    /// Checks whether the join operation is defined.
    #[must_use]
    pub const fn is_upper_semilattice(&self) -> bool {
        self.join.is_some()
    }

    /// Checks whether both operations are defined.
    #[must_use]
    pub const fn is_lattice(&self) -> bool {
        self.is_lower_semilattice() && self.is_upper_semilattice()
    }

    /// Computes the greatest lower bound of two elements.
    ///
    /// ⊤ and ⊥ short-circuit, as do identical operands; the user operation
    /// is only consulted for distinct interior elements.
    ///
    /// # Panics
    /// Panics if no meet operation is defined for this lattice.
    #[must_use]
    pub fn meet(&self, lhs: &T, rhs: &T) -> T {
        let meet = self
            .meet
            .as_ref()
            .expect("bound not defined: meet on a join-only semilattice");
        if lhs == rhs {
            return lhs.clone();
        }
        if *lhs == self.bottom || *rhs == self.bottom {
            return self.bottom.clone();
        }
        if *lhs == self.top {
            return rhs.clone();
        }
        if *rhs == self.top {
            return lhs.clone();
        }
        meet(lhs, rhs)
    }

    /// Computes the least upper bound of two elements.
    ///
    /// # Panics
    /// Panics if no join operation is defined for this lattice.
    #[must_use]
    pub fn join(&self, lhs: &T, rhs: &T) -> T {
        let join = self
            .join
            .as_ref()
            .expect("bound not defined: join on a meet-only semilattice");
        if lhs == rhs {
            return lhs.clone();
        }
        if *lhs == self.top || *rhs == self.top {
            return self.top.clone();
        }
        if *lhs == self.bottom {
            return rhs.clone();
        }
        if *rhs == self.bottom {
            return lhs.clone();
        }
        join(lhs, rhs)
    }

    /// Checks whether `lhs` is below `rhs` in the meet order.
    ///
    /// # Panics
    /// Panics if no meet operation is defined for this lattice.
    #[must_use]
    pub fn is_weaker_than(&self, lhs: &T, rhs: &T) -> bool {
        lhs == rhs || self.meet(lhs, rhs) == *lhs
    }

    /// Checks whether `lhs` is above `rhs` in the join order.
    ///
    /// # Panics
    /// Panics if no join operation is defined for this lattice.
    #[must_use]
    pub fn is_stronger_than(&self, lhs: &T, rhs: &T) -> bool {
        lhs == rhs || self.join(lhs, rhs) == *lhs
    }
}

/// Builds a full lattice from its bounds and both operations.
pub fn make_lattice<T>(
    top: T,
    bottom: T,
    join: impl Fn(&T, &T) -> T + 'static,
    meet: impl Fn(&T, &T) -> T + 'static,
) -> BoundedLattice<T> {
    BoundedLattice {
        top,
        bottom,
        join: Some(Box::new(join)),
        meet: Some(Box::new(meet)),
    }
}

/// Builds a lower semilattice providing only a meet operation.
pub fn make_lower_semilattice<T>(
    top: T,
    bottom: T,
    meet: impl Fn(&T, &T) -> T + 'static,
) -> BoundedLattice<T> {
    BoundedLattice {
        top,
        bottom,
        join: None,
        meet: Some(Box::new(meet)),
    }
}

/// Builds an upper semilattice providing only a join operation.
pub fn make_upper_semilattice<T>(
    top: T,
    bottom: T,
    join: impl Fn(&T, &T) -> T + 'static,
) -> BoundedLattice<T> {
    BoundedLattice {
        top,
        bottom,
        join: Some(Box::new(join)),
        meet: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn min_max_lattice() -> BoundedLattice<u8> {
        make_lattice(u8::MAX, u8::MIN, |a, b| *a.max(b), |a, b| *a.min(b))
    }

    #[test]
    fn bounds_short_circuit() {
        let lat = make_lattice(
            255_u8,
            0_u8,
            |_: &u8, _: &u8| -> u8 { panic!("join invoked") },
            |_: &u8, _: &u8| -> u8 { panic!("meet invoked") },
        );
        assert_eq!(lat.meet(&255, &17), 17);
        assert_eq!(lat.meet(&0, &17), 0);
        assert_eq!(lat.join(&255, &17), 255);
        assert_eq!(lat.join(&0, &17), 17);
        assert_eq!(lat.meet(&17, &17), 17);
    }

    #[test]
    #[should_panic(expected = "bound not defined")]
    fn meet_on_upper_semilattice_panics() {
        let lat = make_upper_semilattice(u8::MAX, u8::MIN, |a: &u8, b: &u8| *a.max(b));
        let _ = lat.meet(&1, &2);
    }

    #[test]
    fn semilattice_classification() {
        let lower = make_lower_semilattice(u8::MAX, u8::MIN, |a: &u8, b: &u8| *a.min(b));
        assert!(lower.is_lower_semilattice());
        assert!(!lower.is_upper_semilattice());
        assert!(!lower.is_lattice());
        assert!(min_max_lattice().is_lattice());
    }

    #[test]
    fn set_lattice_accumulates() {
        let lat = SetLattice::<u32>::new();
        let mut a = lat.bottom();
        assert!(lat.meet_assign(&mut a, &BTreeSet::from([1, 2])));
        assert!(lat.meet_assign(&mut a, &BTreeSet::from([3])));
        assert!(!lat.meet_assign(&mut a, &BTreeSet::from([2])));
        assert_eq!(a, BTreeSet::from([1, 2, 3]));
        assert!(lat.less(&BTreeSet::from([1]), &a));
        assert!(!lat.less(&a, &BTreeSet::from([1])));
    }

    proptest! {
        #[test]
        fn meet_laws(a: u8, b: u8, c: u8) {
            let lat = min_max_lattice();
            prop_assert_eq!(lat.meet(&a, &a), a);
            prop_assert_eq!(lat.meet(&a, &b), lat.meet(&b, &a));
            prop_assert_eq!(
                lat.meet(&lat.meet(&a, &b), &c),
                lat.meet(&a, &lat.meet(&b, &c))
            );
            prop_assert_eq!(lat.meet(lat.top(), &a), a);
            prop_assert_eq!(lat.meet(lat.bottom(), &a), *lat.bottom());
        }

        #[test]
        fn join_laws(a: u8, b: u8, c: u8) {
            let lat = min_max_lattice();
            prop_assert_eq!(lat.join(&a, &a), a);
            prop_assert_eq!(lat.join(&a, &b), lat.join(&b, &a));
            prop_assert_eq!(
                lat.join(&lat.join(&a, &b), &c),
                lat.join(&a, &lat.join(&b, &c))
            );
            prop_assert_eq!(lat.join(lat.bottom(), &a), a);
            prop_assert_eq!(lat.join(lat.top(), &a), *lat.top());
        }

        #[test]
        fn absorption(a: u8, b: u8) {
            let lat = min_max_lattice();
            prop_assert_eq!(lat.meet(&a, &lat.join(&a, &b)), a);
            prop_assert_eq!(lat.join(&a, &lat.meet(&a, &b)), a);
        }

        #[test]
        fn set_meet_assign_laws(a: BTreeSet<u8>, b: BTreeSet<u8>) {
            let lat = SetLattice::<u8>::new();
            let mut aa = a.clone();
            prop_assert!(!lat.meet_assign(&mut aa, &a));
            let ab = lat.meet(&a, &b);
            let ba = lat.meet(&b, &a);
            prop_assert_eq!(&ab, &ba);
            prop_assert!(lat.less(&a, &ab));
            prop_assert!(lat.less(&b, &ab));
        }
    }
}
