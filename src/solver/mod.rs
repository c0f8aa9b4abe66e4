//! Inequality-style set constraints and their fixpoint solvers.
//!
//! Analyses name abstract values through [`ValueId`]s, emit [`Constraint`]s
//! relating them and obtain an [`Assignment`] from one of the two solvers:
//! the eager solver fixes a closed constraint set, the lazy solver
//! instantiates constraints on demand through a resolver.

mod constraints;
mod eager;
mod lazy;

pub use constraints::{
    elem, subset, subset_binary, subset_if, subset_if_bigger, subset_if_reduced_bigger,
    subset_unary,
};
pub use eager::solve;
pub use lazy::{ConstraintResolver, LazySolver, solve_lazy};

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::lattice::Lattice;

/// Names one slot of the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("v{_0}")]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    /// Creates the id with the given raw index.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// A [`ValueId`] tagged with the lattice of its slot.
pub struct TypedValueId<L> {
    id: ValueId,
    _lattice: PhantomData<fn() -> L>,
}

impl<L> TypedValueId<L> {
    /// Tags an id with its slot's lattice type.
    #[must_use]
    pub const fn new(id: ValueId) -> Self {
        Self {
            id,
            _lattice: PhantomData,
        }
    }

    /// The untyped id.
    #[must_use]
    pub const fn id(&self) -> ValueId {
        self.id
    }
}

impl<L> Debug for TypedValueId<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<L> Clone for TypedValueId<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L> Copy for TypedValueId<L> {}

impl<L> PartialEq for TypedValueId<L> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<L> Eq for TypedValueId<L> {}

impl<L> From<TypedValueId<L>> for ValueId {
    fn from(typed: TypedValueId<L>) -> Self {
        typed.id
    }
}

/// The observable effect of one [`Constraint::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// No output slot changed.
    Unchanged,
    /// Output slots grew in the lattice order.
    Incremented,
    /// An output slot was replaced by an incomparable value.
    Altered,
}

trait Slot: Any + Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Debug> Slot for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A mapping from [`ValueId`]s to abstract values of their slots' lattices.
///
/// Slots that were never written read as the lattice's ⊥.
#[derive(Debug, Default)]
pub struct Assignment {
    slots: HashMap<ValueId, Box<dyn Slot>>,
}

impl Assignment {
    /// Creates an empty assignment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a slot, yielding ⊥ for unset slots.
    ///
    /// # Panics
    /// Panics if the slot was written through a different lattice type,
    /// which indicates a framework bug.
    #[must_use]
    pub fn get<L: Lattice>(&self, lattice: &L, id: TypedValueId<L>) -> L::Value {
        match self.slots.get(&id.id()) {
            Some(slot) => slot
                .as_any()
                .downcast_ref::<L::Value>()
                .expect("slot accessed through a foreign lattice type")
                .clone(),
            None => lattice.bottom(),
        }
    }

    /// Merges a value into a slot, reporting whether the slot changed.
    ///
    /// # Panics
    /// Panics if the slot was written through a different lattice type.
    pub fn meet_assign<L: Lattice>(
        &mut self,
        lattice: &L,
        id: TypedValueId<L>,
        value: &L::Value,
    ) -> bool {
        let slot = self
            .slots
            .entry(id.id())
            .or_insert_with(|| Box::new(lattice.bottom()));
        let current = slot
            .as_any_mut()
            .downcast_mut::<L::Value>()
            .expect("slot accessed through a foreign lattice type");
        lattice.meet_assign(current, value)
    }

    /// The number of written slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks whether no slot has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One constraint of the analysis.
///
/// Constraints relate input slots to output slots through a monotone
/// `update`. Constraints whose *effective* input set depends on the current
/// assignment override [`Constraint::used_inputs`]; constraints that can
/// grow their input set while solving additionally override the dynamic
/// dependency hooks.
pub trait Constraint: Debug {
    /// All slots the constraint may ever read.
    fn inputs(&self) -> Vec<ValueId>;

    /// The slots the constraint writes.
    fn outputs(&self) -> Vec<ValueId>;

    /// Applies the constraint to the assignment.
    fn update(&self, assignment: &mut Assignment) -> UpdateResult;

    /// Checks whether the constraint holds in the assignment.
    fn check(&self, assignment: &Assignment) -> bool;

    /// The slots actually read under the current assignment.
    fn used_inputs(&self, assignment: &Assignment) -> Vec<ValueId> {
        let _ = assignment;
        self.inputs()
    }

    /// Whether [`Constraint::used_inputs`] depends on the assignment.
    fn has_assignment_dependent_dependencies(&self) -> bool {
        false
    }

    /// Whether the input set can grow during solving.
    fn has_dynamic_dependencies(&self) -> bool {
        false
    }

    /// Re-evaluates dynamic dependencies; returns whether they may have
    /// changed. Re-invoked by the solvers whenever a known input changed.
    fn update_dynamic_dependencies(&self, assignment: &Assignment) -> bool {
        let _ = assignment;
        false
    }
}

/// A shared handle to a constraint.
pub type ConstraintRef = Rc<dyn Constraint>;

/// An ordered collection of constraints.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    list: Vec<ConstraintRef>,
}

impl Constraints {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one constraint.
    pub fn add(&mut self, constraint: ConstraintRef) {
        self.list.push(constraint);
    }

    /// Appends all constraints of another collection.
    pub fn add_all(&mut self, other: &Constraints) {
        self.list.extend(other.list.iter().cloned());
    }

    /// Iterates over the constraints.
    pub fn iter(&self) -> impl Iterator<Item = &ConstraintRef> {
        self.list.iter()
    }

    /// The number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Checks whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl FromIterator<ConstraintRef> for Constraints {
    fn from_iter<I: IntoIterator<Item = ConstraintRef>>(iter: I) -> Self {
        Self {
            list: iter.into_iter().collect(),
        }
    }
}
