//! The stock constraint constructors.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::rc::Rc;

use crate::lattice::{Lattice, SetLattice};

use super::{Assignment, Constraint, ConstraintRef, TypedValueId, UpdateResult, ValueId};

fn result_of(changed: bool) -> UpdateResult {
    if changed {
        UpdateResult::Incremented
    } else {
        UpdateResult::Unchanged
    }
}

/// `value ∈ target` — the constant is a member of the target slot.
pub fn elem<L>(lattice: L, value: L::Value, target: TypedValueId<L>) -> ConstraintRef
where
    L: Lattice,
{
    Rc::new(ElementOf {
        lattice,
        value,
        target,
    })
}

#[derive(Debug)]
struct ElementOf<L: Lattice> {
    lattice: L,
    value: L::Value,
    target: TypedValueId<L>,
}

impl<L: Lattice> Constraint for ElementOf<L> {
    fn inputs(&self) -> Vec<ValueId> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<ValueId> {
        vec![self.target.into()]
    }

    fn update(&self, assignment: &mut Assignment) -> UpdateResult {
        result_of(assignment.meet_assign(&self.lattice, self.target, &self.value))
    }

    fn check(&self, assignment: &Assignment) -> bool {
        let current = assignment.get(&self.lattice, self.target);
        self.lattice.less(&self.value, &current)
    }
}

/// `from ⊑ to`.
pub fn subset<L>(lattice: L, from: TypedValueId<L>, to: TypedValueId<L>) -> ConstraintRef
where
    L: Lattice,
{
    assert_ne!(from.id(), to.id(), "subset of a slot with itself");
    Rc::new(Subset { lattice, from, to })
}

#[derive(Debug)]
struct Subset<L: Lattice> {
    lattice: L,
    from: TypedValueId<L>,
    to: TypedValueId<L>,
}

impl<L: Lattice> Constraint for Subset<L> {
    fn inputs(&self) -> Vec<ValueId> {
        vec![self.from.into()]
    }

    fn outputs(&self) -> Vec<ValueId> {
        vec![self.to.into()]
    }

    fn update(&self, assignment: &mut Assignment) -> UpdateResult {
        let value = assignment.get(&self.lattice, self.from);
        result_of(assignment.meet_assign(&self.lattice, self.to, &value))
    }

    fn check(&self, assignment: &Assignment) -> bool {
        let from = assignment.get(&self.lattice, self.from);
        let to = assignment.get(&self.lattice, self.to);
        self.lattice.less(&from, &to)
    }
}

/// `guard ∈ guard_set ⇒ from ⊑ to` — the conditional subset constraint.
///
/// The guard slot is read unconditionally; the conditioned input only when
/// the guard holds, making the dependency assignment-dependent.
pub fn subset_if<E, L>(
    guard: E,
    guard_set: TypedValueId<SetLattice<E>>,
    lattice: L,
    from: TypedValueId<L>,
    to: TypedValueId<L>,
) -> ConstraintRef
where
    E: Clone + Ord + Debug + 'static,
    L: Lattice,
{
    Rc::new(SubsetIf {
        guard,
        guard_set,
        lattice,
        from,
        to,
    })
}

#[derive(Debug)]
struct SubsetIf<E: Clone + Ord + Debug + 'static, L: Lattice> {
    guard: E,
    guard_set: TypedValueId<SetLattice<E>>,
    lattice: L,
    from: TypedValueId<L>,
    to: TypedValueId<L>,
}

impl<E: Clone + Ord + Debug + 'static, L: Lattice> SubsetIf<E, L> {
    fn guard_holds(&self, assignment: &Assignment) -> bool {
        assignment
            .get(&SetLattice::new(), self.guard_set)
            .contains(&self.guard)
    }
}

impl<E: Clone + Ord + Debug + 'static, L: Lattice> Constraint for SubsetIf<E, L> {
    fn inputs(&self) -> Vec<ValueId> {
        vec![self.guard_set.into(), self.from.into()]
    }

    fn outputs(&self) -> Vec<ValueId> {
        vec![self.to.into()]
    }

    fn update(&self, assignment: &mut Assignment) -> UpdateResult {
        if !self.guard_holds(assignment) {
            return UpdateResult::Unchanged;
        }
        let value = assignment.get(&self.lattice, self.from);
        result_of(assignment.meet_assign(&self.lattice, self.to, &value))
    }

    fn check(&self, assignment: &Assignment) -> bool {
        if !self.guard_holds(assignment) {
            return true;
        }
        let from = assignment.get(&self.lattice, self.from);
        let to = assignment.get(&self.lattice, self.to);
        self.lattice.less(&from, &to)
    }

    fn used_inputs(&self, assignment: &Assignment) -> Vec<ValueId> {
        let mut used = vec![self.guard_set.into()];
        if self.guard_holds(assignment) {
            used.push(self.from.into());
        }
        used
    }

    fn has_assignment_dependent_dependencies(&self) -> bool {
        true
    }
}

/// `f(source) ⊑ target` for a monotone `f`.
pub fn subset_unary<LA, LR, F>(
    source_lattice: LA,
    target_lattice: LR,
    source: TypedValueId<LA>,
    target: TypedValueId<LR>,
    function: F,
) -> ConstraintRef
where
    LA: Lattice,
    LR: Lattice,
    F: Fn(&LA::Value) -> LR::Value + 'static,
{
    Rc::new(SubsetUnary {
        source_lattice,
        target_lattice,
        source,
        target,
        function,
    })
}

struct SubsetUnary<LA: Lattice, LR: Lattice, F> {
    source_lattice: LA,
    target_lattice: LR,
    source: TypedValueId<LA>,
    target: TypedValueId<LR>,
    function: F,
}

impl<LA: Lattice, LR: Lattice, F> Debug for SubsetUnary<LA, LR, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f({:?}) sub {:?}", self.source, self.target)
    }
}

impl<LA, LR, F> Constraint for SubsetUnary<LA, LR, F>
where
    LA: Lattice,
    LR: Lattice,
    F: Fn(&LA::Value) -> LR::Value + 'static,
{
    fn inputs(&self) -> Vec<ValueId> {
        vec![self.source.into()]
    }

    fn outputs(&self) -> Vec<ValueId> {
        vec![self.target.into()]
    }

    fn update(&self, assignment: &mut Assignment) -> UpdateResult {
        let source = assignment.get(&self.source_lattice, self.source);
        let image = (self.function)(&source);
        result_of(assignment.meet_assign(&self.target_lattice, self.target, &image))
    }

    fn check(&self, assignment: &Assignment) -> bool {
        let source = assignment.get(&self.source_lattice, self.source);
        let image = (self.function)(&source);
        let target = assignment.get(&self.target_lattice, self.target);
        self.target_lattice.less(&image, &target)
    }
}

/// `f(a, b) ⊑ target` for a monotone `f`.
pub fn subset_binary<LA, LB, LR, F>(
    lattices: (LA, LB, LR),
    a: TypedValueId<LA>,
    b: TypedValueId<LB>,
    target: TypedValueId<LR>,
    function: F,
) -> ConstraintRef
where
    LA: Lattice,
    LB: Lattice,
    LR: Lattice,
    F: Fn(&LA::Value, &LB::Value) -> LR::Value + 'static,
{
    Rc::new(SubsetBinary {
        lattices,
        a,
        b,
        target,
        function,
    })
}

struct SubsetBinary<LA: Lattice, LB: Lattice, LR: Lattice, F> {
    lattices: (LA, LB, LR),
    a: TypedValueId<LA>,
    b: TypedValueId<LB>,
    target: TypedValueId<LR>,
    function: F,
}

impl<LA: Lattice, LB: Lattice, LR: Lattice, F> Debug for SubsetBinary<LA, LB, LR, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f({:?},{:?}) sub {:?}", self.a, self.b, self.target)
    }
}

impl<LA, LB, LR, F> Constraint for SubsetBinary<LA, LB, LR, F>
where
    LA: Lattice,
    LB: Lattice,
    LR: Lattice,
    F: Fn(&LA::Value, &LB::Value) -> LR::Value + 'static,
{
    fn inputs(&self) -> Vec<ValueId> {
        vec![self.a.into(), self.b.into()]
    }

    fn outputs(&self) -> Vec<ValueId> {
        vec![self.target.into()]
    }

    fn update(&self, assignment: &mut Assignment) -> UpdateResult {
        let a = assignment.get(&self.lattices.0, self.a);
        let b = assignment.get(&self.lattices.1, self.b);
        let image = (self.function)(&a, &b);
        result_of(assignment.meet_assign(&self.lattices.2, self.target, &image))
    }

    fn check(&self, assignment: &Assignment) -> bool {
        let a = assignment.get(&self.lattices.0, self.a);
        let b = assignment.get(&self.lattices.1, self.b);
        let image = (self.function)(&a, &b);
        let target = assignment.get(&self.lattices.2, self.target);
        self.lattices.2.less(&image, &target)
    }
}

/// `|set| > threshold ⇒ from ⊑ to` — gating on a set-size threshold.
pub fn subset_if_bigger<E, L>(
    set: TypedValueId<SetLattice<E>>,
    threshold: usize,
    lattice: L,
    from: TypedValueId<L>,
    to: TypedValueId<L>,
) -> ConstraintRef
where
    E: Clone + Ord + Debug + 'static,
    L: Lattice,
{
    Rc::new(SubsetIfBigger {
        set,
        excluded: None,
        threshold,
        lattice,
        from,
        to,
    })
}

/// `|set ∖ {excluded}| > threshold ⇒ from ⊑ to`.
pub fn subset_if_reduced_bigger<E, L>(
    set: TypedValueId<SetLattice<E>>,
    excluded: E,
    threshold: usize,
    lattice: L,
    from: TypedValueId<L>,
    to: TypedValueId<L>,
) -> ConstraintRef
where
    E: Clone + Ord + Debug + 'static,
    L: Lattice,
{
    Rc::new(SubsetIfBigger {
        set,
        excluded: Some(excluded),
        threshold,
        lattice,
        from,
        to,
    })
}

#[derive(Debug)]
struct SubsetIfBigger<E: Clone + Ord + Debug + 'static, L: Lattice> {
    set: TypedValueId<SetLattice<E>>,
    excluded: Option<E>,
    threshold: usize,
    lattice: L,
    from: TypedValueId<L>,
    to: TypedValueId<L>,
}

impl<E: Clone + Ord + Debug + 'static, L: Lattice> SubsetIfBigger<E, L> {
    fn gate_open(&self, assignment: &Assignment) -> bool {
        let set: BTreeSet<E> = assignment.get(&SetLattice::new(), self.set);
        let reduction = usize::from(
            self.excluded
                .as_ref()
                .is_some_and(|excluded| set.contains(excluded)),
        );
        set.len() - reduction > self.threshold
    }
}

impl<E: Clone + Ord + Debug + 'static, L: Lattice> Constraint for SubsetIfBigger<E, L> {
    fn inputs(&self) -> Vec<ValueId> {
        vec![self.set.into(), self.from.into()]
    }

    fn outputs(&self) -> Vec<ValueId> {
        vec![self.to.into()]
    }

    fn update(&self, assignment: &mut Assignment) -> UpdateResult {
        if !self.gate_open(assignment) {
            return UpdateResult::Unchanged;
        }
        let value = assignment.get(&self.lattice, self.from);
        result_of(assignment.meet_assign(&self.lattice, self.to, &value))
    }

    fn check(&self, assignment: &Assignment) -> bool {
        if !self.gate_open(assignment) {
            return true;
        }
        let from = assignment.get(&self.lattice, self.from);
        let to = assignment.get(&self.lattice, self.to);
        self.lattice.less(&from, &to)
    }

    fn used_inputs(&self, assignment: &Assignment) -> Vec<ValueId> {
        let mut used = vec![self.set.into()];
        if self.gate_open(assignment) {
            used.push(self.from.into());
        }
        used
    }

    fn has_assignment_dependent_dependencies(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::solve;

    fn sets(n: u32) -> Vec<TypedValueId<SetLattice<u32>>> {
        (0..n).map(|i| TypedValueId::new(ValueId::new(i))).collect()
    }

    #[test]
    fn elem_and_subset_propagate() {
        let v = sets(3);
        let mut constraints = crate::solver::Constraints::new();
        constraints.add(elem(SetLattice::new(), BTreeSet::from([5u32]), v[0]));
        constraints.add(subset(SetLattice::<u32>::new(), v[0], v[1]));
        constraints.add(subset(SetLattice::<u32>::new(), v[1], v[2]));

        let assignment = solve(&constraints, Assignment::new());
        assert_eq!(
            assignment.get(&SetLattice::new(), v[2]),
            BTreeSet::from([5])
        );
        assert!(constraints.iter().all(|c| c.check(&assignment)));
    }

    #[test]
    fn conditional_subset_waits_for_its_guard() {
        let v = sets(4);
        let mut constraints = crate::solver::Constraints::new();
        // v1 ⊑ v2 only once 7 ∈ v0
        constraints.add(subset_if(
            7u32,
            v[0],
            SetLattice::<u32>::new(),
            v[1],
            v[2],
        ));
        constraints.add(elem(SetLattice::new(), BTreeSet::from([1u32]), v[1]));

        let closed = solve(&constraints, Assignment::new());
        assert!(closed.get(&SetLattice::new(), v[2]).is_empty());

        constraints.add(elem(SetLattice::new(), BTreeSet::from([7u32]), v[0]));
        let open = solve(&constraints, Assignment::new());
        assert_eq!(open.get(&SetLattice::new(), v[2]), BTreeSet::from([1]));
    }

    #[test]
    fn unary_function_constraints_apply_monotone_maps() {
        let v = sets(2);
        let mut constraints = crate::solver::Constraints::new();
        constraints.add(elem(SetLattice::new(), BTreeSet::from([1u32, 2]), v[0]));
        constraints.add(subset_unary(
            SetLattice::<u32>::new(),
            SetLattice::<u32>::new(),
            v[0],
            v[1],
            |set: &BTreeSet<u32>| set.iter().map(|x| x * 10).collect(),
        ));

        let assignment = solve(&constraints, Assignment::new());
        assert_eq!(
            assignment.get(&SetLattice::new(), v[1]),
            BTreeSet::from([10, 20])
        );
    }

    #[test]
    fn size_gate_opens_at_the_threshold() {
        let v = sets(3);
        let mut constraints = crate::solver::Constraints::new();
        constraints.add(elem(SetLattice::new(), BTreeSet::from([1u32]), v[1]));
        constraints.add(subset_if_bigger(v[0], 1, SetLattice::<u32>::new(), v[1], v[2]));
        constraints.add(elem(SetLattice::new(), BTreeSet::from([10u32]), v[0]));

        let below = solve(&constraints, Assignment::new());
        assert!(below.get(&SetLattice::new(), v[2]).is_empty());

        constraints.add(elem(SetLattice::new(), BTreeSet::from([11u32]), v[0]));
        let above = solve(&constraints, Assignment::new());
        assert_eq!(above.get(&SetLattice::new(), v[2]), BTreeSet::from([1]));
    }
}
