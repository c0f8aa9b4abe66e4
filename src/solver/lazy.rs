//! The lazy, demand-driven fixpoint solver.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::{Assignment, ConstraintRef, Constraints, UpdateResult, ValueId};

/// Produces the constraints defining the requested values.
///
/// The resolver is invoked with values that have not been resolved yet and
/// returns every constraint contributing to them. For termination, the set
/// of values a resolver can ever emit for a given input must be finite.
pub type ConstraintResolver<'a> = Box<dyn FnMut(&BTreeSet<ValueId>) -> Constraints + 'a>;

/// An incremental solver instantiating constraints on demand.
///
/// Repeated [`LazySolver::solve`] calls reuse previously resolved
/// constraints and the partial solution computed so far.
pub struct LazySolver<'a> {
    resolver: ConstraintResolver<'a>,
    constraints: Constraints,
    assignment: Assignment,
    resolved: HashSet<ValueId>,
    /// input value → constraints reading it
    edges: HashMap<ValueId, Vec<ConstraintRef>>,
}

impl std::fmt::Debug for LazySolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazySolver")
            .field("constraints", &self.constraints.len())
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

impl<'a> LazySolver<'a> {
    /// Creates a solver over a resolver and an initial assignment.
    #[must_use]
    pub fn new(resolver: ConstraintResolver<'a>, initial: Assignment) -> Self {
        Self {
            resolver,
            constraints: Constraints::new(),
            assignment: initial,
            resolved: HashSet::new(),
            edges: HashMap::new(),
        }
    }

    /// The constraints instantiated so far.
    #[must_use]
    pub const fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// The current (partial) solution.
    #[must_use]
    pub const fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Mutable access to the current solution, for taking it over.
    #[must_use]
    pub fn assignment_mut(&mut self) -> &mut Assignment {
        &mut self.assignment
    }

    /// Checks whether constraints for a value have been instantiated.
    #[must_use]
    pub fn is_resolved(&self, value: ValueId) -> bool {
        self.resolved.contains(&value)
    }

    /// Solves for a single value.
    pub fn solve_for(&mut self, value: ValueId) -> &Assignment {
        self.solve(BTreeSet::from([value]))
    }

    /// Solves for a set of values, reusing all previous work.
    pub fn solve(&mut self, values: BTreeSet<ValueId>) -> &Assignment {
        let mut worklist: VecDeque<ValueId> = VecDeque::new();
        self.resolve_all(values, &mut worklist);

        let mut enqueued: HashSet<ValueId> = worklist.iter().copied().collect();
        while let Some(value) = worklist.pop_front() {
            enqueued.remove(&value);
            let readers = self.edges.get(&value).cloned().unwrap_or_default();
            for constraint in readers {
                // inputs demanded under the current assignment must be
                // defined before the constraint is applied
                let used: BTreeSet<ValueId> =
                    constraint.used_inputs(&self.assignment).into_iter().collect();
                self.resolve_all(used, &mut worklist);

                if constraint.has_dynamic_dependencies()
                    && constraint.update_dynamic_dependencies(&self.assignment)
                {
                    let inputs: BTreeSet<ValueId> = constraint.inputs().into_iter().collect();
                    for &input in &inputs {
                        self.edges
                            .entry(input)
                            .or_default()
                            .push(constraint.clone());
                    }
                    self.resolve_all(inputs, &mut worklist);
                }

                if constraint.update(&mut self.assignment) != UpdateResult::Unchanged {
                    for output in constraint.outputs() {
                        if enqueued.insert(output) {
                            worklist.push_back(output);
                        }
                    }
                }
            }
        }

        &self.assignment
    }

    /// Instantiates constraints for all not yet resolved values, including
    /// those demanded transitively by the new constraints' inputs.
    fn resolve_all(&mut self, values: BTreeSet<ValueId>, worklist: &mut VecDeque<ValueId>) {
        let mut pending: VecDeque<ValueId> = values.into_iter().collect();
        while let Some(value) = pending.pop_front() {
            if !self.resolved.insert(value) {
                continue;
            }
            let fresh = (self.resolver)(&BTreeSet::from([value]));
            for constraint in fresh.iter() {
                self.constraints.add(constraint.clone());
                // index by all possible inputs, resolve only demanded ones
                for input in constraint.inputs() {
                    self.edges
                        .entry(input)
                        .or_default()
                        .push(constraint.clone());
                }
                for input in constraint.used_inputs(&self.assignment) {
                    pending.push_back(input);
                }
                if constraint.update(&mut self.assignment) != UpdateResult::Unchanged {
                    for output in constraint.outputs() {
                        worklist.push_back(output);
                    }
                }
            }
        }
    }
}

/// Solves for a single value through a fresh lazy solver.
#[must_use]
pub fn solve_lazy(
    value: ValueId,
    resolver: ConstraintResolver<'_>,
    initial: Assignment,
) -> Assignment {
    let mut solver = LazySolver::new(resolver, initial);
    solver.solve_for(value);
    let LazySolver { assignment, .. } = solver;
    assignment
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::lattice::SetLattice;
    use crate::solver::{TypedValueId, elem, subset};

    use super::*;

    fn typed(id: ValueId) -> TypedValueId<SetLattice<u32>> {
        TypedValueId::new(id)
    }

    /// A chain `v0 ⊒ v1 ⊒ … ⊒ v9` with `{42} ∈ v9`, resolved on demand.
    fn chain_resolver() -> ConstraintResolver<'static> {
        Box::new(|values: &BTreeSet<ValueId>| {
            let lat = SetLattice::<u32>::new();
            let mut result = Constraints::new();
            for &value in values {
                for raw in 0..10u32 {
                    let id = ValueId::new(raw);
                    if id != value {
                        continue;
                    }
                    if raw == 9 {
                        result.add(elem(lat, BTreeSet::from([42u32]), typed(id)));
                    } else {
                        result.add(subset(lat, typed(ValueId::new(raw + 1)), typed(id)));
                    }
                }
            }
            result
        })
    }

    #[test]
    fn demand_resolves_transitively() {
        let lat = SetLattice::<u32>::new();
        let mut solver = LazySolver::new(chain_resolver(), Assignment::new());
        let assignment = solver.solve_for(ValueId::new(0));
        assert_eq!(
            assignment.get(&lat, typed(ValueId::new(0))),
            BTreeSet::from([42])
        );
        // the whole chain was resolved on the way
        assert!(solver.is_resolved(ValueId::new(9)));
    }

    #[test]
    fn repeated_queries_reuse_previous_work() {
        let mut solver = LazySolver::new(chain_resolver(), Assignment::new());
        solver.solve_for(ValueId::new(0));
        let after_first = solver.constraints().len();
        // already covered by the first query; nothing new is instantiated
        solver.solve_for(ValueId::new(5));
        assert_eq!(solver.constraints().len(), after_first);
    }

    #[test]
    fn cyclic_definitions_reach_a_fixpoint() {
        let lat = SetLattice::<u32>::new();
        // v0 and v1 include each other; v1 additionally holds {3}
        let resolver: ConstraintResolver<'static> = Box::new(|values| {
            let lat = SetLattice::<u32>::new();
            let mut result = Constraints::new();
            for &value in values {
                if value == ValueId::new(0) {
                    result.add(subset(lat, typed(ValueId::new(1)), typed(ValueId::new(0))));
                } else if value == ValueId::new(1) {
                    result.add(subset(lat, typed(ValueId::new(0)), typed(ValueId::new(1))));
                    result.add(elem(lat, BTreeSet::from([3u32]), typed(ValueId::new(1))));
                }
            }
            result
        });
        let mut solver = LazySolver::new(resolver, Assignment::new());
        let assignment = solver.solve_for(ValueId::new(0));
        assert_eq!(
            assignment.get(&lat, typed(ValueId::new(0))),
            BTreeSet::from([3])
        );
    }
}
