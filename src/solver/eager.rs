//! The eager fixpoint solver.

use std::collections::{HashMap, VecDeque};

use super::{Assignment, Constraints, UpdateResult, ValueId};

/// Solves a closed constraint set against an initial assignment.
///
/// All outputs are seeded, then values are popped from the worklist and the
/// constraints reading them re-applied until no update changes a slot.
/// Termination follows from monotone updates over lattices of finite
/// effective height.
#[must_use]
pub fn solve(constraints: &Constraints, initial: Assignment) -> Assignment {
    let mut assignment = initial;

    // index the constraints by their (static) inputs
    let mut index: HashMap<ValueId, Vec<usize>> = HashMap::new();
    for (pos, constraint) in constraints.iter().enumerate() {
        for input in constraint.inputs() {
            index.entry(input).or_default().push(pos);
        }
    }

    let mut worklist: VecDeque<ValueId> = VecDeque::new();
    let mut enqueued: std::collections::HashSet<ValueId> = std::collections::HashSet::new();

    // seed: apply every constraint once
    for constraint in constraints.iter() {
        if constraint.has_dynamic_dependencies() {
            constraint.update_dynamic_dependencies(&assignment);
        }
        if constraint.update(&mut assignment) != UpdateResult::Unchanged {
            for output in constraint.outputs() {
                if enqueued.insert(output) {
                    worklist.push_back(output);
                }
            }
        }
    }

    let all: Vec<_> = constraints.iter().cloned().collect();
    while let Some(value) = worklist.pop_front() {
        enqueued.remove(&value);
        let Some(readers) = index.get(&value).cloned() else {
            continue;
        };
        for pos in readers {
            let constraint = &all[pos];
            // constraints with assignment-dependent inputs may ignore the
            // changed value under the current assignment
            if constraint.has_assignment_dependent_dependencies()
                && !constraint.used_inputs(&assignment).contains(&value)
            {
                continue;
            }
            if constraint.has_dynamic_dependencies()
                && constraint.update_dynamic_dependencies(&assignment)
            {
                for input in constraint.inputs() {
                    index.entry(input).or_default().push(pos);
                }
            }
            if constraint.update(&mut assignment) != UpdateResult::Unchanged {
                for output in constraint.outputs() {
                    if enqueued.insert(output) {
                        worklist.push_back(output);
                    }
                }
            }
        }
    }

    assignment
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::lattice::SetLattice;
    use crate::solver::{Constraints, TypedValueId, ValueId, elem, subset};

    use super::*;

    #[test]
    fn cyclic_constraints_terminate() {
        let lat = SetLattice::<u32>::new();
        let a: TypedValueId<SetLattice<u32>> = TypedValueId::new(ValueId::new(0));
        let b = TypedValueId::new(ValueId::new(1));

        let mut constraints = Constraints::new();
        constraints.add(elem(lat, BTreeSet::from([1u32]), a));
        constraints.add(subset(lat, a, b));
        constraints.add(subset(lat, b, a));

        let assignment = solve(&constraints, Assignment::new());
        assert_eq!(assignment.get(&lat, a), BTreeSet::from([1]));
        assert_eq!(assignment.get(&lat, b), BTreeSet::from([1]));
    }

    #[test]
    fn solution_is_order_independent() {
        let lat = SetLattice::<u32>::new();
        let ids: Vec<TypedValueId<SetLattice<u32>>> =
            (0..6).map(|i| TypedValueId::new(ValueId::new(i))).collect();

        let build = |order: &[usize]| {
            let mut constraints = Constraints::new();
            let parts: Vec<_> = vec![
                elem(lat, BTreeSet::from([3u32]), ids[0]),
                subset(lat, ids[0], ids[1]),
                subset(lat, ids[1], ids[2]),
                subset(lat, ids[2], ids[3]),
                subset(lat, ids[0], ids[4]),
                subset(lat, ids[4], ids[3]),
            ];
            for &pos in order {
                constraints.add(parts[pos].clone());
            }
            constraints
        };

        let forward = solve(&build(&[0, 1, 2, 3, 4, 5]), Assignment::new());
        let backward = solve(&build(&[5, 4, 3, 2, 1, 0]), Assignment::new());
        for &id in &ids {
            assert_eq!(forward.get(&lat, id), backward.get(&lat, id));
        }
    }
}
