//! The data-path analysis: which paths a path expression may denote.

use std::collections::BTreeSet;

use crate::data::{DataPath, ElementIndex, Index};
use crate::ir::lang::Op;
use crate::ir::{Node, NodeAddress};
use crate::lattice::SetLattice;
use crate::solver::{Constraints, elem, subset, subset_unary};

use super::Cba;
use super::context::CallString;

/// Emits the constraints defining the data-path value of one address.
#[must_use]
pub fn constraints_for(cba: &Cba<'_>, addr: &NodeAddress, ctx: &CallString) -> Constraints {
    let mgr = cba.manager();
    let basic = cba.basic();
    let lattice = SetLattice::<DataPath>::new();
    let this = cba.path_var(addr, ctx);
    let mut constraints = Constraints::new();

    match addr.node(mgr).clone() {
        Node::Variable { .. } => {
            let var = addr.resolve(mgr);
            if let Some(init) = cba.binding_of(var) {
                constraints.add(subset(lattice, cba.path_var(init, ctx), this));
            }
        }
        Node::Call { callee, args, .. } => match basic.op_of(mgr, callee) {
            Some(Op::DpRoot) => {
                constraints.add(elem(lattice, BTreeSet::from([DataPath::root()]), this));
            }
            Some(Op::DpMember) => {
                let source = cba.path_var(&addr.child(1), ctx);
                let field = match mgr.node(args[1]) {
                    Node::Literal { value, .. } => value.clone(),
                    _ => return constraints,
                };
                constraints.add(subset_unary(
                    lattice,
                    lattice,
                    source,
                    this,
                    move |paths: &BTreeSet<DataPath>| {
                        paths
                            .iter()
                            .map(|p| p.append(Index::field(field.clone())))
                            .collect()
                    },
                ));
            }
            Some(Op::DpElement) => {
                let source = cba.path_var(&addr.child(1), ctx);
                // a statically known index stays precise, anything else is
                // folded into the summary element
                let index = mgr
                    .int_value(args[1])
                    .map_or(ElementIndex::Unknown, ElementIndex::Concrete);
                constraints.add(subset_unary(
                    lattice,
                    lattice,
                    source,
                    this,
                    move |paths: &BTreeSet<DataPath>| {
                        paths
                            .iter()
                            .map(|p| p.append(Index::Element(index)))
                            .collect()
                    },
                ));
            }
            Some(Op::DpComponent) => {
                let source = cba.path_var(&addr.child(1), ctx);
                let Some(component) = mgr.int_value(args[1]) else {
                    return constraints;
                };
                let Ok(component) = usize::try_from(component) else {
                    return constraints;
                };
                constraints.add(subset_unary(
                    lattice,
                    lattice,
                    source,
                    this,
                    move |paths: &BTreeSet<DataPath>| {
                        paths
                            .iter()
                            .map(|p| p.append(Index::Component(component)))
                            .collect()
                    },
                ));
            }
            _ => {}
        },
        _ => {}
    }
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, NodeManager};

    #[test]
    fn composed_paths_accumulate_steps() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);

        // <>.pos[3]
        let root_path = b.dp_root();
        let member = b.dp_member(root_path, "pos");
        let idx = b.int_lit(3);
        let element = b.dp_element(member, idx);
        let root = b.compound(vec![element]);

        let cba = Cba::new(&mut mgr, root);
        let paths = cba.data_paths(&NodeAddress::new(root).child(0), &CallString::root());

        let expected = DataPath::root()
            .append(Index::field("pos"))
            .append(Index::element(3));
        assert_eq!(paths, BTreeSet::from([expected]));
    }

    #[test]
    fn dynamic_indices_become_the_summary_element() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;

        let root_path = b.dp_root();
        let idx = b.variable(int, 1);
        let element = b.dp_element(root_path, idx);
        let root = b.compound(vec![element]);

        let cba = Cba::new(&mut mgr, root);
        let paths = cba.data_paths(&NodeAddress::new(root).child(0), &CallString::root());

        let expected = DataPath::root().append(Index::Element(ElementIndex::Unknown));
        assert_eq!(paths, BTreeSet::from([expected]));
    }
}
