//! The thread-body analysis: which jobs a thread expression may spawn.

use std::collections::BTreeSet;

use crate::ir::lang::Op;
use crate::ir::{Node, NodeAddress, NodeId};
use crate::lattice::SetLattice;
use crate::solver::{Constraints, elem, subset};

use super::Cba;
use super::context::CallString;

/// Emits the constraints defining the thread-body value of one address.
///
/// Values are the job expressions a thread handle may have been spawned
/// from; they flow through spawn calls, merges and variable bindings like
/// any other value.
#[must_use]
pub fn constraints_for(cba: &Cba<'_>, addr: &NodeAddress, ctx: &CallString) -> Constraints {
    let mgr = cba.manager();
    let basic = cba.basic();
    let lattice = SetLattice::<NodeId>::new();
    let this = cba.body_var(addr, ctx);
    let mut constraints = Constraints::new();

    match addr.node(mgr) {
        Node::Job { .. } => {
            let job = addr.resolve(mgr);
            constraints.add(elem(lattice, BTreeSet::from([job]), this));
        }
        Node::Variable { .. } => {
            let var = addr.resolve(mgr);
            if let Some(init) = cba.binding_of(var) {
                constraints.add(subset(lattice, cba.body_var(init, ctx), this));
            }
        }
        Node::Call { callee, .. } => match basic.op_of(mgr, *callee) {
            // a spawn's handle carries its job; a merge reports the bodies
            // of the thread it awaits
            Some(Op::Parallel | Op::Merge) => {
                constraints.add(subset(lattice, cba.body_var(&addr.child(1), ctx), this));
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
    fn merged_threads_report_their_jobs() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let thread_ty = basic.thread;

        // decl t = parallel(job { .. }); merge(t)
        let work = b.compound(vec![]);
        let job = b.job(work);
        let spawn = b.parallel(job);
        let t = b.variable(thread_ty, 1);
        let decl = b.decl(t, spawn);
        let merge = b.merge(t);
        let root = b.compound(vec![decl, merge]);

        let cba = Cba::new(&mut mgr, root);
        let merge_addr = NodeAddress::new(root).child(1);
        let bodies = cba.thread_bodies(&merge_addr, &CallString::root());

        assert_eq!(bodies, BTreeSet::from([job]));
    }
}
