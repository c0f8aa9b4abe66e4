//! The reference analysis: which memory a reference expression may denote.

use std::collections::BTreeSet;

use crate::data::DataPath;
use crate::ir::lang::Op;
use crate::ir::{Node, NodeAddress};
use crate::lattice::SetLattice;
use crate::solver::{Constraints, elem, subset, subset_binary};

use super::context::{CallString, ContextRep};
use super::entities::{Reference, is_memory_constructor, location_of};
use super::{Callable, Cba};

/// Emits the constraints defining the reference value of one address.
#[must_use]
pub fn constraints_for(cba: &Cba<'_>, addr: &NodeAddress, ctx: &CallString) -> Constraints {
    let mgr = cba.manager();
    let basic = cba.basic();
    let lattice = SetLattice::<Reference>::new();
    let this = cba.ref_var(addr, ctx);
    let mut constraints = Constraints::new();

    match addr.node(mgr).clone() {
        Node::Literal { ty, .. } => {
            // literals of a reference type introduce (global) locations
            if is_memory_constructor(mgr, basic, addr) {
                let location = location_of(mgr, basic, addr, ctx);
                constraints.add(elem(
                    lattice,
                    BTreeSet::from([Reference::to_location(location)]),
                    this,
                ));
            } else if mgr.ty(ty).is_ref() {
                seed_unknown(cba, &mut constraints, addr, ctx);
            }
        }
        Node::Variable { ty, .. } => {
            let var = addr.resolve(mgr);
            if let Some(init) = cba.binding_of(var) {
                // the value at a use is the value at the definition
                constraints.add(subset(lattice, cba.ref_var(init, ctx), this));
            } else if let Some((lambda, index)) = cba.param_of(var) {
                // parameters receive the arguments of every call site
                for site in cba.call_sites().callers_of(Callable::Lambda(lambda)) {
                    let arg = site.child(1 + index);
                    constraints.add(subset(lattice, cba.ref_var(&arg, ctx), this));
                }
            } else if mgr.ty(ty).is_ref() {
                // unbound reference variables may carry anything external
                seed_unknown(cba, &mut constraints, addr, ctx);
            }
        }
        Node::Call { ty, callee, .. } => {
            if is_memory_constructor(mgr, basic, addr) {
                // allocation calls introduce a location at the call site
                let location = location_of(mgr, basic, addr, ctx);
                constraints.add(elem(
                    lattice,
                    BTreeSet::from([Reference::to_location(location)]),
                    this,
                ));
                return constraints;
            }
            match basic.op_of(mgr, callee) {
                Some(Op::RefNarrow) => {
                    // {(ℓ, p ++ q) : (ℓ,p) ∈ R(ref), q ∈ DP(path)} ⊑ R(call)
                    let source = cba.ref_var(&addr.child(1), ctx);
                    let paths = cba.path_var(&addr.child(2), ctx);
                    constraints.add(subset_binary(
                        (lattice, SetLattice::<DataPath>::new(), lattice),
                        source,
                        paths,
                        this,
                        |refs: &BTreeSet<Reference>, paths: &BTreeSet<DataPath>| {
                            refs.iter()
                                .flat_map(|r| {
                                    paths.iter().map(move |q| {
                                        Reference::new(
                                            r.location.clone(),
                                            r.path.concat(q),
                                        )
                                    })
                                })
                                .collect()
                        },
                    ));
                }
                Some(Op::RefExpand) => {
                    // symmetric to narrow, with path prepend
                    let source = cba.ref_var(&addr.child(1), ctx);
                    let paths = cba.path_var(&addr.child(2), ctx);
                    constraints.add(subset_binary(
                        (lattice, SetLattice::<DataPath>::new(), lattice),
                        source,
                        paths,
                        this,
                        |refs: &BTreeSet<Reference>, paths: &BTreeSet<DataPath>| {
                            refs.iter()
                                .flat_map(|r| {
                                    paths.iter().map(move |q| {
                                        Reference::new(
                                            r.location.clone(),
                                            r.path.concat_outer(q),
                                        )
                                    })
                                })
                                .collect()
                        },
                    ));
                }
                Some(Op::RefReinterpret) => {
                    // re-interpretation does not alter the reference
                    constraints.add(subset(lattice, cba.ref_var(&addr.child(1), ctx), this));
                }
                Some(_) => {
                    // other operators yield references only through memory
                    // the analysis does not model
                    if mgr.ty(ty).is_ref() {
                        seed_unknown(cba, &mut constraints, addr, ctx);
                    }
                }
                None => {
                    // an ordinary call: wire the callees' returned values
                    wire_call(cba, &mut constraints, addr, ctx, this);
                }
            }
        }
        Node::Cast { ty, .. } if mgr.ty(ty).is_ref() => {
            seed_unknown(cba, &mut constraints, addr, ctx);
        }
        _ => {}
    }
    constraints
}

/// Connects a call expression to the return values of its callees.
fn wire_call(
    cba: &Cba<'_>,
    constraints: &mut Constraints,
    call: &NodeAddress,
    ctx: &CallString,
    this: crate::solver::TypedValueId<SetLattice<Reference>>,
) {
    let mgr = cba.manager();
    let lattice = SetLattice::<Reference>::new();
    let callees = cba.call_sites().callees_of(call).to_vec();
    if callees.is_empty() {
        // no known target: anything external may flow back
        seed_unknown_typed(cba, constraints, this);
        return;
    }
    for callable in callees {
        match callable {
            Callable::Lambda(lambda) => {
                let inner = ctx.push_call(call);
                let lambda_root = NodeAddress::new(lambda);
                // the call's value is each returned expression's value
                let mut returns = Vec::new();
                crate::ir::visit::preorder(mgr, &lambda_root, &mut |a| {
                    if matches!(a.node(mgr), Node::Return { .. }) {
                        returns.push(a.child(0));
                    }
                });
                for ret in returns {
                    constraints.add(subset(lattice, cba.ref_var(&ret, &inner), this));
                }
            }
            Callable::Bind(_) | Callable::External(_) => {
                if cba
                    .manager()
                    .type_of(call.resolve(mgr))
                    .is_some_and(|ty| mgr.ty(ty).is_ref())
                {
                    seed_unknown_typed(cba, constraints, this);
                }
            }
        }
    }
}

fn seed_unknown(
    cba: &Cba<'_>,
    constraints: &mut Constraints,
    addr: &NodeAddress,
    ctx: &CallString,
) {
    let this = cba.ref_var(addr, ctx);
    seed_unknown_typed(cba, constraints, this);
}

fn seed_unknown_typed(
    cba: &Cba<'_>,
    constraints: &mut Constraints,
    this: crate::solver::TypedValueId<SetLattice<Reference>>,
) {
    constraints.add(elem(
        SetLattice::<Reference>::new(),
        cba.unknown_references().clone(),
        this,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Index;
    use crate::ir::{Builder, NodeManager};

    #[test]
    fn narrow_appends_the_path() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let point = b.struct_ty(vec![("x".into(), int)]);
        let ref_point = b.ref_ty(point);

        // decl x = alloc(point); decl y = narrow(x, .x)
        let alloc = b.ref_alloc(point);
        let x = b.variable(ref_point, 1);
        let decl_x = b.decl(x, alloc);
        let root_path = b.dp_root();
        let path = b.dp_member(root_path, "x");
        let narrow = b.narrow(x, path, int);
        let ref_int = b.ref_ty(int);
        let y = b.variable(ref_int, 2);
        let decl_y = b.decl(y, narrow);
        let root = b.compound(vec![decl_x, decl_y]);

        let cba = Cba::new(&mut mgr, root);
        let ctx = CallString::root();

        // address of the narrow call: root/decl_y/init
        let narrow_addr = NodeAddress::new(root).child(1).child(1);
        let refs = cba.references(&narrow_addr, &ctx);

        assert_eq!(refs.len(), 1);
        let reference = refs.iter().next().expect("one reference");
        let expected_path = DataPath::root().append(Index::field("x"));
        assert_eq!(reference.path, expected_path);
        // the location is the allocation call inside decl_x
        assert_eq!(
            reference.location.creation_point(),
            &NodeAddress::new(root).child(0).child(1)
        );
    }

    #[test]
    fn unknown_calls_seed_the_external_references() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let ref_int = b.ref_ty(int);
        let fun_ty = b.fun_ty(vec![], ref_int);
        let opaque = b.literal(fun_ty, "mystery");
        let call = b.call(ref_int, opaque, vec![]);
        let root = b.compound(vec![call]);

        let cba = Cba::new(&mut mgr, root);
        let refs = cba.references(&NodeAddress::new(root).child(0), &CallString::root());
        for unknown in cba.unknown_references() {
            assert!(refs.contains(unknown));
        }
    }
}
