//! End-to-end tests of the value analyses: reference flow, live
//! variables and call-site resolution.

use std::collections::BTreeSet;

use vivace::cba::context::CallString;
use vivace::cba::{Callable, CallSiteManager, Cba};
use vivace::cfg::{Cfg, CreationPolicy};
use vivace::data::{DataPath, Index};
use vivace::dataflow::{LiveVariables, solve};
use vivace::ir::{Builder, NodeAddress, NodeManager};

#[test]
fn reference_flow_through_narrow_and_expand() {
    let mut mgr = NodeManager::new();
    let mut b = Builder::new(&mut mgr);
    let int = b.basic().int;
    let point = b.struct_ty(vec![("x".into(), int), ("y".into(), int)]);
    let ref_point = b.ref_ty(point);
    let ref_int = b.ref_ty(int);

    // decl p = alloc(point); decl x = narrow(p, .x); decl q = expand(x, .x)
    let alloc = b.ref_alloc(point);
    let p = b.variable(ref_point, 1);
    let decl_p = b.decl(p, alloc);

    let root_path = b.dp_root();
    let to_x = b.dp_member(root_path, "x");
    let narrow = b.narrow(p, to_x, int);
    let x = b.variable(ref_int, 2);
    let decl_x = b.decl(x, narrow);

    let expand = b.expand(x, to_x, point);
    let q = b.variable(ref_point, 3);
    let decl_q = b.decl(q, expand);

    let root = b.compound(vec![decl_p, decl_x, decl_q]);
    let cba = Cba::new(&mut mgr, root);
    let ctx = CallString::root();

    let alloc_addr = NodeAddress::new(root).child(0).child(1);
    let narrow_addr = NodeAddress::new(root).child(1).child(1);
    let expand_addr = NodeAddress::new(root).child(2).child(1);

    // the narrowed reference carries exactly (loc(p), .x)
    let narrowed = cba.references(&narrow_addr, &ctx);
    assert_eq!(narrowed.len(), 1);
    let reference = narrowed.iter().next().expect("one reference");
    assert_eq!(reference.location.creation_point(), &alloc_addr);
    assert_eq!(reference.path, DataPath::root().append(Index::field("x")));

    // expanding by the same path returns to the root reference
    let expanded = cba.references(&expand_addr, &ctx);
    assert_eq!(expanded.len(), 1);
    let reference = expanded.iter().next().expect("one reference");
    assert_eq!(reference.location.creation_point(), &alloc_addr);
    // the expand prepends .x ahead of the narrowed .x
    let doubled = DataPath::root()
        .append(Index::field("x"))
        .prepend(Index::field("x"));
    assert_eq!(reference.path, doubled);

    // the two analysed references alias (overlapping paths, one location)
    let narrowed_ref = narrowed.iter().next().expect("one reference");
    let expanded_ref = expanded.iter().next().expect("one reference");
    assert!(narrowed_ref.is_alias(expanded_ref));
}

#[test]
fn live_variables_converge_on_branch_and_loop() {
    let mut mgr = NodeManager::new();
    let mut b = Builder::new(&mut mgr);
    let basic = b.basic();
    let int = basic.int;
    let ref_int = b.ref_ty(int);

    // decl a = 0; if (a' < 10) { a := 1 } else { }; for i in [0,5) { a := i }; decl c = a'
    let a = b.variable(ref_int, 1);
    let zero = b.int_lit(0);
    let decl_a = b.decl(a, zero);

    let load = b.deref(a);
    let ten = b.int_lit(10);
    let cond = b.cmp(vivace::ir::lang::Op::IntLt, load, ten);
    let one = b.int_lit(1);
    let then_store = b.assign(a, one);
    let then_stmt = b.compound(vec![then_store]);
    let else_stmt = b.compound(vec![]);
    let branch = b.if_stmt(cond, then_stmt, else_stmt);

    let i = b.variable(int, 2);
    let five = b.int_lit(5);
    let loop_store = b.assign(a, i);
    let loop_body = b.compound(vec![loop_store]);
    let one_step = b.int_lit(1);
    let loop_stmt = b.for_stmt(i, zero, five, one_step, loop_body);

    let tail_load = b.deref(a);
    let c = b.variable(int, 3);
    let tail = b.decl(c, tail_load);
    let root = b.compound(vec![decl_a, branch, loop_stmt, tail]);

    let cfg = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);
    assert!(cfg.is_consistent());

    let problem = LiveVariables::new(&mgr, basic);
    let results = solve(&problem, &cfg);

    // convergence within nodes × (height + slack) transfer applications
    let height = 3;
    assert!(results.iterations <= cfg.len() * (height + 2));

    // `a` is live at the branch head (read by the condition and the tail)
    let head = cfg
        .blocks()
        .find(|&id| {
            cfg.block(id)
                .elements
                .iter()
                .any(|e| e.stmt.resolve(&mgr) == cond)
        })
        .expect("branch head exists");
    assert!(results.inputs[&head].contains(&a));

    // per-block equation: live-in = (live-out ∖ kill) ∪ gen at the loop store
    let store_block = cfg
        .blocks()
        .find(|&id| {
            cfg.block(id)
                .elements
                .iter()
                .any(|e| e.stmt.resolve(&mgr) == loop_store)
        })
        .expect("store block exists");
    let out = &results.inputs[&store_block];
    let expected: BTreeSet<_> = {
        let mut s = out.clone();
        s.remove(&a);
        s.insert(i);
        s
    };
    assert_eq!(results.outputs[&store_block], expected);
}

#[test]
fn recursive_call_sites_are_enumerated() {
    let mut mgr = NodeManager::new();
    let mut b = Builder::new(&mut mgr);
    let basic = b.basic();
    let int = basic.int;
    let fun_ty = b.fun_ty(vec![int], int);

    // let f = fun(x) { return f(x) }; f(3)
    let f = b.variable(fun_ty, 1);
    let x = b.variable(int, 2);
    let inner = b.call(int, f, vec![x]);
    let ret = b.ret(inner);
    let body = b.compound(vec![ret]);
    let lambda = b.lambda(vec![x], int, body);
    let decl = b.decl(f, lambda);
    let three = b.int_lit(3);
    let outer = b.call(int, f, vec![three]);
    let root = b.compound(vec![decl, outer]);

    let manager = CallSiteManager::new(&mgr, &basic, root);
    let callers = manager.callers_of(Callable::Lambda(lambda));
    let resolved: BTreeSet<_> = callers.iter().map(|a| a.resolve(&mgr)).collect();
    assert_eq!(resolved, BTreeSet::from([inner, outer]));
}
