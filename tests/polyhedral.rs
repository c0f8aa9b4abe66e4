//! End-to-end tests of the polyhedral layer: extraction, dependence
//! analysis, loop transformations and code generation.

use std::collections::HashMap;

use vivace::affine::IterationDomain;
use vivace::ir::lang::Op;
use vivace::ir::{Builder, Node, NodeId, NodeManager};
use vivace::pres::{Context, Pwqp, Set};
use vivace::scop::{DepKind, extract, transform};

/// Builds `for i in [10,50) { v[i] := i }` and returns (root, v).
fn single_loop(mgr: &mut NodeManager) -> (NodeId, NodeId) {
    let mut b = Builder::new(mgr);
    let int = b.basic().int;
    let array = b.array_ty(int);
    let ref_array = b.ref_ty(array);
    let v = b.variable(ref_array, 1);
    let i = b.variable(int, 2);

    let cell = b.subscript(v, i);
    let store = b.assign(cell, i);
    let body = b.compound(vec![store]);
    let ten = b.int_lit(10);
    let fifty = b.int_lit(50);
    let one = b.int_lit(1);
    let loop_stmt = b.for_stmt(i, ten, fifty, one, body);
    let root = b.compound(vec![loop_stmt]);
    (root, v)
}

/// Builds `for i in [10,50) for j in [5,25) { v[i][j] := i }`.
fn nested_loops(mgr: &mut NodeManager) -> NodeId {
    let mut b = Builder::new(mgr);
    let int = b.basic().int;
    let inner_array = b.array_ty(int);
    let outer_array = b.array_ty(inner_array);
    let ref_array = b.ref_ty(outer_array);
    let v = b.variable(ref_array, 1);
    let i = b.variable(int, 2);
    let j = b.variable(int, 3);

    let row = b.subscript(v, i);
    let cell = b.subscript(row, j);
    let store = b.assign(cell, i);
    let inner_body = b.compound(vec![store]);
    let five = b.int_lit(5);
    let twenty_five = b.int_lit(25);
    let one = b.int_lit(1);
    let inner = b.for_stmt(j, five, twenty_five, one, inner_body);

    let outer_body = b.compound(vec![inner]);
    let ten = b.int_lit(10);
    let fifty = b.int_lit(50);
    let outer = b.for_stmt(i, ten, fifty, one, outer_body);
    b.compound(vec![outer])
}

/// A tiny interpreter for the generated loop nests: records every array
/// write as `(base variable, index vector)` in execution order.
fn run(mgr: &NodeManager, node: NodeId, env: &mut HashMap<NodeId, i64>, trace: &mut Vec<(u32, Vec<i64>)>) {
    match mgr.node(node).clone() {
        Node::Compound { stmts } => {
            for stmt in stmts {
                run(mgr, stmt, env, trace);
            }
        }
        Node::For {
            iter,
            start,
            end,
            step,
            body,
        } => {
            let start = eval(mgr, start, env);
            let end = eval(mgr, end, env);
            let step = eval(mgr, step, env);
            let mut value = start;
            while value < end {
                env.insert(iter, value);
                run(mgr, body, env, trace);
                value += step;
            }
            env.remove(&iter);
        }
        Node::Call { callee, args, .. } => {
            if let Node::Literal { value, .. } = mgr.node(callee) {
                if value == Op::RefAssign.name() {
                    let (base, indices) = resolve_target(mgr, args[0], env);
                    trace.push((base, indices));
                    return;
                }
            }
        }
        _ => {}
    }
}

fn resolve_target(mgr: &NodeManager, expr: NodeId, env: &HashMap<NodeId, i64>) -> (u32, Vec<i64>) {
    match mgr.node(expr).clone() {
        Node::Variable { id, .. } => (id, Vec::new()),
        Node::Call { callee, args, .. } => {
            let Node::Literal { value, .. } = mgr.node(callee) else {
                panic!("unexpected callee in a write target");
            };
            assert_eq!(value, Op::ArraySubscript.name());
            let (base, mut indices) = resolve_target(mgr, args[0], env);
            indices.push(eval(mgr, args[1], env));
            (base, indices)
        }
        other => panic!("unexpected write target {other:?}"),
    }
}

fn eval(mgr: &NodeManager, expr: NodeId, env: &HashMap<NodeId, i64>) -> i64 {
    match mgr.node(expr).clone() {
        Node::Literal { .. } => mgr.int_value(expr).expect("integer literal"),
        Node::Variable { .. } => *env.get(&expr).expect("bound variable"),
        Node::Call { callee, args, .. } => {
            let Node::Literal { value, .. } = mgr.node(callee) else {
                panic!("unexpected callee in an arithmetic expression");
            };
            let op = Op::from_name(value).expect("operator literal");
            let lhs = eval(mgr, args[0], env);
            let rhs = eval(mgr, args[1], env);
            match op {
                Op::IntAdd => lhs + rhs,
                Op::IntSub => lhs - rhs,
                Op::IntMul => lhs * rhs,
                Op::IntMin => lhs.min(rhs),
                Op::IntMax => lhs.max(rhs),
                other => panic!("unexpected operator {other:?}"),
            }
        }
        other => panic!("unexpected expression {other:?}"),
    }
}

#[test]
fn affine_domain_cardinality_is_exact() {
    // { i : 10 ≤ i ≤ 99 } has exactly 90 points
    let mut mgr = NodeManager::new();
    let mut b = Builder::new(&mut mgr);
    let int = b.basic().int;
    let i = b.variable(int, 1);

    let iv = vivace::affine::IterationVector::with(vec![i], vec![]);
    let domain = IterationDomain::from_coeffs(iv, &[vec![1, -10], vec![-1, 99]]);

    let ctx = Context::new();
    let set = Set::from_domain(&ctx, &domain, None);
    assert_eq!(set.card(), Pwqp::Constant(90));
}

#[test]
fn loop_interchange_preserves_semantics() {
    let mut mgr = NodeManager::new();
    let root = nested_loops(&mut mgr);
    let basic = Builder::new(&mut mgr).basic();

    let registry = extract(&mgr, &basic, root);
    assert_eq!(registry.scops().len(), 1);
    let scop = registry
        .scop_of(registry.scops()[0].resolve(&mgr))
        .expect("scop annotated")
        .clone();

    let ctx = Context::new();
    let deps_before = scop
        .compute_deps(&ctx, &mgr, DepKind::all())
        .expect("deps")
        .pairs()
        .expect("pairs");

    let swapped = transform::interchange(&scop, 0, 1);
    let generated = swapped.to_ir(&mut mgr).expect("codegen");

    // j is now the outer loop, i the inner one, bounds unchanged
    let Node::Compound { stmts } = mgr.node(generated).clone() else {
        panic!("expected a compound root");
    };
    let Node::For {
        start, end, body, ..
    } = mgr.node(stmts[0]).clone()
    else {
        panic!("expected the outer loop");
    };
    assert_eq!(mgr.int_value(start), Some(5));
    assert_eq!(mgr.int_value(end), Some(25));
    let Node::For { start, end, .. } = mgr.node(body).clone() else {
        panic!("expected the inner loop");
    };
    assert_eq!(mgr.int_value(start), Some(10));
    assert_eq!(mgr.int_value(end), Some(50));

    // the executed cell set is unchanged
    let mut trace_before = Vec::new();
    run(&mgr, root, &mut HashMap::new(), &mut trace_before);
    let mut trace_after = Vec::new();
    run(&mgr, generated, &mut HashMap::new(), &mut trace_after);
    let normalize = |mut t: Vec<(u32, Vec<i64>)>| {
        t.sort();
        t
    };
    assert_eq!(normalize(trace_before), normalize(trace_after));

    // the dependence relation is unchanged
    let deps_after = swapped
        .compute_deps(&ctx, &mgr, DepKind::all())
        .expect("deps")
        .pairs()
        .expect("pairs");
    assert_eq!(deps_before, deps_after);
}

#[test]
fn strip_mining_adds_a_bounded_outer_loop() {
    let mut mgr = NodeManager::new();
    let (root, _v) = single_loop(&mut mgr);
    let basic = Builder::new(&mut mgr).basic();

    let registry = extract(&mgr, &basic, root);
    let scop = registry
        .scop_of(registry.scops()[0].resolve(&mgr))
        .expect("scop annotated")
        .clone();

    let stripped = transform::strip_mine(&mut mgr, &scop, 0, 7).expect("strip-mine");
    let generated = stripped.to_ir(&mut mgr).expect("codegen");

    // for ii in [10,50) step 7 { for i in [ii, min(ii+6,49)] { ... } }
    let Node::Compound { stmts } = mgr.node(generated).clone() else {
        panic!("expected a compound root");
    };
    let Node::For {
        start, end, step, ..
    } = mgr.node(stmts[0]).clone()
    else {
        panic!("expected the tile loop");
    };
    assert_eq!(mgr.int_value(start), Some(10));
    assert_eq!(mgr.int_value(end), Some(50));
    assert_eq!(mgr.int_value(step), Some(7));

    // the executed iterations are exactly those of the original loop
    let mut trace = Vec::new();
    run(&mgr, generated, &mut HashMap::new(), &mut trace);
    let expected: Vec<(u32, Vec<i64>)> = (10..50).map(|i| (1, vec![i])).collect();
    let sorted = {
        let mut t = trace.clone();
        t.sort();
        t
    };
    assert_eq!(sorted, expected);

    // tiles partition the iterations: within one tile loop pass, indices
    // stay within a window of the tile size
    for window in trace.windows(2) {
        let delta = window[1].1[0] - window[0].1[0];
        assert!(delta == 1 || window[1].1[0] % 7 == 10 % 7);
    }
}

#[test]
fn tiling_partitions_a_loop_nest() {
    let mut mgr = NodeManager::new();
    let root = nested_loops(&mut mgr);
    let basic = Builder::new(&mut mgr).basic();

    let registry = extract(&mgr, &basic, root);
    let scop = registry
        .scop_of(registry.scops()[0].resolve(&mgr))
        .expect("scop annotated")
        .clone();

    let tiled = transform::tile(&mut mgr, &scop, &[4, 5]).expect("tiling");
    let generated = tiled.to_ir(&mut mgr).expect("codegen");

    // the tile loops form the outer band:
    // for ti in [10,50) step 4 { for tj in [5,25) step 5 { for i { for j } } }
    let Node::Compound { stmts } = mgr.node(generated).clone() else {
        panic!("expected a compound root");
    };
    let Node::For {
        start, end, step, body, ..
    } = mgr.node(stmts[0]).clone()
    else {
        panic!("expected the outer tile loop");
    };
    assert_eq!(mgr.int_value(start), Some(10));
    assert_eq!(mgr.int_value(end), Some(50));
    assert_eq!(mgr.int_value(step), Some(4));
    let Node::For {
        start, end, step, body, ..
    } = mgr.node(body).clone()
    else {
        panic!("expected the inner tile loop");
    };
    assert_eq!(mgr.int_value(start), Some(5));
    assert_eq!(mgr.int_value(end), Some(25));
    assert_eq!(mgr.int_value(step), Some(5));
    let Node::For { start, step, body, .. } = mgr.node(body).clone() else {
        panic!("expected the first point loop");
    };
    // point loops start at their tile iterator and advance by one
    assert!(matches!(mgr.node(start), Node::Variable { .. }));
    assert_eq!(mgr.int_value(step), Some(1));
    let Node::For { start, step, .. } = mgr.node(body).clone() else {
        panic!("expected the second point loop");
    };
    assert!(matches!(mgr.node(start), Node::Variable { .. }));
    assert_eq!(mgr.int_value(step), Some(1));

    // the executed cell set is exactly that of the untiled nest
    let mut original = Vec::new();
    run(&mgr, root, &mut HashMap::new(), &mut original);
    let mut trace = Vec::new();
    run(&mgr, generated, &mut HashMap::new(), &mut trace);
    assert_eq!(trace.len(), original.len());
    let normalize = |mut t: Vec<(u32, Vec<i64>)>| {
        t.sort();
        t
    };
    assert_eq!(normalize(original), normalize(trace.clone()));

    // the first tile is visited completely before any other: 4 × 5 cells
    // of [10,14) × [5,10) in row-major order
    let first_tile: Vec<(u32, Vec<i64>)> = (10..14)
        .flat_map(|i| (5..10).map(move |j| (1, vec![i, j])))
        .collect();
    assert_eq!(&trace[..first_tile.len()], &first_tile[..]);
}

#[test]
fn loop_fusion_merges_compatible_loops() {
    let mut mgr = NodeManager::new();
    let mut b = Builder::new(&mut mgr);
    let int = b.basic().int;
    let array = b.array_ty(int);
    let ref_array = b.ref_ty(array);
    let v = b.variable(ref_array, 1);
    let w = b.variable(ref_array, 2);
    let i1 = b.variable(int, 3);
    let i2 = b.variable(int, 4);
    let one = b.int_lit(1);

    // for i1 in [1,11) { v[i1] := 1 }
    let cell1 = b.subscript(v, i1);
    let lit1 = b.int_lit(1);
    let store1 = b.assign(cell1, lit1);
    let body1 = b.compound(vec![store1]);
    let lo1 = b.int_lit(1);
    let hi1 = b.int_lit(11);
    let loop1 = b.for_stmt(i1, lo1, hi1, one, body1);

    // for i2 in [0,10) { w[i2 + 1] := 2 }
    let shifted = b.add(i2, one);
    let cell2 = b.subscript(w, shifted);
    let lit2 = b.int_lit(2);
    let store2 = b.assign(cell2, lit2);
    let body2 = b.compound(vec![store2]);
    let lo2 = b.int_lit(0);
    let hi2 = b.int_lit(10);
    let loop2 = b.for_stmt(i2, lo2, hi2, one, body2);

    let root = b.compound(vec![loop1, loop2]);
    let basic = b.basic();

    let registry = extract(&mgr, &basic, root);
    assert_eq!(registry.scops().len(), 1);
    let scop = registry
        .scop_of(registry.scops()[0].resolve(&mgr))
        .expect("scop annotated")
        .clone();

    let fused = transform::fuse(&scop, 0, 1).expect("fusion");
    let generated = fused.to_ir(&mut mgr).expect("codegen");

    let mut trace = Vec::new();
    run(&mgr, generated, &mut HashMap::new(), &mut trace);

    // residual [0,1): S2 alone; band [1,10): S1 then S2; residual [10,11): S1
    let mut expected = vec![(2, vec![1])];
    for t in 1..10 {
        expected.push((1, vec![t]));
        expected.push((2, vec![t + 1]));
    }
    expected.push((1, vec![10]));
    assert_eq!(trace, expected);
}

#[test]
fn round_trip_reextracts_the_same_model() {
    let mut mgr = NodeManager::new();
    let root = nested_loops(&mut mgr);
    let basic = Builder::new(&mut mgr).basic();

    let registry = extract(&mgr, &basic, root);
    let scop = registry
        .scop_of(registry.scops()[0].resolve(&mgr))
        .expect("scop annotated")
        .clone();

    // the semantic checker accepts inside to_ir; re-extract the result
    let generated = scop.to_ir(&mut mgr).expect("codegen");
    let second = extract(&mgr, &basic, generated);
    assert_eq!(second.scops().len(), 1);
    let reextracted = second
        .scop_of(second.scops()[0].resolve(&mgr))
        .expect("scop annotated");

    assert_eq!(
        reextracted.iteration_vector().iter_count(),
        scop.iteration_vector().iter_count()
    );
    assert_eq!(reextracted.len(), scop.len());
    for (a, b) in scop.stmts().iter().zip(reextracted.stmts()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.accesses.len(), b.accesses.len());
    }
}
