//! Code generation: lowering domains and schedules back to IR loop nests.
//!
//! The generator walks the schedule dimensions outermost first. Constant
//! rows order statements textually; iterator rows become loops whose bounds
//! are derived from the statements' domains by eliminating the not yet
//! generated iterators. Bounds that cannot be proven redundant are emitted
//! through `int.min`/`int.max`; stride constraints become loop steps.

use std::collections::HashMap;

use itertools::Itertools;

use crate::affine::{AffineSystem, IterationDomain};
use crate::ir::{Builder, Node, NodeId, NodeManager};

use super::set::{Conjunct, Kind, Set};
use super::{Context, ModelingError};

/// One statement instance to generate code for.
#[derive(Debug, Clone)]
pub struct CodegenStmt {
    /// The statement's position in program order, used as tie-breaker.
    pub id: usize,
    /// The iteration domain over the shared iteration vector.
    pub domain: IterationDomain,
    /// The schedule over the shared iteration vector; missing rows are
    /// treated as zeros.
    pub schedule: AffineSystem,
    /// The statement body, referencing the vector's iterator variables.
    pub body: NodeId,
}

/// Emits the loop nest realizing the given statements' schedules.
///
/// # Errors
/// Returns [`ModelingError`] when a schedule row or domain falls outside
/// the generatable fragment (non-unit rows, parametric bounds, disjunctive
/// domains, or strides combined with statement splitting).
pub fn to_ir(mgr: &mut NodeManager, stmts: &[CodegenStmt]) -> Result<NodeId, ModelingError> {
    let ctx = Context::new();
    let sched_dim = stmts.iter().map(|s| s.schedule.size()).max().unwrap_or(0);

    let mut states = Vec::new();
    for stmt in stmts {
        if stmt.domain.is_empty() {
            continue;
        }
        let set = Set::from_domain(&ctx, &stmt.domain, None);
        let conjuncts = set.parts[0].conjuncts.clone();
        let conjunct = match conjuncts.len() {
            1 => conjuncts.into_iter().next().expect("one conjunct"),
            0 => continue,
            _ => return Err(ModelingError::new("disjunctive statement domain")),
        };
        states.push(StmtState {
            stmt,
            conjunct,
            resolved: HashMap::new(),
            subst: HashMap::new(),
        });
    }

    let mut fresh = max_var_id(mgr, stmts) + 1;
    let mut loops = Vec::new();
    let mut builder = Builder::new(mgr);
    let generated = gen_stmts(
        &mut builder,
        states,
        0,
        sched_dim,
        &mut loops,
        &mut fresh,
    )?;
    Ok(if generated.len() == 1 {
        generated[0]
    } else {
        builder.compound(generated)
    })
}

/// An affine expression over the already generated loop variables.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SymExpr {
    /// `(coefficient, loop level)` pairs.
    terms: Vec<(i64, usize)>,
    constant: i64,
}

impl SymExpr {
    fn constant(value: i64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    fn add_scaled(&mut self, other: &Self, factor: i64) {
        for &(coeff, level) in &other.terms {
            match self.terms.iter_mut().find(|(_, l)| *l == level) {
                Some((c, _)) => *c += factor * coeff,
                None => self.terms.push((factor * coeff, level)),
            }
        }
        self.terms.retain(|(c, _)| *c != 0);
        self.constant += factor * other.constant;
    }

    fn plus(&self, value: i64) -> Self {
        let mut result = self.clone();
        result.constant += value;
        result
    }

    /// The least value over the given loop ranges, if derivable.
    fn min_value(&self, loops: &[LoopInfo]) -> Option<i64> {
        let mut result = self.constant;
        for &(coeff, level) in &self.terms {
            let info = &loops[level];
            let extreme = if coeff > 0 { info.min? } else { info.max? };
            result += coeff * extreme;
        }
        Some(result)
    }

    /// The greatest value over the given loop ranges, if derivable.
    fn max_value(&self, loops: &[LoopInfo]) -> Option<i64> {
        let mut result = self.constant;
        for &(coeff, level) in &self.terms {
            let info = &loops[level];
            let extreme = if coeff > 0 { info.max? } else { info.min? };
            result += coeff * extreme;
        }
        Some(result)
    }

    fn emit(&self, b: &mut Builder<'_>, loops: &[LoopInfo]) -> NodeId {
        let mut acc: Option<NodeId> = None;
        for &(coeff, level) in &self.terms {
            let var = loops[level].var;
            let term = match coeff {
                1 => var,
                -1 => {
                    let zero = b.int_lit(0);
                    b.sub(zero, var)
                }
                c => {
                    let lit = b.int_lit(c);
                    b.mul(lit, var)
                }
            };
            acc = Some(match acc {
                Some(prev) => b.add(prev, term),
                None => term,
            });
        }
        match acc {
            None => b.int_lit(self.constant),
            Some(expr) if self.constant == 0 => expr,
            Some(expr) if self.constant > 0 => {
                let lit = b.int_lit(self.constant);
                b.add(expr, lit)
            }
            Some(expr) => {
                let lit = b.int_lit(-self.constant);
                b.sub(expr, lit)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct LoopInfo {
    var: NodeId,
    min: Option<i64>,
    max: Option<i64>,
}

#[derive(Debug, Clone)]
struct StmtState<'a> {
    stmt: &'a CodegenStmt,
    /// Domain constraints laid out over the shared iteration vector.
    conjunct: Conjunct,
    /// Iterator position → its value in terms of loop variables.
    resolved: HashMap<usize, SymExpr>,
    /// Iterator variable → replacement IR expression.
    subst: HashMap<NodeId, NodeId>,
}

/// A schedule row, classified.
enum Row {
    Constant(i64),
    /// Unit access to the iterator at the given vector position, plus an
    /// offset: `t = x + offset`.
    Iterator { pos: usize, offset: i64 },
}

fn classify_row(state: &StmtState<'_>, dim: usize) -> Result<Row, ModelingError> {
    let iv = state.stmt.domain.iteration_vector();
    if dim >= state.stmt.schedule.size() {
        return Ok(Row::Constant(0));
    }
    let row = state.stmt.schedule.row(dim);
    if (iv.iter_count()..iv.size() - 1).any(|pos| row.coeff(pos) != 0) {
        return Err(ModelingError::new("parametric schedule row"));
    }
    let hot: Vec<usize> = (0..iv.iter_count())
        .filter(|&pos| row.coeff(pos) != 0)
        .collect();
    match hot[..] {
        [] => Ok(Row::Constant(row.constant_term())),
        [pos] if row.coeff(pos) == 1 => Ok(Row::Iterator {
            pos,
            offset: row.constant_term(),
        }),
        _ => Err(ModelingError::new("schedule row is not a unit access")),
    }
}

fn gen_stmts<'a>(
    b: &mut Builder<'_>,
    states: Vec<StmtState<'a>>,
    dim: usize,
    sched_dim: usize,
    loops: &mut Vec<LoopInfo>,
    fresh: &mut u32,
) -> Result<Vec<NodeId>, ModelingError> {
    if states.is_empty() {
        return Ok(Vec::new());
    }
    if dim == sched_dim {
        let mut ordered = states;
        ordered.sort_by_key(|s| s.stmt.id);
        return Ok(ordered
            .into_iter()
            .map(|s| b.manager().substitute(s.stmt.body, &s.subst))
            .collect());
    }

    let rows = states
        .iter()
        .map(|s| classify_row(s, dim))
        .collect::<Result<Vec<_>, _>>()?;

    if rows.iter().all(|r| matches!(r, Row::Constant(_))) {
        // ordering dimension: emit the groups in ascending order
        let mut groups: Vec<(i64, Vec<StmtState<'a>>)> = Vec::new();
        for (state, row) in states.into_iter().zip(rows) {
            let Row::Constant(value) = row else {
                unreachable!()
            };
            match groups.iter_mut().find(|(v, _)| *v == value) {
                Some((_, group)) => group.push(state),
                None => groups.push((value, vec![state])),
            }
        }
        groups.sort_by_key(|(v, _)| *v);
        let mut result = Vec::new();
        for (_, group) in groups {
            result.extend(gen_stmts(b, group, dim + 1, sched_dim, loops, fresh)?);
        }
        return Ok(result);
    }

    if rows.iter().any(|r| matches!(r, Row::Constant(_))) {
        return Err(ModelingError::new(
            "mixed constant and iterator schedule rows in one dimension",
        ));
    }

    // loop dimension: derive per-statement time bounds
    let mut bounded = Vec::new();
    for (state, row) in states.into_iter().zip(rows) {
        let Row::Iterator { pos, offset } = row else {
            unreachable!()
        };
        let bounds = time_bounds(&state, pos, offset, loops)?;
        bounded.push((state, pos, offset, bounds));
    }

    if bounded.len() == 1 {
        let (state, pos, offset, bounds) = bounded.into_iter().next().expect("one statement");
        let generated = emit_loop(
            b,
            vec![(state, pos, offset)],
            &bounds,
            dim,
            sched_dim,
            loops,
            fresh,
        )?;
        return Ok(generated.into_iter().collect());
    }

    // several statements share the dimension: split into constant segments
    let mut ranges = Vec::new();
    for (_, _, _, bounds) in &bounded {
        if bounds.stride.is_some() {
            return Err(ModelingError::new(
                "stride constraints across fused statements",
            ));
        }
        let lo = bounds
            .lowers
            .iter()
            .map(|e| e.as_constant())
            .collect::<Option<Vec<_>>>()
            .and_then(|v| v.into_iter().max())
            .ok_or_else(|| ModelingError::new("symbolic bound across fused statements"))?;
        let hi = bounds
            .uppers
            .iter()
            .map(|e| e.as_constant())
            .collect::<Option<Vec<_>>>()
            .and_then(|v| v.into_iter().min())
            .ok_or_else(|| ModelingError::new("symbolic bound across fused statements"))?;
        ranges.push((lo, hi));
    }

    let breakpoints: Vec<i64> = ranges
        .iter()
        .flat_map(|&(lo, hi)| [lo, hi + 1])
        .sorted()
        .dedup()
        .collect();

    let mut result = Vec::new();
    for (&seg_lo, &seg_end) in breakpoints.iter().tuple_windows() {
        let active: Vec<(StmtState<'a>, usize, i64)> = bounded
            .iter()
            .zip(&ranges)
            .filter(|(_, range)| {
                let (lo, hi) = **range;
                lo <= seg_lo && seg_end - 1 <= hi
            })
            .map(|((state, pos, offset, _), _)| (state.clone(), *pos, *offset))
            .collect();
        if active.is_empty() {
            continue;
        }
        let bounds = Bounds {
            lowers: vec![SymExpr::constant(seg_lo)],
            uppers: vec![SymExpr::constant(seg_end - 1)],
            stride: None,
        };
        result.extend(emit_loop(
            b, active, &bounds, dim, sched_dim, loops, fresh,
        )?);
    }
    Ok(result)
}

#[derive(Debug)]
struct Bounds {
    lowers: Vec<SymExpr>,
    uppers: Vec<SymExpr>,
    /// `(modulus, residue)` of the time value, if strided.
    stride: Option<(i64, i64)>,
}

/// Derives the bounds of the time value `t = x_pos + offset` from the
/// statement's domain, eliminating all not yet generated iterators.
fn time_bounds(
    state: &StmtState<'_>,
    pos: usize,
    offset: i64,
    loops: &[LoopInfo],
) -> Result<Bounds, ModelingError> {
    let iv = state.stmt.domain.iteration_vector();
    let width = iv.size();
    let iter_count = iv.iter_count();

    // eliminate every unresolved iterator other than x_pos
    let mut conjunct = state.conjunct.clone();
    for other in 0..iter_count {
        if other != pos && !state.resolved.contains_key(&other) {
            conjunct = eliminate_keep(&conjunct, other);
        }
    }

    let mut lowers = Vec::new();
    let mut uppers = Vec::new();
    let mut stride = None;

    for constraint in &conjunct.constraints {
        let coeffs = &constraint.linear.coeffs;
        if coeffs[iter_count..width - 1].iter().any(|&c| c != 0) {
            return Err(ModelingError::new("parametric loop bound"));
        }
        let a = coeffs[pos];
        if a == 0 {
            continue;
        }
        // the resolved part of the constraint
        let mut rest = SymExpr::constant(coeffs[width - 1]);
        let mut ok = true;
        for q in 0..iter_count {
            if q == pos || coeffs[q] == 0 {
                continue;
            }
            match state.resolved.get(&q) {
                Some(value) => rest.add_scaled(value, coeffs[q]),
                None => {
                    // still unresolved after elimination: not usable here
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            continue;
        }
        match constraint.kind {
            Kind::Ge if a == 1 => {
                // x + rest ≥ 0  ⇒  x ≥ −rest  ⇒  t ≥ −rest + offset
                let mut bound = SymExpr::constant(0);
                bound.add_scaled(&rest, -1);
                lowers.push(bound.plus(offset));
            }
            Kind::Ge if a == -1 => {
                // −x + rest ≥ 0  ⇒  t ≤ rest + offset
                uppers.push(rest.plus(offset));
            }
            Kind::Eq if a.abs() == 1 => {
                let mut value = SymExpr::constant(0);
                value.add_scaled(&rest, -a);
                lowers.push(value.plus(offset));
                uppers.push(value.plus(offset));
            }
            Kind::Stride(m) if a.abs() == 1 => {
                let anchor = rest
                    .as_constant()
                    .ok_or_else(|| ModelingError::new("symbolic stride anchor"))?;
                // x + anchor ≡ 0 (mod m)  ⇒  t ≡ offset − anchor (mod m)
                let residue = (offset - anchor).rem_euclid(m);
                if stride.is_some() {
                    return Err(ModelingError::new("multiple strides on one loop"));
                }
                stride = Some((m, residue));
            }
            _ => {
                return Err(ModelingError::new(
                    "non-unit coefficient in a loop bound",
                ));
            }
        }
    }

    // prune bounds provably dominated over the outer loops' ranges
    let lowers = prune(lowers, loops, true);
    let uppers = prune(uppers, loops, false);

    if lowers.is_empty() || uppers.is_empty() {
        return Err(ModelingError::new("unbounded loop dimension"));
    }
    Ok(Bounds {
        lowers,
        uppers,
        stride,
    })
}

fn prune(bounds: Vec<SymExpr>, loops: &[LoopInfo], lower: bool) -> Vec<SymExpr> {
    let mut kept: Vec<SymExpr> = Vec::new();
    for bound in bounds {
        if kept.contains(&bound) {
            continue;
        }
        let dominated = kept.iter().any(|other| {
            if lower {
                // `bound` is redundant if some kept bound is always ≥ it
                matches!(
                    (other.min_value(loops), bound.max_value(loops)),
                    (Some(o), Some(b)) if o >= b
                )
            } else {
                matches!(
                    (other.max_value(loops), bound.min_value(loops)),
                    (Some(o), Some(b)) if o <= b
                )
            }
        });
        if dominated {
            continue;
        }
        // drop previously kept bounds dominated by the new one
        kept.retain(|other| {
            if lower {
                !matches!(
                    (bound.min_value(loops), other.max_value(loops)),
                    (Some(b), Some(o)) if b >= o
                )
            } else {
                !matches!(
                    (bound.max_value(loops), other.min_value(loops)),
                    (Some(b), Some(o)) if b <= o
                )
            }
        });
        kept.push(bound);
    }
    kept
}

/// Emits one loop over the given time bounds and recurses into its body.
fn emit_loop<'a>(
    b: &mut Builder<'_>,
    active: Vec<(StmtState<'a>, usize, i64)>,
    bounds: &Bounds,
    dim: usize,
    sched_dim: usize,
    loops: &mut Vec<LoopInfo>,
    fresh: &mut u32,
) -> Result<Vec<NodeId>, ModelingError> {
    let int = b.basic().int;
    let var = b.variable(int, *fresh);
    *fresh += 1;

    // start: the maximum of the lower bounds, aligned to the stride
    let (start, step, start_min) = match bounds.stride {
        Some((m, residue)) => {
            let base = bounds
                .lowers
                .iter()
                .map(|e| e.as_constant())
                .collect::<Option<Vec<_>>>()
                .and_then(|v| v.into_iter().max())
                .ok_or_else(|| ModelingError::new("symbolic bound on a strided loop"))?;
            let mut aligned = base;
            while aligned.rem_euclid(m) != residue {
                aligned += 1;
            }
            (b.int_lit(aligned), m, Some(aligned))
        }
        None => {
            let mut exprs = bounds.lowers.iter();
            let first = exprs.next().expect("at least one lower bound");
            let mut start = first.emit(b, loops);
            for expr in exprs {
                let rhs = expr.emit(b, loops);
                start = b.max(start, rhs);
            }
            let start_min = bounds
                .lowers
                .iter()
                .map(|e| e.min_value(loops))
                .collect::<Option<Vec<_>>>()
                .map(|v| v.into_iter().max().expect("non-empty"));
            (start, 1, start_min)
        }
    };

    // end: one past the minimum of the upper bounds
    let mut uppers = bounds.uppers.iter();
    let first = uppers.next().expect("at least one upper bound");
    let mut upper = first.emit(b, loops);
    for expr in uppers {
        let rhs = expr.emit(b, loops);
        upper = b.min(upper, rhs);
    }
    let end = match b.manager().int_value(upper) {
        Some(value) => b.int_lit(value + 1),
        None => {
            let one = b.int_lit(1);
            b.add(upper, one)
        }
    };
    let upper_max = bounds
        .uppers
        .iter()
        .map(|e| e.max_value(loops))
        .collect::<Option<Vec<_>>>()
        .map(|v| v.into_iter().min().expect("non-empty"));

    loops.push(LoopInfo {
        var,
        min: start_min,
        max: upper_max,
    });
    let level = loops.len() - 1;

    // resolve the statements' iterators against the fresh loop variable
    let mut inner = Vec::new();
    for (mut state, pos, time_offset) in active {
        let mut value = SymExpr::constant(-time_offset);
        value.terms.push((1, level));
        state.resolved.insert(pos, value);

        let iter_var = state.stmt.domain.iteration_vector().iterators()[pos];
        let replacement = if time_offset == 0 {
            var
        } else {
            let lit = b.int_lit(time_offset);
            b.sub(var, lit)
        };
        state.subst.insert(iter_var, replacement);
        inner.push(state);
    }

    let body_stmts = gen_stmts(b, inner, dim + 1, sched_dim, loops, fresh)?;
    loops.pop();

    let body = if body_stmts.len() == 1 {
        body_stmts[0]
    } else {
        b.compound(body_stmts)
    };
    let step = b.int_lit(step);
    Ok(vec![b.for_stmt(var, start, end, step, body)])
}

/// Fourier–Motzkin elimination that keeps the coefficient layout, zeroing
/// the eliminated dimension.
fn eliminate_keep(conjunct: &Conjunct, dim: usize) -> Conjunct {
    use super::set::{EngineConstraint, Linear};

    let mut kept = Vec::new();
    let mut lowers: Vec<Vec<i64>> = Vec::new();
    let mut uppers: Vec<Vec<i64>> = Vec::new();
    for constraint in &conjunct.constraints {
        let coeff = constraint.linear.coeffs[dim];
        if coeff == 0 {
            kept.push(constraint.clone());
            continue;
        }
        match constraint.kind {
            Kind::Ge if coeff > 0 => lowers.push(constraint.linear.coeffs.clone()),
            Kind::Ge => uppers.push(constraint.linear.coeffs.clone()),
            Kind::Eq => {
                let positive = constraint.linear.coeffs.clone();
                let negative: Vec<i64> = positive.iter().map(|&c| -c).collect();
                if coeff > 0 {
                    lowers.push(positive);
                    uppers.push(negative);
                } else {
                    lowers.push(negative);
                    uppers.push(positive);
                }
            }
            // strides on an eliminated dimension are dropped
            Kind::Stride(_) => {}
        }
    }
    for lower in &lowers {
        for upper in &uppers {
            let a = lower[dim];
            let b = -upper[dim];
            debug_assert!(a > 0 && b > 0);
            let coeffs: Vec<i64> = lower
                .iter()
                .zip(upper)
                .map(|(&l, &u)| b * l + a * u)
                .collect();
            debug_assert_eq!(coeffs[dim], 0);
            kept.push(EngineConstraint {
                linear: Linear { coeffs },
                kind: Kind::Ge,
            });
        }
    }
    Conjunct { constraints: kept }
}

fn max_var_id(mgr: &NodeManager, stmts: &[CodegenStmt]) -> u32 {
    fn walk(mgr: &NodeManager, node: NodeId, max: &mut u32) {
        if let Node::Variable { id, .. } = mgr.node(node) {
            *max = (*max).max(*id);
        }
        for child in mgr.node(node).children() {
            walk(mgr, child, max);
        }
    }
    let mut max = 0;
    for stmt in stmts {
        walk(mgr, stmt.body, &mut max);
        for &var in stmt
            .domain
            .iteration_vector()
            .iterators()
            .iter()
            .chain(stmt.domain.iteration_vector().parameters())
        {
            walk(mgr, var, &mut max);
        }
    }
    max
}
