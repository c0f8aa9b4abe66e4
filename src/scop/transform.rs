//! Schedule-level loop transformations.
//!
//! Transformations operate on copies of the SCoP's schedules and domains;
//! the program itself is only touched when the transformed model is lowered
//! through [`Scop::to_ir`](super::Scop::to_ir).

use crate::affine::{
    AffineConstraint, AffineFunction, Combiner, Element, IterationDomain, Relation,
};
use crate::ir::{Builder, Node, NodeManager};
use crate::pres::ModelingError;

use super::Scop;

/// The identity matrix with rows `src` and `dst` exchanged, the unimodular
/// form of a loop interchange.
#[must_use]
pub fn interchange_matrix(size: usize, src: usize, dst: usize) -> Vec<Vec<i64>> {
    let mut matrix = vec![vec![0; size]; size];
    for (row, cells) in matrix.iter_mut().enumerate() {
        let col = if row == src {
            dst
        } else if row == dst {
            src
        } else {
            row
        };
        cells[col] = 1;
    }
    matrix
}

/// Applies a unimodular row transformation to a statement's schedule.
fn apply_unimodular(scop: &mut Scop, matrix: &[Vec<i64>]) {
    for stmt in scop.stmts_mut() {
        let schedule = stmt.schedule_mut();
        let iv = schedule.iteration_vector().clone();
        let old: Vec<AffineFunction> = schedule.iter().cloned().collect();
        for (row, combination) in matrix.iter().enumerate() {
            let mut combined = vec![0i64; iv.size()];
            for (factor, source) in combination.iter().zip(&old) {
                for (pos, cell) in combined.iter_mut().enumerate() {
                    *cell += factor * source.coeff(pos);
                }
            }
            *schedule.row_mut(row) = AffineFunction::new(&iv, combined);
        }
    }
}

/// Swaps schedule dimensions `i` and `j` of every statement.
///
/// # Panics
/// Panics if a dimension exceeds a statement's schedule.
#[must_use]
pub fn interchange(scop: &Scop, i: usize, j: usize) -> Scop {
    let mut result = scop.clone();
    if i == j {
        return result;
    }
    let rows = result
        .stmts()
        .iter()
        .map(|s| s.sched_dim())
        .max()
        .unwrap_or(0);
    let matrix = interchange_matrix(rows, i, j);
    apply_unimodular(&mut result, &matrix);
    result
}

/// Strip-mines schedule dimension `dim` with the given tile size.
///
/// A fresh iterator `ι` is appended to the iteration vector; the schedule
/// row is duplicated with the outer copy selecting `ι`, and the domain
/// gains `ι ≤ i ≤ ι + tile − 1` together with the stride anchoring `ι` at
/// the loop's lower bound.
///
/// # Errors
/// Returns [`ModelingError`] for tiles smaller than two or schedule rows
/// that do not select a single iterator.
pub fn strip_mine(
    mgr: &mut NodeManager,
    scop: &Scop,
    dim: usize,
    tile: i64,
) -> Result<Scop, ModelingError> {
    if tile < 2 {
        return Err(ModelingError::new("strip-mining requires a tile of at least two"));
    }

    // a fresh iterator variable for the tile loop
    let mut builder = Builder::new(mgr);
    let int = builder.basic().int;
    let fresh_id = next_var_id(builder.manager());
    let tile_iter = builder.variable(int, fresh_id);

    let mut iv = scop.iteration_vector().clone();
    iv.add_iterator(tile_iter);

    let mut result = Scop::new(iv.clone());
    for stmt in scop.stmts() {
        let mut stmt = super::Stmt::rebased(&iv, stmt.id, stmt);

        // the stripped dimension must select a single iterator
        let row = stmt.schedule().row(dim).clone();
        let hot: Vec<usize> = (0..iv.iter_count())
            .filter(|&pos| row.coeff(pos) != 0)
            .collect();
        let [orig_pos] = hot[..] else {
            return Err(ModelingError::new(
                "strip-mined dimension does not select a single iterator",
            ));
        };
        if row.coeff(orig_pos) != 1 {
            return Err(ModelingError::new(
                "strip-mined dimension has a non-unit coefficient",
            ));
        }
        let orig_iter = iv.iterators()[orig_pos];

        // outer copy of the row selects the tile iterator
        let outer = AffineFunction::selecting(&iv, &Element::Iterator(tile_iter));
        stmt.schedule_mut().insert(dim, outer);

        // ι ≤ i  and  i ≤ ι + tile − 1
        let selector = AffineFunction::selecting(&iv, &Element::Iterator(orig_iter));
        let tile_selector = AffineFunction::selecting(&iv, &Element::Iterator(tile_iter));
        let mut below = AffineFunction::constant(&iv, 0);
        let mut above = AffineFunction::constant(&iv, tile - 1);
        for pos in 0..iv.size() - 1 {
            below.set_coeff(pos, selector.coeff(pos) - tile_selector.coeff(pos));
            above.set_coeff(pos, tile_selector.coeff(pos) - selector.coeff(pos));
        }
        let mut constraint = Combiner::atom(AffineConstraint::new(below, Relation::Ge))
            .and(Combiner::atom(AffineConstraint::new(above, Relation::Ge)));

        // anchor the stride at the loop's constant lower bound
        let anchor = constant_lower_bound(&stmt.domain, orig_pos).unwrap_or(0);
        let mut stride = AffineFunction::constant(&iv, -anchor);
        for pos in 0..iv.size() - 1 {
            stride.set_coeff(pos, tile_selector.coeff(pos));
        }
        constraint = constraint.and(Combiner::atom(AffineConstraint::new(
            stride,
            Relation::ModEq(tile),
        )));

        stmt.domain = stmt
            .domain
            .intersect(&IterationDomain::new(iv.clone(), constraint));
        result.push_back(&stmt);
    }
    Ok(result)
}

/// Tiles the innermost `sizes.len()` loops: successive strip-mining
/// followed by interchanges moving the tile iterators into an outer band.
///
/// # Errors
/// Returns [`ModelingError`] when a strip-mining step fails.
pub fn tile(mgr: &mut NodeManager, scop: &Scop, sizes: &[i64]) -> Result<Scop, ModelingError> {
    // the iterator rows, outermost first
    let loop_dims = iterator_dims(scop);
    if sizes.len() > loop_dims.len() {
        return Err(ModelingError::new("more tile sizes than loops"));
    }
    let band_start = loop_dims.len() - sizes.len();

    let mut result = scop.clone();
    // strip outermost-of-the-band first: each step inserts a row in front
    // of the stripped one, shifting everything behind it by one
    for (offset, &size) in sizes.iter().enumerate() {
        let dims = iterator_dims(&result);
        let target = dims[band_start + 2 * offset];
        result = strip_mine(mgr, &result, target, size)?;
    }

    // bubble each tile row into the outer band, preserving their order
    for (ordinal, _) in sizes.iter().enumerate() {
        let dims = iterator_dims(&result);
        let mut current = dims[band_start + 2 * ordinal];
        let target = dims[band_start + ordinal];
        while current > target {
            let dims = iterator_dims(&result);
            let prev = dims[dims.iter().position(|&d| d == current).expect("present") - 1];
            result = interchange(&result, prev, current);
            current = prev;
        }
    }
    Ok(result)
}

/// The schedule dimensions that select iterators, outermost first.
fn iterator_dims(scop: &Scop) -> Vec<usize> {
    let iv = scop.iteration_vector();
    let Some(stmt) = scop.stmts().first() else {
        return Vec::new();
    };
    (0..stmt.sched_dim())
        .filter(|&dim| {
            let row = stmt.schedule().row(dim);
            (0..iv.iter_count()).any(|pos| row.coeff(pos) != 0)
        })
        .collect()
}

/// Fuses the statement groups scheduled at the ordinals `l1` and `l2` of
/// the outermost (constant) schedule dimension.
///
/// The groups' loops are aligned on a common band: the iterator dimension
/// moves outermost, the former ordinal becomes the intra-iteration order.
/// Each statement keeps its own iteration domain, so non-overlapping parts
/// of the bounds re-emerge as residual loops during code generation.
///
/// # Errors
/// Returns [`ModelingError`] when a group's schedule does not start with a
/// constant dimension followed by an iterator dimension.
pub fn fuse(scop: &Scop, l1: i64, l2: i64) -> Result<Scop, ModelingError> {
    let mut result = scop.clone();
    let iv = result.iteration_vector().clone();
    for stmt in result.stmts_mut() {
        if stmt.sched_dim() < 2 {
            return Err(ModelingError::new("fused statement has no loop dimension"));
        }
        let ordinal = stmt.schedule().row(0).clone();
        if !ordinal.is_constant() {
            return Err(ModelingError::new(
                "fusion requires an outermost ordering dimension",
            ));
        }
        let position = ordinal.constant_term();
        if position != l1 && position != l2 {
            continue;
        }
        // move the iterator dimension outermost, order the bodies by their
        // previous ordinal within the common band
        let order = i64::from(position == l2);
        let schedule = stmt.schedule_mut();
        schedule.swap(0, 1);
        *schedule.row_mut(1) = AffineFunction::constant(&iv, order);
    }
    Ok(result)
}

fn constant_lower_bound(domain: &IterationDomain, pos: usize) -> Option<i64> {
    let combiner = domain.constraint()?;
    let dnf = combiner.to_dnf();
    let clause = dnf.clauses.first()?;
    clause
        .iter()
        .filter_map(|c| {
            let f = &c.function;
            let width = f.size();
            let only_this = (0..width - 1).all(|p| p == pos || f.coeff(p) == 0);
            match c.relation {
                // i + c ≥ 0  ⇒  i ≥ −c
                Relation::Ge if only_this && f.coeff(pos) == 1 => Some(-f.constant_term()),
                _ => None,
            }
        })
        .max()
}

fn next_var_id(mgr: &NodeManager) -> u32 {
    let mut max = 0;
    for (_, node) in mgr.nodes() {
        if let Node::Variable { id: var_id, .. } = node {
            max = max.max(*var_id);
        }
    }
    max + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interchange_matrix_is_a_permutation() {
        let matrix = interchange_matrix(3, 0, 2);
        assert_eq!(matrix[0], vec![0, 0, 1]);
        assert_eq!(matrix[1], vec![0, 1, 0]);
        assert_eq!(matrix[2], vec![1, 0, 0]);
        // every row and every column holds exactly one unit entry
        for row in &matrix {
            assert_eq!(row.iter().sum::<i64>(), 1);
        }
        for col in 0..3 {
            assert_eq!(matrix.iter().map(|row| row[col]).sum::<i64>(), 1);
        }
    }

    #[test]
    fn interchanging_the_same_dimension_is_the_identity() {
        let matrix = interchange_matrix(4, 2, 2);
        for (pos, row) in matrix.iter().enumerate() {
            let mut expected = vec![0; 4];
            expected[pos] = 1;
            assert_eq!(row, &expected);
        }
    }
}
