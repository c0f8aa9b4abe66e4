//! Presburger sets and symbolic cardinalities.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::affine::{IterationDomain, IterationVector, Relation};

use super::{Context, ModelingError};

/// The space a set or one side of a map lives in: an optional tuple name,
/// the named dimensions and the named parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    /// The tuple name, associating points with an IR statement.
    pub tuple: Option<String>,
    /// The dimension names, unique within the owning context.
    pub dims: Vec<String>,
    /// The parameter names.
    pub params: Vec<String>,
}

impl Space {
    /// Creates a space without a tuple name.
    #[must_use]
    pub fn new(dims: Vec<String>, params: Vec<String>) -> Self {
        Self {
            tuple: None,
            dims,
            params,
        }
    }

    /// Names this space's tuple.
    #[must_use]
    pub fn named(mut self, tuple: impl Into<String>) -> Self {
        self.tuple = Some(tuple.into());
        self
    }

    /// The number of linear positions: dimensions, parameters and constant.
    #[must_use]
    pub fn width(&self) -> usize {
        self.dims.len() + self.params.len() + 1
    }

    /// Derives the dimension and parameter names of an iteration vector.
    ///
    /// Names are installed per dimension and unique within the context.
    #[must_use]
    pub fn of_iteration_vector(ctx: &Context, iv: &IterationVector) -> Self {
        let dims = iv
            .iterators()
            .iter()
            .map(|v| ctx.fresh_name(&format!("i{}_", v.index())))
            .collect();
        let params = iv
            .parameters()
            .iter()
            .map(|v| ctx.fresh_name(&format!("p{}_", v.index())))
            .collect();
        Self::new(dims, params)
    }
}

/// One element of a set: its tuple name and integer coordinates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    /// The tuple the point belongs to.
    pub tuple: Option<String>,
    /// The coordinates, one per dimension of the space.
    pub coords: Vec<i64>,
}

/// A linear form over `[dims..., params..., 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Linear {
    pub coeffs: Vec<i64>,
}

impl Linear {
    pub(crate) fn eval(&self, coords: &[i64]) -> Result<i64, ModelingError> {
        let dims = coords.len();
        // parameters must not participate when evaluating concrete points
        if self.coeffs[dims..self.coeffs.len() - 1]
            .iter()
            .any(|&c| c != 0)
        {
            return Err(ModelingError::new("parametric form at a concrete point"));
        }
        Ok(self.coeffs[..dims]
            .iter()
            .zip(coords)
            .map(|(&c, &x)| c * x)
            .sum::<i64>()
            + self.coeffs[self.coeffs.len() - 1])
    }
}

/// One constraint of a conjunct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    /// `f ≥ 0`
    Ge,
    /// `f = 0`
    Eq,
    /// `f ≡ 0 (mod m)`
    Stride(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EngineConstraint {
    pub linear: Linear,
    pub kind: Kind,
}

impl EngineConstraint {
    fn holds_at(&self, coords: &[i64]) -> Result<bool, ModelingError> {
        let value = self.linear.eval(coords)?;
        Ok(match self.kind {
            Kind::Ge => value >= 0,
            Kind::Eq => value == 0,
            Kind::Stride(m) => value.rem_euclid(m) == 0,
        })
    }
}

/// A conjunction of constraints describing one convex piece (with strides).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Conjunct {
    pub constraints: Vec<EngineConstraint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SetPart {
    pub space: Space,
    /// The disjuncts of this part; an empty list denotes the empty set.
    pub conjuncts: Vec<Conjunct>,
}

/// A union of integer sets over named spaces, owned by a [`Context`].
///
/// Every operation returns a fresh handle; handles are not cloneable and
/// expose no in-place mutation.
#[derive(Debug)]
pub struct Set {
    pub(crate) ctx: Context,
    pub(crate) parts: Vec<SetPart>,
}

impl Set {
    /// The empty set in the given space.
    #[must_use]
    pub fn empty(ctx: &Context, space: Space) -> Self {
        Self {
            ctx: ctx.clone(),
            parts: vec![SetPart {
                space,
                conjuncts: Vec::new(),
            }],
        }
    }

    /// The unconstrained set in the given space.
    #[must_use]
    pub fn universe(ctx: &Context, space: Space) -> Self {
        Self {
            ctx: ctx.clone(),
            parts: vec![SetPart {
                space,
                conjuncts: vec![Conjunct::default()],
            }],
        }
    }

    /// Builds the set of an [`IterationDomain`], installing dimension names
    /// unique within the context.
    ///
    /// # Panics
    /// Panics if a domain constraint carries an unnormalized relation; the
    /// affine layer normalizes before handing constraints down.
    #[must_use]
    pub fn from_domain(
        ctx: &Context,
        domain: &IterationDomain,
        tuple: Option<&str>,
    ) -> Self {
        let iv = domain.iteration_vector();
        let mut space = Space::of_iteration_vector(ctx, iv);
        space.tuple = tuple.map(str::to_owned);

        let conjuncts = if domain.is_empty() {
            Vec::new()
        } else {
            match domain.constraint() {
                None => vec![Conjunct::default()],
                Some(combiner) => combiner
                    .to_dnf()
                    .clauses
                    .iter()
                    .map(|clause| Conjunct {
                        constraints: clause
                            .iter()
                            .map(|c| {
                                let coeffs: Vec<i64> =
                                    (0..iv.size()).map(|pos| c.function.coeff(pos)).collect();
                                match c.relation {
                                    Relation::Ge => EngineConstraint {
                                        linear: Linear { coeffs },
                                        kind: Kind::Ge,
                                    },
                                    Relation::Le => EngineConstraint {
                                        linear: Linear {
                                            coeffs: coeffs.iter().map(|&c| -c).collect(),
                                        },
                                        kind: Kind::Ge,
                                    },
                                    Relation::Eq => EngineConstraint {
                                        linear: Linear { coeffs },
                                        kind: Kind::Eq,
                                    },
                                    Relation::ModEq(m) => EngineConstraint {
                                        linear: Linear { coeffs },
                                        kind: Kind::Stride(m),
                                    },
                                    other => {
                                        panic!("unnormalized relation {other} in a domain")
                                    }
                                }
                            })
                            .collect(),
                    })
                    .collect(),
            }
        };

        Self {
            ctx: ctx.clone(),
            parts: vec![SetPart { space, conjuncts }],
        }
    }

    /// Parses a set from its textual form, e.g. `{ [i] : 10 <= i and i <= 99 }`.
    ///
    /// # Errors
    /// Returns [`ModelingError`] on malformed input.
    pub fn from_str(ctx: &Context, text: &str) -> Result<Self, ModelingError> {
        super::parse::parse_set(ctx, text)
    }

    /// The owning context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// The space of a single-space set.
    ///
    /// # Panics
    /// Panics if the set spans several tuples.
    #[must_use]
    pub fn space(&self) -> &Space {
        assert_eq!(self.parts.len(), 1, "set spans several spaces");
        &self.parts[0].space
    }

    fn part_for(&self, tuple: Option<&str>) -> Option<&SetPart> {
        self.parts
            .iter()
            .find(|p| p.space.tuple.as_deref() == tuple)
    }

    /// The union of two sets.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut parts = self.parts.clone();
        for part in &other.parts {
            if let Some(existing) = parts
                .iter_mut()
                .find(|p| p.space.tuple == part.space.tuple)
            {
                assert_eq!(
                    existing.space.dims.len(),
                    part.space.dims.len(),
                    "union of spaces with different dimensionality"
                );
                existing.conjuncts.extend(part.conjuncts.iter().cloned());
            } else {
                parts.push(part.clone());
            }
        }
        Self {
            ctx: self.ctx.clone(),
            parts,
        }
    }

    /// The intersection of two sets.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let mut parts = Vec::new();
        for part in &self.parts {
            let Some(other_part) = other.part_for(part.space.tuple.as_deref()) else {
                continue;
            };
            let conjuncts = part
                .conjuncts
                .iter()
                .cartesian_product(&other_part.conjuncts)
                .map(|(a, b)| Conjunct {
                    constraints: a
                        .constraints
                        .iter()
                        .chain(&b.constraints)
                        .cloned()
                        .collect(),
                })
                .collect();
            parts.push(SetPart {
                space: part.space.clone(),
                conjuncts,
            });
        }
        Self {
            ctx: self.ctx.clone(),
            parts,
        }
    }

    /// The difference `self ∖ other`.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when `other` contains stride constraints,
    /// whose complement falls outside the modeled fragment.
    pub fn subtract(&self, other: &Self) -> Result<Self, ModelingError> {
        let mut parts = Vec::new();
        for part in &self.parts {
            let Some(other_part) = other.part_for(part.space.tuple.as_deref()) else {
                parts.push(part.clone());
                continue;
            };
            // A ∖ (C₁ ∨ C₂ ∨ …) = A ∩ ¬C₁ ∩ ¬C₂ ∩ …
            let mut conjuncts = part.conjuncts.clone();
            for sub in &other_part.conjuncts {
                let negated = negate_conjunct(sub)?;
                conjuncts = conjuncts
                    .iter()
                    .cartesian_product(&negated)
                    .map(|(a, b)| Conjunct {
                        constraints: a
                            .constraints
                            .iter()
                            .chain(&b.constraints)
                            .cloned()
                            .collect(),
                    })
                    .collect();
            }
            parts.push(SetPart {
                space: part.space.clone(),
                conjuncts,
            });
        }
        Ok(Self {
            ctx: self.ctx.clone(),
            parts,
        })
    }

    /// Checks whether a point belongs to the set.
    ///
    /// # Errors
    /// Returns [`ModelingError`] for parametric sets.
    pub fn contains_point(&self, point: &Point) -> Result<bool, ModelingError> {
        let Some(part) = self.part_for(point.tuple.as_deref()) else {
            return Ok(false);
        };
        for conjunct in &part.conjuncts {
            let mut all = true;
            for constraint in &conjunct.constraints {
                if !constraint.holds_at(&point.coords)? {
                    all = false;
                    break;
                }
            }
            if all {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Enumerates all points of a bounded, parameter-free set.
    ///
    /// # Errors
    /// Returns [`ModelingError`] for parametric or unbounded sets.
    pub fn points(&self) -> Result<Vec<Point>, ModelingError> {
        let mut result = BTreeSet::new();
        for part in &self.parts {
            if !part.space.params.is_empty()
                && part.conjuncts.iter().any(|c| {
                    c.constraints.iter().any(|ec| {
                        ec.linear.coeffs[part.space.dims.len()..ec.linear.coeffs.len() - 1]
                            .iter()
                            .any(|&c| c != 0)
                    })
                })
            {
                return Err(ModelingError::new("enumeration of a parametric set"));
            }
            for conjunct in &part.conjuncts {
                enumerate(conjunct, part.space.dims.len(), &mut |coords| {
                    result.insert(Point {
                        tuple: part.space.tuple.clone(),
                        coords: coords.to_vec(),
                    });
                })?;
            }
        }
        Ok(result.into_iter().collect())
    }

    /// Checks emptiness.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when emptiness is not decidable within the
    /// modeled fragment.
    pub fn is_empty(&self) -> Result<bool, ModelingError> {
        Ok(self.points()?.is_empty())
    }

    /// The lexicographically smallest point.
    ///
    /// # Errors
    /// Returns [`ModelingError`] for parametric, unbounded or empty sets.
    pub fn lexmin(&self) -> Result<Point, ModelingError> {
        self.points()?
            .into_iter()
            .min_by(|a, b| a.coords.cmp(&b.coords))
            .ok_or_else(|| ModelingError::new("lexmin of an empty set"))
    }

    /// The lexicographically greatest point.
    ///
    /// # Errors
    /// Returns [`ModelingError`] for parametric, unbounded or empty sets.
    pub fn lexmax(&self) -> Result<Point, ModelingError> {
        self.points()?
            .into_iter()
            .max_by(|a, b| a.coords.cmp(&b.coords))
            .ok_or_else(|| ModelingError::new("lexmax of an empty set"))
    }

    /// Projects the set onto the given dimensions, eliminating all others.
    ///
    /// Elimination is Fourier–Motzkin over the integers; the result may
    /// over-approximate, which is sound for domain queries.
    #[must_use]
    pub fn project_onto(&self, keep: &[usize]) -> Self {
        let parts = self
            .parts
            .iter()
            .map(|part| {
                let dims = part.space.dims.len();
                let eliminate: Vec<usize> =
                    (0..dims).filter(|pos| !keep.contains(pos)).rev().collect();
                let mut conjuncts = part.conjuncts.clone();
                for &dim in &eliminate {
                    conjuncts = conjuncts
                        .iter()
                        .map(|c| eliminate_dim(c, dim))
                        .collect();
                }
                // re-index the surviving dimensions
                let mut kept: Vec<usize> = (0..dims).filter(|pos| keep.contains(pos)).collect();
                kept.sort_unstable();
                let space = Space {
                    tuple: part.space.tuple.clone(),
                    dims: kept.iter().map(|&pos| part.space.dims[pos].clone()).collect(),
                    params: part.space.params.clone(),
                };
                SetPart {
                    space,
                    conjuncts,
                }
            })
            .collect();
        Self {
            ctx: self.ctx.clone(),
            parts,
        }
    }

    /// Merges duplicate constraints and disjuncts.
    #[must_use]
    pub fn coalesce(&self) -> Self {
        let parts = self
            .parts
            .iter()
            .map(|part| {
                let mut conjuncts: Vec<Conjunct> = Vec::new();
                for conjunct in &part.conjuncts {
                    let mut constraints = conjunct.constraints.clone();
                    constraints.dedup();
                    let conjunct = Conjunct { constraints };
                    if !conjuncts.contains(&conjunct) {
                        conjuncts.push(conjunct);
                    }
                }
                SetPart {
                    space: part.space.clone(),
                    conjuncts,
                }
            })
            .collect();
        Self {
            ctx: self.ctx.clone(),
            parts,
        }
    }

    /// Replaces opposed inequality pairs `f ≥ 0 ∧ −f ≥ 0` by `f = 0`.
    #[must_use]
    pub fn detect_equalities(&self) -> Self {
        let parts = self
            .parts
            .iter()
            .map(|part| SetPart {
                space: part.space.clone(),
                conjuncts: part
                    .conjuncts
                    .iter()
                    .map(|conjunct| {
                        let mut constraints: Vec<EngineConstraint> = Vec::new();
                        for c in &conjunct.constraints {
                            if c.kind == Kind::Ge {
                                let negated: Vec<i64> =
                                    c.linear.coeffs.iter().map(|&x| -x).collect();
                                if let Some(partner) = constraints.iter_mut().find(|p| {
                                    p.kind == Kind::Ge && p.linear.coeffs == negated
                                }) {
                                    partner.kind = Kind::Eq;
                                    continue;
                                }
                            }
                            constraints.push(c.clone());
                        }
                        Conjunct { constraints }
                    })
                    .collect(),
            })
            .collect();
        Self {
            ctx: self.ctx.clone(),
            parts,
        }
    }

    /// The number of points as a piecewise quasi-polynomial.
    ///
    /// Parameter-free bounded sets yield an exact constant; everything else
    /// yields the symbolic unknown, the conservative top.
    #[must_use]
    pub fn card(&self) -> Pwqp {
        match self.points() {
            Ok(points) => Pwqp::Constant(i64::try_from(points.len()).unwrap_or(i64::MAX)),
            Err(_) => Pwqp::Unknown,
        }
    }
}

impl Display for Set {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rendered = self
            .parts
            .iter()
            .map(|part| {
                let tuple = part.space.tuple.as_deref().unwrap_or("");
                let dims = part.space.dims.iter().join(", ");
                format!("{tuple}[{dims}] : {} disjuncts", part.conjuncts.len())
            })
            .join("; ");
        write!(f, "{{ {rendered} }}")
    }
}

/// A piecewise quasi-polynomial: the symbolic cardinality of a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pwqp {
    /// An exact constant count.
    Constant(i64),
    /// A count the engine cannot express; the conservative top.
    Unknown,
}

impl Pwqp {
    /// The exact constant value, if the polynomial is constant.
    #[must_use]
    pub const fn as_constant(&self) -> Option<i64> {
        match self {
            Pwqp::Constant(v) => Some(*v),
            Pwqp::Unknown => None,
        }
    }

    /// An upper bound for the polynomial over its domain.
    #[must_use]
    pub const fn upper_bound(&self) -> Option<i64> {
        self.as_constant()
    }
}

impl Display for Pwqp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Pwqp::Constant(v) => write!(f, "{v}"),
            Pwqp::Unknown => write!(f, "?"),
        }
    }
}

fn negate_conjunct(conjunct: &Conjunct) -> Result<Vec<Conjunct>, ModelingError> {
    // ¬(c₁ ∧ c₂ ∧ …) = ¬c₁ ∨ ¬c₂ ∨ …
    let mut result = Vec::new();
    for constraint in &conjunct.constraints {
        match constraint.kind {
            Kind::Ge => {
                // ¬(f ≥ 0) = −f − 1 ≥ 0
                let coeffs: Vec<i64> = constraint.linear.coeffs.iter().map(|&c| -c).collect();
                let mut linear = Linear { coeffs };
                *linear.coeffs.last_mut().expect("constant position") -= 1;
                result.push(Conjunct {
                    constraints: vec![EngineConstraint {
                        linear,
                        kind: Kind::Ge,
                    }],
                });
            }
            Kind::Eq => {
                // ¬(f = 0) = f − 1 ≥ 0 ∨ −f − 1 ≥ 0
                let mut above = constraint.linear.clone();
                *above.coeffs.last_mut().expect("constant position") -= 1;
                let mut below = Linear {
                    coeffs: constraint.linear.coeffs.iter().map(|&c| -c).collect(),
                };
                *below.coeffs.last_mut().expect("constant position") -= 1;
                result.push(Conjunct {
                    constraints: vec![EngineConstraint {
                        linear: above,
                        kind: Kind::Ge,
                    }],
                });
                result.push(Conjunct {
                    constraints: vec![EngineConstraint {
                        linear: below,
                        kind: Kind::Ge,
                    }],
                });
            }
            Kind::Stride(_) => {
                return Err(ModelingError::new(
                    "complement of a stride constraint",
                ));
            }
        }
    }
    Ok(result)
}

/// Eliminates dimension `dim` from a conjunct by Fourier–Motzkin.
fn eliminate_dim(conjunct: &Conjunct, dim: usize) -> Conjunct {
    let mut kept = Vec::new();
    let mut lowers = Vec::new();
    let mut uppers = Vec::new();
    for constraint in &conjunct.constraints {
        let coeff = constraint.linear.coeffs[dim];
        if coeff == 0 {
            kept.push(drop_coeff(constraint, dim));
            continue;
        }
        match constraint.kind {
            Kind::Ge if coeff > 0 => lowers.push(constraint.clone()),
            Kind::Ge => uppers.push(constraint.clone()),
            Kind::Eq => {
                // f = 0 splits into f ≥ 0 and −f ≥ 0; orient by the sign on `dim`
                let positive = EngineConstraint {
                    linear: constraint.linear.clone(),
                    kind: Kind::Ge,
                };
                let negative = EngineConstraint {
                    linear: Linear {
                        coeffs: constraint.linear.coeffs.iter().map(|&c| -c).collect(),
                    },
                    kind: Kind::Ge,
                };
                if coeff > 0 {
                    lowers.push(positive);
                    uppers.push(negative);
                } else {
                    lowers.push(negative);
                    uppers.push(positive);
                }
            }
            // strides on an eliminated dimension are dropped (over-approximation)
            Kind::Stride(_) => {}
        }
    }
    for lower in &lowers {
        for upper in &uppers {
            let a = lower.linear.coeffs[dim];
            let b = -upper.linear.coeffs[dim];
            debug_assert!(a > 0 && b > 0);
            // a·(upper) + b·(lower), the x-coefficients cancel
            let coeffs: Vec<i64> = lower
                .linear
                .coeffs
                .iter()
                .zip(&upper.linear.coeffs)
                .map(|(&l, &u)| b * l + a * u)
                .collect();
            kept.push(drop_coeff(
                &EngineConstraint {
                    linear: Linear { coeffs },
                    kind: Kind::Ge,
                },
                dim,
            ));
        }
    }
    Conjunct { constraints: kept }
}

fn drop_coeff(constraint: &EngineConstraint, dim: usize) -> EngineConstraint {
    let mut coeffs = constraint.linear.coeffs.clone();
    coeffs.remove(dim);
    EngineConstraint {
        linear: Linear { coeffs },
        kind: constraint.kind,
    }
}

/// Enumerates all integer points of a bounded conjunct.
pub(crate) fn enumerate(
    conjunct: &Conjunct,
    dims: usize,
    emit: &mut impl FnMut(&[i64]),
) -> Result<(), ModelingError> {
    let mut prefix = Vec::with_capacity(dims);
    enumerate_rec(conjunct, dims, &mut prefix, emit)
}

fn enumerate_rec(
    conjunct: &Conjunct,
    dims: usize,
    prefix: &mut Vec<i64>,
    emit: &mut impl FnMut(&[i64]),
) -> Result<(), ModelingError> {
    if prefix.len() == dims {
        for constraint in &conjunct.constraints {
            if !constraint.holds_at(prefix)? {
                return Ok(());
            }
        }
        emit(prefix);
        return Ok(());
    }
    let k = prefix.len();
    let (lower, upper) = bounds_for(conjunct, dims, prefix, k)?;
    for x in lower..=upper {
        prefix.push(x);
        // strides over the fixed prefix prune early
        let mut feasible = true;
        for constraint in &conjunct.constraints {
            if let Kind::Stride(m) = constraint.kind {
                if constraint.linear.coeffs[prefix.len()..dims]
                    .iter()
                    .all(|&c| c == 0)
                {
                    let value = constraint.linear.eval_prefix(prefix, dims)?;
                    if value.rem_euclid(m) != 0 {
                        feasible = false;
                        break;
                    }
                }
            }
        }
        if feasible {
            enumerate_rec(conjunct, dims, prefix, emit)?;
        }
        prefix.pop();
    }
    Ok(())
}

impl Linear {
    /// Evaluates over a prefix of dimensions; later dimensions must have
    /// zero coefficients.
    fn eval_prefix(&self, prefix: &[i64], dims: usize) -> Result<i64, ModelingError> {
        debug_assert!(self.coeffs[prefix.len()..dims].iter().all(|&c| c == 0));
        if self.coeffs[dims..self.coeffs.len() - 1]
            .iter()
            .any(|&c| c != 0)
        {
            return Err(ModelingError::new("parametric form at a concrete point"));
        }
        Ok(self.coeffs[..prefix.len()]
            .iter()
            .zip(prefix)
            .map(|(&c, &x)| c * x)
            .sum::<i64>()
            + self.coeffs[self.coeffs.len() - 1])
    }
}

/// Derives finite bounds for dimension `k` given fixed outer dimensions.
fn bounds_for(
    conjunct: &Conjunct,
    dims: usize,
    prefix: &[i64],
    k: usize,
) -> Result<(i64, i64), ModelingError> {
    let mut lower: Option<i64> = None;
    let mut upper: Option<i64> = None;
    for constraint in &conjunct.constraints {
        let coeffs = &constraint.linear.coeffs;
        let ck = coeffs[k];
        if ck == 0 || coeffs[k + 1..dims].iter().any(|&c| c != 0) {
            continue;
        }
        if coeffs[dims..coeffs.len() - 1].iter().any(|&c| c != 0) {
            return Err(ModelingError::new("parametric bound"));
        }
        let rest: i64 = coeffs[..k]
            .iter()
            .zip(prefix)
            .map(|(&c, &x)| c * x)
            .sum::<i64>()
            + coeffs[coeffs.len() - 1];
        match constraint.kind {
            Kind::Ge if ck > 0 => {
                // ck·x + rest ≥ 0  ⇒  x ≥ ⌈−rest / ck⌉
                let bound = (-rest).div_euclid(ck) + i64::from((-rest).rem_euclid(ck) != 0);
                lower = Some(lower.map_or(bound, |b| b.max(bound)));
            }
            Kind::Ge => {
                // ck·x + rest ≥ 0, ck < 0  ⇒  x ≤ ⌊rest / −ck⌋
                let bound = rest.div_euclid(-ck);
                upper = Some(upper.map_or(bound, |b| b.min(bound)));
            }
            Kind::Eq => {
                if rest.rem_euclid(ck.abs()) != 0 {
                    // no integer solution
                    return Ok((0, -1));
                }
                let value = -rest / ck;
                lower = Some(lower.map_or(value, |b| b.max(value)));
                upper = Some(upper.map_or(value, |b| b.min(value)));
            }
            Kind::Stride(_) => {}
        }
    }
    match (lower, upper) {
        (Some(lo), Some(hi)) => Ok((lo, hi)),
        _ => Err(ModelingError::new("unbounded dimension")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new()
    }

    fn range_set(ctx: &Context, lo: i64, hi: i64) -> Set {
        Set::from_str(ctx, &format!("{{ [i] : {lo} <= i and i <= {hi} }}")).expect("parse")
    }

    #[test]
    fn cardinality_of_a_range() {
        let ctx = ctx();
        let set = range_set(&ctx, 10, 99);
        assert_eq!(set.card(), Pwqp::Constant(90));
    }

    #[test]
    fn set_algebra() {
        let ctx = ctx();
        let a = range_set(&ctx, 0, 10);
        let b = range_set(&ctx, 5, 15);

        assert_eq!(a.union(&b).card(), Pwqp::Constant(16));
        assert_eq!(a.intersect(&b).card(), Pwqp::Constant(6));
        assert_eq!(a.subtract(&b).expect("subtract").card(), Pwqp::Constant(5));
    }

    #[test]
    fn lexicographic_extrema() {
        let ctx = ctx();
        let set = Set::from_str(
            &ctx,
            "{ [i, j] : 0 <= i and i <= 2 and 1 <= j and j <= 3 }",
        )
        .expect("parse");
        assert_eq!(set.lexmin().expect("lexmin").coords, vec![0, 1]);
        assert_eq!(set.lexmax().expect("lexmax").coords, vec![2, 3]);
    }

    #[test]
    fn stride_constraints_filter_points() {
        let ctx = ctx();
        let set =
            Set::from_str(&ctx, "{ [i] : 10 <= i and i <= 30 and (i - 10) mod 7 = 0 }")
                .expect("parse");
        let points: Vec<i64> = set
            .points()
            .expect("points")
            .into_iter()
            .map(|p| p.coords[0])
            .collect();
        assert_eq!(points, vec![10, 17, 24]);
    }

    #[test]
    fn projection_eliminates_dimensions() {
        let ctx = ctx();
        let set = Set::from_str(
            &ctx,
            "{ [i, j] : 0 <= i and i <= 4 and i <= j and j <= i + 1 }",
        )
        .expect("parse");
        let projected = set.project_onto(&[0]);
        let points: Vec<i64> = projected
            .points()
            .expect("points")
            .into_iter()
            .map(|p| p.coords[0])
            .collect();
        assert_eq!(points, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn detect_equalities_merges_pairs() {
        let ctx = ctx();
        let set = Set::from_str(&ctx, "{ [i] : i <= 5 and 5 <= i }").expect("parse");
        let detected = set.detect_equalities();
        assert_eq!(detected.card(), Pwqp::Constant(1));
        let part = &detected.parts[0];
        assert!(part.conjuncts[0]
            .constraints
            .iter()
            .any(|c| c.kind == Kind::Eq));
    }

    #[test]
    fn unbounded_cardinality_is_unknown() {
        let ctx = ctx();
        let set = Set::from_str(&ctx, "{ [i] : 0 <= i }").expect("parse");
        assert_eq!(set.card(), Pwqp::Unknown);
    }
}
