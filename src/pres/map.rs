//! Presburger relations and flow dependences.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::affine::AffineSystem;

use super::set::{Conjunct, EngineConstraint, Kind, Linear, Point, Set, SetPart, Space, enumerate};
use super::{Context, ModelingError};

/// One output dimension of an affine map clause, linear in the input
/// dimensions and parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputExpr {
    pub linear: Linear,
}

/// A single-valued affine piece of a map: a constrained input domain and one
/// linear expression per output dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AffineClause {
    pub in_space: Space,
    pub out_tuple: Option<String>,
    pub outputs: Vec<OutputExpr>,
    pub domain: Conjunct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MapData {
    /// A union of single-valued affine pieces.
    Affine(Vec<AffineClause>),
    /// An explicit relation between concrete points.
    Pairs(BTreeSet<(Point, Point)>),
}

/// A relation between integer points, owned by a [`Context`].
///
/// Like [`Set`], every operation returns a fresh handle.
#[derive(Debug)]
pub struct Map {
    pub(crate) ctx: Context,
    pub(crate) data: MapData,
}

impl Map {
    /// The empty relation.
    #[must_use]
    pub fn empty(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            data: MapData::Pairs(BTreeSet::new()),
        }
    }

    /// Builds the map of an [`AffineSystem`]: inputs are the system's
    /// iterators, outputs its rows.
    ///
    /// Dimension names are installed uniquely within the context.
    #[must_use]
    pub fn from_system(
        ctx: &Context,
        system: &AffineSystem,
        in_tuple: Option<&str>,
        out_tuple: Option<&str>,
    ) -> Self {
        let iv = system.iteration_vector();
        let mut in_space = Space::of_iteration_vector(ctx, iv);
        in_space.tuple = in_tuple.map(str::to_owned);
        let outputs = system
            .iter()
            .map(|row| OutputExpr {
                linear: Linear {
                    coeffs: (0..iv.size()).map(|pos| row.coeff(pos)).collect(),
                },
            })
            .collect();
        Self {
            ctx: ctx.clone(),
            data: MapData::Affine(vec![AffineClause {
                in_space,
                out_tuple: out_tuple.map(str::to_owned),
                outputs,
                domain: Conjunct::default(),
            }]),
        }
    }

    /// Builds an explicit relation from point pairs.
    #[must_use]
    pub fn from_pairs(ctx: &Context, pairs: BTreeSet<(Point, Point)>) -> Self {
        Self {
            ctx: ctx.clone(),
            data: MapData::Pairs(pairs),
        }
    }

    /// Parses a map from its textual form, e.g. `{ [i] -> [i + 1] : 0 <= i }`.
    ///
    /// # Errors
    /// Returns [`ModelingError`] on malformed input.
    pub fn from_str(ctx: &Context, text: &str) -> Result<Self, ModelingError> {
        super::parse::parse_map(ctx, text)
    }

    /// The owning context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// The union of two relations.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when mixing representations requires an
    /// enumeration that is not bounded.
    pub fn union(&self, other: &Self) -> Result<Self, ModelingError> {
        let data = match (&self.data, &other.data) {
            (MapData::Affine(a), MapData::Affine(b)) => {
                MapData::Affine(a.iter().chain(b).cloned().collect())
            }
            _ => {
                let mut pairs = self.pairs()?;
                pairs.extend(other.pairs()?);
                MapData::Pairs(pairs)
            }
        };
        Ok(Self {
            ctx: self.ctx.clone(),
            data,
        })
    }

    /// Restricts the relation to inputs within the given set.
    #[must_use]
    pub fn intersect_domain(&self, set: &Set) -> Self {
        let data = match &self.data {
            MapData::Affine(clauses) => MapData::Affine(
                clauses
                    .iter()
                    .flat_map(|clause| {
                        set.parts
                            .iter()
                            .filter(|part| part.space.tuple == clause.in_space.tuple)
                            .flat_map(|part| &part.conjuncts)
                            .map(|conjunct| {
                                let mut restricted = clause.clone();
                                restricted
                                    .domain
                                    .constraints
                                    .extend(conjunct.constraints.iter().cloned());
                                restricted
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect(),
            ),
            MapData::Pairs(pairs) => MapData::Pairs(
                pairs
                    .iter()
                    .filter(|(src, _)| set.contains_point(src).unwrap_or(false))
                    .cloned()
                    .collect(),
            ),
        };
        Self {
            ctx: self.ctx.clone(),
            data,
        }
    }

    /// The relation as explicit point pairs.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when an affine piece has an unbounded or
    /// parametric domain.
    pub fn pairs(&self) -> Result<BTreeSet<(Point, Point)>, ModelingError> {
        match &self.data {
            MapData::Pairs(pairs) => Ok(pairs.clone()),
            MapData::Affine(clauses) => {
                let mut result = BTreeSet::new();
                for clause in clauses {
                    let dims = clause.in_space.dims.len();
                    let mut error = None;
                    enumerate(&clause.domain, dims, &mut |coords| {
                        let source = Point {
                            tuple: clause.in_space.tuple.clone(),
                            coords: coords.to_vec(),
                        };
                        match clause.eval(coords) {
                            Ok(target) => {
                                result.insert((source, target));
                            }
                            Err(e) => error = Some(e),
                        }
                    })?;
                    if let Some(e) = error {
                        return Err(e);
                    }
                }
                Ok(result)
            }
        }
    }

    /// The image of one concrete input point.
    ///
    /// # Errors
    /// Returns [`ModelingError`] if the point is outside every piece or the
    /// relation is not single-valued at it.
    pub fn image_of(&self, point: &Point) -> Result<Point, ModelingError> {
        match &self.data {
            MapData::Affine(clauses) => {
                for clause in clauses {
                    if clause.in_space.tuple != point.tuple {
                        continue;
                    }
                    let mut inside = true;
                    for constraint in &clause.domain.constraints {
                        if !constraint_holds(constraint, &point.coords)? {
                            inside = false;
                            break;
                        }
                    }
                    if inside {
                        return clause.eval(&point.coords);
                    }
                }
                Err(ModelingError::new("point outside the relation's domain"))
            }
            MapData::Pairs(pairs) => pairs
                .iter()
                .find(|(src, _)| src == point)
                .map(|(_, dst)| dst.clone())
                .ok_or_else(|| ModelingError::new("point outside the relation's domain")),
        }
    }

    /// The set of inputs.
    ///
    /// # Errors
    /// Returns [`ModelingError`] on unbounded enumeration.
    pub fn domain(&self) -> Result<Set, ModelingError> {
        let points = self.pairs()?.into_iter().map(|(src, _)| src).collect();
        Ok(set_from_points(&self.ctx, &points))
    }

    /// The set of outputs.
    ///
    /// # Errors
    /// Returns [`ModelingError`] on unbounded enumeration.
    pub fn range(&self) -> Result<Set, ModelingError> {
        let points = self.pairs()?.into_iter().map(|(_, dst)| dst).collect();
        Ok(set_from_points(&self.ctx, &points))
    }

    /// The inverse relation.
    ///
    /// # Errors
    /// Returns [`ModelingError`] on unbounded enumeration.
    pub fn reverse(&self) -> Result<Self, ModelingError> {
        let pairs = self
            .pairs()?
            .into_iter()
            .map(|(src, dst)| (dst, src))
            .collect();
        Ok(Self {
            ctx: self.ctx.clone(),
            data: MapData::Pairs(pairs),
        })
    }

    /// The image of a set under this relation.
    ///
    /// # Errors
    /// Returns [`ModelingError`] on unbounded enumeration.
    pub fn apply(&self, set: &Set) -> Result<Set, ModelingError> {
        let restricted = self.intersect_domain(set);
        let points = restricted
            .pairs()?
            .into_iter()
            .map(|(_, dst)| dst)
            .collect();
        Ok(set_from_points(&self.ctx, &points))
    }

    /// Checks whether the relation holds no pairs.
    ///
    /// # Errors
    /// Returns [`ModelingError`] on unbounded enumeration.
    pub fn is_empty(&self) -> Result<bool, ModelingError> {
        Ok(self.pairs()?.is_empty())
    }
}

impl Display for Map {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.data {
            MapData::Affine(clauses) => write!(f, "{{ {} affine pieces }}", clauses.len()),
            MapData::Pairs(pairs) => {
                let rendered = pairs
                    .iter()
                    .map(|(src, dst)| {
                        format!(
                            "{}{:?} -> {}{:?}",
                            src.tuple.as_deref().unwrap_or(""),
                            src.coords,
                            dst.tuple.as_deref().unwrap_or(""),
                            dst.coords
                        )
                    })
                    .join(", ");
                write!(f, "{{ {rendered} }}")
            }
        }
    }
}

impl AffineClause {
    fn eval(&self, coords: &[i64]) -> Result<Point, ModelingError> {
        let coords = self
            .outputs
            .iter()
            .map(|out| out.linear.eval(coords))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Point {
            tuple: self.out_tuple.clone(),
            coords,
        })
    }
}

fn constraint_holds(
    constraint: &EngineConstraint,
    coords: &[i64],
) -> Result<bool, ModelingError> {
    let value = constraint.linear.eval(coords)?;
    Ok(match constraint.kind {
        Kind::Ge => value >= 0,
        Kind::Eq => value == 0,
        Kind::Stride(m) => value.rem_euclid(m) == 0,
    })
}

/// Builds the set holding exactly the given points.
pub(crate) fn set_from_points(ctx: &Context, points: &BTreeSet<Point>) -> Set {
    let mut parts: Vec<SetPart> = Vec::new();
    for point in points {
        let conjunct = Conjunct {
            constraints: point
                .coords
                .iter()
                .enumerate()
                .map(|(dim, &value)| {
                    let mut coeffs = vec![0i64; point.coords.len() + 1];
                    coeffs[dim] = 1;
                    coeffs[point.coords.len()] = -value;
                    EngineConstraint {
                        linear: Linear { coeffs },
                        kind: Kind::Eq,
                    }
                })
                .collect(),
        };
        if let Some(part) = parts.iter_mut().find(|p| p.space.tuple == point.tuple) {
            part.conjuncts.push(conjunct);
        } else {
            let space = Space {
                tuple: point.tuple.clone(),
                dims: (0..point.coords.len())
                    .map(|d| ctx.fresh_name(&format!("d{d}_")))
                    .collect(),
                params: Vec::new(),
            };
            parts.push(SetPart {
                space,
                conjuncts: vec![conjunct],
            });
        }
    }
    if parts.is_empty() {
        parts.push(SetPart {
            space: Space::new(Vec::new(), Vec::new()),
            conjuncts: Vec::new(),
        });
    }
    Set {
        ctx: ctx.clone(),
        parts,
    }
}

/// The result of a flow-dependence computation.
#[derive(Debug)]
pub struct DependenceInfo {
    /// Pairs `source → sink` where the source is the last definite writer.
    pub must_dep: Map,
    /// Pairs `source → sink` for possible writers not superseded by a
    /// definite one.
    pub may_dep: Map,
    /// Sink instances with no definite source.
    pub must_no_source: Set,
    /// Sink instances with neither definite nor possible source.
    pub may_no_source: Set,
}

/// Computes flow dependences.
///
/// `sinks` relates reading instances to the accessed cells, `must_sources`
/// (and optionally `may_sources`) relate writing instances to cells. For
/// every sink the last definite writer scheduled before it becomes a must
/// dependence; possible writers in between become may dependences.
///
/// # Errors
/// Returns [`ModelingError`] when instances cannot be enumerated within the
/// modeled fragment.
pub fn compute_flow(
    domain: &Set,
    schedule: &Map,
    sinks: &Map,
    must_sources: &Map,
    may_sources: Option<&Map>,
) -> Result<DependenceInfo, ModelingError> {
    let ctx = domain.context().clone();
    let sink_pairs = sinks.intersect_domain(domain).pairs()?;
    let must_pairs = must_sources.intersect_domain(domain).pairs()?;
    let may_pairs = match may_sources {
        Some(map) => map.intersect_domain(domain).pairs()?,
        None => BTreeSet::new(),
    };

    let mut must_dep = BTreeSet::new();
    let mut may_dep = BTreeSet::new();
    let mut must_no_source = BTreeSet::new();
    let mut may_no_source = BTreeSet::new();

    for (sink, cell) in &sink_pairs {
        let sink_time = schedule.image_of(sink)?.coords;

        // the last definite writer before the sink
        let mut last_must: Option<(Point, Vec<i64>)> = None;
        for (writer, written) in &must_pairs {
            if written != cell || writer == sink {
                continue;
            }
            let time = schedule.image_of(writer)?.coords;
            if time < sink_time
                && last_must.as_ref().is_none_or(|(_, best)| time > *best)
            {
                last_must = Some((writer.clone(), time));
            }
        }

        // possible writers after the last definite one
        let barrier = last_must.as_ref().map(|(_, time)| time.clone());
        let mut has_may = false;
        for (writer, written) in &may_pairs {
            if written != cell || writer == sink {
                continue;
            }
            let time = schedule.image_of(writer)?.coords;
            let after_barrier = barrier.as_ref().is_none_or(|b| time > *b);
            if time < sink_time && after_barrier {
                may_dep.insert((writer.clone(), sink.clone()));
                has_may = true;
            }
        }

        match last_must {
            Some((writer, _)) => {
                must_dep.insert((writer, sink.clone()));
            }
            None => {
                must_no_source.insert(sink.clone());
                if !has_may {
                    may_no_source.insert(sink.clone());
                }
            }
        }
    }

    Ok(DependenceInfo {
        must_dep: Map::from_pairs(&ctx, must_dep),
        may_dep: Map::from_pairs(&ctx, may_dep),
        must_no_source: set_from_points(&ctx, &must_no_source),
        may_no_source: set_from_points(&ctx, &may_no_source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affine_map_application() {
        let ctx = Context::new();
        let map = Map::from_str(&ctx, "{ [i] -> [i + 7] : 0 <= i and i <= 3 }").expect("parse");
        let set = Set::from_str(&ctx, "{ [i] : 1 <= i and i <= 2 }").expect("parse");
        let image = map.apply(&set).expect("apply");
        let coords: Vec<i64> = image
            .points()
            .expect("points")
            .into_iter()
            .map(|p| p.coords[0])
            .collect();
        assert_eq!(coords, vec![8, 9]);
    }

    #[test]
    fn reverse_swaps_sides() {
        let ctx = Context::new();
        let map = Map::from_str(&ctx, "{ [i] -> [i + 1] : 0 <= i and i <= 1 }").expect("parse");
        let reversed = map.reverse().expect("reverse");
        let pairs = reversed.pairs().expect("pairs");
        assert!(pairs.contains(&(
            Point {
                tuple: None,
                coords: vec![1]
            },
            Point {
                tuple: None,
                coords: vec![0]
            }
        )));
    }

    #[test]
    fn flow_dependences_pick_the_last_writer() {
        let ctx = Context::new();
        // instances 0..4 first write cell i, then read cell i-1
        let domain = Set::from_str(&ctx, "{ [i] : 0 <= i and i <= 3 }").expect("parse");
        let schedule = Map::from_str(&ctx, "{ [i] -> [i] }").expect("parse");
        let reads = Map::from_str(&ctx, "{ [i] -> [i - 1] }").expect("parse");
        let writes = Map::from_str(&ctx, "{ [i] -> [i] }").expect("parse");

        let info = compute_flow(&domain, &schedule, &reads, &writes, None).expect("flow");
        let deps = info.must_dep.pairs().expect("pairs");

        // read at i depends on the write at i-1
        assert_eq!(deps.len(), 3);
        assert!(deps.iter().all(|(src, snk)| {
            src.coords[0] + 1 == snk.coords[0]
        }));
        // the first read has no source
        let orphan = info.must_no_source.points().expect("points");
        assert_eq!(orphan.len(), 1);
        assert_eq!(orphan[0].coords, vec![0]);
    }
}
