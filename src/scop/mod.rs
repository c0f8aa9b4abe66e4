//! The polyhedral SCoP model.
//!
//! A [`Scop`] is the symbolic representation of a static control part: a
//! region whose control flow and memory accesses are affine in the
//! enclosing loop iterators and parameters. Statements carry an iteration
//! domain, a schedule and their access functions, all over the SCoP's
//! shared iteration vector. Transformations ([`transform`]) operate on the
//! schedule; [`Scop::to_ir`] lowers the model back to IR through the
//! integer-set facade.

pub mod extract;
pub mod transform;

pub use extract::{ScopRegistry, extract, get_variable_domain};

use std::fmt::{self, Display, Formatter};

use bitflags::bitflags;
use itertools::Itertools;

use crate::affine::{AffineSystem, IterationDomain, IterationVector, merge};
use crate::ir::check::{self, Severity};
use crate::ir::{Node, NodeAddress, NodeId, NodeManager};
use crate::pres::codegen::CodegenStmt;
use crate::pres::{self, Context, ModelingError};

bitflags! {
    /// The kinds of data dependences.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DepKind: u8 {
        /// Read after write (true dependence).
        const RAW = 0b0001;
        /// Write after read (anti dependence).
        const WAR = 0b0010;
        /// Write after write (output dependence).
        const WAW = 0b0100;
        /// Read after read (input dependence).
        const RAR = 0b1000;
    }
}

/// How an access uses the referenced memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    /// A read.
    Use,
    /// A write.
    Def,
    /// Unknown usage, treated as both.
    Unknown,
}

/// The shape of the accessed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A scalar variable.
    Scalar,
    /// An array or vector element.
    Array,
    /// A record member.
    Member,
}

/// One memory access of a statement.
#[derive(Debug, Clone)]
pub struct AccessInfo {
    /// The address of the access expression.
    pub expr: NodeAddress,
    /// The accessed base variable.
    pub base: NodeId,
    /// Whether the access reads or writes.
    pub usage: UsageKind,
    /// The shape of the accessed reference.
    pub ref_kind: RefKind,
    /// One affine function per accessed dimension.
    pub access: AffineSystem,
    /// A restriction of the statement domain this access is live on.
    pub domain: Option<IterationDomain>,
}

impl AccessInfo {
    /// A copy rebased onto a wider iteration vector.
    #[must_use]
    pub fn rebased(&self, iv: &IterationVector) -> Self {
        Self {
            expr: self.expr.clone(),
            base: self.base,
            usage: self.usage,
            ref_kind: self.ref_kind,
            access: AffineSystem::rebased(iv.clone(), &self.access),
            domain: self
                .domain
                .as_ref()
                .map(|d| IterationDomain::rebased(iv.clone(), d)),
        }
    }
}

/// One statement of a SCoP.
#[derive(Debug, Clone)]
pub struct Stmt {
    /// The statement number in program order.
    pub id: usize,
    /// The address of the statement in the program.
    pub addr: NodeAddress,
    /// The integer points this statement executes on.
    pub domain: IterationDomain,
    schedule: AffineSystem,
    /// The statement's memory accesses.
    pub accesses: Vec<AccessInfo>,
}

impl Stmt {
    /// Creates a statement.
    #[must_use]
    pub fn new(
        id: usize,
        addr: NodeAddress,
        domain: IterationDomain,
        schedule: AffineSystem,
        accesses: Vec<AccessInfo>,
    ) -> Self {
        Self {
            id,
            addr,
            domain,
            schedule,
            accesses,
        }
    }

    /// A copy rebased onto a wider iteration vector, with a new id.
    #[must_use]
    pub fn rebased(iv: &IterationVector, id: usize, other: &Self) -> Self {
        Self {
            id,
            addr: other.addr.clone(),
            domain: IterationDomain::rebased(iv.clone(), &other.domain),
            schedule: AffineSystem::rebased(iv.clone(), &other.schedule),
            accesses: other.accesses.iter().map(|a| a.rebased(iv)).collect(),
        }
    }

    /// The scattering of this statement.
    #[must_use]
    pub const fn schedule(&self) -> &AffineSystem {
        &self.schedule
    }

    /// Mutable access to the scattering.
    #[must_use]
    pub fn schedule_mut(&mut self) -> &mut AffineSystem {
        &mut self.schedule
    }

    /// The number of scattering rows.
    #[must_use]
    pub fn sched_dim(&self) -> usize {
        self.schedule.size()
    }

    /// The iterators this statement loops over, outermost first.
    #[must_use]
    pub fn loop_nest(&self) -> Vec<NodeId> {
        let iv = self.domain.iteration_vector();
        let mut nest = Vec::new();
        for row in self.schedule.iter() {
            for (pos, &iter) in iv.iterators().iter().enumerate() {
                if row.coeff(pos) != 0 && !nest.contains(&iter) {
                    nest.push(iter);
                }
            }
        }
        nest
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "S{}: {} ({} accesses)",
            self.id,
            self.domain,
            self.accesses.len()
        )
    }
}

/// A static control part: an iteration vector, its statements and the
/// common schedule dimensionality.
#[derive(Debug, Clone)]
pub struct Scop {
    iter_vec: IterationVector,
    stmts: Vec<Stmt>,
    sched_dim: usize,
}

impl Scop {
    /// Creates an empty SCoP over the given vector.
    #[must_use]
    pub const fn new(iter_vec: IterationVector) -> Self {
        Self {
            iter_vec,
            stmts: Vec::new(),
            sched_dim: 0,
        }
    }

    /// The shared iteration vector.
    #[must_use]
    pub const fn iteration_vector(&self) -> &IterationVector {
        &self.iter_vec
    }

    /// Appends a statement, rebasing its domain, schedule and accesses onto
    /// this SCoP's vector and assigning the next id.
    ///
    /// # Panics
    /// Panics if the statement's vector is not covered by this SCoP's.
    pub fn push_back(&mut self, stmt: &Stmt) {
        let rebased = Stmt::rebased(&self.iter_vec, self.stmts.len(), stmt);
        self.sched_dim = self.sched_dim.max(rebased.sched_dim());
        self.stmts.push(rebased);
    }

    /// The statements in program order.
    #[must_use]
    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    /// Mutable access to the statements.
    #[must_use]
    pub fn stmts_mut(&mut self) -> &mut [Stmt] {
        &mut self.stmts
    }

    /// The number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// Checks whether the SCoP holds no statement.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// The schedule dimensionality: the maximum over all statements, with
    /// shorter schedules zero-padded.
    #[must_use]
    pub fn sched_dim(&self) -> usize {
        self.stmts
            .iter()
            .map(Stmt::sched_dim)
            .max()
            .unwrap_or(self.sched_dim)
            .max(self.sched_dim)
    }

    /// The deepest loop nest of any statement.
    #[must_use]
    pub fn nesting_level(&self) -> usize {
        self.stmts
            .iter()
            .map(|s| s.loop_nest().len())
            .max()
            .unwrap_or(0)
    }

    /// The tuple name of a statement inside the integer-set engine.
    fn tuple_of(stmt: &Stmt) -> String {
        format!("S{}", stmt.id)
    }

    /// The union of all statement domains as a set.
    #[must_use]
    pub fn domain_set(&self, ctx: &Context) -> pres::Set {
        let mut result: Option<pres::Set> = None;
        for stmt in &self.stmts {
            let set = pres::Set::from_domain(ctx, &stmt.domain, Some(&Self::tuple_of(stmt)));
            result = Some(match result {
                Some(acc) => acc.union(&set),
                None => set,
            });
        }
        result.unwrap_or_else(|| {
            pres::Set::empty(ctx, pres::Space::new(Vec::new(), Vec::new()))
        })
    }

    /// The union of all statement schedules as a relation, zero-padded to
    /// the common dimensionality.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when maps over different spaces cannot be
    /// combined.
    pub fn schedule_map(&self, ctx: &Context) -> Result<pres::Map, ModelingError> {
        let dim = self.sched_dim();
        let mut result: Option<pres::Map> = None;
        for stmt in &self.stmts {
            let mut padded = stmt.schedule.clone();
            while padded.size() < dim {
                padded.append_coeffs(vec![0; self.iter_vec.size()]);
            }
            let map =
                pres::Map::from_system(ctx, &padded, Some(&Self::tuple_of(stmt)), None);
            result = Some(match result {
                Some(acc) => acc.union(&map)?,
                None => map,
            });
        }
        result.ok_or_else(|| ModelingError::new("schedule of an empty region"))
    }

    /// The access relations of the requested usage.
    fn access_map(
        &self,
        ctx: &Context,
        mgr: &NodeManager,
        usage: UsageKind,
    ) -> Result<pres::Map, ModelingError> {
        let mut result = pres::Map::empty(ctx);
        for stmt in &self.stmts {
            for access in &stmt.accesses {
                let selected = access.usage == usage
                    || access.usage == UsageKind::Unknown
                    || usage == UsageKind::Unknown;
                if !selected {
                    continue;
                }
                let array = match mgr.node(access.base) {
                    Node::Variable { id, .. } => format!("m{id}"),
                    _ => "m_ext".to_owned(),
                };
                let map = pres::Map::from_system(
                    ctx,
                    &access.access,
                    Some(&Self::tuple_of(stmt)),
                    Some(&array),
                );
                result = result.union(&map)?;
            }
        }
        Ok(result)
    }

    /// Computes the union of the dependence relations of the given kinds.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when instances cannot be enumerated within
    /// the modeled fragment.
    pub fn compute_deps(
        &self,
        ctx: &Context,
        mgr: &NodeManager,
        kinds: DepKind,
    ) -> Result<pres::Map, ModelingError> {
        let domain = self.domain_set(ctx);
        let schedule = self.schedule_map(ctx)?;
        let reads = self.access_map(ctx, mgr, UsageKind::Use)?;
        let writes = self.access_map(ctx, mgr, UsageKind::Def)?;

        let mut result = pres::Map::empty(ctx);
        let combos: [(DepKind, &pres::Map, &pres::Map); 4] = [
            (DepKind::RAW, &reads, &writes),
            (DepKind::WAR, &writes, &reads),
            (DepKind::WAW, &writes, &writes),
            (DepKind::RAR, &reads, &reads),
        ];
        for (kind, sinks, sources) in combos {
            if !kinds.contains(kind) {
                continue;
            }
            let info = pres::compute_flow(&domain, &schedule, sinks, sources, None)?;
            result = result.union(&info.must_dep)?;
        }
        Ok(result)
    }

    /// Checks whether the outermost schedule dimension carries no
    /// dependence, i.e. its iterations may run in parallel.
    ///
    /// Failure to prove the property yields `false`, the conservative
    /// answer.
    #[must_use]
    pub fn is_parallel(&self, ctx: &Context, mgr: &NodeManager) -> bool {
        let Ok(deps) = self.compute_deps(ctx, mgr, DepKind::RAW | DepKind::WAR | DepKind::WAW)
        else {
            return false;
        };
        let Ok(schedule) = self.schedule_map(ctx) else {
            return false;
        };
        let Ok(pairs) = deps.pairs() else {
            return false;
        };
        pairs.iter().all(|(src, snk)| {
            let (Ok(from), Ok(to)) = (schedule.image_of(src), schedule.image_of(snk)) else {
                return false;
            };
            from.coords.first() == to.coords.first()
        })
    }

    /// Lowers the SCoP back to IR through the facade's code generator.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when the schedule falls outside the
    /// generatable fragment.
    ///
    /// # Panics
    /// Panics when the emitted IR fails the semantic checker, which
    /// indicates a transformation produced ill-formed code.
    pub fn to_ir(&self, mgr: &mut NodeManager) -> Result<NodeId, ModelingError> {
        let stmts: Vec<CodegenStmt> = self
            .stmts
            .iter()
            .map(|stmt| CodegenStmt {
                id: stmt.id,
                domain: stmt.domain.clone(),
                schedule: stmt.schedule.clone(),
                body: stmt.addr.resolve(mgr),
            })
            .collect();
        let generated = pres::codegen::to_ir(mgr, &stmts)?;

        let errors: Vec<_> = check::check(mgr, generated)
            .into_iter()
            .filter(|m| m.severity == Severity::Error)
            .collect();
        assert!(
            errors.is_empty(),
            "generated loop nest is ill-formed: {}",
            errors.iter().map(ToString::to_string).join("; ")
        );
        Ok(generated)
    }

    /// Re-schedules the SCoP for outer parallelism and lowers the result.
    ///
    /// The optimizer tries the schedules reachable by loop interchange and
    /// keeps the first one whose outermost dimension carries no dependence;
    /// without such a schedule the original is re-emitted unchanged.
    ///
    /// # Errors
    /// Returns [`ModelingError`] when no candidate schedule can be lowered.
    pub fn optimize_schedule(
        &self,
        ctx: &Context,
        mgr: &mut NodeManager,
    ) -> Result<NodeId, ModelingError> {
        if self.is_parallel(ctx, mgr) {
            return self.to_ir(mgr);
        }
        let dims = self.sched_dim();
        for (a, b) in (0..dims).tuple_combinations() {
            let candidate = transform::interchange(self, a, b);
            if candidate.is_parallel(ctx, mgr) {
                return candidate.to_ir(mgr);
            }
        }
        self.to_ir(mgr)
    }
}

impl Display for Scop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "SCoP over {} ({} stmts)", self.iter_vec, self.stmts.len())?;
        for stmt in &self.stmts {
            writeln!(f, "  {stmt}")?;
        }
        Ok(())
    }
}

/// Builds a SCoP over the merged vector of a set of statements.
#[must_use]
pub fn scop_of(parts: &[Stmt]) -> Scop {
    let iv = parts.iter().fold(IterationVector::new(), |acc, stmt| {
        merge(&acc, stmt.domain.iteration_vector())
    });
    let mut scop = Scop::new(iv);
    for stmt in parts {
        scop.push_back(stmt);
    }
    scop
}
