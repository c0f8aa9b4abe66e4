//! SCoP extraction: marking maximal affine regions in the IR.
//!
//! Extraction visits the program bottom-up, keeping the iteration vector of
//! the enclosing loops while descending. A region qualifies as a SCoP when
//! its loop bounds and steps are affine, every memory access is expressible
//! as an affine system and no statement carries unmodelable side effects.
//! A failed sub-region is abandoned conservatively (the not-affine case is
//! caught, never propagated); qualifying sub-regions of a failed parent are
//! recorded as maximal regions of their own.

use crate::affine::{
    AffineConstraint, AffineFunction, AffineSystem, Combiner, Element, IterationDomain,
    IterationVector, Relation, merge,
};
use crate::ir::annotations::AnnotationStore;
use crate::ir::lang::{Basic, Op};
use crate::ir::{Node, NodeAddress, NodeId, NodeManager};
use crate::pres::{Context, Set};

use super::{AccessInfo, RefKind, Scop, Stmt, UsageKind, scop_of};

/// The outcome of extraction: the annotated regions of one program.
#[derive(Debug)]
pub struct ScopRegistry {
    store: AnnotationStore<Scop>,
    maximal: Vec<NodeAddress>,
}

impl ScopRegistry {
    /// The addresses of all maximal SCoPs, in program order.
    #[must_use]
    pub fn scops(&self) -> &[NodeAddress] {
        &self.maximal
    }

    /// The model attached to a region root, if the node was marked.
    #[must_use]
    pub fn scop_of(&self, node: NodeId) -> Option<&Scop> {
        self.store.get(node)
    }

    /// The innermost enclosing marked region of an address.
    #[must_use]
    pub fn enclosing(&self, mgr: &NodeManager, addr: &NodeAddress) -> Option<NodeAddress> {
        let mut current = Some(addr.clone());
        while let Some(candidate) = current {
            if self.store.contains(candidate.resolve(mgr)) {
                return Some(candidate);
            }
            current = candidate.parent();
        }
        None
    }
}

/// Extracts and annotates all maximal SCoPs beneath `root`.
#[must_use]
pub fn extract(mgr: &NodeManager, basic: &Basic, root: NodeId) -> ScopRegistry {
    let mut extractor = Extractor {
        mgr,
        basic,
        registry: ScopRegistry {
            store: AnnotationStore::new(),
            maximal: Vec::new(),
        },
    };
    let top = extractor.visit(&NodeAddress::new(root), &IterationVector::new());
    if let Some(scop) = top {
        extractor.register(NodeAddress::new(root), scop);
    }
    extractor.registry
}

/// The domain of a variable at an expression: the enclosing region's
/// constraints intersected from the statement outward, projected onto the
/// iterators free in the target expression.
///
/// Yields `None` outside any annotated region.
#[must_use]
pub fn get_variable_domain(
    mgr: &NodeManager,
    ctx: &Context,
    registry: &ScopRegistry,
    expr: &NodeAddress,
) -> Option<(NodeAddress, Set)> {
    let region = registry.enclosing(mgr, expr)?;
    let scop = registry.scop_of(region.resolve(mgr))?;

    // the statement containing the expression
    let stmt = scop
        .stmts()
        .iter()
        .find(|stmt| stmt.addr.is_prefix_of(expr) || expr.is_prefix_of(&stmt.addr))?;

    // iterators occurring freely in the target expression
    let iv = stmt.domain.iteration_vector();
    let mut free = Vec::new();
    collect_variables(mgr, expr.resolve(mgr), &mut free);
    let keep: Vec<usize> = iv
        .iterators()
        .iter()
        .enumerate()
        .filter(|(_, var)| free.contains(var))
        .map(|(pos, _)| pos)
        .collect();

    let set = Set::from_domain(ctx, &stmt.domain, None);
    Some((region, set.project_onto(&keep)))
}

fn collect_variables(mgr: &NodeManager, node: NodeId, into: &mut Vec<NodeId>) {
    if matches!(mgr.node(node), Node::Variable { .. }) {
        if !into.contains(&node) {
            into.push(node);
        }
        return;
    }
    for child in mgr.node(node).children() {
        collect_variables(mgr, child, into);
    }
}

struct Extractor<'m> {
    mgr: &'m NodeManager,
    basic: &'m Basic,
    registry: ScopRegistry,
}

impl Extractor<'_> {
    fn register(&mut self, addr: NodeAddress, scop: Scop) {
        let node = addr.resolve(self.mgr);
        if !self.registry.store.contains(node) {
            self.registry.store.attach(node, scop);
            self.registry.maximal.push(addr);
        }
    }

    /// Extracts the region of one statement; `None` marks a non-affine
    /// boundary. Qualifying children of failed nodes are registered.
    fn visit(&mut self, addr: &NodeAddress, enclosing: &IterationVector) -> Option<Scop> {
        match addr.node(self.mgr).clone() {
            Node::Compound { stmts } => {
                let children: Vec<(NodeAddress, Option<Scop>)> = (0..stmts.len())
                    .map(|idx| {
                        let child = addr.child(idx);
                        let region = self.visit(&child, enclosing);
                        (child, region)
                    })
                    .collect();
                if children.iter().all(|(_, region)| region.is_some()) {
                    // a sequence of affine regions: order by a constant row;
                    // a single child needs no ordering dimension
                    let single = children.len() == 1;
                    let mut parts = Vec::new();
                    for (ordinal, (_, region)) in children.into_iter().enumerate() {
                        let region = region.expect("checked above");
                        for stmt in region.stmts() {
                            let mut stmt = stmt.clone();
                            if !single {
                                let iv = stmt.domain.iteration_vector().clone();
                                let order = AffineFunction::constant(
                                    &iv,
                                    i64::try_from(ordinal).expect("ordinal overflow"),
                                );
                                stmt.schedule_mut().insert(0, order);
                            }
                            parts.push(stmt);
                        }
                    }
                    return Some(scop_of(&parts));
                }
                // some child failed: keep the qualifying ones as maximal
                for (child, region) in children {
                    if let Some(scop) = region {
                        self.register(child, scop);
                    }
                }
                None
            }
            Node::For { iter, step, .. } => {
                let mut iv = enclosing.clone();
                iv.add_iterator(iter);

                // loop bounds must be affine, the step a positive constant
                let bounds = self.loop_bounds(addr, &mut iv);
                let step_value = self.mgr.int_value(step).filter(|&s| s > 0);
                let body_addr = addr.child(4);
                let body_region = self.visit(&body_addr, &iv);

                match (bounds, step_value, body_region) {
                    (Some((start, end)), Some(step_value), Some(body_region)) => {
                        Some(self.wrap_loop(iter, &iv, start, end, step_value, &body_region))
                    }
                    (_, _, body_region) => {
                        if let Some(region) = body_region {
                            self.register(body_addr, region);
                        }
                        None
                    }
                }
            }
            Node::Decl { .. } => self.leaf(addr, enclosing),
            Node::Call { .. } => self.leaf(addr, enclosing),
            Node::If { .. } | Node::While { .. } | Node::Switch { .. } => {
                // not modeled: search the children for nested regions
                let arity = addr.node(self.mgr).children().len();
                for idx in 0..arity {
                    let child = addr.child(idx);
                    if let Some(region) = self.visit(&child, enclosing) {
                        self.register(child, region);
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// The affine start and end expressions of a counted loop.
    fn loop_bounds(
        &self,
        addr: &NodeAddress,
        iv: &mut IterationVector,
    ) -> Option<(AffineFunction, AffineFunction)> {
        let Node::For { start, end, .. } = addr.node(self.mgr) else {
            return None;
        };
        let start = AffineFunction::from_expr(self.mgr, self.basic, iv, *start).ok()?;
        let end = AffineFunction::from_expr(self.mgr, self.basic, iv, *end).ok()?;
        Some((start, end))
    }

    /// Wraps a body region into the loop's domain and schedule.
    fn wrap_loop(
        &self,
        iter: NodeId,
        loop_iv: &IterationVector,
        start: AffineFunction,
        end: AffineFunction,
        step: i64,
        body: &Scop,
    ) -> Scop {
        let iv = merge(loop_iv, body.iteration_vector());
        let start = start.widened_to(&iv);
        let end = end.widened_to(&iv);
        let selector = AffineFunction::selecting(&iv, &Element::Iterator(iter));

        // start ≤ i  and  i ≤ end − 1
        let mut lower = AffineFunction::constant(&iv, 0);
        let mut upper = AffineFunction::constant(&iv, 0);
        for pos in 0..iv.size() {
            lower.set_coeff(pos, selector.coeff(pos) - start.coeff(pos));
            upper.set_coeff(pos, end.coeff(pos) - selector.coeff(pos));
        }
        let upper = upper.plus(-1);
        let mut constraint = Combiner::atom(AffineConstraint::new(lower, Relation::Ge));
        constraint = constraint.and(Combiner::atom(AffineConstraint::new(upper, Relation::Ge)));
        if step > 1 {
            // (i − start) mod step = 0
            let mut stride = selector.clone();
            for pos in 0..iv.size() {
                stride.set_coeff(pos, selector.coeff(pos) - start.coeff(pos));
            }
            constraint = constraint.and(Combiner::atom(AffineConstraint::new(
                stride,
                Relation::ModEq(step),
            )));
        }
        let loop_domain = IterationDomain::new(iv.clone(), constraint);

        let mut result = Scop::new(iv.clone());
        for stmt in body.stmts() {
            let mut stmt = Stmt::rebased(&iv, stmt.id, stmt);
            stmt.domain = stmt.domain.intersect(&loop_domain);
            stmt.schedule_mut()
                .insert(0, AffineFunction::selecting(&iv, &Element::Iterator(iter)));
            result.push_back(&stmt);
        }
        result
    }

    /// Extracts a single-statement region from a plain statement.
    fn leaf(&mut self, addr: &NodeAddress, enclosing: &IterationVector) -> Option<Scop> {
        let mut iv = enclosing.clone();
        let accesses = self.accesses_of(addr, &mut iv)?;
        let stmt = Stmt::new(
            0,
            addr.clone(),
            IterationDomain::universe(iv.clone()),
            AffineSystem::new(iv.clone()),
            accesses,
        );
        let mut scop = Scop::new(iv);
        scop.push_back(&stmt);
        Some(scop)
    }

    /// Collects the memory accesses of a statement; `None` when an access
    /// or side effect cannot be modeled.
    fn accesses_of(
        &self,
        addr: &NodeAddress,
        iv: &mut IterationVector,
    ) -> Option<Vec<AccessInfo>> {
        let mut accesses = Vec::new();
        if self.scan(addr, iv, &mut accesses) {
            Some(accesses)
        } else {
            None
        }
    }

    fn scan(
        &self,
        addr: &NodeAddress,
        iv: &mut IterationVector,
        accesses: &mut Vec<AccessInfo>,
    ) -> bool {
        match addr.node(self.mgr).clone() {
            Node::Call { callee, args, .. } => match self.basic.op_of(self.mgr, callee) {
                Some(Op::RefAssign) => {
                    // the written reference plus the read right-hand side
                    self.access(&addr.child(1), iv, UsageKind::Def, accesses)
                        && self.scan(&addr.child(2), iv, accesses)
                }
                Some(Op::RefDeref) => {
                    self.access(&addr.child(1), iv, UsageKind::Use, accesses)
                }
                Some(Op::ArraySubscript) => {
                    // a bare subscript produces a reference of unknown use
                    self.access(addr, iv, UsageKind::Unknown, accesses)
                }
                Some(op) if op.is_arithmetic() || op.is_comparison() => (1..=args.len())
                    .all(|idx| self.scan(&addr.child(idx), iv, accesses)),
                Some(Op::IntMin | Op::IntMax) => (1..=args.len())
                    .all(|idx| self.scan(&addr.child(idx), iv, accesses)),
                // any other call may have side effects the model misses
                _ => false,
            },
            Node::Decl { .. } => self.scan(&addr.child(1), iv, accesses),
            Node::Variable { .. } | Node::Literal { .. } => true,
            _ => false,
        }
    }

    /// Models one reference expression as an access.
    fn access(
        &self,
        addr: &NodeAddress,
        iv: &mut IterationVector,
        usage: UsageKind,
        accesses: &mut Vec<AccessInfo>,
    ) -> bool {
        let Some((base, indices, ref_kind)) = self.reference_chain(addr.resolve(self.mgr))
        else {
            return false;
        };
        let mut system = AffineSystem::new(iv.clone());
        for index in indices {
            let Ok(row) = AffineFunction::from_expr(self.mgr, self.basic, iv, index) else {
                return false;
            };
            // the vector may have grown while parsing the index
            system = AffineSystem::rebased(iv.clone(), &system);
            system.append(row.widened_to(iv));
        }
        accesses.push(AccessInfo {
            expr: addr.clone(),
            base,
            usage,
            ref_kind,
            access: system,
            domain: None,
        });
        true
    }

    /// Decomposes a reference expression into base variable and index
    /// expressions, outermost dimension first.
    fn reference_chain(&self, expr: NodeId) -> Option<(NodeId, Vec<NodeId>, RefKind)> {
        match self.mgr.node(expr).clone() {
            Node::Variable { .. } => Some((expr, Vec::new(), RefKind::Scalar)),
            Node::Call { callee, args, .. } => match self.basic.op_of(self.mgr, callee) {
                Some(Op::ArraySubscript) => {
                    let (base, mut indices, _) = self.reference_chain(args[0])?;
                    indices.push(args[1]);
                    Some((base, indices, RefKind::Array))
                }
                // member accesses are not modeled by the affine layer
                Some(Op::CompositeMemberAccess) => None,
                _ => None,
            },
            _ => None,
        }
    }
}
