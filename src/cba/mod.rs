//! The constraint-based analysis (CBA) framework.
//!
//! Each analysis is a constraint generator: asked for the value of an IR
//! address in a calling context, it emits the constraints defining that
//! value. Generators feed the lazy solver, so only the constraints reachable
//! from a query are ever instantiated. Analyses share one [`Cba`] instance
//! per program, which owns the value registry, the call-site manager and the
//! artificial unknown-external entities.

pub mod call_site;
pub mod context;
pub mod data_paths;
pub mod entities;
pub mod references;
pub mod thread_bodies;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::data::DataPath;
use crate::ir::lang::Basic;
use crate::ir::{Builder, Node, NodeAddress, NodeId, NodeManager, visit};
use crate::lattice::SetLattice;
use crate::solver::{Assignment, Constraints, LazySolver, TypedValueId, ValueId};

pub use self::call_site::{CallSiteManager, Callable};

use self::context::CallString;
use self::entities::{Location, Reference};

/// The analyses hosted by the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Analysis {
    /// Which references an expression may evaluate to.
    References,
    /// Which data paths a path expression may denote.
    DataPaths,
    /// Which job bodies a thread expression may spawn.
    ThreadBodies,
}

type Key = (Analysis, NodeAddress, CallString);

#[derive(Debug, Default)]
struct Registry {
    next: u32,
    by_key: HashMap<Key, ValueId>,
    by_id: HashMap<ValueId, Key>,
}

impl Registry {
    fn var(&mut self, key: Key) -> ValueId {
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        let id = ValueId::new(self.next);
        self.next += 1;
        self.by_key.insert(key.clone(), id);
        self.by_id.insert(id, key);
        id
    }

    fn key_of(&self, id: ValueId) -> Option<Key> {
        self.by_id.get(&id).cloned()
    }
}

/// The per-program analysis instance.
///
/// Owns all mutable analysis state; one instance is driven by one thread
/// and shared with nothing else.
#[derive(Debug)]
pub struct Cba<'m> {
    mgr: &'m NodeManager,
    basic: Basic,
    root: NodeId,
    registry: Rc<RefCell<Registry>>,
    call_sites: CallSiteManager,
    /// variable node → address of its initializing expression
    bindings: HashMap<NodeId, NodeAddress>,
    /// parameter variable → (lambda node, parameter index)
    params: HashMap<NodeId, (NodeId, usize)>,
    /// the artificial references seeding "anything external may alias"
    unknown_references: BTreeSet<Reference>,
}

impl<'m> Cba<'m> {
    /// Creates the analysis instance for the program rooted at `root`.
    pub fn new(mgr: &'m mut NodeManager, root: NodeId) -> Self {
        let mut builder = Builder::new(mgr);
        let basic = builder.basic();
        let any_ref = basic.any_ref;
        let unknown_a = builder.literal(any_ref, "__unknown_ext_ref_a");
        let unknown_b = builder.literal(any_ref, "__unknown_ext_ref_b");
        let unknown_references = [unknown_a, unknown_b]
            .into_iter()
            .map(|lit| {
                Reference::to_location(Location::new(
                    NodeAddress::new(lit),
                    CallString::root(),
                ))
            })
            .collect();

        let mgr: &'m NodeManager = mgr;
        let call_sites = CallSiteManager::new(mgr, &basic, root);

        let mut bindings = HashMap::new();
        let mut params = HashMap::new();
        visit::preorder(mgr, &NodeAddress::new(root), &mut |addr| {
            match addr.node(mgr) {
                Node::Decl { var, .. } => {
                    bindings.insert(*var, addr.child(1));
                }
                Node::Lambda {
                    params: lambda_params,
                    ..
                } => {
                    let lambda = addr.resolve(mgr);
                    for (idx, &param) in lambda_params.iter().enumerate() {
                        params.insert(param, (lambda, idx));
                    }
                }
                _ => {}
            }
        });

        Self {
            mgr,
            basic,
            root,
            registry: Rc::new(RefCell::new(Registry::default())),
            call_sites,
            bindings,
            params,
            unknown_references,
        }
    }

    /// The analyzed program's root.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// The node manager of the analyzed program.
    #[must_use]
    pub const fn manager(&self) -> &'m NodeManager {
        self.mgr
    }

    /// The basic-operator catalog, threaded through the analysis context.
    #[must_use]
    pub const fn basic(&self) -> &Basic {
        &self.basic
    }

    /// The call-site manager of the program.
    #[must_use]
    pub const fn call_sites(&self) -> &CallSiteManager {
        &self.call_sites
    }

    /// The two artificial references modeling unknown external memory.
    #[must_use]
    pub const fn unknown_references(&self) -> &BTreeSet<Reference> {
        &self.unknown_references
    }

    /// The slot of an analysis value.
    #[must_use]
    pub fn var(&self, analysis: Analysis, addr: &NodeAddress, ctx: &CallString) -> ValueId {
        self.registry
            .borrow_mut()
            .var((analysis, addr.clone(), ctx.clone()))
    }

    /// The typed slot of a reference-analysis value.
    #[must_use]
    pub fn ref_var(
        &self,
        addr: &NodeAddress,
        ctx: &CallString,
    ) -> TypedValueId<SetLattice<Reference>> {
        TypedValueId::new(self.var(Analysis::References, addr, ctx))
    }

    /// The typed slot of a data-path-analysis value.
    #[must_use]
    pub fn path_var(
        &self,
        addr: &NodeAddress,
        ctx: &CallString,
    ) -> TypedValueId<SetLattice<DataPath>> {
        TypedValueId::new(self.var(Analysis::DataPaths, addr, ctx))
    }

    /// The typed slot of a thread-body-analysis value.
    #[must_use]
    pub fn body_var(
        &self,
        addr: &NodeAddress,
        ctx: &CallString,
    ) -> TypedValueId<SetLattice<NodeId>> {
        TypedValueId::new(self.var(Analysis::ThreadBodies, addr, ctx))
    }

    /// The address a variable use draws its value from: the initializer of
    /// its declaration, if statically bound.
    #[must_use]
    pub fn binding_of(&self, var: NodeId) -> Option<&NodeAddress> {
        self.bindings.get(&var)
    }

    /// The lambda and parameter position a variable is a parameter of.
    #[must_use]
    pub fn param_of(&self, var: NodeId) -> Option<(NodeId, usize)> {
        self.params.get(&var).copied()
    }

    /// Solves the reference analysis for one expression.
    #[must_use]
    pub fn references(&self, addr: &NodeAddress, ctx: &CallString) -> BTreeSet<Reference> {
        let target = self.ref_var(addr, ctx);
        let assignment = self.solve(target.into());
        assignment.get(&SetLattice::new(), target)
    }

    /// Solves the data-path analysis for one expression.
    #[must_use]
    pub fn data_paths(&self, addr: &NodeAddress, ctx: &CallString) -> BTreeSet<DataPath> {
        let target = self.path_var(addr, ctx);
        let assignment = self.solve(target.into());
        assignment.get(&SetLattice::new(), target)
    }

    /// Solves the thread-body analysis for one expression.
    #[must_use]
    pub fn thread_bodies(&self, addr: &NodeAddress, ctx: &CallString) -> BTreeSet<NodeId> {
        let target = self.body_var(addr, ctx);
        let assignment = self.solve(target.into());
        assignment.get(&SetLattice::new(), target)
    }

    /// Runs the lazy solver against the generator dispatch.
    fn solve(&self, target: ValueId) -> Assignment {
        let resolver = Box::new(|values: &BTreeSet<ValueId>| {
            let mut constraints = Constraints::new();
            for &value in values {
                let Some((analysis, addr, ctx)) = self.registry.borrow().key_of(value) else {
                    continue;
                };
                let generated = match analysis {
                    Analysis::References => references::constraints_for(self, &addr, &ctx),
                    Analysis::DataPaths => data_paths::constraints_for(self, &addr, &ctx),
                    Analysis::ThreadBodies => {
                        thread_bodies::constraints_for(self, &addr, &ctx)
                    }
                };
                constraints.add_all(&generated);
            }
            constraints
        });
        let mut solver = LazySolver::new(resolver, Assignment::new());
        solver.solve_for(target);
        let constraints = solver.constraints().iter().cloned().collect::<Vec<_>>();
        let assignment = std::mem::take(solver.assignment_mut());
        debug_assert!(constraints.iter().all(|c| c.check(&assignment)));
        assignment
    }
}
