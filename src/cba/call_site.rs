//! The call-site manager: linking call sites and callables.

use std::collections::{BTreeSet, HashMap};

use crate::ir::lang::Basic;
use crate::ir::{Node, NodeAddress, NodeId, NodeManager, Type, visit};

/// A callable entity a call site may dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Callable {
    /// A lambda defined within the program.
    Lambda(NodeId),
    /// A closure binding defined within the program.
    Bind(NodeId),
    /// An external function known only by its literal.
    External(NodeId),
}

impl Callable {
    /// The node backing this callable.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        match self {
            Callable::Lambda(id) | Callable::Bind(id) | Callable::External(id) => *id,
        }
    }
}

/// Enumerates, for every call site, the callables it may dispatch to, and
/// conversely for every callable its potential call sites.
///
/// Direct calls resolve statically; indirect calls follow local variable
/// bindings to literals and binds (with a fixpoint over recursive binding
/// groups); open calls through opaque functions resolve to every
/// syntactically compatible callable.
#[derive(Debug)]
pub struct CallSiteManager {
    call_sites: Vec<NodeAddress>,
    callees: HashMap<NodeAddress, Vec<Callable>>,
    callers: HashMap<Callable, Vec<NodeAddress>>,
}

impl CallSiteManager {
    /// Analyzes the program rooted at `root`.
    #[must_use]
    pub fn new(mgr: &NodeManager, basic: &Basic, root: NodeId) -> Self {
        let mut collector = Collector {
            mgr,
            basic,
            calls: Vec::new(),
            callables: Vec::new(),
            bindings: HashMap::new(),
        };
        visit::preorder(mgr, &NodeAddress::new(root), &mut |addr| {
            collector.collect(addr);
        });

        let mut callees: HashMap<NodeAddress, Vec<Callable>> = HashMap::new();
        let mut callers: HashMap<Callable, Vec<NodeAddress>> = HashMap::new();
        for call in &collector.calls {
            let Node::Call { callee, .. } = call.node(mgr) else {
                unreachable!("collected non-call address");
            };
            let mut visiting = BTreeSet::new();
            let targets = collector.resolve(*callee, &mut visiting);
            for &target in &targets {
                callers.entry(target).or_default().push(call.clone());
            }
            callees.insert(call.clone(), targets);
        }

        Self {
            call_sites: collector.calls,
            callees,
            callers,
        }
    }

    /// All call sites of the program, in program order.
    #[must_use]
    pub fn call_sites(&self) -> &[NodeAddress] {
        &self.call_sites
    }

    /// The possible callees of a call site.
    #[must_use]
    pub fn callees_of(&self, call: &NodeAddress) -> &[Callable] {
        self.callees.get(call).map_or(&[], Vec::as_slice)
    }

    /// The possible call sites of a callable.
    #[must_use]
    pub fn callers_of(&self, callable: Callable) -> &[NodeAddress] {
        self.callers.get(&callable).map_or(&[], Vec::as_slice)
    }
}

struct Collector<'m> {
    mgr: &'m NodeManager,
    basic: &'m Basic,
    calls: Vec<NodeAddress>,
    callables: Vec<Callable>,
    /// variable node → initializing expression
    bindings: HashMap<NodeId, NodeId>,
}

impl Collector<'_> {
    fn collect(&mut self, addr: &NodeAddress) {
        match addr.node(self.mgr) {
            Node::Call { callee, .. } => {
                // calls of primitive operators are not call sites
                if self.basic.op_of(self.mgr, *callee).is_none() {
                    self.calls.push(addr.clone());
                }
            }
            Node::Lambda { .. } => {
                let id = addr.resolve(self.mgr);
                if !self.callables.contains(&Callable::Lambda(id)) {
                    self.callables.push(Callable::Lambda(id));
                }
            }
            Node::Bind { .. } => {
                let id = addr.resolve(self.mgr);
                if !self.callables.contains(&Callable::Bind(id)) {
                    self.callables.push(Callable::Bind(id));
                }
            }
            Node::Literal { ty, value } => {
                if self.mgr.ty(*ty).is_fun()
                    && crate::ir::lang::Op::from_name(value).is_none()
                {
                    let id = addr.resolve(self.mgr);
                    if !self.callables.contains(&Callable::External(id)) {
                        self.callables.push(Callable::External(id));
                    }
                }
            }
            Node::Decl { var, init } => {
                self.bindings.insert(*var, *init);
            }
            _ => {}
        }
    }

    /// All callables the given expression may evaluate to.
    fn resolve(&self, expr: NodeId, visiting: &mut BTreeSet<NodeId>) -> Vec<Callable> {
        // cycles within recursive binding groups contribute nothing new
        if !visiting.insert(expr) {
            return Vec::new();
        }
        let result = match self.mgr.node(expr) {
            Node::Lambda { .. } => vec![Callable::Lambda(expr)],
            Node::Bind { .. } => vec![Callable::Bind(expr)],
            Node::Literal { ty, .. } if self.mgr.ty(*ty).is_fun() => {
                // an opaque function: the call is open
                self.open_targets(expr)
            }
            Node::Variable { .. } => match self.bindings.get(&expr) {
                Some(&init) => self.resolve(init, visiting),
                // unbound variables (parameters) may carry anything compatible
                None => self.open_targets(expr),
            },
            // a callee produced by another call is unresolvable statically
            Node::Call { .. } => self.open_targets(expr),
            _ => Vec::new(),
        };
        visiting.remove(&expr);
        result
    }

    /// Every syntactically compatible callable plus the opaque function
    /// itself, the over-approximation for open call sites.
    fn open_targets(&self, callee: NodeId) -> Vec<Callable> {
        let arity = self.arity_of(callee);
        let mut targets: Vec<Callable> = self
            .callables
            .iter()
            .copied()
            .filter(|c| arity.is_none() || self.arity_of(c.node()) == arity)
            .collect();
        if let Node::Literal { ty, .. } = self.mgr.node(callee) {
            if self.mgr.ty(*ty).is_fun() && !targets.contains(&Callable::External(callee)) {
                targets.push(Callable::External(callee));
            }
        }
        targets
    }

    fn arity_of(&self, expr: NodeId) -> Option<usize> {
        let ty = self.mgr.type_of(expr)?;
        match self.mgr.ty(ty) {
            Type::Fun { params, .. } => Some(params.len()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Builder;

    #[test]
    fn recursive_bindings_report_both_call_sites() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let int = basic.int;
        let fun_ty = b.fun_ty(vec![int], int);

        // let f = fun(x) { return f(x) }; f(3)
        let f = b.variable(fun_ty, 1);
        let x = b.variable(int, 2);
        let inner_call = b.call(int, f, vec![x]);
        let ret = b.ret(inner_call);
        let body = b.compound(vec![ret]);
        let lambda = b.lambda(vec![x], int, body);
        let decl = b.decl(f, lambda);

        let three = b.int_lit(3);
        let outer_call = b.call(int, f, vec![three]);
        let root = b.compound(vec![decl, outer_call]);

        let manager = CallSiteManager::new(&mgr, &basic, root);
        assert_eq!(manager.call_sites().len(), 2);

        let callers = manager.callers_of(Callable::Lambda(lambda));
        assert_eq!(callers.len(), 2);
        let resolved: Vec<NodeId> = callers.iter().map(|a| a.resolve(&mgr)).collect();
        assert!(resolved.contains(&outer_call));
        assert!(resolved.contains(&inner_call));
    }

    #[test]
    fn direct_and_open_calls() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let int = basic.int;
        let unit = b.basic().unit;
        let fun_ty = b.fun_ty(vec![int], unit);

        let p = b.variable(int, 1);
        let empty = b.compound(vec![]);
        let known = b.lambda(vec![p], unit, empty);
        let five = b.int_lit(5);
        let direct = b.call(unit, known, vec![five]);

        let opaque = b.literal(fun_ty, "extern_fn");
        let seven = b.int_lit(7);
        let open = b.call(unit, opaque, vec![seven]);

        let root = b.compound(vec![direct, open]);
        let manager = CallSiteManager::new(&mgr, &basic, root);

        let direct_addr = manager
            .call_sites()
            .iter()
            .find(|a| a.resolve(&mgr) == direct)
            .expect("direct call collected");
        assert_eq!(
            manager.callees_of(direct_addr),
            &[Callable::Lambda(known)]
        );

        let open_addr = manager
            .call_sites()
            .iter()
            .find(|a| a.resolve(&mgr) == open)
            .expect("open call collected");
        let targets = manager.callees_of(open_addr);
        // the compatible lambda and the opaque function itself
        assert!(targets.contains(&Callable::Lambda(known)));
        assert!(targets.contains(&Callable::External(opaque)));
    }
}
