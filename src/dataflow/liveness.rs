//! Live-variable analysis, the stock backward problem of the framework.

use std::collections::BTreeSet;

use crate::cfg::{BlockId, Cfg, Element, ElementKind};
use crate::ir::lang::{Basic, Op};
use crate::ir::{Node, NodeId, NodeManager};

use super::{Direction, Problem};

/// The classic backward may-analysis: a variable is live at a point if some
/// path to the exit reads it before writing it.
#[derive(Debug)]
pub struct LiveVariables<'m> {
    mgr: &'m NodeManager,
    basic: Basic,
}

impl<'m> LiveVariables<'m> {
    /// Creates the analysis over the given program.
    #[must_use]
    pub fn new(mgr: &'m NodeManager, basic: Basic) -> Self {
        Self { mgr, basic }
    }

    /// The variable defined by a statement, if any.
    fn def_of(&self, stmt: NodeId) -> Option<NodeId> {
        match self.mgr.node(stmt) {
            Node::Decl { var, .. } => Some(*var),
            Node::Call { callee, args, .. }
                if self.basic.is_op(self.mgr, *callee, Op::RefAssign) =>
            {
                match args.first() {
                    Some(&target) if matches!(self.mgr.node(target), Node::Variable { .. }) => {
                        Some(target)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// All variables read by a statement (excluding its definition target).
    fn uses_of(&self, stmt: NodeId) -> BTreeSet<NodeId> {
        let mut uses = BTreeSet::new();
        let roots: Vec<NodeId> = match self.mgr.node(stmt) {
            Node::Decl { init, .. } => vec![*init],
            Node::Call { callee, args, .. }
                if self.basic.is_op(self.mgr, *callee, Op::RefAssign) =>
            {
                args.iter().skip(1).copied().collect()
            }
            _ => vec![stmt],
        };
        for root in roots {
            collect_variables(self.mgr, root, &mut uses);
        }
        uses
    }
}

fn collect_variables(mgr: &NodeManager, node: NodeId, into: &mut BTreeSet<NodeId>) {
    if matches!(mgr.node(node), Node::Variable { .. }) {
        into.insert(node);
        return;
    }
    for child in mgr.node(node).children() {
        collect_variables(mgr, child, into);
    }
}

impl Problem for LiveVariables<'_> {
    type Fact = BTreeSet<NodeId>;

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn boundary_fact(&self) -> Self::Fact {
        BTreeSet::new()
    }

    fn init_fact(&self) -> Self::Fact {
        BTreeSet::new()
    }

    fn join(&self, lhs: &Self::Fact, rhs: &Self::Fact) -> Self::Fact {
        lhs.union(rhs).copied().collect()
    }

    fn transfer(&self, cfg: &Cfg, block: BlockId, input: &Self::Fact) -> Self::Fact {
        // live-in = (live-out ∖ kill) ∪ gen, statements in reverse order
        let mut live = input.clone();
        for element in cfg.block(block).elements.iter().rev() {
            self.apply_element(element, &mut live);
        }
        live
    }
}

impl LiveVariables<'_> {
    fn apply_element(&self, element: &Element, live: &mut BTreeSet<NodeId>) {
        match element.kind {
            ElementKind::LoopInit => {
                // the iterator is defined from the start expression
                if let Node::For { iter, start, .. } = element.stmt.node(self.mgr) {
                    live.remove(iter);
                    collect_variables(self.mgr, *start, live);
                }
            }
            ElementKind::LoopIncrement => {
                // the iterator is both defined and read by its increment
                let step = element.stmt.resolve(self.mgr);
                let parent = element.stmt.parent().expect("increment has a loop parent");
                if let Node::For { iter, .. } = parent.node(self.mgr) {
                    live.insert(*iter);
                }
                collect_variables(self.mgr, step, live);
            }
            ElementKind::CtrlCond => {
                let cond = element.stmt.resolve(self.mgr);
                collect_variables(self.mgr, cond, live);
                // a counted loop's condition also reads the iterator
                if let Some(parent) = element.stmt.parent() {
                    if let Node::For { iter, .. } = parent.node(self.mgr) {
                        live.insert(*iter);
                    }
                }
            }
            ElementKind::None => {
                let stmt = element.stmt.resolve(self.mgr);
                if let Some(defined) = self.def_of(stmt) {
                    live.remove(&defined);
                }
                live.extend(self.uses_of(stmt));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CreationPolicy;
    use crate::dataflow::solve;
    use crate::ir::Builder;

    #[test]
    fn loop_keeps_accumulator_alive() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let int = basic.int;
        let ref_int = b.ref_ty(int);

        // decl a = 0; for i in [0,10) { a := a + i }; decl c = a
        let a = b.variable(ref_int, 1);
        let zero = b.int_lit(0);
        let decl_a = b.decl(a, zero);

        let i = b.variable(int, 2);
        let ten = b.int_lit(10);
        let one = b.int_lit(1);
        let load = b.deref(a);
        let sum = b.add(load, i);
        let store = b.assign(a, sum);
        let body = b.compound(vec![store]);
        let for_loop = b.for_stmt(i, zero, ten, one, body);

        let read = b.deref(a);
        let c = b.variable(int, 3);
        let tail = b.decl(c, read);
        let root = b.compound(vec![decl_a, for_loop, tail]);

        let cfg = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);
        let problem = LiveVariables::new(&mgr, basic);
        let results = solve(&problem, &cfg);

        // inside the loop body, `a` is live (read by the store and the tail)
        let store_block = cfg
            .blocks()
            .find(|&id| {
                cfg.block(id)
                    .elements
                    .iter()
                    .any(|e| e.stmt.resolve(&mgr) == store)
            })
            .expect("store block exists");
        assert!(results.inputs[&store_block].contains(&a));

        // after the tail declaration nothing is live
        assert!(results.inputs[&cfg.exit()].is_empty());
    }

    #[test]
    fn convergence_within_the_theoretical_bound() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let int = basic.int;
        let x = b.variable(int, 1);
        let zero = b.int_lit(0);
        let cond = b.cmp(crate::ir::lang::Op::IntLt, x, zero);
        let t = b.compound(vec![]);
        let e = b.compound(vec![]);
        let branch = b.if_stmt(cond, t, e);

        let i = b.variable(int, 2);
        let ten = b.int_lit(10);
        let one = b.int_lit(1);
        let body = b.compound(vec![]);
        let for_loop = b.for_stmt(i, zero, ten, one, body);
        let root = b.compound(vec![branch, for_loop]);

        let cfg = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);
        let problem = LiveVariables::new(&mgr, basic);
        let results = solve(&problem, &cfg);

        // the variable count bounds the lattice height
        let height = 3;
        assert!(results.iterations <= cfg.len() * (height + 2));
    }
}
