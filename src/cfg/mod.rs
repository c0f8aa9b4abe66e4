//! The explicit control-flow graph.
//!
//! Blocks hold ordered statement references and an optional terminator (the
//! control construct ending the block); edges may carry guard expressions.
//! The graph records one entry/exit pair per IR root (lambda bodies and the
//! program itself), so interprocedural edges connect call and return blocks
//! with the callee's sub-graph.

#[cfg(feature = "petgraph")]
pub mod petgraph;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ir::{Node, NodeAddress, NodeId, NodeManager};

/// Identifies a block within its [`Cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("B{_0}")]
#[repr(transparent)]
pub struct BlockId(u32);

/// The role of a block within the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// An ordinary block.
    Default,
    /// The entry block of a sub-graph.
    Entry,
    /// The exit block of a sub-graph.
    Exit,
    /// A block transferring control to a callee.
    Call,
    /// A block receiving control back from a callee.
    Ret,
}

/// The role of a statement element inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// A plain statement.
    None,
    /// The condition expression of a terminator.
    CtrlCond,
    /// The initialization of a counted loop.
    LoopInit,
    /// The increment of a counted loop.
    LoopIncrement,
}

/// One statement reference within a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// The referenced statement or expression.
    pub stmt: NodeAddress,
    /// The element's role.
    pub kind: ElementKind,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    /// The role of the block.
    pub kind: BlockKind,
    /// The ordered statement elements.
    pub elements: Vec<Element>,
    /// The control construct ending the block, if any.
    pub terminator: Option<NodeAddress>,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            elements: Vec::new(),
            terminator: None,
        }
    }

    /// Checks whether the block holds neither elements nor a terminator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.terminator.is_none()
    }
}

/// The guard of a conditional edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    /// The guarding expression.
    pub expr: NodeId,
    /// Whether the edge is taken when the expression is false.
    pub negated: bool,
}

/// An edge between two blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edge {
    /// The guard under which the edge is taken, if conditional.
    pub guard: Option<Guard>,
}

impl Edge {
    /// An unconditional edge.
    #[must_use]
    pub const fn unconditional() -> Self {
        Self { guard: None }
    }

    /// An edge taken when `expr` evaluates to `!negated`.
    #[must_use]
    pub const fn guarded(expr: NodeId, negated: bool) -> Self {
        Self {
            guard: Some(Guard { expr, negated }),
        }
    }
}

/// The block granularity of CFG construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPolicy {
    /// Every statement receives its own block.
    OneStmtPerBlock,
    /// Straight-line statement sequences share one block.
    MultiStmtPerBlock,
}

/// The per-root entry/exit pair of a sub-graph.
pub type GraphBounds = (BlockId, BlockId);

/// A control-flow graph over IR statements.
#[derive(Debug)]
pub struct Cfg {
    blocks: Vec<Block>,
    succs: BTreeMap<BlockId, BTreeMap<BlockId, Edge>>,
    preds: BTreeMap<BlockId, BTreeSet<BlockId>>,
    entry: BlockId,
    exit: BlockId,
    /// The sentinel target of calls whose callee is unknown.
    external: BlockId,
    sub_graphs: HashMap<NodeId, GraphBounds>,
}

impl Cfg {
    /// Builds the graph for the statement rooted at `root`.
    #[must_use]
    pub fn build(mgr: &NodeManager, root: NodeId, policy: CreationPolicy) -> Self {
        let mut cfg = Self {
            blocks: Vec::new(),
            succs: BTreeMap::new(),
            preds: BTreeMap::new(),
            entry: BlockId(0),
            exit: BlockId(0),
            external: BlockId(0),
            sub_graphs: HashMap::new(),
        };
        cfg.external = cfg.add_block(Block::new(BlockKind::Call));
        let (entry, exit) = Builder { mgr, cfg: &mut cfg }.sub_graph(root);
        cfg.entry = entry;
        cfg.exit = exit;
        if policy == CreationPolicy::MultiStmtPerBlock {
            cfg.merge_chains();
        }
        cfg
    }

    /// The number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Checks whether the graph holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The entry block of the whole graph.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// The exit block of the whole graph.
    #[must_use]
    pub const fn exit(&self) -> BlockId {
        self.exit
    }

    /// The sentinel block representing unknown external callees.
    #[must_use]
    pub const fn external(&self) -> BlockId {
        self.external
    }

    /// The block stored under the given id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    /// Iterates over all block ids.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(|i| BlockId(u32::try_from(i).expect("block arena overflow")))
    }

    /// The successors of a block.
    pub fn successors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.succs
            .get(&id)
            .into_iter()
            .flat_map(|edges| edges.keys().copied())
    }

    /// The predecessors of a block.
    pub fn predecessors(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.preds
            .get(&id)
            .into_iter()
            .flat_map(|preds| preds.iter().copied())
    }

    /// The edge between two blocks, if present.
    #[must_use]
    pub fn edge(&self, src: BlockId, dst: BlockId) -> Option<&Edge> {
        self.succs.get(&src)?.get(&dst)
    }

    /// The entry/exit pair of the sub-graph built for an IR root.
    #[must_use]
    pub fn sub_graph(&self, root: NodeId) -> Option<GraphBounds> {
        self.sub_graphs.get(&root).copied()
    }

    /// Checks whether a sub-graph was built for the given root.
    #[must_use]
    pub fn has_sub_graph(&self, root: NodeId) -> bool {
        self.sub_graphs.contains_key(&root)
    }

    fn add_block(&mut self, block: Block) -> BlockId {
        let id = BlockId(u32::try_from(self.blocks.len()).expect("block arena overflow"));
        self.blocks.push(block);
        id
    }

    fn add_edge(&mut self, src: BlockId, dst: BlockId, edge: Edge) {
        self.succs.entry(src).or_default().insert(dst, edge);
        self.preds.entry(dst).or_default().insert(src);
    }

    /// Merges straight-line chains of default blocks.
    fn merge_chains(&mut self) {
        loop {
            let candidate = self.blocks().find(|&id| {
                let block = self.block(id);
                block.kind == BlockKind::Default
                    && block.terminator.is_none()
                    && self.successors(id).count() == 1
                    && {
                        let succ = self.successors(id).next().expect("one successor");
                        self.block(succ).kind == BlockKind::Default
                            && self.predecessors(succ).count() == 1
                            && self.edge(id, succ).expect("edge exists").guard.is_none()
                    }
            });
            let Some(id) = candidate else {
                return;
            };
            let succ = self.successors(id).next().expect("one successor");

            // pull the successor's content and outgoing edges into `id`
            let succ_block = self.blocks[succ.0 as usize].clone();
            self.blocks[id.0 as usize]
                .elements
                .extend(succ_block.elements);
            self.blocks[id.0 as usize].terminator = succ_block.terminator;

            let outgoing: Vec<(BlockId, Edge)> = self
                .succs
                .remove(&succ)
                .map(|edges| edges.into_iter().collect())
                .unwrap_or_default();
            self.succs.get_mut(&id).expect("source has edges").remove(&succ);
            self.preds.remove(&succ);
            for (dst, edge) in outgoing {
                self.preds.get_mut(&dst).map(|p| p.remove(&succ));
                self.add_edge(id, dst, edge);
            }
            self.blocks[succ.0 as usize] = Block::new(BlockKind::Default);
        }
    }

    /// Checks structural contracts: every block reachable from the entry has
    /// a successor unless it is an exit, and call/ret blocks are paired.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut reachable = BTreeSet::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            stack.extend(self.successors(id));
        }
        reachable.iter().all(|&id| {
            let block = self.block(id);
            match block.kind {
                BlockKind::Exit => true,
                BlockKind::Call => self.successors(id).count() >= 1,
                _ => self.successors(id).next().is_some() || id == self.external,
            }
        })
    }
}

impl Display for Cfg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for id in self.blocks() {
            let block = self.block(id);
            writeln!(
                f,
                "{id} [{:?}] ({} stmts) -> {}",
                block.kind,
                block.elements.len(),
                self.successors(id).join(", ")
            )?;
        }
        Ok(())
    }
}

/// The recursive-descent CFG builder.
struct Builder<'a> {
    mgr: &'a NodeManager,
    cfg: &'a mut Cfg,
}

/// Targets for break/continue/return while descending into a statement.
#[derive(Clone, Copy)]
struct Targets {
    exit: BlockId,
    loop_head: Option<BlockId>,
    loop_exit: Option<BlockId>,
}

impl Builder<'_> {
    /// Builds the sub-graph for an IR root and registers its bounds.
    fn sub_graph(&mut self, root: NodeId) -> GraphBounds {
        if let Some(bounds) = self.cfg.sub_graph(root) {
            return bounds;
        }
        let entry = self.cfg.add_block(Block::new(BlockKind::Entry));
        let exit = self.cfg.add_block(Block::new(BlockKind::Exit));
        // register before descending so recursive calls find the bounds
        self.cfg.sub_graphs.insert(root, (entry, exit));

        let body = match self.mgr.node(root) {
            Node::Lambda { body, .. } => *body,
            _ => root,
        };
        let targets = Targets {
            exit,
            loop_head: None,
            loop_exit: None,
        };
        let first = self.stmt(&NodeAddress::new(body), exit, targets);
        self.cfg.add_edge(entry, first, Edge::unconditional());
        (entry, exit)
    }

    /// Builds the blocks for one statement; control continues at `succ`.
    /// Returns the statement's first block.
    fn stmt(&mut self, addr: &NodeAddress, succ: BlockId, targets: Targets) -> BlockId {
        match addr.node(self.mgr).clone() {
            Node::Compound { stmts } => {
                let mut next = succ;
                for idx in (0..stmts.len()).rev() {
                    next = self.stmt(&addr.child(idx), next, targets);
                }
                next
            }
            Node::If { cond, .. } => {
                let mut block = Block::new(BlockKind::Default);
                block.elements.push(Element {
                    stmt: addr.child(0),
                    kind: ElementKind::CtrlCond,
                });
                block.terminator = Some(addr.clone());
                let head = self.cfg.add_block(block);

                let then_entry = self.stmt(&addr.child(1), succ, targets);
                let else_entry = self.stmt(&addr.child(2), succ, targets);
                self.cfg.add_edge(head, then_entry, Edge::guarded(cond, false));
                self.cfg.add_edge(head, else_entry, Edge::guarded(cond, true));
                head
            }
            Node::While { cond, .. } => {
                let mut block = Block::new(BlockKind::Default);
                block.elements.push(Element {
                    stmt: addr.child(0),
                    kind: ElementKind::CtrlCond,
                });
                block.terminator = Some(addr.clone());
                let head = self.cfg.add_block(block);

                let body_targets = Targets {
                    loop_head: Some(head),
                    loop_exit: Some(succ),
                    ..targets
                };
                let body_entry = self.stmt(&addr.child(1), head, body_targets);
                self.cfg.add_edge(head, body_entry, Edge::guarded(cond, false));
                self.cfg.add_edge(head, succ, Edge::guarded(cond, true));
                head
            }
            Node::For { .. } => {
                // init block, condition head, body, increment, back edge
                let mut init = Block::new(BlockKind::Default);
                init.elements.push(Element {
                    stmt: addr.clone(),
                    kind: ElementKind::LoopInit,
                });
                let init_id = self.cfg.add_block(init);

                let mut head = Block::new(BlockKind::Default);
                head.elements.push(Element {
                    stmt: addr.child(2),
                    kind: ElementKind::CtrlCond,
                });
                head.terminator = Some(addr.clone());
                let head_id = self.cfg.add_block(head);

                let mut increment = Block::new(BlockKind::Default);
                increment.elements.push(Element {
                    stmt: addr.child(3),
                    kind: ElementKind::LoopIncrement,
                });
                let increment_id = self.cfg.add_block(increment);

                let body_targets = Targets {
                    loop_head: Some(increment_id),
                    loop_exit: Some(succ),
                    ..targets
                };
                let body_entry = self.stmt(&addr.child(4), increment_id, body_targets);

                self.cfg.add_edge(init_id, head_id, Edge::unconditional());
                self.cfg.add_edge(head_id, body_entry, Edge::unconditional());
                self.cfg.add_edge(head_id, succ, Edge::unconditional());
                self.cfg
                    .add_edge(increment_id, head_id, Edge::unconditional());
                init_id
            }
            Node::Return { .. } => {
                let mut block = Block::new(BlockKind::Default);
                block.elements.push(Element {
                    stmt: addr.clone(),
                    kind: ElementKind::None,
                });
                block.terminator = Some(addr.clone());
                let id = self.cfg.add_block(block);
                self.cfg.add_edge(id, targets.exit, Edge::unconditional());
                id
            }
            Node::Break => {
                let mut block = Block::new(BlockKind::Default);
                block.terminator = Some(addr.clone());
                let id = self.cfg.add_block(block);
                let target = targets.loop_exit.expect("break outside a loop");
                self.cfg.add_edge(id, target, Edge::unconditional());
                id
            }
            Node::Continue => {
                let mut block = Block::new(BlockKind::Default);
                block.terminator = Some(addr.clone());
                let id = self.cfg.add_block(block);
                let target = targets.loop_head.expect("continue outside a loop");
                self.cfg.add_edge(id, target, Edge::unconditional());
                id
            }
            node => {
                // plain statement; calls of lambdas get call/ret pairs
                if let Some(callee) = self.called_lambda(&node) {
                    let mut call = Block::new(BlockKind::Call);
                    call.elements.push(Element {
                        stmt: addr.clone(),
                        kind: ElementKind::None,
                    });
                    let call_id = self.cfg.add_block(call);
                    let ret_id = self.cfg.add_block(Block::new(BlockKind::Ret));

                    let (callee_entry, callee_exit) = self.sub_graph(callee);
                    self.cfg
                        .add_edge(call_id, callee_entry, Edge::unconditional());
                    self.cfg
                        .add_edge(callee_exit, ret_id, Edge::unconditional());
                    self.cfg.add_edge(ret_id, succ, Edge::unconditional());
                    return call_id;
                }
                if self.calls_unknown(&node) {
                    let mut call = Block::new(BlockKind::Call);
                    call.elements.push(Element {
                        stmt: addr.clone(),
                        kind: ElementKind::None,
                    });
                    let call_id = self.cfg.add_block(call);
                    let ret_id = self.cfg.add_block(Block::new(BlockKind::Ret));
                    let external = self.cfg.external;
                    self.cfg.add_edge(call_id, external, Edge::unconditional());
                    self.cfg.add_edge(external, ret_id, Edge::unconditional());
                    self.cfg.add_edge(ret_id, succ, Edge::unconditional());
                    return call_id;
                }
                let mut block = Block::new(BlockKind::Default);
                block.elements.push(Element {
                    stmt: addr.clone(),
                    kind: ElementKind::None,
                });
                let id = self.cfg.add_block(block);
                self.cfg.add_edge(id, succ, Edge::unconditional());
                id
            }
        }
    }

    /// The lambda called by a statement, if its callee resolves statically.
    fn called_lambda(&self, node: &Node) -> Option<NodeId> {
        let call = match node {
            Node::Call { .. } => node.clone(),
            Node::Decl { init, .. } => self.mgr.node(*init).clone(),
            _ => return None,
        };
        match call {
            Node::Call { callee, .. } => match self.mgr.node(callee) {
                Node::Lambda { .. } => Some(callee),
                _ => None,
            },
            _ => None,
        }
    }

    /// Checks whether a statement calls through a target that cannot be
    /// resolved statically (a variable or an external function literal).
    fn calls_unknown(&self, node: &Node) -> bool {
        let call = match node {
            Node::Call { .. } => node.clone(),
            Node::Decl { init, .. } => self.mgr.node(*init).clone(),
            _ => return false,
        };
        match call {
            Node::Call { callee, .. } => match self.mgr.node(callee) {
                Node::Variable { ty, .. } => self.mgr.ty(*ty).is_fun(),
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Builder as IrBuilder;
    use crate::ir::lang::Op;

    fn sample_program(mgr: &mut NodeManager) -> NodeId {
        let mut b = IrBuilder::new(mgr);
        let int = b.basic().int;
        let ref_int = b.ref_ty(int);
        let a = b.variable(ref_int, 1);
        let zero = b.int_lit(0);
        let decl = b.decl(a, zero);

        let i = b.variable(int, 2);
        let ten = b.int_lit(10);
        let fifty = b.int_lit(50);
        let one = b.int_lit(1);
        let load = b.deref(a);
        let sum = b.add(load, i);
        let store = b.assign(a, sum);
        let body = b.compound(vec![store]);
        let for_loop = b.for_stmt(i, ten, fifty, one, body);

        let read = b.deref(a);
        let c = b.variable(int, 3);
        let tail = b.decl(c, read);
        b.compound(vec![decl, for_loop, tail])
    }

    #[test]
    fn straight_line_and_loop_structure() {
        let mut mgr = NodeManager::new();
        let root = sample_program(&mut mgr);
        let cfg = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);

        assert!(cfg.is_consistent());
        // the loop head has two successors (body and exit path)
        let head = cfg
            .blocks()
            .find(|&id| {
                cfg.block(id)
                    .elements
                    .iter()
                    .any(|e| e.kind == ElementKind::CtrlCond)
            })
            .expect("loop head exists");
        assert_eq!(cfg.successors(head).count(), 2);
        // the back edge makes the head reachable from its own successors
        let mut reachable = std::collections::BTreeSet::new();
        let mut stack: Vec<BlockId> = cfg.successors(head).collect();
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                stack.extend(cfg.successors(id));
            }
        }
        assert!(reachable.contains(&head));
    }

    #[test]
    fn branch_edges_carry_guards() {
        let mut mgr = NodeManager::new();
        let mut b = IrBuilder::new(&mut mgr);
        let int = b.basic().int;
        let x = b.variable(int, 1);
        let zero = b.int_lit(0);
        let cond = b.cmp(Op::IntLt, x, zero);
        let then_stmt = b.compound(vec![]);
        let else_stmt = b.compound(vec![]);
        let branch = b.if_stmt(cond, then_stmt, else_stmt);
        let root = b.compound(vec![branch]);

        let cfg = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);
        let head = cfg
            .blocks()
            .find(|&id| cfg.block(id).terminator.is_some())
            .expect("branch head");
        let guards: Vec<bool> = cfg
            .successors(head)
            .map(|succ| {
                cfg.edge(head, succ)
                    .and_then(|e| e.guard.as_ref())
                    .map(|g| g.negated)
                    .expect("guarded edge")
            })
            .sorted()
            .collect();
        assert_eq!(guards, vec![false, true]);
    }

    #[test]
    fn multi_stmt_policy_merges_chains() {
        let mut mgr = NodeManager::new();
        let root = sample_program(&mut mgr);
        let single = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);
        let multi = Cfg::build(&mgr, root, CreationPolicy::MultiStmtPerBlock);
        assert!(multi.is_consistent());
        let singles = single
            .blocks()
            .filter(|&id| !single.block(id).is_empty())
            .count();
        let merged = multi
            .blocks()
            .filter(|&id| !multi.block(id).is_empty())
            .count();
        assert!(merged < singles);
    }

    #[test]
    fn lambda_calls_get_call_ret_pairs() {
        let mut mgr = NodeManager::new();
        let mut b = IrBuilder::new(&mut mgr);
        let int = b.basic().int;
        let unit = b.basic().unit;
        let p = b.variable(int, 1);
        let inner = b.compound(vec![]);
        let callee = b.lambda(vec![p], unit, inner);
        let three = b.int_lit(3);
        let call = b.call(unit, callee, vec![three]);
        let root = b.compound(vec![call]);

        let cfg = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);
        assert!(cfg.is_consistent());
        let calls = cfg
            .blocks()
            .filter(|&id| cfg.block(id).kind == BlockKind::Call && id != cfg.external())
            .count();
        let rets = cfg
            .blocks()
            .filter(|&id| cfg.block(id).kind == BlockKind::Ret)
            .count();
        assert_eq!(calls, 1);
        assert_eq!(calls, rets);
        assert!(cfg.has_sub_graph(callee));
    }
}
