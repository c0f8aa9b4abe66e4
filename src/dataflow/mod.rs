//! The monotone dataflow framework over the control-flow graph.
//!
//! A problem supplies a bounded lattice of facts, a direction and a
//! monotone per-block transfer function; the solver iterates a worklist to
//! the least fixpoint. Convergence follows from monotonicity and the
//! lattice's bounded height; a transfer that shrinks its previous output
//! while inputs only grew is a framework bug and asserts.

pub mod liveness;

pub use liveness::LiveVariables;

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

use crate::cfg::{BlockId, Cfg};

/// The propagation direction of a dataflow problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Facts flow from predecessors to successors; the entry is seeded.
    Forward,
    /// Facts flow from successors to predecessors; the exit is seeded.
    Backward,
}

/// A monotone dataflow problem.
pub trait Problem {
    /// The lattice of facts attached to blocks.
    type Fact: Clone + PartialEq + Debug;

    /// The propagation direction.
    fn direction(&self) -> Direction;

    /// The fact seeded at the boundary block.
    fn boundary_fact(&self) -> Self::Fact;

    /// The initial fact of all other blocks (the lattice's ⊥).
    fn init_fact(&self) -> Self::Fact;

    /// The least upper bound of two facts.
    fn join(&self, lhs: &Self::Fact, rhs: &Self::Fact) -> Self::Fact;

    /// The transfer function of one block.
    fn transfer(&self, cfg: &Cfg, block: BlockId, input: &Self::Fact) -> Self::Fact;
}

/// The facts at the fixpoint, per block.
#[derive(Debug)]
pub struct Results<F> {
    /// The fact *entering* each block's transfer (the join over the
    /// neighboring blocks' outputs).
    pub inputs: BTreeMap<BlockId, F>,
    /// The fact *leaving* each block's transfer.
    pub outputs: BTreeMap<BlockId, F>,
    /// The number of transfer applications until stabilization.
    pub iterations: usize,
}

/// Solves a dataflow problem over the given graph.
///
/// # Panics
/// Panics when a transfer function violates monotonicity.
pub fn solve<P: Problem>(problem: &P, cfg: &Cfg) -> Results<P::Fact> {
    let seed = match problem.direction() {
        Direction::Forward => cfg.entry(),
        Direction::Backward => cfg.exit(),
    };

    let mut inputs: BTreeMap<BlockId, P::Fact> = BTreeMap::new();
    let mut outputs: BTreeMap<BlockId, P::Fact> = BTreeMap::new();
    let mut iterations = 0;

    let mut worklist: VecDeque<BlockId> = VecDeque::new();
    worklist.push_back(seed);
    for block in cfg.blocks() {
        if block != seed {
            worklist.push_back(block);
        }
    }

    while let Some(block) = worklist.pop_front() {
        // join the neighboring outputs (the boundary seeds itself)
        let mut input = if block == seed {
            problem.boundary_fact()
        } else {
            problem.init_fact()
        };
        let neighbors: Vec<BlockId> = match problem.direction() {
            Direction::Forward => cfg.predecessors(block).collect(),
            Direction::Backward => cfg.successors(block).collect(),
        };
        for neighbor in neighbors {
            if let Some(out) = outputs.get(&neighbor) {
                input = problem.join(&input, out);
            }
        }

        let output = problem.transfer(cfg, block, &input);
        iterations += 1;

        let changed = outputs.get(&block) != Some(&output);
        if changed {
            if let Some(previous) = outputs.get(&block) {
                assert_eq!(
                    problem.join(previous, &output),
                    output,
                    "transfer function of {block} is not monotone"
                );
            }
            inputs.insert(block, input);
            outputs.insert(block, output);
            let dependents: Vec<BlockId> = match problem.direction() {
                Direction::Forward => cfg.successors(block).collect(),
                Direction::Backward => cfg.predecessors(block).collect(),
            };
            for dependent in dependents {
                if !worklist.contains(&dependent) {
                    worklist.push_back(dependent);
                }
            }
        } else {
            inputs.insert(block, input);
        }
    }

    Results {
        inputs,
        outputs,
        iterations,
    }
}
