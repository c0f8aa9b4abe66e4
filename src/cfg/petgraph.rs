//! Implementations for the traits in the `petgraph` crate.

use std::collections::BTreeSet;

use petgraph::{
    Directed, Direction,
    visit::{
        Data, GraphBase, GraphProp, IntoNeighbors, IntoNeighborsDirected, IntoNodeIdentifiers,
        NodeIndexable, VisitMap, Visitable,
    },
};

use super::{Block, BlockId, Cfg, Edge};

impl GraphBase for Cfg {
    type NodeId = BlockId;
    type EdgeId = (BlockId, BlockId);
}

impl Data for Cfg {
    type NodeWeight = Block;
    type EdgeWeight = Edge;
}

/// A visit map for the control flow graph.
pub type Visited = BTreeSet<BlockId>;

impl VisitMap<BlockId> for Visited {
    fn visit(&mut self, a: BlockId) -> bool {
        self.insert(a)
    }

    fn is_visited(&self, a: &BlockId) -> bool {
        self.contains(a)
    }

    fn unvisit(&mut self, a: BlockId) -> bool {
        self.remove(&a)
    }
}

impl Visitable for Cfg {
    type Map = Visited;

    fn visit_map(&self) -> Self::Map {
        BTreeSet::new()
    }

    fn reset_map(&self, map: &mut Self::Map) {
        map.clear();
    }
}

impl<'a> IntoNodeIdentifiers for &'a Cfg {
    type NodeIdentifiers = <Vec<BlockId> as IntoIterator>::IntoIter;

    fn node_identifiers(self) -> Self::NodeIdentifiers {
        self.blocks().collect::<Vec<_>>().into_iter()
    }
}

impl<'a> IntoNeighbors for &'a Cfg {
    type Neighbors = <Vec<BlockId> as IntoIterator>::IntoIter;

    fn neighbors(self, a: BlockId) -> Self::Neighbors {
        self.successors(a).collect::<Vec<_>>().into_iter()
    }
}

impl<'a> IntoNeighborsDirected for &'a Cfg {
    type NeighborsDirected = <Vec<BlockId> as IntoIterator>::IntoIter;

    fn neighbors_directed(self, n: BlockId, d: Direction) -> Self::NeighborsDirected {
        match d {
            Direction::Outgoing => self.successors(n).collect::<Vec<_>>().into_iter(),
            Direction::Incoming => self.predecessors(n).collect::<Vec<_>>().into_iter(),
        }
    }
}

impl NodeIndexable for Cfg {
    fn node_bound(&self) -> usize {
        self.len()
    }

    fn to_index(&self, ix: BlockId) -> usize {
        ix.0 as usize
    }

    fn from_index(&self, ix: usize) -> BlockId {
        BlockId(u32::try_from(ix).expect("index is out of u32"))
    }
}

impl GraphProp for Cfg {
    type EdgeType = Directed;
}

#[cfg(test)]
mod tests {
    use petgraph::visit::Dfs;

    use crate::cfg::{Cfg, CreationPolicy};
    use crate::ir::{Builder, NodeManager};

    #[test]
    fn dfs_visits_all_reachable_blocks() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let i = b.variable(int, 1);
        let zero = b.int_lit(0);
        let ten = b.int_lit(10);
        let one = b.int_lit(1);
        let body = b.compound(vec![]);
        let for_loop = b.for_stmt(i, zero, ten, one, body);
        let root = b.compound(vec![for_loop]);

        let cfg = Cfg::build(&mgr, root, CreationPolicy::OneStmtPerBlock);
        let mut dfs = Dfs::new(&cfg, cfg.entry());
        let mut visited = 0;
        while dfs.next(&cfg).is_some() {
            visited += 1;
        }
        assert!(visited >= 4);
    }
}
