//! Calling contexts for context-sensitive analyses.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::ir::NodeAddress;

/// The context representation analyses are parameterized over.
///
/// Implementations decide how much calling history to retain; the framework
/// only requires a sentinel context and a push operation applied when
/// descending through a call site.
pub trait ContextRep: Clone + Ord + std::fmt::Debug + std::hash::Hash + Default + 'static {
    /// The context after entering a callee through the given call site.
    #[must_use]
    fn push_call(&self, site: &NodeAddress) -> Self;
}

/// The number of call sites a [`CallString`] retains.
pub const CALL_STRING_DEPTH: usize = 2;

/// A call-string context of bounded depth.
///
/// The default value is the sentinel context used for globals and unknown
/// external locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallString {
    /// The most recent call sites, oldest first.
    sites: Vec<NodeAddress>,
}

impl CallString {
    /// The sentinel context.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Checks whether this is the sentinel context.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.sites.is_empty()
    }

    /// The retained call sites, oldest first.
    #[must_use]
    pub fn sites(&self) -> &[NodeAddress] {
        &self.sites
    }
}

impl ContextRep for CallString {
    fn push_call(&self, site: &NodeAddress) -> Self {
        let mut sites = self.sites.clone();
        sites.push(site.clone());
        if sites.len() > CALL_STRING_DEPTH {
            sites.remove(0);
        }
        Self { sites }
    }
}

impl Display for CallString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.sites.iter().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, NodeManager};

    #[test]
    fn depth_is_bounded() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let sites: Vec<NodeAddress> = (0..4)
            .map(|i| NodeAddress::new(b.int_lit(i)))
            .collect();

        let mut ctx = CallString::root();
        assert!(ctx.is_root());
        for site in &sites {
            ctx = ctx.push_call(site);
        }
        assert_eq!(ctx.sites().len(), CALL_STRING_DEPTH);
        // the oldest sites were dropped
        assert_eq!(ctx.sites()[0], sites[2]);
        assert_eq!(ctx.sites()[1], sites[3]);
    }
}
