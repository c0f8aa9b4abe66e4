//! Memory locations and references, the entities of the reference analysis.

use std::fmt::{self, Display, Formatter};

use crate::data::DataPath;
use crate::ir::lang::{Basic, Op};
use crate::ir::{Node, NodeAddress, NodeManager};

use super::context::CallString;

/// An abstract memory location: the expression creating it plus the calling
/// context of the creation.
///
/// Globals and unknown external locations carry the sentinel context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    creation: NodeAddress,
    context: CallString,
}

impl Location {
    /// Creates a location for a creation point and context.
    #[must_use]
    pub fn new(creation: NodeAddress, context: CallString) -> Self {
        Self { creation, context }
    }

    /// The expression that created this location.
    #[must_use]
    pub const fn creation_point(&self) -> &NodeAddress {
        &self.creation
    }

    /// The calling context of the creation.
    #[must_use]
    pub const fn context(&self) -> &CallString {
        &self.context
    }

    /// Checks whether this is a global location (created at a root literal).
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.creation.is_root() && self.context.is_root()
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.creation, self.context)
    }
}

/// A reference: a location plus the data path of the addressed sub-value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    /// The referenced location.
    pub location: Location,
    /// The addressed sub-component.
    pub path: DataPath,
}

impl Reference {
    /// A reference to a location as a whole.
    #[must_use]
    pub fn to_location(location: Location) -> Self {
        Self {
            location,
            path: DataPath::root(),
        }
    }

    /// Creates a reference from its components.
    #[must_use]
    pub fn new(location: Location, path: DataPath) -> Self {
        Self { location, path }
    }

    /// Checks whether the reference addresses its location as a whole.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    /// Checks whether two references may address overlapping memory.
    ///
    /// Aliases share the location and have overlapping paths; references
    /// into sibling sub-components do not alias.
    #[must_use]
    pub fn is_alias(&self, other: &Self) -> bool {
        self.location == other.location && self.path.overlaps(&other.path)
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.location, self.path)
    }
}

/// Checks whether a node introduces a memory location: a literal of
/// reference type (a global) or an allocation call.
#[must_use]
pub fn is_memory_constructor(mgr: &NodeManager, basic: &Basic, addr: &NodeAddress) -> bool {
    let node = addr.node(mgr);
    match node {
        Node::Literal { ty, .. } => mgr.ty(*ty).is_ref(),
        Node::Call { callee, .. } => basic.is_op(mgr, *callee, Op::RefAlloc),
        _ => false,
    }
}

/// The location introduced by a memory constructor.
///
/// Globals (reference-typed literals) ignore the calling context.
///
/// # Panics
/// Panics if the address is not a memory constructor.
#[must_use]
pub fn location_of(
    mgr: &NodeManager,
    basic: &Basic,
    addr: &NodeAddress,
    ctx: &CallString,
) -> Location {
    assert!(
        is_memory_constructor(mgr, basic, addr),
        "{addr} does not construct a memory location"
    );
    if matches!(addr.node(mgr), Node::Literal { .. }) {
        return Location::new(addr.clone(), CallString::root());
    }
    Location::new(addr.clone(), ctx.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Index;
    use crate::ir::Builder;

    #[test]
    fn aliasing_requires_overlapping_paths() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let alloc = b.ref_alloc(int);

        let loc = Location::new(NodeAddress::new(alloc), CallString::root());
        let whole = Reference::to_location(loc.clone());
        let x = Reference::new(loc.clone(), DataPath::root().append(Index::field("x")));
        let y = Reference::new(loc, DataPath::root().append(Index::field("y")));

        assert!(whole.is_alias(&x));
        assert!(x.is_alias(&whole));
        assert!(!x.is_alias(&y));
    }

    #[test]
    fn globals_use_the_sentinel_context() {
        use crate::cba::context::ContextRep;

        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let basic = b.basic();
        let int = basic.int;
        let ref_int = b.ref_ty(int);
        let global = b.literal(ref_int, "g");

        let mut deep = CallString::root();
        deep = deep.push_call(&NodeAddress::new(global));

        let addr = NodeAddress::new(global);
        assert!(is_memory_constructor(&mgr, &basic, &addr));
        let loc = location_of(&mgr, &basic, &addr, &deep);
        assert!(loc.context().is_root());
    }
}
