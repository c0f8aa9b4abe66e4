//! The catalog of primitive operators.
//!
//! Operators are ordinary literal nodes with a function type; the catalog
//! names them and recognizes their occurrences. Every analysis receives the
//! catalog through its context rather than a process-wide registry, so two
//! managers never share catalog state.

use super::{Node, NodeId, NodeManager, TyId, Type};

/// The primitive operators of the representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    /// Allocates a fresh memory cell, introducing a location.
    RefAlloc,
    /// Narrows a reference to a sub-component along a data path.
    RefNarrow,
    /// Expands a reference to an enclosing composite along a data path.
    RefExpand,
    /// Re-interprets a reference without changing the referenced cell.
    RefReinterpret,
    /// Reads the cell a reference points to.
    RefDeref,
    /// Writes the cell a reference points to.
    RefAssign,
    /// Integer addition.
    IntAdd,
    /// Integer subtraction.
    IntSub,
    /// Integer multiplication.
    IntMul,
    /// Integer division.
    IntDiv,
    /// Integer remainder.
    IntMod,
    /// Integer minimum.
    IntMin,
    /// Integer maximum.
    IntMax,
    /// Integer less-than.
    IntLt,
    /// Integer less-or-equal.
    IntLe,
    /// Integer equality.
    IntEq,
    /// Integer inequality.
    IntNe,
    /// Integer greater-than.
    IntGt,
    /// Integer greater-or-equal.
    IntGe,
    /// Boolean conjunction.
    BoolAnd,
    /// Boolean disjunction.
    BoolOr,
    /// Boolean negation.
    BoolNot,
    /// Indexes an array behind a reference, yielding an element reference.
    ArraySubscript,
    /// Reads an element of a tuple value.
    TupleMemberAccess,
    /// Reads a field of a record value.
    CompositeMemberAccess,
    /// Spawns a job as a new thread.
    Parallel,
    /// Awaits termination of a spawned thread.
    Merge,
    /// The empty data path addressing a value as a whole.
    DpRoot,
    /// Extends a data path by a record field step.
    DpMember,
    /// Extends a data path by an array element step.
    DpElement,
    /// Extends a data path by a tuple component step.
    DpComponent,
}

impl Op {
    /// The literal name under which the operator appears in programs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Op::RefAlloc => "ref.alloc",
            Op::RefNarrow => "ref.narrow",
            Op::RefExpand => "ref.expand",
            Op::RefReinterpret => "ref.reinterpret",
            Op::RefDeref => "ref.deref",
            Op::RefAssign => "ref.assign",
            Op::IntAdd => "int.add",
            Op::IntSub => "int.sub",
            Op::IntMul => "int.mul",
            Op::IntDiv => "int.div",
            Op::IntMod => "int.mod",
            Op::IntMin => "int.min",
            Op::IntMax => "int.max",
            Op::IntLt => "int.lt",
            Op::IntLe => "int.le",
            Op::IntEq => "int.eq",
            Op::IntNe => "int.ne",
            Op::IntGt => "int.gt",
            Op::IntGe => "int.ge",
            Op::BoolAnd => "bool.and",
            Op::BoolOr => "bool.or",
            Op::BoolNot => "bool.not",
            Op::ArraySubscript => "array.subscript",
            Op::TupleMemberAccess => "tuple.member.access",
            Op::CompositeMemberAccess => "composite.member.access",
            Op::Parallel => "parallel",
            Op::Merge => "merge",
            Op::DpRoot => "dp.root",
            Op::DpMember => "dp.member",
            Op::DpElement => "dp.element",
            Op::DpComponent => "dp.component",
        }
    }

    /// Looks up the operator carrying the given literal name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [Op; 31] = [
            Op::RefAlloc,
            Op::RefNarrow,
            Op::RefExpand,
            Op::RefReinterpret,
            Op::RefDeref,
            Op::RefAssign,
            Op::IntAdd,
            Op::IntSub,
            Op::IntMul,
            Op::IntDiv,
            Op::IntMod,
            Op::IntMin,
            Op::IntMax,
            Op::IntLt,
            Op::IntLe,
            Op::IntEq,
            Op::IntNe,
            Op::IntGt,
            Op::IntGe,
            Op::BoolAnd,
            Op::BoolOr,
            Op::BoolNot,
            Op::ArraySubscript,
            Op::TupleMemberAccess,
            Op::CompositeMemberAccess,
            Op::Parallel,
            Op::Merge,
            Op::DpRoot,
            Op::DpMember,
            Op::DpElement,
            Op::DpComponent,
        ];
        ALL.into_iter().find(|op| op.name() == name)
    }

    /// Checks whether this operator is one of the arithmetic ones.
    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Op::IntAdd | Op::IntSub | Op::IntMul | Op::IntDiv | Op::IntMod
        )
    }

    /// Checks whether this operator is one of the integer comparisons.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Op::IntLt | Op::IntLe | Op::IntEq | Op::IntNe | Op::IntGt | Op::IntGe
        )
    }
}

/// The basic-type and operator catalog of one [`NodeManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Basic {
    /// The unit type.
    pub unit: TyId,
    /// The boolean type.
    pub boolean: TyId,
    /// The integer type.
    pub int: TyId,
    /// The identifier type of field names.
    pub identifier: TyId,
    /// The data-path type.
    pub data_path: TyId,
    /// The thread-handle type.
    pub thread: TyId,
    /// The unknown reference type.
    pub any_ref: TyId,
}

impl Basic {
    /// Interns the basic types in the given manager.
    pub fn new(mgr: &mut NodeManager) -> Self {
        Self {
            unit: mgr.intern_ty(Type::Unit),
            boolean: mgr.intern_ty(Type::Bool),
            int: mgr.intern_ty(Type::Int),
            identifier: mgr.intern_ty(Type::Identifier),
            data_path: mgr.intern_ty(Type::DataPath),
            thread: mgr.intern_ty(Type::Thread),
            any_ref: mgr.intern_ty(Type::AnyRef),
        }
    }

    /// The operator a node denotes, if it is an operator literal.
    #[must_use]
    pub fn op_of(&self, mgr: &NodeManager, id: NodeId) -> Option<Op> {
        match mgr.node(id) {
            Node::Literal { value, ty } if mgr.ty(*ty).is_fun() => Op::from_name(value),
            _ => None,
        }
    }

    /// Checks whether a node is a literal of the given operator.
    #[must_use]
    pub fn is_op(&self, mgr: &NodeManager, id: NodeId, op: Op) -> bool {
        self.op_of(mgr, id) == Some(op)
    }

    /// Checks whether a node is a call of the given operator.
    #[must_use]
    pub fn is_call_of(&self, mgr: &NodeManager, id: NodeId, op: Op) -> bool {
        match mgr.node(id) {
            Node::Call { callee, .. } => self.is_op(mgr, *callee, op),
            _ => false,
        }
    }
}
