//! Node and type definitions of the intermediate representation.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

/// Identifies a hash-consed node owned by a [`NodeManager`](super::NodeManager).
///
/// Two structurally equal nodes constructed through the same manager receive
/// the same id, hence id equality coincides with structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("@{_0}")]
#[repr(transparent)]
pub struct NodeId(pub(super) u32);

impl NodeId {
    /// The raw index of this node within its manager.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a hash-consed type owned by a [`NodeManager`](super::NodeManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("t{_0}")]
#[repr(transparent)]
pub struct TyId(pub(super) u32);

/// A type of the intermediate representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// The unit type.
    Unit,
    /// The boolean type.
    Bool,
    /// The integer type.
    Int,
    /// The type of field-name identifiers.
    Identifier,
    /// The type of data-path values addressing sub-components of composites.
    DataPath,
    /// The type of thread handles produced by spawning a job.
    Thread,
    /// A reference to a memory cell of the element type.
    Ref(TyId),
    /// An untyped reference of unknown origin.
    AnyRef,
    /// A function type.
    Fun {
        /// The parameter types.
        params: Vec<TyId>,
        /// The return type.
        ret: TyId,
    },
    /// A tuple type.
    Tuple(Vec<TyId>),
    /// A record type with named fields.
    Struct(Vec<(String, TyId)>),
    /// An array of unknown extent.
    Array(TyId),
    /// A vector of fixed extent.
    Vector(TyId, usize),
}

impl Type {
    /// Checks whether this is a reference type (including [`Type::AnyRef`]).
    #[must_use]
    pub const fn is_ref(&self) -> bool {
        matches!(self, Type::Ref(_) | Type::AnyRef)
    }

    /// Checks whether this is a function type.
    #[must_use]
    pub const fn is_fun(&self) -> bool {
        matches!(self, Type::Fun { .. })
    }
}

/// The discriminant of a [`Node`], used by the dispatch tables of visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    /// See [`Node::Literal`].
    Literal,
    /// See [`Node::Variable`].
    Variable,
    /// See [`Node::Call`].
    Call,
    /// See [`Node::Lambda`].
    Lambda,
    /// See [`Node::Bind`].
    Bind,
    /// See [`Node::Tuple`].
    Tuple,
    /// See [`Node::Struct`].
    Struct,
    /// See [`Node::Cast`].
    Cast,
    /// See [`Node::Job`].
    Job,
    /// See [`Node::Decl`].
    Decl,
    /// See [`Node::Compound`].
    Compound,
    /// See [`Node::If`].
    If,
    /// See [`Node::While`].
    While,
    /// See [`Node::For`].
    For,
    /// See [`Node::Switch`].
    Switch,
    /// See [`Node::Return`].
    Return,
    /// See [`Node::Break`].
    Break,
    /// See [`Node::Continue`].
    Continue,
}

/// A node of the intermediate representation.
///
/// Expressions carry their type; statements do not. Children are stored as
/// [`NodeId`]s so that structural equality of nodes reduces to equality of
/// the stored ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    /// A literal value, including the named primitive operators.
    Literal {
        /// The type of the literal.
        ty: TyId,
        /// The textual value of the literal.
        value: String,
    },
    /// A variable.
    Variable {
        /// The type of the variable.
        ty: TyId,
        /// The numeric identity of the variable.
        id: u32,
    },
    /// A call of a function expression.
    Call {
        /// The result type of the call.
        ty: TyId,
        /// The called expression.
        callee: NodeId,
        /// The argument expressions.
        args: Vec<NodeId>,
    },
    /// A function abstraction.
    Lambda {
        /// The function type.
        ty: TyId,
        /// The parameter variables.
        params: Vec<NodeId>,
        /// The body statement.
        body: NodeId,
    },
    /// A closure binding capturing part of a call.
    Bind {
        /// The function type of the resulting closure.
        ty: TyId,
        /// The unbound parameter variables.
        params: Vec<NodeId>,
        /// The underlying call expression.
        call: NodeId,
    },
    /// A tuple construction.
    Tuple {
        /// The tuple type.
        ty: TyId,
        /// The element expressions.
        elems: Vec<NodeId>,
    },
    /// A record construction.
    Struct {
        /// The record type.
        ty: TyId,
        /// The field initializer expressions, in declaration order.
        fields: Vec<(String, NodeId)>,
    },
    /// An explicit cast.
    Cast {
        /// The target type.
        ty: TyId,
        /// The casted expression.
        expr: NodeId,
    },
    /// A job expression, the payload of a thread spawn.
    Job {
        /// The type of the job.
        ty: TyId,
        /// The body evaluated by the spawned thread.
        body: NodeId,
    },
    /// A variable declaration with initializer.
    Decl {
        /// The declared variable.
        var: NodeId,
        /// The initializing expression.
        init: NodeId,
    },
    /// A sequence of statements.
    Compound {
        /// The statements in program order.
        stmts: Vec<NodeId>,
    },
    /// A two-way conditional.
    If {
        /// The condition expression.
        cond: NodeId,
        /// The statement executed when the condition holds.
        then_stmt: NodeId,
        /// The statement executed otherwise.
        else_stmt: NodeId,
    },
    /// A pre-checked loop.
    While {
        /// The condition expression.
        cond: NodeId,
        /// The loop body.
        body: NodeId,
    },
    /// A counted loop iterating a fresh variable over a half-open range.
    For {
        /// The iterator variable.
        iter: NodeId,
        /// The inclusive lower bound expression.
        start: NodeId,
        /// The exclusive upper bound expression.
        end: NodeId,
        /// The step expression.
        step: NodeId,
        /// The loop body.
        body: NodeId,
    },
    /// A multi-way branch over an integer value.
    Switch {
        /// The scrutinee expression.
        value: NodeId,
        /// Pairs of case-literal and guarded statement.
        cases: Vec<(NodeId, NodeId)>,
        /// The fallback statement.
        default: NodeId,
    },
    /// A return from the enclosing lambda.
    Return {
        /// The returned expression.
        expr: NodeId,
    },
    /// A break out of the enclosing loop.
    Break,
    /// A continue of the enclosing loop.
    Continue,
}

impl Node {
    /// The discriminant of this node.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Node::Literal { .. } => NodeKind::Literal,
            Node::Variable { .. } => NodeKind::Variable,
            Node::Call { .. } => NodeKind::Call,
            Node::Lambda { .. } => NodeKind::Lambda,
            Node::Bind { .. } => NodeKind::Bind,
            Node::Tuple { .. } => NodeKind::Tuple,
            Node::Struct { .. } => NodeKind::Struct,
            Node::Cast { .. } => NodeKind::Cast,
            Node::Job { .. } => NodeKind::Job,
            Node::Decl { .. } => NodeKind::Decl,
            Node::Compound { .. } => NodeKind::Compound,
            Node::If { .. } => NodeKind::If,
            Node::While { .. } => NodeKind::While,
            Node::For { .. } => NodeKind::For,
            Node::Switch { .. } => NodeKind::Switch,
            Node::Return { .. } => NodeKind::Return,
            Node::Break => NodeKind::Break,
            Node::Continue => NodeKind::Continue,
        }
    }

    /// The type of this node, for expression nodes.
    #[must_use]
    pub fn ty(&self) -> Option<TyId> {
        match self {
            Node::Literal { ty, .. }
            | Node::Variable { ty, .. }
            | Node::Call { ty, .. }
            | Node::Lambda { ty, .. }
            | Node::Bind { ty, .. }
            | Node::Tuple { ty, .. }
            | Node::Struct { ty, .. }
            | Node::Cast { ty, .. }
            | Node::Job { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    /// Checks whether this node is an expression.
    #[must_use]
    pub fn is_expr(&self) -> bool {
        self.ty().is_some()
    }

    /// The children of this node in address order.
    #[must_use]
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Literal { .. } | Node::Variable { .. } | Node::Break | Node::Continue => {
                Vec::new()
            }
            Node::Call { callee, args, .. } => std::iter::once(*callee)
                .chain(args.iter().copied())
                .collect(),
            Node::Lambda { params, body, .. } => params
                .iter()
                .copied()
                .chain(std::iter::once(*body))
                .collect(),
            Node::Bind { params, call, .. } => params
                .iter()
                .copied()
                .chain(std::iter::once(*call))
                .collect(),
            Node::Tuple { elems, .. } => elems.clone(),
            Node::Struct { fields, .. } => fields.iter().map(|(_, e)| *e).collect(),
            Node::Cast { expr, .. } => vec![*expr],
            Node::Job { body, .. } => vec![*body],
            Node::Decl { var, init } => vec![*var, *init],
            Node::Compound { stmts } => stmts.clone(),
            Node::If {
                cond,
                then_stmt,
                else_stmt,
            } => vec![*cond, *then_stmt, *else_stmt],
            Node::While { cond, body } => vec![*cond, *body],
            Node::For {
                iter,
                start,
                end,
                step,
                body,
            } => vec![*iter, *start, *end, *step, *body],
            Node::Switch {
                value,
                cases,
                default,
            } => std::iter::once(*value)
                .chain(cases.iter().flat_map(|(c, s)| [*c, *s]))
                .chain(std::iter::once(*default))
                .collect(),
            Node::Return { expr } => vec![*expr],
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal { value, .. } => write!(f, "{value}"),
            Node::Variable { id, .. } => write!(f, "v{id}"),
            Node::Call { callee, args, .. } => {
                write!(f, "{callee}({})", args.iter().join(", "))
            }
            Node::Lambda { params, body, .. } => {
                write!(f, "fun({}) {body}", params.iter().join(", "))
            }
            Node::Bind { params, call, .. } => {
                write!(f, "bind({}) {call}", params.iter().join(", "))
            }
            Node::Tuple { elems, .. } => write!(f, "({})", elems.iter().join(", ")),
            Node::Struct { fields, .. } => write!(
                f,
                "{{{}}}",
                fields.iter().map(|(n, e)| format!("{n}={e}")).join(", ")
            ),
            Node::Cast { ty, expr } => write!(f, "cast<{ty}>({expr})"),
            Node::Job { body, .. } => write!(f, "job {body}"),
            Node::Decl { var, init } => write!(f, "decl {var} = {init}"),
            Node::Compound { stmts } => write!(f, "{{{}}}", stmts.iter().join("; ")),
            Node::If {
                cond,
                then_stmt,
                else_stmt,
            } => write!(f, "if({cond}) {then_stmt} else {else_stmt}"),
            Node::While { cond, body } => write!(f, "while({cond}) {body}"),
            Node::For {
                iter,
                start,
                end,
                step,
                body,
            } => write!(f, "for({iter} = {start} .. {end} : {step}) {body}"),
            Node::Switch { value, .. } => write!(f, "switch({value}) {{..}}"),
            Node::Return { expr } => write!(f, "return {expr}"),
            Node::Break => write!(f, "break"),
            Node::Continue => write!(f, "continue"),
        }
    }
}
