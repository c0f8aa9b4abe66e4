//! Convenience construction of IR nodes.

use super::lang::{Basic, Op};
use super::{Node, NodeId, NodeManager, TyId, Type};

/// A builder constructing nodes within one [`NodeManager`].
///
/// Operator literals are monomorphized per use: each builder method interns
/// the operator with the concrete function type of the call site, so the
/// semantic checker can verify every call against an exact signature.
#[derive(Debug)]
pub struct Builder<'m> {
    mgr: &'m mut NodeManager,
    basic: Basic,
}

impl<'m> Builder<'m> {
    /// Creates a builder over the given manager.
    pub fn new(mgr: &'m mut NodeManager) -> Self {
        let basic = Basic::new(mgr);
        Self { mgr, basic }
    }

    /// The basic-type catalog of the underlying manager.
    #[must_use]
    pub const fn basic(&self) -> Basic {
        self.basic
    }

    /// The underlying manager.
    #[must_use]
    pub fn manager(&mut self) -> &mut NodeManager {
        self.mgr
    }

    // --- types ---

    /// Interns a reference type.
    pub fn ref_ty(&mut self, elem: TyId) -> TyId {
        self.mgr.intern_ty(Type::Ref(elem))
    }

    /// Interns a function type.
    pub fn fun_ty(&mut self, params: Vec<TyId>, ret: TyId) -> TyId {
        self.mgr.intern_ty(Type::Fun { params, ret })
    }

    /// Interns an array type.
    pub fn array_ty(&mut self, elem: TyId) -> TyId {
        self.mgr.intern_ty(Type::Array(elem))
    }

    /// Interns a vector type.
    pub fn vector_ty(&mut self, elem: TyId, len: usize) -> TyId {
        self.mgr.intern_ty(Type::Vector(elem, len))
    }

    /// Interns a tuple type.
    pub fn tuple_ty(&mut self, elems: Vec<TyId>) -> TyId {
        self.mgr.intern_ty(Type::Tuple(elems))
    }

    /// Interns a record type.
    pub fn struct_ty(&mut self, fields: Vec<(String, TyId)>) -> TyId {
        self.mgr.intern_ty(Type::Struct(fields))
    }

    // --- leaf expressions ---

    /// Interns a literal of the given type.
    pub fn literal(&mut self, ty: TyId, value: impl Into<String>) -> NodeId {
        self.mgr.intern(Node::Literal {
            ty,
            value: value.into(),
        })
    }

    /// Interns an integer literal.
    pub fn int_lit(&mut self, value: i64) -> NodeId {
        let ty = self.basic.int;
        self.literal(ty, value.to_string())
    }

    /// Interns a boolean literal.
    pub fn bool_lit(&mut self, value: bool) -> NodeId {
        let ty = self.basic.boolean;
        self.literal(ty, value.to_string())
    }

    /// Interns a field-name identifier literal.
    pub fn identifier(&mut self, name: impl Into<String>) -> NodeId {
        let ty = self.basic.identifier;
        self.literal(ty, name)
    }

    /// Interns a variable.
    pub fn variable(&mut self, ty: TyId, id: u32) -> NodeId {
        self.mgr.intern(Node::Variable { ty, id })
    }

    // --- operators and calls ---

    /// Interns the literal of an operator at a concrete function type.
    pub fn op(&mut self, op: Op, params: Vec<TyId>, ret: TyId) -> NodeId {
        let ty = self.fun_ty(params, ret);
        self.literal(ty, op.name())
    }

    /// Interns a call expression.
    pub fn call(&mut self, ty: TyId, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.mgr.intern(Node::Call { ty, callee, args })
    }

    /// Builds a call of an operator, monomorphized over the argument types.
    fn op_call(&mut self, op: Op, args: Vec<NodeId>, ret: TyId) -> NodeId {
        let params = args
            .iter()
            .map(|&a| self.mgr.type_of(a).expect("operator argument is a statement"))
            .collect();
        let callee = self.op(op, params, ret);
        self.call(ret, callee, args)
    }

    /// Builds an allocation call introducing a fresh memory location.
    pub fn ref_alloc(&mut self, elem: TyId) -> NodeId {
        let ret = self.ref_ty(elem);
        let callee = self.op(Op::RefAlloc, Vec::new(), ret);
        self.call(ret, callee, Vec::new())
    }

    /// Builds a dereferencing read.
    pub fn deref(&mut self, reference: NodeId) -> NodeId {
        let ret = match self.mgr.type_of(reference).map(|t| self.mgr.ty(t)) {
            Some(Type::Ref(elem)) => *elem,
            _ => self.basic.unit,
        };
        self.op_call(Op::RefDeref, vec![reference], ret)
    }

    /// Builds an assignment through a reference.
    pub fn assign(&mut self, reference: NodeId, value: NodeId) -> NodeId {
        let unit = self.basic.unit;
        self.op_call(Op::RefAssign, vec![reference, value], unit)
    }

    /// Builds a narrow operation descending into a sub-component.
    pub fn narrow(&mut self, reference: NodeId, path: NodeId, result: TyId) -> NodeId {
        let ret = self.ref_ty(result);
        self.op_call(Op::RefNarrow, vec![reference, path], ret)
    }

    /// Builds an expand operation ascending to an enclosing composite.
    pub fn expand(&mut self, reference: NodeId, path: NodeId, result: TyId) -> NodeId {
        let ret = self.ref_ty(result);
        self.op_call(Op::RefExpand, vec![reference, path], ret)
    }

    /// Builds a re-interpreting reference cast.
    pub fn reinterpret(&mut self, reference: NodeId, result: TyId) -> NodeId {
        let ret = self.ref_ty(result);
        self.op_call(Op::RefReinterpret, vec![reference], ret)
    }

    /// Builds an integer arithmetic call.
    pub fn arith(&mut self, op: Op, lhs: NodeId, rhs: NodeId) -> NodeId {
        debug_assert!(op.is_arithmetic());
        let int = self.basic.int;
        self.op_call(op, vec![lhs, rhs], int)
    }

    /// Builds an integer addition.
    pub fn add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arith(Op::IntAdd, lhs, rhs)
    }

    /// Builds an integer subtraction.
    pub fn sub(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arith(Op::IntSub, lhs, rhs)
    }

    /// Builds an integer multiplication.
    pub fn mul(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.arith(Op::IntMul, lhs, rhs)
    }

    /// Builds an integer minimum call.
    pub fn min(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        let int = self.basic.int;
        self.op_call(Op::IntMin, vec![lhs, rhs], int)
    }

    /// Builds an integer maximum call.
    pub fn max(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        let int = self.basic.int;
        self.op_call(Op::IntMax, vec![lhs, rhs], int)
    }

    /// Builds an integer comparison call.
    pub fn cmp(&mut self, op: Op, lhs: NodeId, rhs: NodeId) -> NodeId {
        debug_assert!(op.is_comparison());
        let boolean = self.basic.boolean;
        self.op_call(op, vec![lhs, rhs], boolean)
    }

    /// Builds an array subscript yielding an element reference.
    pub fn subscript(&mut self, array_ref: NodeId, index: NodeId) -> NodeId {
        let ret = match self.mgr.type_of(array_ref).map(|t| self.mgr.ty(t).clone()) {
            Some(Type::Ref(arr)) => match self.mgr.ty(arr).clone() {
                Type::Array(elem) | Type::Vector(elem, _) => self.ref_ty(elem),
                _ => self.basic.any_ref,
            },
            _ => self.basic.any_ref,
        };
        self.op_call(Op::ArraySubscript, vec![array_ref, index], ret)
    }

    /// Builds a record field read.
    pub fn member(&mut self, composite: NodeId, field: &str, field_ty: TyId) -> NodeId {
        let name = self.identifier(field);
        self.op_call(Op::CompositeMemberAccess, vec![composite, name], field_ty)
    }

    /// Builds a tuple component read.
    pub fn tuple_member(&mut self, tuple: NodeId, index: usize, elem_ty: TyId) -> NodeId {
        let idx = self.int_lit(i64::try_from(index).expect("tuple index overflow"));
        self.op_call(Op::TupleMemberAccess, vec![tuple, idx], elem_ty)
    }

    // --- data paths ---

    /// Builds the root data path.
    pub fn dp_root(&mut self) -> NodeId {
        let ty = self.basic.data_path;
        let callee = self.op(Op::DpRoot, Vec::new(), ty);
        self.call(ty, callee, Vec::new())
    }

    /// Builds a data path extended by a record field step.
    pub fn dp_member(&mut self, path: NodeId, field: &str) -> NodeId {
        let name = self.identifier(field);
        let ty = self.basic.data_path;
        self.op_call(Op::DpMember, vec![path, name], ty)
    }

    /// Builds a data path extended by an array element step.
    pub fn dp_element(&mut self, path: NodeId, index: NodeId) -> NodeId {
        let ty = self.basic.data_path;
        self.op_call(Op::DpElement, vec![path, index], ty)
    }

    /// Builds a data path extended by a tuple component step.
    pub fn dp_component(&mut self, path: NodeId, index: usize) -> NodeId {
        let idx = self.int_lit(i64::try_from(index).expect("tuple index overflow"));
        let ty = self.basic.data_path;
        self.op_call(Op::DpComponent, vec![path, idx], ty)
    }

    // --- parallel constructs ---

    /// Interns a job wrapping the given body.
    pub fn job(&mut self, body: NodeId) -> NodeId {
        let ty = self.basic.thread;
        self.mgr.intern(Node::Job { ty, body })
    }

    /// Builds a spawn of the given job.
    pub fn parallel(&mut self, job: NodeId) -> NodeId {
        let thread = self.basic.thread;
        self.op_call(Op::Parallel, vec![job], thread)
    }

    /// Builds a merge awaiting the given thread.
    pub fn merge(&mut self, thread: NodeId) -> NodeId {
        let unit = self.basic.unit;
        self.op_call(Op::Merge, vec![thread], unit)
    }

    // --- functions ---

    /// Interns a lambda.
    pub fn lambda(&mut self, params: Vec<NodeId>, ret: TyId, body: NodeId) -> NodeId {
        let param_tys = params
            .iter()
            .map(|&p| self.mgr.type_of(p).expect("lambda parameter is a statement"))
            .collect();
        let ty = self.fun_ty(param_tys, ret);
        self.mgr.intern(Node::Lambda { ty, params, body })
    }

    /// Interns a closure binding.
    pub fn bind(&mut self, params: Vec<NodeId>, call: NodeId) -> NodeId {
        let param_tys: Vec<_> = params
            .iter()
            .map(|&p| self.mgr.type_of(p).expect("bind parameter is a statement"))
            .collect();
        let ret = self.mgr.type_of(call).expect("bound call is a statement");
        let ty = self.fun_ty(param_tys, ret);
        self.mgr.intern(Node::Bind { ty, params, call })
    }

    // --- statements ---

    /// Interns a declaration statement.
    pub fn decl(&mut self, var: NodeId, init: NodeId) -> NodeId {
        self.mgr.intern(Node::Decl { var, init })
    }

    /// Interns a compound statement.
    pub fn compound(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.mgr.intern(Node::Compound { stmts })
    }

    /// Interns a conditional statement.
    pub fn if_stmt(&mut self, cond: NodeId, then_stmt: NodeId, else_stmt: NodeId) -> NodeId {
        self.mgr.intern(Node::If {
            cond,
            then_stmt,
            else_stmt,
        })
    }

    /// Interns a while loop.
    pub fn while_stmt(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.mgr.intern(Node::While { cond, body })
    }

    /// Interns a counted loop over `[start, end)` with the given step.
    pub fn for_stmt(
        &mut self,
        iter: NodeId,
        start: NodeId,
        end: NodeId,
        step: NodeId,
        body: NodeId,
    ) -> NodeId {
        self.mgr.intern(Node::For {
            iter,
            start,
            end,
            step,
            body,
        })
    }

    /// Interns a return statement.
    pub fn ret(&mut self, expr: NodeId) -> NodeId {
        self.mgr.intern(Node::Return { expr })
    }
}
