//! The semantic checker.
//!
//! [`check`] walks a program and reports violations of the typing rules as a
//! list of [`Message`]s. Analyses treat `Error`-severity messages on IR they
//! produced as fatal; transformations use the checker as an acceptance gate
//! for re-emitted code.

use std::fmt::{self, Display, Formatter};

use super::lang::Op;
use super::{Node, NodeAddress, NodeId, NodeManager, TyId, Type};

/// The kinds of semantic violations the checker reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A call passes a wrong number of arguments.
    CallArgumentCount,
    /// A call passes an argument of a mismatching type.
    CallArgumentType,
    /// A call of a non-function expression.
    CallOfNonFunction,
    /// The declared result type of a call differs from the callee's return type.
    ReturnTypeMismatch,
    /// A declaration initializer does not fit the declared variable.
    InvalidInitializer,
    /// An if or while condition is not boolean.
    NonBoolCondition,
    /// A switch scrutinee is not an integer.
    NonIntSwitchValue,
    /// A field access on a value that is not a record.
    AccessOnNonComposite,
    /// A field access naming a field the record does not have.
    UnknownField,
    /// A component access on a value that is not a tuple.
    AccessOnNonTuple,
    /// A component access outside the tuple's arity.
    InvalidTupleIndex,
    /// An operator literal whose type is not the operator's signature shape.
    BuiltinLiteralType,
    /// A cast between types of different reference rank.
    CastRankMismatch,
    /// An external function literal with a higher-order function type.
    IllegalExternalFunctionType,
}

/// The severity of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// A defect; producing analyses and transformations must abort.
    Error,
    /// A suspicious construct that does not invalidate the program.
    Warning,
}

/// One finding of the semantic checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The kind of violation.
    pub code: ErrorCode,
    /// The severity of the finding.
    pub severity: Severity,
    /// The address of the offending node.
    pub location: NodeAddress,
    /// An explanatory text.
    pub text: String,
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [{:?}] at {}: {}",
            self.severity, self.code, self.location, self.text
        )
    }
}

/// Checks the program rooted at `root` and returns all findings.
#[must_use]
pub fn check(mgr: &NodeManager, root: NodeId) -> Vec<Message> {
    let mut checker = Checker {
        mgr,
        messages: Vec::new(),
    };
    checker.check(&NodeAddress::new(root), None);
    checker.messages
}

/// Checks whether the program rooted at `root` is free of errors.
#[must_use]
pub fn is_valid(mgr: &NodeManager, root: NodeId) -> bool {
    check(mgr, root)
        .iter()
        .all(|m| m.severity != Severity::Error)
}

struct Checker<'m> {
    mgr: &'m NodeManager,
    messages: Vec<Message>,
}

impl Checker<'_> {
    fn error(&mut self, code: ErrorCode, location: &NodeAddress, text: impl Into<String>) {
        self.messages.push(Message {
            code,
            severity: Severity::Error,
            location: location.clone(),
            text: text.into(),
        });
    }

    fn types_match(&self, expected: TyId, actual: TyId) -> bool {
        if expected == actual {
            return true;
        }
        // the unknown reference is compatible with every reference
        matches!(
            (self.mgr.ty(expected), self.mgr.ty(actual)),
            (Type::AnyRef, Type::Ref(_)) | (Type::Ref(_), Type::AnyRef)
        )
    }

    fn check(&mut self, addr: &NodeAddress, ret_ty: Option<TyId>) {
        let node = addr.node(self.mgr).clone();
        match &node {
            Node::Literal { ty, value } => self.check_literal(addr, *ty, value),
            Node::Call { ty, callee, args } => self.check_call(addr, *ty, *callee, args),
            Node::Cast { ty, expr } => {
                let source = self.mgr.type_of(*expr);
                if let Some(source) = source {
                    if self.mgr.ref_rank(*ty) != self.mgr.ref_rank(source) {
                        self.error(
                            ErrorCode::CastRankMismatch,
                            addr,
                            format!(
                                "cast changes reference rank ({} vs {})",
                                self.mgr.ref_rank(source),
                                self.mgr.ref_rank(*ty)
                            ),
                        );
                    }
                }
            }
            Node::Decl { var, init } => {
                let var_ty = self.mgr.type_of(*var);
                let init_ty = self.mgr.type_of(*init);
                if let (Some(var_ty), Some(init_ty)) = (var_ty, init_ty) {
                    let materialized =
                        matches!(self.mgr.ty(var_ty), Type::Ref(elem) if *elem == init_ty);
                    if !self.types_match(var_ty, init_ty) && !materialized {
                        self.error(
                            ErrorCode::InvalidInitializer,
                            addr,
                            "initializer type does not fit the declared variable",
                        );
                    }
                }
            }
            Node::If { cond, .. } | Node::While { cond, .. } => {
                if self.mgr.type_of(*cond).map(|t| self.mgr.ty(t).clone()) != Some(Type::Bool) {
                    self.error(
                        ErrorCode::NonBoolCondition,
                        addr,
                        "condition is not boolean",
                    );
                }
            }
            Node::Switch { value, .. } => {
                if self.mgr.type_of(*value).map(|t| self.mgr.ty(t).clone()) != Some(Type::Int) {
                    self.error(
                        ErrorCode::NonIntSwitchValue,
                        addr,
                        "switch value is not an integer",
                    );
                }
            }
            Node::Return { expr } => {
                let actual = self.mgr.type_of(*expr);
                if let (Some(expected), Some(actual)) = (ret_ty, actual) {
                    if !self.types_match(expected, actual) {
                        self.error(
                            ErrorCode::ReturnTypeMismatch,
                            addr,
                            "returned value does not fit the function's return type",
                        );
                    }
                }
            }
            _ => {}
        }

        // descend, tracking the expected return type through lambdas
        let inner_ret = match &node {
            Node::Lambda { ty, .. } => match self.mgr.ty(*ty) {
                Type::Fun { ret, .. } => Some(*ret),
                _ => ret_ty,
            },
            _ => ret_ty,
        };
        for idx in 0..node.children().len() {
            self.check(&addr.child(idx), inner_ret);
        }
    }

    fn check_literal(&mut self, addr: &NodeAddress, ty: TyId, value: &str) {
        let is_fun = self.mgr.ty(ty).is_fun();
        if let Some(op) = Op::from_name(value) {
            if !is_fun {
                self.error(
                    ErrorCode::BuiltinLiteralType,
                    addr,
                    format!("operator literal `{}` has a non-function type", op.name()),
                );
            }
            return;
        }
        // external function literals must be first-order
        if let Type::Fun { params, ret } = self.mgr.ty(ty) {
            let higher_order = params
                .iter()
                .chain(std::iter::once(ret))
                .any(|&t| self.mgr.ty(t).is_fun());
            if higher_order {
                self.error(
                    ErrorCode::IllegalExternalFunctionType,
                    addr,
                    format!("external function literal `{value}` has a higher-order type"),
                );
            }
            return;
        }
        // plain value literals must parse according to their type
        let well_formed = match self.mgr.ty(ty) {
            Type::Int => value.parse::<i64>().is_ok(),
            Type::Bool => value == "true" || value == "false",
            _ => true,
        };
        if !well_formed {
            self.error(
                ErrorCode::BuiltinLiteralType,
                addr,
                format!("literal `{value}` does not fit its type"),
            );
        }
    }

    fn check_call(&mut self, addr: &NodeAddress, ty: TyId, callee: NodeId, args: &[NodeId]) {
        let Some(callee_ty) = self.mgr.type_of(callee) else {
            return;
        };
        let Type::Fun { params, ret } = self.mgr.ty(callee_ty).clone() else {
            self.error(
                ErrorCode::CallOfNonFunction,
                addr,
                "callee is not of function type",
            );
            return;
        };
        if params.len() != args.len() {
            self.error(
                ErrorCode::CallArgumentCount,
                addr,
                format!("expected {} arguments, found {}", params.len(), args.len()),
            );
        }
        // structural accesses get dedicated diagnostics before the generic check
        if self.check_access(addr, callee, args) {
            return;
        }
        for (pos, (&param, &arg)) in params.iter().zip(args.iter()).enumerate() {
            if let Some(actual) = self.mgr.type_of(arg) {
                if !self.types_match(param, actual) {
                    self.error(
                        ErrorCode::CallArgumentType,
                        addr,
                        format!("argument {pos} does not fit the parameter type"),
                    );
                }
            }
        }
        if !self.types_match(ret, ty) {
            self.error(
                ErrorCode::ReturnTypeMismatch,
                addr,
                "call result type differs from the callee's return type",
            );
        }
    }

    /// Checks member and component accesses; returns whether `callee` was one.
    fn check_access(&mut self, addr: &NodeAddress, callee: NodeId, args: &[NodeId]) -> bool {
        let op = match self.mgr.node(callee) {
            Node::Literal { value, .. } => Op::from_name(value),
            _ => None,
        };
        match op {
            Some(Op::CompositeMemberAccess) => {
                let [composite, field] = args else {
                    return true;
                };
                let Some(Type::Struct(fields)) =
                    self.mgr.type_of(*composite).map(|t| self.mgr.ty(t).clone())
                else {
                    self.error(
                        ErrorCode::AccessOnNonComposite,
                        addr,
                        "field access on a non-record value",
                    );
                    return true;
                };
                if let Node::Literal { value, .. } = self.mgr.node(*field) {
                    if !fields.iter().any(|(name, _)| name == value) {
                        self.error(
                            ErrorCode::UnknownField,
                            addr,
                            format!("record has no field `{value}`"),
                        );
                    }
                }
                true
            }
            Some(Op::TupleMemberAccess) => {
                let [tuple, index] = args else {
                    return true;
                };
                let Some(Type::Tuple(elems)) =
                    self.mgr.type_of(*tuple).map(|t| self.mgr.ty(t).clone())
                else {
                    self.error(
                        ErrorCode::AccessOnNonTuple,
                        addr,
                        "component access on a non-tuple value",
                    );
                    return true;
                };
                if let Some(idx) = self.mgr.int_value(*index) {
                    if usize::try_from(idx).map_or(true, |idx| idx >= elems.len()) {
                        self.error(
                            ErrorCode::InvalidTupleIndex,
                            addr,
                            format!("component {idx} outside tuple of arity {}", elems.len()),
                        );
                    }
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Builder;

    #[test]
    fn well_typed_program_passes() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let ref_int = b.ref_ty(int);
        let zero = b.int_lit(0);
        let var = b.variable(ref_int, 1);
        let decl = b.decl(var, zero);
        let root = b.compound(vec![decl]);
        assert!(check(&mgr, root).is_empty());
    }

    #[test]
    fn argument_count_mismatch_is_reported() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let fun = b.fun_ty(vec![int, int], int);
        let callee = b.literal(fun, "f");
        let one = b.int_lit(1);
        let call = b.call(int, callee, vec![one]);
        let errors = check(&mgr, call);
        assert!(errors.iter().any(|m| m.code == ErrorCode::CallArgumentCount));
    }

    #[test]
    fn non_bool_condition_is_reported() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let one = b.int_lit(1);
        let body = b.compound(vec![]);
        let skip = b.compound(vec![]);
        let stmt = b.if_stmt(one, body, skip);
        let errors = check(&mgr, stmt);
        assert!(errors.iter().any(|m| m.code == ErrorCode::NonBoolCondition));
    }

    #[test]
    fn unknown_field_is_reported() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let point = b.struct_ty(vec![("x".into(), int)]);
        let var = b.variable(point, 1);
        let access = b.member(var, "y", int);
        let errors = check(&mgr, access);
        assert!(errors.iter().any(|m| m.code == ErrorCode::UnknownField));
    }

    #[test]
    fn cast_rank_mismatch_is_reported() {
        let mut mgr = NodeManager::new();
        let mut b = Builder::new(&mut mgr);
        let int = b.basic().int;
        let ref_int = b.ref_ty(int);
        let value = b.int_lit(3);
        let cast = b.manager().intern(Node::Cast {
            ty: ref_int,
            expr: value,
        });
        let errors = check(&mgr, cast);
        assert!(errors.iter().any(|m| m.code == ErrorCode::CastRankMismatch));
    }
}
