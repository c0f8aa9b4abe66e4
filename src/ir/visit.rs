//! Traversal of the representation.
//!
//! Dispatch is an explicit table keyed on [`NodeKind`]; a kind without a
//! dedicated hook falls through to [`Visitor::unhandled`], so extensions of
//! the node catalog surface as conservative defaults instead of silently
//! skipped cases.

use super::{NodeAddress, NodeKind, NodeManager};

/// A visitor over node addresses, dispatched on node kind.
pub trait Visitor {
    /// Hook for kinds without a dedicated visit method.
    fn unhandled(&mut self, mgr: &NodeManager, addr: &NodeAddress);

    /// Visits a literal.
    fn visit_literal(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a variable.
    fn visit_variable(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a call.
    fn visit_call(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a lambda.
    fn visit_lambda(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a closure binding.
    fn visit_bind(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a tuple construction.
    fn visit_tuple(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a record construction.
    fn visit_struct(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a cast.
    fn visit_cast(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a job expression.
    fn visit_job(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a declaration.
    fn visit_decl(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a compound statement.
    fn visit_compound(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a conditional.
    fn visit_if(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a while loop.
    fn visit_while(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a counted loop.
    fn visit_for(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a switch.
    fn visit_switch(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a return.
    fn visit_return(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a break.
    fn visit_break(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
    /// Visits a continue.
    fn visit_continue(&mut self, mgr: &NodeManager, addr: &NodeAddress) {
        self.unhandled(mgr, addr);
    }
}

/// Dispatches one address to the matching hook of the visitor.
pub fn dispatch<V: Visitor + ?Sized>(mgr: &NodeManager, addr: &NodeAddress, visitor: &mut V) {
    match addr.node(mgr).kind() {
        NodeKind::Literal => visitor.visit_literal(mgr, addr),
        NodeKind::Variable => visitor.visit_variable(mgr, addr),
        NodeKind::Call => visitor.visit_call(mgr, addr),
        NodeKind::Lambda => visitor.visit_lambda(mgr, addr),
        NodeKind::Bind => visitor.visit_bind(mgr, addr),
        NodeKind::Tuple => visitor.visit_tuple(mgr, addr),
        NodeKind::Struct => visitor.visit_struct(mgr, addr),
        NodeKind::Cast => visitor.visit_cast(mgr, addr),
        NodeKind::Job => visitor.visit_job(mgr, addr),
        NodeKind::Decl => visitor.visit_decl(mgr, addr),
        NodeKind::Compound => visitor.visit_compound(mgr, addr),
        NodeKind::If => visitor.visit_if(mgr, addr),
        NodeKind::While => visitor.visit_while(mgr, addr),
        NodeKind::For => visitor.visit_for(mgr, addr),
        NodeKind::Switch => visitor.visit_switch(mgr, addr),
        NodeKind::Return => visitor.visit_return(mgr, addr),
        NodeKind::Break => visitor.visit_break(mgr, addr),
        NodeKind::Continue => visitor.visit_continue(mgr, addr),
    }
}

/// Walks all addresses beneath `root` in pre-order.
pub fn preorder(mgr: &NodeManager, root: &NodeAddress, f: &mut impl FnMut(&NodeAddress)) {
    f(root);
    let arity = root.node(mgr).children().len();
    for idx in 0..arity {
        preorder(mgr, &root.child(idx), f);
    }
}

/// Walks all addresses beneath `root` in post-order.
pub fn postorder(mgr: &NodeManager, root: &NodeAddress, f: &mut impl FnMut(&NodeAddress)) {
    let arity = root.node(mgr).children().len();
    for idx in 0..arity {
        postorder(mgr, &root.child(idx), f);
    }
    f(root);
}
