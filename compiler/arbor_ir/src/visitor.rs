//! Expression visitors.
//!
//! Two traversal traits are provided:
//!
//! - [`ExprVisitor`]: typed-result visitor. Every node kind has a required
//!   handler, so adding a kind to [`ExprKind`] breaks every implementor
//!   until it is handled. Used where each kind needs its own semantics
//!   (interpreter, closure compiler).
//! - [`Rewriter`]: `Expr -> Expr` fold. Hooks default to rebuilding the node
//!   from rewritten children, so an implementor overrides only the kinds it
//!   cares about. Unchanged subtrees stay shared.
//!
//! Both route recursion through [`ensure_sufficient_stack`].
//!
//! # Example
//!
//! ```text
//! struct DropConstants;
//!
//! impl Rewriter for DropConstants {
//!     fn rewrite_constant(&mut self, expr: &Expr, _value: &Value) -> Expr {
//!         Expr::constant(Value::Null, expr.ty().clone())
//!     }
//! }
//! ```

use crate::expr::{
    Binary, Call, Conditional, Expr, ExprKind, Extension, Index, LambdaParts, MemberAccess, New,
    NewArray, ParamDef, Raise, TypeIs, Unary,
};
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;

// Typed-result visitor

/// Typed-result visitor with one required handler per node kind.
pub trait ExprVisitor {
    type Output;

    /// Visit `expr`, dispatching on its kind.
    fn visit(&mut self, expr: &Expr) -> Self::Output {
        ensure_sufficient_stack(|| dispatch(self, expr))
    }

    fn visit_constant(&mut self, expr: &Expr, value: &Value) -> Self::Output;
    fn visit_parameter(&mut self, expr: &Expr, param: &ParamDef) -> Self::Output;
    fn visit_binary(&mut self, expr: &Expr, binary: &Binary) -> Self::Output;
    fn visit_unary(&mut self, expr: &Expr, unary: &Unary) -> Self::Output;
    fn visit_conditional(&mut self, expr: &Expr, cond: &Conditional) -> Self::Output;
    fn visit_member(&mut self, expr: &Expr, access: &MemberAccess) -> Self::Output;
    fn visit_call(&mut self, expr: &Expr, call: &Call) -> Self::Output;
    fn visit_new(&mut self, expr: &Expr, new: &New) -> Self::Output;
    fn visit_new_array(&mut self, expr: &Expr, array: &NewArray) -> Self::Output;
    fn visit_index(&mut self, expr: &Expr, index: &Index) -> Self::Output;
    fn visit_type_is(&mut self, expr: &Expr, test: &TypeIs) -> Self::Output;
    fn visit_lambda(&mut self, expr: &Expr, parts: &LambdaParts) -> Self::Output;
    fn visit_raise(&mut self, expr: &Expr, raise: &Raise) -> Self::Output;
    fn visit_extension(&mut self, expr: &Expr, ext: &Extension) -> Self::Output;
}

/// Route `expr` to the matching `visit_*` handler.
pub fn dispatch<V: ExprVisitor + ?Sized>(visitor: &mut V, expr: &Expr) -> V::Output {
    match expr.kind() {
        ExprKind::Constant(value) => visitor.visit_constant(expr, value),
        ExprKind::Parameter(param) => visitor.visit_parameter(expr, param),
        ExprKind::Binary(binary) => visitor.visit_binary(expr, binary),
        ExprKind::Unary(unary) => visitor.visit_unary(expr, unary),
        ExprKind::Conditional(cond) => visitor.visit_conditional(expr, cond),
        ExprKind::Member(access) => visitor.visit_member(expr, access),
        ExprKind::Call(call) => visitor.visit_call(expr, call),
        ExprKind::New(new) => visitor.visit_new(expr, new),
        ExprKind::NewArray(array) => visitor.visit_new_array(expr, array),
        ExprKind::Index(index) => visitor.visit_index(expr, index),
        ExprKind::TypeIs(test) => visitor.visit_type_is(expr, test),
        ExprKind::Lambda(parts) => visitor.visit_lambda(expr, parts),
        ExprKind::Raise(raise) => visitor.visit_raise(expr, raise),
        ExprKind::Extension(ext) => visitor.visit_extension(expr, ext),
    }
}

// Rewriter

/// Child-first `Expr -> Expr` fold.
///
/// Override `rewrite_*` hooks to replace specific kinds; call
/// [`walk_children`] from an override to keep descending.
pub trait Rewriter {
    /// Rewrite `expr`, dispatching on its kind.
    fn rewrite(&mut self, expr: &Expr) -> Expr {
        ensure_sufficient_stack(|| rewrite_dispatch(self, expr))
    }

    fn rewrite_constant(&mut self, expr: &Expr, _value: &Value) -> Expr {
        expr.clone()
    }

    fn rewrite_parameter(&mut self, expr: &Expr, _param: &ParamDef) -> Expr {
        expr.clone()
    }

    fn rewrite_binary(&mut self, expr: &Expr, _binary: &Binary) -> Expr {
        walk_children(self, expr)
    }

    fn rewrite_unary(&mut self, expr: &Expr, _unary: &Unary) -> Expr {
        walk_children(self, expr)
    }

    fn rewrite_conditional(&mut self, expr: &Expr, _cond: &Conditional) -> Expr {
        walk_children(self, expr)
    }

    fn rewrite_member(&mut self, expr: &Expr, _access: &MemberAccess) -> Expr {
        walk_children(self, expr)
    }

    fn rewrite_call(&mut self, expr: &Expr, _call: &Call) -> Expr {
        walk_children(self, expr)
    }

    fn rewrite_index(&mut self, expr: &Expr, _index: &Index) -> Expr {
        walk_children(self, expr)
    }

    fn rewrite_lambda(&mut self, expr: &Expr, _parts: &LambdaParts) -> Expr {
        walk_children(self, expr)
    }

    /// Kinds without a dedicated hook: New, `NewArray`, `TypeIs`, Raise, Extension.
    fn rewrite_other(&mut self, expr: &Expr) -> Expr {
        walk_children(self, expr)
    }
}

fn rewrite_dispatch<R: Rewriter + ?Sized>(rewriter: &mut R, expr: &Expr) -> Expr {
    match expr.kind() {
        ExprKind::Constant(value) => rewriter.rewrite_constant(expr, value),
        ExprKind::Parameter(param) => rewriter.rewrite_parameter(expr, param),
        ExprKind::Binary(binary) => rewriter.rewrite_binary(expr, binary),
        ExprKind::Unary(unary) => rewriter.rewrite_unary(expr, unary),
        ExprKind::Conditional(cond) => rewriter.rewrite_conditional(expr, cond),
        ExprKind::Member(access) => rewriter.rewrite_member(expr, access),
        ExprKind::Call(call) => rewriter.rewrite_call(expr, call),
        ExprKind::Index(index) => rewriter.rewrite_index(expr, index),
        ExprKind::Lambda(parts) => rewriter.rewrite_lambda(expr, parts),
        ExprKind::New(_)
        | ExprKind::NewArray(_)
        | ExprKind::TypeIs(_)
        | ExprKind::Raise(_)
        | ExprKind::Extension(_) => rewriter.rewrite_other(expr),
    }
}

/// Rewrite every child of `expr` and rebuild it if any child changed.
pub fn walk_children<R: Rewriter + ?Sized>(rewriter: &mut R, expr: &Expr) -> Expr {
    expr.map_children(|child| rewriter.rewrite(child))
}

/// Call `f` on every node of the tree in pre-order.
pub fn for_each_node(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    ensure_sufficient_stack(|| {
        f(expr);
        for child in expr.children() {
            for_each_node(child, f);
        }
    });
}
