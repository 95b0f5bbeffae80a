//! Boolean short-circuit and constant-test simplification.
//!
//! Runs child-first, so a reduction exposed by simplifying a child is seen
//! by its parent in the same pass. A constant side that decides the result
//! replaces the whole operator, so `x` is dropped from `x && false` even if
//! evaluating it would have side effects.
//!
//! | Tree                 | Result     |
//! |----------------------|------------|
//! | `true && x`          | `x`        |
//! | `false && x`         | `false`    |
//! | `x && true`          | `x`        |
//! | `x && false`         | `false`    |
//! | `false \|\| x`       | `x`        |
//! | `true \|\| x`        | `true`     |
//! | `x \|\| false`       | `x`        |
//! | `x \|\| true`        | `true`     |
//! | `IIF(true, a, b)`    | `a`        |
//! | `IIF(false, a, b)`   | `b`        |
//!
//! Constants are recognized through enclosing `Convert`/`TypeAs` nodes. A
//! reduction applies only when the kept side has the node's type.

use arbor_ir::visitor::walk_children;
use arbor_ir::{Binary, BinaryOp, Conditional, Expr, ExprKind, Rewriter, Value};

/// Simplify `expr`. Returns the same node when nothing applies.
pub fn simplify(expr: &Expr) -> Expr {
    Simplifier.rewrite(expr)
}

struct Simplifier;

const TRUE: Value = Value::Bool(true);
const FALSE: Value = Value::Bool(false);

impl Rewriter for Simplifier {
    fn rewrite_binary(&mut self, expr: &Expr, _binary: &Binary) -> Expr {
        let rewritten = walk_children(self, expr);
        let ExprKind::Binary(binary) = rewritten.kind() else {
            return rewritten;
        };
        let (left, right) = (&binary.left, &binary.right);
        let kept = match binary.op {
            BinaryOp::AndAlso if left.is_constant_value(&TRUE) => right,
            BinaryOp::AndAlso if left.is_constant_value(&FALSE) => left,
            BinaryOp::AndAlso if right.is_constant_value(&TRUE) => left,
            BinaryOp::AndAlso if right.is_constant_value(&FALSE) => right,
            BinaryOp::OrElse if left.is_constant_value(&FALSE) => right,
            BinaryOp::OrElse if left.is_constant_value(&TRUE) => left,
            BinaryOp::OrElse if right.is_constant_value(&FALSE) => left,
            BinaryOp::OrElse if right.is_constant_value(&TRUE) => right,
            _ => return rewritten.clone(),
        };
        if kept.ty() == rewritten.ty() {
            tracing::trace!(op = ?binary.op, "short-circuit simplified");
            kept.clone()
        } else {
            rewritten.clone()
        }
    }

    fn rewrite_conditional(&mut self, expr: &Expr, _cond: &Conditional) -> Expr {
        let rewritten = walk_children(self, expr);
        let ExprKind::Conditional(cond) = rewritten.kind() else {
            return rewritten;
        };
        let kept = if cond.test.is_constant_value(&TRUE) {
            &cond.if_true
        } else if cond.test.is_constant_value(&FALSE) {
            &cond.if_false
        } else {
            return rewritten.clone();
        };
        if kept.ty() == rewritten.ty() {
            kept.clone()
        } else {
            rewritten.clone()
        }
    }
}
