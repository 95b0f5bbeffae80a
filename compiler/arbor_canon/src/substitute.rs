//! Parameter substitution.
//!
//! Replaces each parameter of a lambda with an expression. The argument
//! contract (arity and assignability) is checked before any rewriting.
//!
//! [`substitute`] additionally specializes the result: once a receiver's
//! static type becomes more specific, member and method accesses on it are
//! re-resolved to the most specific implementation on that type, and upcasts
//! that no longer do anything are dropped.

use std::sync::Arc;

use arbor_ir::visitor::walk_children;
use arbor_ir::{
    Call, Expr, ExprKind, LambdaParts, MemberAccess, ParamDef, ParamId, Rewriter, Ty, Unary,
    UnaryOp,
};
use rustc_hash::FxHashMap;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubstituteError {
    #[error("lambda takes {expected} parameters but {found} replacements were given")]
    ArityMismatch { expected: usize, found: usize },
    #[error("replacement #{index} of type `{found}` is not assignable to parameter type `{expected}`")]
    NotAssignable { index: usize, expected: Ty, found: Ty },
}

/// Replace every parameter of `lambda` by the matching replacement.
pub fn substitute_simple(
    lambda: &LambdaParts,
    replacements: &[Expr],
) -> Result<Expr, SubstituteError> {
    let Some(map) = bind(lambda, replacements)? else {
        return Ok(lambda.body().clone());
    };
    Ok(Substituter { map, specialize: false }.rewrite(lambda.body()))
}

/// Like [`substitute_simple`], then re-resolve members on receivers whose
/// static type changed and drop redundant non-lifted upcasts.
pub fn substitute(lambda: &LambdaParts, replacements: &[Expr]) -> Result<Expr, SubstituteError> {
    let Some(map) = bind(lambda, replacements)? else {
        return Ok(lambda.body().clone());
    };
    Ok(Substituter { map, specialize: true }.rewrite(lambda.body()))
}

/// Check the argument contract. `None` means there is nothing to replace.
fn bind(
    lambda: &LambdaParts,
    replacements: &[Expr],
) -> Result<Option<FxHashMap<ParamId, Expr>>, SubstituteError> {
    let params = lambda.params();
    if params.len() != replacements.len() {
        return Err(SubstituteError::ArityMismatch {
            expected: params.len(),
            found: replacements.len(),
        });
    }
    if params.is_empty() {
        return Ok(None);
    }
    let mut map = FxHashMap::default();
    for (index, (param, replacement)) in params.iter().zip(replacements).enumerate() {
        if !param.ty().is_assignable_from(replacement.ty()) {
            return Err(SubstituteError::NotAssignable {
                index,
                expected: param.ty().clone(),
                found: replacement.ty().clone(),
            });
        }
        if let Some(def) = param.as_parameter() {
            map.insert(def.id(), replacement.clone());
        }
    }
    Ok(Some(map))
}

struct Substituter {
    map: FxHashMap<ParamId, Expr>,
    specialize: bool,
}

impl Rewriter for Substituter {
    fn rewrite_parameter(&mut self, expr: &Expr, param: &ParamDef) -> Expr {
        self.map
            .get(&param.id())
            .cloned()
            .unwrap_or_else(|| expr.clone())
    }

    fn rewrite_member(&mut self, expr: &Expr, access: &MemberAccess) -> Expr {
        let rewritten = walk_children(self, expr);
        if !self.specialize || access.member.is_static() {
            return rewritten;
        }
        let ExprKind::Member(MemberAccess {
            receiver: Some(receiver),
            ..
        }) = rewritten.kind()
        else {
            return rewritten;
        };
        let Some(class) = narrowed_class(access.receiver.as_ref(), receiver) else {
            return rewritten;
        };
        match class.resolve_member(&access.member) {
            Some(target) if target.id() != access.member.id() => {
                tracing::trace!(
                    member = access.member.name(),
                    class = class.name(),
                    "re-resolved member on narrowed receiver"
                );
                Expr::member(Some(receiver.clone()), &target)
            }
            _ => rewritten,
        }
    }

    fn rewrite_call(&mut self, expr: &Expr, call: &Call) -> Expr {
        let rewritten = walk_children(self, expr);
        if !self.specialize || call.method.is_static() {
            return rewritten;
        }
        let ExprKind::Call(Call {
            receiver: Some(receiver),
            args,
            ..
        }) = rewritten.kind()
        else {
            return rewritten;
        };
        let Some(class) = narrowed_class(call.receiver.as_ref(), receiver) else {
            return rewritten;
        };
        match class.resolve_method(&call.method) {
            Some(target) if target.id() != call.method.id() => {
                tracing::trace!(
                    method = call.method.name(),
                    class = class.name(),
                    "re-resolved method on narrowed receiver"
                );
                Expr::call(Some(receiver.clone()), &target, args.clone())
            }
            _ => rewritten,
        }
    }

    fn rewrite_unary(&mut self, expr: &Expr, unary: &Unary) -> Expr {
        let rewritten = walk_children(self, expr);
        if !self.specialize
            || !matches!(unary.op, UnaryOp::Convert | UnaryOp::TypeAs)
            || unary.method.is_some()
            || unary.lifted
        {
            return rewritten;
        }
        let ExprKind::Unary(Unary { operand, .. }) = rewritten.kind() else {
            return rewritten;
        };
        if operand.ty() != unary.operand.ty() && expr.ty().is_assignable_from(operand.ty()) {
            operand.clone()
        } else {
            rewritten
        }
    }
}

/// The receiver's class, when substitution changed its static type.
fn narrowed_class(original: Option<&Expr>, rewritten: &Expr) -> Option<Arc<arbor_ir::ClassDef>> {
    let original = original?;
    if original.ty() == rewritten.ty() {
        return None;
    }
    match rewritten.ty() {
        Ty::Class(class) => Some(Arc::clone(class)),
        _ => None,
    }
}
