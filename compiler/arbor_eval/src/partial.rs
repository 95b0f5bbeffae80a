//! Partial evaluation: pre-compute every closed, foldable subtree.
//!
//! Two passes over the tree:
//!
//! 1. The nominator walks bottom-up and collects the nodes whose whole
//!    subtree is foldable. A single non-foldable descendant keeps every
//!    ancestor out of the set.
//! 2. The subtree evaluator walks top-down and replaces the outermost
//!    candidates with constants, never descending into a replaced subtree.
//!
//! A candidate that fails to evaluate becomes a Raise node of the same type
//! carrying the failure, so rewriting never fails; the error surfaces only
//! if that part of the tree executes.

use std::sync::Arc;

use arbor_ir::visitor::walk_children;
use arbor_ir::{ensure_sufficient_stack, Expr, ExprKind, LambdaParts, MemberFlags, Rewriter};
use rustc_hash::FxHashSet;

use crate::evaluator::Evaluator;

/// Default fold predicate.
///
/// Rejects parameters, Raise and Extension nodes, lambdas (their bodies are
/// still visited) and member reads, calls or constructions flagged
/// [`MemberFlags::NON_FOLDABLE`].
pub fn can_fold(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Parameter(_)
        | ExprKind::Raise(_)
        | ExprKind::Extension(_)
        | ExprKind::Lambda(_) => false,
        ExprKind::Member(access) => !access.member.flags().contains(MemberFlags::NON_FOLDABLE),
        ExprKind::Call(call) => !call.method.flags().contains(MemberFlags::NON_FOLDABLE),
        ExprKind::New(new) => !new.ctor.flags().contains(MemberFlags::NON_FOLDABLE),
        _ => true,
    }
}

/// Folds closed subtrees with an injected [`Evaluator`].
pub struct PartialEvaluator<'e> {
    evaluator: &'e dyn Evaluator,
    can_fold: Box<dyn Fn(&Expr) -> bool + 'e>,
}

impl<'e> PartialEvaluator<'e> {
    /// A partial evaluator using the default [`can_fold`] predicate.
    pub fn new(evaluator: &'e dyn Evaluator) -> Self {
        PartialEvaluator {
            evaluator,
            can_fold: Box::new(can_fold),
        }
    }

    /// Replace the fold predicate. Parameters are never folded regardless of
    /// what `predicate` says, since a candidate must be closed.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&Expr) -> bool + 'e) -> Self {
        self.can_fold = Box::new(predicate);
        self
    }

    /// Fold every candidate subtree of `expr`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn eval(&self, expr: &Expr) -> Expr {
        let mut nominator = Nominator {
            can_fold: &*self.can_fold,
            candidates: FxHashSet::default(),
        };
        nominator.nominate(expr);
        tracing::trace!(candidates = nominator.candidates.len(), "nominated");
        SubtreeEvaluator {
            evaluator: self.evaluator,
            candidates: &nominator.candidates,
        }
        .rewrite(expr)
    }

    /// Fold the body of `lambda`, keeping its parameters.
    pub fn eval_lambda(&self, lambda: &LambdaParts) -> LambdaParts {
        let body = self.eval(lambda.body());
        if body.ptr_eq(lambda.body()) {
            return lambda.clone();
        }
        lambda.with_body(body)
    }
}

/// Fold `expr` with the default predicate.
pub fn partial_eval(evaluator: &dyn Evaluator, expr: &Expr) -> Expr {
    PartialEvaluator::new(evaluator).eval(expr)
}

/// Fold the body of `lambda` with the default predicate.
pub fn partial_eval_lambda(evaluator: &dyn Evaluator, lambda: &LambdaParts) -> LambdaParts {
    PartialEvaluator::new(evaluator).eval_lambda(lambda)
}

/// Bottom-up pass collecting foldable nodes by address.
struct Nominator<'p> {
    can_fold: &'p dyn Fn(&Expr) -> bool,
    candidates: FxHashSet<usize>,
}

impl Nominator<'_> {
    fn nominate(&mut self, expr: &Expr) -> bool {
        ensure_sufficient_stack(|| {
            let mut closed = true;
            for child in expr.children() {
                closed &= self.nominate(child);
            }
            let candidate =
                closed && expr.as_parameter().is_none() && (self.can_fold)(expr);
            if candidate {
                self.candidates.insert(expr.addr());
            }
            candidate
        })
    }
}

/// Top-down pass replacing the outermost candidates.
struct SubtreeEvaluator<'a> {
    evaluator: &'a dyn Evaluator,
    candidates: &'a FxHashSet<usize>,
}

impl SubtreeEvaluator<'_> {
    fn fold(&self, expr: &Expr) -> Expr {
        if expr.as_constant().is_some() {
            return expr.clone();
        }
        let ty = expr.ty().clone();
        match self.evaluator.evaluate(expr) {
            Ok(value) => Expr::constant(value, ty),
            Err(err) => {
                tracing::trace!(error = %err, "fold candidate failed, deferring");
                Expr::raise(Arc::new(err), ty)
            }
        }
    }
}

impl Rewriter for SubtreeEvaluator<'_> {
    fn rewrite(&mut self, expr: &Expr) -> Expr {
        if self.candidates.contains(&expr.addr()) {
            return self.fold(expr);
        }
        ensure_sufficient_stack(|| walk_children(self, expr))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;
    use arbor_ir::{BinaryOp, ClassDef, CtorDef, MethodDef, Ty, Value};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn closed_subtrees_fold_to_constants() {
        let x = Expr::parameter("x", Ty::I32);
        let closed = Expr::binary(BinaryOp::Multiply, Expr::literal(6), Expr::literal(7));
        let tree = Expr::add(x, closed);
        let folded = partial_eval(&Interpreter::new(), &tree);
        assert_eq!(folded.to_string(), "(x + 42)");
    }

    #[test]
    fn fully_closed_tree_becomes_one_constant() {
        let tree = Expr::add(Expr::literal(1), Expr::add(Expr::literal(2), Expr::literal(3)));
        let folded = partial_eval(&Interpreter::new(), &tree);
        assert_eq!(folded.as_constant(), Some(&Value::I32(6)));
        assert_eq!(folded.ty(), &Ty::I32);
    }

    #[test]
    fn constants_and_parameters_are_left_alone() {
        let x = Expr::parameter("x", Ty::I32);
        let tree = Expr::add(x, Expr::literal(1));
        let folded = partial_eval(&Interpreter::new(), &tree);
        assert!(folded.ptr_eq(&tree));
    }

    #[test]
    fn failing_candidates_become_raise_nodes() {
        let x = Expr::parameter("x", Ty::I32);
        let failing = Expr::binary(BinaryOp::Divide, Expr::literal(1), Expr::literal(0));
        let tree = Expr::add(x.clone(), failing);
        let folded = partial_eval(&Interpreter::new(), &tree);
        let arbor_ir::ExprKind::Binary(binary) = folded.kind() else {
            panic!("expected the addition to survive");
        };
        assert!(matches!(binary.right.kind(), ExprKind::Raise(_)));
        assert_eq!(binary.right.ty(), &Ty::I32);

        let callable = Interpreter::new().interpret_lambda(&LambdaParts::single(x, folded));
        let err = callable(&[Value::I32(1)]).unwrap_err();
        assert!(matches!(err.root_cause(), crate::EvalError::DivideByZero));
    }

    #[test]
    fn lambda_bodies_fold_around_their_parameters() {
        let y = Expr::parameter("y", Ty::I32);
        let inner = LambdaParts::single(
            y.clone(),
            Expr::add(y, Expr::add(Expr::literal(2), Expr::literal(2))),
        );
        let folded = partial_eval(&Interpreter::new(), &Expr::lambda(inner));
        assert_eq!(folded.as_lambda().unwrap().body().to_string(), "(y + 4)");
    }

    #[test]
    fn folding_twice_changes_nothing() {
        let x = Expr::parameter("x", Ty::I32);
        let tree = Expr::add(
            Expr::binary(BinaryOp::Multiply, x, Expr::add(Expr::literal(1), Expr::literal(2))),
            Expr::binary(BinaryOp::Divide, Expr::literal(1), Expr::literal(0)),
        );
        let interpreter = Interpreter::new();
        let once = partial_eval(&interpreter, &tree);
        let twice = partial_eval(&interpreter, &once);
        assert!(twice.ptr_eq(&once));
    }

    #[test]
    fn non_foldable_calls_stay_in_the_tree() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let tick = MethodDef::builder("Tick")
            .param(Ty::I32)
            .returns(Ty::I32)
            .flags(MemberFlags::STATIC | MemberFlags::NON_FOLDABLE)
            .body(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::I32(10))
            })
            .build();
        let call = Expr::call(None, &tick, vec![Expr::add(Expr::literal(1), Expr::literal(2))]);
        let tree = Expr::add(call, Expr::literal(5));

        let interpreter = Interpreter::new();
        let folded = partial_eval(&interpreter, &tree);
        assert_eq!(folded.to_string(), "(Tick(3) + 5)");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(interpreter.interpret(&folded).unwrap(), Value::I32(15));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_foldable_constructions_stay_in_the_tree() {
        let counter = ClassDef::builder("Counter").build();
        let class = Arc::clone(&counter);
        let built = Arc::new(AtomicUsize::new(0));
        let tally = Arc::clone(&built);
        let ctor = CtorDef::builder(Ty::class(&counter))
            .param(Ty::I32)
            .flags(MemberFlags::NON_FOLDABLE)
            .body(move |args| {
                tally.fetch_add(1, Ordering::SeqCst);
                Ok(Value::object(&class, args.to_vec()))
            });
        let tree = Expr::new_object(&ctor, vec![Expr::add(Expr::literal(1), Expr::literal(2))]);

        let folded = partial_eval(&Interpreter::new(), &tree);
        assert_eq!(folded.to_string(), "new Counter(3)");
        assert!(matches!(folded.kind(), ExprKind::New(_)));
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn foldable_constructions_become_constants() {
        let counter = ClassDef::builder("Counter").build();
        let class = Arc::clone(&counter);
        let ctor = CtorDef::new(Ty::class(&counter), vec![Ty::I32], move |args| {
            Ok(Value::object(&class, args.to_vec()))
        });
        let tree = Expr::new_object(&ctor, vec![Expr::literal(1)]);
        let folded = partial_eval(&Interpreter::new(), &tree);
        assert!(folded.as_constant().is_some());
    }

    #[test]
    fn custom_predicate_blocks_folding() {
        let tree = Expr::add(Expr::literal(1), Expr::literal(2));
        let interpreter = Interpreter::new();
        let folded = PartialEvaluator::new(&interpreter)
            .with_predicate(|expr| expr.as_constant().is_some())
            .eval(&tree);
        assert!(folded.ptr_eq(&tree));
    }
}
