//! Expansion of calls and property reads through registered rewrite rules.
//!
//! A [`RewriteRegistry`] maps member identities to [`RewriteRule`]s and is
//! populated at startup. The [`Expander`] visits every Call and property
//! Member node: children are expanded first, then the site's rule (if any)
//! produces a replacement, and the replacement is expanded in turn.
//!
//! A failing rule is contained: the node becomes a Raise of the same type
//! carrying an [`ExpansionError`](crate::errors::ExpansionError), and the rest
//! of the tree is still expanded. Rules that keep introducing rewritable
//! sites are cut off at [`ExpandConfig::max_depth`] the same way.

use std::sync::Arc;

use arbor_canon::substitute;
use arbor_ir::visitor::walk_children;
use arbor_ir::{
    Call, Expr, FuncSig, HostError, LambdaParts, MemberAccess, MemberDef, MemberFlags, MemberId,
    MethodDef, Rewriter, Ty,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::errors::{expansion_failed, expansion_too_deep, invalid_cast, null_reference, EvalError};
use crate::evaluator::Evaluator;
use crate::interpreter::{quoted, Interpreter};

/// Environment variable overriding [`ExpandConfig::max_depth`].
pub const MAX_DEPTH_ENV: &str = "ARBOR_EXPAND_MAX_DEPTH";

/// What a rule may use while rewriting.
pub struct RewriteContext<'a> {
    evaluator: &'a dyn Evaluator,
}

impl RewriteContext<'_> {
    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator
    }
}

/// Rewrites one kind of call or property site.
pub trait RewriteRule: Send + Sync {
    /// Name reported in expansion failures and logs.
    fn name(&self) -> &str;

    /// Produce a replacement for `expr`, whose children are already expanded.
    fn rewrite(&self, expr: &Expr, cx: &RewriteContext<'_>) -> Result<Expr, EvalError>;
}

/// Rules keyed by the identity of the method or property they rewrite.
#[derive(Default)]
pub struct RewriteRegistry {
    rules: RwLock<FxHashMap<MemberId, Arc<dyn RewriteRule>>>,
}

impl RewriteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite every call of `method` with `rule`, replacing any earlier rule.
    pub fn register_method(&self, method: &Arc<MethodDef>, rule: Arc<dyn RewriteRule>) {
        tracing::debug!(method = method.name(), rule = rule.name(), "registered rewrite rule");
        self.rules.write().insert(method.id(), rule);
    }

    /// Rewrite every read of the property `member` with `rule`.
    pub fn register_member(&self, member: &Arc<MemberDef>, rule: Arc<dyn RewriteRule>) {
        tracing::debug!(member = member.name(), rule = rule.name(), "registered rewrite rule");
        self.rules.write().insert(member.id(), rule);
    }

    pub fn lookup(&self, id: MemberId) -> Option<Arc<dyn RewriteRule>> {
        self.rules.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpandConfig {
    /// Longest chain of rule applications whose output is expanded again.
    pub max_depth: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        ExpandConfig { max_depth: 64 }
    }
}

impl ExpandConfig {
    /// Defaults, with `ARBOR_EXPAND_MAX_DEPTH` applied when it parses.
    pub fn from_env() -> Self {
        let mut config = ExpandConfig::default();
        if let Some(depth) = std::env::var(MAX_DEPTH_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
        {
            config.max_depth = depth;
        }
        config
    }
}

pub struct Expander<'e> {
    registry: &'e RewriteRegistry,
    evaluator: &'e dyn Evaluator,
    config: ExpandConfig,
}

impl<'e> Expander<'e> {
    /// An expander configured from the environment.
    pub fn new(registry: &'e RewriteRegistry, evaluator: &'e dyn Evaluator) -> Self {
        Self::with_config(registry, evaluator, ExpandConfig::from_env())
    }

    pub fn with_config(
        registry: &'e RewriteRegistry,
        evaluator: &'e dyn Evaluator,
        config: ExpandConfig,
    ) -> Self {
        Expander {
            registry,
            evaluator,
            config,
        }
    }

    /// Expand every rewritable site of `expr`. Never fails.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn expand(&self, expr: &Expr) -> Expr {
        if self.registry.is_empty() {
            return expr.clone();
        }
        Expansion {
            expander: self,
            depth: 0,
        }
        .rewrite(expr)
    }

    pub fn expand_lambda(&self, lambda: &LambdaParts) -> LambdaParts {
        let body = self.expand(lambda.body());
        if body.ptr_eq(lambda.body()) {
            return lambda.clone();
        }
        lambda.with_body(body)
    }
}

/// One expansion run; `depth` counts nested re-expansions of rule output.
struct Expansion<'a, 'e> {
    expander: &'a Expander<'e>,
    depth: usize,
}

impl Expansion<'_, '_> {
    fn apply(&mut self, expr: &Expr, id: MemberId) -> Expr {
        let expanded = walk_children(self, expr);
        let Some(rule) = self.expander.registry.lookup(id) else {
            return expanded;
        };
        let ty = expr.ty().clone();
        let limit = self.expander.config.max_depth;
        if self.depth >= limit {
            tracing::warn!(rule = rule.name(), limit, "expansion depth exceeded");
            let err = expansion_failed(rule.name(), &expanded, expansion_too_deep(limit));
            return Expr::raise(Arc::new(err), ty);
        }
        let cx = RewriteContext {
            evaluator: self.expander.evaluator,
        };
        match rule.rewrite(&expanded, &cx) {
            Ok(replacement) => {
                tracing::debug!(rule = rule.name(), depth = self.depth, "applied rewrite rule");
                self.depth += 1;
                let result = self.rewrite(&replacement);
                self.depth -= 1;
                result
            }
            Err(cause) => {
                tracing::warn!(
                    rule = rule.name(),
                    error = %cause,
                    "rewrite rule failed, deferring"
                );
                Expr::raise(Arc::new(expansion_failed(rule.name(), &expanded, cause)), ty)
            }
        }
    }
}

impl Rewriter for Expansion<'_, '_> {
    fn rewrite_call(&mut self, expr: &Expr, call: &Call) -> Expr {
        self.apply(expr, call.method.id())
    }

    fn rewrite_member(&mut self, expr: &Expr, access: &MemberAccess) -> Expr {
        if !access.member.is_property() {
            return walk_children(self, expr);
        }
        self.apply(expr, access.member.id())
    }
}

/// Inlines `Eval(f, args..)` as the body of `f` with `args` substituted for
/// its parameters.
///
/// `f` is used as is when it is a lambda node; otherwise it is evaluated and
/// must produce a lambda value.
pub struct InlineEval;

impl RewriteRule for InlineEval {
    fn name(&self) -> &str {
        "InlineEval"
    }

    fn rewrite(&self, expr: &Expr, cx: &RewriteContext<'_>) -> Result<Expr, EvalError> {
        let arbor_ir::ExprKind::Call(call) = expr.kind() else {
            return Ok(expr.clone());
        };
        let Some((target, args)) = call.args.split_first() else {
            return Ok(expr.clone());
        };
        if let Some(parts) = target.as_lambda() {
            return Ok(substitute(parts, args)?);
        }
        let value = cx.evaluator().evaluate(target)?;
        match quoted(&value) {
            Some(parts) => Ok(substitute(parts, args)?),
            None if value.is_null() => Err(null_reference("Eval target")),
            None => Err(invalid_cast(&value, target.ty())),
        }
    }
}

/// The static `Eval` method for lambdas of signature `sig`.
///
/// Its first parameter is the lambda, followed by `sig`'s parameters. Called
/// directly it interprets the lambda; register [`InlineEval`] for it to have
/// calls inlined instead.
pub fn eval_method(sig: &FuncSig) -> Arc<MethodDef> {
    let mut builder = MethodDef::builder("Eval")
        .param(Ty::func(sig.params.clone(), sig.ret.clone()))
        .returns(sig.ret.clone())
        .flags(MemberFlags::STATIC);
    for param in &sig.params {
        builder = builder.param(param.clone());
    }
    builder
        .body(|_, args| {
            let Some((target, rest)) = args.split_first() else {
                return Err(HostError::new("Eval expects a lambda"));
            };
            let parts =
                quoted(target).ok_or_else(|| HostError::new("Eval target is not a lambda"))?;
            Interpreter::new()
                .interpret_lambda(parts)(rest)
                .map_err(|err| HostError::new(err.to_string()))
        })
        .build()
}

