//! Arbor Eval - executing and rewriting expression trees
//!
//! Three interchangeable [`Evaluator`]s:
//! - [`Interpreter`]: walks the tree directly, resolving host members
//!   through a [`Reflector`]
//! - [`Compiler`]: lowers each lambda to a tree of native closures
//! - [`CachedCompiler`]: compiles once per structural shape, so trees that
//!   differ only in literal values share one artifact
//!
//! And two tree-to-tree passes built on them:
//! - [`PartialEvaluator`]: folds closed subtrees into constants
//! - [`Expander`]: applies registered [`RewriteRule`]s at call and property
//!   sites
//!
//! Rewriting is total. Subtrees that would fail are replaced by Raise nodes
//! that fail only when executed.
//!
//! # Logging
//!
//! Events go through `tracing`; this crate never installs a subscriber.
//! Cache decisions log at `debug`, fold decisions at `trace`, and contained
//! rewrite failures at `warn`.

mod compile;
pub mod convert;
pub mod errors;
mod evaluator;
mod expand;
pub mod interpreter;
pub mod operators;
mod partial;

pub use compile::{
    Backend, CacheConfig, CachedCompiler, ClosureBackend, Compiler, HASH_DEPTH_ENV,
};
pub use errors::{EvalError, EvalResult, ExpansionError};
pub use evaluator::{ensure_closed, Adapter, AdapterCache, Callable, Evaluator, Shape, ValueType};
pub use expand::{
    eval_method, ExpandConfig, Expander, InlineEval, RewriteContext, RewriteRegistry,
    RewriteRule, MAX_DEPTH_ENV,
};
pub use interpreter::{Interpreter, InterpreterBuilder, NativeReflector, Reflector};
pub use partial::{can_fold, partial_eval, partial_eval_lambda, PartialEvaluator};

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
