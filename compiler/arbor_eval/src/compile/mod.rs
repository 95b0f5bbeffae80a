//! Compilation of lambdas into reusable callables.
//!
//! - [`Backend`]: turns a body and its ordered parameters into a
//!   [`Callable`]. [`ClosureBackend`] is the backend shipped here.
//! - [`Compiler`]: compiles on every request, no caching.
//! - [`CachedCompiler`]: compiles once per structural shape and feeds each
//!   call's own constants to the shared artifact.

mod cache;
mod closure;

pub use cache::{CacheConfig, CachedCompiler, HASH_DEPTH_ENV};
pub use closure::ClosureBackend;

use std::sync::Arc;

use arbor_ir::{Expr, LambdaParts};

use crate::errors::EvalError;
use crate::evaluator::{AdapterCache, Callable, Evaluator};

/// Code generation for a lambda body.
///
/// The returned callable takes one value per entry of `params`, in order.
/// Compiling the same input twice must yield callables that behave the same.
pub trait Backend: Send + Sync {
    fn compile(&self, body: &Expr, params: &[Expr]) -> Result<Callable, EvalError>;
}

/// Compiles every lambda it is given.
pub struct Compiler {
    backend: Arc<dyn Backend>,
    adapters: AdapterCache,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler over the [`ClosureBackend`].
    pub fn new() -> Self {
        Self::with_backend(Arc::new(ClosureBackend))
    }

    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Compiler {
            backend,
            adapters: AdapterCache::new(),
        }
    }
}

impl Evaluator for Compiler {
    fn evaluate_lambda(&self, lambda: &LambdaParts) -> Result<Callable, EvalError> {
        self.backend.compile(lambda.body(), lambda.params())
    }

    fn adapters(&self) -> &AdapterCache {
        &self.adapters
    }
}
