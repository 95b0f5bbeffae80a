//! Cross-module tests.
//!
//! - `agreement_tests`: interpreter, compiler and cached compiler agree on a
//!   battery of trees and on generated ones, including short-circuit
//!   laterality and narrowing
//! - `cache_tests`: structural cache sharing, constant feeding, races
//! - `evaluator_tests`: typed shapes and the adapter cache
//! - `expand_tests`: rewrite rules, containment and the depth guard

mod agreement_tests;
mod cache_tests;

use std::mem::Discriminant;

use arbor_ir::Value;

use crate::{
    CacheConfig, CachedCompiler, ClosureBackend, Compiler, EvalError, EvalResult, Interpreter,
};

/// Observable outcome of an evaluation: the value, or the kind of the root
/// error. Evaluators differ in how they wrap errors, not in which one they
/// raise.
pub(super) fn outcome(result: EvalResult) -> Result<Value, Discriminant<EvalError>> {
    result.map_err(|err| std::mem::discriminant(err.root_cause()))
}

/// A cache with default settings that ignores the environment.
pub(super) fn fresh_cache() -> CachedCompiler {
    CachedCompiler::with_backend(std::sync::Arc::new(ClosureBackend), CacheConfig::default())
}

pub(super) struct Evaluators {
    pub interpreter: Interpreter,
    pub compiler: Compiler,
    pub cache: CachedCompiler,
}

impl Evaluators {
    pub fn new() -> Self {
        Evaluators {
            interpreter: Interpreter::new(),
            compiler: Compiler::new(),
            cache: fresh_cache(),
        }
    }

    pub fn all(&self) -> [(&'static str, &dyn crate::Evaluator); 3] {
        [
            ("interpreter", &self.interpreter),
            ("compiler", &self.compiler),
            ("cache", &self.cache),
        ]
    }
}
