//! Compilation cache keyed by structural shape.
//!
//! Trees that differ only in embedded constants share one compiled artifact.
//! The artifact is compiled from the constant-free body with the extracted
//! placeholders as leading parameters; each call supplies its own constants
//! in front of the caller's arguments.
//!
//! # Keys
//!
//! A [`ShapeKey`] hashes the original lambda to a bounded depth, ignoring
//! constant values, and compares full structure on collision. Only the
//! literal values may differ between two trees that share an entry; node
//! kinds, operators, member identities, parameter names and all static
//! types must match.
//!
//! # Races
//!
//! Lookups and inserts never hold a lock across compilation. Two threads
//! missing on the same key both compile; the first insert wins and the other
//! result is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arbor_canon::{extract_constants, extract_constants_only};
use arbor_ir::{Expr, LambdaParts, ShapeKey, Value, DEFAULT_HASH_DEPTH};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use super::{Backend, ClosureBackend};
use crate::errors::{wrong_arg_count, EvalError, EvalResult};
use crate::evaluator::{ensure_closed, AdapterCache, Callable, Evaluator};

/// Environment variable overriding [`CacheConfig::hash_depth`].
pub const HASH_DEPTH_ENV: &str = "ARBOR_CACHE_HASH_DEPTH";

/// Tunables of a [`CachedCompiler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Depth to which cache keys are hashed.
    pub hash_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            hash_depth: DEFAULT_HASH_DEPTH,
        }
    }
}

impl CacheConfig {
    /// Defaults, with `ARBOR_CACHE_HASH_DEPTH` applied when it parses.
    pub fn from_env() -> Self {
        let mut config = CacheConfig::default();
        if let Some(depth) = std::env::var(HASH_DEPTH_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
        {
            config.hash_depth = depth;
        }
        config
    }
}

/// Evaluator that compiles each structural shape once.
pub struct CachedCompiler {
    backend: Arc<dyn Backend>,
    config: CacheConfig,
    artifacts: DashMap<ShapeKey, Callable, FxBuildHasher>,
    compiles: AtomicUsize,
    adapters: AdapterCache,
}

impl Default for CachedCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl CachedCompiler {
    /// A cache over the [`ClosureBackend`], configured from the environment.
    pub fn new() -> Self {
        Self::with_backend(Arc::new(ClosureBackend), CacheConfig::from_env())
    }

    pub fn with_backend(backend: Arc<dyn Backend>, config: CacheConfig) -> Self {
        CachedCompiler {
            backend,
            config,
            artifacts: DashMap::default(),
            compiles: AtomicUsize::new(0),
            adapters: AdapterCache::new(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Evaluate a closed tree through the cache.
    pub fn evaluate_once(&self, expr: &Expr) -> EvalResult {
        let callable = self.get_or_compile(&LambdaParts::closed(expr.clone()))?;
        callable(&[])
    }

    /// A callable for `lambda`, compiling only when no tree of the same shape
    /// was compiled before.
    #[tracing::instrument(level = "trace", skip_all, fields(params = lambda.params().len()))]
    pub fn get_or_compile(&self, lambda: &LambdaParts) -> Result<Callable, EvalError> {
        let key = ShapeKey::new(lambda.to_expr(), self.config.hash_depth)?;
        let hit = self
            .artifacts
            .get(&key)
            .map(|entry| Arc::clone(entry.value()));
        let (artifact, constants) = match hit {
            Some(artifact) => {
                tracing::debug!(hash = key.hash_code(), "compilation cache hit");
                (artifact, extract_constants_only(lambda.body()))
            }
            None => {
                tracing::debug!(hash = key.hash_code(), "compilation cache miss");
                let extraction = extract_constants(lambda.body());
                let mut params = extraction.placeholders;
                params.extend_from_slice(lambda.params());
                let compiled = self.backend.compile(&extraction.body, &params)?;
                self.compiles.fetch_add(1, Ordering::Relaxed);
                let artifact = match self.artifacts.entry(key) {
                    Entry::Occupied(winner) => {
                        tracing::debug!("lost compilation race, discarding artifact");
                        Arc::clone(winner.get())
                    }
                    Entry::Vacant(slot) => Arc::clone(slot.insert(compiled).value()),
                };
                (artifact, extraction.values)
            }
        };
        Ok(bind_constants(artifact, constants, lambda.params().len()))
    }

    /// Whether a tree of `lambda`'s shape has been compiled.
    pub fn is_cached(&self, lambda: &LambdaParts) -> bool {
        ShapeKey::new(lambda.to_expr(), self.config.hash_depth)
            .is_ok_and(|key| self.artifacts.contains_key(&key))
    }

    /// Drop every cached artifact.
    pub fn clear(&self) {
        self.artifacts.clear();
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Number of backend compilations performed, lost races included.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }
}

/// Prepend `constants` to every call of `artifact`.
fn bind_constants(artifact: Callable, constants: Vec<Value>, arity: usize) -> Callable {
    if constants.is_empty() {
        return Arc::new(move |args: &[Value]| {
            if args.len() != arity {
                return Err(wrong_arg_count(arity, args.len()));
            }
            artifact(args)
        });
    }
    Arc::new(move |args: &[Value]| {
        if args.len() != arity {
            return Err(wrong_arg_count(arity, args.len()));
        }
        let mut all = Vec::with_capacity(constants.len() + args.len());
        all.extend_from_slice(&constants);
        all.extend_from_slice(args);
        artifact(&all)
    })
}

impl Evaluator for CachedCompiler {
    fn evaluate(&self, expr: &Expr) -> EvalResult {
        ensure_closed(expr)?;
        self.evaluate_once(expr)
    }

    fn evaluate_lambda(&self, lambda: &LambdaParts) -> Result<Callable, EvalError> {
        self.get_or_compile(lambda)
    }

    fn adapters(&self) -> &AdapterCache {
        &self.adapters
    }
}
