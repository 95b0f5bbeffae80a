//! Canonicalizing rewrites over Arbor expression trees.
//!
//! Every operation here is a pure `Expr -> Expr` transformation built on the
//! [`arbor_ir::Rewriter`] fold:
//!
//! - [`extract`]: lift embedded constants out into placeholder parameters,
//!   so trees differing only in literal values share one compiled artifact.
//! - [`param_list`]: collapse a lambda's parameters into a single argument
//!   array, the calling convention of the closure backend.
//! - [`substitute`]: replace a lambda's parameters with expressions, with an
//!   optional specializing mode that re-resolves virtual members.
//! - [`simplify`]: boolean short-circuit and constant-test reduction.
//!
//! Rewriting is total: none of these functions evaluates the tree.

pub mod extract;
pub mod param_list;
pub mod simplify;
pub mod substitute;

pub use extract::{extract_constants, extract_constants_only, replace_constants, Extraction};
pub use param_list::{rewrite_lambda, ARGS_NAME};
pub use simplify::simplify;
pub use substitute::{substitute, substitute_simple, SubstituteError};
