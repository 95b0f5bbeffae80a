//! Structural identity of expression trees.
//!
//! Two trees are structurally equal when they have the same shape: node
//! kinds, operators, static types, member identities and (optionally)
//! constant values all match position by position. Parameters are matched
//! by name and type, never by declaration identity, so two independently
//! built `x => x + 1` trees are equal.
//!
//! # Hashing
//!
//! [`hash`] folds the same information with the FNV accumulator, but only
//! down to a bounded depth. A full-depth hash would cost as much as a full
//! comparison; the bounded hash keeps bucket lookup cheap and [`equal`]
//! decides on collision. Equal trees always hash equal, at any depth.
//!
//! # Unsupported kinds
//!
//! Comparing two `Extension` nodes of the same kind fails with
//! [`StructureError::Comparison`] instead of answering `false`.

use std::hash::{Hash, Hasher};

use crate::expr::{Expr, ExprKind, ForeignKind};
use crate::hash::Fnv;
use crate::member::{MemberDef, MethodDef};
use crate::stack::ensure_sufficient_stack;
use crate::visitor::for_each_node;

use std::sync::Arc;

/// Hash depth used by cache keys.
pub const DEFAULT_HASH_DEPTH: usize = 5;

#[derive(Clone, Debug, thiserror::Error)]
pub enum StructureError {
    #[error("`{kind}` expressions are outside the supported subset")]
    Unsupported { kind: ForeignKind },
    #[error("could not compare `{left}` and `{right}`")]
    Comparison {
        left: Expr,
        right: Expr,
        #[source]
        cause: Box<StructureError>,
    },
}

/// Whether `a` and `b` are structurally equal.
pub fn equal(a: &Expr, b: &Expr, ignore_constant_values: bool) -> Result<bool, StructureError> {
    let comparer = Comparer {
        ignore_constant_values,
    };
    comparer
        .eq(a, b)
        .map_err(|cause| StructureError::Comparison {
            left: a.clone(),
            right: b.clone(),
            cause: Box::new(cause),
        })
}

/// Bounded-depth structural hash. `max_depth == None` hashes the whole tree.
pub fn hash(expr: &Expr, ignore_constant_values: bool, max_depth: Option<usize>) -> u32 {
    let mut hasher = ShapeHasher {
        fnv: Fnv::new(),
        ignore_constant_values,
        max_depth,
        depth: 0,
    };
    hasher.node(expr);
    hasher.fnv.finish()
}

/// Reject trees containing kinds outside the supported subset.
pub fn validate(expr: &Expr) -> Result<(), StructureError> {
    let mut found = None;
    for_each_node(expr, &mut |node| {
        if let (None, ExprKind::Extension(ext)) = (&found, node.kind()) {
            found = Some(ext.kind);
        }
    });
    match found {
        Some(kind) => Err(StructureError::Unsupported { kind }),
        None => Ok(()),
    }
}

struct Comparer {
    ignore_constant_values: bool,
}

impl Comparer {
    fn eq(&self, a: &Expr, b: &Expr) -> Result<bool, StructureError> {
        ensure_sufficient_stack(|| self.eq_node(a, b))
    }

    fn eq_opt(&self, a: Option<&Expr>, b: Option<&Expr>) -> Result<bool, StructureError> {
        match (a, b) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => self.eq(a, b),
            _ => Ok(false),
        }
    }

    fn eq_all(&self, a: &[Expr], b: &[Expr]) -> Result<bool, StructureError> {
        if a.len() != b.len() {
            return Ok(false);
        }
        for (x, y) in a.iter().zip(b) {
            if !self.eq(x, y)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn eq_node(&self, a: &Expr, b: &Expr) -> Result<bool, StructureError> {
        if a.ptr_eq(b) {
            return Ok(true);
        }
        if a.node_kind() != b.node_kind() || a.ty() != b.ty() {
            return Ok(false);
        }
        let equal = match (a.kind(), b.kind()) {
            (ExprKind::Constant(x), ExprKind::Constant(y)) => self.ignore_constant_values || x == y,
            (ExprKind::Parameter(x), ExprKind::Parameter(y)) => x.name() == y.name(),
            (ExprKind::Binary(x), ExprKind::Binary(y)) => {
                x.lifting == y.lifting
                    && same_method(x.method.as_ref(), y.method.as_ref())
                    && self.eq(&x.left, &y.left)?
                    && self.eq(&x.right, &y.right)?
                    && self.eq_opt(x.conversion.as_ref(), y.conversion.as_ref())?
            }
            (ExprKind::Unary(x), ExprKind::Unary(y)) => {
                x.lifted == y.lifted
                    && same_method(x.method.as_ref(), y.method.as_ref())
                    && self.eq(&x.operand, &y.operand)?
            }
            (ExprKind::Conditional(x), ExprKind::Conditional(y)) => {
                self.eq(&x.test, &y.test)?
                    && self.eq(&x.if_true, &y.if_true)?
                    && self.eq(&x.if_false, &y.if_false)?
            }
            (ExprKind::Member(x), ExprKind::Member(y)) => {
                same_member(&x.member, &y.member)
                    && self.eq_opt(x.receiver.as_ref(), y.receiver.as_ref())?
            }
            (ExprKind::Call(x), ExprKind::Call(y)) => {
                x.method.id() == y.method.id()
                    && self.eq_opt(x.receiver.as_ref(), y.receiver.as_ref())?
                    && self.eq_all(&x.args, &y.args)?
            }
            (ExprKind::New(x), ExprKind::New(y)) => {
                x.ctor.id() == y.ctor.id() && self.eq_all(&x.args, &y.args)?
            }
            (ExprKind::NewArray(x), ExprKind::NewArray(y)) => {
                x.element == y.element && self.eq_all(&x.items, &y.items)?
            }
            (ExprKind::Index(x), ExprKind::Index(y)) => {
                same_method(x.indexer.as_ref(), y.indexer.as_ref())
                    && self.eq(&x.receiver, &y.receiver)?
                    && self.eq_all(&x.args, &y.args)?
            }
            (ExprKind::TypeIs(x), ExprKind::TypeIs(y)) => {
                x.target == y.target && self.eq(&x.operand, &y.operand)?
            }
            (ExprKind::Lambda(x), ExprKind::Lambda(y)) => {
                self.eq_all(x.params(), y.params())? && self.eq(x.body(), y.body())?
            }
            (ExprKind::Raise(x), ExprKind::Raise(y)) => self.eq(&x.payload, &y.payload)?,
            (ExprKind::Extension(x), ExprKind::Extension(_)) => {
                return Err(StructureError::Unsupported { kind: x.kind });
            }
            _ => false,
        };
        Ok(equal)
    }
}

fn same_method(a: Option<&Arc<MethodDef>>, b: Option<&Arc<MethodDef>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.id() == b.id(),
        _ => false,
    }
}

fn same_member(a: &MemberDef, b: &MemberDef) -> bool {
    a.id() == b.id()
}

struct ShapeHasher {
    fnv: Fnv,
    ignore_constant_values: bool,
    max_depth: Option<usize>,
    depth: usize,
}

impl ShapeHasher {
    fn node(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| {
            self.fnv.mix(expr.node_kind().code());
            self.depth += 1;
            if self.max_depth.map_or(true, |max| max > self.depth) {
                self.details(expr);
                for child in expr.children() {
                    self.node(child);
                }
            }
            self.fnv.mix(-1);
            self.depth -= 1;
        });
    }

    fn details(&mut self, expr: &Expr) {
        match expr.kind() {
            ExprKind::Constant(value) => {
                if self.ignore_constant_values {
                    self.fnv.mix(-1);
                } else {
                    self.fnv.mix_u32(value.hash_code());
                }
            }
            ExprKind::Parameter(_) => self.fnv.mix_u32(expr.ty().hash_code()),
            ExprKind::Member(access) => self.fnv.mix_u32(access.member.id().raw()),
            ExprKind::Call(call) => self.fnv.mix_u32(call.method.id().raw()),
            ExprKind::Lambda(parts) => {
                self.fnv.mix_u32(parts.body().ty().hash_code());
                for param in parts.params() {
                    self.node(param);
                }
            }
            _ => {}
        }
    }
}

/// Cache key: a lambda's shape with constant values ignored.
///
/// The key is validated on construction, so comparing two keys cannot run
/// into an unsupported kind.
#[derive(Clone, Debug)]
pub struct ShapeKey {
    lambda: Expr,
    hash: u32,
}

impl ShapeKey {
    pub fn new(lambda: Expr, hash_depth: usize) -> Result<Self, StructureError> {
        validate(&lambda)?;
        let hash = hash(&lambda, true, Some(hash_depth));
        Ok(ShapeKey { lambda, hash })
    }

    pub fn lambda(&self) -> &Expr {
        &self.lambda
    }

    pub fn hash_code(&self) -> u32 {
        self.hash
    }
}

impl PartialEq for ShapeKey {
    fn eq(&self, other: &Self) -> bool {
        // Both sides passed `validate`, so `equal` cannot fail here.
        self.hash == other.hash && equal(&self.lambda, &other.lambda, true).unwrap_or(false)
    }
}

impl Eq for ShapeKey {}

impl Hash for ShapeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash);
    }
}
