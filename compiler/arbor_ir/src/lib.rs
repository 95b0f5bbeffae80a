//! Arbor IR - expression tree model
//!
//! This crate contains the data structures every other Arbor crate works on:
//! - `Ty` static types, `Value` runtime values
//! - Class, method, member and constructor definitions with override tables
//! - `Expr`, an immutable, structurally shared expression tree
//! - The exhaustive `ExprVisitor` and the child-first `Rewriter`
//! - FNV hashing and structural identity (`equal`, `hash`, `ShapeKey`)
//!
//! # Design Philosophy
//!
//! - **Immutable nodes**: `Expr` is an `Arc` handle; rewrites rebuild only the
//!   spine that changed and keep untouched subtrees shared.
//! - **Identity by id**: members and parameters carry numeric ids minted at
//!   definition time. Structural comparison uses member ids and parameter names.
//! - **Closed sum type**: adding a node kind is a compile error in every
//!   exhaustive visitor until it is handled.

mod class;
pub mod expr;
pub mod hash;
mod member;
mod stack;
pub mod structure;
mod ty;
mod value;
pub mod visitor;

pub use class::{ClassBuilder, ClassDef, ClassKind};
pub use expr::{
    Binary, BinaryOp, BuildError, Call, Conditional, Expr, ExprKind, Extension, ForeignKind, Index,
    LambdaParts, Lifting, MemberAccess, New, NewArray, NodeKind, ParamDef, ParamId, Raise, TypeIs,
    Unary, UnaryOp,
};
pub use member::{
    CtorBody, CtorBuilder, CtorDef, Getter, HostError, MemberDef, MemberFlags, MemberId,
    MemberKind, MethodBody, MethodBuilder, MethodDef, PropertyBuilder,
};
pub use stack::ensure_sufficient_stack;
pub use structure::{ShapeKey, StructureError, DEFAULT_HASH_DEPTH};
pub use ty::{DefId, EnumDef, FuncSig, Ty};
pub use value::{DeferredError, Object, Value};
pub use visitor::{ExprVisitor, Rewriter};
