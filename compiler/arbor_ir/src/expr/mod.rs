//! Expression trees.
//!
//! An [`Expr`] is a cheap-to-clone handle to an immutable node. Each node
//! has an [`ExprKind`] and a static result type. Trees may share subtrees but
//! never contain cycles.
//!
//! # Children
//!
//! Every kind has a fixed, ordered list of child expressions (see
//! [`Expr::children`]). Traversals that need a pre-order, left-to-right walk
//! (constant extraction, hashing) all rely on this order. A lambda's children
//! are its body only; its parameters are declarations.
//!
//! # Types
//!
//! Factory functions compute the result type the usual way: comparisons
//! yield `bool`, arithmetic yields the left operand's type, lifted over
//! nullable operands. Rewrites that replace children keep the node's
//! original type.

mod display;
mod lambda;
mod ops;

pub use lambda::{BuildError, LambdaParts};
pub use ops::{BinaryOp, ForeignKind, Lifting, NodeKind, UnaryOp};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::member::{CtorDef, MemberDef, MethodDef};
use crate::stack::ensure_sufficient_stack;
use crate::ty::Ty;
use crate::value::{DeferredError, Value};

/// Identity of a parameter declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u32);

impl ParamId {
    fn fresh() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        ParamId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A parameter declaration. Each call to [`Expr::parameter`] mints a new id,
/// even for an existing name.
#[derive(Clone, Debug)]
pub struct ParamDef {
    id: ParamId,
    name: Arc<str>,
}

impl ParamDef {
    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Expr,
    pub right: Expr,
    pub lifting: Lifting,
    /// User-defined operator implementation.
    pub method: Option<Arc<MethodDef>>,
    /// Conversion lambda applied to the left operand of `Coalesce`.
    pub conversion: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Expr,
    pub lifted: bool,
    pub method: Option<Arc<MethodDef>>,
}

#[derive(Clone, Debug)]
pub struct Conditional {
    pub test: Expr,
    pub if_true: Expr,
    pub if_false: Expr,
}

#[derive(Clone, Debug)]
pub struct MemberAccess {
    /// `None` for static members.
    pub receiver: Option<Expr>,
    pub member: Arc<MemberDef>,
}

#[derive(Clone, Debug)]
pub struct Call {
    /// `None` for static methods.
    pub receiver: Option<Expr>,
    pub method: Arc<MethodDef>,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug)]
pub struct New {
    pub ctor: Arc<CtorDef>,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug)]
pub struct NewArray {
    pub element: Ty,
    pub items: Vec<Expr>,
}

#[derive(Clone, Debug)]
pub struct Index {
    pub receiver: Expr,
    /// `None` for array element access.
    pub indexer: Option<Arc<MethodDef>>,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug)]
pub struct TypeIs {
    pub operand: Expr,
    pub target: Ty,
}

/// Deferred-exception placeholder: raises the error held by `payload`
/// (a constant `Value::Error`) when executed.
#[derive(Clone, Debug)]
pub struct Raise {
    pub payload: Expr,
}

#[derive(Clone, Debug)]
pub struct Extension {
    pub kind: ForeignKind,
    pub children: Vec<Expr>,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Constant(Value),
    Parameter(ParamDef),
    Binary(Binary),
    Unary(Unary),
    Conditional(Conditional),
    Member(MemberAccess),
    Call(Call),
    New(New),
    NewArray(NewArray),
    Index(Index),
    TypeIs(TypeIs),
    Lambda(LambdaParts),
    Raise(Raise),
    Extension(Extension),
}

struct ExprNode {
    kind: ExprKind,
    ty: Ty,
}

/// Handle to an immutable expression node.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty) -> Self {
        Expr(Arc::new(ExprNode { kind, ty }))
    }

    #[inline]
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Static result type.
    #[inline]
    pub fn ty(&self) -> &Ty {
        &self.0.ty
    }

    /// Whether both handles point at the same node.
    #[inline]
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the node, usable as an identity key while the tree is alive.
    #[inline]
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn node_kind(&self) -> NodeKind {
        match self.kind() {
            ExprKind::Constant(_) => NodeKind::Constant,
            ExprKind::Parameter(_) => NodeKind::Parameter,
            ExprKind::Binary(binary) => NodeKind::Binary(binary.op),
            ExprKind::Unary(unary) => NodeKind::Unary(unary.op),
            ExprKind::Conditional(_) => NodeKind::Conditional,
            ExprKind::Member(_) => NodeKind::Member,
            ExprKind::Call(_) => NodeKind::Call,
            ExprKind::New(_) => NodeKind::New,
            ExprKind::NewArray(_) => NodeKind::NewArray,
            ExprKind::Index(_) => NodeKind::Index,
            ExprKind::TypeIs(_) => NodeKind::TypeIs,
            ExprKind::Lambda(_) => NodeKind::Lambda,
            ExprKind::Raise(_) => NodeKind::Raise,
            ExprKind::Extension(ext) => NodeKind::Extension(ext.kind),
        }
    }

    // Factories

    pub fn constant(value: Value, ty: Ty) -> Self {
        Expr::new(ExprKind::Constant(value), ty)
    }

    /// A constant typed by its runtime type. Null literals are typed `object`.
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.runtime_ty().unwrap_or(Ty::Object);
        Expr::constant(value, ty)
    }

    /// A fresh parameter declaration.
    pub fn parameter(name: &str, ty: Ty) -> Self {
        Expr::new(
            ExprKind::Parameter(ParamDef {
                id: ParamId::fresh(),
                name: Arc::from(name),
            }),
            ty,
        )
    }

    /// A built-in binary operator. Lifting and the result type follow the
    /// operand types.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let lifted =
            op != BinaryOp::Coalesce && (left.ty().is_nullable() || right.ty().is_nullable());
        let lifting = Lifting {
            lifted,
            to_null: lifted && !op.is_comparison(),
        };
        let ty = match op {
            _ if op.is_comparison() => Ty::Bool,
            BinaryOp::Coalesce => right.ty().clone(),
            _ if lifted => Ty::nullable(left.ty().non_nullable().clone()),
            _ => left.ty().clone(),
        };
        Expr::new(
            ExprKind::Binary(Binary {
                op,
                left,
                right,
                lifting,
                method: None,
                conversion: None,
            }),
            ty,
        )
    }

    /// A binary operator implemented by `method`.
    pub fn binary_with(op: BinaryOp, left: Expr, right: Expr, method: &Arc<MethodDef>) -> Self {
        let ty = method.ret().clone();
        Expr::new(
            ExprKind::Binary(Binary {
                op,
                left,
                right,
                lifting: Lifting::default(),
                method: Some(Arc::clone(method)),
                conversion: None,
            }),
            ty,
        )
    }

    /// `left ?? right`, with an optional conversion lambda for the left value.
    pub fn coalesce(left: Expr, right: Expr, conversion: Option<Expr>) -> Self {
        let ty = right.ty().clone();
        Expr::new(
            ExprKind::Binary(Binary {
                op: BinaryOp::Coalesce,
                left,
                right,
                lifting: Lifting::default(),
                method: None,
                conversion,
            }),
            ty,
        )
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::Add, left, right)
    }

    pub fn and_also(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::AndAlso, left, right)
    }

    pub fn or_else(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::OrElse, left, right)
    }

    /// A non-conversion unary operator; the result has the operand's type.
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = match op {
            UnaryOp::ArrayLength => Ty::I32,
            _ => operand.ty().clone(),
        };
        Expr::unary_to(op, operand, ty)
    }

    /// A unary operator with an explicit result type.
    pub fn unary_to(op: UnaryOp, operand: Expr, ty: Ty) -> Self {
        let lifted = if op.is_conversion() {
            operand.ty().is_nullable() || ty.is_nullable()
        } else {
            operand.ty().is_nullable()
        };
        Expr::new(
            ExprKind::Unary(Unary {
                op,
                operand,
                lifted,
                method: None,
            }),
            ty,
        )
    }

    pub fn convert(operand: Expr, ty: Ty) -> Self {
        Expr::unary_to(UnaryOp::Convert, operand, ty)
    }

    pub fn convert_checked(operand: Expr, ty: Ty) -> Self {
        Expr::unary_to(UnaryOp::ConvertChecked, operand, ty)
    }

    pub fn type_as(operand: Expr, ty: Ty) -> Self {
        Expr::unary_to(UnaryOp::TypeAs, operand, ty)
    }

    pub fn not(operand: Expr) -> Self {
        Expr::unary(UnaryOp::Not, operand)
    }

    /// A unary operator implemented by `method`.
    pub fn unary_with(op: UnaryOp, operand: Expr, method: &Arc<MethodDef>) -> Self {
        let ty = method.ret().clone();
        Expr::new(
            ExprKind::Unary(Unary {
                op,
                operand,
                lifted: false,
                method: Some(Arc::clone(method)),
            }),
            ty,
        )
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        let ty = if_true.ty().clone();
        Expr::new(
            ExprKind::Conditional(Conditional {
                test,
                if_true,
                if_false,
            }),
            ty,
        )
    }

    pub fn member(receiver: Option<Expr>, member: &Arc<MemberDef>) -> Self {
        Expr::new(
            ExprKind::Member(MemberAccess {
                receiver,
                member: Arc::clone(member),
            }),
            member.ty().clone(),
        )
    }

    pub fn call(receiver: Option<Expr>, method: &Arc<MethodDef>, args: Vec<Expr>) -> Self {
        Expr::new(
            ExprKind::Call(Call {
                receiver,
                method: Arc::clone(method),
                args,
            }),
            method.ret().clone(),
        )
    }

    pub fn new_object(ctor: &Arc<CtorDef>, args: Vec<Expr>) -> Self {
        Expr::new(
            ExprKind::New(New {
                ctor: Arc::clone(ctor),
                args,
            }),
            ctor.ty().clone(),
        )
    }

    pub fn new_array(element: Ty, items: Vec<Expr>) -> Self {
        let ty = Ty::array(element.clone());
        Expr::new(ExprKind::NewArray(NewArray { element, items }), ty)
    }

    /// Array element access (`indexer == None`) or an indexer call.
    pub fn index(receiver: Expr, indexer: Option<&Arc<MethodDef>>, args: Vec<Expr>) -> Self {
        let ty = match indexer {
            Some(method) => method.ret().clone(),
            None => receiver.ty().element().cloned().unwrap_or(Ty::Object),
        };
        Expr::new(
            ExprKind::Index(Index {
                receiver,
                indexer: indexer.map(Arc::clone),
                args,
            }),
            ty,
        )
    }

    pub fn type_is(operand: Expr, target: Ty) -> Self {
        Expr::new(ExprKind::TypeIs(TypeIs { operand, target }), Ty::Bool)
    }

    pub fn lambda(parts: LambdaParts) -> Self {
        let ty = Ty::Func(Arc::new(parts.signature()));
        Expr::new(ExprKind::Lambda(parts), ty)
    }

    /// A deferred-exception placeholder of static type `ty`.
    pub fn raise(error: DeferredError, ty: Ty) -> Self {
        let payload = Expr::constant(Value::Error(error), Ty::Object);
        Expr::new(ExprKind::Raise(Raise { payload }), ty)
    }

    /// A construct outside the supported subset.
    pub fn extension(kind: ForeignKind, children: Vec<Expr>, ty: Ty) -> Self {
        Expr::new(ExprKind::Extension(Extension { kind, children }), ty)
    }

    // Accessors

    pub fn as_constant(&self) -> Option<&Value> {
        match self.kind() {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<&ParamDef> {
        match self.kind() {
            ExprKind::Parameter(param) => Some(param),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&LambdaParts> {
        match self.kind() {
            ExprKind::Lambda(parts) => Some(parts),
            _ => None,
        }
    }

    /// Strip enclosing `Convert` and `TypeAs` nodes.
    pub fn unwrap_casts(&self) -> &Expr {
        let mut current = self;
        while let ExprKind::Unary(Unary {
            op: UnaryOp::Convert | UnaryOp::TypeAs,
            operand,
            ..
        }) = current.kind()
        {
            current = operand;
        }
        current
    }

    /// Whether this is a (possibly cast) constant equal to `value`.
    pub fn is_constant_value(&self, value: &Value) -> bool {
        self.unwrap_casts().as_constant() == Some(value)
    }

    // Children

    /// Child expressions in evaluation order.
    pub fn children(&self) -> SmallVec<[&Expr; 4]> {
        let mut out = SmallVec::new();
        match self.kind() {
            ExprKind::Constant(_) | ExprKind::Parameter(_) => {}
            ExprKind::Binary(binary) => {
                out.push(&binary.left);
                out.push(&binary.right);
                out.extend(binary.conversion.as_ref());
            }
            ExprKind::Unary(unary) => out.push(&unary.operand),
            ExprKind::Conditional(cond) => {
                out.push(&cond.test);
                out.push(&cond.if_true);
                out.push(&cond.if_false);
            }
            ExprKind::Member(access) => out.extend(access.receiver.as_ref()),
            ExprKind::Call(call) => {
                out.extend(call.receiver.as_ref());
                out.extend(call.args.iter());
            }
            ExprKind::New(new) => out.extend(new.args.iter()),
            ExprKind::NewArray(array) => out.extend(array.items.iter()),
            ExprKind::Index(index) => {
                out.push(&index.receiver);
                out.extend(index.args.iter());
            }
            ExprKind::TypeIs(test) => out.push(&test.operand),
            ExprKind::Lambda(parts) => out.push(parts.body()),
            ExprKind::Raise(raise) => out.push(&raise.payload),
            ExprKind::Extension(ext) => out.extend(ext.children.iter()),
        }
        out
    }

    /// Rebuild this node with `f` applied to each child.
    ///
    /// Returns `self` unchanged (same node) when `f` returned every child as is.
    pub fn map_children(&self, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
        let old = self.children();
        if old.is_empty() {
            return self.clone();
        }
        let new: SmallVec<[Expr; 4]> = old.iter().map(|child| f(child)).collect();
        if old.iter().zip(&new).all(|(a, b)| a.ptr_eq(b)) {
            return self.clone();
        }
        self.with_children(new)
    }

    /// Rebuild this node with replacement children, in [`Expr::children`]
    /// order. Missing trailing children keep their old value. The result
    /// keeps this node's type.
    pub fn with_children(&self, children: impl IntoIterator<Item = Expr>) -> Expr {
        let mut replacements = children.into_iter();
        let mut next = |old: &Expr| replacements.next().unwrap_or_else(|| old.clone());
        let kind = match self.kind() {
            ExprKind::Constant(_) | ExprKind::Parameter(_) => return self.clone(),
            ExprKind::Binary(binary) => ExprKind::Binary(Binary {
                op: binary.op,
                left: next(&binary.left),
                right: next(&binary.right),
                lifting: binary.lifting,
                method: binary.method.clone(),
                conversion: binary.conversion.as_ref().map(&mut next),
            }),
            ExprKind::Unary(unary) => ExprKind::Unary(Unary {
                op: unary.op,
                operand: next(&unary.operand),
                lifted: unary.lifted,
                method: unary.method.clone(),
            }),
            ExprKind::Conditional(cond) => ExprKind::Conditional(Conditional {
                test: next(&cond.test),
                if_true: next(&cond.if_true),
                if_false: next(&cond.if_false),
            }),
            ExprKind::Member(access) => ExprKind::Member(MemberAccess {
                receiver: access.receiver.as_ref().map(&mut next),
                member: Arc::clone(&access.member),
            }),
            ExprKind::Call(call) => ExprKind::Call(Call {
                receiver: call.receiver.as_ref().map(&mut next),
                method: Arc::clone(&call.method),
                args: call.args.iter().map(&mut next).collect(),
            }),
            ExprKind::New(new) => ExprKind::New(New {
                ctor: Arc::clone(&new.ctor),
                args: new.args.iter().map(&mut next).collect(),
            }),
            ExprKind::NewArray(array) => ExprKind::NewArray(NewArray {
                element: array.element.clone(),
                items: array.items.iter().map(&mut next).collect(),
            }),
            ExprKind::Index(index) => ExprKind::Index(Index {
                receiver: next(&index.receiver),
                indexer: index.indexer.clone(),
                args: index.args.iter().map(&mut next).collect(),
            }),
            ExprKind::TypeIs(test) => ExprKind::TypeIs(TypeIs {
                operand: next(&test.operand),
                target: test.target.clone(),
            }),
            ExprKind::Lambda(parts) => {
                ExprKind::Lambda(parts.with_body(next(parts.body())))
            }
            ExprKind::Raise(raise) => ExprKind::Raise(Raise {
                payload: next(&raise.payload),
            }),
            ExprKind::Extension(ext) => ExprKind::Extension(Extension {
                kind: ext.kind,
                children: ext.children.iter().map(&mut next).collect(),
            }),
        };
        Expr::new(kind, self.ty().clone())
    }

    /// Parameters referenced by this tree that no lambda inside it declares.
    pub fn free_parameters(&self) -> Vec<Expr> {
        fn collect(expr: &Expr, bound: &mut Vec<FxHashSet<ParamId>>, out: &mut Vec<Expr>) {
            ensure_sufficient_stack(|| match expr.kind() {
                ExprKind::Parameter(param) => {
                    let is_bound = bound.iter().any(|scope| scope.contains(&param.id));
                    if !is_bound && !out.iter().any(|seen| seen.ptr_eq(expr)) {
                        out.push(expr.clone());
                    }
                }
                ExprKind::Lambda(parts) => {
                    bound.push(parts.param_ids().collect());
                    collect(parts.body(), bound, out);
                    bound.pop();
                }
                _ => {
                    for child in expr.children() {
                        collect(child, bound, out);
                    }
                }
            });
        }

        let mut out = Vec::new();
        collect(self, &mut Vec::new(), &mut out);
        out
    }

    /// Whether the tree references no parameter it does not declare itself.
    pub fn is_closed(&self) -> bool {
        self.free_parameters().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
