//! The evaluator capability and typed lambda adapters.
//!
//! [`Evaluator`] is the one contract outside callers see. The interpreter,
//! the plain compiler and the caching compiler all implement it and are
//! interchangeable behind `&dyn Evaluator`.
//!
//! # Typed lambdas
//!
//! A [`Shape`] is a Rust function-pointer type such as `fn(i32, i32) -> bool`.
//! [`Evaluator::evaluate_typed`] checks that a lambda's signature matches
//! the shape, evaluates it, and wraps the resulting [`Callable`] so it takes
//! and returns native Rust values. The per-shape [`Adapter`] is built once and
//! kept in the evaluator's [`AdapterCache`], keyed by the shape's `TypeId`.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use arbor_ir::{Expr, FuncSig, LambdaParts, Ty, Value};
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::errors::{invalid_cast, shape_mismatch, unbound_parameter, EvalError, EvalResult};

/// A compiled or interpreted lambda: ordered arguments in, value out.
pub type Callable = Arc<dyn Fn(&[Value]) -> EvalResult + Send + Sync>;

/// Turns expression trees into values and callables.
pub trait Evaluator: Send + Sync {
    /// Evaluate a closed tree.
    fn evaluate(&self, expr: &Expr) -> EvalResult {
        ensure_closed(expr)?;
        let callable = self.evaluate_lambda(&LambdaParts::closed(expr.clone()))?;
        callable(&[])
    }

    /// Produce a callable taking the lambda's parameters in order.
    fn evaluate_lambda(&self, lambda: &LambdaParts) -> Result<Callable, EvalError>;

    /// Shape adapters built so far by this evaluator.
    fn adapters(&self) -> &AdapterCache;

    /// Produce a callable of exactly the Rust shape `S`.
    fn evaluate_typed<S: Shape>(&self, lambda: &LambdaParts) -> Result<S::Typed, EvalError>
    where
        Self: Sized,
    {
        let adapter = self.adapters().adapter::<S>();
        let found = lambda.signature();
        if &found != adapter.signature() {
            return Err(shape_mismatch(adapter.signature().clone(), found));
        }
        Ok(adapter.wrap(self.evaluate_lambda(lambda)?))
    }
}

/// Reject trees that reference parameters no enclosing lambda declares.
pub fn ensure_closed(expr: &Expr) -> Result<(), EvalError> {
    match expr.free_parameters().first() {
        Some(free) => {
            let name = free.as_parameter().map_or("?", |param| param.name());
            Err(unbound_parameter(name))
        }
        None => Ok(()),
    }
}

// Value types

/// A Rust type with a fixed Arbor type and a lossless mapping to [`Value`].
pub trait ValueType: Sized + Send + Sync + 'static {
    fn ty() -> Ty;
    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Result<Self, EvalError>;
}

macro_rules! impl_value_type {
    ($($ty:ty => $variant:ident, $tag:expr;)*) => {
        $(
            impl ValueType for $ty {
                fn ty() -> Ty {
                    $tag
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: Value) -> Result<Self, EvalError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(invalid_cast(&other, &$tag)),
                    }
                }
            }
        )*
    };
}

impl_value_type! {
    bool => Bool, Ty::Bool;
    char => Char, Ty::Char;
    i8 => I8, Ty::I8;
    u8 => U8, Ty::U8;
    i16 => I16, Ty::I16;
    u16 => U16, Ty::U16;
    i32 => I32, Ty::I32;
    u32 => U32, Ty::U32;
    i64 => I64, Ty::I64;
    u64 => U64, Ty::U64;
    f32 => F32, Ty::F32;
    f64 => F64, Ty::F64;
}

impl ValueType for String {
    fn ty() -> Ty {
        Ty::Str
    }

    fn into_value(self) -> Value {
        Value::str(&self)
    }

    fn from_value(value: Value) -> Result<Self, EvalError> {
        match value {
            Value::Str(text) => Ok(text.to_string()),
            other => Err(invalid_cast(&other, &Ty::Str)),
        }
    }
}

/// `Option<T>` maps to `T?`, with `None` as null.
impl<T: ValueType> ValueType for Option<T> {
    fn ty() -> Ty {
        Ty::nullable(T::ty())
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, ValueType::into_value)
    }

    fn from_value(value: Value) -> Result<Self, EvalError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// Untyped escape hatch: `object`.
impl ValueType for Value {
    fn ty() -> Ty {
        Ty::Object
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, EvalError> {
        Ok(value)
    }
}

// Shapes

/// A statically typed delegate shape.
pub trait Shape: 'static {
    /// The native callable handed back to the caller.
    type Typed: Clone + Send + Sync + 'static;

    fn signature() -> FuncSig;

    fn adapt(callable: Callable) -> Self::Typed;
}

macro_rules! impl_shape {
    ($($arg:ident $name:ident),*) => {
        impl<$($arg: ValueType,)* R: ValueType> Shape for fn($($arg),*) -> R {
            type Typed = Arc<dyn Fn($($arg),*) -> Result<R, EvalError> + Send + Sync>;

            fn signature() -> FuncSig {
                FuncSig {
                    params: vec![$($arg::ty()),*],
                    ret: R::ty(),
                }
            }

            fn adapt(callable: Callable) -> Self::Typed {
                Arc::new(move |$($name: $arg),*| {
                    let args: Vec<Value> = vec![$($name.into_value()),*];
                    R::from_value(callable(&args)?)
                })
            }
        }
    };
}

impl_shape!();
impl_shape!(A a);
impl_shape!(A a, B b);
impl_shape!(A a, B b, C c);

/// Expected signature and wrapper for one shape.
pub struct Adapter<S: Shape> {
    signature: FuncSig,
    _shape: PhantomData<fn() -> S>,
}

impl<S: Shape> Adapter<S> {
    fn build() -> Self {
        Adapter {
            signature: S::signature(),
            _shape: PhantomData,
        }
    }

    pub fn signature(&self) -> &FuncSig {
        &self.signature
    }

    pub fn wrap(&self, callable: Callable) -> S::Typed {
        S::adapt(callable)
    }
}

/// Concurrent cache of shape adapters keyed by the shape's `TypeId`.
#[derive(Default)]
pub struct AdapterCache {
    adapters: DashMap<TypeId, Arc<dyn Any + Send + Sync>, FxBuildHasher>,
}

impl AdapterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapter for `S`, building it on first use.
    pub fn adapter<S: Shape>(&self) -> Arc<Adapter<S>> {
        let id = TypeId::of::<S>();
        let cached = self
            .adapters
            .get(&id)
            .and_then(|entry| Arc::clone(entry.value()).downcast::<Adapter<S>>().ok());
        if let Some(adapter) = cached {
            return adapter;
        }
        let built = Arc::new(Adapter::<S>::build());
        let stored = Arc::clone(
            self.adapters
                .entry(id)
                .or_insert_with(|| Arc::clone(&built) as Arc<dyn Any + Send + Sync>)
                .value(),
        );
        stored.downcast::<Adapter<S>>().unwrap_or(built)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
