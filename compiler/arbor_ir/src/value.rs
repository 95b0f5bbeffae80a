//! Runtime values.
//!
//! Nullable values have no wrapper: a `T?` holds either `Value::Null` or a
//! plain `T` value. Enums keep their definition so conversions can recover
//! the underlying integral type.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::class::ClassDef;
use crate::expr::Expr;
use crate::hash::hash_all;
use crate::ty::{EnumDef, Ty};

/// Failure payload carried by a deferred-exception placeholder.
pub type DeferredError = Arc<dyn std::error::Error + Send + Sync>;

/// An instance of a host class.
#[derive(Clone)]
pub struct Object {
    class: Arc<ClassDef>,
    state: Arc<dyn Any + Send + Sync>,
}

impl Object {
    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    /// Borrow the host state if it has type `T`.
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    fn same_instance(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.state).cast::<()>() as usize
    }
}

#[derive(Clone)]
pub enum Value {
    Null,
    Void,
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(Arc<str>),
    Enum { def: Arc<EnumDef>, raw: i64 },
    Array { element: Ty, items: Arc<[Value]> },
    Object(Object),
    /// A quoted lambda expression.
    Lambda(Expr),
    /// A captured failure, raised when a placeholder executes.
    Error(DeferredError),
}

impl Value {
    pub fn str(text: &str) -> Value {
        Value::Str(Arc::from(text))
    }

    pub fn object<T: Any + Send + Sync>(class: &Arc<ClassDef>, state: T) -> Value {
        Value::Object(Object {
            class: Arc::clone(class),
            state: Arc::new(state),
        })
    }

    pub fn array(element: Ty, items: Vec<Value>) -> Value {
        Value::Array {
            element,
            items: Arc::from(items),
        }
    }

    /// Value of the named enum variant, `None` if the variant does not exist.
    pub fn variant(def: &Arc<EnumDef>, name: &str) -> Option<Value> {
        def.variant(name).map(|raw| Value::Enum {
            def: Arc::clone(def),
            raw,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral view of integers, chars and enums.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::I8(v) => Some(i128::from(v)),
            Value::U8(v) => Some(i128::from(v)),
            Value::I16(v) => Some(i128::from(v)),
            Value::U16(v) => Some(i128::from(v)),
            Value::I32(v) => Some(i128::from(v)),
            Value::U32(v) => Some(i128::from(v)),
            Value::I64(v) => Some(i128::from(v)),
            Value::U64(v) => Some(i128::from(v)),
            Value::Char(c) => Some(i128::from(u32::from(c))),
            Value::Enum { raw, .. } => Some(i128::from(raw)),
            _ => None,
        }
    }

    /// Floating-point view of every numeric value.
    #[allow(
        clippy::cast_precision_loss,
        reason = "widening to f64 follows numeric conversion rules"
    )]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(f64::from(v)),
            Value::F64(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    /// The runtime type of this value; `None` for null.
    pub fn runtime_ty(&self) -> Option<Ty> {
        Some(match self {
            Value::Null => return None,
            Value::Void => Ty::Void,
            Value::Bool(_) => Ty::Bool,
            Value::Char(_) => Ty::Char,
            Value::I8(_) => Ty::I8,
            Value::U8(_) => Ty::U8,
            Value::I16(_) => Ty::I16,
            Value::U16(_) => Ty::U16,
            Value::I32(_) => Ty::I32,
            Value::U32(_) => Ty::U32,
            Value::I64(_) => Ty::I64,
            Value::U64(_) => Ty::U64,
            Value::F32(_) => Ty::F32,
            Value::F64(_) => Ty::F64,
            Value::Str(_) => Ty::Str,
            Value::Enum { def, .. } => Ty::Enum(Arc::clone(def)),
            Value::Array { element, .. } => Ty::array(element.clone()),
            Value::Object(object) => Ty::class(object.class()),
            Value::Lambda(expr) => expr.ty().clone(),
            Value::Error(_) => Ty::Object,
        })
    }

    /// Whether this value can be stored in a slot of type `target`.
    pub fn is_instance_of(&self, target: &Ty) -> bool {
        match self.runtime_ty() {
            Some(ty) => target.is_assignable_from(&ty),
            None => target.can_be_null(),
        }
    }

    /// A 32-bit hash consistent with `==`.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "hash codes are folded to 32 bits"
    )]
    pub fn hash_code(&self) -> u32 {
        if let Value::Array { items, .. } = self {
            return hash_all(items.iter().map(|item| Some(item.hash_code())));
        }
        let mut hasher = FxHasher::default();
        mem::discriminant(self).hash(&mut hasher);
        match self {
            Value::Null | Value::Void | Value::Array { .. } => {}
            Value::Bool(v) => v.hash(&mut hasher),
            Value::Char(v) => v.hash(&mut hasher),
            Value::I8(v) => v.hash(&mut hasher),
            Value::U8(v) => v.hash(&mut hasher),
            Value::I16(v) => v.hash(&mut hasher),
            Value::U16(v) => v.hash(&mut hasher),
            Value::I32(v) => v.hash(&mut hasher),
            Value::U32(v) => v.hash(&mut hasher),
            Value::I64(v) => v.hash(&mut hasher),
            Value::U64(v) => v.hash(&mut hasher),
            Value::F32(v) => v.to_bits().hash(&mut hasher),
            Value::F64(v) => v.to_bits().hash(&mut hasher),
            Value::Str(v) => v.hash(&mut hasher),
            Value::Enum { def, raw } => {
                def.id().hash(&mut hasher);
                raw.hash(&mut hasher);
            }
            Value::Object(object) => object.address().hash(&mut hasher),
            Value::Lambda(expr) => expr.addr().hash(&mut hasher),
            Value::Error(error) => (Arc::as_ptr(error).cast::<()>() as usize).hash(&mut hasher),
        }
        let bits = hasher.finish();
        (bits ^ (bits >> 32)) as u32
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum { def: da, raw: ra }, Value::Enum { def: db, raw: rb }) => {
                da == db && ra == rb
            }
            (
                Value::Array {
                    element: ea,
                    items: ia,
                },
                Value::Array {
                    element: eb,
                    items: ib,
                },
            ) => ea == eb && ia == ib,
            (Value::Object(a), Value::Object(b)) => a.same_instance(b),
            (Value::Lambda(a), Value::Lambda(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Void => f.write_str("()"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v:?}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Enum { def, raw } => match def.variant_name(*raw) {
                Some(name) => write!(f, "{}.{name}", def.name()),
                None => write!(f, "{}({raw})", def.name()),
            },
            Value::Array { items, .. } => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Object(object) => write!(f, "<{}>", object.class().name()),
            Value::Lambda(expr) => write!(f, "{expr}"),
            Value::Error(error) => write!(f, "<error: {error}>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    char => Char,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}
