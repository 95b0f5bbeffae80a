//! Static types of expression nodes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::class::ClassDef;

/// Identity of a user-defined type (class, interface or enum).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(u32);

impl DefId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        DefId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A static type.
///
/// Primitive variants mirror the fixed-width numeric types. `Nullable` only
/// wraps types that cannot already hold null; use [`Ty::nullable`] to build it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Void,
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
    Object,
    Nullable(Arc<Ty>),
    Array(Arc<Ty>),
    Enum(Arc<EnumDef>),
    Class(Arc<ClassDef>),
    Func(Arc<FuncSig>),
}

impl Ty {
    /// `T?` for value types, `T` itself for types that already admit null.
    pub fn nullable(inner: Ty) -> Ty {
        if inner.can_be_null() {
            inner
        } else {
            Ty::Nullable(Arc::new(inner))
        }
    }

    pub fn array(element: Ty) -> Ty {
        Ty::Array(Arc::new(element))
    }

    pub fn func(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Func(Arc::new(FuncSig { params, ret }))
    }

    pub fn class(def: &Arc<ClassDef>) -> Ty {
        Ty::Class(Arc::clone(def))
    }

    /// Whether a value of this type may be null.
    pub fn can_be_null(&self) -> bool {
        matches!(
            self,
            Ty::Nullable(_) | Ty::Str | Ty::Object | Ty::Array(_) | Ty::Class(_) | Ty::Func(_)
        )
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Ty::Nullable(_))
    }

    /// Value types: primitives, enums and nullable wrappers of those.
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            Ty::Str | Ty::Object | Ty::Array(_) | Ty::Class(_) | Ty::Func(_)
        )
    }

    /// The wrapped type for `Nullable`, otherwise `self`.
    pub fn non_nullable(&self) -> &Ty {
        match self {
            Ty::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Ty::I8 | Ty::U8 | Ty::I16 | Ty::U16 | Ty::I32 | Ty::U32 | Ty::I64 | Ty::U64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Ty::U8 | Ty::U16 | Ty::U32 | Ty::U64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_float()
    }

    /// Element type of an array type.
    pub fn element(&self) -> Option<&Ty> {
        match self {
            Ty::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Delegate signature of a function type.
    pub fn signature(&self) -> Option<&FuncSig> {
        match self {
            Ty::Func(sig) => Some(sig),
            _ => None,
        }
    }

    /// Whether a value statically typed `source` can be stored in `self`
    /// without a conversion node.
    pub fn is_assignable_from(&self, source: &Ty) -> bool {
        if self == source {
            return true;
        }
        match (self, source) {
            (Ty::Object, _) => true,
            (Ty::Nullable(inner), _) => **inner == *source,
            (Ty::Class(target), Ty::Class(class)) => class.derives_from(target),
            (Ty::Array(target), Ty::Array(element)) => {
                !element.is_value_type() && target.is_assignable_from(element)
            }
            _ => false,
        }
    }

    /// A 32-bit hash of this type, stable within the process.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "hash codes are folded to 32 bits"
    )]
    pub fn hash_code(&self) -> u32 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        let bits = hasher.finish();
        (bits ^ (bits >> 32)) as u32
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => f.write_str("void"),
            Ty::Bool => f.write_str("bool"),
            Ty::Char => f.write_str("char"),
            Ty::I8 => f.write_str("i8"),
            Ty::U8 => f.write_str("u8"),
            Ty::I16 => f.write_str("i16"),
            Ty::U16 => f.write_str("u16"),
            Ty::I32 => f.write_str("i32"),
            Ty::U32 => f.write_str("u32"),
            Ty::I64 => f.write_str("i64"),
            Ty::U64 => f.write_str("u64"),
            Ty::F32 => f.write_str("f32"),
            Ty::F64 => f.write_str("f64"),
            Ty::Str => f.write_str("str"),
            Ty::Object => f.write_str("object"),
            Ty::Nullable(inner) => write!(f, "{inner}?"),
            Ty::Array(element) => write!(f, "{element}[]"),
            Ty::Enum(def) => f.write_str(def.name()),
            Ty::Class(def) => f.write_str(def.name()),
            Ty::Func(sig) => write!(f, "{sig}"),
        }
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Parameter and return types of a delegate shape.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FuncSig {
    pub params: Vec<Ty>,
    pub ret: Ty,
}

impl fmt::Display for FuncSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// An enumeration over an integral underlying type.
pub struct EnumDef {
    id: DefId,
    name: Arc<str>,
    underlying: Ty,
    variants: Vec<(Arc<str>, i64)>,
}

impl EnumDef {
    /// Define an enum whose variants take consecutive values from zero.
    pub fn new(name: &str, variants: &[&str]) -> Arc<Self> {
        let variants = variants
            .iter()
            .zip(0_i64..)
            .map(|(name, raw)| (Arc::from(*name), raw))
            .collect();
        Self::with_values(name, Ty::I32, variants)
    }

    /// Define an enum with explicit raw values and underlying type.
    pub fn with_values(name: &str, underlying: Ty, variants: Vec<(Arc<str>, i64)>) -> Arc<Self> {
        Arc::new(EnumDef {
            id: DefId::fresh(),
            name: Arc::from(name),
            underlying,
            variants,
        })
    }

    pub fn id(&self) -> DefId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn underlying(&self) -> &Ty {
        &self.underlying
    }

    /// Raw value of the named variant.
    pub fn variant(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(variant, _)| &**variant == name)
            .map(|(_, raw)| *raw)
    }

    /// Name of the variant with this raw value.
    pub fn variant_name(&self, raw: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, value)| *value == raw)
            .map(|(name, _)| &**name)
    }
}

impl PartialEq for EnumDef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EnumDef {}

impl Hash for EnumDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EnumDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enum {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, ClassKind};

    #[test]
    fn nullable_does_not_double_wrap() {
        let once = Ty::nullable(Ty::I32);
        assert_eq!(Ty::nullable(once.clone()), once);
        assert_eq!(Ty::nullable(Ty::Str), Ty::Str);
    }

    #[test]
    fn assignability() {
        assert!(Ty::Object.is_assignable_from(&Ty::I32));
        assert!(Ty::nullable(Ty::I32).is_assignable_from(&Ty::I32));
        assert!(!Ty::I32.is_assignable_from(&Ty::nullable(Ty::I32)));
        assert!(!Ty::I64.is_assignable_from(&Ty::I32));

        let shape = ClassDef::builder("Shape").kind(ClassKind::Interface).build();
        let circle = ClassDef::builder("Circle").implements(&shape).build();
        assert!(Ty::class(&shape).is_assignable_from(&Ty::class(&circle)));
        assert!(!Ty::class(&circle).is_assignable_from(&Ty::class(&shape)));
        assert!(Ty::array(Ty::class(&shape)).is_assignable_from(&Ty::array(Ty::class(&circle))));
    }

    #[test]
    fn enum_variants() {
        let color = EnumDef::new("Color", &["Red", "Green", "Blue"]);
        assert_eq!(color.variant("Green"), Some(1));
        assert_eq!(color.variant_name(2), Some("Blue"));
        assert_eq!(color.variant("Purple"), None);
    }

    #[test]
    fn display() {
        assert_eq!(Ty::nullable(Ty::I32).to_string(), "i32?");
        assert_eq!(Ty::func(vec![Ty::I32], Ty::Bool).to_string(), "fn(i32) -> bool");
    }
}
