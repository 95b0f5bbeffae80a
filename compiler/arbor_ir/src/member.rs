//! Methods, fields, properties and constructors.
//!
//! Members are identified by a [`MemberId`] minted when they are built.
//! Structural comparison and cache keys use that id, never the name, so two
//! overloads with the same name are distinct and a method compares equal
//! only to itself.
//!
//! Bodies are host closures. Invoking an instance member on an object value
//! dispatches to the most specific implementation for the object's runtime
//! class.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::ty::Ty;
use crate::value::Value;

/// Identity of a method, field, property, or constructor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(u32);

impl MemberId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        MemberId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

bitflags! {
    /// Declaration flags shared by all member kinds.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u8 {
        const STATIC = 1 << 0;
        const VIRTUAL = 1 << 1;
        const ABSTRACT = 1 << 2;
        /// The partial evaluator must never fold an access to this member.
        const NON_FOLDABLE = 1 << 3;
    }
}

/// Failure raised by a host body.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Body of a method: `(receiver, arguments) -> result`.
pub type MethodBody =
    Arc<dyn Fn(Option<&Value>, &[Value]) -> Result<Value, HostError> + Send + Sync>;

/// Getter of a field or property: `receiver -> value`.
pub type Getter = Arc<dyn Fn(Option<&Value>) -> Result<Value, HostError> + Send + Sync>;

/// Body of a constructor.
pub type CtorBody = Arc<dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync>;

// Methods

pub struct MethodDef {
    id: MemberId,
    name: Arc<str>,
    params: Vec<Ty>,
    ret: Ty,
    flags: MemberFlags,
    overrides: Option<Arc<MethodDef>>,
    label: Option<Arc<str>>,
    body: Option<MethodBody>,
}

/// Builder for [`MethodDef`].
pub struct MethodBuilder {
    name: Arc<str>,
    params: Vec<Ty>,
    ret: Ty,
    flags: MemberFlags,
    overrides: Option<Arc<MethodDef>>,
    label: Option<Arc<str>>,
    body: Option<MethodBody>,
}

impl MethodBuilder {
    #[must_use]
    pub fn param(mut self, ty: Ty) -> Self {
        self.params.push(ty);
        self
    }

    #[must_use]
    pub fn returns(mut self, ty: Ty) -> Self {
        self.ret = ty;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Mark this method as overriding or implementing `slot`.
    #[must_use]
    pub fn overrides(mut self, slot: &Arc<MethodDef>) -> Self {
        self.overrides = Some(Arc::clone(slot));
        self
    }

    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(Arc::from(label));
        self
    }

    #[must_use]
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(Option<&Value>, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn build(self) -> Arc<MethodDef> {
        Arc::new(MethodDef {
            id: MemberId::fresh(),
            name: self.name,
            params: self.params,
            ret: self.ret,
            flags: self.flags,
            overrides: self.overrides,
            label: self.label,
            body: self.body,
        })
    }
}

impl MethodDef {
    pub fn builder(name: &str) -> MethodBuilder {
        MethodBuilder {
            name: Arc::from(name),
            params: Vec::new(),
            ret: Ty::Void,
            flags: MemberFlags::empty(),
            overrides: None,
            label: None,
            body: None,
        }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Ty] {
        &self.params
    }

    pub fn ret(&self) -> &Ty {
        &self.ret
    }

    pub fn flags(&self) -> MemberFlags {
        self.flags
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    pub fn overrides(&self) -> Option<&Arc<MethodDef>> {
        self.overrides.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether this method is `slot` or overrides it, directly or transitively.
    pub fn implements(&self, slot: &MethodDef) -> bool {
        let mut current = Some(self);
        while let Some(method) = current {
            if method.id == slot.id {
                return true;
            }
            current = method.overrides.as_deref();
        }
        false
    }

    /// Invoke with virtual dispatch on an object receiver.
    pub fn invoke(&self, receiver: Option<&Value>, args: &[Value]) -> Result<Value, HostError> {
        if let (false, Some(Value::Object(object))) = (self.is_static(), receiver) {
            if let Some(target) = object.class().resolve_method(self) {
                if target.id != self.id {
                    return target.call_body(receiver, args);
                }
            }
        }
        self.call_body(receiver, args)
    }

    fn call_body(&self, receiver: Option<&Value>, args: &[Value]) -> Result<Value, HostError> {
        match &self.body {
            Some(body) => body(receiver, args),
            None => Err(HostError::new(format!("method `{}` has no body", self.name))),
        }
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

// Fields and properties

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
}

pub struct MemberDef {
    id: MemberId,
    name: Arc<str>,
    kind: MemberKind,
    ty: Ty,
    flags: MemberFlags,
    overrides: Option<Arc<MemberDef>>,
    label: Option<Arc<str>>,
    getter: Option<Getter>,
}

/// Builder for [`MemberDef`]. Fields and properties share it.
pub struct PropertyBuilder {
    name: Arc<str>,
    kind: MemberKind,
    ty: Ty,
    flags: MemberFlags,
    overrides: Option<Arc<MemberDef>>,
    label: Option<Arc<str>>,
    getter: Option<Getter>,
}

impl PropertyBuilder {
    #[must_use]
    pub fn flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[must_use]
    pub fn overrides(mut self, slot: &Arc<MemberDef>) -> Self {
        self.overrides = Some(Arc::clone(slot));
        self
    }

    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(Arc::from(label));
        self
    }

    #[must_use]
    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn build(self) -> Arc<MemberDef> {
        Arc::new(MemberDef {
            id: MemberId::fresh(),
            name: self.name,
            kind: self.kind,
            ty: self.ty,
            flags: self.flags,
            overrides: self.overrides,
            label: self.label,
            getter: self.getter,
        })
    }
}

impl MemberDef {
    pub fn property(name: &str, ty: Ty) -> PropertyBuilder {
        PropertyBuilder {
            name: Arc::from(name),
            kind: MemberKind::Property,
            ty,
            flags: MemberFlags::empty(),
            overrides: None,
            label: None,
            getter: None,
        }
    }

    pub fn field(name: &str, ty: Ty) -> PropertyBuilder {
        PropertyBuilder {
            kind: MemberKind::Field,
            ..Self::property(name, ty)
        }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn is_property(&self) -> bool {
        self.kind == MemberKind::Property
    }

    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn flags(&self) -> MemberFlags {
        self.flags
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    pub fn overrides(&self) -> Option<&Arc<MemberDef>> {
        self.overrides.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether this member is `slot` or overrides it, directly or transitively.
    pub fn implements(&self, slot: &MemberDef) -> bool {
        let mut current = Some(self);
        while let Some(member) = current {
            if member.id == slot.id {
                return true;
            }
            current = member.overrides.as_deref();
        }
        false
    }

    /// Read the member. Properties dispatch on the runtime class of an
    /// object receiver; fields never do.
    pub fn read(&self, receiver: Option<&Value>) -> Result<Value, HostError> {
        if let (MemberKind::Property, false, Some(Value::Object(object))) =
            (self.kind, self.is_static(), receiver)
        {
            if let Some(target) = object.class().resolve_member(self) {
                if target.id != self.id {
                    return target.call_getter(receiver);
                }
            }
        }
        self.call_getter(receiver)
    }

    fn call_getter(&self, receiver: Option<&Value>) -> Result<Value, HostError> {
        match &self.getter {
            Some(getter) => getter(receiver),
            None => Err(HostError::new(format!("member `{}` has no getter", self.name))),
        }
    }
}

impl fmt::Debug for MemberDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

// Constructors

pub struct CtorDef {
    id: MemberId,
    ty: Ty,
    params: Vec<Ty>,
    flags: MemberFlags,
    body: CtorBody,
}

/// Builder for [`CtorDef`].
pub struct CtorBuilder {
    ty: Ty,
    params: Vec<Ty>,
    flags: MemberFlags,
}

impl CtorBuilder {
    #[must_use]
    pub fn param(mut self, ty: Ty) -> Self {
        self.params.push(ty);
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn body<F>(self, body: F) -> Arc<CtorDef>
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Arc::new(CtorDef {
            id: MemberId::fresh(),
            ty: self.ty,
            params: self.params,
            flags: self.flags,
            body: Arc::new(body),
        })
    }
}

impl CtorDef {
    /// A constructor of `ty` with no flags.
    pub fn new<F>(ty: Ty, params: Vec<Ty>, body: F) -> Arc<Self>
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        CtorBuilder {
            ty,
            params,
            flags: MemberFlags::empty(),
        }
        .body(body)
    }

    pub fn builder(ty: Ty) -> CtorBuilder {
        CtorBuilder {
            ty,
            params: Vec::new(),
            flags: MemberFlags::empty(),
        }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    /// The constructed type.
    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn params(&self) -> &[Ty] {
        &self.params
    }

    pub fn flags(&self) -> MemberFlags {
        self.flags
    }

    pub fn construct(&self, args: &[Value]) -> Result<Value, HostError> {
        (self.body)(args)
    }
}

impl fmt::Debug for CtorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtorDef")
            .field("id", &self.id)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}
