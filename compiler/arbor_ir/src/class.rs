//! Class and interface definitions with cached override resolution.
//!
//! A class is created through [`ClassBuilder`] and then populated with
//! methods and members during startup. Resolving "which implementation does
//! this class use for slot M" walks the class chain once per
//! `(slot, class)` pair and caches the answer in a per-class table.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;

use crate::member::{MemberDef, MemberId, MethodDef};
use crate::ty::{DefId, Ty};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Interface,
    Abstract,
    Concrete,
}

/// A class, abstract class, or interface.
pub struct ClassDef {
    id: DefId,
    name: Arc<str>,
    kind: ClassKind,
    base: Option<Arc<ClassDef>>,
    interfaces: Vec<Arc<ClassDef>>,
    methods: RwLock<Vec<Arc<MethodDef>>>,
    members: RwLock<Vec<Arc<MemberDef>>>,
    method_slots: DashMap<MemberId, Option<Arc<MethodDef>>, FxBuildHasher>,
    member_slots: DashMap<MemberId, Option<Arc<MemberDef>>, FxBuildHasher>,
}

/// Builder for [`ClassDef`].
pub struct ClassBuilder {
    name: Arc<str>,
    kind: ClassKind,
    base: Option<Arc<ClassDef>>,
    interfaces: Vec<Arc<ClassDef>>,
}

impl ClassBuilder {
    #[must_use]
    pub fn kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn base(mut self, base: &Arc<ClassDef>) -> Self {
        self.base = Some(Arc::clone(base));
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: &Arc<ClassDef>) -> Self {
        self.interfaces.push(Arc::clone(interface));
        self
    }

    pub fn build(self) -> Arc<ClassDef> {
        Arc::new(ClassDef {
            id: DefId::fresh(),
            name: self.name,
            kind: self.kind,
            base: self.base,
            interfaces: self.interfaces,
            methods: RwLock::new(Vec::new()),
            members: RwLock::new(Vec::new()),
            method_slots: DashMap::with_hasher(FxBuildHasher),
            member_slots: DashMap::with_hasher(FxBuildHasher),
        })
    }
}

impl ClassDef {
    pub fn builder(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: Arc::from(name),
            kind: ClassKind::Concrete,
            base: None,
            interfaces: Vec::new(),
        }
    }

    pub fn id(&self) -> DefId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn base(&self) -> Option<&Arc<ClassDef>> {
        self.base.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<ClassDef>] {
        &self.interfaces
    }

    /// Register a method declared by this class.
    pub fn add_method(&self, method: &Arc<MethodDef>) {
        self.methods.write().push(Arc::clone(method));
        self.method_slots.clear();
    }

    /// Register a field or property declared by this class.
    pub fn add_member(&self, member: &Arc<MemberDef>) {
        self.members.write().push(Arc::clone(member));
        self.member_slots.clear();
    }

    /// Methods declared directly on this class.
    pub fn methods(&self) -> Vec<Arc<MethodDef>> {
        self.methods.read().clone()
    }

    /// Fields and properties declared directly on this class.
    pub fn members(&self) -> Vec<Arc<MemberDef>> {
        self.members.read().clone()
    }

    /// First method with this name declared on this class.
    pub fn declared_method(&self, name: &str) -> Option<Arc<MethodDef>> {
        self.methods.read().iter().find(|m| m.name() == name).cloned()
    }

    /// First field or property with this name declared on this class.
    pub fn declared_member(&self, name: &str) -> Option<Arc<MemberDef>> {
        self.members.read().iter().find(|m| m.name() == name).cloned()
    }

    /// Whether `self` is `target`, inherits from it, or implements it.
    pub fn derives_from(&self, target: &ClassDef) -> bool {
        if self.id == target.id {
            return true;
        }
        if self.base.as_ref().is_some_and(|base| base.derives_from(target)) {
            return true;
        }
        self.interfaces.iter().any(|iface| iface.derives_from(target))
    }

    /// Most specific implementation of method slot `slot` on this class.
    ///
    /// Returns `None` when neither this class nor its bases provide one.
    pub fn resolve_method(&self, slot: &MethodDef) -> Option<Arc<MethodDef>> {
        if let Some(hit) = self.method_slots.get(&slot.id()) {
            return hit.value().clone();
        }
        let from_interface = self.declares_in_interface(|iface| {
            iface.methods.read().iter().any(|m| m.id() == slot.id())
        });
        let resolved = self.walk_chain(|class| {
            let methods = class.methods.read();
            if let Some(found) = methods.iter().find(|m| m.implements(slot)) {
                return Some(Arc::clone(found));
            }
            if from_interface {
                return methods
                    .iter()
                    .find(|m| {
                        !m.is_static() && m.name() == slot.name() && m.params() == slot.params()
                    })
                    .cloned();
            }
            None
        });
        self.method_slots.insert(slot.id(), resolved.clone());
        resolved
    }

    /// Most specific implementation of property slot `slot` on this class.
    pub fn resolve_member(&self, slot: &MemberDef) -> Option<Arc<MemberDef>> {
        if let Some(hit) = self.member_slots.get(&slot.id()) {
            return hit.value().clone();
        }
        let from_interface = self.declares_in_interface(|iface| {
            iface.members.read().iter().any(|m| m.id() == slot.id())
        });
        let resolved = self.walk_chain(|class| {
            let members = class.members.read();
            if let Some(found) = members.iter().find(|m| m.implements(slot)) {
                return Some(Arc::clone(found));
            }
            if from_interface {
                return members
                    .iter()
                    .find(|m| !m.is_static() && m.name() == slot.name() && m.ty() == slot.ty())
                    .cloned();
            }
            None
        });
        self.member_slots.insert(slot.id(), resolved.clone());
        resolved
    }

    fn walk_chain<T>(&self, mut probe: impl FnMut(&ClassDef) -> Option<T>) -> Option<T> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(found) = probe(class) {
                return Some(found);
            }
            current = class.base.as_deref();
        }
        None
    }

    fn declares_in_interface(&self, declares: impl Fn(&ClassDef) -> bool + Copy) -> bool {
        fn visit(class: &ClassDef, declares: impl Fn(&ClassDef) -> bool + Copy) -> bool {
            (class.is_interface() && declares(class))
                || class.interfaces.iter().any(|iface| visit(iface, declares))
                || class.base.as_deref().is_some_and(|base| visit(base, declares))
        }
        visit(self, declares)
    }
}

impl PartialEq for ClassDef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClassDef {}

impl Hash for ClassDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl From<&Arc<ClassDef>> for Ty {
    fn from(def: &Arc<ClassDef>) -> Self {
        Ty::class(def)
    }
}
