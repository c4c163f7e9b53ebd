//! Class descriptors and their builder
//!
//! A [`ClassDescriptor`] records one class's name, its direct parent, how its
//! instances are owned, and the virtual methods implemented at this level of
//! the hierarchy. Descriptors are assembled with [`ClassBuilder`], registered
//! once, and never mutated afterwards.

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::callframe::CallFrame;
use crate::error::BindingError;
use crate::handle::RawObject;
use crate::marshal::{Marshal, MarshalArgs};

/// Host implementation of one virtual method
///
/// Receives the target object and a frame holding the native arguments, and
/// writes its result into the frame's return slot.
pub type VirtualFn =
    Arc<dyn Fn(RawObject, &mut CallFrame) -> Result<(), BindingError> + Send + Sync>;

/// Where a class comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    /// Defined by the native engine
    Engine,
    /// Defined by host code on top of an engine class
    Extension,
    /// Engine class with exactly one process-wide instance
    Singleton,
}

/// Registration-time metadata for one class
#[derive(Clone, Serialize)]
pub struct ClassDescriptor {
    /// Class name, unique within a class database
    pub name: String,
    /// Direct parent; `None` only for the root
    pub parent: Option<String>,
    pub kind: ClassKind,
    /// Whether instances are shared-owned through the native reference count
    pub ref_counted: bool,
    /// Whether the class can be constructed by name
    pub instantiable: bool,
    #[serde(rename = "virtuals", serialize_with = "serialize_virtual_names")]
    virtuals: BTreeMap<String, VirtualFn>,
}

fn serialize_virtual_names<S: Serializer>(
    virtuals: &BTreeMap<String, VirtualFn>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(virtuals.len()))?;
    for name in virtuals.keys() {
        seq.serialize_element(name)?;
    }
    seq.end()
}

impl ClassDescriptor {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Virtual implementation provided at exactly this level
    pub fn virtual_method(&self, method: &str) -> Option<&VirtualFn> {
        self.virtuals.get(method)
    }

    /// Names of virtuals implemented at this level, sorted
    pub fn virtual_names(&self) -> impl Iterator<Item = &str> {
        self.virtuals.keys().map(String::as_str)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("ref_counted", &self.ref_counted)
            .field("instantiable", &self.instantiable)
            .field("virtuals", &self.virtuals.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for a [`ClassDescriptor`]
///
/// # Example
///
/// ```rust
/// use gdbind_core::{ClassBuilder, ClassKind};
///
/// let player = ClassBuilder::extension("Player", "Node2D")
///     .virtual_fn("_process", |_obj, (delta,): (f64,)| Ok(delta > 0.0))
///     .build();
///
/// assert_eq!(player.kind, ClassKind::Extension);
/// assert_eq!(player.parent.as_deref(), Some("Node2D"));
/// assert!(player.virtual_method("_process").is_some());
/// ```
pub struct ClassBuilder {
    name: String,
    parent: Option<String>,
    kind: ClassKind,
    ref_counted: bool,
    instantiable: bool,
    virtuals: BTreeMap<String, VirtualFn>,
}

impl ClassBuilder {
    fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            parent: None,
            kind,
            ref_counted: false,
            instantiable: kind != ClassKind::Singleton,
            virtuals: BTreeMap::new(),
        }
    }

    /// An engine-defined class
    pub fn engine(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Engine)
    }

    /// A host-defined class extending `parent`
    pub fn extension(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Extension).parent(parent)
    }

    /// An engine singleton class; never constructed by name
    pub fn singleton(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Singleton)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn ref_counted(mut self, ref_counted: bool) -> Self {
        self.ref_counted = ref_counted;
        self
    }

    /// Mark an abstract class, which can be inherited but not constructed
    pub fn instantiable(mut self, instantiable: bool) -> Self {
        self.instantiable = instantiable;
        self
    }

    /// Implement a virtual method directly over the call frame
    pub fn virtual_raw<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(RawObject, &mut CallFrame) -> Result<(), BindingError> + Send + Sync + 'static,
    {
        self.virtuals.insert(method.into(), Arc::new(f));
        self
    }

    /// Implement a virtual method with typed arguments and return value
    pub fn virtual_fn<A, R, F>(self, method: impl Into<String>, f: F) -> Self
    where
        A: MarshalArgs,
        R: Marshal,
        F: Fn(RawObject, A) -> Result<R, BindingError> + Send + Sync + 'static,
    {
        self.virtual_raw(method, move |object, frame: &mut CallFrame| {
            let args = A::read(frame)?;
            let ret = f(object, args)?;
            frame.set_return(&ret)
        })
    }

    pub fn build(self) -> ClassDescriptor {
        ClassDescriptor {
            name: self.name,
            parent: self.parent,
            kind: self.kind,
            ref_counted: self.ref_counted,
            instantiable: self.instantiable,
            virtuals: self.virtuals,
        }
    }
}
