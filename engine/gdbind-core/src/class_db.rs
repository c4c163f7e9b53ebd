//! Class database: registration, construction by name, and virtual dispatch
//!
//! The class database maps class names to immutable [`ClassDescriptor`]s and
//! answers every question that needs the inheritance tree: the ancestor chain
//! of a class, whether one class inherits another, which level of the chain
//! implements a virtual method, and whether a handle may be down-cast.
//!
//! A process-wide database is reachable through [`class_db`] and the free
//! functions in this module; tests can build private [`ClassDb`] instances.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::callframe::CallFrame;
use crate::descriptor::{ClassBuilder, ClassDescriptor, ClassKind, VirtualFn};
use crate::error::BindingError;
use crate::handle::{NativeClass, RawObject};
use crate::runtime::{runtime, NativeRuntime};

/// Result of resolving a virtual method by name
#[derive(Clone)]
pub struct ResolvedVirtual {
    /// Class level whose implementation was selected
    pub class: String,
    pub method: String,
    func: VirtualFn,
}

impl ResolvedVirtual {
    /// Run the selected implementation
    pub fn invoke(&self, object: RawObject, frame: &mut CallFrame) -> Result<(), BindingError> {
        (self.func)(object, frame)
    }

    /// Whether two resolutions selected the same implementation
    pub fn same_target(&self, other: &ResolvedVirtual) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl std::fmt::Debug for ResolvedVirtual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResolvedVirtual({}::{})", self.class, self.method)
    }
}

/// A freshly constructed object together with its class descriptor
#[derive(Debug, Clone)]
pub struct DynHandle {
    raw: RawObject,
    class: Arc<ClassDescriptor>,
}

impl DynHandle {
    pub fn raw(&self) -> RawObject {
        self.raw
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn is_ref_counted(&self) -> bool {
        self.class.ref_counted
    }

    /// Reinterpret as `T` after checking the constructed class inherits it
    pub fn cast<T: NativeClass>(&self, db: &ClassDb) -> Result<T, BindingError> {
        if db.inherits(&self.class.name, T::CLASS_NAME)? {
            // SAFETY: the object was constructed as a descendant of T.
            Ok(unsafe { T::from_raw(self.raw) })
        } else {
            Err(BindingError::BadCast {
                from: self.class.name.clone(),
                to: T::CLASS_NAME.to_string(),
            })
        }
    }

    /// Give up the caller's ownership: drop the constructed reference for
    /// shared-owned objects, free manually-owned ones
    pub fn release(self, rt: &dyn NativeRuntime) -> Result<(), BindingError> {
        if self.class.ref_counted {
            rt.unreference(self.raw).map(|_| ())
        } else {
            rt.free(self.raw)
        }
    }
}

/// Registry of class descriptors keyed by class name
#[derive(Debug, Default)]
pub struct ClassDb {
    classes: RwLock<HashMap<String, Arc<ClassDescriptor>>>,
    allow_override: AtomicBool,
}

impl ClassDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow re-registering a name, replacing the previous descriptor
    pub fn set_allow_override(&self, allow: bool) {
        self.allow_override.store(allow, Ordering::Relaxed);
    }

    /// Register a class
    ///
    /// The parent does not have to be registered yet. A registration that
    /// would close a loop in the inheritance tree is rejected.
    pub fn register(&self, builder: ClassBuilder) -> Result<Arc<ClassDescriptor>, BindingError> {
        let mut classes = self.classes.write().unwrap();
        let descriptor = self.validate(&classes, builder.build())?;
        Ok(Self::insert(&mut classes, descriptor))
    }

    /// Register a host-defined class and announce it to the runtime
    ///
    /// The database stays write-locked from validation to insert, and the
    /// runtime only hears about a class that has already passed validation,
    /// so the two tables cannot disagree.
    pub fn register_extension(
        &self,
        rt: &dyn NativeRuntime,
        builder: ClassBuilder,
    ) -> Result<Arc<ClassDescriptor>, BindingError> {
        let mut classes = self.classes.write().unwrap();
        let descriptor = self.validate(&classes, builder.build())?;
        if let Some(parent) = descriptor.parent.as_deref() {
            rt.register_extension_class(&descriptor.name, parent, descriptor.ref_counted)?;
        }
        Ok(Self::insert(&mut classes, descriptor))
    }

    /// Duplicate and cycle checks; inherits `ref_counted` from a known parent
    fn validate(
        &self,
        classes: &HashMap<String, Arc<ClassDescriptor>>,
        mut descriptor: ClassDescriptor,
    ) -> Result<ClassDescriptor, BindingError> {
        if classes.contains_key(&descriptor.name) {
            if !self.allow_override.load(Ordering::Relaxed) {
                return Err(BindingError::DuplicateClass(descriptor.name));
            }
            warn!(class = %descriptor.name, "Overriding existing class registration");
        }

        if let Some(parent) = &descriptor.parent {
            let mut visited = HashSet::new();
            let mut cursor = Some(parent.as_str());
            while let Some(name) = cursor {
                if name == descriptor.name || !visited.insert(name) {
                    return Err(BindingError::InheritanceCycle {
                        class: descriptor.name.clone(),
                        parent: parent.clone(),
                    });
                }
                cursor = classes.get(name).and_then(|d| d.parent.as_deref());
            }

            if let Some(parent_desc) = classes.get(parent) {
                descriptor.ref_counted |= parent_desc.ref_counted;
            }
        }
        Ok(descriptor)
    }

    fn insert(
        classes: &mut HashMap<String, Arc<ClassDescriptor>>,
        descriptor: ClassDescriptor,
    ) -> Arc<ClassDescriptor> {
        debug!(
            class = %descriptor.name,
            parent = ?descriptor.parent,
            kind = ?descriptor.kind,
            "Registered class"
        );
        let descriptor = Arc::new(descriptor);
        classes.insert(descriptor.name.clone(), Arc::clone(&descriptor));
        descriptor
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.read().unwrap().get(name).cloned()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.classes.read().unwrap().contains_key(name)
    }

    /// All registered class names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.classes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ancestor chain from `name` itself up to the root
    pub fn ancestors(&self, name: &str) -> Result<Vec<Arc<ClassDescriptor>>, BindingError> {
        let classes = self.classes.read().unwrap();
        let mut chain: Vec<Arc<ClassDescriptor>> = Vec::new();
        let mut cursor = Some(name);
        while let Some(current) = cursor {
            let desc = classes
                .get(current)
                .ok_or_else(|| BindingError::UnknownClass(current.to_string()))?;
            if chain.iter().any(|d| d.name == desc.name) {
                return Err(BindingError::InheritanceCycle {
                    class: name.to_string(),
                    parent: desc.name.clone(),
                });
            }
            chain.push(Arc::clone(desc));
            cursor = desc.parent.as_deref();
        }
        Ok(chain)
    }

    /// Whether `class` is `ancestor` or one of its descendants
    pub fn inherits(&self, class: &str, ancestor: &str) -> Result<bool, BindingError> {
        Ok(self.ancestors(class)?.iter().any(|d| d.name == ancestor))
    }

    /// Construct an instance of a registered class
    pub fn construct(&self, rt: &dyn NativeRuntime, name: &str) -> Result<DynHandle, BindingError> {
        let class = match self.get(name) {
            Some(class) => class,
            None => {
                warn!(class = %name, "Attempted to construct unregistered class");
                return Err(BindingError::UnknownClass(name.to_string()));
            }
        };
        if !class.instantiable {
            return Err(BindingError::NotInstantiable(name.to_string()));
        }

        let raw = rt.construct(name)?;
        debug!(class = %name, object = raw.id(), "Constructed object");
        Ok(DynHandle { raw, class })
    }

    /// Construct an instance of `T`
    pub fn construct_as<T: NativeClass>(&self, rt: &dyn NativeRuntime) -> Result<T, BindingError> {
        let handle = self.construct(rt, T::CLASS_NAME)?;
        // SAFETY: constructed by T's own class name.
        Ok(unsafe { T::from_raw(handle.raw) })
    }

    /// Checked down-cast using the object's dynamic class
    pub fn try_cast<T: NativeClass>(
        &self,
        rt: &dyn NativeRuntime,
        object: RawObject,
    ) -> Result<T, BindingError> {
        if object.is_null() {
            return Err(BindingError::NullHandle);
        }
        let dynamic = rt.class_name(object)?;
        if self.inherits(&dynamic, T::CLASS_NAME)? {
            // SAFETY: the dynamic class descends from T.
            Ok(unsafe { T::from_raw(object) })
        } else {
            Err(BindingError::BadCast {
                from: dynamic,
                to: T::CLASS_NAME.to_string(),
            })
        }
    }

    /// Find the most-derived implementation of `method` visible from `class`
    ///
    /// Walks from `class` towards the root and stops at the first level that
    /// implements the method. A parent that has not been registered yet ends
    /// the walk as if it were the root.
    pub fn resolve_virtual(
        &self,
        class: &str,
        method: &str,
    ) -> Result<ResolvedVirtual, BindingError> {
        let classes = self.classes.read().unwrap();
        let start = classes
            .get(class)
            .ok_or_else(|| BindingError::UnknownClass(class.to_string()))?;

        let mut visited = HashSet::new();
        let mut cursor = Some(start);
        while let Some(desc) = cursor {
            if !visited.insert(desc.name.as_str()) {
                break;
            }
            if let Some(func) = desc.virtual_method(method) {
                return Ok(ResolvedVirtual {
                    class: desc.name.clone(),
                    method: method.to_string(),
                    func: Arc::clone(func),
                });
            }
            cursor = match desc.parent.as_deref() {
                Some(parent) => {
                    let next = classes.get(parent);
                    if next.is_none() {
                        debug!(
                            class = %desc.name,
                            parent = %parent,
                            "Parent not registered; chain ends here"
                        );
                    }
                    next
                }
                None => None,
            };
        }
        Err(BindingError::MethodNotFound {
            class: class.to_string(),
            method: method.to_string(),
        })
    }

    /// Invoke a virtual method by name on an object, the way the engine does
    pub fn invoke_virtual(
        &self,
        rt: &dyn NativeRuntime,
        object: RawObject,
        method: &str,
        frame: &mut CallFrame,
    ) -> Result<(), BindingError> {
        if object.is_null() {
            return Err(BindingError::NullHandle);
        }
        let class = rt.class_name(object)?;
        let resolved = self.resolve_virtual(&class, method)?;
        debug!(
            class = %class,
            method = %method,
            level = %resolved.class,
            "Dispatching virtual"
        );
        resolved.invoke(object, frame)
    }
}

static CLASS_DB: Lazy<ClassDb> = Lazy::new(ClassDb::new);

/// The process-wide class database
pub fn class_db() -> &'static ClassDb {
    &CLASS_DB
}

/// Register a class with the process-wide database
///
/// Extension classes are also announced to the installed runtime.
pub fn register_class(builder: ClassBuilder) -> Result<Arc<ClassDescriptor>, BindingError> {
    match builder.kind() {
        ClassKind::Extension => CLASS_DB.register_extension(runtime()?, builder),
        ClassKind::Engine | ClassKind::Singleton => CLASS_DB.register(builder),
    }
}

/// Construct a registered class by name
pub fn construct(name: &str) -> Result<DynHandle, BindingError> {
    CLASS_DB.construct(runtime()?, name)
}

/// Construct an instance of `T`
pub fn construct_as<T: NativeClass>() -> Result<T, BindingError> {
    CLASS_DB.construct_as::<T>(runtime()?)
}

/// Checked down-cast of any handle
pub fn try_cast<T: NativeClass>(handle: impl NativeClass) -> Result<T, BindingError> {
    CLASS_DB.try_cast::<T>(runtime()?, handle.as_raw())
}

pub fn is_registered(name: &str) -> bool {
    CLASS_DB.is_registered(name)
}

pub fn list_registered_classes() -> Vec<String> {
    CLASS_DB.list()
}

pub fn resolve_virtual(class: &str, method: &str) -> Result<ResolvedVirtual, BindingError> {
    CLASS_DB.resolve_virtual(class, method)
}

/// Virtual-by-name hook used by the engine to call host overrides
pub fn invoke_virtual(
    object: RawObject,
    method: &str,
    frame: &mut CallFrame,
) -> Result<(), BindingError> {
    CLASS_DB.invoke_virtual(runtime()?, object, method, frame)
}

#[cfg(test)]
#[path = "class_db_tests.rs"]
mod tests;
