//! `Object` and `RefCounted`

use gdbind_core::{
    class_db, free_object, native_class, runtime, BindingError, MethodCache, NativeClass,
    RefCountedClass,
};

native_class! {
    /// Root of the engine class hierarchy
    pub struct Object;
}

native_class! {
    /// Base of every class whose instances are shared-owned
    pub struct RefCounted: Object;
}

unsafe impl RefCountedClass for RefCounted {}

impl Object {
    /// Construct a bare, manually-owned object
    pub fn new() -> Result<Object, BindingError> {
        gdbind_core::construct_as::<Object>()
    }

    pub fn get_instance_id(&self) -> Result<i64, BindingError> {
        static BIND: MethodCache = MethodCache::new("Object", "get_instance_id");
        BIND.call(self.as_raw(), ())
    }

    /// Dynamic class name as reported by the engine
    pub fn get_class(&self) -> Result<String, BindingError> {
        static BIND: MethodCache = MethodCache::new("Object", "get_class");
        BIND.call(self.as_raw(), ())
    }

    pub fn is_class(&self, class: &str) -> Result<bool, BindingError> {
        static BIND: MethodCache = MethodCache::new("Object", "is_class");
        BIND.call(self.as_raw(), (class.to_string(),))
    }

    /// Whether the underlying instance still exists
    pub fn is_instance_valid(&self) -> bool {
        !self.is_null() && runtime().map(|rt| rt.is_alive(self.as_raw())).unwrap_or(false)
    }

    /// Ancestor chain of the dynamic class, most-derived first
    pub fn class_chain(&self) -> Result<Vec<String>, BindingError> {
        let class = self.get_class()?;
        Ok(class_db()
            .ancestors(&class)?
            .iter()
            .map(|d| d.name.clone())
            .collect())
    }

    /// Release a manually-owned object
    pub fn free(self) -> Result<(), BindingError> {
        free_object(self)
    }
}

impl RefCounted {
    pub fn get_reference_count(&self) -> Result<i64, BindingError> {
        static BIND: MethodCache = MethodCache::new("RefCounted", "get_reference_count");
        BIND.call(self.as_raw(), ())
    }
}
