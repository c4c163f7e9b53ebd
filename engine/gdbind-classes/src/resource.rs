use gdbind_core::{native_class, BindingError, MethodCache, NativeClass, Ref, RefCountedClass};

use crate::object::{Object, RefCounted};

native_class! {
    /// Shared data loaded from or saved to a resource path
    pub struct Resource: RefCounted, Object;
}

unsafe impl RefCountedClass for Resource {}

impl Resource {
    pub fn new() -> Result<Ref<Resource>, BindingError> {
        Ref::new()
    }

    pub fn get_path(&self) -> Result<String, BindingError> {
        static BIND: MethodCache = MethodCache::new("Resource", "get_path");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_path(&self, path: &str) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Resource", "set_path");
        BIND.call(self.as_raw(), (path.to_string(),))
    }

    pub fn get_name(&self) -> Result<String, BindingError> {
        static BIND: MethodCache = MethodCache::new("Resource", "get_name");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_name(&self, name: &str) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Resource", "set_name");
        BIND.call(self.as_raw(), (name.to_string(),))
    }
}
