//! The `Engine` singleton

use gdbind_core::{native_class, BindingError, MethodCache, NativeClass, Singleton};

use crate::object::Object;

native_class! {
    /// Process-wide engine information and settings
    pub struct Engine: Object;
}

static ENGINE: Singleton<Engine> = Singleton::new("Engine");

impl Engine {
    /// The engine singleton, looked up once per process
    pub fn singleton() -> Result<Engine, BindingError> {
        ENGINE.get()
    }

    pub fn get_version(&self) -> Result<String, BindingError> {
        static BIND: MethodCache = MethodCache::new("Engine", "get_version");
        BIND.call(self.as_raw(), ())
    }

    pub fn get_frames_drawn(&self) -> Result<i64, BindingError> {
        static BIND: MethodCache = MethodCache::new("Engine", "get_frames_drawn");
        BIND.call(self.as_raw(), ())
    }

    pub fn get_physics_ticks_per_second(&self) -> Result<i64, BindingError> {
        static BIND: MethodCache = MethodCache::new("Engine", "get_physics_ticks_per_second");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_physics_ticks_per_second(&self, ticks: i64) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Engine", "set_physics_ticks_per_second");
        BIND.call(self.as_raw(), (ticks,))
    }
}
