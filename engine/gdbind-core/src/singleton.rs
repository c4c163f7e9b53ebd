//! Process-wide engine singletons
//!
//! Each singleton class gets one `static Singleton<T>`. The first access asks
//! the runtime for the instance; every later access returns the cached
//! handle. Concurrent first accesses resolve exactly once. A failed lookup is
//! not cached, so a later access can still succeed once the runtime is ready.
//! Singletons live for the rest of the process and are never torn down.

use once_cell::sync::OnceCell;

use tracing::debug;

use crate::error::BindingError;
use crate::handle::NativeClass;
use crate::runtime::{runtime, NativeRuntime};

#[derive(Debug)]
pub struct Singleton<T: NativeClass> {
    name: &'static str,
    cell: OnceCell<T>,
}

impl<T: NativeClass> Singleton<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The instance, resolved through the process-wide runtime on first use
    pub fn get(&self) -> Result<T, BindingError> {
        if let Some(handle) = self.cell.get() {
            return Ok(*handle);
        }
        self.get_with(runtime()?)
    }

    /// The instance, resolved through `rt` on first use
    pub fn get_with(&self, rt: &dyn NativeRuntime) -> Result<T, BindingError> {
        self.cell
            .get_or_try_init(|| {
                let raw = rt.singleton(self.name)?;
                debug!(singleton = self.name, object = raw.id(), "Singleton resolved");
                // SAFETY: the runtime hands out the instance of this class.
                Ok(unsafe { T::from_raw(raw) })
            })
            .copied()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}
