//! The native runtime seam
//!
//! [`NativeRuntime`] is everything the binding layer needs from the engine it
//! wraps: construction by class name, object lifetime and reference counts,
//! the method-bind table, and singletons. It speaks only in raw handles and
//! call frames, so the typed layer above it never depends on how the engine
//! is linked.
//!
//! One runtime is installed per process with [`install_runtime`]; typed
//! handles reach it through [`runtime`].

use once_cell::sync::OnceCell;
use std::sync::Arc;

use tracing::info;

use crate::callframe::CallFrame;
use crate::error::BindingError;
use crate::handle::RawObject;
use crate::method::MethodBind;

/// Bytes-only interface to the wrapped engine
///
/// Implementations are expected to provide their own synchronization: the
/// binding layer calls into them from any thread.
pub trait NativeRuntime: Send + Sync + std::fmt::Debug + 'static {
    /// Native construction entry point
    ///
    /// Reference-counted classes come back holding one reference, owned by
    /// the caller.
    fn construct(&self, class: &str) -> Result<RawObject, BindingError>;

    /// Release a manually-owned object
    fn free(&self, object: RawObject) -> Result<(), BindingError>;

    /// Whether `object` still refers to a live native instance
    fn is_alive(&self, object: RawObject) -> bool;

    /// Dynamic class name of a live object
    fn class_name(&self, object: RawObject) -> Result<String, BindingError>;

    /// Take one more shared reference, returning the new count
    fn reference(&self, object: RawObject) -> Result<u32, BindingError>;

    /// Drop one shared reference, returning `true` if the object was freed
    fn unreference(&self, object: RawObject) -> Result<bool, BindingError>;

    /// Current shared reference count
    fn reference_count(&self, object: RawObject) -> Result<u32, BindingError>;

    /// Look up the method bind registered for exactly `class.method`
    fn method_bind(&self, class: &str, method: &str) -> Option<MethodBind>;

    /// Invoke a method bind on `object` with the marshaled frame
    ///
    /// The callee reads arguments from `frame` and writes its result into the
    /// frame's return slot.
    fn call(
        &self,
        bind: &MethodBind,
        object: RawObject,
        frame: &mut CallFrame,
    ) -> Result<(), BindingError>;

    /// Look up a process-wide singleton instance by class name
    fn singleton(&self, name: &str) -> Result<RawObject, BindingError>;

    /// Announce a host-defined class so the runtime can construct it
    fn register_extension_class(
        &self,
        name: &str,
        parent: &str,
        ref_counted: bool,
    ) -> Result<(), BindingError>;
}

static RUNTIME: OnceCell<Arc<dyn NativeRuntime>> = OnceCell::new();

/// Install the process-wide runtime
///
/// Only the first call succeeds; the runtime lives for the rest of the
/// process.
pub fn install_runtime(runtime: Arc<dyn NativeRuntime>) -> Result<(), BindingError> {
    RUNTIME
        .set(runtime)
        .map_err(|_| BindingError::RuntimeAlreadyInstalled)?;
    info!("Native runtime installed");
    Ok(())
}

/// The process-wide runtime
pub fn runtime() -> Result<&'static dyn NativeRuntime, BindingError> {
    RUNTIME
        .get()
        .map(|rt| rt.as_ref())
        .ok_or(BindingError::RuntimeNotInstalled)
}

pub fn is_runtime_installed() -> bool {
    RUNTIME.get().is_some()
}
