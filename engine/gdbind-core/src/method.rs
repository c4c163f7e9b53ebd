//! Remote method invocation through cached method binds
//!
//! The native side publishes a method-bind table mapping `(class, method)` to
//! a callable it understands, together with the argument and return types it
//! expects. Each binding call site owns a [`MethodCache`] that looks its bind
//! up once, then for every call:
//!
//! 1. acquires a [`CallFrame`] and marshals the arguments in order,
//! 2. checks the marshaled layout against the native signature,
//! 3. refuses object arguments whose native instance is gone,
//! 4. invokes the bind and decodes the return slot.
//!
//! The frame is released when it goes out of scope, on success and on every
//! failure path alike.

use once_cell::sync::OnceCell;
use std::fmt;

use tracing::{error, trace};

use crate::callframe::CallFrame;
use crate::error::BindingError;
use crate::handle::RawObject;
use crate::marshal::{Marshal, MarshalArgs, VariantType};
use crate::runtime::{runtime, NativeRuntime};

/// Index of one entry in the native method-bind table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodBindId(pub u64);

/// Argument and return types of a native method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub args: Vec<VariantType>,
    pub ret: VariantType,
}

impl MethodSignature {
    pub fn new(args: Vec<VariantType>, ret: VariantType) -> Self {
        Self { args, ret }
    }

    /// Signature of a typed call site
    pub fn of<A: MarshalArgs, R: Marshal>() -> Self {
        Self {
            args: A::types(),
            ret: R::TYPE,
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", VariantType::describe(&self.args), self.ret)
    }
}

/// One entry of the native method-bind table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBind {
    pub id: MethodBindId,
    pub class: String,
    pub method: String,
    pub signature: MethodSignature,
}

impl MethodBind {
    /// Check a marshaled frame against the native signature
    pub fn check_frame(&self, frame: &CallFrame) -> Result<(), BindingError> {
        let found = MethodSignature::new(frame.arg_types(), frame.return_type());
        if found != self.signature {
            return Err(BindingError::abi_mismatch(
                &self.class,
                &self.method,
                &self.signature,
                &found,
            ));
        }
        Ok(())
    }
}

/// Per-call-site cache of one method bind
///
/// Declare one as a `static` next to the typed method that uses it. The bind
/// is resolved from the first runtime that asks and reused afterwards.
#[derive(Debug)]
pub struct MethodCache {
    class: &'static str,
    method: &'static str,
    bind: OnceCell<MethodBind>,
}

impl MethodCache {
    pub const fn new(class: &'static str, method: &'static str) -> Self {
        Self {
            class,
            method,
            bind: OnceCell::new(),
        }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn is_resolved(&self) -> bool {
        self.bind.get().is_some()
    }

    /// Resolve (once) and return the cached bind
    pub fn bind(&self, rt: &dyn NativeRuntime) -> Result<&MethodBind, BindingError> {
        self.bind.get_or_try_init(|| {
            rt.method_bind(self.class, self.method).ok_or_else(|| {
                error!(
                    class = self.class,
                    method = self.method,
                    "Method bind missing from native table"
                );
                BindingError::MethodBindMissing {
                    class: self.class.to_string(),
                    method: self.method.to_string(),
                }
            })
        })
    }

    /// Call through the process-wide runtime
    pub fn call<A: MarshalArgs, R: Marshal>(
        &self,
        object: RawObject,
        args: A,
    ) -> Result<R, BindingError> {
        self.call_with(runtime()?, object, args)
    }

    /// Call through an explicit runtime
    pub fn call_with<A: MarshalArgs, R: Marshal>(
        &self,
        rt: &dyn NativeRuntime,
        object: RawObject,
        args: A,
    ) -> Result<R, BindingError> {
        if object.is_null() {
            return Err(BindingError::NullHandle);
        }
        let bind = self.bind(rt)?;

        let mut frame = CallFrame::returning::<R>();
        args.write(&mut frame)?;

        if let Err(e) = bind.check_frame(&frame) {
            error!(error = %e, "Binding table out of sync with native build");
            return Err(e);
        }

        if let Some(stale) = frame.object_args().into_iter().find(|o| !rt.is_alive(*o)) {
            return Err(BindingError::StaleReference(stale.id()));
        }

        trace!(
            class = self.class,
            method = self.method,
            object = object.id(),
            "ptrcall"
        );
        rt.call(bind, object, &mut frame)?;
        frame.take_return::<R>()
    }
}

#[cfg(test)]
#[path = "method_tests.rs"]
mod tests;
