//! Core binding layer between host code and a native engine's class hierarchy
//!
//! This crate provides the pieces every generated class binding is built on:
//! - `RawObject` and `native_class!`: fixed-size handles with zero-cost up-casts
//! - `ClassDb`: class descriptors, ancestor chains, construction by name and
//!   virtual dispatch
//! - `CallFrame` and `Marshal`: scoped argument frames for remote calls
//! - `MethodCache`: per-call-site method binds with ABI checking
//! - `Ref` and `Singleton`: shared ownership and process-wide instances
//! - `NativeRuntime`: the seam to the engine, with `LocalRuntime` as an
//!   in-process implementation

pub mod callframe;
pub mod class_db;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod local;
pub mod marshal;
pub mod method;
pub mod refcount;
pub mod runtime;
pub mod singleton;

// Re-export main types for convenience
pub use callframe::{frame_stats, set_frame_pool_limit, CallFrame, FrameStats};
pub use class_db::{
    class_db, construct, construct_as, invoke_virtual, is_registered, list_registered_classes,
    register_class, resolve_virtual, try_cast, ClassDb, DynHandle, ResolvedVirtual,
};
pub use descriptor::{ClassBuilder, ClassDescriptor, ClassKind};
pub use error::BindingError;
pub use handle::{cast_unchecked, Inherits, NativeClass, RawObject};
pub use local::{LocalRuntime, NativeCall, NativeClassInfo, NativeObject};
pub use marshal::{Marshal, MarshalArgs, VariantType, Vector2};
pub use method::{MethodBind, MethodBindId, MethodCache, MethodSignature};
pub use refcount::{free_object, Ref, RefCountedClass};
pub use runtime::{install_runtime, is_runtime_installed, runtime, NativeRuntime};
pub use singleton::Singleton;
