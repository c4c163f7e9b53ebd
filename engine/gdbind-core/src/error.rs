//! Error taxonomy for the binding layer
//!
//! Every fallible operation in this crate returns [`BindingError`]. Most
//! variants are recoverable and surfaced to the caller; the ones reported by
//! [`BindingError::is_fatal`] mean the binding tables disagree with the native
//! build and should not be retried.

use crate::marshal::{DecodeError, EncodeError};
use crate::method::MethodSignature;

/// Errors raised while constructing, casting, or calling into native objects
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Method '{method}' not found on '{class}' or any of its ancestors")]
    MethodNotFound { class: String, method: String },

    #[error("Stale reference: object #{0} has already been released")]
    StaleReference(u64),

    #[error(
        "ABI mismatch calling {class}.{method}: native expects {expected}, binding marshaled {found}"
    )]
    AbiMismatch {
        class: String,
        method: String,
        expected: String,
        found: String,
    },

    #[error("No method bind for {class}.{method} in the native method table")]
    MethodBindMissing { class: String, method: String },

    #[error("Class '{0}' cannot be instantiated")]
    NotInstantiable(String),

    #[error("Class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("Registering '{class}' with parent '{parent}' would create an inheritance cycle")]
    InheritanceCycle { class: String, parent: String },

    #[error("Cannot cast object of class '{from}' to '{to}'")]
    BadCast { from: String, to: String },

    #[error("Object #{0} is reference counted and cannot be freed manually")]
    RefCountedFree(u64),

    #[error("Object #{0} is an engine singleton and lives for the whole process")]
    SingletonFree(u64),

    #[error("Null handle passed where an object was required")]
    NullHandle,

    #[error("No native runtime has been installed")]
    RuntimeNotInstalled,

    #[error("A native runtime is already installed")]
    RuntimeAlreadyInstalled,

    #[error("Failed to marshal argument: {0}")]
    Encode(#[from] EncodeError),

    #[error("Failed to unmarshal value: {0}")]
    Decode(#[from] DecodeError),
}

impl BindingError {
    /// Whether this error indicates that the binding tables are out of sync
    /// with the native build.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BindingError::AbiMismatch { .. } | BindingError::MethodBindMissing { .. }
        )
    }

    pub(crate) fn abi_mismatch(
        class: &str,
        method: &str,
        expected: &MethodSignature,
        found: &MethodSignature,
    ) -> Self {
        BindingError::AbiMismatch {
            class: class.to_string(),
            method: method.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
