//! Ownership of native objects
//!
//! Objects of reference-counted classes are shared: the count lives on the
//! native side and [`Ref<T>`] is the host's owning capability over one of
//! those references. Every other object is owned manually and released with
//! [`free_object`].

use std::fmt;
use std::ops::Deref;

use tracing::warn;

use crate::class_db::class_db;
use crate::error::BindingError;
use crate::handle::{Inherits, NativeClass};
use crate::runtime::{runtime, NativeRuntime};

/// Marker for classes whose instances are shared-owned through the native
/// reference count
///
/// # Safety
///
/// Only implement for classes the native side reference-counts; [`Ref`]
/// relies on `reference`/`unreference` succeeding for every live instance.
pub unsafe trait RefCountedClass: NativeClass {}

/// One owned reference to a shared native object
///
/// Dropping a `Ref` gives its reference back exactly once. The native side
/// frees the object when the last reference goes.
pub struct Ref<T: RefCountedClass> {
    handle: T,
    rt: &'static dyn NativeRuntime,
    released: bool,
}

impl<T: RefCountedClass> Ref<T> {
    /// Construct a new instance through the process-wide class database; the
    /// native count starts at 1 and belongs to the returned `Ref`
    pub fn new() -> Result<Self, BindingError> {
        let rt = runtime()?;
        let handle = class_db().construct_as::<T>(rt)?;
        // SAFETY: freshly constructed, carrying the construction reference.
        Ok(unsafe { Self::from_owned(rt, handle) })
    }

    /// Take ownership of a reference the caller already holds
    ///
    /// # Safety
    ///
    /// The caller must own one native reference to `handle` and must not give
    /// it back any other way.
    pub unsafe fn from_owned(rt: &'static dyn NativeRuntime, handle: T) -> Self {
        Self {
            handle,
            rt,
            released: false,
        }
    }

    /// Take one more native reference to the same object
    pub fn duplicate(&self) -> Result<Self, BindingError> {
        self.rt.reference(self.handle.as_raw())?;
        // SAFETY: the reference taken above belongs to the new Ref.
        Ok(unsafe { Self::from_owned(self.rt, self.handle) })
    }

    /// Give the reference back now, returning `true` if the object was freed
    pub fn release(mut self) -> Result<bool, BindingError> {
        self.released = true;
        self.rt.unreference(self.handle.as_raw())
    }

    /// Current native reference count
    pub fn reference_count(&self) -> Result<u32, BindingError> {
        self.rt.reference_count(self.handle.as_raw())
    }

    /// The borrowed handle; valid only while some reference is held
    pub fn handle(&self) -> T {
        self.handle
    }

    /// Convert into a reference of a reference-counted ancestor class
    pub fn upcast<A: RefCountedClass>(mut self) -> Ref<A>
    where
        T: Inherits<A>,
    {
        self.released = true;
        // SAFETY: the reference moves from self to the returned Ref.
        unsafe { Ref::from_owned(self.rt, self.handle.upcast()) }
    }
}

impl<T: RefCountedClass> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T: RefCountedClass> Drop for Ref<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.rt.unreference(self.handle.as_raw()) {
            warn!(object = self.handle.as_raw().id(), error = %e, "Failed to drop reference");
        }
    }
}

impl<T: RefCountedClass> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({:?})", self.handle)
    }
}

/// Release a manually-owned object
///
/// Fails with [`BindingError::RefCountedFree`] for shared-owned objects, which
/// are released by dropping their [`Ref`]s.
pub fn free_object<T: NativeClass>(handle: T) -> Result<(), BindingError> {
    if handle.is_null() {
        return Err(BindingError::NullHandle);
    }
    runtime()?.free(handle.as_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{self, TestNode, TestRefCounted, TestResource};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_new_starts_at_one_and_drop_frees() {
        let local = test_utils::setup();
        let r = Ref::<TestRefCounted>::new().unwrap();
        let raw = r.as_raw();
        assert_eq!(r.reference_count().unwrap(), 1);
        drop(r);
        assert!(!local.is_alive(raw));
    }

    #[test]
    fn test_duplicate_shares_the_object() {
        let local = test_utils::setup();
        let a = Ref::<TestResource>::new().unwrap();
        let b = a.duplicate().unwrap();
        assert_eq!(a.handle(), b.handle());
        assert_eq!(a.reference_count().unwrap(), 2);

        let raw = a.as_raw();
        assert!(!a.release().unwrap());
        assert_eq!(b.reference_count().unwrap(), 1);
        drop(b);
        assert!(!local.is_alive(raw));
    }

    #[test]
    fn test_concurrent_duplicates_balance() {
        const THREADS: usize = 8;
        let local = test_utils::setup();
        let shared = Ref::<TestResource>::new().unwrap();
        let raw = shared.as_raw();
        let held = Barrier::new(THREADS + 1);
        let done = Barrier::new(THREADS + 1);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let copy = shared.duplicate().unwrap();
                    held.wait();
                    done.wait();
                    drop(copy);
                });
            }
            held.wait();
            assert_eq!(shared.reference_count().unwrap(), THREADS as u32 + 1);
            done.wait();
        });

        assert_eq!(shared.reference_count().unwrap(), 1);
        assert!(local.is_alive(raw));
        drop(shared);
        assert!(!local.is_alive(raw));
    }

    #[test]
    fn test_upcast_moves_the_reference() {
        let local = test_utils::setup();
        let res = Ref::<TestResource>::new().unwrap();
        let raw = res.as_raw();
        let base: Ref<TestRefCounted> = res.upcast();
        assert_eq!(base.reference_count().unwrap(), 1);
        drop(base);
        assert!(!local.is_alive(raw));
    }

    #[test]
    fn test_duplicate_of_freed_object_is_stale() {
        test_utils::setup();
        let a = Ref::<TestRefCounted>::new().unwrap();
        let raw = a.as_raw();
        let rt = runtime().unwrap();
        // Give the reference back behind the Ref's back.
        rt.unreference(raw).unwrap();
        assert_eq!(
            a.duplicate().unwrap_err(),
            BindingError::StaleReference(raw.id())
        );
        assert_eq!(a.release(), Err(BindingError::StaleReference(raw.id())));
    }

    #[test]
    fn test_free_object_rules() {
        let local = test_utils::setup();
        let node = class_db()
            .construct_as::<TestNode>(runtime().unwrap())
            .unwrap();
        free_object(node).unwrap();
        assert!(!local.is_alive(node.as_raw()));
        assert_eq!(
            free_object(node),
            Err(BindingError::StaleReference(node.as_raw().id()))
        );

        let shared = Ref::<TestRefCounted>::new().unwrap();
        assert_eq!(
            free_object(shared.handle()),
            Err(BindingError::RefCountedFree(shared.as_raw().id()))
        );
        assert_eq!(free_object(TestNode::NULL), Err(BindingError::NullHandle));
    }
}
