//! Object handles and zero-cost up-casting
//!
//! A handle is a fixed-size value naming one native object. Every class handle
//! is a `#[repr(transparent)]` wrapper around its direct parent's handle, down
//! to [`RawObject`] at the root, so a handle of any class has exactly the
//! layout of each of its ancestors. Up-casting is therefore a reinterpretation
//! of the same bytes and never copies or validates anything.
//!
//! Class handles are declared with [`native_class!`](crate::native_class):
//!
//! ```rust
//! use gdbind_core::{native_class, Inherits, NativeClass, RawObject};
//!
//! native_class! {
//!     /// Root of the example hierarchy.
//!     pub struct Animal;
//! }
//!
//! native_class! {
//!     pub struct Dog: Animal;
//! }
//!
//! let dog = unsafe { Dog::from_raw(RawObject::from_id(7)) };
//! let animal: &Animal = dog.upcast_ref();
//! assert_eq!(animal.as_raw(), dog.as_raw());
//! ```

use std::fmt;

/// Untyped reference to one native object instance
///
/// The id is assigned by the native runtime; `0` is the null handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct RawObject(u64);

impl RawObject {
    /// The null handle
    pub const NULL: RawObject = RawObject(0);

    /// Wrap a native instance id
    pub const fn from_id(id: u64) -> Self {
        RawObject(id)
    }

    /// The native instance id
    pub const fn id(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "RawObject(null)")
        } else {
            write!(f, "RawObject(#{})", self.0)
        }
    }
}

/// A typed handle for one native class
///
/// # Safety
///
/// Implementors must be `#[repr(transparent)]` wrappers whose innermost field
/// is a [`RawObject`], so that a pointer to the handle is a valid pointer to a
/// handle of any ancestor class. Use [`native_class!`](crate::native_class)
/// rather than implementing this by hand.
pub unsafe trait NativeClass: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Name of the class in the class database
    const CLASS_NAME: &'static str;

    /// The untyped reference this handle wraps
    fn as_raw(&self) -> RawObject;

    /// Wrap a raw reference without checking its dynamic class.
    ///
    /// # Safety
    ///
    /// The object behind `raw` must be an instance of this class or one of its
    /// descendants (or `raw` must be null).
    unsafe fn from_raw(raw: RawObject) -> Self;

    fn is_null(&self) -> bool {
        self.as_raw().is_null()
    }

    fn instance_id(&self) -> u64 {
        self.as_raw().id()
    }
}

/// Declares that `Self` is `A` or a descendant of `A`
///
/// # Safety
///
/// `A` must appear in the ancestor chain of `Self` (or be `Self`), and both
/// types must satisfy the layout contract of [`NativeClass`].
pub unsafe trait Inherits<A: NativeClass>: NativeClass {
    /// Reinterpret this handle as a handle of ancestor `A`
    fn upcast(self) -> A {
        // SAFETY: `Self: Inherits<A>` guarantees the object is an `A`.
        unsafe { A::from_raw(self.as_raw()) }
    }

    /// Borrow this handle as a handle of ancestor `A` without copying
    fn upcast_ref(&self) -> &A {
        // SAFETY: both types are transparent wrappers over the same RawObject.
        unsafe { &*(self as *const Self).cast::<A>() }
    }
}

/// Reinterpret a handle as any other class without checking ancestry.
///
/// # Safety
///
/// The object must actually be an instance of `T` or a descendant.
pub unsafe fn cast_unchecked<S: NativeClass, T: NativeClass>(handle: S) -> T {
    T::from_raw(handle.as_raw())
}

/// Declare a class handle type
///
/// A root class wraps [`RawObject`] directly. A derived class names its direct
/// parent first, followed by every further ancestor up to the root; the
/// generated type dereferences to its parent so inherited methods are callable
/// without an explicit cast.
#[macro_export]
macro_rules! native_class {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        $vis struct $name($crate::handle::RawObject);

        impl $name {
            /// The null handle of this class
            pub const NULL: Self = Self($crate::handle::RawObject::NULL);
        }

        unsafe impl $crate::handle::NativeClass for $name {
            const CLASS_NAME: &'static str = stringify!($name);

            fn as_raw(&self) -> $crate::handle::RawObject {
                self.0
            }

            unsafe fn from_raw(raw: $crate::handle::RawObject) -> Self {
                Self(raw)
            }
        }

        $crate::native_class!(@common $name);
    };

    ($(#[$meta:meta])* $vis:vis struct $name:ident : $parent:ty $(, $ancestor:ty)* ;) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        $vis struct $name($parent);

        impl $name {
            /// The null handle of this class
            pub const NULL: Self = Self(<$parent>::NULL);
        }

        unsafe impl $crate::handle::NativeClass for $name {
            const CLASS_NAME: &'static str = stringify!($name);

            fn as_raw(&self) -> $crate::handle::RawObject {
                $crate::handle::NativeClass::as_raw(&self.0)
            }

            unsafe fn from_raw(raw: $crate::handle::RawObject) -> Self {
                Self(<$parent as $crate::handle::NativeClass>::from_raw(raw))
            }
        }

        unsafe impl $crate::handle::Inherits<$parent> for $name {}
        $(unsafe impl $crate::handle::Inherits<$ancestor> for $name {})*

        impl ::std::ops::Deref for $name {
            type Target = $parent;

            fn deref(&self) -> &$parent {
                &self.0
            }
        }

        $crate::native_class!(@common $name);
    };

    (@common $name:ident) => {
        unsafe impl $crate::handle::Inherits<$name> for $name {}

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let raw = $crate::handle::NativeClass::as_raw(self);
                if raw.is_null() {
                    write!(f, "{}#null", stringify!($name))
                } else {
                    write!(f, "{}#{}", stringify!($name), raw.id())
                }
            }
        }

        impl $crate::marshal::Marshal for $name {
            const TYPE: $crate::marshal::VariantType = $crate::marshal::VariantType::Object;

            fn encode(&self, out: &mut Vec<u8>) -> Result<(), $crate::marshal::EncodeError> {
                let raw = $crate::handle::NativeClass::as_raw(self);
                <$crate::handle::RawObject as $crate::marshal::Marshal>::encode(&raw, out)
            }

            fn decode(buf: &[u8]) -> Result<Self, $crate::marshal::DecodeError> {
                let raw = <$crate::handle::RawObject as $crate::marshal::Marshal>::decode(buf)?;
                // The native signature declared this slot as this class.
                Ok(unsafe { <$name as $crate::handle::NativeClass>::from_raw(raw) })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::mem::{align_of, size_of};

    crate::native_class! {
        struct Animal;
    }

    crate::native_class! {
        struct Dog: Animal;
    }

    crate::native_class! {
        struct Puppy: Dog, Animal;
    }

    impl Animal {
        fn id_plus(&self, n: u64) -> u64 {
            self.as_raw().id() + n
        }
    }

    fn puppy(id: u64) -> Puppy {
        unsafe { Puppy::from_raw(RawObject::from_id(id)) }
    }

    #[test]
    fn test_handles_share_layout() {
        assert_eq!(size_of::<Puppy>(), size_of::<RawObject>());
        assert_eq!(size_of::<Dog>(), size_of::<u64>());
        assert_eq!(align_of::<Puppy>(), align_of::<RawObject>());
    }

    #[test]
    fn test_upcast_ref_aliases_same_bytes() {
        let p = puppy(42);
        let as_dog: &Dog = p.upcast_ref();
        let as_animal: &Animal = p.upcast_ref();

        assert_eq!(as_dog.as_raw(), p.as_raw());
        assert_eq!(as_animal.as_raw(), p.as_raw());
        assert_eq!(
            as_animal as *const Animal as usize,
            &p as *const Puppy as usize
        );
    }

    #[test]
    fn test_upcast_then_back_compares_equal() {
        let p = puppy(9);
        let animal: Animal = p.upcast();
        let back: Puppy = unsafe { cast_unchecked(animal) };
        assert_eq!(back, p);
    }

    #[test]
    fn test_ancestor_methods_reachable_through_deref() {
        let p = puppy(10);
        assert_eq!(p.id_plus(5), 15);
    }

    #[test]
    fn test_reflexive_upcast() {
        let d = unsafe { Dog::from_raw(RawObject::from_id(3)) };
        let same: Dog = d.upcast();
        assert_eq!(same, d);
    }

    #[test]
    fn test_null_handles() {
        assert!(Puppy::NULL.is_null());
        assert!(Animal::NULL.as_raw().is_null());
        assert_eq!(format!("{:?}", Dog::NULL), "Dog#null");
        assert_eq!(format!("{:?}", puppy(4)), "Puppy#4");
        assert_eq!(format!("{:?}", RawObject::from_id(4)), "RawObject(#4)");
    }

    #[test]
    fn test_equality_is_by_instance() {
        let mut seen = HashSet::new();
        seen.insert(puppy(1));
        seen.insert(puppy(1));
        seen.insert(puppy(2));
        assert_eq!(seen.len(), 2);
        assert_eq!(puppy(5).instance_id(), 5);
    }
}
