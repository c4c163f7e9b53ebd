//! Typed bindings for the core engine classes
//!
//! Each class is a handle declared with `native_class!`, so every class can be
//! used wherever one of its ancestors is expected and inherited methods are
//! reachable through `Deref`. Methods marshal their arguments through a
//! per-method `MethodCache`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use gdbind_classes::{register_all_classes, Node2D};
//! use gdbind_core::Vector2;
//!
//! // Call once at startup - safe to call multiple times
//! register_all_classes().unwrap();
//!
//! let sprite = Node2D::new().unwrap();
//! sprite.set_name("Sprite").unwrap();
//! sprite.set_position(Vector2::new(4.0, 2.0)).unwrap();
//! ```

use once_cell::sync::OnceCell;

use gdbind_core::{class_db, BindingError, CallFrame, ClassBuilder, NativeClass, RawObject};
use tracing::info;

pub mod engine;
pub mod native;
pub mod node;
pub mod node2d;
pub mod object;
pub mod resource;

pub use engine::Engine;
pub use native::{advance_frame, install_natives};
pub use node::Node;
pub use node2d::{Camera2D, CanvasItem, Node2D};
pub use object::{Object, RefCounted};
pub use resource::Resource;

static REGISTERED: OnceCell<()> = OnceCell::new();

/// Register every bound class with the process-wide class database
///
/// Registration happens once; later calls return immediately. If it fails,
/// the next call tries again.
///
/// Currently registers `Object`, `RefCounted`, `Resource`, `Node`,
/// `CanvasItem`, `Node2D`, `Camera2D` and the `Engine` singleton.
pub fn register_all_classes() -> Result<(), BindingError> {
    REGISTERED
        .get_or_try_init(|| {
            for builder in class_builders() {
                class_db().register(builder)?;
            }
            info!(classes = class_db().len(), "Engine classes registered");
            Ok(())
        })
        .map(|_| ())
}

fn class_builders() -> Vec<ClassBuilder> {
    vec![
        ClassBuilder::engine(Object::CLASS_NAME).virtual_raw("_to_string", object_to_string),
        ClassBuilder::engine(RefCounted::CLASS_NAME)
            .parent(Object::CLASS_NAME)
            .ref_counted(true),
        ClassBuilder::engine(Resource::CLASS_NAME).parent(RefCounted::CLASS_NAME),
        ClassBuilder::engine(Node::CLASS_NAME).parent(Object::CLASS_NAME),
        ClassBuilder::engine(CanvasItem::CLASS_NAME)
            .parent(Node::CLASS_NAME)
            .instantiable(false),
        ClassBuilder::engine(Node2D::CLASS_NAME).parent(CanvasItem::CLASS_NAME),
        ClassBuilder::engine(Camera2D::CLASS_NAME).parent(Node2D::CLASS_NAME),
        ClassBuilder::singleton(Engine::CLASS_NAME).parent(Object::CLASS_NAME),
    ]
}

/// Default `_to_string`: `<Class#id>`
fn object_to_string(object: RawObject, frame: &mut CallFrame) -> Result<(), BindingError> {
    frame.expect_arity(0)?;
    // SAFETY: every instance is an Object.
    let class = unsafe { Object::from_raw(object) }.get_class()?;
    frame.set_return(&format!("<{}#{}>", class, object.id()))
}

#[cfg(test)]
mod tests;
