//! 2D scene nodes: `CanvasItem`, `Node2D`, `Camera2D`

use gdbind_core::{native_class, BindingError, MethodCache, NativeClass, Vector2};

use crate::node::Node;
use crate::object::Object;

native_class! {
    /// Anything drawn on a 2D canvas; abstract
    pub struct CanvasItem: Node, Object;
}

native_class! {
    /// A 2D node with a transform
    pub struct Node2D: CanvasItem, Node, Object;
}

native_class! {
    pub struct Camera2D: Node2D, CanvasItem, Node, Object;
}

impl CanvasItem {
    pub fn is_visible(&self) -> Result<bool, BindingError> {
        static BIND: MethodCache = MethodCache::new("CanvasItem", "is_visible");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_visible(&self, visible: bool) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("CanvasItem", "set_visible");
        BIND.call(self.as_raw(), (visible,))
    }

    pub fn show(&self) -> Result<(), BindingError> {
        self.set_visible(true)
    }

    pub fn hide(&self) -> Result<(), BindingError> {
        self.set_visible(false)
    }
}

impl Node2D {
    pub fn new() -> Result<Node2D, BindingError> {
        gdbind_core::construct_as::<Node2D>()
    }

    pub fn get_position(&self) -> Result<Vector2, BindingError> {
        static BIND: MethodCache = MethodCache::new("Node2D", "get_position");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_position(&self, position: Vector2) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Node2D", "set_position");
        BIND.call(self.as_raw(), (position,))
    }

    pub fn get_rotation(&self) -> Result<f64, BindingError> {
        static BIND: MethodCache = MethodCache::new("Node2D", "get_rotation");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_rotation(&self, radians: f64) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Node2D", "set_rotation");
        BIND.call(self.as_raw(), (radians,))
    }

    /// Move by `offset` relative to the current position
    pub fn translate(&self, offset: Vector2) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Node2D", "translate");
        BIND.call(self.as_raw(), (offset,))
    }
}

impl Camera2D {
    pub fn new() -> Result<Camera2D, BindingError> {
        gdbind_core::construct_as::<Camera2D>()
    }

    pub fn get_zoom(&self) -> Result<Vector2, BindingError> {
        static BIND: MethodCache = MethodCache::new("Camera2D", "get_zoom");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_zoom(&self, zoom: Vector2) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Camera2D", "set_zoom");
        BIND.call(self.as_raw(), (zoom,))
    }

    pub fn make_current(&self) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Camera2D", "make_current");
        BIND.call(self.as_raw(), ())
    }

    pub fn is_current(&self) -> Result<bool, BindingError> {
        static BIND: MethodCache = MethodCache::new("Camera2D", "is_current");
        BIND.call(self.as_raw(), ())
    }
}
