//! `Node`: the base of the scene tree

use gdbind_core::{native_class, BindingError, MethodCache, NativeClass};

use crate::object::Object;

native_class! {
    /// An element of the scene tree; manually owned
    pub struct Node: Object;
}

impl Node {
    pub fn new() -> Result<Node, BindingError> {
        gdbind_core::construct_as::<Node>()
    }

    pub fn get_name(&self) -> Result<String, BindingError> {
        static BIND: MethodCache = MethodCache::new("Node", "get_name");
        BIND.call(self.as_raw(), ())
    }

    pub fn set_name(&self, name: &str) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Node", "set_name");
        BIND.call(self.as_raw(), (name.to_string(),))
    }

    /// Attach `child` under this node
    ///
    /// Accepts a handle of any node class; it is up-cast before marshaling.
    pub fn add_child(&self, child: impl gdbind_core::Inherits<Node>) -> Result<(), BindingError> {
        static BIND: MethodCache = MethodCache::new("Node", "add_child");
        let child: Node = child.upcast();
        BIND.call(self.as_raw(), (child,))
    }

    pub fn get_child_count(&self) -> Result<i64, BindingError> {
        static BIND: MethodCache = MethodCache::new("Node", "get_child_count");
        BIND.call(self.as_raw(), ())
    }

    /// The parent node, or a null handle at the top of the tree
    pub fn get_parent(&self) -> Result<Node, BindingError> {
        static BIND: MethodCache = MethodCache::new("Node", "get_parent");
        BIND.call(self.as_raw(), ())
    }
}
