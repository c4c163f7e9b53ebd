//! Native-side implementations of the bound classes for [`LocalRuntime`]
//!
//! A linked engine provides these classes and their method table itself.
//! When running against the local runtime they are installed here, with the
//! same class names, ancestry, and method signatures the typed bindings use.

use std::sync::{Arc, Weak};

use gdbind_core::{
    BindingError, LocalRuntime, NativeCall, NativeClassInfo, NativeRuntime, RawObject, Vector2,
};
use tracing::debug;

/// Version string reported by the local `Engine` singleton
pub const LOCAL_ENGINE_VERSION: &str = "4.3-local";

const DEFAULT_PHYSICS_TICKS: i64 = 60;

/// Add the bound classes and their methods to `rt`
pub fn install_natives(rt: &Arc<LocalRuntime>) -> Result<(), BindingError> {
    install_classes(rt)?;
    install_object(rt)?;
    install_resource(rt)?;
    install_node(rt)?;
    install_node2d(rt)?;
    install_engine(rt)?;
    debug!("Local natives installed");
    Ok(())
}

fn install_classes(rt: &LocalRuntime) -> Result<(), BindingError> {
    rt.add_class(NativeClassInfo::root("Object"))?;
    rt.add_class(NativeClassInfo::new("RefCounted", "Object").ref_counted())?;
    rt.add_class(NativeClassInfo::new("Resource", "RefCounted"))?;
    rt.add_class(NativeClassInfo::new("Node", "Object"))?;
    rt.add_class(NativeClassInfo::new("CanvasItem", "Node").abstract_class())?;
    rt.add_class(NativeClassInfo::new("Node2D", "CanvasItem"))?;
    rt.add_class(NativeClassInfo::new("Camera2D", "Node2D"))?;
    rt.add_class(NativeClassInfo::new("Engine", "Object").singleton())?;
    Ok(())
}

fn upgrade(rt: &Weak<LocalRuntime>) -> Result<Arc<LocalRuntime>, BindingError> {
    rt.upgrade().ok_or(BindingError::RuntimeNotInstalled)
}

fn native_inherits(rt: &LocalRuntime, class: &str, ancestor: &str) -> bool {
    let mut cursor = rt.native_class(class);
    while let Some(info) = cursor {
        if info.name == ancestor {
            return true;
        }
        cursor = info.parent.and_then(|p| rt.native_class(&p));
    }
    false
}

fn install_object(rt: &Arc<LocalRuntime>) -> Result<(), BindingError> {
    rt.add_method("Object", "get_instance_id", |obj, (): ()| Ok(obj.id as i64))?;
    rt.add_method("Object", "get_class", |obj, (): ()| Ok(obj.class.clone()))?;

    let weak = Arc::downgrade(rt);
    rt.add_method("Object", "is_class", move |obj, (class,): (String,)| {
        let rt = upgrade(&weak)?;
        Ok(native_inherits(&rt, &obj.class, &class))
    })?;

    rt.add_method("RefCounted", "get_reference_count", |obj, (): ()| {
        Ok(obj.refcount().map(i64::from).unwrap_or(0))
    })?;
    Ok(())
}

fn install_resource(rt: &LocalRuntime) -> Result<(), BindingError> {
    rt.add_property("Resource", "get_path", "set_path", "path", String::new())?;
    rt.add_property("Resource", "get_name", "set_name", "name", String::new())?;
    Ok(())
}

fn install_node(rt: &Arc<LocalRuntime>) -> Result<(), BindingError> {
    rt.add_property("Node", "get_name", "set_name", "name", String::new())?;

    let weak = Arc::downgrade(rt);
    rt.add_call_method("Node", "add_child", move |call, (child,): (RawObject,)| {
        attach_child(&weak, call, child)
    })?;
    rt.add_method("Node", "get_child_count", |obj, (): ()| {
        Ok(obj.get::<i64>("child_count")?.unwrap_or(0))
    })?;
    rt.add_method("Node", "get_parent", |obj, (): ()| {
        Ok(obj.get::<RawObject>("parent")?.unwrap_or(RawObject::NULL))
    })?;
    Ok(())
}

/// Both nodes are already locked by the call, so the child is reached
/// through `call` and never through the runtime.
fn attach_child(
    rt: &Weak<LocalRuntime>,
    call: &mut NativeCall<'_>,
    child: RawObject,
) -> Result<(), BindingError> {
    let parent = call.receiver();
    let parent_raw = RawObject::from_id(parent.id);
    if child == parent_raw {
        return Err(BindingError::BadCast {
            from: format!("{}#{}", parent.class, parent.id),
            to: "a child of itself".to_string(),
        });
    }
    let rt = upgrade(rt)?;
    let child_obj = call.object(child)?;
    if !native_inherits(&rt, &child_obj.class, "Node") {
        return Err(BindingError::BadCast {
            from: child_obj.class.clone(),
            to: "Node".to_string(),
        });
    }
    child_obj.set("parent", &parent_raw)?;

    let parent = call.receiver();
    let count = parent.get::<i64>("child_count")?.unwrap_or(0);
    parent.set("child_count", &(count + 1))
}

fn install_node2d(rt: &LocalRuntime) -> Result<(), BindingError> {
    rt.add_property("CanvasItem", "is_visible", "set_visible", "visible", true)?;

    rt.add_property(
        "Node2D",
        "get_position",
        "set_position",
        "position",
        Vector2::ZERO,
    )?;
    rt.add_property("Node2D", "get_rotation", "set_rotation", "rotation", 0.0f64)?;
    rt.add_method("Node2D", "translate", |obj, (offset,): (Vector2,)| {
        let current = obj.get::<Vector2>("position")?.unwrap_or(Vector2::ZERO);
        obj.set("position", &(current + offset))
    })?;

    rt.add_property("Camera2D", "get_zoom", "set_zoom", "zoom", Vector2::ONE)?;
    rt.add_method("Camera2D", "make_current", |obj, (): ()| {
        obj.set("current", &true)
    })?;
    rt.add_method("Camera2D", "is_current", |obj, (): ()| {
        Ok(obj.get::<bool>("current")?.unwrap_or(false))
    })?;
    Ok(())
}

fn install_engine(rt: &LocalRuntime) -> Result<(), BindingError> {
    rt.add_method("Engine", "get_version", |_obj, (): ()| {
        Ok(LOCAL_ENGINE_VERSION.to_string())
    })?;
    rt.add_method("Engine", "get_frames_drawn", |obj, (): ()| {
        Ok(obj.get::<i64>("frames_drawn")?.unwrap_or(0))
    })?;
    rt.add_property(
        "Engine",
        "get_physics_ticks_per_second",
        "set_physics_ticks_per_second",
        "physics_ticks",
        DEFAULT_PHYSICS_TICKS,
    )?;
    Ok(())
}

/// Advance the local engine's frame counter, returning the new count
///
/// This is the main-loop side of the engine, not a bound method.
pub fn advance_frame(rt: &LocalRuntime) -> Result<i64, BindingError> {
    let engine = rt.singleton("Engine")?;
    rt.with_object(engine, |obj| -> Result<i64, BindingError> {
        let frames = obj.get::<i64>("frames_drawn")?.unwrap_or(0) + 1;
        obj.set("frames_drawn", &frames)?;
        Ok(frames)
    })?
}
