//! Tests for the bound classes against the local runtime

use super::*;
use gdbind_core::{
    construct, free_object, install_runtime, invoke_virtual, is_registered,
    list_registered_classes, try_cast, ClassKind, Inherits, LocalRuntime, NativeRuntime, Ref,
    VariantType, Vector2,
};
use once_cell::sync::Lazy;
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

static RUNTIME: Lazy<Arc<LocalRuntime>> = Lazy::new(|| {
    let rt = Arc::new(LocalRuntime::new());
    install_natives(&rt).unwrap();
    install_runtime(rt.clone()).unwrap();
    register_all_classes().unwrap();
    rt
});

fn setup() -> &'static LocalRuntime {
    RUNTIME.as_ref()
}

#[test]
fn test_register_all_classes() {
    setup();
    for class in [
        "Object",
        "RefCounted",
        "Resource",
        "Node",
        "CanvasItem",
        "Node2D",
        "Camera2D",
        "Engine",
    ] {
        assert!(is_registered(class), "{class} should be registered");
    }
    assert_eq!(
        class_db().get("Engine").unwrap().kind,
        ClassKind::Singleton
    );
    assert!(class_db().get("Resource").unwrap().ref_counted);
}

#[test]
fn test_register_all_classes_idempotent() {
    setup();
    register_all_classes().unwrap();
    register_all_classes().unwrap();

    let classes = list_registered_classes();
    assert_eq!(classes.iter().filter(|c| *c == "Node2D").count(), 1);
}

#[test]
fn test_inherited_methods_through_deref() {
    setup();
    let camera = Camera2D::new().unwrap();

    // Node method, two levels up.
    camera.set_name("MainCamera").unwrap();
    assert_eq!(camera.get_name().unwrap(), "MainCamera");

    // Node2D method, one level up.
    camera.set_position(Vector2::new(3.0, 4.0)).unwrap();
    camera.translate(Vector2::ONE).unwrap();
    assert_eq!(camera.get_position().unwrap(), Vector2::new(4.0, 5.0));

    // CanvasItem and Object methods.
    assert!(camera.is_visible().unwrap());
    camera.hide().unwrap();
    assert!(!camera.is_visible().unwrap());
    assert_eq!(camera.get_class().unwrap(), "Camera2D");
    assert!(camera.is_class("CanvasItem").unwrap());
    assert!(!camera.is_class("Resource").unwrap());

    assert_eq!(camera.get_zoom().unwrap(), Vector2::ONE);
    camera.make_current().unwrap();
    assert!(camera.is_current().unwrap());

    camera.free().unwrap();
    assert!(!camera.is_instance_valid());
}

#[test]
fn test_upcast_then_downcast() {
    setup();
    let camera = Camera2D::new().unwrap();
    let node: Node = camera.upcast();
    let object: &Object = camera.upcast_ref();
    assert_eq!(node.as_raw(), object.as_raw());

    let back: Camera2D = try_cast(node).unwrap();
    assert_eq!(back, camera);
    assert!(try_cast::<Resource>(node).is_err());

    let chain = object.class_chain().unwrap();
    assert_eq!(
        chain,
        vec!["Camera2D", "Node2D", "CanvasItem", "Node", "Object"]
    );
    camera.free().unwrap();
}

#[test]
fn test_construct_every_instantiable_class_and_upcast() {
    let rt = setup();
    for class in ["Object", "Node", "Node2D", "Camera2D", "Resource", "RefCounted"] {
        let handle = construct(class).unwrap();
        let object: Object = handle.cast(class_db()).unwrap();
        assert_eq!(object.get_class().unwrap(), class);
        assert!(object.get_instance_id().unwrap() > 0);
        handle.release(rt).unwrap();
    }

    assert_eq!(
        construct("CanvasItem").unwrap_err(),
        BindingError::NotInstantiable("CanvasItem".into())
    );
    assert_eq!(
        construct("Engine").unwrap_err(),
        BindingError::NotInstantiable("Engine".into())
    );
    assert!(matches!(
        construct("NotARealClass"),
        Err(BindingError::UnknownClass(_))
    ));
}

#[test]
fn test_scene_tree() {
    setup();
    let root = Node::new().unwrap();
    let sprite = Node2D::new().unwrap();
    let camera = Camera2D::new().unwrap();

    root.add_child(sprite).unwrap();
    root.add_child(camera).unwrap();
    assert_eq!(root.get_child_count().unwrap(), 2);
    assert_eq!(sprite.get_parent().unwrap(), root);
    assert!(root.get_parent().unwrap().is_null());
    assert!(root.add_child(root).is_err());

    sprite.free().unwrap();
    assert_eq!(
        root.add_child(sprite),
        Err(BindingError::StaleReference(sprite.as_raw().id()))
    );
    camera.free().unwrap();
    root.free().unwrap();
}

#[test]
fn test_resource_is_shared() {
    let rt = setup();
    let res = Resource::new().unwrap();
    res.set_path("res://player.tres").unwrap();
    assert_eq!(res.get_path().unwrap(), "res://player.tres");
    assert_eq!(res.get_reference_count().unwrap(), 1);

    let other = res.duplicate().unwrap();
    assert_eq!(other.get_reference_count().unwrap(), 2);
    drop(other);
    assert_eq!(res.get_reference_count().unwrap(), 1);

    assert_eq!(
        free_object(res.handle()),
        Err(BindingError::RefCountedFree(res.as_raw().id()))
    );

    let raw = res.as_raw();
    let base: Ref<RefCounted> = res.upcast();
    drop(base);
    assert!(!rt.is_alive(raw));
}

#[test]
fn test_engine_singleton() {
    let rt = setup();
    let engine = Engine::singleton().unwrap();
    assert_eq!(Engine::singleton().unwrap(), engine);
    assert_eq!(engine.get_version().unwrap(), native::LOCAL_ENGINE_VERSION);
    assert_eq!(engine.get_physics_ticks_per_second().unwrap(), 60);
    engine.set_physics_ticks_per_second(120).unwrap();
    assert_eq!(engine.get_physics_ticks_per_second().unwrap(), 120);

    let before = engine.get_frames_drawn().unwrap();
    advance_frame(rt).unwrap();
    assert_eq!(engine.get_frames_drawn().unwrap(), before + 1);
}

#[test]
fn test_default_virtual_falls_through_to_object() {
    setup();
    let node = Node2D::new().unwrap();

    let resolved = gdbind_core::resolve_virtual("Node2D", "_to_string").unwrap();
    assert_eq!(resolved.class, "Object");

    let mut frame = CallFrame::acquire(VariantType::String);
    invoke_virtual(node.as_raw(), "_to_string", &mut frame).unwrap();
    assert_eq!(
        frame.take_return::<String>().unwrap(),
        format!("<Node2D#{}>", node.as_raw().id())
    );

    let mut frame = CallFrame::acquire(VariantType::Nil);
    assert!(matches!(
        invoke_virtual(node.as_raw(), "_process", &mut frame),
        Err(BindingError::MethodNotFound { .. })
    ));
    node.free().unwrap();
}

#[test]
fn test_engine_singleton_cannot_be_freed() {
    setup();
    let engine = Engine::singleton().unwrap();
    assert_eq!(
        Inherits::<Object>::upcast(engine).free(),
        Err(BindingError::SingletonFree(engine.instance_id()))
    );

    // The cached handle still names a live instance.
    assert_eq!(Engine::singleton().unwrap(), engine);
    assert!(engine.is_instance_valid());
    assert_eq!(engine.get_version().unwrap(), native::LOCAL_ENGINE_VERSION);
}

#[test]
fn test_concurrent_calls_across_objects_complete() {
    const ROUNDS: i64 = 200;
    setup();
    let a = Node::new().unwrap();
    let b = Node::new().unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let barrier = Arc::new(Barrier::new(3));
        let link = |parent: Node, child: Node| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<(), BindingError> {
                barrier.wait();
                for _ in 0..ROUNDS {
                    parent.add_child(child)?;
                }
                Ok(())
            })
        };
        let forward = link(a, b);
        let backward = link(b, a);

        // Reference-count churn takes the state lock for writing meanwhile.
        let churn_barrier = Arc::clone(&barrier);
        let churn = thread::spawn(move || -> Result<(), BindingError> {
            churn_barrier.wait();
            for _ in 0..ROUNDS {
                let res = Resource::new()?;
                res.set_name("churn")?;
            }
            Ok(())
        });

        let results = [forward, backward, churn].map(|h| h.join().unwrap());
        let _ = tx.send(results);
    });

    let results = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("concurrent add_child calls never returned");
    for result in results {
        result.unwrap();
    }
    assert_eq!(a.get_child_count().unwrap(), ROUNDS);
    assert_eq!(b.get_child_count().unwrap(), ROUNDS);

    a.free().unwrap();
    b.free().unwrap();
}
