//! Tests for the class database

use super::*;
use crate::handle::Inherits;
use crate::local::{LocalRuntime, NativeClassInfo};
use crate::marshal::VariantType;
use std::sync::Barrier;
use crate::test_utils::{self, TestNode, TestObject, TestRefCounted, TestResource};

crate::native_class! {
    struct Animal;
}

crate::native_class! {
    struct Dog: Animal;
}

impl Animal {
    fn sound_name(&self) -> String {
        format!("animal#{}", self.as_raw().id())
    }
}

fn animal_runtime() -> LocalRuntime {
    let rt = LocalRuntime::new();
    rt.add_class(NativeClassInfo::root("Animal")).unwrap();
    rt.add_class(NativeClassInfo::new("Dog", "Animal")).unwrap();
    rt
}

fn animal_db() -> ClassDb {
    let db = ClassDb::new();
    db.register(
        ClassBuilder::engine("Animal")
            .virtual_fn("_describe", |_obj, (): ()| Ok("animal".to_string()))
            .virtual_fn("_legs", |_obj, (): ()| Ok(4i64)),
    )
    .unwrap();
    db.register(
        ClassBuilder::engine("Dog")
            .parent("Animal")
            .virtual_fn("_describe", |_obj, (): ()| Ok("dog".to_string()))
            .virtual_fn("_bark", |_obj, (): ()| Ok(())),
    )
    .unwrap();
    db
}

#[test]
fn test_animal_dog_scenario() {
    let rt = animal_runtime();
    let db = animal_db();

    let handle = db.construct(&rt, "Dog").unwrap();
    let dog: Dog = handle.cast(&db).unwrap();
    let animal: &Animal = dog.upcast_ref();
    assert_eq!(animal.as_raw(), dog.as_raw());
    assert_eq!(rt.class_name(animal.as_raw()).unwrap(), "Dog");

    // A method defined only on Animal is reachable through the Dog handle.
    assert_eq!(dog.sound_name(), format!("animal#{}", dog.as_raw().id()));
}

#[test]
fn test_every_ancestor_cast_succeeds() {
    let rt = animal_runtime();
    let db = animal_db();
    let handle = db.construct(&rt, "Dog").unwrap();

    let chain: Vec<String> = db
        .ancestors(handle.class_name())
        .unwrap()
        .iter()
        .map(|d| d.name.clone())
        .collect();
    assert_eq!(chain, vec!["Dog", "Animal"]);

    assert!(handle.cast::<Dog>(&db).is_ok());
    assert!(handle.cast::<Animal>(&db).is_ok());
}

#[test]
fn test_downcast_checked_against_dynamic_class() {
    let rt = animal_runtime();
    let db = animal_db();

    let animal = db.construct(&rt, "Animal").unwrap();
    assert_eq!(
        db.try_cast::<Dog>(&rt, animal.raw()),
        Err(BindingError::BadCast {
            from: "Animal".into(),
            to: "Dog".into(),
        })
    );

    let dog = db.construct(&rt, "Dog").unwrap();
    let as_animal: Animal = db.try_cast::<Dog>(&rt, dog.raw()).unwrap().upcast();
    let back: Dog = db.try_cast(&rt, as_animal.as_raw()).unwrap();
    assert_eq!(back.as_raw(), dog.raw());

    rt.free(dog.raw()).unwrap();
    assert_eq!(
        db.try_cast::<Dog>(&rt, dog.raw()),
        Err(BindingError::StaleReference(dog.raw().id()))
    );
    assert_eq!(
        db.try_cast::<Dog>(&rt, RawObject::NULL),
        Err(BindingError::NullHandle)
    );
}

#[test]
fn test_unknown_class_construction() {
    let rt = animal_runtime();
    let db = animal_db();
    assert!(matches!(
        db.construct(&rt, "NotARealClass"),
        Err(BindingError::UnknownClass(name)) if name == "NotARealClass"
    ));
}

#[test]
fn test_virtual_resolution_prefers_most_derived() {
    let db = animal_db();

    let describe = db.resolve_virtual("Dog", "_describe").unwrap();
    assert_eq!(describe.class, "Dog");

    let legs = db.resolve_virtual("Dog", "_legs").unwrap();
    assert_eq!(legs.class, "Animal");

    let from_animal = db.resolve_virtual("Animal", "_describe").unwrap();
    assert_eq!(from_animal.class, "Animal");
    assert!(!from_animal.same_target(&describe));
}

#[test]
fn test_derived_only_virtual_not_visible_from_ancestor() {
    let db = animal_db();
    assert!(db.resolve_virtual("Dog", "_bark").is_ok());
    assert_eq!(
        db.resolve_virtual("Animal", "_bark").unwrap_err(),
        BindingError::MethodNotFound {
            class: "Animal".into(),
            method: "_bark".into(),
        }
    );
    assert!(matches!(
        db.resolve_virtual("Cat", "_bark"),
        Err(BindingError::UnknownClass(_))
    ));
}

#[test]
fn test_resolution_is_idempotent() {
    let db = animal_db();
    let first = db.resolve_virtual("Dog", "_legs").unwrap();
    let second = db.resolve_virtual("Dog", "_legs").unwrap();
    assert!(first.same_target(&second));
    assert_eq!(first.class, second.class);
}

#[test]
fn test_invoke_virtual_uses_dynamic_class() {
    let rt = animal_runtime();
    let db = animal_db();
    let dog = db.construct(&rt, "Dog").unwrap();

    // The engine only knows the object and the method name.
    let mut frame = CallFrame::acquire(VariantType::String);
    db.invoke_virtual(&rt, dog.raw(), "_describe", &mut frame)
        .unwrap();
    assert_eq!(frame.take_return::<String>().unwrap(), "dog");

    let mut frame = CallFrame::acquire(VariantType::Int);
    db.invoke_virtual(&rt, dog.raw(), "_legs", &mut frame)
        .unwrap();
    assert_eq!(frame.take_return::<i64>().unwrap(), 4);

    let mut frame = CallFrame::acquire(VariantType::Nil);
    assert!(matches!(
        db.invoke_virtual(&rt, dog.raw(), "_fly", &mut frame),
        Err(BindingError::MethodNotFound { .. })
    ));
}

#[test]
fn test_duplicate_registration() {
    let db = animal_db();
    assert_eq!(
        db.register(ClassBuilder::engine("Dog").parent("Animal"))
            .unwrap_err(),
        BindingError::DuplicateClass("Dog".into())
    );

    db.set_allow_override(true);
    let replaced = db
        .register(ClassBuilder::engine("Dog").parent("Animal"))
        .unwrap();
    assert_eq!(replaced.virtual_names().count(), 0);
    assert_eq!(db.resolve_virtual("Dog", "_describe").unwrap().class, "Animal");
    assert_eq!(db.len(), 2);
}

#[test]
fn test_inheritance_cycle_rejected() {
    let db = ClassDb::new();
    db.register(ClassBuilder::engine("A").parent("B")).unwrap();
    db.register(ClassBuilder::engine("B").parent("C")).unwrap();
    assert_eq!(
        db.register(ClassBuilder::engine("C").parent("A"))
            .unwrap_err(),
        BindingError::InheritanceCycle {
            class: "C".into(),
            parent: "A".into(),
        }
    );
    assert_eq!(
        db.register(ClassBuilder::engine("Loop").parent("Loop"))
            .unwrap_err(),
        BindingError::InheritanceCycle {
            class: "Loop".into(),
            parent: "Loop".into(),
        }
    );
    assert!(!db.is_registered("C"));
}

#[test]
fn test_registration_order_does_not_matter() {
    let db = ClassDb::new();
    db.register(
        ClassBuilder::engine("Dog")
            .parent("Animal")
            .virtual_fn("_bark", |_obj, (): ()| Ok(())),
    )
    .unwrap();

    // Animal is not registered yet: the chain ends at Dog.
    assert!(matches!(
        db.resolve_virtual("Dog", "_legs"),
        Err(BindingError::MethodNotFound { .. })
    ));
    assert!(matches!(
        db.ancestors("Dog"),
        Err(BindingError::UnknownClass(name)) if name == "Animal"
    ));

    db.register(
        ClassBuilder::engine("Animal").virtual_fn("_legs", |_obj, (): ()| Ok(4i64)),
    )
    .unwrap();
    assert_eq!(db.resolve_virtual("Dog", "_legs").unwrap().class, "Animal");
    assert!(db.inherits("Dog", "Animal").unwrap());
    assert!(!db.inherits("Animal", "Dog").unwrap());
}

#[test]
fn test_ref_counted_inherited_at_registration() {
    let db = ClassDb::new();
    db.register(ClassBuilder::engine("Object")).unwrap();
    db.register(ClassBuilder::engine("RefCounted").parent("Object").ref_counted(true))
        .unwrap();
    let resource = db
        .register(ClassBuilder::engine("Resource").parent("RefCounted"))
        .unwrap();
    assert!(resource.ref_counted);
    assert_eq!(db.list(), vec!["Object", "RefCounted", "Resource"]);
}

#[test]
fn test_not_instantiable() {
    let rt = animal_runtime();
    let db = animal_db();
    db.register(ClassBuilder::singleton("Kennel").parent("Animal"))
        .unwrap();
    db.register(
        ClassBuilder::engine("Mammal")
            .parent("Animal")
            .instantiable(false),
    )
    .unwrap();
    assert_eq!(
        db.construct(&rt, "Kennel").unwrap_err(),
        BindingError::NotInstantiable("Kennel".into())
    );
    assert_eq!(
        db.construct(&rt, "Mammal").unwrap_err(),
        BindingError::NotInstantiable("Mammal".into())
    );
}

#[test]
fn test_extension_registered_with_runtime() {
    let rt = animal_runtime();
    let db = animal_db();

    db.register_extension(
        &rt,
        ClassBuilder::extension("Puppy", "Dog")
            .virtual_fn("_describe", |_obj, (): ()| Ok("puppy".to_string())),
    )
    .unwrap();
    assert!(rt.native_class("Puppy").is_some());

    let puppy = db.construct(&rt, "Puppy").unwrap();
    let mut frame = CallFrame::acquire(VariantType::String);
    db.invoke_virtual(&rt, puppy.raw(), "_describe", &mut frame)
        .unwrap();
    assert_eq!(frame.take_return::<String>().unwrap(), "puppy");
    assert!(puppy.cast::<Dog>(&db).is_ok());

    // The runtime refuses an unknown parent; the database stays unchanged.
    assert_eq!(
        db.register_extension(&rt, ClassBuilder::extension("Ghost", "Nowhere"))
            .unwrap_err(),
        BindingError::UnknownClass("Nowhere".into())
    );
    assert!(!db.is_registered("Ghost"));
}

#[test]
fn test_rejected_extension_never_reaches_runtime() {
    let rt = animal_runtime();
    let db = ClassDb::new();
    // Wolf is not registered yet; the lazy parent is tolerated.
    db.register(ClassBuilder::engine("Animal").parent("Wolf"))
        .unwrap();

    // The runtime would accept Wolf (it knows Animal), but the database sees
    // Wolf -> Animal -> Wolf and refuses before announcing it.
    assert!(matches!(
        db.register_extension(&rt, ClassBuilder::extension("Wolf", "Animal")),
        Err(BindingError::InheritanceCycle { .. })
    ));
    assert!(rt.native_class("Wolf").is_none());
    assert!(!db.is_registered("Wolf"));
}

#[test]
fn test_concurrent_extension_registration() {
    let rt = animal_runtime();
    let db = animal_db();
    let barrier = Barrier::new(8);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    db.register_extension(&rt, ClassBuilder::extension("Beagle", "Dog"))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err, &BindingError::DuplicateClass("Beagle".into()));
    }
    assert!(rt.native_class("Beagle").is_some());
    assert_eq!(db.ancestors("Beagle").unwrap().len(), 3);
}

#[test]
fn test_dyn_handle_release() {
    let rt = animal_runtime();
    let db = animal_db();
    let dog = db.construct(&rt, "Dog").unwrap();
    let raw = dog.raw();
    assert!(!dog.is_ref_counted());
    dog.release(&rt).unwrap();
    assert!(!rt.is_alive(raw));
}

#[test]
fn test_global_database() {
    let local = test_utils::setup();
    assert!(is_registered("TestNode"));
    assert!(list_registered_classes().contains(&"TestResource".to_string()));

    let node: TestNode = construct_as().unwrap();
    let object: TestObject = node.upcast();
    let back: TestNode = try_cast(object).unwrap();
    assert_eq!(back, node);
    assert!(try_cast::<TestRefCounted>(node).is_err());

    let res = construct("TestResource").unwrap();
    assert!(res.is_ref_counted());
    assert_eq!(local.reference_count(res.raw()).unwrap(), 1);
    let typed: TestResource = res.cast(class_db()).unwrap();
    assert_eq!(typed.as_raw(), res.raw());
    res.release(local).unwrap();
    assert!(!local.is_alive(typed.as_raw()));

    assert!(matches!(
        construct("NotARealClass"),
        Err(BindingError::UnknownClass(_))
    ));
    assert_eq!(
        construct("TestSingleton").unwrap_err(),
        BindingError::NotInstantiable("TestSingleton".into())
    );
    free_node(node);
}

fn free_node(node: TestNode) {
    crate::refcount::free_object(node).unwrap();
}
