//! In-process reference runtime
//!
//! [`LocalRuntime`] implements [`NativeRuntime`] entirely in Rust. It keeps a
//! native class table with ancestry, an object table, native reference
//! counts, per-object property storage, and a method-bind table whose entries
//! are closures over call frames. It stands in for a linked engine in tests
//! and in the inspector binary.
//!
//! Lock order: object locks are taken before the state lock, never the other
//! way round, and a call locks all of its objects up front in ascending id
//! order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, trace};

use crate::callframe::CallFrame;
use crate::error::BindingError;
use crate::handle::RawObject;
use crate::marshal::{DecodeError, Marshal, MarshalArgs, VariantType};
use crate::method::{MethodBind, MethodBindId, MethodSignature};
use crate::runtime::NativeRuntime;

/// Body of a native method: the locked objects of the call plus the frame
pub type NativeFn =
    Arc<dyn Fn(&mut NativeCall<'_>, &mut CallFrame) -> Result<(), BindingError> + Send + Sync>;

/// One entry of the native class table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeClassInfo {
    pub name: String,
    pub parent: Option<String>,
    pub ref_counted: bool,
    pub instantiable: bool,
    pub singleton: bool,
    extension: bool,
}

impl NativeClassInfo {
    /// The root class
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            ref_counted: false,
            instantiable: true,
            singleton: false,
            extension: false,
        }
    }

    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::root(name)
        }
    }

    pub fn ref_counted(mut self) -> Self {
        self.ref_counted = true;
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.instantiable = false;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self.instantiable = false;
        self
    }
}

/// A live native instance
#[derive(Debug, Clone)]
pub struct NativeObject {
    pub id: u64,
    pub class: String,
    refcount: Option<u32>,
    properties: HashMap<String, (VariantType, Vec<u8>)>,
}

impl NativeObject {
    pub fn refcount(&self) -> Option<u32> {
        self.refcount
    }

    /// Read a stored property; `None` if it was never set
    pub fn get<T: Marshal>(&self, key: &str) -> Result<Option<T>, BindingError> {
        match self.properties.get(key) {
            None => Ok(None),
            Some((ty, _)) if *ty != T::TYPE => Err(DecodeError::TypeMismatch {
                expected: T::TYPE,
                actual: *ty,
            }
            .into()),
            Some((_, bytes)) => Ok(Some(T::decode(bytes)?)),
        }
    }

    pub fn set<T: Marshal>(&mut self, key: &str, value: &T) -> Result<(), BindingError> {
        let mut bytes = Vec::new();
        value.encode(&mut bytes)?;
        self.properties.insert(key.to_string(), (T::TYPE, bytes));
        Ok(())
    }
}

/// Objects held for one native method call
///
/// The receiver and every object argument are locked before the body runs.
/// Bodies reach argument objects through [`NativeCall::object`] rather than
/// going back to the runtime.
pub struct NativeCall<'a> {
    receiver: MutexGuard<'a, NativeObject>,
    arguments: BTreeMap<u64, MutexGuard<'a, NativeObject>>,
}

impl NativeCall<'_> {
    pub fn receiver(&mut self) -> &mut NativeObject {
        &mut self.receiver
    }

    /// An object passed as an argument of this call (or the receiver itself)
    pub fn object(&mut self, object: RawObject) -> Result<&mut NativeObject, BindingError> {
        if object.id() == self.receiver.id {
            return Ok(&mut self.receiver);
        }
        self.arguments
            .get_mut(&object.id())
            .map(|guard| &mut **guard)
            .ok_or(BindingError::StaleReference(object.id()))
    }
}

struct NativeMethod {
    bind: MethodBind,
    func: NativeFn,
}

#[derive(Default)]
struct State {
    classes: HashMap<String, NativeClassInfo>,
    objects: HashMap<u64, Arc<Mutex<NativeObject>>>,
    methods: HashMap<MethodBindId, NativeMethod>,
    method_index: HashMap<(String, String), MethodBindId>,
    singletons: HashMap<String, RawObject>,
}

impl State {
    fn inherits(&self, class: &str, ancestor: &str) -> bool {
        let mut cursor = Some(class);
        let mut depth = 0;
        while let Some(name) = cursor {
            if name == ancestor {
                return true;
            }
            depth += 1;
            if depth > self.classes.len() {
                return false;
            }
            cursor = self.classes.get(name).and_then(|c| c.parent.as_deref());
        }
        false
    }

    fn is_ref_counted(&self, class: &str) -> bool {
        let mut cursor = Some(class);
        let mut depth = 0;
        while let Some(name) = cursor {
            let Some(info) = self.classes.get(name) else {
                return false;
            };
            if info.ref_counted {
                return true;
            }
            depth += 1;
            if depth > self.classes.len() {
                return false;
            }
            cursor = info.parent.as_deref();
        }
        false
    }

    fn object(&self, object: RawObject) -> Result<Arc<Mutex<NativeObject>>, BindingError> {
        self.objects
            .get(&object.id())
            .cloned()
            .ok_or(BindingError::StaleReference(object.id()))
    }
}

/// Reference implementation of the native runtime
pub struct LocalRuntime {
    state: RwLock<State>,
    next_object: AtomicU64,
    next_method: AtomicU64,
    singleton_lookups: AtomicU64,
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap();
        f.debug_struct("LocalRuntime")
            .field("classes", &state.classes.len())
            .field("objects", &state.objects.len())
            .field("methods", &state.methods.len())
            .finish()
    }
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_object: AtomicU64::new(1),
            next_method: AtomicU64::new(1),
            singleton_lookups: AtomicU64::new(0),
        }
    }

    /// Add a native class; its parent must already be known
    pub fn add_class(&self, info: NativeClassInfo) -> Result<(), BindingError> {
        let mut state = self.state.write().unwrap();
        if state.classes.contains_key(&info.name) {
            return Err(BindingError::DuplicateClass(info.name));
        }
        if let Some(parent) = &info.parent {
            if !state.classes.contains_key(parent) {
                return Err(BindingError::UnknownClass(parent.clone()));
            }
        }
        debug!(class = %info.name, parent = ?info.parent, "Native class added");
        state.classes.insert(info.name.clone(), info);
        Ok(())
    }

    /// Add a method bind whose body works directly on the frame
    pub fn add_raw_method<F>(
        &self,
        class: &str,
        method: &str,
        signature: MethodSignature,
        f: F,
    ) -> Result<MethodBindId, BindingError>
    where
        F: Fn(&mut NativeCall<'_>, &mut CallFrame) -> Result<(), BindingError>
            + Send
            + Sync
            + 'static,
    {
        let mut state = self.state.write().unwrap();
        if !state.classes.contains_key(class) {
            return Err(BindingError::UnknownClass(class.to_string()));
        }
        let id = MethodBindId(self.next_method.fetch_add(1, Ordering::Relaxed));
        let bind = MethodBind {
            id,
            class: class.to_string(),
            method: method.to_string(),
            signature,
        };
        state
            .method_index
            .insert((class.to_string(), method.to_string()), id);
        state.methods.insert(
            id,
            NativeMethod {
                bind,
                func: Arc::new(f),
            },
        );
        Ok(id)
    }

    /// Add a method bind with typed arguments and return value
    pub fn add_method<A, R, F>(
        &self,
        class: &str,
        method: &str,
        f: F,
    ) -> Result<MethodBindId, BindingError>
    where
        A: MarshalArgs,
        R: Marshal,
        F: Fn(&mut NativeObject, A) -> Result<R, BindingError> + Send + Sync + 'static,
    {
        self.add_call_method(class, method, move |call, args: A| f(call.receiver(), args))
    }

    /// Add a method bind whose body also works on its object arguments
    pub fn add_call_method<A, R, F>(
        &self,
        class: &str,
        method: &str,
        f: F,
    ) -> Result<MethodBindId, BindingError>
    where
        A: MarshalArgs,
        R: Marshal,
        F: Fn(&mut NativeCall<'_>, A) -> Result<R, BindingError> + Send + Sync + 'static,
    {
        self.add_raw_method(
            class,
            method,
            MethodSignature::of::<A, R>(),
            move |call: &mut NativeCall<'_>, frame: &mut CallFrame| {
                let args = A::read(frame)?;
                let ret = f(call, args)?;
                frame.set_return(&ret)
            },
        )
    }

    /// Add a getter/setter pair backed by per-object property storage
    pub fn add_property<T>(
        &self,
        class: &str,
        getter: &str,
        setter: &str,
        key: &str,
        default: T,
    ) -> Result<(), BindingError>
    where
        T: Marshal + Clone + Send + Sync + 'static,
    {
        let get_key = key.to_string();
        self.add_method(class, getter, move |object, (): ()| {
            Ok(object
                .get::<T>(&get_key)?
                .unwrap_or_else(|| default.clone()))
        })?;
        let set_key = key.to_string();
        self.add_method(class, setter, move |object, (value,): (T,)| {
            object.set(&set_key, &value)
        })?;
        Ok(())
    }

    pub fn native_class(&self, name: &str) -> Option<NativeClassInfo> {
        self.state.read().unwrap().classes.get(name).cloned()
    }

    pub fn live_objects(&self) -> usize {
        self.state.read().unwrap().objects.len()
    }

    /// How many times `singleton` has been asked for an instance
    pub fn singleton_lookups(&self) -> u64 {
        self.singleton_lookups.load(Ordering::SeqCst)
    }

    /// Run `f` against a live object's native state
    pub fn with_object<R>(
        &self,
        object: RawObject,
        f: impl FnOnce(&mut NativeObject) -> R,
    ) -> Result<R, BindingError> {
        let cell = self.state.read().unwrap().object(object)?;
        let mut guard = cell.lock().unwrap();
        Ok(f(&mut *guard))
    }

    fn instantiate(&self, state: &mut State, class: &str) -> RawObject {
        let id = self.next_object.fetch_add(1, Ordering::Relaxed);
        let refcount = state.is_ref_counted(class).then_some(1);
        state.objects.insert(
            id,
            Arc::new(Mutex::new(NativeObject {
                id,
                class: class.to_string(),
                refcount,
                properties: HashMap::new(),
            })),
        );
        RawObject::from_id(id)
    }
}

impl NativeRuntime for LocalRuntime {
    fn construct(&self, class: &str) -> Result<RawObject, BindingError> {
        let mut state = self.state.write().unwrap();
        let info = state
            .classes
            .get(class)
            .ok_or_else(|| BindingError::UnknownClass(class.to_string()))?;
        if !info.instantiable {
            return Err(BindingError::NotInstantiable(class.to_string()));
        }
        let raw = self.instantiate(&mut state, class);
        trace!(class = %class, object = raw.id(), "Native construct");
        Ok(raw)
    }

    fn free(&self, object: RawObject) -> Result<(), BindingError> {
        let cell = self.state.read().unwrap().object(object)?;
        let obj = cell.lock().unwrap();
        if obj.refcount.is_some() {
            return Err(BindingError::RefCountedFree(object.id()));
        }
        let mut state = self.state.write().unwrap();
        if state.singletons.values().any(|s| *s == object) {
            return Err(BindingError::SingletonFree(object.id()));
        }
        if state.objects.remove(&object.id()).is_none() {
            return Err(BindingError::StaleReference(object.id()));
        }
        trace!(object = object.id(), "Native free");
        Ok(())
    }

    fn is_alive(&self, object: RawObject) -> bool {
        self.state
            .read()
            .unwrap()
            .objects
            .contains_key(&object.id())
    }

    fn class_name(&self, object: RawObject) -> Result<String, BindingError> {
        let cell = self.state.read().unwrap().object(object)?;
        let class = cell.lock().unwrap().class.clone();
        Ok(class)
    }

    fn reference(&self, object: RawObject) -> Result<u32, BindingError> {
        let cell = self.state.read().unwrap().object(object)?;
        let mut obj = cell.lock().unwrap();
        match obj.refcount.as_mut() {
            // Released by another thread after we looked it up
            Some(0) => Err(BindingError::StaleReference(object.id())),
            Some(count) => {
                *count += 1;
                Ok(*count)
            }
            None => Err(BindingError::BadCast {
                from: obj.class.clone(),
                to: "RefCounted".to_string(),
            }),
        }
    }

    fn unreference(&self, object: RawObject) -> Result<bool, BindingError> {
        let cell = self.state.read().unwrap().object(object)?;
        let mut obj = cell.lock().unwrap();
        let remaining = match obj.refcount.as_mut() {
            Some(0) => return Err(BindingError::StaleReference(object.id())),
            Some(count) => {
                *count -= 1;
                *count
            }
            None => {
                return Err(BindingError::BadCast {
                    from: obj.class.clone(),
                    to: "RefCounted".to_string(),
                })
            }
        };
        if remaining == 0 {
            self.state.write().unwrap().objects.remove(&object.id());
            trace!(object = object.id(), "Last reference dropped; object freed");
            return Ok(true);
        }
        Ok(false)
    }

    fn reference_count(&self, object: RawObject) -> Result<u32, BindingError> {
        let cell = self.state.read().unwrap().object(object)?;
        let obj = cell.lock().unwrap();
        obj.refcount.ok_or_else(|| BindingError::BadCast {
            from: obj.class.clone(),
            to: "RefCounted".to_string(),
        })
    }

    fn method_bind(&self, class: &str, method: &str) -> Option<MethodBind> {
        let state = self.state.read().unwrap();
        let id = state
            .method_index
            .get(&(class.to_string(), method.to_string()))?;
        state.methods.get(id).map(|m| m.bind.clone())
    }

    fn call(
        &self,
        bind: &MethodBind,
        object: RawObject,
        frame: &mut CallFrame,
    ) -> Result<(), BindingError> {
        let mut ids: Vec<u64> = frame
            .object_args()
            .into_iter()
            .chain([object])
            .filter(|o| !o.is_null())
            .map(RawObject::id)
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let (cells, func, owner) = {
            let state = self.state.read().unwrap();
            let method = state
                .methods
                .get(&bind.id)
                .ok_or_else(|| BindingError::MethodBindMissing {
                    class: bind.class.clone(),
                    method: bind.method.clone(),
                })?;
            let cells = ids
                .iter()
                .map(|id| state.object(RawObject::from_id(*id)).map(|cell| (*id, cell)))
                .collect::<Result<Vec<_>, BindingError>>()?;
            (cells, Arc::clone(&method.func), method.bind.class.clone())
        };

        let mut arguments: BTreeMap<u64, MutexGuard<'_, NativeObject>> = cells
            .iter()
            .map(|(id, cell)| (*id, cell.lock().unwrap()))
            .collect();
        let receiver = arguments
            .remove(&object.id())
            .ok_or(BindingError::StaleReference(object.id()))?;

        if !self.state.read().unwrap().inherits(&receiver.class, &owner) {
            return Err(BindingError::BadCast {
                from: receiver.class.clone(),
                to: owner,
            });
        }

        let result = func(
            &mut NativeCall {
                receiver,
                arguments,
            },
            frame,
        );
        result
    }

    fn singleton(&self, name: &str) -> Result<RawObject, BindingError> {
        self.singleton_lookups.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().unwrap();
        match state.classes.get(name) {
            Some(info) if info.singleton => {}
            _ => return Err(BindingError::UnknownClass(name.to_string())),
        }
        if let Some(existing) = state.singletons.get(name) {
            return Ok(*existing);
        }
        let raw = self.instantiate(&mut state, name);
        state.singletons.insert(name.to_string(), raw);
        debug!(class = %name, object = raw.id(), "Singleton created");
        Ok(raw)
    }

    fn register_extension_class(
        &self,
        name: &str,
        parent: &str,
        ref_counted: bool,
    ) -> Result<(), BindingError> {
        let mut state = self.state.write().unwrap();
        if !state.classes.contains_key(parent) {
            return Err(BindingError::UnknownClass(parent.to_string()));
        }
        if let Some(existing) = state.classes.get(name) {
            // Re-announcing the same extension is a no-op.
            if existing.extension && existing.parent.as_deref() == Some(parent) {
                return Ok(());
            }
            return Err(BindingError::DuplicateClass(name.to_string()));
        }
        let info = NativeClassInfo {
            ref_counted,
            extension: true,
            ..NativeClassInfo::new(name, parent)
        };
        debug!(class = %name, parent = %parent, "Extension class announced");
        state.classes.insert(name.to_string(), info);
        Ok(())
    }
}
