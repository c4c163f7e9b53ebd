//! Runtime boot and the inspector's subcommands
//!
//! Every command returns a report that prints either as text or as JSON.

use anyhow::{Context, Result};
use gdbind_classes::{install_natives, register_all_classes, Object};
use gdbind_config::BindingConfig;
use gdbind_core::{
    class_db, install_runtime, invoke_virtual, set_frame_pool_limit, BindingError, CallFrame,
    ClassDescriptor, ClassKind, LocalRuntime, NativeClass,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Install the in-process runtime and register the engine classes
pub fn boot(config: &BindingConfig) -> Result<Arc<LocalRuntime>> {
    set_frame_pool_limit(config.runtime.frame_pool_limit);
    class_db().set_allow_override(config.runtime.allow_class_override);

    let rt = Arc::new(LocalRuntime::new());
    install_natives(&rt).context("failed to install native classes")?;
    install_runtime(rt.clone()).context("failed to install runtime")?;
    register_all_classes().context("failed to register engine classes")?;
    info!(
        classes = class_db().len(),
        frame_pool_limit = config.runtime.frame_pool_limit,
        "Runtime ready"
    );
    Ok(rt)
}

/// Print a report in the requested format
pub fn emit<T: Serialize + fmt::Display>(report: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassesReport {
    pub classes: Vec<ClassDescriptor>,
}

impl fmt::Display for ClassesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<12} {:<12} {:<10} {:<5} {:<5} virtuals",
            "class", "parent", "kind", "rc", "new"
        )?;
        for (i, class) in self.classes.iter().enumerate() {
            let kind = match class.kind {
                ClassKind::Engine => "engine",
                ClassKind::Extension => "extension",
                ClassKind::Singleton => "singleton",
            };
            let virtuals: Vec<&str> = class.virtual_names().collect();
            write!(
                f,
                "{:<12} {:<12} {:<10} {:<5} {:<5} {}",
                class.name,
                class.parent.as_deref().unwrap_or("-"),
                kind,
                class.ref_counted,
                class.instantiable,
                virtuals.join(", ")
            )?;
            if i + 1 < self.classes.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

pub fn classes() -> ClassesReport {
    let db = class_db();
    let classes = db
        .list()
        .iter()
        .filter_map(|name| db.get(name))
        .map(|desc| desc.as_ref().clone())
        .collect();
    ClassesReport { classes }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainReport {
    pub class: String,
    pub chain: Vec<String>,
}

impl fmt::Display for ChainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chain.join(" -> "))
    }
}

pub fn chain(class: &str) -> Result<ChainReport, BindingError> {
    let chain = class_db()
        .ancestors(class)?
        .iter()
        .map(|desc| desc.name.clone())
        .collect();
    Ok(ChainReport {
        class: class.to_string(),
        chain,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructReport {
    pub class: String,
    pub instance_id: i64,
    pub ref_counted: bool,
    pub description: String,
    /// Classes the new instance was successfully up-cast to
    pub chain: Vec<String>,
}

impl fmt::Display for ConstructReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "constructed {}", self.description)?;
        writeln!(
            f,
            "  ownership: {}",
            if self.ref_counted { "reference counted" } else { "manual" }
        )?;
        write!(f, "  is-a: {}", self.chain.join(", "))
    }
}

/// Construct `class` by name, inspect it through the root handle, then release it
pub fn construct(rt: &LocalRuntime, class: &str) -> Result<ConstructReport, BindingError> {
    let db = class_db();
    let handle = db.construct(rt, class)?;
    debug!(class = %class, id = handle.raw().id(), "Constructed by name");

    let inspect = || -> Result<ConstructReport, BindingError> {
        let object = handle.cast::<Object>(db)?;
        let mut frame = CallFrame::returning::<String>();
        invoke_virtual(object.as_raw(), "_to_string", &mut frame)?;
        let chain = upcast_chain(object, object.class_chain()?)?;
        Ok(ConstructReport {
            class: object.get_class()?,
            instance_id: object.get_instance_id()?,
            ref_counted: handle.is_ref_counted(),
            description: frame.take_return()?,
            chain,
        })
    };
    let report = inspect();
    handle.release(rt)?;
    report
}

/// The classes in `candidates` that `object` answers `is_class` for
fn upcast_chain(object: Object, candidates: Vec<String>) -> Result<Vec<String>, BindingError> {
    let mut chain = Vec::new();
    for class in candidates {
        if object.is_class(&class)? {
            chain.push(class);
        }
    }
    Ok(chain)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveReport {
    pub class: String,
    pub method: String,
    /// Class level whose implementation runs, if any
    pub resolved_at: Option<String>,
}

impl fmt::Display for ResolveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resolved_at {
            Some(level) => write!(f, "{}.{} -> {}.{}", self.class, self.method, level, self.method),
            None => write!(
                f,
                "{}.{} is not implemented; the engine default runs",
                self.class, self.method
            ),
        }
    }
}

/// Which class level implements `method` for instances of `class`
///
/// A method nobody implements is reported, not treated as an error.
pub fn resolve(class: &str, method: &str) -> Result<ResolveReport, BindingError> {
    let resolved_at = match class_db().resolve_virtual(class, method) {
        Ok(resolved) => Some(resolved.class),
        Err(BindingError::MethodNotFound { .. }) => None,
        Err(e) => return Err(e),
    };
    Ok(ResolveReport {
        class: class.to_string(),
        method: method.to_string(),
        resolved_at,
    })
}
