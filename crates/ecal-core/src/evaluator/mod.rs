//! Tree-walking evaluator.
//!
//! The parser produces a tree of labeled AST nodes; the runtime registry
//! maps every label to an evaluator constructor which builds a mirroring
//! tree of [`NodeRuntime`] components. Validation is required once per
//! tree before the first evaluation and may compute cached state such as
//! parsed numeric literals or destructuring targets.

pub mod debug;
pub mod errors;
pub mod func_provider;
pub mod registry;
pub mod rt_assign;
pub mod rt_func;
pub mod rt_general;
pub mod rt_identifier;
pub mod rt_import;
pub mod rt_sink;
pub mod rt_statements;
pub mod rt_value;
pub mod value;

#[cfg(test)]
pub(crate) mod testutil;


use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::ast::AstNode;
use crate::engine::{Monitor, Processor};
use crate::evaluator::debug::EcalDebugger;
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::value::Value;
use crate::scope::ScopeRef;
use crate::util::import::ImportLocator;
use crate::util::logging::{ConsoleLogger, EcalLogger};
use crate::EcalConfig;

/// A runtime component attached to one AST node.
pub trait NodeRuntime: Send + Sync {
    /// The AST node this component evaluates.
    fn node(&self) -> &Arc<AstNode>;

    /// Pre-execution check of this node and all its child nodes.
    fn validate(&self) -> Result<(), EcalError>;

    /// Evaluate this runtime component.
    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult;
}

/// Per-thread evaluation state passed alongside the scope.
///
/// The value table persists across repeated calls of iterator style
/// functions which key their entries with the instance id of the call
/// site. Loops and function calls start from a fresh table but keep the
/// thread id and the cascade monitor.
pub struct InstanceState {
    /// Id of the logical thread owning this evaluation.
    pub tid: u64,
    /// Monitor of the event cascade this evaluation runs under, if any.
    pub monitor: Option<Monitor>,
    values: HashMap<String, Value>,
}

impl InstanceState {
    pub fn new(tid: u64) -> InstanceState {
        InstanceState {
            tid,
            monitor: None,
            values: HashMap::new(),
        }
    }

    /// Fresh value table sharing thread id and monitor.
    pub fn child(&self) -> InstanceState {
        InstanceState {
            tid: self.tid,
            monitor: self.monitor.clone(),
            values: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

/// Factory object producing runtime components for ECAL ASTs and the
/// shared per-run context: import locator, logger, debugger, event
/// processor and the thread id allocator.
pub struct EcalRuntimeProvider {
    /// Name identifying the input, used in error attributions.
    pub name: String,
    pub import_locator: Option<Arc<dyn ImportLocator>>,
    pub logger: Arc<dyn EcalLogger>,
    pub debugger: Option<Arc<EcalDebugger>>,
    pub processor: Arc<Processor>,
    self_ref: std::sync::Weak<EcalRuntimeProvider>,
    thread_ids: AtomicU64,
    instance_ids: AtomicU64,
}

impl EcalRuntimeProvider {
    /// Provider with default collaborators: tracing logger, no imports,
    /// no debugger, single-worker processor.
    pub fn new(name: impl Into<String>) -> Arc<EcalRuntimeProvider> {
        EcalRuntimeProvider::with_parts(
            name,
            None,
            Arc::new(ConsoleLogger),
            None,
            Processor::new(1),
        )
    }

    pub fn with_parts(
        name: impl Into<String>,
        import_locator: Option<Arc<dyn ImportLocator>>,
        logger: Arc<dyn EcalLogger>,
        debugger: Option<Arc<EcalDebugger>>,
        processor: Arc<Processor>,
    ) -> Arc<EcalRuntimeProvider> {
        let name = name.into();

        Arc::new_cyclic(|self_ref| EcalRuntimeProvider {
            name,
            import_locator,
            logger,
            debugger,
            processor,
            self_ref: self_ref.clone(),
            thread_ids: AtomicU64::new(1),
            instance_ids: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &EcalConfig, logger: Arc<dyn EcalLogger>) -> Arc<EcalRuntimeProvider> {
        let locator: Option<Arc<dyn ImportLocator>> = config
            .import_root
            .as_ref()
            .map(|root| {
                Arc::new(crate::util::import::FileImportLocator::new(root.clone()))
                    as Arc<dyn ImportLocator>
            });

        let processor = Processor::new(config.worker_count);
        processor.set_fail_on_first(config.fail_on_first);

        EcalRuntimeProvider::with_parts(config.name.clone(), locator, logger, None, processor)
    }

    /// A provider for another source sharing all collaborators of this
    /// one, as used when resolving imports.
    pub fn fork(&self, name: impl Into<String>) -> Arc<EcalRuntimeProvider> {
        EcalRuntimeProvider::with_parts(
            name,
            self.import_locator.clone(),
            self.logger.clone(),
            self.debugger.clone(),
            self.processor.clone(),
        )
    }

    /// Runtime component for a given AST node.
    pub fn runtime(&self, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
        let erp = self.self_ref.upgrade().expect("provider is alive");
        registry::runtime_for(&erp, node)
    }

    /// Create a new runtime error attributed to the given node.
    pub fn new_runtime_error(
        &self,
        kind: ErrorKind,
        detail: impl Into<String>,
        node: &Arc<AstNode>,
    ) -> EcalError {
        errors::RuntimeError::new(self.name.clone(), kind, detail, node.clone()).into()
    }

    /// Allocate an id for a new logical evaluation thread.
    pub fn new_thread_id(&self) -> u64 {
        self.thread_ids.fetch_add(1, Ordering::SeqCst)
    }

    fn new_instance_id(&self, node: &AstNode) -> String {
        format!(
            "{}-{}",
            node.name,
            self.instance_ids.fetch_add(1, Ordering::SeqCst)
        )
    }
}

/// Shared state of every runtime component: provider, node, the unique
/// instance id of the code location and the validation flag.
pub(crate) struct BaseRuntime {
    pub erp: Arc<EcalRuntimeProvider>,
    pub node: Arc<AstNode>,
    pub instance_id: String,
    validated: AtomicBool,
}

impl BaseRuntime {
    pub fn new(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> BaseRuntime {
        BaseRuntime {
            erp: erp.clone(),
            node: node.clone(),
            instance_id: erp.new_instance_id(node),
            validated: AtomicBool::new(false),
        }
    }

    pub fn mark_validated(&self) {
        self.validated.store(true, Ordering::SeqCst);
    }

    /// Evaluation requires a prior validation pass over the tree.
    pub fn ensure_validated(&self) -> Result<(), EcalError> {
        if !self.validated.load(Ordering::SeqCst) {
            return Err(self.error(
                ErrorKind::RuntimeError,
                format!("Runtime component was not validated: {}", self.node.describe()),
            ));
        }
        Ok(())
    }

    pub fn error(&self, kind: ErrorKind, detail: impl Into<String>) -> EcalError {
        self.erp.new_runtime_error(kind, detail, &self.node)
    }
}

/// Build runtime components for all children of a node.
pub(crate) fn build_children(
    erp: &Arc<EcalRuntimeProvider>,
    node: &Arc<AstNode>,
) -> Vec<Arc<dyn NodeRuntime>> {
    node.children.iter().map(|c| erp.runtime(c)).collect()
}

/// Validate a set of child runtime components.
pub(crate) fn validate_all(children: &[Arc<dyn NodeRuntime>]) -> Result<(), EcalError> {
    for child in children {
        child.validate()?;
    }
    Ok(())
}
