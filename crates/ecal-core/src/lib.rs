//! # ECAL Core
//!
//! Core implementation of the ECAL event condition action language:
//! - Abstract syntax tree and parser
//! - Hierarchical variable scopes
//! - Tree-walking evaluator with built-in functions and a stdlib registry
//! - Event engine matching events against sinks and executing them
//!   concurrently with cascade tracking
//! - Interactive thread debugger
//!
//! This crate provides the foundational components used by the various
//! ECAL front-ends (console, script runner, debug server).

#![warn(clippy::all)]

pub mod ast;
pub mod engine;
pub mod evaluator;
pub mod parser;
pub mod runtime;
pub mod scope;
pub mod stdlib;
pub mod util;

// Re-export commonly used types
pub use ast::AstNode;
pub use engine::{Event, EventErrors, Monitor, Processor, Rule, RuleScope};
pub use evaluator::{
    debug::{DebugCommand, EcalDebugger},
    errors::{EcalError, ErrorKind, EvalResult, RuntimeError},
    value::{FunctionValue, Value},
    EcalRuntimeProvider, InstanceState, NodeRuntime,
};
pub use parser::{parse, parse_with_runtime, ParseError};
pub use runtime::EcalRuntime;
pub use scope::{Scope, ScopeRef, GLOBAL_SCOPE};
pub use util::{
    EcalLogger, FileImportLocator, ImportLocator, MemoryImportLocator, MemoryLogger,
};

/// ECAL language version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for ECAL core components.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ecal_core=info".parse().unwrap()),
        )
        .init();
}

/// Core ECAL runtime configuration.
#[derive(Debug, Clone)]
pub struct EcalConfig {
    /// Name identifying the run, used in error attributions.
    pub name: String,
    /// Worker threads of the event processor. One worker processes
    /// cascades in a deterministic order.
    pub worker_count: usize,
    /// Abort the remaining rules of a trigger batch after the first rule
    /// error.
    pub fail_on_first: bool,
    /// Root directory for file imports.
    pub import_root: Option<std::path::PathBuf>,
}

impl Default for EcalConfig {
    fn default() -> Self {
        EcalConfig {
            name: "ecal".to_string(),
            worker_count: 1,
            fail_on_first: false,
            import_root: None,
        }
    }
}
