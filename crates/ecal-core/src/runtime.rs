//! High-level interface for ECAL execution.
//!
//! Wraps a runtime provider and a global scope for use by external
//! components like the console, the script runner and the debug server.

use std::sync::Arc;

use thiserror::Error;

use crate::evaluator::errors::{EcalError, RuntimeError};
use crate::evaluator::value::Value;
use crate::evaluator::{EcalRuntimeProvider, InstanceState};
use crate::parser::{self, ParseError};
use crate::scope::{Scope, ScopeRef, GLOBAL_SCOPE};
use crate::util::logging::EcalLogger;
use crate::EcalConfig;

#[derive(Debug, Error)]
pub enum EcalRuntimeError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Eval(#[from] Box<RuntimeError>),
    #[error("Unexpected control flow: {0}")]
    Control(String),
}

/// Combines parser, evaluator, event engine and global scope.
pub struct EcalRuntime {
    provider: Arc<EcalRuntimeProvider>,
    global: ScopeRef,
}

impl EcalRuntime {
    /// Create a new runtime from a configuration.
    pub fn new(config: EcalConfig, logger: Arc<dyn EcalLogger>) -> EcalRuntime {
        EcalRuntime::with_provider(EcalRuntimeProvider::from_config(&config, logger))
    }

    pub fn with_provider(provider: Arc<EcalRuntimeProvider>) -> EcalRuntime {
        let global = Scope::new(GLOBAL_SCOPE);

        if let Some(ref debugger) = provider.debugger {
            debugger.set_global_scope(global.clone());
        }

        EcalRuntime { provider, global }
    }

    pub fn provider(&self) -> &Arc<EcalRuntimeProvider> {
        &self.provider
    }

    pub fn global_scope(&self) -> &ScopeRef {
        &self.global
    }

    /// Parse, validate and evaluate source code in the global scope.
    pub fn eval_source(&self, source_name: &str, input: &str) -> Result<Value, EcalRuntimeError> {
        let runtime = parser::parse_with_runtime(source_name, input, &self.provider)?;
        runtime.validate().map_err(map_eval_error)?;

        let mut is = InstanceState::new(self.provider.new_thread_id());
        runtime.eval(&self.global, &mut is).map_err(map_eval_error)
    }

    /// Drain in-flight event cascades, wake suspended debugger threads and
    /// stop the processor.
    pub fn stop(&self) {
        if let Some(ref debugger) = self.provider.debugger {
            debugger.release_all();
        }

        self.provider.processor.stop();
    }
}

fn map_eval_error(err: EcalError) -> EcalRuntimeError {
    match err {
        EcalError::Runtime(e) => EcalRuntimeError::Eval(e),
        sentinel => EcalRuntimeError::Control(sentinel.to_string()),
    }
}
