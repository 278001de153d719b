//! Core interface types between the interpreter, built-in functions and
//! host extensions.

use std::sync::Arc;

use crate::ast::AstNode;
use crate::evaluator::errors::EvalResult;
use crate::evaluator::value::Value;
use crate::evaluator::{EcalRuntimeProvider, InstanceState};
use crate::scope::ScopeRef;

/// Call-site context handed to every function invocation.
pub struct FuncContext<'a> {
    /// Unique id of the code location of the call. Iterator functions use
    /// it to key their entries in the instance state.
    pub instance_id: &'a str,
    /// Provider of the runtime tree the call originates from.
    pub erp: &'a Arc<EcalRuntimeProvider>,
    /// AST node of the call site.
    pub node: &'a Arc<AstNode>,
}

impl<'a> FuncContext<'a> {
    /// A runtime error attributed to the call site.
    pub fn error(
        &self,
        kind: crate::evaluator::errors::ErrorKind,
        detail: impl Into<String>,
    ) -> crate::evaluator::errors::EcalError {
        self.erp.new_runtime_error(kind, detail, self.node)
    }
}

/// A callable function in ECAL.
///
/// `run` executes the function with the variable scope of the caller, the
/// instance state of the current evaluation thread and the argument values
/// passed by the calling code. Iterator style functions return
/// `EcalError::IsIterator` carrying the current value and keep their
/// position in the instance state under keys derived from the call's
/// instance id.
pub trait EcalFunction: Send + Sync {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        vs: &ScopeRef,
        is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult;

    /// Descriptive text about this function.
    fn doc_string(&self) -> String;
}
