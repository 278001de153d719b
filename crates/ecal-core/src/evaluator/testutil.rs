//! Shared helpers for evaluator tests.

use std::sync::Arc;

use crate::engine::Processor;
use crate::evaluator::errors::EvalResult;
use crate::evaluator::{EcalRuntimeProvider, InstanceState};
use crate::parser;
use crate::scope::{Scope, ScopeRef, GLOBAL_SCOPE};
use crate::util::import::MemoryImportLocator;
use crate::util::logging::MemoryLogger;

pub(crate) struct TestRig {
    pub erp: Arc<EcalRuntimeProvider>,
    pub logger: Arc<MemoryLogger>,
    pub locator: Arc<MemoryImportLocator>,
}

pub(crate) fn test_rig() -> TestRig {
    let logger = Arc::new(MemoryLogger::new(100));
    let locator = Arc::new(MemoryImportLocator::new());

    let erp = EcalRuntimeProvider::with_parts(
        "ECALTestRuntime",
        Some(locator.clone()),
        logger.clone(),
        None,
        Processor::new(1),
    );

    TestRig {
        erp,
        logger,
        locator,
    }
}

/// Parse, validate and evaluate test input in the given scope.
pub(crate) fn eval_in(rig: &TestRig, input: &str, vs: &ScopeRef) -> EvalResult {
    let runtime = parser::parse_with_runtime("ECALEvalTest", input, &rig.erp)
        .unwrap_or_else(|e| panic!("parse error: {}", e));

    runtime.validate()?;

    let mut is = InstanceState::new(rig.erp.new_thread_id());
    runtime.eval(vs, &mut is)
}

/// Parse, validate and evaluate test input in a fresh global scope.
pub(crate) fn eval(rig: &TestRig, input: &str) -> EvalResult {
    eval_in(rig, input, &Scope::new(GLOBAL_SCOPE))
}
