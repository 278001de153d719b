//! Mapping of AST node labels to runtime component constructors.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ast::{node, AstNode};
use crate::evaluator::errors::{ErrorKind, EvalResult};
use crate::evaluator::{
    rt_assign, rt_func, rt_general, rt_identifier, rt_import, rt_sink, rt_statements, rt_value,
    BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime,
};
use crate::scope::ScopeRef;

pub type RuntimeInst = fn(&Arc<EcalRuntimeProvider>, &Arc<AstNode>) -> Arc<dyn NodeRuntime>;

static PROVIDER_MAP: Lazy<HashMap<&'static str, RuntimeInst>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, RuntimeInst> = HashMap::new();

    m.insert(node::EOF, invalid_inst as RuntimeInst);

    m.insert(node::STRING, rt_value::string_inst); // String constant
    m.insert(node::NUMBER, rt_value::number_inst); // Number constant
    m.insert(node::IDENTIFIER, rt_identifier::identifier_inst);

    // Constructed tokens
    m.insert(node::STATEMENTS, rt_statements::statements_inst);
    m.insert(node::FUNCCALL, void_inst); // Handled by the identifier runtime
    m.insert(node::COMPACCESS, void_inst); // Handled by the identifier runtime
    m.insert(node::LIST, rt_value::list_inst);
    m.insert(node::MAP, rt_value::map_inst);
    m.insert(node::PARAMS, void_inst); // Handled by the function runtime
    m.insert(node::GUARD, rt_statements::guard_inst);

    // Condition operators
    m.insert(node::GEQ, rt_general::greaterequal_inst);
    m.insert(node::LEQ, rt_general::lessequal_inst);
    m.insert(node::NEQ, rt_general::notequal_inst);
    m.insert(node::EQ, rt_general::equal_inst);
    m.insert(node::GT, rt_general::greater_inst);
    m.insert(node::LT, rt_general::less_inst);

    // Separators
    m.insert(node::KVP, void_inst); // Handled by the map runtime
    m.insert(node::PRESET, void_inst); // Handled by the function runtime

    // Arithmetic operators
    m.insert(node::PLUS, rt_general::plus_inst);
    m.insert(node::MINUS, rt_general::minus_inst);
    m.insert(node::TIMES, rt_general::times_inst);
    m.insert(node::DIV, rt_general::div_inst);
    m.insert(node::MODINT, rt_general::modint_inst);
    m.insert(node::DIVINT, rt_general::divint_inst);

    // Assignment statement
    m.insert(node::ASSIGN, rt_assign::assignment_inst);

    // Import statement
    m.insert(node::IMPORT, rt_import::import_inst);

    // Sink definition
    m.insert(node::SINK, rt_sink::sink_inst);
    m.insert(node::KINDMATCH, void_inst);
    m.insert(node::SCOPEMATCH, void_inst);
    m.insert(node::STATEMATCH, void_inst);
    m.insert(node::PRIORITY, void_inst);
    m.insert(node::SUPPRESSES, void_inst);

    // Function definition
    m.insert(node::FUNC, rt_func::func_inst);
    m.insert(node::RETURN, rt_func::return_inst);

    // Boolean operators
    m.insert(node::OR, rt_general::or_inst);
    m.insert(node::AND, rt_general::and_inst);
    m.insert(node::NOT, rt_general::not_inst);

    // Condition operators
    m.insert(node::LIKE, rt_general::like_inst);
    m.insert(node::IN, rt_general::in_inst);
    m.insert(node::HASPREFIX, rt_general::beginswith_inst);
    m.insert(node::HASSUFFIX, rt_general::endswith_inst);
    m.insert(node::NOTIN, rt_general::notin_inst);

    // Constant terminals
    m.insert(node::FALSE, rt_value::false_inst);
    m.insert(node::TRUE, rt_value::true_inst);
    m.insert(node::NULL, rt_value::null_inst);

    // Conditional statements
    m.insert(node::IF, rt_statements::if_inst);

    // Loop statements
    m.insert(node::LOOP, rt_statements::loop_inst);
    m.insert(node::BREAK, rt_statements::break_inst);
    m.insert(node::CONTINUE, rt_statements::continue_inst);

    m
});

/// Runtime component for a given AST node. Unknown labels produce an
/// invalid component which fails both validation and evaluation.
pub fn runtime_for(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    match PROVIDER_MAP.get(node.name) {
        Some(inst) => inst(erp, node),
        None => invalid_inst(erp, node),
    }
}

/// Runtime component for constructs which cannot be evaluated.
struct InvalidRuntime {
    base: BaseRuntime,
}

pub fn invalid_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(InvalidRuntime {
        base: BaseRuntime::new(erp, node),
    })
}

impl NodeRuntime for InvalidRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), crate::evaluator::errors::EcalError> {
        Err(self.base.error(
            ErrorKind::UnknownConstruct,
            format!("Unknown node: {}", self.base.node.name),
        ))
    }

    fn eval(&self, _vs: &ScopeRef, _is: &mut InstanceState) -> EvalResult {
        Err(self.base.error(
            ErrorKind::UnknownConstruct,
            format!("Unknown node: {}", self.base.node.name),
        ))
    }
}

/// Runtime component for structural nodes which are consumed by their
/// parent and never evaluated directly.
struct VoidRuntime {
    base: BaseRuntime,
}

pub fn void_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(VoidRuntime {
        base: BaseRuntime::new(erp, node),
    })
}

impl NodeRuntime for VoidRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), crate::evaluator::errors::EcalError> {
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, _vs: &ScopeRef, _is: &mut InstanceState) -> EvalResult {
        Err(self.base.error(
            ErrorKind::InvalidConstruct,
            format!("Cannot evaluate construct directly: {}", self.base.node.name),
        ))
    }
}
