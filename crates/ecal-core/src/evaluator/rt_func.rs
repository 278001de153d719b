//! Function definition, invocation and `return`.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::ast::{node, AstNode};
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::value::{FunctionValue, MapRef, Value};
use crate::evaluator::{BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime};
use crate::scope::{name_from_ast_node, ScopeRef};
use crate::util::types::FuncContext;

pub struct ParamDef {
    pub name: String,
    pub default: Option<Arc<dyn NodeRuntime>>,
}

/// The declaration parts of a function shared by all its closures.
pub struct FuncDef {
    pub node: Arc<AstNode>,
    pub body: Arc<dyn NodeRuntime>,
    params: OnceCell<Vec<ParamDef>>,
}

impl FuncDef {
    pub fn params(&self) -> &[ParamDef] {
        self.params.get().map(|p| p.as_slice()).unwrap_or(&[])
    }
}

/// An in-language function value: the declaration, the captured lexical
/// scope and the optional method receiver and base-class init chain set
/// up by `new`.
pub struct Closure {
    pub name: Option<String>,
    pub decl: Arc<FuncDef>,
    pub captured: ScopeRef,
    pub this: Option<MapRef>,
    pub super_init: Vec<Value>,
    pub doc: Option<String>,
}

impl Closure {
    /// A copy of this closure bound to a method receiver.
    pub fn rebind(&self, this: MapRef, super_init: Vec<Value>) -> Closure {
        Closure {
            name: self.name.clone(),
            decl: self.decl.clone(),
            captured: self.captured.clone(),
            this: Some(this),
            super_init,
            doc: self.doc.clone(),
        }
    }
}

// Function definition
// ===================

struct FuncRuntime {
    base: BaseRuntime,
    name: Option<String>,
    def: Arc<FuncDef>,
}

pub fn func_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    let name = match ast.children.first() {
        Some(c) if c.name == node::IDENTIFIER => Some(c.token_value().to_string()),
        _ => None,
    };

    let body_node = ast.children.last().expect("function without a body");

    Arc::new(FuncRuntime {
        base: BaseRuntime::new(erp, ast),
        name,
        def: Arc::new(FuncDef {
            node: ast.clone(),
            body: erp.runtime(body_node),
            params: OnceCell::new(),
        }),
    })
}

impl FuncRuntime {
    fn params_node(&self) -> Option<&Arc<AstNode>> {
        self.base
            .node
            .children
            .iter()
            .find(|c| c.name == node::PARAMS)
    }
}

impl NodeRuntime for FuncRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        let mut params = Vec::new();

        if let Some(params_node) = self.params_node() {
            for param in &params_node.children {
                match param.name {
                    node::IDENTIFIER => params.push(ParamDef {
                        name: param.token_value().to_string(),
                        default: None,
                    }),
                    node::PRESET => {
                        let default = self.base.erp.runtime(&param.children[1]);
                        default.validate()?;

                        params.push(ParamDef {
                            name: param.children[0].token_value().to_string(),
                            default: Some(default),
                        });
                    }
                    _ => {
                        return Err(self.base.error(
                            ErrorKind::InvalidConstruct,
                            "Invalid function parameter",
                        ))
                    }
                }
            }
        }

        let _ = self.def.params.set(params);
        self.def.body.validate()?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, _is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let closure = Closure {
            name: self.name.clone(),
            decl: self.def.clone(),
            captured: vs.clone(),
            this: None,
            super_init: Vec::new(),
            doc: self.base.node.doc.clone(),
        };

        let value = Value::Func(FunctionValue::Closure(Arc::new(closure)));

        if let Some(ref name) = self.name {
            vs.set_local(name, value.clone());
        }

        Ok(value)
    }
}

/// Invoke a closure: fresh instance state, a child scope named after the
/// call site, positional parameter binding with optional defaults. The
/// `Return` sentinel is consumed here; real errors get the call site
/// appended to their trace.
pub fn call_function(
    ctx: &FuncContext<'_>,
    closure: &Closure,
    this: Option<MapRef>,
    args: Vec<Value>,
    is: &mut InstanceState,
) -> EvalResult {
    let fnscope = closure.captured.new_child(name_from_ast_node(ctx.node));
    let mut fnis = is.child();

    for (i, param) in closure.decl.params().iter().enumerate() {
        let value = match args.get(i) {
            Some(v) => v.clone(),
            None => match param.default {
                Some(ref default) => default.eval(&fnscope, &mut fnis)?,
                None => Value::Null,
            },
        };

        fnscope.set_local(&param.name, value);
    }

    if let Some(this) = this.or_else(|| closure.this.clone()) {
        fnscope.set_local("this", Value::Map(this));
    }

    if !closure.super_init.is_empty() {
        fnscope.set_local("super", Value::list(closure.super_init.clone()));
    }

    if let Some(ref debugger) = ctx.erp.debugger {
        debugger.visit_step_in_state(ctx.node, &fnscope, fnis.tid);
    }

    let result = closure.decl.body.eval(&fnscope, &mut fnis);

    if let Some(ref debugger) = ctx.erp.debugger {
        debugger.visit_step_out_state(ctx.node, &fnscope, fnis.tid);
    }

    match result {
        Ok(_) => Ok(Value::Null),
        Err(EcalError::Return(value)) => Ok(value),
        Err(EcalError::Runtime(mut err)) => {
            err.add_trace(ctx.node.clone());
            Err(EcalError::Runtime(err))
        }
        Err(other) => Err(other),
    }
}

// Return statement
// ================

struct ReturnRuntime {
    base: BaseRuntime,
    value: Option<Arc<dyn NodeRuntime>>,
}

pub fn return_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(ReturnRuntime {
        base: BaseRuntime::new(erp, ast),
        value: ast.children.first().map(|c| erp.runtime(c)),
    })
}

impl NodeRuntime for ReturnRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        if let Some(ref value) = self.value {
            value.validate()?;
        }
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let value = match self.value {
            Some(ref v) => v.eval(vs, is)?,
            None => Value::Null,
        };

        Err(EcalError::Return(value))
    }
}
