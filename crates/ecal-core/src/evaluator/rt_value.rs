//! Runtime components for constant and composite values.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::ast::AstNode;
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::value::Value;
use crate::evaluator::{
    build_children, validate_all, BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime,
};
use crate::parser;
use crate::scope::{name_from_ast_node, ScopeRef};

// Number constant
// ===============

struct NumberValueRuntime {
    base: BaseRuntime,
    num_value: OnceCell<f64>,
}

pub fn number_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(NumberValueRuntime {
        base: BaseRuntime::new(erp, node),
        num_value: OnceCell::new(),
    })
}

impl NodeRuntime for NumberValueRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        let text = self.base.node.token_value();

        let parsed: f64 = text.parse().map_err(|_| {
            self.base
                .error(ErrorKind::NotANumber, format!("Invalid number: {}", text))
        })?;

        let _ = self.num_value.set(parsed);
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, _vs: &ScopeRef, _is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;
        Ok(Value::Number(*self.num_value.get().unwrap()))
    }
}

// String constant
// ===============

struct StringValueRuntime {
    base: BaseRuntime,
}

pub fn string_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(StringValueRuntime {
        base: BaseRuntime::new(erp, node),
    })
}

impl StringValueRuntime {
    /// Content of the first `start`..`end` fragment, if any.
    fn get_infix<'a>(&self, s: &'a str, start: &str, end: &str) -> Option<&'a str> {
        let from = s.find(start)? + start.len();
        let to = s[from..].find(end)? + from;
        Some(&s[from..to])
    }
}

impl NodeRuntime for StringValueRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let token = self.base.node.token.as_ref();
        let mut ret = self.base.node.token_value().to_string();

        // String interpolation is only done if escape sequences are allowed.
        if token.is_some_and(|t| t.allow_escapes) {
            while let Some(code) = self.get_infix(&ret, "{{", "}}").map(|c| c.to_string()) {
                let replace = self.interpolate(&code, vs, is);
                ret = ret.replacen(&format!("{{{{{}}}}}", code), &replace, 1);
            }
        }

        Ok(Value::Str(ret))
    }
}

impl StringValueRuntime {
    /// Evaluate one interpolation fragment in a fresh child scope.
    /// Failures become the literal error text instead of aborting the
    /// enclosing expression.
    fn interpolate(&self, code: &str, vs: &ScopeRef, is: &mut InstanceState) -> String {
        let source = format!("String interpolation: {}", code);

        let result = parser::parse_with_runtime(&source, code, &self.base.erp)
            .map_err(|e| e.to_string())
            .and_then(|runtime| {
                runtime.validate().map_err(|e| e.to_string())?;

                let child = vs.new_child(name_from_ast_node(&self.base.node));
                let mut child_is = is.child();

                runtime
                    .eval(&child, &mut child_is)
                    .map_err(|e| e.to_string())
            });

        match result {
            Ok(v) => v.to_string(),
            Err(e) => format!("#{}", e),
        }
    }
}

// Map value
// =========

struct MapValueRuntime {
    base: BaseRuntime,
    entries: Vec<(Arc<dyn NodeRuntime>, Arc<dyn NodeRuntime>)>,
}

pub fn map_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    let entries = node
        .children
        .iter()
        .map(|kvp| (erp.runtime(&kvp.children[0]), erp.runtime(&kvp.children[1])))
        .collect();

    Arc::new(MapValueRuntime {
        base: BaseRuntime::new(erp, node),
        entries,
    })
}

impl NodeRuntime for MapValueRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        for (key, value) in &self.entries {
            key.validate()?;
            value.validate()?;
        }
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let mut m = BTreeMap::new();

        for (key, value) in &self.entries {
            let key = key.eval(vs, is)?;
            let value = value.eval(vs, is)?;
            m.insert(key.key_string(), value);
        }

        Ok(Value::map(m))
    }
}

// List value
// ==========

struct ListValueRuntime {
    base: BaseRuntime,
    items: Vec<Arc<dyn NodeRuntime>>,
}

pub fn list_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(ListValueRuntime {
        base: BaseRuntime::new(erp, node),
        items: build_children(erp, node),
    })
}

impl NodeRuntime for ListValueRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        validate_all(&self.items)?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            items.push(item.eval(vs, is)?);
        }

        Ok(Value::list(items))
    }
}

// Constant terminals
// ==================

struct ConstValueRuntime {
    base: BaseRuntime,
    value: Value,
}

fn const_inst(
    erp: &Arc<EcalRuntimeProvider>,
    node: &Arc<AstNode>,
    value: Value,
) -> Arc<dyn NodeRuntime> {
    Arc::new(ConstValueRuntime {
        base: BaseRuntime::new(erp, node),
        value,
    })
}

pub fn true_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    const_inst(erp, node, Value::Bool(true))
}

pub fn false_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    const_inst(erp, node, Value::Bool(false))
}

pub fn null_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    const_inst(erp, node, Value::Null)
}

impl NodeRuntime for ConstValueRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, _vs: &ScopeRef, _is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;
        Ok(self.value.clone())
    }
}
