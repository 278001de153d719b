//! Runtime components for statement sequences, conditionals and loops.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::ast::{node, AstNode};
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::value::Value;
use crate::evaluator::{
    build_children, validate_all, BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime,
};
use crate::scope::{name_from_ast_node, ScopeRef};

// Statements
// ==========

struct StatementsRuntime {
    base: BaseRuntime,
    stmts: Vec<Arc<dyn NodeRuntime>>,
}

pub fn statements_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(StatementsRuntime {
        base: BaseRuntime::new(erp, ast),
        stmts: build_children(erp, ast),
    })
}

impl NodeRuntime for StatementsRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        validate_all(&self.stmts)?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let mut last = Value::Null;

        for stmt in &self.stmts {
            if let Some(ref debugger) = self.base.erp.debugger {
                debugger.visit_state(stmt.node(), vs, is.tid, &self.base.erp.name);
            }

            last = stmt.eval(vs, is)?;
        }

        Ok(last)
    }
}

// Guard
// =====

struct GuardRuntime {
    base: BaseRuntime,
    condition: Arc<dyn NodeRuntime>,
}

pub fn guard_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(GuardRuntime {
        base: BaseRuntime::new(erp, ast),
        condition: erp.runtime(&ast.children[0]),
    })
}

impl NodeRuntime for GuardRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        self.condition.validate()?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        // Guards always return a boolean.
        let value = self.condition.eval(vs, is)?;
        Ok(Value::Bool(value.is_true()))
    }
}

// Condition statement
// ===================

struct IfRuntime {
    base: BaseRuntime,
    branches: Vec<(Arc<dyn NodeRuntime>, Arc<dyn NodeRuntime>)>,
}

pub fn if_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    let branches = ast
        .children
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| (erp.runtime(&c[0]), erp.runtime(&c[1])))
        .collect();

    Arc::new(IfRuntime {
        base: BaseRuntime::new(erp, ast),
        branches,
    })
}

impl NodeRuntime for IfRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        for (guard, body) in &self.branches {
            guard.validate()?;
            body.validate()?;
        }
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let vs = vs.new_child(name_from_ast_node(&self.base.node));

        for (guard, body) in &self.branches {
            if guard.eval(&vs, is)?.is_true() {
                return body.eval(&vs, is);
            }
        }

        Ok(Value::Null)
    }
}

// Loop statement
// ==============

struct LoopRuntime {
    base: BaseRuntime,
    header: Arc<dyn NodeRuntime>,
    iterable: Option<Arc<dyn NodeRuntime>>,
    body: Arc<dyn NodeRuntime>,
    left_in_vars: OnceCell<Vec<String>>,
}

pub fn loop_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    let header_node = &ast.children[0];

    let (header, iterable) = if header_node.name == node::IN {
        (
            erp.runtime(&header_node.children[0]),
            Some(erp.runtime(&header_node.children[1])),
        )
    } else {
        (erp.runtime(header_node), None)
    };

    Arc::new(LoopRuntime {
        base: BaseRuntime::new(erp, ast),
        header,
        iterable,
        body: erp.runtime(&ast.children[1]),
        left_in_vars: OnceCell::new(),
    })
}

impl LoopRuntime {
    fn header_node(&self) -> &Arc<AstNode> {
        &self.base.node.children[0]
    }

    /// Cache the loop variable names of a `for <pat> in <iterable>` form.
    fn validate_in_vars(&self) -> Result<(), EcalError> {
        let in_var = &self.header_node().children[0];
        let mut vars = Vec::new();

        if in_var.name == node::IDENTIFIER {
            if !in_var.children.is_empty() {
                return Err(self.base.error(
                    ErrorKind::InvalidConstruct,
                    "Must have a simple variable on the left side of the In expression",
                ));
            }

            vars.push(in_var.token_value().to_string());
        } else if in_var.name == node::LIST {
            for child in &in_var.children {
                if child.name != node::IDENTIFIER || !child.children.is_empty() {
                    return Err(self.base.error(
                        ErrorKind::InvalidConstruct,
                        "Must have a list of simple variables on the left side of the In expression",
                    ));
                }

                vars.push(child.token_value().to_string());
            }
        } else {
            return Err(self.base.error(
                ErrorKind::InvalidConstruct,
                "Must have a variable on the left side of the In expression",
            ));
        }

        let _ = self.left_in_vars.set(vars);
        Ok(())
    }

    /// Bind one iteration value to the cached loop variables.
    fn bind_vars(&self, vs: &ScopeRef, value: Value) -> Result<(), EcalError> {
        let vars = self.left_in_vars.get().expect("validated loop");

        if vars.len() == 1 {
            vs.set_value(&vars[0], value);
            return Ok(());
        }

        match value {
            Value::List(ref l) => {
                let items = l.read();

                if vars.len() != items.len() {
                    return Err(self.base.error(
                        ErrorKind::InvalidState,
                        format!(
                            "Assigned number of variables is different to number of values ({} variables vs {} values)",
                            vars.len(),
                            items.len()
                        ),
                    ));
                }

                for (name, item) in vars.iter().zip(items.iter()) {
                    vs.set_value(name, item.clone());
                }

                Ok(())
            }
            v => Err(self.base.error(
                ErrorKind::InvalidState,
                format!("Result for loop variable is not a list (value is {})", v),
            )),
        }
    }

    fn eval_guard_loop(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        loop {
            if !self.header.eval(vs, is)?.is_true() {
                return Ok(Value::Null);
            }

            match self.body.eval(vs, is) {
                Ok(_) => {}
                Err(EcalError::ContinueIteration) => {}
                Err(EcalError::EndOfIteration) => return Ok(Value::Null),
                Err(e) => return Err(e),
            }
        }
    }

    fn eval_in_loop(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        let iterable = self.iterable.as_ref().expect("loop with in header");

        // The first evaluation decides the iteration source: an iterator
        // function, a materialized collection or a single value.
        let mut from_iterator = false;

        let mut queue: Vec<Value> = match iterable.eval(vs, is) {
            Err(EcalError::IsIterator(first)) => {
                from_iterator = true;
                vec![first]
            }
            Err(EcalError::EndOfIteration) => return Ok(Value::Null),
            Err(e) => return Err(e),
            Ok(Value::List(l)) => l.read().clone(),
            Ok(Value::Map(m)) => m
                .read()
                .iter()
                .map(|(k, v)| Value::list(vec![Value::Str(k.clone()), v.clone()]))
                .collect(),
            Ok(single) => vec![single],
        };

        if !from_iterator {
            queue.reverse(); // consumed by pop from the back
        }

        loop {
            let value = match queue.pop() {
                Some(v) => v,
                None => return Ok(Value::Null),
            };

            self.bind_vars(vs, value)?;

            match self.body.eval(vs, is) {
                Ok(_) => {}
                Err(EcalError::ContinueIteration) => {}
                Err(EcalError::EndOfIteration) => return Ok(Value::Null),
                Err(e) => return Err(e),
            }

            if from_iterator {
                match iterable.eval(vs, is) {
                    Err(EcalError::IsIterator(next)) => queue.push(next),
                    Err(EcalError::EndOfIteration) | Ok(_) => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

impl NodeRuntime for LoopRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        if self.iterable.is_some() {
            self.validate_in_vars()?;
            self.iterable.as_ref().unwrap().validate()?;
        } else {
            self.header.validate()?;
        }

        self.body.validate()?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        // Each loop owns one child scope for all iterations and a fresh
        // instance state.
        let vs = vs.new_child(name_from_ast_node(&self.base.node));
        let mut is = is.child();

        if self.iterable.is_some() {
            self.eval_in_loop(&vs, &mut is)
        } else {
            self.eval_guard_loop(&vs, &mut is)
        }
    }
}

// Break statement
// ===============

struct BreakRuntime {
    base: BaseRuntime,
}

pub fn break_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(BreakRuntime {
        base: BaseRuntime::new(erp, ast),
    })
}

impl NodeRuntime for BreakRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, _vs: &ScopeRef, _is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;
        Err(EcalError::EndOfIteration)
    }
}

// Continue statement
// ==================

struct ContinueRuntime {
    base: BaseRuntime,
}

pub fn continue_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    Arc::new(ContinueRuntime {
        base: BaseRuntime::new(erp, ast),
    })
}

impl NodeRuntime for ContinueRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, _vs: &ScopeRef, _is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;
        Err(EcalError::ContinueIteration)
    }
}
