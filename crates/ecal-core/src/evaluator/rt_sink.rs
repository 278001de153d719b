//! Runtime component for sink declarations.
//!
//! Evaluating a sink statement registers a rule with the event processor.
//! The rule's action evaluates the sink body on its own logical thread in
//! a child scope of the declaring scope, with `event` bound to a map of
//! the triggering event.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{node, AstNode};
use crate::engine::{Event, Monitor, Rule, RuleAction};
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult, RuntimeError};
use crate::evaluator::value::Value;
use crate::evaluator::{BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime};
use crate::scope::ScopeRef;

struct SinkRuntime {
    base: BaseRuntime,
    name: String,
    kind_match: Option<Arc<dyn NodeRuntime>>,
    scope_match: Option<Arc<dyn NodeRuntime>>,
    state_match: Option<Arc<dyn NodeRuntime>>,
    priority: Option<Arc<dyn NodeRuntime>>,
    suppresses: Option<Arc<dyn NodeRuntime>>,
    body: Arc<dyn NodeRuntime>,
}

pub fn sink_inst(erp: &Arc<EcalRuntimeProvider>, ast: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    let clause = |label: &str| {
        ast.children
            .iter()
            .find(|c| c.name == label)
            .map(|c| erp.runtime(&c.children[0]))
    };

    Arc::new(SinkRuntime {
        base: BaseRuntime::new(erp, ast),
        name: ast.children[0].token_value().to_string(),
        kind_match: clause(node::KINDMATCH),
        scope_match: clause(node::SCOPEMATCH),
        state_match: clause(node::STATEMATCH),
        priority: clause(node::PRIORITY),
        suppresses: clause(node::SUPPRESSES),
        body: erp.runtime(ast.children.last().expect("sink without a body")),
    })
}

impl SinkRuntime {
    fn eval_string_list(
        &self,
        runtime: &Option<Arc<dyn NodeRuntime>>,
        vs: &ScopeRef,
        is: &mut InstanceState,
    ) -> Result<Vec<String>, EcalError> {
        let Some(runtime) = runtime else {
            return Ok(Vec::new());
        };

        match runtime.eval(vs, is)? {
            Value::List(l) => Ok(l.read().iter().map(|v| v.to_string()).collect()),
            v => Err(self.base.error(ErrorKind::NotAList, v.to_string())),
        }
    }
}

impl NodeRuntime for SinkRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        if self.kind_match.is_none() {
            return Err(self.base.error(
                ErrorKind::InvalidConstruct,
                "Sink must have a kindmatch clause",
            ));
        }

        for clause in [
            &self.kind_match,
            &self.scope_match,
            &self.state_match,
            &self.priority,
            &self.suppresses,
        ]
        .into_iter()
        .flatten()
        {
            clause.validate()?;
        }

        self.body.validate()?;
        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let kind_match = self.eval_string_list(&self.kind_match, vs, is)?;
        let scope_match = self.eval_string_list(&self.scope_match, vs, is)?;
        let suppresses = self.eval_string_list(&self.suppresses, vs, is)?;

        let state_match = match self.state_match {
            Some(ref runtime) => match runtime.eval(vs, is)? {
                Value::Map(m) => Some(m.read().clone()),
                v => return Err(self.base.error(ErrorKind::NotAMap, v.to_string())),
            },
            None => None,
        };

        let priority = match self.priority {
            Some(ref runtime) => {
                let v = runtime.eval(vs, is)?;
                v.as_number()
                    .ok_or_else(|| self.base.error(ErrorKind::NotANumber, v.to_string()))?
                    .trunc() as i64
            }
            None => 0,
        };

        let action = Arc::new(SinkAction {
            erp: self.base.erp.clone(),
            node: self.base.node.clone(),
            name: self.name.clone(),
            body: self.body.clone(),
            decl_scope: vs.clone(),
        });

        let rule = Rule::new(
            self.name.clone(),
            self.base.node.doc.clone().unwrap_or_default(),
            kind_match,
            scope_match,
            state_match,
            priority,
            suppresses,
            action,
        )
        .map_err(|e| self.base.error(ErrorKind::InvalidState, e.to_string()))?;

        self.base
            .erp
            .processor
            .add_rule(rule)
            .map_err(|e| self.base.error(ErrorKind::InvalidState, e.to_string()))?;

        Ok(Value::Null)
    }
}

/// Executes a sink body for one triggering event.
struct SinkAction {
    erp: Arc<EcalRuntimeProvider>,
    node: Arc<AstNode>,
    name: String,
    body: Arc<dyn NodeRuntime>,
    decl_scope: ScopeRef,
}

impl RuleAction for SinkAction {
    fn fire(&self, event: &Event, monitor: &Monitor) -> Result<(), RuntimeError> {
        let tid = self.erp.new_thread_id();

        let vs = self.decl_scope.new_child(format!("sink: {}", self.name));

        let mut event_map = BTreeMap::new();
        event_map.insert("name".to_string(), Value::str(event.name()));
        event_map.insert("kind".to_string(), Value::str(event.kind().join(".")));
        event_map.insert("state".to_string(), Value::Map(event.state().clone()));
        vs.set_local("event", Value::map(event_map));

        let mut is = InstanceState::new(tid);
        is.monitor = Some(monitor.clone());

        match self.body.eval(&vs, &mut is) {
            Ok(_) => Ok(()),
            Err(EcalError::Runtime(e)) => Err(*e),
            Err(sentinel) => Err(RuntimeError::new(
                self.erp.name.clone(),
                ErrorKind::InvalidState,
                format!("Unexpected control flow in sink body: {}", sentinel),
                self.node.clone(),
            )),
        }
    }
}
