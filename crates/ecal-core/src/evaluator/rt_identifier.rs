//! Runtime component for identifiers: variable resolution, composite
//! access chains (`.member` and `[index]`) and function invocation.

use std::sync::Arc;

use crate::ast::{node, AstNode};
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult};
use crate::evaluator::func_provider;
use crate::evaluator::rt_func::call_function;
use crate::evaluator::value::{FunctionValue, MapRef, Value};
use crate::evaluator::{
    BaseRuntime, EcalRuntimeProvider, InstanceState, NodeRuntime,
};
use crate::scope::ScopeRef;
use crate::stdlib;
use crate::util::types::FuncContext;

/// One step of a flattened access chain.
enum ChainPart {
    Member(String),
    Call(Vec<Arc<dyn NodeRuntime>>),
    Index(Arc<dyn NodeRuntime>),
}

pub struct IdentifierRuntime {
    base: BaseRuntime,
    name: String,
    parts: Vec<ChainPart>,
}

pub fn identifier_inst(erp: &Arc<EcalRuntimeProvider>, node: &Arc<AstNode>) -> Arc<dyn NodeRuntime> {
    identifier_runtime(erp, node)
}

/// Typed constructor used by the assignment runtime.
pub fn identifier_runtime(
    erp: &Arc<EcalRuntimeProvider>,
    ast: &Arc<AstNode>,
) -> Arc<IdentifierRuntime> {
    let mut parts = Vec::new();
    let mut current = ast.clone();

    loop {
        let mut next = None;

        for child in &current.children {
            match child.name {
                node::FUNCCALL => {
                    parts.push(ChainPart::Call(
                        child.children.iter().map(|a| erp.runtime(a)).collect(),
                    ));
                }
                node::COMPACCESS => {
                    parts.push(ChainPart::Index(erp.runtime(&child.children[0])));
                }
                node::IDENTIFIER => {
                    parts.push(ChainPart::Member(child.token_value().to_string()));
                    next = Some(child.clone());
                    break;
                }
                _ => {}
            }
        }

        match next {
            Some(n) => current = n,
            None => break,
        }
    }

    Arc::new(IdentifierRuntime {
        base: BaseRuntime::new(erp, ast),
        name: ast.token_value().to_string(),
        parts,
    })
}

impl IdentifierRuntime {
    /// True if this identifier is a plain name without an access chain.
    pub fn is_simple(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn error(&self, kind: ErrorKind, detail: impl Into<String>) -> EcalError {
        self.base.error(kind, detail)
    }

    /// Invoke a function value with already evaluated arguments.
    fn invoke(
        &self,
        func: &FunctionValue,
        this: Option<MapRef>,
        args: Vec<Value>,
        vs: &ScopeRef,
        is: &mut InstanceState,
        part_idx: usize,
    ) -> EvalResult {
        let instance_id = format!("{}:{}", self.base.instance_id, part_idx);
        let ctx = FuncContext {
            instance_id: &instance_id,
            erp: &self.base.erp,
            node: &self.base.node,
        };

        match func {
            FunctionValue::Host(host) => host.run(&ctx, vs, is, args),
            FunctionValue::Closure(closure) => {
                call_function(&ctx, closure, this, args, is)
            }
        }
    }

    fn eval_args(
        &self,
        arg_runtimes: &[Arc<dyn NodeRuntime>],
        vs: &ScopeRef,
        is: &mut InstanceState,
    ) -> Result<Vec<Value>, EcalError> {
        let mut args = Vec::with_capacity(arg_runtimes.len());
        for arg in arg_runtimes {
            args.push(arg.eval(vs, is)?);
        }
        Ok(args)
    }

    /// Resolve the chain head: scope binding, stdlib constant or function,
    /// or a built-in function. Unknown plain identifiers resolve to null.
    fn resolve_head(
        &self,
        vs: &ScopeRef,
        is: &mut InstanceState,
    ) -> Result<(Value, usize), EcalError> {
        if vs.is_defined(&self.name) {
            return Ok((vs.get(&self.name).unwrap_or(Value::Null), 0));
        }

        // Qualified stdlib access, e.g. math.pi or math.sqrt(x)
        if let Some(ChainPart::Member(ref member)) = self.parts.first() {
            let qualified = format!("{}.{}", self.name, member);

            if let Some(ChainPart::Call(ref arg_runtimes)) = self.parts.get(1) {
                if let Some(func) = stdlib::get_stdlib_func(&qualified) {
                    let args = self.eval_args(arg_runtimes, vs, is)?;
                    let value =
                        self.invoke(&FunctionValue::Host(func), None, args, vs, is, 1)?;
                    return Ok((value, 2));
                }
            }

            if let Some(value) = stdlib::get_stdlib_const(&qualified) {
                return Ok((value, 1));
            }
        }

        if let Some(ChainPart::Call(ref arg_runtimes)) = self.parts.first() {
            if let Some(func) = func_provider::get_builtin_func(&self.name) {
                let args = self.eval_args(arg_runtimes, vs, is)?;
                let value = self.invoke(&FunctionValue::Host(func), None, args, vs, is, 0)?;
                return Ok((value, 1));
            }

            return Err(self.error(
                ErrorKind::UnknownConstruct,
                format!("Unknown function: {}", self.name),
            ));
        }

        // An unknown qualified name resolves to null as a whole, which
        // lets `doc` inspect unresolved identifiers. Calling through an
        // unknown name is still an error.
        if self.parts.iter().any(|p| matches!(p, ChainPart::Call(_))) {
            return Err(self.error(
                ErrorKind::UnknownConstruct,
                format!("Unknown function: {}", self.qualified_name()),
            ));
        }

        Ok((Value::Null, self.parts.len()))
    }

    /// The dotted name of this identifier up to the first non-member part.
    fn qualified_name(&self) -> String {
        let mut name = self.name.clone();

        for part in &self.parts {
            match part {
                ChainPart::Member(m) => {
                    name.push('.');
                    name.push_str(m);
                }
                _ => break,
            }
        }

        name
    }

    /// Evaluate the remainder of the chain after the head.
    fn eval_chain(
        &self,
        mut current: Value,
        start: usize,
        vs: &ScopeRef,
        is: &mut InstanceState,
    ) -> EvalResult {
        // The map a called method was selected from, for `this` binding.
        let mut container: Option<MapRef> = None;

        for (idx, part) in self.parts.iter().enumerate().skip(start) {
            match part {
                ChainPart::Member(member) => {
                    let m = match current {
                        Value::Map(ref m) => m.clone(),
                        ref v => {
                            return Err(self.error(
                                ErrorKind::NotAMap,
                                format!("Cannot access member {} of {}", member, v),
                            ))
                        }
                    };

                    let next = m.read().get(member).cloned().unwrap_or(Value::Null);
                    container = Some(m);
                    current = next;
                }
                ChainPart::Index(index_runtime) => {
                    let index = index_runtime.eval(vs, is)?;

                    match current.clone() {
                        Value::List(l) => {
                            let items = l.read();
                            let i = list_index(&index, items.len())
                                .map_err(|e| self.error(e.0, e.1))?;
                            let next = items[i].clone();
                            drop(items);
                            container = None;
                            current = next;
                        }
                        Value::Map(m) => {
                            let next = m
                                .read()
                                .get(&index.key_string())
                                .cloned()
                                .unwrap_or(Value::Null);
                            container = Some(m);
                            current = next;
                        }
                        v => {
                            return Err(self.error(
                                ErrorKind::NotAListOrMap,
                                format!("Cannot index {}", v),
                            ))
                        }
                    }
                }
                ChainPart::Call(arg_runtimes) => {
                    let func = match current {
                        Value::Func(ref f) => f.clone(),
                        ref v => {
                            return Err(self.error(
                                ErrorKind::InvalidConstruct,
                                format!("Value is not a function: {}", v),
                            ))
                        }
                    };

                    let args = self.eval_args(arg_runtimes, vs, is)?;
                    current = self.invoke(&func, container.take(), args, vs, is, idx)?;
                }
            }
        }

        Ok(current)
    }

    /// Write a value through this identifier, walking the access chain.
    pub fn set(&self, vs: &ScopeRef, is: &mut InstanceState, value: Value) -> Result<(), EcalError> {
        if self.parts.is_empty() {
            vs.set_value(&self.name, value);
            return Ok(());
        }

        if !vs.is_defined(&self.name) {
            return Err(self.error(
                ErrorKind::VarAccess,
                format!("Variable {} is not defined", self.name),
            ));
        }

        self.set_through_chain(vs, is, value)
    }

    fn set_through_chain(
        &self,
        vs: &ScopeRef,
        is: &mut InstanceState,
        value: Value,
    ) -> Result<(), EcalError> {
        let mut current = vs.get(&self.name).unwrap_or(Value::Null);

        for (idx, part) in self.parts.iter().enumerate() {
            let last = idx == self.parts.len() - 1;

            match part {
                ChainPart::Member(member) => {
                    let m = match current {
                        Value::Map(ref m) => m.clone(),
                        ref v => {
                            return Err(self.error(
                                ErrorKind::NotAMap,
                                format!("Cannot access member {} of {}", member, v),
                            ))
                        }
                    };

                    if last {
                        m.write().insert(member.clone(), value);
                        return Ok(());
                    }

                    let next = m.read().get(member).cloned().unwrap_or(Value::Null);
                    current = next;
                }
                ChainPart::Index(index_runtime) => {
                    let index = index_runtime.eval(vs, is)?;

                    match current {
                        Value::List(ref l) => {
                            let list = l.clone();
                            let len = list.read().len();
                            let i = list_index(&index, len)
                                .map_err(|e| self.error(e.0, e.1))?;

                            if last {
                                list.write()[i] = value;
                                return Ok(());
                            }

                            let next = list.read()[i].clone();
                            current = next;
                        }
                        Value::Map(ref m) => {
                            let map = m.clone();
                            let key = index.key_string();

                            if last {
                                map.write().insert(key, value);
                                return Ok(());
                            }

                            let next = map.read().get(&key).cloned().unwrap_or(Value::Null);
                            current = next;
                        }
                        ref v => {
                            return Err(self.error(
                                ErrorKind::NotAListOrMap,
                                format!("Cannot index {}", v),
                            ))
                        }
                    }
                }
                ChainPart::Call(_) => {
                    return Err(self.error(
                        ErrorKind::VarAccess,
                        "Cannot assign to a function call",
                    ))
                }
            }
        }

        Ok(())
    }
}

/// Coerce an index value for list access; negative indices count from the
/// end.
pub(crate) fn list_index(index: &Value, len: usize) -> Result<usize, (ErrorKind, String)> {
    let n = index
        .as_number()
        .ok_or_else(|| (ErrorKind::NotANumber, format!("Index is not a number: {}", index)))?;

    let mut i = n.trunc() as i64;
    if i < 0 {
        i += len as i64;
    }

    if i < 0 || i as usize >= len {
        return Err((
            ErrorKind::InvalidState,
            format!("Index out of bounds: {}", index),
        ));
    }

    Ok(i as usize)
}

impl NodeRuntime for IdentifierRuntime {
    fn node(&self) -> &Arc<AstNode> {
        &self.base.node
    }

    fn validate(&self) -> Result<(), EcalError> {
        for part in &self.parts {
            match part {
                ChainPart::Call(args) => {
                    for arg in args {
                        arg.validate()?;
                    }
                }
                ChainPart::Index(index) => index.validate()?,
                ChainPart::Member(_) => {}
            }
        }

        self.base.mark_validated();
        Ok(())
    }

    fn eval(&self, vs: &ScopeRef, is: &mut InstanceState) -> EvalResult {
        self.base.ensure_validated()?;

        let (current, start) = self.resolve_head(vs, is)?;
        self.eval_chain(current, start, vs, is)
    }
}
