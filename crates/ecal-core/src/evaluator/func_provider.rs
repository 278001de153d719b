//! Built-in functions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ast::node;
use crate::engine::{Event, RuleScope};
use crate::evaluator::errors::{EcalError, ErrorKind, EvalResult, RuntimeError};
use crate::evaluator::rt_func::call_function;
use crate::evaluator::rt_identifier::list_index;
use crate::evaluator::value::{FunctionValue, MapRef, Value};
use crate::evaluator::InstanceState;
use crate::scope::ScopeRef;
use crate::stdlib;
use crate::util::types::{EcalFunction, FuncContext};

/// Table of the built-in functions.
static BUILTIN_FUNC_MAP: Lazy<HashMap<&'static str, Arc<dyn EcalFunction>>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Arc<dyn EcalFunction>> = HashMap::new();

    m.insert("log", Arc::new(LogFunc::Info));
    m.insert("debug", Arc::new(LogFunc::Debug));
    m.insert("error", Arc::new(LogFunc::Error));
    m.insert("range", Arc::new(RangeFunc));
    m.insert("new", Arc::new(NewFunc));
    m.insert("len", Arc::new(LenFunc));
    m.insert("del", Arc::new(DelFunc));
    m.insert("add", Arc::new(AddFunc));
    m.insert("concat", Arc::new(ConcatFunc));
    m.insert("dumpenv", Arc::new(DumpEnvFunc));
    m.insert("doc", Arc::new(DocFunc));
    m.insert("raise", Arc::new(RaiseFunc));
    m.insert("addEvent", Arc::new(AddEventFunc));
    m.insert("addEventAndWait", Arc::new(AddEventAndWaitFunc));

    m
});

/// Look up a built-in function by name.
pub fn get_builtin_func(name: &str) -> Option<Arc<dyn EcalFunction>> {
    BUILTIN_FUNC_MAP.get(name).cloned()
}

/// Names of all built-in functions.
pub fn builtin_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTIN_FUNC_MAP.keys().copied().collect();
    names.sort_unstable();
    names
}

// Parameter assertion helpers

fn assert_num_param(ctx: &FuncContext<'_>, index: usize, val: &Value) -> Result<f64, EcalError> {
    val.as_number().ok_or_else(|| {
        ctx.error(
            ErrorKind::RuntimeError,
            format!("Parameter {} should be a number", index),
        )
    })
}

fn assert_map_param(ctx: &FuncContext<'_>, index: usize, val: &Value) -> Result<MapRef, EcalError> {
    match val {
        Value::Map(m) => Ok(m.clone()),
        _ => Err(ctx.error(
            ErrorKind::RuntimeError,
            format!("Parameter {} should be a map", index),
        )),
    }
}

fn assert_list_param(
    ctx: &FuncContext<'_>,
    index: usize,
    val: &Value,
) -> Result<Vec<Value>, EcalError> {
    match val {
        Value::List(l) => Ok(l.read().clone()),
        _ => Err(ctx.error(
            ErrorKind::RuntimeError,
            format!("Parameter {} should be a list", index),
        )),
    }
}

// Logging
// =======

/// `log` / `debug` / `error` concatenate their arguments and release the
/// message to the provider's logger.
enum LogFunc {
    Info,
    Debug,
    Error,
}

impl EcalFunction for LogFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        let msg: String = args.iter().map(|a| a.to_string()).collect();

        match self {
            LogFunc::Info => ctx.erp.logger.log_info(msg),
            LogFunc::Debug => ctx.erp.logger.log_debug(msg),
            LogFunc::Error => ctx.erp.logger.log_error(msg),
        }

        Ok(Value::Null)
    }

    fn doc_string(&self) -> String {
        match self {
            LogFunc::Info => "Log adds a new info log message.".to_string(),
            LogFunc::Debug => "Debug adds a new debug log message.".to_string(),
            LogFunc::Error => "Error adds a new error log message.".to_string(),
        }
    }
}

// Range
// =====

/// Iterator function which returns a range of numbers.
struct RangeFunc;

impl EcalFunction for RangeFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        let id = ctx.instance_id;

        let key_from = format!("{}from", id);
        let key_to = format!("{}to", id);
        let key_step = format!("{}step", id);
        let key_curr = format!("{}currVal", id);

        if let Some(Value::Number(step)) = is.get(&key_step).cloned() {
            let from = match is.get(&key_from) {
                Some(Value::Number(n)) => *n,
                _ => 0.0,
            };
            let to = match is.get(&key_to) {
                Some(Value::Number(n)) => *n,
                _ => 0.0,
            };
            let curr = match is.get(&key_curr) {
                Some(Value::Number(n)) => *n,
                _ => from,
            };

            is.set(key_curr, Value::Number(curr + step));

            if (from < to && curr > to) || (from > to && curr < to) {
                return Err(EcalError::EndOfIteration);
            }

            return Err(EcalError::IsIterator(Value::Number(curr)));
        }

        if args.is_empty() {
            return Err(ctx.error(
                ErrorKind::RuntimeError,
                "Need at least an end range as first parameter",
            ));
        }

        let mut from = 0.0;
        let mut step = 1.0;
        let to;

        if args.len() == 1 {
            to = assert_num_param(ctx, 1, &args[0])?;
        } else {
            from = assert_num_param(ctx, 1, &args[0])?;
            to = assert_num_param(ctx, 2, &args[1])?;

            if args.len() > 2 {
                step = assert_num_param(ctx, 3, &args[2])?;
            }
        }

        // A zero step or an empty range ends immediately.
        if step == 0.0 || from == to {
            return Err(EcalError::EndOfIteration);
        }

        is.set(key_from, Value::Number(from));
        is.set(key_to, Value::Number(to));
        is.set(key_step, Value::Number(step));
        is.set(key_curr, Value::Number(from + step));

        Err(EcalError::IsIterator(Value::Number(from)))
    }

    fn doc_string(&self) -> String {
        "Range function which can be used to iterate over number ranges. \
         Parameters are start, end and step."
            .to_string()
    }
}

// New
// ===

/// Instantiates a new object from a map template, walking the `super`
/// chain and running `init` if present.
struct NewFunc;

const MAX_SUPER_DEPTH: usize = 64;

impl NewFunc {
    /// Copy members of the template and its super classes into the object,
    /// left-to-right method resolution with the template itself winning.
    /// Returns the rebound init function of the template, if any.
    fn add_super_classes(
        &self,
        ctx: &FuncContext<'_>,
        obj: &MapRef,
        template: &MapRef,
        depth: usize,
    ) -> Result<Option<Value>, EcalError> {
        if depth > MAX_SUPER_DEPTH {
            return Err(ctx.error(
                ErrorKind::InvalidState,
                "Cyclic super class hierarchy",
            ));
        }

        let entries: Vec<(String, Value)> = template
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // First walk into the base classes (the top-most classes first).
        let mut init_super_list = Vec::new();

        if let Some((_, super_val)) = entries.iter().find(|(k, _)| k == "super") {
            match super_val {
                Value::List(supers) => {
                    let supers = supers.read().clone();
                    for super_obj in supers {
                        if let Value::Map(ref super_template) = super_obj {
                            if let Some(super_init) =
                                self.add_super_classes(ctx, obj, super_template, depth + 1)?
                            {
                                init_super_list.push(super_init);
                            }
                        }
                    }
                }
                _ => {
                    return Err(ctx.error(
                        ErrorKind::RuntimeError,
                        "Property super must be a list of super classes",
                    ))
                }
            }
        }

        let mut init_func = None;

        for (key, value) in entries {
            if key == "super" {
                continue;
            }

            if let Value::Func(FunctionValue::Closure(ref closure)) = value {
                let super_init = if key == "init" {
                    init_super_list.clone()
                } else {
                    Vec::new()
                };

                let rebound = Value::Func(FunctionValue::Closure(Arc::new(
                    closure.rebind(obj.clone(), super_init),
                )));

                if key == "init" {
                    init_func = Some(rebound.clone());
                }

                obj.write().insert(key, rebound);
            } else {
                obj.write().insert(key, value);
            }
        }

        Ok(init_func)
    }
}

impl EcalFunction for NewFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        if args.is_empty() {
            return Err(ctx.error(ErrorKind::RuntimeError, "Need a map as first parameter"));
        }

        let template = assert_map_param(ctx, 1, &args[0])?;
        let obj: MapRef = Arc::new(parking_lot::RwLock::new(BTreeMap::new()));

        let init_func = self.add_super_classes(ctx, &obj, &template, 0)?;

        if let Some(Value::Func(FunctionValue::Closure(ref init))) = init_func {
            let mut init_is = is.child();
            call_function(ctx, init, Some(obj.clone()), args[1..].to_vec(), &mut init_is)?;
        }

        Ok(Value::Map(obj))
    }

    fn doc_string(&self) -> String {
        "New creates a new object instance.".to_string()
    }
}

// Len
// ===

/// Returns the size of a list or map.
struct LenFunc;

impl EcalFunction for LenFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        match args.first() {
            Some(Value::List(l)) => Ok(Value::Number(l.read().len() as f64)),
            Some(Value::Map(m)) => Ok(Value::Number(m.read().len() as f64)),
            _ => Err(ctx.error(
                ErrorKind::RuntimeError,
                "Need a list or a map as first parameter",
            )),
        }
    }

    fn doc_string(&self) -> String {
        "Len returns the size of a list or map.".to_string()
    }
}

// Del
// ===

/// Removes an element from a list or map.
struct DelFunc;

impl EcalFunction for DelFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        if args.len() == 2 {
            if let Some(Value::List(l)) = args.first() {
                let mut items = l.read().clone();

                // Negative indices count from the end, as for `[index]`
                // access.
                let index =
                    list_index(&args[1], items.len()).map_err(|e| ctx.error(e.0, e.1))?;

                items.remove(index);
                return Ok(Value::list(items));
            }

            if let Some(Value::Map(m)) = args.first() {
                m.write().remove(&args[1].key_string());
                return Ok(args[0].clone());
            }
        }

        Err(ctx.error(
            ErrorKind::RuntimeError,
            "Need a list or a map as first parameter and an index or key as second parameter",
        ))
    }

    fn doc_string(&self) -> String {
        "Del removes an item from a list or map.".to_string()
    }
}

// Add
// ===

/// Adds an element to a list, at the end or at a given index.
struct AddFunc;

impl EcalFunction for AddFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        if args.len() < 2 {
            return Err(ctx.error(
                ErrorKind::RuntimeError,
                "Need a list as first parameter and a value as second parameter",
            ));
        }

        let mut items = assert_list_param(ctx, 1, &args[0])?;

        if args.len() == 3 {
            // Negative indices count from the end; one past the end is
            // the same as appending.
            let mut index = assert_num_param(ctx, 3, &args[2])?.trunc() as i64;
            if index < 0 {
                index += items.len() as i64;
            }

            if index < 0 || index as usize > items.len() {
                return Err(ctx.error(
                    ErrorKind::InvalidState,
                    format!("Index out of bounds: {}", args[2]),
                ));
            }

            items.insert(index as usize, args[1].clone());
        } else {
            items.push(args[1].clone());
        }

        Ok(Value::list(items))
    }

    fn doc_string(&self) -> String {
        "Add adds an item to a list. The item is added at the optionally \
         given index or at the end if no index is specified."
            .to_string()
    }
}

// Concat
// ======

/// Joins one or more lists together.
struct ConcatFunc;

impl EcalFunction for ConcatFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        if args.len() < 2 {
            return Err(ctx.error(
                ErrorKind::RuntimeError,
                "Need at least two lists as parameters",
            ));
        }

        let mut result = Vec::new();

        for (i, arg) in args.iter().enumerate() {
            result.extend(assert_list_param(ctx, i + 1, arg)?);
        }

        Ok(Value::list(result))
    }

    fn doc_string(&self) -> String {
        "Concat joins one or more lists together. The result is a new list.".to_string()
    }
}

// Dumpenv
// =======

/// Returns the current variable environment as a string.
struct DumpEnvFunc;

impl EcalFunction for DumpEnvFunc {
    fn run(
        &self,
        _ctx: &FuncContext<'_>,
        vs: &ScopeRef,
        _is: &mut InstanceState,
        _args: Vec<Value>,
    ) -> EvalResult {
        Ok(Value::Str(vs.to_string()))
    }

    fn doc_string(&self) -> String {
        "Dumpenv returns the current variable environment as a string.".to_string()
    }
}

// Doc
// ===

/// Returns the docstring of a function.
struct DocFunc;

impl EcalFunction for DocFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        match args.first() {
            Some(Value::Func(f)) => Ok(Value::Str(f.doc_string())),
            Some(Value::Null) => {
                // The argument did not resolve to a value; look up the
                // identifier it names in the stdlib and the built-ins.
                let funccall = ctx
                    .node
                    .children
                    .iter()
                    .find(|c| c.name == node::FUNCCALL);

                let arg_node = funccall.and_then(|f| f.children.first());

                let name = arg_node
                    .map(|n| {
                        let mut name = n.token_value().to_string();
                        if let Some(member) = n.children.first() {
                            if member.name == node::IDENTIFIER {
                                name = format!("{}.{}", name, member.token_value());
                            }
                        }
                        name
                    })
                    .unwrap_or_default();

                if let Some(func) = stdlib::get_stdlib_func(&name) {
                    return Ok(Value::Str(func.doc_string()));
                }

                if let Some(func) = get_builtin_func(&name) {
                    return Ok(Value::Str(func.doc_string()));
                }

                Err(ctx.error(ErrorKind::RuntimeError, "Need a function as parameter"))
            }
            _ => Err(ctx.error(ErrorKind::RuntimeError, "Need a function as parameter")),
        }
    }

    fn doc_string(&self) -> String {
        "Doc returns the docstring of a function.".to_string()
    }
}

// Raise
// =====

/// Returns an error. Outside of sinks this stops the code execution,
/// inside a sink only the specific sink fails. The error can be used to
/// break trigger sequences of sinks if fail-on-first is set.
struct RaiseFunc;

impl EcalFunction for RaiseFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        let kind = match args.first() {
            Some(v) => ErrorKind::Custom(v.to_string()),
            None => ErrorKind::RuntimeError,
        };

        let detail = match args.get(1) {
            Some(Value::Null) | None => String::new(),
            Some(v) => v.to_string(),
        };

        let mut err = RuntimeError::new(ctx.erp.name.clone(), kind, detail, ctx.node.clone());
        err.environment = Some(vs.clone());
        err.data = args.get(2).cloned();

        Err(err.into())
    }

    fn doc_string(&self) -> String {
        "Raise returns an error object.".to_string()
    }
}

// addEvent
// ========

/// Shared submission logic of `addEvent` and `addEventAndWait`: build the
/// event and the rule scope from the arguments and hand them to the
/// processor, auto-starting it if necessary.
fn add_event_with<F>(ctx: &FuncContext<'_>, args: Vec<Value>, submit: F) -> EvalResult
where
    F: FnOnce(Event, Option<RuleScope>) -> EvalResult,
{
    let proc = &ctx.erp.processor;

    if proc.stopped() {
        proc.start();
    }

    if args.len() < 3 {
        return Err(ctx.error(
            ErrorKind::RuntimeError,
            "Need at least three parameters: name, kind and state",
        ));
    }

    let state = assert_map_param(ctx, 3, &args[2])?;

    let kind: Vec<String> = args[1]
        .to_string()
        .split('.')
        .map(|s| s.to_string())
        .collect();

    if kind.iter().any(|s| s.is_empty()) {
        return Err(ctx.error(
            ErrorKind::InvalidState,
            format!("Event kind contains an empty segment: {}", args[1]),
        ));
    }

    let event = Event::new(args[0].to_string(), kind, state);

    let scope = match args.get(3) {
        Some(v) => {
            let scope_map = assert_map_param(ctx, 4, v)?;
            let scopes = scope_map
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.is_true()))
                .collect();
            Some(RuleScope::new(scopes))
        }
        None => None,
    };

    submit(event, scope)
}

/// Adds an event to trigger sinks, returning immediately.
struct AddEventFunc;

impl EcalFunction for AddEventFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        let parent_monitor = is.monitor.clone();

        add_event_with(ctx, args, |event, scope| {
            let proc = &ctx.erp.processor;

            // A new scope starts a new cascade root; otherwise the event
            // joins the caller's cascade.
            let monitor = match parent_monitor {
                Some(ref parent) if scope.is_none() => parent.new_child_monitor(0),
                _ => proc.new_root_monitor(scope),
            };

            proc.add_event(event, monitor)
                .map_err(|e| ctx.error(ErrorKind::InvalidState, e.to_string()))?;

            Ok(Value::Null)
        })
    }

    fn doc_string(&self) -> String {
        "AddEvent adds an event to trigger sinks. This function will return \
         immediately and not wait for the event cascade to finish."
            .to_string()
    }
}

// addEventAndWait
// ===============

/// Adds an event to trigger sinks and blocks until the cascade has
/// finished, returning all errors.
struct AddEventAndWaitFunc;

impl EcalFunction for AddEventAndWaitFunc {
    fn run(
        &self,
        ctx: &FuncContext<'_>,
        _vs: &ScopeRef,
        _is: &mut InstanceState,
        args: Vec<Value>,
    ) -> EvalResult {
        add_event_with(ctx, args, |event, scope| {
            let proc = &ctx.erp.processor;
            let monitor = proc.new_root_monitor(scope);

            let all_errors = proc
                .add_event_and_wait(event, monitor)
                .map_err(|e| ctx.error(ErrorKind::InvalidState, e.to_string()))?;

            let mut result = Vec::new();

            for event_errors in all_errors {
                let mut errors = BTreeMap::new();

                for (rule_name, err) in &event_errors.errors {
                    let mut entry = BTreeMap::new();
                    entry.insert("error".to_string(), Value::str(err.to_string()));
                    entry.insert("type".to_string(), Value::str(err.kind.to_string()));
                    entry.insert("detail".to_string(), Value::str(err.detail.clone()));
                    entry.insert(
                        "data".to_string(),
                        err.data.clone().unwrap_or(Value::Null),
                    );

                    errors.insert(rule_name.clone(), Value::map(entry));
                }

                let mut event_map = BTreeMap::new();
                event_map.insert(
                    "name".to_string(),
                    Value::str(event_errors.event.name()),
                );
                event_map.insert(
                    "kind".to_string(),
                    Value::str(event_errors.event.kind().join(".")),
                );
                event_map.insert(
                    "state".to_string(),
                    Value::Map(event_errors.event.state().clone()),
                );

                let mut item = BTreeMap::new();
                item.insert("event".to_string(), Value::map(event_map));
                item.insert("errors".to_string(), Value::map(errors));

                result.push(Value::map(item));
            }

            Ok(Value::list(result))
        })
    }

    fn doc_string(&self) -> String {
        "AddEventAndWait adds an event to trigger sinks. This function will \
         return once the event cascade has finished."
            .to_string()
    }
}
