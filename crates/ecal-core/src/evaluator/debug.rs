//! Interactive thread debugger.
//!
//! Evaluators report into the debugger through three hooks: `visit_state`
//! before every statement, `visit_step_in_state` before entering a
//! function body and `visit_step_out_state` after returning. A thread
//! which hits an active breakpoint blocks on its own condition variable
//! until a command arrives via `continue_thread`; while it is suspended
//! its scope can be inspected and modified.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use thiserror::Error;

use crate::ast::AstNode;
use crate::evaluator::{EcalRuntimeProvider, InstanceState};
use crate::parser;
use crate::scope::ScopeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Stop,
    StepIn,
    StepOut,
    StepOver,
    Resume,
}

impl DebugCommand {
    pub fn parse(s: &str) -> Option<DebugCommand> {
        match s {
            "stop" => Some(DebugCommand::Stop),
            "stepin" => Some(DebugCommand::StepIn),
            "stepout" => Some(DebugCommand::StepOut),
            "stepover" => Some(DebugCommand::StepOver),
            "resume" => Some(DebugCommand::Resume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DebuggerError(pub String);

/// Per-thread interrogation state.
struct ThreadInner {
    running: bool,
    cmd: Option<DebugCommand>,
    /// Line of the last suspension, resume runs until it changes.
    stop_line: usize,
    /// Call stack depth to return to for step over / step out.
    target_depth: Option<usize>,
    node: Option<Arc<AstNode>>,
    vs: Option<ScopeRef>,
}

struct ThreadState {
    inner: Mutex<ThreadInner>,
    cond: Condvar,
}

impl ThreadState {
    fn new(cmd: Option<DebugCommand>) -> Arc<ThreadState> {
        Arc::new(ThreadState {
            inner: Mutex::new(ThreadInner {
                running: true,
                cmd,
                stop_line: 0,
                target_depth: None,
                node: None,
                vs: None,
            }),
            cond: Condvar::new(),
        })
    }
}

pub struct EcalDebugger {
    break_points: RwLock<BTreeMap<String, bool>>,
    break_on_start: AtomicBool,
    states: DashMap<u64, Arc<ThreadState>>,
    // Threads which already had their break-on-start suspension.
    started: DashMap<u64, ()>,
    call_stacks: DashMap<u64, Vec<Arc<AstNode>>>,
    globals: RwLock<Option<ScopeRef>>,
    shutdown: AtomicBool,
}

impl Default for EcalDebugger {
    fn default() -> Self {
        EcalDebugger::new()
    }
}

impl EcalDebugger {
    pub fn new() -> EcalDebugger {
        EcalDebugger {
            break_points: RwLock::new(BTreeMap::new()),
            break_on_start: AtomicBool::new(false),
            states: DashMap::new(),
            started: DashMap::new(),
            call_stacks: DashMap::new(),
            globals: RwLock::new(None),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Scope used by value extraction and injection.
    pub fn set_global_scope(&self, vs: ScopeRef) {
        *self.globals.write() = Some(vs);
    }

    // Breakpoint management

    /// Activate a breakpoint keyed `source:line`.
    pub fn set_break_point(&self, key: impl Into<String>) {
        self.break_points.write().insert(key.into(), true);
    }

    /// Remove all breakpoints of a source.
    pub fn rm_break_points(&self, source: &str) {
        self.break_points
            .write()
            .retain(|k, _| !k.starts_with(&format!("{}:", source)) && k != source);
    }

    pub fn break_on_start(&self, flag: bool) {
        self.break_on_start.store(flag, Ordering::SeqCst);
    }

    fn has_break_point(&self, key: &str) -> bool {
        self.break_points.read().get(key).copied().unwrap_or(false)
    }

    // Evaluator hooks

    /// Called before evaluating a statement-bearing node.
    pub fn visit_state(&self, node: &Arc<AstNode>, vs: &ScopeRef, tid: u64, source: &str) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let line = node.line();
        let key = format!("{}:{}", source, line);
        let depth = self.call_stacks.get(&tid).map(|s| s.len()).unwrap_or(0);

        let state = self.states.get(&tid).map(|e| e.value().clone());

        match state {
            None => {
                let break_on_start = self.break_on_start.load(Ordering::SeqCst)
                    && self.started.insert(tid, ()).is_none();

                if break_on_start || self.has_break_point(&key) {
                    let state = ThreadState::new(None);
                    self.states.insert(tid, state.clone());
                    self.suspend(&state, node, vs, line, depth);
                }
            }
            Some(state) => {
                let cmd = state.inner.lock().cmd;

                match cmd {
                    Some(DebugCommand::Stop) | Some(DebugCommand::StepIn) => {
                        self.suspend(&state, node, vs, line, depth);
                    }
                    Some(DebugCommand::StepOver) | Some(DebugCommand::StepOut) => {
                        let target = state.inner.lock().target_depth.unwrap_or(usize::MAX);
                        if depth <= target {
                            self.suspend(&state, node, vs, line, depth);
                        }
                    }
                    Some(DebugCommand::Resume) | None => {
                        if self.has_break_point(&key) {
                            self.suspend(&state, node, vs, line, depth);
                        } else if line != state.inner.lock().stop_line {
                            // A different line was reached without hitting
                            // a breakpoint; interrogation ends.
                            self.states.remove(&tid);
                        }
                    }
                }
            }
        }
    }

    /// Called before entering a function body.
    pub fn visit_step_in_state(&self, node: &Arc<AstNode>, _vs: &ScopeRef, tid: u64) {
        self.call_stacks.entry(tid).or_default().push(node.clone());
    }

    /// Called after a function body returned.
    pub fn visit_step_out_state(&self, _node: &Arc<AstNode>, _vs: &ScopeRef, tid: u64) {
        if let Some(mut stack) = self.call_stacks.get_mut(&tid) {
            stack.pop();
        }
    }

    /// Block the thread on its condition variable until a command arrives.
    fn suspend(
        &self,
        state: &Arc<ThreadState>,
        node: &Arc<AstNode>,
        vs: &ScopeRef,
        line: usize,
        depth: usize,
    ) {
        let mut inner = state.inner.lock();

        inner.running = false;
        inner.cmd = None;
        inner.target_depth = None;
        inner.stop_line = line;
        inner.node = Some(node.clone());
        inner.vs = Some(vs.clone());

        while inner.cmd.is_none() && !self.shutdown.load(Ordering::SeqCst) {
            state.cond.wait(&mut inner);
        }

        inner.running = true;
        inner.node = None;
        inner.vs = None;

        match inner.cmd {
            Some(DebugCommand::StepOver) => inner.target_depth = Some(depth),
            Some(DebugCommand::StepOut) => inner.target_depth = Some(depth.saturating_sub(1)),
            _ => {}
        }
    }

    // Commands

    /// Wake a suspended thread with the given command.
    pub fn continue_thread(&self, tid: u64, cmd: DebugCommand) -> Result<(), DebuggerError> {
        let state = self
            .states
            .get(&tid)
            .map(|e| e.value().clone())
            .ok_or_else(|| DebuggerError(format!("Unknown thread: {}", tid)))?;

        // Mark the thread running right away so status polls do not
        // observe the stale suspension between the signal and the wakeup.
        let mut inner = state.inner.lock();
        inner.cmd = Some(cmd);
        inner.running = true;
        inner.node = None;
        inner.vs = None;
        state.cond.notify_all();

        Ok(())
    }

    /// Request a thread to stop at its next statement.
    pub fn stop_thread(&self, tid: u64) {
        let state = self
            .states
            .entry(tid)
            .or_insert_with(|| ThreadState::new(Some(DebugCommand::Stop)))
            .value()
            .clone();

        state.inner.lock().cmd = Some(DebugCommand::Stop);
    }

    fn suspended_scope(&self, tid: u64) -> Result<ScopeRef, DebuggerError> {
        let state = self
            .states
            .get(&tid)
            .map(|e| e.value().clone())
            .ok_or_else(|| DebuggerError(format!("Thread {} is not suspended", tid)))?;

        let inner = state.inner.lock();

        match (inner.running, inner.vs.clone()) {
            (false, Some(vs)) => Ok(vs),
            _ => Err(DebuggerError(format!("Thread {} is not suspended", tid))),
        }
    }

    // Value inspection

    /// Copy a value from the scope of a suspended thread into the global
    /// scope under `dest`.
    pub fn extract_value(&self, tid: u64, name: &str, dest: &str) -> Result<(), DebuggerError> {
        let vs = self.suspended_scope(tid)?;

        let value = vs
            .get(name)
            .ok_or_else(|| DebuggerError(format!("No such value: {}", name)))?;

        let globals = self.globals.read().clone().ok_or_else(|| {
            DebuggerError("No global scope was set".to_string())
        })?;

        globals.set_value(dest, value);
        Ok(())
    }

    /// Parse and evaluate an expression in a scope inheriting from the
    /// global scope and write the result into the scope of a suspended
    /// thread.
    pub fn inject_value(&self, tid: u64, name: &str, expr: &str) -> Result<(), DebuggerError> {
        let vs = self.suspended_scope(tid)?;

        let globals = self.globals.read().clone().ok_or_else(|| {
            DebuggerError("No global scope was set".to_string())
        })?;

        let erp = EcalRuntimeProvider::new("InjectValueExpression");
        let runtime = parser::parse_with_runtime("InjectValueExpression", expr, &erp)
            .map_err(|e| DebuggerError(e.to_string()))?;

        runtime.validate().map_err(|e| DebuggerError(e.to_string()))?;

        let eval_scope = globals.new_child("InjectValueExpression");
        let mut is = InstanceState::new(erp.new_thread_id());

        let value = runtime
            .eval(&eval_scope, &mut is)
            .map_err(|e| DebuggerError(e.to_string()))?;

        vs.set_value(name, value);
        Ok(())
    }

    // Status

    /// Status document of all known threads and breakpoints.
    pub fn status(&self) -> serde_json::Value {
        let breakpoints: serde_json::Map<String, serde_json::Value> = self
            .break_points
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::Bool(*v)))
            .collect();

        let mut tids: Vec<u64> = self.call_stacks.iter().map(|e| *e.key()).collect();
        tids.extend(self.states.iter().map(|e| *e.key()));
        tids.sort_unstable();
        tids.dedup();

        let mut threads = serde_json::Map::new();
        for tid in tids {
            threads.insert(tid.to_string(), self.thread_status(tid));
        }

        serde_json::json!({
            "breakpoints": breakpoints,
            "breakonstart": self.break_on_start.load(Ordering::SeqCst),
            "threads": threads,
        })
    }

    fn thread_status(&self, tid: u64) -> serde_json::Value {
        let mut call_stack: Vec<String> = self
            .call_stacks
            .get(&tid)
            .map(|s| s.iter().map(|n| stack_frame(n)).collect())
            .unwrap_or_default();

        let mut running = true;
        let mut suspended_node = None;

        if let Some(state) = self.states.get(&tid).map(|e| e.value().clone()) {
            let inner = state.inner.lock();
            running = inner.running;
            suspended_node = inner.node.clone();
        }

        // The suspended statement is the innermost call stack frame, so a
        // top-level suspension still reports where the thread stands.
        if let Some(ref node) = suspended_node {
            call_stack.push(stack_frame(node));
        }

        let mut status = serde_json::json!({
            "callStack": call_stack,
            "threadRunning": running,
        });

        if let Some(ref node) = suspended_node {
            status["node"] = serde_json::Value::String(node.describe());
            status["line"] = serde_json::Value::from(node.line());
        }

        status
    }

    /// Detailed record of one thread.
    pub fn describe(&self, tid: u64) -> Result<serde_json::Value, DebuggerError> {
        if self.states.get(&tid).is_none() && self.call_stacks.get(&tid).is_none() {
            return Err(DebuggerError(format!("Unknown thread: {}", tid)));
        }

        Ok(self.thread_status(tid))
    }

    /// Scope dump of a suspended thread.
    pub fn inspect(&self, tid: u64) -> Result<serde_json::Value, DebuggerError> {
        let vs = self.suspended_scope(tid)?;
        Ok(vs.to_json())
    }

    /// Wake all suspended threads, used on shutdown.
    pub fn release_all(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        for entry in self.states.iter() {
            let state = entry.value().clone();
            let mut inner = state.inner.lock();
            inner.cmd = Some(DebugCommand::Resume);
            state.cond.notify_all();
        }
    }
}

/// Call stack frame rendering used in status documents.
fn stack_frame(node: &AstNode) -> String {
    format!("{} (Line:{})", node.describe(), node.line())
}
