//! Interactive debugger behavior.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ecal_core::evaluator::InstanceState;
use ecal_core::{
    parse_with_runtime, DebugCommand, EcalDebugger, EcalRuntimeProvider, MemoryLogger, Processor,
    Scope, ScopeRef, Value, GLOBAL_SCOPE,
};

const SOURCE_NAME: &str = "debugtest";

struct DebugRig {
    erp: Arc<EcalRuntimeProvider>,
    debugger: Arc<EcalDebugger>,
    global: ScopeRef,
}

fn debug_rig() -> DebugRig {
    let debugger = Arc::new(EcalDebugger::new());
    let global = Scope::new(GLOBAL_SCOPE);
    debugger.set_global_scope(global.clone());

    let erp = EcalRuntimeProvider::with_parts(
        SOURCE_NAME,
        None,
        Arc::new(MemoryLogger::new(100)),
        Some(debugger.clone()),
        Processor::new(1),
    );

    DebugRig {
        erp,
        debugger,
        global,
    }
}

/// Evaluate in a background thread so the main thread can drive the
/// debugger.
fn eval_concurrent(rig: &DebugRig, input: &str) -> thread::JoinHandle<Result<Value, String>> {
    let runtime = parse_with_runtime(SOURCE_NAME, input, &rig.erp).unwrap();
    runtime.validate().unwrap();

    let global = rig.global.clone();
    let tid = rig.erp.new_thread_id();

    thread::spawn(move || {
        let mut is = InstanceState::new(tid);
        runtime.eval(&global, &mut is).map_err(|e| e.to_string())
    })
}

/// Poll the debugger status until one thread is suspended; returns its
/// thread id and the suspended line.
fn wait_suspended(debugger: &EcalDebugger) -> (u64, usize) {
    let start = Instant::now();

    loop {
        let status = debugger.status();

        if let Some(threads) = status["threads"].as_object() {
            for (tid, thread_status) in threads {
                if thread_status["threadRunning"] == serde_json::Value::Bool(false) {
                    let line = thread_status["line"].as_u64().unwrap_or(0) as usize;
                    return (tid.parse().unwrap(), line);
                }
            }
        }

        assert!(
            start.elapsed() < Duration::from_secs(5),
            "no thread suspended in time; status: {}",
            status
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_breakpoint_suspends_thread() {
    let rig = debug_rig();
    rig.debugger.set_break_point(format!("{}:3", SOURCE_NAME));

    let handle = eval_concurrent(&rig, "a := 1\nb := 2\nc := 3\nd := 4\ne := 5");

    let (tid, line) = wait_suspended(&rig.debugger);
    assert_eq!(line, 3);

    // Only the first two statements have run.
    assert_eq!(rig.global.get("b"), Some(Value::Number(2.0)));
    assert_eq!(rig.global.get("c"), None);

    // Step over advances exactly one statement.
    rig.debugger
        .continue_thread(tid, DebugCommand::StepOver)
        .unwrap();
    let (tid, line) = wait_suspended(&rig.debugger);
    assert_eq!(line, 4);
    assert_eq!(rig.global.get("c"), Some(Value::Number(3.0)));

    rig.debugger
        .continue_thread(tid, DebugCommand::Resume)
        .unwrap();
    handle.join().unwrap().unwrap();

    assert_eq!(rig.global.get("e"), Some(Value::Number(5.0)));
}

#[test]
fn test_step_over_runs_calls_to_completion() {
    let rig = debug_rig();
    rig.debugger.set_break_point(format!("{}:6", SOURCE_NAME));

    let handle = eval_concurrent(
        &rig,
        "func f() {\n    x := 1\n    return x\n}\na := 1\nb := f()\nc := 3",
    );

    let (tid, line) = wait_suspended(&rig.debugger);
    assert_eq!(line, 6);

    rig.debugger
        .continue_thread(tid, DebugCommand::StepOver)
        .unwrap();
    let (tid, line) = wait_suspended(&rig.debugger);

    // The called function ran to completion, the thread stops on the
    // next statement of the caller.
    assert_eq!(line, 7);
    assert_eq!(rig.global.get("b"), Some(Value::Number(1.0)));

    rig.debugger
        .continue_thread(tid, DebugCommand::Resume)
        .unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_step_in() {
    let rig = debug_rig();
    rig.debugger.set_break_point(format!("{}:6", SOURCE_NAME));

    let handle = eval_concurrent(
        &rig,
        "func f() {\n    x := 1\n    return x\n}\na := 1\nb := f()\nc := 3",
    );

    let (tid, line) = wait_suspended(&rig.debugger);
    assert_eq!(line, 6);

    rig.debugger
        .continue_thread(tid, DebugCommand::StepIn)
        .unwrap();
    let (tid, line) = wait_suspended(&rig.debugger);
    assert_eq!(line, 2);

    // Inside the function the call stack shows the call site and the
    // suspended statement.
    let describe = rig.debugger.describe(tid).unwrap();
    assert_eq!(
        describe["callStack"],
        serde_json::json!(["identifier: f (Line:6)", ":= (Line:2)"])
    );

    rig.debugger
        .continue_thread(tid, DebugCommand::Resume)
        .unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_status_reports_suspended_statement() {
    let rig = debug_rig();
    rig.debugger.set_break_point(format!("{}:3", SOURCE_NAME));

    let handle = eval_concurrent(&rig, "a := 1\nb := 2\nc := 3\nd := 4\ne := 5");

    let (tid, line) = wait_suspended(&rig.debugger);
    assert_eq!(line, 3);

    // A top-level suspension reports the line 3 node as its call stack.
    let status = rig.debugger.status();
    let thread = &status["threads"][tid.to_string().as_str()];
    assert_eq!(thread["threadRunning"], serde_json::json!(false));
    assert_eq!(thread["callStack"], serde_json::json!([":= (Line:3)"]));

    rig.debugger
        .continue_thread(tid, DebugCommand::StepOver)
        .unwrap();
    let (tid, line) = wait_suspended(&rig.debugger);
    assert_eq!(line, 4);

    let status = rig.debugger.status();
    let thread = &status["threads"][tid.to_string().as_str()];
    assert_eq!(thread["callStack"], serde_json::json!([":= (Line:4)"]));

    rig.debugger
        .continue_thread(tid, DebugCommand::Resume)
        .unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_extract_and_inject() {
    let rig = debug_rig();
    rig.debugger.set_break_point(format!("{}:3", SOURCE_NAME));

    let handle = eval_concurrent(&rig, "a := 1\nb := 2\nc := a + b\nresult := [a, b, c]");

    let (tid, _) = wait_suspended(&rig.debugger);

    // Copy a value out of the suspended thread.
    rig.debugger.extract_value(tid, "b", "bcopy").unwrap();
    assert_eq!(rig.global.get("bcopy"), Some(Value::Number(2.0)));

    assert!(rig.debugger.extract_value(tid, "nosuch", "x").is_err());

    // Inject a new value for a; the remaining statements observe it.
    rig.debugger.inject_value(tid, "a", "40 + 2").unwrap();

    rig.debugger
        .continue_thread(tid, DebugCommand::Resume)
        .unwrap();
    handle.join().unwrap().unwrap();

    assert_eq!(
        rig.global.get("result").map(|v| v.to_string()),
        Some("[42,2,44]".to_string())
    );
}

#[test]
fn test_inspection_requires_suspension() {
    let rig = debug_rig();

    assert!(rig.debugger.extract_value(99, "a", "b").is_err());
    assert!(rig.debugger.inject_value(99, "a", "1").is_err());
    assert!(rig.debugger.inspect(99).is_err());
    assert!(rig.debugger.continue_thread(99, DebugCommand::Resume).is_err());
}

#[test]
fn test_breakpoint_management() {
    let rig = debug_rig();

    rig.debugger.set_break_point("a:1");
    rig.debugger.set_break_point("a:2");
    rig.debugger.set_break_point("b:1");

    let status = rig.debugger.status();
    assert_eq!(
        status["breakpoints"],
        serde_json::json!({"a:1": true, "a:2": true, "b:1": true})
    );

    rig.debugger.rm_break_points("a");
    let status = rig.debugger.status();
    assert_eq!(status["breakpoints"], serde_json::json!({"b:1": true}));
}

#[test]
fn test_release_all_unblocks() {
    let rig = debug_rig();
    rig.debugger.set_break_point(format!("{}:2", SOURCE_NAME));

    let handle = eval_concurrent(&rig, "a := 1\nb := 2\nc := 3");
    wait_suspended(&rig.debugger);

    rig.debugger.release_all();
    handle.join().unwrap().unwrap();

    assert_eq!(rig.global.get("c"), Some(Value::Number(3.0)));
}
