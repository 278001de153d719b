//! Event processing through sinks declared in ECAL source.

use std::sync::Arc;

use ecal_core::evaluator::InstanceState;
use ecal_core::{
    parse_with_runtime, EcalRuntimeProvider, MemoryLogger, Processor, Scope, ScopeRef, Value,
    GLOBAL_SCOPE,
};

struct SinkRig {
    erp: Arc<EcalRuntimeProvider>,
    logger: Arc<MemoryLogger>,
    vs: ScopeRef,
}

fn sink_rig() -> SinkRig {
    let logger = Arc::new(MemoryLogger::new(100));

    let erp = EcalRuntimeProvider::with_parts(
        "ECALTestRuntime",
        None,
        logger.clone(),
        None,
        Processor::new(1),
    );

    SinkRig {
        erp,
        logger,
        vs: Scope::new(GLOBAL_SCOPE),
    }
}

fn eval(rig: &SinkRig, input: &str) -> Value {
    let runtime = parse_with_runtime("ECALTestRuntime", input, &rig.erp).unwrap();
    runtime.validate().unwrap();

    let mut is = InstanceState::new(rig.erp.new_thread_id());
    runtime.eval(&rig.vs, &mut is).unwrap()
}

#[test]
fn test_sink_declaration() {
    let rig = sink_rig();

    eval(
        &rig,
        r#"/*
My cool rule
*/
sink rule1
    kindmatch [ "core.*" ],
    scopematch [ "data.write" ],
    statematch { "val" : null },
    priority 10,
    suppresses [ "rule2" ]
    {
        log("rule1 < ", event)
    }
"#,
    );

    // Nothing is defined in the global scope.
    assert_eq!(rig.vs.to_string(), "GlobalScope {\n}");

    let rules = rig.erp.processor.rules();
    assert_eq!(
        rules["rule1"].to_string(),
        r#"Rule:rule1 [My cool rule] (Priority:10 Kind:[core.*] Scope:[data.write] StateMatch:{"val":null} Suppress:[rule2])"#
    );
}

#[test]
fn test_event_cascade() {
    let rig = sink_rig();

    eval(
        &rig,
        r#"
sink rule1
    kindmatch [ "web.page.*" ],
    scopematch [ "request.read" ]
    {
        log("rule1 > Handling request: ", event.kind)
        addEvent("Rule1Event1", "not_existing", event.state)
        addEvent("Rule1Event2", "web.log", event.state)
    }

sink rule2
    kindmatch [ "web.page.*" ],
    priority 1
    {
        log("rule2 > Tracking user:", event.state.user)
    }

sink rule3
    kindmatch [ "web.log" ]
    {
        log("rule3 > Logging user:", event.state.user)
    }

res := addEventAndWait("request", "web.page.index", {
    "user" : "foo"
}, {
    "request.read" : true
})
log("ErrorResult:", res, " ", len(res) == 0)
"#,
    );

    assert_eq!(
        rig.logger.slice(),
        vec![
            "rule1 > Handling request: web.page.index",
            "rule2 > Tracking user:foo",
            "rule3 > Logging user:foo",
            "ErrorResult:[] true",
        ]
    );
}

#[test]
fn test_scope_gating() {
    let rig = sink_rig();

    eval(
        &rig,
        r#"
sink gated
    kindmatch [ "web.page.*" ],
    scopematch [ "request.read" ]
    {
        log("gated ran")
    }

addEventAndWait("request", "web.page.index", { "user" : "foo" }, {
    "request.read" : false
})
log("done")
"#,
    );

    // The capability is inactive, the sink must not trigger.
    assert_eq!(rig.logger.slice(), vec!["done"]);
}

#[test]
fn test_suppression() {
    let rig = sink_rig();

    eval(
        &rig,
        r#"
sink A
    kindmatch [ "test.event" ],
    priority 10,
    suppresses [ "B" ]
    {
        log("A")
    }

sink B
    kindmatch [ "test.event" ],
    priority 20
    {
        log("B")
    }

addEventAndWait("e1", "test.event", {})
"#,
    );

    assert_eq!(rig.logger.slice(), vec!["A"]);
}

#[test]
fn test_state_matching() {
    let rig = sink_rig();

    eval(
        &rig,
        r#"
sink s1
    kindmatch [ "t.*" ],
    statematch { "val" : null }
    {
        log("s1")
    }

sink s2
    kindmatch [ "t.*" ],
    statematch { "val" : 42 }
    {
        log("s2")
    }

addEventAndWait("e1", "t.a", { "val" : 42 })
addEventAndWait("e2", "t.a", { "val" : 1 })
addEventAndWait("e3", "t.a", { "other" : 1 })
"#,
    );

    // e1 triggers both, e2 only the null match, e3 none.
    assert_eq!(rig.logger.slice(), vec!["s1", "s2", "s1"]);
}

#[test]
fn test_sink_error_capture() {
    let rig = sink_rig();

    eval(
        &rig,
        r#"
sink failing
    kindmatch [ "test.event" ]
    {
        log("before")
        raise("SinkError", "sink failed", [1, 2])
    }

sink working
    kindmatch [ "test.event" ],
    priority 1
    {
        log("working")
    }

res := addEventAndWait("e1", "test.event", {})
"#,
    );

    // Errors are reported per rule, the other sink still ran.
    assert_eq!(rig.logger.slice(), vec!["before", "working"]);

    assert_eq!(eval(&rig, "len(res)"), Value::Number(1.0));
    assert_eq!(
        eval(&rig, "res[0].event.name"),
        Value::str("e1")
    );
    assert_eq!(
        eval(&rig, "res[0].errors.failing.type"),
        Value::str("SinkError")
    );
    assert_eq!(
        eval(&rig, "res[0].errors.failing.detail"),
        Value::str("sink failed")
    );
    assert_eq!(
        eval(&rig, "res[0].errors.failing.data").to_string(),
        "[1,2]"
    );
}

#[test]
fn test_duplicate_sink_name() {
    let rig = sink_rig();

    eval(&rig, "sink dup kindmatch [\"a.b\"] { log(1) }");

    let runtime =
        parse_with_runtime("ECALTestRuntime", "sink dup kindmatch [\"a.b\"] { log(1) }", &rig.erp)
            .unwrap();
    runtime.validate().unwrap();

    let mut is = InstanceState::new(rig.erp.new_thread_id());
    let err = runtime.eval(&rig.vs, &mut is).unwrap_err();

    assert_eq!(
        err.to_string(),
        "ECAL error in ECALTestRuntime: Invalid state (Cannot add rule dup twice) (Line:1 Pos:1)"
    );
}

#[test]
fn test_empty_kind_segment_rejected() {
    let rig = sink_rig();

    let runtime =
        parse_with_runtime("ECALTestRuntime", "addEvent(\"e\", \"a..b\", {})", &rig.erp).unwrap();
    runtime.validate().unwrap();

    let mut is = InstanceState::new(rig.erp.new_thread_id());
    let err = runtime.eval(&rig.vs, &mut is).unwrap_err();

    assert_eq!(
        err.to_string(),
        "ECAL error in ECALTestRuntime: Invalid state (Event kind contains an empty segment: a..b) (Line:1 Pos:1)"
    );
}
