//! The event processor.
//!
//! Holds the rule registry and the worker pool. Submitting an event
//! queues a matching task; the task computes the triggered rules and
//! queues one execution task per rule, in ascending `(priority, name)`
//! order with the suppression closure applied. Cascaded events queue
//! behind the rules that published them, so a single worker processes a
//! whole cascade in a deterministic order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::engine::event::Event;
use crate::engine::monitor::{EventErrors, Monitor};
use crate::engine::pool::TaskPool;
use crate::engine::rule::{Rule, RuleScope};
use crate::engine::EngineError;

pub struct Processor {
    worker_count: usize,
    rules: RwLock<HashMap<String, Arc<Rule>>>,
    pool: Mutex<Option<TaskPool>>,
    activity: Mutex<usize>,
    quiescent: Condvar,
    fail_on_first: AtomicBool,
    self_ref: Weak<Processor>,
}

impl Processor {
    pub fn new(worker_count: usize) -> Arc<Processor> {
        Arc::new_cyclic(|self_ref| Processor {
            worker_count,
            rules: RwLock::new(HashMap::new()),
            pool: Mutex::new(None),
            activity: Mutex::new(0),
            quiescent: Condvar::new(),
            fail_on_first: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        })
    }

    fn arc(&self) -> Arc<Processor> {
        self.self_ref.upgrade().expect("processor is alive")
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Abort the remaining rules of a trigger batch after the first rule
    /// error. Off by default.
    pub fn set_fail_on_first(&self, fail: bool) {
        self.fail_on_first.store(fail, Ordering::SeqCst);
    }

    pub fn fail_on_first(&self) -> bool {
        self.fail_on_first.load(Ordering::SeqCst)
    }

    /// Register a rule. Rule names are unique within a processor.
    pub fn add_rule(&self, rule: Rule) -> Result<(), EngineError> {
        let mut rules = self.rules.write();

        if rules.contains_key(&rule.name) {
            return Err(EngineError::DuplicateRule(rule.name.clone()));
        }

        rules.insert(rule.name.clone(), Arc::new(rule));
        Ok(())
    }

    /// Snapshot of the registered rules by name.
    pub fn rules(&self) -> HashMap<String, Arc<Rule>> {
        self.rules.read().clone()
    }

    /// Start the worker pool if it is not running.
    pub fn start(&self) {
        let mut pool = self.pool.lock();
        if pool.is_none() {
            *pool = Some(TaskPool::new(self.worker_count));
        }
    }

    pub fn stopped(&self) -> bool {
        self.pool.lock().is_none()
    }

    /// Drain the in-flight cascades and stop the workers. Further
    /// submissions are rejected until the processor is started again.
    pub fn stop(&self) {
        {
            let mut activity = self.activity.lock();
            while *activity > 0 {
                self.quiescent.wait(&mut activity);
            }
        }

        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.shutdown();
        }
    }

    /// Create the root monitor for a new cascade.
    pub fn new_root_monitor(&self, scope: Option<RuleScope>) -> Monitor {
        Monitor::new_root(scope.unwrap_or_default())
    }

    /// Submit an event under the given monitor and return immediately.
    pub fn add_event(&self, event: Event, monitor: Monitor) -> Result<(), EngineError> {
        if event.kind().is_empty() {
            return Err(EngineError::EmptyKind);
        }

        monitor.task_started();
        self.task_started();

        let proc = self.arc();
        let task_monitor = monitor.clone();

        let submitted = {
            let pool = self.pool.lock();
            match *pool {
                Some(ref pool) => pool
                    .submit(move || {
                        proc.process_event(&event, &task_monitor);
                        task_monitor.task_done();
                        proc.task_done();
                    })
                    .is_ok(),
                None => false,
            }
        };

        if !submitted {
            monitor.task_done();
            self.task_done();
            return Err(EngineError::NotRunning);
        }

        Ok(())
    }

    /// Submit an event and block until its cascade has terminated. The
    /// returned records list the rules which failed, grouped by event.
    pub fn add_event_and_wait(
        &self,
        event: Event,
        monitor: Monitor,
    ) -> Result<Vec<EventErrors>, EngineError> {
        self.add_event(event, monitor.clone())?;
        monitor.wait_finished();
        Ok(monitor.all_errors())
    }

    /// Match, order and queue the rules triggered by an event.
    fn process_event(&self, event: &Event, monitor: &Monitor) {
        let scope = monitor.rule_scope();

        let mut matching: Vec<Arc<Rule>> = self
            .rules
            .read()
            .values()
            .filter(|r| r.matches(event, scope))
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        // Suppression closure: a rule is suppressed by any matching,
        // unsuppressed rule of strictly lower priority that names it.
        // Suppressed rules cannot themselves suppress.
        let mut suppressed: HashSet<&str> = HashSet::new();

        for s in &matching {
            if suppressed.contains(s.name.as_str()) {
                continue;
            }
            for r in &matching {
                if r.priority > s.priority && s.suppresses.contains(&r.name) {
                    suppressed.insert(r.name.as_str());
                }
            }
        }

        let triggered: Vec<Arc<Rule>> = matching
            .iter()
            .filter(|r| !suppressed.contains(r.name.as_str()))
            .cloned()
            .collect();

        // Queue the rule executions in order. Rules of one trigger batch
        // share an abort flag for FailOnFirstErrorInTriggerSequence.
        let abort = Arc::new(AtomicBool::new(false));

        for rule in triggered {
            let child = monitor.new_child_monitor(rule.priority);
            child.task_started();
            self.task_started();

            let proc = self.arc();
            let event = event.clone();
            let event_monitor = monitor.clone();
            let abort = abort.clone();
            let child_for_fallback = child.clone();

            let submitted = {
                let pool = self.pool.lock();
                match *pool {
                    Some(ref pool) => pool
                        .submit(move || {
                            let skip =
                                proc.fail_on_first() && abort.load(Ordering::SeqCst);

                            if !skip {
                                if let Err(err) = rule.action.fire(&event, &child) {
                                    event_monitor.record_error(&event, &rule.name, err);
                                    abort.store(true, Ordering::SeqCst);
                                }
                            }

                            child.task_done();
                            proc.task_done();
                        })
                        .is_ok(),
                    None => false,
                }
            };

            if !submitted {
                child_for_fallback.task_done();
                self.task_done();
            }
        }
    }

    fn task_started(&self) {
        *self.activity.lock() += 1;
    }

    fn task_done(&self) {
        let mut activity = self.activity.lock();
        *activity -= 1;

        if *activity == 0 {
            self.quiescent.notify_all();
        }
    }
}

// Dropping only detaches the workers; the last reference may be held by a
// worker task, which must not join its own thread. The channel closes and
// the workers exit on their own.
impl Drop for Processor {
    fn drop(&mut self) {
        self.pool.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use parking_lot::{Mutex, RwLock};

    use super::*;
    use crate::ast::{node, AstNode, Token};
    use crate::evaluator::errors::{ErrorKind, RuntimeError};
    use crate::evaluator::value::Value;
    use crate::engine::rule::RuleAction;

    type Log = Arc<Mutex<Vec<String>>>;

    struct LogAction {
        log: Log,
        msg: String,
        fail: bool,
        // Event published by this rule when it fires, for cascade tests.
        publish: Option<(String, Arc<Processor>)>,
    }

    impl RuleAction for LogAction {
        fn fire(&self, event: &Event, monitor: &Monitor) -> Result<(), RuntimeError> {
            self.log.lock().push(format!("{} > {}", self.msg, event.name()));

            if let Some((kind, proc)) = self.publish.clone() {
                let cascaded = Event::new(
                    "cascaded",
                    kind.split('.').map(|s| s.to_string()).collect(),
                    event.state().clone(),
                );
                proc.add_event(cascaded, monitor.new_child_monitor(0)).unwrap();
            }

            if self.fail {
                return Err(RuntimeError::new(
                    "test",
                    ErrorKind::RuntimeError,
                    format!("{} failed", self.msg),
                    Arc::new(AstNode::new(node::IDENTIFIER, Some(Token::new("x", 1, 1)))),
                ));
            }

            Ok(())
        }
    }

    fn log_rule(
        name: &str,
        kind_match: &str,
        priority: i64,
        suppresses: Vec<&str>,
        log: Log,
        fail: bool,
        publish: Option<(String, Arc<Processor>)>,
    ) -> Rule {
        Rule::new(
            name,
            "",
            vec![kind_match.to_string()],
            vec![],
            None,
            priority,
            suppresses.into_iter().map(|s| s.to_string()).collect(),
            Arc::new(LogAction {
                log,
                msg: name.to_string(),
                fail,
                publish,
            }),
        )
        .unwrap()
    }

    fn test_event(name: &str, kind: &str) -> Event {
        Event::new(
            name,
            kind.split('.').map(|s| s.to_string()).collect(),
            Arc::new(RwLock::new(BTreeMap::<String, Value>::new())),
        )
    }

    #[test]
    fn test_priority_ordering() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.add_rule(log_rule("zrule", "core.*", 1, vec![], log.clone(), false, None))
            .unwrap();
        proc.add_rule(log_rule("arule", "core.*", 2, vec![], log.clone(), false, None))
            .unwrap();
        proc.add_rule(log_rule("brule", "core.*", 1, vec![], log.clone(), false, None))
            .unwrap();

        proc.start();
        let monitor = proc.new_root_monitor(None);
        proc.add_event_and_wait(test_event("e1", "core.main"), monitor)
            .unwrap();

        // Same priority ties break by name.
        assert_eq!(*log.lock(), vec!["brule > e1", "zrule > e1", "arule > e1"]);
    }

    #[test]
    fn test_suppression() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.add_rule(log_rule("A", "core.*", 10, vec!["B"], log.clone(), false, None))
            .unwrap();
        proc.add_rule(log_rule("B", "core.*", 20, vec![], log.clone(), false, None))
            .unwrap();

        proc.start();
        let monitor = proc.new_root_monitor(None);
        proc.add_event_and_wait(test_event("e1", "core.main"), monitor)
            .unwrap();

        assert_eq!(*log.lock(), vec!["A > e1"]);
    }

    #[test]
    fn test_suppressed_rules_cannot_suppress() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.add_rule(log_rule("A", "core.*", 1, vec!["B"], log.clone(), false, None))
            .unwrap();
        proc.add_rule(log_rule("B", "core.*", 2, vec!["C"], log.clone(), false, None))
            .unwrap();
        proc.add_rule(log_rule("C", "core.*", 3, vec![], log.clone(), false, None))
            .unwrap();

        proc.start();
        let monitor = proc.new_root_monitor(None);
        proc.add_event_and_wait(test_event("e1", "core.main"), monitor)
            .unwrap();

        assert_eq!(*log.lock(), vec!["A > e1", "C > e1"]);
    }

    #[test]
    fn test_cascade() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.add_rule(log_rule(
            "rule1",
            "web.page.*",
            0,
            vec![],
            log.clone(),
            false,
            Some(("web.log".to_string(), proc.clone())),
        ))
        .unwrap();
        proc.add_rule(log_rule("rule3", "web.log", 0, vec![], log.clone(), false, None))
            .unwrap();

        proc.start();
        let monitor = proc.new_root_monitor(None);
        let errors = proc
            .add_event_and_wait(test_event("request", "web.page.index"), monitor)
            .unwrap();

        assert!(errors.is_empty());
        assert_eq!(*log.lock(), vec!["rule1 > request", "rule3 > cascaded"]);
    }

    #[test]
    fn test_error_capture() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.add_rule(log_rule("bad", "core.*", 0, vec![], log.clone(), true, None))
            .unwrap();
        proc.add_rule(log_rule("good", "core.*", 1, vec![], log.clone(), false, None))
            .unwrap();

        proc.start();
        let monitor = proc.new_root_monitor(None);
        let errors = proc
            .add_event_and_wait(test_event("e1", "core.main"), monitor)
            .unwrap();

        // The failing rule is reported, the other rule still ran.
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event.name(), "e1");
        assert_eq!(errors[0].errors.len(), 1);
        assert!(errors[0].errors["bad"].detail.contains("bad failed"));
        assert_eq!(*log.lock(), vec!["bad > e1", "good > e1"]);
    }

    #[test]
    fn test_fail_on_first() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.set_fail_on_first(true);
        proc.add_rule(log_rule("bad", "core.*", 0, vec![], log.clone(), true, None))
            .unwrap();
        proc.add_rule(log_rule("good", "core.*", 1, vec![], log.clone(), false, None))
            .unwrap();

        proc.start();
        let monitor = proc.new_root_monitor(None);
        let errors = proc
            .add_event_and_wait(test_event("e1", "core.main"), monitor)
            .unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(*log.lock(), vec!["bad > e1"]);
    }

    #[test]
    fn test_start_stop() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.add_rule(log_rule("r", "core.*", 0, vec![], log.clone(), false, None))
            .unwrap();

        assert!(proc.stopped());
        let monitor = proc.new_root_monitor(None);
        assert!(matches!(
            proc.add_event(test_event("e1", "core.main"), monitor),
            Err(EngineError::NotRunning)
        ));

        proc.start();
        assert!(!proc.stopped());

        let monitor = proc.new_root_monitor(None);
        proc.add_event(test_event("e2", "core.main"), monitor.clone())
            .unwrap();

        proc.stop();
        assert!(proc.stopped());
        assert!(monitor.is_finished());
        assert_eq!(*log.lock(), vec!["r > e2"]);
    }

    #[test]
    fn test_duplicate_rule() {
        let proc = Processor::new(1);
        let log: Log = Default::default();

        proc.add_rule(log_rule("r", "core.*", 0, vec![], log.clone(), false, None))
            .unwrap();
        assert!(matches!(
            proc.add_rule(log_rule("r", "core.*", 0, vec![], log, false, None)),
            Err(EngineError::DuplicateRule(_))
        ));
    }

    #[test]
    fn test_empty_kind_rejected() {
        let proc = Processor::new(1);
        proc.start();

        let monitor = proc.new_root_monitor(None);
        let event = Event::new(
            "e",
            vec![],
            Arc::new(RwLock::new(BTreeMap::<String, Value>::new())),
        );

        assert!(matches!(
            proc.add_event(event, monitor),
            Err(EngineError::EmptyKind)
        ));
    }
}
