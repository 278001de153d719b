//! Cascade monitors.
//!
//! Every top-level event submission creates a root monitor. Rules
//! triggered by the event run under child monitors, and events they
//! publish themselves run under further children, mirroring the cascade as
//! a tree. All activity and all rule errors are accounted at the root, so
//! a caller can block until the whole cascade terminated and collect the
//! failures grouped by event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::engine::event::Event;
use crate::engine::rule::RuleScope;
use crate::evaluator::errors::RuntimeError;

/// Errors of one event: the rules which failed while handling it.
#[derive(Debug, Clone)]
pub struct EventErrors {
    pub event: Event,
    pub errors: BTreeMap<String, RuntimeError>,
}

struct RootState {
    rule_scope: RuleScope,
    ids: AtomicU64,
    activity: Mutex<usize>,
    finished: Condvar,
    errors: Mutex<Vec<(u64, EventErrors)>>,
}

/// Handle on a node of a monitor tree. Clones share the underlying
/// cascade accounting.
#[derive(Clone)]
pub struct Monitor {
    id: u64,
    parent: Option<u64>,
    priority: i64,
    root: Arc<RootState>,
}

impl Monitor {
    /// Create the root monitor of a new cascade.
    pub fn new_root(rule_scope: RuleScope) -> Monitor {
        let root = Arc::new(RootState {
            rule_scope,
            ids: AtomicU64::new(2),
            activity: Mutex::new(0),
            finished: Condvar::new(),
            errors: Mutex::new(Vec::new()),
        });

        Monitor {
            id: 1,
            parent: None,
            priority: 0,
            root,
        }
    }

    /// Create a child monitor sharing this monitor's root.
    pub fn new_child_monitor(&self, priority: i64) -> Monitor {
        Monitor {
            id: self.root.ids.fetch_add(1, Ordering::SeqCst),
            parent: Some(self.id),
            priority,
            root: self.root.clone(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn rule_scope(&self) -> &RuleScope {
        &self.root.rule_scope
    }

    /// Account a queued task belonging to this cascade.
    pub fn task_started(&self) {
        *self.root.activity.lock() += 1;
    }

    /// Account a finished task; wakes waiters when the cascade is done.
    pub fn task_done(&self) {
        let mut activity = self.root.activity.lock();
        *activity -= 1;

        if *activity == 0 {
            self.root.finished.notify_all();
        }
    }

    /// Record a rule failure for an event handled under this monitor.
    pub fn record_error(&self, event: &Event, rule_name: &str, err: RuntimeError) {
        let mut errors = self.root.errors.lock();

        if let Some((_, entry)) = errors.iter_mut().find(|(id, _)| *id == self.id) {
            entry.errors.insert(rule_name.to_string(), err);
        } else {
            let mut map = BTreeMap::new();
            map.insert(rule_name.to_string(), err);
            errors.push((
                self.id,
                EventErrors {
                    event: event.clone(),
                    errors: map,
                },
            ));
        }
    }

    /// True once all tasks of the cascade have finished.
    pub fn is_finished(&self) -> bool {
        *self.root.activity.lock() == 0
    }

    /// Block until the cascade has terminated.
    pub fn wait_finished(&self) {
        let mut activity = self.root.activity.lock();
        while *activity > 0 {
            self.root.finished.wait(&mut activity);
        }
    }

    /// All rule errors of the cascade, grouped by event in submission
    /// order.
    pub fn all_errors(&self) -> Vec<EventErrors> {
        self.root
            .errors
            .lock()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// True if any rule of the cascade failed so far.
    pub fn has_errors(&self) -> bool {
        !self.root.errors.lock().is_empty()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            None => write!(f, "RootMonitor {}", self.id),
            Some(p) => write!(f, "ChildMonitor {} (parent:{})", self.id, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::RwLock;

    use super::*;
    use crate::ast::{node, AstNode, Token};
    use crate::evaluator::errors::ErrorKind;

    fn test_event(name: &str) -> Event {
        Event::new(
            name,
            vec!["core".into()],
            Arc::new(RwLock::new(Default::default())),
        )
    }

    fn test_error(detail: &str) -> RuntimeError {
        RuntimeError::new(
            "test",
            ErrorKind::RuntimeError,
            detail,
            Arc::new(AstNode::new(node::IDENTIFIER, Some(Token::new("x", 1, 1)))),
        )
    }

    #[test]
    fn test_monitor_tree() {
        let root = Monitor::new_root(RuleScope::default());
        assert!(root.is_root());
        assert_eq!(root.parent_id(), None);

        let child = root.new_child_monitor(5);
        assert!(!child.is_root());
        assert_eq!(child.parent_id(), Some(root.id()));
        assert_eq!(child.priority(), 5);

        let grandchild = child.new_child_monitor(0);
        assert_eq!(grandchild.parent_id(), Some(child.id()));
        assert_ne!(grandchild.id(), child.id());
    }

    #[test]
    fn test_error_accumulation() {
        let root = Monitor::new_root(RuleScope::default());
        let m1 = root.new_child_monitor(0);
        let m2 = root.new_child_monitor(0);

        let e1 = test_event("first");
        let e2 = test_event("second");

        m1.record_error(&e1, "ruleB", test_error("b"));
        m1.record_error(&e1, "ruleA", test_error("a"));
        m2.record_error(&e2, "ruleC", test_error("c"));

        let all = root.all_errors();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event.name(), "first");
        assert_eq!(
            all[0].errors.keys().cloned().collect::<Vec<_>>(),
            vec!["ruleA", "ruleB"]
        );
        assert_eq!(all[1].event.name(), "second");
        assert!(root.has_errors());
    }

    #[test]
    fn test_activity_accounting() {
        let root = Monitor::new_root(RuleScope::default());
        assert!(root.is_finished());

        root.task_started();
        root.task_started();
        assert!(!root.is_finished());

        let waiter = {
            let m = root.clone();
            std::thread::spawn(move || m.wait_finished())
        };

        root.task_done();
        root.task_done();
        waiter.join().unwrap();
        assert!(root.is_finished());
    }
}
