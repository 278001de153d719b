//! Rules (sinks) and rule scopes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::engine::event::Event;
use crate::engine::monitor::Monitor;
use crate::engine::EngineError;
use crate::evaluator::errors::RuntimeError;
use crate::evaluator::value::Value;

/// Capabilities active for a submitted event. Rules whose `scope_match`
/// names a capability only trigger if it is present and true.
#[derive(Debug, Clone, Default)]
pub struct RuleScope {
    scopes: HashMap<String, bool>,
}

impl RuleScope {
    pub fn new(scopes: HashMap<String, bool>) -> RuleScope {
        RuleScope { scopes }
    }

    pub fn set_state(&mut self, name: impl Into<String>, active: bool) {
        self.scopes.insert(name.into(), active);
    }

    /// True if every required capability is present and active.
    pub fn is_covered(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|r| self.scopes.get(r).copied().unwrap_or(false))
    }
}

/// The executable part of a rule.
pub trait RuleAction: Send + Sync {
    fn fire(&self, event: &Event, monitor: &Monitor) -> Result<(), RuntimeError>;
}

/// A named event handler with matching criteria.
pub struct Rule {
    pub name: String,
    pub doc: String,
    pub kind_match: Vec<String>,
    pub scope_match: Vec<String>,
    pub state_match: Option<BTreeMap<String, Value>>,
    /// Lower priorities run earlier.
    pub priority: i64,
    /// Names of rules this rule cancels when both match.
    pub suppresses: Vec<String>,
    pub action: Arc<dyn RuleAction>,
    matchers: Vec<Regex>,
}

impl Rule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        doc: impl Into<String>,
        kind_match: Vec<String>,
        scope_match: Vec<String>,
        state_match: Option<BTreeMap<String, Value>>,
        priority: i64,
        suppresses: Vec<String>,
        action: Arc<dyn RuleAction>,
    ) -> Result<Rule, EngineError> {
        let matchers = kind_match
            .iter()
            .map(|p| {
                Regex::new(&glob_to_regex(p)).map_err(|_| EngineError::InvalidPattern(p.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Rule {
            name: name.into(),
            doc: doc.into(),
            kind_match,
            scope_match,
            state_match,
            priority,
            suppresses,
            action,
            matchers,
        })
    }

    /// A rule matches an event iff one kind pattern matches the dotted
    /// kind path, all required capabilities are active and all state
    /// requirements hold (a null requirement accepts any present key).
    pub fn matches(&self, event: &Event, scope: &RuleScope) -> bool {
        let kind = event.kind().join(".");

        if !self.matchers.iter().any(|m| m.is_match(&kind)) {
            return false;
        }

        if !scope.is_covered(&self.scope_match) {
            return false;
        }

        if let Some(ref required) = self.state_match {
            let state = event.state().read();

            for (key, want) in required {
                match state.get(key) {
                    None => return false,
                    Some(_) if *want == Value::Null => {}
                    Some(got) if got == want => {}
                    Some(_) => return false,
                }
            }
        }

        true
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_match = match self.state_match {
            Some(ref m) => {
                let entries: std::collections::BTreeMap<String, serde_json::Value> =
                    m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::to_string(&entries).map_err(|_| fmt::Error)?
            }
            None => "null".to_string(),
        };

        write!(
            f,
            "Rule:{} [{}] (Priority:{} Kind:[{}] Scope:[{}] StateMatch:{} Suppress:[{}])",
            self.name,
            self.doc,
            self.priority,
            self.kind_match.join(" "),
            self.scope_match.join(" "),
            state_match,
            self.suppresses.join(" ")
        )
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Translate a kind glob (`*` and `?` wildcards) into an anchored regex.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    out.push('^');

    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if "\\.+()[]{}^$|".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use parking_lot::RwLock;

    use super::*;

    struct NoAction;

    impl RuleAction for NoAction {
        fn fire(&self, _event: &Event, _monitor: &Monitor) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn test_event(kind: &str, state: Vec<(&str, Value)>) -> Event {
        let state: BTreeMap<String, Value> = state
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Event::new(
            "test",
            kind.split('.').map(|s| s.to_string()).collect(),
            Arc::new(RwLock::new(state)),
        )
    }

    fn test_rule(
        kind_match: Vec<&str>,
        scope_match: Vec<&str>,
        state_match: Option<Vec<(&str, Value)>>,
    ) -> Rule {
        Rule::new(
            "r",
            "",
            kind_match.into_iter().map(|s| s.to_string()).collect(),
            scope_match.into_iter().map(|s| s.to_string()).collect(),
            state_match.map(|m| m.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
            0,
            vec![],
            Arc::new(NoAction),
        )
        .unwrap()
    }

    #[test]
    fn test_kind_matching() {
        let scope = RuleScope::default();

        let r = test_rule(vec!["web.page.*"], vec![], None);
        assert!(r.matches(&test_event("web.page.index", vec![]), &scope));
        assert!(r.matches(&test_event("web.page.sub.index", vec![]), &scope));
        assert!(!r.matches(&test_event("web.log", vec![]), &scope));

        let r = test_rule(vec!["web.?og"], vec![], None);
        assert!(r.matches(&test_event("web.log", vec![]), &scope));
        assert!(!r.matches(&test_event("web.loog", vec![]), &scope));

        let r = test_rule(vec!["a.b", "c.*"], vec![], None);
        assert!(r.matches(&test_event("c.d", vec![]), &scope));
        assert!(!r.matches(&test_event("a.c", vec![]), &scope));
    }

    #[test]
    fn test_scope_matching() {
        let r = test_rule(vec!["core.*"], vec!["data.write"], None);
        let event = test_event("core.main", vec![]);

        // Absent capability means mismatch.
        assert!(!r.matches(&event, &RuleScope::default()));

        let mut scope = RuleScope::default();
        scope.set_state("data.write", false);
        assert!(!r.matches(&event, &scope));

        scope.set_state("data.write", true);
        assert!(r.matches(&event, &scope));
    }

    #[test]
    fn test_state_matching() {
        let scope = RuleScope::default();

        let r = test_rule(vec!["core.*"], vec![], Some(vec![("val", Value::Null)]));
        assert!(r.matches(&test_event("core.a", vec![("val", Value::Number(1.0))]), &scope));
        assert!(!r.matches(&test_event("core.a", vec![]), &scope));

        let r = test_rule(vec!["core.*"], vec![], Some(vec![("user", Value::str("foo"))]));
        assert!(r.matches(&test_event("core.a", vec![("user", Value::str("foo"))]), &scope));
        assert!(!r.matches(&test_event("core.a", vec![("user", Value::str("bar"))]), &scope));
    }

    #[test]
    fn test_rule_rendering() {
        let mut state_match = BTreeMap::new();
        state_match.insert("val".to_string(), Value::Null);

        let r = Rule::new(
            "rule1",
            "My cool rule",
            vec!["core.*".into()],
            vec!["data.write".into()],
            Some(state_match),
            10,
            vec!["rule2".into()],
            Arc::new(NoAction),
        )
        .unwrap();

        assert_eq!(
            r.to_string(),
            r#"Rule:rule1 [My cool rule] (Priority:10 Kind:[core.*] Scope:[data.write] StateMatch:{"val":null} Suppress:[rule2])"#
        );
    }
}
