//! Events processed by the engine.

use std::fmt;

use crate::evaluator::value::{MapRef, Value};

/// An immutable event record. The kind is an ordered sequence of path
/// segments which rules match with glob patterns.
#[derive(Clone)]
pub struct Event {
    name: String,
    kind: Vec<String>,
    state: MapRef,
}

impl Event {
    pub fn new(name: impl Into<String>, kind: Vec<String>, state: MapRef) -> Event {
        Event {
            name: name.into(),
            kind,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &[String] {
        &self.kind
    }

    pub fn state(&self) -> &MapRef {
        &self.state
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event: {} (kind:{} state:{})",
            self.name,
            self.kind.join("."),
            Value::Map(self.state.clone())
        )
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use parking_lot::RwLock;

    use super::*;

    #[test]
    fn test_event_rendering() {
        let mut state = BTreeMap::new();
        state.insert("user".to_string(), Value::str("foo"));

        let e = Event::new(
            "request",
            vec!["web".into(), "page".into(), "index".into()],
            Arc::new(RwLock::new(state)),
        );

        assert_eq!(e.name(), "request");
        assert_eq!(e.kind().join("."), "web.page.index");
        assert_eq!(
            e.to_string(),
            r#"Event: request (kind:web.page.index state:{"user":"foo"})"#
        );
    }
}
