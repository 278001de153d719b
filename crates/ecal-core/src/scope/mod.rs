//! Hierarchical variable environments.
//!
//! Scopes form a tree: reads walk up to the root, writes go to the nearest
//! ancestor that already defines the name, otherwise to the scope itself.
//! Bindings sit behind a read-write lock so the global scope can be shared
//! between concurrently running sink bodies and the debugger; child scopes
//! created per block are only ever touched by their own thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::ast::AstNode;
use crate::evaluator::value::Value;

/// Name of the root scope of an evaluation run.
pub const GLOBAL_SCOPE: &str = "GlobalScope";

pub type ScopeRef = Arc<Scope>;

pub struct Scope {
    name: String,
    parent: Option<ScopeRef>,
    self_ref: Weak<Scope>,
    children: RwLock<Vec<Weak<Scope>>>,
    // Deserialized subtrees are not owned by an evaluation frame and must
    // be kept alive by their parent.
    retained: RwLock<Vec<ScopeRef>>,
    bindings: RwLock<HashMap<String, Value>>,
}

impl Scope {
    fn build(name: String, parent: Option<ScopeRef>) -> ScopeRef {
        Arc::new_cyclic(|self_ref| Scope {
            name,
            parent,
            self_ref: self_ref.clone(),
            children: RwLock::new(Vec::new()),
            retained: RwLock::new(Vec::new()),
            bindings: RwLock::new(HashMap::new()),
        })
    }

    /// Create a new root scope.
    pub fn new(name: impl Into<String>) -> ScopeRef {
        Scope::build(name.into(), None)
    }

    /// Create a child scope and register it with its parent.
    pub fn new_child(&self, name: impl Into<String>) -> ScopeRef {
        let parent = self.self_ref.upgrade().expect("parent scope is alive");
        let child = Scope::build(name.into(), Some(parent));

        self.children.write().push(Arc::downgrade(&child));
        child
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    /// Look up a name, walking up to the root.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.bindings.read().get(name) {
            return Some(v.clone());
        }

        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// True if this scope or an ancestor defines the name.
    pub fn is_defined(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
            || self.parent.as_ref().is_some_and(|p| p.is_defined(name))
    }

    /// Write a binding into the nearest ancestor that defines the name,
    /// falling back to this scope.
    pub fn set_value(&self, name: &str, value: Value) {
        let mut scope = self;

        loop {
            if scope.bindings.read().contains_key(name) || scope.parent.is_none() {
                break;
            }
            scope = scope.parent.as_ref().unwrap();
        }

        if scope.bindings.read().contains_key(name) {
            scope.bindings.write().insert(name.to_string(), value);
        } else {
            self.bindings.write().insert(name.to_string(), value);
        }
    }

    /// Write a binding into this scope, shadowing any ancestor binding.
    pub fn set_local(&self, name: &str, value: Value) {
        self.bindings.write().insert(name.to_string(), value);
    }

    /// Snapshot of the local bindings of this scope only.
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        let mut items: Vec<(String, Value)> = self
            .bindings
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// Serialize this scope subtree to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let content: serde_json::Map<String, serde_json::Value> = self
            .local_bindings()
            .into_iter()
            .map(|(k, v)| (k, v.to_json()))
            .collect();

        let children: Vec<serde_json::Value> = self
            .live_children()
            .iter()
            .map(|c| c.to_json())
            .collect();

        let mut obj = serde_json::Map::new();
        obj.insert("name".into(), serde_json::Value::String(self.name.clone()));
        obj.insert("content".into(), serde_json::Value::Object(content));
        if !children.is_empty() {
            obj.insert("children".into(), serde_json::Value::Array(children));
        }

        serde_json::Value::Object(obj)
    }

    /// Reconstruct a scope tree from its JSON rendering.
    pub fn from_json(v: &serde_json::Value) -> ScopeRef {
        fn build(v: &serde_json::Value, parent: Option<&ScopeRef>) -> ScopeRef {
            let name = v
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or(GLOBAL_SCOPE);

            let scope = match parent {
                Some(p) => {
                    let child = p.new_child(name);
                    p.retained.write().push(child.clone());
                    child
                }
                None => Scope::new(name),
            };

            if let Some(serde_json::Value::Object(content)) = v.get("content") {
                for (k, val) in content {
                    scope.set_local(k, Value::from_json(val));
                }
            }

            if let Some(serde_json::Value::Array(children)) = v.get("children") {
                for c in children {
                    build(c, Some(&scope));
                }
            }

            scope
        }

        build(v, None)
    }

    fn live_children(&self) -> Vec<ScopeRef> {
        self.children.read().iter().filter_map(Weak::upgrade).collect()
    }

    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        let indent = "    ".repeat(level);

        writeln!(f, "{}{} {{", indent, self.name)?;

        for (name, value) in self.local_bindings() {
            writeln!(f, "{}    {} ({}) : {}", indent, name, value.type_name(), value)?;
        }

        for child in self.live_children() {
            child.fmt_level(f, level + 1)?;
        }

        write!(f, "{}}}", indent)?;
        if level > 0 {
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Indented textual dump used by `dumpenv` and the debugger:
///
/// ```text
/// GlobalScope {
///     a (number) : 123
/// }
/// ```
impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_level(f, 0)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.name)
    }
}

/// Diagnostic name for block scopes derived from the AST position.
pub fn name_from_ast_node(node: &AstNode) -> String {
    format!("block: {} (Line:{} Pos:{})", node.name, node.line(), node.pos())
}
