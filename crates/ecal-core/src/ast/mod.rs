//! Abstract syntax tree for ECAL.
//!
//! The parser produces trees of labeled [`AstNode`]s. Node labels are the
//! contract between the parser and the evaluator: the runtime registry maps
//! every label to an evaluator constructor, so the label set below is the
//! complete list of constructs the language knows about.

use std::fmt;
use std::sync::Arc;

/// Node labels produced by the parser.
pub mod node {
    pub const EOF: &str = "EOF";

    pub const STRING: &str = "string";
    pub const NUMBER: &str = "number";
    pub const IDENTIFIER: &str = "identifier";

    // Constructed tokens
    pub const STATEMENTS: &str = "statements";
    pub const FUNCCALL: &str = "funccall";
    pub const COMPACCESS: &str = "compaccess";
    pub const LIST: &str = "list";
    pub const MAP: &str = "map";
    pub const PARAMS: &str = "params";
    pub const GUARD: &str = "guard";

    // Condition operators
    pub const GEQ: &str = ">=";
    pub const LEQ: &str = "<=";
    pub const NEQ: &str = "!=";
    pub const EQ: &str = "==";
    pub const GT: &str = ">";
    pub const LT: &str = "<";

    // Separators
    pub const KVP: &str = "kvp";
    pub const PRESET: &str = "preset";

    // Arithmetic operators
    pub const PLUS: &str = "plus";
    pub const MINUS: &str = "minus";
    pub const TIMES: &str = "times";
    pub const DIV: &str = "div";
    pub const DIVINT: &str = "divint";
    pub const MODINT: &str = "modint";

    // Assignment statement
    pub const ASSIGN: &str = ":=";

    // Import statement
    pub const IMPORT: &str = "import";

    // Sink definition
    pub const SINK: &str = "sink";
    pub const KINDMATCH: &str = "kindmatch";
    pub const SCOPEMATCH: &str = "scopematch";
    pub const STATEMATCH: &str = "statematch";
    pub const PRIORITY: &str = "priority";
    pub const SUPPRESSES: &str = "suppresses";

    // Function definition
    pub const FUNC: &str = "func";
    pub const RETURN: &str = "return";

    // Boolean operators
    pub const OR: &str = "or";
    pub const AND: &str = "and";
    pub const NOT: &str = "not";

    // Condition operators
    pub const LIKE: &str = "like";
    pub const IN: &str = "in";
    pub const HASPREFIX: &str = "hasprefix";
    pub const HASSUFFIX: &str = "hassuffix";
    pub const NOTIN: &str = "notin";

    // Constant terminals
    pub const FALSE: &str = "false";
    pub const TRUE: &str = "true";
    pub const NULL: &str = "null";

    // Conditional statements
    pub const IF: &str = "if";

    // Loop statements
    pub const LOOP: &str = "loop";
    pub const BREAK: &str = "break";
    pub const CONTINUE: &str = "continue";
}

/// Source token attached to terminal nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text after escape processing.
    pub value: String,
    /// 1-based line of the token, 0 if unknown.
    pub line: usize,
    /// 1-based column of the token, 0 if unknown.
    pub pos: usize,
    /// String literals with escape processing may also contain `{{ }}`
    /// interpolation fragments.
    pub allow_escapes: bool,
}

impl Token {
    pub fn new(value: impl Into<String>, line: usize, pos: usize) -> Self {
        Token {
            value: value.into(),
            line,
            pos,
            allow_escapes: false,
        }
    }
}

/// A node of the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    /// Node label, one of the constants in [`node`].
    pub name: &'static str,
    /// Token for terminal nodes.
    pub token: Option<Token>,
    /// Docstring attached to this node (block comment before a sink).
    pub doc: Option<String>,
    pub children: Vec<Arc<AstNode>>,
}

impl AstNode {
    pub fn new(name: &'static str, token: Option<Token>) -> Self {
        AstNode {
            name,
            token,
            doc: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(
        name: &'static str,
        token: Option<Token>,
        children: Vec<Arc<AstNode>>,
    ) -> Self {
        AstNode {
            name,
            token,
            doc: None,
            children,
        }
    }

    /// Line of the underlying token, 0 if the node carries no position.
    pub fn line(&self) -> usize {
        self.token.as_ref().map(|t| t.line).unwrap_or(0)
    }

    /// Column of the underlying token, 0 if the node carries no position.
    pub fn pos(&self) -> usize {
        self.token.as_ref().map(|t| t.pos).unwrap_or(0)
    }

    /// Token text of this node, empty if the node carries no token.
    pub fn token_value(&self) -> &str {
        self.token.as_ref().map(|t| t.value.as_str()).unwrap_or("")
    }

    /// Single line description of this node used in error traces and
    /// debugger output.
    pub fn describe(&self) -> String {
        match self.token {
            Some(ref t) if self.name == node::STRING => format!("{}: '{}'", self.name, t.value),
            Some(ref t) if !t.value.is_empty() && t.value != self.name => {
                format!("{}: {}", self.name, t.value)
            }
            _ => self.name.to_string(),
        }
    }

    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        for _ in 0..level {
            write!(f, "  ")?;
        }

        if let Some(ref doc) = self.doc {
            writeln!(f, "{} # \n{}\n", self.name, doc)?;
        } else {
            writeln!(f, "{}", self.describe())?;
        }

        for child in &self.children {
            child.fmt_level(f, level + 1)?;
        }

        Ok(())
    }
}

/// Indented tree rendering, matching the output used in tests:
///
/// ```text
/// statements
///   import
///     string: 'foo/bar'
///     identifier: foobar
/// ```
impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_level(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_describe() {
        let mut n = AstNode::new(node::IDENTIFIER, Some(Token::new("foo", 1, 1)));
        assert_eq!(n.describe(), "identifier: foo");

        n = AstNode::new(node::STRING, Some(Token::new("a b", 1, 1)));
        assert_eq!(n.describe(), "string: 'a b'");

        n = AstNode::new(node::BREAK, Some(Token::new("break", 2, 3)));
        assert_eq!(n.describe(), "break");
        assert_eq!(n.line(), 2);
        assert_eq!(n.pos(), 3);
    }

    #[test]
    fn test_tree_rendering() {
        let ident = Arc::new(AstNode::new(
            node::IDENTIFIER,
            Some(Token::new("foobar", 1, 21)),
        ));
        let path = Arc::new(AstNode::new(node::STRING, Some(Token::new("foo/bar", 1, 8))));
        let import = Arc::new(AstNode::with_children(
            node::IMPORT,
            Some(Token::new("import", 1, 1)),
            vec![path, ident],
        ));
        let root = AstNode::with_children(node::STATEMENTS, None, vec![import]);

        assert_eq!(
            root.to_string(),
            "statements\n  import\n    string: 'foo/bar'\n    identifier: foobar\n"
        );
    }
}
