//! Parser producing labeled AST trees.
//!
//! The grammar is newline sensitive: statements are separated by newlines
//! or semicolons, while newlines inside parentheses, brackets, braces and
//! after operators continue the construct. `parse` produces a plain AST,
//! `parse_with_runtime` additionally attaches the evaluator tree of a
//! runtime provider.

pub mod lexer;

use std::fmt;
use std::sync::Arc;

use crate::ast::{node, AstNode, Token};
use crate::evaluator::{EcalRuntimeProvider, NodeRuntime};
use crate::parser::lexer::{tokenize, LexToken, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub source: String,
    pub detail: String,
    pub line: usize,
    pub pos: usize,
}

impl ParseError {
    pub fn new(
        source: impl Into<String>,
        detail: impl Into<String>,
        line: usize,
        pos: usize,
    ) -> ParseError {
        ParseError {
            source: source.into(),
            detail: detail.into(),
            line,
            pos,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error in {}: {} (Line:{} Pos:{})",
            self.source, self.detail, self.line, self.pos
        )
    }
}

impl std::error::Error for ParseError {}

/// Parse source text into an AST.
pub fn parse(source_name: &str, input: &str) -> Result<Arc<AstNode>, ParseError> {
    let tokens = tokenize(source_name, input)?;

    let mut parser = Parser {
        source: source_name.to_string(),
        tokens,
        idx: 0,
    };

    parser.parse_program()
}

/// Parse source text and build the runtime tree for it.
pub fn parse_with_runtime(
    source_name: &str,
    input: &str,
    erp: &Arc<EcalRuntimeProvider>,
) -> Result<Arc<dyn NodeRuntime>, ParseError> {
    let ast = parse(source_name, input)?;
    Ok(erp.runtime(&ast))
}

const KEYWORDS: &[&str] = &[
    "import", "as", "sink", "kindmatch", "scopematch", "statematch", "priority", "suppresses",
    "func", "return", "if", "elif", "else", "for", "break", "continue", "and", "or", "not",
    "like", "hasPrefix", "hasSuffix", "in", "notin", "true", "false", "null",
];

enum ChainOp {
    Member(LexToken, String),
    Call(Vec<Arc<AstNode>>, usize, usize),
    Index(Arc<AstNode>, usize, usize),
}

struct Parser {
    source: String,
    tokens: Vec<LexToken>,
    idx: usize,
}

impl Parser {
    // Token stream helpers

    fn peek(&self) -> &LexToken {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn next(&mut self) -> LexToken {
        let t = self.tokens[self.idx.min(self.tokens.len() - 1)].clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        t
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline) {
            self.next();
        }
    }

    fn error(&self, detail: impl Into<String>, token: &LexToken) -> ParseError {
        ParseError::new(&self.source, detail, token.line, token.pos)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<LexToken, ParseError> {
        let t = self.next();
        if t.kind != kind {
            return Err(self.error(format!("Expected {}", what), &t));
        }
        Ok(t)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.peek().ident() == Some(kw)
    }

    fn accept_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.next();
            return true;
        }
        false
    }

    fn expect_identifier(&mut self) -> Result<LexToken, ParseError> {
        let t = self.next();
        match t.ident() {
            Some(name) if !KEYWORDS.contains(&name) => Ok(t),
            _ => Err(self.error("Expected an identifier", &t)),
        }
    }

    fn token_of(&self, t: &LexToken, value: &str) -> Token {
        Token::new(value, t.line, t.pos)
    }

    // Grammar

    fn parse_program(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let statements = self.parse_statements(false)?;

        let t = self.next();
        if t.kind != TokenKind::Eof {
            return Err(self.error("Unexpected input after last statement", &t));
        }

        Ok(statements)
    }

    fn parse_statements(&mut self, in_block: bool) -> Result<Arc<AstNode>, ParseError> {
        let mut stmts = Vec::new();

        loop {
            while matches!(
                self.peek_kind(),
                TokenKind::Newline | TokenKind::Semicolon
            ) {
                self.next();
            }

            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::RBrace if in_block => break,
                _ => {}
            }

            stmts.push(self.parse_statement()?);

            match self.peek_kind() {
                TokenKind::Newline | TokenKind::Semicolon => {}
                TokenKind::Eof => {}
                TokenKind::RBrace if in_block => {}
                _ => {
                    let t = self.peek().clone();
                    return Err(self.error("Expected end of statement", &t));
                }
            }
        }

        Ok(Arc::new(AstNode::with_children(
            node::STATEMENTS,
            None,
            stmts,
        )))
    }

    fn parse_block(&mut self) -> Result<Arc<AstNode>, ParseError> {
        self.skip_newlines();
        self.expect(TokenKind::LBrace, "'{'")?;
        let statements = self.parse_statements(true)?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let keyword = self.peek().ident().map(|s| s.to_string());

        match keyword.as_deref() {
            Some("import") => self.parse_import(),
            Some("sink") => self.parse_sink(),
            Some("func") => self.parse_func(),
            Some("if") => self.parse_if(),
            Some("for") => self.parse_loop(),
            Some("break") => {
                let t = self.next();
                Ok(Arc::new(AstNode::new(
                    node::BREAK,
                    Some(self.token_of(&t, "break")),
                )))
            }
            Some("continue") => {
                let t = self.next();
                Ok(Arc::new(AstNode::new(
                    node::CONTINUE,
                    Some(self.token_of(&t, "continue")),
                )))
            }
            Some("return") => {
                let t = self.next();
                let mut children = Vec::new();

                if !matches!(
                    self.peek_kind(),
                    TokenKind::Newline
                        | TokenKind::Semicolon
                        | TokenKind::RBrace
                        | TokenKind::Eof
                ) {
                    children.push(self.parse_expr()?);
                }

                Ok(Arc::new(AstNode::with_children(
                    node::RETURN,
                    Some(self.token_of(&t, "return")),
                    children,
                )))
            }
            _ => {
                let expr = self.parse_expr()?;

                if matches!(self.peek_kind(), TokenKind::Assign) {
                    let t = self.next();
                    self.skip_newlines();
                    let rhs = self.parse_expr()?;

                    return Ok(Arc::new(AstNode::with_children(
                        node::ASSIGN,
                        Some(self.token_of(&t, ":=")),
                        vec![expr, rhs],
                    )));
                }

                Ok(expr)
            }
        }
    }

    fn parse_import(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let t = self.next(); // import

        let path = self.next();
        let path_node = match path.kind {
            TokenKind::Str { ref value, .. } => Arc::new(AstNode::new(
                node::STRING,
                Some(self.token_of(&path, value)),
            )),
            _ => return Err(self.error("Expected an import path string", &path)),
        };

        if !self.accept_keyword("as") {
            let t = self.peek().clone();
            return Err(self.error("Expected 'as'", &t));
        }

        let id = self.expect_identifier()?;
        let id_value = id.ident().unwrap().to_string();
        let id_node = Arc::new(AstNode::new(
            node::IDENTIFIER,
            Some(self.token_of(&id, &id_value)),
        ));

        Ok(Arc::new(AstNode::with_children(
            node::IMPORT,
            Some(self.token_of(&t, "import")),
            vec![path_node, id_node],
        )))
    }

    fn parse_sink(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let t = self.next(); // sink
        let doc = t.doc.clone();

        let id = self.expect_identifier()?;
        let id_value = id.ident().unwrap().to_string();

        let mut children = vec![Arc::new(AstNode::new(
            node::IDENTIFIER,
            Some(self.token_of(&id, &id_value)),
        ))];

        loop {
            self.skip_newlines();

            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.next();
                continue;
            }

            let clause = match self.peek().ident() {
                Some("kindmatch") => node::KINDMATCH,
                Some("scopematch") => node::SCOPEMATCH,
                Some("statematch") => node::STATEMATCH,
                Some("priority") => node::PRIORITY,
                Some("suppresses") => node::SUPPRESSES,
                _ => break,
            };

            let ct = self.next();
            self.skip_newlines();
            let value = self.parse_expr()?;

            children.push(Arc::new(AstNode::with_children(
                clause,
                Some(self.token_of(&ct, clause)),
                vec![value],
            )));
        }

        children.push(self.parse_block()?);

        let mut sink = AstNode::with_children(node::SINK, Some(self.token_of(&t, "sink")), children);
        sink.doc = doc;

        Ok(Arc::new(sink))
    }

    fn parse_func(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let t = self.next(); // func

        let mut children = Vec::new();

        let named = matches!(self.peek().ident(), Some(name) if !KEYWORDS.contains(&name));
        if named {
            let id = self.next();
            let id_value = id.ident().unwrap().to_string();
            children.push(Arc::new(AstNode::new(
                node::IDENTIFIER,
                Some(self.token_of(&id, &id_value)),
            )));
        }

        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();

        loop {
            self.skip_newlines();

            if matches!(self.peek_kind(), TokenKind::RParen) {
                break;
            }

            let id = self.expect_identifier()?;
            let id_value = id.ident().unwrap().to_string();
            let id_node = Arc::new(AstNode::new(
                node::IDENTIFIER,
                Some(self.token_of(&id, &id_value)),
            ));

            if matches!(self.peek_kind(), TokenKind::Equals) {
                let et = self.next();
                self.skip_newlines();
                let default = self.parse_expr()?;
                params.push(Arc::new(AstNode::with_children(
                    node::PRESET,
                    Some(self.token_of(&et, "preset")),
                    vec![id_node, default],
                )));
            } else {
                params.push(id_node);
            }

            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.next();
            }
        }

        self.expect(TokenKind::RParen, "')'")?;

        children.push(Arc::new(AstNode::with_children(
            node::PARAMS,
            Some(self.token_of(&t, "params")),
            params,
        )));
        children.push(self.parse_block()?);

        let mut func = AstNode::with_children(node::FUNC, Some(self.token_of(&t, "func")), children);
        func.doc = t.doc.clone();

        Ok(Arc::new(func))
    }

    fn parse_if(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let t = self.next(); // if
        let if_token = self.token_of(&t, "if");

        let mut children = Vec::new();

        let cond = self.parse_expr()?;
        children.push(self.guard(cond, &t));
        children.push(self.parse_block()?);

        loop {
            // Look past newlines for elif / else continuation.
            let mark = self.idx;
            self.skip_newlines();

            if self.at_keyword("elif") {
                let et = self.next();
                let cond = self.parse_expr()?;
                children.push(self.guard(cond, &et));
                children.push(self.parse_block()?);
            } else if self.at_keyword("else") {
                let et = self.next();
                let true_node = Arc::new(AstNode::new(
                    node::TRUE,
                    Some(self.token_of(&et, "true")),
                ));
                children.push(self.guard(true_node, &et));
                children.push(self.parse_block()?);
                break;
            } else {
                self.idx = mark;
                break;
            }
        }

        Ok(Arc::new(AstNode::with_children(
            node::IF,
            Some(if_token),
            children,
        )))
    }

    fn guard(&self, cond: Arc<AstNode>, t: &LexToken) -> Arc<AstNode> {
        Arc::new(AstNode::with_children(
            node::GUARD,
            Some(self.token_of(t, "guard")),
            vec![cond],
        ))
    }

    fn parse_loop(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let t = self.next(); // for

        let header = self.parse_expr()?;

        let header = if header.name == node::IN {
            header
        } else {
            self.guard(header, &t)
        };

        let body = self.parse_block()?;

        Ok(Arc::new(AstNode::with_children(
            node::LOOP,
            Some(self.token_of(&t, "loop")),
            vec![header, body],
        )))
    }

    // Expressions

    fn parse_expr(&mut self) -> Result<Arc<AstNode>, ParseError> {
        self.parse_or()
    }

    fn binary(
        &self,
        label: &'static str,
        t: &LexToken,
        value: &str,
        lhs: Arc<AstNode>,
        rhs: Arc<AstNode>,
    ) -> Arc<AstNode> {
        Arc::new(AstNode::with_children(
            label,
            Some(self.token_of(t, value)),
            vec![lhs, rhs],
        ))
    }

    fn parse_or(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let mut lhs = self.parse_and()?;

        while self.at_keyword("or") {
            let t = self.next();
            self.skip_newlines();
            let rhs = self.parse_and()?;
            lhs = self.binary(node::OR, &t, "or", lhs, rhs);
        }

        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let mut lhs = self.parse_not()?;

        while self.at_keyword("and") {
            let t = self.next();
            self.skip_newlines();
            let rhs = self.parse_not()?;
            lhs = self.binary(node::AND, &t, "and", lhs, rhs);
        }

        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Arc<AstNode>, ParseError> {
        if self.at_keyword("not") {
            let t = self.next();
            let operand = self.parse_not()?;
            return Ok(Arc::new(AstNode::with_children(
                node::NOT,
                Some(self.token_of(&t, "not")),
                vec![operand],
            )));
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let lhs = self.parse_arith()?;

        let (label, value): (&'static str, &str) = match self.peek_kind() {
            TokenKind::Eq => (node::EQ, "=="),
            TokenKind::Neq => (node::NEQ, "!="),
            TokenKind::Geq => (node::GEQ, ">="),
            TokenKind::Leq => (node::LEQ, "<="),
            TokenKind::Gt => (node::GT, ">"),
            TokenKind::Lt => (node::LT, "<"),
            TokenKind::Ident(ref s) if s == "like" => (node::LIKE, "like"),
            TokenKind::Ident(ref s) if s == "hasPrefix" => (node::HASPREFIX, "hasprefix"),
            TokenKind::Ident(ref s) if s == "hasSuffix" => (node::HASSUFFIX, "hassuffix"),
            TokenKind::Ident(ref s) if s == "in" => (node::IN, "in"),
            TokenKind::Ident(ref s) if s == "notin" => (node::NOTIN, "notin"),
            _ => return Ok(lhs),
        };

        let t = self.next();
        self.skip_newlines();
        let rhs = self.parse_arith()?;

        Ok(self.binary(label, &t, value, lhs, rhs))
    }

    fn parse_arith(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let mut lhs = self.parse_term()?;

        loop {
            let (label, value): (&'static str, &str) = match self.peek_kind() {
                TokenKind::Plus => (node::PLUS, "plus"),
                TokenKind::Minus => (node::MINUS, "minus"),
                _ => return Ok(lhs),
            };

            let t = self.next();
            self.skip_newlines();
            let rhs = self.parse_term()?;
            lhs = self.binary(label, &t, value, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let mut lhs = self.parse_factor()?;

        loop {
            let (label, value): (&'static str, &str) = match self.peek_kind() {
                TokenKind::Star => (node::TIMES, "times"),
                TokenKind::Slash => (node::DIV, "div"),
                TokenKind::DoubleSlash => (node::DIVINT, "divint"),
                TokenKind::Percent => (node::MODINT, "modint"),
                _ => return Ok(lhs),
            };

            let t = self.next();
            self.skip_newlines();
            let rhs = self.parse_factor()?;
            lhs = self.binary(label, &t, value, lhs, rhs);
        }
    }

    fn parse_factor(&mut self) -> Result<Arc<AstNode>, ParseError> {
        match self.peek_kind() {
            TokenKind::Minus => {
                let t = self.next();
                let operand = self.parse_factor()?;
                Ok(Arc::new(AstNode::with_children(
                    node::MINUS,
                    Some(self.token_of(&t, "minus")),
                    vec![operand],
                )))
            }
            TokenKind::Plus => {
                self.next();
                self.parse_factor()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Arc<AstNode>, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Number(value) => {
                let t = self.next();
                Ok(Arc::new(AstNode::new(
                    node::NUMBER,
                    Some(self.token_of(&t, &value)),
                )))
            }
            TokenKind::Str {
                value,
                allow_escapes,
            } => {
                let t = self.next();
                let mut token = self.token_of(&t, &value);
                token.allow_escapes = allow_escapes;
                Ok(Arc::new(AstNode::new(node::STRING, Some(token))))
            }
            TokenKind::LParen => {
                self.next();
                self.skip_newlines();
                let expr = self.parse_expr()?;
                self.skip_newlines();
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_map(),
            TokenKind::Ident(name) => match name.as_str() {
                "true" => {
                    let t = self.next();
                    Ok(Arc::new(AstNode::new(
                        node::TRUE,
                        Some(self.token_of(&t, "true")),
                    )))
                }
                "false" => {
                    let t = self.next();
                    Ok(Arc::new(AstNode::new(
                        node::FALSE,
                        Some(self.token_of(&t, "false")),
                    )))
                }
                "null" => {
                    let t = self.next();
                    Ok(Arc::new(AstNode::new(
                        node::NULL,
                        Some(self.token_of(&t, "null")),
                    )))
                }
                "func" => self.parse_func(),
                _ if KEYWORDS.contains(&name.as_str()) => {
                    let t = self.peek().clone();
                    Err(self.error(format!("Unexpected keyword '{}'", name), &t))
                }
                _ => self.parse_identifier(),
            },
            _ => {
                let t = self.peek().clone();
                Err(self.error("Expected an expression", &t))
            }
        }
    }

    fn parse_list(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let t = self.expect(TokenKind::LBracket, "'['")?;
        let mut items = Vec::new();

        loop {
            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::RBracket) {
                break;
            }

            items.push(self.parse_expr()?);

            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.next();
            }
        }

        self.expect(TokenKind::RBracket, "']'")?;

        Ok(Arc::new(AstNode::with_children(
            node::LIST,
            Some(self.token_of(&t, "list")),
            items,
        )))
    }

    fn parse_map(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let t = self.expect(TokenKind::LBrace, "'{'")?;
        let mut entries = Vec::new();

        loop {
            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::RBrace) {
                break;
            }

            let key = self.parse_expr()?;
            self.skip_newlines();
            let ct = self.expect(TokenKind::Colon, "':'")?;
            self.skip_newlines();
            let value = self.parse_expr()?;

            entries.push(Arc::new(AstNode::with_children(
                node::KVP,
                Some(self.token_of(&ct, "kvp")),
                vec![key, value],
            )));

            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.next();
            }
        }

        self.expect(TokenKind::RBrace, "'}'")?;

        Ok(Arc::new(AstNode::with_children(
            node::MAP,
            Some(self.token_of(&t, "map")),
            entries,
        )))
    }

    fn parse_identifier(&mut self) -> Result<Arc<AstNode>, ParseError> {
        let id = self.expect_identifier()?;
        let id_value = id.ident().unwrap().to_string();

        let mut ops = Vec::new();

        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.next();
                    let member = self.expect_identifier()?;
                    let member_value = member.ident().unwrap().to_string();
                    ops.push(ChainOp::Member(member, member_value));
                }
                TokenKind::LParen => {
                    let pt = self.next();
                    let mut args = Vec::new();

                    loop {
                        self.skip_newlines();
                        if matches!(self.peek_kind(), TokenKind::RParen) {
                            break;
                        }

                        args.push(self.parse_expr()?);

                        self.skip_newlines();
                        if matches!(self.peek_kind(), TokenKind::Comma) {
                            self.next();
                        }
                    }

                    self.expect(TokenKind::RParen, "')'")?;
                    ops.push(ChainOp::Call(args, pt.line, pt.pos));
                }
                TokenKind::LBracket => {
                    let bt = self.next();
                    self.skip_newlines();
                    let index = self.parse_expr()?;
                    self.skip_newlines();
                    self.expect(TokenKind::RBracket, "']'")?;
                    ops.push(ChainOp::Index(index, bt.line, bt.pos));
                }
                _ => break,
            }
        }

        Ok(self.build_identifier(&id, &id_value, &ops))
    }

    /// Build the nested identifier chain: access operations are children
    /// of the identifier they apply to and a member identifier carries the
    /// rest of the chain.
    fn build_identifier(&self, id: &LexToken, value: &str, ops: &[ChainOp]) -> Arc<AstNode> {
        let mut children = Vec::new();
        let mut i = 0;

        while i < ops.len() {
            match ops[i] {
                ChainOp::Call(ref args, line, pos) => {
                    children.push(Arc::new(AstNode::with_children(
                        node::FUNCCALL,
                        Some(Token::new("funccall", line, pos)),
                        args.clone(),
                    )));
                    i += 1;
                }
                ChainOp::Index(ref index, line, pos) => {
                    children.push(Arc::new(AstNode::with_children(
                        node::COMPACCESS,
                        Some(Token::new("compaccess", line, pos)),
                        vec![index.clone()],
                    )));
                    i += 1;
                }
                ChainOp::Member(ref member, ref member_value) => {
                    children.push(self.build_identifier(member, member_value, &ops[i + 1..]));
                    break;
                }
            }
        }

        Arc::new(AstNode::with_children(
            node::IDENTIFIER,
            Some(self.token_of(id, value)),
            children,
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn dump(input: &str) -> String {
        parse("test", input).unwrap().to_string()
    }

    #[test]
    fn test_assignment_ast() {
        assert_eq!(
            dump("a := 1"),
            "statements\n  :=\n    identifier: a\n    number: 1\n"
        );
    }

    #[test]
    fn test_import_ast() {
        assert_eq!(
            dump("import \"foo/bar\" as foobar\na := foobar.b"),
            r#"statements
  import
    string: 'foo/bar'
    identifier: foobar
  :=
    identifier: a
    identifier: foobar
      identifier: b
"#
        );
    }

    #[test]
    fn test_funccall_ast() {
        assert_eq!(
            dump("log(\"Hello\")"),
            "statements\n  identifier: log\n    funccall\n      string: 'Hello'\n"
        );

        assert_eq!(
            dump("a.b(1).c"),
            r#"statements
  identifier: a
    identifier: b
      funccall
        number: 1
      identifier: c
"#
        );
    }

    #[test]
    fn test_compaccess_ast() {
        assert_eq!(
            dump("a[1].b"),
            r#"statements
  identifier: a
    compaccess
      number: 1
    identifier: b
"#
        );
    }

    #[test]
    fn test_if_ast() {
        assert_eq!(
            dump("if a > 1 {\n  b := 1\n} elif a > 0 {\n  b := 2\n} else {\n  b := 3\n}"),
            r#"statements
  if
    guard
      >
        identifier: a
        number: 1
    statements
      :=
        identifier: b
        number: 1
    guard
      >
        identifier: a
        number: 0
    statements
      :=
        identifier: b
        number: 2
    guard
      true
    statements
      :=
        identifier: b
        number: 3
"#
        );
    }

    #[test]
    fn test_loop_ast() {
        assert_eq!(
            dump("for a in range(2, 10) {\n  log(a)\n}"),
            r#"statements
  loop
    in
      identifier: a
      identifier: range
        funccall
          number: 2
          number: 10
    statements
      identifier: log
        funccall
          identifier: a
"#
        );

        assert_eq!(
            dump("for a > 0 {\n  a := a - 1\n}"),
            r#"statements
  loop
    guard
      >
        identifier: a
        number: 0
    statements
      :=
        identifier: a
        minus
          identifier: a
          number: 1
"#
        );
    }

    #[test]
    fn test_sink_ast() {
        assert_eq!(
            dump(
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
    }"#
            ),
            "statements\n  sink # \nMy cool rule\n\n".to_owned()
                + r#"    identifier: rule1
    kindmatch
      list
        string: 'core.*'
    scopematch
      list
        string: 'data.write'
    statematch
      map
        kvp
          string: 'val'
          null
    priority
      number: 10
    suppresses
      list
        string: 'rule2'
    statements
      identifier: log
        funccall
          string: 'rule1 < '
          identifier: event
"#
        );
    }

    #[test]
    fn test_func_ast() {
        assert_eq!(
            dump("func add(a, b=1) {\n  return a + b\n}"),
            r#"statements
  func
    identifier: add
    params
      identifier: a
      preset
        identifier: b
        number: 1
    statements
      return
        plus
          identifier: a
          identifier: b
"#
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse("test", "a :=").unwrap_err().to_string(),
            "Parse error in test: Expected an expression (Line:1 Pos:5)"
        );

        assert_eq!(
            parse("test", "if a { b := 1").unwrap_err().to_string(),
            "Parse error in test: Expected '}' (Line:1 Pos:14)"
        );
    }
}
