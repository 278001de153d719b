//! Lexer producing the token stream for the parser.
//!
//! `#` starts a line comment. `/* */` block comments are collected and
//! attached to the next token so sink declarations can pick them up as
//! docstrings. Newlines are significant as statement separators and are
//! emitted as tokens; the parser skips them where a construct continues.

use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(String),
    Str { value: String, allow_escapes: bool },

    Assign, // :=
    Equals, // = (parameter defaults)

    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,

    Eq,
    Neq,
    Gt,
    Lt,
    Geq,
    Leq,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Comma,
    Dot,
    Colon,
    Semicolon,

    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct LexToken {
    pub kind: TokenKind,
    pub line: usize,
    pub pos: usize,
    /// Block comment immediately preceding this token.
    pub doc: Option<String>,
}

impl LexToken {
    /// The identifier text if this token is an identifier.
    pub fn ident(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Ident(ref s) => Some(s),
            _ => None,
        }
    }
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    idx: usize,
    line: usize,
    col: usize,
}

pub fn tokenize(source_name: &str, input: &str) -> Result<Vec<LexToken>, ParseError> {
    let mut lexer = Lexer {
        source: source_name,
        chars: input.chars().collect(),
        idx: 0,
        line: 1,
        col: 1,
    };

    lexer.run()
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<Vec<LexToken>, ParseError> {
        let mut tokens = Vec::new();
        let mut pending_doc: Option<String> = None;

        loop {
            // Skip spaces and comments, collecting docstrings.
            loop {
                match self.peek() {
                    Some(' ') | Some('\t') | Some('\r') => {
                        self.advance();
                    }
                    Some('#') => {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('/') if self.peek_at(1) == Some('*') => {
                        pending_doc = Some(self.block_comment()?);
                    }
                    _ => break,
                }
            }

            let (line, pos) = (self.line, self.col);

            let kind = match self.peek() {
                None => TokenKind::Eof,
                Some('\n') => {
                    self.advance();
                    TokenKind::Newline
                }
                Some(c) if c.is_ascii_digit() => self.number(),
                Some(c) if c == '_' || c.is_alphabetic() => self.identifier(),
                Some('"') => self.string('"', true, line, pos)?,
                Some('\'') => self.string('\'', false, line, pos)?,
                Some(c) => self.operator(c, line, pos)?,
            };

            let done = kind == TokenKind::Eof;

            // Docstrings attach to the next substantive token, newlines
            // in between do not consume them.
            let doc = if kind == TokenKind::Newline {
                None
            } else {
                pending_doc.take()
            };

            tokens.push(LexToken { kind, line, pos, doc });

            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;

        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }

        Some(c)
    }

    fn block_comment(&mut self) -> Result<String, ParseError> {
        let (line, pos) = (self.line, self.col);
        self.advance(); // /
        self.advance(); // *

        let mut text = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        self.source,
                        "Unterminated block comment",
                        line,
                        pos,
                    ))
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    return Ok(text.trim().to_string());
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut offset = 1;
            if matches!(self.peek_at(1), Some('+') | Some('-')) {
                offset = 2;
            }
            if self.peek_at(offset).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..offset {
                    text.push(self.advance().unwrap());
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        TokenKind::Number(text)
    }

    fn identifier(&mut self) -> TokenKind {
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        TokenKind::Ident(text)
    }

    fn string(
        &mut self,
        quote: char,
        allow_escapes: bool,
        line: usize,
        pos: usize,
    ) -> Result<TokenKind, ParseError> {
        self.advance(); // opening quote
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        self.source,
                        "Unterminated string literal",
                        line,
                        pos,
                    ))
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::Str {
                        value,
                        allow_escapes,
                    });
                }
                Some('\\') if allow_escapes => {
                    self.advance();
                    match self.advance() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some(c) => value.push(c),
                        None => {
                            return Err(ParseError::new(
                                self.source,
                                "Unterminated string literal",
                                line,
                                pos,
                            ))
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn operator(&mut self, c: char, line: usize, pos: usize) -> Result<TokenKind, ParseError> {
        let two = self.peek_at(1);
        self.advance();

        let kind = match (c, two) {
            (':', Some('=')) => {
                self.advance();
                TokenKind::Assign
            }
            ('=', Some('=')) => {
                self.advance();
                TokenKind::Eq
            }
            ('!', Some('=')) => {
                self.advance();
                TokenKind::Neq
            }
            ('>', Some('=')) => {
                self.advance();
                TokenKind::Geq
            }
            ('<', Some('=')) => {
                self.advance();
                TokenKind::Leq
            }
            ('/', Some('/')) => {
                self.advance();
                TokenKind::DoubleSlash
            }
            ('=', _) => TokenKind::Equals,
            ('>', _) => TokenKind::Gt,
            ('<', _) => TokenKind::Lt,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            ('{', _) => TokenKind::LBrace,
            ('}', _) => TokenKind::RBrace,
            (',', _) => TokenKind::Comma,
            ('.', _) => TokenKind::Dot,
            (':', _) => TokenKind::Colon,
            (';', _) => TokenKind::Semicolon,
            _ => {
                return Err(ParseError::new(
                    self.source,
                    format!("Unexpected character '{}'", c),
                    line,
                    pos,
                ))
            }
        };

        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize("test", input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("a := 1.5 + b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Assign,
                TokenKind::Number("1.5".into()),
                TokenKind::Plus,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#""a\nb" 'c\nd'"#),
            vec![
                TokenKind::Str {
                    value: "a\nb".into(),
                    allow_escapes: true
                },
                TokenKind::Str {
                    value: "c\\nd".into(),
                    allow_escapes: false
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_doc() {
        let tokens = tokenize("test", "# line comment\n/* My cool rule */\nsink").unwrap();
        let sink = tokens
            .iter()
            .find(|t| t.ident() == Some("sink"))
            .unwrap();
        assert_eq!(sink.doc.as_deref(), Some("My cool rule"));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("test", "a\n  b").unwrap();
        assert_eq!((tokens[0].line, tokens[0].pos), (1, 1));
        // tokens[1] is the newline
        assert_eq!((tokens[2].line, tokens[2].pos), (2, 3));
    }

    #[test]
    fn test_division_operators() {
        assert_eq!(
            kinds("7 // 2 % 3"),
            vec![
                TokenKind::Number("7".into()),
                TokenKind::DoubleSlash,
                TokenKind::Number("2".into()),
                TokenKind::Percent,
                TokenKind::Number("3".into()),
                TokenKind::Eof,
            ]
        );
    }
}
