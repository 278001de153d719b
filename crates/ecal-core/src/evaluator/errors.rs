//! Runtime errors and control-flow sentinels.
//!
//! Evaluation uses a single result channel. Real failures are
//! [`RuntimeError`] values carrying source attribution and a growable
//! trace; `return`, iteration and loop control travel the same channel as
//! sentinels and are consumed before they cross any user-visible boundary.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::AstNode;
use crate::evaluator::value::Value;
use crate::scope::ScopeRef;

/// Runtime error kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Runtime error")]
    RuntimeError,
    #[error("Unknown construct")]
    UnknownConstruct,
    #[error("Invalid construct")]
    InvalidConstruct,
    #[error("Invalid state")]
    InvalidState,
    #[error("Cannot access variable")]
    VarAccess,
    #[error("Operand is not a number")]
    NotANumber,
    #[error("Operand is not a boolean")]
    NotABoolean,
    #[error("Operand is not a list")]
    NotAList,
    #[error("Operand is not a map")]
    NotAMap,
    #[error("Operand is not a list nor a map")]
    NotAListOrMap,
    /// User-defined error type produced by `raise`.
    #[error("{0}")]
    Custom(String),
}

/// A runtime related error with source attribution.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// Name of the source which was given to the parser.
    pub source: String,
    /// Error kind, used for equality checks.
    pub kind: ErrorKind,
    /// Details of this error.
    pub detail: String,
    /// AST node where the error occurred.
    pub node: Arc<AstNode>,
    /// Line of the error, 0 if unknown.
    pub line: usize,
    /// Position of the error, 0 if unknown.
    pub pos: usize,
    /// Call-frame nodes collected while unwinding.
    pub trace: Vec<Arc<AstNode>>,
    /// Environment snapshot attached by `raise`.
    pub environment: Option<ScopeRef>,
    /// User data payload attached by `raise`.
    pub data: Option<Value>,
}

impl RuntimeError {
    pub fn new(
        source: impl Into<String>,
        kind: ErrorKind,
        detail: impl Into<String>,
        node: Arc<AstNode>,
    ) -> RuntimeError {
        let line = node.line();
        let pos = node.pos();

        RuntimeError {
            source: source.into(),
            kind,
            detail: detail.into(),
            node,
            line,
            pos,
            trace: Vec::new(),
            environment: None,
            data: None,
        }
    }

    /// Append a call-frame node as the error unwinds.
    pub fn add_trace(&mut self, node: Arc<AstNode>) {
        self.trace.push(node);
    }

    /// Formatted trace, innermost frame first.
    pub fn trace_strings(&self) -> Vec<String> {
        self.trace
            .iter()
            .map(|n| format!("{} ({}:{})", n.describe(), self.source, n.line()))
            .collect()
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ECAL error in {}: {} ({})",
            self.source, self.kind, self.detail
        )?;

        if self.line != 0 {
            write!(f, " (Line:{} Pos:{})", self.line, self.pos)?;
        }

        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Result channel of the evaluator.
#[derive(Debug, Clone)]
pub enum EcalError {
    Runtime(Box<RuntimeError>),
    /// `return` unwinding to the enclosing call, carrying the value.
    Return(Value),
    /// A function identifying itself as an iterator, carrying the value of
    /// the current iteration step.
    IsIterator(Value),
    /// End of iteration, also raised by `break`.
    EndOfIteration,
    /// End of the current iteration step, raised by `continue`.
    ContinueIteration,
}

impl EcalError {
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, EcalError::Runtime(_))
    }

    /// The runtime error, if this is one.
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            EcalError::Runtime(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_runtime(self) -> Option<RuntimeError> {
        match self {
            EcalError::Runtime(e) => Some(*e),
            _ => None,
        }
    }
}

impl fmt::Display for EcalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcalError::Runtime(e) => write!(f, "{}", e),
            EcalError::Return(_) => write!(f, "*** return ***"),
            EcalError::IsIterator(_) => write!(f, "Function is an iterator"),
            EcalError::EndOfIteration => write!(f, "End of iteration was reached"),
            EcalError::ContinueIteration => {
                write!(f, "End of iteration step - Continue iteration")
            }
        }
    }
}

impl std::error::Error for EcalError {}

impl From<RuntimeError> for EcalError {
    fn from(e: RuntimeError) -> EcalError {
        EcalError::Runtime(Box::new(e))
    }
}

pub type EvalResult = Result<Value, EcalError>;
